// File: testing-framework/src/poller.rs
//
// Consistency Poller
//
// Block-count bounded waiting. Every wait in the framework is expressed as
// "up to N blocks" rather than wall-clock time, because chains under test
// advance at different and variable real-time rates. The clock only paces the
// height queries and catches chains that stop producing blocks altogether.
//
// One generic loop (`poll_until`) backs every specialization:
// - `wait_for_blocks` / `wait_for_blocks_all`
// - `poll_for_balance` / `poll_for_balance_matching`
// - `poll_for_proposal_status`
// - handshake artifact confirmation (see `handshake`)

use crate::capabilities::Chain;
use crate::config::InterchainConfig;
use crate::error::{Budget, InterchainError, Result};
use crate::ibc::{ProposalStatus, WalletAmount};
use crate::orchestrator::{CancelSignal, Clock, SystemClock};
use log::{debug, trace};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tokio::time::Duration;

/// How block progress is counted when a poll observes several chains
///
/// Progress is the number of blocks advanced since the poll started. With
/// several chains each advances by its own amount; the bound picks which
/// amount consumes the budget.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeightBound {
    /// The chain that advanced least (every chain advanced at least N blocks)
    #[default]
    Slowest,
    /// The chain that advanced most (any chain advanced N blocks)
    Fastest,
    /// Only the chain at this index counts
    Designated(usize),
}

impl HeightBound {
    /// Blocks advanced according to this bound
    ///
    /// `start` and `current` must have the same length; returns `None` for a
    /// `Designated` index out of range or an empty chain set.
    pub fn progress(&self, start: &[u64], current: &[u64]) -> Option<u64> {
        let mut deltas = start
            .iter()
            .zip(current)
            .map(|(s, c)| c.saturating_sub(*s));
        match self {
            Self::Slowest => deltas.min(),
            Self::Fastest => deltas.max(),
            Self::Designated(index) => deltas.nth(*index),
        }
    }
}

/// Shape of one poll: budget and evaluation cadence, both in blocks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollRequest {
    /// Blocks the poll may wait before giving up
    pub max_blocks: u64,
    /// Blocks between two predicate evaluations (at least 1)
    pub cadence: u64,
    /// Multi-chain progress rule
    pub bound: HeightBound,
    /// Absolute height (as counted by `bound`) at which the poll also gives up
    pub until_height: Option<u64>,
}

impl PollRequest {
    /// Evaluate every block, for at most `max_blocks` blocks
    pub fn blocks(max_blocks: u64) -> Self {
        Self {
            max_blocks,
            cadence: 1,
            bound: HeightBound::Slowest,
            until_height: None,
        }
    }

    /// Evaluate every `cadence` blocks
    pub fn with_cadence(mut self, cadence: u64) -> Self {
        self.cadence = cadence.max(1);
        self
    }

    /// Use `bound` to count progress across chains
    pub fn with_bound(mut self, bound: HeightBound) -> Self {
        self.bound = bound;
        self
    }

    /// Also stop once the bounded height reaches `height`
    pub fn until_height(mut self, height: u64) -> Self {
        self.until_height = Some(height);
        self
    }
}

/// Wall-clock pacing shared by all polls of one topology
#[derive(Clone)]
pub struct PollSettings {
    /// Pause between two height queries
    pub poll_interval: Duration,
    /// Give up when progress has not moved for this long
    pub stall_timeout: Duration,
    /// Time source
    pub clock: Arc<dyn Clock>,
    /// Checked between evaluations
    pub cancel: Option<CancelSignal>,
}

impl PollSettings {
    /// Settings from a configuration, on the given clock
    pub fn from_config(config: &InterchainConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            poll_interval: config.height_poll_interval(),
            stall_timeout: config.stall_timeout(),
            clock,
            cancel: None,
        }
    }

    /// Attach a cancellation signal
    pub fn with_cancel(mut self, cancel: CancelSignal) -> Self {
        self.cancel = Some(cancel);
        self
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().map(CancelSignal::is_cancelled).unwrap_or(false)
    }

    /// Sleep one poll interval, waking early on cancellation
    async fn pause(&self) {
        match &self.cancel {
            Some(cancel) => {
                tokio::select! {
                    _ = self.clock.sleep(self.poll_interval) => {}
                    _ = cancel.cancelled() => {}
                }
            }
            None => self.clock.sleep(self.poll_interval).await,
        }
    }
}

impl Default for PollSettings {
    fn default() -> Self {
        Self::from_config(&InterchainConfig::default(), Arc::new(SystemClock))
    }
}

impl std::fmt::Debug for PollSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollSettings")
            .field("poll_interval", &self.poll_interval)
            .field("stall_timeout", &self.stall_timeout)
            .field("cancellable", &self.cancel.is_some())
            .finish()
    }
}

/// What the predicate sees on each evaluation
#[derive(Debug, Clone, Copy)]
pub struct Observation<'a> {
    /// Heights when the poll started
    pub start: &'a [u64],
    /// Heights now
    pub current: &'a [u64],
    /// Blocks advanced, per the request's bound
    pub progress: u64,
}

fn stalled(operation: &str, stall_timeout: Duration) -> InterchainError {
    InterchainError::DeadlineExceeded {
        operation: format!("{} (no block progress)", operation),
        budget: Budget::WallClockMs(stall_timeout.as_millis() as u64),
    }
}

/// Read heights, retrying query failures until the stall timeout
async fn read_heights<H, HF>(
    operation: &str,
    settings: &PollSettings,
    heights: &mut H,
) -> Result<Vec<u64>>
where
    H: FnMut() -> HF,
    HF: Future<Output = anyhow::Result<Vec<u64>>>,
{
    let started = settings.clock.now();
    loop {
        match heights().await {
            Ok(h) => return Ok(h),
            Err(e) => {
                if log::log_enabled!(log::Level::Debug) {
                    debug!("{}: height query failed, retrying: {:#}", operation, e);
                }
            }
        }
        if settings.is_cancelled() {
            return Err(InterchainError::Cancelled(operation.to_string()));
        }
        if settings.clock.now() - started >= settings.stall_timeout {
            return Err(stalled(operation, settings.stall_timeout));
        }
        settings.pause().await;
    }
}

/// Poll `predicate` until it yields a value or the block budget runs out
///
/// The predicate is evaluated immediately at the starting heights, then every
/// `cadence` blocks of progress, and a final time once progress reaches
/// `max_blocks` (or the bounded height reaches `until_height`). Only then is
/// `DeadlineExceeded` returned. Predicate errors and height query errors are
/// treated as transient and retried.
///
/// `heights` returns one height per observed chain, always in the same order.
pub async fn poll_until<T, H, HF, P, PF>(
    operation: &str,
    request: PollRequest,
    settings: &PollSettings,
    mut heights: H,
    mut predicate: P,
) -> Result<T>
where
    H: FnMut() -> HF,
    HF: Future<Output = anyhow::Result<Vec<u64>>>,
    P: FnMut(Observation<'_>) -> PF,
    PF: Future<Output = anyhow::Result<Option<T>>>,
{
    let cadence = request.cadence.max(1);
    let start = read_heights(operation, settings, &mut heights).await?;
    let bounded_height = |current: &[u64]| -> Option<u64> {
        match request.bound {
            HeightBound::Slowest => current.iter().copied().min(),
            HeightBound::Fastest => current.iter().copied().max(),
            HeightBound::Designated(index) => current.get(index).copied(),
        }
    };

    if request.bound.progress(&start, &start).is_none() {
        return Err(InterchainError::Collaborator(anyhow::anyhow!(
            "{}: height bound {:?} does not fit {} chain(s)",
            operation,
            request.bound,
            start.len()
        )));
    }

    let mut current = start.clone();
    let mut next_evaluation = 0u64;
    let mut last_progress = 0u64;
    let mut last_progress_at = settings.clock.now();

    loop {
        if settings.is_cancelled() {
            return Err(InterchainError::Cancelled(operation.to_string()));
        }

        let progress = request.bound.progress(&start, &current).unwrap_or(0);
        let height_reached = match (request.until_height, bounded_height(&current)) {
            (Some(limit), Some(height)) => height >= limit,
            _ => false,
        };

        if progress >= next_evaluation || height_reached {
            let observation = Observation {
                start: &start,
                current: &current,
                progress,
            };
            match predicate(observation).await {
                Ok(Some(value)) => {
                    if log::log_enabled!(log::Level::Debug) {
                        debug!("{}: satisfied after {} block(s)", operation, progress);
                    }
                    return Ok(value);
                }
                Ok(None) => {
                    trace!("{}: not yet satisfied at progress {}", operation, progress);
                }
                Err(e) => {
                    if log::log_enabled!(log::Level::Debug) {
                        debug!("{}: transient failure at progress {}: {:#}", operation, progress, e);
                    }
                }
            }

            if progress >= request.max_blocks || height_reached {
                return Err(InterchainError::DeadlineExceeded {
                    operation: operation.to_string(),
                    budget: Budget::Blocks(request.max_blocks),
                });
            }
            // Land the last evaluation exactly on the budget
            next_evaluation = (progress + cadence).min(request.max_blocks);
        }

        settings.pause().await;

        match heights().await {
            Ok(h) if h.len() == start.len() => current = h,
            Ok(h) => {
                return Err(InterchainError::Collaborator(anyhow::anyhow!(
                    "{}: expected {} height(s), got {}",
                    operation,
                    start.len(),
                    h.len()
                )))
            }
            Err(e) => {
                if log::log_enabled!(log::Level::Debug) {
                    debug!("{}: height query failed, retrying: {:#}", operation, e);
                }
            }
        }

        let progress_now = request.bound.progress(&start, &current).unwrap_or(0);
        if progress_now > last_progress {
            last_progress = progress_now;
            last_progress_at = settings.clock.now();
        } else if settings.clock.now() - last_progress_at >= settings.stall_timeout {
            return Err(stalled(operation, settings.stall_timeout));
        }
    }
}

type HeightsFuture<'a> =
    std::pin::Pin<Box<dyn Future<Output = anyhow::Result<Vec<u64>>> + Send + 'a>>;

/// Heights of a single chain, as a `poll_until` height source
fn single<'a, C: Chain + ?Sized>(
    chain: &'a C,
) -> impl FnMut() -> HeightsFuture<'a> + 'a {
    move || Box::pin(async move { anyhow::Ok(vec![chain.height().await?]) })
}

/// Heights of several chains, in order
fn several<'a>(chains: &'a [&'a dyn Chain]) -> impl FnMut() -> HeightsFuture<'a> + 'a {
    move || {
        Box::pin(async move {
            let mut heights = Vec::with_capacity(chains.len());
            for chain in chains {
                heights.push(chain.height().await?);
            }
            anyhow::Ok(heights)
        })
    }
}

/// Wait until `chain` advanced `blocks` blocks; returns the height reached
pub async fn wait_for_blocks<C: Chain + ?Sized>(
    chain: &C,
    blocks: u64,
    settings: &PollSettings,
) -> Result<u64> {
    let operation = format!("waiting {} block(s) on {}", blocks, chain.config().name);
    poll_until(
        &operation,
        PollRequest::blocks(blocks),
        settings,
        single(chain),
        |obs| {
            let reached = (obs.progress >= blocks).then(|| obs.current[0]);
            async move { anyhow::Ok(reached) }
        },
    )
    .await
}

/// Wait until `chains` advanced `blocks` blocks as counted by `bound`;
/// returns the heights reached
pub async fn wait_for_blocks_all(
    chains: &[&dyn Chain],
    blocks: u64,
    bound: HeightBound,
    settings: &PollSettings,
) -> Result<Vec<u64>> {
    let names: Vec<&str> = chains.iter().map(|c| c.config().name.as_str()).collect();
    let operation = format!("waiting {} block(s) on [{}]", blocks, names.join(", "));
    poll_until(
        &operation,
        PollRequest::blocks(blocks).with_bound(bound),
        settings,
        several(chains),
        |obs| {
            let reached = (obs.progress >= blocks).then(|| obs.current.to_vec());
            async move { anyhow::Ok(reached) }
        },
    )
    .await
}

/// Poll until `expected.address` holds exactly `expected.amount` of
/// `expected.denom`, for at most `max_blocks` blocks
pub async fn poll_for_balance<C: Chain + ?Sized>(
    chain: &C,
    expected: &WalletAmount,
    max_blocks: u64,
    settings: &PollSettings,
) -> Result<u128> {
    let target = expected.amount;
    poll_for_balance_matching(
        chain,
        &expected.address,
        &expected.denom,
        max_blocks,
        settings,
        move |amount| amount == target,
    )
    .await
}

/// Poll until the balance satisfies `accept`, for at most `max_blocks` blocks
pub async fn poll_for_balance_matching<C, F>(
    chain: &C,
    address: &str,
    denom: &str,
    max_blocks: u64,
    settings: &PollSettings,
    accept: F,
) -> Result<u128>
where
    C: Chain + ?Sized,
    F: Fn(u128) -> bool,
{
    let operation = format!(
        "polling {} balance of {} on {}",
        denom,
        address,
        chain.config().name
    );
    let accept = &accept;
    poll_until(
        &operation,
        PollRequest::blocks(max_blocks),
        settings,
        single(chain),
        |_| async move {
            let amount = chain.get_balance(address, denom).await?;
            anyhow::Ok(accept(amount).then_some(amount))
        },
    )
    .await
}

/// Poll a governance proposal until it reaches `status`, or until the chain
/// reaches `max_height`, whichever comes first
pub async fn poll_for_proposal_status<C: Chain + ?Sized>(
    chain: &C,
    start_height: u64,
    max_height: u64,
    proposal_id: u64,
    status: ProposalStatus,
    settings: &PollSettings,
) -> Result<ProposalStatus> {
    let operation = format!(
        "polling proposal {} for {:?} on {}",
        proposal_id,
        status,
        chain.config().name
    );
    let request = PollRequest::blocks(max_height.saturating_sub(start_height)).until_height(max_height);
    poll_until(&operation, request, settings, single(chain), |_| async move {
        let current = chain.proposal_status(proposal_id).await?;
        anyhow::Ok((current == status).then_some(current))
    })
    .await
}

/// Wait until `chain` is producing blocks: two consecutive height
/// observations, the second strictly greater than the first
///
/// Unlike block-bounded polls this is bounded by `timeout`, since a chain that
/// has not started cannot count blocks yet.
pub async fn wait_until_producing<C: Chain + ?Sized>(
    chain: &C,
    timeout: Duration,
    settings: &PollSettings,
) -> Result<u64> {
    let name = &chain.config().name;
    let started = settings.clock.now();
    let mut previous: Option<u64> = None;

    loop {
        if settings.is_cancelled() {
            return Err(InterchainError::Cancelled(format!("waiting for {} to produce blocks", name)));
        }

        match chain.height().await {
            Ok(height) => {
                if let Some(prev) = previous {
                    if height > prev {
                        if log::log_enabled!(log::Level::Debug) {
                            debug!("{} producing blocks ({} -> {})", name, prev, height);
                        }
                        return Ok(height);
                    }
                }
                previous = Some(height);
            }
            Err(e) => {
                // Endpoint not up yet: the next good read starts a new pair
                previous = None;
                if log::log_enabled!(log::Level::Debug) {
                    debug!("{} height not available yet: {:#}", name, e);
                }
            }
        }

        if settings.clock.now() - started >= timeout {
            return Err(InterchainError::DeadlineExceeded {
                operation: format!("waiting for {} to produce blocks", name),
                budget: Budget::WallClockMs(timeout.as_millis() as u64),
            });
        }
        settings.pause().await;
    }
}
