// File: testing-framework/src/interchain/mod.rs
//
// Interchain
//
// Public entry point. An `Interchain` owns a declared topology, realizes it
// with `build`, hands out started chains and handshake sequencers while it is
// up, runs relay loops on request and tears everything down with `close`.
//
// Lifecycle:
//   Declaring --build--> Building --ok--> Built --close--> Closed
//                                 \--err--> Failed (already torn down)
//   Building --close--> Closed (build future dropped before finishing)

/// Build orchestration
pub mod build;
/// Teardown coordination and label sweep
pub mod teardown;

pub use build::BuildOptions;
pub use teardown::{sweep_label, TeardownCoordinator};

use crate::capabilities::{Chain, Label, NetworkId, ProcessRuntime, Relayer};
use crate::config::InterchainConfig;
use crate::error::{InterchainError, Result};
use crate::handshake::HandshakeSequencer;
use crate::ibc::{Wallet, WalletAmount};
use crate::link::{Link, LinkState};
use crate::orchestrator::{Clock, SystemClock, TestRng};
use crate::poller::PollSettings;
use crate::relay_loop::{RelayLoop, RelayLoopSummary};
use crate::reporter::ExecReporter;
use crate::topology::{LinkSpec, Topology};
use indexmap::{IndexMap, IndexSet};
use log::{info, warn};
use std::fmt;
use std::sync::Arc;
use tokio::time::Instant;

/// Where an `Interchain` is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Accepting declarations
    Declaring,
    /// `build` in progress
    Building,
    /// Every chain started, every relayer configured
    Built,
    /// `build` failed; resources were already torn down
    Failed,
    /// `close` completed
    Closed,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Declaring => "declaring",
            Self::Building => "building",
            Self::Built => "built",
            Self::Failed => "failed",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// A topology of chains, relayers and links, and the resources realizing it
///
/// # Example
///
/// ```rust,ignore
/// let hub = LocalHub::new();
/// let mut ic = Interchain::new(hub.runtime());
/// ic.add_chain(hub.chain(gaia_config))?
///     .add_chain(hub.chain(osmosis_config))?
///     .add_relayer(hub.relayer(), "rly")?
///     .add_link("gaia", "osmosis", "rly", "gaia-osmo")?;
///
/// ic.build(BuildOptions::new("transfer_test")).await?;
/// let gaia = ic.chain("gaia")?;
/// // ...
/// ic.close().await?;
/// ```
pub struct Interchain {
    config: InterchainConfig,
    topology: Topology,
    runtime: Arc<dyn ProcessRuntime>,
    clock: Arc<dyn Clock>,
    rng: TestRng,
    reporter: Arc<ExecReporter>,
    phase: Phase,
    label: Option<Label>,
    network: Option<NetworkId>,
    initialized_chains: IndexSet<String>,
    initialized_relayers: IndexSet<String>,
    started: IndexSet<String>,
    relayer_wallets: IndexMap<(String, String), Wallet>,
    relay_loops: IndexMap<String, RelayLoop>,
}

impl Interchain {
    /// Empty topology on `runtime` with the default configuration
    pub fn new(runtime: Arc<dyn ProcessRuntime>) -> Self {
        Self::from_topology(Topology::new(), runtime)
    }

    /// Wrap an already declared topology
    pub fn from_topology(topology: Topology, runtime: Arc<dyn ProcessRuntime>) -> Self {
        Self {
            config: InterchainConfig::default(),
            topology,
            runtime,
            clock: Arc::new(SystemClock),
            rng: TestRng::new_from_env_or_random(),
            reporter: Arc::new(ExecReporter::new("interchain")),
            phase: Phase::Declaring,
            label: None,
            network: None,
            initialized_chains: IndexSet::new(),
            initialized_relayers: IndexSet::new(),
            started: IndexSet::new(),
            relayer_wallets: IndexMap::new(),
            relay_loops: IndexMap::new(),
        }
    }

    /// Use `config` instead of the defaults
    pub fn with_config(mut self, config: InterchainConfig) -> Self {
        self.config = config;
        self
    }

    /// Pace waits with `clock`
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Draw key material from `rng`
    pub fn with_rng(mut self, rng: TestRng) -> Self {
        self.rng = rng;
        self
    }

    fn ensure_phase(&self, operation: &'static str, allowed: &[Phase]) -> Result<()> {
        if allowed.contains(&self.phase) {
            Ok(())
        } else {
            Err(InterchainError::InvalidPhase {
                operation,
                phase: self.phase.to_string(),
            })
        }
    }

    /// Declare a chain
    pub fn add_chain(&mut self, chain: Arc<dyn Chain>) -> Result<&mut Self> {
        self.topology.add_chain(chain)?;
        Ok(self)
    }

    /// Declare a chain with extra genesis balances
    pub fn add_chain_with_genesis(
        &mut self,
        chain: Arc<dyn Chain>,
        genesis_wallets: Vec<WalletAmount>,
    ) -> Result<&mut Self> {
        self.topology.add_chain_with_genesis(chain, genesis_wallets)?;
        Ok(self)
    }

    /// Declare a relayer
    pub fn add_relayer(&mut self, relayer: Arc<dyn Relayer>, name: impl Into<String>) -> Result<&mut Self> {
        self.topology.add_relayer(relayer, name)?;
        Ok(self)
    }

    /// Declare a link with default options
    pub fn add_link(&mut self, chain_a: &str, chain_b: &str, relayer: &str, path: &str) -> Result<&mut Self> {
        self.topology.add_link(chain_a, chain_b, relayer, path)?;
        Ok(self)
    }

    /// Declare a link
    pub fn add_link_with(&mut self, spec: LinkSpec) -> Result<&mut Self> {
        self.topology.add_link_with(spec)?;
        Ok(self)
    }

    /// Configuration in effect
    pub fn config(&self) -> &InterchainConfig {
        &self.config
    }

    /// Declared topology
    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    /// Current lifecycle phase
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Correlation label, once `build` started
    pub fn label(&self) -> Option<&Label> {
        self.label.as_ref()
    }

    /// Shared network, while up
    pub fn network(&self) -> Option<&NetworkId> {
        self.network.as_ref()
    }

    /// Seed of the RNG behind generated key material
    pub fn rng_seed(&self) -> u64 {
        self.rng.seed()
    }

    /// Step recorder
    pub fn reporter(&self) -> &Arc<ExecReporter> {
        &self.reporter
    }

    /// Poll settings derived from the configuration and clock
    pub fn poll_settings(&self) -> PollSettings {
        PollSettings::from_config(&self.config, self.clock.clone())
    }

    /// A started chain
    ///
    /// Chains are only addressable once `build` started them.
    pub fn chain(&self, name: &str) -> Result<Arc<dyn Chain>> {
        let entry = self
            .topology
            .chain(name)
            .ok_or_else(|| InterchainError::UnknownChain(name.to_string()))?;
        if self.phase != Phase::Built || !self.started.contains(name) {
            return Err(InterchainError::ChainNotStarted(name.to_string()));
        }
        Ok(entry.chain.clone())
    }

    /// Wallet generated for `relayer` on `chain` during build
    pub fn relayer_wallet(&self, relayer: &str, chain: &str) -> Option<&Wallet> {
        self.relayer_wallets
            .get(&(relayer.to_string(), chain.to_string()))
    }

    /// Declared link
    pub fn link(&self, path: &str) -> Result<Arc<Link>> {
        self.topology
            .link(path)
            .cloned()
            .ok_or_else(|| InterchainError::UnknownPath(path.to_string()))
    }

    /// Sequencer for driving the handshake of `path` step by step
    ///
    /// Typically used after building with `skip_path_creation`. Steps already
    /// recorded on the link return their recorded result.
    pub fn handshake(&self, path: &str) -> Result<HandshakeSequencer> {
        self.ensure_phase("handshake", &[Phase::Built])?;
        let link = self.link(path)?;
        self.sequencer(link)
    }

    pub(crate) fn sequencer(&self, link: Arc<Link>) -> Result<HandshakeSequencer> {
        let relayer = self
            .topology
            .relayer(link.relayer())
            .cloned()
            .ok_or_else(|| InterchainError::UnknownRelayer(link.relayer().to_string()))?;
        let chain_a = self.declared_chain(link.chain_a())?;
        let chain_b = self.declared_chain(link.chain_b())?;
        Ok(
            HandshakeSequencer::new(link, relayer, chain_a, chain_b, self.poll_settings())
                .with_block_budget(self.config.handshake_block_budget)
                .with_bound(self.config.handshake_height_bound)
                .with_reporter(self.reporter.clone()),
        )
    }

    fn declared_chain(&self, name: &str) -> Result<Arc<dyn Chain>> {
        self.topology
            .chain(name)
            .map(|entry| entry.chain.clone())
            .ok_or_else(|| InterchainError::UnknownChain(name.to_string()))
    }

    /// Start the background relay loop for `path`
    ///
    /// Fails with `LinkNotReady` unless the link completed channel
    /// establishment or `skip_verification` is set. Starting an already
    /// running path is a no-op.
    pub async fn start_relaying(&mut self, path: &str, skip_verification: bool) -> Result<()> {
        self.ensure_phase("start_relaying", &[Phase::Built])?;
        let link = self.link(path)?;
        let state = link.state();
        if state != LinkState::ChannelCreated && !skip_verification {
            return Err(InterchainError::LinkNotReady {
                path: path.to_string(),
                state,
            });
        }
        if self.relay_loops.contains_key(path) {
            return Ok(());
        }

        let relayer = self
            .topology
            .relayer(link.relayer())
            .cloned()
            .ok_or_else(|| InterchainError::UnknownRelayer(link.relayer().to_string()))?;
        let component = format!("relayer:{}", link.relayer());
        self.reporter
            .track(&component, "start-relaying", relayer.start_relaying(path))
            .await?;

        let relay_loop = RelayLoop::spawn(
            path,
            link.relayer(),
            relayer,
            self.config.relay_interval(),
            self.clock.clone(),
        );
        self.relay_loops.insert(path.to_string(), relay_loop);
        Ok(())
    }

    /// Stop the relay loop of `path`, letting an in-flight pass finish
    pub async fn stop_relaying(&mut self, path: &str) -> Result<RelayLoopSummary> {
        let relay_loop = self
            .relay_loops
            .shift_remove(path)
            .ok_or_else(|| InterchainError::InvalidPhase {
                operation: "stop_relaying",
                phase: format!("'{}' is not relaying", path),
            })?;
        let started = Instant::now();
        let result = relay_loop.stop().await;
        self.reporter.record(
            format!("relayer:{}", self.link(path)?.relayer()),
            "stop-relay-loop",
            started,
            result.as_ref().err().map(|e| format!("{:#}", e)),
        );
        Ok(result?)
    }

    /// Paths with a running relay loop
    pub fn relaying_paths(&self) -> Vec<String> {
        self.relay_loops.keys().cloned().collect()
    }

    /// Tear everything down: relayers, then chains, then the network
    ///
    /// Every step runs even if earlier ones fail; all problems are returned
    /// together as `TeardownFailure`. Closing twice, closing a failed build or
    /// closing before `build` is a no-op. A build whose future was dropped
    /// before finishing is torn down like a finished one.
    pub async fn close(&mut self) -> Result<()> {
        match self.phase {
            Phase::Built => {}
            Phase::Building => {
                warn!(
                    "interchain '{}' closed with an unfinished build",
                    self.reporter.test_name()
                );
            }
            Phase::Declaring => {
                self.phase = Phase::Closed;
                return Ok(());
            }
            Phase::Failed | Phase::Closed => return Ok(()),
        }

        let issues = self.teardown().await;
        self.phase = Phase::Closed;
        if issues.is_empty() {
            info!("interchain '{}' closed", self.reporter.test_name());
            Ok(())
        } else {
            Err(InterchainError::TeardownFailure(issues))
        }
    }

    pub(crate) async fn teardown(&mut self) -> Vec<crate::error::TeardownIssue> {
        let label = match &self.label {
            Some(label) => label.clone(),
            None => return Vec::new(),
        };
        let relay_loops: Vec<RelayLoop> = self.relay_loops.drain(..).map(|(_, l)| l).collect();
        // Only what build reached; the label sweep catches the rest
        let relayers: Vec<(String, Arc<dyn Relayer>)> = self
            .topology
            .relayers()
            .filter(|(name, _)| self.initialized_relayers.contains(*name))
            .map(|(name, relayer)| (name.clone(), relayer.clone()))
            .collect();
        let chains: Vec<(String, Arc<dyn Chain>)> = self
            .topology
            .chains()
            .filter(|(name, _)| self.initialized_chains.contains(*name))
            .map(|(name, entry)| (name.clone(), entry.chain.clone()))
            .collect();

        let issues = TeardownCoordinator::new(self.runtime.clone(), label, self.reporter.clone())
            .run(relay_loops, relayers, chains)
            .await;
        self.started.clear();
        self.initialized_chains.clear();
        self.initialized_relayers.clear();
        self.network = None;
        issues
    }
}

impl Drop for Interchain {
    fn drop(&mut self) {
        if matches!(self.phase, Phase::Built | Phase::Building) {
            log::warn!(
                "interchain '{}' dropped without close; resources labeled {} remain",
                self.reporter.test_name(),
                self.label
                    .as_ref()
                    .map(ToString::to_string)
                    .unwrap_or_default()
            );
        }
    }
}

impl fmt::Debug for Interchain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interchain")
            .field("phase", &self.phase)
            .field("topology", &self.topology)
            .field("label", &self.label)
            .field("started", &self.started)
            .field("relaying", &self.relay_loops.keys().collect::<Vec<_>>())
            .finish()
    }
}
