// File: testing-framework/src/interchain/build.rs
//
// Build Orchestration
//
// 1. Create the shared network under the correlation label
// 2. Start every chain concurrently and wait for block production
// 3. Configure every relayer (endpoints + generated keys), sequentially
// 4. Establish every link concurrently, unless path creation is skipped
//
// Any failure tears down what was created so far before the error is
// returned. The first chain failure, the build deadline or the caller's
// cancel signal trip a shared flag; tasks stop before their next step.

use super::{Interchain, Phase};
use crate::capabilities::{Chain, Label, ProcessContext};
use crate::error::{Budget, InterchainError, Result};
use crate::ibc::{KeyMaterial, Wallet, WalletAmount};
use crate::orchestrator::CancelSignal;
use crate::poller::{wait_for_blocks_all, wait_until_producing, HeightBound, PollSettings};
use crate::reporter::{BuildReport, ChainSnapshot, ExecReporter, LinkSnapshot, ReportMetadata};
use log::{debug, error, info, warn};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio::time::Duration;

/// Options for [`Interchain::build`]
#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    /// Test name; becomes the correlation label value and prefixes process
    /// names
    pub test_name: String,
    /// Start chains and relayers but leave every link at `Unset`
    pub skip_path_creation: bool,
    /// Wall-clock limit for the whole build
    pub deadline: Option<Duration>,
    /// External cancellation
    pub cancel: Option<CancelSignal>,
    /// Write a JSON build report here when the build fails
    pub report_dir: Option<PathBuf>,
}

impl BuildOptions {
    /// Options for `test_name`
    pub fn new(test_name: impl Into<String>) -> Self {
        Self {
            test_name: test_name.into(),
            ..Self::default()
        }
    }

    /// Leave links for manual handshakes
    pub fn skip_path_creation(mut self) -> Self {
        self.skip_path_creation = true;
        self
    }

    /// Limit the whole build to `deadline`
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Abort between steps once `cancel` is tripped
    pub fn with_cancel(mut self, cancel: CancelSignal) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Write a failure report into `dir`
    pub fn with_report_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.report_dir = Some(dir.into());
        self
    }
}

#[derive(Clone)]
struct RelayerKey {
    relayer: String,
    key_name: String,
    key: KeyMaterial,
}

struct ChainPlan {
    name: String,
    chain: Arc<dyn Chain>,
    genesis_wallets: Vec<WalletAmount>,
    relayer_keys: Vec<RelayerKey>,
}

struct ChainStart {
    ctx: ProcessContext,
    wallet_amount: u128,
    ready_timeout: Duration,
    settings: PollSettings,
    cancel: CancelSignal,
    reporter: Arc<ExecReporter>,
}

fn ensure_live(cancel: &CancelSignal, component: &str, step: &str) -> Result<()> {
    if cancel.is_cancelled() {
        Err(InterchainError::Cancelled(format!("{} before {}", component, step)))
    } else {
        Ok(())
    }
}

fn init_failure(component: &str) -> impl FnOnce(anyhow::Error) -> InterchainError + '_ {
    move |source| InterchainError::InitializationFailure {
        component: component.to_string(),
        source,
    }
}

/// Initialize, fund and start one chain, then wait until it produces blocks.
/// Returns the relayer wallets derived on it.
async fn start_chain(plan: ChainPlan, run: Arc<ChainStart>) -> Result<Vec<(String, Wallet)>> {
    let component = format!("chain:{}", plan.name);
    let chain = plan.chain.as_ref();

    ensure_live(&run.cancel, &component, "initialize")?;
    run.reporter
        .track(&component, "initialize", chain.initialize(&run.ctx))
        .await
        .map_err(init_failure(&component))?;

    let denom = chain.config().denom.clone();
    let mut wallets = Vec::with_capacity(plan.relayer_keys.len());
    let mut validator_funds = Vec::with_capacity(plan.relayer_keys.len() + plan.genesis_wallets.len());
    for key in &plan.relayer_keys {
        let wallet = chain
            .build_wallet(&key.key_name, &key.key)
            .await
            .map_err(init_failure(&component))?;
        validator_funds.push(WalletAmount::new(wallet.address.clone(), denom.clone(), run.wallet_amount));
        wallets.push((key.relayer.clone(), wallet));
    }
    validator_funds.extend(plan.genesis_wallets.iter().cloned());

    ensure_live(&run.cancel, &component, "start")?;
    run.reporter
        .track(&component, "start", chain.start(&validator_funds, &[]))
        .await
        .map_err(init_failure(&component))?;

    let height = run
        .reporter
        .track(
            &component,
            "wait-ready",
            wait_until_producing(chain, run.ready_timeout, &run.settings),
        )
        .await?;

    info!("{} ({}) producing blocks at height {}", plan.name, chain.config().chain_id, height);
    Ok(wallets)
}

fn is_cancellation(err: &InterchainError) -> bool {
    match err {
        InterchainError::Cancelled(_) => true,
        InterchainError::LinksFailed(failures) => failures.iter().all(is_cancellation),
        _ => false,
    }
}

/// Keep the first real failure; a cancellation only wins if nothing else
/// went wrong
fn keep_first(slot: &mut Option<InterchainError>, err: InterchainError) {
    let replace = match slot {
        None => true,
        Some(InterchainError::Cancelled(_)) => !matches!(err, InterchainError::Cancelled(_)),
        Some(_) => false,
    };
    if replace {
        *slot = Some(err);
    } else if log::log_enabled!(log::Level::Debug) {
        debug!("additional build failure: {}", err);
    }
}

impl Interchain {
    /// Realize the declared topology
    ///
    /// On success every chain is started, every relayer configured and,
    /// unless `skip_path_creation` was set, every link is at
    /// `ChannelCreated`. On failure everything created so far is torn down
    /// and the originating error is returned; if teardown also had problems
    /// the error is `BuildAborted` and `primary()` gives the originating one.
    pub async fn build(&mut self, options: BuildOptions) -> Result<()> {
        self.ensure_phase("build", &[Phase::Declaring])?;
        self.topology.freeze();
        self.phase = Phase::Building;
        self.reporter = Arc::new(ExecReporter::new(options.test_name.clone()));

        let label = Label::new(self.config.label_key.clone(), options.test_name.clone());
        self.label = Some(label.clone());
        info!(
            "building '{}': {} chain(s), {} relayer(s), {} link(s), label {}",
            options.test_name,
            self.topology.chains().count(),
            self.topology.relayers().count(),
            self.topology.links().count(),
            label
        );

        let cancel = CancelSignal::new();
        let expired = CancelSignal::new();
        let mut watchers = Vec::new();
        if let Some(external) = &options.cancel {
            watchers.push(cancel.follow(external));
        }
        if let Some(deadline) = options.deadline {
            let clock = self.clock.clone();
            let (cancel, expired) = (cancel.clone(), expired.clone());
            watchers.push(tokio::spawn(async move {
                clock.sleep(deadline).await;
                expired.cancel();
                cancel.cancel();
            }));
        }

        let result = self.realize(&options, &label, &cancel).await;
        for watcher in watchers {
            watcher.abort();
        }

        let err = match result {
            Ok(()) => {
                self.phase = Phase::Built;
                info!(
                    "'{}' built in {}ms",
                    options.test_name,
                    self.reporter.elapsed_ms()
                );
                return Ok(());
            }
            Err(err) => match options.deadline {
                Some(deadline)
                    if expired.is_cancelled() && is_cancellation(&err) =>
                {
                    InterchainError::DeadlineExceeded {
                        operation: format!("building '{}'", options.test_name),
                        budget: Budget::WallClockMs(deadline.as_millis() as u64),
                    }
                }
                _ => err,
            },
        };

        error!("build of '{}' failed: {}", options.test_name, err);
        let mut report = self.snapshot(&err);
        let teardown = self.teardown().await;
        self.phase = Phase::Failed;
        for issue in &teardown {
            warn!("teardown after failed build: {}", issue);
        }

        if let Some(dir) = &options.report_dir {
            report.events = self.reporter.events();
            report.teardown_issues = teardown.iter().map(ToString::to_string).collect();
            report.metadata.duration_ms = self.reporter.elapsed_ms();
            match report.save(dir).await {
                Ok(path) => info!("build report written to {}", path.display()),
                Err(e) => warn!("failed to write build report: {:#}", e),
            }
        }

        if teardown.is_empty() {
            Err(err)
        } else {
            Err(InterchainError::BuildAborted {
                cause: Box::new(err),
                teardown,
            })
        }
    }

    async fn realize(
        &mut self,
        options: &BuildOptions,
        label: &Label,
        cancel: &CancelSignal,
    ) -> Result<()> {
        let network = self
            .reporter
            .track("network", "create-network", self.runtime.create_network(label))
            .await
            .map_err(init_failure("network"))?;
        info!("network {} created for {}", network, label);
        self.network = Some(network.clone());

        let ctx = ProcessContext {
            test_name: options.test_name.clone(),
            label: label.clone(),
            network,
            runtime: self.runtime.clone(),
        };
        let settings = self.poll_settings().with_cancel(cancel.clone());

        let keys = self.generate_relayer_keys();
        self.start_chains(&ctx, &keys, &settings, cancel).await?;
        self.configure_relayers(&ctx, &keys, cancel).await?;

        if options.skip_path_creation {
            info!("skipping path creation for {} link(s)", self.topology.links().count());
            return Ok(());
        }
        ensure_live(cancel, "links", "establish")?;
        self.establish_links(&settings, cancel).await
    }

    /// One key per (relayer, chain) pair the relayer is linked to
    fn generate_relayer_keys(&self) -> Vec<(String, RelayerKey)> {
        let mut keys = Vec::new();
        for (relayer, _) in self.topology.relayers() {
            for chain in self.topology.chains_of_relayer(relayer) {
                let chain_id = match self.topology.chain(&chain) {
                    Some(entry) => entry.chain.config().chain_id.clone(),
                    None => continue,
                };
                keys.push((
                    chain,
                    RelayerKey {
                        relayer: relayer.clone(),
                        key_name: format!("{}-{}", relayer, chain_id),
                        key: KeyMaterial::generate(&self.rng),
                    },
                ));
            }
        }
        keys
    }

    async fn start_chains(
        &mut self,
        ctx: &ProcessContext,
        keys: &[(String, RelayerKey)],
        settings: &PollSettings,
        cancel: &CancelSignal,
    ) -> Result<()> {
        let run = Arc::new(ChainStart {
            ctx: ctx.clone(),
            wallet_amount: self.config.relayer_wallet_amount,
            ready_timeout: self.config.chain_ready_timeout(),
            settings: settings.clone(),
            cancel: cancel.clone(),
            reporter: self.reporter.clone(),
        });

        let mut tasks = JoinSet::new();
        for (name, entry) in self.topology.chains() {
            let plan = ChainPlan {
                name: name.clone(),
                chain: entry.chain.clone(),
                genesis_wallets: entry.genesis_wallets.clone(),
                relayer_keys: keys
                    .iter()
                    .filter(|(chain, _)| chain == name)
                    .map(|(_, key)| key.clone())
                    .collect(),
            };
            self.initialized_chains.insert(name.clone());
            let run = run.clone();
            tasks.spawn(async move {
                let name = plan.name.clone();
                (name, start_chain(plan, run).await)
            });
        }

        let mut failure = None;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((name, Ok(wallets))) => {
                    for (relayer, wallet) in wallets {
                        self.relayer_wallets.insert((relayer, name.clone()), wallet);
                    }
                    self.started.insert(name);
                }
                Ok((name, Err(err))) => {
                    if !cancel.is_cancelled() {
                        warn!("chain {} failed to start, cancelling the others", name);
                        cancel.cancel();
                    }
                    keep_first(&mut failure, err);
                }
                Err(join_err) => {
                    cancel.cancel();
                    keep_first(
                        &mut failure,
                        InterchainError::Collaborator(anyhow::anyhow!("chain start task failed: {}", join_err)),
                    );
                }
            }
        }

        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn configure_relayers(
        &mut self,
        ctx: &ProcessContext,
        keys: &[(String, RelayerKey)],
        cancel: &CancelSignal,
    ) -> Result<()> {
        let relayers: Vec<_> = self
            .topology
            .relayers()
            .map(|(name, relayer)| (name.clone(), relayer.clone()))
            .collect();

        for (name, relayer) in relayers {
            let component = format!("relayer:{}", name);
            ensure_live(cancel, &component, "configure")?;
            self.initialized_relayers.insert(name.clone());

            let chains: Vec<(Arc<dyn Chain>, RelayerKey)> = keys
                .iter()
                .filter(|(_, key)| key.relayer == name)
                .filter_map(|(chain, key)| {
                    self.topology
                        .chain(chain)
                        .map(|entry| (entry.chain.clone(), key.clone()))
                })
                .collect();

            self.reporter
                .track(&component, "configure", async {
                    relayer.initialize(ctx).await?;
                    for (chain, key) in &chains {
                        let config = chain.config();
                        relayer
                            .add_chain_configuration(config, &chain.rpc_address(), &chain.grpc_address())
                            .await?;
                        relayer
                            .restore_key(&config.chain_id, &key.key_name, &key.key)
                            .await?;
                    }
                    anyhow::Ok(())
                })
                .await
                .map_err(init_failure(&component))?;

            info!("relayer {} configured for {} chain(s)", name, chains.len());
        }
        Ok(())
    }

    async fn establish_links(&mut self, settings: &PollSettings, cancel: &CancelSignal) -> Result<()> {
        let settle_blocks = self.config.post_handshake_blocks;
        let bound = self.config.handshake_height_bound;

        let mut tasks = JoinSet::new();
        let links: Vec<_> = self.topology.links().cloned().collect();
        for link in links {
            let sequencer = self.sequencer(link.clone())?.with_cancel(cancel.clone());
            let chain_a = self.declared_chain(link.chain_a())?;
            let chain_b = self.declared_chain(link.chain_b())?;
            let settings = settings.clone();
            tasks.spawn(async move {
                let result = establish_link(sequencer, chain_a, chain_b, settle_blocks, bound, &settings).await;
                (link.path().to_string(), result)
            });
        }

        let mut failures = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(()))) => {}
                Ok((path, Err(err))) => {
                    warn!("link '{}' failed: {}", path, err);
                    failures.push(err);
                }
                Err(join_err) => failures.push(InterchainError::Collaborator(anyhow::anyhow!(
                    "link task failed: {}",
                    join_err
                ))),
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(InterchainError::LinksFailed(failures))
        }
    }

    fn snapshot(&self, err: &InterchainError) -> BuildReport {
        let chains = self
            .topology
            .chains()
            .map(|(name, entry)| {
                let config = entry.chain.config();
                let state = if self.started.contains(name) {
                    "started"
                } else if self.initialized_chains.contains(name) {
                    "initializing"
                } else {
                    "declared"
                };
                ChainSnapshot {
                    name: name.clone(),
                    chain_id: config.chain_id.clone(),
                    family: config.family.to_string(),
                    state: state.to_string(),
                }
            })
            .collect();
        let links = self
            .topology
            .links()
            .map(|link| {
                LinkSnapshot::new(
                    link.path(),
                    link.chain_a(),
                    link.chain_b(),
                    link.relayer(),
                    link.state(),
                    &link.record(),
                )
            })
            .collect();

        BuildReport {
            metadata: ReportMetadata {
                test_name: self.reporter.test_name().to_string(),
                label: self.label.as_ref().map(ToString::to_string).unwrap_or_default(),
                rng_seed: Some(self.rng.seed()),
                timestamp: chrono::Utc::now().to_rfc3339(),
                duration_ms: self.reporter.elapsed_ms(),
                failure_reason: Some(err.to_string()),
            },
            chains,
            relayers: self.topology.relayers().map(|(name, _)| name.clone()).collect(),
            links,
            events: self.reporter.events(),
            teardown_issues: Vec::new(),
        }
    }
}

async fn establish_link(
    sequencer: crate::handshake::HandshakeSequencer,
    chain_a: Arc<dyn Chain>,
    chain_b: Arc<dyn Chain>,
    settle_blocks: u64,
    bound: HeightBound,
    settings: &PollSettings,
) -> Result<()> {
    let channel = sequencer.establish().await?;
    if settle_blocks > 0 {
        let chains: [&dyn Chain; 2] = [chain_a.as_ref(), chain_b.as_ref()];
        wait_for_blocks_all(&chains, settle_blocks, bound, settings).await?;
    }
    info!(
        "link '{}' established: {} <-> {}",
        sequencer.link().path(),
        channel.on_a.channel_id,
        channel.on_b.channel_id
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HandshakeStep;

    #[test]
    fn test_keep_first_prefers_real_failures() {
        let mut slot = None;
        keep_first(&mut slot, InterchainError::Cancelled("gaia".into()));
        keep_first(&mut slot, InterchainError::ChainNotStarted("osmo".into()));
        keep_first(&mut slot, InterchainError::UnknownChain("juno".into()));
        assert!(matches!(slot, Some(InterchainError::ChainNotStarted(_))));

        let mut slot = Some(InterchainError::HandshakeRejection {
            path: "p".into(),
            relayer: "rly".into(),
            step: HandshakeStep::CreateClients,
            source: anyhow::anyhow!("no"),
        });
        keep_first(&mut slot, InterchainError::Cancelled("later".into()));
        assert!(matches!(slot, Some(InterchainError::HandshakeRejection { .. })));
    }

    #[test]
    fn test_build_options_builder() {
        let options = BuildOptions::new("t")
            .skip_path_creation()
            .with_deadline(Duration::from_secs(30))
            .with_report_dir("/tmp/reports");
        assert_eq!(options.test_name, "t");
        assert!(options.skip_path_creation);
        assert_eq!(options.deadline, Some(Duration::from_secs(30)));
        assert!(options.cancel.is_none());
    }
}
