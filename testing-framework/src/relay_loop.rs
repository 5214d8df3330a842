// File: testing-framework/src/relay_loop.rs
//
// Background relay loop
//
// A detached task calling `Relayer::relay` for one path at a fixed interval.
// The loop checks its stop flag between relay passes only, so a pass that is
// submitting transactions always runs to completion.

use crate::capabilities::Relayer;
use crate::ibc::RelayReport;
use crate::orchestrator::Clock;
use anyhow::{anyhow, Result};
use log::{debug, info, warn};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Duration;

/// Totals of a finished relay loop
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayLoopSummary {
    /// Relay passes attempted
    pub passes: u64,
    /// Passes that returned an error
    pub failures: u64,
    /// Packets and acks delivered
    pub delivered: RelayReport,
}

/// Handle to a running relay loop
pub struct RelayLoop {
    path: String,
    relayer: String,
    stop: watch::Sender<bool>,
    handle: JoinHandle<RelayLoopSummary>,
}

impl RelayLoop {
    /// Spawn a loop relaying `path` every `interval`
    pub fn spawn(
        path: impl Into<String>,
        relayer_name: impl Into<String>,
        relayer: Arc<dyn Relayer>,
        interval: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let path = path.into();
        let relayer_name = relayer_name.into();
        let (stop, mut stop_rx) = watch::channel(false);

        let task_path = path.clone();
        let task_relayer = relayer_name.clone();
        let handle = tokio::spawn(async move {
            let mut summary = RelayLoopSummary::default();
            loop {
                if *stop_rx.borrow() {
                    break;
                }

                summary.passes += 1;
                match relayer.relay(&task_path).await {
                    Ok(report) => {
                        if report.packets_relayed > 0 || report.acks_relayed > 0 {
                            debug!(
                                "{} relayed {} packet(s), {} ack(s) on '{}'",
                                task_relayer, report.packets_relayed, report.acks_relayed, task_path
                            );
                        }
                        summary.delivered = summary.delivered.merge(report);
                    }
                    Err(e) => {
                        summary.failures += 1;
                        warn!("{} relay pass on '{}' failed: {:#}", task_relayer, task_path, e);
                    }
                }

                tokio::select! {
                    _ = clock.sleep(interval) => {}
                    changed = stop_rx.changed() => {
                        // Handle dropped without an explicit stop
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }
            summary
        });

        info!("relay loop started for '{}' ({})", path, relayer_name);
        Self {
            path,
            relayer: relayer_name,
            stop,
            handle,
        }
    }

    /// Path relayed by this loop
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Relayer running this loop
    pub fn relayer(&self) -> &str {
        &self.relayer
    }

    /// Whether the task already exited
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Signal the loop to stop and wait for the in-flight pass to finish
    pub async fn stop(self) -> Result<RelayLoopSummary> {
        self.stop.send_replace(true);
        let summary = self
            .handle
            .await
            .map_err(|e| anyhow!("relay loop for '{}' panicked: {}", self.path, e))?;
        info!(
            "relay loop stopped for '{}' after {} pass(es), {} failure(s)",
            self.path, summary.passes, summary.failures
        );
        Ok(summary)
    }
}

impl std::fmt::Debug for RelayLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayLoop")
            .field("path", &self.path)
            .field("relayer", &self.relayer)
            .field("finished", &self.handle.is_finished())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChainConfig;
    use crate::ibc::{
        ChannelOptions, ChannelOutput, ClientOutput, ConnectionOutput, CreatedIds, KeyMaterial,
        ResolvedClientOptions,
    };
    use crate::orchestrator::SystemClock;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU64, Ordering};

    /// Relayer that only counts relay passes and fails every third one
    #[derive(Default)]
    struct CountingRelayer {
        passes: AtomicU64,
    }

    #[async_trait]
    impl Relayer for CountingRelayer {
        async fn add_chain_configuration(&self, _: &ChainConfig, _: &str, _: &str) -> Result<()> {
            Ok(())
        }
        async fn restore_key(&self, _: &str, _: &str, _: &KeyMaterial) -> Result<()> {
            Ok(())
        }
        async fn generate_path(&self, _: &str, _: &str, _: &str) -> Result<()> {
            Ok(())
        }
        async fn create_clients(&self, _: &str, _: &ResolvedClientOptions) -> Result<CreatedIds> {
            Ok(CreatedIds::new("07-tendermint-0", "07-tendermint-0"))
        }
        async fn create_connections(&self, _: &str) -> Result<CreatedIds> {
            Ok(CreatedIds::new("connection-0", "connection-0"))
        }
        async fn create_channel(&self, _: &str, _: &ChannelOptions) -> Result<CreatedIds> {
            Ok(CreatedIds::new("channel-0", "channel-0"))
        }
        async fn get_clients(&self, _: &str) -> Result<Vec<ClientOutput>> {
            Ok(vec![])
        }
        async fn get_connections(&self, _: &str) -> Result<Vec<ConnectionOutput>> {
            Ok(vec![])
        }
        async fn get_channels(&self, _: &str) -> Result<Vec<ChannelOutput>> {
            Ok(vec![])
        }
        async fn relay(&self, _: &str) -> Result<RelayReport> {
            let pass = self.passes.fetch_add(1, Ordering::SeqCst) + 1;
            if pass % 3 == 0 {
                return Err(anyhow!("rpc timeout"));
            }
            Ok(RelayReport {
                packets_relayed: 1,
                acks_relayed: 0,
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_runs_until_stopped() {
        let relayer = Arc::new(CountingRelayer::default());
        let relay_loop = RelayLoop::spawn(
            "a-b",
            "counting",
            relayer.clone(),
            Duration::from_millis(100),
            Arc::new(SystemClock),
        );

        tokio::time::sleep(Duration::from_millis(550)).await;
        assert!(!relay_loop.is_finished());

        let summary = relay_loop.stop().await.unwrap();
        assert_eq!(summary.passes, relayer.passes.load(Ordering::SeqCst));
        assert!(summary.passes >= 5);
        assert_eq!(summary.failures, summary.passes / 3);
        assert_eq!(
            summary.delivered.packets_relayed as u64,
            summary.passes - summary.failures
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_pass_after_stop() {
        let relayer = Arc::new(CountingRelayer::default());
        let relay_loop = RelayLoop::spawn(
            "a-b",
            "counting",
            relayer.clone(),
            Duration::from_millis(100),
            Arc::new(SystemClock),
        );
        tokio::time::sleep(Duration::from_millis(250)).await;
        relay_loop.stop().await.unwrap();

        let after_stop = relayer.passes.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(relayer.passes.load(Ordering::SeqCst), after_stop);
    }
}
