// File: testing-framework/src/interchain/teardown.rs
//
// Teardown Coordinator
//
// Strict stage order: relay loops and relayers, then chains, then whatever
// still carries the correlation label, then the network. Every stage runs
// even if an earlier one had problems; problems are collected, not raised.

use crate::capabilities::{Chain, Label, ProcessRuntime, Relayer};
use crate::error::TeardownIssue;
use crate::relay_loop::RelayLoop;
use crate::reporter::ExecReporter;
use log::{info, warn};
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio::time::Instant;

fn issue(component: impl Into<String>, message: impl Into<String>) -> TeardownIssue {
    let issue = TeardownIssue {
        component: component.into(),
        message: message.into(),
    };
    warn!("teardown: {}", issue);
    issue
}

/// Runs the ordered teardown of one topology
pub struct TeardownCoordinator {
    runtime: Arc<dyn ProcessRuntime>,
    label: Label,
    reporter: Arc<ExecReporter>,
    issues: Vec<TeardownIssue>,
}

impl TeardownCoordinator {
    /// Coordinator for the resources carrying `label`
    pub fn new(runtime: Arc<dyn ProcessRuntime>, label: Label, reporter: Arc<ExecReporter>) -> Self {
        Self {
            runtime,
            label,
            reporter,
            issues: Vec::new(),
        }
    }

    fn record(&mut self, component: &str, action: &str, started: Instant, result: anyhow::Result<()>) {
        let failure = result.err().map(|e| format!("{:#}", e));
        self.reporter.record(component, action, started, failure.clone());
        if let Some(message) = failure {
            self.issues.push(issue(component, message));
        }
    }

    /// Tear down, returning every problem encountered
    pub async fn run(
        mut self,
        relay_loops: Vec<RelayLoop>,
        relayers: Vec<(String, Arc<dyn Relayer>)>,
        chains: Vec<(String, Arc<dyn Chain>)>,
    ) -> Vec<TeardownIssue> {
        info!("tearing down resources labeled {}", self.label);

        // Relayers before chains
        for relay_loop in relay_loops {
            let component = format!("relayer:{}", relay_loop.relayer());
            let started = Instant::now();
            let result = relay_loop.stop().await.map(|_| ());
            self.record(&component, "stop-relay-loop", started, result);
        }
        for (name, relayer) in &relayers {
            let started = Instant::now();
            let result = relayer.stop_relaying().await;
            self.record(&format!("relayer:{}", name), "stop-relaying", started, result);
        }

        let mut tasks = JoinSet::new();
        for (name, chain) in chains {
            tasks.spawn(async move {
                let started = Instant::now();
                let result = chain.teardown().await;
                (name, started, result)
            });
        }
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((name, started, result)) => {
                    self.record(&format!("chain:{}", name), "teardown", started, result)
                }
                Err(e) => self.issues.push(issue("chain", format!("teardown task failed: {}", e))),
            }
        }

        let started = Instant::now();
        let swept = sweep_label(self.runtime.as_ref(), &self.label).await;
        self.reporter.record(
            "network",
            "sweep-label",
            started,
            (!swept.is_empty()).then(|| format!("{} problem(s)", swept.len())),
        );
        self.issues.extend(swept);

        if self.issues.is_empty() {
            info!("teardown of {} complete", self.label);
        }
        self.issues
    }
}

/// Stop and remove every process group carrying `label`, then remove every
/// labeled network
///
/// Works from the runtime alone, so it also cleans up after a test whose
/// `Interchain` was lost.
pub async fn sweep_label(runtime: &dyn ProcessRuntime, label: &Label) -> Vec<TeardownIssue> {
    let mut issues = Vec::new();

    match runtime.labeled_process_groups(label).await {
        Ok(groups) => {
            for group in groups {
                let component = format!("process-group:{}", group);
                // A failed stop still gets a removal attempt
                if let Err(e) = runtime.stop_process_group(&group).await {
                    issues.push(issue(&component, format!("stop: {:#}", e)));
                }
                if let Err(e) = runtime.remove_process_group(&group).await {
                    issues.push(issue(&component, format!("remove: {:#}", e)));
                }
            }
        }
        Err(e) => issues.push(issue("runtime", format!("listing process groups: {:#}", e))),
    }

    match runtime.labeled_networks(label).await {
        Ok(networks) => {
            for network in networks {
                if let Err(e) = runtime.remove_network(&network).await {
                    issues.push(issue(format!("network:{}", network), format!("{:#}", e)));
                }
            }
        }
        Err(e) => issues.push(issue("runtime", format!("listing networks: {:#}", e))),
    }

    issues
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::ProcessGroupSpec;
    use crate::local::LocalHub;

    #[tokio::test]
    async fn test_sweep_removes_only_labeled_resources() {
        let hub = LocalHub::new();
        let runtime = hub.runtime();
        let ours = Label::new("interchain-test", "ours");
        let theirs = Label::new("interchain-test", "theirs");

        let net = runtime.create_network(&ours).await.unwrap();
        let other_net = runtime.create_network(&theirs).await.unwrap();
        runtime
            .start_process_group(&ProcessGroupSpec::new("gaia", net.clone(), &ours, 1))
            .await
            .unwrap();
        runtime
            .start_process_group(&ProcessGroupSpec::new("osmo", other_net, &theirs, 1))
            .await
            .unwrap();

        let issues = sweep_label(runtime.as_ref(), &ours).await;
        assert!(issues.is_empty(), "{:?}", issues);
        assert_eq!(runtime.group_names(), vec!["osmo".to_string()]);
        assert_eq!(runtime.network_count(), 1);

        // Nothing left to sweep
        assert!(sweep_label(runtime.as_ref(), &ours).await.is_empty());
    }

    #[tokio::test]
    async fn test_sweep_removes_groups_whose_stop_failed() {
        let hub = LocalHub::new();
        let runtime = hub.runtime();
        let ours = Label::new("interchain-test", "ours");

        let net = runtime.create_network(&ours).await.unwrap();
        for name in ["gaia", "osmo"] {
            runtime
                .start_process_group(&ProcessGroupSpec::new(name, net.clone(), &ours, 1))
                .await
                .unwrap();
        }
        runtime.fail_stop("container already exited");

        let issues = sweep_label(runtime.as_ref(), &ours).await;
        assert_eq!(issues.len(), 2, "{:?}", issues);
        assert!(issues
            .iter()
            .all(|i| i.message.contains("stop") && i.message.contains("already exited")));
        assert!(runtime.group_names().is_empty());
        assert_eq!(runtime.network_count(), 0);
    }
}
