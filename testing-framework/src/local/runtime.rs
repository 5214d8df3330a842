// File: testing-framework/src/local/runtime.rs

use super::CallLog;
use crate::capabilities::{Label, NetworkId, ProcessGroupId, ProcessGroupSpec, ProcessRuntime};
use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use indexmap::IndexMap;
use parking_lot::Mutex;

#[derive(Debug)]
struct Group {
    spec: ProcessGroupSpec,
    running: bool,
}

#[derive(Debug, Default)]
struct State {
    networks: IndexMap<NetworkId, Label>,
    groups: IndexMap<ProcessGroupId, Group>,
    next_id: u64,
    fail_create_network: bool,
    fail_stop: Option<String>,
}

/// Process runtime that only tracks what would be running
pub struct LocalRuntime {
    log: CallLog,
    state: Mutex<State>,
}

impl LocalRuntime {
    /// Runtime recording into `log`
    pub fn new(log: CallLog) -> Self {
        Self {
            log,
            state: Mutex::new(State::default()),
        }
    }

    /// Make `create_network` fail
    pub fn fail_create_network(&self, fail: bool) {
        self.state.lock().fail_create_network = fail;
    }

    /// Make `stop_process_group` report `reason` after the group exited,
    /// as a daemon does for a container that was already gone
    pub fn fail_stop(&self, reason: impl Into<String>) {
        self.state.lock().fail_stop = Some(reason.into());
    }

    /// Names of process groups that exist (running or stopped)
    pub fn group_names(&self) -> Vec<String> {
        self.state
            .lock()
            .groups
            .values()
            .map(|g| g.spec.name.clone())
            .collect()
    }

    /// Names of process groups that are running
    pub fn running_groups(&self) -> Vec<String> {
        self.state
            .lock()
            .groups
            .values()
            .filter(|g| g.running)
            .map(|g| g.spec.name.clone())
            .collect()
    }

    /// Number of existing networks
    pub fn network_count(&self) -> usize {
        self.state.lock().networks.len()
    }
}

#[async_trait]
impl ProcessRuntime for LocalRuntime {
    async fn create_network(&self, label: &Label) -> Result<NetworkId> {
        let mut state = self.state.lock();
        if state.fail_create_network {
            bail!("network driver unavailable");
        }
        state.next_id += 1;
        let id = NetworkId(format!("net-{}", state.next_id));
        state.networks.insert(id.clone(), label.clone());
        self.log.record("runtime", "create_network", id.0.clone());
        Ok(id)
    }

    async fn remove_network(&self, network: &NetworkId) -> Result<()> {
        let mut state = self.state.lock();
        let attached = state
            .groups
            .values()
            .filter(|g| &g.spec.network == network)
            .count();
        if attached > 0 {
            bail!("network {} still has {} attached group(s)", network, attached);
        }
        state
            .networks
            .shift_remove(network)
            .ok_or_else(|| anyhow!("no such network {}", network))?;
        self.log.record("runtime", "remove_network", network.0.clone());
        Ok(())
    }

    async fn start_process_group(&self, spec: &ProcessGroupSpec) -> Result<ProcessGroupId> {
        let mut state = self.state.lock();
        if !state.networks.contains_key(&spec.network) {
            bail!("no such network {}", spec.network);
        }
        state.next_id += 1;
        let id = ProcessGroupId(format!("{}-{}", spec.name, state.next_id));
        state.groups.insert(
            id.clone(),
            Group {
                spec: spec.clone(),
                running: true,
            },
        );
        self.log.record("runtime", "start_process_group", spec.name.clone());
        Ok(id)
    }

    async fn stop_process_group(&self, id: &ProcessGroupId) -> Result<()> {
        let mut state = self.state.lock();
        let group = state
            .groups
            .get_mut(id)
            .ok_or_else(|| anyhow!("no such process group {}", id))?;
        group.running = false;
        let name = group.spec.name.clone();
        self.log.record("runtime", "stop_process_group", name);
        match &state.fail_stop {
            Some(reason) => bail!("stopping {}: {}", id, reason),
            None => Ok(()),
        }
    }

    async fn remove_process_group(&self, id: &ProcessGroupId) -> Result<()> {
        let mut state = self.state.lock();
        match state.groups.get(id) {
            None => bail!("no such process group {}", id),
            Some(group) if group.running => bail!("process group {} is still running", id),
            Some(_) => {}
        }
        if let Some(group) = state.groups.shift_remove(id) {
            self.log.record("runtime", "remove_process_group", group.spec.name);
        }
        Ok(())
    }

    async fn labeled_process_groups(&self, label: &Label) -> Result<Vec<ProcessGroupId>> {
        Ok(self
            .state
            .lock()
            .groups
            .iter()
            .filter(|(_, g)| g.spec.has_label(label))
            .map(|(id, _)| id.clone())
            .collect())
    }

    async fn labeled_networks(&self, label: &Label) -> Result<Vec<NetworkId>> {
        Ok(self
            .state
            .lock()
            .networks
            .iter()
            .filter(|(_, l)| *l == label)
            .map(|(id, _)| id.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    #[tokio::test]
    async fn test_group_lifecycle_and_labels() {
        let log = CallLog::new();
        let runtime = LocalRuntime::new(log.clone());
        let label = Label::new("interchain-test", "lifecycle");
        let other = Label::new("interchain-test", "someone-else");

        let net = runtime.create_network(&label).await.unwrap();
        let spec = ProcessGroupSpec::new("gaia", net.clone(), &label, 2);
        let id = runtime.start_process_group(&spec).await.unwrap();

        assert_eq!(runtime.labeled_process_groups(&label).await.unwrap(), vec![id.clone()]);
        assert!(runtime.labeled_process_groups(&other).await.unwrap().is_empty());

        // Running groups cannot be removed, attached networks cannot be removed
        assert_err!(runtime.remove_process_group(&id).await);
        assert_err!(runtime.remove_network(&net).await);

        assert_ok!(runtime.stop_process_group(&id).await);
        assert_ok!(runtime.stop_process_group(&id).await);
        assert_ok!(runtime.remove_process_group(&id).await);
        assert_ok!(runtime.remove_network(&net).await);
        assert_err!(runtime.remove_process_group(&id).await);

        assert_eq!(runtime.network_count(), 0);
        assert_eq!(log.count("remove_process_group"), 1);
    }
}
