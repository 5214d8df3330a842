// File: testing-framework/src/capabilities/runtime.rs

use crate::config::DockerImage;
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Correlation label attached to every resource of one topology
///
/// Teardown finds resources by label, so cleanup still works when the
/// in-memory topology is gone.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Label {
    /// Label key
    pub key: String,
    /// Label value, usually the test name
    pub value: String,
}

impl Label {
    /// Create a label
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.key, self.value)
    }
}

/// Identifier of a network created by the runtime
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NetworkId(pub String);

impl fmt::Display for NetworkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a started process group
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProcessGroupId(pub String);

impl fmt::Display for ProcessGroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A set of identical processes started together (a chain's validators, a
/// relayer)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessGroupSpec {
    /// Group name, unique per topology
    pub name: String,
    /// Image to run, if the runtime is container based
    pub image: Option<DockerImage>,
    /// Entrypoint and arguments
    pub command: Vec<String>,
    /// Environment
    pub env: BTreeMap<String, String>,
    /// Number of processes
    pub replicas: usize,
    /// Network to attach to
    pub network: NetworkId,
    /// Labels; must include the topology's correlation label
    pub labels: BTreeMap<String, String>,
}

impl ProcessGroupSpec {
    /// Group of `replicas` processes on `network`, carrying `label`
    pub fn new(name: impl Into<String>, network: NetworkId, label: &Label, replicas: usize) -> Self {
        let mut labels = BTreeMap::new();
        labels.insert(label.key.clone(), label.value.clone());
        Self {
            name: name.into(),
            image: None,
            command: Vec::new(),
            env: BTreeMap::new(),
            replicas,
            network,
            labels,
        }
    }

    /// Set the image
    pub fn with_image(mut self, image: DockerImage) -> Self {
        self.image = Some(image);
        self
    }

    /// Set the command
    pub fn with_command<I, S>(mut self, command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.command = command.into_iter().map(Into::into).collect();
        self
    }

    /// Whether the group carries `label`
    pub fn has_label(&self, label: &Label) -> bool {
        self.labels.get(&label.key) == Some(&label.value)
    }
}

/// Process and network backend (container engine, local processes, ...)
#[async_trait]
pub trait ProcessRuntime: Send + Sync {
    /// Create a network carrying `label`
    async fn create_network(&self, label: &Label) -> Result<NetworkId>;

    /// Remove a network. Fails if members are still attached.
    async fn remove_network(&self, network: &NetworkId) -> Result<()>;

    /// Start a process group
    async fn start_process_group(&self, spec: &ProcessGroupSpec) -> Result<ProcessGroupId>;

    /// Stop a process group; it can still be inspected
    async fn stop_process_group(&self, id: &ProcessGroupId) -> Result<()>;

    /// Remove a stopped process group
    async fn remove_process_group(&self, id: &ProcessGroupId) -> Result<()>;

    /// Every process group carrying `label`, running or stopped
    async fn labeled_process_groups(&self, label: &Label) -> Result<Vec<ProcessGroupId>>;

    /// Every network carrying `label`
    async fn labeled_networks(&self, label: &Label) -> Result<Vec<NetworkId>>;
}
