// File: testing-framework/src/capabilities/mod.rs
//
// Capability Interfaces
//
// The orchestrator never talks to a node binary, a relayer CLI or a container
// engine directly. Each protocol family supplies a `Chain` adapter, each
// relayer implementation a `Relayer` adapter, and the process backend a
// `ProcessRuntime`. The core only coordinates calls to these traits.

/// Chain adapter interface
pub mod chain;
/// Relayer adapter interface
pub mod relayer;
/// Process and network backend interface
pub mod runtime;

pub use chain::Chain;
pub use relayer::Relayer;
pub use runtime::{Label, NetworkId, ProcessGroupId, ProcessGroupSpec, ProcessRuntime};

use std::sync::Arc;

/// Everything an adapter needs to place its processes
///
/// Handed to `Chain::initialize` and `Relayer::initialize` once the shared
/// network exists.
#[derive(Clone)]
pub struct ProcessContext {
    /// Test name, used in process names
    pub test_name: String,
    /// Correlation label every process group must carry
    pub label: Label,
    /// Shared network
    pub network: NetworkId,
    /// Backend to start processes with
    pub runtime: Arc<dyn ProcessRuntime>,
}

impl std::fmt::Debug for ProcessContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessContext")
            .field("test_name", &self.test_name)
            .field("label", &self.label)
            .field("network", &self.network)
            .finish_non_exhaustive()
    }
}
