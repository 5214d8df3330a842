// File: testing-framework/src/local/mod.rs
//
// In-process collaborators
//
// Deterministic stand-ins for chain adapters, a relayer and a process
// runtime. Nothing is spawned: chains are ledgers whose height advances by one
// on every height query, the relayer writes handshake artifacts straight into
// chain state (visible after a configurable number of blocks), and the runtime
// only keeps a table of networks and process groups.
//
// Every collaborator call is appended to a shared `CallLog`, so tests can
// assert on ordering across components.

/// Ledger-backed chain
pub mod chain;
/// Relayer writing into `LocalChain` state
pub mod relayer;
/// Table-backed process runtime
pub mod runtime;

pub use chain::LocalChain;
pub use relayer::LocalRelayer;
pub use runtime::LocalRuntime;

use crate::capabilities::Chain;
use crate::config::ChainConfig;
use indexmap::IndexMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// One recorded collaborator call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    /// Who was called (`runtime`, `chain:gaia`, `relayer:relayer-0`)
    pub actor: String,
    /// Method name
    pub action: String,
    /// Main argument, if any
    pub target: String,
}

/// Append-only log of collaborator calls, shared by a hub
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    calls: Arc<Mutex<Vec<Call>>>,
}

impl CallLog {
    /// Empty log
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a call
    pub fn record(&self, actor: impl Into<String>, action: impl Into<String>, target: impl Into<String>) {
        self.calls.lock().push(Call {
            actor: actor.into(),
            action: action.into(),
            target: target.into(),
        });
    }

    /// Snapshot of every call so far
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    /// Indices of calls matching `predicate`
    pub fn positions(&self, predicate: impl Fn(&Call) -> bool) -> Vec<usize> {
        self.calls
            .lock()
            .iter()
            .enumerate()
            .filter(|(_, call)| predicate(call))
            .map(|(i, _)| i)
            .collect()
    }

    /// Number of calls with `action`
    pub fn count(&self, action: &str) -> usize {
        self.calls.lock().iter().filter(|c| c.action == action).count()
    }
}

/// Factory wiring local chains, relayers and one runtime to a shared log
///
/// # Example
///
/// ```rust
/// use interchain_testing_framework::capabilities::Chain;
/// use interchain_testing_framework::config::{ChainConfig, ChainFamily};
/// use interchain_testing_framework::local::LocalHub;
///
/// let hub = LocalHub::new();
/// let gaia = hub.chain(ChainConfig::new(ChainFamily::Cosmos, "gaia", "gaia-1", "uatom"));
/// let relayer = hub.relayer();
/// assert_eq!(gaia.config().chain_id, "gaia-1");
/// assert_eq!(relayer.name(), "relayer-0");
/// ```
#[derive(Clone)]
pub struct LocalHub {
    log: CallLog,
    runtime: Arc<LocalRuntime>,
    chains: Arc<Mutex<IndexMap<String, Arc<LocalChain>>>>,
    relayer_count: Arc<AtomicUsize>,
}

impl LocalHub {
    /// Hub with a fresh log and runtime
    pub fn new() -> Self {
        let log = CallLog::new();
        Self {
            runtime: Arc::new(LocalRuntime::new(log.clone())),
            log,
            chains: Arc::new(Mutex::new(IndexMap::new())),
            relayer_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Shared call log
    pub fn log(&self) -> &CallLog {
        &self.log
    }

    /// Shared runtime
    pub fn runtime(&self) -> Arc<LocalRuntime> {
        self.runtime.clone()
    }

    /// New chain registered under its chain id
    pub fn chain(&self, config: ChainConfig) -> Arc<LocalChain> {
        let chain = Arc::new(LocalChain::new(config, self.log.clone()));
        self.chains
            .lock()
            .insert(chain.config().chain_id.clone(), chain.clone());
        chain
    }

    /// New relayer named `relayer-<n>`
    pub fn relayer(&self) -> Arc<LocalRelayer> {
        let n = self.relayer_count.fetch_add(1, Ordering::SeqCst);
        Arc::new(LocalRelayer::new(format!("relayer-{}", n), self.clone()))
    }

    /// Chain by chain id
    pub fn chain_by_id(&self, chain_id: &str) -> Option<Arc<LocalChain>> {
        self.chains.lock().get(chain_id).cloned()
    }
}

impl Default for LocalHub {
    fn default() -> Self {
        Self::new()
    }
}
