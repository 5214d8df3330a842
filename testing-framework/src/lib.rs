//! # Interchain Testing Framework
//!
//! Orchestration engine for cross-chain (IBC) interoperability tests. A test
//! declares chains, relayers and the links between them; the framework starts
//! every chain on a shared network, configures the relayers, drives each
//! link through the client/connection/channel handshake and tears everything
//! down again, with every wait bounded in blocks rather than seconds.
//!
//! ## Architecture Overview
//!
//! - **Topology**: pure declaration of chains, relayers and links
//! - **Build**: network, concurrent chain startup, relayer configuration,
//!   per-link handshakes
//! - **Handshake**: ordered, idempotent steps confirmed on-chain
//! - **Poller**: block-bounded waits (`wait_for_blocks`, `poll_for_balance`,
//!   `poll_for_proposal_status`)
//! - **Teardown**: relayers, then chains, then the network; best-effort and
//!   label-driven
//!
//! Chains, relayers and the process backend are reached only through the
//! `capabilities` traits. The `local` module implements them in-process.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use interchain_testing_framework::prelude::*;
//!
//! #[tokio::test(start_paused = true)]
//! async fn test_transfer() {
//!     let hub = LocalHub::new();
//!     let mut ic = Interchain::new(hub.runtime());
//!     ic.add_chain(hub.chain(ChainConfig::new(ChainFamily::Cosmos, "gaia", "gaia-1", "uatom")))?
//!         .add_chain(hub.chain(ChainConfig::new(ChainFamily::Cosmos, "osmo", "osmo-1", "uosmo")))?
//!         .add_relayer(hub.relayer(), "rly")?
//!         .add_link("gaia", "osmo", "rly", "gaia-osmo")?;
//!
//!     ic.build(BuildOptions::new("test_transfer")).await?;
//!     ic.start_relaying("gaia-osmo", false).await?;
//!     // ...
//!     ic.close().await?;
//! }
//! ```
//!
//! ## Design Principles
//!
//! 1. **Block-bounded**: budgets count blocks; the clock only paces queries
//! 2. **Deterministic**: clock abstraction + seeded RNG for key material
//! 3. **No orphans**: every resource carries a correlation label

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Core orchestration - provides Clock, RNG, cancellation
pub mod orchestrator;

/// Configuration (framework settings, chain descriptors)
pub mod config;

/// Error taxonomy
pub mod error;

/// IBC value types and denom derivation
pub mod ibc;

/// Chain, relayer and process runtime interfaces
pub mod capabilities;

/// Declarations
pub mod topology;

/// Links and their handshake state
pub mod link;

/// Handshake sequencing
pub mod handshake;

/// Block-bounded polling
pub mod poller;

/// Background relay loop
pub mod relay_loop;

/// Public entry point: build, relaying and teardown
pub mod interchain;

/// Execution reporter and build report artifacts
pub mod reporter;

/// Funded test users
pub mod users;

/// In-process collaborators
pub mod local;

/// Convenient re-exports for common usage
pub mod prelude;

// Re-export commonly used types at crate root
pub use error::{InterchainError, Result};
pub use interchain::{BuildOptions, Interchain};
pub use orchestrator::{Clock, PausedClock, SystemClock, TestRng};

/// Framework version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
