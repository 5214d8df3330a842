// File: testing-framework/src/prelude.rs
//
// Common imports for interchain tests:
//
//     use interchain_testing_framework::prelude::*;

pub use crate::capabilities::{
    Chain, Label, NetworkId, ProcessContext, ProcessGroupId, ProcessGroupSpec, ProcessRuntime,
    Relayer,
};
pub use crate::config::{ChainConfig, ChainFamily, DockerImage, InterchainConfig};
pub use crate::error::{Budget, DeclarationError, HandshakeStep, InterchainError, Result};
pub use crate::handshake::HandshakeSequencer;
pub use crate::ibc::denom::{ibc_denom, prefixed_denom, transferred_denom, DenomTrace};
pub use crate::ibc::{
    ChannelOptions, ClientOptions, KeyMaterial, Order, ProposalStatus, TransferOptions, Tx,
    Wallet, WalletAmount,
};
pub use crate::interchain::{sweep_label, BuildOptions, Interchain, Phase};
pub use crate::link::{ChannelPair, Link, LinkState};
pub use crate::local::{LocalChain, LocalHub, LocalRelayer, LocalRuntime};
pub use crate::orchestrator::{CancelSignal, Clock, PausedClock, SystemClock, TestRng};
pub use crate::poller::{
    poll_for_balance, poll_for_balance_matching, poll_for_proposal_status, poll_until,
    wait_for_blocks, wait_for_blocks_all, HeightBound, PollRequest, PollSettings,
};
pub use crate::topology::{LinkSpec, Topology};
pub use crate::users::{fund_test_user, fund_test_users};

pub use std::sync::Arc;
pub use tokio::time::Duration;
