// File: testing-framework/src/capabilities/chain.rs

use super::ProcessContext;
use crate::config::ChainConfig;
use crate::ibc::{KeyMaterial, ProposalStatus, TransferOptions, Tx, Wallet, WalletAmount};
use anyhow::Result;
use async_trait::async_trait;

/// Key name of the account funded at genesis for test use
pub const FAUCET_KEY_NAME: &str = "faucet";

/// Chain adapter, implemented once per protocol family.
///
/// Query methods are only meaningful after `start` returned; the orchestrator
/// enforces this by refusing to hand out a chain before it is started.
///
/// # Lifecycle
///
/// 1. `initialize`: generate configuration and create (not start) processes
/// 2. `build_wallet`: derive keys that must be funded in genesis
/// 3. `start`: write genesis, start validators and full nodes
/// 4. queries and transactions
/// 5. `teardown`: stop and remove the chain's processes
///
/// # Example
///
/// ```rust,ignore
/// use interchain_testing_framework::capabilities::Chain;
///
/// async fn print_height(chain: &dyn Chain) -> anyhow::Result<()> {
///     let height = chain.height().await?;
///     println!("{} at height {}", chain.config().name, height);
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait Chain: Send + Sync {
    /// Static descriptor
    fn config(&self) -> &ChainConfig;

    /// Prepare configuration and processes on the shared network
    async fn initialize(&self, ctx: &ProcessContext) -> Result<()>;

    /// Start the chain with the given genesis balances
    async fn start(
        &self,
        validator_funds: &[WalletAmount],
        full_node_funds: &[WalletAmount],
    ) -> Result<()>;

    /// RPC endpoint reachable from inside the shared network
    fn rpc_address(&self) -> String;

    /// gRPC endpoint reachable from inside the shared network
    fn grpc_address(&self) -> String;

    /// Latest block height
    async fn height(&self) -> Result<u64>;

    /// Balance of `address` in `denom`
    async fn get_balance(&self, address: &str, denom: &str) -> Result<u128>;

    /// Derive a wallet from `key` and add it to the keyring as `key_name`
    async fn build_wallet(&self, key_name: &str, key: &KeyMaterial) -> Result<Wallet>;

    /// Bank send from `key_name`
    async fn send_funds(&self, key_name: &str, amount: &WalletAmount) -> Result<()>;

    /// ICS-20 transfer from `key_name` over `channel_id`
    async fn send_ibc_transfer(
        &self,
        channel_id: &str,
        key_name: &str,
        amount: &WalletAmount,
        options: &TransferOptions,
    ) -> Result<Tx>;

    /// Run an arbitrary transaction command signed by `key_name`, returning
    /// the transaction hash
    async fn execute_transaction(&self, key_name: &str, command: &[&str]) -> Result<String>;

    /// Status of a governance proposal
    async fn proposal_status(&self, proposal_id: u64) -> Result<ProposalStatus>;

    /// Stop and remove every process of this chain
    async fn teardown(&self) -> Result<()>;

    /// Key funded at genesis that test helpers may spend from
    fn faucet_key_name(&self) -> &str {
        FAUCET_KEY_NAME
    }
}
