// File: testing-framework/src/users.rs
//
// Funded test users
//
// Fresh keys funded from each chain's faucet, ready to sign transactions.

use crate::capabilities::Chain;
use crate::error::{InterchainError, Result};
use crate::ibc::{KeyMaterial, Wallet, WalletAmount};
use crate::orchestrator::TestRng;
use crate::poller::{wait_for_blocks_all, HeightBound, PollSettings};
use anyhow::Context;
use log::info;

/// Blocks waited after funding so balances are queryable everywhere
pub const FUNDING_SETTLE_BLOCKS: u64 = 2;

/// Create a key on `chain` and fund it with `amount` of the native denom
///
/// Does not wait for the funding transaction to be included.
pub async fn fund_test_user<C: Chain + ?Sized>(
    chain: &C,
    rng: &TestRng,
    key_prefix: &str,
    amount: u128,
) -> Result<Wallet> {
    let config = chain.config();
    let key_name = format!("{}-{}-{}", key_prefix, config.name, rng.hex_string(3));
    let wallet = chain
        .build_wallet(&key_name, &KeyMaterial::generate(rng))
        .await
        .with_context(|| format!("Failed to create key {} on {}", key_name, config.name))?;

    chain
        .send_funds(
            chain.faucet_key_name(),
            &WalletAmount::new(wallet.address.clone(), config.denom.clone(), amount),
        )
        .await
        .with_context(|| format!("Failed to fund {} on {}", wallet.address, config.name))?;

    info!("funded {} ({}) with {}{}", key_name, wallet.address, amount, config.denom);
    Ok(wallet)
}

/// One funded user per chain, in the order of `chains`
///
/// Waits [`FUNDING_SETTLE_BLOCKS`] on every chain before returning.
pub async fn fund_test_users(
    chains: &[&dyn Chain],
    rng: &TestRng,
    key_prefix: &str,
    amount: u128,
    settings: &PollSettings,
) -> Result<Vec<Wallet>> {
    if chains.is_empty() {
        return Err(InterchainError::Collaborator(anyhow::anyhow!(
            "fund_test_users needs at least one chain"
        )));
    }

    let mut users = Vec::with_capacity(chains.len());
    for chain in chains {
        users.push(fund_test_user(*chain, rng, key_prefix, amount).await?);
    }
    wait_for_blocks_all(chains, FUNDING_SETTLE_BLOCKS, HeightBound::Slowest, settings).await?;
    Ok(users)
}
