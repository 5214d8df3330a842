// File: testing-framework/src/local/chain.rs

use super::CallLog;
use crate::capabilities::{Chain, ProcessContext, ProcessGroupId, ProcessGroupSpec};
use crate::config::ChainConfig;
use crate::ibc::denom::DenomTrace;
use crate::ibc::{
    ChannelOutput, ClientOutput, ConnectionOutput, EndState, KeyMaterial, Packet, ProposalStatus,
    TransferOptions, Tx, Wallet, WalletAmount,
};
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use tokio::time::Duration;

/// Native balance of the faucet account at genesis
pub const FAUCET_GENESIS_AMOUNT: u128 = 100_000_000_000_000;

const GAS_PER_TX: u64 = 80_000;

/// ICS-20 packet payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct FungibleTokenPacketData {
    pub denom: String,
    pub amount: String,
    pub sender: String,
    pub receiver: String,
    #[serde(default)]
    pub memo: String,
}

#[derive(Debug, Clone)]
struct Visible<T> {
    from_height: u64,
    value: T,
}

#[derive(Default)]
struct Knobs {
    halted: bool,
    height_failures: u32,
    start_delay: Duration,
    fail_initialize: Option<String>,
    fail_start: Option<String>,
    fail_teardown: Option<String>,
}

#[derive(Default)]
struct State {
    height: u64,
    knobs: Knobs,
    context: Option<ProcessContext>,
    group: Option<ProcessGroupId>,
    started: bool,
    torn_down: bool,
    keyring: IndexMap<String, Wallet>,
    balances: HashMap<(String, String), u128>,
    traces: HashMap<String, DenomTrace>,
    clients: Vec<Visible<ClientOutput>>,
    connections: Vec<Visible<ConnectionOutput>>,
    channels: Vec<Visible<ChannelOutput>>,
    id_counters: HashMap<&'static str, u64>,
    outbound: Vec<Packet>,
    sequences: HashMap<String, u64>,
    proposals: HashMap<u64, Vec<(u64, ProposalStatus)>>,
    tx_count: u64,
}

impl State {
    fn balance_mut(&mut self, address: &str, denom: &str) -> &mut u128 {
        self.balances
            .entry((address.to_string(), denom.to_string()))
            .or_insert(0)
    }

    fn debit(&mut self, address: &str, denom: &str, amount: u128) -> Result<()> {
        let balance = self.balance_mut(address, denom);
        if *balance < amount {
            bail!(
                "insufficient funds: {} has {}{}, needs {}{}",
                address,
                balance,
                denom,
                amount,
                denom
            );
        }
        *balance -= amount;
        Ok(())
    }

    fn credit(&mut self, address: &str, denom: &str, amount: u128) {
        *self.balance_mut(address, denom) += amount;
    }

    fn open_channel(&self, channel_id: &str) -> Option<&ChannelOutput> {
        self.channels
            .iter()
            .filter(|c| c.from_height <= self.height)
            .map(|c| &c.value)
            .find(|c| c.channel_id == channel_id && c.state == EndState::Open)
    }

    fn next_tx_hash(&mut self, chain_id: &str) -> String {
        self.tx_count += 1;
        let digest = Sha256::digest(format!("{}/{}", chain_id, self.tx_count).as_bytes());
        hex::encode_upper(digest)
    }
}

fn escrow_address(port_id: &str, channel_id: &str) -> String {
    format!("escrow/{}/{}", port_id, channel_id)
}

/// Chain whose height advances by one block on every `height()` query
///
/// Balances, keys and IBC artifacts live in memory. Failure knobs make it
/// fail or stall at specific lifecycle points.
pub struct LocalChain {
    config: ChainConfig,
    log: CallLog,
    state: Mutex<State>,
}

impl LocalChain {
    pub(crate) fn new(config: ChainConfig, log: CallLog) -> Self {
        let state = State {
            height: 1,
            ..State::default()
        };
        Self {
            config,
            log,
            state: Mutex::new(state),
        }
    }

    fn actor(&self) -> String {
        format!("chain:{}", self.config.name)
    }

    fn derive_address(&self, seed: &str) -> String {
        let prefix = if self.config.bech32_prefix.is_empty() {
            self.config.name.as_str()
        } else {
            self.config.bech32_prefix.as_str()
        };
        let digest = Sha256::digest(format!("{}/{}", self.config.chain_id, seed).as_bytes());
        format!("{}1{}", prefix, &hex::encode(digest)[..38])
    }

    /// Stop (or resume) block production
    pub fn set_halted(&self, halted: bool) {
        self.state.lock().knobs.halted = halted;
    }

    /// Fail the next `count` height queries
    pub fn fail_height_queries(&self, count: u32) {
        self.state.lock().knobs.height_failures = count;
    }

    /// Wait this long inside `start` before starting processes
    pub fn set_start_delay(&self, delay: Duration) {
        self.state.lock().knobs.start_delay = delay;
    }

    /// Make `initialize` fail
    pub fn fail_initialize(&self, message: impl Into<String>) {
        self.state.lock().knobs.fail_initialize = Some(message.into());
    }

    /// Make `start` fail after its processes were started
    pub fn fail_start(&self, message: impl Into<String>) {
        self.state.lock().knobs.fail_start = Some(message.into());
    }

    /// Make `teardown` fail before removing its processes
    pub fn fail_teardown(&self, message: impl Into<String>) {
        self.state.lock().knobs.fail_teardown = Some(message.into());
    }

    /// Status changes of a proposal: `(height, status)` pairs in height order
    pub fn schedule_proposal(&self, proposal_id: u64, schedule: Vec<(u64, ProposalStatus)>) {
        self.state.lock().proposals.insert(proposal_id, schedule);
    }

    /// Height without producing a block
    pub fn current_height(&self) -> u64 {
        self.state.lock().height
    }

    /// Whether `start` completed
    pub fn is_started(&self) -> bool {
        self.state.lock().started
    }

    /// Keyring entry
    pub fn wallet(&self, key_name: &str) -> Option<Wallet> {
        self.state.lock().keyring.get(key_name).cloned()
    }

    /// Packets sent and not yet relayed
    pub fn pending_packets(&self) -> Vec<Packet> {
        self.state.lock().outbound.clone()
    }

    pub(crate) fn allocate_id(&self, kind: &'static str) -> String {
        let mut state = self.state.lock();
        let counter = state.id_counters.entry(kind).or_insert(0);
        let id = format!("{}-{}", kind, counter);
        *counter += 1;
        id
    }

    pub(crate) fn push_client(&self, client: ClientOutput, delay: u64) {
        let mut state = self.state.lock();
        let from_height = state.height + delay;
        state.clients.push(Visible {
            from_height,
            value: client,
        });
    }

    pub(crate) fn push_connection(&self, connection: ConnectionOutput, delay: u64) {
        let mut state = self.state.lock();
        let from_height = state.height + delay;
        state.connections.push(Visible {
            from_height,
            value: connection,
        });
    }

    pub(crate) fn push_channel(&self, channel: ChannelOutput, delay: u64) {
        let mut state = self.state.lock();
        let from_height = state.height + delay;
        state.channels.push(Visible {
            from_height,
            value: channel,
        });
    }

    pub(crate) fn visible_clients(&self) -> Vec<ClientOutput> {
        let state = self.state.lock();
        visible(&state.clients, state.height)
    }

    pub(crate) fn visible_connections(&self) -> Vec<ConnectionOutput> {
        let state = self.state.lock();
        visible(&state.connections, state.height)
    }

    pub(crate) fn visible_channels(&self) -> Vec<ChannelOutput> {
        let state = self.state.lock();
        visible(&state.channels, state.height)
    }

    pub(crate) fn take_outbound(&self, channel_id: &str) -> Vec<Packet> {
        let mut state = self.state.lock();
        let (matching, rest) = std::mem::take(&mut state.outbound)
            .into_iter()
            .partition(|p| p.source_channel == channel_id);
        state.outbound = rest;
        matching
    }

    /// Apply a received transfer packet: unescrow a returning token, mint a
    /// voucher otherwise
    pub(crate) fn receive_transfer(&self, packet: &Packet) -> Result<()> {
        let data: FungibleTokenPacketData =
            serde_json::from_slice(&packet.data).context("Malformed transfer packet")?;
        let amount: u128 = data
            .amount
            .parse()
            .with_context(|| format!("Invalid packet amount '{}'", data.amount))?;

        let sent = DenomTrace::parse(&data.denom);
        let received = sent.received_over(
            &packet.source_port,
            &packet.source_channel,
            &packet.dest_port,
            &packet.dest_channel,
        );
        let denom = received.ibc_denom();
        let returning = received.path.len() < sent.path.len();

        let mut state = self.state.lock();
        if returning {
            let escrow = escrow_address(&packet.dest_port, &packet.dest_channel);
            state.debit(&escrow, &denom, amount)?;
        } else if !received.is_native() {
            state.traces.insert(denom.clone(), received);
        }
        state.credit(&data.receiver, &denom, amount);
        Ok(())
    }
}

fn visible<T: Clone>(items: &[Visible<T>], height: u64) -> Vec<T> {
    items
        .iter()
        .filter(|item| item.from_height <= height)
        .map(|item| item.value.clone())
        .collect()
}

#[async_trait]
impl Chain for LocalChain {
    fn config(&self) -> &ChainConfig {
        &self.config
    }

    async fn initialize(&self, ctx: &ProcessContext) -> Result<()> {
        self.log.record(self.actor(), "initialize", ctx.network.0.clone());
        let mut state = self.state.lock();
        if let Some(message) = &state.knobs.fail_initialize {
            bail!("{}", message);
        }
        state.context = Some(ctx.clone());
        Ok(())
    }

    async fn start(
        &self,
        validator_funds: &[WalletAmount],
        full_node_funds: &[WalletAmount],
    ) -> Result<()> {
        self.log.record(self.actor(), "start", "");
        let (ctx, delay) = {
            let state = self.state.lock();
            let ctx = state
                .context
                .clone()
                .ok_or_else(|| anyhow!("{} started before initialize", self.config.name))?;
            (ctx, state.knobs.start_delay)
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let spec = ProcessGroupSpec::new(
            format!("{}-{}", ctx.test_name, self.config.name),
            ctx.network.clone(),
            &ctx.label,
            self.config.num_validators + self.config.num_full_nodes,
        )
        .with_command([self.config.bin.as_str(), "start"]);
        let spec = match self.config.images.first() {
            Some(image) => spec.with_image(image.clone()),
            None => spec,
        };
        let group = ctx.runtime.start_process_group(&spec).await?;

        let faucet_seed = format!("{}-faucet", self.config.chain_id);
        let faucet = Wallet {
            key_name: self.faucet_key_name().to_string(),
            address: self.derive_address(&faucet_seed),
            key: KeyMaterial {
                seed_hex: hex::encode(faucet_seed.as_bytes()),
            },
        };

        let mut state = self.state.lock();
        state.group = Some(group);
        if let Some(message) = &state.knobs.fail_start {
            bail!("{}", message);
        }

        let native = self.config.denom.clone();
        state.credit(&faucet.address, &native, FAUCET_GENESIS_AMOUNT);
        state.keyring.insert(faucet.key_name.clone(), faucet);
        for funds in validator_funds.iter().chain(full_node_funds) {
            state.credit(&funds.address, &funds.denom, funds.amount);
        }
        state.started = true;
        Ok(())
    }

    fn rpc_address(&self) -> String {
        format!("http://{}-val-0:26657", self.config.name)
    }

    fn grpc_address(&self) -> String {
        format!("{}-val-0:9090", self.config.name)
    }

    async fn height(&self) -> Result<u64> {
        let mut state = self.state.lock();
        if state.torn_down {
            bail!("{} is torn down", self.config.name);
        }
        if state.knobs.height_failures > 0 {
            state.knobs.height_failures -= 1;
            bail!("{} rpc unavailable", self.config.name);
        }
        if !state.knobs.halted {
            state.height += 1;
        }
        Ok(state.height)
    }

    async fn get_balance(&self, address: &str, denom: &str) -> Result<u128> {
        let state = self.state.lock();
        Ok(state
            .balances
            .get(&(address.to_string(), denom.to_string()))
            .copied()
            .unwrap_or(0))
    }

    async fn build_wallet(&self, key_name: &str, key: &KeyMaterial) -> Result<Wallet> {
        self.log.record(self.actor(), "build_wallet", key_name);
        let wallet = Wallet {
            key_name: key_name.to_string(),
            address: self.derive_address(&key.seed_hex),
            key: key.clone(),
        };
        let mut state = self.state.lock();
        if state.keyring.contains_key(key_name) {
            bail!("key '{}' already exists on {}", key_name, self.config.name);
        }
        state.keyring.insert(key_name.to_string(), wallet.clone());
        Ok(wallet)
    }

    async fn send_funds(&self, key_name: &str, amount: &WalletAmount) -> Result<()> {
        let mut state = self.state.lock();
        let sender = state
            .keyring
            .get(key_name)
            .map(|w| w.address.clone())
            .ok_or_else(|| anyhow!("unknown key '{}' on {}", key_name, self.config.name))?;
        state.debit(&sender, &amount.denom, amount.amount)?;
        state.credit(&amount.address, &amount.denom, amount.amount);
        state.next_tx_hash(&self.config.chain_id);
        Ok(())
    }

    async fn send_ibc_transfer(
        &self,
        channel_id: &str,
        key_name: &str,
        amount: &WalletAmount,
        options: &TransferOptions,
    ) -> Result<Tx> {
        let mut state = self.state.lock();
        let sender = state
            .keyring
            .get(key_name)
            .map(|w| w.address.clone())
            .ok_or_else(|| anyhow!("unknown key '{}' on {}", key_name, self.config.name))?;
        let channel = state
            .open_channel(channel_id)
            .cloned()
            .ok_or_else(|| anyhow!("no open channel {} on {}", channel_id, self.config.name))?;

        let trace = state
            .traces
            .get(&amount.denom)
            .cloned()
            .unwrap_or_else(|| DenomTrace::native(amount.denom.clone()));

        state.debit(&sender, &amount.denom, amount.amount)?;
        let source_prefix = format!("{}/{}", channel.port_id, channel.channel_id);
        let returning = trace.path == source_prefix
            || trace.path.starts_with(&format!("{}/", source_prefix));
        if !returning {
            state.credit(
                &escrow_address(&channel.port_id, &channel.channel_id),
                &amount.denom,
                amount.amount,
            );
        }

        let data = FungibleTokenPacketData {
            denom: trace.to_string(),
            amount: amount.amount.to_string(),
            sender,
            receiver: amount.address.clone(),
            memo: options.memo.clone().unwrap_or_default(),
        };
        let sequence = {
            let next = state.sequences.entry(channel.channel_id.clone()).or_insert(0);
            *next += 1;
            *next
        };
        let packet = Packet {
            sequence,
            source_port: channel.port_id.clone(),
            source_channel: channel.channel_id.clone(),
            dest_port: channel.counterparty.port_id.clone(),
            dest_channel: channel.counterparty.channel_id.clone(),
            data: serde_json::to_vec(&data)?,
            timeout_height: options.timeout_height.unwrap_or(0),
            timeout_timestamp: options.timeout_timestamp.unwrap_or(0),
        };
        state.outbound.push(packet.clone());

        let tx_hash = state.next_tx_hash(&self.config.chain_id);
        Ok(Tx {
            height: state.height,
            tx_hash,
            gas_spent: GAS_PER_TX,
            packet: Some(packet),
        })
    }

    async fn execute_transaction(&self, key_name: &str, command: &[&str]) -> Result<String> {
        self.log.record(self.actor(), "execute_transaction", command.join(" "));
        let mut state = self.state.lock();
        if !state.keyring.contains_key(key_name) {
            bail!("unknown key '{}' on {}", key_name, self.config.name);
        }
        Ok(state.next_tx_hash(&self.config.chain_id))
    }

    async fn proposal_status(&self, proposal_id: u64) -> Result<ProposalStatus> {
        let state = self.state.lock();
        let schedule = state
            .proposals
            .get(&proposal_id)
            .ok_or_else(|| anyhow!("proposal {} not found", proposal_id))?;
        schedule
            .iter()
            .rev()
            .find(|(height, _)| *height <= state.height)
            .map(|(_, status)| *status)
            .ok_or_else(|| anyhow!("proposal {} not submitted yet", proposal_id))
    }

    async fn teardown(&self) -> Result<()> {
        self.log.record(self.actor(), "teardown", "");
        let (ctx, group) = {
            let mut state = self.state.lock();
            if let Some(message) = &state.knobs.fail_teardown {
                bail!("{}", message);
            }
            state.torn_down = true;
            (state.context.clone(), state.group.take())
        };

        if let (Some(ctx), Some(group)) = (ctx, group) {
            ctx.runtime.stop_process_group(&group).await?;
            ctx.runtime.remove_process_group(&group).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain() -> LocalChain {
        LocalChain::new(
            ChainConfig::new(crate::config::ChainFamily::Cosmos, "gaia", "gaia-1", "uatom")
                .with_bech32_prefix("cosmos"),
            CallLog::new(),
        )
    }

    #[tokio::test]
    async fn test_height_advances_per_query() {
        let chain = chain();
        assert_eq!(chain.height().await.unwrap(), 2);
        assert_eq!(chain.height().await.unwrap(), 3);

        chain.set_halted(true);
        assert_eq!(chain.height().await.unwrap(), 3);

        chain.fail_height_queries(1);
        assert!(chain.height().await.is_err());
        assert_eq!(chain.height().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_wallets_are_deterministic() {
        let chain = chain();
        let key = KeyMaterial {
            seed_hex: "ab".repeat(32),
        };
        let wallet = chain.build_wallet("user", &key).await.unwrap();
        assert!(wallet.address.starts_with("cosmos1"));
        assert_eq!(wallet.address.len(), "cosmos1".len() + 38);
        assert_eq!(chain.derive_address(&key.seed_hex), wallet.address);
        assert!(chain.build_wallet("user", &key).await.is_err());
    }

    #[tokio::test]
    async fn test_proposal_schedule() {
        let chain = chain();
        chain.schedule_proposal(
            1,
            vec![(1, ProposalStatus::VotingPeriod), (4, ProposalStatus::Passed)],
        );
        assert_eq!(chain.proposal_status(1).await.unwrap(), ProposalStatus::VotingPeriod);
        chain.height().await.unwrap();
        chain.height().await.unwrap();
        chain.height().await.unwrap();
        assert_eq!(chain.proposal_status(1).await.unwrap(), ProposalStatus::Passed);
        assert!(chain.proposal_status(2).await.is_err());
    }
}
