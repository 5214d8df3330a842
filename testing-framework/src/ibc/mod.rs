// File: testing-framework/src/ibc/mod.rs
//
// IBC Value Types
//
// Wire-independent values exchanged between the orchestrator and chain or
// relayer adapters. Adapters translate these to their own CLI/RPC formats.

/// ICS-20 denom trace derivation
pub mod denom;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Amount of one denom held by (or sent to) an address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletAmount {
    /// Bech32 (or family-specific) address
    pub address: String,
    /// Denom
    pub denom: String,
    /// Amount in base units
    pub amount: u128,
}

impl WalletAmount {
    /// Create a new amount
    pub fn new(address: impl Into<String>, denom: impl Into<String>, amount: u128) -> Self {
        Self {
            address: address.into(),
            denom: denom.into(),
            amount,
        }
    }
}

/// Key material generated by the orchestrator
///
/// Adapters derive a chain-specific key from the seed. The orchestrator hands
/// a read-only copy to the relayer; nothing mutates it afterwards.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyMaterial {
    /// Hex-encoded 32-byte seed
    pub seed_hex: String,
}

impl KeyMaterial {
    /// Draw fresh key material from the test RNG
    pub fn generate(rng: &crate::orchestrator::TestRng) -> Self {
        Self {
            seed_hex: rng.hex_string(32),
        }
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterial").field("seed_hex", &"<redacted>").finish()
    }
}

/// A key registered in a chain keyring
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wallet {
    /// Keyring name
    pub key_name: String,
    /// Address derived from the key
    pub address: String,
    /// Material the key was derived from
    pub key: KeyMaterial,
}

/// Result of a submitted transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tx {
    /// Height the transaction was included at
    pub height: u64,
    /// Transaction hash
    pub tx_hash: String,
    /// Gas used
    pub gas_spent: u64,
    /// Packet emitted by the transaction, if any
    pub packet: Option<Packet>,
}

/// An IBC packet as emitted by a send
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Packet {
    /// Sequence number on the source channel
    pub sequence: u64,
    /// Source port
    pub source_port: String,
    /// Source channel
    pub source_channel: String,
    /// Destination port
    pub dest_port: String,
    /// Destination channel
    pub dest_channel: String,
    /// Opaque packet payload
    pub data: Vec<u8>,
    /// Timeout height on the destination (0 = none)
    pub timeout_height: u64,
    /// Timeout timestamp in nanoseconds (0 = none)
    pub timeout_timestamp: u64,
}

/// Light-client trust level as a fraction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustLevel {
    /// Numerator
    pub numerator: u64,
    /// Denominator
    pub denominator: u64,
}

impl TrustLevel {
    /// The common 1/3 trust level
    pub const ONE_THIRD: TrustLevel = TrustLevel {
        numerator: 1,
        denominator: 3,
    };
}

impl fmt::Display for TrustLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator)
    }
}

/// Caller-supplied client options. `None` fields take the family default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientOptions {
    /// Trusting period
    pub trusting_period: Option<Duration>,
    /// Trust level
    pub trust_level: Option<TrustLevel>,
}

/// Client options after family defaults are applied
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedClientOptions {
    /// Trusting period
    pub trusting_period: Duration,
    /// Trust level
    pub trust_level: TrustLevel,
}

impl ClientOptions {
    /// Fill in missing fields from the chain's own settings
    ///
    /// Both chains of a link get a client; the shorter configured trusting
    /// period of the two is used so neither client outlives its chain's
    /// unbonding window.
    pub fn resolve(
        &self,
        chain_a: &crate::config::ChainConfig,
        chain_b: &crate::config::ChainConfig,
    ) -> ResolvedClientOptions {
        let trusting_period = self
            .trusting_period
            .unwrap_or_else(|| chain_a.trusting_period().min(chain_b.trusting_period()));
        let trust_level = self
            .trust_level
            .unwrap_or_else(|| chain_a.family.default_trust_level());
        ResolvedClientOptions {
            trusting_period,
            trust_level,
        }
    }
}

/// Channel ordering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Order {
    /// Packets may be delivered in any order
    Unordered,
    /// Packets are delivered in send order
    Ordered,
}

impl fmt::Display for Order {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unordered => f.write_str("unordered"),
            Self::Ordered => f.write_str("ordered"),
        }
    }
}

/// Port of the ICS-20 fungible token transfer application
pub const TRANSFER_PORT: &str = "transfer";

/// ICS-20 application version
pub const ICS20_VERSION: &str = "ics20-1";

/// Channel-open options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelOptions {
    /// Port on chain A
    pub source_port: String,
    /// Port on chain B
    pub dest_port: String,
    /// Ordering
    pub order: Order,
    /// Application version
    pub version: String,
}

impl Default for ChannelOptions {
    /// Unordered ICS-20 transfer channel
    fn default() -> Self {
        Self {
            source_port: TRANSFER_PORT.to_string(),
            dest_port: TRANSFER_PORT.to_string(),
            order: Order::Unordered,
            version: ICS20_VERSION.to_string(),
        }
    }
}

/// Options for an ICS-20 transfer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferOptions {
    /// Timeout height on the destination chain
    pub timeout_height: Option<u64>,
    /// Timeout timestamp in nanoseconds
    pub timeout_timestamp: Option<u64>,
    /// Transfer memo
    pub memo: Option<String>,
}

/// Handshake state of a connection or channel end
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EndState {
    /// Init sent
    Init,
    /// Try sent
    TryOpen,
    /// Handshake complete
    Open,
    /// Closed
    Closed,
}

/// A light client as reported by the relayer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientOutput {
    /// Client identifier on the host chain
    pub client_id: String,
    /// Chain id of the chain this client tracks
    pub tracked_chain_id: String,
}

/// Counterparty of a connection end
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionCounterparty {
    /// Counterparty client id
    pub client_id: String,
    /// Counterparty connection id
    pub connection_id: String,
}

/// A connection end as reported by the relayer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionOutput {
    /// Connection identifier on the host chain
    pub connection_id: String,
    /// Client the connection is built on
    pub client_id: String,
    /// Other end
    pub counterparty: ConnectionCounterparty,
    /// Handshake state
    pub state: EndState,
}

/// Counterparty of a channel end
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelCounterparty {
    /// Counterparty port
    pub port_id: String,
    /// Counterparty channel id
    pub channel_id: String,
}

/// A channel end as reported by the relayer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelOutput {
    /// Channel identifier on the host chain
    pub channel_id: String,
    /// Port on the host chain
    pub port_id: String,
    /// Other end
    pub counterparty: ChannelCounterparty,
    /// Connections the channel runs over
    pub connection_hops: Vec<String>,
    /// Ordering
    pub ordering: Order,
    /// Negotiated version
    pub version: String,
    /// Handshake state
    pub state: EndState,
}

/// Identifiers a handshake step created, one on each chain of the path
///
/// Reported by the relayer from the step's own events, so concurrent paths
/// over the same chain pair never confuse each other's artifacts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CreatedIds {
    /// Identifier on the path's first chain
    pub on_a: String,
    /// Identifier on the path's second chain
    pub on_b: String,
}

impl CreatedIds {
    /// Pair of identifiers
    pub fn new(on_a: impl Into<String>, on_b: impl Into<String>) -> Self {
        Self {
            on_a: on_a.into(),
            on_b: on_b.into(),
        }
    }
}

/// Governance proposal status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalStatus {
    /// Waiting for deposits
    DepositPeriod,
    /// Open for votes
    VotingPeriod,
    /// Passed
    Passed,
    /// Rejected
    Rejected,
    /// Failed during execution
    Failed,
}

impl ProposalStatus {
    /// Whether the proposal can no longer change status
    pub fn is_final(&self) -> bool {
        matches!(self, Self::Passed | Self::Rejected | Self::Failed)
    }
}

/// Outcome of one relay pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayReport {
    /// Packets delivered to their destination
    pub packets_relayed: usize,
    /// Acknowledgements delivered back to the source
    pub acks_relayed: usize,
}

impl RelayReport {
    /// Sum two reports
    pub fn merge(self, other: RelayReport) -> RelayReport {
        RelayReport {
            packets_relayed: self.packets_relayed + other.packets_relayed,
            acks_relayed: self.acks_relayed + other.acks_relayed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ChainConfig, ChainFamily};

    #[test]
    fn test_default_channel_is_unordered_transfer() {
        let opts = ChannelOptions::default();
        assert_eq!(opts.source_port, "transfer");
        assert_eq!(opts.dest_port, "transfer");
        assert_eq!(opts.order, Order::Unordered);
        assert_eq!(opts.version, "ics20-1");
    }

    #[test]
    fn test_client_options_resolve_family_defaults() {
        let a = ChainConfig::new(ChainFamily::Cosmos, "gaia", "gaia-1", "uatom");
        let b = ChainConfig::new(ChainFamily::Polkadot, "rococo", "rococo-local", "UNIT");

        let resolved = ClientOptions::default().resolve(&a, &b);
        assert_eq!(resolved.trusting_period, ChainFamily::Polkadot.default_trusting_period());
        assert_eq!(resolved.trust_level, TrustLevel::ONE_THIRD);

        let explicit = ClientOptions {
            trusting_period: Some(Duration::from_secs(60)),
            trust_level: Some(TrustLevel {
                numerator: 2,
                denominator: 3,
            }),
        }
        .resolve(&a, &b);
        assert_eq!(explicit.trusting_period, Duration::from_secs(60));
        assert_eq!(explicit.trust_level.to_string(), "2/3");
    }

    #[test]
    fn test_key_material_debug_is_redacted() {
        let key = KeyMaterial {
            seed_hex: "deadbeef".into(),
        };
        assert!(!format!("{:?}", key).contains("deadbeef"));
    }

    #[test]
    fn test_proposal_status_finality() {
        assert!(!ProposalStatus::VotingPeriod.is_final());
        assert!(ProposalStatus::Passed.is_final());
    }
}
