// File: testing-framework/src/link.rs
//
// Link handshake state
//
// A link advances unset -> client-created -> connection-created ->
// channel-created. Each transition only happens from its immediate
// predecessor and records the confirmed artifacts, so a failed step leaves the
// recorded state exactly where it was.

use crate::ibc::{ChannelOptions, ChannelOutput, ClientOptions, ClientOutput, ConnectionOutput};
use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;

/// Handshake progress of a link
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum LinkState {
    /// Nothing created yet
    Unset,
    /// Both light clients confirmed on-chain
    ClientCreated,
    /// Connection confirmed open on both ends
    ConnectionCreated,
    /// Channel confirmed open on both ends
    ChannelCreated,
}

impl LinkState {
    /// State that must be recorded before `self` can be reached
    pub fn predecessor(&self) -> Option<LinkState> {
        match self {
            Self::Unset => None,
            Self::ClientCreated => Some(Self::Unset),
            Self::ConnectionCreated => Some(Self::ClientCreated),
            Self::ChannelCreated => Some(Self::ConnectionCreated),
        }
    }
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unset => "unset",
            Self::ClientCreated => "client-created",
            Self::ConnectionCreated => "connection-created",
            Self::ChannelCreated => "channel-created",
        };
        f.write_str(name)
    }
}

/// Client pair recorded at `client-created`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClientPair {
    /// Client on chain A tracking chain B
    pub on_a: ClientOutput,
    /// Client on chain B tracking chain A
    pub on_b: ClientOutput,
}

/// Connection ends recorded at `connection-created`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionPair {
    /// End on chain A
    pub on_a: ConnectionOutput,
    /// End on chain B
    pub on_b: ConnectionOutput,
}

/// Channel ends recorded at `channel-created`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelPair {
    /// End on chain A
    pub on_a: ChannelOutput,
    /// End on chain B
    pub on_b: ChannelOutput,
}

/// Everything a link has confirmed so far
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HandshakeRecord {
    /// Path registered with the relayer
    pub path_generated: bool,
    /// Confirmed clients
    pub clients: Option<ClientPair>,
    /// Confirmed connection
    pub connection: Option<ConnectionPair>,
    /// Confirmed channel
    pub channel: Option<ChannelPair>,
}

impl HandshakeRecord {
    /// State implied by the recorded artifacts
    pub fn state(&self) -> LinkState {
        if self.channel.is_some() {
            LinkState::ChannelCreated
        } else if self.connection.is_some() {
            LinkState::ConnectionCreated
        } else if self.clients.is_some() {
            LinkState::ClientCreated
        } else {
            LinkState::Unset
        }
    }
}

/// A transition that skipped or repeated a step
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("cannot move link from {from} to {to}")]
pub struct InvalidTransition {
    /// Recorded state
    pub from: LinkState,
    /// Requested state
    pub to: LinkState,
}

/// A declared pair of chains bridged by one relayer
#[derive(Debug)]
pub struct Link {
    path: String,
    chain_a: String,
    chain_b: String,
    relayer: String,
    client_options: ClientOptions,
    channel_options: ChannelOptions,
    record: Mutex<HandshakeRecord>,
    steps: tokio::sync::Mutex<()>,
}

impl Link {
    pub(crate) fn new(
        path: String,
        chain_a: String,
        chain_b: String,
        relayer: String,
        client_options: ClientOptions,
        channel_options: ChannelOptions,
    ) -> Self {
        Self {
            path,
            chain_a,
            chain_b,
            relayer,
            client_options,
            channel_options,
            record: Mutex::new(HandshakeRecord::default()),
            steps: tokio::sync::Mutex::new(()),
        }
    }

    /// Path name
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Name of chain A
    pub fn chain_a(&self) -> &str {
        &self.chain_a
    }

    /// Name of chain B
    pub fn chain_b(&self) -> &str {
        &self.chain_b
    }

    /// Name of the assigned relayer
    pub fn relayer(&self) -> &str {
        &self.relayer
    }

    /// Whether `chain` is one end of this link
    pub fn touches(&self, chain: &str) -> bool {
        self.chain_a == chain || self.chain_b == chain
    }

    /// Client options declared with the link
    pub fn client_options(&self) -> &ClientOptions {
        &self.client_options
    }

    /// Channel options declared with the link
    pub fn channel_options(&self) -> &ChannelOptions {
        &self.channel_options
    }

    /// Current handshake state
    pub fn state(&self) -> LinkState {
        self.record.lock().state()
    }

    /// Snapshot of the confirmed artifacts
    pub fn record(&self) -> HandshakeRecord {
        self.record.lock().clone()
    }

    /// Whether the relayer already knows this path
    pub fn path_generated(&self) -> bool {
        self.record.lock().path_generated
    }

    /// Serializes handshake steps of this link across sequencers
    pub(crate) async fn lock_steps(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.steps.lock().await
    }

    pub(crate) fn mark_path_generated(&self) {
        self.record.lock().path_generated = true;
    }

    pub(crate) fn record_clients(&self, clients: ClientPair) -> Result<(), InvalidTransition> {
        let mut record = self.record.lock();
        check_transition(record.state(), LinkState::ClientCreated)?;
        record.clients = Some(clients);
        Ok(())
    }

    pub(crate) fn record_connection(
        &self,
        connection: ConnectionPair,
    ) -> Result<(), InvalidTransition> {
        let mut record = self.record.lock();
        check_transition(record.state(), LinkState::ConnectionCreated)?;
        record.connection = Some(connection);
        Ok(())
    }

    pub(crate) fn record_channel(&self, channel: ChannelPair) -> Result<(), InvalidTransition> {
        let mut record = self.record.lock();
        check_transition(record.state(), LinkState::ChannelCreated)?;
        record.channel = Some(channel);
        Ok(())
    }
}

fn check_transition(from: LinkState, to: LinkState) -> Result<(), InvalidTransition> {
    if to.predecessor() == Some(from) {
        Ok(())
    } else {
        Err(InvalidTransition { from, to })
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use crate::ibc::{ChannelCounterparty, ConnectionCounterparty, EndState, Order};

    pub fn clients() -> ClientPair {
        ClientPair {
            on_a: ClientOutput {
                client_id: "07-tendermint-0".into(),
                tracked_chain_id: "chain-b".into(),
            },
            on_b: ClientOutput {
                client_id: "07-tendermint-0".into(),
                tracked_chain_id: "chain-a".into(),
            },
        }
    }

    fn connection_end(id: &str) -> ConnectionOutput {
        ConnectionOutput {
            connection_id: id.into(),
            client_id: "07-tendermint-0".into(),
            counterparty: ConnectionCounterparty {
                client_id: "07-tendermint-0".into(),
                connection_id: id.into(),
            },
            state: EndState::Open,
        }
    }

    pub fn connection() -> ConnectionPair {
        ConnectionPair {
            on_a: connection_end("connection-0"),
            on_b: connection_end("connection-0"),
        }
    }

    fn channel_end() -> ChannelOutput {
        ChannelOutput {
            channel_id: "channel-0".into(),
            port_id: "transfer".into(),
            counterparty: ChannelCounterparty {
                port_id: "transfer".into(),
                channel_id: "channel-0".into(),
            },
            connection_hops: vec!["connection-0".into()],
            ordering: Order::Unordered,
            version: "ics20-1".into(),
            state: EndState::Open,
        }
    }

    pub fn channel() -> ChannelPair {
        ChannelPair {
            on_a: channel_end(),
            on_b: channel_end(),
        }
    }

    pub fn link() -> Link {
        Link::new(
            "a-b".into(),
            "chain-a".into(),
            "chain-b".into(),
            "rly".into(),
            ClientOptions::default(),
            ChannelOptions::default(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_happy_path_progression() {
        let link = link();
        assert_eq!(link.state(), LinkState::Unset);

        link.record_clients(clients()).unwrap();
        assert_eq!(link.state(), LinkState::ClientCreated);
        link.record_connection(connection()).unwrap();
        assert_eq!(link.state(), LinkState::ConnectionCreated);
        link.record_channel(channel()).unwrap();
        assert_eq!(link.state(), LinkState::ChannelCreated);
        assert_eq!(link.state().to_string(), "channel-created");
    }

    #[test]
    fn test_cannot_skip_or_repeat() {
        let link = link();
        assert_eq!(
            link.record_connection(connection()),
            Err(InvalidTransition {
                from: LinkState::Unset,
                to: LinkState::ConnectionCreated
            })
        );

        link.record_clients(clients()).unwrap();
        assert!(link.record_clients(clients()).is_err());
        assert!(link.record_channel(channel()).is_err());
        assert_eq!(link.state(), LinkState::ClientCreated);
    }

    #[test]
    fn test_touches() {
        let link = link();
        assert!(link.touches("chain-a"));
        assert!(link.touches("chain-b"));
        assert!(!link.touches("chain-c"));
    }

    #[derive(Debug, Clone, Copy)]
    enum Attempt {
        Clients,
        Connection,
        Channel,
    }

    fn attempt_strategy() -> impl Strategy<Value = Attempt> {
        prop_oneof![
            Just(Attempt::Clients),
            Just(Attempt::Connection),
            Just(Attempt::Channel),
        ]
    }

    proptest! {
        /// Whatever order steps are attempted in, the observed state never
        /// moves backwards and only ever moves by one step.
        #[test]
        fn prop_state_is_monotonic(attempts in proptest::collection::vec(attempt_strategy(), 0..24)) {
            let link = link();
            let mut previous = link.state();

            for attempt in attempts {
                let result = match attempt {
                    Attempt::Clients => link.record_clients(clients()),
                    Attempt::Connection => link.record_connection(connection()),
                    Attempt::Channel => link.record_channel(channel()),
                };
                let current = link.state();

                match result {
                    Ok(()) => prop_assert_eq!(current.predecessor(), Some(previous)),
                    Err(_) => prop_assert_eq!(current, previous),
                }
                prop_assert!(current >= previous);
                previous = current;
            }
        }
    }
}
