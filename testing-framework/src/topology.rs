// File: testing-framework/src/topology.rs
//
// Topology Model
//
// Pure declaration: chains, relayers and the links between them. Nothing here
// touches a network or a process. Declarations are validated as they are
// made, so a rejected declaration never changes the topology.

use crate::capabilities::{Chain, Relayer};
use crate::error::DeclarationError;
use crate::ibc::{ChannelOptions, ClientOptions, WalletAmount};
use crate::link::Link;
use indexmap::IndexMap;
use std::sync::Arc;

/// A declared chain plus the extra balances it starts with
#[derive(Clone)]
pub struct ChainEntry {
    /// Adapter
    pub chain: Arc<dyn Chain>,
    /// Extra genesis balances requested by the test
    pub genesis_wallets: Vec<WalletAmount>,
}

/// Full declaration of a link
///
/// # Example
///
/// ```rust
/// use interchain_testing_framework::ibc::{ChannelOptions, Order};
/// use interchain_testing_framework::topology::LinkSpec;
///
/// let spec = LinkSpec::new("gaia", "osmosis", "rly", "gaia-osmo").with_channel_options(
///     ChannelOptions {
///         order: Order::Ordered,
///         ..ChannelOptions::default()
///     },
/// );
/// assert_eq!(spec.path, "gaia-osmo");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkSpec {
    /// Chain A name
    pub chain_a: String,
    /// Chain B name
    pub chain_b: String,
    /// Relayer name
    pub relayer: String,
    /// Path name, unique per topology
    pub path: String,
    /// Client options used by the automatic handshake
    pub client_options: ClientOptions,
    /// Channel options used by the automatic handshake
    pub channel_options: ChannelOptions,
}

impl LinkSpec {
    /// Link with default client and channel options
    pub fn new(
        chain_a: impl Into<String>,
        chain_b: impl Into<String>,
        relayer: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        Self {
            chain_a: chain_a.into(),
            chain_b: chain_b.into(),
            relayer: relayer.into(),
            path: path.into(),
            client_options: ClientOptions::default(),
            channel_options: ChannelOptions::default(),
        }
    }

    /// Set client options
    pub fn with_client_options(mut self, options: ClientOptions) -> Self {
        self.client_options = options;
        self
    }

    /// Set channel options
    pub fn with_channel_options(mut self, options: ChannelOptions) -> Self {
        self.channel_options = options;
        self
    }
}

/// Declared chains, relayers and links
#[derive(Default)]
pub struct Topology {
    chains: IndexMap<String, ChainEntry>,
    relayers: IndexMap<String, Arc<dyn Relayer>>,
    links: IndexMap<String, Arc<Link>>,
    frozen: bool,
}

impl Topology {
    /// Empty topology
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_open(&self) -> Result<(), DeclarationError> {
        if self.frozen {
            Err(DeclarationError::Frozen)
        } else {
            Ok(())
        }
    }

    /// Declare a chain under its configured name
    pub fn add_chain(&mut self, chain: Arc<dyn Chain>) -> Result<&mut Self, DeclarationError> {
        self.add_chain_with_genesis(chain, Vec::new())
    }

    /// Declare a chain that starts with extra genesis balances
    pub fn add_chain_with_genesis(
        &mut self,
        chain: Arc<dyn Chain>,
        genesis_wallets: Vec<WalletAmount>,
    ) -> Result<&mut Self, DeclarationError> {
        self.ensure_open()?;
        let name = chain.config().name.clone();
        if self.chains.contains_key(&name) {
            return Err(DeclarationError::DuplicateChain(name));
        }
        self.chains.insert(
            name,
            ChainEntry {
                chain,
                genesis_wallets,
            },
        );
        Ok(self)
    }

    /// Declare a relayer under `name`
    pub fn add_relayer(
        &mut self,
        relayer: Arc<dyn Relayer>,
        name: impl Into<String>,
    ) -> Result<&mut Self, DeclarationError> {
        self.ensure_open()?;
        let name = name.into();
        if self.relayers.contains_key(&name) {
            return Err(DeclarationError::DuplicateRelayer(name));
        }
        self.relayers.insert(name, relayer);
        Ok(self)
    }

    /// Declare a link with default options
    pub fn add_link(
        &mut self,
        chain_a: &str,
        chain_b: &str,
        relayer: &str,
        path: &str,
    ) -> Result<&mut Self, DeclarationError> {
        self.add_link_with(LinkSpec::new(chain_a, chain_b, relayer, path))
    }

    /// Declare a link
    ///
    /// Fails with `DuplicatePath` if the path name is taken (the existing link
    /// is left untouched), and with `UnknownParticipant` if a chain or the
    /// relayer was not declared first.
    pub fn add_link_with(&mut self, spec: LinkSpec) -> Result<&mut Self, DeclarationError> {
        self.ensure_open()?;
        if self.links.contains_key(&spec.path) {
            return Err(DeclarationError::DuplicatePath(spec.path));
        }
        for participant in [&spec.chain_a, &spec.chain_b] {
            if !self.chains.contains_key(participant) {
                return Err(DeclarationError::UnknownParticipant {
                    path: spec.path.clone(),
                    participant: participant.clone(),
                });
            }
        }
        if !self.relayers.contains_key(&spec.relayer) {
            return Err(DeclarationError::UnknownParticipant {
                path: spec.path.clone(),
                participant: spec.relayer.clone(),
            });
        }
        if spec.chain_a == spec.chain_b {
            return Err(DeclarationError::SelfLink(spec.path));
        }

        let link = Link::new(
            spec.path.clone(),
            spec.chain_a,
            spec.chain_b,
            spec.relayer,
            spec.client_options,
            spec.channel_options,
        );
        self.links.insert(spec.path, Arc::new(link));
        Ok(self)
    }

    /// Close the topology to further declarations
    pub(crate) fn freeze(&mut self) {
        self.frozen = true;
    }

    /// Whether declarations are closed
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Declared chains, in declaration order
    pub fn chains(&self) -> impl Iterator<Item = (&String, &ChainEntry)> {
        self.chains.iter()
    }

    /// Declared relayers, in declaration order
    pub fn relayers(&self) -> impl Iterator<Item = (&String, &Arc<dyn Relayer>)> {
        self.relayers.iter()
    }

    /// Declared links, in declaration order
    pub fn links(&self) -> impl Iterator<Item = &Arc<Link>> {
        self.links.values()
    }

    /// Chain by name
    pub fn chain(&self, name: &str) -> Option<&ChainEntry> {
        self.chains.get(name)
    }

    /// Relayer by name
    pub fn relayer(&self, name: &str) -> Option<&Arc<dyn Relayer>> {
        self.relayers.get(name)
    }

    /// Link by path name
    pub fn link(&self, path: &str) -> Option<&Arc<Link>> {
        self.links.get(path)
    }

    /// Names of the chains `relayer` is linked to, in declaration order
    pub fn chains_of_relayer(&self, relayer: &str) -> Vec<String> {
        self.chains
            .keys()
            .filter(|chain| {
                self.links
                    .values()
                    .any(|l| l.relayer() == relayer && l.touches(chain))
            })
            .cloned()
            .collect()
    }

    /// Names of the relayers linked to `chain`, in declaration order
    pub fn relayers_of_chain(&self, chain: &str) -> Vec<String> {
        self.relayers
            .keys()
            .filter(|relayer| {
                self.links
                    .values()
                    .any(|l| l.relayer() == relayer.as_str() && l.touches(chain))
            })
            .cloned()
            .collect()
    }
}

impl std::fmt::Debug for Topology {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Topology")
            .field("chains", &self.chains.keys().collect::<Vec<_>>())
            .field("relayers", &self.relayers.keys().collect::<Vec<_>>())
            .field("links", &self.links.keys().collect::<Vec<_>>())
            .field("frozen", &self.frozen)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ChainConfig, ChainFamily};
    use crate::ibc::Order;
    use crate::link::LinkState;
    use crate::local::LocalHub;

    fn topology(hub: &LocalHub) -> Topology {
        let mut topology = Topology::new();
        topology
            .add_chain(hub.chain(ChainConfig::new(ChainFamily::Cosmos, "gaia", "gaia-1", "uatom")))
            .unwrap()
            .add_chain(hub.chain(ChainConfig::new(ChainFamily::Cosmos, "osmo", "osmo-1", "uosmo")))
            .unwrap()
            .add_relayer(hub.relayer(), "rly")
            .unwrap();
        topology
    }

    #[test]
    fn test_duplicate_path_keeps_first_declaration() {
        let hub = LocalHub::new();
        let mut topology = topology(&hub);
        topology
            .add_link_with(LinkSpec::new("gaia", "osmo", "rly", "transfer").with_channel_options(
                ChannelOptions {
                    order: Order::Ordered,
                    ..ChannelOptions::default()
                },
            ))
            .unwrap();

        let err = topology
            .add_link("osmo", "gaia", "rly", "transfer")
            .err()
            .unwrap();
        assert_eq!(err, DeclarationError::DuplicatePath("transfer".into()));

        let link = topology.link("transfer").unwrap();
        assert_eq!(link.chain_a(), "gaia");
        assert_eq!(link.chain_b(), "osmo");
        assert_eq!(link.channel_options().order, Order::Ordered);
        assert_eq!(link.state(), LinkState::Unset);
        assert_eq!(topology.links().count(), 1);
    }

    #[test]
    fn test_unknown_participants() {
        let hub = LocalHub::new();
        let mut topology = topology(&hub);

        let err = topology.add_link("gaia", "juno", "rly", "p").err().unwrap();
        assert_eq!(
            err,
            DeclarationError::UnknownParticipant {
                path: "p".into(),
                participant: "juno".into()
            }
        );

        let err = topology.add_link("gaia", "osmo", "hermes", "p").err().unwrap();
        assert!(matches!(err, DeclarationError::UnknownParticipant { participant, .. } if participant == "hermes"));
        assert_eq!(topology.links().count(), 0);
    }

    #[test]
    fn test_duplicate_names_and_self_link() {
        let hub = LocalHub::new();
        let mut topology = topology(&hub);

        let dup = hub.chain(ChainConfig::new(ChainFamily::Cosmos, "gaia", "gaia-2", "uatom"));
        assert_eq!(
            topology.add_chain(dup).err(),
            Some(DeclarationError::DuplicateChain("gaia".into()))
        );
        assert_eq!(
            topology.add_relayer(hub.relayer(), "rly").err(),
            Some(DeclarationError::DuplicateRelayer("rly".into()))
        );
        assert_eq!(
            topology.add_link("gaia", "gaia", "rly", "loop").err(),
            Some(DeclarationError::SelfLink("loop".into()))
        );
    }

    #[test]
    fn test_frozen_rejects_declarations() {
        let hub = LocalHub::new();
        let mut topology = topology(&hub);
        topology.freeze();

        assert_eq!(
            topology.add_link("gaia", "osmo", "rly", "p").err(),
            Some(DeclarationError::Frozen)
        );
        assert!(topology.is_frozen());
    }

    #[test]
    fn test_participant_lookups() {
        let hub = LocalHub::new();
        let mut topology = topology(&hub);
        topology
            .add_chain(hub.chain(ChainConfig::new(ChainFamily::Cosmos, "juno", "juno-1", "ujuno")))
            .unwrap()
            .add_link("gaia", "osmo", "rly", "gaia-osmo")
            .unwrap();

        assert_eq!(topology.chains_of_relayer("rly"), vec!["gaia", "osmo"]);
        assert_eq!(topology.relayers_of_chain("osmo"), vec!["rly"]);
        assert!(topology.relayers_of_chain("juno").is_empty());
    }
}
