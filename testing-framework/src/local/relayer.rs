// File: testing-framework/src/local/relayer.rs

use super::{LocalChain, LocalHub};
use crate::capabilities::{ProcessContext, ProcessGroupId, ProcessGroupSpec, ProcessRuntime, Relayer};
use crate::config::ChainConfig;
use crate::error::HandshakeStep;
use crate::ibc::{
    ChannelCounterparty, ChannelOptions, ChannelOutput, ClientOutput, ConnectionCounterparty,
    ConnectionOutput, CreatedIds, EndState, KeyMaterial, RelayReport, ResolvedClientOptions,
};
use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use indexmap::IndexMap;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone)]
struct ChannelEnds {
    a: (String, String),
    b: (String, String),
}

#[derive(Debug, Clone)]
struct PathState {
    chain_a: String,
    chain_b: String,
    clients: Option<(String, String)>,
    connection: Option<(String, String)>,
    channels: Vec<ChannelEnds>,
}

#[derive(Default)]
struct State {
    process: Option<(Arc<dyn ProcessRuntime>, ProcessGroupId)>,
    configured: IndexMap<String, String>,
    keys: HashMap<String, String>,
    paths: IndexMap<String, PathState>,
    failures: HashMap<HandshakeStep, String>,
    visibility_delay: u64,
}

/// Relayer that writes handshake artifacts straight into `LocalChain` state
///
/// Artifacts become queryable `visibility_delay` blocks after the step that
/// created them (default 1).
pub struct LocalRelayer {
    name: String,
    hub: LocalHub,
    state: Mutex<State>,
}

impl LocalRelayer {
    pub(crate) fn new(name: String, hub: LocalHub) -> Self {
        let state = State {
            visibility_delay: 1,
            ..State::default()
        };
        Self {
            name,
            hub,
            state: Mutex::new(state),
        }
    }

    /// Relayer name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Make the relayer call for `step` fail with `message`
    pub fn fail_on(&self, step: HandshakeStep, message: impl Into<String>) {
        self.state.lock().failures.insert(step, message.into());
    }

    /// Blocks between creating an artifact and it becoming queryable
    pub fn set_visibility_delay(&self, blocks: u64) {
        self.state.lock().visibility_delay = blocks;
    }

    /// Whether a key for `chain_id` was restored
    pub fn has_key(&self, chain_id: &str) -> bool {
        self.state.lock().keys.contains_key(chain_id)
    }

    fn log_call(&self, action: &str, target: impl Into<String>) {
        self.hub
            .log()
            .record(format!("relayer:{}", self.name), action, target);
    }

    fn check_failure(&self, step: HandshakeStep) -> Result<()> {
        match self.state.lock().failures.get(&step) {
            Some(message) => bail!("{}", message),
            None => Ok(()),
        }
    }

    fn chain(&self, chain_id: &str) -> Result<Arc<LocalChain>> {
        self.hub
            .chain_by_id(chain_id)
            .ok_or_else(|| anyhow!("no local chain with id {}", chain_id))
    }

    fn path(&self, path: &str) -> Result<(PathState, u64)> {
        let state = self.state.lock();
        let found = state
            .paths
            .get(path)
            .cloned()
            .ok_or_else(|| anyhow!("path '{}' not found", path))?;
        Ok((found, state.visibility_delay))
    }

    fn update_path(&self, path: &str, update: impl FnOnce(&mut PathState)) {
        if let Some(found) = self.state.lock().paths.get_mut(path) {
            update(found);
        }
    }

    fn deliver(&self, from: &LocalChain, to: &LocalChain, channel_id: &str) -> Result<usize> {
        let packets = from.take_outbound(channel_id);
        for packet in &packets {
            to.receive_transfer(packet)?;
        }
        Ok(packets.len())
    }
}

#[async_trait]
impl Relayer for LocalRelayer {
    async fn initialize(&self, ctx: &ProcessContext) -> Result<()> {
        self.log_call("initialize", ctx.network.0.clone());
        let spec = ProcessGroupSpec::new(
            format!("{}-{}", ctx.test_name, self.name),
            ctx.network.clone(),
            &ctx.label,
            1,
        )
        .with_command(["rly", "start"]);
        let group = ctx.runtime.start_process_group(&spec).await?;
        self.state.lock().process = Some((ctx.runtime.clone(), group));
        Ok(())
    }

    async fn add_chain_configuration(
        &self,
        chain: &ChainConfig,
        rpc_address: &str,
        _grpc_address: &str,
    ) -> Result<()> {
        self.log_call("add_chain_configuration", chain.chain_id.clone());
        self.state
            .lock()
            .configured
            .insert(chain.chain_id.clone(), rpc_address.to_string());
        Ok(())
    }

    async fn restore_key(&self, chain_id: &str, key_name: &str, _key: &KeyMaterial) -> Result<()> {
        self.log_call("restore_key", chain_id);
        let mut state = self.state.lock();
        if !state.configured.contains_key(chain_id) {
            bail!("chain {} is not configured", chain_id);
        }
        state.keys.insert(chain_id.to_string(), key_name.to_string());
        Ok(())
    }

    async fn generate_path(&self, path: &str, chain_a_id: &str, chain_b_id: &str) -> Result<()> {
        self.log_call("generate_path", path);
        self.check_failure(HandshakeStep::GeneratePath)?;
        let mut state = self.state.lock();
        for chain_id in [chain_a_id, chain_b_id] {
            if !state.configured.contains_key(chain_id) {
                bail!("chain {} is not configured", chain_id);
            }
        }
        state.paths.insert(
            path.to_string(),
            PathState {
                chain_a: chain_a_id.to_string(),
                chain_b: chain_b_id.to_string(),
                clients: None,
                connection: None,
                channels: Vec::new(),
            },
        );
        Ok(())
    }

    async fn create_clients(
        &self,
        path: &str,
        options: &ResolvedClientOptions,
    ) -> Result<CreatedIds> {
        self.log_call("create_clients", path);
        self.check_failure(HandshakeStep::CreateClients)?;
        if options.trusting_period.is_zero() {
            bail!("trusting period must be positive");
        }
        let (found, delay) = self.path(path)?;
        let (a, b) = (self.chain(&found.chain_a)?, self.chain(&found.chain_b)?);

        let on_a = a.allocate_id("07-tendermint");
        let on_b = b.allocate_id("07-tendermint");
        a.push_client(
            ClientOutput {
                client_id: on_a.clone(),
                tracked_chain_id: found.chain_b.clone(),
            },
            delay,
        );
        b.push_client(
            ClientOutput {
                client_id: on_b.clone(),
                tracked_chain_id: found.chain_a.clone(),
            },
            delay,
        );
        self.update_path(path, |p| p.clients = Some((on_a.clone(), on_b.clone())));
        Ok(CreatedIds::new(on_a, on_b))
    }

    async fn create_connections(&self, path: &str) -> Result<CreatedIds> {
        self.log_call("create_connections", path);
        self.check_failure(HandshakeStep::CreateConnection)?;
        let (found, delay) = self.path(path)?;
        let (client_a, client_b) = found
            .clients
            .ok_or_else(|| anyhow!("path '{}' has no clients", path))?;
        let (a, b) = (self.chain(&found.chain_a)?, self.chain(&found.chain_b)?);

        let on_a = a.allocate_id("connection");
        let on_b = b.allocate_id("connection");
        a.push_connection(
            ConnectionOutput {
                connection_id: on_a.clone(),
                client_id: client_a.clone(),
                counterparty: ConnectionCounterparty {
                    client_id: client_b.clone(),
                    connection_id: on_b.clone(),
                },
                state: EndState::Open,
            },
            delay,
        );
        b.push_connection(
            ConnectionOutput {
                connection_id: on_b.clone(),
                client_id: client_b,
                counterparty: ConnectionCounterparty {
                    client_id: client_a,
                    connection_id: on_a.clone(),
                },
                state: EndState::Open,
            },
            delay,
        );
        self.update_path(path, |p| p.connection = Some((on_a.clone(), on_b.clone())));
        Ok(CreatedIds::new(on_a, on_b))
    }

    async fn create_channel(&self, path: &str, options: &ChannelOptions) -> Result<CreatedIds> {
        self.log_call("create_channel", path);
        self.check_failure(HandshakeStep::CreateChannel)?;
        let (found, delay) = self.path(path)?;
        let (connection_a, connection_b) = found
            .connection
            .ok_or_else(|| anyhow!("path '{}' has no connection", path))?;
        let (a, b) = (self.chain(&found.chain_a)?, self.chain(&found.chain_b)?);

        let on_a = a.allocate_id("channel");
        let on_b = b.allocate_id("channel");
        let end = |channel_id: &str, port_id: &str, hop: &str, counterparty: ChannelCounterparty| {
            ChannelOutput {
                channel_id: channel_id.to_string(),
                port_id: port_id.to_string(),
                counterparty,
                connection_hops: vec![hop.to_string()],
                ordering: options.order,
                version: options.version.clone(),
                state: EndState::Open,
            }
        };
        a.push_channel(
            end(
                &on_a,
                &options.source_port,
                &connection_a,
                ChannelCounterparty {
                    port_id: options.dest_port.clone(),
                    channel_id: on_b.clone(),
                },
            ),
            delay,
        );
        b.push_channel(
            end(
                &on_b,
                &options.dest_port,
                &connection_b,
                ChannelCounterparty {
                    port_id: options.source_port.clone(),
                    channel_id: on_a.clone(),
                },
            ),
            delay,
        );
        let created = CreatedIds::new(on_a.clone(), on_b.clone());
        let ends = ChannelEnds {
            a: (options.source_port.clone(), on_a),
            b: (options.dest_port.clone(), on_b),
        };
        self.update_path(path, |p| p.channels.push(ends));
        Ok(created)
    }

    async fn get_clients(&self, chain_id: &str) -> Result<Vec<ClientOutput>> {
        Ok(self.chain(chain_id)?.visible_clients())
    }

    async fn get_connections(&self, chain_id: &str) -> Result<Vec<ConnectionOutput>> {
        Ok(self.chain(chain_id)?.visible_connections())
    }

    async fn get_channels(&self, chain_id: &str) -> Result<Vec<ChannelOutput>> {
        Ok(self.chain(chain_id)?.visible_channels())
    }

    async fn start_relaying(&self, path: &str) -> Result<()> {
        self.log_call("start_relaying", path);
        self.path(path).map(|_| ())
    }

    async fn relay(&self, path: &str) -> Result<RelayReport> {
        let (found, _) = self.path(path)?;
        let (a, b) = (self.chain(&found.chain_a)?, self.chain(&found.chain_b)?);
        let mut report = RelayReport::default();
        for ends in &found.channels {
            let delivered = self.deliver(&a, &b, &ends.a.1)? + self.deliver(&b, &a, &ends.b.1)?;
            report.packets_relayed += delivered;
            report.acks_relayed += delivered;
        }
        Ok(report)
    }

    async fn stop_relaying(&self) -> Result<()> {
        self.log_call("stop_relaying", "");
        let process = self.state.lock().process.take();
        if let Some((runtime, group)) = process {
            runtime.stop_process_group(&group).await?;
        }
        Ok(())
    }
}
