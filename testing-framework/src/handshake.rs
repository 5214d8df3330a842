// File: testing-framework/src/handshake.rs
//
// Handshake Sequencer
//
// Drives one link through generate-path, create-clients, create-connection and
// create-channel against its relayer. Each relayer call reports the ids it
// created; those exact artifacts are confirmed through the relayer's query
// interface with a block-bounded retry loop. Only a confirmed step advances
// the link.
//
// Failure policy:
// - relayer call fails      -> HandshakeRejection, never retried
// - artifact not visible    -> retried until the block budget runs out,
//                              then DeadlineExceeded
// - step already recorded   -> recorded result returned, relayer not called

use crate::capabilities::{Chain, Relayer};
use crate::error::{HandshakeStep, InterchainError, Result};
use crate::ibc::{
    ChannelOptions, ChannelOutput, ClientOptions, ClientOutput, ConnectionOutput, CreatedIds,
    EndState,
};
use crate::link::{ChannelPair, ClientPair, ConnectionPair, Link, LinkState};
use crate::orchestrator::CancelSignal;
use crate::poller::{poll_until, HeightBound, PollRequest, PollSettings};
use crate::reporter::ExecReporter;
use log::{debug, info};
use std::future::Future;
use std::sync::Arc;

/// Sequencer for a single link
///
/// Steps can be called one by one with custom options, or all at once with
/// [`establish`](Self::establish) using the options declared with the link.
///
/// # Example
///
/// ```rust,ignore
/// let sequencer = interchain.handshake("gaia-osmo")?;
/// sequencer.generate_path().await?;
/// sequencer.create_clients(&ClientOptions {
///     trusting_period: Some(Duration::from_secs(3600)),
///     ..Default::default()
/// }).await?;
/// sequencer.create_connection().await?;
/// sequencer.create_channel(&ChannelOptions::default()).await?;
/// ```
pub struct HandshakeSequencer {
    link: Arc<Link>,
    relayer: Arc<dyn Relayer>,
    chain_a: Arc<dyn Chain>,
    chain_b: Arc<dyn Chain>,
    settings: PollSettings,
    block_budget: u64,
    bound: HeightBound,
    reporter: Arc<ExecReporter>,
}

impl HandshakeSequencer {
    /// Sequencer with a 10 block budget per step on the slower chain
    pub fn new(
        link: Arc<Link>,
        relayer: Arc<dyn Relayer>,
        chain_a: Arc<dyn Chain>,
        chain_b: Arc<dyn Chain>,
        settings: PollSettings,
    ) -> Self {
        let reporter = Arc::new(ExecReporter::new(link.path()));
        Self {
            link,
            relayer,
            chain_a,
            chain_b,
            settings,
            block_budget: 10,
            bound: HeightBound::Slowest,
            reporter,
        }
    }

    /// Blocks each step may take to become queryable
    pub fn with_block_budget(mut self, blocks: u64) -> Self {
        self.block_budget = blocks;
        self
    }

    /// How the budget is counted across the two chains
    pub fn with_bound(mut self, bound: HeightBound) -> Self {
        self.bound = bound;
        self
    }

    /// Record steps into a shared reporter
    pub fn with_reporter(mut self, reporter: Arc<ExecReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Stop before starting a new step once `cancel` is tripped
    pub fn with_cancel(mut self, cancel: CancelSignal) -> Self {
        self.settings = self.settings.with_cancel(cancel);
        self
    }

    /// The link being driven
    pub fn link(&self) -> &Arc<Link> {
        &self.link
    }

    fn component(&self) -> String {
        format!("link:{}", self.link.path())
    }

    fn chain_ids(&self) -> (&str, &str) {
        (
            self.chain_a.config().chain_id.as_str(),
            self.chain_b.config().chain_id.as_str(),
        )
    }

    fn ensure_not_cancelled(&self, step: HandshakeStep) -> Result<()> {
        match &self.settings.cancel {
            Some(cancel) if cancel.is_cancelled() => Err(InterchainError::Cancelled(format!(
                "{} on path '{}'",
                step,
                self.link.path()
            ))),
            _ => Ok(()),
        }
    }

    fn out_of_order(&self, step: HandshakeStep) -> InterchainError {
        InterchainError::StepOutOfOrder {
            path: self.link.path().to_string(),
            step,
            state: self.link.state(),
        }
    }

    fn rejection(&self, step: HandshakeStep, source: anyhow::Error) -> InterchainError {
        InterchainError::HandshakeRejection {
            path: self.link.path().to_string(),
            relayer: self.link.relayer().to_string(),
            step,
            source,
        }
    }

    /// Retry `query` until it yields a value, for up to the block budget
    /// counted over both chains of the link
    async fn confirm<T, Q, QF>(&self, step: HandshakeStep, what: &str, mut query: Q) -> Result<T>
    where
        Q: FnMut() -> QF,
        QF: Future<Output = anyhow::Result<Option<T>>>,
    {
        let operation = format!("confirming {} for {} on path '{}'", what, step, self.link.path());
        let chain_a = self.chain_a.as_ref();
        let chain_b = self.chain_b.as_ref();
        poll_until(
            &operation,
            PollRequest::blocks(self.block_budget).with_bound(self.bound),
            &self.settings,
            move || async move { anyhow::Ok(vec![chain_a.height().await?, chain_b.height().await?]) },
            |_| query(),
        )
        .await
    }

    /// Register the chain pair and path name with the relayer
    pub async fn generate_path(&self) -> Result<()> {
        let _steps = self.link.lock_steps().await;
        self.generate_path_locked().await
    }

    async fn generate_path_locked(&self) -> Result<()> {
        if self.link.path_generated() {
            return Ok(());
        }
        self.ensure_not_cancelled(HandshakeStep::GeneratePath)?;

        let (a_id, b_id) = self.chain_ids();
        let path = self.link.path();
        self.reporter
            .track(&self.component(), "generate-path", async {
                self.relayer
                    .generate_path(path, a_id, b_id)
                    .await
                    .map_err(|e| self.rejection(HandshakeStep::GeneratePath, e))
            })
            .await?;

        self.link.mark_path_generated();
        if log::log_enabled!(log::Level::Debug) {
            debug!("path '{}' registered ({} <-> {})", path, a_id, b_id);
        }
        Ok(())
    }

    /// Create a light client of each chain on the other
    ///
    /// `options` fields left unset take the chains' family defaults.
    pub async fn create_clients(&self, options: &ClientOptions) -> Result<ClientPair> {
        let _steps = self.link.lock_steps().await;
        self.create_clients_locked(options).await
    }

    async fn create_clients_locked(&self, options: &ClientOptions) -> Result<ClientPair> {
        if let Some(clients) = self.link.record().clients {
            return Ok(clients);
        }
        if !self.link.path_generated() {
            return Err(self.out_of_order(HandshakeStep::CreateClients));
        }
        self.ensure_not_cancelled(HandshakeStep::CreateClients)?;

        let step = HandshakeStep::CreateClients;
        let (a_id, b_id) = self.chain_ids();
        let relayer = &self.relayer;
        let resolved = options.resolve(self.chain_a.config(), self.chain_b.config());

        let component = self.component();
        let clients = self
            .reporter
            .track(&component, "create-clients", async {
                let created = relayer
                    .create_clients(self.link.path(), &resolved)
                    .await
                    .map_err(|e| self.rejection(step, e))?;

                let created = &created;
                self.confirm(step, "clients", || async move {
                    let on_a = find_client(relayer.get_clients(a_id).await?, &created.on_a, b_id);
                    let on_b = find_client(relayer.get_clients(b_id).await?, &created.on_b, a_id);
                    anyhow::Ok(on_a.zip(on_b).map(|(on_a, on_b)| ClientPair { on_a, on_b }))
                })
                .await
            })
            .await?;

        self.link
            .record_clients(clients.clone())
            .map_err(|_| self.out_of_order(step))?;
        info!(
            "path '{}': clients {} (on {}) and {} (on {}) created",
            self.link.path(),
            clients.on_a.client_id,
            a_id,
            clients.on_b.client_id,
            b_id
        );
        Ok(clients)
    }

    /// Run the connection-open handshake over the recorded clients
    pub async fn create_connection(&self) -> Result<ConnectionPair> {
        let _steps = self.link.lock_steps().await;
        self.create_connection_locked().await
    }

    async fn create_connection_locked(&self) -> Result<ConnectionPair> {
        let step = HandshakeStep::CreateConnection;
        let record = self.link.record();
        if let Some(connection) = record.connection {
            return Ok(connection);
        }
        let clients = record.clients.ok_or_else(|| self.out_of_order(step))?;
        self.ensure_not_cancelled(step)?;

        let (a_id, b_id) = self.chain_ids();
        let relayer = &self.relayer;
        let component = self.component();
        let clients = &clients;

        let connection = self
            .reporter
            .track(&component, "create-connection", async {
                let created = relayer
                    .create_connections(self.link.path())
                    .await
                    .map_err(|e| self.rejection(step, e))?;

                let created = &created;
                self.confirm(step, "open connection", || async move {
                    let on_a = relayer.get_connections(a_id).await?;
                    let on_b = relayer.get_connections(b_id).await?;
                    anyhow::Ok(match_connection(clients, created, &on_a, &on_b))
                })
                .await
            })
            .await?;

        self.link
            .record_connection(connection.clone())
            .map_err(|_| self.out_of_order(step))?;
        info!(
            "path '{}': connection {} <-> {} open",
            self.link.path(),
            connection.on_a.connection_id,
            connection.on_b.connection_id
        );
        Ok(connection)
    }

    /// Run the channel-open handshake over the recorded connection
    pub async fn create_channel(&self, options: &ChannelOptions) -> Result<ChannelPair> {
        let _steps = self.link.lock_steps().await;
        self.create_channel_locked(options).await
    }

    async fn create_channel_locked(&self, options: &ChannelOptions) -> Result<ChannelPair> {
        let step = HandshakeStep::CreateChannel;
        let record = self.link.record();
        if let Some(channel) = record.channel {
            return Ok(channel);
        }
        let connection = record.connection.ok_or_else(|| self.out_of_order(step))?;
        self.ensure_not_cancelled(step)?;

        let (a_id, b_id) = self.chain_ids();
        let relayer = &self.relayer;
        let component = self.component();
        let connection = &connection;

        let channel = self
            .reporter
            .track(&component, "create-channel", async {
                let created = relayer
                    .create_channel(self.link.path(), options)
                    .await
                    .map_err(|e| self.rejection(step, e))?;

                let created = &created;
                self.confirm(step, "open channel", || async move {
                    let on_a = relayer.get_channels(a_id).await?;
                    let on_b = relayer.get_channels(b_id).await?;
                    anyhow::Ok(match_channel(connection, options, created, &on_a, &on_b))
                })
                .await
            })
            .await?;

        self.link
            .record_channel(channel.clone())
            .map_err(|_| self.out_of_order(step))?;
        info!(
            "path '{}': channel {}/{} <-> {}/{} open ({}, {})",
            self.link.path(),
            channel.on_a.port_id,
            channel.on_a.channel_id,
            channel.on_b.port_id,
            channel.on_b.channel_id,
            channel.on_a.ordering,
            channel.on_a.version
        );
        Ok(channel)
    }

    /// Run every remaining step with the link's declared options
    pub async fn establish(&self) -> Result<ChannelPair> {
        let _steps = self.link.lock_steps().await;
        if log::log_enabled!(log::Level::Debug) {
            debug!(
                "establishing path '{}' from state {}",
                self.link.path(),
                self.link.state()
            );
        }

        self.generate_path_locked().await?;
        self.create_clients_locked(self.link.client_options()).await?;
        self.create_connection_locked().await?;
        let channel = self
            .create_channel_locked(self.link.channel_options())
            .await?;

        debug_assert_eq!(self.link.state(), LinkState::ChannelCreated);
        Ok(channel)
    }
}

fn find_client(
    clients: Vec<ClientOutput>,
    client_id: &str,
    tracked_chain_id: &str,
) -> Option<ClientOutput> {
    clients
        .into_iter()
        .find(|c| c.client_id == client_id && c.tracked_chain_id == tracked_chain_id)
}

fn match_connection(
    clients: &ClientPair,
    created: &CreatedIds,
    on_a: &[ConnectionOutput],
    on_b: &[ConnectionOutput],
) -> Option<ConnectionPair> {
    let end_a = on_a.iter().find(|c| {
        c.connection_id == created.on_a
            && c.client_id == clients.on_a.client_id
            && c.counterparty.client_id == clients.on_b.client_id
            && c.counterparty.connection_id == created.on_b
            && c.state == EndState::Open
    })?;
    let end_b = on_b.iter().find(|c| {
        c.connection_id == created.on_b
            && c.client_id == clients.on_b.client_id
            && c.counterparty.connection_id == created.on_a
            && c.state == EndState::Open
    })?;
    Some(ConnectionPair {
        on_a: end_a.clone(),
        on_b: end_b.clone(),
    })
}

fn match_channel(
    connection: &ConnectionPair,
    options: &ChannelOptions,
    created: &CreatedIds,
    on_a: &[ChannelOutput],
    on_b: &[ChannelOutput],
) -> Option<ChannelPair> {
    let end_a = on_a.iter().find(|c| {
        c.channel_id == created.on_a
            && c.counterparty.channel_id == created.on_b
            && c.connection_hops.first() == Some(&connection.on_a.connection_id)
            && c.port_id == options.source_port
            && c.state == EndState::Open
    })?;
    let end_b = on_b.iter().find(|c| {
        c.channel_id == created.on_b
            && c.counterparty.channel_id == created.on_a
            && c.port_id == options.dest_port
            && c.connection_hops.first() == Some(&connection.on_b.connection_id)
            && c.state == EndState::Open
    })?;
    Some(ChannelPair {
        on_a: end_a.clone(),
        on_b: end_b.clone(),
    })
}
