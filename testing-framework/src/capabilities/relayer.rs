// File: testing-framework/src/capabilities/relayer.rs

use super::ProcessContext;
use crate::config::ChainConfig;
use crate::ibc::{
    ChannelOptions, ChannelOutput, ClientOutput, ConnectionOutput, CreatedIds, KeyMaterial,
    RelayReport, ResolvedClientOptions,
};
use anyhow::Result;
use async_trait::async_trait;

/// Relayer adapter.
///
/// Handshake methods block until the relayer reports completion and return
/// the identifiers they created on each chain. An `Err` from any of them is
/// treated as a protocol rejection and is not retried; whether the created
/// artifacts are queryable yet is checked separately through the `get_*`
/// queries.
///
/// The background relay loop is owned by the orchestrator, which calls
/// `relay` repeatedly between `start_relaying` and `stop_relaying`.
#[async_trait]
pub trait Relayer: Send + Sync {
    /// Prepare the relayer's processes on the shared network
    async fn initialize(&self, _ctx: &ProcessContext) -> Result<()> {
        Ok(())
    }

    /// Register a chain's endpoints
    async fn add_chain_configuration(
        &self,
        chain: &ChainConfig,
        rpc_address: &str,
        grpc_address: &str,
    ) -> Result<()>;

    /// Import the key the relayer signs with on `chain_id`
    async fn restore_key(&self, chain_id: &str, key_name: &str, key: &KeyMaterial) -> Result<()>;

    /// Register `path` between two chain ids
    async fn generate_path(&self, path: &str, chain_a_id: &str, chain_b_id: &str) -> Result<()>;

    /// Create a light client of each chain on the other, returning the
    /// client ids
    async fn create_clients(
        &self,
        path: &str,
        options: &ResolvedClientOptions,
    ) -> Result<CreatedIds>;

    /// Run the connection-open handshake over the path's clients, returning
    /// the connection ids
    async fn create_connections(&self, path: &str) -> Result<CreatedIds>;

    /// Run the channel-open handshake over the path's connection, returning
    /// the channel ids
    async fn create_channel(&self, path: &str, options: &ChannelOptions) -> Result<CreatedIds>;

    /// Clients hosted on `chain_id`
    async fn get_clients(&self, chain_id: &str) -> Result<Vec<ClientOutput>>;

    /// Connections hosted on `chain_id`
    async fn get_connections(&self, chain_id: &str) -> Result<Vec<ConnectionOutput>>;

    /// Channels hosted on `chain_id`
    async fn get_channels(&self, chain_id: &str) -> Result<Vec<ChannelOutput>>;

    /// Called once before the orchestrator's relay loop for `path` starts
    async fn start_relaying(&self, _path: &str) -> Result<()> {
        Ok(())
    }

    /// One relay pass over `path`: deliver pending packets and acks
    async fn relay(&self, path: &str) -> Result<RelayReport>;

    /// Called during teardown after every relay loop of this relayer stopped
    async fn stop_relaying(&self) -> Result<()> {
        Ok(())
    }
}
