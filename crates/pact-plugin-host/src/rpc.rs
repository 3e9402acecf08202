//! The RPC seam between the manager and running plugins.
//!
//! [`PluginRpc`] abstracts the ten wire operations so the manager never
//! depends on a live gRPC channel directly; the production implementation
//! wraps [`PactPluginClient`], and tests substitute doubles. The companion
//! [`PluginConnector`] abstracts dialing, including the loopback address
//! fallback: the channel is opened against `127.0.0.1` first and retried
//! once via the IPv6 loopback before the handshake is abandoned.

use std::sync::Arc;

use async_trait::async_trait;
use tonic::transport::Channel;
use tracing::debug;

use pact_plugin_proto::PactPluginClient;
use pact_plugin_proto::messages::{
    Catalogue, CompareContentsRequest, CompareContentsResponse, ConfigureInteractionRequest,
    ConfigureInteractionResponse, GenerateContentRequest, GenerateContentResponse,
    InitPluginRequest, InitPluginResponse, MockServerRequest, MockServerResults,
    ShutdownMockServerRequest, ShutdownMockServerResponse, StartMockServerRequest,
    StartMockServerResponse, VerificationPreparationRequest, VerificationPreparationResponse,
    VerifyInteractionRequest, VerifyInteractionResponse,
};

use crate::error::PluginError;

/// Tracing target for RPC operations.
const RPC_TARGET: &str = "pact_plugin_host::rpc";

/// Remote operations a running plugin serves.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PluginRpc: Send + Sync {
    /// Sends the init request, retrieving the plugin's catalogue entries.
    async fn init_plugin(
        &self,
        request: InitPluginRequest,
    ) -> Result<InitPluginResponse, PluginError>;

    /// Pushes the merged capability catalogue to the plugin.
    async fn update_catalogue(&self, request: Catalogue) -> Result<(), PluginError>;

    /// Compares actual contents against expected contents.
    async fn compare_contents(
        &self,
        request: CompareContentsRequest,
    ) -> Result<CompareContentsResponse, PluginError>;

    /// Configures an interaction from user-supplied data.
    async fn configure_interaction(
        &self,
        request: ConfigureInteractionRequest,
    ) -> Result<ConfigureInteractionResponse, PluginError>;

    /// Generates contents using the defined generators.
    async fn generate_content(
        &self,
        request: GenerateContentRequest,
    ) -> Result<GenerateContentResponse, PluginError>;

    /// Starts a mock server for a pact.
    async fn start_mock_server(
        &self,
        request: StartMockServerRequest,
    ) -> Result<StartMockServerResponse, PluginError>;

    /// Shuts a running mock server down.
    async fn shutdown_mock_server(
        &self,
        request: ShutdownMockServerRequest,
    ) -> Result<ShutdownMockServerResponse, PluginError>;

    /// Fetches match results from a running mock server.
    async fn get_mock_server_results(
        &self,
        request: MockServerRequest,
    ) -> Result<MockServerResults, PluginError>;

    /// Prepares an interaction for verification.
    async fn prepare_interaction_for_verification(
        &self,
        request: VerificationPreparationRequest,
    ) -> Result<VerificationPreparationResponse, PluginError>;

    /// Executes the verification of a prepared interaction.
    async fn verify_interaction(
        &self,
        request: VerifyInteractionRequest,
    ) -> Result<VerifyInteractionResponse, PluginError>;
}

/// Dials a freshly-launched plugin and yields its RPC handle.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PluginConnector: Send + Sync {
    /// Connects to the plugin that announced the given port and server key.
    async fn connect(
        &self,
        plugin_name: &str,
        port: u16,
        server_key: &str,
    ) -> Result<Arc<dyn PluginRpc>, PluginError>;
}

/// Production connector dialing the plugin's gRPC port over loopback.
#[derive(Debug, Default, Clone, Copy)]
pub struct GrpcConnector;

#[async_trait]
impl PluginConnector for GrpcConnector {
    async fn connect(
        &self,
        plugin_name: &str,
        port: u16,
        server_key: &str,
    ) -> Result<Arc<dyn PluginRpc>, PluginError> {
        let channel = connect_channel(plugin_name, port).await?;
        let client = PactPluginClient::new(channel, server_key).map_err(|status| {
            PluginError::Connect { name: plugin_name.to_owned(), message: status.to_string() }
        })?;
        Ok(Arc::new(GrpcPluginRpc { plugin_name: plugin_name.to_owned(), client }))
    }
}

async fn connect_channel(plugin_name: &str, port: u16) -> Result<Channel, PluginError> {
    let connect = |address: String| async move {
        Channel::from_shared(address)
            .map_err(|err| err.to_string())?
            .connect()
            .await
            .map_err(|err| err.to_string())
    };

    match connect(format!("http://127.0.0.1:{port}")).await {
        Ok(channel) => Ok(channel),
        Err(err) => {
            debug!(
                target: RPC_TARGET,
                plugin = plugin_name, %err, "IP4 connection failed, will try the IP6 address"
            );
            connect(format!("http://[::1]:{port}")).await.map_err(|message| {
                PluginError::Connect { name: plugin_name.to_owned(), message }
            })
        }
    }
}

/// [`PluginRpc`] implementation over a live gRPC channel.
#[derive(Debug, Clone)]
pub struct GrpcPluginRpc {
    plugin_name: String,
    client: PactPluginClient,
}

impl GrpcPluginRpc {
    fn rpc_error(&self, source: tonic::Status) -> PluginError {
        PluginError::Rpc { name: self.plugin_name.clone(), source }
    }
}

#[async_trait]
impl PluginRpc for GrpcPluginRpc {
    async fn init_plugin(
        &self,
        request: InitPluginRequest,
    ) -> Result<InitPluginResponse, PluginError> {
        let mut client = self.client.clone();
        client.init_plugin(request).await.map_err(|status| self.rpc_error(status))
    }

    async fn update_catalogue(&self, request: Catalogue) -> Result<(), PluginError> {
        let mut client = self.client.clone();
        client.update_catalogue(request).await.map_err(|status| self.rpc_error(status))
    }

    async fn compare_contents(
        &self,
        request: CompareContentsRequest,
    ) -> Result<CompareContentsResponse, PluginError> {
        let mut client = self.client.clone();
        client.compare_contents(request).await.map_err(|status| self.rpc_error(status))
    }

    async fn configure_interaction(
        &self,
        request: ConfigureInteractionRequest,
    ) -> Result<ConfigureInteractionResponse, PluginError> {
        let mut client = self.client.clone();
        client.configure_interaction(request).await.map_err(|status| self.rpc_error(status))
    }

    async fn generate_content(
        &self,
        request: GenerateContentRequest,
    ) -> Result<GenerateContentResponse, PluginError> {
        let mut client = self.client.clone();
        client.generate_content(request).await.map_err(|status| self.rpc_error(status))
    }

    async fn start_mock_server(
        &self,
        request: StartMockServerRequest,
    ) -> Result<StartMockServerResponse, PluginError> {
        let mut client = self.client.clone();
        client.start_mock_server(request).await.map_err(|status| self.rpc_error(status))
    }

    async fn shutdown_mock_server(
        &self,
        request: ShutdownMockServerRequest,
    ) -> Result<ShutdownMockServerResponse, PluginError> {
        let mut client = self.client.clone();
        client.shutdown_mock_server(request).await.map_err(|status| self.rpc_error(status))
    }

    async fn get_mock_server_results(
        &self,
        request: MockServerRequest,
    ) -> Result<MockServerResults, PluginError> {
        let mut client = self.client.clone();
        client.get_mock_server_results(request).await.map_err(|status| self.rpc_error(status))
    }

    async fn prepare_interaction_for_verification(
        &self,
        request: VerificationPreparationRequest,
    ) -> Result<VerificationPreparationResponse, PluginError> {
        let mut client = self.client.clone();
        client
            .prepare_interaction_for_verification(request)
            .await
            .map_err(|status| self.rpc_error(status))
    }

    async fn verify_interaction(
        &self,
        request: VerifyInteractionRequest,
    ) -> Result<VerifyInteractionResponse, PluginError> {
        let mut client = self.client.clone();
        client.verify_interaction(request).await.map_err(|status| self.rpc_error(status))
    }
}
