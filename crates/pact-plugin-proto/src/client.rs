//! Unary gRPC client for the plugin control channel.
//!
//! The host is always the client: it dials the port the plugin announced in
//! its startup handshake and authenticates every call with the bearer token
//! (`serverKey`) from the same handshake, carried in the `authorization`
//! metadata entry. All ten service methods are simple unary calls, so the
//! client funnels them through one generic helper instead of carrying
//! generated per-method plumbing.

use tonic::client::Grpc;
use tonic::codec::ProstCodec;
use tonic::codegen::InterceptedService;
use tonic::codegen::http::uri::PathAndQuery;
use tonic::metadata::{Ascii, MetadataValue};
use tonic::service::Interceptor;
use tonic::transport::Channel;
use tonic::{Request, Status};

use crate::messages::{
    Catalogue, CompareContentsRequest, CompareContentsResponse, ConfigureInteractionRequest,
    ConfigureInteractionResponse, GenerateContentRequest, GenerateContentResponse,
    InitPluginRequest, InitPluginResponse, MockServerRequest, MockServerResults,
    ShutdownMockServerRequest, ShutdownMockServerResponse, StartMockServerRequest,
    StartMockServerResponse, VerificationPreparationRequest, VerificationPreparationResponse,
    VerifyInteractionRequest, VerifyInteractionResponse,
};

/// Fully-qualified gRPC service name of the plugin control channel.
pub const SERVICE_NAME: &str = "io.pact.plugin.PactPlugin";

/// Injects the plugin's announced server key as a bearer credential on every
/// outgoing call.
#[derive(Clone, Debug)]
pub struct ServerKeyInterceptor {
    token: MetadataValue<Ascii>,
}

impl ServerKeyInterceptor {
    /// Builds an interceptor for the given server key.
    ///
    /// # Errors
    ///
    /// Returns a [`Status`] if the key contains bytes that cannot be carried
    /// in an ASCII metadata value.
    pub fn new(server_key: &str) -> Result<Self, Status> {
        let token = MetadataValue::try_from(server_key)
            .map_err(|err| Status::invalid_argument(format!("invalid server key: {err}")))?;
        Ok(Self { token })
    }
}

impl Interceptor for ServerKeyInterceptor {
    fn call(&mut self, mut request: Request<()>) -> Result<Request<()>, Status> {
        request.metadata_mut().insert("authorization", self.token.clone());
        Ok(request)
    }
}

/// Client for the `io.pact.plugin.PactPlugin` service.
///
/// Cheap to clone; clones share the underlying HTTP/2 channel.
#[derive(Clone, Debug)]
pub struct PactPluginClient {
    inner: Grpc<InterceptedService<Channel, ServerKeyInterceptor>>,
}

impl PactPluginClient {
    /// Wraps an established channel, attaching the plugin's server key as a
    /// per-call credential.
    ///
    /// # Errors
    ///
    /// Returns a [`Status`] if the server key is not a valid metadata value.
    pub fn new(channel: Channel, server_key: &str) -> Result<Self, Status> {
        let interceptor = ServerKeyInterceptor::new(server_key)?;
        Ok(Self {
            inner: Grpc::new(InterceptedService::new(channel, interceptor)),
        })
    }

    async fn unary<Req, Resp>(&mut self, method: &'static str, request: Req) -> Result<Resp, Status>
    where
        Req: prost::Message + Send + Sync + 'static,
        Resp: prost::Message + Default + Send + Sync + 'static,
    {
        self.inner
            .ready()
            .await
            .map_err(|err| Status::unknown(format!("plugin channel was not ready: {err}")))?;
        let codec: ProstCodec<Req, Resp> = ProstCodec::default();
        let response = self
            .inner
            .unary(Request::new(request), PathAndQuery::from_static(method), codec)
            .await?;
        Ok(response.into_inner())
    }

    /// Verifies the plugin loaded OK and retrieves its catalogue entries.
    ///
    /// # Errors
    ///
    /// Returns the transport-level [`Status`] if the call fails.
    pub async fn init_plugin(
        &mut self,
        request: InitPluginRequest,
    ) -> Result<InitPluginResponse, Status> {
        self.unary("/io.pact.plugin.PactPlugin/InitPlugin", request).await
    }

    /// Pushes the merged capability catalogue to the plugin.
    ///
    /// # Errors
    ///
    /// Returns the transport-level [`Status`] if the call fails.
    pub async fn update_catalogue(&mut self, request: Catalogue) -> Result<(), Status> {
        self.unary("/io.pact.plugin.PactPlugin/UpdateCatalogue", request).await
    }

    /// Asks the plugin to compare actual contents against expected contents.
    ///
    /// # Errors
    ///
    /// Returns the transport-level [`Status`] if the call fails.
    pub async fn compare_contents(
        &mut self,
        request: CompareContentsRequest,
    ) -> Result<CompareContentsResponse, Status> {
        self.unary("/io.pact.plugin.PactPlugin/CompareContents", request).await
    }

    /// Asks the plugin to configure an interaction from user-supplied data.
    ///
    /// # Errors
    ///
    /// Returns the transport-level [`Status`] if the call fails.
    pub async fn configure_interaction(
        &mut self,
        request: ConfigureInteractionRequest,
    ) -> Result<ConfigureInteractionResponse, Status> {
        self.unary("/io.pact.plugin.PactPlugin/ConfigureInteraction", request).await
    }

    /// Asks the plugin to generate contents using the defined generators.
    ///
    /// # Errors
    ///
    /// Returns the transport-level [`Status`] if the call fails.
    pub async fn generate_content(
        &mut self,
        request: GenerateContentRequest,
    ) -> Result<GenerateContentResponse, Status> {
        self.unary("/io.pact.plugin.PactPlugin/GenerateContent", request).await
    }

    /// Starts a mock server for the given pact.
    ///
    /// # Errors
    ///
    /// Returns the transport-level [`Status`] if the call fails.
    pub async fn start_mock_server(
        &mut self,
        request: StartMockServerRequest,
    ) -> Result<StartMockServerResponse, Status> {
        self.unary("/io.pact.plugin.PactPlugin/StartMockServer", request).await
    }

    /// Shuts a running mock server down, returning its match results.
    ///
    /// # Errors
    ///
    /// Returns the transport-level [`Status`] if the call fails.
    pub async fn shutdown_mock_server(
        &mut self,
        request: ShutdownMockServerRequest,
    ) -> Result<ShutdownMockServerResponse, Status> {
        self.unary("/io.pact.plugin.PactPlugin/ShutdownMockServer", request).await
    }

    /// Fetches the match results from a running mock server.
    ///
    /// # Errors
    ///
    /// Returns the transport-level [`Status`] if the call fails.
    pub async fn get_mock_server_results(
        &mut self,
        request: MockServerRequest,
    ) -> Result<MockServerResults, Status> {
        self.unary("/io.pact.plugin.PactPlugin/GetMockServerResults", request).await
    }

    /// Prepares an interaction for verification, returning the data required
    /// to construct the request.
    ///
    /// # Errors
    ///
    /// Returns the transport-level [`Status`] if the call fails.
    pub async fn prepare_interaction_for_verification(
        &mut self,
        request: VerificationPreparationRequest,
    ) -> Result<VerificationPreparationResponse, Status> {
        self.unary("/io.pact.plugin.PactPlugin/PrepareInteractionForVerification", request)
            .await
    }

    /// Executes the verification of a prepared interaction.
    ///
    /// # Errors
    ///
    /// Returns the transport-level [`Status`] if the call fails.
    pub async fn verify_interaction(
        &mut self,
        request: VerifyInteractionRequest,
    ) -> Result<VerifyInteractionResponse, Status> {
        self.unary("/io.pact.plugin.PactPlugin/VerifyInteraction", request).await
    }
}
