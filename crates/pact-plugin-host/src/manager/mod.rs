//! Orchestration of plugin discovery, launch, handshake and invocation.
//!
//! The [`PluginManager`] owns the manifest cache, the running-plugin
//! registry and the capability [`Catalogue`]. It resolves plugins (cache →
//! plugin directory scan → repository index + installer), launches them as
//! child processes, performs the startup and `InitPlugin` handshakes, keeps
//! every loaded plugin's view of the catalogue fresh through a background
//! broadcast worker, and carries out all content, mock-server and
//! verification operations by translating between the native model and the
//! wire protocol.
//!
//! All state is owned by the manager value: tests construct an isolated
//! manager per case with doubled collaborators.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use pact_plugin_proto::messages as proto;
use pact_plugin_proto::values::{proto_struct_to_map, proto_value_to_json, to_proto_struct};

use crate::catalogue::{Catalogue, CatalogueEntry};
use crate::content::{ContentGenerator, ContentMatcher};
use crate::error::PluginError;
use crate::manifest::{
    MANIFEST_FILE_NAME, PactPluginManifest, PluginDependency, max_by_version, parsed_version,
    versions_compatible,
};
use crate::model::{
    Body, ContentComparisonRequest, ContentGenerationRequest, ContentMismatch, ContentType,
    ContentTypeHint, GeneratorCategory, GeneratorDescriptor, GeneratorTestMode, Generators,
    InteractionContents, InteractionVerificationData, InteractionVerificationDetails,
    InteractionVerificationResult, MatchingRuleCategory, MatchingRuleDescriptor,
    MatchingRuleGroup, MetadataValue, MockServerConfig, MockServerResults, PactSource,
    PluginConfiguration,
};
use crate::process::{ChildProcess, DEFAULT_STARTUP_TIMEOUT};
use crate::repository::{DefaultRepository, DisabledInstaller, PluginInstaller, PluginRepository};
use crate::rpc::{GrpcConnector, PluginConnector, PluginRpc};

/// Tracing target for manager operations.
const MANAGER_TARGET: &str = "pact_plugin_host::manager";

/// How long a plugin shutdown waits for the process to exit.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

/// Depth of the catalogue broadcast queue. Broadcasts are best-effort: when
/// the queue is full under plugin churn the event is dropped with a warning.
const BROADCAST_QUEUE_DEPTH: usize = 16;

/// Implementation name reported to plugins in the `InitPlugin` request.
const IMPLEMENTATION: &str = "pact-plugin-host";

/// Configuration for a [`PluginManager`].
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Override for the plugin install directory. When unset the
    /// `PACT_PLUGIN_DIR` environment variable applies, then
    /// `{home}/.pact/plugins`.
    pub plugin_dir: Option<PathBuf>,
    /// Window for a launched plugin to announce its port and server key.
    pub startup_timeout: Duration,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self { plugin_dir: None, startup_timeout: DEFAULT_STARTUP_TIMEOUT }
    }
}

/// A running plugin: its manifest, child process and control channel.
///
/// The plugin is registered in the manager before the RPC handshake
/// completes, so a concurrent observer can briefly see an instance whose
/// RPC handle is not yet attached; such calls fail with
/// [`PluginError::NotInitialised`].
pub struct PactPlugin {
    manifest: PactPluginManifest,
    child: ChildProcess,
    port: u16,
    server_key: String,
    rpc: RwLock<Option<Arc<dyn PluginRpc>>>,
    catalogue_entries: RwLock<Vec<proto::CatalogueEntry>>,
    access: AtomicUsize,
    stopped: AtomicBool,
}

impl PactPlugin {
    fn new(manifest: PactPluginManifest, child: ChildProcess, port: u16, server_key: String) -> Self {
        Self {
            manifest,
            child,
            port,
            server_key,
            rpc: RwLock::new(None),
            catalogue_entries: RwLock::new(Vec::new()),
            access: AtomicUsize::new(1),
            stopped: AtomicBool::new(false),
        }
    }

    /// Manifest the plugin was launched from.
    #[must_use]
    pub const fn manifest(&self) -> &PactPluginManifest {
        &self.manifest
    }

    /// Port of the plugin's gRPC server, learned from the startup handshake.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Bearer token the plugin chose for authenticating host calls.
    #[must_use]
    pub fn server_key(&self) -> &str {
        &self.server_key
    }

    /// OS pid of the plugin process.
    #[must_use]
    pub const fn process_pid(&self) -> u32 {
        self.child.pid()
    }

    /// The catalogue entries the plugin reported during its handshake.
    #[must_use]
    pub fn catalogue_entries(&self) -> Vec<proto::CatalogueEntry> {
        self.catalogue_entries.read().map(|entries| entries.clone()).unwrap_or_default()
    }

    /// Registry key of this instance (`"{name}/{version}"`).
    #[must_use]
    pub fn key(&self) -> String {
        self.manifest.key()
    }

    fn rpc(&self) -> Result<Arc<dyn PluginRpc>, PluginError> {
        self.rpc
            .read()
            .ok()
            .and_then(|guard| guard.clone())
            .ok_or_else(|| PluginError::NotInitialised { name: self.manifest.name.clone() })
    }

    fn attach_rpc(&self, rpc: Arc<dyn PluginRpc>) {
        if let Ok(mut guard) = self.rpc.write() {
            *guard = Some(rpc);
        }
    }

    fn record_catalogue_entries(&self, entries: Vec<proto::CatalogueEntry>) {
        if let Ok(mut guard) = self.catalogue_entries.write() {
            *guard = entries;
        }
    }

    /// Bumps the usage count, returning the new value.
    pub fn update_access(&self) -> usize {
        let count = self.access.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(
            target: MANAGER_TARGET,
            plugin = self.manifest.name, version = self.manifest.version, count,
            "plugin access incremented"
        );
        count
    }

    /// Drops one usage, returning the remaining count. The count never goes
    /// below zero.
    pub fn drop_access(&self) -> usize {
        let previous = self
            .access
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |count| count.checked_sub(1))
            .unwrap_or_default();
        previous.saturating_sub(1)
    }

    /// Shuts the plugin down: detaches the control channel, kills the
    /// process and waits for it to exit within a short grace period. Safe to
    /// call more than once.
    pub async fn shutdown(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!(
            target: MANAGER_TARGET,
            plugin = self.manifest.name, version = self.manifest.version, "shutting plugin down"
        );
        if let Ok(mut guard) = self.rpc.write() {
            guard.take();
        }
        self.child.destroy();
        if !self.child.wait_for_exit(SHUTDOWN_GRACE).await {
            warn!(
                target: MANAGER_TARGET,
                plugin = self.manifest.name, pid = self.child.pid(),
                "plugin process did not exit within the grace period"
            );
        }
    }
}

impl fmt::Debug for PactPlugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PactPlugin")
            .field("name", &self.manifest.name)
            .field("version", &self.manifest.version)
            .field("port", &self.port)
            .field("pid", &self.child.pid())
            .finish_non_exhaustive()
    }
}

/// Details of a mock server a plugin is running on the host's behalf.
#[derive(Debug, Clone)]
pub struct MockServerDetails {
    /// Unique key of the mock server.
    pub key: String,
    /// Base URL of the running mock server.
    pub base_url: String,
    /// Port the mock server is bound to.
    pub port: u32,
    /// The plugin that owns the mock server.
    pub plugin: Arc<PactPlugin>,
}

/// A queued catalogue broadcast: a snapshot of the catalogue and of the
/// plugins to push it to.
struct CatalogueBroadcast {
    catalogue: proto::Catalogue,
    plugins: Vec<Arc<PactPlugin>>,
}

/// The plugin orchestration core.
pub struct PluginManager {
    config: ManagerConfig,
    catalogue: Catalogue,
    manifests: Mutex<HashMap<String, PactPluginManifest>>,
    plugins: tokio::sync::Mutex<HashMap<String, Arc<PactPlugin>>>,
    connector: Arc<dyn PluginConnector>,
    repository: Arc<dyn PluginRepository>,
    installer: Arc<dyn PluginInstaller>,
    broadcasts: mpsc::Sender<CatalogueBroadcast>,
}

impl PluginManager {
    /// Creates a manager with the production collaborators: a gRPC
    /// connector, the default repository and no installer.
    ///
    /// Must be called within a tokio runtime; the catalogue broadcast worker
    /// is spawned here.
    #[must_use]
    pub fn new(config: ManagerConfig) -> Arc<Self> {
        let repository = DefaultRepository::new(resolve_plugin_dir(&config));
        Self::with_collaborators(
            config,
            Arc::new(GrpcConnector),
            Arc::new(repository),
            Arc::new(DisabledInstaller),
        )
    }

    /// Creates a manager with injected collaborators.
    ///
    /// Must be called within a tokio runtime; the catalogue broadcast worker
    /// is spawned here.
    #[must_use]
    pub fn with_collaborators(
        config: ManagerConfig,
        connector: Arc<dyn PluginConnector>,
        repository: Arc<dyn PluginRepository>,
        installer: Arc<dyn PluginInstaller>,
    ) -> Arc<Self> {
        let (broadcasts, receiver) = mpsc::channel(BROADCAST_QUEUE_DEPTH);
        tokio::spawn(broadcast_worker(receiver));
        Arc::new(Self {
            config,
            catalogue: Catalogue::new(),
            manifests: Mutex::new(HashMap::new()),
            plugins: tokio::sync::Mutex::new(HashMap::new()),
            connector,
            repository,
            installer,
            broadcasts,
        })
    }

    /// The capability catalogue owned by this manager.
    #[must_use]
    pub const fn catalogue(&self) -> &Catalogue {
        &self.catalogue
    }

    /// Registers the host's built-in capabilities. Intended to run exactly
    /// once at bootstrap.
    pub fn register_core_entries(&self, entries: &[CatalogueEntry]) {
        self.catalogue.register_core_entries(entries);
    }

    /// The directory plugins are installed in: the configured override, the
    /// `PACT_PLUGIN_DIR` environment variable, or `{home}/.pact/plugins`.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::NoPluginDirectory`] when none of the sources
    /// yields a directory.
    pub fn plugin_install_dir(&self) -> Result<PathBuf, PluginError> {
        resolve_plugin_dir(&self.config).ok_or(PluginError::NoPluginDirectory)
    }

    /// Finds a content matcher for the content type, wrapped as a facade
    /// bound to this manager.
    #[must_use]
    pub fn find_content_matcher(self: &Arc<Self>, content_type: &ContentType) -> Option<ContentMatcher> {
        self.catalogue
            .find_content_matcher(content_type)
            .map(|entry| ContentMatcher::new(entry, Arc::clone(self)))
    }

    /// Finds a content generator for the content type, wrapped as a facade
    /// bound to this manager.
    #[must_use]
    pub fn find_content_generator(
        self: &Arc<Self>,
        content_type: &ContentType,
    ) -> Option<ContentGenerator> {
        self.catalogue
            .find_content_generator(content_type)
            .map(|entry| ContentGenerator::new(entry, Arc::clone(self)))
    }

    /// Loads the plugin identified by the dependency, launching and
    /// initialising it if it is not already running.
    ///
    /// Re-loading a running plugin is idempotent: the existing instance is
    /// returned with its usage count bumped. Without a pinned version the
    /// highest loaded version wins under semver ordering. The registry lock
    /// is held across the whole check-then-launch sequence so concurrent
    /// loads of the same plugin cannot double-spawn.
    ///
    /// # Errors
    ///
    /// Returns a [`PluginError`] naming the resolution step that failed:
    /// manifest discovery, process start, startup handshake or the
    /// `InitPlugin` call.
    pub async fn load_plugin(&self, dependency: &PluginDependency) -> Result<Arc<PactPlugin>, PluginError> {
        debug!(target: MANAGER_TARGET, plugin = dependency.name, version = ?dependency.version, "loading plugin");
        let mut registry = self.plugins.lock().await;
        if let Some(plugin) = lookup_registered(&registry, dependency) {
            debug!(target: MANAGER_TARGET, plugin = dependency.name, "found running plugin");
            plugin.update_access();
            return Ok(plugin);
        }

        let manifest = self.resolve_manifest(dependency)?;
        self.initialise_plugin(&manifest, &mut registry).await
    }

    /// Looks a running plugin up without loading it.
    pub async fn lookup_plugin(&self, dependency: &PluginDependency) -> Option<Arc<PactPlugin>> {
        let registry = self.plugins.lock().await;
        lookup_registered(&registry, dependency)
    }

    /// Drops one usage of the plugin. When the count reaches zero the plugin
    /// is shut down, deregistered and its catalogue entries removed.
    pub async fn drop_plugin_access(&self, dependency: &PluginDependency) {
        let mut registry = self.plugins.lock().await;
        let Some(plugin) = lookup_registered(&registry, dependency) else {
            return;
        };
        if plugin.drop_access() == 0 {
            registry.remove(&plugin.key());
            drop(registry);
            plugin.shutdown().await;
            self.catalogue.remove_plugin_entries(&plugin.manifest().name);
        }
    }

    /// Shuts down the given plugin and removes it from the registry and the
    /// catalogue.
    pub async fn shutdown_plugin(&self, dependency: &PluginDependency) {
        let mut registry = self.plugins.lock().await;
        let Some(plugin) = lookup_registered(&registry, dependency) else {
            return;
        };
        registry.remove(&plugin.key());
        drop(registry);
        plugin.shutdown().await;
        self.catalogue.remove_plugin_entries(&plugin.manifest().name);
    }

    /// Shuts down every running plugin.
    pub async fn shutdown_plugins(&self) {
        debug!(target: MANAGER_TARGET, "shutting down all plugins");
        let plugins: Vec<Arc<PactPlugin>> = {
            let mut registry = self.plugins.lock().await;
            registry.drain().map(|(_, plugin)| plugin).collect()
        };
        for plugin in plugins {
            plugin.shutdown().await;
            self.catalogue.remove_plugin_entries(&plugin.manifest().name);
        }
    }

    // -----------------------------------------------------------------------
    // Content matching and generation
    // -----------------------------------------------------------------------

    /// Invokes the plugin behind the matcher entry to compare contents.
    ///
    /// A response-level error is folded into a single mismatch at the root
    /// path `"$"` carrying the original expected/actual bytes, so the error
    /// message is never lost.
    ///
    /// # Errors
    ///
    /// Returns a [`PluginError`] when the plugin is not running or the call
    /// fails at the transport level.
    pub async fn invoke_content_matcher(
        &self,
        entry: &CatalogueEntry,
        request: &ContentComparisonRequest,
    ) -> Result<HashMap<String, Vec<ContentMismatch>>, PluginError> {
        let plugin = self.plugin_for_entry(entry).await?;
        let plugin_config = request.plugin_configuration.get(&plugin.manifest().name);
        let wire_request = proto::CompareContentsRequest {
            expected: Some(body_to_wire(&request.expected)),
            actual: Some(body_to_wire(&request.actual)),
            allow_unexpected_keys: request.allow_unexpected_keys,
            rules: rules_to_wire(&request.rules),
            plugin_configuration: plugin_config.map(plugin_config_to_wire),
        };
        debug!(target: MANAGER_TARGET, plugin = plugin.manifest().name, "sending compareContents request");
        let response = plugin.rpc()?.compare_contents(wire_request).await?;
        debug!(target: MANAGER_TARGET, "got compareContents response");
        Ok(translate_compare_response(request, &response))
    }

    /// Asks the plugin behind the matcher entry to configure an interaction
    /// from the user-supplied definition. A plugin may return several parts
    /// (for instance `request` and `response`); they are returned in the
    /// order received.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::ConfigureInteraction`] when the plugin reports
    /// an error, or a transport-level [`PluginError`].
    pub async fn configure_content_matcher_interaction(
        &self,
        entry: &CatalogueEntry,
        content_type: &str,
        config: &HashMap<String, serde_json::Value>,
    ) -> Result<Vec<InteractionContents>, PluginError> {
        let plugin = self.plugin_for_entry(entry).await?;
        let request = proto::ConfigureInteractionRequest {
            content_type: content_type.to_owned(),
            contents_config: Some(to_proto_struct(config)),
        };
        debug!(target: MANAGER_TARGET, plugin = plugin.manifest().name, "sending configureInteraction request");
        let response = plugin.rpc()?.configure_interaction(request).await?;
        debug!(target: MANAGER_TARGET, "got configureInteraction response");

        if !response.error.is_empty() {
            return Err(PluginError::ConfigureInteraction {
                name: plugin.manifest().name.clone(),
                message: response.error,
            });
        }

        // Pact-scoped configuration at the response level is shared by every
        // part; each part starts from a copy and overlays its own fields.
        let global_config = response
            .plugin_configuration
            .as_ref()
            .map(|config| PluginConfiguration {
                interaction_configuration: HashMap::new(),
                pact_configuration: config
                    .pact_configuration
                    .as_ref()
                    .map(proto_struct_to_map)
                    .unwrap_or_default(),
            })
            .unwrap_or_default();

        let mut results = Vec::with_capacity(response.interaction.len());
        for part in &response.interaction {
            results.push(decode_interaction_part(part, &global_config));
        }
        Ok(results)
    }

    /// Invokes the plugin behind the generator entry to generate contents
    /// for a body. Only the content round-trips; matching rules and metadata
    /// do not.
    ///
    /// # Errors
    ///
    /// Returns a [`PluginError`] when the plugin is not running or the call
    /// fails at the transport level.
    pub async fn generate_content(
        &self,
        entry: &CatalogueEntry,
        request: &ContentGenerationRequest,
    ) -> Result<Body, PluginError> {
        let plugin = self.plugin_for_entry(entry).await?;
        let plugin_name = &plugin.manifest().name;

        let pact_configuration = request
            .plugin_data
            .iter()
            .find(|data| &data.name == plugin_name)
            .map(|data| to_proto_struct(&data.configuration));
        let interaction_configuration =
            request.interaction_data.get(plugin_name).map(to_proto_struct);

        let wire_request = proto::GenerateContentRequest {
            contents: Some(body_to_wire(&request.body)),
            generators: request
                .generators
                .iter()
                .map(|(key, generator)| (key.clone(), generator_to_wire(generator)))
                .collect(),
            plugin_configuration: Some(proto::PluginConfiguration {
                interaction_configuration,
                pact_configuration,
            }),
            test_context: Some(to_proto_struct(&request.test_context)),
            test_mode: match request.test_mode {
                GeneratorTestMode::Consumer => proto::TestMode::Consumer as i32,
                GeneratorTestMode::Provider => proto::TestMode::Provider as i32,
            },
            content_for: if request.for_request {
                proto::ContentFor::Request as i32
            } else {
                proto::ContentFor::Response as i32
            },
        };
        debug!(target: MANAGER_TARGET, plugin = %plugin_name, "sending generateContent request");
        let response = plugin.rpc()?.generate_content(wire_request).await?;
        debug!(target: MANAGER_TARGET, "got generateContent response");

        Ok(response.contents.as_ref().map_or_else(Body::empty, |contents| {
            Body::new(
                contents.content.clone().unwrap_or_default(),
                content_type_of(contents),
            )
        }))
    }

    // -----------------------------------------------------------------------
    // Mock servers
    // -----------------------------------------------------------------------

    /// Starts a mock server on the transport plugin behind the entry.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::MockServer`] naming the plugin when it reports
    /// a start failure, [`PluginError::Document`] when the pact cannot be
    /// rendered, or a transport-level [`PluginError`].
    pub async fn start_mock_server(
        &self,
        entry: &CatalogueEntry,
        config: &MockServerConfig,
        pact: &dyn PactSource,
        test_context: &HashMap<String, serde_json::Value>,
    ) -> Result<MockServerDetails, PluginError> {
        let plugin = self.plugin_for_entry(entry).await?;
        let request = proto::StartMockServerRequest {
            host_interface: config.host_interface.clone().unwrap_or_default(),
            port: config.port,
            tls: config.tls,
            pact: pact.to_canonical_json()?,
            test_context: Some(to_proto_struct(test_context)),
        };
        debug!(target: MANAGER_TARGET, plugin = plugin.manifest().name, "sending startMockServer request");
        let response = plugin.rpc()?.start_mock_server(request).await?;
        debug!(target: MANAGER_TARGET, "got startMockServer response");

        match response.response {
            Some(proto::StartMockServerOutcome::Details(details)) => Ok(MockServerDetails {
                key: details.key,
                base_url: details.address,
                port: details.port,
                plugin,
            }),
            Some(proto::StartMockServerOutcome::Error(error)) => Err(PluginError::MockServer {
                name: plugin.manifest().name.clone(),
                message: error,
            }),
            None => Err(PluginError::InvalidResponse {
                name: plugin.manifest().name.clone(),
                message: String::from("start mock server response carried no outcome"),
            }),
        }
    }

    /// Shuts a running mock server down. `None` means the server saw no
    /// mismatches, which is distinct from an empty result list.
    ///
    /// # Errors
    ///
    /// Returns a transport-level [`PluginError`] when the call fails.
    pub async fn shutdown_mock_server(
        &self,
        mock_server: &MockServerDetails,
    ) -> Result<Option<Vec<MockServerResults>>, PluginError> {
        let request = proto::ShutdownMockServerRequest { server_key: mock_server.key.clone() };
        debug!(
            target: MANAGER_TARGET,
            plugin = mock_server.plugin.manifest().name, server_key = mock_server.key,
            "sending shutdownMockServer request"
        );
        let response = mock_server.plugin.rpc()?.shutdown_mock_server(request).await?;
        debug!(target: MANAGER_TARGET, "got shutdownMockServer response");

        if response.ok {
            Ok(None)
        } else {
            Ok(Some(decode_mock_server_results(&response.results)))
        }
    }

    /// Fetches the results from a running mock server. `None` means the
    /// server saw no mismatches.
    ///
    /// # Errors
    ///
    /// Returns a transport-level [`PluginError`] when the call fails.
    pub async fn get_mock_server_results(
        &self,
        mock_server: &MockServerDetails,
    ) -> Result<Option<Vec<MockServerResults>>, PluginError> {
        let request = proto::MockServerRequest { server_key: mock_server.key.clone() };
        debug!(
            target: MANAGER_TARGET,
            plugin = mock_server.plugin.manifest().name, server_key = mock_server.key,
            "sending getMockServerResults request"
        );
        let response = mock_server.plugin.rpc()?.get_mock_server_results(request).await?;
        debug!(target: MANAGER_TARGET, "got getMockServerResults response");

        if response.ok {
            Ok(None)
        } else {
            Ok(Some(decode_mock_server_results(&response.results)))
        }
    }

    // -----------------------------------------------------------------------
    // Transport verification
    // -----------------------------------------------------------------------

    /// First verification phase: asks the transport plugin to prepare the
    /// request for an interaction, so the caller can amend it before
    /// execution.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::VerificationPreparation`] naming the plugin
    /// when it reports a failure, [`PluginError::Document`] when the pact
    /// cannot be rendered, or a transport-level [`PluginError`].
    pub async fn prepare_validation_for_interaction(
        &self,
        entry: &CatalogueEntry,
        pact: &dyn PactSource,
        interaction_key: &str,
        config: &HashMap<String, serde_json::Value>,
    ) -> Result<InteractionVerificationData, PluginError> {
        let plugin = self.plugin_for_entry(entry).await?;
        let request = proto::VerificationPreparationRequest {
            pact: pact.to_canonical_json()?,
            interaction_key: interaction_key.to_owned(),
            config: Some(to_proto_struct(config)),
        };
        debug!(
            target: MANAGER_TARGET,
            plugin = plugin.manifest().name, "sending prepareValidationForInteraction request"
        );
        let response = plugin.rpc()?.prepare_interaction_for_verification(request).await?;
        debug!(target: MANAGER_TARGET, "got prepareValidationForInteraction response");

        match response.response {
            Some(proto::VerificationPreparationOutcome::InteractionData(data)) => {
                Ok(decode_interaction_data(&data))
            }
            Some(proto::VerificationPreparationOutcome::Error(error)) => {
                Err(PluginError::VerificationPreparation {
                    name: plugin.manifest().name.clone(),
                    message: error,
                })
            }
            None => Err(PluginError::InvalidResponse {
                name: plugin.manifest().name.clone(),
                message: String::from("verification preparation response carried no outcome"),
            }),
        }
    }

    /// Second verification phase: executes the verification of an
    /// interaction prepared with
    /// [`PluginManager::prepare_validation_for_interaction`].
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::InvalidResponse`] with the plugin's failure
    /// string when the plugin reports an error, [`PluginError::Document`]
    /// when the pact cannot be rendered, or a transport-level
    /// [`PluginError`].
    pub async fn verify_interaction(
        &self,
        entry: &CatalogueEntry,
        verification_data: &InteractionVerificationData,
        config: &HashMap<String, serde_json::Value>,
        pact: &dyn PactSource,
        interaction_key: &str,
    ) -> Result<InteractionVerificationResult, PluginError> {
        let plugin = self.plugin_for_entry(entry).await?;
        let request = proto::VerifyInteractionRequest {
            interaction_data: Some(proto::InteractionData {
                body: Some(body_to_wire(&verification_data.request_body)),
                metadata: verification_data
                    .metadata
                    .iter()
                    .map(|(key, value)| (key.clone(), metadata_value_to_wire(value)))
                    .collect(),
            }),
            config: Some(to_proto_struct(config)),
            pact: pact.to_canonical_json()?,
            interaction_key: interaction_key.to_owned(),
        };
        debug!(target: MANAGER_TARGET, plugin = plugin.manifest().name, "sending verifyInteraction request");
        let response = plugin.rpc()?.verify_interaction(request).await?;
        debug!(target: MANAGER_TARGET, "got verifyInteraction response");

        match response.response {
            Some(proto::VerifyInteractionOutcome::Result(result)) => {
                Ok(decode_verification_result(&result))
            }
            Some(proto::VerifyInteractionOutcome::Error(error)) => Err(PluginError::InvalidResponse {
                name: plugin.manifest().name.clone(),
                message: format!("failed to verify the request: {error}"),
            }),
            None => Err(PluginError::InvalidResponse {
                name: plugin.manifest().name.clone(),
                message: String::from("verify interaction response carried no outcome"),
            }),
        }
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    async fn plugin_for_entry(&self, entry: &CatalogueEntry) -> Result<Arc<PactPlugin>, PluginError> {
        let name = entry.plugin_name().ok_or_else(|| PluginError::NotFound {
            name: entry.registry_key(),
            version: None,
        })?;
        self.lookup_plugin(&PluginDependency::plugin(name, None)).await.ok_or_else(|| {
            PluginError::NotFound { name: name.to_owned(), version: None }
        })
    }

    fn resolve_manifest(&self, dependency: &PluginDependency) -> Result<PactPluginManifest, PluginError> {
        if let Some(manifest) = self.cached_manifest(dependency) {
            return Ok(manifest);
        }
        match self.load_manifest_from_disk(dependency) {
            Ok(manifest) => Ok(manifest),
            Err(disk_error) => {
                warn!(
                    target: MANAGER_TARGET,
                    plugin = dependency.name, %disk_error,
                    "could not load plugin manifest from disk, will try to auto install it"
                );
                self.resolve_manifest_from_repository(dependency, disk_error)
            }
        }
    }

    fn cached_manifest(&self, dependency: &PluginDependency) -> Option<PactPluginManifest> {
        let guard = self.manifests.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(version) = &dependency.version {
            guard.get(&format!("{}/{version}", dependency.name)).cloned()
        } else {
            guard
                .values()
                .filter(|manifest| manifest.name == dependency.name)
                .max_by_key(|manifest| parsed_version(&manifest.version))
                .cloned()
        }
    }

    fn cache_manifest(&self, manifest: &PactPluginManifest) {
        let mut guard = self.manifests.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        guard.insert(manifest.key(), manifest.clone());
    }

    fn load_manifest_from_disk(&self, dependency: &PluginDependency) -> Result<PactPluginManifest, PluginError> {
        let plugin_dir = self.plugin_install_dir()?;
        debug!(target: MANAGER_TARGET, plugin_dir = %plugin_dir.display(), "looking for plugin manifests");

        let mut candidates = Vec::new();
        collect_manifests(&plugin_dir, dependency, &mut candidates);
        max_by_version(candidates).map_or_else(
            || {
                Err(PluginError::ManifestNotFound {
                    name: dependency.name.clone(),
                    version: dependency.version.clone(),
                    plugin_dir: plugin_dir.display().to_string(),
                })
            },
            |manifest| {
                self.cache_manifest(&manifest);
                Ok(manifest)
            },
        )
    }

    fn resolve_manifest_from_repository(
        &self,
        dependency: &PluginDependency,
        disk_error: PluginError,
    ) -> Result<PactPluginManifest, PluginError> {
        let index = self.repository.fetch_repository_index()?;
        let Some(plugin_version) =
            index.lookup_plugin_version(&dependency.name, dependency.version.as_deref())
        else {
            return Err(disk_error);
        };
        debug!(
            target: MANAGER_TARGET,
            plugin = dependency.name, version = plugin_version.version,
            "found an entry for the plugin in the repository index, will try to install it"
        );
        let manifest = self.installer.install_from_source(&plugin_version.source)?;
        self.cache_manifest(&manifest);
        Ok(manifest)
    }

    async fn initialise_plugin(
        &self,
        manifest: &PactPluginManifest,
        registry: &mut HashMap<String, Arc<PactPlugin>>,
    ) -> Result<Arc<PactPlugin>, PluginError> {
        if manifest.executable_type != "exec" {
            return Err(PluginError::UnsupportedExecutableType {
                name: manifest.name.clone(),
                executable_type: manifest.executable_type.clone(),
            });
        }

        let child = ChildProcess::spawn(manifest)?;
        let startup = child.startup_info(self.config.startup_timeout).await?;
        debug!(
            target: MANAGER_TARGET,
            plugin = manifest.name, port = startup.port,
            "plugin process started OK, sending init message"
        );

        let plugin =
            Arc::new(PactPlugin::new(manifest.clone(), child, startup.port, startup.server_key));
        // Registered before the RPC handshake completes: a concurrent
        // observer may see this instance without an attached RPC handle.
        registry.insert(plugin.key(), Arc::clone(&plugin));

        match self.init_handshake(&plugin).await {
            Ok(()) => {
                let snapshot = registry.values().cloned().collect();
                self.schedule_catalogue_broadcast(snapshot);
                Ok(plugin)
            }
            Err(err) => {
                registry.remove(&plugin.key());
                plugin.shutdown().await;
                Err(err)
            }
        }
    }

    async fn init_handshake(&self, plugin: &Arc<PactPlugin>) -> Result<(), PluginError> {
        let manifest = plugin.manifest();
        let rpc = self
            .connector
            .connect(&manifest.name, plugin.port(), plugin.server_key())
            .await?;
        let request = proto::InitPluginRequest {
            implementation: IMPLEMENTATION.to_owned(),
            version: env!("CARGO_PKG_VERSION").to_owned(),
        };
        let response = rpc.init_plugin(request).await?;
        debug!(
            target: MANAGER_TARGET,
            plugin = manifest.name, entries = response.catalogue.len(),
            "got init response from plugin"
        );
        plugin.attach_rpc(rpc);
        self.catalogue.register_plugin_entries(&manifest.name, &response.catalogue);
        plugin.record_catalogue_entries(response.catalogue);
        Ok(())
    }

    /// Queues a best-effort broadcast of the whole catalogue to the given
    /// plugins. Never blocks the caller; a full queue drops the event.
    fn schedule_catalogue_broadcast(&self, plugins: Vec<Arc<PactPlugin>>) {
        let catalogue = proto::Catalogue {
            catalogue: self
                .catalogue
                .entries()
                .into_iter()
                .map(|(registry_key, entry)| proto::CatalogueEntry {
                    r#type: entry.entry_type.to_wire(),
                    key: registry_key,
                    values: entry.values,
                })
                .collect(),
        };
        if let Err(err) = self.broadcasts.try_send(CatalogueBroadcast { catalogue, plugins }) {
            warn!(target: MANAGER_TARGET, %err, "dropping catalogue broadcast");
        }
    }
}

impl fmt::Debug for PluginManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginManager").field("config", &self.config).finish_non_exhaustive()
    }
}

/// Pushes queued catalogue snapshots to every plugin in the snapshot.
/// Failures are logged and swallowed: broadcasts are best-effort.
async fn broadcast_worker(mut receiver: mpsc::Receiver<CatalogueBroadcast>) {
    while let Some(broadcast) = receiver.recv().await {
        for plugin in &broadcast.plugins {
            let result = match plugin.rpc() {
                Ok(rpc) => rpc.update_catalogue(broadcast.catalogue.clone()).await,
                Err(err) => Err(err),
            };
            if let Err(err) = result {
                warn!(
                    target: MANAGER_TARGET,
                    plugin = plugin.manifest().name, %err,
                    "failed to send updated catalogue to plugin"
                );
            }
        }
    }
}

fn lookup_registered(
    registry: &HashMap<String, Arc<PactPlugin>>,
    dependency: &PluginDependency,
) -> Option<Arc<PactPlugin>> {
    if let Some(version) = &dependency.version {
        registry.get(&format!("{}/{version}", dependency.name)).cloned()
    } else {
        registry
            .values()
            .filter(|plugin| plugin.manifest().name == dependency.name)
            .max_by_key(|plugin| parsed_version(&plugin.manifest().version))
            .cloned()
    }
}

fn resolve_plugin_dir(config: &ManagerConfig) -> Option<PathBuf> {
    if let Some(dir) = &config.plugin_dir {
        return Some(dir.clone());
    }
    match std::env::var_os("PACT_PLUGIN_DIR") {
        Some(dir) if !dir.is_empty() => Some(PathBuf::from(dir)),
        _ => dirs::home_dir().map(|home| home.join(".pact").join("plugins")),
    }
}

/// Recursively collects manifests under `dir` matching the dependency.
/// Unreadable directories and malformed manifests are skipped with a
/// warning; they never abort the scan.
fn collect_manifests(
    dir: &std::path::Path,
    dependency: &PluginDependency,
    results: &mut Vec<PactPluginManifest>,
) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_manifests(&path, dependency, results);
        } else if path.file_name().is_some_and(|name| name == MANIFEST_FILE_NAME) {
            debug!(target: MANAGER_TARGET, manifest = %path.display(), "found plugin manifest");
            match PactPluginManifest::load_from(&path) {
                Ok(manifest) => {
                    if manifest.name == dependency.name
                        && versions_compatible(&manifest.version, dependency.version.as_deref())
                    {
                        results.push(manifest);
                    }
                }
                Err(err) => {
                    warn!(target: MANAGER_TARGET, manifest = %path.display(), %err, "skipping manifest");
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Wire translation
// ---------------------------------------------------------------------------

fn hint_to_wire(hint: ContentTypeHint) -> i32 {
    (match hint {
        ContentTypeHint::Default => proto::ContentTypeHint::Default,
        ContentTypeHint::Text => proto::ContentTypeHint::Text,
        ContentTypeHint::Binary => proto::ContentTypeHint::Binary,
    }) as i32
}

const fn hint_from_wire(value: i32) -> ContentTypeHint {
    match proto::ContentTypeHint::from_wire(value) {
        proto::ContentTypeHint::Default => ContentTypeHint::Default,
        proto::ContentTypeHint::Text => ContentTypeHint::Text,
        proto::ContentTypeHint::Binary => ContentTypeHint::Binary,
    }
}

fn body_to_wire(body: &Body) -> proto::Body {
    proto::Body {
        content_type: body.content_type_str().to_owned(),
        content: body.content.as_ref().map(|bytes| bytes.to_vec()),
        content_type_hint: hint_to_wire(body.content_type_hint),
    }
}

fn content_type_of(body: &proto::Body) -> Option<ContentType> {
    if body.content_type.is_empty() { None } else { Some(ContentType::new(&*body.content_type)) }
}

fn body_from_wire(body: &proto::Body) -> Body {
    Body {
        content: body.content.clone().map(Bytes::from),
        content_type: content_type_of(body),
        content_type_hint: hint_from_wire(body.content_type_hint),
    }
}

fn rules_to_wire(rules: &HashMap<String, MatchingRuleGroup>) -> HashMap<String, proto::MatchingRules> {
    rules
        .iter()
        .map(|(path, group)| {
            (
                path.clone(),
                proto::MatchingRules {
                    rule: group
                        .rules
                        .iter()
                        .map(|rule| proto::MatchingRule {
                            r#type: rule.rule_type.clone(),
                            values: Some(json_object_to_struct(&rule.values)),
                        })
                        .collect(),
                },
            )
        })
        .collect()
}

/// Encodes a JSON value expected to be an object as a wire struct.
/// Non-object values encode as an empty struct.
fn json_object_to_struct(value: &serde_json::Value) -> prost_types::Struct {
    match value {
        serde_json::Value::Object(fields) => prost_types::Struct {
            fields: fields
                .iter()
                .map(|(key, value)| {
                    (key.clone(), pact_plugin_proto::values::json_to_proto_value(value))
                })
                .collect(),
        },
        _ => prost_types::Struct::default(),
    }
}

fn generator_to_wire(generator: &GeneratorDescriptor) -> proto::Generator {
    proto::Generator {
        r#type: generator.generator_type.clone(),
        values: Some(json_object_to_struct(&generator.values)),
    }
}

fn plugin_config_to_wire(config: &PluginConfiguration) -> proto::PluginConfiguration {
    proto::PluginConfiguration {
        interaction_configuration: Some(to_proto_struct(&config.interaction_configuration)),
        pact_configuration: Some(to_proto_struct(&config.pact_configuration)),
    }
}

fn optional_string(value: &str) -> Option<String> {
    if value.is_empty() { None } else { Some(value.to_owned()) }
}

fn mismatch_from_wire(mismatch: &proto::ContentMismatch) -> ContentMismatch {
    ContentMismatch {
        expected: mismatch.expected.clone().map(Bytes::from),
        actual: mismatch.actual.clone().map(Bytes::from),
        mismatch: mismatch.mismatch.clone(),
        path: mismatch.path.clone(),
        diff: optional_string(&mismatch.diff),
        mismatch_type: optional_string(&mismatch.mismatch_type),
    }
}

fn translate_compare_response(
    request: &ContentComparisonRequest,
    response: &proto::CompareContentsResponse,
) -> HashMap<String, Vec<ContentMismatch>> {
    if !response.error.is_empty() {
        return HashMap::from([(
            "$".to_owned(),
            vec![ContentMismatch {
                expected: request.expected.content.clone(),
                actual: request.actual.content.clone(),
                mismatch: response.error.clone(),
                path: "$".to_owned(),
                diff: None,
                mismatch_type: None,
            }],
        )]);
    }

    if let Some(type_mismatch) = &response.type_mismatch {
        return HashMap::from([(
            "$".to_owned(),
            vec![ContentMismatch {
                expected: Some(Bytes::from(type_mismatch.expected.clone())),
                actual: Some(Bytes::from(type_mismatch.actual.clone())),
                mismatch: format!(
                    "Expected content type '{}' but got '{}'",
                    type_mismatch.expected, type_mismatch.actual
                ),
                path: "$".to_owned(),
                diff: None,
                mismatch_type: Some(String::from("ContentTypeMismatch")),
            }],
        )]);
    }

    response
        .results
        .iter()
        .map(|(path, mismatches)| {
            (path.clone(), mismatches.mismatches.iter().map(mismatch_from_wire).collect())
        })
        .collect()
}

fn rule_category_from_wire(
    name: &str,
    rules: &HashMap<String, proto::MatchingRules>,
) -> Option<MatchingRuleCategory> {
    if rules.is_empty() {
        return None;
    }
    Some(MatchingRuleCategory {
        name: name.to_owned(),
        rules: rules
            .iter()
            .map(|(path, list)| {
                (
                    path.clone(),
                    MatchingRuleGroup {
                        rules: list
                            .rule
                            .iter()
                            .map(|rule| MatchingRuleDescriptor {
                                rule_type: rule.r#type.clone(),
                                values: rule
                                    .values
                                    .as_ref()
                                    .map(pact_plugin_proto::values::proto_struct_to_json)
                                    .unwrap_or_default(),
                            })
                            .collect(),
                    },
                )
            })
            .collect(),
    })
}

fn generator_map_from_wire(
    generators: &HashMap<String, proto::Generator>,
) -> BTreeMap<String, GeneratorDescriptor> {
    generators
        .iter()
        .map(|(path, generator)| {
            (
                path.clone(),
                GeneratorDescriptor {
                    generator_type: generator.r#type.clone(),
                    values: generator
                        .values
                        .as_ref()
                        .map(pact_plugin_proto::values::proto_struct_to_json)
                        .unwrap_or_default(),
                },
            )
        })
        .collect()
}

fn decode_interaction_part(
    part: &proto::InteractionResponse,
    global_config: &PluginConfiguration,
) -> InteractionContents {
    let body = part.contents.as_ref().map(body_from_wire).unwrap_or_default();
    let rules = rule_category_from_wire("body", &part.rules);
    let metadata_rules = rule_category_from_wire("metadata", &part.metadata_rules);

    let metadata = part.message_metadata.as_ref().map(proto_struct_to_map);

    let generators = if part.generators.is_empty() && part.metadata_generators.is_empty() {
        None
    } else {
        let mut categories = HashMap::new();
        if !part.generators.is_empty() {
            categories.insert(GeneratorCategory::Body, generator_map_from_wire(&part.generators));
        }
        if !part.metadata_generators.is_empty() {
            categories
                .insert(GeneratorCategory::Metadata, generator_map_from_wire(&part.metadata_generators));
        }
        Some(Generators { categories })
    };

    // Parts carrying their own configuration start from a copy of the
    // response-level (pact-scoped) configuration and overlay their fields;
    // parts without one get an empty configuration.
    let plugin_config = part.plugin_configuration.as_ref().map_or_else(
        PluginConfiguration::default,
        |config| {
            let mut merged = global_config.clone();
            if let Some(interaction) = &config.interaction_configuration {
                merged.interaction_configuration.extend(proto_struct_to_map(interaction));
            }
            if let Some(pact) = &config.pact_configuration {
                merged.pact_configuration.extend(proto_struct_to_map(pact));
            }
            merged
        },
    );

    InteractionContents {
        part_name: part.part_name.clone(),
        body,
        rules,
        generators,
        metadata,
        metadata_rules,
        plugin_config,
        interaction_markup: part.interaction_markup.clone(),
        interaction_markup_type: proto::MarkupType::from_wire(part.interaction_markup_type)
            .as_str()
            .to_owned(),
    }
}

fn decode_mock_server_results(results: &[proto::MockServerResult]) -> Vec<MockServerResults> {
    results
        .iter()
        .map(|result| MockServerResults {
            path: result.path.clone(),
            error: result.error.clone(),
            mismatches: result.mismatches.iter().map(mismatch_from_wire).collect(),
        })
        .collect()
}

fn metadata_value_to_wire(value: &MetadataValue) -> proto::MetadataValue {
    proto::MetadataValue {
        value: Some(match value {
            MetadataValue::Json(json) => proto::MetadataValueKind::NonBinaryValue(
                pact_plugin_proto::values::json_to_proto_value(json),
            ),
            MetadataValue::Binary(bytes) => {
                proto::MetadataValueKind::BinaryValue(bytes.to_vec())
            }
        }),
    }
}

fn decode_interaction_data(data: &proto::InteractionData) -> InteractionVerificationData {
    InteractionVerificationData {
        request_body: data.body.as_ref().map(body_from_wire).unwrap_or_default(),
        metadata: data
            .metadata
            .iter()
            .map(|(key, value)| {
                let decoded = match &value.value {
                    Some(proto::MetadataValueKind::NonBinaryValue(value)) => {
                        MetadataValue::Json(proto_value_to_json(value))
                    }
                    Some(proto::MetadataValueKind::BinaryValue(bytes)) => {
                        MetadataValue::Binary(Bytes::from(bytes.clone()))
                    }
                    None => MetadataValue::Json(serde_json::Value::Null),
                };
                (key.clone(), decoded)
            })
            .collect(),
    }
}

fn decode_verification_result(result: &proto::VerificationResult) -> InteractionVerificationResult {
    InteractionVerificationResult {
        ok: result.success,
        details: result
            .mismatches
            .iter()
            .filter_map(|item| item.result.as_ref())
            .map(|item| match item {
                proto::VerificationResultItemKind::Error(error) => {
                    InteractionVerificationDetails::Error(error.clone())
                }
                proto::VerificationResultItemKind::Mismatch(mismatch) => {
                    InteractionVerificationDetails::Mismatch {
                        expected: mismatch.expected.clone().map(Bytes::from).unwrap_or_default(),
                        actual: mismatch.actual.clone().map(Bytes::from).unwrap_or_default(),
                        mismatch: mismatch.mismatch.clone(),
                        path: mismatch.path.clone(),
                    }
                }
            })
            .collect(),
        output: result.output.clone(),
    }
}

#[cfg(test)]
mod tests;
