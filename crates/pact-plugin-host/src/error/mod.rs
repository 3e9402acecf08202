//! Domain errors raised by plugin operations.
//!
//! All errors use a `thiserror`-derived enum with structured context so
//! callers can distinguish installation problems from runtime crashes
//! programmatically. Errors a plugin reports inside an RPC response body are
//! not represented here: they are data, checked explicitly at each call
//! site. I/O sources are wrapped in `Arc` so the enum stays cheap to move.

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

/// Errors arising from plugin discovery, supervision and invocation.
#[derive(Debug, Error)]
pub enum PluginError {
    /// No running plugin matched the requested name and version.
    #[error("plugin '{name}' (version {}) was not found in the plugin register", .version.as_deref().unwrap_or("any"))]
    NotFound {
        /// Name that was looked up.
        name: String,
        /// Version constraint, when one was given.
        version: Option<String>,
    },

    /// No manifest for the requested plugin could be resolved.
    #[error("no plugin with name '{name}' and version '{}' was found in the plugin directory '{plugin_dir}'", .version.as_deref().unwrap_or("any"))]
    ManifestNotFound {
        /// Requested plugin name.
        name: String,
        /// Version constraint, when one was given.
        version: Option<String>,
        /// Directory that was scanned.
        plugin_dir: String,
    },

    /// A manifest file exists but could not be parsed.
    #[error("failed to parse plugin manifest '{}': {source}", .path.display())]
    InvalidManifest {
        /// Path of the manifest file.
        path: PathBuf,
        /// Underlying parse error.
        #[source]
        source: serde_json::Error,
    },

    /// The manifest declares an executable type this host cannot launch.
    #[error("plugin '{name}' executable type '{executable_type}' is not supported")]
    UnsupportedExecutableType {
        /// Plugin name.
        name: String,
        /// Declared executable type.
        executable_type: String,
    },

    /// No plugin install directory could be determined.
    #[error("no plugin directory was found (in $HOME/.pact/plugins or $PACT_PLUGIN_DIR)")]
    NoPluginDirectory,

    /// The plugin process could not be spawned.
    #[error("was not able to start plugin process for '{name}': {message}")]
    SpawnFailed {
        /// Plugin name.
        name: String,
        /// Human-readable failure description.
        message: String,
        /// Underlying I/O error, when one exists.
        #[source]
        source: Option<Arc<std::io::Error>>,
    },

    /// The plugin did not announce its port and server key in time.
    #[error("plugin '{name}' did not output the correct startup message in {timeout_ms} ms")]
    StartupTimeout {
        /// Plugin name.
        name: String,
        /// Timeout that elapsed, in milliseconds.
        timeout_ms: u64,
    },

    /// The plugin announced something that is not a valid startup message.
    #[error("plugin '{name}' did not output the correct startup message: {message}")]
    InvalidStartup {
        /// Plugin name.
        name: String,
        /// Description including the partial value that was received.
        message: String,
    },

    /// The control channel could not be established on either loopback form.
    #[error("failed to connect to plugin '{name}': {message}")]
    Connect {
        /// Plugin name.
        name: String,
        /// Description of the dial failure.
        message: String,
    },

    /// An RPC was attempted on a plugin whose handshake has not completed.
    #[error("plugin '{name}' is registered but its control channel is not initialised yet")]
    NotInitialised {
        /// Plugin name.
        name: String,
    },

    /// A call over the control channel failed at the transport level.
    #[error("call to plugin '{name}' failed: {source}")]
    Rpc {
        /// Plugin name.
        name: String,
        /// gRPC status of the failed call.
        #[source]
        source: tonic::Status,
    },

    /// The plugin returned a response this host could not interpret.
    #[error("plugin '{name}' returned an invalid response: {message}")]
    InvalidResponse {
        /// Plugin name.
        name: String,
        /// Description of the protocol violation.
        message: String,
    },

    /// The plugin reported that an interaction could not be configured.
    #[error("request to configure interaction with plugin '{name}' failed: {message}")]
    ConfigureInteraction {
        /// Plugin name.
        name: String,
        /// Error reported by the plugin.
        message: String,
    },

    /// The plugin reported that its mock server failed.
    #[error("mock server error from plugin '{name}': {message}")]
    MockServer {
        /// Plugin name.
        name: String,
        /// Error reported by the plugin.
        message: String,
    },

    /// The plugin reported that it could not prepare an interaction for
    /// verification.
    #[error("failed to prepare interaction for verification with plugin '{name}': {message}")]
    VerificationPreparation {
        /// Plugin name.
        name: String,
        /// Error reported by the plugin.
        message: String,
    },

    /// The contract document collaborator failed to render the pact.
    #[error("failed to serialise the pact document: {message}")]
    Document {
        /// Description of the failure.
        message: String,
    },

    /// The repository index could not be resolved.
    #[error("plugin repository error: {message}")]
    Repository {
        /// Description of the failure.
        message: String,
    },

    /// Auto-installation was requested but no installer is available.
    #[error("cannot install plugin from '{source_value}': no plugin installer is configured")]
    InstallerUnavailable {
        /// The manifest source that could not be installed.
        source_value: String,
    },

    /// An I/O error occurred talking to the filesystem.
    #[error("I/O error on '{}': {source}", .path.display())]
    Io {
        /// Path involved in the failure.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: Arc<std::io::Error>,
    },
}

impl PluginError {
    /// Wraps an I/O error with the path it occurred on.
    #[must_use]
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io { path: path.into(), source: Arc::new(source) }
    }
}
