//! Host/driver for out-of-process Pact plugins.
//!
//! Plugins extend a contract-testing framework with custom content types,
//! matchers, generators, mock servers and transport verifiers. Each plugin
//! is a local child process that announces a port and bearer token on its
//! standard output and then serves the `io.pact.plugin.PactPlugin` gRPC
//! interface on that port. This crate is the host side of that contract:
//!
//! - [`manager`]: the orchestration core: plugin resolution (manifest
//!   cache, plugin directory scan, repository index + installer), process
//!   launch and handshake, catalogue propagation, and every content,
//!   mock-server and verification operation.
//! - [`catalogue`]: the merged registry of core and plugin capabilities,
//!   queryable by key or content type.
//! - [`process`]: supervision of one plugin child process and its
//!   single-line JSON message channel.
//! - [`manifest`]: the `pact-plugin.json` model and the semver rules used
//!   to resolve versions.
//! - [`content`]: typed facades so callers treat core- and plugin-provided
//!   capabilities uniformly.
//! - [`model`]: the native carrier types: bodies, opaque matching-rule and
//!   generator descriptions, plugin configuration, mismatches, verification
//!   results.
//! - [`repository`]: the repository-index and installer collaborators used
//!   for auto-installation.
//! - [`rpc`]: the RPC seam between the manager and running plugins.
//!
//! # Example
//!
//! ```rust,no_run
//! use pact_plugin_host::manager::{ManagerConfig, PluginManager};
//! use pact_plugin_host::manifest::PluginDependency;
//! use pact_plugin_host::model::ContentType;
//!
//! # async fn example() -> Result<(), pact_plugin_host::error::PluginError> {
//! let manager = PluginManager::new(ManagerConfig::default());
//! let plugin = manager.load_plugin(&PluginDependency::plugin("protobuf", None)).await?;
//! println!("loaded {} {}", plugin.manifest().name, plugin.manifest().version);
//!
//! if let Some(matcher) = manager.find_content_matcher(&ContentType::new("application/protobuf")) {
//!     println!("matcher provided by {}", matcher.plugin_name());
//! }
//! # Ok(())
//! # }
//! ```

pub mod catalogue;
pub mod content;
pub mod error;
pub mod manager;
pub mod manifest;
pub mod model;
pub mod process;
pub mod repository;
pub mod rpc;

pub use self::catalogue::{Catalogue, CatalogueEntry, CatalogueEntryType, CapabilityOrigin};
pub use self::content::{ContentGenerator, ContentMatcher};
pub use self::error::PluginError;
pub use self::manager::{ManagerConfig, MockServerDetails, PactPlugin, PluginManager};
pub use self::manifest::{PactPluginManifest, PluginDependency, PluginDependencyType};
