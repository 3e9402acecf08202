//! Typed facades over catalogue entries for content capabilities.
//!
//! [`ContentMatcher`] and [`ContentGenerator`] wrap a catalogue entry
//! together with the manager that can reach its plugin, so the rest of the
//! host can handle core- and plugin-provided capabilities uniformly: callers
//! ask the manager for a facade by content type and invoke it without caring
//! where the capability lives.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::catalogue::CatalogueEntry;
use crate::error::PluginError;
use crate::manager::PluginManager;
use crate::model::{
    Body, ContentComparisonRequest, ContentGenerationRequest, ContentMismatch,
    InteractionContents,
};

/// A content matcher capability, core- or plugin-provided.
#[derive(Debug, Clone)]
pub struct ContentMatcher {
    entry: CatalogueEntry,
    manager: Arc<PluginManager>,
}

impl ContentMatcher {
    /// Wraps a catalogue entry bound to the given manager.
    #[must_use]
    pub const fn new(entry: CatalogueEntry, manager: Arc<PluginManager>) -> Self {
        Self { entry, manager }
    }

    /// The underlying catalogue entry.
    #[must_use]
    pub const fn catalogue_entry(&self) -> &CatalogueEntry {
        &self.entry
    }

    /// Whether this matcher is provided by the core framework.
    #[must_use]
    pub const fn is_core(&self) -> bool {
        self.entry.is_core()
    }

    /// Name of the plugin providing this matcher, or `core`.
    #[must_use]
    pub fn plugin_name(&self) -> &str {
        self.entry.plugin_name().unwrap_or("core")
    }

    /// The registry key of the underlying entry.
    #[must_use]
    pub fn catalogue_entry_key(&self) -> String {
        self.entry.registry_key()
    }

    /// Asks the plugin to configure interaction contents from the
    /// user-supplied definition.
    ///
    /// # Errors
    ///
    /// Returns a [`PluginError`] when the plugin is not running, reports an
    /// error, or the call fails at the transport level.
    pub async fn configure_content(
        &self,
        content_type: &str,
        config: &HashMap<String, Value>,
    ) -> Result<Vec<InteractionContents>, PluginError> {
        self.manager
            .configure_content_matcher_interaction(&self.entry, content_type, config)
            .await
    }

    /// Matches actual contents against expected contents, returning the
    /// mismatches per path. An empty map means the contents matched.
    ///
    /// # Errors
    ///
    /// Returns a [`PluginError`] when the plugin is not running or the call
    /// fails at the transport level.
    pub async fn match_contents(
        &self,
        request: &ContentComparisonRequest,
    ) -> Result<HashMap<String, Vec<ContentMismatch>>, PluginError> {
        self.manager.invoke_content_matcher(&self.entry, request).await
    }
}

/// A content generator capability, core- or plugin-provided.
#[derive(Debug, Clone)]
pub struct ContentGenerator {
    entry: CatalogueEntry,
    manager: Arc<PluginManager>,
}

impl ContentGenerator {
    /// Wraps a catalogue entry bound to the given manager.
    #[must_use]
    pub const fn new(entry: CatalogueEntry, manager: Arc<PluginManager>) -> Self {
        Self { entry, manager }
    }

    /// The underlying catalogue entry.
    #[must_use]
    pub const fn catalogue_entry(&self) -> &CatalogueEntry {
        &self.entry
    }

    /// Whether this generator is provided by the core framework.
    #[must_use]
    pub const fn is_core(&self) -> bool {
        self.entry.is_core()
    }

    /// Generates contents for a body using the plugin behind this entry.
    ///
    /// # Errors
    ///
    /// Returns a [`PluginError`] when the plugin is not running or the call
    /// fails at the transport level.
    pub async fn generate_content(
        &self,
        request: &ContentGenerationRequest,
    ) -> Result<Body, PluginError> {
        self.manager.generate_content(&self.entry, request).await
    }
}
