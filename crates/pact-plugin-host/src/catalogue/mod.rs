//! The merged registry of core and plugin capabilities.
//!
//! Every capability the host can use (content matchers, content generators,
//! transports, matching rules and interaction types) is one entry in the
//! catalogue, registered either at bootstrap (core entries) or from a
//! plugin's `InitPlugin` response. Entries are queryable by exact key or by
//! content-type capability search, and are removed in bulk when a plugin is
//! unloaded.
//!
//! The catalogue is a value owned by its [`PluginManager`], not a process
//! global; tests construct an isolated catalogue per case.
//!
//! [`PluginManager`]: crate::manager::PluginManager

use std::collections::HashMap;
use std::fmt::{self, Display, Formatter};
use std::sync::Mutex;

use regex::Regex;
use tracing::{debug, warn};

use pact_plugin_proto::messages as proto;

use crate::model::ContentType;

/// Tracing target for catalogue operations.
const CATALOGUE_TARGET: &str = "pact_plugin_host::catalogue";

/// Type of a catalogue entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CatalogueEntryType {
    /// Content matcher, selected by content type.
    ContentMatcher,
    /// Content generator, selected by content type.
    ContentGenerator,
    /// Transport-layer capability (mock servers and transport verifiers).
    Transport,
    /// Matching rule.
    Matcher,
    /// Interaction type.
    Interaction,
}

impl CatalogueEntryType {
    /// Decodes the wire enum. Unrecognised values degrade to
    /// [`CatalogueEntryType::ContentMatcher`] rather than failing the batch.
    #[must_use]
    pub const fn from_wire(value: i32) -> Self {
        match proto::EntryType::from_wire(value) {
            proto::EntryType::ContentMatcher => Self::ContentMatcher,
            proto::EntryType::ContentGenerator => Self::ContentGenerator,
            proto::EntryType::Transport => Self::Transport,
            proto::EntryType::Matcher => Self::Matcher,
            proto::EntryType::Interaction => Self::Interaction,
        }
    }

    /// Encodes to the wire enum.
    #[must_use]
    pub const fn to_wire(self) -> i32 {
        (match self {
            Self::ContentMatcher => proto::EntryType::ContentMatcher,
            Self::ContentGenerator => proto::EntryType::ContentGenerator,
            Self::Transport => proto::EntryType::Transport,
            Self::Matcher => proto::EntryType::Matcher,
            Self::Interaction => proto::EntryType::Interaction,
        }) as i32
    }
}

impl Display for CatalogueEntryType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ContentMatcher => "content-matcher",
            Self::ContentGenerator => "content-generator",
            Self::Transport => "transport",
            Self::Matcher => "matcher",
            Self::Interaction => "interaction",
        };
        f.write_str(name)
    }
}

/// Where a capability comes from: the core framework or a named plugin.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CapabilityOrigin {
    /// Provided by the core framework.
    Core,
    /// Provided by the named plugin.
    Plugin(String),
}

/// One entry of the capability catalogue.
///
/// Entries are value types: lookups copy them out, there is no shared
/// mutable state behind an entry.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogueEntry {
    /// Type of the entry.
    pub entry_type: CatalogueEntryType,
    /// Origin of the entry.
    pub origin: CapabilityOrigin,
    /// Bare entry key (the last key segment).
    pub key: String,
    /// Associated values. Content matchers and generators carry a
    /// `content-types` value (semi-colon separated).
    pub values: HashMap<String, String>,
}

impl CatalogueEntry {
    /// Name of the plugin providing this entry, or `None` for core entries.
    #[must_use]
    pub fn plugin_name(&self) -> Option<&str> {
        match &self.origin {
            CapabilityOrigin::Core => None,
            CapabilityOrigin::Plugin(name) => Some(name.as_str()),
        }
    }

    /// Whether this entry is provided by the core framework.
    #[must_use]
    pub const fn is_core(&self) -> bool {
        matches!(self.origin, CapabilityOrigin::Core)
    }

    /// The globally unique registry key of this entry.
    #[must_use]
    pub fn registry_key(&self) -> String {
        match &self.origin {
            CapabilityOrigin::Core => format!("core/{}/{}", self.entry_type, self.key),
            CapabilityOrigin::Plugin(name) => {
                format!("plugin/{}/{}/{}", name, self.entry_type, self.key)
            }
        }
    }

    /// Whether this entry declares support for the given content type.
    ///
    /// The `content-types` value is split on `;`, each candidate trimmed and
    /// treated as an anchored regular expression matched against the query's
    /// base type. Candidates that are not valid expressions never match.
    #[must_use]
    pub fn matches_content_type(&self, content_type: &ContentType) -> bool {
        let Some(content_types) = self.values.get("content-types") else {
            return false;
        };
        let base_type = content_type.base_type();
        content_types
            .split(';')
            .map(str::trim)
            .filter(|candidate| !candidate.is_empty())
            .any(|candidate| match Regex::new(&format!("^(?:{candidate})$")) {
                Ok(pattern) => pattern.is_match(base_type),
                Err(err) => {
                    warn!(
                        target: CATALOGUE_TARGET,
                        candidate, %err, "invalid content type pattern in catalogue entry"
                    );
                    false
                }
            })
    }
}

/// The process-wide capability catalogue, owned by one plugin manager.
#[derive(Debug, Default)]
pub struct Catalogue {
    entries: Mutex<HashMap<String, CatalogueEntry>>,
}

impl Catalogue {
    /// Creates an empty catalogue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the entries a plugin reported in its `InitPlugin` response.
    ///
    /// Entries are upserted under `"plugin/{name}/{type}/{key}"`. Stale
    /// entries from an earlier registration of the same plugin are not
    /// removed automatically; callers wanting a clean replace must call
    /// [`Catalogue::remove_plugin_entries`] first.
    pub fn register_plugin_entries(&self, name: &str, entries: &[proto::CatalogueEntry]) {
        let mut guard = self.lock();
        for entry in entries {
            let entry = CatalogueEntry {
                entry_type: CatalogueEntryType::from_wire(entry.r#type),
                origin: CapabilityOrigin::Plugin(name.to_owned()),
                key: entry.key.clone(),
                values: entry.values.clone(),
            };
            guard.insert(entry.registry_key(), entry);
        }
        Self::log_keys(&guard);
    }

    /// Registers the host's built-in capabilities under
    /// `"core/{type}/{key}"`. Intended to run exactly once at bootstrap.
    pub fn register_core_entries(&self, entries: &[CatalogueEntry]) {
        let mut guard = self.lock();
        for entry in entries {
            let entry =
                CatalogueEntry { origin: CapabilityOrigin::Core, ..entry.clone() };
            guard.insert(entry.registry_key(), entry);
        }
        Self::log_keys(&guard);
    }

    /// A snapshot of all entries as `(registry key, entry)` pairs. The order
    /// is not meaningful; the snapshot exists for catalogue broadcasts.
    #[must_use]
    pub fn entries(&self) -> Vec<(String, CatalogueEntry)> {
        self.lock().iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }

    /// Looks an entry up by its registry key.
    ///
    /// An exact match wins; otherwise the first entry whose key ends with
    /// the given key is returned, so callers can supply a bare key like
    /// `transport/grpc` without knowing the plugin prefix. With several
    /// suffix candidates the winner follows map iteration order.
    #[must_use]
    pub fn lookup_entry(&self, key: &str) -> Option<CatalogueEntry> {
        let guard = self.lock();
        if let Some(entry) = guard.get(key) {
            return Some(entry.clone());
        }
        guard.iter().find(|(k, _)| k.ends_with(key)).map(|(_, entry)| entry.clone())
    }

    /// Finds a content matcher entry declaring support for the content type.
    /// First match wins in map iteration order.
    #[must_use]
    pub fn find_content_matcher(&self, content_type: &ContentType) -> Option<CatalogueEntry> {
        self.find_by_content_type(CatalogueEntryType::ContentMatcher, content_type)
    }

    /// Finds a content generator entry declaring support for the content
    /// type. First match wins in map iteration order.
    #[must_use]
    pub fn find_content_generator(&self, content_type: &ContentType) -> Option<CatalogueEntry> {
        self.find_by_content_type(CatalogueEntryType::ContentGenerator, content_type)
    }

    /// Removes every entry registered by the named plugin.
    pub fn remove_plugin_entries(&self, name: &str) {
        let prefix = format!("plugin/{name}/");
        let mut guard = self.lock();
        guard.retain(|key, _| !key.starts_with(&prefix));
        debug!(target: CATALOGUE_TARGET, plugin = name, "removed all catalogue entries for plugin");
    }

    fn find_by_content_type(
        &self,
        entry_type: CatalogueEntryType,
        content_type: &ContentType,
    ) -> Option<CatalogueEntry> {
        self.lock()
            .values()
            .find(|entry| {
                entry.entry_type == entry_type && entry.matches_content_type(content_type)
            })
            .cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, CatalogueEntry>> {
        // A poisoned lock means a panic while holding it; the entry map is
        // still structurally sound, so keep serving lookups.
        self.entries.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn log_keys(entries: &HashMap<String, CatalogueEntry>) {
        let mut keys: Vec<&String> = entries.keys().collect();
        keys.sort();
        debug!(target: CATALOGUE_TARGET, ?keys, "updated catalogue entries");
    }
}
