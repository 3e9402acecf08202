//! The plugin repository index and installer collaborators.
//!
//! When no local manifest satisfies a load request, the manager consults a
//! repository index mapping plugin names and versions to the sources their
//! releases can be installed from, then hands the chosen source to an
//! installer. Index resolution is one opaque call from the manager's point
//! of view. The bundled [`DefaultRepository`] covers the locally cached copy
//! of the index (validated against its SHA-256 sidecar) and a built-in
//! snapshot; fetching a fresh index over HTTP, and downloading/unpacking
//! releases, need network and archive machinery this crate does not carry;
//! callers inject implementations with those capabilities.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::error::PluginError;
use crate::manifest::PactPluginManifest;

/// Tracing target for repository operations.
const REPOSITORY_TARGET: &str = "pact_plugin_host::repository";

/// File name of the cached repository index under the plugin directory.
pub const INDEX_FILE_NAME: &str = "repository.index";

/// Source a plugin release can be installed from.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "RawManifestSource")]
pub enum ManifestSource {
    /// A manifest file on the local filesystem.
    File(String),
    /// A GitHub release holding the plugin archives.
    GitHubRelease(String),
    /// A source form this host does not recognise.
    Unknown(String),
}

impl ManifestSource {
    /// The raw source value (path or URL).
    #[must_use]
    pub fn value(&self) -> &str {
        match self {
            Self::File(value) | Self::GitHubRelease(value) | Self::Unknown(value) => value,
        }
    }
}

#[derive(Deserialize)]
struct RawManifestSource {
    #[serde(rename = "type")]
    source_type: String,
    value: String,
}

impl From<RawManifestSource> for ManifestSource {
    fn from(raw: RawManifestSource) -> Self {
        match raw.source_type.as_str() {
            "File" => Self::File(raw.value),
            "GitHubRelease" => Self::GitHubRelease(raw.value),
            _ => Self::Unknown(raw.value),
        }
    }
}

/// One released version of a plugin in the index.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PluginVersion {
    /// Version of the plugin.
    pub version: String,
    /// Source the release can be installed from.
    pub source: ManifestSource,
}

/// All released versions of one plugin.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PluginEntry {
    /// Name of the plugin.
    pub name: String,
    /// Latest released version.
    pub latest_version: String,
    /// Every released version.
    pub versions: Vec<PluginVersion>,
}

/// The plugin repository index file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PluginRepositoryIndex {
    /// Version of this index.
    pub index_version: i64,
    /// File format version of the index file.
    pub format_version: i64,
    /// Timestamp (UTC) the file was created or updated.
    pub timestamp: String,
    /// Plugin entries keyed by plugin name.
    pub entries: HashMap<String, PluginEntry>,
}

impl PluginRepositoryIndex {
    /// Parses an index from its TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::Repository`] when the text is not a valid
    /// index.
    pub fn parse(text: &str) -> Result<Self, PluginError> {
        toml::from_str(text)
            .map_err(|err| PluginError::Repository { message: format!("invalid index: {err}") })
    }

    /// Looks up the release to install for a plugin name and optional
    /// pinned version. Unpinned requests resolve to the entry's latest
    /// version.
    #[must_use]
    pub fn lookup_plugin_version(&self, name: &str, version: Option<&str>) -> Option<&PluginVersion> {
        let entry = self.entries.get(name)?;
        let wanted = version.unwrap_or(entry.latest_version.as_str());
        debug!(target: REPOSITORY_TARGET, plugin = name, version = wanted, "looking plugin up in the index");
        entry.versions.iter().find(|candidate| candidate.version == wanted)
    }
}

/// Resolves the repository index.
#[cfg_attr(test, mockall::automock)]
pub trait PluginRepository: Send + Sync {
    /// Fetches the current repository index.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::Repository`] when no index can be resolved.
    fn fetch_repository_index(&self) -> Result<PluginRepositoryIndex, PluginError>;
}

/// Installs a plugin release from its source, yielding the manifest of the
/// installed plugin.
#[cfg_attr(test, mockall::automock)]
pub trait PluginInstaller: Send + Sync {
    /// Downloads and unpacks the release behind the source into the plugin
    /// directory.
    ///
    /// # Errors
    ///
    /// Returns a [`PluginError`] when the release cannot be installed.
    fn install_from_source(&self, source: &ManifestSource) -> Result<PactPluginManifest, PluginError>;
}

/// Repository resolving the locally cached index, falling back to the
/// built-in snapshot.
#[derive(Debug, Clone, Default)]
pub struct DefaultRepository {
    plugin_dir: Option<PathBuf>,
}

impl DefaultRepository {
    /// Creates a repository caching under the given plugin directory.
    #[must_use]
    pub const fn new(plugin_dir: Option<PathBuf>) -> Self {
        Self { plugin_dir }
    }

    /// Loads the locally cached index, verifying it against its SHA-256
    /// sidecar file.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::Repository`] when the cache is missing or its
    /// digest does not match the sidecar.
    pub fn load_local_index(&self) -> Result<PluginRepositoryIndex, PluginError> {
        let plugin_dir = self
            .plugin_dir
            .as_ref()
            .ok_or_else(|| PluginError::Repository {
                message: String::from("plugin directory does not exist"),
            })?;
        let index_file = plugin_dir.join(INDEX_FILE_NAME);
        let content = std::fs::read_to_string(&index_file)
            .map_err(|err| PluginError::io(&index_file, err))?;

        let expected = load_sidecar_sha(&index_file)?;
        let calculated = sha256_hex(content.as_bytes());
        if calculated != expected {
            return Err(PluginError::Repository {
                message: format!(
                    "SHA256 digest does not match: expected {expected} but got {calculated}"
                ),
            });
        }

        debug!(target: REPOSITORY_TARGET, index = %index_file.display(), "loading local index file");
        PluginRepositoryIndex::parse(&content)
    }

    /// The index snapshot bundled with this crate.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::Repository`] when the bundled snapshot does
    /// not parse (which would be a packaging defect).
    pub fn default_index() -> Result<PluginRepositoryIndex, PluginError> {
        PluginRepositoryIndex::parse(include_str!("repository.index"))
    }
}

impl PluginRepository for DefaultRepository {
    fn fetch_repository_index(&self) -> Result<PluginRepositoryIndex, PluginError> {
        match self.load_local_index() {
            Ok(index) => Ok(index),
            Err(err) => {
                warn!(
                    target: REPOSITORY_TARGET,
                    %err, "was not able to load the local index, will use the built-in one"
                );
                Self::default_index()
            }
        }
    }
}

/// Installer used when no real installer is injected: declines every
/// request, naming the source that could not be installed.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledInstaller;

impl PluginInstaller for DisabledInstaller {
    fn install_from_source(&self, source: &ManifestSource) -> Result<PactPluginManifest, PluginError> {
        Err(PluginError::InstallerUnavailable { source_value: source.value().to_owned() })
    }
}

fn load_sidecar_sha(index_file: &Path) -> Result<String, PluginError> {
    let sidecar = index_file.with_extension("index.sha256");
    let content =
        std::fs::read_to_string(&sidecar).map_err(|err| PluginError::io(&sidecar, err))?;
    content
        .split_whitespace()
        .next()
        .map(ToOwned::to_owned)
        .ok_or_else(|| PluginError::Repository {
            message: format!("SHA256 sidecar '{}' is empty", sidecar.display()),
        })
}

fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    digest.iter().fold(String::with_capacity(64), |mut hex, byte| {
        use std::fmt::Write as _;
        // Writing to a String cannot fail.
        let _ = write!(hex, "{byte:02x}");
        hex
    })
}
