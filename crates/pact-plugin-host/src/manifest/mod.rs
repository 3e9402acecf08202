//! Plugin manifest model and version resolution rules.
//!
//! A plugin installation is described by a `pact-plugin.json` file in the
//! plugin's install directory. The manifest declares the plugin identity,
//! how to launch it (entry point, OS-specific overrides, extra arguments)
//! and any system dependencies it needs. Manifests are immutable once
//! parsed and are cached by the manager under `"{name}/{version}"` for the
//! process lifetime.
//!
//! Version comparisons use real semver ordering throughout: `"10.0.0"` is
//! greater than `"2.0.0"` even though it sorts lower lexically.

use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use semver::Version;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::PluginError;

/// Tracing target for manifest operations.
const MANIFEST_TARGET: &str = "pact_plugin_host::manifest";

/// File name of a plugin manifest within its install directory.
pub const MANIFEST_FILE_NAME: &str = "pact-plugin.json";

/// Type of a plugin dependency.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PluginDependencyType {
    /// A required operating system package.
    OSPackage,
    /// A dependency on another plugin.
    #[default]
    Plugin,
    /// A dependency on a shared library.
    Library,
    /// A dependency on an executable.
    Executable,
}

/// A dependency a plugin requires, or a request to load a plugin by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginDependency {
    /// Dependency name.
    pub name: String,
    /// Dependency version in semver format. `None` means any version.
    #[serde(default)]
    pub version: Option<String>,
    /// Type of the dependency.
    #[serde(default, rename = "type")]
    pub dependency_type: PluginDependencyType,
}

impl PluginDependency {
    /// Builds a plugin dependency for a plugin name and optional version.
    #[must_use]
    pub fn plugin(name: impl Into<String>, version: Option<&str>) -> Self {
        Self {
            name: name.into(),
            version: version.map(ToOwned::to_owned),
            dependency_type: PluginDependencyType::Plugin,
        }
    }
}

/// Manifest describing one installable plugin version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PactPluginManifest {
    /// Directory the manifest was loaded from. Not part of the file; filled
    /// in from the discovery location.
    #[serde(skip)]
    pub plugin_dir: PathBuf,
    /// Plugin interface version the plugin implements.
    #[serde(default = "default_plugin_interface_version")]
    pub plugin_interface_version: u8,
    /// Plugin name.
    pub name: String,
    /// Plugin version in semver format.
    pub version: String,
    /// Executable type. `exec` (a binary launched directly) is the only
    /// supported value.
    pub executable_type: String,
    /// Minimum required version of the runtime for the executable type.
    #[serde(default)]
    pub minimum_required_version: Option<String>,
    /// Path of the main executable, relative to the plugin directory.
    pub entry_point: String,
    /// Entry point overrides per operating system (for instance a `.bat`
    /// file under a `windows` key).
    #[serde(default)]
    pub entry_points: HashMap<String, String>,
    /// Extra arguments to pass on the command line.
    #[serde(default)]
    pub args: Vec<String>,
    /// System dependencies or plugins required to execute this plugin.
    #[serde(default)]
    pub dependencies: Vec<PluginDependency>,
}

const fn default_plugin_interface_version() -> u8 {
    1
}

impl PactPluginManifest {
    /// Reads and parses a manifest file, recording the directory it was
    /// found in.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::Io`] if the file cannot be read and
    /// [`PluginError::InvalidManifest`] if it does not parse.
    pub fn load_from(path: &Path) -> Result<Self, PluginError> {
        let file = File::open(path).map_err(|err| PluginError::io(path, err))?;
        let reader = BufReader::new(file);
        let mut manifest: Self = serde_json::from_reader(reader)
            .map_err(|source| PluginError::InvalidManifest { path: path.to_path_buf(), source })?;
        manifest.plugin_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Ok(manifest)
    }

    /// Registry key for this manifest (`"{name}/{version}"`).
    #[must_use]
    pub fn key(&self) -> String {
        format!("{}/{}", self.name, self.version)
    }

    /// This manifest expressed as a dependency on its exact version.
    #[must_use]
    pub fn as_dependency(&self) -> PluginDependency {
        PluginDependency {
            name: self.name.clone(),
            version: Some(self.version.clone()),
            dependency_type: PluginDependencyType::Plugin,
        }
    }

    /// Resolves the executable to launch on the given operating system.
    ///
    /// Prefers an OS-specific entry from `entryPoints` and falls back to the
    /// default `entryPoint`. Relative paths are joined to the plugin
    /// directory.
    #[must_use]
    pub fn resolve_entry_point(&self, os: &str) -> PathBuf {
        let entry = self.entry_points.get(os).unwrap_or(&self.entry_point);
        let path = PathBuf::from(entry);
        if path.is_absolute() { path } else { self.plugin_dir.join(path) }
    }
}

/// Whether a plugin version satisfies a requested version constraint.
///
/// An unpinned request (`None`) accepts anything. A pinned request accepts
/// the exact version, or any version strictly greater under semver ordering.
/// The strictly-greater rule (rather than a caret range) is the documented
/// compatibility policy of the plugin drivers.
#[must_use]
pub fn versions_compatible(version: &str, required: Option<&str>) -> bool {
    match required {
        None => true,
        Some(required) if required == version => true,
        Some(required) => match (Version::parse(version), Version::parse(required)) {
            (Ok(version), Ok(required)) => version > required,
            _ => {
                warn!(
                    target: MANIFEST_TARGET,
                    version, required, "versions are not valid semver, treating as incompatible"
                );
                false
            }
        },
    }
}

/// Parses a version string, mapping unparseable versions to `0.0.0` so they
/// lose any max-by-version selection without aborting it.
#[must_use]
pub fn parsed_version(version: &str) -> Version {
    Version::parse(version).unwrap_or_else(|_| {
        warn!(target: MANIFEST_TARGET, version, "version is not valid semver");
        Version::new(0, 0, 0)
    })
}

/// Picks the manifest with the highest semver version from a list.
#[must_use]
pub fn max_by_version(manifests: Vec<PactPluginManifest>) -> Option<PactPluginManifest> {
    manifests.into_iter().max_by_key(|manifest| parsed_version(&manifest.version))
}
