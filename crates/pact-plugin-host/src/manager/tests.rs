//! Behavioural tests for the plugin manager.
//!
//! Plugin processes are fake shell scripts in temporary directories (so
//! these tests are unix-only) and the control channel is doubled with
//! mockall, which keeps the full load/handshake/invoke flow under test
//! without a real gRPC server.
#![cfg(unix)]

use std::collections::HashMap;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::time::{Duration, Instant};

use pretty_assertions::assert_eq;
use serde_json::json;
use tempfile::TempDir;

use pact_plugin_proto::values::proto_struct_to_json;

use crate::repository::{
    ManifestSource, MockPluginInstaller, MockPluginRepository, PluginRepositoryIndex,
};
use crate::rpc::{MockPluginConnector, MockPluginRpc};

use super::*;

const SPAWN_MARKER: &str = "spawns.log";

fn write_fake_plugin(root: &Path, name: &str, version: &str) -> PathBuf {
    let dir = root.join(format!("{name}-{version}"));
    std::fs::create_dir_all(&dir).expect("create plugin dir");

    let script = dir.join("plugin.sh");
    std::fs::write(
        &script,
        concat!(
            "#!/bin/sh\n",
            "echo spawned >> spawns.log\n",
            "echo '{\"port\": 4321, \"serverKey\": \"test-key\"}'\n",
            "sleep 30\n",
        ),
    )
    .expect("write script");
    let mut permissions = std::fs::metadata(&script).expect("script metadata").permissions();
    permissions.set_mode(0o755);
    std::fs::set_permissions(&script, permissions).expect("make script executable");

    std::fs::write(
        dir.join(MANIFEST_FILE_NAME),
        json!({
            "name": name,
            "version": version,
            "executableType": "exec",
            "entryPoint": "plugin.sh"
        })
        .to_string(),
    )
    .expect("write manifest");
    dir
}

fn spawn_count(plugin_dir: &Path) -> usize {
    std::fs::read_to_string(plugin_dir.join(SPAWN_MARKER))
        .map(|content| content.lines().count())
        .unwrap_or_default()
}

fn init_response(plugin: &str) -> proto::InitPluginResponse {
    proto::InitPluginResponse {
        catalogue: vec![proto::CatalogueEntry {
            r#type: proto::EntryType::ContentMatcher as i32,
            key: plugin.to_owned(),
            values: HashMap::from([(
                "content-types".to_owned(),
                format!("application/{plugin}"),
            )]),
        }],
    }
}

/// A mock RPC that answers the init handshake and tolerates catalogue
/// broadcasts; tests add further expectations before passing it in.
fn handshaking_rpc(plugin: &str) -> MockPluginRpc {
    let response = init_response(plugin);
    let mut rpc = MockPluginRpc::new();
    rpc.expect_init_plugin().returning(move |_| Ok(response.clone()));
    rpc.expect_update_catalogue().returning(|_| Ok(()));
    rpc
}

fn connector_returning(rpc: MockPluginRpc) -> MockPluginConnector {
    let rpc: Arc<dyn PluginRpc> = Arc::new(rpc);
    let mut connector = MockPluginConnector::new();
    connector.expect_connect().returning(move |_, _, _| Ok(Arc::clone(&rpc)));
    connector
}

fn manager_for(plugin_root: &Path, rpc: MockPluginRpc) -> Arc<PluginManager> {
    PluginManager::with_collaborators(
        ManagerConfig {
            plugin_dir: Some(plugin_root.to_path_buf()),
            startup_timeout: Duration::from_secs(5),
        },
        Arc::new(connector_returning(rpc)),
        Arc::new(MockPluginRepository::new()),
        Arc::new(crate::repository::DisabledInstaller),
    )
}

async fn load_fake_plugin(
    manager: &Arc<PluginManager>,
    name: &str,
) -> (Arc<PactPlugin>, CatalogueEntry) {
    let plugin = manager
        .load_plugin(&PluginDependency::plugin(name, None))
        .await
        .expect("plugin loads");
    let entry = manager
        .catalogue()
        .lookup_entry(&format!("plugin/{name}/content-matcher/{name}"))
        .expect("catalogue entry registered");
    (plugin, entry)
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

#[tokio::test]
async fn load_plugin_spawns_handshakes_and_registers_the_catalogue() {
    let root = TempDir::new().expect("temp dir");
    let plugin_dir = write_fake_plugin(root.path(), "fake", "0.1.0");
    let manager = manager_for(root.path(), handshaking_rpc("fake"));

    let (plugin, entry) = load_fake_plugin(&manager, "fake").await;

    assert_eq!(plugin.manifest().name, "fake");
    assert_eq!(plugin.port(), 4321);
    assert_eq!(plugin.server_key(), "test-key");
    assert_eq!(plugin.catalogue_entries().len(), 1);
    assert_eq!(entry.plugin_name(), Some("fake"));
    assert_eq!(spawn_count(&plugin_dir), 1);

    manager.shutdown_plugins().await;
}

#[tokio::test]
async fn reloading_a_running_plugin_is_idempotent() {
    let root = TempDir::new().expect("temp dir");
    let plugin_dir = write_fake_plugin(root.path(), "fake", "0.1.0");
    let manager = manager_for(root.path(), handshaking_rpc("fake"));

    let (first, _) = load_fake_plugin(&manager, "fake").await;
    let second = manager
        .load_plugin(&PluginDependency::plugin("fake", Some("0.1.0")))
        .await
        .expect("reload");

    assert!(Arc::ptr_eq(&first, &second), "reload must return the same instance");
    assert_eq!(spawn_count(&plugin_dir), 1, "no second process may be spawned");

    manager.shutdown_plugins().await;
}

#[tokio::test]
async fn concurrent_loads_spawn_exactly_one_process() {
    let root = TempDir::new().expect("temp dir");
    let plugin_dir = write_fake_plugin(root.path(), "fake", "0.1.0");
    let manager = manager_for(root.path(), handshaking_rpc("fake"));

    let dependency = PluginDependency::plugin("fake", Some("0.1.0"));
    let (first, second) =
        tokio::join!(manager.load_plugin(&dependency), manager.load_plugin(&dependency));

    let first = first.expect("first load");
    let second = second.expect("second load");
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(spawn_count(&plugin_dir), 1, "exactly one subprocess must be spawned");

    manager.shutdown_plugins().await;
}

#[tokio::test]
async fn unpinned_loads_resolve_the_highest_semver_manifest() {
    let root = TempDir::new().expect("temp dir");
    for version in ["1.0.0", "2.0.0", "10.0.0"] {
        write_fake_plugin(root.path(), "multi", version);
    }
    let manager = manager_for(root.path(), handshaking_rpc("multi"));

    let plugin = manager
        .load_plugin(&PluginDependency::plugin("multi", None))
        .await
        .expect("plugin loads");
    assert_eq!(plugin.manifest().version, "10.0.0", "semver max, not lexical max");

    manager.shutdown_plugins().await;
}

#[tokio::test]
async fn unpinned_lookups_return_the_highest_loaded_version() {
    let root = TempDir::new().expect("temp dir");
    let manager = manager_for(root.path(), handshaking_rpc("multi"));

    // Manifests are staged one at a time: the compatibility rule accepts any
    // strictly-greater version, so with both on disk a pinned load of the
    // older one would resolve to the newer manifest.
    write_fake_plugin(root.path(), "multi", "2.0.0");
    manager
        .load_plugin(&PluginDependency::plugin("multi", Some("2.0.0")))
        .await
        .expect("load 2.0.0");
    write_fake_plugin(root.path(), "multi", "10.0.0");
    manager
        .load_plugin(&PluginDependency::plugin("multi", Some("10.0.0")))
        .await
        .expect("load 10.0.0");

    let found = manager
        .lookup_plugin(&PluginDependency::plugin("multi", None))
        .await
        .expect("lookup finds a plugin");
    assert_eq!(found.manifest().version, "10.0.0");

    manager.shutdown_plugins().await;
}

#[tokio::test]
async fn a_missing_manifest_is_a_descriptive_error() {
    let root = TempDir::new().expect("temp dir");
    let mut repository = MockPluginRepository::new();
    repository.expect_fetch_repository_index().returning(|| {
        Ok(PluginRepositoryIndex {
            index_version: 0,
            format_version: 0,
            timestamp: String::new(),
            entries: HashMap::new(),
        })
    });
    let manager = PluginManager::with_collaborators(
        ManagerConfig { plugin_dir: Some(root.path().to_path_buf()), ..ManagerConfig::default() },
        Arc::new(MockPluginConnector::new()),
        Arc::new(repository),
        Arc::new(crate::repository::DisabledInstaller),
    );

    let err = manager
        .load_plugin(&PluginDependency::plugin("ghost", None))
        .await
        .expect_err("load must fail");
    match err {
        PluginError::ManifestNotFound { name, plugin_dir, .. } => {
            assert_eq!(name, "ghost");
            assert!(plugin_dir.contains(root.path().to_str().expect("utf-8 path")));
        }
        other => panic!("expected ManifestNotFound, got {other}"),
    }
}

#[tokio::test]
async fn the_repository_index_drives_auto_installation() {
    let root = TempDir::new().expect("temp dir");
    // The plugin is not on disk yet; installing it writes the fake plugin
    // and returns its manifest.
    let mut repository = MockPluginRepository::new();
    repository.expect_fetch_repository_index().returning(|| {
        PluginRepositoryIndex::parse(
            r#"
            index_version = 0
            format_version = 0
            timestamp = "2024-06-01T00:00:00Z"

            [entries.installed]
            name = "installed"
            latest_version = "0.2.0"

            [[entries.installed.versions]]
            version = "0.2.0"
            [entries.installed.versions.source]
            type = "GitHubRelease"
            value = "https://example.com/installed-0.2.0"
            "#,
        )
    });

    let install_root = root.path().to_path_buf();
    let mut installer = MockPluginInstaller::new();
    installer.expect_install_from_source().returning(move |source| {
        assert_eq!(source, &ManifestSource::GitHubRelease("https://example.com/installed-0.2.0".to_owned()));
        let dir = write_fake_plugin(&install_root, "installed", "0.2.0");
        PactPluginManifest::load_from(&dir.join(MANIFEST_FILE_NAME))
    });

    let manager = PluginManager::with_collaborators(
        ManagerConfig {
            plugin_dir: Some(root.path().to_path_buf()),
            startup_timeout: Duration::from_secs(5),
        },
        Arc::new(connector_returning(handshaking_rpc("installed"))),
        Arc::new(repository),
        Arc::new(installer),
    );

    let plugin = manager
        .load_plugin(&PluginDependency::plugin("installed", None))
        .await
        .expect("plugin auto-installs and loads");
    assert_eq!(plugin.manifest().version, "0.2.0");

    manager.shutdown_plugins().await;
}

#[tokio::test]
async fn without_an_installer_the_index_entry_cannot_be_used() {
    let root = TempDir::new().expect("temp dir");
    let mut repository = MockPluginRepository::new();
    repository.expect_fetch_repository_index().returning(|| {
        PluginRepositoryIndex::parse(
            r#"
            index_version = 0
            format_version = 0
            timestamp = "2024-06-01T00:00:00Z"

            [entries.cloudy]
            name = "cloudy"
            latest_version = "1.0.0"

            [[entries.cloudy.versions]]
            version = "1.0.0"
            [entries.cloudy.versions.source]
            type = "GitHubRelease"
            value = "https://example.com/cloudy"
            "#,
        )
    });
    let manager = PluginManager::with_collaborators(
        ManagerConfig { plugin_dir: Some(root.path().to_path_buf()), ..ManagerConfig::default() },
        Arc::new(MockPluginConnector::new()),
        Arc::new(repository),
        Arc::new(crate::repository::DisabledInstaller),
    );

    let err = manager
        .load_plugin(&PluginDependency::plugin("cloudy", None))
        .await
        .expect_err("load must fail");
    assert!(matches!(err, PluginError::InstallerUnavailable { .. }), "got {err}");
}

#[tokio::test]
async fn unsupported_executable_types_are_rejected() {
    let root = TempDir::new().expect("temp dir");
    let dir = write_fake_plugin(root.path(), "ruby-plugin", "0.1.0");
    std::fs::write(
        dir.join(MANIFEST_FILE_NAME),
        json!({
            "name": "ruby-plugin",
            "version": "0.1.0",
            "executableType": "ruby",
            "entryPoint": "plugin.rb"
        })
        .to_string(),
    )
    .expect("rewrite manifest");
    let manager = manager_for(root.path(), MockPluginRpc::new());

    let err = manager
        .load_plugin(&PluginDependency::plugin("ruby-plugin", None))
        .await
        .expect_err("load must fail");
    match err {
        PluginError::UnsupportedExecutableType { executable_type, .. } => {
            assert_eq!(executable_type, "ruby");
        }
        other => panic!("expected UnsupportedExecutableType, got {other}"),
    }
    assert_eq!(spawn_count(&dir), 0);
}

#[tokio::test]
async fn a_silent_plugin_fails_the_load_within_the_timeout() {
    let root = TempDir::new().expect("temp dir");
    let dir = write_fake_plugin(root.path(), "silent", "0.1.0");
    std::fs::write(dir.join("plugin.sh"), "#!/bin/sh\nsleep 30\n").expect("rewrite script");

    let manager = PluginManager::with_collaborators(
        ManagerConfig {
            plugin_dir: Some(root.path().to_path_buf()),
            startup_timeout: Duration::from_millis(250),
        },
        Arc::new(MockPluginConnector::new()),
        Arc::new(MockPluginRepository::new()),
        Arc::new(crate::repository::DisabledInstaller),
    );

    let started = Instant::now();
    let err = manager
        .load_plugin(&PluginDependency::plugin("silent", None))
        .await
        .expect_err("load must fail");
    assert!(matches!(err, PluginError::StartupTimeout { .. }), "got {err}");
    assert!(started.elapsed() < Duration::from_secs(5), "must fail promptly");
    assert!(manager.lookup_plugin(&PluginDependency::plugin("silent", None)).await.is_none());
}

#[tokio::test]
async fn a_failed_init_handshake_deregisters_and_kills_the_plugin() {
    let root = TempDir::new().expect("temp dir");
    write_fake_plugin(root.path(), "grumpy", "0.1.0");

    let mut rpc = MockPluginRpc::new();
    rpc.expect_init_plugin().returning(|_| {
        Err(PluginError::Rpc {
            name: "grumpy".to_owned(),
            source: tonic::Status::unavailable("init refused"),
        })
    });
    let manager = manager_for(root.path(), rpc);

    let err = manager
        .load_plugin(&PluginDependency::plugin("grumpy", None))
        .await
        .expect_err("load must fail");
    assert!(matches!(err, PluginError::Rpc { .. }), "got {err}");
    assert!(manager.lookup_plugin(&PluginDependency::plugin("grumpy", None)).await.is_none());
    assert!(manager.catalogue().lookup_entry("plugin/grumpy/content-matcher/grumpy").is_none());
}

// ---------------------------------------------------------------------------
// Unloading
// ---------------------------------------------------------------------------

#[tokio::test]
async fn dropping_the_last_access_shuts_the_plugin_down() {
    let root = TempDir::new().expect("temp dir");
    write_fake_plugin(root.path(), "fake", "0.1.0");
    let manager = manager_for(root.path(), handshaking_rpc("fake"));

    let dependency = PluginDependency::plugin("fake", None);
    load_fake_plugin(&manager, "fake").await;

    manager.drop_plugin_access(&dependency).await;
    assert!(manager.lookup_plugin(&dependency).await.is_none());
    assert!(
        manager.catalogue().lookup_entry("plugin/fake/content-matcher/fake").is_none(),
        "catalogue entries must be removed on unload"
    );
}

#[tokio::test]
async fn earlier_accesses_keep_the_plugin_alive() {
    let root = TempDir::new().expect("temp dir");
    write_fake_plugin(root.path(), "fake", "0.1.0");
    let manager = manager_for(root.path(), handshaking_rpc("fake"));

    let dependency = PluginDependency::plugin("fake", None);
    load_fake_plugin(&manager, "fake").await;
    manager.load_plugin(&dependency).await.expect("second access");

    manager.drop_plugin_access(&dependency).await;
    assert!(manager.lookup_plugin(&dependency).await.is_some(), "one access remains");

    manager.drop_plugin_access(&dependency).await;
    assert!(manager.lookup_plugin(&dependency).await.is_none());
}

// ---------------------------------------------------------------------------
// Content matching
// ---------------------------------------------------------------------------

#[tokio::test]
async fn a_compare_error_becomes_a_single_root_mismatch() {
    let root = TempDir::new().expect("temp dir");
    write_fake_plugin(root.path(), "fake", "0.1.0");
    let mut rpc = handshaking_rpc("fake");
    rpc.expect_compare_contents().returning(|_| {
        Ok(proto::CompareContentsResponse {
            error: "boom".to_owned(),
            type_mismatch: None,
            results: HashMap::new(),
        })
    });
    let manager = manager_for(root.path(), rpc);
    let (_, entry) = load_fake_plugin(&manager, "fake").await;

    let request = ContentComparisonRequest {
        expected: Body::new(b"expected-bytes".to_vec(), Some(ContentType::new("application/fake"))),
        actual: Body::new(b"actual-bytes".to_vec(), Some(ContentType::new("application/fake"))),
        allow_unexpected_keys: false,
        rules: HashMap::new(),
        plugin_configuration: HashMap::new(),
    };
    let mismatches =
        manager.invoke_content_matcher(&entry, &request).await.expect("call succeeds");

    assert_eq!(mismatches.len(), 1);
    let root_mismatches = mismatches.get("$").expect("mismatch at the root path");
    assert_eq!(root_mismatches.len(), 1);
    let mismatch = root_mismatches.first().expect("one mismatch");
    assert_eq!(mismatch.mismatch, "boom");
    assert_eq!(mismatch.path, "$");
    assert_eq!(mismatch.expected.as_deref(), Some(b"expected-bytes".as_slice()));
    assert_eq!(mismatch.actual.as_deref(), Some(b"actual-bytes".as_slice()));

    manager.shutdown_plugins().await;
}

#[tokio::test]
async fn per_path_mismatches_are_flattened_with_their_tags() {
    let root = TempDir::new().expect("temp dir");
    write_fake_plugin(root.path(), "fake", "0.1.0");
    let mut rpc = handshaking_rpc("fake");
    rpc.expect_compare_contents().returning(|_| {
        Ok(proto::CompareContentsResponse {
            error: String::new(),
            type_mismatch: None,
            results: HashMap::from([(
                "$.name".to_owned(),
                proto::ContentMismatches {
                    mismatches: vec![proto::ContentMismatch {
                        expected: Some(b"fred".to_vec()),
                        actual: Some(b"wilma".to_vec()),
                        mismatch: "expected 'fred' but got 'wilma'".to_owned(),
                        path: "$.name".to_owned(),
                        diff: "-fred\n+wilma".to_owned(),
                        mismatch_type: "body".to_owned(),
                    }],
                },
            )]),
        })
    });
    let manager = manager_for(root.path(), rpc);
    let (_, entry) = load_fake_plugin(&manager, "fake").await;

    let request = ContentComparisonRequest::default();
    let mismatches =
        manager.invoke_content_matcher(&entry, &request).await.expect("call succeeds");

    let name_mismatches = mismatches.get("$.name").expect("mismatches for $.name");
    let mismatch = name_mismatches.first().expect("one mismatch");
    assert_eq!(mismatch.diff.as_deref(), Some("-fred\n+wilma"));
    assert_eq!(mismatch.mismatch_type.as_deref(), Some("body"));

    manager.shutdown_plugins().await;
}

#[tokio::test]
async fn a_content_type_mismatch_is_reported_at_the_root() {
    let root = TempDir::new().expect("temp dir");
    write_fake_plugin(root.path(), "fake", "0.1.0");
    let mut rpc = handshaking_rpc("fake");
    rpc.expect_compare_contents().returning(|_| {
        Ok(proto::CompareContentsResponse {
            error: String::new(),
            type_mismatch: Some(proto::ContentTypeMismatch {
                expected: "application/fake".to_owned(),
                actual: "text/plain".to_owned(),
            }),
            results: HashMap::new(),
        })
    });
    let manager = manager_for(root.path(), rpc);
    let (_, entry) = load_fake_plugin(&manager, "fake").await;

    let mismatches = manager
        .invoke_content_matcher(&entry, &ContentComparisonRequest::default())
        .await
        .expect("call succeeds");
    let mismatch =
        mismatches.get("$").expect("root mismatch").first().expect("one mismatch");
    assert!(mismatch.mismatch.contains("application/fake"));
    assert!(mismatch.mismatch.contains("text/plain"));

    manager.shutdown_plugins().await;
}

// ---------------------------------------------------------------------------
// Interaction configuration
// ---------------------------------------------------------------------------

fn struct_of(values: &[(&str, serde_json::Value)]) -> prost_types::Struct {
    let map: HashMap<String, serde_json::Value> =
        values.iter().map(|(key, value)| ((*key).to_owned(), value.clone())).collect();
    to_proto_struct(&map)
}

#[tokio::test]
async fn multi_part_configuration_layers_the_plugin_config() {
    let root = TempDir::new().expect("temp dir");
    write_fake_plugin(root.path(), "fake", "0.1.0");
    let mut rpc = handshaking_rpc("fake");
    rpc.expect_configure_interaction().returning(|_| {
        Ok(proto::ConfigureInteractionResponse {
            error: String::new(),
            interaction: vec![
                proto::InteractionResponse {
                    contents: Some(proto::Body {
                        content_type: "application/fake".to_owned(),
                        content: Some(b"request-body".to_vec()),
                        content_type_hint: proto::ContentTypeHint::Text as i32,
                    }),
                    part_name: "request".to_owned(),
                    plugin_configuration: Some(proto::PluginConfiguration {
                        interaction_configuration: Some(struct_of(&[(
                            "part",
                            json!("request"),
                        )])),
                        pact_configuration: None,
                    }),
                    ..proto::InteractionResponse::default()
                },
                proto::InteractionResponse {
                    contents: Some(proto::Body {
                        content_type: "application/fake".to_owned(),
                        content: Some(b"response-body".to_vec()),
                        content_type_hint: proto::ContentTypeHint::Default as i32,
                    }),
                    part_name: "response".to_owned(),
                    plugin_configuration: Some(proto::PluginConfiguration {
                        interaction_configuration: Some(struct_of(&[(
                            "part",
                            json!("response"),
                        )])),
                        pact_configuration: None,
                    }),
                    rules: HashMap::from([(
                        "$.name".to_owned(),
                        proto::MatchingRules {
                            rule: vec![proto::MatchingRule {
                                r#type: "regex".to_owned(),
                                values: Some(struct_of(&[("regex", json!("\\w+"))])),
                            }],
                        },
                    )]),
                    generators: HashMap::from([(
                        "$.id".to_owned(),
                        proto::Generator {
                            r#type: "Uuid".to_owned(),
                            values: Some(struct_of(&[])),
                        },
                    )]),
                    ..proto::InteractionResponse::default()
                },
            ],
            plugin_configuration: Some(proto::PluginConfiguration {
                interaction_configuration: None,
                pact_configuration: Some(struct_of(&[("schema", json!("abc123"))])),
            }),
        })
    });
    let manager = manager_for(root.path(), rpc);
    let (_, entry) = load_fake_plugin(&manager, "fake").await;

    let parts = manager
        .configure_content_matcher_interaction(&entry, "application/fake", &HashMap::new())
        .await
        .expect("configuration succeeds");

    assert_eq!(parts.len(), 2);
    let request = parts.first().expect("request part");
    let response = parts.last().expect("response part");
    assert_eq!(request.part_name, "request");
    assert_eq!(response.part_name, "response");

    // Both parts share the pact-scoped key from the response level.
    assert_eq!(request.plugin_config.pact_configuration.get("schema"), Some(&json!("abc123")));
    assert_eq!(response.plugin_config.pact_configuration.get("schema"), Some(&json!("abc123")));
    // While the interaction-scoped configuration differs per part.
    assert_eq!(
        request.plugin_config.interaction_configuration.get("part"),
        Some(&json!("request"))
    );
    assert_eq!(
        response.plugin_config.interaction_configuration.get("part"),
        Some(&json!("response"))
    );

    assert_eq!(request.body.bytes(), b"request-body");
    assert_eq!(request.body.content_type_hint, ContentTypeHint::Text);
    assert_eq!(request.interaction_markup_type, "COMMON_MARK");

    let rules = response.rules.as_ref().expect("body rules");
    assert_eq!(rules.name, "body");
    let group = rules.rules.get("$.name").expect("rule group");
    assert_eq!(group.rules.first().expect("one rule").rule_type, "regex");

    let generators = response.generators.as_ref().expect("generators");
    let body_generators =
        generators.categories.get(&GeneratorCategory::Body).expect("body generators");
    assert_eq!(body_generators.get("$.id").expect("uuid generator").generator_type, "Uuid");

    manager.shutdown_plugins().await;
}

#[tokio::test]
async fn a_configuration_error_is_surfaced_as_a_failure() {
    let root = TempDir::new().expect("temp dir");
    write_fake_plugin(root.path(), "fake", "0.1.0");
    let mut rpc = handshaking_rpc("fake");
    rpc.expect_configure_interaction().returning(|_| {
        Ok(proto::ConfigureInteractionResponse {
            error: "cannot configure".to_owned(),
            interaction: Vec::new(),
            plugin_configuration: None,
        })
    });
    let manager = manager_for(root.path(), rpc);
    let (_, entry) = load_fake_plugin(&manager, "fake").await;

    let err = manager
        .configure_content_matcher_interaction(&entry, "application/fake", &HashMap::new())
        .await
        .expect_err("must fail");
    match err {
        PluginError::ConfigureInteraction { message, .. } => {
            assert_eq!(message, "cannot configure");
        }
        other => panic!("expected ConfigureInteraction, got {other}"),
    }

    manager.shutdown_plugins().await;
}

// ---------------------------------------------------------------------------
// Content generation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn generated_content_returns_only_the_body() {
    let root = TempDir::new().expect("temp dir");
    write_fake_plugin(root.path(), "fake", "0.1.0");
    let mut rpc = handshaking_rpc("fake");
    rpc.expect_generate_content().returning(|request| {
        // The plugin-scoped configuration for this plugin only.
        let config = request.plugin_configuration.expect("plugin configuration is sent");
        let pact_config = config.pact_configuration.expect("pact-scoped configuration");
        assert_eq!(
            proto_struct_to_json(&pact_config),
            json!({"schema": "abc123"}),
        );
        Ok(proto::GenerateContentResponse {
            contents: Some(proto::Body {
                content_type: "application/fake".to_owned(),
                content: Some(b"generated".to_vec()),
                content_type_hint: proto::ContentTypeHint::Default as i32,
            }),
        })
    });
    let manager = manager_for(root.path(), rpc);
    let (_, entry) = load_fake_plugin(&manager, "fake").await;

    let request = ContentGenerationRequest {
        content_type: ContentType::new("application/fake"),
        body: Body::new(b"template".to_vec(), Some(ContentType::new("application/fake"))),
        generators: HashMap::from([(
            "$.id".to_owned(),
            GeneratorDescriptor { generator_type: "Uuid".to_owned(), values: json!({}) },
        )]),
        test_mode: GeneratorTestMode::Consumer,
        for_request: true,
        plugin_data: vec![crate::model::PluginData {
            name: "fake".to_owned(),
            version: "0.1.0".to_owned(),
            configuration: HashMap::from([("schema".to_owned(), json!("abc123"))]),
        }],
        interaction_data: HashMap::new(),
        test_context: HashMap::new(),
    };
    let body = manager.generate_content(&entry, &request).await.expect("generation succeeds");

    assert_eq!(body.bytes(), b"generated");
    assert_eq!(body.content_type_str(), "application/fake");

    manager.shutdown_plugins().await;
}

// ---------------------------------------------------------------------------
// Mock servers
// ---------------------------------------------------------------------------

async fn transport_fixture(
    rpc: MockPluginRpc,
) -> (Arc<PluginManager>, CatalogueEntry, TempDir) {
    let root = TempDir::new().expect("temp dir");
    write_fake_plugin(root.path(), "fake", "0.1.0");
    let manager = manager_for(root.path(), rpc);
    let (_, entry) = load_fake_plugin(&manager, "fake").await;
    (manager, entry, root)
}

#[tokio::test]
async fn starting_a_mock_server_yields_its_details() {
    let mut rpc = handshaking_rpc("fake");
    rpc.expect_start_mock_server().returning(|request| {
        assert_eq!(request.pact, "{\"pact\":true}");
        assert_eq!(request.port, 0);
        Ok(proto::StartMockServerResponse {
            response: Some(proto::StartMockServerOutcome::Details(proto::MockServerDetails {
                key: "ms-1".to_owned(),
                port: 18443,
                address: "http://127.0.0.1:18443".to_owned(),
            })),
        })
    });
    let (manager, entry, _root) = transport_fixture(rpc).await;

    let pact = "{\"pact\":true}".to_owned();
    let details = manager
        .start_mock_server(&entry, &MockServerConfig::default(), &pact, &HashMap::new())
        .await
        .expect("mock server starts");

    assert_eq!(details.key, "ms-1");
    assert_eq!(details.port, 18443);
    assert_eq!(details.base_url, "http://127.0.0.1:18443");

    manager.shutdown_plugins().await;
}

#[tokio::test]
async fn a_mock_server_start_error_names_the_plugin() {
    let mut rpc = handshaking_rpc("fake");
    rpc.expect_start_mock_server().returning(|_| {
        Ok(proto::StartMockServerResponse {
            response: Some(proto::StartMockServerOutcome::Error("port in use".to_owned())),
        })
    });
    let (manager, entry, _root) = transport_fixture(rpc).await;

    let err = manager
        .start_mock_server(&entry, &MockServerConfig::default(), &String::new(), &HashMap::new())
        .await
        .expect_err("must fail");
    match err {
        PluginError::MockServer { name, message } => {
            assert_eq!(name, "fake");
            assert_eq!(message, "port in use");
        }
        other => panic!("expected MockServer, got {other}"),
    }

    manager.shutdown_plugins().await;
}

#[tokio::test]
async fn a_clean_mock_server_shutdown_is_none_not_an_empty_list() {
    let mut rpc = handshaking_rpc("fake");
    rpc.expect_shutdown_mock_server().returning(|_| {
        Ok(proto::ShutdownMockServerResponse { ok: true, results: Vec::new() })
    });
    let (manager, entry, _root) = transport_fixture(rpc).await;

    let details = MockServerDetails {
        key: "ms-1".to_owned(),
        base_url: "http://127.0.0.1:18443".to_owned(),
        port: 18443,
        plugin: manager
            .lookup_plugin(&PluginDependency::plugin("fake", None))
            .await
            .expect("plugin is loaded"),
    };
    let results = manager.shutdown_mock_server(&details).await.expect("shutdown succeeds");
    assert!(results.is_none(), "ok means no errors, which is distinct from errors: []");

    // Unused transport entry silences nothing; keep the catalogue lookup
    // honest about the entry existing.
    assert_eq!(entry.plugin_name(), Some("fake"));

    manager.shutdown_plugins().await;
}

#[tokio::test]
async fn mock_server_mismatches_are_translated_per_path() {
    let mut rpc = handshaking_rpc("fake");
    rpc.expect_get_mock_server_results().returning(|_| {
        Ok(proto::MockServerResults {
            ok: false,
            results: vec![proto::MockServerResult {
                path: "/Calculator/calculate".to_owned(),
                error: String::new(),
                mismatches: vec![proto::ContentMismatch {
                    expected: Some(b"3".to_vec()),
                    actual: Some(b"4".to_vec()),
                    mismatch: "expected 3 sides but got 4".to_owned(),
                    path: "$.sides".to_owned(),
                    diff: String::new(),
                    mismatch_type: "BodyMismatch".to_owned(),
                }],
            }],
        })
    });
    let (manager, _entry, _root) = transport_fixture(rpc).await;

    let details = MockServerDetails {
        key: "ms-1".to_owned(),
        base_url: "http://127.0.0.1:18443".to_owned(),
        port: 18443,
        plugin: manager
            .lookup_plugin(&PluginDependency::plugin("fake", None))
            .await
            .expect("plugin is loaded"),
    };
    let results = manager
        .get_mock_server_results(&details)
        .await
        .expect("call succeeds")
        .expect("results are present");

    assert_eq!(results.len(), 1);
    let result = results.first().expect("one result");
    assert_eq!(result.path, "/Calculator/calculate");
    let mismatch = result.mismatches.first().expect("one mismatch");
    assert_eq!(mismatch.mismatch_type.as_deref(), Some("BodyMismatch"));
    assert_eq!(mismatch.diff, None);

    manager.shutdown_plugins().await;
}

// ---------------------------------------------------------------------------
// Transport verification
// ---------------------------------------------------------------------------

#[tokio::test]
async fn preparation_preserves_json_and_binary_metadata_distinctly() {
    let mut rpc = handshaking_rpc("fake");
    rpc.expect_prepare_interaction_for_verification().returning(|request| {
        assert_eq!(request.interaction_key, "interaction-1");
        Ok(proto::VerificationPreparationResponse {
            response: Some(proto::VerificationPreparationOutcome::InteractionData(
                proto::InteractionData {
                    body: Some(proto::Body {
                        content_type: "application/fake".to_owned(),
                        content: Some(b"request-payload".to_vec()),
                        content_type_hint: proto::ContentTypeHint::Binary as i32,
                    }),
                    metadata: HashMap::from([
                        (
                            "routing-key".to_owned(),
                            proto::MetadataValue {
                                value: Some(proto::MetadataValueKind::NonBinaryValue(
                                    pact_plugin_proto::values::json_to_proto_value(&json!(
                                        "orders"
                                    )),
                                )),
                            },
                        ),
                        (
                            "raw-token".to_owned(),
                            proto::MetadataValue {
                                value: Some(proto::MetadataValueKind::BinaryValue(
                                    b"\x00\x01".to_vec(),
                                )),
                            },
                        ),
                    ]),
                },
            )),
        })
    });
    let (manager, entry, _root) = transport_fixture(rpc).await;

    let data = manager
        .prepare_validation_for_interaction(
            &entry,
            &"{}".to_owned(),
            "interaction-1",
            &HashMap::new(),
        )
        .await
        .expect("preparation succeeds");

    assert_eq!(data.request_body.bytes(), b"request-payload");
    assert_eq!(data.request_body.content_type_hint, ContentTypeHint::Binary);
    assert_eq!(data.metadata.get("routing-key"), Some(&MetadataValue::Json(json!("orders"))));
    assert_eq!(
        data.metadata.get("raw-token"),
        Some(&MetadataValue::Binary(bytes::Bytes::from_static(b"\x00\x01")))
    );

    manager.shutdown_plugins().await;
}

#[tokio::test]
async fn verification_decodes_result_details_and_output() {
    let mut rpc = handshaking_rpc("fake");
    rpc.expect_verify_interaction().returning(|request| {
        // Binary metadata must be re-encoded as the binary wire variant.
        let data = request.interaction_data.expect("interaction data");
        let token = data.metadata.get("raw-token").expect("binary metadata");
        assert!(matches!(
            token.value,
            Some(proto::MetadataValueKind::BinaryValue(_))
        ));
        Ok(proto::VerifyInteractionResponse {
            response: Some(proto::VerifyInteractionOutcome::Result(proto::VerificationResult {
                success: false,
                response_data: None,
                mismatches: vec![
                    proto::VerificationResultItem {
                        result: Some(proto::VerificationResultItemKind::Error(
                            "connection reset".to_owned(),
                        )),
                    },
                    proto::VerificationResultItem {
                        result: Some(proto::VerificationResultItemKind::Mismatch(
                            proto::ContentMismatch {
                                expected: Some(b"200".to_vec()),
                                actual: Some(b"500".to_vec()),
                                mismatch: "expected status 200".to_owned(),
                                path: "$.status".to_owned(),
                                diff: String::new(),
                                mismatch_type: String::new(),
                            },
                        )),
                    },
                ],
                output: vec!["curl -X POST http://localhost/orders".to_owned()],
            })),
        })
    });
    let (manager, entry, _root) = transport_fixture(rpc).await;

    let verification_data = InteractionVerificationData {
        request_body: Body::new(b"payload".to_vec(), Some(ContentType::new("application/fake"))),
        metadata: HashMap::from([
            ("routing-key".to_owned(), MetadataValue::Json(json!("orders"))),
            ("raw-token".to_owned(), MetadataValue::Binary(bytes::Bytes::from_static(b"\x00"))),
        ]),
    };
    let result = manager
        .verify_interaction(&entry, &verification_data, &HashMap::new(), &"{}".to_owned(), "key-1")
        .await
        .expect("verification runs");

    assert!(!result.ok);
    assert_eq!(result.details.len(), 2);
    assert!(matches!(
        result.details.first().expect("first detail"),
        InteractionVerificationDetails::Error(message) if message == "connection reset"
    ));
    assert!(matches!(
        result.details.last().expect("second detail"),
        InteractionVerificationDetails::Mismatch { path, .. } if path == "$.status"
    ));
    assert_eq!(result.output, vec!["curl -X POST http://localhost/orders".to_owned()]);

    manager.shutdown_plugins().await;
}

#[tokio::test]
async fn a_preparation_error_names_the_plugin() {
    let mut rpc = handshaking_rpc("fake");
    rpc.expect_prepare_interaction_for_verification().returning(|_| {
        Ok(proto::VerificationPreparationResponse {
            response: Some(proto::VerificationPreparationOutcome::Error(
                "unknown interaction".to_owned(),
            )),
        })
    });
    let (manager, entry, _root) = transport_fixture(rpc).await;

    let err = manager
        .prepare_validation_for_interaction(&entry, &"{}".to_owned(), "nope", &HashMap::new())
        .await
        .expect_err("must fail");
    match err {
        PluginError::VerificationPreparation { name, message } => {
            assert_eq!(name, "fake");
            assert_eq!(message, "unknown interaction");
        }
        other => panic!("expected VerificationPreparation, got {other}"),
    }

    manager.shutdown_plugins().await;
}

// ---------------------------------------------------------------------------
// Facades
// ---------------------------------------------------------------------------

#[tokio::test]
async fn facades_are_found_by_content_type_and_bound_to_the_manager() {
    let root = TempDir::new().expect("temp dir");
    write_fake_plugin(root.path(), "fake", "0.1.0");
    let mut rpc = handshaking_rpc("fake");
    rpc.expect_compare_contents().returning(|_| {
        Ok(proto::CompareContentsResponse {
            error: String::new(),
            type_mismatch: None,
            results: HashMap::new(),
        })
    });
    let manager = manager_for(root.path(), rpc);
    load_fake_plugin(&manager, "fake").await;

    let matcher = manager
        .find_content_matcher(&ContentType::new("application/fake"))
        .expect("matcher facade");
    assert!(!matcher.is_core());
    assert_eq!(matcher.plugin_name(), "fake");
    assert_eq!(matcher.catalogue_entry_key(), "plugin/fake/content-matcher/fake");

    let mismatches = matcher
        .match_contents(&ContentComparisonRequest::default())
        .await
        .expect("match runs");
    assert!(mismatches.is_empty());

    assert!(
        manager.find_content_generator(&ContentType::new("application/fake")).is_none(),
        "the fake plugin registered no generator"
    );

    manager.shutdown_plugins().await;
}
