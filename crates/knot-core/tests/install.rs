//! Integration tests for the install pipeline.
//!
//! These tests use an in-process mock npm registry (plus GitHub endpoints)
//! to avoid network calls.

use axum::{
    extract::State,
    http::{header, StatusCode, Uri},
    response::{IntoResponse, Response},
    Router,
};
use flate2::write::GzEncoder;
use flate2::Compression;
use knot_core::config::{Channel, GitHubEndpoints, InstallConfig};
use knot_core::pkg::{
    escape_name, install_project, install_specs, GlobalLinks, InstallSummary, PackageSpec,
    PkgError, Source,
};
use knot_util::hash::sha1_bytes;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tar::Builder;
use tempfile::TempDir;

#[derive(Default)]
struct Routes {
    bodies: HashMap<String, Vec<u8>>,
    roots: HashMap<String, Value>,
    hits: HashMap<String, usize>,
    /// Remaining forced 500 responses per path.
    failures: HashMap<String, usize>,
}

/// Mock registry serving package roots, tarballs and arbitrary fixtures.
struct MockRegistry {
    base: String,
    routes: Arc<Mutex<Routes>>,
}

async fn serve(State(routes): State<Arc<Mutex<Routes>>>, uri: Uri) -> Response {
    let mut routes = routes.lock().unwrap();
    let path = uri.path().to_string();
    *routes.hits.entry(path.clone()).or_default() += 1;

    if let Some(remaining) = routes.failures.get_mut(&path).filter(|n| **n > 0) {
        *remaining -= 1;
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    match routes.bodies.get(&path) {
        Some(body) => {
            let content_type = if path.ends_with(".tgz") || path.contains("/tar.gz/") {
                "application/octet-stream"
            } else {
                "application/json"
            };
            ([(header::CONTENT_TYPE, content_type)], body.clone()).into_response()
        }
        None => (StatusCode::NOT_FOUND, r#"{"error":"Not found"}"#).into_response(),
    }
}

impl MockRegistry {
    async fn start() -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let routes = Arc::new(Mutex::new(Routes::default()));

        let app = Router::new()
            .fallback(serve)
            .with_state(Arc::clone(&routes));
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { base, routes }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    fn route(&self, path: &str, body: Vec<u8>) {
        self.routes
            .lock()
            .unwrap()
            .bodies
            .insert(path.to_string(), body);
    }

    /// Answer the next `times` requests for `path` with a 500.
    fn fail(&self, path: &str, times: usize) {
        self.routes
            .lock()
            .unwrap()
            .failures
            .insert(path.to_string(), times);
    }

    fn hits(&self, path: &str) -> usize {
        self.routes
            .lock()
            .unwrap()
            .hits
            .get(path)
            .copied()
            .unwrap_or(0)
    }

    /// Publish `name@version`; `manifest` is merged into the generated
    /// `package.json`. Returns the shasum (the package's content id).
    fn publish(&self, name: &str, version: &str, manifest: Value, files: &[(&str, &[u8])]) -> String {
        let mut pkg_json = json!({ "name": name, "version": version });
        if let (Some(target), Value::Object(extra)) = (pkg_json.as_object_mut(), manifest) {
            target.extend(extra);
        }

        let tarball = tgz("package", &pkg_json, files);
        let shasum = sha1_bytes(&tarball);
        let basename = name.rsplit('/').next().unwrap();
        let tarball_path = format!("/{name}/-/{basename}-{version}.tgz");
        self.route(&tarball_path, tarball);

        let mut entry = pkg_json;
        entry["dist"] = json!({ "tarball": self.url(&tarball_path), "shasum": shasum });

        let root_path = format!("/{}", escape_name(name));
        let mut guard = self.routes.lock().unwrap();
        let routes = &mut *guard;
        let root = routes
            .roots
            .entry(root_path.clone())
            .or_insert_with(|| json!({ "name": name, "versions": {}, "dist-tags": {} }));
        root["versions"][version] = entry;
        root["dist-tags"]["latest"] = json!(version);
        let body = serde_json::to_vec(root).unwrap();
        routes.bodies.insert(root_path, body);

        shasum
    }

    /// Replace the advertised shasum of a published version.
    fn advertise_shasum(&self, name: &str, version: &str, shasum: &str) {
        let root_path = format!("/{}", escape_name(name));
        let mut guard = self.routes.lock().unwrap();
        let routes = &mut *guard;
        let root = routes.roots.get_mut(&root_path).unwrap();
        root["versions"][version]["dist"]["shasum"] = json!(shasum);
        let body = serde_json::to_vec(root).unwrap();
        routes.bodies.insert(root_path, body);
    }

    fn tarball_path(name: &str, version: &str) -> String {
        let basename = name.rsplit('/').next().unwrap();
        format!("/{name}/-/{basename}-{version}.tgz")
    }
}

/// Build a gzipped tarball with every entry under `prefix/`.
fn tgz(prefix: &str, pkg_json: &Value, files: &[(&str, &[u8])]) -> Vec<u8> {
    let pkg_json = serde_json::to_vec(pkg_json).unwrap();
    let mut tar_bytes = Vec::new();
    {
        let mut builder = Builder::new(&mut tar_bytes);
        let entries = std::iter::once(("package.json", pkg_json.as_slice())).chain(files.iter().copied());
        for (path, contents) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_path(format!("{prefix}/{path}")).unwrap();
            header.set_size(contents.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append(&header, contents).unwrap();
        }
        builder.finish().unwrap();
    }

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&tar_bytes).unwrap();
    encoder.finish().unwrap()
}

struct Project {
    _dir: TempDir,
    root: PathBuf,
    config: InstallConfig,
}

impl Project {
    fn new(registry: &MockRegistry, manifest: Value) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = dunce::canonicalize(dir.path()).unwrap().join("app");
        fs::create_dir_all(&root).unwrap();
        fs::write(root.join("package.json"), manifest.to_string()).unwrap();

        let config = InstallConfig::new(Channel::Dev)
            .with_registry(registry.url("/"))
            .with_cache_dir(root.parent().unwrap().join("cache"))
            .with_retries(0)
            .with_max_concurrent_requests(4)
            .with_github(GitHubEndpoints {
                api: registry.url("/gh-api/"),
                raw: registry.url("/gh-raw/"),
                codeload: registry.url("/gh-codeload/"),
            });

        Self {
            _dir: dir,
            root,
            config,
        }
    }

    fn with_retries(mut self, retries: u32) -> Self {
        self.config = self.config.clone().with_retries(retries);
        self
    }

    async fn install(&self) -> Result<InstallSummary, PkgError> {
        install_project(&self.root, &self.config).await
    }

    fn node_modules(&self) -> PathBuf {
        self.root.join("node_modules")
    }

    fn package_dir(&self, id: &str) -> PathBuf {
        self.node_modules().join(id).join("package")
    }

    /// Where `<node_modules of parent>/<name>` finally points.
    fn resolve_link(&self, parent: Option<&str>, name: &str) -> PathBuf {
        let dir = match parent {
            None => self.node_modules(),
            Some(id) => self.node_modules().join(id).join("node_modules"),
        };
        let link = dir.join(name);
        assert!(
            fs::symlink_metadata(&link).unwrap().file_type().is_symlink(),
            "{} is not a symlink",
            link.display()
        );
        dunce::canonicalize(link).unwrap()
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_zero_dependencies_yield_no_edges() {
    let registry = MockRegistry::start().await;
    let project = Project::new(&registry, json!({ "name": "app", "version": "1.0.0" }));

    let summary = project.install().await.unwrap();
    assert_eq!(summary.edges, 0);
    assert!(summary.packages.is_empty());
    assert_eq!(summary.downloaded, 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_diamond_fetches_shared_dependency_once() {
    let registry = MockRegistry::start().await;
    let c = registry.publish("c", "1.0.0", json!({}), &[("index.js", b"module.exports = 'c'")]);
    let a = registry.publish("a", "1.0.0", json!({ "dependencies": { "c": "^1.0.0" } }), &[]);
    let b = registry.publish("b", "1.0.0", json!({ "dependencies": { "c": "1.x" } }), &[]);

    let project = Project::new(
        &registry,
        json!({ "name": "app", "dependencies": { "a": "^1.0.0", "b": "^1.0.0" } }),
    );
    let summary = project.install().await.unwrap();

    assert_eq!(summary.edges, 4);
    assert_eq!(summary.packages.len(), 3);
    assert_eq!(summary.downloaded, 3);
    assert_eq!(registry.hits(&MockRegistry::tarball_path("c", "1.0.0")), 1);
    assert_eq!(registry.hits("/c"), 1);

    let store_c = project.package_dir(&c);
    assert_eq!(project.resolve_link(Some(&a), "c"), store_c);
    assert_eq!(project.resolve_link(Some(&b), "c"), store_c);
    assert_eq!(project.resolve_link(None, "a"), project.package_dir(&a));
    assert!(store_c.join("index.js").is_file());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_cycle_terminates_and_links_both() {
    let registry = MockRegistry::start().await;
    let a = registry.publish("a", "1.0.0", json!({ "dependencies": { "b": "1.0.0" } }), &[]);
    let b = registry.publish("b", "1.0.0", json!({ "dependencies": { "a": "1.0.0" } }), &[]);

    let project = Project::new(&registry, json!({ "dependencies": { "a": "1.0.0" } }));
    let summary = project.install().await.unwrap();

    // root -> a, a -> b, b -> a
    assert_eq!(summary.edges, 3);
    assert_eq!(summary.downloaded, 2);
    assert_eq!(project.resolve_link(Some(&a), "b"), project.package_dir(&b));
    assert_eq!(project.resolve_link(Some(&b), "a"), project.package_dir(&a));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_second_install_is_a_no_op() {
    let registry = MockRegistry::start().await;
    let c = registry.publish("c", "1.0.0", json!({}), &[]);
    let a = registry.publish("a", "1.0.0", json!({ "dependencies": { "c": "^1.0.0" } }), &[]);

    let project = Project::new(&registry, json!({ "dependencies": { "a": "^1.0.0" } }));
    let first = project.install().await.unwrap();
    assert_eq!(first.downloaded, 2);
    assert!(first.linked >= 2);

    let root_link = fs::read_link(project.node_modules().join("a")).unwrap();
    let nested_link = fs::read_link(project.node_modules().join(&a).join("node_modules").join("c")).unwrap();

    let second = project.install().await.unwrap();
    assert_eq!(second.downloaded, 0);
    assert_eq!(second.linked, 0);
    assert!(second.packages.iter().all(|p| p.source == Source::Local));
    assert_eq!(registry.hits("/a"), 1);
    assert_eq!(registry.hits(&MockRegistry::tarball_path("c", "1.0.0")), 1);

    assert_eq!(fs::read_link(project.node_modules().join("a")).unwrap(), root_link);
    assert_eq!(
        fs::read_link(project.node_modules().join(&a).join("node_modules").join("c")).unwrap(),
        nested_link
    );
    assert_eq!(project.resolve_link(Some(&a), "c"), project.package_dir(&c));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_extracts_from_cache_without_download() {
    let registry = MockRegistry::start().await;
    let a = registry.publish("a", "1.0.0", json!({}), &[]);

    let project = Project::new(&registry, json!({ "dependencies": { "a": "1.0.0" } }));
    project.install().await.unwrap();

    // Wipe the tree but keep the tarball cache
    fs::remove_dir_all(project.node_modules()).unwrap();

    let summary = project.install().await.unwrap();
    assert_eq!(summary.downloaded, 0);
    assert_eq!(summary.reused, 1);
    assert_eq!(registry.hits(&MockRegistry::tarball_path("a", "1.0.0")), 1);
    assert!(project.package_dir(&a).join("package.json").is_file());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_range_selects_highest_satisfying() {
    let registry = MockRegistry::start().await;
    registry.publish("lib", "1.0.0", json!({}), &[]);
    let wanted = registry.publish("lib", "1.2.0", json!({}), &[]);
    registry.publish("lib", "2.0.0", json!({}), &[]);

    let project = Project::new(&registry, json!({ "dependencies": { "lib": "^1.0.0" } }));
    let summary = project.install().await.unwrap();

    assert_eq!(summary.packages.len(), 1);
    assert_eq!(summary.packages[0].version, "1.2.0");
    assert_eq!(summary.packages[0].id, wanted);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_unsatisfiable_range_lists_available_versions() {
    let registry = MockRegistry::start().await;
    for version in ["1.0.0", "1.2.0", "2.0.0"] {
        registry.publish("lib", version, json!({}), &[]);
    }

    let project = Project::new(&registry, json!({ "dependencies": { "lib": "^9.0.0" } }));
    match project.install().await.unwrap_err() {
        PkgError::Version {
            name,
            requested,
            available,
        } => {
            assert_eq!(name, "lib");
            assert_eq!(requested, "^9.0.0");
            assert_eq!(available, vec!["1.0.0", "1.2.0", "2.0.0"]);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_dist_tag_resolution() {
    let registry = MockRegistry::start().await;
    registry.publish("lib", "1.0.0", json!({}), &[]);
    registry.publish("lib", "1.1.0", json!({}), &[]);

    let project = Project::new(&registry, json!({ "dependencies": { "lib": "latest" } }));
    let summary = project.install().await.unwrap();
    assert_eq!(summary.packages[0].version, "1.1.0");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_corrupted_tarball_is_not_cached() {
    let registry = MockRegistry::start().await;
    let actual = registry.publish("lib", "1.0.0", json!({}), &[]);
    registry.advertise_shasum("lib", "1.0.0", "cafef00d");

    let project = Project::new(&registry, json!({ "dependencies": { "lib": "1.0.0" } }));
    match project.install().await.unwrap_err() {
        PkgError::CorruptedPackage {
            url,
            expected,
            actual: computed,
        } => {
            assert!(url.ends_with("/lib/-/lib-1.0.0.tgz"));
            assert_eq!(expected, "cafef00d");
            assert_eq!(computed, actual);
        }
        other => panic!("unexpected error: {other}"),
    }

    let cache = &project.config.cache_dir;
    assert!(!cache.join("cafef00d").exists());
    assert!(!cache.join(&actual).exists());
    let leftovers = fs::read_dir(cache.join(".tmp")).map_or(0, Iterator::count);
    assert_eq!(leftovers, 0);
    assert!(!project.package_dir("cafef00d").exists());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_missing_package_is_not_found() {
    let registry = MockRegistry::start().await;
    let project = Project::new(&registry, json!({ "dependencies": { "ghost": "^1.0.0" } }));

    let err = project.install().await.unwrap_err();
    assert!(err.is_not_found(), "unexpected error: {err}");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_missing_package_is_not_retried() {
    let registry = MockRegistry::start().await;
    let project = Project::new(&registry, json!({ "dependencies": { "ghost": "^1.0.0" } }))
        .with_retries(3);

    let err = project.install().await.unwrap_err();
    assert!(err.is_not_found(), "unexpected error: {err}");
    assert_eq!(registry.hits("/ghost"), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_server_errors_are_retried() {
    let registry = MockRegistry::start().await;
    let id = registry.publish("lib", "1.0.0", json!({}), &[]);
    let tarball = MockRegistry::tarball_path("lib", "1.0.0");
    registry.fail("/lib", 2);
    registry.fail(&tarball, 1);

    let project = Project::new(&registry, json!({ "dependencies": { "lib": "1.0.0" } }))
        .with_retries(2);
    let summary = project.install().await.unwrap();

    assert_eq!(registry.hits("/lib"), 3);
    assert_eq!(registry.hits(&tarball), 2);
    assert_eq!(summary.downloaded, 1);
    assert_eq!(project.resolve_link(None, "lib"), project.package_dir(&id));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_exhausted_retries_report_last_error() {
    let registry = MockRegistry::start().await;
    registry.publish("lib", "1.0.0", json!({}), &[]);
    registry.fail("/lib", 2);

    let project = Project::new(&registry, json!({ "dependencies": { "lib": "1.0.0" } }))
        .with_retries(1);
    let err = project.install().await.unwrap_err();

    assert!(
        matches!(err, PkgError::Network { status: Some(500), ref url, .. } if url.ends_with("/lib")),
        "unexpected error: {err}"
    );
    assert_eq!(registry.hits("/lib"), 2);
    assert!(!project.node_modules().join("lib").exists());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_dependency_names_cannot_escape_node_modules() {
    let registry = MockRegistry::start().await;
    registry.route("/files/x.tgz", tgz("package", &json!({ "name": "x" }), &[]));
    let evil = registry.publish(
        "evil",
        "1.0.0",
        json!({ "dependencies": {
            "../../../../escaped": registry.url("/files/x.tgz"),
            "@scope/../../up": "^1.0.0"
        } }),
        &[],
    );

    let project = Project::new(&registry, json!({ "dependencies": { "evil": "1.0.0" } }));
    let summary = project.install().await.unwrap();

    assert_eq!(summary.edges, 1);
    assert_eq!(project.resolve_link(None, "evil"), project.package_dir(&evil));
    assert_eq!(registry.hits("/files/x.tgz"), 0);
    let outside = project.root.parent().unwrap().join("escaped");
    assert!(fs::symlink_metadata(&outside).is_err());
    assert!(fs::symlink_metadata(project.node_modules().join("up")).is_err());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_dev_dependencies_only_at_root() {
    let registry = MockRegistry::start().await;
    registry.publish("tool", "1.0.0", json!({}), &[]);
    let a = registry.publish(
        "a",
        "1.0.0",
        json!({ "devDependencies": { "never-published": "^1.0.0" } }),
        &[],
    );

    let project = Project::new(
        &registry,
        json!({
            "dependencies": { "a": "^1.0.0" },
            "devDependencies": { "tool": "^1.0.0" }
        }),
    );
    let summary = project.install().await.unwrap();

    assert_eq!(summary.edges, 2);
    assert_eq!(registry.hits("/never-published"), 0);
    assert!(project.node_modules().join("tool").exists());
    assert!(!project.node_modules().join(&a).join("node_modules").exists());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_bundled_dependencies_are_not_resolved() {
    let registry = MockRegistry::start().await;
    registry.publish(
        "a",
        "1.0.0",
        json!({
            "dependencies": { "inside": "^1.0.0" },
            "bundledDependencies": ["inside"]
        }),
        &[("node_modules/inside/package.json", br#"{"name":"inside"}"#)],
    );

    let project = Project::new(&registry, json!({ "dependencies": { "a": "^1.0.0" } }));
    let summary = project.install().await.unwrap();

    assert_eq!(summary.edges, 1);
    assert_eq!(registry.hits("/inside"), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_scoped_package_escaping_and_layout() {
    let registry = MockRegistry::start().await;
    let id = registry.publish("@scope/pkg", "1.0.0", json!({}), &[]);

    let project = Project::new(&registry, json!({ "dependencies": { "@scope/pkg": "^1.0.0" } }));
    project.install().await.unwrap();

    assert_eq!(registry.hits("/@scope%2Fpkg"), 1);
    assert_eq!(project.resolve_link(None, "@scope/pkg"), project.package_dir(&id));
}

#[cfg(unix)]
#[tokio::test(flavor = "multi_thread")]
async fn test_bin_links_are_executable() {
    use std::os::unix::fs::PermissionsExt;

    let registry = MockRegistry::start().await;
    let id = registry.publish(
        "tool",
        "1.0.0",
        json!({ "bin": "./cli.js" }),
        &[("cli.js", b"#!/bin/sh\necho tool\n")],
    );

    let project = Project::new(&registry, json!({ "dependencies": { "tool": "^1.0.0" } }));
    project.install().await.unwrap();

    let bin = project.node_modules().join(".bin").join("tool");
    let script = project.package_dir(&id).join("cli.js");
    assert_eq!(dunce::canonicalize(&bin).unwrap(), script);
    let mode = fs::metadata(&script).unwrap().permissions().mode();
    assert_eq!(mode & 0o100, 0o100);
}

#[cfg(unix)]
#[tokio::test(flavor = "multi_thread")]
async fn test_lifecycle_scripts_run_after_linking() {
    let registry = MockRegistry::start().await;
    registry.publish("dep", "1.0.0", json!({}), &[]);
    let id = registry.publish(
        "native",
        "1.0.0",
        json!({
            "dependencies": { "dep": "1.0.0" },
            "scripts": {
                "preinstall": "echo pre > order",
                "install": "echo install >> order",
                "postinstall": "test -n \"${npm_execpath+x}\" && echo post >> order"
            }
        }),
        &[],
    );

    let project = Project::new(&registry, json!({ "dependencies": { "native": "1.0.0" } }));
    let summary = project.install().await.unwrap();

    assert_eq!(summary.scripts_run, 3);
    let order = fs::read_to_string(project.package_dir(&id).join("order")).unwrap();
    assert_eq!(order, "pre\ninstall\npost\n");
}

#[cfg(unix)]
#[tokio::test(flavor = "multi_thread")]
async fn test_failed_scripts_are_aggregated() {
    let registry = MockRegistry::start().await;
    registry.publish("bad1", "1.0.0", json!({ "scripts": { "install": "exit 2" } }), &[]);
    registry.publish("bad2", "1.0.0", json!({ "scripts": { "postinstall": "exit 1" } }), &[]);
    let good = registry.publish("good", "1.0.0", json!({ "scripts": { "install": "touch built" } }), &[]);

    let project = Project::new(
        &registry,
        json!({ "dependencies": { "bad1": "1.0.0", "bad2": "1.0.0", "good": "1.0.0" } }),
    );
    match project.install().await.unwrap_err() {
        PkgError::FailedBuild { failures } => {
            let mut names: Vec<_> = failures.iter().map(|f| f.package.as_str()).collect();
            names.sort_unstable();
            assert_eq!(names, vec!["bad1", "bad2"]);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(project.package_dir(&good).join("built").exists());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_scripts_can_be_disabled() {
    let registry = MockRegistry::start().await;
    registry.publish("bad", "1.0.0", json!({ "scripts": { "install": "exit 1" } }), &[]);

    let mut project = Project::new(&registry, json!({ "dependencies": { "bad": "1.0.0" } }));
    project.config = project.config.clone().with_scripts(false);

    let summary = project.install().await.unwrap();
    assert_eq!(summary.scripts_run, 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_explicit_install_checks_local_version() {
    let registry = MockRegistry::start().await;
    registry.publish("lib", "1.0.0", json!({}), &[]);
    registry.publish("lib", "2.0.0", json!({}), &[]);

    let project = Project::new(&registry, json!({ "dependencies": { "lib": "1.0.0" } }));
    project.install().await.unwrap();

    let compatible = [PackageSpec::parse("lib@^1.0.0").unwrap()];
    let summary = install_specs(&project.root, &compatible, &project.config)
        .await
        .unwrap();
    assert_eq!(summary.packages[0].source, Source::Local);

    let conflicting = [PackageSpec::parse("lib@^2.0.0").unwrap()];
    match install_specs(&project.root, &conflicting, &project.config)
        .await
        .unwrap_err()
    {
        PkgError::LocalConflict {
            name,
            version,
            expected,
        } => {
            assert_eq!(name, "lib");
            assert_eq!(version, "1.0.0");
            assert_eq!(expected, "^2.0.0");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_globally_linked_package_is_used_in_place() {
    let registry = MockRegistry::start().await;
    let project = Project::new(&registry, json!({ "dependencies": { "my-lib": "^0.5.0" } }));

    let workspace = project.root.parent().unwrap().to_path_buf();
    let lib = workspace.join("my-lib");
    fs::create_dir_all(&lib).unwrap();
    fs::write(
        lib.join("package.json"),
        json!({ "name": "my-lib", "version": "0.5.2" }).to_string(),
    )
    .unwrap();

    let global = GlobalLinks::new(workspace.join("global"), workspace.join("global-bin"));
    global.link_to_global(&lib).await.unwrap();
    global.link_from_global(&project.root, "my-lib").await.unwrap();

    let summary = project.install().await.unwrap();
    assert_eq!(summary.edges, 1);
    assert_eq!(summary.downloaded, 0);
    assert_eq!(summary.direct["my-lib"].source, Source::Local);
    assert_eq!(summary.direct["my-lib"].version, "0.5.2");
    assert_eq!(registry.hits("/my-lib"), 0);
    assert_eq!(project.resolve_link(None, "my-lib"), lib);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_package_roots_fetched_once_per_name() {
    let registry = MockRegistry::start().await;
    let old = registry.publish("c", "1.0.0", json!({}), &[]);
    let new = registry.publish("c", "1.1.0", json!({}), &[]);
    let a = registry.publish("a", "1.0.0", json!({ "dependencies": { "c": "1.0.0" } }), &[]);
    let b = registry.publish("b", "1.0.0", json!({ "dependencies": { "c": "^1.0.0" } }), &[]);

    let project = Project::new(&registry, json!({ "dependencies": { "a": "*", "b": "*" } }));
    let summary = project.install().await.unwrap();

    // Same name, different content: two store entries, one package root fetch
    assert_eq!(registry.hits("/c"), 1);
    assert_eq!(summary.packages.len(), 4);
    assert_eq!(project.resolve_link(Some(&a), "c"), project.package_dir(&old));
    assert_eq!(project.resolve_link(Some(&b), "c"), project.package_dir(&new));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_tarball_url_dependency() {
    let registry = MockRegistry::start().await;
    let c = registry.publish("c", "1.0.0", json!({}), &[]);
    let manifest = json!({ "name": "t", "version": "0.3.0", "dependencies": { "c": "^1.0.0" } });
    registry.route("/files/t.tgz", tgz("t-0.3.0", &manifest, &[]));

    let url = registry.url("/files/t.tgz");
    let project = Project::new(&registry, json!({ "dependencies": { "t": url } }));
    let summary = project.install().await.unwrap();

    let id = sha1_bytes(url.as_bytes());
    assert_eq!(project.resolve_link(None, "t"), project.package_dir(&id));
    assert_eq!(project.resolve_link(Some(&id), "c"), project.package_dir(&c));
    assert_eq!(registry.hits("/files/t.tgz"), 1);

    let t = summary.packages.iter().find(|p| p.name == "t").unwrap();
    assert_eq!(t.version, "0.3.0");
    assert_eq!(t.source, Source::Tarball);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_github_dependency_pins_head_commit() {
    let registry = MockRegistry::start().await;
    let sha = "0123456789abcdef0123456789abcdef01234567";
    let manifest = json!({ "name": "gitdep", "version": "0.0.1" });

    registry.route(
        "/gh-raw/owner/repo/main/package.json",
        serde_json::to_vec(&manifest).unwrap(),
    );
    registry.route(
        "/gh-api/repos/owner/repo/git/refs/heads/main",
        serde_json::to_vec(&json!({ "ref": "refs/heads/main", "object": { "sha": sha } })).unwrap(),
    );
    registry.route(
        &format!("/gh-codeload/owner/repo/tar.gz/{sha}"),
        tgz(&format!("repo-{sha}"), &manifest, &[("index.js", b"1")]),
    );

    let project = Project::new(
        &registry,
        json!({ "dependencies": { "gitdep": "github:owner/repo#main" } }),
    );
    let summary = project.install().await.unwrap();

    assert_eq!(summary.packages[0].id, sha);
    assert_eq!(summary.packages[0].source, Source::Git);
    assert_eq!(project.resolve_link(None, "gitdep"), project.package_dir(sha));
    assert!(project.package_dir(sha).join("index.js").is_file());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_non_symlink_in_node_modules_is_a_conflict() {
    let registry = MockRegistry::start().await;
    registry.publish("lib", "1.0.0", json!({}), &[]);

    let project = Project::new(&registry, json!({ "dependencies": { "lib": "1.0.0" } }));
    let squatter = project.node_modules().join("lib");
    fs::create_dir_all(&squatter).unwrap();

    let err = project.install().await.unwrap_err();
    assert!(matches!(err, PkgError::LinkConflict { ref path } if path == &squatter), "{err}");
    assert!(squatter.is_dir());
}

#[cfg(unix)]
#[tokio::test(flavor = "multi_thread")]
async fn test_stale_link_is_replaced() {
    let registry = MockRegistry::start().await;
    let id = registry.publish("lib", "1.0.0", json!({}), &[]);

    let project = Project::new(&registry, json!({ "dependencies": { "lib": "1.0.0" } }));
    fs::create_dir_all(project.node_modules()).unwrap();
    std::os::unix::fs::symlink("does-not-exist", project.node_modules().join("lib")).unwrap();

    project.install().await.unwrap();
    assert_eq!(project.resolve_link(None, "lib"), project.package_dir(&id));
}
