//! Resolved dependency graph types.

use super::manifest::Manifest;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// A node of the dependency graph: the project itself or a store entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase", tag = "kind", content = "id")]
pub enum NodeId {
    Root,
    Package(String),
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Root => f.write_str("<root>"),
            Self::Package(id) => f.write_str(id),
        }
    }
}

/// Where a resolved package came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    /// Already linked into the parent's `node_modules`.
    Local,
    Registry,
    Tarball,
    Git,
}

/// Distribution metadata of a resolved package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Dist {
    pub tarball: String,
    /// Expected SHA-1 hex digest of the tarball. `None` skips verification.
    pub integrity: Option<String>,
}

/// A dependency resolved to exact, content-addressed contents.
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedPackage {
    /// Content id: the store key.
    pub id: String,
    pub name: String,
    pub version: String,
    pub source: Source,
    pub dist: Dist,
    #[serde(skip)]
    pub manifest: Arc<Manifest>,
    pub scripts: BTreeMap<String, String>,
    pub bin: BTreeMap<String, String>,
}

impl ResolvedPackage {
    /// Build a resolved package, deriving `scripts` and `bin` from the manifest.
    #[must_use]
    pub fn new(id: String, name: &str, source: Source, dist: Dist, manifest: Manifest) -> Self {
        let version = manifest.version().unwrap_or("0.0.0").to_string();
        let scripts = manifest.scripts();
        let mut bin = manifest.bin();
        if manifest.name().is_none() {
            // A string bin needs a name; fall back to the dependency name
            if let Some(path) = manifest.as_map().get("bin").and_then(|v| v.as_str()) {
                let command = name.rsplit('/').next().unwrap_or(name);
                bin.insert(command.to_string(), path.to_string());
            }
        }

        Self {
            id,
            name: name.to_string(),
            version,
            source,
            dist,
            manifest: Arc::new(manifest),
            scripts,
            bin,
        }
    }

    #[must_use]
    pub fn node(&self) -> NodeId {
        NodeId::Package(self.id.clone())
    }
}

/// "`parent`'s `node_modules/<name>` points at `resolved.id`".
#[derive(Debug, Clone)]
pub struct InstallEdge {
    pub parent: NodeId,
    pub name: String,
    pub resolved: Arc<ResolvedPackage>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::path::Path;

    fn dist() -> Dist {
        Dist {
            tarball: "http://r/x.tgz".to_string(),
            integrity: None,
        }
    }

    #[test]
    fn test_node_display() {
        assert_eq!(NodeId::Root.to_string(), "<root>");
        assert_eq!(NodeId::Package("abc".to_string()).to_string(), "abc");
    }

    #[test]
    fn test_resolved_from_manifest() {
        let manifest = Manifest::from_value(
            json!({
                "name": "tool",
                "version": "1.2.3",
                "bin": "cli.js",
                "scripts": { "install": "node build.js" }
            }),
            Path::new("package.json"),
        )
        .unwrap();
        let pkg = ResolvedPackage::new("id1".to_string(), "tool", Source::Registry, dist(), manifest);

        assert_eq!(pkg.version, "1.2.3");
        assert_eq!(pkg.bin.get("tool").map(String::as_str), Some("cli.js"));
        assert_eq!(pkg.scripts.len(), 1);
        assert_eq!(pkg.node(), NodeId::Package("id1".to_string()));
    }

    #[test]
    fn test_string_bin_without_manifest_name() {
        let manifest =
            Manifest::from_value(json!({ "bin": "run.js" }), Path::new("package.json")).unwrap();
        let pkg = ResolvedPackage::new("id".to_string(), "@s/runner", Source::Git, dist(), manifest);
        assert_eq!(pkg.bin.get("runner").map(String::as_str), Some("run.js"));
        assert_eq!(pkg.version, "0.0.0");
    }
}
