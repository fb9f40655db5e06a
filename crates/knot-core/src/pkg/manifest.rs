//! `package.json` parsing.
//!
//! A [`Manifest`] keeps the raw JSON object and exposes typed views of the
//! fields the installer cares about: dependency sections, bundled names, `bin`
//! and lifecycle `scripts`.

use super::error::{codes, IoContext, PkgError};
use super::spec::{validate_name, PackageSpec};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::Path;

/// Dependency sections read for the entry (root) manifest.
pub const ENTRY_DEPENDENCY_FIELDS: &[&str] =
    &["optionalDependencies", "devDependencies", "dependencies"];

/// Dependency sections read for every installed package.
pub const DEPENDENCY_FIELDS: &[&str] = &["optionalDependencies", "dependencies"];

/// Lifecycle scripts run after linking, in execution order.
pub const LIFECYCLE_SCRIPTS: &[&str] = &["preinstall", "install", "postinstall"];

/// Dependencies extracted from a manifest.
#[derive(Debug, Clone, Default)]
pub struct PackageDeps {
    /// Valid dependencies as (name, range) pairs, sorted by name.
    pub deps: Vec<(String, String)>,
    /// Entries that were skipped.
    pub errors: Vec<PkgDepError>,
}

/// A dependency entry that could not be used.
#[derive(Debug, Clone)]
pub struct PkgDepError {
    /// Dependency name, or the section name for a malformed section.
    pub name: String,
    pub code: &'static str,
    pub message: String,
}

impl PkgDepError {
    #[must_use]
    pub fn new(name: impl Into<String>, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            code,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn invalid_range(name: &str, actual_type: &str) -> Self {
        Self::new(
            name,
            codes::PKG_DEP_RANGE_INVALID,
            format!("expected string, got {actual_type}"),
        )
    }

    #[must_use]
    pub fn invalid_name(name: &str, reason: &PkgError) -> Self {
        Self::new(name, codes::PKG_DEP_NAME_INVALID, reason.to_string())
    }

    #[must_use]
    pub fn invalid_section(section: &str, actual_type: &str) -> Self {
        Self::new(
            section,
            codes::PKG_MANIFEST_INVALID,
            format!("'{section}' must be an object, got {actual_type}"),
        )
    }
}

/// Distribution metadata of a published version.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DistInfo {
    pub tarball: String,
    /// SHA-1 hex digest of the tarball bytes.
    #[serde(default)]
    pub shasum: Option<String>,
    #[serde(default)]
    pub integrity: Option<String>,
}

/// A parsed `package.json`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Manifest {
    raw: Map<String, Value>,
}

impl Manifest {
    /// Wrap a JSON value. The value must be an object.
    ///
    /// # Errors
    /// Returns `PkgError::Manifest` if `value` is not an object.
    pub fn from_value(value: Value, origin: &Path) -> Result<Self, PkgError> {
        match value {
            Value::Object(raw) => Ok(Self { raw }),
            other => Err(PkgError::manifest(
                origin,
                format!("expected an object, got {}", json_type_name(&other)),
            )),
        }
    }

    /// Read `package.json` from disk.
    ///
    /// # Errors
    /// Returns `PkgError::Io` if the file cannot be read (a missing file stays
    /// distinguishable through [`PkgError::is_io_not_found`]), or
    /// `PkgError::Manifest` if it is not a JSON object.
    pub fn read(path: &Path) -> Result<Self, PkgError> {
        let content = fs::read_to_string(path).at(path)?;
        let value: Value = serde_json::from_str(&content)
            .map_err(|e| PkgError::manifest(path, format!("invalid JSON: {e}")))?;
        Self::from_value(value, path)
    }

    /// Synthesize a root manifest from command-line package specs.
    ///
    /// Specs without a range request `latest`.
    #[must_use]
    pub fn from_specs(specs: &[PackageSpec]) -> Self {
        let deps: Map<String, Value> = specs
            .iter()
            .map(|spec| {
                let range = spec.range.clone().unwrap_or_else(|| "latest".to_string());
                (spec.name.clone(), Value::String(range))
            })
            .collect();

        let mut raw = Map::new();
        raw.insert("dependencies".to_string(), Value::Object(deps));
        Self { raw }
    }

    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.raw.get("name").and_then(Value::as_str)
    }

    #[must_use]
    pub fn version(&self) -> Option<&str> {
        self.raw.get("version").and_then(Value::as_str)
    }

    /// The underlying JSON object.
    #[must_use]
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.raw
    }

    /// `dist` metadata, present on manifests taken from a package root.
    #[must_use]
    pub fn dist(&self) -> Option<DistInfo> {
        self.raw
            .get("dist")
            .and_then(|v| DistInfo::deserialize(v).ok())
    }

    /// Extract dependencies from `fields`, later fields taking precedence.
    ///
    /// Names listed as bundled are dropped. Malformed sections and non-string
    /// ranges are reported in [`PackageDeps::errors`] and skipped.
    #[must_use]
    pub fn dependencies(&self, fields: &[&str]) -> PackageDeps {
        let mut result = PackageDeps::default();
        let mut deps_map: HashMap<String, String> = HashMap::new();

        for field in fields {
            extract_section(&self.raw, field, &mut deps_map, &mut result.errors);
        }

        let bundled = self.bundled();
        let mut deps_vec: Vec<(String, String)> = deps_map
            .into_iter()
            .filter(|(name, _)| !bundled.contains(name))
            .collect();
        deps_vec.sort_by(|a, b| a.0.cmp(&b.0));
        result.deps = deps_vec;

        result
    }

    /// Names shipped inside the package tarball.
    ///
    /// `bundleDependencies: true` bundles every entry of `dependencies`.
    #[must_use]
    pub fn bundled(&self) -> HashSet<String> {
        let mut names = HashSet::new();
        for field in ["bundleDependencies", "bundledDependencies"] {
            match self.raw.get(field) {
                Some(Value::Array(items)) => {
                    names.extend(items.iter().filter_map(Value::as_str).map(String::from));
                }
                Some(Value::Bool(true)) => {
                    if let Some(Value::Object(deps)) = self.raw.get("dependencies") {
                        names.extend(deps.keys().cloned());
                    }
                }
                _ => {}
            }
        }
        names
    }

    /// Normalized `bin` map of command name to package-relative script path.
    ///
    /// A string `bin` is exposed under the package name (without scope). An
    /// object is used as-is, minus non-string values. Anything else is empty.
    #[must_use]
    pub fn bin(&self) -> BTreeMap<String, String> {
        match self.raw.get("bin") {
            Some(Value::String(path)) => self
                .name()
                .map(|name| {
                    let command = name.rsplit('/').next().unwrap_or(name);
                    BTreeMap::from([(command.to_string(), path.clone())])
                })
                .unwrap_or_default(),
            Some(Value::Object(entries)) => entries
                .iter()
                .filter_map(|(k, v)| v.as_str().map(|p| (k.clone(), p.to_string())))
                .collect(),
            _ => BTreeMap::new(),
        }
    }

    /// All string-valued `scripts`.
    #[must_use]
    pub fn scripts(&self) -> BTreeMap<String, String> {
        self.raw
            .get("scripts")
            .and_then(Value::as_object)
            .map(|scripts| {
                scripts
                    .iter()
                    .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn extract_section(
    root: &Map<String, Value>,
    section: &str,
    deps_map: &mut HashMap<String, String>,
    errors: &mut Vec<PkgDepError>,
) {
    let Some(section_value) = root.get(section) else {
        return;
    };

    let Some(section_obj) = section_value.as_object() else {
        errors.push(PkgDepError::invalid_section(
            section,
            json_type_name(section_value),
        ));
        return;
    };

    for (name, range_value) in section_obj {
        if let Err(e) = validate_name(name) {
            errors.push(PkgDepError::invalid_name(name, &e));
        } else if let Some(range) = range_value.as_str() {
            deps_map.insert(name.clone(), range.to_string());
        } else {
            errors.push(PkgDepError::invalid_range(
                name,
                json_type_name(range_value),
            ));
        }
    }
}

pub(crate) fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
