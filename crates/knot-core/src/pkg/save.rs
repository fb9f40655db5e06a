//! Recording installed packages in the project's `package.json`.

use super::error::{IoContext, PkgError};
use super::graph::Source;
use super::install::InstalledPackage;
use super::spec::PackageSpec;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::debug;

/// Add `specs` to `dependencies`, or `devDependencies` when `dev` is set.
///
/// Registry and linked packages are saved as `^<installed version>`; tarball
/// and git packages keep the range they were requested with. A missing
/// `package.json` is created. Other members keep their order.
///
/// # Errors
/// Returns `PkgError::Manifest` if the existing file is not a JSON object or
/// its dependency section is not an object, or `PkgError::Io`.
pub fn save_specs(
    project_root: &Path,
    specs: &[PackageSpec],
    direct: &BTreeMap<String, InstalledPackage>,
    dev: bool,
) -> Result<(), PkgError> {
    let path = project_root.join("package.json");
    let mut manifest = match fs::read_to_string(&path) {
        Ok(content) => serde_json::from_str::<Value>(&content)
            .map_err(|e| PkgError::manifest(&path, format!("invalid JSON: {e}")))?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Value::Object(Map::new()),
        Err(e) => return Err(PkgError::io(&path, e)),
    };

    let field = if dev { "devDependencies" } else { "dependencies" };
    let Value::Object(root) = &mut manifest else {
        return Err(PkgError::manifest(&path, "expected an object"));
    };
    let Value::Object(section) = root
        .entry(field)
        .or_insert_with(|| Value::Object(Map::new()))
    else {
        return Err(PkgError::manifest(&path, format!("\"{field}\" is not an object")));
    };

    for spec in specs {
        let range = saved_range(spec, direct.get(&spec.name));
        debug!(package = %spec.name, range = %range, field, "Saving dependency");
        section.insert(spec.name.clone(), Value::String(range));
    }

    let mut out = serde_json::to_string_pretty(&manifest)
        .map_err(|e| PkgError::manifest(&path, e.to_string()))?;
    out.push('\n');
    fs::write(&path, out).at(&path)
}

fn saved_range(spec: &PackageSpec, installed: Option<&InstalledPackage>) -> String {
    match installed {
        Some(package)
            if matches!(package.source, Source::Registry | Source::Local)
                && !package.version.is_empty() =>
        {
            format!("^{}", package.version)
        }
        _ => spec.range.clone().unwrap_or_else(|| "*".to_string()),
    }
}
