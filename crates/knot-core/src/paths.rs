use crate::config::Channel;
use crate::version::SCHEMA_VERSION;
use std::path::{Path, PathBuf};

/// Name of the directory holding the dependency tree and, by default, the store.
pub const NODE_MODULES: &str = "node_modules";

/// Find the project root by walking up from `cwd` looking for `package.json`.
///
/// Returns the first directory containing the manifest, or `None` if no
/// ancestor has one.
#[must_use]
pub fn project_root(cwd: &Path) -> Option<PathBuf> {
    let mut current = cwd.to_path_buf();

    loop {
        if current.join("package.json").exists() {
            return Some(current);
        }

        if !current.pop() {
            return None;
        }
    }
}

/// Get the cache directory for knot.
///
/// Uses platform-appropriate locations with versioning:
/// - Linux: `$XDG_CACHE_HOME/knot/v{N}/{channel}` or `~/.cache/knot/v{N}/{channel}`
/// - macOS: `~/Library/Caches/knot/v{N}/{channel}`
/// - Windows: `%LOCALAPPDATA%\knot\v{N}\{channel}`
#[must_use]
pub fn cache_dir(channel: Channel) -> PathBuf {
    let base = dirs_next::cache_dir().map_or_else(
        || {
            dirs_next::home_dir().map_or_else(
                || PathBuf::from(".knot-cache"),
                |p| p.join(".cache").join("knot"),
            )
        },
        |p| p.join("knot"),
    );

    base.join(format!("v{SCHEMA_VERSION}"))
        .join(channel.as_str())
}

/// Directory holding verified tarballs, keyed by content id.
#[must_use]
pub fn tarball_cache_dir(channel: Channel) -> PathBuf {
    cache_dir(channel).join("tarballs")
}

/// Default store root for a project: the project's own `node_modules`.
#[must_use]
pub fn default_store_dir(project_root: &Path) -> PathBuf {
    project_root.join(NODE_MODULES)
}
