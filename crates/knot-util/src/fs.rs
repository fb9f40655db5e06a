use std::path::{Component, Path, PathBuf};

/// Compute the path of `target` relative to the directory `from_dir`.
///
/// Both paths are expected to be absolute and free of `.`/`..` components
/// (canonicalize them first). The result is what a symlink placed inside
/// `from_dir` must contain to reach `target`.
#[must_use]
pub fn relative_path(from_dir: &Path, target: &Path) -> PathBuf {
    let from: Vec<Component<'_>> = from_dir.components().collect();
    let to: Vec<Component<'_>> = target.components().collect();

    let common = from
        .iter()
        .zip(to.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut rel = PathBuf::new();
    for _ in common..from.len() {
        rel.push("..");
    }
    for component in &to[common..] {
        rel.push(component.as_os_str());
    }

    if rel.as_os_str().is_empty() {
        rel.push(".");
    }
    rel
}

/// The process umask, read once and cached.
///
/// `umask(2)` can only be read by setting it, so the original value is
/// restored immediately.
#[cfg(unix)]
#[must_use]
pub fn umask() -> u32 {
    use std::sync::OnceLock;

    static UMASK: OnceLock<u32> = OnceLock::new();
    *UMASK.get_or_init(|| {
        // SAFETY: umask has no memory-safety preconditions.
        let current = unsafe { libc::umask(0o022) };
        // SAFETY: see above; restores the value we just read.
        unsafe { libc::umask(current) };
        u32::from(current)
    })
}

/// Mode bits for an executable script: `0755` minus the active umask.
#[cfg(unix)]
#[must_use]
pub fn executable_mode() -> u32 {
    0o755 & !umask()
}
