//! Lifecycle script execution.

use super::error::{PkgError, ScriptFailure};
use super::graph::{ResolvedPackage, Source};
use super::manifest::LIFECYCLE_SCRIPTS;
use super::store::ContentStore;
use crate::paths::NODE_MODULES;
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Runs `preinstall`, `install` and `postinstall` for installed packages.
#[derive(Debug, Clone)]
pub struct BuildRunner {
    store: ContentStore,
    sh: String,
    sh_flag: String,
    bin_dir: Option<PathBuf>,
}

impl BuildRunner {
    #[must_use]
    pub fn new(store: ContentStore, sh: String, sh_flag: String, bin_dir: Option<PathBuf>) -> Self {
        Self {
            store,
            sh,
            sh_flag,
            bin_dir,
        }
    }

    /// Run every package's lifecycle scripts in order.
    ///
    /// Packages are processed one at a time with inherited stdio. Every
    /// queued script is attempted, even after a failure. Packages linked from
    /// an existing install are skipped.
    ///
    /// Returns the number of scripts executed.
    ///
    /// # Errors
    /// Returns `PkgError::FailedBuild` listing every failing script.
    pub async fn run(&self, packages: &[Arc<ResolvedPackage>]) -> Result<usize, PkgError> {
        let mut failures = Vec::new();
        let mut executed = 0;

        for package in packages {
            if package.source == Source::Local {
                continue;
            }

            for &stage in LIFECYCLE_SCRIPTS {
                let Some(script) = package.scripts.get(stage) else {
                    continue;
                };

                executed += 1;
                if let Err(failure) = self.run_script(package, stage, script).await {
                    warn!(
                        package = %package.name,
                        id = %package.id,
                        script = stage,
                        code = ?failure.code,
                        "Lifecycle script failed"
                    );
                    failures.push(failure);
                }
            }
        }

        if failures.is_empty() {
            Ok(executed)
        } else {
            Err(PkgError::FailedBuild { failures })
        }
    }

    async fn run_script(
        &self,
        package: &ResolvedPackage,
        stage: &str,
        script: &str,
    ) -> Result<(), ScriptFailure> {
        let failure = |code| ScriptFailure {
            package: package.name.clone(),
            id: package.id.clone(),
            script: stage.to_string(),
            code,
        };

        info!(package = %package.name, script = stage, "> {script}");

        let mut cmd = Command::new(&self.sh);
        cmd.args(self.sh_flag.split_whitespace())
            .arg(script)
            .current_dir(self.store.package_dir(&package.id))
            .env("npm_execpath", "")
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());
        if let Some(path) = self.search_path(&package.id) {
            cmd.env("PATH", path);
        }

        match cmd.status().await {
            Ok(status) if status.success() => {
                debug!(package = %package.name, script = stage, "Lifecycle script done");
                Ok(())
            }
            Ok(status) => Err(failure(status.code())),
            Err(e) => {
                warn!(shell = %self.sh, error = %e, "Failed to spawn shell");
                Err(failure(None))
            }
        }
    }

    /// The package's own `.bin`, then the installer's bin dir, then `$PATH`.
    fn search_path(&self, id: &str) -> Option<OsString> {
        let own_bin = self.store.store_root().join(id).join(NODE_MODULES).join(".bin");
        let inherited = std::env::var_os("PATH");

        let dirs = std::iter::once(own_bin)
            .chain(self.bin_dir.clone())
            .chain(inherited.iter().flat_map(std::env::split_paths));
        std::env::join_paths(dirs).ok()
    }
}
