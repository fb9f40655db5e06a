use knot_core::config::InstallConfig;
use knot_core::pkg::clean_cache;
use knot_core::{Config, Error};
use miette::Result;
use serde::Serialize;
use std::path::PathBuf;
use tracing::debug;

use super::{print_json, ErrorInfo};

/// JSON output of `knot cache clean --json`.
#[derive(Debug, Serialize)]
struct CleanJsonResult {
    ok: bool,
    cache_dir: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    removed: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ErrorInfo>,
}

/// Remove one cached tarball, or all of them when `id` is `None`.
pub fn clean(config: &Config, id: Option<&str>) -> Result<()> {
    let cache_dir = InstallConfig::from_env(config.channel).cache_dir;
    debug!(cache = %cache_dir.display(), id, "Cleaning cache");

    match clean_cache(&cache_dir, id).map_err(Error::from) {
        Ok(removed) => {
            if config.json_logs {
                print_json(&CleanJsonResult {
                    ok: true,
                    cache_dir,
                    removed: Some(removed),
                    error: None,
                })?;
            } else {
                println!("Removed {removed} cached tarball(s) from {}", cache_dir.display());
            }
            Ok(())
        }
        Err(e) => {
            if config.json_logs {
                print_json(&CleanJsonResult {
                    ok: false,
                    cache_dir,
                    removed: None,
                    error: Some(ErrorInfo::from(&e)),
                })?;
            } else {
                eprintln!("error: {e}");
            }
            std::process::exit(1);
        }
    }
}
