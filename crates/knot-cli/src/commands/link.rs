//! `knot link` and `knot unlink`.
//!
//! - `knot link` exposes the current package globally
//! - `knot link <pkg>` links a globally exposed package into the project
//! - `knot unlink` removes the current package's global links
//! - `knot unlink <pkg>` removes a package link from the project

use knot_core::config::InstallConfig;
use knot_core::paths::project_root;
use knot_core::pkg::{GlobalLinks, LinkReport};
use knot_core::{Config, Error};
use miette::{IntoDiagnostic, Result};
use serde::Serialize;
use std::path::PathBuf;

use super::{print_json, ErrorInfo};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
enum Action {
    Register,
    Link,
    Unregister,
    Unlink,
}

/// JSON output of `knot link --json` and `knot unlink --json`.
#[derive(Debug, Serialize)]
struct LinkJsonResult {
    ok: bool,
    action: Action,
    #[serde(flatten)]
    report: Option<LinkReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ErrorInfo>,
}

pub fn link(config: &Config, package: Option<&str>) -> Result<()> {
    let action = if package.is_some() {
        Action::Link
    } else {
        Action::Register
    };
    run(config, action, package)
}

pub fn unlink(config: &Config, package: Option<&str>) -> Result<()> {
    let action = if package.is_some() {
        Action::Unlink
    } else {
        Action::Unregister
    };
    run(config, action, package)
}

fn run(config: &Config, action: Action, package: Option<&str>) -> Result<()> {
    let global = GlobalLinks::from_config(&InstallConfig::from_env(config.channel));
    let runtime = tokio::runtime::Runtime::new().into_diagnostic()?;

    match runtime.block_on(execute(config, &global, action, package)) {
        Ok(report) => {
            if config.json_logs {
                print_json(&LinkJsonResult {
                    ok: true,
                    action,
                    report: Some(report),
                    error: None,
                })?;
            } else {
                print_report(action, &report);
            }
            Ok(())
        }
        Err(e) => {
            if config.json_logs {
                print_json(&LinkJsonResult {
                    ok: false,
                    action,
                    report: None,
                    error: Some(ErrorInfo::from(&e)),
                })?;
            } else {
                eprintln!("error: {e}");
            }
            std::process::exit(1);
        }
    }
}

async fn execute(
    config: &Config,
    global: &GlobalLinks,
    action: Action,
    package: Option<&str>,
) -> Result<LinkReport, Error> {
    let report = match package {
        Some(name) => {
            let root = project_root(&config.cwd).unwrap_or_else(|| PathBuf::from(&config.cwd));
            if action == Action::Link {
                global.link_from_global(&root, name).await?
            } else {
                global.unlink_from_global(&root, name).await?
            }
        }
        None => {
            let root = project_root(&config.cwd).ok_or_else(|| Error::ProjectNotFound {
                start: config.cwd.clone(),
            })?;
            if action == Action::Register {
                global.link_to_global(&root).await?
            } else {
                global.unlink_to_global(&root).await?
            }
        }
    };
    Ok(report)
}

fn print_report(action: Action, report: &LinkReport) {
    let verb = match action {
        Action::Register | Action::Link => "linked",
        Action::Unregister | Action::Unlink => "removed",
    };
    if report.links.is_empty() {
        println!("Nothing to unlink for {}", report.package);
        return;
    }
    for link in &report.links {
        println!("{verb} {}", link.display());
    }
}
