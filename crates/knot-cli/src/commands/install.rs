use knot_core::config::InstallConfig;
use knot_core::paths::project_root;
use knot_core::pkg::{
    install_project, install_specs, save_specs, InstallSummary, PackageSpec, Source,
};
use knot_core::{Config, Error};
use miette::{IntoDiagnostic, Result};
use serde::Serialize;
use std::path::PathBuf;
use tracing::debug;

use super::{print_json, ErrorInfo};

/// Arguments of `knot install`.
#[derive(Debug, Clone, Default)]
pub struct InstallArgs {
    pub specs: Vec<String>,
    pub no_build: bool,
    pub registry: Option<String>,
    pub retries: Option<u32>,
    /// Record the given specs in `dependencies`.
    pub save: bool,
    /// Record the given specs in `devDependencies`.
    pub save_dev: bool,
}

/// JSON output of `knot install --json`.
#[derive(Debug, Serialize)]
struct InstallJsonResult {
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    install: Option<InstallSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ErrorInfo>,
}

pub fn run(config: &Config, args: InstallArgs) -> Result<()> {
    let mut install_config = InstallConfig::from_env(config.channel).with_scripts(!args.no_build);
    if let Some(registry) = args.registry.clone() {
        install_config = install_config.with_registry(registry);
    }
    if let Some(retries) = args.retries {
        install_config = install_config.with_retries(retries);
    }
    debug!(
        registry = %install_config.registry,
        cache = %install_config.cache_dir.display(),
        retries = install_config.retries,
        scripts = install_config.run_scripts,
        "Install configuration"
    );

    let runtime = tokio::runtime::Runtime::new().into_diagnostic()?;
    let result = runtime.block_on(execute(config, &args, &install_config));

    match result {
        Ok(summary) => {
            if config.json_logs {
                print_json(&InstallJsonResult {
                    ok: true,
                    install: Some(summary),
                    error: None,
                })?;
            } else {
                print_summary(&summary);
            }
            Ok(())
        }
        Err(e) => {
            if config.json_logs {
                print_json(&InstallJsonResult {
                    ok: false,
                    install: None,
                    error: Some(ErrorInfo::from(&e)),
                })?;
            } else {
                eprintln!("error: {e}");
                if let Error::Pkg(knot_core::pkg::PkgError::FailedBuild { failures }) = &e {
                    for failure in failures {
                        let code = failure
                            .code
                            .map_or_else(|| "signal".to_string(), |c| c.to_string());
                        eprintln!(
                            "  {} ({}): {} exited with {code}",
                            failure.package, failure.id, failure.script
                        );
                    }
                }
            }
            std::process::exit(1);
        }
    }
}

async fn execute(
    config: &Config,
    args: &InstallArgs,
    install_config: &InstallConfig,
) -> Result<InstallSummary, Error> {
    if args.specs.is_empty() {
        let root = project_root(&config.cwd).ok_or_else(|| Error::ProjectNotFound {
            start: config.cwd.clone(),
        })?;
        return Ok(install_project(&root, install_config).await?);
    }

    let specs = args
        .specs
        .iter()
        .map(|s| PackageSpec::parse(s))
        .collect::<Result<Vec<_>, _>>()?;
    let root = project_root(&config.cwd).unwrap_or_else(|| PathBuf::from(&config.cwd));
    let summary = install_specs(&root, &specs, install_config).await?;
    if args.save || args.save_dev {
        save_specs(&root, &specs, &summary.direct, args.save_dev)?;
    }
    Ok(summary)
}

fn print_summary(summary: &InstallSummary) {
    if summary.packages.is_empty() {
        println!("Nothing to install");
        return;
    }

    for package in &summary.packages {
        let marker = if package.source == Source::Local { "=" } else { "+" };
        println!("{marker} {}@{}", package.name, package.version);
    }
    println!();
    println!(
        "{} packages ({} downloaded, {} reused), {} links, {} scripts",
        summary.packages.len(),
        summary.downloaded,
        summary.reused,
        summary.linked,
        summary.scripts_run
    );
}
