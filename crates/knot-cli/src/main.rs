#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

mod commands;
mod logging;

use clap::Parser;
use knot_core::config::Channel;
use knot_core::Config;
use miette::Result;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "knot")]
#[command(author, version, about = "A content-addressed, symlinking package installer", long_about = None)]
struct Cli {
    /// Increase logging verbosity (-v for DEBUG, -vv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Emit JSON formatted output (stable, machine-readable)
    #[arg(long, global = true)]
    json: bool,

    /// Override the working directory
    #[arg(long, global = true, value_name = "PATH")]
    cwd: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Print version information
    Version,

    /// Install dependencies from package.json, or the given packages
    #[command(visible_alias = "i")]
    Install {
        /// Packages to install (e.g. `left-pad`, `react@^18`, `@scope/pkg@latest`)
        specs: Vec<String>,

        /// Skip lifecycle scripts
        #[arg(long)]
        no_build: bool,

        /// Registry base URL
        #[arg(long, value_name = "URL")]
        registry: Option<String>,

        /// Retries for failed network requests
        #[arg(long, value_name = "N")]
        retries: Option<u32>,

        /// Save the given packages to dependencies
        #[arg(short = 'S', long)]
        save: bool,

        /// Save the given packages to devDependencies
        #[arg(short = 'D', long = "save-dev", conflicts_with = "save")]
        save_dev: bool,
    },

    /// Expose the current package globally, or link a global package here
    Link {
        /// Globally linked package to add to this project's node_modules
        package: Option<String>,
    },

    /// Undo `knot link`
    Unlink {
        /// Package to remove from this project's node_modules
        package: Option<String>,
    },

    /// Manage the tarball cache
    Cache {
        #[command(subcommand)]
        action: CacheCommands,
    },
}

#[derive(clap::Subcommand, Debug)]
enum CacheCommands {
    /// Remove cached tarballs
    Clean {
        /// Content id of a single tarball to remove
        id: Option<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let cwd = cli
        .cwd
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."));

    let config = Config::new(cwd)
        .with_verbosity(cli.verbose)
        .with_json_logs(cli.json)
        .with_channel(Channel::Stable);

    match cli.command {
        Commands::Version => commands::version::run(),
        Commands::Install {
            specs,
            no_build,
            registry,
            retries,
            save,
            save_dev,
        } => {
            logging::init(config.verbosity, config.json_logs);
            let span = tracing::info_span!("install", cmd = "install", cwd = %config.cwd.display());
            let _guard = span.enter();

            let options = commands::install::InstallArgs {
                specs,
                no_build,
                registry,
                retries,
                save,
                save_dev,
            };
            commands::install::run(&config, options)
        }
        Commands::Link { package } => {
            logging::init(config.verbosity, config.json_logs);
            let span = tracing::info_span!("link", cmd = "link", cwd = %config.cwd.display());
            let _guard = span.enter();
            commands::link::link(&config, package.as_deref())
        }
        Commands::Unlink { package } => {
            logging::init(config.verbosity, config.json_logs);
            let span = tracing::info_span!("unlink", cmd = "unlink", cwd = %config.cwd.display());
            let _guard = span.enter();
            commands::link::unlink(&config, package.as_deref())
        }
        Commands::Cache {
            action: CacheCommands::Clean { id },
        } => {
            logging::init(config.verbosity, config.json_logs);
            commands::cache::clean(&config, id.as_deref())
        }
    }
}
