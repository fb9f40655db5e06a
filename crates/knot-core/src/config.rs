use crate::paths::tarball_cache_dir;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

/// Runtime configuration for the knot CLI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Current working directory.
    pub cwd: PathBuf,

    /// Whether to emit JSON logs.
    pub json_logs: bool,

    /// Verbosity level (0 = INFO, 1 = DEBUG, 2+ = TRACE).
    pub verbosity: u8,

    /// Channel (dev, nightly, stable) - affects cache paths.
    pub channel: Channel,
}

/// Release channel for cache directory namespacing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    #[default]
    Stable,
    Nightly,
    Dev,
}

impl Channel {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stable => "stable",
            Self::Nightly => "nightly",
            Self::Dev => "dev",
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cwd: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            json_logs: false,
            verbosity: 0,
            channel: Channel::default(),
        }
    }
}

impl Config {
    /// Create a new config with the given working directory.
    #[must_use]
    pub fn new(cwd: PathBuf) -> Self {
        Self {
            cwd,
            ..Default::default()
        }
    }

    /// Set verbosity level.
    #[must_use]
    pub fn with_verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    /// Set JSON log output.
    #[must_use]
    pub fn with_json_logs(mut self, json: bool) -> Self {
        self.json_logs = json;
        self
    }

    /// Set channel.
    #[must_use]
    pub fn with_channel(mut self, channel: Channel) -> Self {
        self.channel = channel;
        self
    }
}

/// Environment variable names read by [`InstallConfig::from_env`].
pub mod env {
    pub const REGISTRY: &str = "KNOT_REGISTRY";
    pub const CACHE_DIR: &str = "KNOT_CACHE_DIR";
    pub const STORE_DIR: &str = "KNOT_STORE_DIR";
    pub const RETRIES: &str = "KNOT_REQUEST_RETRIES";
    pub const PROXY: &str = "KNOT_PROXY";
    pub const HTTP_PROXY: &str = "http_proxy";
    pub const BEARER_TOKEN: &str = "KNOT_BEARER_TOKEN";
    pub const SH: &str = "KNOT_SH";
    pub const SH_FLAG: &str = "KNOT_SH_FLAG";
    pub const SHELL: &str = "SHELL";
    pub const MAX_CONCURRENCY: &str = "KNOT_MAX_CONCURRENCY";
    pub const REQUEST_TIMEOUT_SECS: &str = "KNOT_REQUEST_TIMEOUT_SECS";
    pub const GITHUB_API: &str = "KNOT_GITHUB_API";
    pub const GITHUB_RAW: &str = "KNOT_GITHUB_RAW";
    pub const GITHUB_CODELOAD: &str = "KNOT_GITHUB_CODELOAD";
    pub const BIN_DIR: &str = "KNOT_BIN_DIR";
    pub const GLOBAL_NODE_MODULES: &str = "KNOT_GLOBAL_NODE_MODULES";
    pub const GLOBAL_BIN: &str = "KNOT_GLOBAL_BIN";
}

/// Default npm registry URL.
pub const DEFAULT_REGISTRY: &str = "https://registry.npmjs.org/";

/// Default number of attempts made after the first failed request.
pub const DEFAULT_RETRIES: u32 = 5;

/// Default cap on simultaneous HTTP requests.
pub const DEFAULT_MAX_CONCURRENT_REQUESTS: usize = 16;

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Endpoints used by the GitHub-hosted source strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitHubEndpoints {
    /// REST API root, used to look up branch heads.
    pub api: String,
    /// Raw content host, used to read `package.json` at a ref.
    pub raw: String,
    /// Archive host, used to download `tar.gz` snapshots.
    pub codeload: String,
}

impl Default for GitHubEndpoints {
    fn default() -> Self {
        Self {
            api: "https://api.github.com/".to_string(),
            raw: "https://raw.githubusercontent.com/".to_string(),
            codeload: "https://codeload.github.com/".to_string(),
        }
    }
}

/// Settings for one install run: registry access, store locations, retry and
/// concurrency limits, and the shell used for lifecycle scripts.
#[derive(Debug, Clone)]
pub struct InstallConfig {
    pub registry: String,
    /// Verified tarballs, one file per content id.
    pub cache_dir: PathBuf,
    /// Extracted store entries. `None` means `<project>/node_modules`.
    pub store_dir: Option<PathBuf>,
    pub retries: u32,
    pub proxy: Option<String>,
    pub bearer_token: Option<String>,
    pub sh: String,
    pub sh_flag: String,
    pub max_concurrent_requests: usize,
    pub request_timeout: Duration,
    pub github: GitHubEndpoints,
    /// Installer bin directory, prepended to `PATH` for lifecycle scripts.
    pub bin_dir: Option<PathBuf>,
    /// Whether lifecycle scripts run after linking.
    pub run_scripts: bool,
    /// Packages exposed with `knot link`, shared between projects.
    pub global_node_modules: PathBuf,
    /// Where `knot link` exposes package commands.
    pub global_bin: PathBuf,
}

impl InstallConfig {
    /// Defaults for the given channel, without consulting the environment.
    #[must_use]
    pub fn new(channel: Channel) -> Self {
        Self {
            registry: DEFAULT_REGISTRY.to_string(),
            cache_dir: tarball_cache_dir(channel),
            store_dir: None,
            retries: DEFAULT_RETRIES,
            proxy: None,
            bearer_token: None,
            sh: default_sh(None),
            sh_flag: default_sh_flag().to_string(),
            max_concurrent_requests: DEFAULT_MAX_CONCURRENT_REQUESTS,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            github: GitHubEndpoints::default(),
            bin_dir: std::env::current_exe()
                .ok()
                .and_then(|exe| exe.parent().map(PathBuf::from)),
            run_scripts: true,
            global_node_modules: global_node_modules_dir(),
            global_bin: global_node_modules_dir().join(".bin"),
        }
    }

    /// Build a config from the process environment.
    #[must_use]
    pub fn from_env(channel: Channel) -> Self {
        Self::from_lookup(channel, |key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary variable lookup.
    ///
    /// Unparseable numeric values are ignored with a warning.
    pub fn from_lookup(channel: Channel, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::new(channel);
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(registry) = get(env::REGISTRY) {
            config.registry = registry;
        }
        if let Some(dir) = get(env::CACHE_DIR) {
            config.cache_dir = PathBuf::from(dir);
        }
        if let Some(dir) = get(env::STORE_DIR) {
            config.store_dir = Some(PathBuf::from(dir));
        }
        if let Some(retries) = parse_number(env::RETRIES, get(env::RETRIES)) {
            config.retries = retries;
        }
        config.proxy = get(env::PROXY).or_else(|| get(env::HTTP_PROXY));
        config.bearer_token = get(env::BEARER_TOKEN);
        config.sh = get(env::SH).unwrap_or_else(|| default_sh(get(env::SHELL)));
        if let Some(flag) = get(env::SH_FLAG) {
            config.sh_flag = flag;
        }
        if let Some(max) = parse_number::<usize>(env::MAX_CONCURRENCY, get(env::MAX_CONCURRENCY))
        {
            config.max_concurrent_requests = max.max(1);
        }
        if let Some(secs) = parse_number(env::REQUEST_TIMEOUT_SECS, get(env::REQUEST_TIMEOUT_SECS))
        {
            config.request_timeout = Duration::from_secs(secs);
        }
        if let Some(api) = get(env::GITHUB_API) {
            config.github.api = api;
        }
        if let Some(raw) = get(env::GITHUB_RAW) {
            config.github.raw = raw;
        }
        if let Some(codeload) = get(env::GITHUB_CODELOAD) {
            config.github.codeload = codeload;
        }
        if let Some(dir) = get(env::BIN_DIR) {
            config.bin_dir = Some(PathBuf::from(dir));
        }
        if let Some(dir) = get(env::GLOBAL_NODE_MODULES) {
            config.global_bin = PathBuf::from(&dir).join(".bin");
            config.global_node_modules = PathBuf::from(dir);
        }
        if let Some(dir) = get(env::GLOBAL_BIN) {
            config.global_bin = PathBuf::from(dir);
        }

        config
    }

    /// Set the registry base URL.
    #[must_use]
    pub fn with_registry(mut self, registry: impl Into<String>) -> Self {
        self.registry = registry.into();
        self
    }

    /// Set the tarball cache directory.
    #[must_use]
    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = dir.into();
        self
    }

    /// Set the store directory.
    #[must_use]
    pub fn with_store_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.store_dir = Some(dir.into());
        self
    }

    /// Set the retry count for network requests.
    #[must_use]
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Set the cap on simultaneous HTTP requests.
    #[must_use]
    pub fn with_max_concurrent_requests(mut self, max: usize) -> Self {
        self.max_concurrent_requests = max.max(1);
        self
    }

    /// Set the GitHub endpoints.
    #[must_use]
    pub fn with_github(mut self, github: GitHubEndpoints) -> Self {
        self.github = github;
        self
    }

    /// Enable or disable lifecycle scripts.
    #[must_use]
    pub fn with_scripts(mut self, run_scripts: bool) -> Self {
        self.run_scripts = run_scripts;
        self
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: Option<String>) -> Option<T> {
    let value = value?;
    match value.trim().parse() {
        Ok(n) => Some(n),
        Err(_) => {
            warn!(key, value = %value, "Ignoring non-numeric configuration value");
            None
        }
    }
}

fn global_node_modules_dir() -> PathBuf {
    dirs_next::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".node_modules")
}

fn default_sh(shell: Option<String>) -> String {
    if cfg!(windows) {
        std::env::var("comspec").unwrap_or_else(|_| "cmd".to_string())
    } else {
        shell.unwrap_or_else(|| "sh".to_string())
    }
}

fn default_sh_flag() -> &'static str {
    if cfg!(windows) {
        "/d /s /c"
    } else {
        "-c"
    }
}
