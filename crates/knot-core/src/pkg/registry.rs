//! npm registry client.
//!
//! Every request goes through [`RegistryClient`], which applies the retry
//! policy, the concurrency cap, the per-request timeout and registry auth.

use super::error::PkgError;
use super::manifest::{json_type_name, Manifest};
use super::spec::escape_name;
use crate::config::InstallConfig;
use crate::version::user_agent;
use knot_util::hash::Sha1Hex;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde_json::{Map, Value};
use std::io::SeekFrom;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tokio::sync::{Semaphore, SemaphorePermit};
use tracing::{debug, warn};
use url::Url;

/// Maximum tarball size (200 MB).
pub const MAX_TARBALL_SIZE: u64 = 200 * 1024 * 1024;

/// Registry client shared by every strategy and the fetcher.
#[derive(Debug, Clone)]
pub struct RegistryClient {
    base_url: Url,
    http: Client,
    retries: u32,
    bearer_token: Option<String>,
    permits: Arc<Semaphore>,
}

impl RegistryClient {
    /// Create a client from install settings.
    ///
    /// # Errors
    /// Returns `PkgError::Config` if the registry or proxy URL is invalid or
    /// the HTTP client cannot be created.
    pub fn new(config: &InstallConfig) -> Result<Self, PkgError> {
        let base_url = parse_base_url(&config.registry)?;

        let mut builder = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(config.request_timeout)
            .user_agent(user_agent());

        if let Some(proxy) = &config.proxy {
            let proxy = reqwest::Proxy::all(proxy)
                .map_err(|e| PkgError::Config(format!("Invalid proxy '{proxy}': {e}")))?;
            builder = builder.proxy(proxy);
        }

        let http = builder
            .build()
            .map_err(|e| PkgError::Config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            base_url,
            http,
            retries: config.retries,
            bearer_token: config.bearer_token.clone(),
            permits: Arc::new(Semaphore::new(config.max_concurrent_requests.max(1))),
        })
    }

    /// URL of the package-root document for `name`.
    ///
    /// # Errors
    /// Returns `PkgError::SpecInvalid` if the escaped name cannot be joined
    /// onto the base URL.
    pub fn package_root_url(&self, name: &str) -> Result<Url, PkgError> {
        self.base_url
            .join(&escape_name(name))
            .map_err(|e| PkgError::spec_invalid(format!("Failed to build URL for '{name}': {e}")))
    }

    /// Fetch and validate the package-root document for `name`.
    ///
    /// # Errors
    /// Returns `PkgError::NotFound` on 404, `PkgError::PackageRoot` if the
    /// document is malformed, or the last network error once retries are
    /// exhausted.
    pub async fn fetch_package_root(&self, name: &str) -> Result<PackageRoot, PkgError> {
        let url = self.package_root_url(name)?;
        debug!(name, url = %url, "Fetching package root");

        let body = match self.get_json(url.as_str()).await {
            Err(PkgError::Network {
                status: Some(404), ..
            }) => {
                return Err(PkgError::not_found(format!(
                    "{name} in registry {}",
                    self.base_url
                )))
            }
            other => other?,
        };
        PackageRoot::from_value(name, url.as_str(), body)
    }

    /// GET a JSON document.
    ///
    /// # Errors
    /// Returns `PkgError::Network` on transport failures, non-success status
    /// or an unparseable body.
    pub async fn get_json(&self, url: &str) -> Result<Value, PkgError> {
        let mut attempt = 0;
        loop {
            let result = async {
                let _permit = self.permit(url).await?;
                let response = self.send(url).await?;
                response.json::<Value>().await.map_err(PkgError::from)
            }
            .await;
            match result {
                Err(e) if self.should_retry(url, &mut attempt, &e) => {}
                other => return other,
            }
        }
    }

    /// Stream `url` into `file`, returning the SHA-1 hex digest of the bytes.
    ///
    /// The file is truncated before every attempt.
    ///
    /// # Errors
    /// Returns `PkgError::Network` if the download fails or exceeds
    /// [`MAX_TARBALL_SIZE`], or `PkgError::Io` if writing fails.
    pub async fn download(
        &self,
        url: &str,
        file: &mut File,
        path: &Path,
    ) -> Result<String, PkgError> {
        let mut attempt = 0;
        loop {
            match self.download_once(url, file, path).await {
                Err(e) if self.should_retry(url, &mut attempt, &e) => {}
                other => return other,
            }
        }
    }

    async fn download_once(
        &self,
        url: &str,
        file: &mut File,
        path: &Path,
    ) -> Result<String, PkgError> {
        file.set_len(0).await.map_err(|e| PkgError::io(path, e))?;
        file.seek(SeekFrom::Start(0))
            .await
            .map_err(|e| PkgError::io(path, e))?;

        let _permit = self.permit(url).await?;
        let mut response = self.send(url).await?;
        if let Some(len) = response.content_length() {
            if len > MAX_TARBALL_SIZE {
                return Err(too_large(url, len));
            }
        }

        let mut hasher = Sha1Hex::new();
        let mut written: u64 = 0;
        while let Some(chunk) = response.chunk().await? {
            written += chunk.len() as u64;
            if written > MAX_TARBALL_SIZE {
                return Err(too_large(url, written));
            }
            hasher.update(&chunk);
            file.write_all(&chunk)
                .await
                .map_err(|e| PkgError::io(path, e))?;
        }
        file.flush().await.map_err(|e| PkgError::io(path, e))?;

        debug!(url, bytes = written, "Downloaded");
        Ok(hasher.finish())
    }

    /// Wait for a request slot. Held until the body has been read.
    async fn permit(&self, url: &str) -> Result<SemaphorePermit<'_>, PkgError> {
        self.permits
            .acquire()
            .await
            .map_err(|e| PkgError::network(url, e.to_string()))
    }

    async fn send(&self, url: &str) -> Result<Response, PkgError> {
        let response = self.authorize(self.http.get(url), url).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        Err(PkgError::Network {
            url: url.to_string(),
            status: Some(status.as_u16()),
            message: status_message(status),
        })
    }

    /// Attach the bearer token to requests for the registry's own origin.
    fn authorize(&self, request: RequestBuilder, url: &str) -> RequestBuilder {
        let Some(token) = &self.bearer_token else {
            return request;
        };
        let same_origin = Url::parse(url)
            .map(|u| u.origin() == self.base_url.origin())
            .unwrap_or(false);
        if same_origin {
            request.bearer_auth(token)
        } else {
            request
        }
    }

    fn should_retry(&self, url: &str, attempt: &mut u32, error: &PkgError) -> bool {
        if !error.is_retryable() || *attempt >= self.retries {
            return false;
        }
        *attempt += 1;
        warn!(url, attempt = *attempt, retries = self.retries, error = %error, "Request failed, retrying");
        true
    }
}

/// Validated package-root document.
#[derive(Debug, Clone)]
pub struct PackageRoot {
    pub name: String,
    /// Published versions in document order.
    pub versions: Map<String, Value>,
    pub dist_tags: Map<String, Value>,
}

impl PackageRoot {
    /// Validate a package-root body.
    ///
    /// # Errors
    /// Returns `PkgError::PackageRoot` if the body is not an object, carries
    /// an `error` field, or its `versions` is not an object.
    pub fn from_value(name: &str, url: &str, body: Value) -> Result<Self, PkgError> {
        let invalid = |reason: String| PkgError::PackageRoot {
            url: url.to_string(),
            reason,
        };

        let Value::Object(mut root) = body else {
            return Err(invalid(format!(
                "expected an object, got {}",
                json_type_name(&body)
            )));
        };

        if let Some(error) = root.get("error") {
            let message = error.as_str().map_or_else(|| error.to_string(), String::from);
            return Err(invalid(format!("registry error: {message}")));
        }

        let versions = match root.remove("versions") {
            Some(Value::Object(versions)) => versions,
            Some(other) => {
                return Err(invalid(format!(
                    "'versions' must be an object, got {}",
                    json_type_name(&other)
                )))
            }
            None => return Err(invalid("missing 'versions'".to_string())),
        };

        let dist_tags = match root.remove("dist-tags") {
            Some(Value::Object(tags)) => tags,
            _ => Map::new(),
        };

        Ok(Self {
            name: name.to_string(),
            versions,
            dist_tags,
        })
    }

    /// Version strings in document order.
    pub fn version_strings(&self) -> impl Iterator<Item = &str> {
        self.versions.keys().map(String::as_str)
    }

    /// Version a dist-tag points at.
    #[must_use]
    pub fn tag(&self, tag: &str) -> Option<&str> {
        self.dist_tags.get(tag).and_then(Value::as_str)
    }

    /// Manifest of one published version.
    #[must_use]
    pub fn manifest(&self, version: &str) -> Option<Manifest> {
        let value = self.versions.get(version)?.clone();
        Manifest::from_value(value, Path::new(&self.name)).ok()
    }
}

fn parse_base_url(registry: &str) -> Result<Url, PkgError> {
    // Url::join drops the last path segment unless it ends in '/'
    let normalized = if registry.ends_with('/') {
        registry.to_string()
    } else {
        format!("{registry}/")
    };
    Url::parse(&normalized)
        .map_err(|e| PkgError::Config(format!("Invalid registry URL '{registry}': {e}")))
}

fn status_message(status: StatusCode) -> String {
    match status.canonical_reason() {
        Some(reason) => format!("HTTP {} {reason}", status.as_u16()),
        None => format!("HTTP {}", status.as_u16()),
    }
}

fn too_large(url: &str, size: u64) -> PkgError {
    PkgError::Network {
        url: url.to_string(),
        status: None,
        message: format!("tarball too large: {size} bytes (max: {MAX_TARBALL_SIZE})"),
    }
}
