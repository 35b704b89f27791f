// src/config.rs

//! Run configuration and remote endpoint resolution

use crate::error::{Error, Result};
use crate::manifest::{MANIFEST_FILE, METADATA_FILE};
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

/// Default connect timeout for HTTP requests (30 seconds)
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Everything one sync run needs, passed by value into the driver
#[derive(Debug, Clone)]
pub struct MirrorConfig {
    /// URL of the Datasette instance; only scheme, userinfo, host and port are used
    pub source_url: String,
    /// Directory the databases are mirrored into
    pub destination_dir: PathBuf,
    /// Optional API token sent as a bearer token
    pub token: Option<String>,
    /// Log decisions and report download progress
    pub verbose: bool,
    pub connect_timeout: Duration,
    /// Total per-request timeout; `None` lets large downloads run to completion
    pub timeout: Option<Duration>,
}

impl MirrorConfig {
    /// Create a configuration with default timeouts
    pub fn new(source_url: impl Into<String>, destination_dir: impl Into<PathBuf>) -> Self {
        Self {
            source_url: source_url.into(),
            destination_dir: destination_dir.into(),
            token: None,
            verbose: false,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            timeout: None,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Resolve the remote endpoints from the source URL
    pub fn remote(&self) -> Result<Remote> {
        Remote::parse(&self.source_url)
    }

    /// Headers sent with every request
    ///
    /// Carries `Authorization: Bearer <token>` when a token is configured and
    /// nothing otherwise.
    pub fn auth_headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        if let Some(token) = self.token.as_deref().filter(|t| !t.is_empty()) {
            let mut value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| Error::InitError(format!("Invalid API token: {e}")))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }
        Ok(headers)
    }
}

/// The endpoints of one Datasette instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Remote {
    base: Url,
}

impl Remote {
    /// Normalize a source URL to the instance base URL
    ///
    /// A bare host (`example.com`, `localhost:8001`) gets the `https` scheme.
    /// Any path, query or fragment is dropped: the base is always
    /// `scheme://[user[:password]@]host[:port]/`.
    pub fn parse(source_url: &str) -> Result<Self> {
        let source_url = source_url.trim();
        if source_url.is_empty() {
            return Err(Error::InvalidUrl("source URL is empty".to_string()));
        }

        let with_scheme = if source_url.contains("://") {
            source_url.to_string()
        } else {
            format!("https://{source_url}")
        };

        let parsed = Url::parse(&with_scheme)
            .map_err(|e| Error::InvalidUrl(format!("{source_url}: {e}")))?;

        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(Error::InvalidUrl(format!(
                "{source_url}: unsupported scheme '{}'",
                parsed.scheme()
            )));
        }
        if parsed.host_str().is_none() {
            return Err(Error::InvalidUrl(format!("{source_url}: missing host")));
        }

        // Keep scheme, userinfo, host and port; everything after them goes
        let mut base = parsed;
        base.set_path("/");
        base.set_query(None);
        base.set_fragment(None);

        Ok(Self { base })
    }

    /// Base URL, always ending in `/`
    pub fn base_url(&self) -> &str {
        self.base.as_str()
    }

    /// `<base>-/databases.json`
    pub fn manifest_url(&self) -> String {
        self.join(&format!("-/{MANIFEST_FILE}"))
    }

    /// `<base>-/metadata.json`
    pub fn metadata_url(&self) -> String {
        self.join(&format!("-/{METADATA_FILE}"))
    }

    /// `<base><path>` with every path segment percent-encoded
    pub fn resource_url(&self, path: &str) -> String {
        self.join(path)
    }

    fn join(&self, path: &str) -> String {
        let mut url = self.base.clone();
        // Base URLs parsed above always have a path, so this cannot fail
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty();
            segments.extend(path.split('/').filter(|s| !s.is_empty()));
        }
        url.to_string()
    }
}
