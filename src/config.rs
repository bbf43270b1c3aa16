use anyhow::{Context, Result};
use clap::Parser;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

pub const DEFAULT_OAUTH_HOST: &str = "https://accounts.paxful.com";
pub const DEFAULT_DATA_HOST: &str = "https://api.paxful.com";

/// Paxful API client - Rust Implementation
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// HTTP method of the call (GET, POST, PUT, PATCH, DELETE, INVOKE)
    pub method: String,

    /// Path of the endpoint at the data host, e.g. /paxful/v1/offer/list
    pub path: String,

    /// Payload entries as key=value, nested keys use dots (offer.type=buy)
    #[arg(short = 'd', long = "data")]
    pub data: Vec<String>,

    /// OAuth client id
    #[arg(long, env = "PAXFUL_CLIENT_ID")]
    pub client_id: Option<String>,

    /// OAuth client secret
    #[arg(long, env = "PAXFUL_CLIENT_SECRET", hide_env_values = true)]
    pub client_secret: Option<String>,

    /// OAuth host
    #[arg(long, env = "PAXFUL_OAUTH_HOST", default_value = DEFAULT_OAUTH_HOST)]
    pub oauth_host: String,

    /// Data (REST API) host
    #[arg(long, env = "PAXFUL_DATA_HOST", default_value = DEFAULT_DATA_HOST)]
    pub data_host: String,

    /// Proxy URL used for every outgoing call
    #[arg(long, env = "PAXFUL_PROXY")]
    pub proxy: Option<String>,

    /// HTTP request timeout in seconds
    #[arg(long, env = "HTTP_REQUEST_TIMEOUT", default_value = "60")]
    pub http_timeout: u64,

    /// Refresh credentials this many seconds before they expire (0 disables)
    #[arg(long, env = "TOKEN_REFRESH_THRESHOLD", default_value = "0")]
    pub token_refresh_threshold: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

/// Process-wide configuration shared by every call of a client
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ApiConfiguration {
    /// Client ID generated at the developers portal
    pub client_id: String,

    /// Client secret generated at the developers portal
    pub client_secret: String,

    /// Redirect URI registered at the developers portal (authorization flow only)
    pub redirect_uri: Option<String>,

    /// Requested scopes
    pub scope: Vec<String>,

    /// Host serving `/oauth2/*`
    pub oauth_host: String,

    /// Host serving the REST endpoints
    pub data_host: String,

    /// Proxy URL applied to every dispatch
    pub proxy: Option<String>,

    /// Per-request timeout in seconds
    pub request_timeout: Option<u64>,

    /// Proactive refresh window in seconds (0 = refresh only on rejection)
    pub token_refresh_threshold: u64,
}

impl ApiConfiguration {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            redirect_uri: None,
            scope: default_scope(),
            oauth_host: DEFAULT_OAUTH_HOST.to_string(),
            data_host: DEFAULT_DATA_HOST.to_string(),
            proxy: None,
            request_timeout: None,
            token_refresh_threshold: 0,
        }
    }

    pub fn with_redirect_uri(mut self, redirect_uri: impl Into<String>) -> Self {
        self.redirect_uri = Some(redirect_uri.into());
        self
    }

    pub fn with_scope<I, S>(mut self, scope: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scope = scope.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_oauth_host(mut self, host: impl Into<String>) -> Self {
        self.oauth_host = host.into();
        self
    }

    pub fn with_data_host(mut self, host: impl Into<String>) -> Self {
        self.data_host = host.into();
        self
    }

    pub fn with_proxy(mut self, proxy: impl Into<String>) -> Self {
        self.proxy = Some(proxy.into());
        self
    }

    pub fn with_request_timeout(mut self, seconds: u64) -> Self {
        self.request_timeout = Some(seconds);
        self
    }

    pub fn with_token_refresh_threshold(mut self, seconds: u64) -> Self {
        self.token_refresh_threshold = seconds;
        self
    }

    /// Fill defaults for empty values (scope, hosts) and strip trailing slashes
    pub fn normalized(mut self) -> Self {
        if self.scope.is_empty() {
            self.scope = default_scope();
        }
        self.oauth_host = normalize_host(&self.oauth_host, DEFAULT_OAUTH_HOST);
        self.data_host = normalize_host(&self.data_host, DEFAULT_DATA_HOST);
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> std::result::Result<(), ApiError> {
        if self.client_id.trim().is_empty() {
            return Err(ApiError::Config("client_id must not be empty".to_string()));
        }
        if self.client_secret.trim().is_empty() {
            return Err(ApiError::Config(
                "client_secret must not be empty".to_string(),
            ));
        }
        for (name, host) in [("oauth_host", &self.oauth_host), ("data_host", &self.data_host)] {
            if !(host.starts_with("http://") || host.starts_with("https://")) {
                return Err(ApiError::Config(format!(
                    "{} must be an http(s) URL, got '{}'",
                    name, host
                )));
            }
        }
        Ok(())
    }
}

impl CliArgs {
    /// Build the client configuration from CLI > ENV > defaults
    pub fn into_configuration(self) -> Result<ApiConfiguration> {
        let client_id = self
            .client_id
            .context("PAXFUL_CLIENT_ID is required (use --client-id or set PAXFUL_CLIENT_ID)")?;
        let client_secret = self.client_secret.context(
            "PAXFUL_CLIENT_SECRET is required (use --client-secret or set PAXFUL_CLIENT_SECRET)",
        )?;

        let mut config = ApiConfiguration::new(client_id, client_secret)
            .with_oauth_host(self.oauth_host)
            .with_data_host(self.data_host)
            .with_request_timeout(self.http_timeout)
            .with_token_refresh_threshold(self.token_refresh_threshold);
        if let Some(proxy) = self.proxy.filter(|p| !p.is_empty()) {
            config = config.with_proxy(proxy);
        }

        let config = config.normalized();
        config.validate()?;
        Ok(config)
    }
}

fn default_scope() -> Vec<String> {
    vec!["profile".to_string(), "email".to_string()]
}

/// Empty host falls back to the default; trailing slashes are dropped
fn normalize_host(host: &str, default: &str) -> String {
    let trimmed = host.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        default.to_string()
    } else {
        trimmed.to_string()
    }
}
