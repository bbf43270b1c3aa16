// Credential providers
// Token exchange against the OAuth server

use async_trait::async_trait;
use reqwest::{Client, Url};
use std::time::Duration;

use super::types::{Credentials, TokenResponse};
use crate::config::ApiConfiguration;
use crate::error::{ApiError, Result};

/// Source of fresh credentials
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Obtain credentials without a prior token (client credentials grant)
    async fn acquire(&self, config: &ApiConfiguration) -> Result<Credentials>;

    /// Exchange the refresh token of `credentials` for a new access token
    async fn refresh(&self, credentials: &Credentials, config: &ApiConfiguration)
        -> Result<Credentials>;
}

/// Token endpoint URL
fn token_url(config: &ApiConfiguration) -> String {
    format!("{}/oauth2/token", config.oauth_host)
}

/// URL the user is redirected to for consent (authorization code flow)
pub fn authorize_url(config: &ApiConfiguration) -> Result<String> {
    let redirect_uri = config.redirect_uri.as_deref().ok_or_else(|| {
        ApiError::Config("Redirect uri is needed for authorization flow.".to_string())
    })?;
    let scope = config.scope.join(" ");
    let url = Url::parse_with_params(
        &format!("{}/oauth2/authorize", config.oauth_host),
        &[
            ("response_type", "code"),
            ("client_id", config.client_id.as_str()),
            ("redirect_uri", redirect_uri),
            ("scope", scope.as_str()),
        ],
    )
    .map_err(|e| ApiError::Config(format!("Invalid oauth host: {}", e)))?;
    Ok(url.to_string())
}

/// OAuth2 token client for the accounts host
pub struct OAuthCredentialProvider {
    /// HTTP client for token requests
    client: Client,
}

impl OAuthCredentialProvider {
    /// Create a provider whose HTTP client honours the configured proxy and timeout
    pub fn new(config: &ApiConfiguration) -> Result<Self> {
        let mut builder = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout.unwrap_or(30)));
        if let Some(proxy) = &config.proxy {
            let proxy = reqwest::Proxy::all(proxy)
                .map_err(|e| ApiError::Config(format!("Invalid proxy '{}': {}", proxy, e)))?;
            builder = builder.proxy(proxy);
        }
        let client = builder
            .build()
            .map_err(|e| ApiError::Config(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    /// Exchange an authorization code for the credentials of the consenting user
    pub async fn exchange_code(&self, config: &ApiConfiguration, code: &str) -> Result<Credentials> {
        tracing::info!("Exchanging authorization code for impersonated credentials...");
        let redirect_uri = config.redirect_uri.as_deref().unwrap_or_default();
        let form = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri),
            ("client_id", config.client_id.as_str()),
            ("client_secret", config.client_secret.as_str()),
        ];
        self.request_token(config, "retrieve impersonated credentials", &form)
            .await
    }

    async fn request_token(
        &self,
        config: &ApiConfiguration,
        process_name: &str,
        form: &[(&str, &str)],
    ) -> Result<Credentials> {
        let url = token_url(config);
        tracing::debug!(url = %url, process = process_name, "Sending token request");

        let response = self
            .client
            .post(&url)
            .header("Accept", "application/json")
            .form(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            tracing::error!(
                status = status.as_u16(),
                body = %error_text,
                "Token request failed when trying to {}",
                process_name
            );
            return Err(ApiError::AuthFailure(format!(
                "Invalid response received (expected 200, received {}) when trying to {}: {}.",
                status.as_u16(),
                process_name,
                error_text
            )));
        }

        let body = response.text().await?;
        let malformed = || {
            ApiError::AuthFailure(format!(
                "Invalid response received when trying to {} - server didn't return a properly formatted token.",
                process_name
            ))
        };
        let token: TokenResponse = serde_json::from_str(&body).map_err(|_| malformed())?;
        let credentials = token.into_credentials().ok_or_else(malformed)?;

        tracing::info!(
            "Token obtained ({}), expires: {}",
            process_name,
            credentials.expires_at.to_rfc3339()
        );
        Ok(credentials)
    }
}

#[async_trait]
impl CredentialProvider for OAuthCredentialProvider {
    async fn acquire(&self, config: &ApiConfiguration) -> Result<Credentials> {
        tracing::info!("Retrieving personal credentials via client credentials grant...");
        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", config.client_id.as_str()),
            ("client_secret", config.client_secret.as_str()),
        ];
        self.request_token(config, "retrieve personal credentials", &form)
            .await
    }

    async fn refresh(
        &self,
        credentials: &Credentials,
        config: &ApiConfiguration,
    ) -> Result<Credentials> {
        tracing::info!("Refreshing access token...");
        let form = [
            ("grant_type", "refresh_token"),
            ("refresh_token", credentials.refresh_token.as_str()),
            ("client_id", config.client_id.as_str()),
            ("client_secret", config.client_secret.as_str()),
        ];
        self.request_token(config, "refresh token", &form).await
    }
}
