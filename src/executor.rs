use serde::de::DeserializeOwned;
use std::sync::Arc;

use crate::auth::{AuthManager, Credentials};
use crate::config::ApiConfiguration;
use crate::error::{ApiError, Result};
use crate::request::{Decoded, RawResponse, RequestBuilder};
use crate::transport::Transport;

/// Decides whether a response means the server rejected the credentials
pub type AuthFailurePredicate = Arc<dyn Fn(&RawResponse) -> bool + Send + Sync>;

/// Default rejection signal: HTTP 401
pub fn unauthorized_status() -> AuthFailurePredicate {
    Arc::new(|response: &RawResponse| response.status().as_u16() == 401)
}

/// Executes builders with credentials attached
/// Automatically handles:
/// - missing credentials: acquires them before the first dispatch
/// - rejected credentials: refreshes once (coalesced) and retries once
pub struct AuthenticatedExecutor {
    /// Wire transport
    transport: Arc<dyn Transport>,

    /// Credential lifecycle
    auth: Arc<AuthManager>,

    /// Transport options source
    config: Arc<ApiConfiguration>,

    /// Rejection detector
    is_auth_failure: AuthFailurePredicate,
}

impl AuthenticatedExecutor {
    pub fn new(
        transport: Arc<dyn Transport>,
        auth: Arc<AuthManager>,
        config: Arc<ApiConfiguration>,
    ) -> Self {
        Self {
            transport,
            auth,
            config,
            is_auth_failure: unauthorized_status(),
        }
    }

    /// Replace the rejection detector
    pub fn with_auth_failure_predicate(mut self, predicate: AuthFailurePredicate) -> Self {
        self.is_auth_failure = predicate;
        self
    }

    pub fn auth(&self) -> &Arc<AuthManager> {
        &self.auth
    }

    /// Dispatch `builder` and decode the response with its selected decoder
    pub async fn execute(&self, builder: RequestBuilder) -> Result<Decoded> {
        let builder = builder.with_config(&self.config);
        let credentials = self.auth.credentials().await?;

        let response = self.dispatch(&builder, &credentials, 1).await?;
        if !(self.is_auth_failure)(&response) {
            return self.decode(&builder, response).await;
        }

        tracing::warn!(
            status = %response.status(),
            url = %builder.url(),
            "Credentials rejected, refreshing and retrying once"
        );
        let refreshed = self.auth.refresh_after_rejection(&credentials).await?;

        let response = self.dispatch(&builder, &refreshed, 2).await?;
        if (self.is_auth_failure)(&response) {
            tracing::error!(
                status = %response.status(),
                url = %builder.url(),
                "Credentials rejected after refresh"
            );
            return Err(ApiError::AuthFailure(format!(
                "credentials rejected after refresh (status {})",
                response.status().as_u16()
            )));
        }
        self.decode(&builder, response).await
    }

    /// Execute with a JSON accept mode and deserialize into `T`
    pub async fn execute_json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T> {
        self.execute(builder.accept_json()).await?.deserialize()
    }

    async fn dispatch(
        &self,
        builder: &RequestBuilder,
        credentials: &Credentials,
        attempt: u32,
    ) -> Result<RawResponse> {
        let (descriptor, _) = builder.clone().with_authorization(credentials).build();
        tracing::debug!(
            method = %descriptor.method(),
            url = %descriptor.url(),
            attempt = attempt,
            "Executing request attempt"
        );
        self.transport.send(&descriptor).await
    }

    async fn decode(&self, builder: &RequestBuilder, response: RawResponse) -> Result<Decoded> {
        let (_, decoder) = builder.build();
        decoder.decode(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{CredentialProvider, CredentialStore, InMemoryCredentialStore};
    use crate::request::RequestDescriptor;
    use async_trait::async_trait;
    use chrono::{Duration, Utc};
    use parking_lot::Mutex;
    use reqwest::StatusCode;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Accepts only `Bearer good`, records every Authorization header
    #[derive(Default)]
    struct ScriptedTransport {
        seen: Mutex<Vec<String>>,
        reject_all: bool,
        fail: bool,
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn send(&self, request: &RequestDescriptor) -> Result<RawResponse> {
            if self.fail {
                return Err(ApiError::Transport("connection refused".to_string()));
            }
            let auth = request.headers().get("Authorization").unwrap_or_default().to_string();
            self.seen.lock().push(auth.clone());
            if self.reject_all || auth != "Bearer good" {
                return Ok(RawResponse::from_text(StatusCode::UNAUTHORIZED, ""));
            }
            Ok(RawResponse::from_stream_bytes(StatusCode::OK, r#"{"some":"lala"}"#))
        }
    }

    #[derive(Default)]
    struct GoodTokenProvider {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl CredentialProvider for GoodTokenProvider {
        async fn acquire(&self, _config: &ApiConfiguration) -> Result<Credentials> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Credentials::new("good", "", Utc::now() + Duration::hours(1)))
        }

        async fn refresh(&self, _c: &Credentials, config: &ApiConfiguration) -> Result<Credentials> {
            self.acquire(config).await
        }
    }

    /// Hands out `good` after 50ms
    #[derive(Default)]
    struct SlowTokenProvider {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl CredentialProvider for SlowTokenProvider {
        async fn acquire(&self, _config: &ApiConfiguration) -> Result<Credentials> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            Ok(Credentials::new("good", "", Utc::now() + Duration::hours(1)))
        }

        async fn refresh(&self, _c: &Credentials, config: &ApiConfiguration) -> Result<Credentials> {
            self.acquire(config).await
        }
    }

    fn executor(
        transport: Arc<ScriptedTransport>,
        provider: Arc<GoodTokenProvider>,
        store: Arc<InMemoryCredentialStore>,
    ) -> AuthenticatedExecutor {
        let config = Arc::new(ApiConfiguration::new("id", "secret"));
        let auth = Arc::new(AuthManager::new(config.clone(), provider, store));
        AuthenticatedExecutor::new(transport, auth, config)
    }

    #[tokio::test]
    async fn test_valid_credentials_pass_through() {
        let transport = Arc::new(ScriptedTransport::default());
        let provider = Arc::new(GoodTokenProvider::default());
        let store = Arc::new(InMemoryCredentialStore::with_credentials(Credentials::new(
            "good",
            "",
            Utc::now() + Duration::hours(1),
        )));
        let exec = executor(transport.clone(), provider.clone(), store);

        let value: serde_json::Value = exec
            .execute_json(RequestBuilder::new("http://api/some/url"))
            .await
            .unwrap();
        assert_eq!(value, json!({"some": "lala"}));
        assert_eq!(transport.seen.lock().len(), 1);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_rejected_credentials_refresh_and_retry() {
        let transport = Arc::new(ScriptedTransport::default());
        let provider = Arc::new(GoodTokenProvider::default());
        let store = Arc::new(InMemoryCredentialStore::with_credentials(Credentials::new(
            "stale",
            "",
            Utc::now(),
        )));
        let exec = executor(transport.clone(), provider.clone(), store.clone());

        let decoded = exec
            .execute(RequestBuilder::new("http://api/some/url").accept_text())
            .await
            .unwrap();
        assert_eq!(decoded.into_text().unwrap(), r#"{"some":"lala"}"#);
        assert_eq!(*transport.seen.lock(), vec!["Bearer stale", "Bearer good"]);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.get_credentials().unwrap().access_token, "good");
    }

    #[tokio::test]
    async fn test_rejected_after_refresh_is_terminal() {
        let transport = Arc::new(ScriptedTransport {
            reject_all: true,
            ..Default::default()
        });
        let provider = Arc::new(GoodTokenProvider::default());
        let exec = executor(
            transport.clone(),
            provider.clone(),
            Arc::new(InMemoryCredentialStore::new()),
        );

        let err = exec
            .execute(RequestBuilder::new("http://api/some/url"))
            .await
            .unwrap_err();
        assert!(err.is_auth_failure());
        assert_eq!(transport.seen.lock().len(), 2);
    }

    #[tokio::test]
    async fn test_transport_failure_is_surfaced() {
        let transport = Arc::new(ScriptedTransport {
            fail: true,
            ..Default::default()
        });
        let exec = executor(
            transport,
            Arc::new(GoodTokenProvider::default()),
            Arc::new(InMemoryCredentialStore::new()),
        );
        let err = exec
            .execute(RequestBuilder::new("http://api/some/url"))
            .await
            .unwrap_err();
        assert!(err.is_transport());
    }

    #[tokio::test]
    async fn test_custom_predicate() {
        let transport = Arc::new(ScriptedTransport::default());
        let store = Arc::new(InMemoryCredentialStore::with_credentials(Credentials::new(
            "stale",
            "",
            Utc::now(),
        )));
        // Never treat anything as rejected: the 401 goes straight to decoding
        let exec = executor(transport.clone(), Arc::new(GoodTokenProvider::default()), store)
            .with_auth_failure_predicate(Arc::new(|_: &RawResponse| false));

        let decoded = exec
            .execute(RequestBuilder::new("http://api/some/url"))
            .await
            .unwrap();
        let raw = decoded.into_raw().unwrap();
        assert_eq!(raw.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(transport.seen.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_abandoned_call_is_not_retried() {
        let transport = Arc::new(ScriptedTransport::default());
        let provider = Arc::new(SlowTokenProvider::default());
        let store = Arc::new(InMemoryCredentialStore::with_credentials(Credentials::new(
            "stale",
            "",
            Utc::now(),
        )));
        let config = Arc::new(ApiConfiguration::new("id", "secret"));
        let auth = Arc::new(AuthManager::new(config.clone(), provider.clone(), store.clone()));
        let exec = AuthenticatedExecutor::new(transport.clone(), auth, config);

        let abandoned = tokio::time::timeout(
            std::time::Duration::from_millis(10),
            exec.execute(RequestBuilder::new("http://api/some/url")),
        )
        .await;
        assert!(abandoned.is_err());

        tokio::time::sleep(std::time::Duration::from_millis(150)).await;
        assert_eq!(*transport.seen.lock(), vec!["Bearer stale"]);
        assert_eq!(store.get_credentials().unwrap().access_token, "good");
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }
}
