use chrono::Duration;
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::sync::Arc;

use super::provider::CredentialProvider;
use super::store::CredentialStore;
use super::types::Credentials;
use crate::config::ApiConfiguration;
use crate::error::{ApiError, Result};

/// Outcome of a refresh, shared by every waiter
type RefreshOutcome = std::result::Result<Credentials, Arc<ApiError>>;
type SharedRefresh = Shared<BoxFuture<'static, RefreshOutcome>>;

/// Refresh bookkeeping, guarded by one lock
///
/// `generation` is bumped whenever a new exchange starts or credentials are
/// adopted from outside; a finishing exchange only saves and clears
/// `pending` when its generation is still current.
#[derive(Default)]
struct RefreshSlot {
    generation: u64,
    pending: Option<SharedRefresh>,
}

/// Authentication manager
/// Hands out current credentials and coalesces refreshes: at most one token
/// exchange is in flight per store, concurrent callers await the same one.
pub struct AuthManager {
    /// Process-wide configuration (client id/secret, hosts)
    config: Arc<ApiConfiguration>,

    /// Token exchange collaborator
    provider: Arc<dyn CredentialProvider>,

    /// Current credentials
    store: Arc<dyn CredentialStore>,

    /// Refresh currently in flight, if any
    in_flight: Arc<Mutex<RefreshSlot>>,

    /// Proactive refresh window (zero disables)
    refresh_threshold: Duration,
}

impl AuthManager {
    pub fn new(
        config: Arc<ApiConfiguration>,
        provider: Arc<dyn CredentialProvider>,
        store: Arc<dyn CredentialStore>,
    ) -> Self {
        let refresh_threshold = Duration::seconds(config.token_refresh_threshold as i64);
        Self {
            config,
            provider,
            store,
            in_flight: Arc::new(Mutex::new(RefreshSlot::default())),
            refresh_threshold,
        }
    }

    pub fn store(&self) -> &Arc<dyn CredentialStore> {
        &self.store
    }

    /// Check if credentials are expiring soon (within threshold)
    fn is_expiring_soon(&self, credentials: &Credentials) -> bool {
        self.refresh_threshold > Duration::zero() && credentials.expires_within(self.refresh_threshold)
    }

    /// Credentials to attach to the next dispatch
    ///
    /// Acquires them when the store is empty, refreshes them first when they
    /// fall inside the proactive window.
    pub async fn credentials(&self) -> Result<Credentials> {
        match self.store.get_credentials() {
            Some(current) if self.is_expiring_soon(&current) => {
                tracing::debug!(
                    expires_at = %current.expires_at.to_rfc3339(),
                    "Credentials expiring soon, refreshing before dispatch"
                );
                self.refresh_after_rejection(&current).await
            }
            Some(current) => Ok(current),
            None => {
                tracing::info!("No stored credentials, acquiring...");
                self.coalesce(None).await
            }
        }
    }

    /// Replace credentials the server rejected
    ///
    /// When another caller already replaced `rejected`, its result is reused
    /// without a new exchange.
    pub async fn refresh_after_rejection(&self, rejected: &Credentials) -> Result<Credentials> {
        self.coalesce(Some(rejected)).await
    }

    /// Store credentials obtained outside the refresh path (client credentials
    /// or code exchange)
    ///
    /// A refresh still in flight will not overwrite them.
    pub fn adopt(&self, credentials: Credentials) -> Credentials {
        let mut slot = self.in_flight.lock();
        slot.generation += 1;
        slot.pending = None;
        self.store.save_credentials(credentials)
    }

    /// Refresh the stored credentials unconditionally
    pub async fn refresh_now(&self) -> Result<Credentials> {
        let current = self.store.get_credentials().ok_or_else(|| {
            ApiError::AuthFailure("Misconfiguration: no credentials provided".to_string())
        })?;
        self.coalesce(Some(&current)).await
    }

    async fn coalesce(&self, stale: Option<&Credentials>) -> Result<Credentials> {
        let refresh = {
            let mut slot = self.in_flight.lock();
            let current = self.store.get_credentials();

            if let Some(current) = &current {
                let superseded = match stale {
                    Some(stale) => current.access_token != stale.access_token,
                    None => true,
                };
                if superseded {
                    tracing::debug!("Credentials already replaced by a concurrent refresh");
                    return Ok(current.clone());
                }
            }

            if let Some(pending) = slot.pending.clone() {
                tracing::debug!("Joining refresh already in flight");
                pending
            } else {
                slot.generation += 1;
                let refresh = self.spawn_refresh(current, slot.generation);
                slot.pending = Some(refresh.clone());
                refresh
            }
        };

        refresh.await.map_err(|e| match e.as_ref() {
            ApiError::Transport(msg) => ApiError::Transport(msg.clone()),
            ApiError::AuthFailure(msg) => ApiError::AuthFailure(msg.clone()),
            other => ApiError::AuthFailure(other.to_string()),
        })
    }

    /// Start the exchange on its own task so it completes even if every
    /// waiter is cancelled; the task releases the slot itself when done
    fn spawn_refresh(&self, current: Option<Credentials>, generation: u64) -> SharedRefresh {
        let provider = self.provider.clone();
        let store = self.store.clone();
        let config = self.config.clone();
        let in_flight = self.in_flight.clone();

        let task = tokio::spawn(async move {
            let result = match &current {
                Some(creds) if creds.has_refresh_token() => provider.refresh(creds, &config).await,
                _ => provider.acquire(&config).await,
            };

            let mut slot = in_flight.lock();
            let is_current = slot.generation == generation;
            if is_current {
                slot.pending = None;
            }
            match result {
                Ok(fresh) if is_current => {
                    tracing::info!(
                        "Credentials refreshed, expires: {}",
                        fresh.expires_at.to_rfc3339()
                    );
                    Ok(store.save_credentials(fresh))
                }
                Ok(fresh) => {
                    tracing::debug!("Refresh superseded by adopted credentials, not saving");
                    Ok(store.get_credentials().unwrap_or(fresh))
                }
                Err(e) => {
                    tracing::error!("Token refresh failed: {}", e);
                    Err(Arc::new(e))
                }
            }
        });

        async move {
            match task.await {
                Ok(outcome) => outcome,
                Err(e) => Err(Arc::new(ApiError::Internal(anyhow::anyhow!(
                    "refresh task failed: {}",
                    e
                )))),
            }
        }
        .boxed()
        .shared()
    }
}
