// Credential storage

use parking_lot::RwLock;

use super::types::Credentials;

/// Holder of the current credentials, shared by every call of a client
///
/// Implementations must replace the stored value atomically: a reader sees
/// either the old or the new credentials, never a mix.
pub trait CredentialStore: Send + Sync {
    fn get_credentials(&self) -> Option<Credentials>;

    fn save_credentials(&self, credentials: Credentials) -> Credentials;
}

/// Process-local store, lost on restart
#[derive(Debug, Default)]
pub struct InMemoryCredentialStore {
    credentials: RwLock<Option<Credentials>>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        warn_not_for_production();
        Self::default()
    }

    pub fn with_credentials(credentials: Credentials) -> Self {
        warn_not_for_production();
        Self {
            credentials: RwLock::new(Some(credentials)),
        }
    }
}

fn warn_not_for_production() {
    tracing::warn!("InMemoryCredentialStore keeps tokens in process memory only; do not use it in production");
}

impl CredentialStore for InMemoryCredentialStore {
    fn get_credentials(&self) -> Option<Credentials> {
        self.credentials.read().clone()
    }

    fn save_credentials(&self, credentials: Credentials) -> Credentials {
        *self.credentials.write() = Some(credentials.clone());
        credentials
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use parking_lot::Mutex;
    use std::sync::Arc;

    /// Collects formatted log output
    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for CapturedLogs {
        type Writer = CapturedLogs;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    fn logs_of(f: impl FnOnce()) -> String {
        let captured = CapturedLogs::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(captured.clone())
            .with_ansi(false)
            .finish();
        tracing::subscriber::with_default(subscriber, f);
        let bytes = captured.0.lock().clone();
        String::from_utf8_lossy(&bytes).into_owned()
    }

    #[test]
    fn test_every_constructor_warns() {
        let logs = logs_of(|| {
            InMemoryCredentialStore::new();
        });
        assert!(logs.contains("do not use it in production"));

        let logs = logs_of(|| {
            InMemoryCredentialStore::with_credentials(Credentials::new("a", "r", Utc::now()));
        });
        assert!(logs.contains("do not use it in production"));
    }

    #[test]
    fn test_in_memory_store_roundtrip() {
        let store = InMemoryCredentialStore::new();
        assert!(store.get_credentials().is_none());

        let creds = Credentials::new("a", "r", Utc::now());
        let saved = store.save_credentials(creds.clone());
        assert_eq!(saved, creds);
        assert_eq!(store.get_credentials(), Some(creds));
    }

    #[test]
    fn test_save_replaces_whole_value() {
        let store = InMemoryCredentialStore::with_credentials(Credentials::new("a", "r", Utc::now()));
        store.save_credentials(Credentials::new("b", "", Utc::now()));
        let current = store.get_credentials().unwrap();
        assert_eq!(current.access_token, "b");
        assert_eq!(current.refresh_token, "");
    }
}
