// Paxful client - Library root

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod executor;
pub mod request;
pub mod transport;

pub use api::PaxfulApi;
pub use auth::{CredentialProvider, CredentialStore, Credentials, InMemoryCredentialStore};
pub use config::ApiConfiguration;
pub use error::{ApiError, Result};
pub use executor::AuthenticatedExecutor;
pub use request::{contains_binary, InvokeBody, PayloadValue, RequestBuilder};
