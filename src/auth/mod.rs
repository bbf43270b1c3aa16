// Authentication module
// Credential types, storage, token exchange and refresh coordination

mod manager;
mod provider;
mod store;
mod types;

pub use manager::AuthManager;
pub use provider::{authorize_url, CredentialProvider, OAuthCredentialProvider};
pub use store::{CredentialStore, InMemoryCredentialStore};
pub use types::{Credentials, Profile, TokenResponse};
