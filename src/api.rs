// Paxful API facade
// Ties configuration, credential store, token client and executor together

use serde::de::DeserializeOwned;
use std::sync::Arc;

use crate::auth::{
    authorize_url, AuthManager, CredentialProvider, CredentialStore, Credentials,
    InMemoryCredentialStore, OAuthCredentialProvider, Profile,
};
use crate::config::ApiConfiguration;
use crate::error::Result;
use crate::executor::AuthenticatedExecutor;
use crate::request::{contains_binary, InvokeBody, RequestBuilder};
use crate::transport::{ReqwestTransport, Transport};

/// Client for the Paxful REST API
pub struct PaxfulApi {
    config: Arc<ApiConfiguration>,
    oauth: Arc<OAuthCredentialProvider>,
    executor: AuthenticatedExecutor,
}

impl PaxfulApi {
    /// Create a client; without a store credentials live in process memory
    pub fn new(config: ApiConfiguration, store: Option<Arc<dyn CredentialStore>>) -> Result<Self> {
        let transport = Arc::new(ReqwestTransport::new(20, 30)?);
        Self::with_transport(config, store, transport)
    }

    pub fn with_transport(
        config: ApiConfiguration,
        store: Option<Arc<dyn CredentialStore>>,
        transport: Arc<dyn Transport>,
    ) -> Result<Self> {
        let config = config.normalized();
        config.validate()?;
        let config = Arc::new(config);

        let oauth = Arc::new(OAuthCredentialProvider::new(&config)?);
        let store = store
            .unwrap_or_else(|| Arc::new(InMemoryCredentialStore::new()) as Arc<dyn CredentialStore>);
        let provider: Arc<dyn CredentialProvider> = oauth.clone();
        let auth = Arc::new(AuthManager::new(config.clone(), provider, store));
        let executor = AuthenticatedExecutor::new(transport, auth, config.clone());

        Ok(Self {
            config,
            oauth,
            executor,
        })
    }

    pub fn configuration(&self) -> &ApiConfiguration {
        &self.config
    }

    pub fn executor(&self) -> &AuthenticatedExecutor {
        &self.executor
    }

    /// URL to redirect the user to for authorizing this application
    pub fn authorize_url(&self) -> Result<String> {
        authorize_url(&self.config)
    }

    /// Exchange the code returned by the authorization redirect
    pub async fn impersonated_credentials(&self, code: &str) -> Result<Credentials> {
        let credentials = self.oauth.exchange_code(&self.config, code).await?;
        Ok(self.executor.auth().adopt(credentials))
    }

    /// Credentials of the application's own account (client credentials grant)
    pub async fn my_credentials(&self) -> Result<Credentials> {
        let credentials = self.oauth.acquire(&self.config).await?;
        Ok(self.executor.auth().adopt(credentials))
    }

    /// Refresh the stored credentials now
    pub async fn refresh_credentials(&self) -> Result<Credentials> {
        self.executor.auth().refresh_now().await
    }

    /// Profile of the currently authenticated user
    pub async fn get_profile(&self) -> Result<Profile> {
        let url = format!("{}/oauth2/userinfo", self.config.oauth_host);
        self.executor.execute_json(RequestBuilder::new(url)).await
    }

    /// POST `payload` to `path` as a form, or as multipart when it carries files
    pub async fn invoke<T: DeserializeOwned>(&self, path: &str, payload: Option<&InvokeBody>) -> Result<T> {
        let builder = RequestBuilder::new(self.data_url(path)).with_method("POST");
        let builder = match payload {
            Some(p) if contains_binary(p) => builder.with_multipart_form_data(p),
            Some(p) => builder.with_form_data(p),
            None => builder.with_form_data(&InvokeBody::new()),
        };
        self.executor.execute_json(builder).await
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str, params: Option<&InvokeBody>) -> Result<T> {
        self.call_with_params("GET", path, params).await
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str, params: Option<&InvokeBody>) -> Result<T> {
        self.call_with_params("DELETE", path, params).await
    }

    pub async fn post<T: DeserializeOwned>(&self, path: &str, payload: Option<&InvokeBody>) -> Result<T> {
        self.call_with_body("POST", path, payload).await
    }

    pub async fn put<T: DeserializeOwned>(&self, path: &str, payload: Option<&InvokeBody>) -> Result<T> {
        self.call_with_body("PUT", path, payload).await
    }

    pub async fn patch<T: DeserializeOwned>(&self, path: &str, payload: Option<&InvokeBody>) -> Result<T> {
        self.call_with_body("PATCH", path, payload).await
    }

    fn data_url(&self, path: &str) -> String {
        format!("{}{}", self.config.data_host, path)
    }

    async fn call_with_params<T: DeserializeOwned>(
        &self,
        method: &str,
        path: &str,
        params: Option<&InvokeBody>,
    ) -> Result<T> {
        let mut builder = RequestBuilder::new(self.data_url(path)).with_method(method);
        if let Some(params) = params {
            builder = builder.with_url_params(params);
        }
        self.executor.execute_json(builder).await
    }

    async fn call_with_body<T: DeserializeOwned>(
        &self,
        method: &str,
        path: &str,
        payload: Option<&InvokeBody>,
    ) -> Result<T> {
        let builder = RequestBuilder::new(self.data_url(path)).with_method(method);
        let builder = match payload {
            Some(p) if contains_binary(p) => builder.with_multipart_form_data(p),
            Some(p) => builder.with_json_data(Some(&p.to_json())),
            None => builder.with_json_data(None),
        };
        self.executor.execute_json(builder).await
    }
}
