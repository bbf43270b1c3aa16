// Transport layer
// Turns a request descriptor into a wire request and returns the raw response

use async_trait::async_trait;
use dashmap::DashMap;
use futures::{StreamExt, TryStreamExt};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Method, Url};
use std::time::Duration;
use tokio_util::io::ReaderStream;

use crate::error::{ApiError, Result};
use crate::request::{
    MultipartForm, MultipartPart, RawResponse, RequestBody, RequestDescriptor, ResponseBody,
};

/// Dispatches request descriptors
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &RequestDescriptor) -> Result<RawResponse>;
}

/// reqwest-backed transport with one pooled client per proxy
pub struct ReqwestTransport {
    /// Client used when no proxy is configured
    client: Client,

    /// Clients keyed by proxy URL
    proxied: DashMap<String, Client>,

    /// Connect timeout applied to every client
    connect_timeout: Duration,
}

impl ReqwestTransport {
    pub fn new(max_connections: usize, connect_timeout: u64) -> Result<Self> {
        let connect_timeout = Duration::from_secs(connect_timeout);
        let client = Client::builder()
            .pool_max_idle_per_host(max_connections)
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| ApiError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            proxied: DashMap::new(),
            connect_timeout,
        })
    }

    fn client_for(&self, proxy: Option<&str>) -> Result<Client> {
        let Some(proxy_url) = proxy else {
            return Ok(self.client.clone());
        };
        if let Some(client) = self.proxied.get(proxy_url) {
            return Ok(client.clone());
        }

        let proxy = reqwest::Proxy::all(proxy_url)
            .map_err(|e| ApiError::InvalidRequest(format!("Invalid proxy '{}': {}", proxy_url, e)))?;
        let client = Client::builder()
            .connect_timeout(self.connect_timeout)
            .proxy(proxy)
            .build()
            .map_err(|e| ApiError::Config(format!("Failed to create proxied HTTP client: {}", e)))?;
        tracing::debug!(proxy = proxy_url, "Created proxied HTTP client");
        self.proxied.insert(proxy_url.to_string(), client.clone());
        Ok(client)
    }
}

/// Validate method, URL and headers before anything goes on the wire
fn wire_parts(request: &RequestDescriptor) -> Result<(Method, Url, HeaderMap)> {
    let method = Method::from_bytes(request.method().as_bytes())
        .map_err(|_| ApiError::InvalidRequest(format!("invalid HTTP method '{}'", request.method())))?;
    let url = Url::parse(request.url())
        .map_err(|e| ApiError::InvalidRequest(format!("invalid URL '{}': {}", request.url(), e)))?;

    let multipart = matches!(request.body(), RequestBody::Multipart(_));
    let mut headers = HeaderMap::new();
    for (name, value) in request.headers().iter() {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| ApiError::InvalidRequest(format!("invalid header name '{}'", name)))?;
        // The multipart encoder sets its own Content-Type with the boundary
        if multipart && name == CONTENT_TYPE {
            continue;
        }
        let value = HeaderValue::from_str(value)
            .map_err(|_| ApiError::InvalidRequest(format!("invalid value for header '{}'", name)))?;
        headers.insert(name, value);
    }
    Ok((method, url, headers))
}

/// Rebuild a reqwest form; file streams are reopened on every call
async fn multipart_form(form: &MultipartForm) -> Result<Form> {
    let mut out = Form::new();
    for (name, part) in form.parts() {
        let part = match part {
            MultipartPart::Field(text) => Part::text(text.clone()),
            MultipartPart::File { bytes, file_name } => {
                Part::bytes(bytes.to_vec()).file_name(file_name.clone())
            }
            MultipartPart::Stream(stream) => {
                let file = tokio::fs::File::open(stream.path()).await.map_err(|e| {
                    ApiError::InvalidRequest(format!(
                        "cannot open '{}' for upload: {}",
                        stream.path().display(),
                        e
                    ))
                })?;
                let length = file.metadata().await.map(|m| m.len()).ok();
                let body = reqwest::Body::wrap_stream(ReaderStream::new(file));
                let part = match length {
                    Some(len) => Part::stream_with_length(body, len),
                    None => Part::stream(body),
                };
                part.file_name(stream.file_name().unwrap_or(name.as_str()).to_string())
            }
        };
        out = out.part(name.clone(), part);
    }
    Ok(out)
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: &RequestDescriptor) -> Result<RawResponse> {
        let (method, url, headers) = wire_parts(request)?;
        let client = self.client_for(request.options().proxy.as_deref())?;

        tracing::debug!(method = %method, url = %url, "Sending HTTP request");

        let mut builder = client.request(method, url.clone()).headers(headers);
        if let Some(timeout) = request.options().timeout {
            builder = builder.timeout(timeout);
        }
        builder = match request.body() {
            RequestBody::Empty => builder,
            RequestBody::Text(text) => builder.body(text.clone()),
            RequestBody::Binary(bytes) => builder.body(bytes.clone()),
            RequestBody::Multipart(form) => builder.multipart(multipart_form(form).await?),
        };

        let response = builder.send().await.map_err(|e| {
            tracing::warn!(error = %e, url = %url, "HTTP request error");
            ApiError::from(e)
        })?;

        let status = response.status();
        tracing::debug!(status = %status, url = %url, "Received HTTP response");

        let headers = response.headers().clone();
        let body = response.bytes_stream().map_err(ApiError::from).boxed();
        Ok(RawResponse::new(status, headers, ResponseBody::Stream(body)))
    }
}
