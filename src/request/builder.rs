// Request builder
// Accumulates method/url/headers/body and the response decoder without doing I/O

use bytes::Bytes;
use serde_json::Value;
use std::time::Duration;

use super::decoder::ResponseDecoder;
use super::encoding::{
    encode_form, encode_json, encode_multipart, MultipartForm, CONTENT_TYPE_FORM,
    CONTENT_TYPE_JSON, CONTENT_TYPE_MULTIPART, CONTENT_TYPE_OCTET_STREAM,
};
use super::payload::InvokeBody;
use crate::auth::Credentials;
use crate::config::ApiConfiguration;

/// Header mapping with case-insensitive keys; last write wins
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self
            .entries
            .iter_mut()
            .find(|(n, _)| n.eq_ignore_ascii_case(&name))
        {
            Some(entry) => *entry = (name, value),
            None => self.entries.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Body of a request descriptor
#[derive(Debug, Clone, Default, PartialEq)]
pub enum RequestBody {
    #[default]
    Empty,
    Text(String),
    Binary(Bytes),
    Multipart(MultipartForm),
}

impl RequestBody {
    pub fn is_empty(&self) -> bool {
        matches!(self, RequestBody::Empty)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            RequestBody::Text(t) => Some(t),
            _ => None,
        }
    }
}

/// Transport options derived from configuration
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransportOptions {
    pub proxy: Option<String>,
    pub timeout: Option<Duration>,
}

/// Finalized request, immutable once built
#[derive(Debug, Clone, PartialEq)]
pub struct RequestDescriptor {
    url: String,
    method: String,
    headers: Headers,
    body: RequestBody,
    options: TransportOptions,
}

impl RequestDescriptor {
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn body(&self) -> &RequestBody {
        &self.body
    }

    pub fn options(&self) -> &TransportOptions {
        &self.options
    }
}

/// Fluent request builder
///
/// Every `with_*` call consumes the builder and returns the updated value;
/// clone it to keep an earlier state around. Content-setting calls overwrite
/// each other (headers merge, the body of the last call wins).
#[derive(Debug, Clone)]
pub struct RequestBuilder {
    url: String,
    method: String,
    headers: Headers,
    body: RequestBody,
    options: TransportOptions,
    decoder: ResponseDecoder,
}

impl RequestBuilder {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: "GET".to_string(),
            headers: Headers::new(),
            body: RequestBody::Empty,
            options: TransportOptions::default(),
            decoder: ResponseDecoder::PassThrough,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Any verb is accepted here; the transport rejects invalid ones
    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn with_form_data(self, payload: &InvokeBody) -> Self {
        let body = RequestBody::Text(encode_form(payload));
        self.with_body(CONTENT_TYPE_FORM, body)
    }

    /// Append the flattened payload as a query string
    ///
    /// Joins with `&` when the URL already carries a query.
    pub fn with_url_params(mut self, payload: &InvokeBody) -> Self {
        let query = encode_form(payload);
        if query.is_empty() {
            return self;
        }
        let separator = if self.url.contains('?') { '&' } else { '?' };
        self.url = format!("{}{}{}", self.url, separator, query);
        self
    }

    pub fn with_multipart_form_data(self, payload: &InvokeBody) -> Self {
        let body = RequestBody::Multipart(encode_multipart(payload));
        self.with_body(CONTENT_TYPE_MULTIPART, body)
    }

    pub fn with_json_data(self, data: Option<&Value>) -> Self {
        let body = RequestBody::Text(encode_json(data));
        self.with_body(CONTENT_TYPE_JSON, body)
    }

    /// Raw binary body
    pub fn with_binary_data(self, data: impl Into<Bytes>) -> Self {
        let body = RequestBody::Binary(data.into());
        self.with_body(CONTENT_TYPE_OCTET_STREAM, body)
    }

    pub fn with_authorization(self, credentials: &Credentials) -> Self {
        let value = format!("Bearer {}", credentials.access_token);
        self.with_header("Authorization", value)
    }

    /// Attach transport options; headers and body are untouched
    pub fn with_config(mut self, config: &ApiConfiguration) -> Self {
        self.options = TransportOptions {
            proxy: config.proxy.clone(),
            timeout: config.request_timeout.map(Duration::from_secs),
        };
        self
    }

    pub fn accept_json(mut self) -> Self {
        self.decoder = ResponseDecoder::Json;
        self.with_header("Accept", CONTENT_TYPE_JSON)
    }

    pub fn accept_text(mut self) -> Self {
        self.decoder = ResponseDecoder::Text;
        self
    }

    pub fn accept_binary(mut self) -> Self {
        self.decoder = ResponseDecoder::Binary;
        self
    }

    /// Snapshot of the accumulated state; may be called repeatedly
    pub fn build(&self) -> (RequestDescriptor, ResponseDecoder) {
        let descriptor = RequestDescriptor {
            url: self.url.clone(),
            method: self.method.clone(),
            headers: self.headers.clone(),
            body: self.body.clone(),
            options: self.options.clone(),
        };
        (descriptor, self.decoder)
    }

    fn with_body(mut self, content_type: &str, body: RequestBody) -> Self {
        if !self.body.is_empty() {
            tracing::warn!(
                url = %self.url,
                content_type = content_type,
                "Request body already set, overwriting"
            );
        }
        self.body = body;
        self.with_header("Content-Type", content_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::encoding::MultipartPart;
    use chrono::Utc;
    use serde_json::json;

    fn credentials(access_token: &str) -> Credentials {
        Credentials::new(access_token, "bar", Utc::now())
    }

    #[test]
    fn test_basic_request() {
        let (request, decoder) = RequestBuilder::new("some-url").build();
        assert_eq!(request.url(), "some-url");
        assert_eq!(request.method(), "GET");
        assert!(request.headers().is_empty());
        assert_eq!(request.body(), &RequestBody::Empty);
        assert_eq!(request.options(), &TransportOptions::default());
        assert_eq!(decoder, ResponseDecoder::PassThrough);
    }

    #[test]
    fn test_send_json() {
        let (request, decoder) = RequestBuilder::new("some-url")
            .with_method("POST")
            .with_json_data(Some(&json!({"some": "data"})))
            .build();
        assert_eq!(request.headers().get("Content-Type"), Some("application/json"));
        assert_eq!(request.body().as_text(), Some(r#"{"some":"data"}"#));
        assert_eq!(decoder, ResponseDecoder::PassThrough);
    }

    #[test]
    fn test_send_json_defaults_to_empty_object() {
        let (request, _) = RequestBuilder::new("some-url").with_json_data(None).build();
        assert_eq!(request.body().as_text(), Some("{}"));
    }

    #[test]
    fn test_send_form() {
        let (request, _) = RequestBuilder::new("some-url")
            .with_method("POST")
            .with_form_data(&InvokeBody::new().with("some", "data"))
            .build();
        assert_eq!(
            request.headers().get("content-type"),
            Some("application/x-www-form-urlencoded")
        );
        assert_eq!(request.body().as_text(), Some("some=data"));
    }

    #[test]
    fn test_send_multipart_form() {
        let payload = InvokeBody::new()
            .with("some", "data")
            .with("file1", Bytes::from_static(b"123"));
        let (request, _) = RequestBuilder::new("some-url")
            .with_method("POST")
            .with_multipart_form_data(&payload)
            .build();

        assert!(request
            .headers()
            .get("Content-Type")
            .unwrap()
            .starts_with("multipart/form-data"));
        match request.body() {
            RequestBody::Multipart(form) => {
                assert_eq!(form.part("some"), Some(&MultipartPart::Field("data".into())));
                assert!(form.part("file1").unwrap().is_file());
            }
            other => panic!("expected multipart body, got {:?}", other),
        }
    }

    #[test]
    fn test_send_binary() {
        let (request, _) = RequestBuilder::new("some-url")
            .with_binary_data(vec![0u8, 1, 2])
            .build();
        assert_eq!(
            request.headers().get("Content-Type"),
            Some("application/octet-stream")
        );
        assert_eq!(request.body(), &RequestBody::Binary(Bytes::from_static(&[0, 1, 2])));
    }

    #[test]
    fn test_second_content_call_wins() {
        let (request, _) = RequestBuilder::new("some-url")
            .with_json_data(Some(&json!({"a": 1})))
            .with_form_data(&InvokeBody::new().with("b", "2"))
            .build();
        assert_eq!(request.headers().len(), 1);
        assert_eq!(
            request.headers().get("Content-Type"),
            Some("application/x-www-form-urlencoded")
        );
        assert_eq!(request.body().as_text(), Some("b=2"));
    }

    #[test]
    fn test_url_params() {
        let payload = InvokeBody::from_json(json!({"page": 2, "filter": {"type": "buy"}})).unwrap();
        let (request, _) = RequestBuilder::new("https://api/offers")
            .with_url_params(&payload)
            .build();
        assert_eq!(request.url(), "https://api/offers?page=2&filter.type=buy");
        assert!(request.body().is_empty());
    }

    #[test]
    fn test_url_params_merge_existing_query() {
        let (request, _) = RequestBuilder::new("https://api/offers?limit=5")
            .with_url_params(&InvokeBody::new().with("page", "1"))
            .with_url_params(&InvokeBody::new())
            .with_url_params(&InvokeBody::new().with("sort", "asc"))
            .build();
        assert_eq!(request.url(), "https://api/offers?limit=5&page=1&sort=asc");
    }

    #[test]
    fn test_accept_json() {
        let (request, decoder) = RequestBuilder::new("some-url").accept_json().build();
        assert_eq!(request.headers().get("Accept"), Some("application/json"));
        assert!(request.body().is_empty());
        assert_eq!(decoder, ResponseDecoder::Json);
    }

    #[test]
    fn test_accept_text_and_binary_leave_headers() {
        let (request, decoder) = RequestBuilder::new("some-url").accept_text().build();
        assert!(request.headers().get("Accept").is_none());
        assert_eq!(decoder, ResponseDecoder::Text);

        let (request, decoder) = RequestBuilder::new("some-url").accept_binary().build();
        assert!(request.headers().is_empty());
        assert_eq!(decoder, ResponseDecoder::Binary);
    }

    #[test]
    fn test_last_accept_wins() {
        let (_, decoder) = RequestBuilder::new("some-url")
            .accept_json()
            .accept_binary()
            .build();
        assert_eq!(decoder, ResponseDecoder::Binary);
    }

    #[test]
    fn test_methods() {
        for method in ["GET", "POST", "PATCH", "DELETE", "OPTIONS"] {
            let (request, _) = RequestBuilder::new("some-url").with_method(method).build();
            assert_eq!(request.method(), method);
        }
    }

    #[test]
    fn test_custom_headers() {
        let (request, _) = RequestBuilder::new("some-url")
            .with_header("foo", "123")
            .with_header("bar", "321")
            .with_header("FOO", "456")
            .build();
        assert_eq!(request.headers().len(), 2);
        assert_eq!(request.headers().get("foo"), Some("456"));
        assert_eq!(request.headers().get("bar"), Some("321"));
    }

    #[test]
    fn test_authorization() {
        let (request, _) = RequestBuilder::new("some-url")
            .with_authorization(&credentials("foo"))
            .build();
        assert_eq!(request.headers().get("Authorization"), Some("Bearer foo"));
    }

    #[test]
    fn test_config_sets_transport_options_only() {
        let config = ApiConfiguration::new("foo", "bar")
            .with_proxy("http://proxy:3128")
            .with_request_timeout(5);
        let (request, _) = RequestBuilder::new("some-url").with_config(&config).build();
        assert_eq!(request.options().proxy.as_deref(), Some("http://proxy:3128"));
        assert_eq!(request.options().timeout, Some(Duration::from_secs(5)));
        assert!(request.headers().is_empty());
        assert!(request.body().is_empty());
    }

    #[test]
    fn test_build_is_idempotent() {
        let builder = RequestBuilder::new("some-url")
            .with_method("PUT")
            .with_header("x", "y")
            .with_json_data(Some(&json!({"k": [1, 2]})))
            .accept_json();
        let (first, first_decoder) = builder.build();
        let (second, second_decoder) = builder.build();
        assert_eq!(first, second);
        assert_eq!(first_decoder, second_decoder);
    }
}
