// Response decoders
// Turn a raw transport response into the value selected by the accept mode

use bytes::{Bytes, BytesMut};
use futures::stream::{self, BoxStream, StreamExt};
use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;

use crate::error::{ApiError, Result};

/// Streaming body as produced by a transport
pub type BodyStream = BoxStream<'static, Result<Bytes>>;

/// Body of a raw response
///
/// Transports expose the body in whichever representation they support.
pub enum ResponseBody {
    Stream(BodyStream),
    Bytes(Bytes),
    Text(String),
    /// Already read by a failed strategy
    Consumed,
}

impl fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponseBody::Stream(_) => f.write_str("Stream(..)"),
            ResponseBody::Bytes(b) => write!(f, "Bytes({} bytes)", b.len()),
            ResponseBody::Text(t) => write!(f, "Text({} chars)", t.len()),
            ResponseBody::Consumed => f.write_str("Consumed"),
        }
    }
}

impl ResponseBody {
    /// Read the whole body regardless of representation
    pub async fn collect(self) -> Result<Bytes> {
        match self {
            ResponseBody::Stream(mut s) => {
                let mut buf = BytesMut::new();
                while let Some(chunk) = s.next().await {
                    buf.extend_from_slice(&chunk?);
                }
                Ok(buf.freeze())
            }
            ResponseBody::Bytes(b) => Ok(b),
            ResponseBody::Text(t) => Ok(Bytes::from(t)),
            ResponseBody::Consumed => Err(ApiError::Decode(
                "response body was already consumed".to_string(),
            )),
        }
    }
}

/// Response as returned by a transport, before decoding
#[derive(Debug)]
pub struct RawResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: ResponseBody,
}

impl RawResponse {
    pub fn new(status: StatusCode, headers: HeaderMap, body: ResponseBody) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    pub fn from_bytes(status: StatusCode, bytes: impl Into<Bytes>) -> Self {
        Self::new(status, HeaderMap::new(), ResponseBody::Bytes(bytes.into()))
    }

    pub fn from_text(status: StatusCode, text: impl Into<String>) -> Self {
        Self::new(status, HeaderMap::new(), ResponseBody::Text(text.into()))
    }

    /// Body delivered as a single-chunk stream
    pub fn from_stream_bytes(status: StatusCode, bytes: impl Into<Bytes>) -> Self {
        let chunk: Result<Bytes> = Ok(bytes.into());
        Self::new(
            status,
            HeaderMap::new(),
            ResponseBody::Stream(stream::iter(vec![chunk]).boxed()),
        )
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &ResponseBody {
        &self.body
    }

    pub fn into_body(self) -> ResponseBody {
        self.body
    }

    pub async fn bytes(self) -> Result<Bytes> {
        self.body.collect().await
    }

    /// Body as text, invalid UTF-8 replaced
    pub async fn text(self) -> Result<String> {
        let bytes = self.body.collect().await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

/// Result of decoding a response
#[derive(Debug)]
pub enum Decoded {
    /// Pass-through: no accept mode was selected
    Raw(RawResponse),
    Json(Value),
    Text(String),
    Binary(Bytes),
}

impl Decoded {
    pub fn into_json(self) -> Result<Value> {
        match self {
            Decoded::Json(v) => Ok(v),
            other => Err(ApiError::Decode(format!(
                "expected a JSON result, got {}",
                other.kind()
            ))),
        }
    }

    /// Deserialize a JSON result into `T`
    pub fn deserialize<T: DeserializeOwned>(self) -> Result<T> {
        let value = self.into_json()?;
        serde_json::from_value(value).map_err(|e| ApiError::Decode(e.to_string()))
    }

    pub fn into_text(self) -> Result<String> {
        match self {
            Decoded::Text(t) => Ok(t),
            other => Err(ApiError::Decode(format!(
                "expected a text result, got {}",
                other.kind()
            ))),
        }
    }

    pub fn into_bytes(self) -> Result<Bytes> {
        match self {
            Decoded::Binary(b) => Ok(b),
            other => Err(ApiError::Decode(format!(
                "expected a binary result, got {}",
                other.kind()
            ))),
        }
    }

    pub fn into_raw(self) -> Option<RawResponse> {
        match self {
            Decoded::Raw(r) => Some(r),
            _ => None,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Decoded::Raw(_) => "raw response",
            Decoded::Json(_) => "JSON",
            Decoded::Text(_) => "text",
            Decoded::Binary(_) => "binary",
        }
    }
}

/// Binary read primitives, tried in order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryStrategy {
    /// Drain the streaming body
    Stream,
    /// Take the buffered bytes
    ArrayBuffer,
    /// Take the raw text buffer as bytes
    RawBuffer,
}

pub const BINARY_FALLBACK_CHAIN: [BinaryStrategy; 3] = [
    BinaryStrategy::Stream,
    BinaryStrategy::ArrayBuffer,
    BinaryStrategy::RawBuffer,
];

impl BinaryStrategy {
    /// Attempt a read; on failure the body is handed back for the next strategy
    async fn read(self, body: ResponseBody) -> (std::result::Result<Bytes, String>, ResponseBody) {
        match (self, body) {
            (BinaryStrategy::Stream, ResponseBody::Stream(s)) => {
                match ResponseBody::Stream(s).collect().await {
                    Ok(bytes) => (Ok(bytes), ResponseBody::Consumed),
                    Err(e) => (Err(e.to_string()), ResponseBody::Consumed),
                }
            }
            (BinaryStrategy::ArrayBuffer, ResponseBody::Bytes(b)) => (Ok(b), ResponseBody::Consumed),
            (BinaryStrategy::RawBuffer, ResponseBody::Text(t)) => {
                (Ok(Bytes::from(t)), ResponseBody::Consumed)
            }
            (strategy, body) => {
                let reason = format!("{:?} read not supported for {:?} body", strategy, body);
                (Err(reason), body)
            }
        }
    }
}

/// Decoding strategy selected on the request builder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseDecoder {
    #[default]
    PassThrough,
    Json,
    Text,
    Binary,
}

impl ResponseDecoder {
    pub async fn decode(self, response: RawResponse) -> Result<Decoded> {
        match self {
            ResponseDecoder::PassThrough => Ok(Decoded::Raw(response)),
            ResponseDecoder::Json => {
                let bytes = response.bytes().await?;
                serde_json::from_slice(&bytes)
                    .map(Decoded::Json)
                    .map_err(|e| ApiError::Decode(format!("invalid JSON response: {}", e)))
            }
            ResponseDecoder::Text => response.text().await.map(Decoded::Text),
            ResponseDecoder::Binary => decode_binary(response.into_body()).await.map(Decoded::Binary),
        }
    }
}

async fn decode_binary(mut body: ResponseBody) -> Result<Bytes> {
    let mut failures = Vec::with_capacity(BINARY_FALLBACK_CHAIN.len());
    for strategy in BINARY_FALLBACK_CHAIN {
        let (result, rest) = strategy.read(body).await;
        match result {
            Ok(bytes) => {
                tracing::debug!(strategy = ?strategy, len = bytes.len(), "Binary response read");
                return Ok(bytes);
            }
            Err(reason) => failures.push(reason),
        }
        body = rest;
    }
    Err(ApiError::Decode(format!(
        "no binary read strategy succeeded: {}",
        failures.join("; ")
    )))
}
