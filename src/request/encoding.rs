// Content encoders
// Turn an InvokeBody into a request body for each supported Content-Type

use bytes::Bytes;
use serde_json::Value;

use super::payload::{flatten, scalar_text, ByteStream, InvokeBody, PayloadValue};

pub const CONTENT_TYPE_JSON: &str = "application/json";
pub const CONTENT_TYPE_FORM: &str = "application/x-www-form-urlencoded";
pub const CONTENT_TYPE_MULTIPART: &str = "multipart/form-data";
pub const CONTENT_TYPE_OCTET_STREAM: &str = "application/octet-stream";

/// One part of a multipart form
#[derive(Debug, Clone, PartialEq)]
pub enum MultipartPart {
    /// Plain text field
    Field(String),
    /// In-memory file part
    File { bytes: Bytes, file_name: String },
    /// File part streamed from disk at dispatch time
    Stream(ByteStream),
}

impl MultipartPart {
    pub fn is_file(&self) -> bool {
        !matches!(self, MultipartPart::Field(_))
    }
}

/// Multipart body, kept as data so it can be rebuilt for every dispatch
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MultipartForm {
    parts: Vec<(String, MultipartPart)>,
}

impl MultipartForm {
    pub fn parts(&self) -> &[(String, MultipartPart)] {
        &self.parts
    }

    pub fn part(&self, name: &str) -> Option<&MultipartPart> {
        self.parts.iter().find(|(n, _)| n == name).map(|(_, p)| p)
    }
}

/// Serialize flattened entries as `k=v&k2=v2` without percent-encoding
pub fn encode_form(payload: &InvokeBody) -> String {
    flatten(payload)
        .into_iter()
        .map(|(key, value)| match value {
            Some(value) => format!("{}={}", key, value),
            None => key,
        })
        .collect::<Vec<_>>()
        .join("&")
}

/// JSON text of `data`, an empty object when absent
pub fn encode_json(data: Option<&Value>) -> String {
    match data {
        Some(value) => value.to_string(),
        None => "{}".to_string(),
    }
}

/// One part per top-level key; nested structures are sent as JSON text
pub fn encode_multipart(payload: &InvokeBody) -> MultipartForm {
    let parts = payload
        .iter()
        .map(|(key, value)| {
            let part = match value {
                PayloadValue::Scalar(v) => MultipartPart::Field(scalar_text(v)),
                PayloadValue::Structure(v) => MultipartPart::Field(v.to_string()),
                PayloadValue::Blob(bytes) => MultipartPart::File {
                    bytes: bytes.clone(),
                    file_name: key.to_string(),
                },
                PayloadValue::Stream(stream) => MultipartPart::Stream(stream.clone()),
            };
            (key.to_string(), part)
        })
        .collect();
    MultipartForm { parts }
}
