// Request payload model
// Tagged payload values and the flattening used by form-style encodings

use bytes::Bytes;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

use crate::error::ApiError;

/// A file-backed byte stream
///
/// The file is opened anew on every dispatch, so a request carrying a stream
/// can be replayed after a credential refresh.
#[derive(Debug, Clone, PartialEq)]
pub struct ByteStream {
    path: PathBuf,
    file_name: Option<String>,
}

impl ByteStream {
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned());
        Self { path, file_name }
    }

    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = Some(file_name.into());
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file_name(&self) -> Option<&str> {
        self.file_name.as_deref()
    }
}

/// A single value of an [`InvokeBody`]
#[derive(Debug, Clone, PartialEq)]
pub enum PayloadValue {
    /// String, number, boolean or null
    Scalar(Value),
    /// Object or array, flattened by form encodings
    Structure(Value),
    /// In-memory bytes
    Blob(Bytes),
    /// File contents streamed at dispatch time
    Stream(ByteStream),
}

impl PayloadValue {
    pub fn is_binary(&self) -> bool {
        matches!(self, PayloadValue::Blob(_) | PayloadValue::Stream(_))
    }
}

impl From<Value> for PayloadValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(_) | Value::Array(_) => PayloadValue::Structure(value),
            scalar => PayloadValue::Scalar(scalar),
        }
    }
}

impl From<&str> for PayloadValue {
    fn from(value: &str) -> Self {
        PayloadValue::Scalar(Value::String(value.to_string()))
    }
}

impl From<String> for PayloadValue {
    fn from(value: String) -> Self {
        PayloadValue::Scalar(Value::String(value))
    }
}

impl From<Bytes> for PayloadValue {
    fn from(value: Bytes) -> Self {
        PayloadValue::Blob(value)
    }
}

impl From<Vec<u8>> for PayloadValue {
    fn from(value: Vec<u8>) -> Self {
        PayloadValue::Blob(Bytes::from(value))
    }
}

impl From<ByteStream> for PayloadValue {
    fn from(value: ByteStream) -> Self {
        PayloadValue::Stream(value)
    }
}

/// Ordered key/value payload of a call
///
/// Keys keep their first insertion position; inserting an existing key
/// replaces its value in place.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InvokeBody {
    entries: Vec<(String, PayloadValue)>,
}

impl InvokeBody {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, key: impl Into<String>, value: impl Into<PayloadValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<PayloadValue>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&PayloadValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PayloadValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// True iff at least one top-level value is a blob or a byte stream
    pub fn contains_binary(&self) -> bool {
        self.entries.iter().any(|(_, v)| v.is_binary())
    }

    /// Build a payload from a JSON object (`null` yields an empty payload)
    pub fn from_json(value: Value) -> Result<Self, ApiError> {
        match value {
            Value::Null => Ok(Self::new()),
            Value::Object(map) => Ok(Self::from(map)),
            other => Err(ApiError::InvalidRequest(format!(
                "payload must be a JSON object, got {}",
                json_kind(&other)
            ))),
        }
    }

    /// JSON view of the textual entries; binary entries are skipped
    pub fn to_json(&self) -> Value {
        let mut map = Map::new();
        for (key, value) in &self.entries {
            match value {
                PayloadValue::Scalar(v) | PayloadValue::Structure(v) => {
                    map.insert(key.clone(), v.clone());
                }
                PayloadValue::Blob(_) | PayloadValue::Stream(_) => {
                    tracing::warn!(key = %key, "Binary payload entry dropped from JSON body");
                }
            }
        }
        Value::Object(map)
    }
}

impl From<Map<String, Value>> for InvokeBody {
    fn from(map: Map<String, Value>) -> Self {
        let mut body = InvokeBody::new();
        for (key, value) in map {
            body.insert(key, value);
        }
        body
    }
}

/// Free-function form of [`InvokeBody::contains_binary`]
pub fn contains_binary(payload: &InvokeBody) -> bool {
    payload.contains_binary()
}

/// A flattened leaf; `None` marks a null value (serialized as a bare key)
pub type FlatEntry = (String, Option<String>);

/// Flatten a payload into single-level composite keys
///
/// Nested objects join with `.` (`{a:{b:1}}` -> `a.b`), array elements are
/// indexed (`k.0`, `k.1`). Every leaf scalar yields exactly one entry, in
/// first-seen key order. Binary entries have no textual form and are skipped.
pub fn flatten(payload: &InvokeBody) -> Vec<FlatEntry> {
    let mut out = Vec::new();
    for (key, value) in payload.iter() {
        match value {
            PayloadValue::Scalar(v) | PayloadValue::Structure(v) => {
                flatten_value(key.to_string(), v, &mut out)
            }
            PayloadValue::Blob(_) | PayloadValue::Stream(_) => {
                tracing::warn!(key = %key, "Binary payload entry cannot be form-encoded, skipping");
            }
        }
    }
    out
}

fn flatten_value(prefix: String, value: &Value, out: &mut Vec<FlatEntry>) {
    match value {
        Value::Object(map) => {
            for (k, v) in map {
                flatten_value(format!("{}.{}", prefix, k), v, out);
            }
        }
        Value::Array(items) => {
            for (i, v) in items.iter().enumerate() {
                flatten_value(format!("{}.{}", prefix, i), v, out);
            }
        }
        Value::Null => out.push((prefix, None)),
        scalar => out.push((prefix, Some(scalar_text(scalar)))),
    }
}

/// Textual form of a scalar: strings unquoted, everything else as JSON
pub(crate) fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
