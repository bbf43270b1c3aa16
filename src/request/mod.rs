// Request module
// Builder, content encoders and response decoders of the request pipeline

mod builder;
mod decoder;
mod encoding;
mod payload;

pub use builder::{Headers, RequestBody, RequestBuilder, RequestDescriptor, TransportOptions};
pub use decoder::{
    BinaryStrategy, BodyStream, Decoded, RawResponse, ResponseBody, ResponseDecoder,
    BINARY_FALLBACK_CHAIN,
};
pub use encoding::{
    encode_form, encode_json, encode_multipart, MultipartForm, MultipartPart, CONTENT_TYPE_FORM,
    CONTENT_TYPE_JSON, CONTENT_TYPE_MULTIPART, CONTENT_TYPE_OCTET_STREAM,
};
pub use payload::{contains_binary, flatten, ByteStream, FlatEntry, InvokeBody, PayloadValue};
