//! # Wire Mapping
//!
//! The envelope and user metadata ride as AMQP headers; the payload is
//! self-describing JSON. Encode and decode both live here so producer
//! and consumer processes cannot disagree about the format.

use lapin::types::{AMQPValue, FieldTable, LongString, ShortString};
use lapin::BasicProperties;
use uuid::Uuid;

use warden_messaging::message::{Envelope, Metadata};

/// Header carrying [`Envelope::message_id`].
pub const MESSAGE_ID_HEADER: &str = "x-message-id";
/// Header carrying [`Envelope::trace_id`].
pub const TRACE_ID_HEADER: &str = "x-trace-id";
/// Header carrying [`Envelope::reference_id`].
pub const REFERENCE_ID_HEADER: &str = "x-reference-id";
/// Header carrying [`Envelope::created_at`].
pub const CREATED_AT_HEADER: &str = "x-created-at";
/// Header carrying [`Envelope::failure_count`].
pub const FAILURE_COUNT_HEADER: &str = "x-failure-count";

/// MIME type of every payload this transport produces.
pub const CONTENT_TYPE: &str = "application/json";

/// Build publish properties from an envelope plus user metadata.
///
/// User metadata keys that collide with the reserved `x-` envelope
/// headers are overwritten by the envelope values; the envelope is
/// authoritative.
#[must_use]
pub fn encode_properties(envelope: &Envelope, metadata: &Metadata) -> BasicProperties {
    let mut headers = FieldTable::default();

    for (key, value) in metadata {
        headers.insert(
            ShortString::from(key.as_str()),
            AMQPValue::LongString(LongString::from(value.as_str())),
        );
    }

    headers.insert(
        ShortString::from(MESSAGE_ID_HEADER),
        AMQPValue::LongString(LongString::from(envelope.message_id.to_string())),
    );
    if let Some(trace_id) = &envelope.trace_id {
        headers.insert(
            ShortString::from(TRACE_ID_HEADER),
            AMQPValue::LongString(LongString::from(trace_id.as_str())),
        );
    }
    if let Some(reference_id) = &envelope.reference_id {
        headers.insert(
            ShortString::from(REFERENCE_ID_HEADER),
            AMQPValue::LongString(LongString::from(reference_id.as_str())),
        );
    }
    headers.insert(
        ShortString::from(CREATED_AT_HEADER),
        AMQPValue::Timestamp(envelope.created_at),
    );
    headers.insert(
        ShortString::from(FAILURE_COUNT_HEADER),
        AMQPValue::LongUInt(envelope.failure_count),
    );

    BasicProperties::default()
        .with_content_type(ShortString::from(CONTENT_TYPE))
        .with_message_id(ShortString::from(envelope.message_id.to_string()))
        .with_headers(headers)
}

/// Split received properties back into envelope and metadata.
///
/// Absent or foreign-typed envelope headers fall back to a fresh
/// envelope's fields (zero failure count, new id), so frames published
/// by other producers remain consumable. Every non-reserved header
/// becomes a metadata entry.
#[must_use]
pub fn decode_properties(properties: &BasicProperties) -> (Envelope, Metadata) {
    let mut envelope = Envelope::new();
    let mut metadata = Metadata::new();

    let Some(headers) = properties.headers() else {
        return (envelope, metadata);
    };

    for (key, value) in headers.inner() {
        match key.as_str() {
            MESSAGE_ID_HEADER => {
                if let Some(id) = header_str(value).and_then(|s| Uuid::parse_str(&s).ok()) {
                    envelope.message_id = id;
                }
            }
            TRACE_ID_HEADER => envelope.trace_id = header_str(value),
            REFERENCE_ID_HEADER => envelope.reference_id = header_str(value),
            CREATED_AT_HEADER => {
                if let Some(at) = header_u64(value) {
                    envelope.created_at = at;
                }
            }
            FAILURE_COUNT_HEADER => {
                if let Some(count) = header_u64(value) {
                    envelope.failure_count = u32::try_from(count).unwrap_or(u32::MAX);
                }
            }
            _ => {
                if let Some(text) = header_str(value) {
                    metadata.insert(key.as_str().to_string(), text);
                }
            }
        }
    }

    (envelope, metadata)
}

fn header_str(value: &AMQPValue) -> Option<String> {
    match value {
        AMQPValue::LongString(s) => Some(String::from_utf8_lossy(s.as_bytes()).into_owned()),
        AMQPValue::ShortString(s) => Some(s.as_str().to_string()),
        _ => None,
    }
}

fn header_u64(value: &AMQPValue) -> Option<u64> {
    match value {
        AMQPValue::Timestamp(v) => Some(*v),
        AMQPValue::LongUInt(v) => Some(u64::from(*v)),
        AMQPValue::LongLongInt(v) => u64::try_from(*v).ok(),
        AMQPValue::LongInt(v) => u64::try_from(*v).ok(),
        AMQPValue::ShortUInt(v) => Some(u64::from(*v)),
        _ => None,
    }
}
