//! Decoding of upload notifications into queue events.

use serde::Deserialize;

use crate::error::DecodeError;

/// Event name of the synthetic notification sent when a bucket is wired to the queue.
pub const TEST_EVENT: &str = "s3:TestEvent";

/// A decoded queue message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueEvent {
    /// Synthetic test notification. Never dispatched.
    Test { service: String, event: String },
    /// Zero or more uploaded objects, each dispatched independently.
    Records(Vec<ObjectRef>),
}

/// One uploaded object referenced by a notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectRef {
    pub bucket: String,
    pub key: String,
    /// Notification event name, e.g. `ObjectCreated:Put`.
    pub event_type: Option<String>,
}

#[derive(Deserialize)]
struct RawNotification {
    #[serde(rename = "Service", default)]
    service: Option<String>,
    #[serde(rename = "Event", default)]
    event: Option<String>,
    #[serde(rename = "Records", default)]
    records: Option<Vec<RawRecord>>,
}

#[derive(Deserialize)]
struct RawRecord {
    #[serde(rename = "eventName", default)]
    event_name: Option<String>,
    s3: RawS3Entity,
}

#[derive(Deserialize)]
struct RawS3Entity {
    bucket: RawBucket,
    object: RawObject,
}

#[derive(Deserialize)]
struct RawBucket {
    name: String,
}

#[derive(Deserialize)]
struct RawObject {
    key: String,
}

impl QueueEvent {
    /// Decodes a message body. Shape is discriminated once, here.
    pub fn decode(body: Option<&str>) -> Result<Self, DecodeError> {
        let body = body
            .map(str::trim)
            .filter(|b| !b.is_empty())
            .ok_or(DecodeError::EmptyBody)?;

        let value: serde_json::Value = serde_json::from_str(body)?;
        let raw: RawNotification =
            serde_json::from_value(value).map_err(|_| DecodeError::UnknownShape)?;

        // Only the test event short-circuits; any other event falls through to records.
        match raw {
            RawNotification {
                service,
                event: Some(event),
                ..
            } if event == TEST_EVENT => Ok(QueueEvent::Test {
                service: service.unwrap_or_default(),
                event,
            }),
            RawNotification {
                records: Some(records),
                ..
            } => Ok(QueueEvent::Records(
                records
                    .into_iter()
                    .map(|r| ObjectRef {
                        bucket: r.s3.bucket.name,
                        key: r.s3.object.key,
                        event_type: r.event_name,
                    })
                    .collect(),
            )),
            RawNotification {
                service,
                event: Some(event),
                ..
            } => Err(DecodeError::UnsupportedNotification {
                service: service.unwrap_or_default(),
                event,
            }),
            _ => Err(DecodeError::UnknownShape),
        }
    }
}
