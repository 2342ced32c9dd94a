use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;

/// Free-form attribute map attached to a metric.
pub type Attributes = BTreeMap<String, AttributeValue>;

/// Resource identifier map attached to a metric (e.g. deployment/pod identity).
pub type Resources = BTreeMap<String, String>;

/// A scalar attribute value.
///
/// Attributes are string-keyed but may carry string or numeric values. The
/// variants serialize untagged, so an attribute appears on the wire as a plain
/// JSON scalar.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AttributeValue {
    /// A string value.
    String(String),
    /// A signed integer value.
    Integer(i64),
    /// A floating-point value.
    Float(f64),
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::String(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        AttributeValue::String(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        AttributeValue::Integer(value)
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        AttributeValue::Float(value)
    }
}

/// The wire representation of a single metric, as accepted by the ffwd agent.
///
/// Over the datagram transport, one JSON-encoded `MetricPayload` is sent per
/// datagram. Over HTTP, payloads are first converted to [`HttpPoint`]s and
/// posted as a batch.
///
/// `attributes` and `resources` are deliberately kept as separate maps, so
/// attribute keys can never collide with resource keys.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MetricPayload {
    /// The owning service identifier.
    pub key: String,
    /// The current metric value.
    pub value: f64,
    /// Merged attributes, including the `what` and `metric_type` entries.
    pub attributes: Attributes,
    /// Resource identifiers.
    pub resources: Resources,
    /// Legacy free-form tag list, kept for agent compatibility.
    pub tags: Vec<String>,
    /// Record type marker; always the literal `"metric"`.
    #[serde(rename = "type")]
    pub record_type: &'static str,
}

/// A single point of the HTTP request body.
///
/// The HTTP endpoint uses different field names than the datagram schema:
/// attributes post as `tags`, resources as `resource`, and each point carries
/// a millisecond timestamp.
#[derive(Debug, Serialize)]
pub(crate) struct HttpPoint<'a> {
    key: &'a str,
    tags: &'a Attributes,
    resource: &'a Resources,
    value: f64,
    timestamp: u64,
}

/// The HTTP request body: all points of one send, batched.
#[derive(Debug, Serialize)]
pub(crate) struct HttpBody<'a> {
    points: Vec<HttpPoint<'a>>,
}

impl<'a> HttpBody<'a> {
    pub(crate) fn from_payloads(payloads: &'a [MetricPayload]) -> Self {
        let timestamp = unix_timestamp_millis();
        let points = payloads
            .iter()
            .map(|payload| HttpPoint {
                key: &payload.key,
                tags: &payload.attributes,
                resource: &payload.resources,
                value: payload.value,
                timestamp,
            })
            .collect();

        HttpBody { points }
    }
}

fn unix_timestamp_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}
