//! Search document built from one record payload.

use chrono::DateTime;
use md5::{Digest, Md5};
use serde_json::{Map, Value};
use tracing::warn;

/// Width of a metric routing bucket.
pub const METRIC_ROUTING_WINDOW_SECS: i64 = 7200;

pub(crate) const FIELD_ID: &str = "__id";
pub(crate) const FIELD_PIPELINE_ID: &str = "__pipeline_id";
pub(crate) const FIELD_INDEX_BASE: &str = "__index_base";
pub(crate) const FIELD_DATA_TYPE: &str = "__data_type";
pub(crate) const FIELD_CATEGORY: &str = "__category";
pub(crate) const FIELD_WRITE_TIME: &str = "__write_time";
pub(crate) const FIELD_TIMESTAMP: &str = "@timestamp";
const FIELD_RAW_CATEGORY: &str = "category";
const FIELD_MESSAGE: &str = "message";
const FIELD_TSID: &str = "__tsid";
const FIELD_ROUTING: &str = "__routing";
const FIELD_LABELS: &str = "labels";
const FIELD_PROMETHEUS: &str = "prometheus";
const FIELD_START_TIME: &str = "StartTime";
const FIELD_END_TIME: &str = "EndTime";
const FIELD_DURATION: &str = "Duration";
const FIELD_DERIVED_DURATION: &str = "@Duration";
const FIELD_SPAN_CONTEXT: &str = "SpanContext";
const FIELD_TRACE_ID: &str = "TraceID";

/// A JSON object being enriched before indexing.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    fields: Map<String, Value>,
}

impl Document {
    /// Parse a record payload.
    ///
    /// Anything that isn't a JSON object is wrapped as `{"message": <payload>}`.
    /// Returns the document together with the payload bytes it was read
    /// from, which is what gets republished.
    pub fn from_payload(payload: &[u8]) -> (Self, Vec<u8>) {
        if let Ok(Value::Object(fields)) = serde_json::from_slice::<Value>(payload) {
            return (Self { fields }, payload.to_vec());
        }

        let mut fields = Map::new();
        fields.insert(
            FIELD_MESSAGE.to_string(),
            Value::String(String::from_utf8_lossy(payload).into_owned()),
        );
        let document = Self { fields };
        let wrapped = document.to_vec();
        (document, wrapped)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Non-empty string value of `key`.
    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.fields
            .get(key)
            .and_then(Value::as_str)
            .filter(|value| !value.is_empty())
    }

    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        self.fields.insert(key.to_string(), value.into());
    }

    /// `key` as a non-empty string, filled with `default` when missing.
    pub fn str_or_insert(&mut self, key: &str, default: &str) -> String {
        match self.str_field(key) {
            Some(value) => value.to_string(),
            None => {
                self.set(key, default);
                default.to_string()
            }
        }
    }

    /// Resolve the document category: `__category`, then `category`, then
    /// `default`. The result is written back into `__category`.
    pub fn resolve_category(&mut self, default: &str) -> String {
        let category = match self
            .str_field(FIELD_CATEGORY)
            .or_else(|| self.str_field(FIELD_RAW_CATEGORY))
        {
            Some(found) => {
                if found != default {
                    warn!(
                        category = %found,
                        index_base_category = %default,
                        "Document category differs from its index base"
                    );
                }
                found.to_string()
            }
            None => default.to_string(),
        };
        self.set(FIELD_CATEGORY, category.as_str());
        category
    }

    /// Rewrite `@timestamp` to epoch milliseconds and return it.
    ///
    /// Missing, empty or unparsable values fall back to `write_time`. RFC 3339
    /// strings and integer strings are converted.
    pub fn normalize_timestamp(&mut self, write_time: i64) -> i64 {
        let timestamp = match self.fields.get(FIELD_TIMESTAMP) {
            Some(Value::Number(n)) => n.as_i64().unwrap_or(write_time),
            Some(Value::String(s)) if !s.is_empty() => DateTime::parse_from_rfc3339(s)
                .map(|t| t.timestamp_millis())
                .or_else(|_| s.trim().parse::<i64>())
                .unwrap_or(write_time),
            _ => write_time,
        };
        self.set(FIELD_TIMESTAMP, timestamp);
        timestamp
    }

    /// Tag a metric sample with its series id and return its routing key.
    ///
    /// `__tsid` is the md5 of the labels sorted by name and joined as
    /// `k=v,k=v`. Samples are routed by two-hour bucket of `@timestamp`, and
    /// `__routing` records `{tsid}-{bucket}`. Labels found under
    /// `prometheus.labels` are moved to the top level first.
    pub fn apply_metric_routing(&mut self) -> Option<String> {
        let labels = self.labels_str();
        let tsid = hex::encode(Md5::digest(labels.as_bytes()));
        self.set(FIELD_TSID, tsid.as_str());

        let timestamp = self.fields.get(FIELD_TIMESTAMP).and_then(Value::as_i64)?;
        let routing = (timestamp / 1000 / METRIC_ROUTING_WINDOW_SECS).to_string();
        self.set(FIELD_ROUTING, format!("{}-{}", tsid, routing));
        Some(routing)
    }

    fn labels_str(&mut self) -> String {
        if !self.fields.contains_key(FIELD_LABELS) {
            let moved = match self.fields.get_mut(FIELD_PROMETHEUS) {
                Some(Value::Object(prometheus)) => prometheus.remove(FIELD_LABELS),
                _ => None,
            };
            match moved {
                Some(labels) => {
                    self.fields.insert(FIELD_LABELS.to_string(), labels);
                }
                None => {
                    warn!("Metric document has no labels");
                    return String::new();
                }
            }
        }

        let Some(Value::Object(labels)) = self.fields.get(FIELD_LABELS) else {
            warn!("Metric labels are not an object");
            return String::new();
        };

        let mut pairs: Vec<(&String, String)> = labels
            .iter()
            .map(|(name, value)| {
                let value = match value {
                    Value::String(s) => s.clone(),
                    Value::Number(_) | Value::Bool(_) => value.to_string(),
                    _ => String::new(),
                };
                (name, value)
            })
            .collect();
        pairs.sort_by(|a, b| a.0.cmp(b.0));
        pairs
            .iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Derive span timing fields and return the trace id as routing key.
    ///
    /// `StartTime` and `EndTime` are in nanoseconds. `@timestamp` becomes the
    /// start in milliseconds and `@Duration` is filled when the span has no
    /// `Duration` of its own.
    pub fn apply_trace_routing(&mut self) -> Option<String> {
        if let Some(start) = self.fields.get(FIELD_START_TIME).and_then(Value::as_i64) {
            self.set(FIELD_TIMESTAMP, start / 1000 / 1000);

            if !self.fields.contains_key(FIELD_DURATION) {
                // Skipped when the span bounds are too far apart for an i64.
                let duration = self
                    .fields
                    .get(FIELD_END_TIME)
                    .and_then(Value::as_i64)
                    .and_then(|end| end.checked_sub(start));
                if let Some(duration) = duration {
                    self.set(FIELD_DERIVED_DURATION, duration);
                }
            }
        }

        self.fields
            .get(FIELD_SPAN_CONTEXT)
            .and_then(|context| context.get(FIELD_TRACE_ID))
            .and_then(Value::as_str)
            .map(str::to_string)
    }

    /// Serialized document.
    pub fn to_vec(&self) -> Vec<u8> {
        // A map of JSON values always serializes.
        serde_json::to_vec(&self.fields).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        let bytes = serde_json::to_vec(&value).unwrap();
        Document::from_payload(&bytes).0
    }

    #[test]
    fn test_invalid_json_is_wrapped() {
        let (document, payload) = Document::from_payload(b"plain text line");

        assert_eq!(document.str_field("message"), Some("plain text line"));
        let republished: Value = serde_json::from_slice(&payload).unwrap();
        assert_eq!(republished, json!({"message": "plain text line"}));
    }

    #[test]
    fn test_non_object_json_is_wrapped() {
        let (document, _) = Document::from_payload(b"[1,2]");
        assert_eq!(document.str_field("message"), Some("[1,2]"));
    }

    #[test]
    fn test_object_payload_is_kept_verbatim() {
        let raw = br#"{"b":1,  "a":"x"}"#;
        let (document, payload) = Document::from_payload(raw);

        assert_eq!(payload, raw.to_vec());
        assert_eq!(document.get("b"), Some(&json!(1)));
    }

    #[test]
    fn test_timestamp_normalization() {
        let write_time = 1_700_000_000_123;

        let mut missing = doc(json!({}));
        assert_eq!(missing.normalize_timestamp(write_time), write_time);

        let mut rfc3339 = doc(json!({"@timestamp": "2024-01-02T03:04:05.678Z"}));
        assert_eq!(rfc3339.normalize_timestamp(write_time), 1_704_164_645_678);
        assert_eq!(rfc3339.get("@timestamp"), Some(&json!(1_704_164_645_678i64)));

        let mut integer = doc(json!({"@timestamp": 1_600_000_000_000i64}));
        assert_eq!(integer.normalize_timestamp(write_time), 1_600_000_000_000);

        let mut numeric_string = doc(json!({"@timestamp": "1600000000000"}));
        assert_eq!(numeric_string.normalize_timestamp(write_time), 1_600_000_000_000);

        let mut garbage = doc(json!({"@timestamp": "yesterday"}));
        assert_eq!(garbage.normalize_timestamp(write_time), write_time);

        let mut float = doc(json!({"@timestamp": 1.5}));
        assert_eq!(float.normalize_timestamp(write_time), write_time);
    }

    #[test]
    fn test_category_precedence() {
        let mut explicit = doc(json!({"__category": "metric", "category": "trace"}));
        assert_eq!(explicit.resolve_category("log"), "metric");

        let mut raw = doc(json!({"category": "trace"}));
        assert_eq!(raw.resolve_category("log"), "trace");
        assert_eq!(raw.str_field("__category"), Some("trace"));

        let mut fallback = doc(json!({}));
        assert_eq!(fallback.resolve_category("log"), "log");
        assert_eq!(fallback.str_field("__category"), Some("log"));
    }

    #[test]
    fn test_metric_routing() {
        let mut metric = doc(json!({
            "@timestamp": 7_200_000i64,
            "labels": {"job": "api", "instance": "10.0.0.1", "code": 200}
        }));

        let routing = metric.apply_metric_routing();

        let expected_tsid = hex::encode(Md5::digest(b"code=200,instance=10.0.0.1,job=api"));
        assert_eq!(routing.as_deref(), Some("1"));
        assert_eq!(metric.str_field("__tsid"), Some(expected_tsid.as_str()));
        assert_eq!(
            metric.str_field("__routing"),
            Some(format!("{}-1", expected_tsid).as_str())
        );
    }

    #[test]
    fn test_metric_labels_moved_from_prometheus() {
        let mut metric = doc(json!({
            "@timestamp": 0,
            "prometheus": {"labels": {"job": "api"}, "other": 1}
        }));

        metric.apply_metric_routing();

        assert_eq!(metric.get("labels"), Some(&json!({"job": "api"})));
        assert_eq!(metric.get("prometheus"), Some(&json!({"other": 1})));
    }

    #[test]
    fn test_metric_without_labels_hashes_empty_string() {
        let mut metric = doc(json!({"@timestamp": 0}));
        metric.apply_metric_routing();

        let expected = hex::encode(Md5::digest(b""));
        assert_eq!(metric.str_field("__tsid"), Some(expected.as_str()));
    }

    #[test]
    fn test_trace_routing() {
        let mut span = doc(json!({
            "StartTime": 1_700_000_000_000_000_000i64,
            "EndTime": 1_700_000_000_500_000_000i64,
            "SpanContext": {"TraceID": "abc123"}
        }));

        let routing = span.apply_trace_routing();

        assert_eq!(routing.as_deref(), Some("abc123"));
        assert_eq!(span.get("@timestamp"), Some(&json!(1_700_000_000_000i64)));
        assert_eq!(span.get("@Duration"), Some(&json!(500_000_000i64)));
    }

    #[test]
    fn test_trace_keeps_explicit_duration() {
        let mut span = doc(json!({
            "StartTime": 1_000_000i64,
            "EndTime": 3_000_000i64,
            "Duration": 7
        }));

        assert_eq!(span.apply_trace_routing(), None);
        assert!(span.get("@Duration").is_none());
        assert_eq!(span.get("@timestamp"), Some(&json!(1)));
    }

    #[test]
    fn test_trace_duration_out_of_range_is_skipped() {
        let mut span = doc(json!({
            "StartTime": -1_000_000i64,
            "EndTime": i64::MAX,
            "SpanContext": {"TraceID": "abc123"}
        }));

        assert_eq!(span.apply_trace_routing().as_deref(), Some("abc123"));
        assert!(span.get("@Duration").is_none());
        assert_eq!(span.get("@timestamp"), Some(&json!(-1)));
    }

    #[test]
    fn test_trace_with_non_numeric_start_still_routes() {
        let mut span = doc(json!({
            "StartTime": "yesterday",
            "SpanContext": {"TraceID": "abc123"}
        }));

        assert_eq!(span.apply_trace_routing().as_deref(), Some("abc123"));
        assert!(span.get("@Duration").is_none());
    }
}
