//! Owned record types passed between the consumer, the processor and the
//! transactional publisher.

use rdkafka::message::{Headers, Message};

/// A record read from the input topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundRecord {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    /// Broker or producer timestamp in epoch milliseconds.
    pub timestamp_ms: Option<i64>,
    pub key: Option<Vec<u8>>,
    pub payload: Option<Vec<u8>>,
    pub headers: Vec<RecordHeader>,
}

impl InboundRecord {
    /// Copy an rdkafka message into an owned record.
    pub fn from_message<M: Message>(message: &M) -> Self {
        let headers = message
            .headers()
            .map(|headers| {
                headers
                    .iter()
                    .map(|header| RecordHeader {
                        key: header.key.to_string(),
                        value: header.value.map(<[u8]>::to_vec).unwrap_or_default(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        Self {
            topic: message.topic().to_string(),
            partition: message.partition(),
            offset: message.offset(),
            timestamp_ms: message.timestamp().to_millis(),
            key: message.key().map(<[u8]>::to_vec),
            payload: message.payload().map(<[u8]>::to_vec),
            headers,
        }
    }

    pub fn payload_len(&self) -> usize {
        self.payload.as_ref().map_or(0, Vec::len)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordHeader {
    pub key: String,
    pub value: Vec<u8>,
}

/// A record to publish inside a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundRecord {
    pub topic: String,
    pub key: Option<Vec<u8>>,
    pub payload: Vec<u8>,
    pub headers: Vec<RecordHeader>,
}

impl OutboundRecord {
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            key: None,
            payload: payload.into(),
            headers: Vec::new(),
        }
    }

    pub fn with_key(mut self, key: impl Into<Vec<u8>>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        self.headers.push(RecordHeader {
            key: key.into(),
            value: value.into(),
        });
        self
    }

    /// Value of the first header named `key`.
    pub fn header(&self, key: &str) -> Option<&[u8]> {
        self.headers
            .iter()
            .find(|header| header.key == key)
            .map(|header| header.value.as_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rdkafka::message::{Header, OwnedHeaders, OwnedMessage, Timestamp};

    #[test]
    fn test_from_message_copies_fields_and_headers() {
        let headers = OwnedHeaders::new().insert(Header {
            key: "__pipeline_id",
            value: Some("p1"),
        });
        let message = OwnedMessage::new(
            Some(br#"{"a":1}"#.to_vec()),
            Some(b"k".to_vec()),
            "input".to_string(),
            Timestamp::CreateTime(1_700_000_000_000),
            3,
            42,
            Some(headers),
        );

        let record = InboundRecord::from_message(&message);

        assert_eq!(record.topic, "input");
        assert_eq!(record.partition, 3);
        assert_eq!(record.offset, 42);
        assert_eq!(record.timestamp_ms, Some(1_700_000_000_000));
        assert_eq!(record.key.as_deref(), Some(&b"k"[..]));
        assert_eq!(record.payload_len(), 7);
        assert_eq!(record.headers[0].key, "__pipeline_id");
        assert_eq!(record.headers[0].value, b"p1");
    }

    #[test]
    fn test_outbound_header_lookup() {
        let record = OutboundRecord::new("out", b"{}".to_vec()).with_header("__pipeline_id", "p1");
        assert_eq!(record.header("__pipeline_id"), Some(&b"p1"[..]));
        assert_eq!(record.header("missing"), None);
    }
}
