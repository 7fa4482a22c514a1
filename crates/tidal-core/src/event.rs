use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Payload of one event after decoding.
///
/// `Json` holds a successfully parsed payload (with a nested `data` string
/// already unwrapped when it was itself JSON); `Raw` holds the entity-unescaped
/// text when the payload was not JSON at all.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EventData {
    Json(Value),
    Raw(String),
}

impl EventData {
    /// Text form of the payload as it would appear on the wire after decoding.
    pub fn to_text(&self) -> String {
        match self {
            Self::Json(value) => value.to_string(),
            Self::Raw(text) => text.clone(),
        }
    }
}

/// One application event decoded from an SSE frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<EventData>,
}

impl ParsedEvent {
    pub fn new(event: Option<&str>, data: Option<EventData>) -> Self {
        Self {
            event: event.map(str::to_string),
            data,
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.event.as_deref()
    }
}

/// How decoded events are grouped into deliveries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Batching {
    /// One delivery per network chunk holding every event it completed.
    #[default]
    PerChunk,
    /// One delivery per completed frame.
    PerFrame,
}

impl Batching {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "per_chunk" | "chunk" => Some(Self::PerChunk),
            "per_frame" | "frame" => Some(Self::PerFrame),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn serializes_without_missing_fields() {
        let event = ParsedEvent::new(Some("end"), None);
        assert_eq!(
            serde_json::to_value(&event).expect("serialize"),
            json!({"event": "end"})
        );

        let event = ParsedEvent::new(None, Some(EventData::Json(json!({"foo": 1}))));
        assert_eq!(
            serde_json::to_value(&event).expect("serialize"),
            json!({"data": {"foo": 1}})
        );
    }

    #[test]
    fn batching_accepts_aliases() {
        assert_eq!(Batching::parse("per-frame"), Some(Batching::PerFrame));
        assert_eq!(Batching::parse(" CHUNK "), Some(Batching::PerChunk));
        assert_eq!(Batching::parse("never"), None);
    }
}
