//! Best-effort decoding of SSE `data:` payloads.
//!
//! Payloads arrive HTML-escaped and frequently double-encoded: an outer JSON
//! object whose `data` member is itself a JSON document serialised as a
//! string. Decoding never fails; the worst case is a [`EventData::Raw`].

use std::borrow::Cow;

use serde_json::Value;
use tracing::trace;

use crate::event::EventData;

const ENTITIES: [(&str, char); 5] = [
    ("&quot;", '"'),
    ("&amp;", '&'),
    ("&lt;", '<'),
    ("&gt;", '>'),
    ("&#39;", '\''),
];

/// Replaces the five HTML entities the backend emits, in a single pass.
///
/// Text produced by a replacement is never rescanned, so `&amp;quot;`
/// becomes `&quot;` and not `"`.
pub fn unescape_entities(input: &str) -> Cow<'_, str> {
    if !input.contains('&') {
        return Cow::Borrowed(input);
    }

    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(pos) = rest.find('&') {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];
        match ENTITIES.iter().find(|(entity, _)| tail.starts_with(entity)) {
            Some((entity, ch)) => {
                out.push(*ch);
                rest = &tail[entity.len()..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    Cow::Owned(out)
}

/// Decodes one raw `data:` payload.
pub fn decode_data(raw: &str) -> EventData {
    let text = unescape_entities(raw);
    match serde_json::from_str::<Value>(&text) {
        Ok(mut value) => {
            unwrap_nested_data(&mut value);
            EventData::Json(value)
        }
        Err(err) => {
            trace!(event = "sse_data_raw", error = %err, len = text.len());
            EventData::Raw(text.into_owned())
        }
    }
}

/// Parses `value.data` in place when it is a string holding a JSON object.
fn unwrap_nested_data(value: &mut Value) {
    let Some(slot) = value.as_object_mut().and_then(|map| map.get_mut("data")) else {
        return;
    };
    let parsed = match &*slot {
        Value::String(inner) if inner.contains('{') => match serde_json::from_str::<Value>(inner) {
            Ok(parsed) => Some(parsed),
            Err(err) => {
                trace!(event = "sse_nested_data_kept", error = %err);
                None
            }
        },
        _ => None,
    };
    if let Some(parsed) = parsed {
        *slot = parsed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unescapes_known_entities() {
        assert_eq!(
            unescape_entities("&lt;b&gt; &quot;x&quot; &#39;y&#39; a&amp;b"),
            "<b> \"x\" 'y' a&b"
        );
    }

    #[test]
    fn unescape_is_single_pass() {
        assert_eq!(unescape_entities("&amp;quot;"), "&quot;");
        assert_eq!(unescape_entities("&amp;lt;"), "&lt;");
    }

    #[test]
    fn unknown_entities_are_left_alone() {
        assert_eq!(unescape_entities("&nbsp; & &"), "&nbsp; & &");
        assert!(matches!(unescape_entities("plain"), Cow::Borrowed("plain")));
    }

    #[test]
    fn nested_json_string_is_unwrapped() {
        let decoded = decode_data(r#"{"data":"{\"foo\":1}"}"#);
        assert_eq!(decoded, EventData::Json(json!({"data": {"foo": 1}})));
    }

    #[test]
    fn escaped_payload_is_parsed() {
        let decoded = decode_data("{&quot;content&quot;:&quot;a &lt; b&quot;}");
        assert_eq!(decoded, EventData::Json(json!({"content": "a < b"})));
    }

    #[test]
    fn broken_inner_json_keeps_string() {
        let decoded = decode_data(r#"{"data":"{not json"}"#);
        assert_eq!(decoded, EventData::Json(json!({"data": "{not json"})));
    }

    #[test]
    fn inner_string_without_brace_is_untouched() {
        let decoded = decode_data(r#"{"data":"[1,2]"}"#);
        assert_eq!(decoded, EventData::Json(json!({"data": "[1,2]"})));
    }

    #[test]
    fn non_json_payload_is_raw() {
        assert_eq!(decode_data("hello"), EventData::Raw("hello".to_string()));
        assert_eq!(
            decode_data("&quot;open"),
            EventData::Raw("\"open".to_string())
        );
    }

    #[test]
    fn scalar_json_is_kept() {
        assert_eq!(decode_data("42"), EventData::Json(json!(42)));
        assert_eq!(decode_data("{}"), EventData::Json(json!({})));
    }
}
