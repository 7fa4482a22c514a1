use crate::constants::{DATA_FIELD, EVENT_FIELD};
use crate::decode::decode_data;
use crate::event::ParsedEvent;

#[derive(Default)]
struct SubEvent {
    name: Option<String>,
    data: Option<String>,
}

impl SubEvent {
    fn is_empty(&self) -> bool {
        self.name.is_none() && self.data.is_none()
    }

    fn push_data(&mut self, value: &str) {
        match &mut self.data {
            Some(buffer) => {
                buffer.push('\n');
                buffer.push_str(value);
            }
            None => self.data = Some(value.to_string()),
        }
    }

    fn finish(self) -> ParsedEvent {
        ParsedEvent {
            event: self.name,
            data: self.data.as_deref().map(decode_data),
        }
    }
}

/// Parses one complete frame into events.
///
/// An `event:` line opens a new sub-event once data has been collected for the
/// previous one, so a frame normally yields exactly one event and yields more
/// only when it names several. A frame carrying neither field (comments, `id:`
/// or `retry:` only) still yields a single empty event. Never fails.
pub fn parse_frame(frame: &str) -> Vec<ParsedEvent> {
    let mut events = Vec::new();
    let mut current = SubEvent::default();

    for line in frame.lines() {
        if let Some(value) = line.strip_prefix(EVENT_FIELD) {
            if current.data.is_some() {
                events.push(std::mem::take(&mut current).finish());
            }
            current.name = Some(value.trim().to_string());
        } else if let Some(value) = line.strip_prefix(DATA_FIELD) {
            let value = value.strip_prefix(' ').unwrap_or(value);
            current.push_data(value);
        }
    }

    if !current.is_empty() || events.is_empty() {
        events.push(current.finish());
    }
    events
}
