//! Incremental splitting of an SSE byte stream into frames.

use crate::constants::FRAME_DELIMITER;

/// Stateful splitter turning arbitrary network chunks into complete frames.
///
/// Bytes are decoded as UTF-8 in streaming mode: an incomplete multi-byte
/// sequence at the end of a chunk is carried over to the next one, and
/// invalid sequences become U+FFFD. `\r\n` and lone `\r` line endings are
/// normalised to `\n`. A frame is only returned once its terminating blank
/// line has been seen; everything after the last delimiter stays buffered.
#[derive(Debug, Default, Clone)]
pub struct FrameDecoder {
    buffer: String,
    /// Bytes of `buffer` already searched for a delimiter.
    scanned: usize,
    carry: Vec<u8>,
    pending_cr: bool,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one chunk and returns every frame it completed, in order.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let text = self.decode_utf8(chunk);
        self.push_text(text)
    }

    /// Ends the stream, returning the buffered remainder when it holds
    /// anything besides whitespace.
    pub fn finish(&mut self) -> Option<String> {
        if !self.carry.is_empty() {
            let carry = std::mem::take(&mut self.carry);
            self.buffer.push_str(&String::from_utf8_lossy(&carry));
        }
        if std::mem::take(&mut self.pending_cr) {
            self.buffer.push('\n');
        }
        self.scanned = 0;
        let rest = std::mem::take(&mut self.buffer);
        if rest.trim().is_empty() {
            None
        } else {
            Some(rest)
        }
    }

    /// Text received after the last complete frame.
    pub fn buffered(&self) -> &str {
        &self.buffer
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty() && self.carry.is_empty() && !self.pending_cr
    }

    fn push_text(&mut self, text: String) -> Vec<String> {
        let text = self.normalize_newlines(text);
        self.buffer.push_str(&text);

        let delimiter = FRAME_DELIMITER.as_bytes();
        // A delimiter may straddle the previous push, so back up by one byte less
        // than its length.
        let mut from = self.scanned.saturating_sub(delimiter.len() - 1);
        let mut consumed = 0;
        let mut frames = Vec::new();
        while let Some(pos) = find_bytes(&self.buffer.as_bytes()[from..], delimiter) {
            let end = from + pos;
            let frame = &self.buffer[consumed..end];
            if !frame.trim().is_empty() {
                frames.push(frame.to_string());
            }
            consumed = end + delimiter.len();
            from = consumed;
        }
        self.buffer.drain(..consumed);
        self.scanned = self.buffer.len();
        frames
    }

    fn decode_utf8(&mut self, chunk: &[u8]) -> String {
        let mut bytes = std::mem::take(&mut self.carry);
        bytes.extend_from_slice(chunk);

        let mut out = String::with_capacity(bytes.len());
        let mut rest = bytes.as_slice();
        loop {
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    out.push_str(valid);
                    break;
                }
                Err(err) => {
                    let (valid, after) = rest.split_at(err.valid_up_to());
                    out.push_str(&String::from_utf8_lossy(valid));
                    match err.error_len() {
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            rest = &after[len..];
                        }
                        None => {
                            self.carry = after.to_vec();
                            break;
                        }
                    }
                }
            }
        }
        out
    }

    fn normalize_newlines(&mut self, text: String) -> String {
        let mut text = if std::mem::take(&mut self.pending_cr) {
            let mut joined = String::with_capacity(text.len() + 1);
            joined.push('\r');
            joined.push_str(&text);
            joined
        } else {
            text
        };
        // A trailing CR may be the first half of a CRLF split across chunks.
        if text.ends_with('\r') {
            text.pop();
            self.pending_cr = true;
        }
        if text.contains('\r') {
            text.replace("\r\n", "\n").replace('\r', "\n")
        } else {
            text
        }
    }
}

fn find_bytes(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn complete_frames_are_split() {
        let mut decoder = FrameDecoder::new();
        let frames = decoder.push(b"event: a\ndata: 1\n\nevent: b\ndata: 2\n\n");
        assert_eq!(frames, vec!["event: a\ndata: 1", "event: b\ndata: 2"]);
        assert!(decoder.is_empty());
    }

    #[test]
    fn partial_frame_is_retained() {
        let mut decoder = FrameDecoder::new();
        assert!(decoder.push(b"event: a\ndata: ").is_empty());
        assert_eq!(decoder.buffered(), "event: a\ndata: ");
        assert_eq!(decoder.push(b"hello\n\n"), vec!["event: a\ndata: hello"]);
    }

    #[test]
    fn delimiter_split_across_chunks() {
        let mut decoder = FrameDecoder::new();
        assert!(decoder.push(b"data: x\n").is_empty());
        assert_eq!(decoder.push(b"\ndata: y"), vec!["data: x"]);
        assert_eq!(decoder.finish().as_deref(), Some("data: y"));
    }

    #[test]
    fn multibyte_character_split_across_chunks() {
        let bytes = "data: héllo\n\n".as_bytes();
        let split = bytes
            .iter()
            .position(|b| *b == 0xC3)
            .expect("two byte sequence")
            + 1;
        let mut decoder = FrameDecoder::new();
        assert!(decoder.push(&bytes[..split]).is_empty());
        assert_eq!(decoder.push(&bytes[split..]), vec!["data: héllo"]);
    }

    #[test]
    fn invalid_bytes_become_replacement_characters() {
        let mut decoder = FrameDecoder::new();
        let frames = decoder.push(b"data: a\xFFb\n\n");
        assert_eq!(frames, vec!["data: a\u{FFFD}b"]);
    }

    #[test]
    fn crlf_endings_are_normalised() {
        let mut decoder = FrameDecoder::new();
        assert!(decoder.push(b"data: x\r\n\r").is_empty());
        assert_eq!(decoder.push(b"\ndata: y\r\n\r\n"), vec!["data: x", "data: y"]);
    }

    #[test]
    fn blank_segments_are_skipped() {
        let mut decoder = FrameDecoder::new();
        assert_eq!(decoder.push(b"\n\n\n\ndata: z\n\n\n"), vec!["data: z"]);
        assert_eq!(decoder.finish(), None);
    }

    #[test]
    fn scan_resumes_after_searched_bytes() {
        let mut decoder = FrameDecoder::new();
        for byte in b"data: ".iter().chain(&[b'x'; 64]) {
            assert!(decoder.push(std::slice::from_ref(byte)).is_empty());
        }
        assert_eq!(decoder.scanned, decoder.buffered().len());
        assert!(decoder.push(b"\n").is_empty());
        assert_eq!(decoder.push(b"\nda"), vec![format!("data: {}", "x".repeat(64))]);
        assert_eq!(decoder.buffered(), "da");
        assert_eq!(decoder.scanned, 2);
    }

    #[test]
    fn multibyte_text_before_delimiter_is_kept_whole() {
        let mut decoder = FrameDecoder::new();
        assert!(decoder.push("data: é".as_bytes()).is_empty());
        assert_eq!(decoder.push(b"\n\n"), vec!["data: é"]);
        assert!(decoder.is_empty());
    }

    #[test]
    fn finish_flushes_dangling_bytes() {
        let mut decoder = FrameDecoder::new();
        assert!(decoder.push(b"data: \xC3").is_empty());
        assert_eq!(decoder.finish().as_deref(), Some("data: \u{FFFD}"));
        assert!(decoder.is_empty());
    }
}
