//! Server-sent events line decoding.
//!
//! Network chunks split lines (and UTF-8 sequences) at arbitrary byte offsets,
//! so bytes are buffered until a full `\n`-terminated line is available.

/// One meaningful SSE line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseLine {
    /// Payload of a `data:` line
    Data(String),
    /// The `data: [DONE]` terminator
    Done,
}

#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes and collect every complete line they finish.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<SseLine> {
        self.buffer.extend_from_slice(bytes);

        let mut lines = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(line) = parse_line(&String::from_utf8_lossy(&raw)) {
                lines.push(line);
            }
        }
        lines
    }

    /// Flush a trailing line that was not newline-terminated.
    pub fn finish(&mut self) -> Option<SseLine> {
        if self.buffer.is_empty() {
            return None;
        }
        let raw = std::mem::take(&mut self.buffer);
        parse_line(&String::from_utf8_lossy(&raw))
    }
}

fn parse_line(line: &str) -> Option<SseLine> {
    let line = line.trim_end_matches(['\r', '\n']);

    // Blank separators, comments, and non-data fields (event:, id:, retry:)
    let data = line.strip_prefix("data:")?;
    let data = data.trim();
    if data.is_empty() {
        return None;
    }
    if data == "[DONE]" {
        return Some(SseLine::Done);
    }
    Some(SseLine::Data(data.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_complete_lines() {
        let mut decoder = SseDecoder::new();
        let lines = decoder.push(b"data: {\"a\":1}\n\ndata: [DONE]\n");
        assert_eq!(
            lines,
            vec![SseLine::Data("{\"a\":1}".into()), SseLine::Done]
        );
    }

    #[test]
    fn buffers_partial_lines_across_pushes() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data: {\"con").is_empty());
        let lines = decoder.push(b"tent\":\"hi\"}\r\n");
        assert_eq!(lines, vec![SseLine::Data("{\"content\":\"hi\"}".into())]);
    }

    #[test]
    fn split_utf8_sequence_survives() {
        let bytes = "data: héllo\n".as_bytes();
        // Split inside the two-byte 'é'
        let split = bytes.iter().position(|b| *b == 0xC3).unwrap() + 1;
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(&bytes[..split]).is_empty());
        assert_eq!(decoder.push(&bytes[split..]), vec![SseLine::Data("héllo".into())]);
    }

    #[test]
    fn ignores_comments_and_other_fields() {
        let mut decoder = SseDecoder::new();
        let lines = decoder.push(b": keep-alive\nevent: message\nid: 7\ndata:\n");
        assert!(lines.is_empty());
    }

    #[test]
    fn finish_flushes_unterminated_line() {
        let mut decoder = SseDecoder::new();
        decoder.push(b"data: [DONE]");
        assert_eq!(decoder.finish(), Some(SseLine::Done));
        assert_eq!(decoder.finish(), None);
    }
}
