use serde::de::DeserializeOwned;
use tracing::warn;

/// Reassembles newline-delimited JSON from arbitrarily split chunks.
///
/// A chunk may end in the middle of a line; that tail is held back and
/// prefixed to the next chunk. Bytes are buffered rather than text so a
/// multi-byte character split across chunks is decoded intact.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a chunk and returns every line it completed, without the
    /// trailing newline. Blank lines are dropped.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);

        let Some(last_newline) = self.pending.iter().rposition(|b| *b == b'\n') else {
            return Vec::new();
        };

        let rest = self.pending.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.pending, rest);

        complete
            .split(|b| *b == b'\n')
            .filter_map(to_line)
            .collect()
    }

    /// Returns the unterminated tail, if any, once the stream has ended.
    pub fn finish(&mut self) -> Option<String> {
        let tail = std::mem::take(&mut self.pending);
        to_line(&tail)
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }
}

fn to_line(raw: &[u8]) -> Option<String> {
    let line = String::from_utf8_lossy(raw);
    let line = line.trim();
    if line.is_empty() {
        None
    } else {
        Some(line.to_string())
    }
}

/// Parses one line, logging and discarding it when it is malformed so the
/// caller can keep going with the next one.
pub fn parse_line<T: DeserializeOwned>(line: &str) -> Option<T> {
    match serde_json::from_str(line) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("skipping malformed progress line {:?}: {}", line, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upload::types::ProgressRecord;

    #[test]
    fn holds_partial_line_until_next_chunk() {
        let mut buf = LineBuffer::new();
        assert!(buf.push(b"{\"fileIndex\":0,\"processingPro").is_empty());
        assert!(buf.has_pending());

        let lines = buf.push(b"gress\":50}\n{\"fileIndex\":1");
        assert_eq!(lines, vec![r#"{"fileIndex":0,"processingProgress":50}"#]);

        let lines = buf.push(b",\"processingProgress\":30}\n");
        assert_eq!(lines, vec![r#"{"fileIndex":1,"processingProgress":30}"#]);
        assert!(!buf.has_pending());
    }

    #[test]
    fn splits_many_lines_in_one_chunk_and_drops_blanks() {
        let mut buf = LineBuffer::new();
        let lines = buf.push(b"{\"a\":1}\n\n{\"b\":2}\r\n{\"c\":3}\n");
        assert_eq!(lines, vec![r#"{"a":1}"#, r#"{"b":2}"#, r#"{"c":3}"#]);
    }

    #[test]
    fn finish_returns_unterminated_tail() {
        let mut buf = LineBuffer::new();
        assert!(buf.push(b"{\"fileIndex\":0,\"processingComplete\":true}").is_empty());
        assert_eq!(
            buf.finish().as_deref(),
            Some(r#"{"fileIndex":0,"processingComplete":true}"#)
        );
        assert_eq!(buf.finish(), None);
    }

    #[test]
    fn multibyte_character_split_across_chunks() {
        let mut buf = LineBuffer::new();
        let text = "{\"error\":\"é\"}\n".as_bytes();
        let split = text.iter().position(|b| *b > 0x7f).unwrap() + 1;
        assert!(buf.push(&text[..split]).is_empty());
        assert_eq!(buf.push(&text[split..]), vec!["{\"error\":\"é\"}"]);
    }

    #[test]
    fn malformed_line_is_skipped_without_losing_siblings() {
        let mut buf = LineBuffer::new();
        let mut lines = buf.push(b"{\"fileIndex\":0,\"processingProgress\":50}\n");
        lines.extend(buf.push(b"{\"fileIndex\":\n"));
        lines.extend(buf.push(b"{\"fileIndex\":1,\"processingComplete\":true}\n"));
        let records: Vec<ProgressRecord> =
            lines.iter().filter_map(|l| parse_line(l)).collect();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].file_index, 0);
        assert_eq!(records[0].processing_progress, Some(50.0));
        assert_eq!(records[1].file_index, 1);
        assert_eq!(records[1].processing_complete, Some(true));
    }
}
