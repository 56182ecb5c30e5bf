//! Incremental server-sent events parser
//!
//! Splits a byte stream into `data:` payloads. Lines may arrive split across
//! network chunks; the unterminated tail is kept until the next chunk.
//! Buffer growth is bounded (1MB by default).

use crate::errors::{LexiError, Result};

/// Maximum buffer size (1MB)
pub const MAX_BUFFER_SIZE: usize = 1_048_576;

/// One parsed event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    /// A `data:` payload
    Data(String),
    /// The `[DONE]` terminator
    Done,
}

/// Incremental SSE parser
#[derive(Debug)]
pub struct SseParser {
    buffer: Vec<u8>,
    max_buffer_size: usize,
    done: bool,
}

impl SseParser {
    /// Create new parser with default settings
    pub fn new() -> Self {
        Self::with_capacity(MAX_BUFFER_SIZE)
    }

    /// Create parser with custom buffer capacity
    pub fn with_capacity(max_buffer_size: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(4096),
            max_buffer_size,
            done: false,
        }
    }

    /// Add bytes and return every complete event they finish
    ///
    /// Only the unterminated tail counts against the buffer bound.
    pub fn push(&mut self, bytes: &[u8]) -> Result<Vec<SseEvent>> {
        self.buffer.extend_from_slice(bytes);

        let mut events = Vec::new();
        let mut start = 0;
        while let Some(offset) = self.buffer[start..].iter().position(|&b| b == b'\n') {
            let end = start + offset + 1;
            let line = self.buffer[start..end].to_vec();
            if let Some(event) = self.parse_line(&line) {
                events.push(event);
            }
            start = end;
        }
        self.buffer.drain(..start);

        if self.buffer.len() > self.max_buffer_size {
            let pending = self.buffer.len();
            self.buffer.clear();
            return Err(LexiError::StreamingError(format!(
                "Buffer overflow: {} bytes exceeds maximum {}",
                pending, self.max_buffer_size
            )));
        }

        Ok(events)
    }

    /// Parse whatever remains once the stream has ended
    pub fn finish(&mut self) -> Option<SseEvent> {
        if self.buffer.is_empty() {
            return None;
        }
        let line = std::mem::take(&mut self.buffer);
        self.parse_line(&line)
    }

    fn parse_line(&mut self, raw: &[u8]) -> Option<SseEvent> {
        let line = String::from_utf8_lossy(raw);
        let line = line.trim_end_matches(['\r', '\n']);

        // Comments, event names and blank separators carry no payload
        let payload = line.strip_prefix("data:")?.trim_start();

        if payload == "[DONE]" {
            self.done = true;
            return Some(SseEvent::Done);
        }
        if payload.is_empty() {
            return None;
        }
        Some(SseEvent::Data(payload.to_string()))
    }

    /// Whether `[DONE]` has been seen
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Get current buffer size
    pub fn buffer_size(&self) -> usize {
        self.buffer.len()
    }

    /// Clear the buffer
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.done = false;
    }
}

impl Default for SseParser {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_event() {
        let mut parser = SseParser::new();
        let events = parser.push(b"data: {\"a\":1}\n\n").unwrap();
        assert_eq!(events, vec![SseEvent::Data("{\"a\":1}".to_string())]);
    }

    #[test]
    fn test_event_split_across_chunks() {
        let mut parser = SseParser::new();
        assert!(parser.push(b"data: {\"choi").unwrap().is_empty());
        let events = parser.push(b"ces\":[]}\r\n").unwrap();
        assert_eq!(events, vec![SseEvent::Data("{\"choices\":[]}".to_string())]);
        assert_eq!(parser.buffer_size(), 0);
    }

    #[test]
    fn test_done_terminator() {
        let mut parser = SseParser::new();
        let events = parser.push(b"data: {}\n\ndata: [DONE]\n\n").unwrap();
        assert_eq!(events.last(), Some(&SseEvent::Done));
        assert!(parser.is_done());
    }

    #[test]
    fn test_comments_and_event_lines_ignored() {
        let mut parser = SseParser::new();
        let events = parser.push(b": keep-alive\nevent: message\ndata: x\n").unwrap();
        assert_eq!(events, vec![SseEvent::Data("x".to_string())]);
    }

    #[test]
    fn test_finish_flushes_tail() {
        let mut parser = SseParser::new();
        parser.push(b"data: tail").unwrap();
        assert_eq!(parser.finish(), Some(SseEvent::Data("tail".to_string())));
        assert_eq!(parser.finish(), None);
    }

    #[test]
    fn test_buffer_overflow() {
        let mut parser = SseParser::with_capacity(100);
        let result = parser.push(&[b'a'; 150]);
        assert!(matches!(result, Err(LexiError::StreamingError(_))));
    }

    #[test]
    fn test_large_read_of_complete_lines() {
        let mut parser = SseParser::with_capacity(100);
        let chunk = "data: 0123456789abcdef\n".repeat(20);
        assert!(chunk.len() > 100);

        let events = parser.push(chunk.as_bytes()).unwrap();
        assert_eq!(events.len(), 20);
        assert_eq!(parser.buffer_size(), 0);
    }

    #[test]
    fn test_clear() {
        let mut parser = SseParser::new();
        parser.push(b"data: [DONE]\npartial").unwrap();
        parser.clear();
        assert!(!parser.is_done());
        assert_eq!(parser.buffer_size(), 0);
    }
}
