//! Incremental SSE frame decoder
//!
//! Reassembles `event: <type>\ndata: <json>\n\n` frames from arbitrary byte
//! chunk boundaries. The decoder only splits frames and fields; payload
//! validation happens when the frame is parsed into an event.

/// One raw SSE frame: event name plus data payload, both unvalidated
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    pub event: String,
    pub data: String,
}

/// Stateful frame splitter fed by transport byte chunks
#[derive(Default)]
pub struct SseFrameDecoder {
    buffer: String,
}

impl SseFrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk and drain every complete frame it closes.
    ///
    /// Frames are separated by a blank line. A frame with no `event:` or no
    /// `data:` field comes out with that field empty, which downstream parsing
    /// treats as malformed.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<RawFrame> {
        self.buffer.push_str(&String::from_utf8_lossy(chunk));
        // Tolerate CRLF transports
        if self.buffer.contains('\r') {
            self.buffer = self.buffer.replace("\r\n", "\n");
        }

        let mut frames = Vec::new();
        while let Some(boundary) = self.buffer.find("\n\n") {
            let raw: String = self.buffer.drain(..boundary + 2).collect();
            if let Some(frame) = Self::split_frame(raw.trim_end()) {
                frames.push(frame);
            }
        }
        frames
    }

    /// Leftover bytes that never closed into a frame (stream-end diagnostics)
    pub fn residue(&self) -> &str {
        self.buffer.trim()
    }

    fn split_frame(raw: &str) -> Option<RawFrame> {
        let mut event = String::new();
        let mut data = String::new();
        let mut saw_field = false;
        for line in raw.lines() {
            if let Some(value) = line.strip_prefix("event:") {
                event = value.trim().to_string();
                saw_field = true;
            } else if let Some(value) = line.strip_prefix("data:") {
                // Multi-line data fields concatenate with a newline
                if !data.is_empty() {
                    data.push('\n');
                }
                data.push_str(value.trim_start());
                saw_field = true;
            }
            // Comment lines (`: keep-alive`) and unknown fields are ignored
        }
        saw_field.then_some(RawFrame { event, data })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_complete_frame() {
        let mut decoder = SseFrameDecoder::new();
        let frames = decoder.feed(b"event: token\ndata: {\"token\":\"hi\"}\n\n");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].event, "token");
        assert_eq!(frames[0].data, "{\"token\":\"hi\"}");
    }

    #[test]
    fn test_frame_split_across_chunks() {
        let mut decoder = SseFrameDecoder::new();
        assert!(decoder.feed(b"event: tok").is_empty());
        assert!(decoder.feed(b"en\ndata: {\"token\"").is_empty());
        let frames = decoder.feed(b":\"x\"}\n\n");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].event, "token");
        assert_eq!(frames[0].data, "{\"token\":\"x\"}");
    }

    #[test]
    fn test_multiple_frames_in_one_chunk() {
        let mut decoder = SseFrameDecoder::new();
        let frames = decoder.feed(
            b"event: token\ndata: {\"token\":\"a\"}\n\nevent: token\ndata: {\"token\":\"b\"}\n\n",
        );
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[1].data, "{\"token\":\"b\"}");
    }

    #[test]
    fn test_crlf_frames_decode() {
        let mut decoder = SseFrameDecoder::new();
        let frames = decoder.feed(b"event: done\r\ndata: {}\r\n\r\n");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].event, "done");
    }

    #[test]
    fn test_missing_event_field_yields_empty_event() {
        let mut decoder = SseFrameDecoder::new();
        let frames = decoder.feed(b"data: {\"token\":\"x\"}\n\n");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].event, "");
    }

    #[test]
    fn test_comment_only_frame_is_skipped() {
        let mut decoder = SseFrameDecoder::new();
        let frames = decoder.feed(b": keep-alive\n\nevent: token\ndata: {\"token\":\"x\"}\n\n");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].event, "token");
    }

    #[test]
    fn test_residue_reports_unterminated_frame() {
        let mut decoder = SseFrameDecoder::new();
        decoder.feed(b"event: done\ndata: {\"partial\"");
        assert!(decoder.residue().starts_with("event: done"));
    }
}
