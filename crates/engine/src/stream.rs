//! Streaming frame codec
//!
//! The chat endpoint speaks newline-delimited SSE: each frame is
//! `data: {json}\n\n` and the stream always terminates with
//! `data: [DONE]\n\n`, error or not. The decoder half is shared with
//! clients and tests; it buffers partial frames across reads and discards
//! any unterminated tail once the done marker arrives.

use serde::{Deserialize, Serialize};

pub const DONE_MARKER: &str = "[DONE]";

/// Text shown when the exchange fails before any narration arrived
pub const APOLOGY_FALLBACK: &str =
    "I'm sorry, something went wrong on my end. Please try that again.";

/// One decoded stream event: `{"text": …}` or `{"error": …}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StreamEvent {
    /// Narration fragment, in order
    Delta { text: String },
    /// Terminal failure; a done frame still follows
    Error { error: String },
}

pub fn encode_delta(text: &str) -> String {
    encode_json(&StreamEvent::Delta {
        text: text.to_string(),
    })
}

pub fn encode_error(message: &str) -> String {
    encode_json(&StreamEvent::Error {
        error: message.to_string(),
    })
}

pub fn encode_done() -> String {
    format!("data: {DONE_MARKER}\n\n")
}

fn encode_json(event: &StreamEvent) -> String {
    // StreamEvent serialization cannot fail: strings only
    let json = serde_json::to_string(event).unwrap_or_default();
    format!("data: {json}\n\n")
}

/// Incremental frame decoder. Feed raw chunks in any split; complete frames
/// come out in order. Once `[DONE]` is seen the stream is finished and any
/// buffered partial frame is dropped.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: String,
    done: bool,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Consume one chunk, returning every frame it completed
    pub fn feed(&mut self, chunk: &str) -> Vec<StreamEvent> {
        if self.done {
            return Vec::new();
        }
        self.buffer.push_str(chunk);

        let mut events = Vec::new();
        while let Some(end) = self.buffer.find("\n\n") {
            let frame = self.buffer[..end].to_string();
            self.buffer.drain(..end + 2);

            let Some(payload) = frame.strip_prefix("data: ") else {
                continue;
            };
            if payload == DONE_MARKER {
                self.done = true;
                self.buffer.clear();
                break;
            }
            if let Ok(event) = serde_json::from_str::<StreamEvent>(payload) {
                events.push(event);
            }
        }
        events
    }
}

/// Accumulates a chat stream into the final reply text, applying the
/// apology fallback when an error arrives before any narration
#[derive(Debug, Default)]
pub struct ChatStreamConsumer {
    text: String,
    errored: bool,
}

impl ChatStreamConsumer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, event: StreamEvent) {
        match event {
            StreamEvent::Delta { text } => self.text.push_str(&text),
            StreamEvent::Error { .. } => self.errored = true,
        }
    }

    /// Final reply: partial narration survives a late error; an error with
    /// nothing accumulated yields the apology
    pub fn into_text(self) -> String {
        if self.text.is_empty() && self.errored {
            APOLOGY_FALLBACK.to_string()
        } else {
            self.text
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_have_the_sse_shape() {
        assert_eq!(encode_delta("hi"), "data: {\"text\":\"hi\"}\n\n");
        assert_eq!(
            encode_error("upstream timeout"),
            "data: {\"error\":\"upstream timeout\"}\n\n"
        );
        assert_eq!(encode_done(), "data: [DONE]\n\n");
    }

    #[test]
    fn deltas_reassemble_across_arbitrary_splits() {
        let wire = [
            encode_delta("Hel"),
            encode_delta("lo, "),
            encode_delta("world"),
            encode_done(),
        ]
        .concat();

        // Split mid-frame to exercise the partial buffer
        let (a, rest) = wire.split_at(7);
        let (b, c) = rest.split_at(11);

        let mut decoder = FrameDecoder::new();
        let mut consumer = ChatStreamConsumer::new();
        for chunk in [a, b, c] {
            for event in decoder.feed(chunk) {
                consumer.apply(event);
            }
        }
        assert!(decoder.is_done());
        assert_eq!(consumer.into_text(), "Hello, world");
    }

    #[test]
    fn partial_frame_after_done_is_discarded() {
        let mut decoder = FrameDecoder::new();
        let wire = format!("{}data: {{\"tex", encode_done());
        let events = decoder.feed(&wire);
        assert!(events.is_empty());
        assert!(decoder.is_done());
        assert!(decoder.feed("t\":\"late\"}\n\n").is_empty());
    }

    #[test]
    fn error_before_any_narration_yields_the_apology() {
        let mut consumer = ChatStreamConsumer::new();
        consumer.apply(StreamEvent::Error {
            error: "upstream timeout".into(),
        });
        assert_eq!(consumer.into_text(), APOLOGY_FALLBACK);
    }

    #[test]
    fn late_error_keeps_partial_narration() {
        let mut consumer = ChatStreamConsumer::new();
        consumer.apply(StreamEvent::Delta {
            text: "Here is what I".into(),
        });
        consumer.apply(StreamEvent::Error {
            error: "connection reset".into(),
        });
        assert_eq!(consumer.into_text(), "Here is what I");
    }
}
