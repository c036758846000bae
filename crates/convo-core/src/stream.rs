//! Streamed completion handling: turning protocol lines into text fragments.

use futures::StreamExt;

use crate::api::{error_message, LineStream, StreamChunk};
use crate::constants::protocol::{DATA_PREFIX, DONE_SENTINEL};

/// What a single protocol line contributed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineEvent {
    /// A piece of assistant text to forward.
    Fragment(String),
    /// The end-of-stream sentinel.
    Done,
    /// Anything else: keep-alives, other event fields, malformed payloads.
    Skip,
}

/// Interpret one line of a streamed response.
pub fn parse_line(line: &str) -> LineEvent {
    let Some(payload) = line.strip_prefix(DATA_PREFIX) else {
        return LineEvent::Skip;
    };
    let payload = payload.trim();
    if payload == DONE_SENTINEL {
        return LineEvent::Done;
    }

    match serde_json::from_str::<StreamChunk>(payload) {
        Ok(chunk) => chunk
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.delta.content)
            .filter(|text| !text.is_empty())
            .map(LineEvent::Fragment)
            .unwrap_or(LineEvent::Skip),
        Err(e) => {
            tracing::debug!("Skipping malformed stream line: {}", e);
            LineEvent::Skip
        }
    }
}

/// Collects fragments into the final assistant text.
#[derive(Debug, Default)]
pub struct StreamAccumulator {
    text: String,
    fragments: usize,
    done: bool,
}

impl StreamAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one line, returning the fragment to forward if the line carried one.
    pub fn push_line(&mut self, line: &str) -> Option<String> {
        if self.done {
            return None;
        }
        match parse_line(line) {
            LineEvent::Fragment(fragment) => {
                self.text.push_str(&fragment);
                self.fragments += 1;
                Some(fragment)
            }
            LineEvent::Done => {
                self.done = true;
                None
            }
            LineEvent::Skip => None,
        }
    }

    /// True once the end-of-stream sentinel has been seen.
    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn fragment_count(&self) -> usize {
        self.fragments
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn into_text(self) -> String {
        self.text
    }
}

/// Read an error body to the end and extract the server's message.
///
/// Line errors stop the drain; whatever was read so far is used.
pub async fn drain_error_message(mut lines: LineStream) -> String {
    let mut body = String::new();
    while let Some(line) = lines.next().await {
        match line {
            Ok(line) => body.push_str(&line),
            Err(e) => {
                tracing::debug!("Error body ended early: {}", e);
                break;
            }
        }
    }
    error_message(&body)
}
