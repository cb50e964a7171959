//! Incremental `<thinking>` tag extraction.
//!
//! Some upstream models inline their reasoning as `<thinking>...</thinking>`
//! inside ordinary text. [`ThinkingExtractor`] splits such a stream into a
//! thinking channel and a text channel as chunks arrive, forwarding content
//! as soon as it cannot be part of a tag. Tags may be split across chunks at
//! any byte; the output is the same however the input was chunked.

use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::error::Error;
use crate::signature::SignatureSynthesizer;

pub const THINKING_OPEN_TAG: &str = "<thinking>";
pub const THINKING_CLOSE_TAG: &str = "</thinking>";

/// Which channel the scanner is currently feeding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BlockState {
    #[default]
    Plain,
    Thinking,
}

impl BlockState {
    /// The tag that moves the scanner out of this state.
    fn boundary_tag(self) -> &'static str {
        match self {
            BlockState::Plain => THINKING_OPEN_TAG,
            BlockState::Thinking => THINKING_CLOSE_TAG,
        }
    }
}

/// One classified step of the stream, in production order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExtractEvent {
    TextDelta { content: String },
    ThinkingStarted,
    ThinkingDelta { content: String },
    ThinkingEnded { signature: String },
}

/// What a single `process_chunk` or `flush` call produced.
///
/// The flat fields aggregate the whole call; `events` keeps the exact
/// interleaving when several blocks open and close within one chunk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamingResult {
    pub thinking_started: bool,
    pub thinking_ended: bool,
    pub thinking_delta: String,
    pub text_delta: String,
    /// Signature of the most recently closed block. Present iff `thinking_ended`.
    pub signature: Option<String>,
    /// Bytes are held back waiting to see whether they complete a tag.
    pub has_pending: bool,
    pub events: Vec<ExtractEvent>,
}

impl StreamingResult {
    /// Nothing was emitted and nothing changed state.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    fn push_text(&mut self, content: &str) {
        self.text_delta.push_str(content);
        match self.events.last_mut() {
            Some(ExtractEvent::TextDelta { content: last }) => last.push_str(content),
            _ => self.events.push(ExtractEvent::TextDelta {
                content: content.to_string(),
            }),
        }
    }

    fn push_thinking(&mut self, content: &str) {
        self.thinking_delta.push_str(content);
        match self.events.last_mut() {
            Some(ExtractEvent::ThinkingDelta { content: last }) => last.push_str(content),
            _ => self.events.push(ExtractEvent::ThinkingDelta {
                content: content.to_string(),
            }),
        }
    }

    fn start_block(&mut self) {
        self.thinking_started = true;
        self.events.push(ExtractEvent::ThinkingStarted);
    }

    fn end_block(&mut self, signature: String) {
        self.thinking_ended = true;
        self.signature = Some(signature.clone());
        self.events.push(ExtractEvent::ThinkingEnded { signature });
    }
}

/// Streaming splitter for one response.
///
/// Feed chunks in arrival order with [`process_chunk`](Self::process_chunk)
/// and call [`flush`](Self::flush) once when the stream ends, on every exit
/// path. After `flush` the extractor is back in its initial state.
#[derive(Debug, Clone, Default)]
pub struct ThinkingExtractor {
    state: BlockState,
    /// Tail that may be the start of `state.boundary_tag()`; always shorter than it.
    pending: String,
    /// Bytes emitted as thinking since the current block opened.
    thinking_len: usize,
    signer: SignatureSynthesizer,
}

impl ThinkingExtractor {
    /// Create an extractor that signs blocks with OS entropy.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_synthesizer(signer: SignatureSynthesizer) -> Self {
        Self {
            state: BlockState::Plain,
            pending: String::new(),
            thinking_len: 0,
            signer,
        }
    }

    pub fn state(&self) -> BlockState {
        self.state
    }

    pub fn is_in_thinking_block(&self) -> bool {
        self.state == BlockState::Thinking
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Classify the next chunk of the stream.
    ///
    /// Only fails if a block closes and its signature cannot be generated.
    pub fn process_chunk(&mut self, text: &str) -> Result<StreamingResult, Error> {
        let mut result = StreamingResult::default();

        let mut content = std::mem::take(&mut self.pending);
        content.push_str(text);
        trace!(
            chunk_len = text.len(),
            buffered_len = content.len(),
            state = ?self.state,
            "Scanning chunk"
        );

        let mut rest = content.as_str();
        while !rest.is_empty() {
            let tag = self.state.boundary_tag();
            match rest.find(tag) {
                Some(idx) => {
                    self.emit(&rest[..idx], &mut result);
                    rest = &rest[idx + tag.len()..];
                    self.cross_boundary(&mut result)?;
                }
                None => {
                    let held = straddle_len(rest, tag);
                    let (ready, tail) = rest.split_at(rest.len() - held);
                    self.emit(ready, &mut result);
                    if held > 0 {
                        self.pending.push_str(tail);
                        result.has_pending = true;
                    }
                    break;
                }
            }
        }

        Ok(result)
    }

    /// Resolve everything still buffered at end of stream.
    ///
    /// An open block is closed and signed even though its close tag never
    /// arrived. Held-back bytes are never dropped: they are released as plain
    /// text, after the block closes, and do not count toward its signature.
    pub fn flush(&mut self) -> Result<StreamingResult, Error> {
        let mut result = StreamingResult::default();
        let residual = std::mem::take(&mut self.pending);

        match self.state {
            BlockState::Plain => {
                if !residual.is_empty() {
                    debug!(residual_len = residual.len(), "Releasing held-back text at flush");
                    result.push_text(&residual);
                }
            }
            BlockState::Thinking => {
                warn!(
                    thinking_len = self.thinking_len,
                    residual_len = residual.len(),
                    "Stream ended inside a thinking block; closing it"
                );
                let signature = self.signer.synthesize(self.thinking_len)?;
                result.end_block(signature);
                // An unfinished close tag is not thinking content.
                if !residual.is_empty() {
                    result.push_text(&residual);
                }
            }
        }

        self.reset();
        Ok(result)
    }

    /// Drop all buffered state and return to plain text.
    pub fn reset(&mut self) {
        self.state = BlockState::Plain;
        self.pending.clear();
        self.thinking_len = 0;
    }

    fn emit(&mut self, content: &str, result: &mut StreamingResult) {
        if content.is_empty() {
            return;
        }
        match self.state {
            BlockState::Plain => result.push_text(content),
            BlockState::Thinking => {
                self.thinking_len += content.len();
                result.push_thinking(content);
            }
        }
    }

    fn cross_boundary(&mut self, result: &mut StreamingResult) -> Result<(), Error> {
        match self.state {
            BlockState::Plain => {
                debug!("Thinking block opened");
                self.state = BlockState::Thinking;
                result.start_block();
            }
            BlockState::Thinking => {
                debug!(thinking_len = self.thinking_len, "Thinking block closed");
                let signature = self.signer.synthesize(self.thinking_len)?;
                self.thinking_len = 0;
                self.state = BlockState::Plain;
                result.end_block(signature);
            }
        }
        Ok(())
    }
}

/// Length of the longest suffix of `s` that is a proper prefix of `tag`.
///
/// Compared bytewise. A match always begins with `<`, so the split lands on
/// a char boundary.
fn straddle_len(s: &str, tag: &str) -> usize {
    let haystack = s.as_bytes();
    let needle = tag.as_bytes();
    let longest = haystack.len().min(needle.len() - 1);
    (1..=longest)
        .rev()
        .find(|&n| needle.starts_with(&haystack[haystack.len() - n..]))
        .unwrap_or(0)
}
