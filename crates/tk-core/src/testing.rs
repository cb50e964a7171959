//! Test utilities shared across the workspace.
//! Only compiled when running tests or with the `testing` feature.

use std::sync::Mutex;

use crate::error::Error;
use crate::extractor::{ExtractEvent, ThinkingExtractor};
use crate::signature::EntropySource;

/// An entropy source that fills every byte with the same value.
pub struct PatternEntropy {
    byte: u8,
}

impl PatternEntropy {
    pub fn new(byte: u8) -> Self {
        Self { byte }
    }
}

impl EntropySource for PatternEntropy {
    fn fill(&self, dest: &mut [u8]) -> Result<(), Error> {
        dest.fill(self.byte);
        Ok(())
    }
}

/// An entropy source that always fails.
pub struct FailingEntropy;

impl EntropySource for FailingEntropy {
    fn fill(&self, _dest: &mut [u8]) -> Result<(), Error> {
        Err(Error::entropy("mock entropy source exhausted"))
    }
}

/// An entropy source that records every requested length.
pub struct RecordingEntropy {
    /// Captured request sizes (for assertion).
    pub requested: Mutex<Vec<usize>>,
}

impl RecordingEntropy {
    pub fn new() -> Self {
        Self {
            requested: Mutex::new(Vec::new()),
        }
    }

    /// Get the number of fill requests seen so far.
    pub fn request_count(&self) -> usize {
        self.requested.lock().unwrap().len()
    }

    /// Get the size of the last fill request.
    pub fn last_request(&self) -> Option<usize> {
        self.requested.lock().unwrap().last().copied()
    }
}

impl Default for RecordingEntropy {
    fn default() -> Self {
        Self::new()
    }
}

impl EntropySource for RecordingEntropy {
    fn fill(&self, dest: &mut [u8]) -> Result<(), Error> {
        self.requested.lock().unwrap().push(dest.len());
        dest.fill(0);
        Ok(())
    }
}

/// Everything a full stream produced, aggregated across calls.
#[derive(Debug, Default)]
pub struct StreamTranscript {
    pub text: String,
    pub thinking: String,
    pub started: usize,
    pub ended: usize,
    pub signatures: Vec<String>,
    /// Both channels interleaved in production order, tags removed.
    pub reconstructed: String,
    pub events: Vec<ExtractEvent>,
}

/// Feed `chunks` in order, flush, and aggregate the results.
pub fn run_stream<'a, I>(extractor: &mut ThinkingExtractor, chunks: I) -> StreamTranscript
where
    I: IntoIterator<Item = &'a str>,
{
    let mut transcript = StreamTranscript::default();
    for chunk in chunks {
        let result = extractor.process_chunk(chunk).unwrap();
        transcript.absorb(result.events);
    }
    let result = extractor.flush().unwrap();
    transcript.absorb(result.events);
    transcript
}

impl StreamTranscript {
    fn absorb(&mut self, events: Vec<ExtractEvent>) {
        for event in events {
            match &event {
                ExtractEvent::TextDelta { content } => {
                    self.text.push_str(content);
                    self.reconstructed.push_str(content);
                }
                ExtractEvent::ThinkingStarted => self.started += 1,
                ExtractEvent::ThinkingDelta { content } => {
                    self.thinking.push_str(content);
                    self.reconstructed.push_str(content);
                }
                ExtractEvent::ThinkingEnded { signature } => {
                    self.ended += 1;
                    self.signatures.push(signature.clone());
                }
            }
            self.events.push(event);
        }
    }
}

/// Split `text` into pieces at the given byte offsets, which must be sorted
/// char boundaries.
pub fn split_at_offsets<'a>(text: &'a str, offsets: &[usize]) -> Vec<&'a str> {
    let mut pieces = Vec::with_capacity(offsets.len() + 1);
    let mut start = 0;
    for &offset in offsets {
        pieces.push(&text[start..offset]);
        start = offset;
    }
    pieces.push(&text[start..]);
    pieces
}

/// One piece per char.
pub fn char_chunks(text: &str) -> Vec<&str> {
    text.char_indices()
        .map(|(i, c)| &text[i..i + c.len_utf8()])
        .collect()
}
