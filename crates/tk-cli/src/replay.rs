//! Feeding a captured body through the extractor as if it were streamed.

use std::io::Write;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::debug;

use tk_core::{ExtractEvent, StreamingResult, ThinkingExtractor};

/// Split `text` into pieces of at least `size` bytes, never inside a char.
pub fn chunk_text(text: &str, size: usize) -> Vec<&str> {
    let size = size.max(1);
    let mut chunks = Vec::new();
    let mut start = 0;
    while start < text.len() {
        let mut end = (start + size).min(text.len());
        while !text.is_char_boundary(end) {
            end += 1;
        }
        chunks.push(&text[start..end]);
        start = end;
    }
    chunks
}

/// Aggregate view of a replayed stream.
#[derive(Debug, Default, Serialize)]
pub struct StreamSummary {
    /// One entry per thinking block, in order.
    pub thinking: Vec<String>,
    pub text: String,
    pub signatures: usize,
    pub chunks: usize,
}

impl StreamSummary {
    fn absorb(&mut self, result: &StreamingResult) {
        for event in &result.events {
            match event {
                ExtractEvent::TextDelta { content } => self.text.push_str(content),
                ExtractEvent::ThinkingStarted => self.thinking.push(String::new()),
                ExtractEvent::ThinkingDelta { content } => {
                    if let Some(block) = self.thinking.last_mut() {
                        block.push_str(content);
                    }
                }
                ExtractEvent::ThinkingEnded { .. } => self.signatures += 1,
            }
        }
    }
}

/// Stream `chunks` through `extractor`, then flush.
///
/// When `events` is given, every event is written to it as one JSON line.
pub fn replay<'a, I>(
    extractor: &mut ThinkingExtractor,
    chunks: I,
    mut events: Option<&mut dyn Write>,
) -> Result<StreamSummary>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut summary = StreamSummary::default();

    for chunk in chunks {
        summary.chunks += 1;
        let result = extractor
            .process_chunk(chunk)
            .with_context(|| format!("Failed to process chunk {}", summary.chunks))?;
        if let Some(out) = events.as_deref_mut() {
            write_events(out, &result)?;
        }
        summary.absorb(&result);
    }

    let result = extractor.flush().context("Failed to flush extractor")?;
    if let Some(out) = events.as_deref_mut() {
        write_events(out, &result)?;
    }
    summary.absorb(&result);

    debug!(
        chunks = summary.chunks,
        blocks = summary.thinking.len(),
        text_len = summary.text.len(),
        "Replay finished"
    );
    Ok(summary)
}

fn write_events(out: &mut dyn Write, result: &StreamingResult) -> Result<()> {
    for event in &result.events {
        let line = serde_json::to_string(event)?;
        writeln!(out, "{}", line)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use pretty_assertions::assert_eq;
    use tk_core::testing::{FailingEntropy, PatternEntropy};
    use tk_core::SignatureSynthesizer;

    use super::*;

    fn extractor() -> ThinkingExtractor {
        let signer = SignatureSynthesizer::with_source(Arc::new(PatternEntropy::new(0)));
        ThinkingExtractor::with_synthesizer(signer)
    }

    #[test]
    fn test_chunk_text_sizes() {
        assert_eq!(chunk_text("abcdefg", 3), vec!["abc", "def", "g"]);
        assert_eq!(chunk_text("", 3), Vec::<&str>::new());
        assert_eq!(chunk_text("ab", 0), vec!["a", "b"]);
    }

    #[test]
    fn test_chunk_text_respects_char_boundaries() {
        let text = "aé✓b";
        let chunks = chunk_text(text, 2);
        assert_eq!(chunks.concat(), text);
        assert_eq!(chunks, vec!["a\u{e9}", "\u{2713}", "b"]);
    }

    #[test]
    fn test_replay_summary() {
        let body = "intro <thinking>first</thinking> middle <thinking>second";
        let mut ex = extractor();
        let summary = replay(&mut ex, chunk_text(body, 3), None).unwrap();
        assert_eq!(summary.thinking, vec!["first", "second"]);
        assert_eq!(summary.text, "intro  middle ");
        assert_eq!(summary.signatures, 2);
        assert_eq!(summary.chunks, chunk_text(body, 3).len());
    }

    #[test]
    fn test_replay_writes_json_lines() {
        let mut out: Vec<u8> = Vec::new();
        let mut ex = extractor();
        replay(&mut ex, ["a<thinking>b</thinking>"], Some(&mut out as &mut dyn Write)).unwrap();

        let lines: Vec<serde_json::Value> = String::from_utf8(out)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        let types: Vec<&str> = lines.iter().map(|v| v["type"].as_str().unwrap()).collect();
        assert_eq!(
            types,
            vec!["text_delta", "thinking_started", "thinking_delta", "thinking_ended"]
        );
        assert!(lines[3]["signature"].as_str().unwrap().len() > 200);
    }

    #[test]
    fn test_replay_propagates_entropy_failure() {
        let signer = SignatureSynthesizer::with_source(Arc::new(FailingEntropy));
        let mut ex = ThinkingExtractor::with_synthesizer(signer);
        let err = replay(&mut ex, ["<thinking>x"], None).unwrap_err();
        assert!(err.to_string().contains("flush"));
    }
}
