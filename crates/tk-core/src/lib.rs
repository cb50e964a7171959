//! tk-core: thinking-tag extraction for LLM responses
//!
//! This crate splits model output that inlines `<thinking>...</thinking>`
//! into separate thinking and text channels, both incrementally over a stream
//! and in one pass over a complete body.

pub mod batch;
pub mod content;
pub mod error;
pub mod extractor;
pub mod signature;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use batch::{extract_all, strip_thinking_tags, ExtractedThinking};
pub use content::{flatten_content, Content, ContentPart, FlattenedContent};
pub use error::Error;
pub use extractor::{
    BlockState, ExtractEvent, StreamingResult, ThinkingExtractor, THINKING_CLOSE_TAG,
    THINKING_OPEN_TAG,
};
pub use signature::{
    generate_signature, signature_len, EntropySource, OsEntropy, SignatureConfig,
    SignatureSynthesizer,
};

pub type Result<T> = std::result::Result<T, Error>;
