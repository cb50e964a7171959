//! Placeholder signatures for closed thinking blocks.
//!
//! Downstream protocols expect every thinking block to carry a signature.
//! We cannot produce a real one, so we emit random bytes whose length
//! tracks the block size. The token is opaque and must never be verified.

use std::fmt;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::Error;

/// A source of cryptographically secure random bytes.
///
/// Production code uses [`OsEntropy`]. Tests can inject deterministic
/// sources from `tk_core::testing`.
pub trait EntropySource: Send + Sync {
    /// Fill `dest` entirely with random bytes.
    fn fill(&self, dest: &mut [u8]) -> Result<(), Error>;
}

/// The operating system's secure random generator.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsEntropy;

impl EntropySource for OsEntropy {
    fn fill(&self, dest: &mut [u8]) -> Result<(), Error> {
        getrandom::getrandom(dest)?;
        Ok(())
    }
}

/// Bounds for the decoded signature length.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureConfig {
    /// Smallest signature, in bytes before encoding.
    #[serde(default = "default_min_bytes")]
    pub min_bytes: usize,

    /// Largest signature, in bytes before encoding.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,
}

fn default_min_bytes() -> usize {
    200
}

fn default_max_bytes() -> usize {
    1000
}

impl Default for SignatureConfig {
    fn default() -> Self {
        Self {
            min_bytes: default_min_bytes(),
            max_bytes: default_max_bytes(),
        }
    }
}

impl SignatureConfig {
    /// Create a new config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the minimum length in bytes.
    pub fn with_min_bytes(mut self, min_bytes: usize) -> Self {
        self.min_bytes = min_bytes;
        self
    }

    /// Set the maximum length in bytes.
    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.max_bytes == 0 {
            return Err(Error::config("signature max_bytes must be greater than zero"));
        }
        if self.min_bytes > self.max_bytes {
            return Err(Error::config(format!(
                "signature min_bytes ({}) exceeds max_bytes ({})",
                self.min_bytes, self.max_bytes
            )));
        }
        Ok(())
    }

    /// Decoded signature length for a block of `content_len` bytes:
    /// one and a half times the content, clamped to the configured bounds.
    pub fn target_len(&self, content_len: usize) -> usize {
        (content_len.saturating_mul(3) / 2).clamp(self.min_bytes, self.max_bytes)
    }
}

/// Decoded signature length under the default bounds.
pub fn signature_len(content_len: usize) -> usize {
    SignatureConfig::default().target_len(content_len)
}

/// Produces base64 signature tokens from an injected entropy source.
#[derive(Clone)]
pub struct SignatureSynthesizer {
    config: SignatureConfig,
    source: Arc<dyn EntropySource>,
}

impl SignatureSynthesizer {
    /// Create a synthesizer, rejecting inverted or empty bounds.
    pub fn new(config: SignatureConfig, source: Arc<dyn EntropySource>) -> Result<Self, Error> {
        config.validate()?;
        Ok(Self { config, source })
    }

    /// Default bounds with a caller-provided entropy source.
    pub fn with_source(source: Arc<dyn EntropySource>) -> Self {
        Self {
            config: SignatureConfig::default(),
            source,
        }
    }

    /// Draw random bytes sized for `content_len` and encode them as padded base64.
    pub fn synthesize(&self, content_len: usize) -> Result<String, Error> {
        let target = self.config.target_len(content_len);
        let mut bytes = vec![0u8; target];
        self.source.fill(&mut bytes)?;
        trace!(content_len, signature_bytes = target, "Synthesized thinking signature");
        Ok(STANDARD.encode(bytes))
    }

    pub fn config(&self) -> &SignatureConfig {
        &self.config
    }
}

impl Default for SignatureSynthesizer {
    fn default() -> Self {
        Self::with_source(Arc::new(OsEntropy))
    }
}

impl fmt::Debug for SignatureSynthesizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignatureSynthesizer")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Generate a signature from OS entropy using the default bounds.
pub fn generate_signature(content_len: usize) -> Result<String, Error> {
    SignatureSynthesizer::default().synthesize(content_len)
}
