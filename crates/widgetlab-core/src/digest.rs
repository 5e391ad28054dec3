//! Content identity for widget sources.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest as Sha2Digest, Sha256};
use thiserror::Error;

/// SHA-256 over a widget's code and data text.
///
/// Used as the identity of a [`WidgetSource`](crate::compile::WidgetSource): the render
/// supervisor clears a runtime fault only when this value changes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceDigest([u8; 32]);

impl SourceDigest {
    /// Digest of `code` and `data_json`, separated by a NUL byte so that
    /// `("ab", "c")` and `("a", "bc")` never collide.
    pub fn compute(code: &str, data_json: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(code.as_bytes());
        hasher.update([0u8]);
        hasher.update(data_json.as_bytes());
        let hash = hasher.finalize();
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&hash);
        Self(bytes)
    }

    /// Return the raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Hex-encoded string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// First 12 hex characters, for log lines.
    pub fn short(&self) -> String {
        self.to_hex().chars().take(12).collect()
    }
}

impl fmt::Display for SourceDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for SourceDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SourceDigest({})", self.short())
    }
}

/// Error parsing a hex digest.
#[derive(Debug, Error)]
#[error("invalid digest hex: {0}")]
pub struct InvalidDigest(pub String);

impl FromStr for SourceDigest {
    type Err = InvalidDigest;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let bytes = hex::decode(s).map_err(|_| InvalidDigest(s.to_string()))?;
        if bytes.len() != 32 {
            return Err(InvalidDigest(s.to_string()));
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}
