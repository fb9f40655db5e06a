use sha1::{Digest, Sha1};
use std::fmt::Write as _;

/// Incremental SHA-1 digest producing lowercase hex, the format registries
/// publish as `dist.shasum`.
#[derive(Debug, Clone, Default)]
pub struct Sha1Hex {
    inner: Sha1,
}

impl Sha1Hex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed another chunk of bytes into the digest.
    pub fn update(&mut self, chunk: &[u8]) {
        self.inner.update(chunk);
    }

    /// Consume the hasher and return the hex-encoded digest.
    #[must_use]
    pub fn finish(self) -> String {
        to_hex(&self.inner.finalize())
    }
}

/// Compute the SHA-1 hash of a byte slice, returning the hex-encoded digest.
#[must_use]
pub fn sha1_bytes(data: &[u8]) -> String {
    let mut hasher = Sha1Hex::new();
    hasher.update(data);
    hasher.finish()
}

fn to_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        let _ = write!(out, "{byte:02x}");
    }
    out
}
