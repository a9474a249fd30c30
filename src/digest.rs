//! Fixed-output cryptographic digest over a byte span.
//!
//! Every snapshot written to a [`crate::archive::BinaryArchive`] is
//! fingerprinted with [`digest`] before it touches disk, and re-fingerprinted
//! on read; a mismatch means the bytes on disk are not the bytes that were
//! written (see [`crate::archive::ArchiveError::ChecksumMismatch`]).

use sha2::{Digest as _, Sha256};

/// Returns the SHA-256 digest of `bytes` as a lowercase hex string with no
/// separators (e.g. `"e3b0c4429..."`).
///
/// Deterministic and collision-resistant for the integrity use case; the
/// algorithm itself is an external collaborator (an audited `sha2`
/// implementation), not something this crate re-derives.
pub fn digest(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}
