// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Document fingerprints — SHA-256 digests recorded in the audit trail so a
// processed upload can be identified without keeping its bytes.

use sha2::{Digest, Sha256};

/// SHA-256 of `data` as lowercase hex.
pub fn fingerprint(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Fingerprint of an ordered batch of uploads (e.g. the inputs of a merge).
///
/// Each part is length-prefixed so `["ab", "c"]` and `["a", "bc"]` differ.
/// A single part hashes differently from [`fingerprint`] of the same bytes.
pub fn fingerprint_batch<T: AsRef<[u8]>>(parts: &[T]) -> String {
    let mut hasher = Sha256::new();
    hasher.update((parts.len() as u64).to_be_bytes());
    for part in parts {
        let bytes = part.as_ref();
        hasher.update((bytes.len() as u64).to_be_bytes());
        hasher.update(bytes);
    }
    hex::encode(hasher.finalize())
}
