// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Password hashing — PBKDF2-HMAC-SHA256 via `ring`.
//
// Stored form:
//   pbkdf2-sha256$<iterations>$<salt hex>$<derived key hex>

use std::num::NonZeroU32;

use docpress_core::error::DocpressError;
use ring::pbkdf2;
use ring::rand::{SecureRandom, SystemRandom};
use tracing::{debug, instrument};

const SCHEME: &str = "pbkdf2-sha256";
const SALT_LEN: usize = 16;
const KEY_LEN: usize = 32;
const DEFAULT_ITERATIONS: u32 = 100_000;

/// Hashes and verifies account passwords.
///
/// Implementations must be thread-safe; a single hasher is shared by every
/// request handler.
pub trait CredentialHasher: Send + Sync {
    /// Produce an opaque, self-describing hash of `plaintext`.
    fn hash(&self, plaintext: &str) -> Result<String, DocpressError>;

    /// Check `plaintext` against a hash produced by [`CredentialHasher::hash`].
    /// Malformed hashes simply fail verification.
    fn verify(&self, plaintext: &str, encoded: &str) -> bool;
}

/// PBKDF2 hasher with a random per-password salt.
pub struct Pbkdf2Hasher {
    iterations: NonZeroU32,
    rng: SystemRandom,
}

impl Pbkdf2Hasher {
    /// Create a hasher using `iterations` rounds for new hashes. Zero is
    /// bumped to one.
    pub fn new(iterations: u32) -> Self {
        Self {
            iterations: NonZeroU32::new(iterations).unwrap_or(NonZeroU32::MIN),
            rng: SystemRandom::new(),
        }
    }
}

impl Default for Pbkdf2Hasher {
    fn default() -> Self {
        Self::new(DEFAULT_ITERATIONS)
    }
}

impl CredentialHasher for Pbkdf2Hasher {
    #[instrument(skip_all, fields(iterations = self.iterations.get()))]
    fn hash(&self, plaintext: &str) -> Result<String, DocpressError> {
        let mut salt = [0u8; SALT_LEN];
        self.rng
            .fill(&mut salt)
            .map_err(|_| DocpressError::Credential("system RNG unavailable".into()))?;

        let mut derived = [0u8; KEY_LEN];
        pbkdf2::derive(
            pbkdf2::PBKDF2_HMAC_SHA256,
            self.iterations,
            &salt,
            plaintext.as_bytes(),
            &mut derived,
        );

        debug!("password hashed");
        Ok(format!(
            "{SCHEME}${}${}${}",
            self.iterations,
            hex::encode(salt),
            hex::encode(derived)
        ))
    }

    fn verify(&self, plaintext: &str, encoded: &str) -> bool {
        let Some((iterations, salt, expected)) = parse_encoded(encoded) else {
            debug!("stored hash is malformed");
            return false;
        };
        pbkdf2::verify(
            pbkdf2::PBKDF2_HMAC_SHA256,
            iterations,
            &salt,
            plaintext.as_bytes(),
            &expected,
        )
        .is_ok()
    }
}

/// Split a stored hash into iterations, salt and derived key.
fn parse_encoded(encoded: &str) -> Option<(NonZeroU32, Vec<u8>, Vec<u8>)> {
    let mut parts = encoded.split('$');
    if parts.next()? != SCHEME {
        return None;
    }
    let iterations = parts.next()?.parse::<u32>().ok().and_then(NonZeroU32::new)?;
    let salt = hex::decode(parts.next()?).ok()?;
    let derived = hex::decode(parts.next()?).ok()?;
    if parts.next().is_some() || derived.is_empty() {
        return None;
    }
    Some((iterations, salt, derived))
}
