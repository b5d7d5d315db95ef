// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Asymmetric key wrap port.
//!
//! When an archive is protected with a key pair instead of (or in addition
//! to) a password, the per-archive symmetric key is first PKCS#1 v1.5-shaped
//! into a fixed [`WRAP_ENVELOPE_LEN`]-byte plaintext block: `0x00 0x02 | PS |
//! 0x00 | K`, where `K` is the random key and `PS` is non-zero padding
//! filling the rest of the 64 bytes. This bounds the random key to
//! [`RANDOM_KEY_MAX_BITS`] bits so at least 8 bytes of padding always
//! remain. That plaintext block is then RSA-encrypted, so the ciphertext
//! envelope's length matches the modulus size of the key pair in use (e.g.
//! 256 bytes for a 2048-bit key), not the 64-byte plaintext block.

use crate::error::BarResult;

/// Fixed size of the PKCS#1 v1.5-shaped plaintext block, before RSA
/// encryption. Independent of the RSA modulus size.
pub const WRAP_ENVELOPE_LEN: usize = 64;

/// Largest random key this envelope can carry: `|PS| >= 8` forces
/// `|K| <= 64 - 3 - 8 = 53` bytes, i.e. 424 bits.
pub const RANDOM_KEY_MAX_BITS: usize = 424;

/// Opaque public key material, stored as the key pair's serialized form
/// (canonical S-expression wrapped in base64). Infrastructure parses this
/// into whatever the RSA implementation needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKeyMaterial(pub Vec<u8>);

/// Opaque private key material. Never logged or displayed; holders should
/// drop it promptly.
#[derive(Clone)]
pub struct PrivateKeyMaterial(pub Vec<u8>);

impl std::fmt::Debug for PrivateKeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrivateKeyMaterial").field("len", &self.0.len()).finish()
    }
}

pub trait KeyStore: Send + Sync {
    /// Generates a fresh RSA key pair with a modulus of `bits` bits.
    fn generate_key_pair(&self, bits: usize) -> BarResult<(PublicKeyMaterial, PrivateKeyMaterial)>;

    /// Wraps `random_key` (at most [`RANDOM_KEY_MAX_BITS`] bits) for
    /// `public_key`. The returned envelope's length equals `public_key`'s
    /// RSA modulus size in bytes.
    fn wrap_key(&self, public_key: &PublicKeyMaterial, random_key: &[u8]) -> BarResult<Vec<u8>>;

    /// Unwraps an envelope produced by [`KeyStore::wrap_key`], recovering
    /// the random key.
    fn unwrap_key(&self, private_key: &PrivateKeyMaterial, envelope: &[u8]) -> BarResult<Vec<u8>>;
}
