// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! RSA key-pair storage and PKCS#1 v1.5-shaped key wrap.
//!
//! Key pairs are stored as a canonical S-expression (a handful of
//! `(tag #hex#)` forms) wrapped in base64, matching the textual key-file
//! format the archiver has always used. The session key is first shaped
//! into a fixed [`WRAP_ENVELOPE_LEN`]-byte PKCS#1 v1.5 plaintext block, then
//! RSA-encrypted; the resulting envelope's length equals the modulus size of
//! the key pair (e.g. 256 bytes for a 2048-bit key), not the 64-byte
//! plaintext block.

use base64::{engine::general_purpose::STANDARD, Engine};
use rand::rngs::OsRng;
use rsa::traits::{PrivateKeyParts, PublicKeyParts};
use rsa::{BigUint, RsaPrivateKey, RsaPublicKey};

use bar_domain::error::{BarError, BarResult};
use bar_domain::services::key_store::{
    KeyStore, PrivateKeyMaterial, PublicKeyMaterial, RANDOM_KEY_MAX_BITS, WRAP_ENVELOPE_LEN,
};

pub struct RsaKeyStore;

impl KeyStore for RsaKeyStore {
    fn generate_key_pair(&self, bits: usize) -> BarResult<(PublicKeyMaterial, PrivateKeyMaterial)> {
        let private =
            RsaPrivateKey::new(&mut OsRng, bits).map_err(|e| BarError::crypto(format!("RSA key generation failed: {e}")))?;
        let public = RsaPublicKey::from(&private);
        Ok((
            PublicKeyMaterial(encode_public(&public)),
            PrivateKeyMaterial(encode_private(&private)),
        ))
    }

    fn wrap_key(&self, public_key: &PublicKeyMaterial, random_key: &[u8]) -> BarResult<Vec<u8>> {
        if random_key.len() * 8 > RANDOM_KEY_MAX_BITS {
            return Err(BarError::crypto(format!(
                "random key too long for wrap envelope: {} bits > {RANDOM_KEY_MAX_BITS}",
                random_key.len() * 8
            )));
        }
        let public = decode_public(&public_key.0)?;
        let modulus_len = public.n().to_bytes_be().len();

        let mut message = [0u8; WRAP_ENVELOPE_LEN];
        message[0] = 0x00;
        message[1] = 0x02;
        let padding_len = WRAP_ENVELOPE_LEN - random_key.len() - 3;
        let mut padding = vec![0u8; padding_len];
        rand::RngCore::fill_bytes(&mut OsRng, &mut padding);
        for b in &mut padding {
            if *b == 0 {
                *b = 1; // padding bytes must be non-zero so the 0x00 separator is unambiguous
            }
        }
        message[2..2 + padding_len].copy_from_slice(&padding);
        message[2 + padding_len] = 0x00;
        message[2 + padding_len + 1..].copy_from_slice(random_key);

        let m = BigUint::from_bytes_be(&message);
        if m >= *public.n() {
            return Err(BarError::crypto("RSA modulus too small for the wrap envelope"));
        }
        let c = m.modpow(public.e(), public.n());
        let mut out = vec![0u8; modulus_len];
        let c_bytes = c.to_bytes_be();
        out[modulus_len - c_bytes.len()..].copy_from_slice(&c_bytes);
        Ok(out)
    }

    fn unwrap_key(&self, private_key: &PrivateKeyMaterial, envelope: &[u8]) -> BarResult<Vec<u8>> {
        let private = decode_private(&private_key.0)?;
        let c = BigUint::from_bytes_be(envelope);
        let m = c.modpow(private.d(), private.n());
        let mut message = vec![0u8; WRAP_ENVELOPE_LEN];
        let m_bytes = m.to_bytes_be();
        if m_bytes.len() > WRAP_ENVELOPE_LEN {
            return Err(BarError::auth("key envelope decrypted to an oversized block"));
        }
        // Left-pad: a decrypted MPI whose most-significant bytes happen to
        // be zero is shorter than WRAP_ENVELOPE_LEN once big-endian encoded.
        message[WRAP_ENVELOPE_LEN - m_bytes.len()..].copy_from_slice(&m_bytes);

        if message[0] != 0x00 || message[1] != 0x02 {
            return Err(BarError::auth("key envelope has invalid PKCS#1 header"));
        }
        let separator = message[2..]
            .iter()
            .position(|&b| b == 0x00)
            .ok_or_else(|| BarError::auth("key envelope is missing its padding separator"))?;
        Ok(message[2 + separator + 1..].to_vec())
    }
}

fn encode_public(key: &RsaPublicKey) -> Vec<u8> {
    let sexpr = format!(
        "(public-key (rsa (n #{}#) (e #{}#)))",
        hex::encode(key.n().to_bytes_be()),
        hex::encode(key.e().to_bytes_be())
    );
    STANDARD.encode(sexpr).into_bytes()
}

fn encode_private(key: &RsaPrivateKey) -> Vec<u8> {
    let primes = key.primes();
    let sexpr = format!(
        "(private-key (rsa (n #{}#) (e #{}#) (d #{}#) (p #{}#) (q #{}#)))",
        hex::encode(key.n().to_bytes_be()),
        hex::encode(key.e().to_bytes_be()),
        hex::encode(key.d().to_bytes_be()),
        hex::encode(primes[0].to_bytes_be()),
        hex::encode(primes[1].to_bytes_be()),
    );
    STANDARD.encode(sexpr).into_bytes()
}

fn sexpr_field(sexpr: &str, tag: &str) -> BarResult<BigUint> {
    let needle = format!("({tag} #");
    let start = sexpr
        .find(&needle)
        .ok_or_else(|| BarError::format(format!("key S-expression missing field {tag}")))?
        + needle.len();
    let end = sexpr[start..]
        .find('#')
        .ok_or_else(|| BarError::format(format!("key S-expression field {tag} not terminated")))?
        + start;
    let bytes = hex::decode(&sexpr[start..end]).map_err(|e| BarError::format(format!("invalid hex in {tag}: {e}")))?;
    Ok(BigUint::from_bytes_be(&bytes))
}

fn decode_public(material: &[u8]) -> BarResult<RsaPublicKey> {
    let raw = STANDARD
        .decode(material)
        .map_err(|e| BarError::format(format!("invalid base64 key material: {e}")))?;
    let sexpr = String::from_utf8(raw)?;
    let n = sexpr_field(&sexpr, "n")?;
    let e = sexpr_field(&sexpr, "e")?;
    RsaPublicKey::new(n, e).map_err(|err| BarError::crypto(format!("invalid RSA public key: {err}")))
}

fn decode_private(material: &[u8]) -> BarResult<RsaPrivateKey> {
    let raw = STANDARD
        .decode(material)
        .map_err(|e| BarError::format(format!("invalid base64 key material: {e}")))?;
    let sexpr = String::from_utf8(raw)?;
    let n = sexpr_field(&sexpr, "n")?;
    let e = sexpr_field(&sexpr, "e")?;
    let d = sexpr_field(&sexpr, "d")?;
    let p = sexpr_field(&sexpr, "p")?;
    let q = sexpr_field(&sexpr, "q")?;
    RsaPrivateKey::from_components(n, e, d, vec![p, q])
        .map_err(|err| BarError::crypto(format!("invalid RSA private key: {err}")))
}
