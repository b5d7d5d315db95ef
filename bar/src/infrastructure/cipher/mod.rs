// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Symmetric cipher engine: CBC mode with ciphertext stealing over the
//! RustCrypto block cipher crates.
//!
//! CTS means the codec never pads plaintext to a block boundary: a chunk of
//! any length encrypts to the same number of bytes. Only the final two
//! blocks of a run need special handling (see [`cbc_cts_encrypt`]); full
//! multiples of the block size fall back to plain CBC.

mod primitive;

use bar_domain::error::{BarError, BarResult};
use bar_domain::services::{CipherEngine, CipherEngineFactory};
use bar_domain::value_objects::CryptAlgorithm;

use primitive::BlockCipherPrimitive;

/// Derives `algorithm`'s key from a deployed password: the first
/// `key_len()` bytes of the plaintext, zero-padded if the password is
/// shorter than the key.
pub fn derive_key(algorithm: CryptAlgorithm, password: &[u8]) -> Vec<u8> {
    let mut key = vec![0u8; algorithm.key_len()];
    let n = password.len().min(key.len());
    key[..n].copy_from_slice(&password[..n]);
    key
}

pub struct RustCryptoCipherFactory;

impl CipherEngineFactory for RustCryptoCipherFactory {
    fn create(&self, algorithm: CryptAlgorithm, key: &[u8]) -> BarResult<Box<dyn CipherEngine>> {
        if algorithm.is_none() {
            return Ok(Box::new(NoneEngine));
        }
        if key.len() != algorithm.key_len() {
            return Err(BarError::crypto(format!(
                "{algorithm} requires a {}-byte key, got {}",
                algorithm.key_len(),
                key.len()
            )));
        }
        let primitive = primitive::build(algorithm, key)?;
        Ok(Box::new(CbcCtsEngine {
            algorithm,
            primitive,
            iv: vec![0u8; algorithm.block_len()],
        }))
    }
}

/// `CryptAlgorithm::None`: the identity cipher. Used when an archive is
/// compressed but not encrypted; `reset` is a no-op.
struct NoneEngine;

impl CipherEngine for NoneEngine {
    fn algorithm(&self) -> CryptAlgorithm {
        CryptAlgorithm::None
    }

    fn reset(&mut self, _seed: u64) {}

    fn encrypt(&mut self, plaintext: &[u8]) -> BarResult<Vec<u8>> {
        Ok(plaintext.to_vec())
    }

    fn decrypt(&mut self, ciphertext: &[u8]) -> BarResult<Vec<u8>> {
        Ok(ciphertext.to_vec())
    }
}

struct CbcCtsEngine {
    algorithm: CryptAlgorithm,
    primitive: Box<dyn BlockCipherPrimitive>,
    iv: Vec<u8>,
}

impl CipherEngine for CbcCtsEngine {
    fn algorithm(&self) -> CryptAlgorithm {
        self.algorithm
    }

    fn reset(&mut self, seed: u64) {
        let seed_bytes = seed.to_le_bytes();
        for (i, b) in self.iv.iter_mut().enumerate() {
            *b = seed_bytes[i % 8];
        }
    }

    fn encrypt(&mut self, plaintext: &[u8]) -> BarResult<Vec<u8>> {
        let out = cbc_cts_encrypt(self.primitive.as_ref(), &self.iv, plaintext)?;
        // Block-aligned buffers (every call the writer makes: a full
        // compressor block, or a definition padded to the cipher's block
        // length) never trigger ciphertext stealing, so chaining the IV
        // forward here turns a sequence of per-block `encrypt` calls into
        // one continuous CBC stream, matching the "one logical byte stream
        // crosses cipher block boundaries without loss" requirement.
        let b = self.primitive.block_size();
        if !plaintext.is_empty() && plaintext.len() % b == 0 {
            self.iv = out[out.len() - b..].to_vec();
        }
        Ok(out)
    }

    fn decrypt(&mut self, ciphertext: &[u8]) -> BarResult<Vec<u8>> {
        let out = cbc_cts_decrypt(self.primitive.as_ref(), &self.iv, ciphertext)?;
        let b = self.primitive.block_size();
        if !ciphertext.is_empty() && ciphertext.len() % b == 0 {
            self.iv = ciphertext[ciphertext.len() - b..].to_vec();
        }
        Ok(out)
    }
}

fn xor_in_place(dst: &mut [u8], src: &[u8]) {
    for (d, s) in dst.iter_mut().zip(src) {
        *d ^= s;
    }
}

/// CBC encryption with ciphertext stealing (CS3: the final two ciphertext
/// blocks are emitted in original order, the last one truncated to the
/// length of the final partial plaintext block).
fn cbc_cts_encrypt(cipher: &dyn BlockCipherPrimitive, iv: &[u8], plaintext: &[u8]) -> BarResult<Vec<u8>> {
    let b = cipher.block_size();
    if plaintext.is_empty() {
        return Ok(Vec::new());
    }
    if plaintext.len() < b {
        return Err(BarError::crypto(format!(
            "ciphertext stealing needs at least one full block ({b} bytes), got {}",
            plaintext.len()
        )));
    }

    let full_blocks = plaintext.len() / b;
    let remainder = plaintext.len() % b;
    let mut out = Vec::with_capacity(plaintext.len());
    let mut prev: Vec<u8> = iv.to_vec();

    if remainder == 0 {
        // Exact multiple of the block size: plain CBC, no stealing needed.
        for chunk in plaintext.chunks(b) {
            let mut block = chunk.to_vec();
            xor_in_place(&mut block, &prev);
            cipher.encrypt_block(&mut block);
            out.extend_from_slice(&block);
            prev = block;
        }
        return Ok(out);
    }

    // All full blocks except the last one use plain CBC.
    let n_plain_blocks = full_blocks - 1;
    for chunk in plaintext[..n_plain_blocks * b].chunks(b) {
        let mut block = chunk.to_vec();
        xor_in_place(&mut block, &prev);
        cipher.encrypt_block(&mut block);
        out.extend_from_slice(&block);
        prev = block;
    }

    let second_last = &plaintext[n_plain_blocks * b..n_plain_blocks * b + b];
    let last = &plaintext[n_plain_blocks * b + b..];

    let mut temp = second_last.to_vec();
    xor_in_place(&mut temp, &prev);
    cipher.encrypt_block(&mut temp);

    let c_last: Vec<u8> = temp[..remainder].to_vec();
    let mut d = last.to_vec();
    d.extend_from_slice(&temp[remainder..]);
    xor_in_place(&mut d, &prev);
    cipher.encrypt_block(&mut d);

    out.extend_from_slice(&d);
    out.extend_from_slice(&c_last);
    Ok(out)
}

fn cbc_cts_decrypt(cipher: &dyn BlockCipherPrimitive, iv: &[u8], ciphertext: &[u8]) -> BarResult<Vec<u8>> {
    let b = cipher.block_size();
    if ciphertext.is_empty() {
        return Ok(Vec::new());
    }
    if ciphertext.len() < b {
        return Err(BarError::crypto(format!(
            "ciphertext stealing needs at least one full block ({b} bytes), got {}",
            ciphertext.len()
        )));
    }

    let remainder = ciphertext.len() % b;
    let mut out = Vec::with_capacity(ciphertext.len());
    let mut prev: Vec<u8> = iv.to_vec();

    if remainder == 0 {
        for chunk in ciphertext.chunks(b) {
            let mut block = chunk.to_vec();
            cipher.decrypt_block(&mut block);
            xor_in_place(&mut block, &prev);
            out.extend_from_slice(&block);
            prev = chunk.to_vec();
        }
        return Ok(out);
    }

    let n_full_output_blocks = ciphertext.len() / b - 1;
    for chunk in ciphertext[..n_full_output_blocks * b].chunks(b) {
        let mut block = chunk.to_vec();
        cipher.decrypt_block(&mut block);
        xor_in_place(&mut block, &prev);
        out.extend_from_slice(&block);
        prev = chunk.to_vec();
    }

    let c_second_last = &ciphertext[n_full_output_blocks * b..n_full_output_blocks * b + b];
    let c_last = &ciphertext[n_full_output_blocks * b + b..];

    let mut d = c_second_last.to_vec();
    cipher.decrypt_block(&mut d);
    xor_in_place(&mut d, &prev);

    let p_last = d[..remainder].to_vec();
    let temp_tail = d[remainder..].to_vec();

    let mut temp = c_last.to_vec();
    temp.extend_from_slice(&temp_tail);
    let mut p_second_last = temp.clone();
    cipher.decrypt_block(&mut p_second_last);
    xor_in_place(&mut p_second_last, &prev);

    out.extend_from_slice(&p_second_last);
    out.extend_from_slice(&p_last);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key_for(algo: CryptAlgorithm) -> Vec<u8> {
        (0..algo.key_len()).map(|i| i as u8).collect()
    }

    fn round_trip(algo: CryptAlgorithm, plaintext: &[u8]) {
        let factory = RustCryptoCipherFactory;
        let key = key_for(algo);
        let mut enc = factory.create(algo, &key).unwrap();
        let mut dec = factory.create(algo, &key).unwrap();
        enc.reset(0xDEAD_BEEF_1234_5678);
        dec.reset(0xDEAD_BEEF_1234_5678);

        let ciphertext = enc.encrypt(plaintext).unwrap();
        assert_eq!(ciphertext.len(), plaintext.len());
        let decrypted = dec.decrypt(&ciphertext).unwrap();
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn derive_key_zero_pads_a_short_password() {
        let key = derive_key(CryptAlgorithm::Aes256, b"short");
        assert_eq!(key.len(), 32);
        assert_eq!(&key[..5], b"short");
        assert!(key[5..].iter().all(|&b| b == 0));
    }

    #[test]
    fn derive_key_truncates_a_long_password() {
        let key = derive_key(CryptAlgorithm::Aes128, b"a password much longer than sixteen bytes");
        assert_eq!(key.len(), 16);
        assert_eq!(key, b"a password much ");
    }

    #[test]
    fn none_algorithm_is_identity() {
        round_trip(CryptAlgorithm::None, b"hello world, this is a test!");
    }

    #[test]
    fn aes256_round_trips_non_aligned_length() {
        round_trip(CryptAlgorithm::Aes256, b"not a multiple of sixteen bytes at all!!");
    }

    #[test]
    fn aes256_round_trips_exact_multiple_of_block() {
        round_trip(CryptAlgorithm::Aes256, &[7u8; 32]);
    }

    #[test]
    fn blowfish_round_trips_short_tail() {
        round_trip(CryptAlgorithm::Blowfish, b"exactly17bytes!!!");
    }

    #[test]
    fn twofish256_round_trips() {
        round_trip(CryptAlgorithm::Twofish256, b"twofish plaintext spanning several blocks, not aligned");
    }

    #[test]
    fn sequential_block_aligned_calls_chain_like_one_continuous_stream() {
        // The writer only ever calls `encrypt`/`decrypt` with a full,
        // block-length-aligned buffer per block (the compressor zero-pads
        // short final blocks before handing them over), so the realistic
        // streaming case is a sequence of exact-multiple-of-block-length
        // calls, never a short final call mid-stream.
        let factory = RustCryptoCipherFactory;
        let key = key_for(CryptAlgorithm::Aes128);
        let plaintext: Vec<u8> = (0..48u8).collect(); // three 16-byte blocks

        let whole = {
            let mut one_shot = factory.create(CryptAlgorithm::Aes128, &key).unwrap();
            one_shot.reset(7);
            one_shot.encrypt(&plaintext).unwrap()
        };

        let mut streaming = factory.create(CryptAlgorithm::Aes128, &key).unwrap();
        streaming.reset(7);
        let mut out = Vec::new();
        out.extend(streaming.encrypt(&plaintext[..16]).unwrap());
        out.extend(streaming.encrypt(&plaintext[16..32]).unwrap());
        out.extend(streaming.encrypt(&plaintext[32..]).unwrap());

        assert_eq!(out, whole);

        let mut dec = factory.create(CryptAlgorithm::Aes128, &key).unwrap();
        dec.reset(7);
        let mut restored = Vec::new();
        restored.extend(dec.decrypt(&out[..16]).unwrap());
        restored.extend(dec.decrypt(&out[16..32]).unwrap());
        restored.extend(dec.decrypt(&out[32..]).unwrap());
        assert_eq!(restored, plaintext);
    }

    #[test]
    fn reset_reproduces_iv_from_seed() {
        let factory = RustCryptoCipherFactory;
        let key = key_for(CryptAlgorithm::Aes128);
        let mut a = factory.create(CryptAlgorithm::Aes128, &key).unwrap();
        let mut b = factory.create(CryptAlgorithm::Aes128, &key).unwrap();
        a.reset(42);
        b.reset(42);
        assert_eq!(a.encrypt(b"same seed same iv!").unwrap(), b.encrypt(b"same seed same iv!").unwrap());
    }
}
