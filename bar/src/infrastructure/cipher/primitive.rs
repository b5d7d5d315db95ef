// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Single-block encrypt/decrypt, abstracted over the concrete RustCrypto
//! cipher types so the CBC+CTS driver in the parent module stays algorithm-
//! agnostic.

use aes::{Aes128, Aes192, Aes256};
use blowfish::Blowfish;
use cast5::Cast5;
use cipher::{generic_array::GenericArray, BlockDecrypt, BlockEncrypt, KeyInit};
use des::TdesEde3;
use twofish::Twofish;

use bar_domain::error::{BarError, BarResult};
use bar_domain::value_objects::CryptAlgorithm;

pub(super) trait BlockCipherPrimitive: Send {
    fn block_size(&self) -> usize;
    fn encrypt_block(&self, block: &mut [u8]);
    fn decrypt_block(&self, block: &mut [u8]);
}

macro_rules! impl_primitive {
    ($name:ident, $inner:ty, $size:literal) => {
        struct $name($inner);

        impl BlockCipherPrimitive for $name {
            fn block_size(&self) -> usize {
                $size
            }

            fn encrypt_block(&self, block: &mut [u8]) {
                let ga = GenericArray::from_mut_slice(block);
                self.0.encrypt_block(ga);
            }

            fn decrypt_block(&self, block: &mut [u8]) {
                let ga = GenericArray::from_mut_slice(block);
                self.0.decrypt_block(ga);
            }
        }
    };
}

impl_primitive!(TripleDesPrimitive, TdesEde3, 8);
impl_primitive!(Cast5Primitive, Cast5, 8);
impl_primitive!(BlowfishPrimitive, Blowfish, 8);
impl_primitive!(Aes128Primitive, Aes128, 16);
impl_primitive!(Aes192Primitive, Aes192, 16);
impl_primitive!(Aes256Primitive, Aes256, 16);
impl_primitive!(TwofishPrimitive, Twofish, 16);

pub(super) fn build(algorithm: CryptAlgorithm, key: &[u8]) -> BarResult<Box<dyn BlockCipherPrimitive>> {
    let bad_key = |e: cipher::InvalidLength| BarError::crypto(format!("invalid key for {algorithm}: {e}"));
    Ok(match algorithm {
        CryptAlgorithm::None => unreachable!("CryptAlgorithm::None has no block cipher primitive"),
        CryptAlgorithm::TripleDes => Box::new(TripleDesPrimitive(TdesEde3::new_from_slice(key).map_err(bad_key)?)),
        CryptAlgorithm::Cast5 => Box::new(Cast5Primitive(Cast5::new_from_slice(key).map_err(bad_key)?)),
        CryptAlgorithm::Blowfish => Box::new(BlowfishPrimitive(Blowfish::new_from_slice(key).map_err(bad_key)?)),
        CryptAlgorithm::Aes128 => Box::new(Aes128Primitive(Aes128::new_from_slice(key).map_err(bad_key)?)),
        CryptAlgorithm::Aes192 => Box::new(Aes192Primitive(Aes192::new_from_slice(key).map_err(bad_key)?)),
        CryptAlgorithm::Aes256 => Box::new(Aes256Primitive(Aes256::new_from_slice(key).map_err(bad_key)?)),
        CryptAlgorithm::Twofish128 | CryptAlgorithm::Twofish256 => {
            Box::new(TwofishPrimitive(Twofish::new_from_slice(key).map_err(bad_key)?))
        }
    })
}
