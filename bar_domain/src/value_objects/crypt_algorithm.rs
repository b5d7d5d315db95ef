// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Symmetric cipher algorithm catalog.
//!
//! All algorithms run in CBC mode with ciphertext stealing, so the archive
//! never pads plaintext to a block boundary. `None` is a degenerate
//! passthrough with a 4-byte effective block length, used when an archive is
//! only compressed, not encrypted.

use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CryptAlgorithm {
    None,
    TripleDes,
    Cast5,
    Blowfish,
    Aes128,
    Aes192,
    Aes256,
    Twofish128,
    Twofish256,
}

impl CryptAlgorithm {
    pub const ALL: [CryptAlgorithm; 9] = [
        Self::None,
        Self::TripleDes,
        Self::Cast5,
        Self::Blowfish,
        Self::Aes128,
        Self::Aes192,
        Self::Aes256,
        Self::Twofish128,
        Self::Twofish256,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::TripleDes => "3DES",
            Self::Cast5 => "CAST5",
            Self::Blowfish => "BLOWFISH",
            Self::Aes128 => "AES128",
            Self::Aes192 => "AES192",
            Self::Aes256 => "AES256",
            Self::Twofish128 => "TWOFISH128",
            Self::Twofish256 => "TWOFISH256",
        }
    }

    /// Key length in bytes.
    pub fn key_len(self) -> usize {
        match self {
            Self::None => 0,
            Self::TripleDes => 24,
            Self::Cast5 => 16,
            Self::Blowfish => 16,
            Self::Aes128 => 16,
            Self::Aes192 => 24,
            Self::Aes256 => 32,
            Self::Twofish128 => 16,
            Self::Twofish256 => 32,
        }
    }

    /// Cipher block length in bytes. `None` uses a 4-byte effective block so
    /// the IV-reset/seek granularity still lines up with real ciphers.
    pub fn block_len(self) -> usize {
        match self {
            Self::None => 4,
            Self::TripleDes | Self::Cast5 | Self::Blowfish => 8,
            Self::Aes128 | Self::Aes192 | Self::Aes256 | Self::Twofish128 | Self::Twofish256 => 16,
        }
    }

    pub fn is_none(self) -> bool {
        matches!(self, Self::None)
    }

    /// Wire id for the FILE chunk's `cryptAlgorithm` field: position in
    /// [`CryptAlgorithm::ALL`]'s fixed table order.
    pub fn to_id(self) -> u32 {
        Self::ALL.iter().position(|&a| a == self).expect("ALL is exhaustive") as u32
    }

    pub fn from_id(id: u32) -> crate::error::BarResult<Self> {
        Self::ALL
            .get(id as usize)
            .copied()
            .ok_or_else(|| crate::error::BarError::format(format!("unknown crypt algorithm id: {id}")))
    }
}

impl fmt::Display for CryptAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for CryptAlgorithm {
    type Err = crate::error::BarError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|a| a.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| crate::error::BarError::configuration(format!("unknown crypt algorithm: {s}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_has_smallest_block_length() {
        assert_eq!(CryptAlgorithm::None.block_len(), 4);
    }

    #[test]
    fn names_round_trip_through_from_str() {
        for algo in CryptAlgorithm::ALL {
            assert_eq!(algo.name().parse::<CryptAlgorithm>().unwrap(), algo);
        }
    }

    #[test]
    fn unknown_name_is_a_configuration_error() {
        assert!("rot13".parse::<CryptAlgorithm>().is_err());
    }

    #[test]
    fn wire_ids_round_trip_in_table_order() {
        assert_eq!(CryptAlgorithm::None.to_id(), 0);
        for (i, algo) in CryptAlgorithm::ALL.into_iter().enumerate() {
            assert_eq!(algo.to_id(), i as u32);
            assert_eq!(CryptAlgorithm::from_id(i as u32).unwrap(), algo);
        }
        assert!(CryptAlgorithm::from_id(CryptAlgorithm::ALL.len() as u32).is_err());
    }
}
