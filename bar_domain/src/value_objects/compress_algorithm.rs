// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Compression algorithm catalog: `none`, or deflate at levels 0-9.

use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompressAlgorithm {
    None,
    /// Deflate at the given level, 0 (store) through 9 (max compression).
    Zip(u8),
}

impl CompressAlgorithm {
    pub fn level(self) -> u8 {
        match self {
            Self::None => 0,
            Self::Zip(level) => level,
        }
    }

    pub fn is_none(self) -> bool {
        matches!(self, Self::None)
    }

    /// Wire id for the FILE chunk's `compressAlgorithm` field: 0 for
    /// `none`, 1..=10 for `zip0..zip9` (note the off-by-one: `zip0` is id
    /// 1, not 0).
    pub fn to_id(self) -> u32 {
        match self {
            Self::None => 0,
            Self::Zip(level) => level as u32 + 1,
        }
    }

    pub fn from_id(id: u32) -> crate::error::BarResult<Self> {
        match id {
            0 => Ok(Self::None),
            1..=10 => Ok(Self::Zip((id - 1) as u8)),
            other => Err(crate::error::BarError::format(format!("unknown compress algorithm id: {other}"))),
        }
    }
}

impl fmt::Display for CompressAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Zip(level) => write!(f, "zip{level}"),
        }
    }
}

impl FromStr for CompressAlgorithm {
    type Err = crate::error::BarError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("none") {
            return Ok(Self::None);
        }
        let digits = s
            .strip_prefix("zip")
            .ok_or_else(|| crate::error::BarError::configuration(format!("unknown compress algorithm: {s}")))?;
        let level: u8 = digits
            .parse()
            .map_err(|_| crate::error::BarError::configuration(format!("invalid compression level: {s}")))?;
        if level > 9 {
            return Err(crate::error::BarError::configuration(format!(
                "compression level out of range 0..=9: {level}"
            )));
        }
        Ok(Self::Zip(level))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zip_levels_round_trip() {
        for level in 0..=9 {
            let algo = CompressAlgorithm::Zip(level);
            assert_eq!(algo.to_string().parse::<CompressAlgorithm>().unwrap(), algo);
        }
    }

    #[test]
    fn level_above_nine_is_rejected() {
        assert!("zip10".parse::<CompressAlgorithm>().is_err());
    }

    #[test]
    fn wire_ids_round_trip() {
        assert_eq!(CompressAlgorithm::None.to_id(), 0);
        assert_eq!(CompressAlgorithm::Zip(0).to_id(), 1);
        assert_eq!(CompressAlgorithm::Zip(9).to_id(), 10);
        for level in 0..=9 {
            let algo = CompressAlgorithm::Zip(level);
            assert_eq!(CompressAlgorithm::from_id(algo.to_id()).unwrap(), algo);
        }
        assert_eq!(CompressAlgorithm::from_id(0).unwrap(), CompressAlgorithm::None);
        assert!(CompressAlgorithm::from_id(11).is_err());
    }
}
