// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Chunk (TLV) primitives.
//!
//! An archive is a flat stream of chunks. Each chunk carries a 4-byte ASCII
//! id, an 8-byte size (the number of bytes following the header, not
//! including the header itself), and either scalar fields or nested
//! sub-chunks as its body. [`ChunkHeader::WIRE_SIZE`] is the on-disk size of
//! the header; the codec that reads and writes the rest of the bytes lives in
//! infrastructure.

use std::fmt;

/// A 4-byte chunk identifier, always a 4-character ASCII tag (e.g. `b"FILE"`)
/// packed big-endian into a `u32`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChunkId(pub u32);

impl ChunkId {
    pub const fn from_tag(tag: &[u8; 4]) -> Self {
        Self(((tag[0] as u32) << 24) | ((tag[1] as u32) << 16) | ((tag[2] as u32) << 8) | (tag[3] as u32))
    }

    pub fn tag(self) -> [u8; 4] {
        [
            (self.0 >> 24) as u8,
            (self.0 >> 16) as u8,
            (self.0 >> 8) as u8,
            self.0 as u8,
        ]
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match std::str::from_utf8(&self.tag()) {
            Ok(s) if s.chars().all(|c| c.is_ascii_graphic()) => write!(f, "{s}"),
            _ => write!(f, "{:#010x}", self.0),
        }
    }
}

/// Top-level chunk ids the archive pipeline understands. Application-level
/// chunk ids beyond these three are opaque to the codec and simply skipped.
pub const CHUNK_ID_FILE: ChunkId = ChunkId::from_tag(b"FILE");
pub const CHUNK_ID_FILE_ENTRY: ChunkId = ChunkId::from_tag(b"FENT");
pub const CHUNK_ID_FILE_DATA: ChunkId = ChunkId::from_tag(b"FDAT");

/// Header that precedes every chunk's body on the wire: a 4-byte id and an
/// 8-byte big-endian size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkHeader {
    pub id: ChunkId,
    /// Size of the chunk body in bytes, not including this header.
    pub size: u64,
}

impl ChunkHeader {
    /// Size in bytes of the encoded header: 4 (id) + 8 (size).
    pub const WIRE_SIZE: u64 = 4 + 8;

    pub fn new(id: ChunkId, size: u64) -> Self {
        Self { id, size }
    }
}

/// Scalar field kinds a chunk's fixed-layout portion may contain, mirroring
/// the archiver's on-disk field tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Int8,
    Int16,
    Int32,
    Int64,
    /// Length-prefixed UTF-8 name (a path component or file name).
    Name,
    /// Length-prefixed opaque byte blob (e.g. file contents within a
    /// `FDAT` chunk).
    Data,
    /// A CRC32 trailer covering the preceding fields in the same chunk.
    Crc32,
}
