// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! TLV chunk codec.
//!
//! Chunks nest: opening a chunk pushes a scope onto an internal stack that
//! remembers where its header's size field lives in the underlying stream,
//! so [`ChunkWriter::close`] can seek back and patch in the final size once
//! the chunk's body (including any nested chunks) has been written. Reading
//! is the mirror image: [`ChunkReader::next`] decodes a header without
//! consuming its body, and the caller either [`ChunkReader::enter`]s it to
//! read fields, or [`ChunkReader::skip`]s straight past it.
//!
//! Both [`ChunkWriter`] and [`ChunkReader`] own their [`ChunkIo`] rather than
//! borrowing it, so the archive writer/reader can hold one across many
//! `new_file`/`write_file_data`/`close_file` calls instead of re-threading a
//! borrow through every method.

use bar_domain::error::{BarError, BarResult};
use bar_domain::services::ChunkIo;
use bar_domain::value_objects::{ChunkHeader, ChunkId};

struct Scope {
    /// Stream offset of this chunk's header (where its size field starts).
    header_offset: u64,
    /// Bytes written into the chunk body so far.
    running_size: u64,
}

/// Writes a nested stream of chunks onto a [`ChunkIo`] sink, back-patching
/// each chunk's size when it closes.
pub struct ChunkWriter<IO> {
    io: IO,
    stack: Vec<Scope>,
}

impl<IO: ChunkIo> ChunkWriter<IO> {
    pub fn new(io: IO) -> Self {
        Self { io, stack: Vec::new() }
    }

    pub fn get_mut(&mut self) -> &mut IO {
        &mut self.io
    }

    /// Unwraps the codec, returning its underlying I/O. Panics if any
    /// chunk is still open; callers must [`ChunkWriter::close`] every
    /// [`ChunkWriter::open`] first.
    pub fn into_inner(self) -> IO {
        assert!(self.stack.is_empty(), "into_inner() with an open chunk scope");
        self.io
    }

    pub fn tell(&mut self) -> BarResult<u64> {
        self.io.tell()
    }

    /// Writes a provisional header (size 0) and pushes a new scope.
    pub fn open(&mut self, id: ChunkId) -> BarResult<()> {
        let header_offset = self.io.tell()?;
        self.io.write_all(&id.0.to_be_bytes())?;
        self.io.write_all(&0u64.to_be_bytes())?;
        if let Some(parent) = self.stack.last_mut() {
            parent.running_size += ChunkHeader::WIRE_SIZE;
        }
        self.stack.push(Scope { header_offset, running_size: 0 });
        Ok(())
    }

    /// Writes raw bytes into the currently open chunk's body.
    pub fn write_data(&mut self, data: &[u8]) -> BarResult<()> {
        self.io.write_all(data)?;
        for scope in &mut self.stack {
            scope.running_size += data.len() as u64;
        }
        Ok(())
    }

    /// Seeks back and patches in the final size, then returns to the
    /// current write position. Pops the scope and folds its total size
    /// (header + body) into the parent's running size, if any.
    pub fn close(&mut self) -> BarResult<()> {
        let scope = self
            .stack
            .pop()
            .ok_or_else(|| BarError::format("close() with no open chunk"))?;
        let end = self.io.tell()?;
        self.io.seek(scope.header_offset + 4)?;
        self.io.write_all(&scope.running_size.to_be_bytes())?;
        self.io.seek(end)?;
        if let Some(parent) = self.stack.last_mut() {
            parent.running_size += ChunkHeader::WIRE_SIZE + scope.running_size;
        }
        Ok(())
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }
}

/// Reads a flat or nested stream of chunks from a [`ChunkIo`] source.
pub struct ChunkReader<IO> {
    io: IO,
    /// Stack of (end offset of the chunk's body) for chunks we've entered.
    stack: Vec<u64>,
}

impl<IO: ChunkIo> ChunkReader<IO> {
    pub fn new(io: IO) -> Self {
        Self { io, stack: Vec::new() }
    }

    pub fn get_mut(&mut self) -> &mut IO {
        &mut self.io
    }

    pub fn into_inner(self) -> IO {
        self.io
    }

    pub fn tell(&mut self) -> BarResult<u64> {
        self.io.tell()
    }

    /// Decodes the next chunk header without consuming its body. Returns
    /// `Ok(None)` at a clean end of archive (no bytes remain before this
    /// header would start).
    pub fn next(&mut self) -> BarResult<Option<ChunkHeader>> {
        if self.io.eof()? {
            return Ok(None);
        }
        let mut id_buf = [0u8; 4];
        let mut size_buf = [0u8; 8];
        self.io.read_exact(&mut id_buf)?;
        self.io.read_exact(&mut size_buf)?;
        Ok(Some(ChunkHeader::new(ChunkId(u32::from_be_bytes(id_buf)), u64::from_be_bytes(size_buf))))
    }

    /// Enters a chunk's body: subsequent reads are bounded to `header.size`
    /// bytes and [`ChunkReader::eof_sub`] reports when the body is exhausted.
    pub fn enter(&mut self, header: &ChunkHeader) -> BarResult<()> {
        let body_start = self.io.tell()?;
        let end = body_start.checked_add(header.size).ok_or_else(|| BarError::format("chunk size overflows offset"))?;
        if let Some(&parent_end) = self.stack.last() {
            if end > parent_end {
                return Err(BarError::format("child chunk size exceeds remaining bytes in parent"));
            }
        }
        self.stack.push(end);
        Ok(())
    }

    /// Skips straight past a chunk's body without entering it.
    pub fn skip(&mut self, header: &ChunkHeader) -> BarResult<()> {
        let pos = self.io.tell()?;
        self.io.seek(pos + header.size)?;
        Ok(())
    }

    /// True if the innermost entered chunk's body has been fully consumed.
    pub fn eof_sub(&mut self) -> BarResult<bool> {
        let end = *self
            .stack
            .last()
            .ok_or_else(|| BarError::format("eof_sub() with no entered chunk"))?;
        Ok(self.io.tell()? >= end)
    }

    /// Bytes remaining in the innermost entered chunk's body.
    pub fn remaining_sub(&mut self) -> BarResult<u64> {
        let end = *self
            .stack
            .last()
            .ok_or_else(|| BarError::format("remaining_sub() with no entered chunk"))?;
        Ok(end.saturating_sub(self.io.tell()?))
    }

    /// Leaves the current chunk scope, seeking to its declared end in case
    /// the caller didn't consume the whole body.
    pub fn leave(&mut self) -> BarResult<()> {
        let end = self
            .stack
            .pop()
            .ok_or_else(|| BarError::format("leave() with no entered chunk"))?;
        self.io.seek(end)?;
        Ok(())
    }

    pub fn read_data(&mut self, buf: &mut [u8]) -> BarResult<()> {
        self.io.read_exact(buf)
    }

    pub fn eof(&mut self) -> BarResult<bool> {
        self.io.eof()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Read, Seek, SeekFrom, Write};

    struct MemIo(Cursor<Vec<u8>>);

    impl ChunkIo for MemIo {
        fn read_exact(&mut self, buf: &mut [u8]) -> BarResult<()> {
            self.0.read_exact(buf).map_err(BarError::from)
        }
        fn write_all(&mut self, buf: &[u8]) -> BarResult<()> {
            self.0.write_all(buf).map_err(BarError::from)
        }
        fn tell(&mut self) -> BarResult<u64> {
            Ok(self.0.position())
        }
        fn seek(&mut self, offset: u64) -> BarResult<()> {
            self.0.seek(SeekFrom::Start(offset)).map_err(BarError::from)?;
            Ok(())
        }
        fn eof(&mut self) -> BarResult<bool> {
            Ok(self.0.position() as usize >= self.0.get_ref().len())
        }
    }

    fn mem() -> MemIo {
        MemIo(Cursor::new(Vec::new()))
    }

    #[test]
    fn nested_chunk_sizes_are_backpatched_on_close() {
        let mut w = ChunkWriter::new(mem());
        w.open(ChunkId::from_tag(b"FILE")).unwrap();
        w.open(ChunkId::from_tag(b"FENT")).unwrap();
        w.write_data(b"hello").unwrap();
        w.close().unwrap(); // FENT
        w.close().unwrap(); // FILE
        let mut io = w.into_inner();
        io.0.set_position(0);

        let mut r = ChunkReader::new(io);
        let outer = r.next().unwrap().unwrap();
        assert_eq!(outer.id, ChunkId::from_tag(b"FILE"));
        assert_eq!(outer.size, ChunkHeader::WIRE_SIZE + 5);
        r.enter(&outer).unwrap();

        let inner = r.next().unwrap().unwrap();
        assert_eq!(inner.id, ChunkId::from_tag(b"FENT"));
        assert_eq!(inner.size, 5);
        r.enter(&inner).unwrap();
        let mut buf = [0u8; 5];
        r.read_data(&mut buf).unwrap();
        assert_eq!(&buf, b"hello");
        assert!(r.eof_sub().unwrap());
        r.leave().unwrap();

        assert!(r.eof_sub().unwrap());
        r.leave().unwrap();
        assert!(r.eof().unwrap());
    }

    #[test]
    fn skip_jumps_past_unentered_chunk() {
        let mut w = ChunkWriter::new(mem());
        w.open(ChunkId::from_tag(b"FDAT")).unwrap();
        w.write_data(b"payload").unwrap();
        w.close().unwrap();
        w.open(ChunkId::from_tag(b"FENT")).unwrap();
        w.write_data(b"x").unwrap();
        w.close().unwrap();
        let mut io = w.into_inner();
        io.0.set_position(0);

        let mut r = ChunkReader::new(io);
        let first = r.next().unwrap().unwrap();
        r.skip(&first).unwrap();
        let second = r.next().unwrap().unwrap();
        assert_eq!(second.id, ChunkId::from_tag(b"FENT"));
    }

    #[test]
    fn next_at_clean_eof_returns_none_not_an_error() {
        let w = ChunkWriter::new(mem());
        let io = w.into_inner();
        let mut r = ChunkReader::new(io);
        assert!(r.next().unwrap().is_none());
    }

    #[test]
    fn child_size_exceeding_parent_remainder_is_a_format_error() {
        let mut w = ChunkWriter::new(mem());
        w.open(ChunkId::from_tag(b"FILE")).unwrap();
        w.write_data(b"ab").unwrap();
        w.close().unwrap();
        let mut io = w.into_inner();
        io.0.set_position(0);

        // Corrupt the outer size to claim a body far larger than the
        // remaining bytes actually hold.
        io.0.set_position(4);
        io.0.write_all(&[0xFF; 8]).unwrap();
        io.0.set_position(0);

        let mut r = ChunkReader::new(io);
        let outer = r.next().unwrap().unwrap();
        r.enter(&outer).unwrap();
        let err = r.next();
        // Reading past the real end of the stream surfaces as an I/O error
        // from the underlying reader, since the corrupted header claims
        // bytes that were never written.
        assert!(err.is_err());
    }
}
