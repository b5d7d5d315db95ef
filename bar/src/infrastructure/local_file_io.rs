// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Synchronous [`ChunkIo`] over a local, seekable file.
//!
//! The chunk codec's writer back-patches chunk sizes by seeking backwards
//! mid-stream, which the async [`bar_domain::services::StorageBackend`] port
//! cannot offer (its writer side is append-only). Every archive part is
//! therefore staged as a plain local file through [`LocalFileChunkIo`]; once
//! a part closes, the application layer reads the finished file back and
//! hands it to the configured storage backend for upload.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use bar_domain::error::{BarError, BarResult};
use bar_domain::services::ChunkIo;

pub struct LocalFileChunkIo {
    file: File,
    len: u64,
}

impl LocalFileChunkIo {
    /// Creates (truncating if present) a staging file at `path`.
    pub fn create(path: impl AsRef<Path>) -> BarResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        Ok(Self { file, len: 0 })
    }

    /// Opens an existing staging file for reading (and writing, should the
    /// reader ever need to resume a partial restore).
    pub fn open(path: impl AsRef<Path>) -> BarResult<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let len = file.metadata()?.len();
        Ok(Self { file, len })
    }

    pub fn len(&self) -> u64 {
        self.len
    }
}

impl ChunkIo for LocalFileChunkIo {
    fn read_exact(&mut self, buf: &mut [u8]) -> BarResult<()> {
        self.file.read_exact(buf).map_err(BarError::from)
    }

    fn write_all(&mut self, buf: &[u8]) -> BarResult<()> {
        self.file.write_all(buf)?;
        let pos = self.file.stream_position()?;
        self.len = self.len.max(pos);
        Ok(())
    }

    fn tell(&mut self) -> BarResult<u64> {
        self.file.stream_position().map_err(BarError::from)
    }

    fn seek(&mut self, offset: u64) -> BarResult<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        Ok(())
    }

    fn eof(&mut self) -> BarResult<bool> {
        Ok(self.file.stream_position()? >= self.len)
    }
}

/// Allocates a fresh staging path under `dir` for part `index` of `stem`.
pub fn staging_path(dir: &Path, stem: &str, index: u32) -> PathBuf {
    dir.join(format!(".{stem}.part{index:06}.staging"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_seek_back_and_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("part.staging");
        let mut io = LocalFileChunkIo::create(&path).unwrap();

        io.write_all(b"header--").unwrap();
        io.write_all(b"body").unwrap();
        assert_eq!(io.tell().unwrap(), 12);

        io.seek(0).unwrap();
        io.write_all(b"HEADER--").unwrap();
        io.seek(12).unwrap();
        assert!(io.eof().unwrap());

        io.seek(0).unwrap();
        let mut buf = [0u8; 12];
        io.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"HEADER--body");
    }

    #[test]
    fn reopen_reports_existing_length() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("part.staging");
        {
            let mut io = LocalFileChunkIo::create(&path).unwrap();
            io.write_all(b"0123456789").unwrap();
        }
        let io = LocalFileChunkIo::open(&path).unwrap();
        assert_eq!(io.len(), 10);
    }
}
