// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Archive writer: turns a stream of `(metadata, data)` file entries into a
//! sequence of `FILE`/`FILE_ENTRY`/`FILE_DATA` chunks, compressing and
//! encrypting each entry's data block by block and rotating to a new part
//! file whenever the configured [`PartSize`] would otherwise be exceeded.
//!
//! Every part is staged on local disk through [`LocalFileChunkIo`] (the
//! codec back-patches chunk sizes by seeking backwards, which the async
//! storage backends can't support), then handed to the configured
//! [`StorageBackend`] for upload once its header and body are final.

use std::path::PathBuf;
use std::sync::Arc;

use bar_domain::error::{BarError, BarResult};
use bar_domain::services::{ChunkIo, CipherEngine, CipherEngineFactory, Compressor, StorageBackend};
use bar_domain::value_objects::{
    ChunkHeader, CompressAlgorithm, CryptAlgorithm, FileMetadata, PartSize, CHUNK_ID_FILE, CHUNK_ID_FILE_DATA,
    CHUNK_ID_FILE_ENTRY,
};

use crate::infrastructure::chunk_codec::ChunkWriter;
use crate::infrastructure::compression::DeflateCompressor;
use crate::infrastructure::local_file_io::{staging_path, LocalFileChunkIo};

use super::wire::{encode_file_data_header, encode_file_entry, encode_file_header, encrypt_as_unit};

pub struct ArchiveWriterConfig {
    /// Archive base name (without a part suffix); may be a bare file name
    /// or a backend-specific remote path.
    pub stem: String,
    pub part_size: PartSize,
    pub compress_algorithm: CompressAlgorithm,
    pub crypt_algorithm: CryptAlgorithm,
    /// Already-derived symmetric key (see `infrastructure::cipher::derive_key`
    /// or an unwrapped session key from the key store). Ignored when
    /// `crypt_algorithm` is `None`.
    pub key: Vec<u8>,
    pub cipher_factory: Arc<dyn CipherEngineFactory>,
    pub storage: Arc<dyn StorageBackend>,
    /// Local directory parts are staged in before upload.
    pub tmp_dir: PathBuf,
}

struct OpenEntry {
    metadata: FileMetadata,
    compressor: Box<dyn Compressor>,
    /// Offset in `FILE_DATA`'s header-fields block, in the current part's
    /// staging file, so `finalize_segment` can seek back and patch in the
    /// final `partSize`.
    fdat_header_offset: u64,
    data_header_cipher: Box<dyn CipherEngine>,
    data_body_cipher: Box<dyn CipherEngine>,
    /// Cumulative compressed+encrypted bytes already closed out for this
    /// entry in earlier parts.
    part_offset: u64,
    /// Compressed+encrypted bytes written into the currently open
    /// `FILE_DATA` chunk.
    part_size: u64,
}

/// Writes one archive: a sequence of part files, each a flat run of
/// `FILE` chunks.
pub struct ArchiveWriter {
    stem: String,
    part_size: PartSize,
    compress_algorithm: CompressAlgorithm,
    crypt_algorithm: CryptAlgorithm,
    key: Vec<u8>,
    cipher_factory: Arc<dyn CipherEngineFactory>,
    block_len: usize,
    storage: Arc<dyn StorageBackend>,
    tmp_dir: PathBuf,
    part_index: u32,
    writer: Option<ChunkWriter<LocalFileChunkIo>>,
    staging_path: Option<PathBuf>,
    entry: Option<OpenEntry>,
    files_written: u64,
    bytes_written: u64,
}

impl ArchiveWriter {
    pub fn new(config: ArchiveWriterConfig) -> Self {
        let block_len = config.crypt_algorithm.block_len();
        Self {
            stem: config.stem,
            part_size: config.part_size,
            compress_algorithm: config.compress_algorithm,
            crypt_algorithm: config.crypt_algorithm,
            key: config.key,
            cipher_factory: config.cipher_factory,
            block_len,
            storage: config.storage,
            tmp_dir: config.tmp_dir,
            part_index: 0,
            writer: None,
            staging_path: None,
            entry: None,
            files_written: 0,
            bytes_written: 0,
        }
    }

    pub fn files_written(&self) -> u64 {
        self.files_written
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    fn new_cipher(&self) -> BarResult<Box<dyn CipherEngine>> {
        self.cipher_factory.create(self.crypt_algorithm, &self.key)
    }

    /// On-wire size of one entry's headers: the `FILE` chunk's own two
    /// algorithm fields, a full `FILE_ENTRY` chunk, and an empty `FILE_DATA`
    /// chunk (just its 16-byte offset/size fields, aligned).
    fn header_length(&self, name: &str) -> u64 {
        let fent_len = super::wire::align_up(44 + 2 + name.len(), self.block_len) as u64;
        let fdat_len = super::wire::align_up(super::wire::FILE_DATA_HEADER_LEN, self.block_len) as u64;
        (ChunkHeader::WIRE_SIZE + 8) + (ChunkHeader::WIRE_SIZE + fent_len) + (ChunkHeader::WIRE_SIZE + fdat_len)
    }

    /// Opens a part file if none is open, or rotates if writing `header_len`
    /// more bytes of headers would cross the part boundary.
    async fn ensure_part_for_headers(&mut self, header_len: u64) -> BarResult<()> {
        let need_new = match &mut self.writer {
            None => true,
            Some(w) => match self.part_size {
                PartSize::Unlimited => false,
                PartSize::Bytes(limit) => w.tell()? + header_len >= limit,
            },
        };
        if need_new {
            self.close_current_part().await?;
            self.open_new_part()?;
        }
        Ok(())
    }

    fn open_new_part(&mut self) -> BarResult<()> {
        let path = staging_path(&self.tmp_dir, &self.stem, self.part_index);
        let io = LocalFileChunkIo::create(&path)?;
        self.writer = Some(ChunkWriter::new(io));
        self.staging_path = Some(path);
        Ok(())
    }

    /// Closes the current part's staging file (if any) and uploads it to
    /// the configured storage backend, under the part's numbered name.
    async fn close_current_part(&mut self) -> BarResult<()> {
        let Some(writer) = self.writer.take() else {
            return Ok(());
        };
        let path = self.staging_path.take().expect("writer and staging_path are set together");
        drop(writer.into_inner());

        let bytes = std::fs::read(&path)?;
        let remote_name = bar_domain::value_objects::part_size::part_file_name(&self.stem, self.part_size, self.part_index);
        let mut remote_writer = self.storage.create(&remote_name).await?;
        remote_writer.write(&bytes).await?;
        remote_writer.sync().await?;
        remote_writer.close().await?;
        let _ = std::fs::remove_file(&path);

        self.part_index += 1;
        Ok(())
    }

    /// Opens fresh `FILE`/`FILE_ENTRY`/`FILE_DATA` chunks for `meta`,
    /// rotating to a new part first if needed. `part_offset` is the
    /// cumulative compressed+encrypted byte count already written for this
    /// entry in earlier parts (0 for a brand new entry).
    async fn open_entry_segment(
        &mut self,
        meta: &FileMetadata,
        part_offset: u64,
    ) -> BarResult<(u64, Box<dyn CipherEngine>, Box<dyn CipherEngine>)> {
        let header_len = self.header_length(&meta.name);
        self.ensure_part_for_headers(header_len).await?;
        let writer = self.writer.as_mut().expect("ensure_part_for_headers opens a part");

        writer.open(CHUNK_ID_FILE)?;
        writer.write_data(&encode_file_header(self.compress_algorithm.to_id(), self.crypt_algorithm.to_id()))?;

        writer.open(CHUNK_ID_FILE_ENTRY)?;
        let mut entry_cipher = self.new_cipher()?;
        let fent_ciphertext = encrypt_as_unit(entry_cipher.as_mut(), self.block_len, &encode_file_entry(meta))?;
        writer.write_data(&fent_ciphertext)?;
        writer.close()?;

        writer.open(CHUNK_ID_FILE_DATA)?;
        let fdat_header_offset = writer.tell()?;
        let mut data_header_cipher = self.new_cipher()?;
        let placeholder = encrypt_as_unit(data_header_cipher.as_mut(), self.block_len, &encode_file_data_header(part_offset, 0))?;
        writer.write_data(&placeholder)?;
        // FILE and FILE_DATA stay open: bulk data is still to come.

        let mut data_body_cipher = self.new_cipher()?;
        data_body_cipher.reset(0);

        Ok((fdat_header_offset, data_header_cipher, data_body_cipher))
    }

    /// Back-patches the currently open `FILE_DATA`'s offset/size fields and
    /// closes `FILE_DATA` and `FILE`.
    fn finalize_segment(&mut self) -> BarResult<()> {
        let entry = self.entry.as_mut().ok_or_else(|| BarError::format("no open entry to finalize"))?;
        let writer = self.writer.as_mut().ok_or_else(|| BarError::format("no open part while an entry is open"))?;

        let resume_at = writer.tell()?;
        writer.get_mut().seek(entry.fdat_header_offset)?;
        let updated = encrypt_as_unit(
            entry.data_header_cipher.as_mut(),
            self.block_len,
            &encode_file_data_header(entry.part_offset, entry.part_size),
        )?;
        writer.get_mut().write_all(&updated)?;
        writer.get_mut().seek(resume_at)?;

        writer.close()?; // FILE_DATA
        writer.close()?; // FILE
        Ok(())
    }

    /// Closes out the current part mid-entry and reopens a fresh segment
    /// for the same entry, continuing its `partOffset`.
    async fn rotate_entry_segment(&mut self) -> BarResult<()> {
        self.finalize_segment()?;
        let (meta, new_offset) = {
            let entry = self.entry.as_ref().expect("checked by finalize_segment");
            (entry.metadata.clone(), entry.part_offset + entry.part_size)
        };
        self.close_current_part().await?;
        self.open_new_part()?;
        let (fdat_header_offset, data_header_cipher, data_body_cipher) = self.open_entry_segment(&meta, new_offset).await?;
        let entry = self.entry.as_mut().expect("set before this call");
        entry.fdat_header_offset = fdat_header_offset;
        entry.data_header_cipher = data_header_cipher;
        entry.data_body_cipher = data_body_cipher;
        entry.part_offset = new_offset;
        entry.part_size = 0;
        Ok(())
    }

    /// Starts a new archive entry. Errors if one is already open.
    pub async fn new_file(&mut self, meta: FileMetadata) -> BarResult<()> {
        if self.entry.is_some() {
            return Err(BarError::format("new_file called while an entry is still open"));
        }
        let (fdat_header_offset, data_header_cipher, data_body_cipher) = self.open_entry_segment(&meta, 0).await?;
        let compressor = Box::new(DeflateCompressor::compressor(self.compress_algorithm, self.block_len));
        self.entry = Some(OpenEntry {
            metadata: meta,
            compressor,
            fdat_header_offset,
            data_header_cipher,
            data_body_cipher,
            part_offset: 0,
            part_size: 0,
        });
        self.files_written += 1;
        Ok(())
    }

    /// Feeds raw file bytes through the compressor, draining and encrypting
    /// every full cipher block as it becomes available. Per the "whenever
    /// `block_is_full()`" contract, a non-full remainder is left staged in
    /// the compressor rather than emitted early; only `close_file`'s flush
    /// may emit a final, zero-padded short block.
    pub async fn write_file_data(&mut self, bytes: &[u8]) -> BarResult<()> {
        {
            let entry = self.entry.as_mut().ok_or_else(|| BarError::format("write_file_data called with no open entry"))?;
            entry.compressor.put_block(bytes)?;
        }
        while self.entry.as_ref().expect("set above").compressor.block_is_full() {
            self.emit_one_block().await?;
        }
        Ok(())
    }

    /// Pulls one cipher-block's worth of compressed bytes out of the
    /// entry's compressor (zero-padded only when the compressor has no more
    /// than a short residual left, which callers must only reach after
    /// `flush`), rotates the part if needed, encrypts, and appends it to the
    /// open `FILE_DATA` chunk. Returns `false` once the compressor has
    /// nothing left to give.
    async fn emit_one_block(&mut self) -> BarResult<bool> {
        let block_len = self.block_len;
        let mut buf = vec![0u8; block_len];
        let n = {
            let entry = self.entry.as_mut().expect("checked by caller");
            entry.compressor.get_block(&mut buf)?
        };
        if n == 0 {
            return Ok(false);
        }

        if let PartSize::Bytes(limit) = self.part_size {
            let current = self.writer.as_mut().expect("entry implies an open part").tell()?;
            if current + block_len as u64 > limit {
                self.rotate_entry_segment().await?;
            }
        }

        let ciphertext = {
            let entry = self.entry.as_mut().expect("checked above");
            entry.data_body_cipher.encrypt(&buf)?
        };
        self.writer.as_mut().expect("entry implies an open part").write_data(&ciphertext)?;

        let entry = self.entry.as_mut().expect("checked above");
        entry.part_size += n as u64;
        self.bytes_written += n as u64;
        Ok(true)
    }

    /// Flushes the compressor, drains every remaining full block plus the
    /// final zero-padded residual (if any), and closes the entry's chunks.
    pub async fn close_file(&mut self) -> BarResult<()> {
        {
            let entry = self.entry.as_mut().ok_or_else(|| BarError::format("close_file called with no open entry"))?;
            entry.compressor.flush()?;
        }
        while self.emit_one_block().await? {}
        self.finalize_segment()?;
        self.entry = None;
        Ok(())
    }

    /// Closes out the final part. Must be called after every entry is
    /// closed; the writer must not be reused afterward.
    pub async fn finish(&mut self) -> BarResult<()> {
        if self.entry.is_some() {
            return Err(BarError::format("finish called with an entry still open"));
        }
        self.close_current_part().await
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex as StdMutex;

    use async_trait::async_trait;

    use bar_domain::services::{StorageReader, StorageWriter};
    use bar_domain::value_objects::part_size::part_file_name;

    use crate::infrastructure::cipher::{derive_key, RustCryptoCipherFactory};

    use super::*;

    struct MemoryBackend {
        files: Arc<StdMutex<HashMap<String, Vec<u8>>>>,
    }

    impl MemoryBackend {
        fn new() -> Arc<Self> {
            Arc::new(Self { files: Arc::new(StdMutex::new(HashMap::new())) })
        }

        fn get(&self, path: &str) -> Vec<u8> {
            self.files.lock().unwrap().get(path).cloned().unwrap_or_default()
        }
    }

    struct MemoryWriter {
        files: Arc<StdMutex<HashMap<String, Vec<u8>>>>,
        path: String,
        buf: Vec<u8>,
    }

    #[async_trait]
    impl StorageWriter for MemoryWriter {
        async fn write(&mut self, data: &[u8]) -> BarResult<()> {
            self.buf.extend_from_slice(data);
            Ok(())
        }
        async fn sync(&mut self) -> BarResult<()> {
            Ok(())
        }
        async fn close(self: Box<Self>) -> BarResult<()> {
            self.files.lock().unwrap().insert(self.path, self.buf);
            Ok(())
        }
    }

    struct MemoryReader {
        data: Vec<u8>,
        pos: usize,
    }

    #[async_trait]
    impl StorageReader for MemoryReader {
        async fn read(&mut self, buf: &mut [u8]) -> BarResult<usize> {
            let n = buf.len().min(self.data.len() - self.pos);
            buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }
        async fn seek(&mut self, offset: u64) -> BarResult<()> {
            self.pos = offset as usize;
            Ok(())
        }
        async fn len(&mut self) -> BarResult<u64> {
            Ok(self.data.len() as u64)
        }
    }

    #[async_trait]
    impl StorageBackend for MemoryBackend {
        async fn create(&self, path: &str) -> BarResult<Box<dyn StorageWriter>> {
            Ok(Box::new(MemoryWriter { files: self.files.clone(), path: path.to_string(), buf: Vec::new() }))
        }
        async fn open(&self, path: &str) -> BarResult<Box<dyn StorageReader>> {
            Ok(Box::new(MemoryReader { data: self.get(path), pos: 0 }))
        }
        async fn delete(&self, path: &str) -> BarResult<()> {
            self.files.lock().unwrap().remove(path);
            Ok(())
        }
        async fn exists(&self, path: &str) -> BarResult<bool> {
            Ok(self.files.lock().unwrap().contains_key(path))
        }
        async fn list(&self, _path: &str) -> BarResult<Vec<String>> {
            Ok(self.files.lock().unwrap().keys().cloned().collect())
        }
    }

    fn meta(name: &str, size: u64) -> FileMetadata {
        FileMetadata {
            size,
            time_last_access: 1,
            time_modified: 2,
            time_last_changed: 3,
            user_id: 0,
            group_id: 0,
            permission: 0o644,
            name: name.to_string(),
        }
    }

    fn writer_config(backend: Arc<MemoryBackend>, tmp: &std::path::Path, part_size: PartSize) -> ArchiveWriterConfig {
        let crypt_algorithm = CryptAlgorithm::Aes128;
        let key = derive_key(crypt_algorithm, b"a test password");
        ArchiveWriterConfig {
            stem: "archive.bar".to_string(),
            part_size,
            compress_algorithm: CompressAlgorithm::None,
            crypt_algorithm,
            key,
            cipher_factory: Arc::new(RustCryptoCipherFactory),
            storage: backend,
            tmp_dir: tmp.to_path_buf(),
        }
    }

    #[tokio::test]
    async fn single_small_file_round_trips_through_one_part() {
        let dir = tempfile::tempdir().unwrap();
        let backend = MemoryBackend::new();
        let mut writer = ArchiveWriter::new(writer_config(backend.clone(), dir.path(), PartSize::Unlimited));

        writer.new_file(meta("hello.txt", 13)).await.unwrap();
        writer.write_file_data(b"hello, world!").await.unwrap();
        writer.close_file().await.unwrap();
        writer.finish().await.unwrap();

        assert_eq!(writer.files_written(), 1);
        let part_name = part_file_name("archive.bar", PartSize::Unlimited, 0);
        let bytes = backend.get(&part_name);
        assert!(!bytes.is_empty());
        // FILE chunk id tag is the first 4 bytes of the part.
        assert_eq!(&bytes[0..4], b"FILE");
    }

    #[tokio::test]
    async fn writing_past_the_part_limit_rotates_to_a_second_part() {
        let dir = tempfile::tempdir().unwrap();
        let backend = MemoryBackend::new();
        let mut writer = ArchiveWriter::new(writer_config(backend.clone(), dir.path(), PartSize::Bytes(64)));

        writer.new_file(meta("big.bin", 256)).await.unwrap();
        writer.write_file_data(&vec![0xAAu8; 256]).await.unwrap();
        writer.close_file().await.unwrap();
        writer.finish().await.unwrap();

        let part0 = part_file_name("archive.bar", PartSize::Bytes(64), 0);
        let part1 = part_file_name("archive.bar", PartSize::Bytes(64), 1);
        assert!(!backend.get(&part0).is_empty());
        assert!(!backend.get(&part1).is_empty());
    }

    #[tokio::test]
    async fn empty_file_produces_a_zero_size_data_chunk() {
        let dir = tempfile::tempdir().unwrap();
        let backend = MemoryBackend::new();
        let mut writer = ArchiveWriter::new(writer_config(backend.clone(), dir.path(), PartSize::Unlimited));

        writer.new_file(meta("empty.txt", 0)).await.unwrap();
        writer.close_file().await.unwrap();
        writer.finish().await.unwrap();

        assert_eq!(writer.bytes_written(), 0);
    }
}
