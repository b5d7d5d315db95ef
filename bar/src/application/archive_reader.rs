// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Archive reader: walks a sequence of parts, yielding one logical entry per
//! source file even when the writer split that file across several `FILE`
//! chunks (one per part it straddles). A split entry is a run of
//! consecutive `FILE` chunks sharing one name, whose `FILE_DATA` segments'
//! `partOffset`/`partSize` chain contiguously (`segment[i+1].partOffset ==
//! segment[i].partOffset + segment[i].partSize`); [`ArchiveReader`] follows
//! that chain transparently inside [`ArchiveReader::read_file_data`], so the
//! caller sees one continuous decompressed byte stream per
//! [`ArchiveReader::next_entry`] regardless of how many parts it crossed.
//!
//! Each part is downloaded from the configured [`StorageBackend`] into a
//! local staging file and read back through [`LocalFileChunkIo`], mirroring
//! the writer's local-staging bridge.

use std::path::PathBuf;
use std::sync::Arc;

use bar_domain::error::{BarError, BarResult};
use bar_domain::services::{ChunkIo, CipherEngine, CipherEngineFactory, Compressor, StorageBackend};
use bar_domain::value_objects::{
    ChunkHeader, CompressAlgorithm, CryptAlgorithm, FileMetadata, CHUNK_ID_FILE, CHUNK_ID_FILE_DATA,
    CHUNK_ID_FILE_ENTRY,
};

use crate::infrastructure::chunk_codec::ChunkReader;
use crate::infrastructure::compression::DeflateCompressor;
use crate::infrastructure::local_file_io::LocalFileChunkIo;

use super::wire::{decode_file_data_header, decode_file_entry, decode_file_header, decrypt_as_unit};

pub struct ArchiveReaderConfig {
    pub stem: String,
    /// Part file names to read, in order (typically produced by listing the
    /// storage backend and sorting by part number).
    pub part_names: Vec<String>,
    pub key: Vec<u8>,
    pub cipher_factory: Arc<dyn CipherEngineFactory>,
    pub storage: Arc<dyn StorageBackend>,
    pub tmp_dir: PathBuf,
}

/// One archived file's metadata, as read from its `FILE_ENTRY` chunk, plus
/// the crypt/compress algorithms and the `partOffset`/`partSize` its
/// *first* `FILE_DATA` segment was written with (per spec §4.G; always
/// `partOffset == 0` for the first segment of an entry). When the entry was
/// split across parts, later segments are followed internally by
/// [`ArchiveReader::read_file_data`] and are not re-surfaced here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryInfo {
    pub metadata: FileMetadata,
    pub compress_id: u32,
    pub crypt_id: u32,
    pub part_offset: u64,
    pub part_size: u64,
}

/// Reads archive entries in order. One [`ArchiveReader::next_entry`] call
/// advances past the next `FILE` chunk (entering its `FILE_ENTRY`); the
/// caller then repeatedly calls [`ArchiveReader::read_file_data`] to pull
/// decompressed bytes until it returns `None`. If the entry's data was
/// split across parts, `read_file_data` crosses into each continuation
/// `FILE` chunk on its own without a further `next_entry` call.
pub struct ArchiveReader {
    stem: String,
    part_names: Vec<String>,
    next_part_index: usize,
    key: Vec<u8>,
    cipher_factory: Arc<dyn CipherEngineFactory>,
    storage: Arc<dyn StorageBackend>,
    tmp_dir: PathBuf,
    reader: Option<ChunkReader<LocalFileChunkIo>>,
    current: Option<OpenEntry>,
    /// A physical `FILE` segment read ahead while looking for a
    /// continuation of the current entry, that turned out to belong to the
    /// *next* logical entry instead. Consumed by the following
    /// `next_entry` call before reading anything further off the wire.
    pending: Option<PhysicalSegment>,
}

/// One physical `FILE`/`FILE_ENTRY`/`FILE_DATA` chunk triple, decoded but
/// not yet attached to a logical entry's decompression state.
struct PhysicalSegment {
    metadata: FileMetadata,
    compress_id: u32,
    crypt_id: u32,
    compress_algorithm: CompressAlgorithm,
    part_offset: u64,
    part_size: u64,
    block_len: usize,
    data_body_cipher: Box<dyn CipherEngine>,
}

struct OpenEntry {
    /// Entry name, used to recognize a continuation `FILE` chunk: the next
    /// physical segment belongs to this entry iff its name matches and its
    /// `partOffset` continues this entry's byte count exactly.
    name: String,
    data_body_cipher: Box<dyn CipherEngine>,
    /// One decompressor for the whole logical entry: the writer keeps a
    /// single continuous deflate stream across a split entry's segments
    /// (see `archive_writer::rotate_entry_segment`), so a fresh
    /// decompressor per segment would choke on a continuation segment's
    /// mid-stream bytes.
    decompressor: Box<dyn Compressor>,
    /// Bytes of the *current* `FILE_DATA` segment's ciphertext not yet
    /// read. Always a multiple of `block_len`: every block, including the
    /// last, occupies exactly one full block on the wire.
    remaining_ciphertext: u64,
    /// Of the remaining blocks, how many of their decrypted bytes are real
    /// compressed data rather than the final block's zero padding.
    remaining_real: u64,
    block_len: usize,
    /// `partOffset` the next segment must open at for it to be a
    /// continuation of this entry rather than a new one.
    next_expected_offset: u64,
    /// Set once no continuation segment was found and the decompressor has
    /// been flushed; `read_file_data` keeps draining `get_block` until it
    /// reports empty, then reports end-of-entry.
    finished: bool,
}

/// Reads the first `FILE` chunk's algorithm fields out of a downloaded
/// part, without needing any key material: those two fields are raw bytes
/// in the `FILE` chunk's own body, not inside an encrypted nested chunk.
/// Used to learn which [`CryptAlgorithm`] a password must be sized for
/// before the real [`ArchiveReader`] is constructed.
pub fn probe_first_entry_algorithms(part_path: &std::path::Path) -> BarResult<(u32, u32)> {
    let io = LocalFileChunkIo::open(part_path)?;
    let mut reader = ChunkReader::new(io);
    loop {
        let Some(header) = reader.next()? else {
            return Err(BarError::format("archive part has no FILE chunk"));
        };
        if header.id != CHUNK_ID_FILE {
            reader.skip(&header)?;
            continue;
        }
        reader.enter(&header)?;
        let mut field_buf = [0u8; 8];
        reader.read_data(&mut field_buf)?;
        return decode_file_header(&field_buf);
    }
}

impl ArchiveReader {
    pub fn new(config: ArchiveReaderConfig) -> Self {
        Self {
            stem: config.stem,
            part_names: config.part_names,
            next_part_index: 0,
            key: config.key,
            cipher_factory: config.cipher_factory,
            storage: config.storage,
            tmp_dir: config.tmp_dir,
            reader: None,
            current: None,
            pending: None,
        }
    }

    async fn open_next_part(&mut self) -> BarResult<bool> {
        if self.next_part_index >= self.part_names.len() {
            return Ok(false);
        }
        let name = &self.part_names[self.next_part_index];
        self.next_part_index += 1;

        let mut remote_reader = self.storage.open(name).await?;
        let len = remote_reader.len().await?;
        let mut bytes = vec![0u8; len as usize];
        let mut filled = 0usize;
        while filled < bytes.len() {
            let n = remote_reader.read(&mut bytes[filled..]).await?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        bytes.truncate(filled);

        let path = self.tmp_dir.join(format!(".{}.read-part", self.stem));
        std::fs::write(&path, &bytes)?;
        let io = LocalFileChunkIo::open(&path)?;
        self.reader = Some(ChunkReader::new(io));
        Ok(true)
    }

    /// Decodes the next physical `FILE`/`FILE_ENTRY`/`FILE_DATA` chunk
    /// triple off the wire, crossing into the next part as needed. Returns
    /// `Ok(None)` once every part is exhausted. Does not interpret whether
    /// the segment starts a new logical entry or continues the current
    /// one — that's for the caller ([`ArchiveReader::next_entry`] and
    /// [`ArchiveReader::read_file_data`]'s continuation check) to decide.
    async fn open_next_physical_segment(&mut self) -> BarResult<Option<PhysicalSegment>> {
        loop {
            if self.reader.is_none() && !self.open_next_part().await? {
                return Ok(None);
            }
            let reader = self.reader.as_mut().expect("just opened or already open");

            let Some(header) = reader.next()? else {
                self.reader = None;
                continue;
            };
            if header.id != CHUNK_ID_FILE {
                reader.skip(&header)?;
                continue;
            }
            reader.enter(&header)?;

            // The FILE chunk's own two algorithm fields are raw bytes in
            // its body, not a nested chunk.
            let mut field_buf = [0u8; 8];
            reader.read_data(&mut field_buf)?;
            let (compress_id, crypt_id) = decode_file_header(&field_buf)?;
            let crypt_algorithm = CryptAlgorithm::from_id(crypt_id)?;
            let compress_algorithm = CompressAlgorithm::from_id(compress_id)?;
            let block_len = crypt_algorithm.block_len();

            let fent_header = reader.next()?.ok_or_else(|| BarError::format("FILE chunk missing FILE_ENTRY"))?;
            if fent_header.id != CHUNK_ID_FILE_ENTRY {
                return Err(BarError::format("FILE_ENTRY expected but not found"));
            }
            reader.enter(&fent_header)?;
            let mut fent_ciphertext = vec![0u8; fent_header.size as usize];
            reader.read_data(&mut fent_ciphertext)?;
            reader.leave()?;
            let mut entry_cipher = self.cipher_factory.create(crypt_algorithm, &self.key)?;
            let fent_plaintext = decrypt_as_unit(entry_cipher.as_mut(), &fent_ciphertext)?;
            let metadata = decode_file_entry(&fent_plaintext)?;

            let fdat_header = reader.next()?.ok_or_else(|| BarError::format("FILE chunk missing FILE_DATA"))?;
            if fdat_header.id != CHUNK_ID_FILE_DATA {
                return Err(BarError::format("FILE_DATA expected but not found"));
            }
            reader.enter(&fdat_header)?;
            let mut data_header_cipher = self.cipher_factory.create(crypt_algorithm, &self.key)?;
            let data_header_len = super::wire::align_up(super::wire::FILE_DATA_HEADER_LEN, block_len);
            let mut fdat_header_ciphertext = vec![0u8; data_header_len];
            reader.read_data(&mut fdat_header_ciphertext)?;
            let fdat_header_plaintext = decrypt_as_unit(data_header_cipher.as_mut(), &fdat_header_ciphertext)?;
            let (part_offset, part_size) = decode_file_data_header(&fdat_header_plaintext)?;

            let mut data_body_cipher = self.cipher_factory.create(crypt_algorithm, &self.key)?;
            data_body_cipher.reset(0);

            return Ok(Some(PhysicalSegment {
                metadata,
                compress_id,
                crypt_id,
                compress_algorithm,
                part_offset,
                part_size,
                block_len,
                data_body_cipher,
            }));
        }
    }

    /// Advances to the next logical entry, reading its first physical
    /// `FILE` segment's `FILE_ENTRY`. Returns `Ok(None)` once every part is
    /// exhausted.
    pub async fn next_entry(&mut self) -> BarResult<Option<EntryInfo>> {
        let segment = match self.pending.take() {
            Some(segment) => segment,
            None => match self.open_next_physical_segment().await? {
                Some(segment) => segment,
                None => return Ok(None),
            },
        };

        let info = EntryInfo {
            metadata: segment.metadata.clone(),
            compress_id: segment.compress_id,
            crypt_id: segment.crypt_id,
            part_offset: segment.part_offset,
            part_size: segment.part_size,
        };

        let decompressor = Box::new(DeflateCompressor::decompressor(segment.compress_algorithm, segment.block_len));
        self.current = Some(OpenEntry {
            name: segment.metadata.name,
            data_body_cipher: segment.data_body_cipher,
            decompressor,
            remaining_ciphertext: super::wire::align_up(segment.part_size as usize, segment.block_len) as u64,
            remaining_real: segment.part_size,
            block_len: segment.block_len,
            next_expected_offset: segment.part_offset + segment.part_size,
            finished: false,
        });

        Ok(Some(info))
    }

    /// Pulls up to `max_len` decompressed bytes out of the current entry's
    /// `FILE_DATA`, transparently crossing into a continuation `FILE` chunk
    /// in the next part when the current segment runs out but the entry's
    /// data was split. Returns `None` once the entry's data is truly
    /// exhausted (after which the chunk reader has left every segment's
    /// FILE_DATA/FILE scope so the next `next_entry` call can proceed).
    pub async fn read_file_data(&mut self, max_len: usize) -> BarResult<Option<Vec<u8>>> {
        if self.current.is_none() {
            return Err(BarError::format("read_file_data called with no open entry"));
        }
        loop {
            {
                let entry = self.current.as_mut().expect("checked above");
                let mut out = vec![0u8; max_len];
                let n = entry.decompressor.get_block(&mut out)?;
                if n > 0 {
                    out.truncate(n);
                    return Ok(Some(out));
                }
            }

            if self.current.as_ref().expect("checked above").finished {
                self.current = None;
                return Ok(None);
            }

            let remaining = self.current.as_ref().expect("checked above").remaining_ciphertext;
            if remaining == 0 {
                if self.try_continue_entry().await? {
                    continue;
                }
                let entry = self.current.as_mut().expect("checked above");
                entry.decompressor.flush()?;
                entry.finished = true;
                continue;
            }

            let block_len = self.current.as_ref().expect("checked above").block_len as u64;
            let take = block_len.min(remaining) as usize;
            let mut ciphertext = vec![0u8; take];
            {
                let reader = self.reader.as_mut().expect("an entry implies an open reader");
                reader.read_data(&mut ciphertext)?;
            }

            let entry = self.current.as_mut().expect("checked above");
            entry.remaining_ciphertext -= take as u64;
            let plaintext = entry.data_body_cipher.decrypt(&ciphertext)?;
            // The final block is zero-padded up to block_len; only
            // remaining_real of its decrypted bytes are real compressed
            // data, never the padding.
            let real_len = entry.remaining_real.min(take as u64) as usize;
            entry.remaining_real -= real_len as u64;
            entry.decompressor.put_block(&plaintext[..real_len])?;
        }
    }

    /// Called once the current segment's ciphertext is exhausted. Leaves
    /// the current `FILE_DATA`/`FILE` scope, then looks for the next
    /// physical segment: if it continues this entry (same name, contiguous
    /// `partOffset`), splices it into `self.current` and returns `true` so
    /// the read loop keeps draining the same decompressor. Otherwise the
    /// segment belongs to the next logical entry and is cached in
    /// `self.pending` for the following `next_entry` call; returns `false`
    /// so the caller finishes out the current entry (flush + EOF).
    async fn try_continue_entry(&mut self) -> BarResult<bool> {
        {
            let reader = self.reader.as_mut().expect("an entry implies an open reader");
            reader.leave()?; // FILE_DATA
            reader.leave()?; // FILE
        }

        let Some(segment) = self.open_next_physical_segment().await? else {
            return Ok(false);
        };

        let entry = self.current.as_mut().expect("checked by caller");
        let continues = segment.metadata.name == entry.name && segment.part_offset == entry.next_expected_offset;
        if !continues {
            self.pending = Some(segment);
            return Ok(false);
        }

        entry.data_body_cipher = segment.data_body_cipher;
        entry.block_len = segment.block_len;
        entry.remaining_ciphertext = super::wire::align_up(segment.part_size as usize, segment.block_len) as u64;
        entry.remaining_real = segment.part_size;
        entry.next_expected_offset = segment.part_offset + segment.part_size;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex as StdMutex;

    use async_trait::async_trait;

    use bar_domain::services::{StorageReader, StorageWriter};
    use bar_domain::value_objects::{CompressAlgorithm, PartSize};

    use crate::application::archive_writer::{ArchiveWriter, ArchiveWriterConfig};
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
            let mut names: Vec<String> = self.files.lock().unwrap().keys().cloned().collect();
            names.sort();
            Ok(names)
        }
    }

    fn meta(name: &str, size: u64) -> FileMetadata {
        FileMetadata {
            size,
            time_last_access: 10,
            time_modified: 20,
            time_last_changed: 30,
            user_id: 501,
            group_id: 20,
            permission: 0o600,
            name: name.to_string(),
        }
    }

    async fn drain_all(reader: &mut ArchiveReader) -> Vec<u8> {
        let mut out = Vec::new();
        while let Some(chunk) = reader.read_file_data(7).await.unwrap() {
            out.extend(chunk);
        }
        out
    }

    #[tokio::test]
    async fn reader_reconstructs_what_the_writer_wrote() {
        let dir = tempfile::tempdir().unwrap();
        let backend = MemoryBackend::new();
        let crypt_algorithm = CryptAlgorithm::Aes128;
        let key = derive_key(crypt_algorithm, b"correct horse battery staple");

        let mut writer = ArchiveWriter::new(ArchiveWriterConfig {
            stem: "archive.bar".to_string(),
            part_size: PartSize::Unlimited,
            compress_algorithm: CompressAlgorithm::Zip(6),
            crypt_algorithm,
            key: key.clone(),
            cipher_factory: Arc::new(RustCryptoCipherFactory),
            storage: backend.clone(),
            tmp_dir: dir.path().to_path_buf(),
        });

        writer.new_file(meta("a.txt", 11)).await.unwrap();
        writer.write_file_data(b"hello world").await.unwrap();
        writer.close_file().await.unwrap();

        writer.new_file(meta("b.txt", 5)).await.unwrap();
        writer.write_file_data(b"again").await.unwrap();
        writer.close_file().await.unwrap();

        writer.finish().await.unwrap();

        let mut reader = ArchiveReader::new(ArchiveReaderConfig {
            stem: "archive.bar".to_string(),
            part_names: vec!["archive.bar".to_string()],
            key,
            cipher_factory: Arc::new(RustCryptoCipherFactory),
            storage: backend,
            tmp_dir: dir.path().to_path_buf(),
        });

        let first = reader.next_entry().await.unwrap().unwrap();
        assert_eq!(first.metadata.name, "a.txt");
        assert_eq!(first.part_offset, 0);
        assert_eq!(drain_all(&mut reader).await, b"hello world");

        let second = reader.next_entry().await.unwrap().unwrap();
        assert_eq!(second.metadata.name, "b.txt");
        assert_eq!(second.part_offset, 0);
        assert_eq!(drain_all(&mut reader).await, b"again");

        assert!(reader.next_entry().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn reader_stitches_an_entry_split_across_parts() {
        // One file large enough, under a small part size, that the writer
        // must rotate mid-entry into a second (and third) part. The reader
        // must reconstruct it as a single logical entry via one
        // `next_entry` plus a `read_file_data` loop that silently crosses
        // into each continuation `FILE` chunk.
        let dir = tempfile::tempdir().unwrap();
        let backend = MemoryBackend::new();
        let crypt_algorithm = CryptAlgorithm::Aes128;
        let key = derive_key(crypt_algorithm, b"split across parts password");
        let data: Vec<u8> = (0u32..25_000).map(|b| (b % 256) as u8).collect();

        let mut writer = ArchiveWriter::new(ArchiveWriterConfig {
            stem: "split.bar".to_string(),
            part_size: PartSize::Bytes(10_000),
            compress_algorithm: CompressAlgorithm::None,
            crypt_algorithm,
            key: key.clone(),
            cipher_factory: Arc::new(RustCryptoCipherFactory),
            storage: backend.clone(),
            tmp_dir: dir.path().to_path_buf(),
        });
        writer.new_file(meta("y.bin", data.len() as u64)).await.unwrap();
        writer.write_file_data(&data).await.unwrap();
        writer.close_file().await.unwrap();
        writer.new_file(meta("z.bin", 4)).await.unwrap();
        writer.write_file_data(b"tail").await.unwrap();
        writer.close_file().await.unwrap();
        writer.finish().await.unwrap();

        let mut part_names: Vec<String> = backend.files.lock().unwrap().keys().cloned().collect();
        part_names.sort();
        assert!(part_names.len() >= 3, "expected the 25000-byte entry to span at least 3 parts");

        let mut reader = ArchiveReader::new(ArchiveReaderConfig {
            stem: "split.bar".to_string(),
            part_names,
            key,
            cipher_factory: Arc::new(RustCryptoCipherFactory),
            storage: backend,
            tmp_dir: dir.path().to_path_buf(),
        });

        let first = reader.next_entry().await.unwrap().unwrap();
        assert_eq!(first.metadata.name, "y.bin");
        assert_eq!(first.part_offset, 0);
        assert_eq!(drain_all(&mut reader).await, data);

        let second = reader.next_entry().await.unwrap().unwrap();
        assert_eq!(second.metadata.name, "z.bin");
        assert_eq!(drain_all(&mut reader).await, b"tail");

        assert!(reader.next_entry().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn probe_reads_algorithm_ids_without_any_key_material() {
        let dir = tempfile::tempdir().unwrap();
        let backend = MemoryBackend::new();
        let crypt_algorithm = CryptAlgorithm::Aes256;
        let key = derive_key(crypt_algorithm, b"hunter2");

        let mut writer = ArchiveWriter::new(ArchiveWriterConfig {
            stem: "probe.bar".to_string(),
            part_size: PartSize::Unlimited,
            compress_algorithm: CompressAlgorithm::Zip(3),
            crypt_algorithm,
            key,
            cipher_factory: Arc::new(RustCryptoCipherFactory),
            storage: backend.clone(),
            tmp_dir: dir.path().to_path_buf(),
        });
        writer.new_file(meta("c.txt", 3)).await.unwrap();
        writer.write_file_data(b"xyz").await.unwrap();
        writer.close_file().await.unwrap();
        writer.finish().await.unwrap();

        let bytes = backend.get("probe.bar");
        let local_path = dir.path().join("probe.bar.local");
        std::fs::write(&local_path, &bytes).unwrap();

        let (compress_id, crypt_id) = probe_first_entry_algorithms(&local_path).unwrap();
        assert_eq!(CompressAlgorithm::from_id(compress_id).unwrap(), CompressAlgorithm::Zip(3));
        assert_eq!(CryptAlgorithm::from_id(crypt_id).unwrap(), CryptAlgorithm::Aes256);
    }

    #[tokio::test]
    async fn many_short_writes_do_not_desync_the_reader() {
        // Feeds bytes across cipher-block boundaries in several small
        // `write_file_data` calls (mirroring the packer's 64 KiB read
        // chunks). A non-full remainder must stay buffered in the
        // compressor between calls rather than being drained (and
        // zero-padded) early; only `close_file`'s flush may emit a short
        // final block.
        let dir = tempfile::tempdir().unwrap();
        let backend = MemoryBackend::new();
        let crypt_algorithm = CryptAlgorithm::Aes128; // 16-byte block
        let key = derive_key(crypt_algorithm, b"many short writes password");

        let mut writer = ArchiveWriter::new(ArchiveWriterConfig {
            stem: "split.bar".to_string(),
            part_size: PartSize::Unlimited,
            compress_algorithm: CompressAlgorithm::None,
            crypt_algorithm,
            key: key.clone(),
            cipher_factory: Arc::new(RustCryptoCipherFactory),
            storage: backend.clone(),
            tmp_dir: dir.path().to_path_buf(),
        });

        let payload = b"0123456789abcdef0123456789"; // 27 bytes, not block-aligned
        writer.new_file(meta("d.txt", payload.len() as u64)).await.unwrap();
        for chunk in [&payload[0..5], &payload[5..10], &payload[10..16], &payload[16..]] {
            writer.write_file_data(chunk).await.unwrap();
        }
        writer.close_file().await.unwrap();
        writer.finish().await.unwrap();

        let mut reader = ArchiveReader::new(ArchiveReaderConfig {
            stem: "split.bar".to_string(),
            part_names: vec!["split.bar".to_string()],
            key,
            cipher_factory: Arc::new(RustCryptoCipherFactory),
            storage: backend,
            tmp_dir: dir.path().to_path_buf(),
        });

        let entry = reader.next_entry().await.unwrap().unwrap();
        assert_eq!(entry.metadata.name, "d.txt");
        assert_eq!(drain_all(&mut reader).await, payload);
        assert!(reader.next_entry().await.unwrap().is_none());
    }
}
