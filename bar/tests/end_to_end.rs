// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! End-to-end archive create/restore scenarios, run against the local
//! filesystem backend rather than the in-memory mock the unit tests use.

use std::sync::Arc;

use bar::application::{ArchiveReader, ArchiveReaderConfig, ArchiveWriter, ArchiveWriterConfig};
use bar::infrastructure::cipher::{derive_key, RustCryptoCipherFactory};
use bar::infrastructure::key_store::RsaKeyStore;
use bar::infrastructure::storage::filesystem::FilesystemBackend;
use bar_domain::value_objects::{CompressAlgorithm, CryptAlgorithm, FileMetadata, FragmentSet, PartSize};

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

async fn read_all(reader: &mut ArchiveReader) -> Vec<u8> {
    let mut out = Vec::new();
    while let Some(chunk) = reader.read_file_data(64 * 1024).await.unwrap() {
        out.extend_from_slice(&chunk);
    }
    out
}

#[tokio::test]
async fn scenario_1_empty_archive_reports_eof_immediately() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(FilesystemBackend::new(dir.path()));

    let mut writer = ArchiveWriter::new(ArchiveWriterConfig {
        stem: "empty.bar".to_string(),
        part_size: PartSize::Unlimited,
        compress_algorithm: CompressAlgorithm::None,
        crypt_algorithm: CryptAlgorithm::None,
        key: Vec::new(),
        cipher_factory: Arc::new(RustCryptoCipherFactory),
        storage: backend.clone(),
        tmp_dir: dir.path().to_path_buf(),
    });
    writer.finish().await.unwrap();

    assert!(dir.path().join("empty.bar").exists());
    assert_eq!(std::fs::metadata(dir.path().join("empty.bar")).unwrap().len(), 0);

    let mut reader = ArchiveReader::new(ArchiveReaderConfig {
        stem: "empty.bar".to_string(),
        part_names: vec!["empty.bar".to_string()],
        key: Vec::new(),
        cipher_factory: Arc::new(RustCryptoCipherFactory),
        storage: backend,
        tmp_dir: dir.path().to_path_buf(),
    });
    assert!(reader.next_entry().await.unwrap().is_none());
}

#[tokio::test]
async fn scenario_2_single_small_file_no_crypto_no_split() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(FilesystemBackend::new(dir.path()));
    let data: Vec<u8> = (0u32..1000).map(|b| (b % 256) as u8).collect();

    let mut writer = ArchiveWriter::new(ArchiveWriterConfig {
        stem: "single.bar".to_string(),
        part_size: PartSize::Unlimited,
        compress_algorithm: CompressAlgorithm::None,
        crypt_algorithm: CryptAlgorithm::None,
        key: Vec::new(),
        cipher_factory: Arc::new(RustCryptoCipherFactory),
        storage: backend.clone(),
        tmp_dir: dir.path().to_path_buf(),
    });
    writer.new_file(meta("x", data.len() as u64)).await.unwrap();
    writer.write_file_data(&data).await.unwrap();
    writer.close_file().await.unwrap();
    writer.finish().await.unwrap();

    let mut reader = ArchiveReader::new(ArchiveReaderConfig {
        stem: "single.bar".to_string(),
        part_names: vec!["single.bar".to_string()],
        key: Vec::new(),
        cipher_factory: Arc::new(RustCryptoCipherFactory),
        storage: backend,
        tmp_dir: dir.path().to_path_buf(),
    });
    let entry = reader.next_entry().await.unwrap().unwrap();
    assert_eq!(entry.metadata.name, "x");
    assert_eq!(entry.metadata.size, 1000);
    assert_eq!(entry.compress_id, CompressAlgorithm::None.to_id());
    assert_eq!(entry.crypt_id, CryptAlgorithm::None.to_id());
    assert_eq!(read_all(&mut reader).await, data);
    assert!(reader.next_entry().await.unwrap().is_none());
}

#[tokio::test]
async fn scenario_3_split_at_10000_bytes_with_password() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(FilesystemBackend::new(dir.path()));
    let data: Vec<u8> = (0u32..25_000).map(|b| (b % 251) as u8).collect();
    let key = derive_key(CryptAlgorithm::Aes128, b"pw");

    let mut writer = ArchiveWriter::new(ArchiveWriterConfig {
        stem: "split.bar".to_string(),
        part_size: PartSize::Bytes(10_000),
        compress_algorithm: CompressAlgorithm::None,
        crypt_algorithm: CryptAlgorithm::Aes128,
        key: key.clone(),
        cipher_factory: Arc::new(RustCryptoCipherFactory),
        storage: backend.clone(),
        tmp_dir: dir.path().to_path_buf(),
    });
    writer.new_file(meta("y", data.len() as u64)).await.unwrap();
    writer.write_file_data(&data).await.unwrap();
    writer.close_file().await.unwrap();
    writer.finish().await.unwrap();

    let part_names: Vec<String> =
        vec!["split.bar.000000".to_string(), "split.bar.000001".to_string(), "split.bar.000002".to_string()];
    for name in &part_names {
        assert!(dir.path().join(name).exists(), "missing part {name}");
    }

    let mut reader = ArchiveReader::new(ArchiveReaderConfig {
        stem: "split.bar".to_string(),
        part_names,
        key,
        cipher_factory: Arc::new(RustCryptoCipherFactory),
        storage: backend,
        tmp_dir: dir.path().to_path_buf(),
    });
    let entry = reader.next_entry().await.unwrap().unwrap();
    assert_eq!(entry.metadata.name, "y");
    assert_eq!(entry.part_offset, 0);
    assert!(entry.part_size > 0 && entry.part_size < data.len() as u64, "first part should not hold the whole file");
    assert_eq!(read_all(&mut reader).await, data);
    assert!(reader.next_entry().await.unwrap().is_none());
}

#[tokio::test]
async fn scenario_4_compressed_aes256_shrinks_a_megabyte_of_zeros() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(FilesystemBackend::new(dir.path()));
    let data = vec![0u8; 1024 * 1024];
    let key = derive_key(CryptAlgorithm::Aes256, b"pw");

    let mut writer = ArchiveWriter::new(ArchiveWriterConfig {
        stem: "zeros.bar".to_string(),
        part_size: PartSize::Unlimited,
        compress_algorithm: CompressAlgorithm::Zip(9),
        crypt_algorithm: CryptAlgorithm::Aes256,
        key: key.clone(),
        cipher_factory: Arc::new(RustCryptoCipherFactory),
        storage: backend.clone(),
        tmp_dir: dir.path().to_path_buf(),
    });
    writer.new_file(meta("zeros", data.len() as u64)).await.unwrap();
    writer.write_file_data(&data).await.unwrap();
    writer.close_file().await.unwrap();
    writer.finish().await.unwrap();

    let archive_len = std::fs::metadata(dir.path().join("zeros.bar")).unwrap().len();
    assert!(archive_len < 10 * 1024, "expected a compressed archive under 10 KiB, got {archive_len}");

    let mut reader = ArchiveReader::new(ArchiveReaderConfig {
        stem: "zeros.bar".to_string(),
        part_names: vec!["zeros.bar".to_string()],
        key,
        cipher_factory: Arc::new(RustCryptoCipherFactory),
        storage: backend,
        tmp_dir: dir.path().to_path_buf(),
    });
    reader.next_entry().await.unwrap().unwrap();
    assert_eq!(read_all(&mut reader).await, data);
}

#[tokio::test]
async fn scenario_5_asymmetric_wrap_then_symmetric_body_round_trip() {
    use bar_domain::services::key_store::KeyStore;

    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(FilesystemBackend::new(dir.path()));
    let store = RsaKeyStore;
    let (public, private) = store.generate_key_pair(2048).unwrap();

    let mut session_key = vec![0u8; CryptAlgorithm::Aes256.key_len()];
    rand::RngCore::fill_bytes(&mut rand::rngs::OsRng, &mut session_key);

    let envelope = store.wrap_key(&public, &session_key).unwrap();
    assert_eq!(envelope.len(), 2048 / 8);
    let recovered = store.unwrap_key(&private, &envelope).unwrap();
    assert_eq!(recovered, session_key);

    let data = b"wrapped-session-key body round trip".to_vec();
    let mut writer = ArchiveWriter::new(ArchiveWriterConfig {
        stem: "wrapped.bar".to_string(),
        part_size: PartSize::Unlimited,
        compress_algorithm: CompressAlgorithm::None,
        crypt_algorithm: CryptAlgorithm::Aes256,
        key: session_key,
        cipher_factory: Arc::new(RustCryptoCipherFactory),
        storage: backend.clone(),
        tmp_dir: dir.path().to_path_buf(),
    });
    writer.new_file(meta("secret", data.len() as u64)).await.unwrap();
    writer.write_file_data(&data).await.unwrap();
    writer.close_file().await.unwrap();
    writer.finish().await.unwrap();

    let mut reader = ArchiveReader::new(ArchiveReaderConfig {
        stem: "wrapped.bar".to_string(),
        part_names: vec!["wrapped.bar".to_string()],
        key: recovered,
        cipher_factory: Arc::new(RustCryptoCipherFactory),
        storage: backend,
        tmp_dir: dir.path().to_path_buf(),
    });
    reader.next_entry().await.unwrap().unwrap();
    assert_eq!(read_all(&mut reader).await, data);
}

/// Streams an entry's `FILE_DATA` into `dest`, folding each chunk into a
/// `FragmentSet` as it arrives and skipping bytes `dest` already holds from
/// an earlier, interrupted restore of the same entry.
async fn restore_with_resume(
    reader: &mut ArchiveReader,
    dest: &std::path::Path,
    size: u64,
) -> FragmentSet {
    use tokio::io::{AsyncSeekExt, AsyncWriteExt};

    let existing_len = std::fs::metadata(dest).map(|m| m.len()).unwrap_or(0);
    let mut file = tokio::fs::OpenOptions::new().create(true).write(true).open(dest).await.unwrap();
    let mut fragments = FragmentSet::new(size);
    if existing_len > 0 {
        fragments.add(0, existing_len.min(size));
    }

    let mut pos = 0u64;
    while let Some(chunk) = reader.read_file_data(64 * 1024).await.unwrap() {
        let end = pos + chunk.len() as u64;
        if end > existing_len {
            let already = existing_len.saturating_sub(pos) as usize;
            file.seek(std::io::SeekFrom::Start(pos + already as u64)).await.unwrap();
            file.write_all(&chunk[already..]).await.unwrap();
        }
        fragments.add(pos, chunk.len() as u64);
        pos = end;
    }
    file.flush().await.unwrap();
    fragments
}

#[tokio::test]
async fn scenario_6_resumed_restore_completes_the_fragment_ledger() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(FilesystemBackend::new(dir.path()));
    let data: Vec<u8> = (0u32..25_000).map(|b| (b % 251) as u8).collect();
    let key = derive_key(CryptAlgorithm::Aes128, b"pw");

    let mut writer = ArchiveWriter::new(ArchiveWriterConfig {
        stem: "resume.bar".to_string(),
        part_size: PartSize::Bytes(10_000),
        compress_algorithm: CompressAlgorithm::None,
        crypt_algorithm: CryptAlgorithm::Aes128,
        key: key.clone(),
        cipher_factory: Arc::new(RustCryptoCipherFactory),
        storage: backend.clone(),
        tmp_dir: dir.path().to_path_buf(),
    });
    writer.new_file(meta("y", data.len() as u64)).await.unwrap();
    writer.write_file_data(&data).await.unwrap();
    writer.close_file().await.unwrap();
    writer.finish().await.unwrap();

    let all_parts =
        vec!["resume.bar.000000".to_string(), "resume.bar.000001".to_string(), "resume.bar.000002".to_string()];
    for name in &all_parts {
        assert!(dir.path().join(name).exists(), "missing part {name}");
    }

    let restored_path = dir.path().join("y.out");

    // Terminate the restore after only the first two parts are present.
    let mut first_attempt = ArchiveReader::new(ArchiveReaderConfig {
        stem: "resume.bar".to_string(),
        part_names: all_parts[..2].to_vec(),
        key: key.clone(),
        cipher_factory: Arc::new(RustCryptoCipherFactory),
        storage: backend.clone(),
        tmp_dir: dir.path().to_path_buf(),
    });
    let entry = first_attempt.next_entry().await.unwrap().unwrap();
    let partial = restore_with_resume(&mut first_attempt, &restored_path, entry.metadata.size).await;
    assert!(!partial.is_complete());
    assert!(partial.exists(0, 15_000));
    let partial_len = std::fs::metadata(&restored_path).unwrap().len();
    assert!(partial_len > 0 && partial_len < data.len() as u64);
    assert_eq!(&std::fs::read(&restored_path).unwrap()[..], &data[..partial_len as usize]);

    // Resume with the third part now available; the ledger should complete
    // and the file on disk should match the original exactly.
    let mut second_attempt = ArchiveReader::new(ArchiveReaderConfig {
        stem: "resume.bar".to_string(),
        part_names: all_parts,
        key,
        cipher_factory: Arc::new(RustCryptoCipherFactory),
        storage: backend,
        tmp_dir: dir.path().to_path_buf(),
    });
    let entry = second_attempt.next_entry().await.unwrap().unwrap();
    let complete = restore_with_resume(&mut second_attempt, &restored_path, entry.metadata.size).await;
    assert!(complete.is_complete());
    assert_eq!(std::fs::read(&restored_path).unwrap(), data);
}
