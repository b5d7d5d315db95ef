// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! `bar` binary entry point: wires `bar_bootstrap`'s validated CLI onto the
//! application layer's writer/reader/packer pipeline.
//!
//! This is the one place in the workspace allowed to `println!` a
//! human-readable report; everything below it communicates through
//! `Result`/`tracing` instead.

use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use tokio::io::{AsyncSeekExt, AsyncWriteExt};

use bar::application::{
    probe_first_entry_algorithms, run_packer_pipeline, ArchiveReader, ArchiveReaderConfig, ArchiveWriter,
    ArchiveWriterConfig, LinkPolicy, PackerConfig,
};
use bar::infrastructure::cipher::{derive_key, RustCryptoCipherFactory};
use bar::infrastructure::key_store::RsaKeyStore;
use bar::infrastructure::storage::{build_backend, StorageUrl};
use bar_bootstrap::cli::{KeyOptions, ValidatedCli, ValidatedCommand};
use bar_bootstrap::exit_code::result_to_exit_code;
use bar_bootstrap::shutdown::{CancellationToken, ShutdownCoordinator};
use bar_domain::error::{BarError, BarResult};
use bar_domain::services::key_store::{KeyStore, PrivateKeyMaterial, PublicKeyMaterial};
use bar_domain::services::{StorageBackend, StorageReader, StorageWriter};
use bar_domain::value_objects::{CryptAlgorithm, FragmentSet, SecurePassword};

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let validated = match bar_bootstrap::bootstrap_cli() {
        Ok(cli) => cli,
        Err(e) => {
            eprintln!("bar: {e}");
            return std::process::ExitCode::from(64);
        }
    };

    init_tracing(validated.verbose);

    let shutdown = ShutdownCoordinator::new(Duration::from_secs(10));
    let cancellation = shutdown.token();
    let shutdown_for_signals = shutdown.clone();
    tokio::spawn(async move {
        let signal_handler = bar_bootstrap::signals::create_signal_handler();
        signal_handler
            .wait_for_signal(Box::new(move || shutdown_for_signals.initiate_shutdown()))
            .await;
    });

    let result = run(validated, cancellation).await;
    let code = result_to_exit_code(result);
    std::process::ExitCode::from(code.as_i32() as u8)
}

fn init_tracing(verbose: bool) {
    let level = if verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };
    let _ = tracing_subscriber::fmt().with_max_level(level).with_target(false).try_init();
}

async fn run(cli: ValidatedCli, cancellation: CancellationToken) -> BarResult<()> {
    match cli.command {
        ValidatedCommand::Create {
            sources,
            archive,
            include,
            exclude,
            part_size,
            compress,
            crypt,
            public_key,
            prompt_password,
            storage_url,
            tmp_dir,
            volume_device,
            wait_first_volume,
            ecc,
        } => {
            if ecc {
                tracing::warn!("--ecc was requested but error-correcting staging is not yet implemented; ignoring");
            }

            let archive_abs = absolute_path(&archive)?;
            let stem = archive_abs.to_string_lossy().into_owned();
            let parsed = match storage_url {
                Some(ref url) => StorageUrl::parse(url)?,
                None => StorageUrl::parse(&stem)?,
            };
            let storage = build_backend(&parsed, None)?;
            let tmp_dir = tmp_dir.unwrap_or_else(std::env::temp_dir);

            if let Some(device) = volume_device.as_deref() {
                if wait_first_volume {
                    let mut controller = bar::infrastructure::volume::VolumeController::new(
                        Some(device.to_string()),
                        true,
                        bar::infrastructure::volume::VolumeRequest::InteractivePrompt,
                    );
                    controller.ensure_loaded().await?;
                }
            }

            let (key, envelope) = if crypt.is_none() {
                (Vec::new(), None)
            } else if let Some(public_key_path) = public_key {
                let mut random_key = vec![0u8; crypt.key_len()];
                rand::RngCore::fill_bytes(&mut rand::rngs::OsRng, &mut random_key);
                let public_material = PublicKeyMaterial(read_key_material(&public_key_path)?);
                let envelope = RsaKeyStore.wrap_key(&public_material, &random_key)?;
                (random_key, Some(envelope))
            } else if prompt_password {
                let password = prompt_password_interactively()?;
                (derive_key(crypt, password.as_bytes()), None)
            } else {
                return Err(BarError::configuration("encryption requires --public-key and/or --password"));
            };

            let writer = ArchiveWriter::new(ArchiveWriterConfig {
                stem: stem.clone(),
                part_size,
                compress_algorithm: compress,
                crypt_algorithm: crypt,
                key,
                cipher_factory: Arc::new(RustCryptoCipherFactory),
                storage: storage.clone(),
                tmp_dir,
            });

            let packer_config = PackerConfig { sources, include, exclude, link_policy: LinkPolicy::Ignore };
            let pipeline_cancellation = cancellation.clone();
            let (mut writer, stats) = tokio::task::spawn_blocking(move || {
                run_packer_pipeline(packer_config, writer, pipeline_cancellation)
            })
            .await
            .map_err(|e| BarError::resource(format!("packer task panicked: {e}")))??;

            writer.finish().await?;

            if let Some(envelope) = envelope {
                let encoded = BASE64.encode(envelope);
                let mut key_writer = storage.create(&format!("{stem}.key")).await?;
                key_writer.write(encoded.as_bytes()).await?;
                key_writer.sync().await?;
                key_writer.close().await?;
            }

            println!(
                "bar: created {} ({} files, {} bytes; {} included, {} excluded, {} skipped)",
                archive.display(),
                stats.files_written,
                stats.bytes_written,
                stats.included,
                stats.excluded,
                stats.skipped
            );
            Ok(())
        }

        ValidatedCommand::List { archive, key } => {
            let mut reader = open_reader(&archive, &key).await?;
            let mut count = 0u64;
            while let Some(entry) = reader.next_entry().await? {
                println!("{:>12}  {}", entry.metadata.size, entry.metadata.name);
                skip_entry_data(&mut reader).await?;
                count += 1;
            }
            println!("bar: {count} entries");
            Ok(())
        }

        ValidatedCommand::Restore { archive, output_dir, include, exclude, key, overwrite, mkdir } => {
            if !output_dir.exists() {
                if mkdir {
                    std::fs::create_dir_all(&output_dir)?;
                } else {
                    return Err(BarError::configuration(format!(
                        "output directory does not exist: {} (pass --mkdir to create it)",
                        output_dir.display()
                    )));
                }
            }

            let mut reader = open_reader(&archive, &key).await?;
            let mut restored = 0u64;
            let mut skipped = 0u64;
            while let Some(entry) = reader.next_entry().await? {
                let name = entry.metadata.name.trim_start_matches(['/', '\\']);
                let included = include.is_empty() || bar::application::packer::matches_any(&include, &entry.metadata.name);
                let excluded = !exclude.is_empty() && bar::application::packer::matches_any(&exclude, &entry.metadata.name);

                if !included || excluded {
                    skip_entry_data(&mut reader).await?;
                    skipped += 1;
                    continue;
                }

                let dest = output_dir.join(name);
                if dest.exists() {
                    if overwrite {
                        tokio::fs::remove_file(&dest).await?;
                    } else {
                        let existing_len = tokio::fs::metadata(&dest).await?.len();
                        if existing_len >= entry.metadata.size {
                            tracing::warn!(
                                path = %dest.display(),
                                "skipping existing file (pass --overwrite to replace)"
                            );
                            skip_entry_data(&mut reader).await?;
                            skipped += 1;
                            continue;
                        }
                        tracing::info!(
                            path = %dest.display(),
                            existing_len,
                            size = entry.metadata.size,
                            "resuming partially restored file"
                        );
                    }
                }
                if let Some(parent) = dest.parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }

                let fragments = restore_entry_to_file(&mut reader, &dest, entry.metadata.size).await?;
                if !fragments.is_complete() {
                    tracing::warn!(
                        path = %dest.display(),
                        expected = entry.metadata.size,
                        "restored file is incomplete; rerun restore to resume the remaining fragments"
                    );
                }
                restored += 1;
            }
            println!("bar: restored {restored} files to {} ({skipped} skipped)", output_dir.display());
            Ok(())
        }

        ValidatedCommand::Test { archive, key } => {
            let mut reader = open_reader(&archive, &key).await?;
            let mut checked = 0u64;
            while let Some(entry) = reader.next_entry().await? {
                let fragments = drain_with_fragments(&mut reader, entry.metadata.size).await?;
                if !fragments.is_complete() {
                    return Err(BarError::format(format!(
                        "{}: expected {} bytes, decoded fragments {:?}",
                        entry.metadata.name,
                        entry.metadata.size,
                        fragments.fragments()
                    )));
                }
                checked += 1;
            }
            println!("bar: {} ({checked} entries verified)", archive.display());
            Ok(())
        }
    }
}

fn absolute_path(path: &Path) -> BarResult<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

fn read_key_material(path: &Path) -> BarResult<Vec<u8>> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(bytes),
        Err(_) => Ok(path.to_string_lossy().trim().as_bytes().to_vec()),
    }
}

fn prompt_password_interactively() -> BarResult<SecurePassword> {
    eprint!("Password: ");
    std::io::stderr().flush().ok();
    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;
    Ok(SecurePassword::new(line.trim_end_matches(['\n', '\r']).to_string()))
}

/// Splits an archive stem into `(parent_directory, base_name)`, so the
/// storage backend can be asked to list the parent and the caller can match
/// part file names against the base name.
fn split_stem(stem: &str) -> (String, String) {
    match stem.rfind('/') {
        Some(idx) => (stem[..idx].to_string(), stem[idx + 1..].to_string()),
        None => (String::new(), stem.to_string()),
    }
}

/// Lists and sorts every part belonging to `stem`: either the bare stem
/// itself (an unsplit archive) or every `<stem>.NNNNNN` part, in order.
async fn list_part_names(storage: &dyn StorageBackend, stem: &str) -> BarResult<Vec<String>> {
    let (parent, base) = split_stem(stem);
    let names = storage.list(&parent).await?;
    let mut matches: Vec<String> = names
        .into_iter()
        .filter(|n| {
            if n == &base {
                return true;
            }
            match n.strip_prefix(&format!("{base}.")) {
                Some(suffix) => suffix.len() == 6 && suffix.chars().all(|c| c.is_ascii_digit()),
                None => false,
            }
        })
        .collect();
    matches.sort();
    if matches.is_empty() {
        return Err(BarError::io(format!("no archive parts found for {stem}")));
    }
    Ok(matches.into_iter().map(|name| format!("{parent}/{name}")).collect())
}

/// Downloads the first part of `stem` into `tmp_dir` and returns its local
/// path, for probing the archive's crypt algorithm before the real key is
/// known.
async fn stage_first_part(storage: &dyn StorageBackend, part_name: &str, tmp_dir: &Path) -> BarResult<PathBuf> {
    let mut reader = storage.open(part_name).await?;
    let len = reader.len().await?;
    let mut bytes = vec![0u8; len as usize];
    let mut filled = 0usize;
    while filled < bytes.len() {
        let n = reader.read(&mut bytes[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    bytes.truncate(filled);
    let local_path = tmp_dir.join(".bar-probe-part");
    tokio::fs::create_dir_all(tmp_dir).await?;
    tokio::fs::write(&local_path, &bytes).await?;
    Ok(local_path)
}

/// Resolves the symmetric key for List/Restore/Test: unwraps an RSA
/// envelope when a private key is supplied, otherwise derives a
/// password-based key sized to whatever crypt algorithm the archive's own
/// (unencrypted) `FILE` header declares.
async fn resolve_read_key(
    storage: &dyn StorageBackend,
    stem: &str,
    first_part: &str,
    tmp_dir: &Path,
    key: &KeyOptions,
) -> BarResult<Vec<u8>> {
    if let Some(private_key_path) = &key.key_path {
        let private_material = PrivateKeyMaterial(read_key_material(private_key_path)?);
        let envelope_name = format!("{stem}.key");
        let mut envelope_reader = storage.open(&envelope_name).await?;
        let len = envelope_reader.len().await?;
        let mut encoded = vec![0u8; len as usize];
        let mut filled = 0usize;
        while filled < encoded.len() {
            let n = envelope_reader.read(&mut encoded[filled..]).await?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        encoded.truncate(filled);
        let envelope = BASE64
            .decode(String::from_utf8_lossy(&encoded).trim())
            .map_err(|e| BarError::format(format!("invalid key envelope encoding: {e}")))?;
        return RsaKeyStore.unwrap_key(&private_material, &envelope);
    }

    if key.prompt_password {
        let password = prompt_password_interactively()?;
        let local_path = stage_first_part(storage, first_part, tmp_dir).await?;
        let (_, crypt_id) = probe_first_entry_algorithms(&local_path)?;
        let _ = tokio::fs::remove_file(&local_path).await;
        let crypt_algorithm = CryptAlgorithm::from_id(crypt_id)?;
        return Ok(derive_key(crypt_algorithm, password.as_bytes()));
    }

    Ok(Vec::new())
}

async fn open_reader(archive: &Path, key: &KeyOptions) -> BarResult<ArchiveReader> {
    let archive_abs = absolute_path(archive)?;
    let stem = archive_abs.to_string_lossy().into_owned();
    let parsed = StorageUrl::parse(&stem)?;
    let storage = build_backend(&parsed, None)?;
    let tmp_dir = std::env::temp_dir();

    let part_names = list_part_names(storage.as_ref(), &stem).await?;
    let key_bytes = resolve_read_key(storage.as_ref(), &stem, &part_names[0], &tmp_dir, key).await?;

    Ok(ArchiveReader::new(ArchiveReaderConfig {
        stem,
        part_names,
        key: key_bytes,
        cipher_factory: Arc::new(RustCryptoCipherFactory),
        storage,
        tmp_dir,
    }))
}

/// Drains an entry's `FILE_DATA` without keeping the bytes, returning the
/// total decompressed length. Used by `list` and when skipping an
/// already-restored or excluded entry.
async fn skip_entry_data(reader: &mut ArchiveReader) -> BarResult<u64> {
    let mut total = 0u64;
    while let Some(chunk) = reader.read_file_data(64 * 1024).await? {
        total += chunk.len() as u64;
    }
    Ok(total)
}

/// Drains an entry's `FILE_DATA`, recording each chunk as it arrives in a
/// [`FragmentSet`] rather than folding the whole entry into one post-hoc
/// range. `test` uses this so a short read shows up as a real gap in the
/// ledger instead of a single `expected != got` comparison.
async fn drain_with_fragments(reader: &mut ArchiveReader, size: u64) -> BarResult<FragmentSet> {
    let mut fragments = FragmentSet::new(size);
    let mut pos = 0u64;
    while let Some(chunk) = reader.read_file_data(64 * 1024).await? {
        fragments.add(pos, chunk.len() as u64);
        pos += chunk.len() as u64;
    }
    Ok(fragments)
}

/// Streams an entry's `FILE_DATA` to `dest`, tracking the bytes actually
/// written in a [`FragmentSet`]. `dest` may already hold a prefix of the
/// file left over from a restore that was interrupted mid-entry: bytes
/// already covering `[0, existing_len)` are recorded as already-present
/// fragments and skipped on disk rather than rewritten, so resuming a
/// split restore only pays for the parts past where it stopped.
async fn restore_entry_to_file(reader: &mut ArchiveReader, dest: &Path, size: u64) -> BarResult<FragmentSet> {
    let existing_len = tokio::fs::metadata(dest).await.map(|m| m.len()).unwrap_or(0);

    let mut file = tokio::fs::OpenOptions::new().create(true).write(true).open(dest).await?;
    let mut fragments = FragmentSet::new(size);
    if existing_len > 0 {
        fragments.add(0, existing_len.min(size));
    }

    let mut pos = 0u64;
    while let Some(chunk) = reader.read_file_data(64 * 1024).await? {
        let end = pos + chunk.len() as u64;
        if end > existing_len {
            let already_on_disk = existing_len.saturating_sub(pos) as usize;
            file.seek(std::io::SeekFrom::Start(pos + already_on_disk as u64)).await?;
            file.write_all(&chunk[already_on_disk..]).await?;
        }
        fragments.add(pos, chunk.len() as u64);
        pos = end;
    }
    file.flush().await?;
    Ok(fragments)
}
