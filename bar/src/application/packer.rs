// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Packer pipeline: a Collector worker walks the source trees and a Packer
//! worker drains the results into an [`ArchiveWriter`], the two
//! communicating over a condition-variable-guarded queue rather than a
//! channel so the hand-off stays a plain, testable mutex + condvar pair.
//!
//! The Collector runs on its own [`std::thread`]; the Packer is whichever
//! thread calls [`run_packer_pipeline`] (callers should invoke it from a
//! `tokio::task::spawn_blocking` so its `Handle::block_on` calls into the
//! async [`ArchiveWriter`] don't block the async runtime's worker threads).

use std::collections::VecDeque;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::Duration;

use bar_bootstrap::shutdown::CancellationToken;
use bar_domain::error::BarResult;
use bar_domain::value_objects::FileMetadata;

use super::archive_writer::ArchiveWriter;

/// How the Collector treats symbolic links it encounters while walking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkPolicy {
    /// Resolve the link and archive whatever it points to.
    Follow,
    /// Skip links entirely; neither the link nor its target is archived.
    Ignore,
    /// Archive the link itself: a `FILE_DATA` entry whose content is the
    /// link target path, not the target's bytes.
    IncludeAsIs,
}

#[derive(Debug, Clone)]
struct CollectedEntry {
    path: PathBuf,
    is_symlink_as_is: bool,
}

/// Bounded-in-spirit queue (the original archiver's queue has no fixed
/// capacity either) shared between the Collector and Packer threads,
/// guarded by one mutex and one condition variable.
struct FileQueue {
    state: Mutex<FileQueueState>,
    condvar: Condvar,
}

struct FileQueueState {
    items: VecDeque<CollectedEntry>,
    collector_done: bool,
}

impl FileQueue {
    fn new() -> Self {
        Self {
            state: Mutex::new(FileQueueState { items: VecDeque::new(), collector_done: false }),
            condvar: Condvar::new(),
        }
    }

    fn push(&self, entry: CollectedEntry) {
        let mut state = self.state.lock().unwrap();
        state.items.push_back(entry);
        self.condvar.notify_one();
    }

    fn mark_collector_done(&self) {
        let mut state = self.state.lock().unwrap();
        state.collector_done = true;
        self.condvar.notify_all();
    }

    /// Pops the next entry, blocking until one is available, the Collector
    /// finishes with nothing left, or `cancellation` fires. Wakes
    /// periodically on a timeout so a fired `cancellation` is noticed even
    /// without a `notify`.
    fn pop(&self, cancellation: &CancellationToken) -> Option<CollectedEntry> {
        let mut state = self.state.lock().unwrap();
        loop {
            if let Some(entry) = state.items.pop_front() {
                return Some(entry);
            }
            if state.collector_done || cancellation.is_cancelled() {
                return None;
            }
            let (guard, _timeout) = self.condvar.wait_timeout(state, Duration::from_millis(100)).unwrap();
            state = guard;
        }
    }
}

/// Tallies the Collector's classification decisions and the Packer's
/// archiving outcomes for one run.
#[derive(Debug, Clone, Copy, Default)]
pub struct PackerStats {
    pub included: u64,
    pub excluded: u64,
    pub skipped: u64,
    pub files_written: u64,
    pub bytes_written: u64,
}

pub struct PackerConfig {
    /// Files and/or directories to archive.
    pub sources: Vec<PathBuf>,
    /// Glob patterns a file's path must match to be archived. Empty means
    /// every file under `sources` qualifies.
    pub include: Vec<String>,
    /// Glob patterns that exclude a file or prune a directory from the
    /// walk, applied after `include`.
    pub exclude: Vec<String>,
    pub link_policy: LinkPolicy,
}

/// Runs the Collector/Packer pipeline to completion, writing every
/// qualifying file under `config.sources` into `writer`. Returns the writer
/// (still open; the caller finalizes it) and the run's statistics.
///
/// Per-file stat/open failures are recorded as skips and the walk
/// continues; a failure inside the writer itself (compression, encryption,
/// chunk I/O) is not recoverable and aborts the run.
pub fn run_packer_pipeline(
    config: PackerConfig,
    mut writer: ArchiveWriter,
    cancellation: CancellationToken,
) -> BarResult<(ArchiveWriter, PackerStats)> {
    let queue = Arc::new(FileQueue::new());

    let collector_queue = queue.clone();
    let collector_cancellation = cancellation.clone();
    let sources = config.sources;
    let include = config.include;
    let exclude = config.exclude;
    let link_policy = config.link_policy;

    let collector_handle = thread::spawn(move || {
        collect(&sources, &include, &exclude, link_policy, &collector_queue, &collector_cancellation)
    });

    let handle = tokio::runtime::Handle::current();
    let mut stats = PackerStats::default();

    while let Some(entry) = queue.pop(&cancellation) {
        if cancellation.is_cancelled() {
            break;
        }
        match pack_one(&handle, &mut writer, &entry) {
            Ok(bytes) => {
                stats.files_written += 1;
                stats.bytes_written += bytes;
            }
            Err(PackError::Skip(reason)) => {
                tracing::warn!(path = %entry.path.display(), %reason, "skipping unreadable file");
                stats.skipped += 1;
            }
            Err(PackError::Fatal(e)) => return Err(e),
        }
    }

    let collector_stats = collector_handle.join().map_err(|_| {
        bar_domain::error::BarError::resource("collector thread panicked")
    })?;
    stats.included += collector_stats.included;
    stats.excluded += collector_stats.excluded;
    stats.skipped += collector_stats.skipped;

    Ok((writer, stats))
}

enum PackError {
    /// The file vanished or became unreadable between collection and
    /// packing; skip it and keep going.
    Skip(std::io::Error),
    /// The writer itself failed; the archive is no longer trustworthy past
    /// this point.
    Fatal(bar_domain::error::BarError),
}

const BUFFER_SIZE: usize = 64 * 1024;

fn pack_one(handle: &tokio::runtime::Handle, writer: &mut ArchiveWriter, entry: &CollectedEntry) -> Result<u64, PackError> {
    if entry.is_symlink_as_is {
        return pack_symlink(handle, writer, &entry.path);
    }

    let metadata = fs::metadata(&entry.path).map_err(PackError::Skip)?;
    let meta = file_metadata_from(&entry.path, &metadata);

    let mut file = fs::File::open(&entry.path).map_err(PackError::Skip)?;

    handle.block_on(writer.new_file(meta)).map_err(PackError::Fatal)?;

    let mut buffer = vec![0u8; BUFFER_SIZE];
    let mut total = 0u64;
    loop {
        let n = file.read(&mut buffer).map_err(PackError::Skip)?;
        if n == 0 {
            break;
        }
        handle.block_on(writer.write_file_data(&buffer[..n])).map_err(PackError::Fatal)?;
        total += n as u64;
    }

    handle.block_on(writer.close_file()).map_err(PackError::Fatal)?;
    Ok(total)
}

#[cfg(unix)]
fn pack_symlink(handle: &tokio::runtime::Handle, writer: &mut ArchiveWriter, path: &Path) -> Result<u64, PackError> {
    use std::os::unix::fs::MetadataExt;

    let link_metadata = fs::symlink_metadata(path).map_err(PackError::Skip)?;
    let target = fs::read_link(path).map_err(PackError::Skip)?;
    let data = target.to_string_lossy().into_owned().into_bytes();

    let meta = FileMetadata {
        size: data.len() as u64,
        time_last_access: link_metadata.atime().max(0) as u64,
        time_modified: link_metadata.mtime().max(0) as u64,
        time_last_changed: link_metadata.ctime().max(0) as u64,
        user_id: link_metadata.uid(),
        group_id: link_metadata.gid(),
        permission: link_metadata.mode(),
        name: path.to_string_lossy().into_owned(),
    };

    handle.block_on(writer.new_file(meta)).map_err(PackError::Fatal)?;
    handle.block_on(writer.write_file_data(&data)).map_err(PackError::Fatal)?;
    handle.block_on(writer.close_file()).map_err(PackError::Fatal)?;
    Ok(data.len() as u64)
}

#[cfg(not(unix))]
fn pack_symlink(handle: &tokio::runtime::Handle, writer: &mut ArchiveWriter, path: &Path) -> Result<u64, PackError> {
    let metadata = fs::symlink_metadata(path).map_err(PackError::Skip)?;
    let target = fs::read_link(path).map_err(PackError::Skip)?;
    let data = target.to_string_lossy().into_owned().into_bytes();

    let meta = FileMetadata {
        size: data.len() as u64,
        time_last_access: 0,
        time_modified: 0,
        time_last_changed: 0,
        user_id: 0,
        group_id: 0,
        permission: 0,
        name: path.to_string_lossy().into_owned(),
    };
    let _ = metadata;

    handle.block_on(writer.new_file(meta)).map_err(PackError::Fatal)?;
    handle.block_on(writer.write_file_data(&data)).map_err(PackError::Fatal)?;
    handle.block_on(writer.close_file()).map_err(PackError::Fatal)?;
    Ok(data.len() as u64)
}

#[cfg(unix)]
fn file_metadata_from(path: &Path, metadata: &fs::Metadata) -> FileMetadata {
    use std::os::unix::fs::MetadataExt;
    FileMetadata {
        size: metadata.len(),
        time_last_access: metadata.atime().max(0) as u64,
        time_modified: metadata.mtime().max(0) as u64,
        time_last_changed: metadata.ctime().max(0) as u64,
        user_id: metadata.uid(),
        group_id: metadata.gid(),
        permission: metadata.mode(),
        name: path.to_string_lossy().into_owned(),
    }
}

#[cfg(not(unix))]
fn file_metadata_from(path: &Path, metadata: &fs::Metadata) -> FileMetadata {
    let modified = metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_secs())
        .unwrap_or(0);
    FileMetadata {
        size: metadata.len(),
        time_last_access: modified,
        time_modified: modified,
        time_last_changed: modified,
        user_id: 0,
        group_id: 0,
        permission: if metadata.permissions().readonly() { 0o444 } else { 0o644 },
        name: path.to_string_lossy().into_owned(),
    }
}

/// Collector worker: walks `sources`, classifying each path and pushing
/// qualifying files onto `queue`. Grounded on the original archiver's
/// `collector()`: a pending-directory list drained breadth-first, include
/// then exclude filtering, and per-type dispatch on file/directory/link.
fn collect(
    sources: &[PathBuf],
    include: &[String],
    exclude: &[String],
    link_policy: LinkPolicy,
    queue: &FileQueue,
    cancellation: &CancellationToken,
) -> PackerStats {
    let mut stats = PackerStats::default();
    for source in sources {
        if cancellation.is_cancelled() {
            break;
        }
        walk_source(source, include, exclude, link_policy, queue, cancellation, &mut stats);
    }
    queue.mark_collector_done();
    stats
}

fn walk_source(
    source: &Path,
    include: &[String],
    exclude: &[String],
    link_policy: LinkPolicy,
    queue: &FileQueue,
    cancellation: &CancellationToken,
    stats: &mut PackerStats,
) {
    let mut pending: VecDeque<PathBuf> = VecDeque::new();
    pending.push_back(source.to_path_buf());

    while let Some(path) = pending.pop_front() {
        if cancellation.is_cancelled() {
            return;
        }

        let path_str = path.to_string_lossy();
        if !exclude.is_empty() && matches_any(exclude, &path_str) {
            stats.excluded += 1;
            continue;
        }

        let sym_meta = match fs::symlink_metadata(&path) {
            Ok(m) => m,
            Err(_) => {
                stats.skipped += 1;
                continue;
            }
        };

        if sym_meta.file_type().is_symlink() {
            match link_policy {
                LinkPolicy::Ignore => {
                    stats.skipped += 1;
                }
                LinkPolicy::IncludeAsIs => {
                    if include.is_empty() || matches_any(include, &path_str) {
                        queue.push(CollectedEntry { path: path.clone(), is_symlink_as_is: true });
                        stats.included += 1;
                    } else {
                        stats.excluded += 1;
                    }
                }
                LinkPolicy::Follow => {
                    follow_and_classify(&path, include, &mut pending, queue, stats);
                }
            }
            continue;
        }

        if sym_meta.is_dir() {
            match fs::read_dir(&path) {
                Ok(entries) => {
                    for entry in entries.flatten() {
                        pending.push_back(entry.path());
                    }
                }
                Err(_) => stats.skipped += 1,
            }
        } else if sym_meta.is_file() {
            if include.is_empty() || matches_any(include, &path_str) {
                queue.push(CollectedEntry { path, is_symlink_as_is: false });
                stats.included += 1;
            } else {
                stats.excluded += 1;
            }
        }
    }
}

fn follow_and_classify(
    path: &Path,
    include: &[String],
    pending: &mut VecDeque<PathBuf>,
    queue: &FileQueue,
    stats: &mut PackerStats,
) {
    let resolved = match fs::metadata(path) {
        Ok(m) => m,
        Err(_) => {
            stats.skipped += 1;
            return;
        }
    };
    if resolved.is_dir() {
        pending.push_back(path.to_path_buf());
    } else if resolved.is_file() {
        let path_str = path.to_string_lossy();
        if include.is_empty() || matches_any(include, &path_str) {
            queue.push(CollectedEntry { path: path.to_path_buf(), is_symlink_as_is: false });
            stats.included += 1;
        } else {
            stats.excluded += 1;
        }
    }
}

pub fn matches_any(patterns: &[String], text: &str) -> bool {
    patterns.iter().any(|p| glob_match(p, text))
}

/// Shell-glob matcher over `*` (any run of characters), `?` (one
/// character), and `[set]` character classes, applied against the whole
/// path string. No external pattern-engine dependency; this is
/// intentionally small since pattern-engine internals are out of scope.
fn glob_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    glob_match_inner(&p, &t)
}

fn glob_match_inner(p: &[char], t: &[char]) -> bool {
    match p.first() {
        None => t.is_empty(),
        Some('*') => glob_match_inner(&p[1..], t) || (!t.is_empty() && glob_match_inner(p, &t[1..])),
        Some('?') => !t.is_empty() && glob_match_inner(&p[1..], &t[1..]),
        Some('[') => {
            if let Some(close) = p.iter().position(|&c| c == ']') {
                if close > 0 {
                    let (negate, set_start) = if p[1] == '!' { (true, 2) } else { (false, 1) };
                    if let Some(&c) = t.first() {
                        let in_set = p[set_start..close].contains(&c);
                        if in_set != negate {
                            return glob_match_inner(&p[close + 1..], &t[1..]);
                        }
                    }
                    return false;
                }
            }
            // Unbalanced `[`: treat literally.
            !t.is_empty() && p[0] == t[0] && glob_match_inner(&p[1..], &t[1..])
        }
        Some(&c) => !t.is_empty() && t[0] == c && glob_match_inner(&p[1..], &t[1..]),
    }
}

/// Longest leading path prefix of `pattern` containing no glob
/// metacharacter, joined back into a path. Used so an include pattern like
/// `/var/backups/*.tar.gz` still roots the walk at `/var/backups` instead
/// of requiring a separate explicit source. **[SUPPLEMENT]** carried
/// forward from the original archiver's base-path computation.
pub fn base_path(pattern: &str) -> PathBuf {
    let mut components = Vec::new();
    for segment in pattern.split('/') {
        if is_glob_pattern(segment) {
            break;
        }
        components.push(segment);
    }
    PathBuf::from(components.join("/"))
}

fn is_glob_pattern(segment: &str) -> bool {
    segment.contains(['*', '?', '[', '{'])
}
