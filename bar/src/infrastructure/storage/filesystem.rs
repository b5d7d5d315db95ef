// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Local filesystem storage backend.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

use bar_domain::error::{BarError, BarResult};
use bar_domain::services::{StorageBackend, StorageReader, StorageWriter};

pub struct FilesystemBackend {
    root: PathBuf,
}

impl FilesystemBackend {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        let trimmed = path.trim_start_matches('/');
        if Path::new(path).is_absolute() {
            PathBuf::from(path)
        } else {
            self.root.join(trimmed)
        }
    }
}

#[async_trait]
impl StorageBackend for FilesystemBackend {
    async fn create(&self, path: &str) -> BarResult<Box<dyn StorageWriter>> {
        let full = self.resolve(path);
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let file = File::create(&full).await?;
        Ok(Box::new(FileWriter { file }))
    }

    async fn open(&self, path: &str) -> BarResult<Box<dyn StorageReader>> {
        let file = File::open(self.resolve(path)).await?;
        Ok(Box::new(FileReader { file }))
    }

    async fn delete(&self, path: &str) -> BarResult<()> {
        tokio::fs::remove_file(self.resolve(path)).await.map_err(BarError::from)
    }

    async fn exists(&self, path: &str) -> BarResult<bool> {
        Ok(tokio::fs::metadata(self.resolve(path)).await.is_ok())
    }

    async fn list(&self, path: &str) -> BarResult<Vec<String>> {
        let dir = self.resolve(path);
        let mut entries = tokio::fs::read_dir(&dir).await?;
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }
}

struct FileWriter {
    file: File,
}

#[async_trait]
impl StorageWriter for FileWriter {
    async fn write(&mut self, data: &[u8]) -> BarResult<()> {
        self.file.write_all(data).await.map_err(BarError::from)
    }

    async fn sync(&mut self) -> BarResult<()> {
        self.file.sync_all().await.map_err(BarError::from)
    }

    async fn close(mut self: Box<Self>) -> BarResult<()> {
        self.file.flush().await.map_err(BarError::from)
    }
}

struct FileReader {
    file: File,
}

#[async_trait]
impl StorageReader for FileReader {
    async fn read(&mut self, buf: &mut [u8]) -> BarResult<usize> {
        self.file.read(buf).await.map_err(BarError::from)
    }

    async fn seek(&mut self, offset: u64) -> BarResult<()> {
        self.file.seek(std::io::SeekFrom::Start(offset)).await?;
        Ok(())
    }

    async fn len(&mut self) -> BarResult<u64> {
        Ok(self.file.metadata().await?.len())
    }
}
