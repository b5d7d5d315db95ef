// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Storage multiplexer port: one interface for local disk, FTP, SSH/SFTP/SCP,
//! and removable media. The URL-based backend selection lives in
//! infrastructure; this trait is what the archive writer/reader programs
//! against regardless of which backend answered the URL.

use async_trait::async_trait;

use crate::error::BarResult;

#[async_trait]
pub trait StorageWriter: Send {
    async fn write(&mut self, data: &[u8]) -> BarResult<()>;
    async fn sync(&mut self) -> BarResult<()>;
    async fn close(self: Box<Self>) -> BarResult<()>;
}

#[async_trait]
pub trait StorageReader: Send {
    async fn read(&mut self, buf: &mut [u8]) -> BarResult<usize>;
    async fn seek(&mut self, offset: u64) -> BarResult<()>;
    async fn len(&mut self) -> BarResult<u64>;
}

#[async_trait]
pub trait StorageBackend: Send + Sync {
    async fn create(&self, path: &str) -> BarResult<Box<dyn StorageWriter>>;
    async fn open(&self, path: &str) -> BarResult<Box<dyn StorageReader>>;
    async fn delete(&self, path: &str) -> BarResult<()>;
    async fn exists(&self, path: &str) -> BarResult<bool>;
    async fn list(&self, path: &str) -> BarResult<Vec<String>>;
}
