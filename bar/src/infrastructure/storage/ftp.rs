// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! FTP storage backend over `suppaftp`.
//!
//! `suppaftp::FtpStream` is a blocking client, so every operation runs on
//! `spawn_blocking`. A part file is small enough (bounded by the configured
//! part size) to buffer entirely in memory before the actual `STOR`/`RETR`,
//! which keeps the connection lifecycle simple: connect, authenticate, do
//! one thing, quit.

use std::io::Cursor;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use suppaftp::FtpStream;
use tokio::task;

use bar_domain::error::{BarError, BarResult};
use bar_domain::services::{StorageBackend, StorageReader, StorageWriter};

use super::bandwidth::BandwidthLimiter;

#[derive(Debug, Clone)]
pub struct FtpConfig {
    pub host: String,
    pub port: u16,
    pub user: Option<String>,
    pub password: Option<String>,
}

impl FtpConfig {
    fn connect(&self) -> BarResult<FtpStream> {
        let addr = format!("{}:{}", self.host, self.port);
        let mut stream = FtpStream::connect(&addr).map_err(|e| BarError::io(format!("ftp connect {addr}: {e}")))?;
        let user = self.user.clone().unwrap_or_else(|| "anonymous".to_string());
        let password = self.password.clone().unwrap_or_default();
        stream
            .login(&user, &password)
            .map_err(|e| BarError::auth(format!("ftp login: {e}")))?;
        Ok(stream)
    }
}

pub struct FtpBackend {
    config: FtpConfig,
    bandwidth: Arc<Mutex<BandwidthLimiter>>,
}

impl FtpBackend {
    pub fn new(config: FtpConfig, bandwidth_limit: Option<u64>) -> Self {
        Self { config, bandwidth: Arc::new(Mutex::new(BandwidthLimiter::new(bandwidth_limit))) }
    }

    /// Cheap credential probe: connect, login, quit.
    pub async fn init(&self) -> BarResult<()> {
        let config = self.config.clone();
        task::spawn_blocking(move || {
            let mut stream = config.connect()?;
            stream.quit().map_err(|e| BarError::io(format!("ftp quit: {e}")))
        })
        .await
        .map_err(|e| BarError::io(format!("ftp probe task panicked: {e}")))?
    }
}

#[async_trait]
impl StorageBackend for FtpBackend {
    async fn create(&self, path: &str) -> BarResult<Box<dyn StorageWriter>> {
        Ok(Box::new(FtpWriter {
            config: self.config.clone(),
            path: path.to_string(),
            buffer: Vec::new(),
            bandwidth: self.bandwidth.clone(),
        }))
    }

    async fn open(&self, path: &str) -> BarResult<Box<dyn StorageReader>> {
        let config = self.config.clone();
        let path = path.to_string();
        let data = task::spawn_blocking(move || {
            let mut stream = config.connect()?;
            let bytes = stream
                .retr_as_buffer(&path)
                .map_err(|e| BarError::io(format!("ftp retr {path}: {e}")))?
                .into_inner();
            stream.quit().ok();
            Ok::<_, BarError>(bytes)
        })
        .await
        .map_err(|e| BarError::io(format!("ftp retr task panicked: {e}")))??;
        Ok(Box::new(FtpReader { cursor: Cursor::new(data) }))
    }

    async fn delete(&self, path: &str) -> BarResult<()> {
        let config = self.config.clone();
        let path = path.to_string();
        task::spawn_blocking(move || {
            let mut stream = config.connect()?;
            stream.rm(&path).map_err(|e| BarError::io(format!("ftp rm {path}: {e}")))?;
            stream.quit().ok();
            Ok(())
        })
        .await
        .map_err(|e| BarError::io(format!("ftp rm task panicked: {e}")))?
    }

    async fn exists(&self, path: &str) -> BarResult<bool> {
        let config = self.config.clone();
        let path = path.to_string();
        task::spawn_blocking(move || {
            let mut stream = config.connect()?;
            let found = stream.size(&path).is_ok();
            stream.quit().ok();
            Ok(found)
        })
        .await
        .map_err(|e| BarError::io(format!("ftp size task panicked: {e}")))?
    }

    async fn list(&self, path: &str) -> BarResult<Vec<String>> {
        let config = self.config.clone();
        let path = path.to_string();
        task::spawn_blocking(move || {
            let mut stream = config.connect()?;
            let names = stream
                .nlst(Some(&path))
                .map_err(|e| BarError::io(format!("ftp nlst {path}: {e}")))?;
            stream.quit().ok();
            Ok(names)
        })
        .await
        .map_err(|e| BarError::io(format!("ftp nlst task panicked: {e}")))?
    }
}

struct FtpWriter {
    config: FtpConfig,
    path: String,
    buffer: Vec<u8>,
    bandwidth: Arc<Mutex<BandwidthLimiter>>,
}

#[async_trait]
impl StorageWriter for FtpWriter {
    async fn write(&mut self, data: &[u8]) -> BarResult<()> {
        let mut limiter = self.bandwidth.lock().expect("bandwidth limiter mutex poisoned");
        limiter.throttle(data.len() as u64).await;
        drop(limiter);
        self.buffer.extend_from_slice(data);
        Ok(())
    }

    async fn sync(&mut self) -> BarResult<()> {
        Ok(())
    }

    async fn close(self: Box<Self>) -> BarResult<()> {
        let config = self.config;
        let path = self.path;
        let mut cursor = Cursor::new(self.buffer);
        task::spawn_blocking(move || {
            let mut stream = config.connect()?;
            stream
                .put_file(&path, &mut cursor)
                .map_err(|e| BarError::io(format!("ftp stor {path}: {e}")))?;
            stream.quit().ok();
            Ok(())
        })
        .await
        .map_err(|e| BarError::io(format!("ftp stor task panicked: {e}")))?
    }
}

struct FtpReader {
    cursor: Cursor<Vec<u8>>,
}

#[async_trait]
impl StorageReader for FtpReader {
    async fn read(&mut self, buf: &mut [u8]) -> BarResult<usize> {
        use std::io::Read;
        self.cursor.read(buf).map_err(BarError::from)
    }

    async fn seek(&mut self, offset: u64) -> BarResult<()> {
        use std::io::{Seek, SeekFrom};
        self.cursor.seek(SeekFrom::Start(offset))?;
        Ok(())
    }

    async fn len(&mut self) -> BarResult<u64> {
        Ok(self.cursor.get_ref().len() as u64)
    }
}
