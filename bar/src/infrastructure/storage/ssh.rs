// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! SFTP and SCP storage backends over `ssh2`.
//!
//! Both modes share a connection-lifecycle and credential model; they differ
//! only in the subsystem used to move bytes and in directory support: SFTP
//! exposes real directory enumeration, SCP does not (the `scp` wire protocol
//! has no `list` primitive; [`StorageBackend::list`] returns an error).
//!
//! `ssh2` is blocking, so every operation runs on `spawn_blocking`, buffering
//! one archive part in memory the same way the FTP backend does.

use std::io::Cursor;
use std::net::TcpStream;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ssh2::Session;
use tokio::task;

use bar_domain::error::{BarError, BarResult};
use bar_domain::services::{StorageBackend, StorageReader, StorageWriter};

use super::bandwidth::BandwidthLimiter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SshMode {
    Sftp,
    Scp,
}

#[derive(Debug, Clone)]
pub struct SshConfig {
    pub host: String,
    pub port: u16,
    pub user: Option<String>,
    pub password: Option<String>,
}

impl SshConfig {
    fn connect(&self) -> BarResult<Session> {
        let addr = format!("{}:{}", self.host, self.port);
        let tcp = TcpStream::connect(&addr).map_err(|e| BarError::io(format!("ssh connect {addr}: {e}")))?;
        let mut session = Session::new().map_err(|e| BarError::io(format!("ssh session init: {e}")))?;
        session.set_tcp_stream(tcp);
        session.handshake().map_err(|e| BarError::io(format!("ssh handshake: {e}")))?;

        let user = self.user.clone().unwrap_or_else(whoami_fallback);
        match &self.password {
            Some(password) => session
                .userauth_password(&user, password)
                .map_err(|e| BarError::auth(format!("ssh password auth: {e}")))?,
            None => session
                .userauth_agent(&user)
                .map_err(|e| BarError::auth(format!("ssh agent auth: {e}")))?,
        }
        Ok(session)
    }
}

fn whoami_fallback() -> String {
    std::env::var("USER").unwrap_or_else(|_| "root".to_string())
}

pub struct SshBackend {
    config: SshConfig,
    mode: SshMode,
    bandwidth: Arc<Mutex<BandwidthLimiter>>,
}

impl SshBackend {
    pub fn new(config: SshConfig, mode: SshMode, bandwidth_limit: Option<u64>) -> Self {
        Self { config, mode, bandwidth: Arc::new(Mutex::new(BandwidthLimiter::new(bandwidth_limit))) }
    }

    /// Cheap credential probe: connect, then disconnect.
    pub async fn init(&self) -> BarResult<()> {
        let config = self.config.clone();
        task::spawn_blocking(move || config.connect().map(|_| ()))
            .await
            .map_err(|e| BarError::io(format!("ssh probe task panicked: {e}")))?
    }
}

#[async_trait]
impl StorageBackend for SshBackend {
    async fn create(&self, path: &str) -> BarResult<Box<dyn StorageWriter>> {
        Ok(Box::new(SshWriter {
            config: self.config.clone(),
            mode: self.mode,
            path: path.to_string(),
            buffer: Vec::new(),
            bandwidth: self.bandwidth.clone(),
        }))
    }

    async fn open(&self, path: &str) -> BarResult<Box<dyn StorageReader>> {
        let config = self.config.clone();
        let mode = self.mode;
        let path = path.to_string();
        let data = task::spawn_blocking(move || download(&config, mode, &path))
            .await
            .map_err(|e| BarError::io(format!("ssh download task panicked: {e}")))??;
        Ok(Box::new(SshReader { cursor: Cursor::new(data) }))
    }

    async fn delete(&self, path: &str) -> BarResult<()> {
        let config = self.config.clone();
        let path = path.to_string();
        task::spawn_blocking(move || {
            let session = config.connect()?;
            let sftp = session.sftp().map_err(|e| BarError::io(format!("sftp subsystem: {e}")))?;
            sftp.unlink(std::path::Path::new(&path))
                .map_err(|e| BarError::io(format!("sftp unlink {path}: {e}")))
        })
        .await
        .map_err(|e| BarError::io(format!("ssh delete task panicked: {e}")))?
    }

    async fn exists(&self, path: &str) -> BarResult<bool> {
        let config = self.config.clone();
        let path = path.to_string();
        task::spawn_blocking(move || {
            let session = config.connect()?;
            let sftp = session.sftp().map_err(|e| BarError::io(format!("sftp subsystem: {e}")))?;
            Ok(sftp.stat(std::path::Path::new(&path)).is_ok())
        })
        .await
        .map_err(|e| BarError::io(format!("ssh exists task panicked: {e}")))?
    }

    async fn list(&self, path: &str) -> BarResult<Vec<String>> {
        if self.mode == SshMode::Scp {
            return Err(BarError::configuration("scp backend does not support directory enumeration"));
        }
        let config = self.config.clone();
        let path = path.to_string();
        task::spawn_blocking(move || {
            let session = config.connect()?;
            let sftp = session.sftp().map_err(|e| BarError::io(format!("sftp subsystem: {e}")))?;
            let entries = sftp
                .readdir(std::path::Path::new(&path))
                .map_err(|e| BarError::io(format!("sftp readdir {path}: {e}")))?;
            let mut names: Vec<String> = entries
                .into_iter()
                .filter_map(|(p, _)| p.file_name().map(|n| n.to_string_lossy().into_owned()))
                .collect();
            names.sort();
            Ok(names)
        })
        .await
        .map_err(|e| BarError::io(format!("ssh list task panicked: {e}")))?
    }
}

fn download(config: &SshConfig, mode: SshMode, path: &str) -> BarResult<Vec<u8>> {
    use std::io::Read;
    let session = config.connect()?;
    match mode {
        SshMode::Sftp => {
            let sftp = session.sftp().map_err(|e| BarError::io(format!("sftp subsystem: {e}")))?;
            let mut file = sftp
                .open(std::path::Path::new(path))
                .map_err(|e| BarError::io(format!("sftp open {path}: {e}")))?;
            let mut buf = Vec::new();
            file.read_to_end(&mut buf)?;
            Ok(buf)
        }
        SshMode::Scp => {
            let (mut channel, _stat) = session
                .scp_recv(std::path::Path::new(path))
                .map_err(|e| BarError::io(format!("scp recv {path}: {e}")))?;
            let mut buf = Vec::new();
            channel.read_to_end(&mut buf)?;
            channel.send_eof().ok();
            channel.wait_close().ok();
            Ok(buf)
        }
    }
}

struct SshWriter {
    config: SshConfig,
    mode: SshMode,
    path: String,
    buffer: Vec<u8>,
    bandwidth: Arc<Mutex<BandwidthLimiter>>,
}

#[async_trait]
impl StorageWriter for SshWriter {
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
        use std::io::Write;
        let config = self.config;
        let mode = self.mode;
        let path = self.path;
        let buffer = self.buffer;
        task::spawn_blocking(move || {
            let session = config.connect()?;
            match mode {
                SshMode::Sftp => {
                    let sftp = session.sftp().map_err(|e| BarError::io(format!("sftp subsystem: {e}")))?;
                    let mut file = sftp
                        .create(std::path::Path::new(&path))
                        .map_err(|e| BarError::io(format!("sftp create {path}: {e}")))?;
                    file.write_all(&buffer)?;
                    Ok(())
                }
                SshMode::Scp => {
                    let mut channel = session
                        .scp_send(std::path::Path::new(&path), 0o644, buffer.len() as u64, None)
                        .map_err(|e| BarError::io(format!("scp send {path}: {e}")))?;
                    channel.write_all(&buffer)?;
                    channel.send_eof().ok();
                    channel.wait_eof().ok();
                    channel.close().ok();
                    channel.wait_close().ok();
                    Ok(())
                }
            }
        })
        .await
        .map_err(|e| BarError::io(format!("ssh upload task panicked: {e}")))?
    }
}

struct SshReader {
    cursor: Cursor<Vec<u8>>,
}

#[async_trait]
impl StorageReader for SshReader {
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
