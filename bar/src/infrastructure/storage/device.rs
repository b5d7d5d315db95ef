// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! DVD/Device removable-media backend.
//!
//! Writes land in a local staging directory first. When a part finishes
//! ([`StorageWriter::close`]), the configured external-command pipeline
//! (`imagePreProcess -> image -> imagePostProcess -> writePreProcess -> write
//! -> writePostProcess`, with an optional `ecc` step) burns the staged bytes
//! onto the volume, substituting `%device`/`%file`/`%image`/`%number`/
//! `%sectors` into each step's command line. A step with no configured
//! command is a no-op, so the backend degrades to "stage to disk only" when
//! no burning toolchain is configured.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::process::Command;

use bar_domain::error::{BarError, BarResult};
use bar_domain::services::{StorageBackend, StorageReader, StorageWriter};

use super::super::volume::substitute_macros;

/// One command-line template per pipeline step; `None` skips the step.
#[derive(Debug, Clone, Default)]
pub struct CommandTemplate {
    pub image_pre_process: Option<String>,
    pub image: Option<String>,
    pub image_post_process: Option<String>,
    pub ecc: Option<String>,
    pub write_pre_process: Option<String>,
    pub write: Option<String>,
    pub write_post_process: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DeviceConfig {
    pub staging_dir: PathBuf,
    pub device: Option<String>,
    pub command_template: Option<CommandTemplate>,
}

pub struct DeviceBackend {
    config: DeviceConfig,
    volume_number: Arc<AtomicU32>,
    ecc: bool,
}

impl DeviceBackend {
    pub fn new(config: DeviceConfig) -> Self {
        Self { config, volume_number: Arc::new(AtomicU32::new(1)), ecc: false }
    }

    pub fn with_ecc(mut self, ecc: bool) -> Self {
        self.ecc = ecc;
        self
    }

    fn staged_path(&self, path: &str) -> PathBuf {
        self.config.staging_dir.join(path.trim_start_matches('/'))
    }

    /// Runs the post-process burn pipeline for a staged file, substituting
    /// macros into whichever steps are configured.
    async fn run_pipeline(&self, staged: &PathBuf) -> BarResult<()> {
        let Some(template) = &self.config.command_template else { return Ok(()) };
        let volume_number = self.volume_number.load(Ordering::SeqCst);

        let mut vars = HashMap::new();
        vars.insert("device", self.config.device.clone().unwrap_or_default());
        vars.insert("file", staged.display().to_string());
        vars.insert("image", format!("{}.img", staged.display()));
        vars.insert("number", volume_number.to_string());
        let sectors = fs::metadata(staged).await.map(|m| (m.len() / 2048) + 1).unwrap_or(0);
        vars.insert("sectors", sectors.to_string());

        let mut steps = vec![
            &template.image_pre_process,
            &template.image,
            &template.image_post_process,
        ];
        if self.ecc {
            steps.push(&template.ecc);
        }
        steps.push(&template.write_pre_process);
        steps.push(&template.write);
        steps.push(&template.write_post_process);

        for step in steps.into_iter().flatten() {
            let command_line = substitute_macros(step, &vars);
            let status = Command::new("sh")
                .arg("-c")
                .arg(&command_line)
                .status()
                .await
                .map_err(|e| BarError::media(format!("device pipeline step failed to start: {e}")))?;
            if !status.success() {
                return Err(BarError::media(format!("device pipeline step exited with {status}: {command_line}")));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl StorageBackend for DeviceBackend {
    async fn create(&self, path: &str) -> BarResult<Box<dyn StorageWriter>> {
        let staged = self.staged_path(path);
        if let Some(parent) = staged.parent() {
            fs::create_dir_all(parent).await?;
        }
        let file = fs::File::create(&staged).await?;
        Ok(Box::new(DeviceWriter { file, staged, backend: self.cloned_handle() }))
    }

    async fn open(&self, path: &str) -> BarResult<Box<dyn StorageReader>> {
        let file = fs::File::open(self.staged_path(path)).await?;
        Ok(Box::new(DeviceReader { file }))
    }

    async fn delete(&self, path: &str) -> BarResult<()> {
        fs::remove_file(self.staged_path(path)).await.map_err(BarError::from)
    }

    async fn exists(&self, path: &str) -> BarResult<bool> {
        Ok(fs::metadata(self.staged_path(path)).await.is_ok())
    }

    async fn list(&self, path: &str) -> BarResult<Vec<String>> {
        let dir = self.staged_path(path);
        let mut entries = fs::read_dir(&dir).await?;
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

impl DeviceBackend {
    /// A lightweight handle the writer can run the burn pipeline through
    /// after it closes, without borrowing the backend itself.
    fn cloned_handle(&self) -> DeviceHandle {
        DeviceHandle {
            config: self.config.clone(),
            volume_number: self.volume_number.clone(),
            ecc: self.ecc,
        }
    }
}

struct DeviceHandle {
    config: DeviceConfig,
    volume_number: Arc<AtomicU32>,
    ecc: bool,
}

impl DeviceHandle {
    async fn run_pipeline(&self, staged: &PathBuf) -> BarResult<()> {
        let backend = DeviceBackend { config: self.config.clone(), volume_number: self.volume_number.clone(), ecc: self.ecc };
        backend.run_pipeline(staged).await
    }
}

struct DeviceWriter {
    file: fs::File,
    staged: PathBuf,
    backend: DeviceHandle,
}

#[async_trait]
impl StorageWriter for DeviceWriter {
    async fn write(&mut self, data: &[u8]) -> BarResult<()> {
        self.file.write_all(data).await.map_err(BarError::from)
    }

    async fn sync(&mut self) -> BarResult<()> {
        self.file.sync_all().await.map_err(BarError::from)
    }

    async fn close(mut self: Box<Self>) -> BarResult<()> {
        self.file.flush().await?;
        self.backend.run_pipeline(&self.staged).await
    }
}

struct DeviceReader {
    file: fs::File,
}

#[async_trait]
impl StorageReader for DeviceReader {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn write_without_command_template_just_stages_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let backend = DeviceBackend::new(DeviceConfig {
            staging_dir: dir.path().to_path_buf(),
            device: Some("/dev/sr0".to_string()),
            command_template: None,
        });

        let mut writer = backend.create("volume.bar").await.unwrap();
        writer.write(b"staged bytes").await.unwrap();
        writer.close().await.unwrap();

        assert!(backend.exists("volume.bar").await.unwrap());
    }

    #[tokio::test]
    async fn burn_pipeline_runs_configured_steps_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("ran.log");
        let template = CommandTemplate {
            write: Some(format!("echo wrote-%file >> {}", marker.display())),
            ..Default::default()
        };
        let backend = DeviceBackend::new(DeviceConfig {
            staging_dir: dir.path().to_path_buf(),
            device: None,
            command_template: Some(template),
        });

        let mut writer = backend.create("v.bar").await.unwrap();
        writer.write(b"x").await.unwrap();
        writer.close().await.unwrap();

        let log = std::fs::read_to_string(&marker).unwrap();
        assert!(log.contains("wrote-"));
    }
}
