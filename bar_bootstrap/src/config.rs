// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Bootstrap-phase configuration.
//!
//! `AppConfig` holds validated configuration after CLI parsing, optional
//! TOML-file loading, and default-value application. It is immutable once
//! built, so it can be handed to `bar`'s application layer without further
//! synchronization.
//!
//! Archive defaults (algorithm names, part size, storage URL) can be set in
//! a TOML file and are overridden by whatever the CLI explicitly specifies;
//! CLI-absent fields fall back to the file, and file-absent fields fall back
//! to the hardcoded defaults below.

use std::path::PathBuf;

use serde::Deserialize;

/// Log level configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl Default for LogLevel {
    fn default() -> Self {
        LogLevel::Info
    }
}

impl LogLevel {
    pub fn to_tracing_level(self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

/// Archive defaults loadable from an optional TOML config file, e.g.:
///
/// ```toml
/// [archive]
/// compress_algorithm = "zip6"
/// crypt_algorithm = "AES256"
/// max_part_size_mb = 0
/// storage_url = "file:///backups"
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ArchiveDefaults {
    pub compress_algorithm: String,
    pub crypt_algorithm: String,
    pub max_part_size_mb: u64,
    pub storage_url: Option<String>,
    pub tmp_dir: Option<PathBuf>,
}

impl Default for ArchiveDefaults {
    fn default() -> Self {
        Self {
            compress_algorithm: "zip6".to_string(),
            crypt_algorithm: "none".to_string(),
            max_part_size_mb: 0,
            storage_url: None,
            tmp_dir: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    archive: ArchiveDefaults,
}

/// Application configuration: the result of merging CLI arguments, an
/// optional TOML config file, and built-in defaults.
#[derive(Debug, Clone)]
pub struct AppConfig {
    app_name: String,
    log_level: LogLevel,
    verbose: bool,
    archive: ArchiveDefaults,
}

impl AppConfig {
    pub fn builder() -> AppConfigBuilder {
        AppConfigBuilder::default()
    }

    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    pub fn log_level(&self) -> LogLevel {
        self.log_level
    }

    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    pub fn archive(&self) -> &ArchiveDefaults {
        &self.archive
    }
}

/// Loads [`ArchiveDefaults`] from a TOML file at `path`, under an `[archive]`
/// table. Returns the hardcoded defaults if `path` is `None`.
pub fn load_archive_defaults(path: Option<&std::path::Path>) -> Result<ArchiveDefaults, ConfigError> {
    let Some(path) = path else {
        return Ok(ArchiveDefaults::default());
    };
    let settings = config::Config::builder()
        .add_source(config::File::from(path.to_path_buf()))
        .build()
        .map_err(|e| ConfigError::Load(e.to_string()))?;
    let file: FileConfig = settings.try_deserialize().map_err(|e| ConfigError::Load(e.to_string()))?;
    Ok(file.archive)
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(String),
}

#[derive(Debug, Default)]
pub struct AppConfigBuilder {
    app_name: Option<String>,
    log_level: Option<LogLevel>,
    verbose: bool,
    archive: Option<ArchiveDefaults>,
}

impl AppConfigBuilder {
    pub fn app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = Some(name.into());
        self
    }

    pub fn log_level(mut self, level: LogLevel) -> Self {
        self.log_level = Some(level);
        self
    }

    pub fn verbose(mut self, enabled: bool) -> Self {
        self.verbose = enabled;
        self
    }

    pub fn archive_defaults(mut self, defaults: ArchiveDefaults) -> Self {
        self.archive = Some(defaults);
        self
    }

    pub fn build(self) -> AppConfig {
        AppConfig {
            app_name: self.app_name.unwrap_or_else(|| "bar".to_string()),
            log_level: self.log_level.unwrap_or_default(),
            verbose: self.verbose,
            archive: self.archive.unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults_when_nothing_set() {
        let config = AppConfig::builder().build();
        assert_eq!(config.app_name(), "bar");
        assert_eq!(config.log_level(), LogLevel::Info);
        assert!(!config.is_verbose());
        assert_eq!(config.archive().compress_algorithm, "zip6");
        assert_eq!(config.archive().max_part_size_mb, 0);
    }

    #[test]
    fn builder_applies_overrides() {
        let config = AppConfig::builder()
            .app_name("bar-test")
            .log_level(LogLevel::Debug)
            .verbose(true)
            .build();
        assert_eq!(config.app_name(), "bar-test");
        assert_eq!(config.log_level(), LogLevel::Debug);
        assert!(config.is_verbose());
    }

    #[test]
    fn load_archive_defaults_without_path_uses_builtin_defaults() {
        let defaults = load_archive_defaults(None).unwrap();
        assert_eq!(defaults.compress_algorithm, "zip6");
        assert_eq!(defaults.crypt_algorithm, "none");
    }

    #[test]
    fn load_archive_defaults_reads_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bar.toml");
        std::fs::write(
            &path,
            r#"
            [archive]
            compress_algorithm = "zip9"
            crypt_algorithm = "AES256"
            max_part_size_mb = 700
            storage_url = "file:///backups"
            "#,
        )
        .unwrap();

        let defaults = load_archive_defaults(Some(&path)).unwrap();
        assert_eq!(defaults.compress_algorithm, "zip9");
        assert_eq!(defaults.crypt_algorithm, "AES256");
        assert_eq!(defaults.max_part_size_mb, 700);
        assert_eq!(defaults.storage_url.as_deref(), Some("file:///backups"));
    }
}
