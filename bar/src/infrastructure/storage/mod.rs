// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Storage multiplexer: one [`bar_domain::services::StorageBackend`] per
//! back-end kind, selected by parsing a [`StorageUrl`].

pub mod bandwidth;
pub mod device;
pub mod filesystem;
pub mod ftp;
pub mod ssh;
pub mod url;

use std::sync::Arc;

use bar_domain::error::BarResult;
use bar_domain::services::StorageBackend;

pub use url::{StorageKind, StorageUrl};

/// Builds the [`StorageBackend`] a parsed [`StorageUrl`] names. `bandwidth_limit`
/// caps remote (FTP/SSH) transfer rate in bytes/sec; ignored for local
/// back-ends.
pub fn build_backend(parsed: &StorageUrl, bandwidth_limit: Option<u64>) -> BarResult<Arc<dyn StorageBackend>> {
    match parsed.kind {
        StorageKind::Filesystem => Ok(Arc::new(filesystem::FilesystemBackend::new("/"))),
        StorageKind::Ftp => Ok(Arc::new(ftp::FtpBackend::new(ftp::FtpConfig {
            host: parsed.host.clone().unwrap_or_default(),
            port: parsed.port.unwrap_or(21),
            user: parsed.user.clone(),
            password: parsed.password.clone(),
        }, bandwidth_limit))),
        StorageKind::Sftp => Ok(Arc::new(ssh::SshBackend::new(
            ssh::SshConfig {
                host: parsed.host.clone().unwrap_or_default(),
                port: parsed.port.unwrap_or(22),
                user: parsed.user.clone(),
                password: parsed.password.clone(),
            },
            ssh::SshMode::Sftp,
            bandwidth_limit,
        ))),
        StorageKind::Scp => Ok(Arc::new(ssh::SshBackend::new(
            ssh::SshConfig {
                host: parsed.host.clone().unwrap_or_default(),
                port: parsed.port.unwrap_or(22),
                user: parsed.user.clone(),
                password: parsed.password.clone(),
            },
            ssh::SshMode::Scp,
            bandwidth_limit,
        ))),
        StorageKind::Ssh => Err(bar_domain::error::BarError::configuration(
            "the bare ssh:// scheme is reserved; use sftp:// or scp://",
        )),
        StorageKind::Dvd | StorageKind::Device => Ok(Arc::new(device::DeviceBackend::new(device::DeviceConfig {
            staging_dir: std::env::temp_dir().join("bar-staging"),
            device: parsed.host.clone().or_else(|| Some(parsed.path.clone())),
            command_template: None,
        }))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_path_builds_a_filesystem_backend() {
        let parsed = StorageUrl::parse("/tmp/archive.bar").unwrap();
        assert!(build_backend(&parsed, None).is_ok());
    }

    #[test]
    fn bare_ssh_scheme_is_rejected() {
        let parsed = StorageUrl::parse("ssh://host/path").unwrap();
        assert!(build_backend(&parsed, None).is_err());
    }
}
