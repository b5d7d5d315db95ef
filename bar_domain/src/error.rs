// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Error taxonomy for the archiver.
//!
//! Every fallible operation in `bar-domain` and `bar` returns [`BarError`].
//! Variants are grouped by the subsystem that raises them so callers (and the
//! CLI's exit-code mapping) can branch on [`BarError::category`] instead of
//! matching every variant.

use std::io;

pub type BarResult<T> = Result<T, BarError>;

/// Top-level error type for the archiver.
#[derive(thiserror::Error, Debug)]
pub enum BarError {
    /// Malformed or contradictory configuration (CLI args, config file,
    /// pattern lists).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Wrong password, corrupt key file, or a key that does not match the
    /// archive's wrap envelope.
    #[error("authentication error: {0}")]
    Auth(String),

    /// Cipher engine failure: unsupported algorithm, bad key length, or a
    /// block that fails ciphertext-stealing recombination.
    #[error("cryptographic error: {0}")]
    Crypto(String),

    /// Compressor failure: corrupt deflate stream or an internal buffer
    /// invariant violated.
    #[error("compression error: {0}")]
    Compression(String),

    /// Chunk stream is not well-formed: unknown chunk id, truncated header,
    /// size mismatch, or CRC32 mismatch.
    #[error("archive format error: {0}")]
    Format(String),

    /// Underlying storage I/O failure (filesystem, FTP, SSH, removable
    /// media).
    #[error("I/O error: {0}")]
    Io(String),

    /// Removable-media volume controller failure: no medium loaded, wrong
    /// volume inserted, or the load request was cancelled.
    #[error("media error: {0}")]
    Media(String),

    /// A resource limit was hit: queue capacity, part-size overflow, or a
    /// worker pool that could not be sized.
    #[error("resource error: {0}")]
    Resource(String),
}

impl BarError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Auth(msg.into())
    }

    pub fn crypto(msg: impl Into<String>) -> Self {
        Self::Crypto(msg.into())
    }

    pub fn compression(msg: impl Into<String>) -> Self {
        Self::Compression(msg.into())
    }

    pub fn format(msg: impl Into<String>) -> Self {
        Self::Format(msg.into())
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Self::Io(msg.into())
    }

    pub fn media(msg: impl Into<String>) -> Self {
        Self::Media(msg.into())
    }

    pub fn resource(msg: impl Into<String>) -> Self {
        Self::Resource(msg.into())
    }

    /// Stable category tag, used for the CLI's exit-code mapping and for
    /// structured log fields.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration",
            Self::Auth(_) => "auth",
            Self::Crypto(_) => "crypto",
            Self::Compression(_) => "compression",
            Self::Format(_) => "format",
            Self::Io(_) => "io",
            Self::Media(_) => "media",
            Self::Resource(_) => "resource",
        }
    }

    /// Whether retrying the same operation (e.g. after the operator loads a
    /// new volume) could plausibly succeed.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Media(_) | Self::Resource(_))
    }
}

impl From<io::Error> for BarError {
    fn from(err: io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<std::string::FromUtf8Error> for BarError {
    fn from(err: std::string::FromUtf8Error) -> Self {
        Self::Format(format!("invalid utf-8: {err}"))
    }
}
