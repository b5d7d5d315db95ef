// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! `clap`-derived CLI surface: `create`, `list`, `restore`, `test`.
//!
//! This module only defines the grammar; [`crate::cli::validate_cli`]
//! applies security validation and maps it onto the writer/reader
//! configuration the application layer understands.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "bar", version, about = "Backup ARchiver: encrypted, compressed, self-describing archives")]
pub struct Cli {
    /// Path to an optional TOML config file supplying archive defaults.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create a new archive from a set of files and directories.
    Create {
        /// Files and/or directories to archive.
        #[arg(required = true)]
        sources: Vec<PathBuf>,

        /// Target archive name (the stem; parts append `.NNNNNN`).
        archive: PathBuf,

        /// Glob patterns to include (applied before exclude).
        #[arg(long)]
        include: Vec<String>,

        /// Glob patterns to exclude.
        #[arg(long)]
        exclude: Vec<String>,

        /// Maximum size of one archive part, in megabytes. 0 = unsplit.
        #[arg(long, default_value_t = 0)]
        max_part_size_mb: u64,

        /// Compression algorithm: `none` or `zip0`..`zip9`.
        #[arg(long)]
        compress: Option<String>,

        /// Symmetric crypt algorithm: `none`, `3DES`, `CAST5`, `BLOWFISH`,
        /// `AES128`/`AES192`/`AES256`, `TWOFISH128`/`TWOFISH256`.
        #[arg(long)]
        crypt: Option<String>,

        /// Public key file (or inline base64 blob) to wrap the session key
        /// with, instead of or in addition to a password.
        #[arg(long)]
        public_key: Option<PathBuf>,

        /// Prompt for a password interactively.
        #[arg(long)]
        password: bool,

        /// Destination storage URL (`file://`, `ftp://`, `ssh://`,
        /// `device://`). Defaults to a local file URL built from `archive`.
        #[arg(long)]
        storage_url: Option<String>,

        /// Scratch directory for part staging.
        #[arg(long)]
        tmp_dir: Option<PathBuf>,

        /// Removable-media device path, for the Device/DVD backend.
        #[arg(long)]
        volume_device: Option<String>,

        /// Block until the first volume is loaded instead of failing
        /// immediately when none is present.
        #[arg(long)]
        wait_first_volume: bool,

        /// Enable the error-correcting-code staging path for removable
        /// media (parsed through; not yet implemented).
        #[arg(long)]
        ecc: bool,
    },

    /// List the contents of an archive without restoring any data.
    List {
        archive: PathBuf,

        #[arg(long)]
        private_key: Option<PathBuf>,

        #[arg(long)]
        password: bool,
    },

    /// Restore files from an archive to a destination directory.
    Restore {
        archive: PathBuf,

        output_dir: PathBuf,

        #[arg(long)]
        include: Vec<String>,

        #[arg(long)]
        exclude: Vec<String>,

        #[arg(long)]
        private_key: Option<PathBuf>,

        #[arg(long)]
        password: bool,

        /// Overwrite existing files at the destination.
        #[arg(long)]
        overwrite: bool,

        /// Create `output_dir` (and parents) if it does not exist.
        #[arg(long)]
        mkdir: bool,
    },

    /// Verify an archive's chunk structure and checksums without writing
    /// any files to disk.
    Test {
        archive: PathBuf,

        #[arg(long)]
        private_key: Option<PathBuf>,

        #[arg(long)]
        password: bool,
    },
}

pub fn parse_cli() -> Cli {
    Cli::parse()
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_command_graph_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn create_requires_at_least_one_source() {
        let result = Cli::try_parse_from(["bar", "create", "out.bar"]);
        assert!(result.is_err());
    }

    #[test]
    fn create_parses_minimal_invocation() {
        let cli = Cli::try_parse_from(["bar", "create", "a.txt", "out.bar"]).unwrap();
        match cli.command {
            Commands::Create { sources, archive, max_part_size_mb, .. } => {
                assert_eq!(sources, vec![PathBuf::from("a.txt")]);
                assert_eq!(archive, PathBuf::from("out.bar"));
                assert_eq!(max_part_size_mb, 0);
            }
            other => panic!("expected Create, got {other:?}"),
        }
    }

    #[test]
    fn restore_parses_positional_archive_and_output_dir() {
        let cli = Cli::try_parse_from(["bar", "restore", "out.bar", "/tmp/restored"]).unwrap();
        match cli.command {
            Commands::Restore { archive, output_dir, .. } => {
                assert_eq!(archive, PathBuf::from("out.bar"));
                assert_eq!(output_dir, PathBuf::from("/tmp/restored"));
            }
            other => panic!("expected Restore, got {other:?}"),
        }
    }
}
