// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Command-line interface: parsing, security validation, and mapping onto
//! the writer/reader configuration the application layer consumes.
//!
//! ```text
//! parser::parse_cli()   -- clap grammar
//!         |
//! validate_cli()        -- SecureArgParser checks + domain type parsing
//!         |
//! ValidatedCli           -- safe, ready for bar::application
//! ```
//!
//! Per the archive format's own external-interface contract, the CLI never
//! parses chunk/part/algorithm wire formats itself; it only resolves names
//! (`"AES256"`, `"zip6"`) into the domain's [`CompressAlgorithm`] and
//! [`CryptAlgorithm`] enums and leaves the byte-level work to `bar`.

pub mod parser;
pub mod validator;

pub use parser::{parse_cli, Cli, Commands};
pub use validator::{ParseError, SecureArgParser};

use std::path::PathBuf;

use bar_domain::value_objects::compress_algorithm::CompressAlgorithm;
use bar_domain::value_objects::crypt_algorithm::CryptAlgorithm;
use bar_domain::value_objects::part_size::PartSize;

/// Validated, ready-to-run CLI invocation.
#[derive(Debug, Clone)]
pub struct ValidatedCli {
    pub command: ValidatedCommand,
    pub verbose: bool,
    pub config: Option<PathBuf>,
}

/// A validated source/destination pair naming encryption material: a
/// public/private key file, a password prompt, or both.
#[derive(Debug, Clone, Default)]
pub struct KeyOptions {
    pub key_path: Option<PathBuf>,
    pub prompt_password: bool,
}

#[derive(Debug, Clone)]
pub enum ValidatedCommand {
    Create {
        sources: Vec<PathBuf>,
        archive: PathBuf,
        include: Vec<String>,
        exclude: Vec<String>,
        part_size: PartSize,
        compress: CompressAlgorithm,
        crypt: CryptAlgorithm,
        public_key: Option<PathBuf>,
        prompt_password: bool,
        storage_url: Option<String>,
        tmp_dir: Option<PathBuf>,
        volume_device: Option<String>,
        wait_first_volume: bool,
        ecc: bool,
    },
    List {
        archive: PathBuf,
        key: KeyOptions,
    },
    Restore {
        archive: PathBuf,
        output_dir: PathBuf,
        include: Vec<String>,
        exclude: Vec<String>,
        key: KeyOptions,
        overwrite: bool,
        mkdir: bool,
    },
    Test {
        archive: PathBuf,
        key: KeyOptions,
    },
}

/// Parses CLI arguments with clap, then applies security validation.
pub fn parse_and_validate() -> Result<ValidatedCli, ParseError> {
    let cli = parse_cli();
    validate_cli(cli)
}

fn validate_new_or_url(value: &str) -> Result<(), ParseError> {
    // Storage URLs carry a scheme (`ftp://user@host/path`) that is not a
    // local filesystem path; only run the dangerous-pattern scan.
    SecureArgParser::validate_argument(value)
}

fn validate_key_options(key_path: Option<&PathBuf>, prompt_password: bool) -> Result<KeyOptions, ParseError> {
    let key_path = match key_path {
        // A key file may be a path on disk or an inline base64 blob; try
        // the path first and fall back to treating it as opaque data.
        Some(p) => {
            let s = p.to_string_lossy();
            match SecureArgParser::validate_path(&s) {
                Ok(canonical) => Some(canonical),
                Err(ParseError::PathNotFound(_)) => {
                    SecureArgParser::validate_argument(&s)?;
                    Some(p.clone())
                }
                Err(e) => return Err(e),
            }
        }
        None => None,
    };
    Ok(KeyOptions { key_path, prompt_password })
}

pub fn validate_cli(cli: Cli) -> Result<ValidatedCli, ParseError> {
    let config = if let Some(ref path) = cli.config {
        Some(SecureArgParser::validate_path(&path.to_string_lossy())?)
    } else {
        None
    };

    let command = match cli.command {
        Commands::Create {
            sources,
            archive,
            include,
            exclude,
            max_part_size_mb,
            compress,
            crypt,
            public_key,
            password,
            storage_url,
            tmp_dir,
            volume_device,
            wait_first_volume,
            ecc,
        } => {
            let mut validated_sources = Vec::with_capacity(sources.len());
            for source in &sources {
                validated_sources.push(SecureArgParser::validate_path(&source.to_string_lossy())?);
            }

            for pattern in include.iter().chain(exclude.iter()) {
                SecureArgParser::validate_argument(pattern)?;
            }

            SecureArgParser::validate_new_path(&archive.to_string_lossy())?;

            let part_size = if max_part_size_mb == 0 {
                PartSize::Unlimited
            } else {
                PartSize::Bytes(max_part_size_mb.saturating_mul(1024 * 1024))
            };

            let compress = match compress {
                Some(s) => s
                    .parse::<CompressAlgorithm>()
                    .map_err(|e| ParseError::InvalidValue { arg: "compress".to_string(), reason: e.to_string() })?,
                None => CompressAlgorithm::Zip(6),
            };

            let crypt = match crypt {
                Some(s) => s
                    .parse::<CryptAlgorithm>()
                    .map_err(|e| ParseError::InvalidValue { arg: "crypt".to_string(), reason: e.to_string() })?,
                None => CryptAlgorithm::None,
            };

            if !crypt.is_none() && public_key.is_none() && !password {
                return Err(ParseError::InvalidValue {
                    arg: "crypt".to_string(),
                    reason: "encryption requires --public-key and/or --password".to_string(),
                });
            }

            let public_key = SecureArgParser::validate_optional_path(public_key.as_ref().map(|p| p.to_string_lossy()).as_deref())?;

            if let Some(ref url) = storage_url {
                validate_new_or_url(url)?;
            }

            let tmp_dir = match tmp_dir {
                Some(p) => Some(SecureArgParser::validate_path(&p.to_string_lossy())?),
                None => None,
            };

            if let Some(ref device) = volume_device {
                SecureArgParser::validate_argument(device)?;
            }

            ValidatedCommand::Create {
                sources: validated_sources,
                archive,
                include,
                exclude,
                part_size,
                compress,
                crypt,
                public_key,
                prompt_password: password,
                storage_url,
                tmp_dir,
                volume_device,
                wait_first_volume,
                ecc,
            }
        }
        Commands::List { archive, private_key, password } => {
            validate_new_or_url(&archive.to_string_lossy())?;
            ValidatedCommand::List { archive, key: validate_key_options(private_key.as_ref(), password)? }
        }
        Commands::Restore { archive, output_dir, include, exclude, private_key, password, overwrite, mkdir } => {
            validate_new_or_url(&archive.to_string_lossy())?;
            for pattern in include.iter().chain(exclude.iter()) {
                SecureArgParser::validate_argument(pattern)?;
            }
            SecureArgParser::validate_new_path(&output_dir.to_string_lossy())?;
            ValidatedCommand::Restore {
                archive,
                output_dir,
                include,
                exclude,
                key: validate_key_options(private_key.as_ref(), password)?,
                overwrite,
                mkdir,
            }
        }
        Commands::Test { archive, private_key, password } => {
            validate_new_or_url(&archive.to_string_lossy())?;
            ValidatedCommand::Test { archive, key: validate_key_options(private_key.as_ref(), password)? }
        }
    };

    Ok(ValidatedCli { command, verbose: cli.verbose, config })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_with_no_crypt_needs_no_key_material() {
        let cli = Cli::try_parse_from(["bar", "create", "Cargo.toml", "/tmp/out.bar"]).unwrap();
        let validated = validate_cli(cli).unwrap();
        match validated.command {
            ValidatedCommand::Create { crypt, public_key, prompt_password, .. } => {
                assert_eq!(crypt, CryptAlgorithm::None);
                assert!(public_key.is_none());
                assert!(!prompt_password);
            }
            other => panic!("expected Create, got {other:?}"),
        }
    }

    #[test]
    fn create_with_crypt_but_no_key_material_is_rejected() {
        let cli = Cli::try_parse_from(["bar", "create", "--crypt", "AES256", "Cargo.toml", "/tmp/out.bar"]).unwrap();
        assert!(validate_cli(cli).is_err());
    }

    #[test]
    fn create_with_crypt_and_password_flag_is_accepted() {
        let cli =
            Cli::try_parse_from(["bar", "create", "--crypt", "AES256", "--password", "Cargo.toml", "/tmp/out.bar"])
                .unwrap();
        let validated = validate_cli(cli).unwrap();
        match validated.command {
            ValidatedCommand::Create { crypt, prompt_password, .. } => {
                assert_eq!(crypt, CryptAlgorithm::Aes256);
                assert!(prompt_password);
            }
            other => panic!("expected Create, got {other:?}"),
        }
    }

    #[test]
    fn max_part_size_mb_converts_to_bytes() {
        let cli = Cli::try_parse_from(["bar", "create", "--max-part-size-mb", "10", "Cargo.toml", "/tmp/out.bar"]).unwrap();
        let validated = validate_cli(cli).unwrap();
        match validated.command {
            ValidatedCommand::Create { part_size, .. } => {
                assert_eq!(part_size, PartSize::Bytes(10 * 1024 * 1024));
            }
            other => panic!("expected Create, got {other:?}"),
        }
    }

    #[test]
    fn dangerous_pattern_in_include_pattern_is_rejected() {
        let cli = Cli::try_parse_from(["bar", "create", "--include", "../etc/passwd", "Cargo.toml", "/tmp/out.bar"])
            .unwrap();
        assert!(validate_cli(cli).is_err());
    }
}
