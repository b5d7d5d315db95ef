// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Unix exit codes, following BSD `sysexits.h` conventions.
//!
//! The archiver's error taxonomy ([`bar_domain::error::BarError`]) maps onto
//! this table via [`ExitCode::from_category`], so every run terminates with a
//! code a calling script can branch on instead of always exiting `1`.

use std::fmt;

use bar_domain::error::BarError;

/// Exit codes following Unix conventions (BSD sysexits.h).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(i32)]
pub enum ExitCode {
    #[default]
    Success = 0,
    Error = 1,
    UsageError = 64,
    DataError = 65,
    NoInput = 66,
    Unavailable = 69,
    Software = 70,
    OsError = 71,
    CantCreate = 73,
    IoError = 74,
    TempFail = 75,
    NoPerm = 77,
    Config = 78,
    Interrupted = 130,
    Terminated = 143,
}

impl ExitCode {
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Maps a [`BarError`] category onto the closest `sysexits.h` code.
    pub fn from_category(error: &BarError) -> Self {
        match error.category() {
            "configuration" => ExitCode::UsageError,
            "auth" => ExitCode::NoPerm,
            "crypto" => ExitCode::DataError,
            "compression" => ExitCode::DataError,
            "format" => ExitCode::DataError,
            "io" => ExitCode::IoError,
            "media" => ExitCode::TempFail,
            "resource" => ExitCode::Unavailable,
            _ => ExitCode::Error,
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            ExitCode::Success => "Success",
            ExitCode::Error => "General error",
            ExitCode::UsageError => "Command line usage error",
            ExitCode::DataError => "Data format error",
            ExitCode::NoInput => "Cannot open input",
            ExitCode::Unavailable => "Service unavailable",
            ExitCode::Software => "Internal software error",
            ExitCode::OsError => "System error",
            ExitCode::CantCreate => "Cannot create output file",
            ExitCode::IoError => "I/O error",
            ExitCode::TempFail => "Temporary failure, retry",
            ExitCode::NoPerm => "Permission denied",
            ExitCode::Config => "Configuration error",
            ExitCode::Interrupted => "Interrupted by signal (SIGINT)",
            ExitCode::Terminated => "Terminated by signal (SIGTERM)",
        }
    }

    pub fn is_success(self) -> bool {
        matches!(self, ExitCode::Success)
    }
}

impl fmt::Display for ExitCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.description(), self.as_i32())
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> i32 {
        code.as_i32()
    }
}

/// Maps a [`BarError`] to its exit code, for `main`'s final `std::process::exit`.
pub fn map_error_to_exit_code(error: &BarError) -> ExitCode {
    ExitCode::from_category(error)
}

/// Converts an archive-operation result into a process exit code, logging
/// the error first if there is one.
pub fn result_to_exit_code<T>(result: Result<T, BarError>) -> ExitCode {
    match result {
        Ok(_) => ExitCode::Success,
        Err(e) => {
            tracing::error!(category = e.category(), "{e}");
            map_error_to_exit_code(&e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_code_values_match_sysexits() {
        assert_eq!(ExitCode::Success.as_i32(), 0);
        assert_eq!(ExitCode::UsageError.as_i32(), 64);
        assert_eq!(ExitCode::Config.as_i32(), 78);
        assert_eq!(ExitCode::Interrupted.as_i32(), 130);
    }

    #[test]
    fn category_maps_to_expected_codes() {
        assert_eq!(ExitCode::from_category(&BarError::configuration("x")), ExitCode::UsageError);
        assert_eq!(ExitCode::from_category(&BarError::auth("x")), ExitCode::NoPerm);
        assert_eq!(ExitCode::from_category(&BarError::io("x")), ExitCode::IoError);
        assert_eq!(ExitCode::from_category(&BarError::media("x")), ExitCode::TempFail);
    }

    #[test]
    fn result_to_exit_code_success_is_zero() {
        let ok: Result<(), BarError> = Ok(());
        assert_eq!(result_to_exit_code(ok), ExitCode::Success);
    }

    #[test]
    fn result_to_exit_code_error_maps_category() {
        let err: Result<(), BarError> = Err(BarError::configuration("bad flag"));
        assert_eq!(result_to_exit_code(err), ExitCode::UsageError);
    }
}
