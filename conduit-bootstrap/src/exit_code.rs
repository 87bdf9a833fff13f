// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Exit Code Management
//!
//! Standardized Unix exit codes following BSD `sysexits.h` conventions.
//! The runtime's CLI surface returns 0 on clean shutdown and a non-zero
//! code on unrecoverable startup error; this module maps the engine's
//! error taxonomy onto that surface.

use std::fmt;

/// Exit codes following Unix conventions (BSD sysexits.h).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(i32)]
pub enum ExitCode {
    #[default]
    Success = 0,
    Error = 1,
    /// Invalid arguments, missing required arguments, unknown flags.
    UsageError = 64,
    /// Invalid topology document, malformed configuration, parse errors.
    DataError = 65,
    NoInput = 66,
    NoUser = 67,
    NoHost = 68,
    /// Required peer-forwarding service not reachable.
    Unavailable = 69,
    Software = 70,
    OsError = 71,
    OsFile = 72,
    CantCreate = 73,
    IoError = 74,
    TempFail = 75,
    Protocol = 76,
    NoPerm = 77,
    /// Topology validation failure (cycle, unknown reference, duplicate
    /// name, missing required field).
    Config = 78,
    /// SIGINT received.
    Interrupted = 130,
    /// SIGTERM received.
    Terminated = 143,
}

impl ExitCode {
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Maps an error to an exit code by matching substrings of its
    /// `Display` output against common error vocabulary. Used when the
    /// caller has only `&dyn std::error::Error` and not a typed error
    /// taxonomy to switch on.
    pub fn from_error(error: &dyn std::error::Error) -> Self {
        let error_string = error.to_string().to_lowercase();

        if error_string.contains("permission") || error_string.contains("access denied") {
            ExitCode::NoPerm
        } else if error_string.contains("not found") || error_string.contains("no such") {
            ExitCode::NoInput
        } else if error_string.contains("cycle")
            || error_string.contains("duplicate")
            || error_string.contains("unknown reference")
            || error_string.contains("topology")
        {
            ExitCode::Config
        } else if error_string.contains("invalid") || error_string.contains("argument") {
            ExitCode::UsageError
        } else if error_string.contains("parse") || error_string.contains("format") {
            ExitCode::DataError
        } else if error_string.contains("io")
            || error_string.contains("read")
            || error_string.contains("write")
        {
            ExitCode::IoError
        } else if error_string.contains("config") {
            ExitCode::Config
        } else if error_string.contains("unavailable") || error_string.contains("not available") {
            ExitCode::Unavailable
        } else {
            ExitCode::Error
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            ExitCode::Success => "Success",
            ExitCode::Error => "General error",
            ExitCode::UsageError => "Command line usage error",
            ExitCode::DataError => "Data format error",
            ExitCode::NoInput => "Cannot open input",
            ExitCode::NoUser => "User does not exist",
            ExitCode::NoHost => "Host name unknown",
            ExitCode::Unavailable => "Service unavailable",
            ExitCode::Software => "Internal software error",
            ExitCode::OsError => "System error",
            ExitCode::OsFile => "Critical OS file missing",
            ExitCode::CantCreate => "Cannot create output file",
            ExitCode::IoError => "I/O error",
            ExitCode::TempFail => "Temporary failure, retry",
            ExitCode::Protocol => "Remote error in protocol",
            ExitCode::NoPerm => "Permission denied",
            ExitCode::Config => "Configuration error",
            ExitCode::Interrupted => "Interrupted by signal (SIGINT)",
            ExitCode::Terminated => "Terminated by signal (SIGTERM)",
        }
    }

    pub fn is_success(self) -> bool {
        matches!(self, ExitCode::Success)
    }

    pub fn is_error(self) -> bool {
        !self.is_success()
    }

    pub fn is_signal(self) -> bool {
        matches!(self, ExitCode::Interrupted | ExitCode::Terminated)
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

/// Maps any boxed error to an exit code via [`ExitCode::from_error`].
pub fn map_error_to_exit_code(error: &(dyn std::error::Error + 'static)) -> ExitCode {
    ExitCode::from_error(error)
}

/// Converts a top-level `Result` into a `std::process::ExitCode`, logging
/// the error (if any) before mapping it.
pub fn result_to_exit_code<T, E>(result: Result<T, E>) -> std::process::ExitCode
where
    E: std::error::Error + 'static,
{
    match result {
        Ok(_) => std::process::ExitCode::from(ExitCode::Success.as_i32() as u8),
        Err(e) => {
            tracing::error!(error = %e, "application exited with error");
            let code = map_error_to_exit_code(&e);
            std::process::ExitCode::from(code.as_i32() as u8)
        }
    }
}
