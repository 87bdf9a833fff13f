// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Secure Command-Line Argument Parsing
//!
//! Security-first argument validation: length limits, dangerous-pattern
//! detection (path traversal, shell metacharacters), path canonicalization,
//! and a protected-system-directory denylist. This runs on every path-typed
//! CLI argument before it reaches the topology loader.

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Maximum argument count (prevents DOS via argv flooding).
const MAX_ARG_COUNT: usize = 100;

/// Maximum single argument length.
const MAX_ARG_LENGTH: usize = 1000;

/// Maximum path length.
const MAX_PATH_LENGTH: usize = 4096;

/// Substrings that indicate a path-traversal or shell-injection attempt.
const DANGEROUS_PATTERNS: &[&str] = &[
    "..", "~", "$", "`", ";", "&", "|", ">", "<", "\n", "\r", "\0",
];

/// System directories a topology document or config path must never resolve
/// into.
const PROTECTED_DIRS: &[&str] = &[
    "/etc", "/bin", "/sbin", "/usr/bin", "/usr/sbin", "/boot", "/sys", "/proc", "/dev",
];

/// Secure argument parsing errors.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("too many arguments (max {MAX_ARG_COUNT})")]
    TooManyArguments,

    #[error("argument too long (max {MAX_ARG_LENGTH} characters): {0}")]
    ArgumentTooLong(String),

    #[error("dangerous pattern detected in argument: {pattern} in {arg}")]
    DangerousPattern { pattern: String, arg: String },

    #[error("path exceeds maximum length (max {MAX_PATH_LENGTH})")]
    PathTooLong,

    #[error("access to protected system directory denied: {0}")]
    ProtectedDirectory(String),

    #[error("path does not exist: {0}")]
    PathNotFound(String),

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("missing required argument: {0}")]
    MissingArgument(String),

    #[error("invalid argument value for {arg}: {reason}")]
    InvalidValue { arg: String, reason: String },
}

/// Secure argument parser.
pub struct SecureArgParser;

impl SecureArgParser {
    /// Validates a single argument for length and dangerous-pattern issues.
    pub fn validate_argument(arg: &str) -> Result<(), ParseError> {
        if arg.len() > MAX_ARG_LENGTH {
            return Err(ParseError::ArgumentTooLong(
                arg.chars().take(50).collect::<String>() + "...",
            ));
        }

        for pattern in DANGEROUS_PATTERNS {
            if arg.contains(pattern) {
                return Err(ParseError::DangerousPattern {
                    pattern: pattern.to_string(),
                    arg: arg.to_string(),
                });
            }
        }

        Ok(())
    }

    /// Validates and canonicalizes a path that must already exist, e.g. a
    /// topology document or config file.
    pub fn validate_path(path: &str) -> Result<PathBuf, ParseError> {
        Self::validate_argument(path).map_err(|e| match e {
            ParseError::ArgumentTooLong(_) => {
                ParseError::InvalidPath(format!("path too long: {path}"))
            }
            ParseError::DangerousPattern { pattern, .. } => ParseError::InvalidPath(format!(
                "path contains dangerous pattern '{pattern}': {path}"
            )),
            other => other,
        })?;

        let path_obj = Path::new(path);

        let canonical = path_obj.canonicalize().map_err(|e| {
            if !path_obj.exists() {
                ParseError::PathNotFound(path.to_string())
            } else {
                ParseError::InvalidPath(format!("{path}: {e}"))
            }
        })?;

        if canonical.to_string_lossy().len() > MAX_PATH_LENGTH {
            return Err(ParseError::PathTooLong);
        }

        for protected in PROTECTED_DIRS {
            if canonical.starts_with(protected) {
                return Err(ParseError::ProtectedDirectory(canonical.display().to_string()));
            }
        }

        Ok(canonical)
    }

    pub fn validate_optional_path(path: Option<&str>) -> Result<Option<PathBuf>, ParseError> {
        match path {
            Some(p) => Self::validate_path(p).map(Some),
            None => Ok(None),
        }
    }

    pub fn validate_number<T>(
        arg_name: &str,
        value: &str,
        min: Option<T>,
        max: Option<T>,
    ) -> Result<T, ParseError>
    where
        T: std::str::FromStr + PartialOrd + std::fmt::Display,
    {
        Self::validate_argument(value)?;

        let num = value.parse::<T>().map_err(|_| ParseError::InvalidValue {
            arg: arg_name.to_string(),
            reason: format!("not a valid number: {value}"),
        })?;

        if let Some(min_val) = min {
            if num < min_val {
                return Err(ParseError::InvalidValue {
                    arg: arg_name.to_string(),
                    reason: format!("value {value} is less than minimum {min_val}"),
                });
            }
        }

        if let Some(max_val) = max {
            if num > max_val {
                return Err(ParseError::InvalidValue {
                    arg: arg_name.to_string(),
                    reason: format!("value {value} is greater than maximum {max_val}"),
                });
            }
        }

        Ok(num)
    }

    /// Validates an argv-style argument count, called before touching
    /// individual arguments.
    pub fn validate_argument_count(args: &[String]) -> Result<(), ParseError> {
        if args.len() > MAX_ARG_COUNT {
            return Err(ParseError::TooManyArguments);
        }
        Ok(())
    }
}
