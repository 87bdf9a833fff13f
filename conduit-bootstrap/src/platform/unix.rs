// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Unix Platform Implementation
//!
//! POSIX-compliant implementation for Linux and macOS.
//!
//! - **System info**: `libc::sysconf` for page size and CPU count.
//! - **Memory info**: `/proc/meminfo` on Linux, `sysctlbyname` on macOS.
//! - **Security**: `libc::geteuid` for privilege checking.
//! - **Permissions**: `std::os::unix::fs::PermissionsExt`.

use super::{Platform, PlatformError};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Unix (POSIX) platform implementation. Supports Linux and macOS.
pub struct UnixPlatform;

impl UnixPlatform {
    pub fn new() -> Self {
        Self
    }

    #[cfg(target_os = "linux")]
    fn get_memory_info_linux() -> Result<(u64, u64), PlatformError> {
        use std::fs;

        let meminfo = fs::read_to_string("/proc/meminfo")
            .map_err(|e| PlatformError::Other(format!("failed to read /proc/meminfo: {e}")))?;

        let mut total = None;
        let mut available = None;

        for line in meminfo.lines() {
            if let Some(value) = line.strip_prefix("MemTotal:") {
                total = value
                    .trim()
                    .split_whitespace()
                    .next()
                    .and_then(|s| s.parse::<u64>().ok())
                    .map(|kb| kb * 1024);
            } else if let Some(value) = line.strip_prefix("MemAvailable:") {
                available = value
                    .trim()
                    .split_whitespace()
                    .next()
                    .and_then(|s| s.parse::<u64>().ok())
                    .map(|kb| kb * 1024);
            }

            if total.is_some() && available.is_some() {
                break;
            }
        }

        match (total, available) {
            (Some(t), Some(a)) => Ok((t, a)),
            _ => Err(PlatformError::Other("failed to parse memory info".to_string())),
        }
    }

    #[cfg(target_os = "macos")]
    fn get_memory_info_macos() -> Result<(u64, u64), PlatformError> {
        use std::mem;

        unsafe {
            let mut total: u64 = 0;
            let mut size = mem::size_of::<u64>();
            let name = b"hw.memsize\0".as_ptr() as *const i8;

            if libc::sysctlbyname(
                name,
                &mut total as *mut _ as *mut libc::c_void,
                &mut size,
                std::ptr::null_mut(),
                0,
            ) != 0
            {
                return Err(PlatformError::Other(
                    "failed to get total memory via sysctl".to_string(),
                ));
            }

            let mut available: u64 = 0;
            let mut avail_size = mem::size_of::<u64>();
            let avail_name = b"vm.page_free_count\0".as_ptr() as *const i8;

            if libc::sysctlbyname(
                avail_name,
                &mut available as *mut _ as *mut libc::c_void,
                &mut avail_size,
                std::ptr::null_mut(),
                0,
            ) != 0
            {
                available = total / 2;
            } else {
                let page_size = Self::page_size_impl();
                available *= page_size;
            }

            Ok((total, available))
        }
    }

    fn page_size_impl() -> u64 {
        unsafe {
            let size = libc::sysconf(libc::_SC_PAGESIZE);
            if size > 0 {
                size as u64
            } else {
                4096
            }
        }
    }
}

impl Default for UnixPlatform {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Platform for UnixPlatform {
    fn page_size(&self) -> usize {
        Self::page_size_impl() as usize
    }

    fn cpu_count(&self) -> usize {
        unsafe {
            let count = libc::sysconf(libc::_SC_NPROCESSORS_ONLN);
            if count > 0 {
                count as usize
            } else {
                1
            }
        }
    }

    fn total_memory(&self) -> Result<u64, PlatformError> {
        #[cfg(target_os = "linux")]
        {
            Self::get_memory_info_linux().map(|(total, _)| total)
        }

        #[cfg(target_os = "macos")]
        {
            Self::get_memory_info_macos().map(|(total, _)| total)
        }

        #[cfg(not(any(target_os = "linux", target_os = "macos")))]
        {
            Err(PlatformError::NotSupported(
                "memory info not supported on this Unix variant".to_string(),
            ))
        }
    }

    fn available_memory(&self) -> Result<u64, PlatformError> {
        #[cfg(target_os = "linux")]
        {
            Self::get_memory_info_linux().map(|(_, available)| available)
        }

        #[cfg(target_os = "macos")]
        {
            Self::get_memory_info_macos().map(|(_, available)| available)
        }

        #[cfg(not(any(target_os = "linux", target_os = "macos")))]
        {
            Err(PlatformError::NotSupported(
                "memory info not supported on this Unix variant".to_string(),
            ))
        }
    }

    fn line_separator(&self) -> &'static str {
        "\n"
    }

    fn path_separator(&self) -> char {
        ':'
    }

    fn platform_name(&self) -> &'static str {
        #[cfg(target_os = "linux")]
        return "linux";

        #[cfg(target_os = "macos")]
        return "macos";

        #[cfg(not(any(target_os = "linux", target_os = "macos")))]
        return "unix";
    }

    fn temp_dir(&self) -> PathBuf {
        std::env::temp_dir()
    }

    fn is_elevated(&self) -> bool {
        unsafe { libc::geteuid() == 0 }
    }

    fn set_permissions(&self, path: &Path, mode: u32) -> Result<(), PlatformError> {
        use std::fs;
        use std::os::unix::fs::PermissionsExt;

        let permissions = fs::Permissions::from_mode(mode);
        fs::set_permissions(path, permissions)?;
        Ok(())
    }

    fn is_executable(&self, path: &Path) -> bool {
        use std::os::unix::fs::PermissionsExt;

        if let Ok(metadata) = std::fs::metadata(path) {
            let mode = metadata.permissions().mode();
            (mode & 0o111) != 0
        } else {
            false
        }
    }

    async fn sync_file(&self, file: &tokio::fs::File) -> Result<(), PlatformError> {
        file.sync_all().await?;
        Ok(())
    }
}
