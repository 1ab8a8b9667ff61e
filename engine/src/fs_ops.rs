//! Filesystem operations module.
//!
//! This module provides low-level operations for:
//! - Relocating files (rename, with a copy-and-delete fallback across filesystems)
//! - Creating directories and writing sidecar text
//! - Reading the file facts that describe an asset

use crate::error::{read_error, write_error, EngineError};
use chrono::{DateTime, Local};
use std::fs;
use std::io;
use std::path::Path;
use std::time::SystemTime;

/// Filesystem facts used to describe an asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileFacts {
    /// Extension without the leading dot ("" if none)
    pub extension: String,
    /// Size in bytes
    pub size: u64,
    /// Creation time (modification time where the platform has none)
    pub created: DateTime<Local>,
    /// Last modification time
    pub modified: DateTime<Local>,
}

impl FileFacts {
    /// One-line description: type, human-readable size, created and modified times.
    pub fn describe(&self) -> String {
        format!(
            "File Type: {}; File Size: {}; Created: {}; Modified: {}",
            self.extension,
            human_size(self.size),
            format_timestamp(&self.created),
            format_timestamp(&self.modified)
        )
    }
}

/// Read the facts for a file.
///
/// # Errors
/// Returns EngineError::ReadError if metadata cannot be read
pub fn file_facts(path: &Path) -> Result<FileFacts, EngineError> {
    let metadata = fs::metadata(path).map_err(read_error(path))?;
    let modified = metadata.modified().map_err(read_error(path))?;
    let created = metadata.created().unwrap_or(modified);

    Ok(FileFacts {
        extension: path
            .extension()
            .map(|e| e.to_string_lossy().into_owned())
            .unwrap_or_default(),
        size: metadata.len(),
        created: DateTime::<Local>::from(created),
        modified: DateTime::<Local>::from(modified),
    })
}

/// Format a timestamp as `YYYY-mm-dd HH:MM:SS`.
pub fn format_timestamp(at: &DateTime<Local>) -> String {
    at.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Render a byte count in decimal units ("0 Bytes", "1 Byte", "1.5 kB").
pub fn human_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["kB", "MB", "GB", "TB", "PB", "EB"];

    if bytes == 1 {
        return "1 Byte".to_string();
    }
    if bytes < 1000 {
        return format!("{} Bytes", bytes);
    }

    let mut size = bytes as f64 / 1000.0;
    let mut unit_idx = 0;
    while size >= 1000.0 && unit_idx < UNITS.len() - 1 {
        size /= 1000.0;
        unit_idx += 1;
    }

    format!("{:.1} {}", size, UNITS[unit_idx])
}

/// Move a file from `src` to `dst`, never replacing an existing `dst`.
///
/// Uses a rename where possible. When source and destination live on
/// different filesystems the file is copied (modification time preserved)
/// and the source removed afterwards.
///
/// # Errors
/// Returns EngineError::MoveFailed if `dst` already exists or the file
/// cannot be relocated
pub fn move_file(src: &Path, dst: &Path) -> Result<(), EngineError> {
    let failed = |source: io::Error| EngineError::MoveFailed {
        from: src.to_path_buf(),
        to: dst.to_path_buf(),
        source,
    };

    if dst.symlink_metadata().is_ok() {
        return Err(failed(io::Error::new(
            io::ErrorKind::AlreadyExists,
            "destination already exists",
        )));
    }
    if let Some(parent) = dst.parent().filter(|p| !p.as_os_str().is_empty()) {
        create_dir(parent)?;
    }

    match fs::rename(src, dst) {
        Ok(()) => Ok(()),
        Err(e) if is_cross_device(&e) => {
            copy_across_devices(src, dst)?;
            fs::remove_file(src).map_err(failed)
        }
        Err(e) => Err(failed(e)),
    }
}

#[cfg(unix)]
fn is_cross_device(e: &io::Error) -> bool {
    e.raw_os_error() == Some(18) // EXDEV
}

#[cfg(windows)]
fn is_cross_device(e: &io::Error) -> bool {
    e.raw_os_error() == Some(17) // ERROR_NOT_SAME_DEVICE
}

#[cfg(not(any(unix, windows)))]
fn is_cross_device(_e: &io::Error) -> bool {
    false
}

/// Copy into a destination that must not exist yet, keeping the source mtime.
fn copy_across_devices(src: &Path, dst: &Path) -> Result<u64, EngineError> {
    let mut src_file = fs::File::open(src).map_err(read_error(src))?;
    let src_mtime: Option<SystemTime> = src_file
        .metadata()
        .map_err(read_error(src))?
        .modified()
        .ok();

    let mut dst_file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(dst)
        .map_err(write_error(dst))?;
    let bytes_copied = io::copy(&mut src_file, &mut dst_file).map_err(write_error(dst))?;

    if let Some(mtime) = src_mtime {
        if let Err(e) = filetime::set_file_mtime(dst, filetime::FileTime::from_system_time(mtime)) {
            tracing::warn!(path = %dst.display(), error = %e, "modification time not preserved");
        }
    }

    Ok(bytes_copied)
}

/// Create a directory and any missing parents.
pub fn create_dir(path: &Path) -> Result<(), EngineError> {
    fs::create_dir_all(path).map_err(|e| EngineError::DirectoryCreationFailed {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Write text to a file, replacing any previous content.
pub fn write_text(path: &Path, contents: &str) -> Result<(), EngineError> {
    fs::write(path, contents).map_err(write_error(path))
}
