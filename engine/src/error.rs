//! Error types for the bulk-upload engine.
//!
//! The primary error type is `EngineError`. Validation variants carry the
//! complete offending set (every path, column, name or row), so a single run
//! reports everything that must be fixed in the input table. I/O variants
//! carry the path that failed together with the underlying `io::Error`.

use std::fmt::Display;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result alias used throughout the engine.
pub type Result<T> = std::result::Result<T, EngineError>;

/// A source path that appears on more than one table row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicatePath {
    /// Canonical source path
    pub path: PathBuf,
    /// Table line numbers on which the path appears (header is line 1)
    pub lines: Vec<usize>,
}

/// One attribute that differs between an existing tree node and an incoming
/// node of the same name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDifference {
    pub field: &'static str,
    pub existing: String,
    pub incoming: String,
}

/// Errors raised while validating, planning, exporting or moving a package.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Input table does not exist
    #[error("table not found: {}", .path.display())]
    TableNotFound { path: PathBuf },

    /// Input table could not be parsed
    #[error("failed to read table {}: {source}", .path.display())]
    TableRead {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    /// Input table has a header but no data rows
    #[error("table has no data rows: {}", .path.display())]
    EmptyTable { path: PathBuf },

    /// Collection or digital object names that cannot be a single folder name, as (line, value)
    #[error(
        "invalid folder names (empty, '.', '..' or containing a path separator):\n{}",
        join_lines(.names)
    )]
    InvalidFolderNames { names: Vec<(usize, String)> },

    /// Input table has no header row
    #[error("table has no header row: {}", .path.display())]
    MissingHeader { path: PathBuf },

    /// Unrecognized or repeated columns
    #[error(
        "invalid column names; unrecognized: [{}]; duplicated: [{}]",
        join(.unknown),
        join(.duplicate)
    )]
    InvalidColumns {
        unknown: Vec<String>,
        duplicate: Vec<String>,
    },

    /// Column set matches neither upload mode
    #[error(
        "cannot infer upload mode; expected columns [{}] or [{}] (not counting Dublin Core), got [{}]",
        join(.linked),
        join(.manual),
        join(.found)
    )]
    UnresolvedMode {
        found: Vec<String>,
        linked: Vec<String>,
        manual: Vec<String>,
    },

    /// `filepath` values that do not point at an existing file
    #[error("files do not exist:\n{}", join_paths(.paths))]
    MissingFiles { paths: Vec<PathBuf> },

    /// `filepath` values repeated across rows
    #[error("duplicate filepaths detected in table:\n{}", join_duplicates(.duplicates))]
    DuplicateFilepaths { duplicates: Vec<DuplicatePath> },

    /// File names that equal a digital object name
    #[error("files and digital objects with matching names detected:\n{}", .names.join("\n"))]
    NameCollisions { names: Vec<String> },

    /// `digital surrogate` values other than true/false, as (line, value)
    #[error(
        "invalid value for 'digital surrogate', expected 'true' or 'false':\n{}",
        join_lines(.values)
    )]
    InvalidBooleans { values: Vec<(usize, String)> },

    /// Two same-named children whose attributes differ
    #[error(
        "a {kind} named '{name}' is already present in '{parent}' with conflicting values:\n{}",
        join_differences(.differences)
    )]
    ChildConflict {
        kind: &'static str,
        name: String,
        parent: String,
        differences: Vec<FieldDifference>,
    },

    /// Digital object names used in more than one collection, as `collection/object`
    #[error("duplicate digital objects found: [{}]", join(.entries))]
    DuplicateDigitalObjects { entries: Vec<String> },

    /// Planned output paths that already exist on disk
    #[error("output paths already exist:\n{}", join_paths(.paths))]
    OutputPathExists { paths: Vec<PathBuf> },

    /// Planned output paths claimed by more than one node
    #[error("planned output paths collide:\n{}", join_paths(.paths))]
    PlannedPathCollision { paths: Vec<PathBuf> },

    /// Node reached export or move without planned paths
    #[error("no output path planned for '{name}'")]
    NotPlanned { name: String },

    /// Output root is missing or not a directory
    #[error("invalid output directory {}: {reason}", .path.display())]
    InvalidOutputRoot { path: PathBuf, reason: String },

    /// Move batch failed pre-flight validation
    #[error(
        "move batch rejected; missing sources: [{}]; existing destinations: [{}]; repeated destinations: [{}]",
        join_paths_inline(.missing_sources),
        join_paths_inline(.existing_destinations),
        join_paths_inline(.repeated_destinations)
    )]
    MoveBatchRejected {
        missing_sources: Vec<PathBuf>,
        existing_destinations: Vec<PathBuf>,
        repeated_destinations: Vec<PathBuf>,
    },

    /// Move log header is not {original_location, destination}
    #[error(
        "invalid column names in move log {}; expected 'original_location' and 'destination', got [{}]",
        .path.display(),
        join(.found)
    )]
    InvalidMoveLog { path: PathBuf, found: Vec<String> },

    /// Move log holds no entries
    #[error("no moves to process in {}", .path.display())]
    EmptyMoveLog { path: PathBuf },

    /// Move log could not be parsed or written
    #[error("failed to access move log {}: {source}", .path.display())]
    MoveLog {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    /// Operation invoked in the wrong lifecycle state
    #[error("invalid state: expected {expected}, found {actual}")]
    InvalidState { expected: String, actual: String },

    /// Failed to read a file
    #[error("failed to read {}: {source}", .path.display())]
    ReadError {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Failed to write a file
    #[error("failed to write {}: {source}", .path.display())]
    WriteError {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Failed to create a directory
    #[error("failed to create directory {}: {source}", .path.display())]
    DirectoryCreationFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Failed to relocate a file
    #[error("failed to move {} to {}: {source}", .from.display(), .to.display())]
    MoveFailed {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl EngineError {
    /// True for failures detected before anything was written or moved.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::TableNotFound { .. }
                | Self::MissingHeader { .. }
                | Self::EmptyTable { .. }
                | Self::InvalidFolderNames { .. }
                | Self::InvalidColumns { .. }
                | Self::UnresolvedMode { .. }
                | Self::MissingFiles { .. }
                | Self::DuplicateFilepaths { .. }
                | Self::NameCollisions { .. }
                | Self::InvalidBooleans { .. }
                | Self::ChildConflict { .. }
                | Self::DuplicateDigitalObjects { .. }
                | Self::OutputPathExists { .. }
                | Self::PlannedPathCollision { .. }
                | Self::InvalidOutputRoot { .. }
                | Self::MoveBatchRejected { .. }
                | Self::InvalidMoveLog { .. }
                | Self::EmptyMoveLog { .. }
        )
    }

    /// Extract the OS error code from this error, if available.
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            Self::ReadError { source, .. }
            | Self::WriteError { source, .. }
            | Self::DirectoryCreationFailed { source, .. }
            | Self::MoveFailed { source, .. } => source.raw_os_error(),
            _ => None,
        }
    }
}

fn join<T: Display>(items: &[T]) -> String {
    items
        .iter()
        .map(|item| format!("'{}'", item))
        .collect::<Vec<_>>()
        .join(", ")
}

fn join_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

fn join_paths_inline(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn join_duplicates(duplicates: &[DuplicatePath]) -> String {
    duplicates
        .iter()
        .map(|d| {
            let lines: Vec<String> = d.lines.iter().map(|l| l.to_string()).collect();
            format!("{} (lines {})", d.path.display(), lines.join(", "))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn join_lines(values: &[(usize, String)]) -> String {
    values
        .iter()
        .map(|(line, value)| format!("line {}: '{}'", line, value))
        .collect::<Vec<_>>()
        .join("\n")
}

fn join_differences(differences: &[FieldDifference]) -> String {
    differences
        .iter()
        .map(|d| format!("  {}: existing {} / new {}", d.field, d.existing, d.incoming))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Shorthand for wrapping an `io::Error` raised while reading `path`.
pub(crate) fn read_error(path: &Path) -> impl FnOnce(io::Error) -> EngineError + '_ {
    move |source| EngineError::ReadError {
        path: path.to_path_buf(),
        source,
    }
}

/// Shorthand for wrapping an `io::Error` raised while writing `path`.
pub(crate) fn write_error(path: &Path) -> impl FnOnce(io::Error) -> EngineError + '_ {
    move |source| EngineError::WriteError {
        path: path.to_path_buf(),
        source,
    }
}
