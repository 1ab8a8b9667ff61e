//! Transactional file mover.
//!
//! A [`MoveBatch`] holds one move per asset. The whole batch is validated
//! before any file is touched, and only a validated batch may execute. A
//! batch that has moved can be written to a two-column move log, and a log
//! can be loaded back and reversed to undo the moves.
//!
//! Batch states:
//!
//! ```text
//! Unvalidated --validate--> Validated --execute--> Moved
//!             \-----------> Rejected               \--> Interrupted (a move failed part way)
//! ```

use crate::error::{write_error, EngineError, Result};
use crate::fs_ops;
use crate::model::Container;
use crate::progress::BuildProgress;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use tracing::Span;
use uuid::Uuid;

pub const ORIGINAL_LOCATION: &str = "original_location";
pub const DESTINATION: &str = "destination";

/// One file relocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMove {
    pub original_location: PathBuf,
    pub destination: PathBuf,
}

impl FileMove {
    pub fn new(original_location: impl Into<PathBuf>, destination: impl Into<PathBuf>) -> Self {
        FileMove {
            original_location: original_location.into(),
            destination: destination.into(),
        }
    }

    /// The same move with its endpoints swapped.
    pub fn reversed(&self) -> Self {
        FileMove {
            original_location: self.destination.clone(),
            destination: self.original_location.clone(),
        }
    }
}

/// Lifecycle state of a move batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    /// Not yet checked against the filesystem
    Unvalidated,
    /// Every source exists and no destination does
    Validated,
    /// Validation failed; nothing was moved
    Rejected,
    /// Every move has been performed
    Moved,
    /// A move failed after `completed` moves succeeded
    Interrupted { completed: usize },
}

#[derive(Debug)]
pub struct MoveBatch {
    id: Uuid,
    moves: Vec<FileMove>,
    state: BatchState,
    span: Span,
}

impl MoveBatch {
    pub fn new(moves: Vec<FileMove>, span: Span) -> Self {
        MoveBatch {
            id: Uuid::new_v4(),
            moves,
            state: BatchState::Unvalidated,
            span,
        }
    }

    /// One move per asset of a planned container, from source file to planned destination.
    ///
    /// # Errors
    /// Returns EngineError::NotPlanned if an asset has no destination
    pub fn from_container(container: &Container, span: Span) -> Result<Self> {
        let moves = container
            .assets()
            .map(|asset| {
                asset
                    .paths()
                    .map(|paths| FileMove::new(asset.source_path(), paths.output.clone()))
                    .ok_or_else(|| EngineError::NotPlanned {
                        name: asset.name().to_string(),
                    })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(MoveBatch::new(moves, span))
    }

    /// Load the moves recorded in a move log. The batch starts out `Moved`.
    ///
    /// # Errors
    /// - EngineError::MoveLog if the log cannot be read or parsed
    /// - EngineError::InvalidMoveLog if the header is not `original_location,destination`
    /// - EngineError::EmptyMoveLog if the log records no moves
    pub fn load(log_path: &Path, span: Span) -> Result<Self> {
        let log_error = |source: csv::Error| EngineError::MoveLog {
            path: log_path.to_path_buf(),
            source,
        };

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_path(log_path)
            .map_err(log_error)?;

        let headers = reader.headers().map_err(log_error)?.clone();
        let found: Vec<String> = headers.iter().map(|h| h.trim().to_string()).collect();
        let found_set: BTreeSet<&str> = found.iter().map(String::as_str).collect();
        let expected: BTreeSet<&str> = [ORIGINAL_LOCATION, DESTINATION].into_iter().collect();
        if found.len() != expected.len() || found_set != expected {
            return Err(EngineError::InvalidMoveLog {
                path: log_path.to_path_buf(),
                found,
            });
        }
        reader.set_headers(found.iter().collect());

        let moves = reader
            .deserialize::<FileMove>()
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(log_error)?;
        if moves.is_empty() {
            return Err(EngineError::EmptyMoveLog {
                path: log_path.to_path_buf(),
            });
        }

        tracing::debug!(path = %log_path.display(), moves = moves.len(), "move log loaded");
        Ok(MoveBatch {
            id: Uuid::new_v4(),
            moves,
            state: BatchState::Moved,
            span,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn moves(&self) -> &[FileMove] {
        &self.moves
    }

    pub fn state(&self) -> BatchState {
        self.state
    }

    pub fn len(&self) -> usize {
        self.moves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.moves.is_empty()
    }

    /// Check every move against the filesystem, and that no two moves share a destination.
    ///
    /// Repeating the check on an unchanged filesystem gives the same verdict.
    ///
    /// # Errors
    /// - EngineError::MoveBatchRejected listing every missing source, existing destination and repeated destination
    /// - EngineError::InvalidState if the batch has already executed
    pub fn validate(&mut self) -> Result<()> {
        let _enter = self.span.enter();
        match self.state {
            BatchState::Unvalidated | BatchState::Validated | BatchState::Rejected => {}
            other => {
                return Err(EngineError::InvalidState {
                    expected: "an unexecuted batch".to_string(),
                    actual: format!("{:?}", other),
                })
            }
        }

        let missing_sources: Vec<PathBuf> = self
            .moves
            .iter()
            .filter(|m| m.original_location.symlink_metadata().is_err())
            .map(|m| m.original_location.clone())
            .collect();
        let existing_destinations: Vec<PathBuf> = self
            .moves
            .iter()
            .filter(|m| m.destination.symlink_metadata().is_ok())
            .map(|m| m.destination.clone())
            .collect();

        let mut seen = HashSet::new();
        let mut repeated_destinations: Vec<PathBuf> = Vec::new();
        for m in &self.moves {
            if !seen.insert(m.destination.as_path()) && !repeated_destinations.contains(&m.destination) {
                repeated_destinations.push(m.destination.clone());
            }
        }

        if missing_sources.is_empty() && existing_destinations.is_empty() && repeated_destinations.is_empty() {
            self.state = BatchState::Validated;
            tracing::debug!(batch = %self.id, moves = self.moves.len(), "move batch validated");
            Ok(())
        } else {
            self.state = BatchState::Rejected;
            tracing::warn!(
                batch = %self.id,
                missing = missing_sources.len(),
                occupied = existing_destinations.len(),
                repeated = repeated_destinations.len(),
                "move batch rejected"
            );
            Err(EngineError::MoveBatchRejected {
                missing_sources,
                existing_destinations,
                repeated_destinations,
            })
        }
    }

    /// Perform every move of a validated batch, in order.
    ///
    /// # Errors
    /// - EngineError::InvalidState unless the batch is `Validated`
    /// - EngineError::MoveFailed if a move fails; the batch becomes `Interrupted`
    pub fn execute(&mut self, progress: Option<&dyn BuildProgress>) -> Result<()> {
        let _enter = self.span.enter();
        if self.state != BatchState::Validated {
            return Err(EngineError::InvalidState {
                expected: format!("{:?}", BatchState::Validated),
                actual: format!("{:?}", self.state),
            });
        }

        let total = self.moves.len();
        for (index, file_move) in self.moves.iter().enumerate() {
            if let Err(e) = fs_ops::move_file(&file_move.original_location, &file_move.destination) {
                self.state = BatchState::Interrupted { completed: index };
                tracing::error!(batch = %self.id, completed = index, error = %e, "move batch interrupted");
                return Err(e);
            }
            tracing::debug!(
                from = %file_move.original_location.display(),
                to = %file_move.destination.display(),
                "file moved"
            );
            if let Some(callback) = progress {
                callback.on_file_moved(index, total, file_move);
            }
        }

        self.state = BatchState::Moved;
        tracing::info!(batch = %self.id, moves = total, "move batch executed");
        Ok(())
    }

    /// Write the executed moves to `log_path` with header `original_location,destination`.
    ///
    /// # Errors
    /// - EngineError::InvalidState unless the batch is `Moved`
    /// - EngineError::MoveLog / WriteError if the log cannot be written
    pub fn write_log(&self, log_path: &Path) -> Result<()> {
        if self.state != BatchState::Moved {
            return Err(EngineError::InvalidState {
                expected: format!("{:?}", BatchState::Moved),
                actual: format!("{:?}", self.state),
            });
        }
        let log_error = |source: csv::Error| EngineError::MoveLog {
            path: log_path.to_path_buf(),
            source,
        };

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_path(log_path)
            .map_err(log_error)?;
        writer
            .write_record([ORIGINAL_LOCATION, DESTINATION])
            .map_err(log_error)?;
        for file_move in &self.moves {
            writer.serialize(file_move).map_err(log_error)?;
        }
        writer.flush().map_err(write_error(log_path))?;

        tracing::info!(path = %log_path.display(), moves = self.moves.len(), "move log written");
        Ok(())
    }

    /// A fresh, unvalidated batch that puts every file back.
    ///
    /// # Errors
    /// Returns EngineError::InvalidState unless the batch is `Moved`
    pub fn reversed(&self) -> Result<MoveBatch> {
        if self.state != BatchState::Moved {
            return Err(EngineError::InvalidState {
                expected: format!("{:?}", BatchState::Moved),
                actual: format!("{:?}", self.state),
            });
        }
        Ok(MoveBatch::new(
            self.moves.iter().map(FileMove::reversed).collect(),
            self.span.clone(),
        ))
    }
}

/// Undo the moves recorded in `log_path`.
///
/// The reversed batch goes through the same validate-then-execute steps as
/// the original, so undo fails without moving anything if a file has since
/// disappeared or an original location is occupied. No new log is written.
pub fn undo_moves(log_path: &Path, progress: Option<&dyn BuildProgress>) -> Result<MoveBatch> {
    let span = tracing::info_span!("undo", log = %log_path.display());
    let recorded = MoveBatch::load(log_path, span)?;
    let mut batch = recorded.reversed()?;
    batch.validate()?;
    batch.execute(progress)?;
    Ok(batch)
}
