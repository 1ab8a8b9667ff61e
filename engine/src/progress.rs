//! Progress reporting trait.
//!
//! This module defines the BuildProgress trait, which keeps the engine free
//! of any specific front end. The CLI subscribes to it to print progress.

use crate::job::Build;
use crate::moves::FileMove;
use std::path::Path;

/// Trait for receiving progress updates from a build.
///
/// All methods are called synchronously, in order, while the build runs.
/// `on_file_moved` is also called while an undo replays a move log.
pub trait BuildProgress {
    /// Called when the build starts writing output.
    fn on_build_started(&self, build: &Build);

    /// Called after each sidecar file is written.
    fn on_sidecar_written(&self, path: &Path);

    /// Called after each file is relocated. `index` counts from zero.
    fn on_file_moved(&self, index: usize, total: usize, file_move: &FileMove);

    /// Called once every sidecar is written and every file moved.
    fn on_build_completed(&self, build: &Build);
}
