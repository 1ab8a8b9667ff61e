//! Path planning.
//!
//! Assigns every node its output path and sidecar path, top-down and
//! depth-first, then checks the whole plan before anything touches the disk.
//! A plan is rejected when two nodes claim the same path or when any planned
//! path already exists.

use crate::config::SIDECAR_EXTENSION;
use crate::error::{EngineError, Result};
use crate::model::{Container, NodePaths};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::Span;

fn sidecar_in(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{}.{}", name, SIDECAR_EXTENSION))
}

fn folder_paths(output: PathBuf, name: &str) -> NodePaths {
    let sidecar = sidecar_in(&output, name);
    NodePaths { output, sidecar }
}

pub struct PathPlanner {
    moves_log_name: String,
    span: Span,
}

impl PathPlanner {
    pub fn new(moves_log_name: impl Into<String>, span: Span) -> Self {
        PathPlanner {
            moves_log_name: moves_log_name.into(),
            span,
        }
    }

    /// Plan every path of `container` beneath `output_root`.
    ///
    /// Returns the path the move log will be written to. Nothing is created
    /// on disk.
    ///
    /// # Errors
    /// - EngineError::PlannedPathCollision listing every path claimed twice
    /// - EngineError::OutputPathExists listing every planned path already on disk
    pub fn plan(&self, container: &mut Container, output_root: &Path) -> Result<PathBuf> {
        let _enter = self.span.enter();

        let mut claimed: Vec<PathBuf> = Vec::new();

        let container_paths = folder_paths(output_root.join(container.name()), container.name());
        let container_dir = container_paths.output.clone();
        let moves_log = container_dir.join(&self.moves_log_name);
        claimed.push(container_paths.output.clone());
        claimed.push(container_paths.sidecar.clone());
        claimed.push(moves_log.clone());
        container.paths = Some(container_paths);

        for collection in container.collections.iter_mut() {
            let paths = folder_paths(container_dir.join(collection.name()), collection.name());
            let collection_dir = paths.output.clone();
            claimed.push(paths.output.clone());
            claimed.push(paths.sidecar.clone());
            collection.paths = Some(paths);

            for digital_object in collection.digital_objects.iter_mut() {
                let paths = folder_paths(collection_dir.join(digital_object.name()), digital_object.name());
                let object_dir = paths.output.clone();
                claimed.push(paths.output.clone());
                claimed.push(paths.sidecar.clone());
                digital_object.paths = Some(paths);

                for asset in digital_object.assets.iter_mut() {
                    let paths = NodePaths {
                        output: object_dir.join(asset.name()),
                        sidecar: sidecar_in(&object_dir, asset.name()),
                    };
                    tracing::trace!(
                        asset = asset.name(),
                        destination = %paths.output.display(),
                        "asset planned"
                    );
                    claimed.push(paths.output.clone());
                    claimed.push(paths.sidecar.clone());
                    asset.paths = Some(paths);
                }
            }
        }

        check_unique(&claimed)?;
        check_absent(&claimed)?;

        tracing::info!(
            container = %container_dir.display(),
            paths = claimed.len(),
            "output paths planned"
        );
        Ok(moves_log)
    }
}

fn check_unique(claimed: &[PathBuf]) -> Result<()> {
    let mut seen = HashSet::new();
    let mut collisions: Vec<PathBuf> = Vec::new();
    for path in claimed {
        if !seen.insert(path) && !collisions.contains(path) {
            collisions.push(path.clone());
        }
    }
    if collisions.is_empty() {
        Ok(())
    } else {
        Err(EngineError::PlannedPathCollision { paths: collisions })
    }
}

fn check_absent(claimed: &[PathBuf]) -> Result<()> {
    let existing: Vec<PathBuf> = claimed
        .iter()
        .filter(|p| p.symlink_metadata().is_ok())
        .cloned()
        .collect();
    if existing.is_empty() {
        Ok(())
    } else {
        Err(EngineError::OutputPathExists { paths: existing })
    }
}
