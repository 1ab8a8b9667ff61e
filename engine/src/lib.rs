//! # OPEX Engine - Bulk Upload Package Builder
//!
//! A headless library that turns a table describing files into an OPEX
//! bulk-upload package: a container folder holding collections, digital
//! objects and assets, one `.opex` sidecar per node, and the relocated files.
//!
//! ## Overview
//!
//! The engine provides:
//! - Table ingestion with upload-mode inference and whole-file validation
//! - A fixed three-level tree with twin merging and conflict detection
//! - Pre-flight path planning (nothing is written until the plan is sound)
//! - Sidecar export through a pluggable serializer
//! - Validated, all-or-nothing file moves with a move log that can be undone
//! - Progress reporting via callbacks (decoupled from any front end)
//!
//! ## Basic Usage
//!
//! ```no_run
//! use opex_engine::{create_build, plan_build, run_build, BuildOptions};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut build = create_build("upload.csv", "D:\\staging", BuildOptions::default())?;
//!
//! // Validate the table, build the tree and plan every path
//! plan_build(&mut build)?;
//! if let Some(container) = &build.container {
//!     print!("{}", container.render_tree());
//! }
//!
//! // Write sidecars, move the files, write the move log
//! run_build(&mut build, None)?;
//!
//! // Put everything back
//! build.undo(None)?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - **table**: Table parsing, mode inference and global checks
//! - **model** / **tree**: Package entities and the shared child-set merge rule
//! - **builder**: Rows to tree
//! - **planner**: Output and sidecar paths
//! - **opex** / **xml**: Sidecar descriptors and their XML form
//! - **export**: Writes directories and sidecars
//! - **moves**: Move batches, move log, undo
//! - **job**: Build orchestration (create, plan, run)
//! - **checksums**, **fs_ops**, **config**, **progress**, **error**: Supporting pieces

pub mod builder;
pub mod checksums;
pub mod config;
pub mod error;
pub mod export;
pub mod fs_ops;
pub mod job;
pub mod model;
pub mod moves;
pub mod opex;
pub mod planner;
pub mod progress;
pub mod table;
pub mod tree;
pub mod xml;

// Re-export main types and functions
pub use checksums::{ChecksumAlgorithm, ChecksumValue};
pub use config::BuildOptions;
pub use error::{EngineError, Result};
pub use job::{build_package, create_build, plan_build, run_build, run_build_with, Build, BuildState};
pub use model::{Asset, Collection, Container, DigitalObject, UploadMode};
pub use moves::{undo_moves, BatchState, FileMove, MoveBatch};
pub use opex::{OpexDescriptor, SidecarSerializer, XmlSidecarSerializer};
pub use progress::BuildProgress;
