//! Build configuration.

use crate::checksums::ChecksumAlgorithm;
use chrono::{DateTime, Local};

/// File extension of every metadata sidecar.
pub const SIDECAR_EXTENSION: &str = "opex";

/// Options controlling how a package is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOptions {
    /// Fixities declared on every asset, in declaration order
    pub fixity_algorithms: Vec<ChecksumAlgorithm>,

    /// File name of the move log written inside the container
    pub moves_log_name: String,

    /// Prefix of the container folder name
    pub container_prefix: String,
}

impl Default for BuildOptions {
    fn default() -> Self {
        BuildOptions {
            fixity_algorithms: vec![ChecksumAlgorithm::Sha256],
            moves_log_name: "moves.csv".to_string(),
            container_prefix: "Container".to_string(),
        }
    }
}

impl BuildOptions {
    /// Container folder name for a build started at `at`.
    pub fn container_name(&self, at: &DateTime<Local>) -> String {
        format!("{}_{}", self.container_prefix, at.format("%Y-%m-%d_%H_%M_%S"))
    }
}
