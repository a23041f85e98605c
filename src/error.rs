use std::path::PathBuf;

use thiserror::Error;

/// Startup-time failures. Nothing raised while decoding lines or applying
/// events ever becomes a `TrackerError`.
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("failed to bind socket {}: {source}", path.display())]
    Bind {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("scanner executable {} does not exist", .0.display())]
    ScannerNotFound(PathBuf),

    #[error("failed to spawn scanner {}: {source}", path.display())]
    ScannerSpawn {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
