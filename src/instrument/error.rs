//! Errors raised while loading instrument and tuning files

use std::path::PathBuf;

/// A load that failed outright; the previous state stays in use
#[derive(thiserror::Error, Debug)]
pub enum LoadError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Instrument syntax error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Tuning syntax error at line {line}: {message}")]
    Scala { line: usize, message: String },

    #[error("Path too long: {len} bytes (max: {max})")]
    PathTooLong { len: usize, max: usize },

    #[error("Not a file: {path:?}")]
    NotAFile { path: PathBuf },
}
