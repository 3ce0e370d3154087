//! Render error type.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Error type for a failed stylesheet render.
///
/// Exactly one of these reaches the terminal callback of a batch: the first
/// task failure. Later failures are only reported as notifications.
///
/// # Example
///
/// ```ignore
/// render(["a.scss", "b.scss"], options, |result| match result {
///     Ok(()) => println!("done"),
///     Err(RenderError::Compile { path, message }) => {
///         eprintln!("{}: {message}", path.display());
///     }
///     Err(e) => eprintln!("{e}"),
/// });
/// ```
#[derive(Debug, Error)]
pub enum RenderError {
    /// The source stylesheet could not be read.
    #[error("failed to read {}: {source}", path.display())]
    Read {
        /// Source path that was read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The stylesheet compiler rejected the source.
    #[error("{}: {message}", path.display())]
    Compile {
        /// Filename the unit was tagged with.
        path: PathBuf,
        /// Compiler message.
        message: String,
    },

    /// The compiled CSS could not be written.
    #[error("failed to write {}: {source}", path.display())]
    Write {
        /// Destination path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// Options or settings were malformed.
    #[error("invalid options: {message}")]
    Options {
        /// What was wrong.
        message: String,
    },
}

impl RenderError {
    /// Create a compile error for the given file.
    pub fn compile(path: impl AsRef<Path>, message: impl Into<String>) -> Self {
        Self::Compile {
            path: path.as_ref().to_path_buf(),
            message: message.into(),
        }
    }

    /// Create an options error.
    pub fn options(message: impl Into<String>) -> Self {
        Self::Options {
            message: message.into(),
        }
    }

    /// Path of the stylesheet involved, if any.
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Read { path, .. } | Self::Compile { path, .. } | Self::Write { path, .. } => {
                Some(path)
            }
            Self::Options { .. } => None,
        }
    }
}
