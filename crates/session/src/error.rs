//! Error types for session operations.

use std::path::PathBuf;

use thiserror::Error;

use crate::config::ConfigError;
use crate::stack::StackId;

/// Errors surfaced by stack and session operations.
///
/// Stale analysis results and checker failures are not errors; they are
/// dropped or converted to empty results where they occur.
#[derive(Debug, Error)]
pub enum SessionError {
	/// Reading or writing a document failed. The document is left unchanged.
	#[error("I/O error on {path}: {source}")]
	Io {
		/// File the operation was about.
		path: PathBuf,
		/// The underlying I/O error.
		source: std::io::Error,
	},

	/// A tab index outside the stack.
	#[error("no document at index {0}")]
	InvalidIndex(usize),

	/// A text edit addressed characters outside the document.
	#[error("edit out of bounds: {0}")]
	Edit(#[from] ropey::Error),

	/// A stack id that is not registered with the session.
	#[error("unknown stack {0:?}")]
	UnknownStack(StackId),

	/// Loading configuration failed.
	#[error(transparent)]
	Config(#[from] ConfigError),
}

impl SessionError {
	pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
		Self::Io { path: path.into(), source }
	}
}

/// Result type for session operations.
pub type Result<T> = std::result::Result<T, SessionError>;
