//! Session configuration.
//!
//! All stack behavior switches live in one [`DocumentStackConfig`] that is
//! handed to a stack at construction and replaced wholesale through
//! [`crate::DocumentStack::apply_config`]. The file format is TOML:
//!
//! ```toml
//! [stack]
//! code-analysis = true
//! todo-list = true
//! realtime-analysis = true
//! realtime-analysis-delay-ms = 800
//! create-new-when-empty = true
//! strip-trailing-whitespace-on-save = false
//! convert-eol-on-save = "lf"
//! untitled-extension = ".py"
//!
//! [analysis]
//! max-concurrency = 2
//! drain-timeout-ms = 5000
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::encoding::LineEnding;


/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
	/// Error parsing TOML syntax or schema.
	#[error("TOML parse error: {0}")]
	Toml(#[from] toml::de::Error),

	/// Error reading a configuration file.
	#[error("I/O error reading {path}: {error}")]
	Io {
		/// Path to the file that failed to read.
		path: PathBuf,
		/// The underlying I/O error.
		error: std::io::Error,
	},

	/// A value parsed but is outside its allowed range.
	#[error("invalid configuration: {0}")]
	Invalid(String),
}

/// Per-stack behavior switches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct DocumentStackConfig {
	/// Run the lint and style checkers on documents whose language supports them.
	pub code_analysis: bool,
	/// Run the task-marker finder.
	pub todo_list: bool,
	/// Re-scan after edits once the document has been idle for the delay.
	pub realtime_analysis: bool,
	/// Idle time before a realtime re-scan.
	pub realtime_analysis_delay_ms: u64,
	/// Open a blank document when the last one closes.
	pub create_new_when_empty: bool,
	/// Remove trailing spaces and tabs from every line before writing.
	pub strip_trailing_whitespace_on_save: bool,
	/// Rewrite line endings on save; `None` keeps each file's own.
	pub convert_eol_on_save: Option<LineEnding>,
	/// Extension given to untitled buffers, including the dot.
	pub untitled_extension: String,
	/// Compare disk timestamps when a document gains focus.
	pub check_external_changes: bool,
}

impl Default for DocumentStackConfig {
	fn default() -> Self {
		Self {
			code_analysis: true,
			todo_list: true,
			realtime_analysis: false,
			realtime_analysis_delay_ms: 2500,
			create_new_when_empty: true,
			strip_trailing_whitespace_on_save: false,
			convert_eol_on_save: None,
			untitled_extension: ".py".to_string(),
			check_external_changes: true,
		}
	}
}

impl DocumentStackConfig {
	pub fn realtime_analysis_delay(&self) -> Duration {
		Duration::from_millis(self.realtime_analysis_delay_ms)
	}

	/// Whether any checker kind is enabled.
	pub fn analysis_enabled(&self) -> bool {
		self.code_analysis || self.todo_list
	}
}

/// Background analysis pool settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct AnalysisConfig {
	/// Maximum checkers running at once.
	pub max_concurrency: usize,
	/// Upper bound on waiting for in-flight checkers when a view or document closes.
	pub drain_timeout_ms: u64,
}

impl Default for AnalysisConfig {
	fn default() -> Self {
		Self {
			max_concurrency: 2,
			drain_timeout_ms: 5000,
		}
	}
}

impl AnalysisConfig {
	pub fn drain_timeout(&self) -> Duration {
		Duration::from_millis(self.drain_timeout_ms)
	}
}

/// Complete session configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionConfig {
	pub stack: DocumentStackConfig,
	pub analysis: AnalysisConfig,
}

impl SessionConfig {
	/// Parses and validates a TOML document.
	pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
		let config: Self = toml::from_str(input)?;
		config.validate()?;
		Ok(config)
	}

	/// Reads, parses and validates a TOML file.
	pub fn load(path: &Path) -> Result<Self, ConfigError> {
		let input = std::fs::read_to_string(path).map_err(|error| ConfigError::Io {
			path: path.to_path_buf(),
			error,
		})?;
		let config = Self::from_toml_str(&input)?;
		tracing::debug!(path = %path.display(), "session.config.loaded");
		Ok(config)
	}

	/// Checks value ranges that the schema cannot express.
	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.analysis.max_concurrency == 0 {
			return Err(ConfigError::Invalid("analysis.max-concurrency must be at least 1".to_string()));
		}
		let ext = &self.stack.untitled_extension;
		if !ext.is_empty() && (!ext.starts_with('.') || ext.len() == 1 || ext.contains(['/', '\\'])) {
			return Err(ConfigError::Invalid(format!("stack.untitled-extension {ext:?} must look like \".py\"")));
		}
		Ok(())
	}
}
