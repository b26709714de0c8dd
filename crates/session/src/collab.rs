//! Narrow callback contracts for the UI and template collaborators.

use std::path::{Path, PathBuf};

/// Reason a confirmation is requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfirmKind {
	/// Closing a modified document. Yes saves first; No keeps it open.
	CloseModified,
	/// Reverting discards local changes.
	Revert,
	/// The file changed on disk while the buffer has local edits.
	ReloadExternal,
	/// The file disappeared from disk; Yes closes the buffer.
	RemovedExternally,
}

/// Answer to a confirmation.
///
/// `YesAll`/`NoAll` only differ from `Yes`/`No` inside a batch (closing
/// several documents at once), where they answer every remaining prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Answer {
	Yes,
	No,
	YesAll,
	NoAll,
	Cancel,
}

/// Modal UI callbacks, invoked synchronously from the coordination thread.
pub trait Interaction: Send + Sync {
	/// Asks the user a question. `batch` is true when several documents are
	/// being handled together and the all-variants are meaningful.
	fn confirm(&self, kind: ConfirmKind, message: &str, batch: bool) -> Answer;

	/// Asks for a target path for save-as; `None` cancels.
	fn pick_save_path(&self, suggested: &Path) -> Option<PathBuf>;

	/// Shows an error message.
	fn report_error(&self, message: &str) {
		tracing::error!(message, "session.report_error");
	}
}

/// [`Interaction`] that never blocks: every confirmation is answered with a
/// fixed answer and save-as is always cancelled.
#[derive(Debug, Clone, Copy)]
pub struct Unattended {
	pub answer: Answer,
}

impl Default for Unattended {
	fn default() -> Self {
		Self { answer: Answer::Cancel }
	}
}

impl Interaction for Unattended {
	fn confirm(&self, kind: ConfirmKind, message: &str, _batch: bool) -> Answer {
		tracing::debug!(?kind, message, answer = ?self.answer, "session.confirm.unattended");
		self.answer
	}

	fn pick_save_path(&self, _suggested: &Path) -> Option<PathBuf> {
		None
	}
}

/// Supplies initial content for untitled documents.
pub trait TemplateProvider: Send + Sync {
	/// Returns the text for a new buffer with the given extension (including the dot).
	fn new_file_content(&self, extension: &str) -> String;
}

/// Template with `%(date)s` and `%(username)s` placeholders.
#[derive(Debug, Clone)]
pub struct DefaultTemplate {
	template: String,
	/// Only files with this extension get the template; others start empty.
	extension: String,
}

const PYTHON_TEMPLATE: &str = "# -*- coding: utf-8 -*-\n\"\"\"\nCreated on %(date)s\n\n@author: %(username)s\n\"\"\"\n\n";

impl Default for DefaultTemplate {
	fn default() -> Self {
		Self::new(PYTHON_TEMPLATE, ".py")
	}
}

impl DefaultTemplate {
	pub fn new(template: impl Into<String>, extension: impl Into<String>) -> Self {
		Self {
			template: template.into(),
			extension: extension.into(),
		}
	}

	/// Renders the template with explicit placeholder values.
	pub fn render(&self, date: &str, username: &str) -> String {
		self.template.replace("%(date)s", date).replace("%(username)s", username)
	}
}

impl TemplateProvider for DefaultTemplate {
	fn new_file_content(&self, extension: &str) -> String {
		if extension != self.extension {
			return String::new();
		}
		let date = chrono::Local::now().format("%a %b %e %H:%M:%S %Y").to_string();
		let username = std::env::var("USER")
			.or_else(|_| std::env::var("USERNAME"))
			.unwrap_or_default();
		self.render(&date, &username)
	}
}

/// Template provider that always yields an empty buffer.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyTemplate;

impl TemplateProvider for EmptyTemplate {
	fn new_file_content(&self, _extension: &str) -> String {
		String::new()
	}
}
