//! Background analysis of document text.
//!
//! Checkers are pure functions from a text snapshot to findings. They run on
//! the [`AnalysisScheduler`] pool, never on the coordination thread, and never
//! see live document state: results come back as values tagged with the
//! document id and scan generation, and the owning stack decides whether they
//! still apply.
//!
//! Lint and style results of one generation are published together through an
//! [`AnalysisJoin`]; task markers are published as soon as they arrive.

mod join;
mod scheduler;
mod todo;

#[cfg(test)]
mod tests;

use std::fmt;
use std::sync::Arc;

pub use join::AnalysisJoin;
pub use scheduler::{AnalysisOutput, AnalysisScheduler, SchedulerStats};
use thiserror::Error;
pub use todo::TodoChecker;

use crate::document::DocumentId;
use crate::stack::StackId;

/// One checker finding.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Finding {
	pub message: String,
	/// 1-based line number.
	pub line: u32,
}

impl Finding {
	pub fn new(message: impl Into<String>, line: u32) -> Self {
		Self {
			message: message.into(),
			line,
		}
	}
}

/// A checker could not produce findings.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct CheckerError(pub String);

/// Closed set of checker classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CheckerKind {
	/// Code errors and warnings.
	Lint,
	/// Style conventions.
	Style,
	/// Task markers in comments.
	Todo,
}

impl CheckerKind {
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Lint => "lint",
			Self::Style => "style",
			Self::Todo => "todo",
		}
	}

	/// Whether results of this kind go through the lint/style join.
	pub const fn is_code_analysis(self) -> bool {
		matches!(self, Self::Lint | Self::Style)
	}
}

impl fmt::Display for CheckerKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// A pure analysis function.
///
/// Implementations must not touch UI or document state; they only see the
/// text they are given.
pub trait Checker: Send + Sync {
	fn kind(&self) -> CheckerKind;

	fn check(&self, text: &str) -> Result<Vec<Finding>, CheckerError>;
}

/// Adapts a closure into a [`Checker`].
pub struct FnChecker<F> {
	kind: CheckerKind,
	f: F,
}

impl<F> FnChecker<F>
where
	F: Fn(&str) -> Result<Vec<Finding>, CheckerError> + Send + Sync,
{
	pub fn new(kind: CheckerKind, f: F) -> Self {
		Self { kind, f }
	}
}

impl<F> Checker for FnChecker<F>
where
	F: Fn(&str) -> Result<Vec<Finding>, CheckerError> + Send + Sync,
{
	fn kind(&self) -> CheckerKind {
		self.kind
	}

	fn check(&self, text: &str) -> Result<Vec<Finding>, CheckerError> {
		(self.f)(text)
	}
}

/// Checkers available to a session, at most one per kind.
#[derive(Clone, Default)]
pub struct CheckerSet {
	lint: Option<Arc<dyn Checker>>,
	style: Option<Arc<dyn Checker>>,
	todo: Option<Arc<dyn Checker>>,
}

impl fmt::Debug for CheckerSet {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("CheckerSet")
			.field("lint", &self.lint.is_some())
			.field("style", &self.style.is_some())
			.field("todo", &self.todo.is_some())
			.finish()
	}
}

impl CheckerSet {
	/// Only the built-in task-marker finder.
	pub fn standard() -> Self {
		Self::default().with(Arc::new(TodoChecker::default()))
	}

	/// Installs `checker` in the slot for its kind, replacing any previous one.
	pub fn with(mut self, checker: Arc<dyn Checker>) -> Self {
		let slot = match checker.kind() {
			CheckerKind::Lint => &mut self.lint,
			CheckerKind::Style => &mut self.style,
			CheckerKind::Todo => &mut self.todo,
		};
		*slot = Some(checker);
		self
	}

	pub fn get(&self, kind: CheckerKind) -> Option<&Arc<dyn Checker>> {
		match kind {
			CheckerKind::Lint => self.lint.as_ref(),
			CheckerKind::Style => self.style.as_ref(),
			CheckerKind::Todo => self.todo.as_ref(),
		}
	}

	/// Installed code-analysis kinds, lint first.
	pub fn code_kinds(&self) -> Vec<CheckerKind> {
		[CheckerKind::Lint, CheckerKind::Style]
			.into_iter()
			.filter(|kind| self.get(*kind).is_some())
			.collect()
	}
}

/// Owner of a group of analysis jobs that are cancelled and drained together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
	/// Every scope; closing it tears down all analysis.
	Global,
	/// Jobs submitted by one document stack.
	Stack(StackId),
}

/// Receipt for one submitted checker run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket {
	pub job: xeno_worker::JobId,
	pub document: DocumentId,
	pub generation: u64,
	pub kind: CheckerKind,
}
