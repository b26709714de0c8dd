//! Scan submission and result application for a stack.

use std::sync::Arc;
use std::time::{Duration, Instant};

use super::DocumentStack;
use crate::analysis::{AnalysisJoin, AnalysisOutput, CheckerKind};
use crate::document::DocumentState;
use crate::error::Result;

impl DocumentStack {
	/// Starts a new scan generation for the document at `index`.
	///
	/// Results of earlier generations still in flight will be dropped.
	pub fn analyze(&mut self, index: usize) -> Result<u64> {
		self.document_at(index)?;
		Ok(self.submit_analysis(index))
	}

	/// Submits every enabled checker for the document at `index` against a
	/// snapshot of its text.
	pub(super) fn submit_analysis(&mut self, index: usize) -> u64 {
		let scope = self.scope();
		let code_enabled = self.config.code_analysis;
		let todo_checker = self.ctx.checkers.get(CheckerKind::Todo).filter(|_| self.config.todo_list).cloned();

		let doc = &mut self.documents[index];
		doc.analysis_due = None;
		doc.scanned_version = doc.text().version();
		let generation = doc.bump_generation();

		let code_kinds = if code_enabled && doc.language().supports_code_analysis() {
			self.ctx.checkers.code_kinds()
		} else {
			Vec::new()
		};
		if code_kinds.is_empty() {
			doc.analysis_results.clear();
		}
		if todo_checker.is_none() {
			doc.todo_results.clear();
		}
		if code_kinds.is_empty() && todo_checker.is_none() {
			return generation;
		}

		let text: Arc<str> = doc.text().snapshot();
		let id = doc.id();
		if !code_kinds.is_empty() {
			doc.join = Some(AnalysisJoin::new(generation, &code_kinds));
		}
		tracing::debug!(stack = self.id.0, document = id.0, generation, code = code_kinds.len(), "stack.analyze");

		for kind in code_kinds {
			if let Some(checker) = self.ctx.checkers.get(kind) {
				self.scheduler.submit(scope, id, generation, Arc::clone(checker), Arc::clone(&text));
			}
		}
		if let Some(checker) = todo_checker {
			self.scheduler.submit(scope, id, generation, checker, text);
		}
		generation
	}

	/// Marks the document for a debounced re-scan after an edit.
	pub(super) fn schedule_realtime(&mut self, index: usize) {
		if !self.config.realtime_analysis || !self.config.analysis_enabled() {
			return;
		}
		let due = Instant::now() + self.config.realtime_analysis_delay();
		self.documents[index].analysis_due = Some(due);
	}

	/// Earliest pending realtime scan, for the embedder's timer.
	pub fn next_analysis_deadline(&self) -> Option<Instant> {
		self.documents.iter().filter_map(|doc| doc.analysis_due).min()
	}

	/// Applies queued results and launches realtime scans that came due.
	///
	/// Text edited through another stack's replica is noticed here by its
	/// version and scheduled like a local edit.
	///
	/// Returns how many documents had results published.
	pub fn poll_analysis(&mut self) -> usize {
		let outputs = self.scheduler.take_completed(self.scope());
		let applied = outputs.into_iter().filter(|output| self.apply_output(output)).count();

		let edited: Vec<usize> = self
			.documents
			.iter()
			.enumerate()
			.filter(|(_, doc)| doc.analysis_due.is_none() && doc.text().version() != doc.scanned_version)
			.map(|(index, _)| index)
			.collect();
		for index in edited {
			self.schedule_realtime(index);
		}

		let now = Instant::now();
		let due: Vec<usize> = self
			.documents
			.iter()
			.enumerate()
			.filter(|(_, doc)| doc.analysis_due.is_some_and(|due| due <= now))
			.map(|(index, _)| index)
			.collect();
		for index in due {
			self.submit_analysis(index);
		}
		applied
	}

	/// Polls until nothing is outstanding for this stack or `timeout` passes.
	pub fn wait_for_analysis(&mut self, timeout: Duration) -> usize {
		let deadline = Instant::now() + timeout;
		let mut applied = self.poll_analysis();
		loop {
			if self.scheduler.outstanding(self.scope()) == 0 {
				return applied + self.poll_analysis();
			}
			let now = Instant::now();
			if now >= deadline {
				return applied;
			}
			self.scheduler.wait_for_completions(self.scope(), deadline - now);
			applied += self.poll_analysis();
		}
	}

	/// Publishes one result if its document is open and its generation current.
	fn apply_output(&mut self, output: &AnalysisOutput) -> bool {
		let stack = self.id.0;
		let Some(doc) = self.documents.iter_mut().find(|doc| doc.id() == output.document) else {
			tracing::trace!(stack, document = output.document.0, "analysis.discard.closed");
			return false;
		};
		if output.generation != doc.generation() {
			tracing::trace!(
				stack,
				document = output.document.0,
				generation = output.generation,
				current = doc.generation(),
				"analysis.discard.stale"
			);
			return false;
		}
		if let Some(error) = &output.error {
			tracing::debug!(stack, document = output.document.0, kind = %output.kind, error, "analysis.empty_result");
		}

		match output.kind {
			CheckerKind::Todo => {
				doc.todo_results = output.findings.clone();
				true
			}
			kind => publish_joined(doc, kind, output),
		}
	}
}

fn publish_joined(doc: &mut DocumentState, kind: CheckerKind, output: &AnalysisOutput) -> bool {
	let Some(join) = doc.join.as_mut().filter(|join| join.generation() == output.generation) else {
		return false;
	};
	let Some(joined) = join.arrive(kind, output.findings.clone()) else {
		return false;
	};
	doc.analysis_results = joined;
	doc.join = None;
	true
}
