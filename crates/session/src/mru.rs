//! Most-recently-used ordering of a stack's documents.
//!
//! The history stores document identities, never tab indices: tabs move and
//! close, identities do not. Lookups against the live tab order go through
//! [`MruHistory::resolve`], and a miss is reported as [`StaleEntry`] so the
//! caller can [`MruHistory::reconcile`] instead of failing.

#[cfg(test)]
mod tests;

use thiserror::Error;

use crate::document::DocumentId;

/// An identity in the history no longer matches any open document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("document {0:?} is no longer open")]
pub struct StaleEntry(pub DocumentId);

/// Recency list; the most recently focused document is last.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MruHistory {
	entries: Vec<DocumentId>,
}

impl MruHistory {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	pub fn contains(&self, id: DocumentId) -> bool {
		self.entries.contains(&id)
	}

	/// Identities from least to most recent.
	pub fn iter(&self) -> impl DoubleEndedIterator<Item = DocumentId> + '_ {
		self.entries.iter().copied()
	}

	/// Identities from most to least recent.
	pub fn reversed(&self) -> Vec<DocumentId> {
		self.entries.iter().rev().copied().collect()
	}

	pub fn most_recent(&self) -> Option<DocumentId> {
		self.entries.last().copied()
	}

	/// Adds a newly opened document as the most recent entry.
	pub fn append(&mut self, id: DocumentId) {
		self.touch(id);
	}

	/// Moves `id` to the most recent position, adding it if absent.
	pub fn touch(&mut self, id: DocumentId) {
		if self.entries.last() == Some(&id) {
			return;
		}
		self.entries.retain(|entry| *entry != id);
		self.entries.push(id);
	}

	/// Returns true if `id` was present.
	pub fn remove(&mut self, id: DocumentId) -> bool {
		let before = self.entries.len();
		self.entries.retain(|entry| *entry != id);
		self.entries.len() != before
	}

	/// Most recent entry other than `id`.
	pub fn most_recent_other(&self, id: DocumentId) -> Option<DocumentId> {
		self.entries.iter().rev().copied().find(|entry| *entry != id)
	}

	/// Current tab index of `id` in `tabs`.
	pub fn resolve(&self, id: DocumentId, tabs: impl IntoIterator<Item = DocumentId>) -> Result<usize, StaleEntry> {
		tabs.into_iter().position(|tab| tab == id).ok_or(StaleEntry(id))
	}

	/// Drops identities missing from `tabs` and adds untracked tabs as the
	/// least recent entries, in tab order. Returns the number of stale entries
	/// dropped.
	pub fn reconcile(&mut self, tabs: impl IntoIterator<Item = DocumentId>) -> usize {
		let tabs: Vec<DocumentId> = tabs.into_iter().collect();
		let before = self.entries.len();
		self.entries.retain(|entry| tabs.contains(entry));
		let dropped = before - self.entries.len();

		let missing: Vec<DocumentId> = tabs.iter().copied().filter(|tab| !self.entries.contains(tab)).collect();
		if !missing.is_empty() {
			self.entries.splice(0..0, missing);
		}
		if dropped > 0 {
			tracing::debug!(dropped, remaining = self.entries.len(), "mru.reconcile");
		}
		dropped
	}
}
