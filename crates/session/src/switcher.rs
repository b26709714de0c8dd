//! Ctrl+Tab style document switcher.
//!
//! A [`TabSwitcher`] is a snapshot of a stack's recency order, most recent
//! first. Stepping walks that list with wraparound; the selection commits as
//! soon as the modifier key is released.

use crate::document::{DocumentId, DocumentState};
use crate::mru::MruHistory;

/// Walk direction through the recency list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
	/// Toward less recently used documents (Ctrl+Tab).
	Previous,
	/// Back toward more recently used documents (Ctrl+Shift+Tab).
	Next,
}

/// One row of the switcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwitcherEntry {
	pub document: DocumentId,
	pub title: String,
	/// Tab index at the time the switcher opened.
	pub index: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TabSwitcher {
	entries: Vec<SwitcherEntry>,
	selected: usize,
}

impl TabSwitcher {
	/// Builds the switcher from `mru` over `documents`; stale identities are skipped.
	pub fn new(mru: &MruHistory, documents: &[DocumentState]) -> Self {
		let entries = mru
			.reversed()
			.into_iter()
			.filter_map(|id| {
				let index = mru.resolve(id, documents.iter().map(DocumentState::id)).ok()?;
				Some(SwitcherEntry {
					document: id,
					title: documents[index].title().to_string(),
					index,
				})
			})
			.collect();
		Self { entries, selected: 0 }
	}

	pub fn entries(&self) -> &[SwitcherEntry] {
		&self.entries
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	pub fn selected(&self) -> Option<&SwitcherEntry> {
		self.entries.get(self.selected)
	}

	/// Moves the selection one step, wrapping around.
	pub fn step(&mut self, direction: Direction) -> Option<DocumentId> {
		let len = self.entries.len();
		if len == 0 {
			return None;
		}
		self.selected = match direction {
			Direction::Previous => (self.selected + 1) % len,
			Direction::Next => (self.selected + len - 1) % len,
		};
		self.selected().map(|entry| entry.document)
	}

	/// Commits the selection when the modifier key is released.
	pub fn release_modifier(self) -> Option<DocumentId> {
		self.confirm()
	}

	/// Commits the selection explicitly.
	pub fn confirm(self) -> Option<DocumentId> {
		let document = self.selected().map(|entry| entry.document);
		tracing::trace!(?document, "switcher.commit");
		document
	}
}
