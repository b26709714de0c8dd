use super::DocumentStack;
use super::events::StackEvent;
use super::save::SaveOutcome;
use crate::collab::{Answer, ConfirmKind};
use crate::document::{DocumentId, DocumentState};
use crate::error::Result;

/// Result of closing one document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseOutcome {
	Closed,
	/// The user chose not to save, so the document stays open.
	Kept,
	/// The user cancelled.
	Cancelled,
}

/// Result of closing several documents.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOutcome {
	pub closed: Vec<DocumentId>,
	/// Documents answered with "no"; they stay open.
	pub kept: Vec<DocumentId>,
	/// The batch stopped early on a cancel.
	pub cancelled: bool,
}

impl BatchOutcome {
	fn single(self) -> CloseOutcome {
		if !self.closed.is_empty() {
			CloseOutcome::Closed
		} else if self.cancelled {
			CloseOutcome::Cancelled
		} else {
			CloseOutcome::Kept
		}
	}
}

impl DocumentStack {
	/// Closes the document at `index`.
	///
	/// Without `force`, a modified document prompts first: yes saves then
	/// closes, no leaves it open, cancel aborts. `force` skips both the prompt
	/// and the save.
	pub fn close(&mut self, index: usize, force: bool) -> Result<CloseOutcome> {
		let id = self.document_at(index)?.id();
		Ok(self.close_batch(vec![id], force)?.single())
	}

	/// Closes the documents at `indices`, prompting once per modified document.
	pub fn close_many(&mut self, indices: &[usize]) -> Result<BatchOutcome> {
		let ids = indices
			.iter()
			.map(|&index| self.document_at(index).map(DocumentState::id))
			.collect::<Result<Vec<_>>>()?;
		self.close_batch(ids, false)
	}

	pub fn close_all(&mut self) -> Result<BatchOutcome> {
		let ids = self.documents.iter().map(DocumentState::id).collect();
		self.close_batch(ids, false)
	}

	/// Closes every document except the one at `index`.
	pub fn close_all_but(&mut self, index: usize) -> Result<BatchOutcome> {
		let keep = self.document_at(index)?.id();
		let ids = self.documents.iter().map(DocumentState::id).filter(|id| *id != keep).collect();
		self.close_batch(ids, false)
	}

	fn close_batch(&mut self, ids: Vec<DocumentId>, force: bool) -> Result<BatchOutcome> {
		let batch = ids.len() > 1;
		let mut sticky: Option<Answer> = None;
		let mut outcome = BatchOutcome::default();

		for id in ids {
			let Some(index) = self.index_of_id(id) else {
				continue;
			};
			let doc = &self.documents[index];
			if !force && doc.needs_confirmation() {
				let answer = match sticky {
					Some(answer) => answer,
					None => {
						let message = format!("{} has been modified.\nDo you want to save changes?", doc.title());
						self.ctx.interaction.confirm(ConfirmKind::CloseModified, &message, batch)
					}
				};
				tracing::debug!(stack = self.id.0, document = id.0, ?answer, "stack.close.confirm");
				match answer {
					Answer::Yes | Answer::YesAll => {
						if answer == Answer::YesAll {
							sticky = Some(Answer::Yes);
						}
						if self.save(index, false)? == SaveOutcome::Cancelled {
							outcome.cancelled = true;
							break;
						}
					}
					Answer::No | Answer::NoAll => {
						if answer == Answer::NoAll {
							sticky = Some(Answer::No);
						}
						outcome.kept.push(id);
						continue;
					}
					Answer::Cancel => {
						outcome.cancelled = true;
						break;
					}
				}
			}

			// A save-as onto another open file may have closed tabs.
			if let Some(index) = self.index_of_id(id) {
				self.remove_document(index, true);
				outcome.closed.push(id);
			}
		}

		if !outcome.closed.is_empty() {
			self.ensure_not_empty();
		}
		Ok(outcome)
	}

	/// Drops the document at `index`: cancels and drains its analysis, updates
	/// the MRU and focus, and announces the close if `announce` is set.
	pub(super) fn remove_document(&mut self, index: usize, announce: bool) -> DocumentState {
		let id = self.documents[index].id();
		let report = self.scheduler.cancel_document(self.scope(), id);
		if !report.is_clean() {
			tracing::warn!(stack = self.id.0, document = id.0, abandoned = report.abandoned, "stack.close.drain_timeout");
		}

		let doc = self.documents.remove(index);
		self.mru.remove(id);
		self.active = match self.active {
			Some(active) if active == index => self.mru.most_recent().and_then(|recent| self.index_of_id(recent)),
			Some(active) if active > index => Some(active - 1),
			other => other,
		};
		if self.active.is_none() && !self.documents.is_empty() {
			self.active = Some(index.min(self.documents.len() - 1));
		}

		tracing::info!(stack = self.id.0, document = id.0, key = %doc.key(), announce, "stack.close");
		if announce {
			self.emit(StackEvent::Closed {
				key: doc.key().clone(),
				document: id,
			});
		}
		doc
	}

	/// Opens a blank document if the stack is empty and the policy asks for it.
	pub(super) fn ensure_not_empty(&mut self) {
		if self.documents.is_empty() && self.config.create_new_when_empty {
			self.new_document();
		}
	}
}
