use super::DocumentStack;
use super::events::StackEvent;
use crate::collab::{Answer, ConfirmKind};
use crate::encoding::decode;
use crate::error::Result;

/// What focus-time disk comparison did to a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExternalChange {
	/// Disk and buffer agree, or the document has no file yet.
	Unchanged,
	/// The file changed on disk and the buffer was reloaded.
	Reloaded,
	/// The file changed on disk; the user kept the local edits.
	KeptLocal,
	/// The file was removed and the user closed the buffer.
	Closed,
	/// The file was removed and the buffer was kept as modified, to be saved again.
	MarkedModified,
}

impl DocumentStack {
	/// Compares the document at `index` with its file on disk.
	///
	/// An unmodified buffer is reloaded silently. A modified one prompts:
	/// reloading loses local edits, keeping them re-baselines the stored
	/// timestamp so the prompt is not repeated.
	pub fn check_external_changes(&mut self, index: usize) -> Result<ExternalChange> {
		let doc = self.document_at(index)?;
		let Some(path) = doc.path().map(|path| path.to_path_buf()) else {
			return Ok(ExternalChange::Unchanged);
		};
		if doc.is_new() {
			return Ok(ExternalChange::Unchanged);
		}

		if !self.ctx.fs.exists(&path) {
			if doc.last_modified_on_disk().is_none() {
				return Ok(ExternalChange::Unchanged);
			}
			let message = format!("{} is unavailable (this file may have been removed, moved or renamed).\nDo you want to close it?", path.display());
			let answer = self.ctx.interaction.confirm(ConfirmKind::RemovedExternally, &message, false);
			tracing::info!(stack = self.id.0, path = %path.display(), ?answer, "stack.external.removed");
			if matches!(answer, Answer::Yes | Answer::YesAll) {
				self.remove_document(index, true);
				self.ensure_not_empty();
				return Ok(ExternalChange::Closed);
			}
			let doc = &mut self.documents[index];
			doc.text().set_modified(true);
			doc.last_modified_on_disk = None;
			return Ok(ExternalChange::MarkedModified);
		}

		let on_disk = self.ctx.fs.modified(&path).map_err(|err| self.io_failure(&path, err))?;
		if doc.last_modified_on_disk() == Some(on_disk) {
			return Ok(ExternalChange::Unchanged);
		}

		if !doc.is_modified() {
			tracing::debug!(stack = self.id.0, path = %path.display(), "stack.external.reload");
			self.reload(index)?;
			return Ok(ExternalChange::Reloaded);
		}

		let message = format!(
			"{} has been modified outside the editor.\nDo you want to reload it and lose all your changes?",
			path.display()
		);
		let answer = self.ctx.interaction.confirm(ConfirmKind::ReloadExternal, &message, false);
		tracing::info!(stack = self.id.0, path = %path.display(), ?answer, "stack.external.conflict");
		if matches!(answer, Answer::Yes | Answer::YesAll) {
			self.reload(index)?;
			return Ok(ExternalChange::Reloaded);
		}
		self.documents[index].last_modified_on_disk = Some(on_disk);
		Ok(ExternalChange::KeptLocal)
	}

	/// Discards local changes after a confirmation and reloads from disk.
	///
	/// Returns false if the user declined or the document has never been saved.
	pub fn revert(&mut self, index: usize) -> Result<bool> {
		let doc = self.document_at(index)?;
		if doc.is_new() || doc.path().is_none() {
			return Ok(false);
		}
		let message = format!("All changes to {} will be lost.\nDo you want to revert the file from disk?", doc.title());
		let answer = self.ctx.interaction.confirm(ConfirmKind::Revert, &message, false);
		if !matches!(answer, Answer::Yes | Answer::YesAll) {
			return Ok(false);
		}
		self.reload(index)?;
		tracing::info!(stack = self.id.0, document = self.documents[index].id().0, "stack.revert");
		Ok(true)
	}

	/// Replaces the buffer with the file content without asking.
	///
	/// A failed read leaves the buffer as it was.
	pub fn reload(&mut self, index: usize) -> Result<()> {
		let doc = self.document_at(index)?;
		let Some(path) = doc.path().map(|path| path.to_path_buf()) else {
			return Ok(());
		};
		let bytes = self.ctx.fs.read(&path).map_err(|err| self.io_failure(&path, err))?;
		let modified_on_disk = self.ctx.fs.modified(&path).ok();
		let decoded = decode(&bytes);

		let doc = &mut self.documents[index];
		doc.text().reset(&decoded.text);
		doc.encoding = decoded.encoding;
		doc.line_ending = decoded.line_ending;
		doc.last_modified_on_disk = modified_on_disk;
		let key = doc.key().clone();

		self.emit(StackEvent::Reloaded { key, modified_on_disk });
		self.submit_analysis(index);
		Ok(())
	}
}
