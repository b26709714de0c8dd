use std::path::{Path, PathBuf};
use std::time::SystemTime;

use super::DocumentStack;
use super::events::StackEvent;
use crate::document::{DocKey, DocumentId};
use crate::encoding::{encode, strip_trailing_whitespace};
use crate::error::Result;

/// Result of a save request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
	/// The document was written.
	Saved,
	/// Nothing to do: the document was not modified.
	Unchanged,
	/// The user dismissed the save-as prompt.
	Cancelled,
}

impl DocumentStack {
	/// Saves the document at `index`.
	///
	/// Unmodified documents are skipped unless `force` is set. A new document,
	/// or one whose file is not writable, goes through [`Self::save_as`].
	pub fn save(&mut self, index: usize, force: bool) -> Result<SaveOutcome> {
		let doc = self.document_at(index)?;
		if !force && !doc.is_modified() {
			return Ok(SaveOutcome::Unchanged);
		}
		let writable = doc
			.path()
			.filter(|path| !doc.is_new() && self.ctx.fs.is_writable(path))
			.map(Path::to_path_buf);
		let key = doc.key().clone();
		let Some(path) = writable else {
			return self.save_as(index);
		};

		let modified_on_disk = self.write_document(index, &path)?;
		tracing::info!(stack = self.id.0, path = %path.display(), "stack.save");
		self.emit(StackEvent::Saved {
			old: key,
			new: path,
			modified_on_disk,
		});
		self.submit_analysis(index);
		Ok(SaveOutcome::Saved)
	}

	/// Asks the user for a path and saves the document at `index` there.
	pub fn save_as(&mut self, index: usize) -> Result<SaveOutcome> {
		let doc = self.document_at(index)?;
		let suggested = doc.path().map_or_else(|| PathBuf::from(doc.title()), Path::to_path_buf);
		let Some(target) = self.ctx.interaction.pick_save_path(&suggested) else {
			tracing::debug!(stack = self.id.0, document = doc.id().0, "stack.save_as.cancelled");
			return Ok(SaveOutcome::Cancelled);
		};
		self.save_to(index, &target)
	}

	/// Saves the document at `index` under `target`.
	///
	/// Another tab of this stack already showing `target` is closed first
	/// without a prompt. Breakpoints move with the document.
	pub fn save_to(&mut self, index: usize, target: &Path) -> Result<SaveOutcome> {
		let id = self.document_at(index)?.id();
		let target = self.ctx.fs.canonicalize(target);

		let index = self.take_over(index, &target, true);

		let old = self.documents[index].key().clone();
		let modified_on_disk = self.write_document(index, &target)?;
		let title = crate::document::title_for(&target);
		self.documents[index].set_key(DocKey::File(target.clone()), title);

		tracing::info!(stack = self.id.0, document = id.0, old = %old, new = %target.display(), "stack.save_as");
		self.emit(StackEvent::Saved {
			old: old.clone(),
			new: target,
			modified_on_disk,
		});
		self.refile_breakpoints(index, &old);
		self.submit_analysis(index);
		Ok(SaveOutcome::Saved)
	}

	/// Saves every modified document. Stops at the first failure.
	///
	/// Returns how many documents were written.
	pub fn save_all(&mut self) -> Result<usize> {
		let modified: Vec<DocumentId> = self.documents.iter().filter(|doc| doc.is_modified()).map(|doc| doc.id()).collect();
		let mut saved = 0;
		for id in modified {
			let Some(index) = self.index_of_id(id) else {
				continue;
			};
			if self.save(index, false)? == SaveOutcome::Saved {
				saved += 1;
			}
		}
		Ok(saved)
	}

	/// Writes the document's text to `path` and marks it clean.
	///
	/// Nothing about the document changes if the write fails.
	fn write_document(&mut self, index: usize, path: &Path) -> Result<Option<SystemTime>> {
		let doc = &self.documents[index];
		let original = doc.text().to_text();
		let text = if self.config.strip_trailing_whitespace_on_save {
			strip_trailing_whitespace(&original)
		} else {
			original.clone()
		};
		let line_ending = self.config.convert_eol_on_save.unwrap_or(doc.line_ending());
		let (bytes, encoding) = encode(&text, doc.encoding(), line_ending);

		self.ctx.fs.write(path, &bytes).map_err(|err| self.io_failure(path, err))?;
		let modified_on_disk = self.ctx.fs.modified(path).ok();

		let doc = &mut self.documents[index];
		if text == original {
			doc.text().set_modified(false);
		} else {
			doc.text().reset(&text);
		}
		doc.encoding = encoding;
		doc.line_ending = line_ending;
		doc.is_new = false;
		doc.last_modified_on_disk = modified_on_disk;
		Ok(modified_on_disk)
	}
}
