//! One view's ordered collection of documents.
//!
//! A [`DocumentStack`] owns its [`DocumentState`] records in tab order, the
//! focused index and the MRU history. It runs the open, edit, save, close,
//! revert and rename flows, asks the [`AnalysisScheduler`] for scans under its
//! own [`Scope`], and publishes structural changes as [`StackEvent`]s.
//!
//! Per-document lifecycle:
//!
//! ```text
//!            edit                save
//!   Clean ─────────► Modified ─────────► (Saving) ─► Clean
//!     ▲                  │ revert / reload
//!     └──────────────────┘
//!   New ── save / save_as ──► Clean
//! ```

mod analysis;
mod close;
mod disk;
pub mod events;
mod save;


use std::fmt;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::SystemTime;

pub use close::{BatchOutcome, CloseOutcome};
pub use disk::ExternalChange;
use events::{EventSender, StackEvent, StackMessage};
use ropey::Rope;
pub use save::SaveOutcome;

use crate::analysis::{AnalysisScheduler, CheckerSet, Scope};
use crate::breakpoints::{self, Breakpoint, BreakpointStore, MemoryBreakpointStore};
use crate::collab::{DefaultTemplate, Interaction, TemplateProvider, Unattended};
use crate::config::DocumentStackConfig;
use crate::document::{DocKey, DocumentId, DocumentState, SharedText, title_for};
use crate::encoding::decode;
use crate::error::{Result, SessionError};
use crate::fs::{FileSystem, OsFileSystem};
use crate::mru::MruHistory;
use crate::switcher::TabSwitcher;

/// Counter for generating unique stack IDs.
static NEXT_STACK_ID: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a document stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StackId(pub u64);

impl StackId {
	/// Generates a new unique stack ID.
	pub fn next() -> Self {
		Self(NEXT_STACK_ID.fetch_add(1, Ordering::Relaxed))
	}
}

/// Collaborators shared by every stack of a session.
#[derive(Clone)]
pub struct StackContext {
	pub fs: Arc<dyn FileSystem>,
	pub interaction: Arc<dyn Interaction>,
	pub templates: Arc<dyn TemplateProvider>,
	pub breakpoints: Arc<dyn BreakpointStore>,
	pub checkers: CheckerSet,
	untitled: Arc<AtomicU32>,
}

impl Default for StackContext {
	fn default() -> Self {
		Self {
			fs: Arc::new(OsFileSystem),
			interaction: Arc::new(Unattended::default()),
			templates: Arc::new(DefaultTemplate::default()),
			breakpoints: Arc::new(MemoryBreakpointStore::new()),
			checkers: CheckerSet::standard(),
			untitled: Arc::new(AtomicU32::new(0)),
		}
	}
}

impl fmt::Debug for StackContext {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("StackContext")
			.field("checkers", &self.checkers)
			.field("untitled", &self.untitled.load(Ordering::Relaxed))
			.finish_non_exhaustive()
	}
}

impl StackContext {
	pub fn with_fs(mut self, fs: Arc<dyn FileSystem>) -> Self {
		self.fs = fs;
		self
	}

	pub fn with_interaction(mut self, interaction: Arc<dyn Interaction>) -> Self {
		self.interaction = interaction;
		self
	}

	pub fn with_templates(mut self, templates: Arc<dyn TemplateProvider>) -> Self {
		self.templates = templates;
		self
	}

	pub fn with_breakpoints(mut self, breakpoints: Arc<dyn BreakpointStore>) -> Self {
		self.breakpoints = breakpoints;
		self
	}

	pub fn with_checkers(mut self, checkers: CheckerSet) -> Self {
		self.checkers = checkers;
		self
	}

	/// Next number for an untitled buffer; shared by clones of this context.
	fn next_untitled(&self) -> u32 {
		self.untitled.fetch_add(1, Ordering::Relaxed) + 1
	}
}

/// Ordered documents of one view plus focus and recency.
pub struct DocumentStack {
	id: StackId,
	documents: Vec<DocumentState>,
	active: Option<usize>,
	mru: MruHistory,
	config: DocumentStackConfig,
	ctx: StackContext,
	scheduler: AnalysisScheduler,
	events: Option<EventSender>,
}

impl fmt::Debug for DocumentStack {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("DocumentStack")
			.field("id", &self.id)
			.field("documents", &self.documents.len())
			.field("active", &self.active)
			.finish_non_exhaustive()
	}
}

impl DocumentStack {
	/// Creates an empty stack submitting analysis to `scheduler`.
	pub fn new(config: DocumentStackConfig, ctx: StackContext, scheduler: AnalysisScheduler) -> Self {
		let id = StackId::next();
		tracing::debug!(stack = id.0, "stack.create");
		Self {
			id,
			documents: Vec::new(),
			active: None,
			mru: MruHistory::new(),
			config,
			ctx,
			scheduler,
			events: None,
		}
	}

	/// Publishes structural events on `events`.
	pub fn with_events(mut self, events: EventSender) -> Self {
		self.events = Some(events);
		self
	}

	pub fn id(&self) -> StackId {
		self.id
	}

	/// Scheduler scope owning this stack's analysis jobs.
	pub fn scope(&self) -> Scope {
		Scope::Stack(self.id)
	}

	pub fn len(&self) -> usize {
		self.documents.len()
	}

	pub fn is_empty(&self) -> bool {
		self.documents.is_empty()
	}

	/// Documents in tab order.
	pub fn documents(&self) -> &[DocumentState] {
		&self.documents
	}

	pub fn document(&self, index: usize) -> Option<&DocumentState> {
		self.documents.get(index)
	}

	pub fn active_index(&self) -> Option<usize> {
		self.active
	}

	pub fn active_document(&self) -> Option<&DocumentState> {
		self.active.and_then(|index| self.documents.get(index))
	}

	pub fn mru(&self) -> &MruHistory {
		&self.mru
	}

	pub fn config(&self) -> &DocumentStackConfig {
		&self.config
	}

	pub fn context(&self) -> &StackContext {
		&self.ctx
	}

	pub fn scheduler(&self) -> &AnalysisScheduler {
		&self.scheduler
	}

	pub fn index_of_id(&self, id: DocumentId) -> Option<usize> {
		self.documents.iter().position(|doc| doc.id() == id)
	}

	pub fn index_of_key(&self, key: &DocKey) -> Option<usize> {
		self.documents.iter().position(|doc| doc.key() == key)
	}

	/// Index of the document open at `path`, compared canonically.
	pub fn index_of_path(&self, path: &Path) -> Option<usize> {
		let path = self.ctx.fs.canonicalize(path);
		self.documents.iter().position(|doc| doc.path() == Some(path.as_path()))
	}

	fn document_at(&self, index: usize) -> Result<&DocumentState> {
		self.documents.get(index).ok_or(SessionError::InvalidIndex(index))
	}

	fn document_at_mut(&mut self, index: usize) -> Result<&mut DocumentState> {
		self.documents.get_mut(index).ok_or(SessionError::InvalidIndex(index))
	}

	fn emit(&self, event: StackEvent) {
		let Some(events) = &self.events else {
			return;
		};
		tracing::trace!(stack = self.id.0, event = event.name(), "stack.emit");
		// A dropped coordinator leaves nobody to propagate to.
		let _ = events.send(StackMessage { origin: self.id, event });
	}

	/// Reports an I/O failure to the user and converts it into an error.
	fn io_failure(&self, path: &Path, err: std::io::Error) -> SessionError {
		tracing::error!(stack = self.id.0, path = %path.display(), error = %err, "stack.io_error");
		self.ctx.interaction.report_error(&format!("{}: {err}", path.display()));
		SessionError::io(path, err)
	}

	/// Appends `doc`, focuses it and records it in the MRU.
	fn push(&mut self, doc: DocumentState) -> usize {
		let key = doc.key().clone();
		let id = doc.id();
		self.documents.push(doc);
		let index = self.documents.len() - 1;
		self.mru.append(id);
		self.active = Some(index);
		self.emit(StackEvent::Opened { key, document: id });
		index
	}

	/// Opens a new untitled buffer filled from the template.
	pub fn new_document(&mut self) -> usize {
		let number = self.ctx.next_untitled();
		let extension = self.config.untitled_extension.clone();
		let content = self.ctx.templates.new_file_content(&extension);
		let mut doc = DocumentState::new(
			DocKey::Untitled(number),
			format!("untitled{number}{extension}"),
			SharedText::new(&content, true),
		);
		doc.is_new = true;
		tracing::debug!(stack = self.id.0, number, "stack.new_document");
		let index = self.push(doc);
		self.submit_analysis(index);
		index
	}

	/// Opens `path`, or focuses it if it is already open here.
	///
	/// A failed read leaves the stack unchanged.
	pub fn open(&mut self, path: &Path) -> Result<usize> {
		let path = self.ctx.fs.canonicalize(path);
		if let Some(index) = self.index_of_path(&path) {
			tracing::debug!(stack = self.id.0, path = %path.display(), "stack.open.focus_existing");
			self.focus(index)?;
			return Ok(index);
		}

		let bytes = self.ctx.fs.read(&path).map_err(|err| self.io_failure(&path, err))?;
		let modified_on_disk = self.ctx.fs.modified(&path).ok();
		let decoded = decode(&bytes);

		let mut doc = DocumentState::new(DocKey::File(path.clone()), title_for(&path), SharedText::new(&decoded.text, false));
		doc.encoding = decoded.encoding;
		doc.line_ending = decoded.line_ending;
		doc.last_modified_on_disk = modified_on_disk;
		doc.breakpoints = self.ctx.breakpoints.load(&path);

		tracing::info!(stack = self.id.0, path = %path.display(), encoding = %decoded.encoding, "stack.open");
		let index = self.push(doc);
		self.submit_analysis(index);
		Ok(index)
	}

	/// Focuses the document at `index` and checks it against the disk.
	pub fn focus(&mut self, index: usize) -> Result<ExternalChange> {
		let id = self.document_at(index)?.id();
		self.active = Some(index);
		self.mru.touch(id);
		if !self.config.check_external_changes {
			return Ok(ExternalChange::Unchanged);
		}
		self.check_external_changes(index)
	}

	/// Focuses a document by identity, as chosen from the MRU or the switcher.
	///
	/// A stale identity triggers an MRU refresh and yields `None`.
	pub fn focus_document(&mut self, id: DocumentId) -> Result<Option<ExternalChange>> {
		match self.mru.resolve(id, self.documents.iter().map(DocumentState::id)) {
			Ok(index) => self.focus(index).map(Some),
			Err(stale) => {
				tracing::debug!(stack = self.id.0, error = %stale, "stack.focus.stale");
				self.mru.reconcile(self.documents.iter().map(DocumentState::id));
				Ok(None)
			}
		}
	}

	/// Snapshot of the recency order for Ctrl+Tab navigation.
	pub fn tab_switcher(&self) -> TabSwitcher {
		TabSwitcher::new(&self.mru, &self.documents)
	}

	/// Applies an edit to the text of the document at `index`.
	pub fn edit<R>(&mut self, index: usize, f: impl FnOnce(&mut Rope) -> Result<R>) -> Result<R> {
		let doc = self.document_at(index)?;
		let before = doc.text().version();
		let out = doc.text().edit(f)?;
		if doc.text().version() != before {
			self.schedule_realtime(index);
		}
		Ok(out)
	}

	/// Replaces the whole text.
	pub fn set_text(&mut self, index: usize, text: &str) -> Result<()> {
		self.edit(index, |rope| {
			if *rope != text {
				*rope = Rope::from_str(text);
			}
			Ok(())
		})
	}

	pub fn insert(&mut self, index: usize, char_idx: usize, text: &str) -> Result<()> {
		self.edit(index, |rope| Ok(rope.try_insert(char_idx, text)?))
	}

	pub fn remove(&mut self, index: usize, chars: Range<usize>) -> Result<()> {
		self.edit(index, |rope| Ok(rope.try_remove(chars)?))
	}

	/// Moves a tab. The MRU holds identities and is unaffected.
	pub fn move_document(&mut self, from: usize, to: usize) -> Result<()> {
		self.document_at(from)?;
		if to >= self.documents.len() {
			return Err(SessionError::InvalidIndex(to));
		}
		let active = self.active.map(|index| self.documents[index].id());
		let doc = self.documents.remove(from);
		self.documents.insert(to, doc);
		self.active = active.and_then(|id| self.index_of_id(id));
		Ok(())
	}

	/// Points the document open at `old_path` at `new_path` without writing.
	///
	/// A different tab already showing `new_path` is closed without a prompt.
	/// Returns false when `old_path` is not open in this stack.
	pub fn rename_in_place(&mut self, old_path: &Path, new_path: &Path) -> Result<bool> {
		let Some(index) = self.index_of_path(old_path) else {
			return Ok(false);
		};
		let old = self.documents[index].key().clone();
		let new_path = self.ctx.fs.canonicalize(new_path);
		let index = self.take_over(index, &new_path, true);
		self.rename_at(index, new_path.clone());
		tracing::info!(stack = self.id.0, old = %old, new = %new_path.display(), "stack.rename");
		self.emit(StackEvent::Renamed {
			old: old.clone(),
			new: new_path,
		});
		self.refile_breakpoints(index, &old);
		Ok(true)
	}

	/// Drops any other tab showing `path` so the document at `index` can
	/// take the path over. Returns the document's index afterwards.
	fn take_over(&mut self, index: usize, path: &Path, announce: bool) -> usize {
		let Some(other) = self.index_of_path(path).filter(|other| *other != index) else {
			return index;
		};
		let displaced = self.remove_document(other, announce);
		tracing::debug!(stack = self.id.0, document = displaced.id().0, path = %path.display(), "stack.replace_tab");
		if other < index { index - 1 } else { index }
	}

	fn rename_at(&mut self, index: usize, new_path: PathBuf) {
		let title = title_for(&new_path);
		let language_changed = self.documents[index].set_key(DocKey::File(new_path), title);
		if language_changed {
			self.submit_analysis(index);
		}
	}

	/// Replaces the breakpoints of the document at `index`.
	pub fn set_breakpoints(&mut self, index: usize, list: Vec<Breakpoint>) -> Result<()> {
		let list = breakpoints::normalize(list);
		let doc = self.document_at_mut(index)?;
		if doc.breakpoints == list {
			return Ok(());
		}
		doc.breakpoints = list.clone();
		let key = doc.key().clone();
		self.publish_breakpoints(key, list);
		Ok(())
	}

	/// Adds or removes an unconditional breakpoint. Returns true if one was added.
	pub fn toggle_breakpoint(&mut self, index: usize, line: u32) -> Result<bool> {
		let mut list = self.document_at(index)?.breakpoints().to_vec();
		let added = match list.iter().position(|bp| bp.line == line) {
			Some(pos) => {
				list.remove(pos);
				false
			}
			None => {
				list.push(Breakpoint::new(line));
				true
			}
		};
		self.set_breakpoints(index, list)?;
		Ok(added)
	}

	/// Moves the stored breakpoints of a document that left `old` to its new key.
	fn refile_breakpoints(&self, index: usize, old: &DocKey) {
		let doc = &self.documents[index];
		if doc.breakpoints.is_empty() || doc.key() == old {
			return;
		}
		self.publish_breakpoints(doc.key().clone(), doc.breakpoints.clone());
		if old.path().is_some() {
			self.publish_breakpoints(old.clone(), Vec::new());
		}
	}

	/// Announces the breakpoints of a document. A standalone stack persists them itself.
	fn publish_breakpoints(&self, key: DocKey, breakpoints: Vec<Breakpoint>) {
		if self.events.is_none() {
			if let Some(path) = key.path()
				&& let Err(err) = self.ctx.breakpoints.save(path, &breakpoints)
			{
				tracing::warn!(stack = self.id.0, error = %err, "stack.breakpoints.persist_failed");
			}
			return;
		}
		self.emit(StackEvent::BreakpointsChanged { key, breakpoints });
	}

	/// Replaces the whole configuration.
	///
	/// Toggling a checker class re-scans every document; disabling one clears
	/// its results.
	pub fn apply_config(&mut self, config: DocumentStackConfig) {
		let old = std::mem::replace(&mut self.config, config);
		let analysis_changed = old.code_analysis != self.config.code_analysis || old.todo_list != self.config.todo_list;
		if !self.config.realtime_analysis {
			for doc in &mut self.documents {
				doc.analysis_due = None;
			}
		}
		tracing::debug!(stack = self.id.0, analysis_changed, "stack.apply_config");
		if analysis_changed {
			for index in 0..self.documents.len() {
				self.submit_analysis(index);
			}
		}
	}

	/// Builds the mirror of this stack for a split view.
	///
	/// Every document is replicated with a fresh identity sharing the same
	/// text buffer; focus and recency are carried over. Results in flight
	/// belong to the source's identities, so the replicas are scanned afresh.
	pub fn clone_for_split(&self, events: Option<EventSender>) -> Self {
		let mut clone = Self::new(self.config.clone(), self.ctx.clone(), self.scheduler.clone());
		clone.events = events;
		clone.documents = self.documents.iter().map(DocumentState::replica).collect();

		let mapping: Vec<(DocumentId, DocumentId)> =
			self.documents.iter().zip(&clone.documents).map(|(src, dst)| (src.id(), dst.id())).collect();
		for id in self.mru.iter() {
			if let Some((_, replica)) = mapping.iter().find(|(src, _)| *src == id) {
				clone.mru.append(*replica);
			}
		}
		clone.mru.reconcile(clone.documents.iter().map(DocumentState::id));
		clone.active = self.active;

		if clone.config.analysis_enabled() {
			for index in 0..clone.documents.len() {
				clone.submit_analysis(index);
			}
		}
		tracing::debug!(source = self.id.0, stack = clone.id.0, documents = clone.documents.len(), "stack.split");
		clone
	}

	/// Sibling side of a save: adopts the new path and clean state without writing.
	///
	/// A tab of this stack that was showing the target path is dropped silently.
	pub(crate) fn apply_remote_save(&mut self, old: &DocKey, new: &Path, modified_on_disk: Option<SystemTime>) -> Option<DocumentId> {
		let index = self.index_of_key(old)?;
		let index = self.take_over(index, new, false);
		let doc = &mut self.documents[index];
		doc.set_key(DocKey::File(new.to_path_buf()), title_for(new));
		doc.is_new = false;
		doc.last_modified_on_disk = modified_on_disk;
		doc.text().set_modified(false);
		let id = doc.id();
		self.submit_analysis(index);
		Some(id)
	}

	/// Sibling side of a close: drops the replica without prompting.
	pub(crate) fn apply_remote_close(&mut self, key: &DocKey) -> Option<DocumentId> {
		let index = self.index_of_key(key)?;
		let doc = self.remove_document(index, false);
		self.ensure_not_empty();
		Some(doc.id())
	}

	/// Sibling side of a rename.
	pub(crate) fn apply_remote_rename(&mut self, old: &DocKey, new: &Path) -> Option<DocumentId> {
		let index = self.index_of_key(old)?;
		let index = self.take_over(index, new, false);
		self.rename_at(index, new.to_path_buf());
		Some(self.documents[index].id())
	}

	/// Sibling side of a reload: the shared text is already current.
	pub(crate) fn apply_remote_reload(&mut self, key: &DocKey, modified_on_disk: Option<SystemTime>) -> Option<DocumentId> {
		let index = self.index_of_key(key)?;
		self.documents[index].last_modified_on_disk = modified_on_disk;
		self.submit_analysis(index);
		Some(self.documents[index].id())
	}

	pub(crate) fn apply_remote_breakpoints(&mut self, key: &DocKey, list: &[Breakpoint]) -> Option<DocumentId> {
		let index = self.index_of_key(key)?;
		self.documents[index].breakpoints = list.to_vec();
		Some(self.documents[index].id())
	}

	/// Removes every document without the close protocol, for teardown of a
	/// view whose documents live on in other views.
	pub(crate) fn detach_all(&mut self) -> Vec<(DocKey, DocumentId)> {
		let detached = self.documents.drain(..).map(|doc| (doc.key().clone(), doc.id())).collect();
		self.mru = MruHistory::new();
		self.active = None;
		detached
	}
}

impl Drop for DocumentStack {
	fn drop(&mut self) {
		self.scheduler.abandon_scope(self.scope());
	}
}
