//! Per-buffer session state.
//!
//! A [`DocumentState`] is one stack's record of an open buffer. When a view is
//! split, each stack gets its own replica of the record, but the replicas share
//! one [`SharedText`]: split views show the same text, and the modified flag
//! travels with it.


use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Instant, SystemTime};

use parking_lot::RwLock;
use ropey::Rope;

use crate::analysis::{AnalysisJoin, Finding};
use crate::breakpoints::Breakpoint;
use crate::encoding::{Encoding, LineEnding};
use crate::error::Result;

/// Counter for generating unique document IDs.
static NEXT_DOCUMENT_ID: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a document replica.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DocumentId(pub u64);

impl DocumentId {
	/// Generates a new unique document ID.
	pub fn next() -> Self {
		Self(NEXT_DOCUMENT_ID.fetch_add(1, Ordering::Relaxed))
	}
}

/// Identity of a logical document across stacks.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DocKey {
	/// Absolute, canonical path.
	File(PathBuf),
	/// Never-saved buffer, numbered per session.
	Untitled(u32),
}

impl DocKey {
	/// File path, or `None` for an untitled buffer.
	pub fn path(&self) -> Option<&Path> {
		match self {
			Self::File(path) => Some(path),
			Self::Untitled(_) => None,
		}
	}

	pub fn is_untitled(&self) -> bool {
		matches!(self, Self::Untitled(_))
	}
}

impl fmt::Display for DocKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::File(path) => write!(f, "{}", path.display()),
			Self::Untitled(n) => write!(f, "<untitled {n}>"),
		}
	}
}

/// Language classification derived from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
	Python,
	Cython,
	Markdown,
	Text,
	Other,
}

impl Language {
	/// Classifies a file name or path by its extension.
	pub fn from_name(name: &Path) -> Self {
		let ext = name.extension().and_then(|ext| ext.to_str()).unwrap_or_default();
		match ext.to_ascii_lowercase().as_str() {
			"py" | "pyw" | "ipy" => Self::Python,
			"pyx" | "pxd" | "pxi" => Self::Cython,
			"md" | "markdown" => Self::Markdown,
			"txt" | "" => Self::Text,
			_ => Self::Other,
		}
	}

	/// Whether lint and style checkers apply.
	pub fn supports_code_analysis(self) -> bool {
		self == Self::Python
	}
}

struct TextBuffer {
	rope: Rope,
	modified: bool,
	default_content: bool,
	/// Incremented on every content change.
	version: u64,
}

/// Text buffer shared by every replica of one logical document.
#[derive(Clone)]
pub struct SharedText(Arc<RwLock<TextBuffer>>);

impl fmt::Debug for SharedText {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let buffer = self.0.read();
		f.debug_struct("SharedText")
			.field("chars", &buffer.rope.len_chars())
			.field("modified", &buffer.modified)
			.field("version", &buffer.version)
			.finish()
	}
}

impl SharedText {
	/// Creates a clean buffer. `default_content` marks an untouched template.
	pub fn new(text: &str, default_content: bool) -> Self {
		Self(Arc::new(RwLock::new(TextBuffer {
			rope: Rope::from_str(text),
			modified: false,
			default_content,
			version: 0,
		})))
	}

	/// Whether both handles refer to the same buffer.
	pub fn ptr_eq(&self, other: &Self) -> bool {
		Arc::ptr_eq(&self.0, &other.0)
	}

	pub fn to_text(&self) -> String {
		self.0.read().rope.to_string()
	}

	/// Immutable copy handed to analysis workers.
	pub fn snapshot(&self) -> Arc<str> {
		Arc::from(self.to_text())
	}

	pub fn len_chars(&self) -> usize {
		self.0.read().rope.len_chars()
	}

	pub fn len_lines(&self) -> usize {
		self.0.read().rope.len_lines()
	}

	pub fn version(&self) -> u64 {
		self.0.read().version
	}

	pub fn is_modified(&self) -> bool {
		self.0.read().modified
	}

	pub fn is_default_content(&self) -> bool {
		self.0.read().default_content
	}

	/// Applies an edit; any change marks the buffer modified.
	pub fn edit<R>(&self, f: impl FnOnce(&mut Rope) -> Result<R>) -> Result<R> {
		let mut buffer = self.0.write();
		let before = buffer.rope.clone();
		let out = f(&mut buffer.rope)?;
		if buffer.rope != before {
			buffer.modified = true;
			buffer.default_content = false;
			buffer.version += 1;
		}
		Ok(out)
	}

	/// Replaces the whole content with text loaded from or written to disk.
	pub(crate) fn reset(&self, text: &str) {
		let mut buffer = self.0.write();
		if buffer.rope != text {
			buffer.rope = Rope::from_str(text);
			buffer.version += 1;
		}
		buffer.modified = false;
		buffer.default_content = false;
	}

	pub(crate) fn set_modified(&self, modified: bool) {
		let mut buffer = self.0.write();
		buffer.modified = modified;
		if modified {
			buffer.default_content = false;
		}
	}
}

/// One stack's record of an open buffer.
#[derive(Debug)]
pub struct DocumentState {
	id: DocumentId,
	key: DocKey,
	title: String,
	text: SharedText,
	pub(crate) encoding: Encoding,
	pub(crate) line_ending: LineEnding,
	pub(crate) is_new: bool,
	pub(crate) last_modified_on_disk: Option<SystemTime>,
	language: Language,
	pub(crate) analysis_results: Vec<Finding>,
	pub(crate) todo_results: Vec<Finding>,
	pub(crate) breakpoints: Vec<Breakpoint>,
	generation: u64,
	/// Lint/style barrier of the generation in flight.
	pub(crate) join: Option<AnalysisJoin>,
	/// Deadline of a debounced realtime scan.
	pub(crate) analysis_due: Option<Instant>,
	/// Text version the latest scan was taken from.
	pub(crate) scanned_version: u64,
}

impl DocumentState {
	pub(crate) fn new(key: DocKey, title: String, text: SharedText) -> Self {
		let language = Language::from_name(Path::new(&title));
		Self {
			id: DocumentId::next(),
			key,
			title,
			text,
			encoding: Encoding::default(),
			line_ending: LineEnding::default(),
			is_new: false,
			last_modified_on_disk: None,
			language,
			analysis_results: Vec::new(),
			todo_results: Vec::new(),
			breakpoints: Vec::new(),
			generation: 0,
			join: None,
			analysis_due: None,
			scanned_version: 0,
		}
	}

	/// Copy for another stack: fresh identity, same text buffer, same metadata
	/// and results. Analysis in flight is not carried over.
	pub(crate) fn replica(&self) -> Self {
		Self {
			id: DocumentId::next(),
			key: self.key.clone(),
			title: self.title.clone(),
			text: self.text.clone(),
			encoding: self.encoding,
			line_ending: self.line_ending,
			is_new: self.is_new,
			last_modified_on_disk: self.last_modified_on_disk,
			language: self.language,
			analysis_results: self.analysis_results.clone(),
			todo_results: self.todo_results.clone(),
			breakpoints: self.breakpoints.clone(),
			generation: self.generation,
			join: None,
			analysis_due: None,
			scanned_version: self.scanned_version,
		}
	}

	pub fn id(&self) -> DocumentId {
		self.id
	}

	pub fn key(&self) -> &DocKey {
		&self.key
	}

	/// File path, or `None` for an untitled buffer.
	pub fn path(&self) -> Option<&Path> {
		self.key.path()
	}

	pub fn title(&self) -> &str {
		&self.title
	}

	pub fn text(&self) -> &SharedText {
		&self.text
	}

	pub fn encoding(&self) -> Encoding {
		self.encoding
	}

	pub fn line_ending(&self) -> LineEnding {
		self.line_ending
	}

	/// True until the first successful save.
	pub fn is_new(&self) -> bool {
		self.is_new
	}

	pub fn is_modified(&self) -> bool {
		self.text.is_modified()
	}

	/// True while the text is the untouched template of a new buffer.
	pub fn is_default_content(&self) -> bool {
		self.is_new && self.text.is_default_content()
	}

	/// Modified in a way that warrants a prompt before discarding.
	pub fn needs_confirmation(&self) -> bool {
		self.is_modified() && !self.is_default_content()
	}

	pub fn last_modified_on_disk(&self) -> Option<SystemTime> {
		self.last_modified_on_disk
	}

	pub fn language(&self) -> Language {
		self.language
	}

	/// Joined lint and style findings of the last completed scan.
	pub fn analysis_results(&self) -> &[Finding] {
		&self.analysis_results
	}

	pub fn todo_results(&self) -> &[Finding] {
		&self.todo_results
	}

	pub fn breakpoints(&self) -> &[Breakpoint] {
		&self.breakpoints
	}

	/// Scan generation of the latest submitted analysis.
	pub fn generation(&self) -> u64 {
		self.generation
	}

	/// Starts a new scan generation; results of older ones become stale.
	pub(crate) fn bump_generation(&mut self) -> u64 {
		self.generation += 1;
		self.join = None;
		self.generation
	}

	/// Points the record at a new key. Returns true if the language changed.
	pub(crate) fn set_key(&mut self, key: DocKey, title: String) -> bool {
		let language = Language::from_name(Path::new(&title));
		let changed = language != self.language;
		self.key = key;
		self.title = title;
		self.language = language;
		changed
	}

	pub(crate) fn clear_results(&mut self) {
		self.analysis_results.clear();
		self.todo_results.clear();
		self.join = None;
	}
}

/// Display name for a path-backed document.
pub(crate) fn title_for(path: &Path) -> String {
	path.file_name()
		.map(|name| name.to_string_lossy().into_owned())
		.unwrap_or_else(|| path.display().to_string())
}
