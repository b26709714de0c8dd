//! In-memory collaborators shared by the unit tests.

use std::collections::VecDeque;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, SystemTime};

use parking_lot::{Condvar, Mutex};
use rustc_hash::FxHashMap;

use crate::analysis::{Checker, CheckerError, CheckerKind, Finding};
use crate::collab::{Answer, ConfirmKind, Interaction};
use crate::fs::FileSystem;

pub(crate) const WAIT: Duration = Duration::from_secs(5);

pub(crate) fn init_tracing() {
	let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

struct MemFile {
	bytes: Vec<u8>,
	modified: SystemTime,
	readonly: bool,
}

/// Filesystem double with a logical clock and a write counter.
#[derive(Default)]
pub(crate) struct MemoryFs {
	files: Mutex<FxHashMap<PathBuf, MemFile>>,
	writes: AtomicUsize,
	clock: AtomicU64,
}

impl MemoryFs {
	pub(crate) fn new() -> Arc<Self> {
		Arc::new(Self::default())
	}

	fn tick(&self) -> SystemTime {
		let secs = self.clock.fetch_add(1, Ordering::SeqCst) + 1;
		SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000 + secs)
	}

	/// Seeds a file without counting it as a write.
	pub(crate) fn insert(&self, path: impl Into<PathBuf>, text: &str) {
		let modified = self.tick();
		self.files.lock().insert(
			path.into(),
			MemFile {
				bytes: text.as_bytes().to_vec(),
				modified,
				readonly: false,
			},
		);
	}

	/// Simulates another program changing the file.
	pub(crate) fn touch_external(&self, path: impl Into<PathBuf>, text: &str) {
		self.insert(path, text);
	}

	pub(crate) fn remove(&self, path: &Path) {
		self.files.lock().remove(path);
	}

	pub(crate) fn set_readonly(&self, path: &Path, readonly: bool) {
		if let Some(file) = self.files.lock().get_mut(path) {
			file.readonly = readonly;
		}
	}

	pub(crate) fn contents(&self, path: &Path) -> Option<String> {
		self.files.lock().get(path).map(|file| String::from_utf8_lossy(&file.bytes).into_owned())
	}

	pub(crate) fn writes(&self) -> usize {
		self.writes.load(Ordering::SeqCst)
	}
}

impl FileSystem for MemoryFs {
	fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
		self.files
			.lock()
			.get(path)
			.map(|file| file.bytes.clone())
			.ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no such file"))
	}

	fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
		let modified = self.tick();
		let mut files = self.files.lock();
		if files.get(path).is_some_and(|file| file.readonly) {
			return Err(io::Error::new(io::ErrorKind::PermissionDenied, "read-only file"));
		}
		files.insert(
			path.to_path_buf(),
			MemFile {
				bytes: contents.to_vec(),
				modified,
				readonly: false,
			},
		);
		self.writes.fetch_add(1, Ordering::SeqCst);
		Ok(())
	}

	fn modified(&self, path: &Path) -> io::Result<SystemTime> {
		self.files
			.lock()
			.get(path)
			.map(|file| file.modified)
			.ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no such file"))
	}

	fn exists(&self, path: &Path) -> bool {
		self.files.lock().contains_key(path)
	}

	fn is_writable(&self, path: &Path) -> bool {
		self.files.lock().get(path).is_none_or(|file| !file.readonly)
	}

	fn canonicalize(&self, path: &Path) -> PathBuf {
		path.to_path_buf()
	}
}

/// Confirmation double answering from a script and recording every prompt.
#[derive(Default)]
pub(crate) struct ScriptedInteraction {
	answers: Mutex<VecDeque<Answer>>,
	save_paths: Mutex<VecDeque<PathBuf>>,
	prompts: Mutex<Vec<(ConfirmKind, bool)>>,
	errors: Mutex<Vec<String>>,
}

impl ScriptedInteraction {
	pub(crate) fn new() -> Arc<Self> {
		Arc::new(Self::default())
	}

	pub(crate) fn answer(&self, answers: impl IntoIterator<Item = Answer>) {
		self.answers.lock().extend(answers);
	}

	pub(crate) fn save_path(&self, path: impl Into<PathBuf>) {
		self.save_paths.lock().push_back(path.into());
	}

	pub(crate) fn prompts(&self) -> Vec<(ConfirmKind, bool)> {
		self.prompts.lock().clone()
	}

	pub(crate) fn errors(&self) -> Vec<String> {
		self.errors.lock().clone()
	}
}

impl Interaction for ScriptedInteraction {
	fn confirm(&self, kind: ConfirmKind, _message: &str, batch: bool) -> Answer {
		self.prompts.lock().push((kind, batch));
		self.answers.lock().pop_front().unwrap_or(Answer::Cancel)
	}

	fn pick_save_path(&self, _suggested: &Path) -> Option<PathBuf> {
		self.save_paths.lock().pop_front()
	}

	fn report_error(&self, message: &str) {
		self.errors.lock().push(message.to_string());
	}
}

/// Latch that holds checker runs until the test opens it.
#[derive(Clone, Default)]
pub(crate) struct Gate(Arc<(Mutex<bool>, Condvar)>);

impl Gate {
	pub(crate) fn open(&self) {
		*self.0.0.lock() = true;
		self.0.1.notify_all();
	}

	pub(crate) fn wait(&self) {
		let mut open = self.0.0.lock();
		while !*open {
			self.0.1.wait(&mut open);
		}
	}
}

/// Checker reporting the text it saw, optionally held by a [`Gate`].
pub(crate) struct EchoChecker {
	pub(crate) kind: CheckerKind,
	pub(crate) gate: Option<Gate>,
	pub(crate) runs: AtomicUsize,
}

impl EchoChecker {
	pub(crate) fn new(kind: CheckerKind) -> Arc<Self> {
		Arc::new(Self {
			kind,
			gate: None,
			runs: AtomicUsize::new(0),
		})
	}

	pub(crate) fn gated(kind: CheckerKind, gate: Gate) -> Arc<Self> {
		Arc::new(Self {
			kind,
			gate: Some(gate),
			runs: AtomicUsize::new(0),
		})
	}

	pub(crate) fn runs(&self) -> usize {
		self.runs.load(Ordering::SeqCst)
	}
}

impl Checker for EchoChecker {
	fn kind(&self) -> CheckerKind {
		self.kind
	}

	fn check(&self, text: &str) -> Result<Vec<Finding>, CheckerError> {
		if let Some(gate) = &self.gate {
			gate.wait();
		}
		self.runs.fetch_add(1, Ordering::SeqCst);
		Ok(vec![Finding::new(format!("{}:{}", self.kind, text.trim_end()), 1)])
	}
}
