//! End-to-end session behavior against the real filesystem.
//!
//! These tests drive a [`SessionCoordinator`] with [`OsFileSystem`] under a
//! temporary directory and check what ends up on disk.

#![allow(unused_crate_dependencies)]

use std::collections::VecDeque;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, SystemTime};

use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use xeno_session::{
	Answer, Breakpoint, BreakpointStore, CheckerKind, CheckerSet, ConfirmKind, DocKey, EmptyTemplate, ExternalChange, FileSystem, Finding,
	FnChecker, Interaction, JsonBreakpointStore, LineEnding, OsFileSystem, SaveOutcome, SessionConfig, SessionCoordinator, StackContext,
};

const WAIT: Duration = Duration::from_secs(5);

/// [`OsFileSystem`] that counts writes.
#[derive(Default)]
struct CountingFs {
	writes: AtomicUsize,
}

impl CountingFs {
	fn writes(&self) -> usize {
		self.writes.load(Ordering::SeqCst)
	}
}

impl FileSystem for CountingFs {
	fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
		OsFileSystem.read(path)
	}

	fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
		self.writes.fetch_add(1, Ordering::SeqCst);
		OsFileSystem.write(path, contents)
	}

	fn modified(&self, path: &Path) -> io::Result<SystemTime> {
		OsFileSystem.modified(path)
	}

	fn exists(&self, path: &Path) -> bool {
		OsFileSystem.exists(path)
	}

	fn is_writable(&self, path: &Path) -> bool {
		OsFileSystem.is_writable(path)
	}

	fn canonicalize(&self, path: &Path) -> PathBuf {
		OsFileSystem.canonicalize(path)
	}
}

#[derive(Default)]
struct Script {
	answers: Mutex<VecDeque<Answer>>,
	save_paths: Mutex<VecDeque<PathBuf>>,
	prompts: Mutex<Vec<ConfirmKind>>,
}

impl Interaction for Script {
	fn confirm(&self, kind: ConfirmKind, _message: &str, _batch: bool) -> Answer {
		self.prompts.lock().push(kind);
		self.answers.lock().pop_front().unwrap_or(Answer::Cancel)
	}

	fn pick_save_path(&self, _suggested: &Path) -> Option<PathBuf> {
		self.save_paths.lock().pop_front()
	}
}

struct Harness {
	_dir: tempfile::TempDir,
	root: PathBuf,
	fs: Arc<CountingFs>,
	ui: Arc<Script>,
	session: SessionCoordinator,
}

impl Harness {
	fn new(config: SessionConfig, checkers: CheckerSet) -> Self {
		let _ = tracing_subscriber::fmt().with_test_writer().try_init();
		let dir = tempfile::tempdir().unwrap();
		let root = dir.path().canonicalize().unwrap();
		let fs = Arc::new(CountingFs::default());
		let ui = Arc::new(Script::default());
		let ctx = StackContext::default()
			.with_fs(fs.clone())
			.with_interaction(ui.clone())
			.with_templates(Arc::new(EmptyTemplate))
			.with_checkers(checkers);
		Self {
			_dir: dir,
			root,
			fs,
			ui,
			session: SessionCoordinator::new(config, ctx),
		}
	}

	fn quiet() -> Self {
		let mut config = SessionConfig::default();
		config.stack.code_analysis = false;
		config.stack.todo_list = false;
		Self::new(config, CheckerSet::default())
	}

	fn path(&self, name: &str) -> PathBuf {
		self.root.join(name)
	}

	fn seed(&self, name: &str, bytes: &[u8]) -> PathBuf {
		let path = self.path(name);
		std::fs::write(&path, bytes).unwrap();
		path
	}
}

#[test]
fn split_rename_writes_file_once_and_updates_both_views() {
	let mut h = Harness::quiet();
	let a = h.seed("a.py", b"x = 1\n");
	let first = h.session.add_stack();
	h.session.open(first, &a).unwrap();
	let second = h.session.split(first).unwrap();
	h.session.with_stack(second, |stack| stack.insert(0, 0, "# edited\n")).unwrap().unwrap();
	let target = h.path("b.py");
	h.ui.save_paths.lock().push_back(target.clone());

	assert_eq!(h.session.save_as(second, 0).unwrap(), SaveOutcome::Saved);

	assert_eq!(h.fs.writes(), 1);
	assert_eq!(std::fs::read_to_string(&target).unwrap(), "# edited\nx = 1\n");
	assert_eq!(std::fs::read_to_string(&a).unwrap(), "x = 1\n");
	for id in [first, second] {
		let doc = &h.session.stack(id).unwrap().documents()[0];
		assert_eq!(doc.key(), &DocKey::File(target.clone()));
		assert!(!doc.is_modified());
	}
}

#[test]
fn crlf_and_bom_survive_a_round_trip() {
	let mut h = Harness::quiet();
	let path = h.seed("win.py", b"\xEF\xBB\xBFa = 1\r\nb = 2\r\n");
	let first = h.session.add_stack();
	h.session.open(first, &path).unwrap();

	let doc = &h.session.stack(first).unwrap().documents()[0];
	assert_eq!(doc.text().to_text(), "a = 1\nb = 2\n");
	assert_eq!(doc.line_ending(), LineEnding::CrLf);

	h.session.with_stack(first, |stack| stack.insert(0, 0, "# top\n")).unwrap().unwrap();
	h.session.save(first, 0, false).unwrap();

	assert_eq!(std::fs::read(&path).unwrap(), b"\xEF\xBB\xBF# top\r\na = 1\r\nb = 2\r\n");
}

#[test]
fn latin1_file_is_read_and_written_back_unchanged() {
	let mut h = Harness::quiet();
	let path = h.seed("legacy.txt", b"caf\xE9\n");
	let first = h.session.add_stack();
	h.session.open(first, &path).unwrap();
	assert_eq!(h.session.stack(first).unwrap().documents()[0].text().to_text(), "café\n");

	h.session.save(first, 0, true).unwrap();
	assert_eq!(std::fs::read(&path).unwrap(), b"caf\xE9\n");
}

#[test]
fn external_modification_is_detected_on_focus() {
	let mut h = Harness::quiet();
	let path = h.seed("a.py", b"old\n");
	let first = h.session.add_stack();
	h.session.open(first, &path).unwrap();
	h.session.with_stack(first, |stack| stack.set_text(0, "mine\n")).unwrap().unwrap();

	std::fs::write(&path, b"theirs\n").unwrap();
	let later = SystemTime::now() + Duration::from_secs(10);
	std::fs::File::options().write(true).open(&path).unwrap().set_modified(later).unwrap();
	h.ui.answers.lock().push_back(Answer::No);

	assert_eq!(h.session.focus(first, 0).unwrap(), ExternalChange::KeptLocal);
	assert_eq!(h.session.focus(first, 0).unwrap(), ExternalChange::Unchanged);
	assert_eq!(*h.ui.prompts.lock(), vec![ConfirmKind::ReloadExternal]);

	h.session.save(first, 0, false).unwrap();
	assert_eq!(std::fs::read_to_string(&path).unwrap(), "mine\n");
}

#[test]
fn breakpoints_persist_through_the_json_store() {
	let h = Harness::quiet();
	let script = h.seed("script.py", b"a\nb\nc\n");
	let blob = h.path("state/breakpoints.json");
	let store = Arc::new(JsonBreakpointStore::open(&blob).unwrap());
	let ctx = StackContext::default().with_breakpoints(store.clone()).with_templates(Arc::new(EmptyTemplate));
	let mut session = SessionCoordinator::new(h.session.config().clone(), ctx);
	let first = session.add_stack();
	session.open(first, &script).unwrap();
	let second = session.split(first).unwrap();

	session.with_stack(second, |stack| stack.toggle_breakpoint(0, 2)).unwrap().unwrap();

	let reopened = JsonBreakpointStore::open(&blob).unwrap();
	assert_eq!(reopened.load(&script), vec![Breakpoint::new(2)]);
	assert_eq!(session.stack(first).unwrap().documents()[0].breakpoints(), &[Breakpoint::new(2)]);
}

#[test]
fn config_file_drives_save_policy() {
	let dir = tempfile::tempdir().unwrap();
	let config_path = dir.path().join("session.toml");
	std::fs::write(
		&config_path,
		"[stack]\ncode-analysis = false\ntodo-list = false\nstrip-trailing-whitespace-on-save = true\nconvert-eol-on-save = \"lf\"\n",
	)
	.unwrap();
	let config = SessionConfig::load(&config_path).unwrap();

	let mut h = Harness::new(config, CheckerSet::default());
	let path = h.seed("a.py", b"x = 1  \r\ny = 2\r\n");
	let first = h.session.add_stack();
	h.session.open(first, &path).unwrap();
	h.session.save(first, 0, true).unwrap();

	assert_eq!(std::fs::read_to_string(&path).unwrap(), "x = 1\ny = 2\n");
}

#[test]
fn custom_checkers_report_joined_results_in_every_view() {
	let lint = FnChecker::new(CheckerKind::Lint, |text: &str| {
		Ok(text
			.lines()
			.enumerate()
			.filter(|(_, line)| line.contains("import *"))
			.map(|(i, _)| Finding::new("wildcard import", i as u32 + 1))
			.collect())
	});
	let style = FnChecker::new(CheckerKind::Style, |text: &str| {
		Ok(text
			.lines()
			.enumerate()
			.filter(|(_, line)| line.len() > 20)
			.map(|(i, _)| Finding::new("line too long", i as u32 + 1))
			.collect())
	});
	let checkers = CheckerSet::standard().with(Arc::new(lint)).with(Arc::new(style));
	let mut h = Harness::new(SessionConfig::default(), checkers);
	let path = h.seed("mod.py", b"from os import *\nvalue = 'a rather long line here'  # TODO tidy\n");
	let first = h.session.add_stack();
	h.session.open(first, &path).unwrap();
	let second = h.session.split(first).unwrap();

	h.session.wait_for_analysis(WAIT);

	for id in [first, second] {
		let doc = &h.session.stack(id).unwrap().documents()[0];
		assert_eq!(
			doc.analysis_results(),
			&[Finding::new("wildcard import", 1), Finding::new("line too long", 2)]
		);
		assert_eq!(doc.todo_results(), &[Finding::new("Tidy", 2)]);
	}
}

#[test]
fn closing_a_view_keeps_documents_open_elsewhere() {
	let mut h = Harness::quiet();
	let a = h.seed("a.py", b"a\n");
	let first = h.session.add_stack();
	h.session.open(first, &a).unwrap();
	let second = h.session.split(first).unwrap();
	h.session.with_stack(second, |stack| stack.set_text(0, "changed\n")).unwrap().unwrap();

	assert!(h.session.remove_stack(second).unwrap());

	assert!(h.ui.prompts.lock().is_empty());
	assert_eq!(h.session.stack_ids(), vec![first]);
	assert!(h.session.stack(first).unwrap().documents()[0].is_modified());
	assert_eq!(h.session.unsaved_documents(), vec![DocKey::File(a)]);
}
