//! Breakpoint records and their persistence.
//!
//! Breakpoints are stored as one blob mapping absolute file paths to their
//! breakpoint lists, read and written wholesale.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SessionError};
use crate::fs::{FileSystem, OsFileSystem};

/// One breakpoint: a 1-based line with an optional condition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Breakpoint {
	pub line: u32,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub condition: Option<String>,
}

impl Breakpoint {
	pub fn new(line: u32) -> Self {
		Self { line, condition: None }
	}

	pub fn conditional(line: u32, condition: impl Into<String>) -> Self {
		Self {
			line,
			condition: Some(condition.into()),
		}
	}
}

/// Sorts by line and keeps the first breakpoint given for each line.
pub fn normalize(mut breakpoints: Vec<Breakpoint>) -> Vec<Breakpoint> {
	breakpoints.sort_by_key(|bp| bp.line);
	breakpoints.dedup_by_key(|bp| bp.line);
	breakpoints
}

/// Persistent breakpoint storage keyed by absolute path.
pub trait BreakpointStore: Send + Sync {
	/// Breakpoints recorded for `path`, sorted by line.
	fn load(&self, path: &Path) -> Vec<Breakpoint>;

	/// Replaces the list for `path`; an empty list removes the entry.
	fn save(&self, path: &Path, breakpoints: &[Breakpoint]) -> Result<()>;
}

/// In-memory store.
#[derive(Debug, Default)]
pub struct MemoryBreakpointStore {
	entries: Mutex<BTreeMap<PathBuf, Vec<Breakpoint>>>,
}

impl MemoryBreakpointStore {
	pub fn new() -> Self {
		Self::default()
	}

	/// Paths with at least one breakpoint.
	pub fn paths(&self) -> Vec<PathBuf> {
		self.entries.lock().keys().cloned().collect()
	}
}

impl BreakpointStore for MemoryBreakpointStore {
	fn load(&self, path: &Path) -> Vec<Breakpoint> {
		self.entries.lock().get(path).cloned().unwrap_or_default()
	}

	fn save(&self, path: &Path, breakpoints: &[Breakpoint]) -> Result<()> {
		let mut entries = self.entries.lock();
		if breakpoints.is_empty() {
			entries.remove(path);
		} else {
			entries.insert(path.to_path_buf(), normalize(breakpoints.to_vec()));
		}
		Ok(())
	}
}

/// Store backed by a single JSON file.
///
/// The whole map is kept in memory and rewritten on every save. Entries for
/// files that no longer exist are pruned when the blob is opened.
#[derive(Debug)]
pub struct JsonBreakpointStore {
	file: PathBuf,
	entries: Mutex<BTreeMap<PathBuf, Vec<Breakpoint>>>,
}

/// Returns the default blob location under the user state directory.
pub fn default_store_path() -> Option<PathBuf> {
	let state_dir = dirs::state_dir()
		.or_else(dirs::data_local_dir)
		.or_else(|| dirs::home_dir().map(|home| home.join(".local/state")))?;
	Some(state_dir.join("xeno").join("breakpoints.json"))
}

impl JsonBreakpointStore {
	/// Opens the blob at `file`; a missing file is an empty store.
	pub fn open(file: impl Into<PathBuf>) -> Result<Self> {
		let file = file.into();
		let mut entries: BTreeMap<PathBuf, Vec<Breakpoint>> = match std::fs::read(&file) {
			Ok(bytes) if bytes.is_empty() => BTreeMap::new(),
			Ok(bytes) => serde_json::from_slice(&bytes)
				.map_err(|err| SessionError::io(&file, io::Error::new(io::ErrorKind::InvalidData, err)))?,
			Err(err) if err.kind() == io::ErrorKind::NotFound => BTreeMap::new(),
			Err(err) => return Err(SessionError::io(&file, err)),
		};

		let before = entries.len();
		entries.retain(|path, list| path.is_file() && !list.is_empty());
		if entries.len() != before {
			tracing::debug!(file = %file.display(), pruned = before - entries.len(), "breakpoints.prune");
		}

		Ok(Self {
			file,
			entries: Mutex::new(entries),
		})
	}

	pub fn file(&self) -> &Path {
		&self.file
	}

	fn flush(&self, entries: &BTreeMap<PathBuf, Vec<Breakpoint>>) -> Result<()> {
		let bytes = serde_json::to_vec_pretty(entries).map_err(|err| SessionError::io(&self.file, io::Error::other(err)))?;
		OsFileSystem.write(&self.file, &bytes).map_err(|err| SessionError::io(&self.file, err))
	}
}

impl BreakpointStore for JsonBreakpointStore {
	fn load(&self, path: &Path) -> Vec<Breakpoint> {
		self.entries.lock().get(path).cloned().unwrap_or_default()
	}

	fn save(&self, path: &Path, breakpoints: &[Breakpoint]) -> Result<()> {
		let mut entries = self.entries.lock();
		let changed = if breakpoints.is_empty() {
			entries.remove(path).is_some()
		} else {
			let list = normalize(breakpoints.to_vec());
			entries.insert(path.to_path_buf(), list.clone()).as_ref() != Some(&list)
		};
		if !changed {
			return Ok(());
		}
		self.flush(&entries)?;
		tracing::trace!(file = %self.file.display(), path = %path.display(), count = breakpoints.len(), "breakpoints.save");
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;

	use super::*;

	#[test]
	fn normalize_sorts_and_dedups_lines() {
		let list = normalize(vec![Breakpoint::new(9), Breakpoint::conditional(3, "x > 1"), Breakpoint::new(3)]);
		assert_eq!(list, vec![Breakpoint::conditional(3, "x > 1"), Breakpoint::new(9)]);
	}

	#[test]
	fn json_store_round_trips_and_prunes_missing_files() {
		let dir = tempfile::tempdir().expect("tempdir");
		let blob = dir.path().join("state").join("breakpoints.json");
		let kept = dir.path().join("kept.py");
		let gone = dir.path().join("gone.py");
		std::fs::write(&kept, "x = 1\n").expect("write kept");
		std::fs::write(&gone, "y = 2\n").expect("write gone");

		let store = JsonBreakpointStore::open(&blob).expect("open empty store");
		store.save(&kept, &[Breakpoint::new(1)]).expect("save kept");
		store.save(&gone, &[Breakpoint::conditional(1, "y")]).expect("save gone");
		std::fs::remove_file(&gone).expect("remove gone");

		let reopened = JsonBreakpointStore::open(&blob).expect("reopen store");
		assert_eq!(reopened.load(&kept), vec![Breakpoint::new(1)]);
		assert!(reopened.load(&gone).is_empty());
	}

	#[test]
	fn corrupted_blob_reports_its_path() {
		let dir = tempfile::tempdir().expect("tempdir");
		let blob = dir.path().join("breakpoints.json");
		std::fs::write(&blob, "{ not json").expect("write blob");
		match JsonBreakpointStore::open(&blob) {
			Err(SessionError::Io { path, .. }) => assert_eq!(path, blob),
			other => panic!("expected I/O error, got {other:?}"),
		}
	}

	#[test]
	fn empty_list_removes_entry() {
		let store = MemoryBreakpointStore::new();
		let path = Path::new("/work/a.py");
		store.save(path, &[Breakpoint::new(4)]).expect("save");
		assert_eq!(store.paths(), vec![path.to_path_buf()]);
		store.save(path, &[]).expect("clear");
		assert!(store.paths().is_empty());
	}
}
