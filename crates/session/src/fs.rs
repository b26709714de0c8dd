//! Filesystem seam used by document stacks.

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Disk access needed by the save/load/reload flows.
///
/// Implementations must be callable from the coordination thread only; no
/// analysis worker touches the filesystem.
pub trait FileSystem: Send + Sync {
	fn read(&self, path: &Path) -> io::Result<Vec<u8>>;

	/// Replaces the file at `path` with `contents`, creating parent directories.
	fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()>;

	/// Last modification timestamp.
	fn modified(&self, path: &Path) -> io::Result<SystemTime>;

	fn exists(&self, path: &Path) -> bool;

	/// Whether a write to `path` is expected to succeed.
	fn is_writable(&self, path: &Path) -> bool;

	/// Absolute, symlink-resolved form of `path`; falls back to the absolute
	/// lexical path when the file does not exist yet.
	fn canonicalize(&self, path: &Path) -> PathBuf;
}

/// [`FileSystem`] backed by the operating system.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsFileSystem;

impl FileSystem for OsFileSystem {
	fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
		std::fs::read(path)
	}

	fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
		let parent = match path.parent() {
			Some(parent) if !parent.as_os_str().is_empty() => parent,
			_ => Path::new("."),
		};
		std::fs::create_dir_all(parent)?;

		// A failed write must leave the existing file intact.
		let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
		tmp.write_all(contents)?;
		tmp.as_file().sync_all()?;
		if let Ok(meta) = std::fs::metadata(path) {
			tmp.as_file().set_permissions(meta.permissions())?;
		}
		tmp.persist(path).map_err(|err| err.error)?;
		Ok(())
	}

	fn modified(&self, path: &Path) -> io::Result<SystemTime> {
		std::fs::metadata(path)?.modified()
	}

	fn exists(&self, path: &Path) -> bool {
		path.is_file()
	}

	fn is_writable(&self, path: &Path) -> bool {
		match std::fs::metadata(path) {
			Ok(meta) => !meta.permissions().readonly(),
			Err(_) => path.parent().is_none_or(|parent| parent.as_os_str().is_empty() || parent.is_dir()),
		}
	}

	fn canonicalize(&self, path: &Path) -> PathBuf {
		std::fs::canonicalize(path)
			.or_else(|_| std::path::absolute(path))
			.unwrap_or_else(|_| path.to_path_buf())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn write_creates_parents_and_replaces_content() {
		let dir = tempfile::tempdir().expect("tempdir");
		let path = dir.path().join("nested").join("a.py");
		let fs = OsFileSystem;

		fs.write(&path, b"one").expect("first write");
		fs.write(&path, b"two").expect("second write");

		assert_eq!(fs.read(&path).expect("read back"), b"two");
		assert!(fs.exists(&path));
		assert!(fs.is_writable(&path));
		assert!(fs.modified(&path).is_ok());
	}

	#[test]
	fn canonicalize_handles_missing_files() {
		let dir = tempfile::tempdir().expect("tempdir");
		let missing = dir.path().join("not-yet.py");
		let resolved = OsFileSystem.canonicalize(&missing);
		assert!(resolved.is_absolute());
		assert!(resolved.ends_with("not-yet.py"));
	}

	#[test]
	fn missing_file_in_missing_dir_is_not_writable() {
		let dir = tempfile::tempdir().expect("tempdir");
		let path = dir.path().join("absent").join("x.py");
		assert!(!OsFileSystem.is_writable(&path));
		assert!(!OsFileSystem.exists(&path));
	}
}
