//! Resource accounting (component L): tracks the file descriptors and
//! files one `run()` invocation opens, closing them deterministically on
//! both normal and error exit.
//!
//! pysh keeps no such table -- its fds and files are garbage-collected
//! implicitly when the interpreter drops its last reference. This crate
//! makes that lifecycle explicit the idiomatic-Rust way: every opened
//! `File`/pipe end is owned by a `ResourceTable` (or, for ones scoped to a
//! single task, by the stack frame that created them) and `Drop` closes
//! the underlying fd the moment the last owner goes away -- on a normal
//! return *and* on an `Err` propagating out via `?`, with no separate
//! dispose-tree walk required.

use std::fs::{File, OpenOptions};
use std::os::unix::fs::OpenOptionsExt;
use std::sync::Mutex;

use crate::error::ShellError;

/// Opens a redirect's file target with the mode spec.md 6 requires:
/// truncate unless `append`, creating the file if it does not exist.
pub fn open_redirect_file(path: &str, append: bool) -> Result<File, ShellError> {
    OpenOptions::new()
        .write(true)
        .create(true)
        .append(append)
        .truncate(!append)
        .mode(0o644)
        .open(path)
        .map_err(|e| ShellError::Io { message: format!("open {path:?} for redirect: {e}") })
}

/// Per-invocation registry of opened files, kept only so an embedder can
/// observe how many resources a `run()` call is holding at any point;
/// actual release is via `Drop` on the `File`s themselves.
#[derive(Default)]
pub struct ResourceTable {
    open_files: Mutex<Vec<File>>,
}

impl ResourceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a file this invocation opened. Returns a clone of its
    /// handle so the caller can still use it; the registry's own clone is
    /// dropped (and thus the fd closed) along with the table.
    pub fn track(&self, file: &File) -> Result<(), ShellError> {
        let dup = file.try_clone().map_err(ShellError::from)?;
        self.open_files.lock().unwrap().push(dup);
        Ok(())
    }

    pub fn open_count(&self) -> usize {
        self.open_files.lock().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracked_file_counted_until_table_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");
        let table = ResourceTable::new();
        let f = open_redirect_file(path.to_str().unwrap(), false).unwrap();
        table.track(&f).unwrap();
        assert_eq!(table.open_count(), 1);
        drop(table);
        // the original handle is still usable; dropping the table only
        // released its own tracked clone.
        drop(f);
    }

    #[test]
    fn append_mode_does_not_truncate() {
        use std::io::{Read, Write};
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");
        {
            let mut f = open_redirect_file(path.to_str().unwrap(), false).unwrap();
            f.write_all(b"first\n").unwrap();
        }
        {
            let mut f = open_redirect_file(path.to_str().unwrap(), true).unwrap();
            f.write_all(b"second\n").unwrap();
        }
        let mut contents = String::new();
        File::open(&path).unwrap().read_to_string(&mut contents).unwrap();
        assert_eq!(contents, "first\nsecond\n");
    }
}
