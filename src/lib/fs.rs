//! File primitives behind the port ledger: advisory locking, durable appends
//! and atomic replacement.

use std::{
    ffi::OsString,
    fs::{self, File, OpenOptions},
    io::{self, Write},
    os::unix::io::AsRawFd,
    path::{Path, PathBuf},
    thread,
    time::{Duration, Instant},
};

use tempfile::NamedTempFile;

/// Suffix appended to the ledger file name to form its lock file.
const LOCK_SUFFIX: &str = ".lock";
/// Interval between non-blocking lock attempts.
const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Outcome of a bounded lock attempt.
#[derive(Debug)]
pub enum LockAttempt {
    Acquired(LedgerLock),
    TimedOut,
}

/// Exclusive `flock` held on the ledger's sidecar lock file.
///
/// The lock lives on a separate file so it keeps working after compaction
/// replaces the ledger inode. Dropping the guard releases it.
#[derive(Debug)]
pub struct LedgerLock {
    file: File,
    path: PathBuf,
}

impl LedgerLock {
    /// Acquire the lock, polling until `deadline` (or forever when `None`).
    pub fn acquire(path: &Path, deadline: Option<Instant>) -> io::Result<LockAttempt> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)?;

        loop {
            // SAFETY: the descriptor is owned by `file` and stays open for the call.
            let result = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
            if result == 0 {
                return Ok(LockAttempt::Acquired(Self {
                    file,
                    path: path.to_path_buf(),
                }));
            }

            let err = io::Error::last_os_error();
            match err.raw_os_error() {
                Some(code) if code == libc::EWOULDBLOCK || code == libc::EINTR => {}
                _ => return Err(err),
            }

            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                return Ok(LockAttempt::TimedOut);
            }
            thread::sleep(LOCK_POLL_INTERVAL);
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for LedgerLock {
    fn drop(&mut self) {
        // SAFETY: see `acquire`; closing the file would release the lock anyway.
        unsafe {
            libc::flock(self.file.as_raw_fd(), libc::LOCK_UN);
        }
    }
}

/// Path of the sidecar lock file guarding `ledger_path`.
pub fn lock_path_for(ledger_path: &Path) -> PathBuf {
    let mut name = ledger_path
        .file_name()
        .map(OsString::from)
        .unwrap_or_else(|| OsString::from("ledger"));
    name.push(LOCK_SUFFIX);
    ledger_path.with_file_name(name)
}

/// Read a file's raw bytes, treating absence as `None`.
pub fn read_if_exists(path: &Path) -> io::Result<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(contents) => Ok(Some(contents)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err),
    }
}

/// Append `line` in a single write and flush it to disk.
///
/// Creates the file (and missing parent directories) on first use.
pub fn append_line(path: &Path, line: &str) -> io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(line.as_bytes())?;
    file.flush()?;
    file.sync_data()
}

/// Replace `path` with `contents` through a temporary sibling and a rename.
pub fn replace_atomically(path: &Path, contents: &str) -> io::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let mut temp = NamedTempFile::new_in(&dir)?;
    temp.write_all(contents.as_bytes())?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|err| err.error)?;
    Ok(())
}
