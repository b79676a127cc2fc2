//! Atomic file updates through a sibling lock.
//!
//! A writer takes `<target>.lock` with an exclusive create (a second
//! writer gets `Busy`), streams the replacement contents into it, and
//! publishes with a single rename; readers only ever observe the old file
//! or the complete new one. An uncommitted lock is unlinked when its
//! guard goes away, and every live lock is also enrolled in a
//! process-wide table so the same sweep can run from a fatal-signal
//! handler or an explicit last-chance hook.

use std::collections::BTreeSet;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, Once, OnceLock};

use crate::{Result, UtilError};

/// A held update lock: the open `.lock` file plus the rollback guard.
///
/// Writing goes through the [`Write`] impl into the lock file. Exactly one
/// of [`commit`](LockFile::commit) (rename into place) or dropping the
/// value (unlink, target untouched) ends the hold.
pub struct LockFile {
    file: File,
    held: Held,
}

/// The on-disk side of a hold. Dropping it unlinks the lock file unless
/// the rename already consumed it.
struct Held {
    target: PathBuf,
    lock: PathBuf,
    renamed: bool,
}

impl Drop for Held {
    fn drop(&mut self) {
        if !self.renamed {
            let _ = fs::remove_file(&self.lock);
        }
        dismiss(&self.lock);
    }
}

impl LockFile {
    /// Take the update lock for `target`, creating `<target>.lock`
    /// exclusively. An existing lock file means another writer: `Busy`.
    pub fn take(target: impl Into<PathBuf>) -> Result<Self> {
        install_signal_cleanup();

        let target = target.into();
        let lock = lock_path_of(&target);

        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&lock)
            .map_err(|e| {
                if e.kind() == io::ErrorKind::AlreadyExists {
                    UtilError::Busy(target.clone())
                } else {
                    UtilError::LockCreate {
                        path: lock.clone(),
                        source: e,
                    }
                }
            })?;

        enroll(&lock);
        Ok(Self {
            file,
            held: Held {
                target,
                lock,
                renamed: false,
            },
        })
    }

    /// The file this lock will replace.
    pub fn target(&self) -> &Path {
        &self.held.target
    }

    /// The lock file being written.
    pub fn lock_path(&self) -> &Path {
        &self.held.lock
    }

    /// Publish: close the lock file and rename it over the target.
    ///
    /// The rename is the commit point; on failure the target is untouched
    /// and the lock file is unlinked on the way out.
    pub fn commit(self) -> Result<()> {
        let Self { file, mut held } = self;
        drop(file);

        fs::rename(&held.lock, &held.target).map_err(|e| UtilError::LockCommit {
            path: held.target.clone(),
            source: e,
        })?;
        held.renamed = true;
        Ok(())
    }

    /// Give up: unlink the lock, leaving the target as it was.
    pub fn abandon(self) {}
}

impl Write for LockFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

/// The lock path for a target: the full file name plus `.lock` (an
/// existing extension is kept, not replaced).
fn lock_path_of(target: &Path) -> PathBuf {
    let mut name = target.as_os_str().to_os_string();
    name.push(".lock");
    PathBuf::from(name)
}

// --- The live-lock table ---
//
// Drop covers normal control flow and panics; fatal signals do not run
// drops, so the sweep walks this table instead. Enroll before the first
// byte is written, dismiss when the hold ends either way.

fn live_locks() -> &'static Mutex<BTreeSet<PathBuf>> {
    static LOCKS: OnceLock<Mutex<BTreeSet<PathBuf>>> = OnceLock::new();
    LOCKS.get_or_init(|| Mutex::new(BTreeSet::new()))
}

fn enroll(lock: &Path) {
    if let Ok(mut table) = live_locks().lock() {
        table.insert(lock.to_path_buf());
    }
}

fn dismiss(lock: &Path) {
    if let Ok(mut table) = live_locks().lock() {
        table.remove(lock);
    }
}

/// Unlink every lock this process still holds.
///
/// Runs from the fatal-signal handler; also callable as a last-chance
/// hook right before `process::exit`.
pub fn sweep_live_locks() {
    if let Ok(mut table) = live_locks().lock() {
        while let Some(path) = table.pop_first() {
            let _ = fs::remove_file(&path);
        }
    }
}

#[cfg(unix)]
extern "C" fn on_fatal_signal(sig: libc::c_int) {
    // Async-signal safety is best-effort here: the process is dying
    // anyway, and a stale lock is the worse outcome.
    sweep_live_locks();
    unsafe {
        libc::signal(sig, libc::SIG_DFL);
        libc::raise(sig);
    }
}

/// Install the fatal-signal sweep once per process.
pub fn install_signal_cleanup() {
    static INSTALL: Once = Once::new();
    INSTALL.call_once(|| {
        #[cfg(unix)]
        unsafe {
            let handler = on_fatal_signal as extern "C" fn(libc::c_int) as libc::sighandler_t;
            libc::signal(libc::SIGINT, handler);
            libc::signal(libc::SIGTERM, handler);
            libc::signal(libc::SIGHUP, handler);
        }
    });
}
