//! PID-file lifecycle: write this process's PID on startup, refuse to start
//! if a live instance already owns the file, and remove it again on clean
//! shutdown. Mirrors the original daemon's `pid_write`/`pid_read`/
//! `pid_running`/`pid_remove` sequence in `main()`.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::CoreError;

pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    /// Checks for a live instance, then writes the current PID to `path`.
    /// Fails with `CoreError::Io` if another process already holds the file
    /// (a stale file from a crashed process is overwritten after a warning).
    pub fn acquire(path: impl AsRef<Path>) -> Result<Self, CoreError> {
        let path = path.as_ref().to_path_buf();

        if let Some(existing) = read_pid(&path) {
            if is_running(existing) {
                return Err(CoreError::Io(format!(
                    "PID file '{}' names a running process ({existing}); refusing to start",
                    path.display()
                )));
            }
            warn!(path = %path.display(), pid = existing, "stale PID file found, overwriting");
        }

        fs::write(&path, format!("{}\n", std::process::id()))
            .map_err(|e| CoreError::Io(format!("cannot write PID file '{}': {e}", path.display())))?;
        info!(path = %path.display(), pid = std::process::id(), "PID file written");

        Ok(PidFile { path })
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), error = %e, "failed to remove PID file");
        } else {
            info!(path = %self.path.display(), "PID file removed");
        }
    }
}

fn read_pid(path: &Path) -> Option<u32> {
    fs::read_to_string(path).ok()?.trim().parse().ok()
}

/// Linux-specific liveness check via `/proc`, matching this daemon's
/// Unix-only signal handling elsewhere (`main.rs` only installs
/// `SignalKind` handlers, no Windows fallback).
fn is_running(pid: u32) -> bool {
    Path::new(&format!("/proc/{pid}")).exists()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn temp_path(tag: &str) -> PathBuf {
        static COUNTER: AtomicU32 = AtomicU32::new(0);
        let n = COUNTER.fetch_add(1, Ordering::Relaxed);
        std::env::temp_dir().join(format!("knotd-pidfile-test-{tag}-{n}.pid"))
    }

    #[test]
    fn acquire_writes_current_pid_and_drop_removes_it() {
        let path = temp_path("basic");
        {
            let _guard = PidFile::acquire(&path).unwrap();
            let contents = fs::read_to_string(&path).unwrap();
            assert_eq!(contents.trim().parse::<u32>().unwrap(), std::process::id());
        }
        assert!(!path.exists());
    }

    #[test]
    fn acquire_overwrites_a_stale_pid_file() {
        let path = temp_path("stale");
        fs::write(&path, "999999999\n").unwrap();
        let _guard = PidFile::acquire(&path).unwrap();
        let contents = fs::read_to_string(&path).unwrap();
        assert_eq!(contents.trim().parse::<u32>().unwrap(), std::process::id());
    }

    #[test]
    fn acquire_refuses_when_pid_file_names_a_running_process() {
        let path = temp_path("live");
        fs::write(&path, format!("{}\n", std::process::id())).unwrap();
        let err = PidFile::acquire(&path).unwrap_err();
        assert!(matches!(err, CoreError::Io(_)));
        fs::remove_file(&path).unwrap();
    }
}
