//! Single-writer guard for a tracked tree

use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::{StoreError, StoreResult};

#[derive(Debug)]
enum Held {
    File(PathBuf),
    Flag(Arc<AtomicBool>),
}

/// Held for the duration of one history operation; released on drop.
#[derive(Debug)]
pub struct OperationLock {
    held: Held,
}

impl OperationLock {
    /// Take an advisory lock file. Fails with [`StoreError::Locked`] if it
    /// already exists.
    pub fn acquire_file(path: &Path) -> StoreResult<Self> {
        let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(StoreError::Locked(format!(
                    "{} exists (remove it if no other gsb process is running)",
                    path.display()
                )));
            }
            Err(e) => return Err(StoreError::Io(e)),
        };

        // Informational only
        let _ = writeln!(file, "{}", std::process::id());

        tracing::debug!(path = %path.display(), "Acquired operation lock");
        Ok(Self {
            held: Held::File(path.to_path_buf()),
        })
    }

    /// Take an in-process lock flag
    pub fn acquire_flag(flag: Arc<AtomicBool>) -> StoreResult<Self> {
        if flag
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(StoreError::Locked(
                "another operation holds this store".to_string(),
            ));
        }
        Ok(Self {
            held: Held::Flag(flag),
        })
    }
}

impl Drop for OperationLock {
    fn drop(&mut self) {
        match &self.held {
            Held::File(path) => {
                if let Err(e) = std::fs::remove_file(path) {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to release operation lock");
                }
            }
            Held::Flag(flag) => flag.store(false, Ordering::Release),
        }
    }
}
