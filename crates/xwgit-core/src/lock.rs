use crate::error::{Result, XwgitError};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Exclusive advisory lock guarding a single-writer store (access codes,
/// context cache). Unlocks and removes the lock file on drop.
#[derive(Debug)]
pub struct StoreLock {
    file: File,
    path: PathBuf,
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
        let _ = fs::remove_file(&self.path);
    }
}

impl StoreLock {
    /// Acquire the lock at `path`, retrying briefly so two near-simultaneous
    /// invocations serialize instead of failing. Surfaces `StoreLocked`
    /// if the holder does not release within the retry window.
    pub fn acquire(path: &Path) -> Result<StoreLock> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut attempts = 0u32;
        loop {
            let file = OpenOptions::new()
                .create(true)
                .read(true)
                .write(true)
                .truncate(true)
                .open(path)?;
            match file.try_lock_exclusive() {
                Ok(()) => {
                    return Ok(StoreLock {
                        file,
                        path: path.to_path_buf(),
                    })
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    attempts += 1;
                    if attempts >= 20 {
                        return Err(XwgitError::StoreLocked(path.to_path_buf()));
                    }
                    std::thread::sleep(Duration::from_millis(50));
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}
