//! Crash-safe persistence for the salt file and the vault data file.

use getrandom::fill;
use std::fs::{self, File, OpenOptions};
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};

use crate::error::VaultError;

/// A single file on disk, written atomically and readable only by its owner.
#[derive(Debug, Clone)]
pub struct Storage {
    path: PathBuf,
}

impl Storage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns `true` if the file exists.
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the whole file, or `None` if it does not exist.
    ///
    /// # Errors
    ///
    /// Any I/O failure other than "not found".
    pub fn load(&self) -> Result<Option<Vec<u8>>, VaultError> {
        match fs::read(&self.path) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Writes `data` via a temporary sibling file that is synced and then
    /// renamed over the target, so a crash leaves either the old or the new
    /// content, never a partial write.
    ///
    /// Creates parent directories if they don't exist.
    pub fn save(&self, data: &[u8]) -> Result<(), VaultError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let tmp_path = self.random_tmp_path()?;

        let mut tmp_file = create_private(&tmp_path)?;
        let written = tmp_file.write_all(data).and_then(|_| tmp_file.sync_all());
        drop(tmp_file);

        let replaced = written
            .map_err(VaultError::from)
            .and_then(|_| self.atomic_replace(&tmp_path));
        if let Err(e) = replaced {
            let _ = fs::remove_file(&tmp_path);
            return Err(e);
        }

        #[cfg(not(target_os = "windows"))]
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            File::open(parent)?.sync_all()?;
        }

        tracing::debug!(path = %self.path.display(), bytes = data.len(), "file saved");
        Ok(())
    }

    /// `<file name>.tmp.<16 hex chars>` in the same directory.
    fn random_tmp_path(&self) -> Result<PathBuf, VaultError> {
        let mut buf = [0u8; 8];
        fill(&mut buf).map_err(|_| VaultError::Rng)?;

        let suffix: String = buf.iter().map(|b| format!("{b:02x}")).collect();
        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                VaultError::Io(io::Error::new(
                    ErrorKind::InvalidInput,
                    "storage path has no file name",
                ))
            })?;

        Ok(self.path.with_file_name(format!("{file_name}.tmp.{suffix}")))
    }

    #[cfg(target_os = "windows")]
    fn atomic_replace(&self, tmp_path: &Path) -> Result<(), VaultError> {
        use std::ffi::OsStr;
        use std::os::windows::ffi::OsStrExt;
        use windows_sys::Win32::Storage::FileSystem::{REPLACEFILE_WRITE_THROUGH, ReplaceFileW};

        if !self.path.exists() {
            fs::rename(tmp_path, &self.path)?;
            return Ok(());
        }

        fn to_wide(s: &OsStr) -> Vec<u16> {
            s.encode_wide().chain(std::iter::once(0)).collect()
        }

        let target_w = to_wide(self.path.as_os_str());
        let tmp_w = to_wide(tmp_path.as_os_str());

        // SAFETY: both buffers are NUL-terminated UTF-16 and outlive the call;
        // the API does not retain the pointers.
        let result = unsafe {
            ReplaceFileW(
                target_w.as_ptr(),
                tmp_w.as_ptr(),
                std::ptr::null(),
                REPLACEFILE_WRITE_THROUGH,
                std::ptr::null(),
                std::ptr::null(),
            )
        };

        if result == 0 {
            return Err(io::Error::last_os_error().into());
        }
        Ok(())
    }

    /// `rename()` is atomic when both paths are on the same filesystem.
    #[cfg(not(target_os = "windows"))]
    fn atomic_replace(&self, tmp_path: &Path) -> Result<(), VaultError> {
        fs::rename(tmp_path, &self.path)?;
        Ok(())
    }
}

/// Creates a new file (failing if it exists) with owner-only permissions.
fn create_private(path: &Path) -> io::Result<File> {
    let mut options = OpenOptions::new();
    options.write(true).create_new(true);

    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    options.open(path)
}
