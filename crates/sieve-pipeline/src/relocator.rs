//! Collision-safe file relocation.
//!
//! The destination name is chosen and reserved (an empty placeholder created
//! with `create_new`) while holding one lock shared by every relocation. The
//! bytes are moved afterwards, outside the lock, by renaming over the
//! placeholder or copying across filesystems.

use std::ffi::OsString;
use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::error::MoveError;

/// Moves files into destination folders without overwriting.
#[derive(Debug, Default)]
pub struct FileRelocator {
    naming: Mutex<()>,
}

impl FileRelocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Moves `source` into `dest_dir`, returning the final path.
    ///
    /// If the name is taken, `_<unix-seconds>` is appended before the
    /// extension, then `_<unix-seconds>_<n>` if that is taken too. On failure
    /// the source is left in place.
    pub fn relocate(&self, source: &Path, dest_dir: &Path) -> Result<PathBuf, MoveError> {
        let file_name = source.file_name().ok_or_else(|| MoveError {
            from: source.to_path_buf(),
            to: dest_dir.to_path_buf(),
            source: io::Error::new(io::ErrorKind::InvalidInput, "source has no file name"),
        })?;

        let dest = self.reserve(Path::new(file_name), dest_dir).map_err(|e| MoveError {
            from: source.to_path_buf(),
            to: dest_dir.join(file_name),
            source: e,
        })?;

        if let Err(e) = move_file(source, &dest) {
            // Drop the reservation so the name becomes free again.
            let _ = fs::remove_file(&dest);
            return Err(MoveError {
                from: source.to_path_buf(),
                to: dest,
                source: e,
            });
        }

        tracing::debug!(from = %source.display(), to = %dest.display(), "relocated");
        Ok(dest)
    }

    /// Picks a free name and creates an empty placeholder for it.
    fn reserve(&self, file_name: &Path, dest_dir: &Path) -> io::Result<PathBuf> {
        let _guard = self.naming.lock();

        let stamp = chrono::Utc::now().timestamp();
        let stem = file_name
            .file_stem()
            .map(|s| s.to_os_string())
            .unwrap_or_default();
        let ext = file_name.extension();

        let mut counter = 0u32;
        loop {
            let candidate = match counter {
                0 => dest_dir.join(file_name),
                1 => dest_dir.join(suffixed(&stem, ext, &stamp.to_string())),
                n => dest_dir.join(suffixed(&stem, ext, &format!("{stamp}_{}", n - 1))),
            };

            match OpenOptions::new().write(true).create_new(true).open(&candidate) {
                Ok(_) => return Ok(candidate),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => counter += 1,
                Err(e) => return Err(e),
            }
        }
    }
}

fn suffixed(stem: &OsString, ext: Option<&std::ffi::OsStr>, suffix: &str) -> OsString {
    let mut name = stem.clone();
    name.push("_");
    name.push(suffix);
    if let Some(ext) = ext {
        name.push(".");
        name.push(ext);
    }
    name
}

/// Renames over the placeholder, falling back to copy + remove across devices.
fn move_file(source: &Path, dest: &Path) -> io::Result<()> {
    if !source.is_file() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("source {} is not a file", source.display()),
        ));
    }

    match fs::rename(source, dest) {
        Ok(()) => Ok(()),
        Err(rename_err) => {
            tracing::debug!(error = %rename_err, "rename failed, copying instead");
            fs::copy(source, dest)?;
            if let Err(e) = fs::remove_file(source) {
                let _ = fs::remove_file(dest);
                return Err(e);
            }
            Ok(())
        }
    }
}
