//! Atomic replacement of index files.
//!
//! The new index is written in full to a temporary file next to the target
//! and then moved over it, so the target path only ever holds the old file,
//! the new file, or (if there was no old file) nothing.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use geoindex_core::IndexError;
use geoindex_store::SpatialIndex;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PersistError {
    #[error("Cannot replace existing file {}: {source}", .path.display())]
    NotReplaceable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to write temporary file {}: {source}", .path.display())]
    WriteTemp {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to encode index into {}: {source}", .path.display())]
    Encode {
        path: PathBuf,
        #[source]
        source: IndexError,
    },

    #[error("Failed to move {} into place at {}: {source}", .from.display(), .to.display())]
    MoveIntoPlace {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// The `attempt`-th temporary path derived from `target`: `<name>.tmp`,
/// `<name>.tmp1`, `<name>.tmp2`, ... in the target's directory.
pub fn derived_temp_path(target: &Path, attempt: u32) -> PathBuf {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "index".to_string());
    let name = if attempt == 0 {
        format!("{name}.tmp")
    } else {
        format!("{name}.tmp{attempt}")
    };
    match target.parent() {
        Some(dir) => dir.join(name),
        None => PathBuf::from(name),
    }
}

/// Writes index files with the temp-file-and-move protocol.
///
/// Single writer per target path is assumed; nothing is locked.
#[derive(Debug, Default)]
pub struct AtomicPersister {
    #[cfg(test)]
    fail_before_move: bool,
}

impl AtomicPersister {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace `target` with the serialized index.
    pub fn replace(&self, target: &Path, index: &SpatialIndex) -> Result<(), PersistError> {
        self.replace_with(target, |writer| index.encode(writer))
    }

    /// Replace `target` with whatever `write` produces.
    ///
    /// On any failure the temporary file is removed (best effort) and the
    /// target is left as it was.
    pub fn replace_with<F>(&self, target: &Path, write: F) -> Result<(), PersistError>
    where
        F: FnOnce(&mut dyn Write) -> Result<(), IndexError>,
    {
        ensure_replaceable(target)?;

        let (temp, file) = create_temp_file(target)?;
        let guard = TempFileGuard::new(temp.clone());

        let mut writer = BufWriter::new(file);
        write(&mut writer).map_err(|source| PersistError::Encode {
            path: temp.clone(),
            source,
        })?;
        let file = writer.into_inner().map_err(|e| PersistError::WriteTemp {
            path: temp.clone(),
            source: e.into_error(),
        })?;
        file.sync_all().map_err(|source| PersistError::WriteTemp {
            path: temp.clone(),
            source,
        })?;
        drop(file);

        #[cfg(test)]
        if self.fail_before_move {
            return Err(PersistError::MoveIntoPlace {
                from: temp,
                to: target.to_path_buf(),
                source: io::Error::other("injected failure"),
            });
        }

        move_into_place(&temp, target)?;
        guard.disarm();

        // make the rename itself durable; best effort
        if let Some(dir) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
            if let Ok(dir) = File::open(dir) {
                let _ = dir.sync_all();
            }
        }

        tracing::info!(path = %target.display(), "Index file replaced atomically");
        Ok(())
    }
}

/// Fail early, before any data is written, if the old file cannot be replaced.
fn ensure_replaceable(target: &Path) -> Result<(), PersistError> {
    let not_replaceable = |source: io::Error| PersistError::NotReplaceable {
        path: target.to_path_buf(),
        source,
    };

    match fs::symlink_metadata(target) {
        Ok(meta) if meta.is_dir() => Err(not_replaceable(io::Error::other(
            "target is a directory",
        ))),
        Ok(meta) if meta.permissions().readonly() => Err(not_replaceable(io::Error::new(
            ErrorKind::PermissionDenied,
            "target is read-only",
        ))),
        Ok(_) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(not_replaceable(e)),
    }
}

/// Create the first derived temp path that does not exist yet.
fn create_temp_file(target: &Path) -> Result<(PathBuf, File), PersistError> {
    let mut attempt = 0;
    loop {
        let path = derived_temp_path(target, attempt);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => return Ok((path, file)),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => attempt += 1,
            Err(source) => return Err(PersistError::WriteTemp { path, source }),
        }
    }
}

/// Rename within one volume; across volumes fall back to copy then delete,
/// during which both files briefly exist.
fn move_into_place(temp: &Path, target: &Path) -> Result<(), PersistError> {
    let move_error = |source: io::Error| PersistError::MoveIntoPlace {
        from: temp.to_path_buf(),
        to: target.to_path_buf(),
        source,
    };

    match fs::rename(temp, target) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::CrossesDevices => {
            tracing::warn!(
                temp = %temp.display(),
                target = %target.display(),
                "Temporary file on a different volume, copying into place"
            );
            fs::copy(temp, target).map_err(move_error)?;
            if let Err(e) = fs::remove_file(temp) {
                tracing::warn!(temp = %temp.display(), error = %e, "Failed to remove temporary file");
            }
            Ok(())
        }
        Err(e) => Err(move_error(e)),
    }
}

/// Removes the temporary file on drop unless disarmed.
struct TempFileGuard {
    path: PathBuf,
    armed: bool,
}

impl TempFileGuard {
    fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for TempFileGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!(temp = %self.path.display(), "Removed orphaned temporary file"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(temp = %self.path.display(), error = %e, "Failed to remove temporary file")
            }
        }
    }
}
