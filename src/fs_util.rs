use std::fs;
use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use tracing::{debug, warn};

use crate::error::IngestError;
use crate::naming::split_first_dot;

pub fn ensure_dir(path: &Utf8Path) -> Result<(), IngestError> {
    fs::create_dir_all(path.as_std_path())
        .map_err(|err| IngestError::Filesystem(format!("create {path}: {err}")))
}

/// Moves `source` to `dest` without ever overwriting an existing file.
///
/// When `dest` is taken a counter is appended to the name stem until a free
/// name is found. The path actually written is returned.
pub fn safe_move(source: &Utf8Path, dest: &Utf8Path) -> Result<Utf8PathBuf, IngestError> {
    let parent = dest
        .parent()
        .ok_or_else(|| IngestError::Filesystem(format!("invalid destination path {dest}")))?;
    let file_name = dest
        .file_name()
        .ok_or_else(|| IngestError::Filesystem(format!("invalid destination path {dest}")))?;
    ensure_dir(parent)?;

    let (stem, exts) = split_first_dot(file_name);
    let mut target = dest.to_path_buf();
    let mut counter = 0usize;
    loop {
        if !target.as_std_path().exists() && move_file(source, &target)? == Placement::Stored {
            break;
        }
        counter += 1;
        target = parent.join(format!("{stem}_{counter}{exts}"));
    }
    if target != dest {
        warn!(requested = %dest, actual = %target, "destination exists, storing under new name");
    }
    Ok(target)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    Stored,
    /// `dest` appeared before the move could claim it; `source` is untouched.
    Occupied,
}

/// Moves `source` to `dest` unless `dest` already exists.
///
/// Within a volume the file is hard linked into place and the source link
/// removed, so an existing `dest` is never replaced. Across volumes, or where
/// links are unsupported, it is copied through a temporary file and persisted
/// without clobbering.
pub fn move_file(source: &Utf8Path, dest: &Utf8Path) -> Result<Placement, IngestError> {
    match fs::hard_link(source.as_std_path(), dest.as_std_path()) {
        Ok(()) => {}
        Err(err) if err.kind() == io::ErrorKind::AlreadyExists => return Ok(Placement::Occupied),
        Err(err)
            if matches!(
                err.kind(),
                io::ErrorKind::CrossesDevices | io::ErrorKind::Unsupported
            ) =>
        {
            debug!(%source, %dest, error = %err, "cannot link, copying");
            return copy_then_remove(source, dest);
        }
        Err(err) => {
            return Err(IngestError::Filesystem(format!(
                "move {source} to {dest}: {err}"
            )));
        }
    }
    fs::remove_file(source.as_std_path())
        .map_err(|err| IngestError::Filesystem(format!("remove {source}: {err}")))?;
    Ok(Placement::Stored)
}

fn copy_then_remove(source: &Utf8Path, dest: &Utf8Path) -> Result<Placement, IngestError> {
    let parent = dest
        .parent()
        .ok_or_else(|| IngestError::Filesystem(format!("invalid destination path {dest}")))?;
    let temp = tempfile::Builder::new()
        .prefix(".readvault-move")
        .tempfile_in(parent.as_std_path())
        .map_err(|err| IngestError::Filesystem(err.to_string()))?;
    fs::copy(source.as_std_path(), temp.path())
        .map_err(|err| IngestError::Filesystem(format!("copy {source}: {err}")))?;
    match temp.persist_noclobber(dest.as_std_path()) {
        Ok(_) => {}
        Err(err) if err.error.kind() == io::ErrorKind::AlreadyExists => {
            return Ok(Placement::Occupied);
        }
        Err(err) => {
            return Err(IngestError::Filesystem(format!("persist {dest}: {}", err.error)));
        }
    }
    fs::remove_file(source.as_std_path())
        .map_err(|err| IngestError::Filesystem(format!("remove {source}: {err}")))?;
    Ok(Placement::Stored)
}

pub fn remove_tree(path: &Utf8Path) -> Result<(), IngestError> {
    if !path.as_std_path().exists() {
        return Ok(());
    }
    fs::remove_dir_all(path.as_std_path())
        .map_err(|err| IngestError::Filesystem(format!("remove {path}: {err}")))
}

pub fn remove_file_if_exists(path: &Utf8Path) -> Result<(), IngestError> {
    match fs::remove_file(path.as_std_path()) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(IngestError::Filesystem(format!("remove {path}: {err}"))),
    }
}
