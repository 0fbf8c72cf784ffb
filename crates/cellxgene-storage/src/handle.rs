//! Scoped local file access
//!
//! A `LocalHandle` is a path that stays readable on the local filesystem for
//! as long as the handle lives. Handles created for remote objects own a
//! temporary copy and remove it when released.

use std::io;
use std::path::{Path, PathBuf};
use tempfile::TempPath;

#[derive(Debug)]
pub enum LocalHandle {
    /// The location already is a local path. Release never touches it.
    Borrowed(PathBuf),
    /// Temporary copy of a remote object, unlinked on release.
    Owned(TempPath),
}

impl LocalHandle {
    pub fn path(&self) -> &Path {
        match self {
            LocalHandle::Borrowed(path) => path.as_path(),
            LocalHandle::Owned(temp) => &**temp,
        }
    }

    pub fn owns_file(&self) -> bool {
        matches!(self, LocalHandle::Owned(_))
    }

    /// Release the handle, reporting a failure to remove the temporary copy.
    ///
    /// Dropping the handle releases it as well, ignoring removal errors.
    pub fn close(self) -> io::Result<()> {
        match self {
            LocalHandle::Borrowed(_) => Ok(()),
            LocalHandle::Owned(temp) => {
                let path = temp.to_path_buf();
                temp.close()?;
                tracing::debug!(path = %path.display(), "Temporary copy removed");
                Ok(())
            }
        }
    }
}

impl AsRef<Path> for LocalHandle {
    fn as_ref(&self) -> &Path {
        self.path()
    }
}
