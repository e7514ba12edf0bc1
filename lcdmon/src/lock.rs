use log::debug;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Marker file whose existence means the display has been initialized by a live session.
///
/// This is advisory only. Two daemons racing between a successful probe and [Self::acquire] can
/// both initialize the display.
#[derive(Debug, Clone)]
pub struct OwnershipLock {
    path: PathBuf,
}

impl OwnershipLock {
    pub fn new(path: impl AsRef<Path>) -> Self {
        OwnershipLock {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_held(&self) -> bool {
        self.path.exists()
    }

    pub fn acquire(&self) -> std::io::Result<()> {
        debug!("Creating lock {}", self.path.display());
        fs::write(&self.path, " ")
    }

    /// Removes the marker. Releasing a lock nobody holds is not an error.
    pub fn release(&self) -> std::io::Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                debug!("Removed lock {}", self.path.display());
                Ok(())
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err),
        }
    }
}
