use std::path::{Path, PathBuf};

use tracing::{debug, error};

/// Changes the process working directory for as long as it is held, and
/// changes it back when dropped, whichever way the scope is left.
pub struct WorkingDirectory {
    original: PathBuf,
}

impl WorkingDirectory {
    pub fn enter(path: &Path) -> std::io::Result<Self> {
        let original = std::env::current_dir()?;
        std::env::set_current_dir(path)?;
        debug!("Entered {} (from {})", path.display(), original.display());
        Ok(Self { original })
    }
}

impl Drop for WorkingDirectory {
    fn drop(&mut self) {
        if let Err(e) = std::env::set_current_dir(&self.original) {
            error!(
                "Failed to restore working directory {}: {}",
                self.original.display(),
                e
            );
        }
    }
}
