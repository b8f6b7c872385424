use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::MergerError;

/// Local directory standing in for blob storage. Artifacts of pull request
/// `number` land under `{root}/{prefix}/{number}/`.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
    prefix: String,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>, prefix: &str) -> Self {
        Self {
            root: root.into(),
            prefix: prefix.trim_matches('/').to_string(),
        }
    }

    /// Copy `files` (relative to `tree`) into the store and return the key of
    /// the first one, which is what gets reported back as the artifact location.
    pub fn store(
        &self,
        number: i64,
        tree: &Path,
        files: &[PathBuf],
    ) -> Result<String, MergerError> {
        let key_dir = format!("{}/{}", self.prefix, number);
        let target = self.root.join(&key_dir);
        std::fs::create_dir_all(&target)?;

        let mut location = key_dir.clone();
        for (index, file) in files.iter().enumerate() {
            let name = file.file_name().ok_or_else(|| {
                MergerError::Config(format!("Artifact path {} has no file name", file.display()))
            })?;
            std::fs::copy(tree.join(file), target.join(name))?;
            if index == 0 {
                location = format!("{}/{}", key_dir, name.to_string_lossy());
            }
        }

        info!("Stored {} artifacts for #{} under {}", files.len(), number, target.display());
        Ok(location)
    }
}
