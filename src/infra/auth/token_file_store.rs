use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;

use crate::core::credentials::{Credential, CredentialError, CredentialStore};

/// JSON token cache on disk.
///
/// Writes go to a sibling temp file that is then renamed over the cache, so a crash
/// mid-write never leaves a truncated token behind.
pub struct TokenFileStore {
    path: PathBuf,
}

impl TokenFileStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "token.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

fn store_error(err: impl std::fmt::Display) -> CredentialError {
    CredentialError::Store(err.to_string())
}

#[async_trait]
impl CredentialStore for TokenFileStore {
    async fn load(&self) -> Result<Option<Credential>, CredentialError> {
        if !self.path.exists() {
            return Ok(None);
        }

        let text = fs::read_to_string(&self.path).await.map_err(store_error)?;
        let credential: Credential = serde_json::from_str(&text).map_err(store_error)?;
        Ok(Some(credential))
    }

    async fn save(&self, credential: &Credential) -> Result<(), CredentialError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await.map_err(store_error)?;
            }
        }

        let text = serde_json::to_string_pretty(credential).map_err(store_error)?;
        let temp = self.temp_path();
        fs::write(&temp, text).await.map_err(store_error)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&temp, std::fs::Permissions::from_mode(0o600))
                .await
                .map_err(store_error)?;
        }

        fs::rename(&temp, &self.path).await.map_err(store_error)
    }

    async fn clear(&self) -> Result<(), CredentialError> {
        match fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(store_error(e)),
        }
    }
}
