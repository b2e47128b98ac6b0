use std::io::ErrorKind;
use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use uuid::Uuid;

pub const AVATAR_URL_PREFIX: &str = "/uploads/avatars/";
pub const ALLOWED_AVATAR_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp"];

#[async_trait]
pub trait AvatarStorage: Send + Sync + 'static {
    async fn save(&self, file_name: &str, bytes: Vec<u8>) -> Result<()>;

    /// Removing a file that does not exist is not an error.
    async fn delete(&self, file_name: &str) -> Result<()>;
}

pub struct LocalAvatarStorage {
    root: PathBuf,
}

impl LocalAvatarStorage {
    pub fn new(upload_dir: impl Into<PathBuf>) -> Self {
        Self {
            root: upload_dir.into().join("avatars"),
        }
    }
}

#[async_trait]
impl AvatarStorage for LocalAvatarStorage {
    async fn save(&self, file_name: &str, bytes: Vec<u8>) -> Result<()> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .with_context(|| format!("failed to create {}", self.root.display()))?;
        let path = self.root.join(file_name);
        tokio::fs::write(&path, bytes)
            .await
            .with_context(|| format!("failed to write avatar {}", path.display()))?;
        Ok(())
    }

    async fn delete(&self, file_name: &str) -> Result<()> {
        let path = self.root.join(file_name);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => {
                Err(err).with_context(|| format!("failed to delete avatar {}", path.display()))
            }
        }
    }
}

/// Saves the file, then runs `record`. When `record` fails the file is removed
/// again and the record error is returned.
pub async fn save_and_record<T, E, F>(
    storage: &dyn AvatarStorage,
    file_name: &str,
    bytes: Vec<u8>,
    record: F,
) -> std::result::Result<T, E>
where
    F: FnOnce() -> std::result::Result<T, E>,
    E: From<anyhow::Error>,
{
    storage.save(file_name, bytes).await.map_err(E::from)?;
    match record() {
        Ok(value) => Ok(value),
        Err(err) => {
            if let Err(cleanup_err) = storage.delete(file_name).await {
                tracing::warn!(file = %file_name, error = %cleanup_err, "failed to remove orphaned avatar");
            }
            Err(err)
        }
    }
}

/// Lowercased extension of an uploaded avatar, if it is an accepted image type.
pub fn avatar_extension(original_name: &str) -> Result<String, String> {
    let extension = original_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.trim().to_ascii_lowercase())
        .filter(|ext| !ext.is_empty())
        .ok_or_else(|| "avatar file must have an extension".to_string())?;

    if ALLOWED_AVATAR_EXTENSIONS.contains(&extension.as_str()) {
        Ok(extension)
    } else {
        Err(format!(
            "unsupported avatar type '.{extension}'. Allowed: {}",
            ALLOWED_AVATAR_EXTENSIONS.join(", ")
        ))
    }
}

pub fn avatar_file_name(target_user_id: Uuid, unix_millis: i64, extension: &str) -> String {
    format!("avatar-{target_user_id}-{unix_millis}.{extension}")
}

pub fn avatar_url(file_name: &str) -> String {
    format!("{AVATAR_URL_PREFIX}{file_name}")
}

/// File name behind a stored avatar URL. Anything outside the avatar
/// directory is ignored.
pub fn avatar_file_from_url(url: &str) -> Option<&str> {
    let name = url.strip_prefix(AVATAR_URL_PREFIX)?;
    let valid = !name.is_empty()
        && !name.contains('/')
        && !name.contains('\\')
        && !name.contains("..");
    valid.then_some(name)
}
