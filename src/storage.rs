use std::path::{Component, Path, PathBuf};

use anyhow::Context;
use uuid::Uuid;

/// Image formats the meter pipeline accepts.
const ALLOWED_EXTENSIONS: &[&str] = &["bmp", "jpg", "jpeg", "png", "tiff", "tif", "pnm"];

/// Local upload directory holding the stored meter images, flat, with
/// randomly generated names.
#[derive(Debug, Clone)]
pub struct UploadStore {
    root: PathBuf,
}

impl UploadStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub async fn ensure_root(&self) -> anyhow::Result<()> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .with_context(|| format!("create upload dir {}", self.root.display()))
    }

    /// Lowercased extension of `filename` if it is one we accept.
    pub fn allowed_extension(filename: &str) -> Option<String> {
        let (_, ext) = filename.rsplit_once('.')?;
        let ext = ext.to_ascii_lowercase();
        ALLOWED_EXTENSIONS.contains(&ext.as_str()).then_some(ext)
    }

    /// Write `bytes` under a fresh random name, preserving the extension.
    /// Returns the generated filename.
    pub async fn save(&self, ext: &str, bytes: &[u8]) -> anyhow::Result<String> {
        let name = format!("{}.{}", Uuid::new_v4(), ext);
        let path = self.root.join(&name);
        tokio::fs::write(&path, bytes)
            .await
            .with_context(|| format!("write upload {}", path.display()))?;
        Ok(name)
    }

    /// Best-effort removal of a stored image (cleanup after OCR failure).
    pub async fn delete(&self, name: &str) {
        if let Some(path) = self.resolve(name) {
            if let Err(e) = tokio::fs::remove_file(&path).await {
                tracing::warn!(error = %e, file = %path.display(), "failed to remove upload");
            }
        }
    }

    /// Resolve a stored filename strictly inside the upload directory.
    ///
    /// Rejects anything that is not a single plain path component, so
    /// traversal sequences, separators and absolute paths never escape the
    /// root. Existence is the caller's concern.
    pub fn resolve(&self, name: &str) -> Option<PathBuf> {
        if name.is_empty() {
            return None;
        }
        let mut components = Path::new(name).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(part)), None) if part == name => Some(self.root.join(name)),
            _ => None,
        }
    }

    pub fn guess_mime(name: &str) -> &'static str {
        match name.rsplit_once('.').map(|(_, e)| e.to_ascii_lowercase()) {
            Some(ext) => match ext.as_str() {
                "jpg" | "jpeg" => "image/jpeg",
                "png" => "image/png",
                "bmp" => "image/bmp",
                "tiff" | "tif" => "image/tiff",
                "pnm" => "image/x-portable-anymap",
                _ => "application/octet-stream",
            },
            None => "application/octet-stream",
        }
    }
}
