//! Uploaded image handling
//!
//! The image classifier reads from disk, so each request stores its image in
//! the upload directory under a fresh `<uuid><ext>` name. [`UploadArtifact`]
//! owns that file and removes it when dropped.

use crate::error::ValidationError;
use std::io::{self, Write};
use std::path::Path;
use tempfile::NamedTempFile;
use uuid::Uuid;

/// Extension used when the original file name has none
pub const DEFAULT_EXTENSION: &str = ".png";

/// Image bytes as received from the client
#[derive(Debug, Clone, PartialEq)]
pub struct ImagePayload {
    bytes: Vec<u8>,
    file_name: Option<String>,
    content_type: Option<String>,
}

impl ImagePayload {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            file_name: None,
            content_type: None,
        }
    }

    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = Some(file_name.into());
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Read an image from disk, inferring the content type from its extension
    pub fn from_path(path: &Path) -> io::Result<Self> {
        let bytes = std::fs::read(path)?;
        let mut payload = Self::new(bytes).with_content_type(content_type_for(path));
        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            payload = payload.with_file_name(name);
        }
        Ok(payload)
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn file_name(&self) -> Option<&str> {
        self.file_name.as_deref()
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    /// Reject payloads that are empty or declared as something other than an image
    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(content_type) = &self.content_type {
            if !content_type.trim().to_ascii_lowercase().starts_with("image/") {
                return Err(ValidationError::NotAnImage(content_type.clone()));
            }
        }
        if self.bytes.is_empty() {
            return Err(ValidationError::EmptyImage);
        }
        Ok(())
    }

    /// Extension of the original file name including the dot
    pub fn extension(&self) -> String {
        self.file_name
            .as_deref()
            .and_then(|name| Path::new(name).extension())
            .and_then(|ext| ext.to_str())
            .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
            .map(|ext| format!(".{}", ext.to_ascii_lowercase()))
            .unwrap_or_else(|| DEFAULT_EXTENSION.to_string())
    }
}

fn content_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "webp" => "image/webp",
        "tif" | "tiff" => "image/tiff",
        _ => "application/octet-stream",
    }
}

/// Per-request copy of the uploaded image, deleted on drop
#[derive(Debug)]
pub struct UploadArtifact {
    file: NamedTempFile,
}

impl UploadArtifact {
    /// Write `payload` into `upload_dir` under a fresh unique name
    pub fn create(upload_dir: &Path, payload: &ImagePayload) -> io::Result<Self> {
        std::fs::create_dir_all(upload_dir)?;

        let prefix = Uuid::new_v4().to_string();
        let extension = payload.extension();
        let mut file = tempfile::Builder::new()
            .prefix(&prefix)
            .suffix(&extension)
            .rand_bytes(0)
            .tempfile_in(upload_dir)?;

        file.write_all(payload.bytes())?;
        file.flush()?;

        Ok(Self { file })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn file_name(&self) -> String {
        self.path()
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Remove the file now, reporting any failure
    pub fn close(self) -> io::Result<()> {
        self.file.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_from_file_name() {
        let payload = ImagePayload::new(vec![1]).with_file_name("face.JPG");
        assert_eq!(payload.extension(), ".jpg");

        let payload = ImagePayload::new(vec![1]).with_file_name("face");
        assert_eq!(payload.extension(), DEFAULT_EXTENSION);

        let payload = ImagePayload::new(vec![1]);
        assert_eq!(payload.extension(), DEFAULT_EXTENSION);

        let payload = ImagePayload::new(vec![1]).with_file_name("evil.p/ng");
        assert_eq!(payload.extension(), DEFAULT_EXTENSION);
    }

    #[test]
    fn test_validation() {
        assert!(ImagePayload::new(vec![0x89])
            .with_content_type("image/png")
            .validate()
            .is_ok());
        assert!(ImagePayload::new(vec![0x89]).validate().is_ok());
        assert_eq!(
            ImagePayload::new(vec![1])
                .with_content_type("text/plain")
                .validate(),
            Err(ValidationError::NotAnImage("text/plain".to_string()))
        );
        assert_eq!(
            ImagePayload::new(Vec::new()).validate(),
            Err(ValidationError::EmptyImage)
        );
    }

    #[test]
    fn test_from_path_infers_content_type() {
        let dir = tempfile::tempdir().unwrap();
        let png = dir.path().join("face.png");
        std::fs::write(&png, [0x89, b'P', b'N', b'G']).unwrap();
        let payload = ImagePayload::from_path(&png).unwrap();
        assert_eq!(payload.content_type(), Some("image/png"));
        assert_eq!(payload.file_name(), Some("face.png"));
        assert_eq!(payload.bytes().len(), 4);

        let txt = dir.path().join("notes.txt");
        std::fs::write(&txt, "hello").unwrap();
        let payload = ImagePayload::from_path(&txt).unwrap();
        assert!(payload.validate().is_err());
    }

    #[test]
    fn test_artifact_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let upload_dir = dir.path().join("uploads");
        let payload = ImagePayload::new(vec![1, 2, 3]).with_file_name("face.jpeg");

        let artifact = UploadArtifact::create(&upload_dir, &payload).unwrap();
        let path = artifact.path().to_path_buf();
        assert!(path.exists());
        assert_eq!(std::fs::read(&path).unwrap(), vec![1, 2, 3]);

        let name = artifact.file_name();
        assert!(name.ends_with(".jpeg"));
        let stem = name.trim_end_matches(".jpeg");
        assert!(Uuid::parse_str(stem).is_ok(), "{stem} is not a uuid");

        artifact.close().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_artifact_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let payload = ImagePayload::new(vec![9]);

        let first = UploadArtifact::create(dir.path(), &payload).unwrap();
        let second = UploadArtifact::create(dir.path(), &payload).unwrap();
        assert_ne!(first.path(), second.path());

        let path = first.path().to_path_buf();
        drop(first);
        assert!(!path.exists());

        assert!(second.path().exists());
    }
}
