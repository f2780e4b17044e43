use std::path::{Path, PathBuf};

use bytes::Bytes;
use shared::domain::PDF_CONTENT_TYPE;
use tracing::debug;

use crate::error::ClientError;

#[derive(Debug, Clone)]
pub enum FileContent {
    Memory(Bytes),
    /// Read lazily when the upload needs the bytes.
    Disk(PathBuf),
}

/// A user-submitted file as handed to the tracker.
#[derive(Debug, Clone)]
pub struct SourceFile {
    name: String,
    size: u64,
    content_type: Option<String>,
    content: FileContent,
}

impl SourceFile {
    pub fn from_bytes(
        name: impl Into<String>,
        content_type: Option<&str>,
        bytes: impl Into<Bytes>,
    ) -> Self {
        let bytes = bytes.into();
        Self {
            name: name.into(),
            size: bytes.len() as u64,
            content_type: content_type.map(str::to_string),
            content: FileContent::Memory(bytes),
        }
    }

    /// Describes a file on disk without reading it; the content type is
    /// guessed from the extension.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, ClientError> {
        let path = path.as_ref();
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|source| ClientError::ReadFile {
                path: path.to_path_buf(),
                source,
            })?;
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let content_type = mime_guess::from_path(path)
            .first_raw()
            .map(str::to_string);

        Ok(Self {
            name,
            size: metadata.len(),
            content_type,
            content: FileContent::Disk(path.to_path_buf()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn content(&self) -> &FileContent {
        &self.content
    }

    pub fn is_pdf(&self) -> bool {
        self.content_type()
            .is_some_and(|ct| ct.trim().eq_ignore_ascii_case(PDF_CONTENT_TYPE))
    }

    pub async fn read_bytes(&self) -> Result<Bytes, ClientError> {
        match &self.content {
            FileContent::Memory(bytes) => Ok(bytes.clone()),
            FileContent::Disk(path) => tokio::fs::read(path)
                .await
                .map(Bytes::from)
                .map_err(|source| ClientError::ReadFile {
                    path: path.clone(),
                    source,
                }),
        }
    }
}

/// Re-labels non-PDF input as `application/pdf`, keeping the bytes and the
/// file name unchanged. PDF input is returned as is.
pub async fn normalize_for_upload(file: SourceFile) -> Result<SourceFile, ClientError> {
    if file.is_pdf() {
        return Ok(file);
    }

    debug!(
        file = %file.name,
        declared = file.content_type.as_deref().unwrap_or("<none>"),
        "normalizing upload content type"
    );
    let bytes = file.read_bytes().await?;
    Ok(SourceFile {
        name: file.name,
        size: bytes.len() as u64,
        content_type: Some(PDF_CONTENT_TYPE.to_string()),
        content: FileContent::Memory(bytes),
    })
}

#[cfg(test)]
mod tests {
    use std::{
        env, fs,
        time::{SystemTime, UNIX_EPOCH},
    };

    use super::*;

    #[tokio::test]
    async fn pdf_input_passes_through_untouched() {
        let file = SourceFile::from_bytes("policy.pdf", Some("application/pdf"), &b"%PDF-1.7"[..]);
        let normalized = normalize_for_upload(file).await.expect("normalize");
        assert_eq!(normalized.content_type(), Some(PDF_CONTENT_TYPE));
        assert!(matches!(normalized.content(), FileContent::Memory(_)));
    }

    #[tokio::test]
    async fn other_types_are_relabelled_with_identical_bytes() {
        let payload = vec![0u8, 159, 146, 150, 255];
        let file =
            SourceFile::from_bytes("scan.bin", Some("application/octet-stream"), payload.clone());
        let normalized = normalize_for_upload(file).await.expect("normalize");

        assert_eq!(normalized.name(), "scan.bin");
        assert_eq!(normalized.content_type(), Some(PDF_CONTENT_TYPE));
        assert_eq!(normalized.read_bytes().await.expect("bytes").to_vec(), payload);
    }

    #[tokio::test]
    async fn missing_content_type_is_normalized_too() {
        let file = SourceFile::from_bytes("notes", None, &b"abc"[..]);
        assert!(!file.is_pdf());
        let normalized = normalize_for_upload(file).await.expect("normalize");
        assert!(normalized.is_pdf());
    }

    #[tokio::test]
    async fn disk_files_are_described_then_read_lazily() {
        let suffix = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos();
        let dir = env::temp_dir().join(format!("classifier_source_{suffix}"));
        fs::create_dir_all(&dir).expect("temp dir");
        let path = dir.join("claims.pdf");
        fs::write(&path, b"%PDF-1.4 loss run").expect("write");

        let file = SourceFile::from_path(&path).await.expect("describe");
        assert_eq!(file.name(), "claims.pdf");
        assert_eq!(file.size(), 17);
        assert!(file.is_pdf());
        assert_eq!(
            file.read_bytes().await.expect("read").as_ref(),
            b"%PDF-1.4 loss run"
        );

        fs::remove_dir_all(dir).expect("cleanup");
    }

    #[tokio::test]
    async fn unreadable_disk_file_surfaces_read_error() {
        let file = SourceFile::from_bytes("x", None, Bytes::new());
        let missing = SourceFile {
            content: FileContent::Disk(PathBuf::from("/definitely/not/here.pdf")),
            ..file
        };
        let err = normalize_for_upload(missing).await.expect_err("must fail");
        assert!(matches!(err, ClientError::ReadFile { .. }));
    }
}
