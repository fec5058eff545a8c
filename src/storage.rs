//! On-disk document store
//!
//! Files live under `storage.root_dir`, grouped by namespace and named
//! `{uuid}.{ext}`. Database rows only ever hold the path relative to the root.

use axum::body::Bytes;
use futures::{Stream, StreamExt};
use sha2::{Digest, Sha256};
use std::fmt::Display;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::error::{AppError, AppResult};

/// Namespace for uploaded document content
pub const DOCUMENTS: &str = "documents";

/// Result of persisting an upload
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredFile {
    /// Relative to the store root, always `/`-separated
    pub relative_path: String,
    pub original_name: String,
    pub mime_type: String,
    pub size: i64,
    /// sha-256, hex
    pub checksum: String,
}

#[derive(Clone, Debug)]
pub struct FileStore {
    root: PathBuf,
    max_upload_size: u64,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>, max_upload_size: usize) -> Self {
        Self {
            root: root.into(),
            max_upload_size: max_upload_size as u64,
        }
    }

    /// Absolute path for a stored relative path, refusing traversal
    pub fn resolve(&self, relative: &str) -> AppResult<PathBuf> {
        if relative.trim_start_matches('/').is_empty() || !is_safe_path(relative) {
            return Err(AppError::BadRequest(format!("invalid stored path: {}", relative)));
        }
        Ok(self.root.join(relative.trim_start_matches('/')))
    }

    pub async fn save_bytes(
        &self,
        namespace: &str,
        original_name: &str,
        mime_type: Option<&str>,
        data: impl Into<Bytes>,
    ) -> AppResult<StoredFile> {
        let data = data.into();
        let stream = futures::stream::once(async move { Ok::<_, std::convert::Infallible>(data) });
        self.save_stream(namespace, original_name, mime_type, stream).await
    }

    /// Stream chunks into a temp file, then rename it into place.
    ///
    /// Size and checksum are computed while writing. The temp file is removed
    /// on every failure path.
    pub async fn save_stream<S, E>(
        &self,
        namespace: &str,
        original_name: &str,
        mime_type: Option<&str>,
        stream: S,
    ) -> AppResult<StoredFile>
    where
        S: Stream<Item = Result<Bytes, E>>,
        E: Display,
    {
        if !is_safe_filename(original_name) {
            return Err(AppError::BadRequest("invalid file name".to_string()));
        }
        if !is_safe_path(namespace) {
            return Err(AppError::BadRequest(format!("invalid namespace: {}", namespace)));
        }

        let dir = self.root.join(namespace);
        fs::create_dir_all(&dir).await?;

        let id = uuid::Uuid::new_v4().to_string();
        let tmp_path = dir.join(format!("{}.uploading", id));
        let file_name = match extension_of(original_name) {
            Some(ext) => format!("{}.{}", id, ext),
            None => id.clone(),
        };

        let mut file = fs::File::create(&tmp_path).await?;
        let mut hasher = Sha256::new();
        let mut size: u64 = 0;

        futures::pin_mut!(stream);
        while let Some(chunk) = stream.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    drop(file);
                    let _ = fs::remove_file(&tmp_path).await;
                    let msg = e.to_string();
                    tracing::error!("Failed to read upload chunk: {}", msg);
                    let lower = msg.to_lowercase();
                    if lower.contains("body limit") || lower.contains("length limit") {
                        return Err(self.too_large());
                    }
                    return Err(AppError::BadRequest(format!("upload interrupted: {}", msg)));
                }
            };

            size += chunk.len() as u64;
            if size > self.max_upload_size {
                tracing::warn!(
                    "Upload rejected: {} exceeds limit {}",
                    original_name,
                    self.max_upload_size
                );
                drop(file);
                let _ = fs::remove_file(&tmp_path).await;
                return Err(self.too_large());
            }

            hasher.update(&chunk);
            if let Err(e) = file.write_all(&chunk).await {
                tracing::error!("Failed to write chunk: {}", e);
                drop(file);
                let _ = fs::remove_file(&tmp_path).await;
                return Err(e.into());
            }
        }

        file.flush().await?;
        drop(file);

        if let Err(e) = fs::rename(&tmp_path, dir.join(&file_name)).await {
            tracing::error!("Failed to rename temp file: {}", e);
            let _ = fs::remove_file(&tmp_path).await;
            return Err(e.into());
        }

        let mime_type = match mime_type {
            Some(m) if !m.is_empty() && m != "application/octet-stream" => m.to_string(),
            _ => get_mime_type(original_name),
        };

        Ok(StoredFile {
            relative_path: format!("{}/{}", namespace.trim_matches('/'), file_name),
            original_name: original_name.to_string(),
            mime_type,
            size: size as i64,
            checksum: hex::encode(hasher.finalize()),
        })
    }

    pub async fn open(&self, relative: &str) -> AppResult<(fs::File, u64)> {
        let path = self.resolve(relative)?;
        let file = match fs::File::open(&path).await {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(AppError::NotFound(format!("stored file {}", relative)));
            }
            Err(e) => return Err(e.into()),
        };
        let len = file.metadata().await?.len();
        Ok((file, len))
    }

    pub async fn exists(&self, relative: &str) -> bool {
        match self.resolve(relative) {
            Ok(path) => fs::try_exists(path).await.unwrap_or(false),
            Err(_) => false,
        }
    }

    /// Best-effort cleanup of a file whose row was never written
    pub async fn discard(&self, relative: &str) {
        if let Ok(path) = self.resolve(relative) {
            if let Err(e) = fs::remove_file(&path).await {
                tracing::warn!("Failed to discard {}: {}", relative, e);
            }
        }
    }

    fn too_large(&self) -> AppError {
        AppError::PayloadTooLarge(format!(
            "File exceeds the {}MB upload limit",
            self.max_upload_size / (1024 * 1024)
        ))
    }
}

/// Stored path with its extension replaced by `.pdf`
pub fn preview_path_for(relative: &str) -> String {
    let path = Path::new(relative);
    match path.extension() {
        Some(_) => path.with_extension("pdf").to_string_lossy().replace('\\', "/"),
        None => format!("{}.pdf", relative),
    }
}

/// Lowercased alphanumeric extension of a user supplied file name
fn extension_of(name: &str) -> Option<String> {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty() && e.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|e| e.to_ascii_lowercase())
}

/// Check that a relative path stays inside its root
pub fn is_safe_path(path: &str) -> bool {
    let path = path.trim_start_matches('/');
    if path.is_empty() {
        return true;
    }
    // components() drops interior "." and empty segments, so check the raw split too
    path.split('/').all(|seg| !seg.is_empty() && seg != "." && seg != "..")
        && Path::new(path)
            .components()
            .all(|c| matches!(c, Component::Normal(_)))
}

/// Check if a filename is safe (no path separators)
pub fn is_safe_filename(name: &str) -> bool {
    if name.is_empty() {
        return false;
    }

    // Windows restricted characters
    if name.chars().any(|c| "<>:\"/\\|?*".contains(c)) {
        return false;
    }

    if name.chars().any(|c| c.is_control()) {
        return false;
    }

    // ".", "..", "..."
    if name.chars().all(|c| c == '.') {
        return false;
    }

    let path = Path::new(name);
    let mut components = path.components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(c)), None) => c == name,
        _ => false,
    }
}

pub fn get_mime_type(filename: &str) -> String {
    let ext = Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    match ext.as_str() {
        "pdf" => "application/pdf",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "xls" => "application/vnd.ms-excel",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "ppt" => "application/vnd.ms-powerpoint",
        "pptx" => "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        "odt" => "application/vnd.oasis.opendocument.text",
        "ods" => "application/vnd.oasis.opendocument.spreadsheet",
        "odp" => "application/vnd.oasis.opendocument.presentation",
        "rtf" => "application/rtf",
        "csv" => "text/csv",
        "txt" | "md" => "text/plain",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "zip" => "application/zip",
        _ => "application/octet-stream",
    }
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safe_path_rejects_traversal() {
        assert!(is_safe_path("documents/abc.pdf"));
        assert!(is_safe_path("/documents/abc.pdf"));
        assert!(!is_safe_path("../etc/passwd"));
        assert!(!is_safe_path("documents/../../etc"));
        assert!(!is_safe_path("documents/./x"));
        assert!(!is_safe_path("documents//x"));
        assert!(!is_safe_path("documents/x/."));
    }

    #[test]
    fn safe_filename_rules() {
        assert!(is_safe_filename("Budget.xlsx"));
        assert!(is_safe_filename("report v2.docx"));
        assert!(!is_safe_filename(""));
        assert!(!is_safe_filename(".."));
        assert!(!is_safe_filename("a/b.pdf"));
        assert!(!is_safe_filename("a\\b.pdf"));
        assert!(!is_safe_filename("bad\nname"));
    }

    #[test]
    fn preview_path_replaces_extension() {
        assert_eq!(preview_path_for("documents/abc.docx"), "documents/abc.pdf");
        assert_eq!(preview_path_for("documents/abc.pdf"), "documents/abc.pdf");
        assert_eq!(preview_path_for("documents/abc"), "documents/abc.pdf");
    }

    #[test]
    fn mime_types_for_office_documents() {
        assert_eq!(
            get_mime_type("Budget.XLSX"),
            "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
        );
        assert_eq!(get_mime_type("scan.pdf"), "application/pdf");
        assert_eq!(get_mime_type("noext"), "application/octet-stream");
    }

    #[tokio::test]
    async fn save_bytes_writes_file_and_checksum() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path(), 1024);

        let stored = store
            .save_bytes(DOCUMENTS, "Budget.xlsx", None, b"hello".to_vec())
            .await
            .unwrap();

        assert!(stored.relative_path.starts_with("documents/"));
        assert!(stored.relative_path.ends_with(".xlsx"));
        assert_eq!(stored.size, 5);
        assert_eq!(
            stored.checksum,
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
        assert_eq!(
            stored.mime_type,
            "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
        );

        let on_disk = std::fs::read(store.resolve(&stored.relative_path).unwrap()).unwrap();
        assert_eq!(on_disk, b"hello");
    }

    #[tokio::test]
    async fn save_stream_enforces_limit_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path(), 4);

        let chunks = futures::stream::iter(vec![
            Ok::<_, std::convert::Infallible>(Bytes::from_static(b"abc")),
            Ok(Bytes::from_static(b"def")),
        ]);
        let err = store
            .save_stream(DOCUMENTS, "big.pdf", None, chunks)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::PayloadTooLarge(_)));

        let leftovers = std::fs::read_dir(dir.path().join(DOCUMENTS)).unwrap().count();
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn open_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path(), 1024);
        assert!(matches!(
            store.open("documents/missing.pdf").await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            store.open("../secret").await,
            Err(AppError::BadRequest(_))
        ));
    }
}
