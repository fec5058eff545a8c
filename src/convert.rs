//! Office to PDF conversion.
//!
//! Runs an external converter (LibreOffice `soffice` by default) as a child
//! process with a wall-clock timeout. The converter writes
//! `{output_dir}/{stem}.pdf`; that file is then moved to the requested output
//! path. Conversion failures never fail the caller's request: the document
//! simply ends up without a preview.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::process::Command;

use crate::config::ConverterConfig;
use crate::storage::{preview_path_for, FileStore};

#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("Conversion timed out after {0:?}")]
    Timeout(Duration),

    #[error("Conversion failed with exit code {code}: {stderr}")]
    ProcessFailed { code: i32, stderr: String },

    #[error("Expected output file not created: {0}")]
    OutputMissing(String),

    #[error("IO error during conversion: {0}")]
    Io(#[from] std::io::Error),

    #[error("Conversion is disabled")]
    Disabled,
}

/// Produces a PDF rendition of an office document
#[async_trait]
pub trait Converter: Send + Sync {
    /// Convert `input` and place the PDF at `output`; returns `output`
    async fn to_pdf(&self, input: &Path, output: &Path) -> Result<PathBuf, ConvertError>;
}

/// Command line converter
#[derive(Debug, Clone)]
pub struct OfficeConverter {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl OfficeConverter {
    pub fn new(program: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            timeout,
        }
    }

    pub fn from_config(config: &ConverterConfig) -> Option<Self> {
        if !config.enabled {
            return None;
        }
        Some(Self::new(
            config.program.clone(),
            config.args.clone(),
            Duration::from_secs(config.timeout_secs),
        ))
    }

    /// Substitute `{input}`, `{output_dir}` and `{stem}` placeholders
    pub fn substitute_args(&self, input: &Path, output_dir: &Path) -> Vec<String> {
        let input_str = input.to_string_lossy();
        let output_dir_str = output_dir.to_string_lossy();
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();

        self.args
            .iter()
            .map(|arg| {
                arg.replace("{input}", &input_str)
                    .replace("{output_dir}", &output_dir_str)
                    .replace("{stem}", &stem)
            })
            .collect()
    }

    async fn run(&self, input: &Path, job_dir: &Path) -> Result<(), ConvertError> {
        let args = self.substitute_args(input, job_dir);
        let start = Instant::now();

        tracing::info!(
            "Executing conversion: program='{}', args={:?}",
            self.program,
            args
        );

        let mut cmd = Command::new(&self.program);
        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                tracing::error!("Failed to start converter '{}': {}", self.program, e);
                return Err(ConvertError::Io(e));
            }
            Err(_) => {
                tracing::error!(
                    "Conversion timed out after {:?}: input='{}'",
                    self.timeout,
                    input.display()
                );
                return Err(ConvertError::Timeout(self.timeout));
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        if !output.status.success() {
            let code = output.status.code().unwrap_or(-1);
            tracing::error!(
                "Conversion failed: input='{}', exit_code={}, stdout='{}', stderr='{}'",
                input.display(),
                code,
                stdout.chars().take(500).collect::<String>(),
                stderr.chars().take(500).collect::<String>()
            );
            return Err(ConvertError::ProcessFailed {
                code,
                stderr: stderr.chars().take(2000).collect(),
            });
        }

        tracing::debug!(
            "Converter finished in {}ms: stdout='{}'",
            start.elapsed().as_millis(),
            stdout.trim()
        );
        Ok(())
    }
}

#[async_trait]
impl Converter for OfficeConverter {
    async fn to_pdf(&self, input: &Path, output: &Path) -> Result<PathBuf, ConvertError> {
        let parent = output.parent().unwrap_or_else(|| Path::new("."));
        // Private job directory so the converter's `{stem}.pdf` cannot clobber siblings
        let job_dir = parent.join(format!(".convert-{}", uuid::Uuid::new_v4()));
        tokio::fs::create_dir_all(&job_dir).await?;

        let result = async {
            self.run(input, &job_dir).await?;

            let stem = input
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default();
            let produced = job_dir.join(format!("{}.pdf", stem));
            if !tokio::fs::try_exists(&produced).await.unwrap_or(false) {
                tracing::warn!(
                    "Converter succeeded but produced no file: '{}'",
                    produced.display()
                );
                return Err(ConvertError::OutputMissing(produced.display().to_string()));
            }

            tokio::fs::rename(&produced, output).await?;
            Ok(output.to_path_buf())
        }
        .await;

        if let Err(e) = tokio::fs::remove_dir_all(&job_dir).await {
            tracing::warn!("Failed to clean up '{}': {}", job_dir.display(), e);
        }

        result
    }
}

/// Office formats the converter understands
pub fn needs_conversion(mime_type: &str) -> bool {
    matches!(
        mime_type,
        "application/msword"
            | "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            | "application/vnd.ms-excel"
            | "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
            | "application/vnd.ms-powerpoint"
            | "application/vnd.openxmlformats-officedocument.presentationml.presentation"
            | "application/vnd.oasis.opendocument.text"
            | "application/vnd.oasis.opendocument.spreadsheet"
            | "application/vnd.oasis.opendocument.presentation"
            | "application/rtf"
    )
}

/// Render the preview for a stored file.
///
/// PDFs preview as themselves. `Ok(None)` means the format has no preview.
pub async fn render_preview(
    converter: Option<&dyn Converter>,
    store: &FileStore,
    file_path: &str,
    mime_type: &str,
) -> Result<Option<String>, ConvertError> {
    if mime_type == "application/pdf" {
        return Ok(Some(file_path.to_string()));
    }
    if !needs_conversion(mime_type) {
        return Ok(None);
    }
    let converter = converter.ok_or(ConvertError::Disabled)?;

    let preview = preview_path_for(file_path);
    let (input, output) = match (store.resolve(file_path), store.resolve(&preview)) {
        (Ok(input), Ok(output)) => (input, output),
        _ => {
            return Err(ConvertError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("invalid stored path: {}", file_path),
            )))
        }
    };

    converter.to_pdf(&input, &output).await?;
    Ok(Some(preview))
}

/// Like [`render_preview`], but a failed conversion only costs the preview.
///
/// Returns None when there is no converter, the format is not convertible, or
/// the conversion failed.
pub async fn build_preview(
    converter: Option<&dyn Converter>,
    store: &FileStore,
    file_path: &str,
    mime_type: &str,
) -> Option<String> {
    match render_preview(converter, store, file_path, mime_type).await {
        Ok(preview) => preview,
        Err(ConvertError::Disabled) => None,
        Err(e) => {
            tracing::warn!("Preview generation failed for {}: {}", file_path, e);
            None
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    /// Stand-in converter: copies the input to `{output_dir}/{stem}.pdf`
    fn copying_converter() -> OfficeConverter {
        OfficeConverter::new(
            "sh",
            args(&["-c", "cp \"$0\" \"$1/$2.pdf\"", "{input}", "{output_dir}", "{stem}"]),
            Duration::from_secs(10),
        )
    }

    #[test]
    fn test_substitute_args() {
        let converter = OfficeConverter::from_config(&ConverterConfig::default()).unwrap();
        let args = converter.substitute_args(Path::new("/data/documents/a.docx"), Path::new("/tmp/job"));
        assert_eq!(
            args,
            vec!["--headless", "--convert-to", "pdf", "--outdir", "/tmp/job", "/data/documents/a.docx"]
        );
    }

    #[test]
    fn test_disabled_config_has_no_converter() {
        let config = ConverterConfig {
            enabled: false,
            ..ConverterConfig::default()
        };
        assert!(OfficeConverter::from_config(&config).is_none());
    }

    #[tokio::test]
    async fn test_successful_conversion_moves_output() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("Budget.xlsx");
        std::fs::write(&input, b"sheet").unwrap();
        let output = dir.path().join("Budget.pdf");

        let result = copying_converter().to_pdf(&input, &output).await.unwrap();

        assert_eq!(result, output);
        assert_eq!(std::fs::read(&output).unwrap(), b"sheet");
        // job directory is gone
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 2);
    }

    #[tokio::test]
    async fn test_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let converter = OfficeConverter::new("sleep", args(&["5"]), Duration::from_millis(200));

        let err = converter
            .to_pdf(&dir.path().join("a.docx"), &dir.path().join("a.pdf"))
            .await
            .unwrap_err();
        assert!(matches!(err, ConvertError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_non_zero_exit_captures_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let converter = OfficeConverter::new(
            "sh",
            args(&["-c", "echo boom >&2; exit 3"]),
            Duration::from_secs(10),
        );

        let err = converter
            .to_pdf(&dir.path().join("a.docx"), &dir.path().join("a.pdf"))
            .await
            .unwrap_err();
        match err {
            ConvertError::ProcessFailed { code, stderr } => {
                assert_eq!(code, 3);
                assert!(stderr.contains("boom"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_missing_output() {
        let dir = tempfile::tempdir().unwrap();
        let converter = OfficeConverter::new("true", Vec::new(), Duration::from_secs(10));

        let err = converter
            .to_pdf(&dir.path().join("a.docx"), &dir.path().join("a.pdf"))
            .await
            .unwrap_err();
        assert!(matches!(err, ConvertError::OutputMissing(_)));
    }

    #[tokio::test]
    async fn test_build_preview_degrades_to_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path(), 1024);
        let stored = store
            .save_bytes("documents", "a.docx", None, b"doc".to_vec())
            .await
            .unwrap();

        let failing = OfficeConverter::new("false", Vec::new(), Duration::from_secs(10));
        let preview =
            build_preview(Some(&failing), &store, &stored.relative_path, &stored.mime_type).await;
        assert_eq!(preview, None);

        let working = copying_converter();
        let preview =
            build_preview(Some(&working), &store, &stored.relative_path, &stored.mime_type).await;
        let preview = preview.unwrap();
        assert!(preview.ends_with(".pdf"));
        assert!(store.exists(&preview).await);

        let pdf = build_preview(None, &store, "documents/x.pdf", "application/pdf").await;
        assert_eq!(pdf.as_deref(), Some("documents/x.pdf"));
        assert_eq!(build_preview(None, &store, "documents/x.png", "image/png").await, None);
    }
}
