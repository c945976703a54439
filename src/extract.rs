//! Text extraction for stored uploads.
//!
//! | Format | Method |
//! |--------|--------|
//! | PDF | `pdf-extract`, page by page; each page's text followed by `\n` |
//! | Image | decoded with `image` to reject corrupt files, then OCR via [`OcrEngine`] |
//! | Plain text | read verbatim as UTF-8 |
//!
//! Extraction degrades instead of failing where the content is merely
//! unreadable: an unparseable PDF yields empty text, and OCR problems yield
//! a bracketed sentinel string. [`with_fallback`] turns empty output into a
//! filename placeholder so every document gets at least one chunk.
//! Only I/O errors and non-UTF-8 text files are reported as [`ExtractError`].

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use docvault_core::models::DocumentFormat;

use crate::config::ExtractConfig;

pub const OCR_UNAVAILABLE_TEXT: &str =
    "[Image content cannot be read - Tesseract OCR is not installed on the server]";

const UNREADABLE_NOTE: &str = "[Content unreadable - Scanned document or Image without OCR]";

/// Well-known tesseract install locations, probed in order when
/// `[extract].tesseract_cmd` is not set.
const TESSERACT_CANDIDATES: &[&str] = &[
    "/usr/bin/tesseract",
    "/usr/local/bin/tesseract",
    "/opt/homebrew/bin/tesseract",
    r"C:\Program Files\Tesseract-OCR\tesseract.exe",
    r"C:\Program Files (x86)\Tesseract-OCR\tesseract.exe",
    r"C:\Tesseract-OCR\tesseract.exe",
];

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{} is not valid UTF-8 text", .path.display())]
    InvalidUtf8 { path: PathBuf },
}

#[derive(Debug, Error)]
pub enum OcrError {
    #[error("OCR engine is not installed")]
    Unavailable,
    #[error("{0}")]
    Failed(String),
}

/// Optical character recognition over an image file.
#[async_trait]
pub trait OcrEngine: Send + Sync {
    async fn image_to_text(&self, path: &Path) -> Result<String, OcrError>;
}

/// Runs `tesseract <image> stdout`.
pub struct TesseractOcr {
    cmd: PathBuf,
}

impl TesseractOcr {
    pub fn new(cmd: impl Into<PathBuf>) -> Self {
        Self { cmd: cmd.into() }
    }

    /// Use the configured command, or probe well-known locations and fall
    /// back to `tesseract` on `PATH`.
    pub fn from_config(config: &ExtractConfig) -> Self {
        match &config.tesseract_cmd {
            Some(cmd) => Self::new(cmd),
            None => Self::new(probe_tesseract()),
        }
    }

    pub fn command(&self) -> &Path {
        &self.cmd
    }
}

fn probe_tesseract() -> PathBuf {
    let mut candidates: Vec<PathBuf> = TESSERACT_CANDIDATES.iter().map(PathBuf::from).collect();
    if let Ok(local) = std::env::var("LOCALAPPDATA") {
        candidates.push(Path::new(&local).join(r"Tesseract-OCR\tesseract.exe"));
        candidates.push(Path::new(&local).join(r"Programs\Tesseract-OCR\tesseract.exe"));
    }
    for candidate in candidates {
        if candidate.is_file() {
            debug!(path = %candidate.display(), "found tesseract");
            return candidate;
        }
    }
    PathBuf::from("tesseract")
}

#[async_trait]
impl OcrEngine for TesseractOcr {
    async fn image_to_text(&self, path: &Path) -> Result<String, OcrError> {
        let output = tokio::process::Command::new(&self.cmd)
            .arg(path)
            .arg("stdout")
            .output()
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => OcrError::Unavailable,
                _ => OcrError::Failed(e.to_string()),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(OcrError::Failed(format!(
                "tesseract exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Dispatches extraction by [`DocumentFormat`].
#[derive(Clone)]
pub struct Extractor {
    ocr: Arc<dyn OcrEngine>,
}

impl Extractor {
    pub fn new(ocr: Arc<dyn OcrEngine>) -> Self {
        Self { ocr }
    }

    pub async fn extract(&self, path: &Path, format: DocumentFormat) -> Result<String, ExtractError> {
        debug!(path = %path.display(), format = %format, "extracting text");
        match format {
            DocumentFormat::Pdf => extract_pdf(path).await,
            DocumentFormat::Image => self.extract_image(path).await,
            DocumentFormat::PlainText => extract_plain_text(path).await,
        }
    }

    async fn extract_image(&self, path: &Path) -> Result<String, ExtractError> {
        let bytes = read_file(path).await?;

        let decoded = tokio::task::spawn_blocking(move || {
            image::load_from_memory(&bytes).map(|_| ()).map_err(|e| e.to_string())
        })
        .await
        .unwrap_or_else(|e| Err(e.to_string()));
        if let Err(reason) = decoded {
            warn!(path = %path.display(), %reason, "image could not be decoded");
            return Ok(ocr_error_text(&reason));
        }

        match self.ocr.image_to_text(path).await {
            Ok(text) => Ok(text),
            Err(OcrError::Unavailable) => {
                warn!("tesseract not found; image text not extracted");
                Ok(OCR_UNAVAILABLE_TEXT.to_string())
            }
            Err(OcrError::Failed(reason)) => {
                warn!(path = %path.display(), %reason, "OCR failed");
                Ok(ocr_error_text(&reason))
            }
        }
    }
}

pub fn ocr_error_text(reason: &str) -> String {
    format!("[Error extracting text from image: {}]", reason)
}

async fn read_file(path: &Path) -> Result<Vec<u8>, ExtractError> {
    tokio::fs::read(path).await.map_err(|source| ExtractError::Io {
        path: path.to_path_buf(),
        source,
    })
}

async fn extract_pdf(path: &Path) -> Result<String, ExtractError> {
    let bytes = read_file(path).await?;

    let pages = tokio::task::spawn_blocking(move || {
        pdf_extract::extract_text_from_mem_by_pages(&bytes).map_err(|e| e.to_string())
    })
    .await
    .unwrap_or_else(|e| Err(format!("PDF parser panicked: {}", e)));

    match pages {
        Ok(pages) => Ok(join_pages(&pages)),
        Err(reason) => {
            warn!(path = %path.display(), %reason, "PDF text extraction failed");
            Ok(String::new())
        }
    }
}

fn join_pages(pages: &[String]) -> String {
    let mut text = String::new();
    for page in pages {
        text.push_str(page);
        text.push('\n');
    }
    text
}

async fn extract_plain_text(path: &Path) -> Result<String, ExtractError> {
    let bytes = read_file(path).await?;
    String::from_utf8(bytes).map_err(|_| ExtractError::InvalidUtf8 {
        path: path.to_path_buf(),
    })
}

/// Replace empty or whitespace-only text with a filename placeholder.
pub fn with_fallback(text: String, filename: &str) -> String {
    if text.trim().is_empty() {
        let name = Path::new(filename)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(filename);
        format!("Filename: {}\n{}", name, UNREADABLE_NOTE)
    } else {
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    struct FixedOcr(Result<String, fn() -> OcrError>);

    #[async_trait]
    impl OcrEngine for FixedOcr {
        async fn image_to_text(&self, _path: &Path) -> Result<String, OcrError> {
            match &self.0 {
                Ok(t) => Ok(t.clone()),
                Err(make) => Err(make()),
            }
        }
    }

    fn extractor(result: Result<String, fn() -> OcrError>) -> Extractor {
        Extractor::new(Arc::new(FixedOcr(result)))
    }

    fn write_png(dir: &TempDir) -> PathBuf {
        let path = dir.path().join("scan.png");
        image::RgbImage::new(8, 8).save(&path).unwrap();
        path
    }

    #[test]
    fn test_fallback_only_for_blank_text() {
        assert_eq!(
            with_fallback("  \n\t".to_string(), "/uploads/lab.png"),
            "Filename: lab.png\n[Content unreadable - Scanned document or Image without OCR]"
        );
        assert_eq!(with_fallback("real text".to_string(), "a.png"), "real text");
    }

    #[test]
    fn test_pages_each_end_with_newline() {
        let pages = vec!["one".to_string(), String::new(), "three".to_string()];
        assert_eq!(join_pages(&pages), "one\n\nthree\n");
    }

    #[tokio::test]
    async fn test_plain_text_verbatim() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("note.txt");
        std::fs::write(&path, "Patient has diabetes.").unwrap();
        let text = extractor(Ok(String::new()))
            .extract(&path, DocumentFormat::PlainText)
            .await
            .unwrap();
        assert_eq!(text, "Patient has diabetes.");
    }

    #[tokio::test]
    async fn test_invalid_utf8_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("bad.txt");
        std::fs::write(&path, [0xff, 0xfe, 0x00]).unwrap();
        let err = extractor(Ok(String::new()))
            .extract(&path, DocumentFormat::PlainText)
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::InvalidUtf8 { .. }));
    }

    #[tokio::test]
    async fn test_missing_file_is_io_error() {
        let err = extractor(Ok(String::new()))
            .extract(Path::new("/nonexistent/x.txt"), DocumentFormat::PlainText)
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::Io { .. }));
    }

    #[tokio::test]
    async fn test_corrupt_pdf_degrades_to_empty() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("broken.pdf");
        std::fs::write(&path, b"not a pdf").unwrap();
        let text = extractor(Ok(String::new()))
            .extract(&path, DocumentFormat::Pdf)
            .await
            .unwrap();
        assert!(text.trim().is_empty());
    }

    #[tokio::test]
    async fn test_image_ocr_text_returned() {
        let tmp = TempDir::new().unwrap();
        let path = write_png(&tmp);
        let text = extractor(Ok("HbA1c 7.2%".to_string()))
            .extract(&path, DocumentFormat::Image)
            .await
            .unwrap();
        assert_eq!(text, "HbA1c 7.2%");
    }

    #[tokio::test]
    async fn test_ocr_unavailable_sentinel() {
        let tmp = TempDir::new().unwrap();
        let path = write_png(&tmp);
        let text = extractor(Err(|| OcrError::Unavailable))
            .extract(&path, DocumentFormat::Image)
            .await
            .unwrap();
        assert_eq!(text, OCR_UNAVAILABLE_TEXT);
    }

    #[tokio::test]
    async fn test_ocr_failure_sentinel() {
        let tmp = TempDir::new().unwrap();
        let path = write_png(&tmp);
        let text = extractor(Err(|| OcrError::Failed("bad dpi".to_string())))
            .extract(&path, DocumentFormat::Image)
            .await
            .unwrap();
        assert_eq!(text, "[Error extracting text from image: bad dpi]");
    }

    #[tokio::test]
    async fn test_corrupt_image_reports_error_sentinel() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("broken.jpg");
        std::fs::write(&path, b"definitely not a jpeg").unwrap();
        let text = extractor(Ok("unused".to_string()))
            .extract(&path, DocumentFormat::Image)
            .await
            .unwrap();
        assert!(text.starts_with("[Error extracting text from image: "));
    }

    #[tokio::test]
    async fn test_missing_tesseract_binary_is_unavailable() {
        let tmp = TempDir::new().unwrap();
        let path = write_png(&tmp);
        let ocr = TesseractOcr::new(tmp.path().join("no-such-tesseract"));
        assert!(matches!(
            ocr.image_to_text(&path).await,
            Err(OcrError::Unavailable)
        ));
    }

    #[test]
    fn test_configured_command_wins() {
        let ocr = TesseractOcr::from_config(&ExtractConfig {
            tesseract_cmd: Some(PathBuf::from("/opt/ocr/tesseract")),
        });
        assert_eq!(ocr.command(), Path::new("/opt/ocr/tesseract"));
    }
}
