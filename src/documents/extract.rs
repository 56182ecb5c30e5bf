//! Text extraction from uploaded files

use std::path::{Path, PathBuf};

use super::ocr::OcrEngine;
use crate::cache::CacheService;
use crate::errors::{LexiError, Result};

/// Supported upload kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Pdf,
    Image,
}

/// Classify by extension (case-insensitive)
pub fn detect_kind(path: &Path) -> Result<FileKind> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "pdf" => Ok(FileKind::Pdf),
        "png" | "jpg" | "jpeg" => Ok(FileKind::Image),
        "" => Err(LexiError::UnsupportedFileType(path.display().to_string())),
        other => Err(LexiError::UnsupportedFileType(format!(".{}", other))),
    }
}

/// PDF text layer first, OCR when it is blank; results cached by file fingerprint
#[derive(Clone)]
pub struct TextExtractor {
    ocr: OcrEngine,
    cache: Option<CacheService>,
}

impl TextExtractor {
    pub fn new(ocr: OcrEngine) -> Self {
        Self { ocr, cache: None }
    }

    pub fn with_cache(mut self, cache: CacheService) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Extract text from a PDF or image
    pub async fn extract(&self, path: &Path) -> Result<String> {
        let kind = detect_kind(path)?;

        if let Some(cache) = &self.cache {
            if let Some(text) = cache.cached_extraction(path).await {
                tracing::debug!(path = %path.display(), "using cached extraction");
                return Ok(text);
            }
        }

        let text = match kind {
            FileKind::Pdf => self.extract_pdf(path).await?,
            FileKind::Image => self.ocr.ocr_image(path).await?,
        };

        if let Some(cache) = &self.cache {
            cache.cache_extraction(path, &text).await;
        }
        Ok(text)
    }

    async fn extract_pdf(&self, path: &Path) -> Result<String> {
        let owned: PathBuf = path.to_path_buf();
        let layer = tokio::task::spawn_blocking(move || pdf_extract::extract_text(&owned))
            .await
            .map_err(|e| LexiError::ExtractionError(format!("PDF task failed: {}", e)))?;

        match layer {
            Ok(text) if !text.trim().is_empty() => Ok(text),
            Ok(_) => {
                tracing::info!(path = %path.display(), "no text layer, falling back to OCR");
                self.ocr.ocr_pdf(path).await
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "text layer unreadable, falling back to OCR");
                self.ocr.ocr_pdf(path).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_kind() {
        assert_eq!(detect_kind(Path::new("a.PDF")).unwrap(), FileKind::Pdf);
        assert_eq!(detect_kind(Path::new("scan.jpeg")).unwrap(), FileKind::Image);
        assert_eq!(detect_kind(Path::new("scan.Jpg")).unwrap(), FileKind::Image);
        assert_eq!(detect_kind(Path::new("x.png")).unwrap(), FileKind::Image);
    }

    #[test]
    fn test_unsupported_kind() {
        let err = detect_kind(Path::new("brief.docx")).unwrap_err();
        assert!(matches!(err, LexiError::UnsupportedFileType(ref ext) if ext == ".docx"));
        assert!(detect_kind(Path::new("README")).is_err());
    }

    #[tokio::test]
    async fn test_extract_rejects_before_reading() {
        let extractor = TextExtractor::new(OcrEngine::default());
        let err = extractor.extract(Path::new("/nonexistent/file.txt")).await.unwrap_err();
        assert!(matches!(err, LexiError::UnsupportedFileType(_)));
    }

    #[tokio::test]
    async fn test_cached_extraction_short_circuits() {
        use crate::cache::MemoryCache;
        use std::sync::Arc;
        use std::time::Duration;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan.png");
        std::fs::write(&path, b"not really a png").unwrap();

        let cache = CacheService::with_settings(
            Arc::new(MemoryCache::default()),
            Duration::from_secs(60),
            25,
            Duration::from_secs(86_400),
        );
        cache.cache_extraction(&path, "cached words").await;

        // OCR binary does not exist, so only the cache can answer
        let extractor = TextExtractor::new(OcrEngine::new("lexi-missing", "lexi-missing"))
            .with_cache(cache);
        assert_eq!(extractor.extract(&path).await.unwrap(), "cached words");
    }
}
