//! OCR via the system `tesseract` and `pdftoppm` binaries

use std::path::{Path, PathBuf};
use tokio::process::Command;

use crate::errors::{LexiError, Result};

/// Rasterization resolution for scanned PDFs
const RASTER_DPI: &str = "300";

/// Runs OCR on images and scanned PDFs
#[derive(Debug, Clone)]
pub struct OcrEngine {
    tesseract: String,
    pdftoppm: String,
}

impl Default for OcrEngine {
    fn default() -> Self {
        Self::new("tesseract", "pdftoppm")
    }
}

impl OcrEngine {
    pub fn new(tesseract: &str, pdftoppm: &str) -> Self {
        Self {
            tesseract: tesseract.to_string(),
            pdftoppm: pdftoppm.to_string(),
        }
    }

    /// OCR one image file
    pub async fn ocr_image(&self, path: &Path) -> Result<String> {
        let output = Command::new(&self.tesseract)
            .arg(path)
            .arg("stdout")
            .output()
            .await
            .map_err(|e| LexiError::ExtractionError(format!("Failed to run {}: {}", self.tesseract, e)))?;

        if !output.status.success() {
            return Err(LexiError::ExtractionError(format!(
                "{} failed on {}: {}",
                self.tesseract,
                path.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Rasterize every page of `pdf` and OCR them in page order
    pub async fn ocr_pdf(&self, pdf: &Path) -> Result<String> {
        let workdir = std::env::temp_dir().join(format!("lexi_ocr_{}", uuid::Uuid::new_v4()));
        tokio::fs::create_dir_all(&workdir).await?;

        let result = self.ocr_pdf_in(pdf, &workdir).await;

        if let Err(e) = tokio::fs::remove_dir_all(&workdir).await {
            tracing::warn!(error = %e, dir = %workdir.display(), "failed to remove OCR workdir");
        }
        result
    }

    async fn ocr_pdf_in(&self, pdf: &Path, workdir: &Path) -> Result<String> {
        let output = Command::new(&self.pdftoppm)
            .args(["-r", RASTER_DPI, "-png"])
            .arg(pdf)
            .arg(workdir.join("page"))
            .output()
            .await
            .map_err(|e| LexiError::ExtractionError(format!("Failed to run {}: {}", self.pdftoppm, e)))?;

        if !output.status.success() {
            return Err(LexiError::ExtractionError(format!(
                "{} failed on {}: {}",
                self.pdftoppm,
                pdf.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let mut pages = Vec::new();
        for page in page_images(workdir)? {
            pages.push(self.ocr_image(&page).await?);
        }
        tracing::debug!(pages = pages.len(), pdf = %pdf.display(), "ocr complete");

        Ok(pages.join("\n"))
    }
}

/// PNG pages in `dir`, ordered by page number
fn page_images(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut pages: Vec<(u32, PathBuf)> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().map(|e| e == "png").unwrap_or(false))
        .map(|p| (page_number(&p).unwrap_or(u32::MAX), p))
        .collect();
    pages.sort();
    Ok(pages.into_iter().map(|(_, p)| p).collect())
}

/// `page-07.png` -> 7
fn page_number(path: &Path) -> Option<u32> {
    path.file_stem()?
        .to_str()?
        .rsplit('-')
        .next()?
        .parse()
        .ok()
}

/// Locate an executable on `PATH`
pub fn find_on_path(binary: &str) -> Option<PathBuf> {
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join(binary))
        .find(|candidate| candidate.is_file())
}
