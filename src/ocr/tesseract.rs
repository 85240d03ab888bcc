use image::GrayImage;
use tesseract::{PageSegMode, Tesseract};

use super::OcrEngine;

/// Production OCR backend. A fresh Tesseract instance is built per call —
/// the handle is not Sync and recognition is a one-shot blocking operation.
#[derive(Debug, Clone, Default)]
pub struct TesseractEngine;

impl OcrEngine for TesseractEngine {
    fn recognize_digits(&self, image: &GrayImage) -> anyhow::Result<String> {
        let (w, h) = image.dimensions();
        let bytes = image.as_raw();

        let mut tess = Tesseract::new(None, Some("eng"))
            .map_err(|e| anyhow::anyhow!("tesseract init: {e}"))?
            .set_frame(bytes, w as i32, h as i32, 1, w as i32)
            .map_err(|e| anyhow::anyhow!("tesseract set_frame: {e}"))?
            .set_variable("tessedit_char_whitelist", "0123456789")
            .map_err(|e| anyhow::anyhow!("tesseract set_variable: {e}"))?;

        // Single uniform block suits the one-line digital display crop.
        tess.set_page_seg_mode(PageSegMode::PsmSingleBlock);

        let mut tess = tess
            .recognize()
            .map_err(|e| anyhow::anyhow!("tesseract recognize: {e}"))?;
        let text = tess
            .get_text()
            .map_err(|e| anyhow::anyhow!("tesseract get_text: {e}"))?;
        Ok(text.trim().to_string())
    }
}
