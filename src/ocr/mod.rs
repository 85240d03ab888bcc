mod preprocess;
mod tesseract;

use anyhow::Context;

pub use self::tesseract::TesseractEngine;

/// OCR output is bounded to this many digits; anything longer is anomalous
/// engine noise rather than a plausible meter display.
const MAX_READING_DIGITS: usize = 8;

/// A text-recognition backend. The production engine is Tesseract; tests
/// swap in deterministic fakes.
pub trait OcrEngine: Send + Sync {
    /// Recognize text in a prepared binary/grayscale image, constrained to
    /// digit characters. Non-digit noise in the returned string is tolerated
    /// and stripped by the caller.
    fn recognize_digits(&self, image: &image::GrayImage) -> anyhow::Result<String>;
}

/// Run the full recognition pipeline over raw uploaded bytes and produce a
/// draft kWh value.
///
/// Decode → adaptive-threshold preprocessing → recognize; if that yields no
/// digits, retry once with the fixed-threshold fallback. Any failure here
/// leaves no obligation on this function — the caller owns the stored file
/// and deletes it when we error.
pub fn extract_kwh(engine: &dyn OcrEngine, raw: &[u8]) -> anyhow::Result<f64> {
    let img = image::load_from_memory(raw).context("decode uploaded image")?;

    let cleaned = preprocess::clean_for_recognition(&img);
    let mut digits = digits_only(&engine.recognize_digits(&cleaned)?);

    if digits.is_empty() {
        let fallback = preprocess::fixed_threshold(&img);
        digits = digits_only(&engine.recognize_digits(&fallback)?);
    }

    anyhow::ensure!(
        !digits.is_empty(),
        "no digits detected after both preprocessing passes"
    );

    digits.truncate(MAX_READING_DIGITS);
    digits
        .parse::<f64>()
        .with_context(|| format!("parse recognized digits {digits:?}"))
}

fn digits_only(text: &str) -> String {
    text.chars().filter(|c| c.is_ascii_digit()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, GrayImage};
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Returns canned responses in order, one per recognize call.
    struct ScriptedEngine {
        outputs: Vec<&'static str>,
        calls: AtomicUsize,
    }

    impl ScriptedEngine {
        fn new(outputs: Vec<&'static str>) -> Self {
            Self {
                outputs,
                calls: AtomicUsize::new(0),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl OcrEngine for ScriptedEngine {
        fn recognize_digits(&self, _image: &GrayImage) -> anyhow::Result<String> {
            let i = self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.outputs.get(i).copied().unwrap_or("").to_string())
        }
    }

    fn sample_png() -> Vec<u8> {
        let img = DynamicImage::ImageLuma8(GrayImage::from_pixel(16, 16, image::Luma([128])));
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, image::ImageFormat::Png)
            .expect("encode sample png");
        buf.into_inner()
    }

    #[test]
    fn concatenates_digits_and_ignores_noise() {
        let engine = ScriptedEngine::new(vec!["0 04\n5x231"]);
        let kwh = extract_kwh(&engine, &sample_png()).expect("extract");
        assert_eq!(kwh, 45231.0);
        assert_eq!(engine.call_count(), 1);
    }

    #[test]
    fn caps_to_eight_digits() {
        let engine = ScriptedEngine::new(vec!["1234567890123"]);
        let kwh = extract_kwh(&engine, &sample_png()).expect("extract");
        assert_eq!(kwh, 12345678.0);
    }

    #[test]
    fn retries_once_with_fallback_preprocessing() {
        let engine = ScriptedEngine::new(vec!["", "778"]);
        let kwh = extract_kwh(&engine, &sample_png()).expect("extract");
        assert_eq!(kwh, 778.0);
        assert_eq!(engine.call_count(), 2);
    }

    #[test]
    fn fails_when_both_passes_yield_nothing() {
        let engine = ScriptedEngine::new(vec!["", "no digits here"]);
        let err = extract_kwh(&engine, &sample_png()).unwrap_err();
        assert!(err.to_string().contains("no digits"));
        assert_eq!(engine.call_count(), 2);
    }

    #[test]
    fn undecodable_bytes_fail_before_recognition() {
        let engine = ScriptedEngine::new(vec!["123"]);
        let err = extract_kwh(&engine, b"not an image").unwrap_err();
        assert!(err.to_string().contains("decode"));
        assert_eq!(engine.call_count(), 0);
    }
}
