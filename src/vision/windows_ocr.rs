//! Windows OCR API backend
//!
//! Uses the built-in Windows OCR (Media.Ocr). Results are reported per line
//! since the display's codes and values are printed as separate lines.

use anyhow::{Context, Result};
use image::RgbaImage;
use tracing::{debug, info, warn};
use windows::{
    core::HSTRING,
    Foundation::IAsyncOperation,
    Globalization::Language,
    Graphics::Imaging::{BitmapPixelFormat, SoftwareBitmap},
    Media::Ocr::{OcrEngine as WinOcrEngine, OcrResult as WinOcrResult},
    Storage::Streams::{DataReader, DataWriter, InMemoryRandomAccessStream},
};

use super::geometry::NormalizedRect;
use super::ocr::{RecognitionOptions, TextObservation, TextRecognizer};

/// Windows OCR engine wrapper
pub struct WindowsOcr {
    engine: WinOcrEngine,
    language: String,
}

// WinRT OCR engines are agile objects
unsafe impl Send for WindowsOcr {}

impl WindowsOcr {
    /// Create an engine for the first supported language tag
    pub fn new(languages: &[String]) -> Result<Self> {
        for tag in languages {
            let language = Language::CreateLanguage(&HSTRING::from(tag.as_str()))
                .context("Failed to create language")?;

            if WinOcrEngine::IsLanguageSupported(&language).context("Failed to check language support")? {
                let engine = WinOcrEngine::TryCreateFromLanguage(&language)
                    .context("Failed to create OCR engine for language")?;
                info!("Windows OCR initialized with language: {}", tag);
                return Ok(Self {
                    engine,
                    language: tag.clone(),
                });
            }
            warn!("Language '{}' not supported by Windows OCR", tag);
        }

        debug!("Installed OCR languages: {:?}", Self::available_languages()?);
        let engine = WinOcrEngine::TryCreateFromUserProfileLanguages()
            .context("Failed to create OCR engine from user profile")?;
        let language = engine
            .RecognizerLanguage()
            .context("Failed to get recognizer language")?
            .LanguageTag()
            .context("Failed to get language tag")?
            .to_string();

        info!("Windows OCR falling back to profile language: {}", language);
        Ok(Self { engine, language })
    }

    /// Get available OCR languages on this system
    pub fn available_languages() -> Result<Vec<String>> {
        let languages = WinOcrEngine::AvailableRecognizerLanguages().context("Failed to get available languages")?;

        let mut result = Vec::new();
        for i in 0..languages.Size().context("Failed to get languages size")? {
            if let Ok(tag) = languages.GetAt(i).and_then(|lang| lang.LanguageTag()) {
                result.push(tag.to_string());
            }
        }
        Ok(result)
    }
}

impl TextRecognizer for WindowsOcr {
    fn name(&self) -> &'static str {
        "windows-ocr"
    }

    fn recognize(&mut self, image: &RgbaImage, _options: &RecognitionOptions) -> Result<Vec<TextObservation>> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Ok(vec![]);
        }

        let bitmap = create_software_bitmap(&rgba_to_bgra(image.as_raw()), width, height)?;
        let ocr_result = run_ocr_sync(&self.engine, &bitmap)?;
        let observations = extract_lines(&ocr_result, width, height)?;

        debug!(
            "Windows OCR ({}): {} lines in {}x{} image",
            self.language,
            observations.len(),
            width,
            height
        );
        Ok(observations)
    }
}

/// Convert RGBA to BGRA (Windows expects BGRA)
fn rgba_to_bgra(rgba: &[u8]) -> Vec<u8> {
    let mut bgra = rgba.to_vec();
    for chunk in bgra.chunks_exact_mut(4) {
        chunk.swap(0, 2);
    }
    bgra
}

/// Create a SoftwareBitmap from BGRA data
fn create_software_bitmap(bgra_data: &[u8], width: u32, height: u32) -> Result<SoftwareBitmap> {
    let stream = InMemoryRandomAccessStream::new().context("Failed to create in-memory stream")?;
    let writer = DataWriter::CreateDataWriter(&stream).context("Failed to create data writer")?;

    writer.WriteBytes(bgra_data).context("Failed to write pixel data")?;
    writer
        .StoreAsync()
        .context("Failed to start store operation")?
        .get()
        .context("Failed to store data")?;
    writer
        .FlushAsync()
        .context("Failed to start flush operation")?
        .get()
        .context("Failed to flush data")?;

    let bitmap = SoftwareBitmap::Create(BitmapPixelFormat::Bgra8, width as i32, height as i32)
        .context("Failed to create SoftwareBitmap")?;

    let input_stream = stream.GetInputStreamAt(0).context("Failed to get input stream")?;
    let reader = DataReader::CreateDataReader(&input_stream).context("Failed to create data reader")?;
    reader
        .LoadAsync(bgra_data.len() as u32)
        .context("Failed to start load operation")?
        .get()
        .context("Failed to load data")?;
    let buffer = reader
        .ReadBuffer(bgra_data.len() as u32)
        .context("Failed to read buffer")?;

    bitmap.CopyFromBuffer(&buffer).context("Failed to copy buffer to bitmap")?;
    Ok(bitmap)
}

/// Run OCR synchronously (blocks until complete)
fn run_ocr_sync(engine: &WinOcrEngine, bitmap: &SoftwareBitmap) -> Result<WinOcrResult> {
    let async_op: IAsyncOperation<WinOcrResult> =
        engine.RecognizeAsync(bitmap).context("Failed to start OCR recognition")?;
    async_op.get().context("OCR recognition failed")
}

/// One observation per line, boxed by the union of its words
fn extract_lines(ocr_result: &WinOcrResult, width: u32, height: u32) -> Result<Vec<TextObservation>> {
    let mut observations = Vec::new();
    let lines = ocr_result.Lines().context("Failed to get OCR lines")?;

    for i in 0..lines.Size().context("Failed to get lines size")? {
        let line = lines.GetAt(i).context("Failed to get line")?;
        let text = line.Text().context("Failed to get line text")?.to_string();
        let words = line.Words().context("Failed to get words")?;

        let (mut min_x, mut min_y, mut max_x, mut max_y) = (f32::MAX, f32::MAX, f32::MIN, f32::MIN);
        for j in 0..words.Size().context("Failed to get words size")? {
            let rect = words
                .GetAt(j)
                .context("Failed to get word")?
                .BoundingRect()
                .context("Failed to get bounding rect")?;
            min_x = min_x.min(rect.X);
            min_y = min_y.min(rect.Y);
            max_x = max_x.max(rect.X + rect.Width);
            max_y = max_y.max(rect.Y + rect.Height);
        }
        if max_x <= min_x || max_y <= min_y {
            continue;
        }

        let bounds = NormalizedRect::new(
            min_x / width as f32,
            min_y / height as f32,
            (max_x - min_x) / width as f32,
            (max_y - min_y) / height as f32,
        );
        // Windows OCR doesn't provide confidence
        observations.push(TextObservation::new(text, bounds, 1.0));
    }

    Ok(observations)
}
