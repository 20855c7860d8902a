//! Application Configuration
//!
//! Pipeline settings stored in TOML format. Every section falls back to its
//! defaults, so a partial file only overrides what it names.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::analysis::{MeterScreenType, ReadingStrategy};
use crate::capture::gate::DEFAULT_INTERVAL;
use crate::capture::Orientation;
use crate::vision::{NormalizedRect, OcrBackend, RecognitionLevel, RecognitionOptions};

/// Application settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Frame source and admission settings
    pub capture: CaptureSettings,
    /// Display region locator
    pub locator: LocatorConfig,
    /// Crop enhancement before OCR
    pub preprocessing: PreprocessingConfig,
    /// Text recognition
    pub ocr: OcrConfig,
    /// Whole-frame digit classifier
    pub digits: DigitsConfig,
    /// Field extraction
    pub analysis: AnalysisConfig,
    /// Debug image output
    pub diagnostics: DiagnosticsConfig,
}

/// Capture-related settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureSettings {
    /// Frame rate assumed when replaying still images
    pub source_fps: u32,
    /// Orientation hint applied to every frame
    pub orientation: Orientation,
    /// Minimum seconds between frames admitted to the pipeline
    pub admission_interval_secs: f64,
}

impl CaptureSettings {
    /// Negative values admit every frame; values too large to represent
    /// fall back to the default interval
    pub fn admission_interval(&self) -> Duration {
        Duration::try_from_secs_f64(self.admission_interval_secs.max(0.0)).unwrap_or(DEFAULT_INTERVAL)
    }
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            source_fps: 30,
            orientation: Orientation::Up,
            admission_interval_secs: 1.0,
        }
    }
}

/// Display region locator settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocatorConfig {
    /// Override for the screen boundary model file
    pub model_path: Option<PathBuf>,
    /// Square model input size in pixels
    pub input_size: u32,
    /// Minimum detection confidence
    pub confidence_threshold: f32,
    /// Class index of the meter display
    pub display_class: usize,
}

impl Default for LocatorConfig {
    fn default() -> Self {
        Self {
            model_path: None,
            input_size: 416,
            confidence_threshold: 0.25,
            display_class: 0,
        }
    }
}

/// Image enhancement applied to the located display crop
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessingConfig {
    /// Convert to grayscale
    pub grayscale: bool,
    /// Contrast factor (1.0 = no change, > 1.0 = more contrast)
    pub contrast: f32,
    /// Integer upscale factor (1 = no scaling)
    pub scale: u32,
}

impl Default for PreprocessingConfig {
    fn default() -> Self {
        Self {
            grayscale: true,
            contrast: 1.2,
            scale: 2,
        }
    }
}

/// Text recognition settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    pub backend: OcrBackend,
    /// Recognition languages (BCP-47 tags)
    pub languages: Vec<String>,
    pub level: RecognitionLevel,
    pub language_correction: bool,
    /// Minimum text height as a fraction of the crop height
    pub minimum_text_height: f32,
    /// Use GPU acceleration (PaddleOCR only)
    pub use_gpu: bool,
}

impl OcrConfig {
    pub fn recognition_options(&self) -> RecognitionOptions {
        RecognitionOptions {
            languages: self.languages.clone(),
            level: self.level,
            uses_language_correction: self.language_correction,
            minimum_text_height: self.minimum_text_height,
        }
    }
}

impl Default for OcrConfig {
    fn default() -> Self {
        let options = RecognitionOptions::default();
        Self {
            backend: OcrBackend::default(),
            languages: options.languages,
            level: options.level,
            language_correction: options.uses_language_correction,
            minimum_text_height: options.minimum_text_height,
            use_gpu: false,
        }
    }
}

/// Whole-frame digit classifier settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DigitsConfig {
    pub enabled: bool,
    /// Override for the digit model file
    pub model_path: Option<PathBuf>,
    /// Square model input size in pixels
    pub input_size: u32,
    /// Minimum per-digit confidence
    pub confidence_threshold: f32,
    /// Fixed frame region the digit model looks at
    pub region_of_interest: NormalizedRect,
}

impl Default for DigitsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            model_path: None,
            input_size: 640,
            confidence_threshold: 0.25,
            region_of_interest: NormalizedRect::new(0.15, 0.35, 0.7, 0.3),
        }
    }
}

/// Field extraction settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Text strategies in the order they are tried
    pub strategies: Vec<ReadingStrategy>,
    /// Screens that must be read before the snapshot counts as complete
    pub required: Vec<MeterScreenType>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            strategies: vec![ReadingStrategy::Spatial, ReadingStrategy::Sequential],
            required: MeterScreenType::required_by_default(),
        }
    }
}

/// Debug image output settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagnosticsConfig {
    pub enabled: bool,
    /// Where annotated images go; defaults to the data directory
    pub output_dir: Option<PathBuf>,
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {:?}", path))?;
    let config: AppConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config {:?}", path))?;
    Ok(config)
}

/// Save configuration to file
pub fn save_config(config: &AppConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_app_config() {
        let config = AppConfig::default();

        assert_eq!(config.capture.source_fps, 30);
        assert_eq!(config.capture.orientation, Orientation::Up);
        assert_eq!(config.capture.admission_interval(), Duration::from_secs(1));

        assert_eq!(config.locator.input_size, 416);
        assert!((config.locator.confidence_threshold - 0.25).abs() < 0.001);

        assert!(config.preprocessing.grayscale);
        assert!((config.preprocessing.contrast - 1.2).abs() < 0.001);
        assert_eq!(config.preprocessing.scale, 2);

        assert_eq!(config.ocr.level, RecognitionLevel::Accurate);
        assert!(!config.ocr.language_correction);

        assert!(config.digits.enabled);
        assert!((config.digits.region_of_interest.width - 0.7).abs() < 0.001);

        assert_eq!(config.analysis.strategies.len(), 2);
        assert!(!config.analysis.required.contains(&MeterScreenType::Time));
        assert!(!config.diagnostics.enabled);
    }

    #[test]
    fn test_admission_interval_out_of_range() {
        let mut capture = CaptureSettings::default();
        capture.admission_interval_secs = f64::INFINITY;
        assert_eq!(capture.admission_interval(), DEFAULT_INTERVAL);
        capture.admission_interval_secs = -2.0;
        assert_eq!(capture.admission_interval(), Duration::ZERO);
        capture.admission_interval_secs = f64::NAN;
        assert_eq!(capture.admission_interval(), Duration::ZERO);
        capture.admission_interval_secs = 0.25;
        assert_eq!(capture.admission_interval(), Duration::from_millis(250));
    }

    #[test]
    fn test_config_serialization_roundtrip() {
        let mut config = AppConfig::default();
        config.capture.orientation = Orientation::Right;
        config.ocr.level = RecognitionLevel::Fast;
        config.analysis.strategies = vec![ReadingStrategy::Sequential];

        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();

        assert_eq!(parsed.capture.orientation, Orientation::Right);
        assert_eq!(parsed.ocr.level, RecognitionLevel::Fast);
        assert_eq!(parsed.analysis.strategies, vec![ReadingStrategy::Sequential]);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let toml_str = r#"
            [capture]
            admission_interval_secs = 0.5

            [analysis]
            required = ["night", "day"]
        "#;
        let parsed: AppConfig = toml::from_str(toml_str).unwrap();

        assert_eq!(parsed.capture.admission_interval(), Duration::from_millis(500));
        assert_eq!(parsed.capture.source_fps, 30);
        assert_eq!(parsed.analysis.required, vec![MeterScreenType::Night, MeterScreenType::Day]);
        assert_eq!(parsed.preprocessing.scale, 2);
    }

    #[test]
    fn test_recognition_options_from_config() {
        let mut config = OcrConfig::default();
        config.minimum_text_height = 0.05;
        let options = config.recognition_options();
        assert!((options.minimum_text_height - 0.05).abs() < 1e-6);
        assert_eq!(options.languages, vec!["en-US".to_string()]);
    }

    #[test]
    fn test_save_and_load_config() {
        let config = AppConfig::default();
        let temp_file = NamedTempFile::new().unwrap();

        save_config(&config, temp_file.path()).unwrap();
        let loaded = load_config(temp_file.path()).unwrap();

        assert_eq!(config.capture.source_fps, loaded.capture.source_fps);
        assert_eq!(config.digits.input_size, loaded.digits.input_size);
    }

    #[test]
    fn test_load_config_file_not_found() {
        let result = load_config(Path::new("/nonexistent/path/config.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_load_config_invalid_toml() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "this is not valid toml {{{{").unwrap();

        let result = load_config(temp_file.path());
        assert!(result.is_err());
    }
}
