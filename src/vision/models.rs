//! Model management for ONNX Runtime
//!
//! Locates, downloads and loads the detector and OCR models.

use anyhow::{Context, Result};
use futures_util::StreamExt;
use ort::session::{builder::GraphOptimizationLevel, Session};
use sha2::{Digest, Sha256};
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::runtime::Runtime;
use tracing::{debug, info, warn};

use crate::error::PipelineError;

/// Environment variable that disables network downloads
const OFFLINE_ENV: &str = "METER_READER_OFFLINE";

/// Model files the pipeline knows about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelType {
    /// Display region detector (custom YOLO export)
    ScreenBoundary,
    /// Per-digit classifier (custom YOLO export)
    Digits,
    /// PaddleOCR text detection model (DBNet)
    TextDetection,
    /// PaddleOCR text recognition model (CRNN)
    TextRecognition,
    /// Character dictionary for recognition
    Dictionary,
}

impl ModelType {
    pub const ALL: [ModelType; 5] = [
        ModelType::ScreenBoundary,
        ModelType::Digits,
        ModelType::TextDetection,
        ModelType::TextRecognition,
        ModelType::Dictionary,
    ];

    /// Assets needed by the PaddleOCR backend
    pub const PADDLE_OCR: [ModelType; 3] = [
        ModelType::TextDetection,
        ModelType::TextRecognition,
        ModelType::Dictionary,
    ];

    pub fn filename(&self) -> &'static str {
        match self {
            ModelType::ScreenBoundary => "screen_boundary.onnx",
            ModelType::Digits => "digits.onnx",
            ModelType::TextDetection => "det.onnx",
            ModelType::TextRecognition => "rec.onnx",
            ModelType::Dictionary => "dict.txt",
        }
    }

    /// Public download location. The meter detectors are trained in-house
    /// and have to be placed in the models directory by hand.
    pub fn download_url(&self) -> Option<&'static str> {
        match self {
            ModelType::ScreenBoundary | ModelType::Digits => None,
            ModelType::TextDetection => {
                Some("https://huggingface.co/monkt/paddleocr-onnx/resolve/main/detection/v3/det.onnx")
            }
            ModelType::TextRecognition => {
                Some("https://huggingface.co/monkt/paddleocr-onnx/resolve/main/languages/english/rec.onnx")
            }
            ModelType::Dictionary => {
                Some("https://huggingface.co/monkt/paddleocr-onnx/resolve/main/languages/english/dict.txt")
            }
        }
    }

    /// Plausible file size in bytes, used as a cheap integrity check
    pub fn expected_size_range(&self) -> (u64, u64) {
        match self {
            ModelType::ScreenBoundary | ModelType::Digits => (100_000, 200_000_000),
            ModelType::TextDetection => (2_000_000, 5_000_000),
            ModelType::TextRecognition => (7_000_000, 10_000_000),
            ModelType::Dictionary => (500, 10_000),
        }
    }

    /// Expected SHA256 checksum, when pinned
    pub fn expected_sha256(&self) -> Option<&'static str> {
        None
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ModelType::ScreenBoundary => "Screen Boundary Detector",
            ModelType::Digits => "Digit Classifier",
            ModelType::TextDetection => "Text Detection",
            ModelType::TextRecognition => "Text Recognition",
            ModelType::Dictionary => "Character Dictionary",
        }
    }
}

/// Model manifest tracking downloaded models
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ModelManifest {
    pub version: String,
    pub models: Vec<ModelInfo>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ModelInfo {
    pub model_type: String,
    pub filename: String,
    pub size_bytes: u64,
    pub sha256: Option<String>,
    /// Unix seconds
    pub downloaded_at: u64,
}

impl Default for ModelManifest {
    fn default() -> Self {
        Self {
            version: "1.0.0".to_string(),
            models: Vec::new(),
        }
    }
}

/// Availability of one model file
#[derive(Debug, Clone)]
pub struct ModelStatus {
    pub model_type: ModelType,
    pub path: PathBuf,
    pub available: bool,
    pub size: Option<u64>,
}

/// Progress callback for download operations
pub type DownloadProgressCallback = Box<dyn Fn(u64, Option<u64>) + Send + Sync>;

/// Finds and fetches model files
pub struct ModelManager {
    models_dir: PathBuf,
}

impl ModelManager {
    /// Manager rooted at `<data dir>/models`
    pub fn new() -> Result<Self> {
        let data_dir = crate::storage::get_data_dir()?;
        Self::with_dir(data_dir.join("models"))
    }

    pub fn with_dir(models_dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&models_dir)
            .with_context(|| format!("Failed to create models directory {:?}", models_dir))?;
        Ok(Self { models_dir })
    }

    pub fn models_dir(&self) -> &Path {
        &self.models_dir
    }

    pub fn model_path(&self, model_type: ModelType) -> PathBuf {
        self.models_dir.join(model_type.filename())
    }

    /// Whether the file exists with a plausible size
    pub fn is_model_available(&self, model_type: ModelType) -> bool {
        match std::fs::metadata(self.model_path(model_type)) {
            Ok(metadata) => {
                let (min, max) = model_type.expected_size_range();
                (min..=max).contains(&metadata.len())
            }
            Err(_) => false,
        }
    }

    pub fn get_model_status(&self) -> Vec<ModelStatus> {
        ModelType::ALL
            .iter()
            .map(|&model_type| {
                let path = self.model_path(model_type);
                let size = std::fs::metadata(&path).ok().map(|m| m.len());
                ModelStatus {
                    model_type,
                    available: self.is_model_available(model_type),
                    path,
                    size,
                }
            })
            .collect()
    }

    /// Resolve a model file, preferring an explicit override.
    ///
    /// Downloads the model when it is missing and has a public URL. A model
    /// that cannot be obtained is reported as [`PipelineError::Unavailable`].
    pub fn resolve(&self, model_type: ModelType, override_path: Option<&Path>) -> Result<PathBuf> {
        if let Some(path) = override_path {
            if path.is_file() {
                return Ok(path.to_path_buf());
            }
            return Err(PipelineError::unavailable(
                model_type.display_name(),
                format!("configured model file {:?} does not exist", path),
            )
            .into());
        }

        self.ensure_model(model_type)
    }

    /// Download a model if not already available
    pub fn ensure_model(&self, model_type: ModelType) -> Result<PathBuf> {
        let path = self.model_path(model_type);

        if self.is_model_available(model_type) {
            debug!("Model {:?} already available at {:?}", model_type, path);
            return Ok(path);
        }

        if model_type.download_url().is_none() {
            return Err(PipelineError::unavailable(
                model_type.display_name(),
                format!("no model at {:?} and no public download", path),
            )
            .into());
        }

        self.download_model_with_progress(model_type, None)
            .map_err(|e| PipelineError::unavailable(model_type.display_name(), format!("{:#}", e)))?;
        Ok(path)
    }

    /// Download every PaddleOCR asset that is missing
    pub fn download_all_with_progress<F>(&self, mut on_complete: F) -> Result<()>
    where
        F: FnMut(ModelType),
    {
        for model_type in ModelType::PADDLE_OCR {
            if self.is_model_available(model_type) {
                info!("Model {:?} already available, skipping download", model_type);
                continue;
            }

            let progress: DownloadProgressCallback = Box::new(move |downloaded, total| {
                debug!("{:?}: {} / {:?} bytes", model_type, downloaded, total);
            });
            self.download_model_with_progress(model_type, Some(progress))?;
            on_complete(model_type);
        }

        for model_type in [ModelType::ScreenBoundary, ModelType::Digits] {
            if !self.is_model_available(model_type) {
                warn!(
                    "{} has no public download; place it at {:?}",
                    model_type.display_name(),
                    self.model_path(model_type)
                );
            }
        }

        Ok(())
    }

    /// Download a specific model with optional progress callback
    pub fn download_model_with_progress(
        &self,
        model_type: ModelType,
        progress: Option<DownloadProgressCallback>,
    ) -> Result<()> {
        let path = self.model_path(model_type);
        let url = model_type
            .download_url()
            .with_context(|| format!("{} has no download URL", model_type.display_name()))?;

        info!("Downloading {} model from {}", model_type.display_name(), url);

        if std::env::var(OFFLINE_ENV).is_ok() {
            anyhow::bail!(
                "Offline mode: cannot download models. Please download manually from {} and place at {:?}",
                url,
                path
            );
        }

        let rt = Runtime::new().context("Failed to create tokio runtime")?;
        rt.block_on(async { self.download_file_async(url, &path, model_type, progress).await })?;

        if !self.is_model_available(model_type) {
            anyhow::bail!("Download completed but model verification failed");
        }

        self.update_manifest_for_model(model_type)?;

        info!("Successfully downloaded {} model", model_type.display_name());
        Ok(())
    }

    async fn download_file_async(
        &self,
        url: &str,
        path: &Path,
        model_type: ModelType,
        progress: Option<DownloadProgressCallback>,
    ) -> Result<()> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(300))
            .build()
            .context("Failed to create HTTP client")?;

        let response = client
            .get(url)
            .send()
            .await
            .context("Failed to send download request")?;

        if !response.status().is_success() {
            anyhow::bail!("Download failed with status {}: {}", response.status(), url);
        }

        let total_size = response.content_length();
        debug!("Download size: {:?} bytes", total_size);

        let temp_path = path.with_extension("tmp");
        let mut file = std::fs::File::create(&temp_path).context("Failed to create temp file")?;

        let mut hasher = Sha256::new();
        let mut downloaded: u64 = 0;
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.context("Error reading download stream")?;
            file.write_all(&chunk).context("Failed to write to temp file")?;
            hasher.update(&chunk);
            downloaded += chunk.len() as u64;

            if let Some(ref callback) = progress {
                callback(downloaded, total_size);
            }
        }

        file.flush().context("Failed to flush temp file")?;
        drop(file);

        let hash = format!("{:x}", hasher.finalize());
        if let Some(expected_hash) = model_type.expected_sha256() {
            if hash != expected_hash {
                std::fs::remove_file(&temp_path).ok();
                anyhow::bail!(
                    "Checksum mismatch for {}: expected {}, got {}",
                    model_type.filename(),
                    expected_hash,
                    hash
                );
            }
            info!("Checksum verified for {}", model_type.display_name());
        }

        std::fs::rename(&temp_path, path).context("Failed to move downloaded file to final location")?;
        Ok(())
    }

    fn update_manifest_for_model(&self, model_type: ModelType) -> Result<()> {
        let mut manifest = self.load_manifest().unwrap_or_default();

        let path = self.model_path(model_type);
        let data = std::fs::read(&path)?;
        let hash = format!("{:x}", Sha256::digest(&data));

        let downloaded_at = std::time::SystemTime::now()
            .duration_since(std::time::SystemTime::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();

        let model_info = ModelInfo {
            model_type: format!("{:?}", model_type),
            filename: model_type.filename().to_string(),
            size_bytes: data.len() as u64,
            sha256: Some(hash),
            downloaded_at,
        };

        if let Some(existing) = manifest.models.iter_mut().find(|m| m.filename == model_info.filename) {
            *existing = model_info;
        } else {
            manifest.models.push(model_info);
        }

        self.save_manifest(&manifest)
    }

    pub fn load_manifest(&self) -> Result<ModelManifest> {
        let manifest_path = self.models_dir.join("manifest.json");
        if manifest_path.exists() {
            let content = std::fs::read_to_string(&manifest_path)?;
            Ok(serde_json::from_str(&content)?)
        } else {
            Ok(ModelManifest::default())
        }
    }

    pub fn save_manifest(&self, manifest: &ModelManifest) -> Result<()> {
        let manifest_path = self.models_dir.join("manifest.json");
        let content = serde_json::to_string_pretty(manifest)?;
        std::fs::write(manifest_path, content)?;
        Ok(())
    }
}

/// ONNX Runtime session wrapper
pub struct OnnxSession {
    session: Session,
    input_names: Vec<String>,
    output_names: Vec<String>,
}

impl OnnxSession {
    /// Load a model. Failures surface as [`PipelineError::Unavailable`].
    pub fn load(capability: &'static str, model_path: &Path, use_gpu: bool) -> Result<Self> {
        let result = if use_gpu {
            Self::new_with_gpu(model_path)
        } else {
            Self::new(model_path)
        };
        result.map_err(|e| PipelineError::unavailable(capability, format!("{:#}", e)).into())
    }

    pub fn new(model_path: &Path) -> Result<Self> {
        info!("Loading ONNX model from {:?}", model_path);

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(4)?
            .commit_from_file(model_path)
            .context("Failed to load ONNX model")?;

        Ok(Self::from_session(session))
    }

    /// Create session with GPU acceleration if available
    pub fn new_with_gpu(model_path: &Path) -> Result<Self> {
        info!("Loading ONNX model with GPU acceleration from {:?}", model_path);

        let session_builder = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(4)?;

        #[cfg(target_os = "windows")]
        let session_builder = {
            use ort::execution_providers::DirectMLExecutionProvider;
            match session_builder.with_execution_providers([DirectMLExecutionProvider::default().build()]) {
                Ok(builder) => {
                    info!("DirectML GPU acceleration enabled");
                    builder
                }
                Err(e) => {
                    warn!("DirectML not available, using CPU: {}", e);
                    Session::builder()?
                        .with_optimization_level(GraphOptimizationLevel::Level3)?
                        .with_intra_threads(4)?
                }
            }
        };

        let session = session_builder
            .commit_from_file(model_path)
            .context("Failed to load ONNX model")?;

        Ok(Self::from_session(session))
    }

    fn from_session(session: Session) -> Self {
        let input_names: Vec<String> = session.inputs.iter().map(|input| input.name.clone()).collect();
        let output_names: Vec<String> = session.outputs.iter().map(|output| output.name.clone()).collect();

        info!("Model loaded. Inputs: {:?}, Outputs: {:?}", input_names, output_names);

        Self {
            session,
            input_names,
            output_names,
        }
    }

    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    pub fn input_names(&self) -> &[String] {
        &self.input_names
    }

    /// Index of an output by name, or `fallback` when the export renamed it
    pub fn output_index(&self, name: &str, fallback: usize) -> usize {
        self.output_names.iter().position(|n| n == name).unwrap_or(fallback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::is_frame_error;
    use tempfile::TempDir;

    #[test]
    fn test_model_type_filenames() {
        assert_eq!(ModelType::TextDetection.filename(), "det.onnx");
        assert_eq!(ModelType::TextRecognition.filename(), "rec.onnx");
        assert_eq!(ModelType::ScreenBoundary.filename(), "screen_boundary.onnx");
    }

    #[test]
    fn test_custom_models_have_no_url() {
        assert!(ModelType::ScreenBoundary.download_url().is_none());
        assert!(ModelType::Digits.download_url().is_none());
        assert!(ModelType::PADDLE_OCR.iter().all(|m| m.download_url().is_some()));
    }

    #[test]
    fn test_model_status() {
        let dir = TempDir::new().unwrap();
        let manager = ModelManager::with_dir(dir.path().join("models")).unwrap();
        let status = manager.get_model_status();
        assert_eq!(status.len(), ModelType::ALL.len());
        assert!(status.iter().all(|s| !s.available));
    }

    #[test]
    fn test_size_check() {
        let dir = TempDir::new().unwrap();
        let manager = ModelManager::with_dir(dir.path().to_path_buf()).unwrap();
        std::fs::write(manager.model_path(ModelType::Dictionary), "tiny").unwrap();
        assert!(!manager.is_model_available(ModelType::Dictionary));
        std::fs::write(manager.model_path(ModelType::Dictionary), "0\n".repeat(400)).unwrap();
        assert!(manager.is_model_available(ModelType::Dictionary));
    }

    #[test]
    fn test_missing_custom_model_is_unavailable() {
        let dir = TempDir::new().unwrap();
        let manager = ModelManager::with_dir(dir.path().to_path_buf()).unwrap();
        let err = manager.resolve(ModelType::ScreenBoundary, None).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::Unavailable { .. })
        ));
        assert!(!is_frame_error(&err));
    }

    #[test]
    fn test_override_path() {
        let dir = TempDir::new().unwrap();
        let manager = ModelManager::with_dir(dir.path().join("models")).unwrap();
        let custom = dir.path().join("custom.onnx");
        std::fs::write(&custom, b"onnx").unwrap();
        assert_eq!(manager.resolve(ModelType::Digits, Some(&custom)).unwrap(), custom);
        assert!(manager.resolve(ModelType::Digits, Some(&dir.path().join("nope.onnx"))).is_err());
    }

    #[test]
    fn test_manifest_roundtrip() {
        let dir = TempDir::new().unwrap();
        let manager = ModelManager::with_dir(dir.path().to_path_buf()).unwrap();
        assert!(manager.load_manifest().unwrap().models.is_empty());

        let mut manifest = ModelManifest::default();
        manifest.models.push(ModelInfo {
            model_type: "Dictionary".to_string(),
            filename: "dict.txt".to_string(),
            size_bytes: 800,
            sha256: None,
            downloaded_at: 0,
        });
        manager.save_manifest(&manifest).unwrap();
        assert_eq!(manager.load_manifest().unwrap().models.len(), 1);
    }
}
