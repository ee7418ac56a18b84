//! Application Configuration
//!
//! Endpoint URLs and user preferences stored in TOML format. Secrets are
//! resolved environment-first so they never have to live in the file.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::capture::FacingMode;
use crate::export::ExportFormat;

/// Environment variable overriding the OCR shared secret
pub const ENV_OCR_SECRET: &str = "CLOVA_OCR_SECRET_KEY";
/// Environment variable overriding the OCR invoke URL
pub const ENV_OCR_INVOKE_URL: &str = "CLOVA_OCR_INVOKE_URL";
/// Environment variable overriding the datastore URL
pub const ENV_STORE_URL: &str = "SUPABASE_URL";
/// Environment variable overriding the datastore anon key
pub const ENV_STORE_ANON_KEY: &str = "SUPABASE_ANON_KEY";

/// Application settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Recognition service settings
    pub ocr: OcrConfig,
    /// Datastore settings
    pub store: StoreConfig,
    /// Camera settings
    pub camera: CameraSettings,
    /// Export settings
    pub export: ExportSettings,
}

/// Recognition service settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    /// Clova OCR invoke URL
    pub invoke_url: String,
    /// Shared secret; normally supplied via CLOVA_OCR_SECRET_KEY
    pub secret_key: String,
    /// Recognition language tag
    pub lang: String,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            invoke_url: String::new(),
            secret_key: String::new(),
            lang: "ko".to_string(),
        }
    }
}

/// Datastore settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Supabase project URL
    pub url: String,
    /// Anon key; normally supplied via SUPABASE_ANON_KEY
    pub anon_key: String,
}

/// Camera settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraSettings {
    /// Preferred lens
    pub facing: FacingMode,
    /// Ideal capture width in pixels
    pub ideal_width: u32,
    /// Ideal capture height in pixels
    pub ideal_height: u32,
    /// Total acquisition attempts for a busy device
    pub max_attempts: u32,
    /// Base retry delay in milliseconds; attempt n waits n times this
    pub retry_base_ms: u64,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            facing: FacingMode::Environment,
            ideal_width: 1280,
            ideal_height: 720,
            max_attempts: 3,
            retry_base_ms: 1000,
        }
    }
}

/// Export settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportSettings {
    /// Default output format
    pub format: ExportFormat,
    /// Output directory; current directory when unset
    pub output_dir: Option<PathBuf>,
}

impl AppConfig {
    /// Resolve secrets and endpoints environment-first
    pub fn apply_env_overrides(&mut self) {
        if let Ok(value) = std::env::var(ENV_OCR_SECRET) {
            self.ocr.secret_key = value;
        }
        if let Ok(value) = std::env::var(ENV_OCR_INVOKE_URL) {
            self.ocr.invoke_url = value;
        }
        if let Ok(value) = std::env::var(ENV_STORE_URL) {
            self.store.url = value;
        }
        if let Ok(value) = std::env::var(ENV_STORE_ANON_KEY) {
            self.store.anon_key = value;
        }
    }

    /// Whether the recognition gateway can be constructed
    pub fn ocr_configured(&self) -> bool {
        !self.ocr.invoke_url.is_empty() && !self.ocr.secret_key.is_empty()
    }

    /// Whether the persistence gateway can be constructed
    pub fn store_configured(&self) -> bool {
        !self.store.url.is_empty() && !self.store.anon_key.is_empty()
    }
}

/// Default configuration file location under the platform config dir
pub fn default_config_path() -> Result<PathBuf> {
    let proj_dirs = directories::ProjectDirs::from("com", "neimscan", "NeimScan")
        .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;

    let config_dir = proj_dirs.config_dir().to_path_buf();
    std::fs::create_dir_all(&config_dir)?;

    Ok(config_dir.join("config.toml"))
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: AppConfig = toml::from_str(&content)?;
    Ok(config)
}

/// Save configuration to file
pub fn save_config(config: &AppConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}
