//! Worker configuration module.
//!
//! Contains the runtime configuration for the worker, including
//! execution device selection, path configuration, and the object
//! storage endpoint that gates upload-vs-inline delivery.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Execution device for pipeline inference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    /// Automatically detect and use the best available device.
    /// Priority: CUDA > CPU.
    #[default]
    Auto,

    /// Force CPU execution.
    /// Slowest but universally available.
    Cpu,

    /// Use CUDA for NVIDIA GPU acceleration.
    Cuda,
}

impl Device {
    /// Returns the string representation of the device.
    pub fn as_str(&self) -> &'static str {
        match self {
            Device::Auto => "auto",
            Device::Cpu => "cpu",
            Device::Cuda => "cuda",
        }
    }

    /// Parses a device from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "auto" => Some(Device::Auto),
            "cpu" => Some(Device::Cpu),
            "cuda" | "gpu" => Some(Device::Cuda),
            _ => None,
        }
    }
}

impl std::fmt::Display for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Runtime configuration for the worker.
///
/// Loaded from environment variables at startup; the serverless runtime
/// injects these into the container.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Path to the directory containing pipeline model files.
    /// If None, uses the platform-specific default cache location.
    pub model_path: Option<PathBuf>,

    /// Path to the directory for job-scoped workspaces.
    /// If None, uses the platform-specific default cache location.
    pub cache_path: Option<PathBuf>,

    /// Execution device for inference.
    pub device: Device,

    /// Number of threads for intra-op parallelism in the inference runtime.
    /// If None, uses the runtime's default.
    pub threads: Option<u32>,

    /// Object storage endpoint for uploading generated images.
    /// When unset, images are delivered inline as base64 data URIs.
    pub bucket_endpoint_url: Option<String>,
}

impl WorkerConfig {
    /// Creates a new WorkerConfig with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a WorkerConfig from environment variables.
    ///
    /// Reads the following environment variables:
    /// - `SDXL_MODEL_PATH` - Path to the pipeline model directory
    /// - `SDXL_CACHE_PATH` - Path to the job workspace directory
    /// - `SDXL_DEVICE` - Device selection (auto, cpu, cuda)
    /// - `SDXL_THREADS` - Number of threads for CPU execution
    /// - `BUCKET_ENDPOINT_URL` - Object storage endpoint; absence selects
    ///   inline base64 delivery
    ///
    /// Falls back to defaults for unset variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(path) = std::env::var("SDXL_MODEL_PATH") {
            config.model_path = Some(PathBuf::from(path));
        }

        if let Ok(path) = std::env::var("SDXL_CACHE_PATH") {
            config.cache_path = Some(PathBuf::from(path));
        }

        if let Ok(device_str) = std::env::var("SDXL_DEVICE") {
            if let Some(device) = Device::parse(&device_str) {
                config.device = device;
            }
        }

        if let Ok(threads_str) = std::env::var("SDXL_THREADS") {
            if let Ok(threads) = threads_str.parse::<u32>() {
                if threads > 0 {
                    config.threads = Some(threads);
                }
            }
        }

        if let Ok(endpoint) = std::env::var("BUCKET_ENDPOINT_URL") {
            if !endpoint.trim().is_empty() {
                config.bucket_endpoint_url = Some(endpoint);
            }
        }

        config
    }

    /// Returns the effective model path, using platform defaults if not specified.
    pub fn effective_model_path(&self) -> PathBuf {
        if let Some(ref path) = self.model_path {
            path.clone()
        } else {
            default_model_path()
        }
    }

    /// Returns the effective cache path, using platform defaults if not specified.
    pub fn effective_cache_path(&self) -> PathBuf {
        if let Some(ref path) = self.cache_path {
            path.clone()
        } else {
            default_cache_path()
        }
    }

    /// Returns true if object storage upload is configured.
    ///
    /// Absence of the bucket endpoint implies inline base64 delivery.
    pub fn upload_configured(&self) -> bool {
        self.bucket_endpoint_url.is_some()
    }

    /// Validates the configuration.
    ///
    /// Returns an error message if validation fails, None otherwise.
    pub fn validate(&self) -> Option<String> {
        if let Some(threads) = self.threads {
            if threads == 0 {
                return Some("threads must be > 0".to_string());
            }
            if threads > 256 {
                return Some(format!("threads too high: {} (max 256)", threads));
            }
        }

        if let Some(ref endpoint) = self.bucket_endpoint_url {
            if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
                return Some(format!(
                    "bucket endpoint must be an http(s) URL, got: {}",
                    endpoint
                ));
            }
        }

        None
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            model_path: None,
            cache_path: None,
            device: Device::Auto,
            threads: None,
            bucket_endpoint_url: None,
        }
    }
}

/// Returns the platform-specific default model storage path.
///
/// Uses the `directories` crate to find appropriate locations:
/// - macOS: ~/Library/Caches/sdxl-worker/models
/// - Linux: ~/.cache/sdxl-worker/models
/// - Windows: C:\Users\<user>\AppData\Local\sdxl-worker\cache\models
fn default_model_path() -> PathBuf {
    if let Some(proj_dirs) = directories::ProjectDirs::from("", "", "sdxl-worker") {
        proj_dirs.cache_dir().join("models")
    } else {
        // Fallback to current directory
        PathBuf::from("./models")
    }
}

/// Returns the platform-specific default workspace path.
fn default_cache_path() -> PathBuf {
    if let Some(proj_dirs) = directories::ProjectDirs::from("", "", "sdxl-worker") {
        proj_dirs.cache_dir().join("jobs")
    } else {
        // Fallback to current directory
        PathBuf::from("./jobs")
    }
}
