//! Model provider interface and fetch retry policy.
//!
//! A provider turns a model identifier plus precision/format options into a
//! constructed pipeline handle or sub-component. Weight retrieval internals
//! live behind this seam; the registry only sees the trait and the retry
//! wrapper below.

use std::sync::Arc;

use crate::error::{Result, WorkerError};

use super::{BasePipeline, InpaintPipeline, RefinerPipeline, SafetyPipeline, VaeCodec};

/// Numeric precision requested for fetched weights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Precision {
    #[default]
    Fp16,
    Fp32,
}

impl Precision {
    /// Returns the string representation of the precision.
    pub fn as_str(&self) -> &'static str {
        match self {
            Precision::Fp16 => "fp16",
            Precision::Fp32 => "fp32",
        }
    }
}

/// Precision and format options for a model fetch.
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    pub precision: Precision,
    /// Named weight variant published alongside the default export.
    pub variant: Option<&'static str>,
    /// Prefer safetensors-format weights where the provider supports them.
    pub use_safetensors: bool,
}

impl FetchOptions {
    /// The options used for every SDXL pipeline: fp16 variant, safetensors.
    pub fn fp16() -> Self {
        Self {
            precision: Precision::Fp16,
            variant: Some("fp16"),
            use_safetensors: true,
        }
    }

    /// Full-precision options.
    pub fn fp32() -> Self {
        Self {
            precision: Precision::Fp32,
            variant: None,
            use_safetensors: true,
        }
    }
}

/// Fetch-by-name interface to the external model source.
///
/// Each method returns a fully constructed handle bound to the accelerator
/// device. Implementations are responsible for download, load, and device
/// placement; callers wrap every fetch in [`fetch_with_retry`].
pub trait ModelProvider: Send + Sync {
    /// Fetches the shared VAE.
    fn fetch_vae(&self, model_id: &str, options: &FetchOptions) -> Result<Arc<dyn VaeCodec>>;

    /// Fetches the base text-to-image pipeline, attaching the shared VAE.
    fn fetch_base(
        &self,
        model_id: &str,
        options: &FetchOptions,
        vae: Arc<dyn VaeCodec>,
    ) -> Result<Arc<dyn BasePipeline>>;

    /// Fetches the refiner pipeline, attaching the shared VAE.
    fn fetch_refiner(
        &self,
        model_id: &str,
        options: &FetchOptions,
        vae: Arc<dyn VaeCodec>,
    ) -> Result<Arc<dyn RefinerPipeline>>;

    /// Fetches the inpainting pipeline, attaching the shared VAE.
    fn fetch_inpaint(
        &self,
        model_id: &str,
        options: &FetchOptions,
        vae: Arc<dyn VaeCodec>,
    ) -> Result<Arc<dyn InpaintPipeline>>;

    /// Fetches the content safety checker.
    fn fetch_safety_checker(
        &self,
        model_id: &str,
        options: &FetchOptions,
    ) -> Result<Arc<dyn SafetyPipeline>>;

    /// Releases accelerator memory after an out-of-memory failure.
    fn release_accelerator_memory(&self);
}

/// Maximum number of fetch attempts before the error is propagated.
pub const MAX_FETCH_ATTEMPTS: u32 = 3;

/// Runs a fetch with bounded, backoff-free retry.
///
/// Intermediate failures are logged and retried immediately; once attempts
/// are exhausted the final attempt's error is propagated.
pub fn fetch_with_retry<T>(what: &str, fetch: impl Fn() -> Result<T>) -> Result<T> {
    let mut last_error = None;

    for attempt in 1..=MAX_FETCH_ATTEMPTS {
        match fetch() {
            Ok(value) => return Ok(value),
            Err(err) => {
                if attempt < MAX_FETCH_ATTEMPTS {
                    eprintln!(
                        "Error fetching {}: {}. Retrying attempt {} of {}...",
                        what,
                        err,
                        attempt + 1,
                        MAX_FETCH_ATTEMPTS
                    );
                }
                last_error = Some(err);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| {
        WorkerError::model_fetch_failed(format!("{}: retries exhausted", what))
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn fetch_succeeds_first_try() {
        let attempts = AtomicU32::new(0);
        let result = fetch_with_retry("widget", || {
            attempts.fetch_add(1, Ordering::SeqCst);
            Ok(7)
        });
        assert_eq!(result.unwrap(), 7);
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn fetch_retries_then_succeeds() {
        let attempts = AtomicU32::new(0);
        let result = fetch_with_retry("widget", || {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                Err(WorkerError::model_fetch_failed("flaky network"))
            } else {
                Ok("loaded")
            }
        });
        assert_eq!(result.unwrap(), "loaded");
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn fetch_exhausts_attempts_and_propagates_final_error() {
        let attempts = AtomicU32::new(0);
        let result: Result<()> = fetch_with_retry("widget", || {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            Err(WorkerError::model_fetch_failed(format!("attempt {}", n + 1)))
        });

        let err = result.unwrap_err();
        assert_eq!(attempts.load(Ordering::SeqCst), MAX_FETCH_ATTEMPTS);
        // Final attempt's error is the one surfaced
        assert!(err.message.contains("attempt 3"));
    }

    #[test]
    fn fp16_options() {
        let options = FetchOptions::fp16();
        assert_eq!(options.precision, Precision::Fp16);
        assert_eq!(options.variant, Some("fp16"));
        assert!(options.use_safetensors);
    }

    #[test]
    fn precision_names() {
        assert_eq!(Precision::Fp16.as_str(), "fp16");
        assert_eq!(Precision::Fp32.as_str(), "fp32");
    }
}
