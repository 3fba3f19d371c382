//! Job, request, and response types.
//!
//! A job arrives from the external job source as `{id, input}`, where the
//! input is an untyped mapping validated against the declared schema. The
//! response carries either an error or the generated images plus the seed
//! actually used.

use serde::{Deserialize, Serialize};

/// A job received from the external job source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Unique job identifier assigned by the job source.
    pub id: String,

    /// Raw, untyped request payload. Validated by the input schema before
    /// any pipeline is touched.
    pub input: serde_json::Value,
}

/// A validated, normalized generation request.
///
/// Produced by the input validator; every field is present with a
/// type- and range-checked value, defaults applied.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationInput {
    /// Text description of the desired image.
    pub prompt: String,

    /// Text description of content to steer away from.
    pub negative_prompt: String,

    /// Starting image URL for refinement or inpainting.
    pub image_url: Option<String>,

    /// Mask image URL for inpainting.
    pub mask_url: Option<String>,

    /// Routes the job to the inpainting pipeline.
    pub use_inpaint: bool,

    /// Random seed for generation. If None, the orchestrator draws a fresh
    /// seed and echoes it back in the response.
    pub seed: Option<u64>,

    /// Number of denoising steps for the base pass.
    pub num_inference_steps: u32,

    /// Number of denoising steps for the refiner when running image-to-image.
    pub refiner_inference_steps: u32,

    /// Classifier-free guidance scale.
    pub guidance_scale: f64,

    /// Scheduler family name, drawn from the closed supported set.
    pub scheduler: String,

    /// Denoising strength for image-to-image refinement (0-1).
    pub strength: f64,

    /// Output image width in pixels.
    pub width: u32,

    /// Output image height in pixels.
    pub height: u32,

    /// Number of images to generate per prompt.
    pub num_images: u32,

    /// Fraction of denoising done by the base pipeline before the latent
    /// handoff to the refiner.
    pub high_noise_frac: f64,
}

impl Default for GenerationInput {
    fn default() -> Self {
        Self {
            prompt: String::new(),
            negative_prompt: String::new(),
            image_url: None,
            mask_url: None,
            use_inpaint: false,
            seed: None,
            num_inference_steps: 25,
            refiner_inference_steps: 50,
            guidance_scale: 7.5,
            scheduler: "DDIM".to_string(),
            strength: 0.3,
            width: 1024,
            height: 1024,
            num_images: 1,
            high_noise_frac: 0.8,
        }
    }
}

/// Response returned to the job source for a single job.
///
/// A response is either an error or a result; images and seed are never
/// populated alongside an error. The `refresh_worker` key is present only
/// when set, signaling the external runtime to discard this worker after
/// the response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JobResponse {
    /// Generation failed; `error` carries a human-readable message.
    Error {
        error: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        refresh_worker: Option<bool>,
    },

    /// Generation succeeded.
    Success {
        /// All delivered images, as upload URLs or base64 data URIs.
        images: Vec<String>,
        /// First image, for callers that only want one.
        image_url: String,
        /// The seed actually used, echoed for reproducibility.
        seed: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        refresh_worker: Option<bool>,
    },
}

impl JobResponse {
    /// Creates a success response from delivered image entries.
    ///
    /// The first entry doubles as `image_url`. The refresh flag is omitted
    /// from the serialized response unless set.
    pub fn success(images: Vec<String>, seed: u64, refresh_worker: bool) -> Self {
        let image_url = images.first().cloned().unwrap_or_default();
        JobResponse::Success {
            images,
            image_url,
            seed,
            refresh_worker: if refresh_worker { Some(true) } else { None },
        }
    }

    /// Creates an error response.
    pub fn error(message: impl Into<String>, refresh_worker: bool) -> Self {
        JobResponse::Error {
            error: message.into(),
            refresh_worker: if refresh_worker { Some(true) } else { None },
        }
    }

    /// Returns true if this response is an error.
    pub fn is_error(&self) -> bool {
        matches!(self, JobResponse::Error { .. })
    }

    /// Returns true if the worker should be discarded after this response.
    pub fn refresh_requested(&self) -> bool {
        match self {
            JobResponse::Error { refresh_worker, .. }
            | JobResponse::Success { refresh_worker, .. } => refresh_worker.unwrap_or(false),
        }
    }
}
