//! Generation pipeline abstractions.
//!
//! Each pipeline kind (base, refiner, inpaint, safety checker) is consumed
//! through a narrow trait; the [`registry`] owns singleton handles and the
//! [`provider`] constructs them. Diffusion numerics live behind the traits,
//! not in this crate.
//!
//! ## Components
//!
//! - [`registry`]: Singleton-per-kind pipeline handles and the shared VAE
//! - [`provider`]: Model provider interface and fetch retry policy
//! - [`scheduler`]: Closed scheduler family set and schedule computation
//! - [`downloader`]: Model file download and cache checks
//! - [`onnx`]: ONNX Runtime-backed provider implementation

pub mod downloader;
pub mod onnx;
pub mod provider;
pub mod registry;
pub mod scheduler;

use std::fmt;

use image::RgbImage;
use ndarray::Array4;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, StandardNormal};

use scheduler::{Scheduler, SchedulerConfig};

// Re-export commonly used types
pub use onnx::OnnxPipelineProvider;
pub use provider::{fetch_with_retry, FetchOptions, ModelProvider, Precision, MAX_FETCH_ATTEMPTS};
pub use registry::PipelineRegistry;
pub use scheduler::SchedulerKind;

/// Model identifier for the base text-to-image pipeline.
pub const BASE_MODEL_ID: &str = "stabilityai/stable-diffusion-xl-base-1.0";

/// Model identifier for the image-to-image refiner pipeline.
pub const REFINER_MODEL_ID: &str = "stabilityai/stable-diffusion-xl-refiner-1.0";

/// Model identifier for the inpainting pipeline.
pub const INPAINT_MODEL_ID: &str = "diffusers/stable-diffusion-xl-1.0-inpainting-0.1";

/// Model identifier for the shared VAE.
pub const VAE_MODEL_ID: &str = "madebyollin/sdxl-vae-fp16-fix";

/// Model identifier for the content safety checker.
pub const SAFETY_MODEL_ID: &str = "CompVis/stable-diffusion-safety-checker";

/// The distinct pipeline kinds owned by the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineKind {
    Base,
    Refiner,
    Inpaint,
    SafetyChecker,
}

impl PipelineKind {
    /// Returns the directory name used for this kind's model files.
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineKind::Base => "base",
            PipelineKind::Refiner => "refiner",
            PipelineKind::Inpaint => "inpaint",
            PipelineKind::SafetyChecker => "safety_checker",
        }
    }

    /// Returns the model identifier this kind is fetched from.
    pub fn model_id(&self) -> &'static str {
        match self {
            PipelineKind::Base => BASE_MODEL_ID,
            PipelineKind::Refiner => REFINER_MODEL_ID,
            PipelineKind::Inpaint => INPAINT_MODEL_ID,
            PipelineKind::SafetyChecker => SAFETY_MODEL_ID,
        }
    }
}

impl fmt::Display for PipelineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Intermediate non-pixel image representation, passed from the base
/// pipeline to the refiner without decoding.
pub type Latent = Array4<f32>;

/// Failure of a pipeline run.
///
/// Accelerator memory exhaustion is distinguished so the orchestrator can
/// release memory and fail the job without recycling the worker; everything
/// else is surfaced verbatim.
#[derive(Debug)]
pub enum PipelineError {
    /// The accelerator ran out of memory mid-run.
    OutOfMemory(String),
    /// Any other unrecoverable computation error.
    Other(String),
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::OutOfMemory(detail) => {
                write!(f, "accelerator out of memory: {}", detail)
            }
            PipelineError::Other(detail) => write!(f, "{}", detail),
        }
    }
}

impl std::error::Error for PipelineError {}

/// Result type for pipeline runs.
pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

/// Deterministic per-job random generator.
///
/// One generator is constructed per job from the request seed and threaded
/// through every stage in order, so a caller resubmitting the same seed
/// reproduces the run.
#[derive(Debug, Clone)]
pub struct Generator {
    seed: u64,
    rng: ChaCha8Rng,
}

impl Generator {
    /// Creates a generator seeded with the given value.
    pub fn manual_seed(seed: u64) -> Self {
        Self {
            seed,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Returns the seed this generator was constructed with.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Draws standard-normal noise with the given latent shape.
    pub fn noise(&mut self, shape: (usize, usize, usize, usize)) -> Latent {
        let size = shape.0 * shape.1 * shape.2 * shape.3;
        let data: Vec<f32> = (0..size)
            .map(|_| StandardNormal.sample(&mut self.rng))
            .collect();

        Array4::from_shape_vec(shape, data).unwrap()
    }
}

/// Parameters for a base text-to-image pass.
#[derive(Debug, Clone)]
pub struct BaseParams {
    pub prompt: String,
    pub negative_prompt: String,
    pub width: u32,
    pub height: u32,
    pub steps: u32,
    pub guidance_scale: f64,
    /// Fraction of denoising performed before the latent handoff.
    pub denoising_end: f64,
    pub num_images: u32,
}

/// Parameters for refining latent output from the base pipeline.
#[derive(Debug, Clone)]
pub struct RefineLatentsParams {
    pub prompt: String,
    pub negative_prompt: String,
    pub steps: u32,
    pub guidance_scale: f64,
    /// Fraction of denoising already performed by the base pipeline.
    pub denoising_start: f64,
}

/// Parameters for refining a starting pixel image.
#[derive(Debug, Clone)]
pub struct RefineImageParams {
    pub prompt: String,
    pub negative_prompt: String,
    pub steps: u32,
    pub guidance_scale: f64,
    /// How far back into the noise schedule the image is pushed (0-1).
    pub strength: f64,
}

/// Parameters for a mask-based inpainting pass.
#[derive(Debug, Clone)]
pub struct InpaintParams {
    pub prompt: String,
    pub negative_prompt: String,
    pub steps: u32,
    pub guidance_scale: f64,
}

/// Shared variational autoencoder, attached to every pipeline that moves
/// between pixel and latent space. Constructed once, before any dependent
/// pipeline, and owned by the registry for the process lifetime.
pub trait VaeCodec: Send + Sync {
    /// Number of channels in the latent space.
    fn latent_channels(&self) -> usize;

    /// Projects a pixel image into latent space.
    fn encode(&self, image: &RgbImage) -> PipelineResult<Latent>;

    /// Decodes a latent batch into pixel images.
    fn decode(&self, latents: &Latent) -> PipelineResult<Vec<RgbImage>>;
}

/// Base text-to-image pipeline, producing latent output for the refiner.
pub trait BasePipeline: Send + Sync {
    /// Returns the pipeline's current scheduler configuration.
    fn scheduler_config(&self) -> SchedulerConfig;

    /// Replaces the pipeline's active scheduler.
    ///
    /// This mutates state shared by every job on this handle; the worker
    /// runs one job at a time, so jobs must not overlap.
    fn set_scheduler(&self, scheduler: Scheduler);

    /// Runs the base pass, producing one latent per requested image.
    fn generate_latents(
        &self,
        params: &BaseParams,
        generator: &mut Generator,
    ) -> PipelineResult<Vec<Latent>>;
}

/// Image-to-image refiner pipeline.
pub trait RefinerPipeline: Send + Sync {
    /// Finishes denoising latents handed off by the base pipeline.
    fn refine_latents(
        &self,
        params: &RefineLatentsParams,
        latents: Vec<Latent>,
        generator: &mut Generator,
    ) -> PipelineResult<Vec<RgbImage>>;

    /// Refines a starting pixel image directly.
    fn refine_image(
        &self,
        params: &RefineImageParams,
        image: &RgbImage,
        generator: &mut Generator,
    ) -> PipelineResult<Vec<RgbImage>>;
}

/// Mask-based inpainting pipeline.
pub trait InpaintPipeline: Send + Sync {
    /// Regenerates the masked region of the init image from the prompt.
    fn inpaint(
        &self,
        params: &InpaintParams,
        image: &RgbImage,
        mask: &RgbImage,
        generator: &mut Generator,
    ) -> PipelineResult<Vec<RgbImage>>;
}

/// Content safety pipeline applied to generated images before delivery.
pub trait SafetyPipeline: Send + Sync {
    /// Returns a possibly redacted image sequence of the same length and order.
    fn filter(&self, images: Vec<RgbImage>) -> PipelineResult<Vec<RgbImage>>;
}
