//! ONNX Runtime-backed pipeline provider.
//!
//! Each pipeline handle wraps one exported ONNX graph holding the denoising
//! network. The host side encodes prompts, seeds noise, computes the
//! timestep schedule, and moves tensors across the session boundary; the
//! numerical stepping stays inside the graph.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use image::RgbImage;
use ndarray::Array4;
use ort::execution_providers::{CUDAExecutionProvider, ExecutionProviderDispatch};
use ort::session::Session;
use ort::value::Tensor;
use tokenizers::Tokenizer;

use crate::config::{Device, WorkerConfig};
use crate::error::{Result, WorkerError};

use super::downloader::{ensure_pipeline_models, ensure_vae_models, pipeline_dir, vae_dir};
use super::provider::{FetchOptions, ModelProvider};
use super::scheduler::{Scheduler, SchedulerConfig, SchedulerKind};
use super::{
    BaseParams, BasePipeline, Generator, InpaintParams, InpaintPipeline, Latent, PipelineError,
    PipelineKind, PipelineResult, RefineImageParams, RefineLatentsParams, RefinerPipeline,
    SafetyPipeline, VaeCodec,
};

/// Fixed token length for SDXL text conditioning.
const PROMPT_TOKEN_LENGTH: usize = 77;

/// Spatial compression factor between pixel and latent space.
const LATENT_DOWNSCALE: u32 = 8;

/// Channels in the SDXL latent space.
const LATENT_CHANNELS: usize = 4;

/// SDXL VAE latent scaling factor.
const VAE_SCALING_FACTOR: f32 = 0.13025;

/// ONNX Runtime-backed model provider.
///
/// Downloads missing exports into the model directory, loads one session
/// per pipeline, and binds sessions to the configured device.
pub struct OnnxPipelineProvider {
    model_dir: PathBuf,
    device: Device,
    threads: Option<u32>,
}

impl OnnxPipelineProvider {
    /// Creates a provider from the worker configuration.
    pub fn new(config: &WorkerConfig) -> Self {
        Self {
            model_dir: config.effective_model_path(),
            device: config.device,
            threads: config.threads,
        }
    }

    fn load_session(&self, path: &Path) -> Result<Session> {
        let mut builder = Session::builder().map_err(|e| {
            WorkerError::pipeline_load_failed(format!("Failed to create session: {}", e))
        })?;

        if let Some(threads) = self.threads {
            builder = builder.with_intra_threads(threads as usize).map_err(|e| {
                WorkerError::pipeline_load_failed(format!("Failed to set threads: {}", e))
            })?;
        }

        if matches!(self.device, Device::Auto | Device::Cuda) {
            builder = builder
                .with_execution_providers(accelerator_providers())
                .map_err(|e| {
                    WorkerError::pipeline_load_failed(format!(
                        "Failed to register execution providers: {}",
                        e
                    ))
                })?;
        }

        builder.commit_from_file(path).map_err(|e| {
            WorkerError::pipeline_load_failed(format!("Failed to load {}: {}", path.display(), e))
        })
    }

    fn load_tokenizer(&self, dir: &Path) -> Result<Tokenizer> {
        Tokenizer::from_file(dir.join("tokenizer.json")).map_err(|e| {
            WorkerError::pipeline_load_failed(format!("Failed to load tokenizer: {}", e))
        })
    }
}

/// Execution providers for GPU placement, in preference order.
///
/// Registration silently falls back to CPU when CUDA is unavailable, which
/// is the desired behavior for `Device::Auto`.
fn accelerator_providers() -> Vec<ExecutionProviderDispatch> {
    vec![CUDAExecutionProvider::default().build()]
}

impl ModelProvider for OnnxPipelineProvider {
    fn fetch_vae(&self, model_id: &str, options: &FetchOptions) -> Result<Arc<dyn VaeCodec>> {
        ensure_vae_models(&self.model_dir, model_id, options)?;
        let dir = vae_dir(&self.model_dir);

        let decoder = self.load_session(&dir.join("vae_decoder.onnx"))?;
        let encoder = self.load_session(&dir.join("vae_encoder.onnx"))?;

        Ok(Arc::new(OnnxVaeCodec {
            decoder: Mutex::new(decoder),
            encoder: Mutex::new(encoder),
        }))
    }

    fn fetch_base(
        &self,
        model_id: &str,
        options: &FetchOptions,
        vae: Arc<dyn VaeCodec>,
    ) -> Result<Arc<dyn BasePipeline>> {
        ensure_pipeline_models(&self.model_dir, PipelineKind::Base, model_id, options)?;
        let dir = pipeline_dir(&self.model_dir, PipelineKind::Base);

        let session = self.load_session(&dir.join("model.onnx"))?;
        let tokenizer = self.load_tokenizer(&dir)?;

        Ok(Arc::new(OnnxBasePipeline {
            session: Mutex::new(session),
            tokenizer,
            scheduler: Mutex::new(Scheduler::new(
                SchedulerKind::default(),
                SchedulerConfig::default(),
            )),
            vae,
        }))
    }

    fn fetch_refiner(
        &self,
        model_id: &str,
        options: &FetchOptions,
        vae: Arc<dyn VaeCodec>,
    ) -> Result<Arc<dyn RefinerPipeline>> {
        ensure_pipeline_models(&self.model_dir, PipelineKind::Refiner, model_id, options)?;
        let dir = pipeline_dir(&self.model_dir, PipelineKind::Refiner);

        let session = self.load_session(&dir.join("model.onnx"))?;
        let tokenizer = self.load_tokenizer(&dir)?;

        Ok(Arc::new(OnnxRefinerPipeline {
            session: Mutex::new(session),
            tokenizer,
            scheduler: Scheduler::new(SchedulerKind::default(), SchedulerConfig::default()),
            vae,
        }))
    }

    fn fetch_inpaint(
        &self,
        model_id: &str,
        options: &FetchOptions,
        vae: Arc<dyn VaeCodec>,
    ) -> Result<Arc<dyn InpaintPipeline>> {
        ensure_pipeline_models(&self.model_dir, PipelineKind::Inpaint, model_id, options)?;
        let dir = pipeline_dir(&self.model_dir, PipelineKind::Inpaint);

        let session = self.load_session(&dir.join("model.onnx"))?;
        let tokenizer = self.load_tokenizer(&dir)?;

        Ok(Arc::new(OnnxInpaintPipeline {
            session: Mutex::new(session),
            tokenizer,
            scheduler: Scheduler::new(SchedulerKind::default(), SchedulerConfig::default()),
            vae,
        }))
    }

    fn fetch_safety_checker(
        &self,
        model_id: &str,
        options: &FetchOptions,
    ) -> Result<Arc<dyn SafetyPipeline>> {
        ensure_pipeline_models(
            &self.model_dir,
            PipelineKind::SafetyChecker,
            model_id,
            options,
        )?;
        let dir = pipeline_dir(&self.model_dir, PipelineKind::SafetyChecker);

        let session = self.load_session(&dir.join("model.onnx"))?;

        Ok(Arc::new(OnnxSafetyPipeline {
            session: Mutex::new(session),
        }))
    }

    fn release_accelerator_memory(&self) {
        // The runtime's arena returns the failed run's allocations once its
        // tensors drop; session weights stay resident for the next job.
        eprintln!("Releasing accelerator memory held by the failed run");
    }
}

/// Shared VAE backed by encoder and decoder sessions.
struct OnnxVaeCodec {
    decoder: Mutex<Session>,
    encoder: Mutex<Session>,
}

impl VaeCodec for OnnxVaeCodec {
    fn latent_channels(&self) -> usize {
        LATENT_CHANNELS
    }

    fn encode(&self, image: &RgbImage) -> PipelineResult<Latent> {
        let (height, width, data) = image_to_tensor_data(image);
        let sample = Tensor::from_array(([1usize, 3, height, width], data))
            .map_err(|e| PipelineError::Other(format!("Failed to create image tensor: {}", e)))?;

        let mut session = self.encoder.lock().unwrap();
        let mut outputs = session
            .run(ort::inputs!["sample" => sample])
            .map_err(|e| classify_inference_error("VAE encode", &e.to_string()))?;

        let latent = outputs.remove("latent_sample").ok_or_else(|| {
            PipelineError::Other("latent_sample not found in VAE encoder output".to_string())
        })?;

        let (shape, data) = latent
            .try_extract_tensor::<f32>()
            .map_err(|e| PipelineError::Other(format!("Failed to extract latent: {}", e)))?;
        let dims: Vec<usize> = shape.iter().map(|&d| d as usize).collect();
        if dims.len() != 4 {
            return Err(PipelineError::Other(format!(
                "Unexpected VAE encoder output shape: {:?}",
                dims
            )));
        }

        let scaled: Vec<f32> = data.iter().map(|v| v * VAE_SCALING_FACTOR).collect();
        Array4::from_shape_vec((dims[0], dims[1], dims[2], dims[3]), scaled)
            .map_err(|e| PipelineError::Other(format!("Failed to reshape latent: {}", e)))
    }

    fn decode(&self, latents: &Latent) -> PipelineResult<Vec<RgbImage>> {
        let shape = latents.shape();
        let scaled: Vec<f32> = latents.iter().map(|v| v / VAE_SCALING_FACTOR).collect();
        let tensor = Tensor::from_array(([shape[0], shape[1], shape[2], shape[3]], scaled))
            .map_err(|e| PipelineError::Other(format!("Failed to create latent tensor: {}", e)))?;

        let mut session = self.decoder.lock().unwrap();
        let mut outputs = session
            .run(ort::inputs!["latent_sample" => tensor])
            .map_err(|e| classify_inference_error("VAE decode", &e.to_string()))?;

        let sample = outputs.remove("sample").ok_or_else(|| {
            PipelineError::Other("sample not found in VAE decoder output".to_string())
        })?;

        let (out_shape, data) = sample
            .try_extract_tensor::<f32>()
            .map_err(|e| PipelineError::Other(format!("Failed to extract sample: {}", e)))?;
        let dims: Vec<usize> = out_shape.iter().map(|&d| d as usize).collect();

        tensor_batch_to_images(&dims, data)
    }
}

/// Base text-to-image pipeline backed by an ONNX session.
struct OnnxBasePipeline {
    session: Mutex<Session>,
    tokenizer: Tokenizer,
    /// Active scheduler, replaced per job by the orchestrator. The sole
    /// per-job mutable shared state on any pipeline handle.
    scheduler: Mutex<Scheduler>,
    vae: Arc<dyn VaeCodec>,
}

impl BasePipeline for OnnxBasePipeline {
    fn scheduler_config(&self) -> SchedulerConfig {
        self.scheduler.lock().unwrap().config().clone()
    }

    fn set_scheduler(&self, scheduler: Scheduler) {
        *self.scheduler.lock().unwrap() = scheduler;
    }

    fn generate_latents(
        &self,
        params: &BaseParams,
        generator: &mut Generator,
    ) -> PipelineResult<Vec<Latent>> {
        let scheduler = self.scheduler.lock().unwrap().clone();
        // Base covers only the high-noise window; the refiner finishes the rest
        let timesteps = scheduler.timestep_window(params.steps, 0.0, params.denoising_end);

        let prompt_ids = encode_prompt(&self.tokenizer, &params.prompt)?;
        let negative_ids = encode_prompt(&self.tokenizer, &params.negative_prompt)?;

        let latent_height = (params.height / LATENT_DOWNSCALE) as usize;
        let latent_width = (params.width / LATENT_DOWNSCALE) as usize;
        let channels = self.vae.latent_channels();

        let mut latents = Vec::with_capacity(params.num_images as usize);
        for _ in 0..params.num_images {
            let noise = generator.noise((1, channels, latent_height, latent_width));
            let latent = run_denoise(
                &self.session,
                "base denoise",
                &prompt_ids,
                &negative_ids,
                &noise,
                &timesteps,
                params.guidance_scale as f32,
            )?;
            latents.push(latent);
        }

        Ok(latents)
    }
}

/// Refiner pipeline backed by an ONNX session.
struct OnnxRefinerPipeline {
    session: Mutex<Session>,
    tokenizer: Tokenizer,
    /// Fixed default-family scheduler; per-job substitution applies to the
    /// base pipeline only.
    scheduler: Scheduler,
    vae: Arc<dyn VaeCodec>,
}

impl RefinerPipeline for OnnxRefinerPipeline {
    fn refine_latents(
        &self,
        params: &RefineLatentsParams,
        latents: Vec<Latent>,
        _generator: &mut Generator,
    ) -> PipelineResult<Vec<RgbImage>> {
        // Pick up the schedule where the base pass stopped
        let timesteps =
            self.scheduler
                .timestep_window(params.steps, params.denoising_start, 1.0);

        let prompt_ids = encode_prompt(&self.tokenizer, &params.prompt)?;
        let negative_ids = encode_prompt(&self.tokenizer, &params.negative_prompt)?;

        let mut images = Vec::with_capacity(latents.len());
        for latent in &latents {
            let refined = run_denoise(
                &self.session,
                "refiner denoise",
                &prompt_ids,
                &negative_ids,
                latent,
                &timesteps,
                params.guidance_scale as f32,
            )?;
            let mut decoded = self.vae.decode(&refined)?;
            images.append(&mut decoded);
        }

        Ok(images)
    }

    fn refine_image(
        &self,
        params: &RefineImageParams,
        image: &RgbImage,
        generator: &mut Generator,
    ) -> PipelineResult<Vec<RgbImage>> {
        // Strength controls how far back into the schedule the image is pushed
        let steps = (((params.steps as f64) * params.strength).ceil() as u32).max(1);
        let timesteps = self.scheduler.timesteps(steps);

        let prompt_ids = encode_prompt(&self.tokenizer, &params.prompt)?;
        let negative_ids = encode_prompt(&self.tokenizer, &params.negative_prompt)?;

        let mut latent = self.vae.encode(image)?;
        let shape = latent.shape();
        let noise = generator.noise((shape[0], shape[1], shape[2], shape[3]));
        // Renoise the encoded image to the start of the replayed window
        let start_frac = timesteps[0] / (self.scheduler.config().num_train_timesteps as f32);
        latent = &latent * (1.0 - start_frac) + &noise * start_frac;

        let refined = run_denoise(
            &self.session,
            "refiner img2img",
            &prompt_ids,
            &negative_ids,
            &latent,
            &timesteps,
            params.guidance_scale as f32,
        )?;

        self.vae.decode(&refined)
    }
}

/// Inpainting pipeline backed by an ONNX session.
struct OnnxInpaintPipeline {
    session: Mutex<Session>,
    tokenizer: Tokenizer,
    scheduler: Scheduler,
    vae: Arc<dyn VaeCodec>,
}

impl InpaintPipeline for OnnxInpaintPipeline {
    fn inpaint(
        &self,
        params: &InpaintParams,
        image: &RgbImage,
        mask: &RgbImage,
        generator: &mut Generator,
    ) -> PipelineResult<Vec<RgbImage>> {
        let timesteps = self.scheduler.timesteps(params.steps);

        let prompt_ids = encode_prompt(&self.tokenizer, &params.prompt)?;
        let negative_ids = encode_prompt(&self.tokenizer, &params.negative_prompt)?;

        let (height, width, image_data) = image_to_tensor_data(image);
        let mask_data = mask_to_tensor_data(mask);
        let noise = generator.noise((
            1,
            self.vae.latent_channels(),
            height / LATENT_DOWNSCALE as usize,
            width / LATENT_DOWNSCALE as usize,
        ));
        let noise_shape = noise.shape().to_vec();
        let noise_data: Vec<f32> = noise.iter().copied().collect();

        let prompt_tensor = ids_tensor(&prompt_ids)?;
        let negative_tensor = ids_tensor(&negative_ids)?;
        let image_tensor = Tensor::from_array(([1usize, 3, height, width], image_data))
            .map_err(|e| PipelineError::Other(format!("Failed to create image tensor: {}", e)))?;
        let mask_tensor =
            Tensor::from_array(([1usize, 1, mask.height() as usize, mask.width() as usize], mask_data))
                .map_err(|e| {
                    PipelineError::Other(format!("Failed to create mask tensor: {}", e))
                })?;
        let noise_tensor = Tensor::from_array((
            [noise_shape[0], noise_shape[1], noise_shape[2], noise_shape[3]],
            noise_data,
        ))
        .map_err(|e| PipelineError::Other(format!("Failed to create noise tensor: {}", e)))?;
        let timesteps_tensor = Tensor::from_array(([timesteps.len()], timesteps.clone()))
            .map_err(|e| PipelineError::Other(format!("Failed to create timestep tensor: {}", e)))?;
        let guidance_tensor =
            Tensor::from_array(([1usize], vec![params.guidance_scale as f32])).map_err(|e| {
                PipelineError::Other(format!("Failed to create guidance tensor: {}", e))
            })?;

        let mut session = self.session.lock().unwrap();
        let mut outputs = session
            .run(ort::inputs![
                "prompt_ids" => prompt_tensor,
                "negative_prompt_ids" => negative_tensor,
                "image" => image_tensor,
                "mask" => mask_tensor,
                "latents" => noise_tensor,
                "timesteps" => timesteps_tensor,
                "guidance_scale" => guidance_tensor
            ])
            .map_err(|e| classify_inference_error("inpaint denoise", &e.to_string()))?;

        let latent = outputs.remove("latents").ok_or_else(|| {
            PipelineError::Other("latents not found in inpaint output".to_string())
        })?;
        let (shape, data) = latent
            .try_extract_tensor::<f32>()
            .map_err(|e| PipelineError::Other(format!("Failed to extract latents: {}", e)))?;
        let dims: Vec<usize> = shape.iter().map(|&d| d as usize).collect();
        if dims.len() != 4 {
            return Err(PipelineError::Other(format!(
                "Unexpected inpaint output shape: {:?}",
                dims
            )));
        }
        let refined = Array4::from_shape_vec((dims[0], dims[1], dims[2], dims[3]), data.to_vec())
            .map_err(|e| PipelineError::Other(format!("Failed to reshape latents: {}", e)))?;

        self.vae.decode(&refined)
    }
}

/// Content safety checker backed by an ONNX session.
struct OnnxSafetyPipeline {
    session: Mutex<Session>,
}

impl SafetyPipeline for OnnxSafetyPipeline {
    fn filter(&self, images: Vec<RgbImage>) -> PipelineResult<Vec<RgbImage>> {
        let mut filtered = Vec::with_capacity(images.len());

        for image in &images {
            let (height, width, data) = image_to_tensor_data(image);
            let tensor = Tensor::from_array(([1usize, 3, height, width], data)).map_err(|e| {
                PipelineError::Other(format!("Failed to create image tensor: {}", e))
            })?;

            let mut session = self.session.lock().unwrap();
            let mut outputs = session
                .run(ort::inputs!["images" => tensor])
                .map_err(|e| classify_inference_error("safety check", &e.to_string()))?;

            let checked = outputs.remove("images").ok_or_else(|| {
                PipelineError::Other("images not found in safety checker output".to_string())
            })?;
            let (shape, data) = checked
                .try_extract_tensor::<f32>()
                .map_err(|e| PipelineError::Other(format!("Failed to extract images: {}", e)))?;
            let dims: Vec<usize> = shape.iter().map(|&d| d as usize).collect();

            let mut batch = tensor_batch_to_images(&dims, data)?;
            filtered.append(&mut batch);
        }

        Ok(filtered)
    }
}

/// Runs one denoising session over the given timestep window.
fn run_denoise(
    session: &Mutex<Session>,
    context: &str,
    prompt_ids: &ndarray::Array2<i64>,
    negative_ids: &ndarray::Array2<i64>,
    latents: &Latent,
    timesteps: &[f32],
    guidance_scale: f32,
) -> PipelineResult<Latent> {
    let prompt_tensor = ids_tensor(prompt_ids)?;
    let negative_tensor = ids_tensor(negative_ids)?;

    let shape = latents.shape();
    let latent_data: Vec<f32> = latents.iter().copied().collect();
    let latent_tensor = Tensor::from_array(([shape[0], shape[1], shape[2], shape[3]], latent_data))
        .map_err(|e| PipelineError::Other(format!("Failed to create latent tensor: {}", e)))?;

    let timesteps_tensor = Tensor::from_array(([timesteps.len()], timesteps.to_vec()))
        .map_err(|e| PipelineError::Other(format!("Failed to create timestep tensor: {}", e)))?;
    let guidance_tensor = Tensor::from_array(([1usize], vec![guidance_scale]))
        .map_err(|e| PipelineError::Other(format!("Failed to create guidance tensor: {}", e)))?;

    let mut session = session.lock().unwrap();
    let mut outputs = session
        .run(ort::inputs![
            "prompt_ids" => prompt_tensor,
            "negative_prompt_ids" => negative_tensor,
            "latents" => latent_tensor,
            "timesteps" => timesteps_tensor,
            "guidance_scale" => guidance_tensor
        ])
        .map_err(|e| classify_inference_error(context, &e.to_string()))?;

    let latent = outputs
        .remove("latents")
        .ok_or_else(|| PipelineError::Other(format!("latents not found in {} output", context)))?;

    let (out_shape, data) = latent
        .try_extract_tensor::<f32>()
        .map_err(|e| PipelineError::Other(format!("Failed to extract latents: {}", e)))?;
    let dims: Vec<usize> = out_shape.iter().map(|&d| d as usize).collect();
    if dims.len() != 4 {
        return Err(PipelineError::Other(format!(
            "Unexpected {} output shape: {:?}",
            context, dims
        )));
    }

    Array4::from_shape_vec((dims[0], dims[1], dims[2], dims[3]), data.to_vec())
        .map_err(|e| PipelineError::Other(format!("Failed to reshape latents: {}", e)))
}

/// Encodes a prompt to a fixed-length token id row.
fn encode_prompt(
    tokenizer: &Tokenizer,
    text: &str,
) -> PipelineResult<ndarray::Array2<i64>> {
    let mut ids: Vec<i64> = tokenizer
        .encode(text, true)
        .map_err(|e| PipelineError::Other(format!("Tokenization failed: {}", e)))?
        .get_ids()
        .iter()
        .map(|id| *id as i64)
        .collect();

    // Pad or truncate to the conditioning length
    ids.resize(PROMPT_TOKEN_LENGTH, 0);

    ndarray::Array2::from_shape_vec((1, PROMPT_TOKEN_LENGTH), ids)
        .map_err(|e| PipelineError::Other(format!("Failed to shape token ids: {}", e)))
}

/// Builds a tensor from a token id row.
fn ids_tensor(ids: &ndarray::Array2<i64>) -> PipelineResult<Tensor<i64>> {
    let data: Vec<i64> = ids.iter().copied().collect();
    Tensor::from_array(([1usize, ids.len()], data))
        .map_err(|e| PipelineError::Other(format!("Failed to create token tensor: {}", e)))
}

/// Converts an RGB image to CHW tensor data in [-1, 1].
fn image_to_tensor_data(image: &RgbImage) -> (usize, usize, Vec<f32>) {
    let width = image.width() as usize;
    let height = image.height() as usize;

    let mut data = vec![0.0f32; 3 * height * width];
    for (x, y, pixel) in image.enumerate_pixels() {
        let (x, y) = (x as usize, y as usize);
        for c in 0..3 {
            data[(c * height + y) * width + x] = (pixel[c] as f32 / 127.5) - 1.0;
        }
    }

    (height, width, data)
}

/// Converts a mask image to single-channel coverage data in [0, 1].
fn mask_to_tensor_data(mask: &RgbImage) -> Vec<f32> {
    let width = mask.width() as usize;
    let height = mask.height() as usize;

    let mut data = vec![0.0f32; height * width];
    for (x, y, pixel) in mask.enumerate_pixels() {
        // Any lit channel marks the pixel for regeneration
        let lit = pixel.0.iter().copied().max().unwrap_or(0);
        data[(y as usize) * width + (x as usize)] = lit as f32 / 255.0;
    }

    data
}

/// Converts a NCHW f32 batch in [-1, 1] back into RGB images.
fn tensor_batch_to_images(dims: &[usize], data: &[f32]) -> PipelineResult<Vec<RgbImage>> {
    if dims.len() != 4 || dims[1] != 3 {
        return Err(PipelineError::Other(format!(
            "Expected NCHW image batch with 3 channels, got shape {:?}",
            dims
        )));
    }
    let (batch, channels, height, width) = (dims[0], dims[1], dims[2], dims[3]);

    let mut images = Vec::with_capacity(batch);
    for b in 0..batch {
        let mut pixels = vec![0u8; height * width * 3];
        for c in 0..channels {
            for y in 0..height {
                for x in 0..width {
                    let value = data[((b * channels + c) * height + y) * width + x];
                    pixels[(y * width + x) * 3 + c] =
                        ((value.clamp(-1.0, 1.0) + 1.0) * 127.5) as u8;
                }
            }
        }

        let image = RgbImage::from_raw(width as u32, height as u32, pixels).ok_or_else(|| {
            PipelineError::Other("image buffer size mismatch".to_string())
        })?;
        images.push(image);
    }

    Ok(images)
}

/// Classifies a runtime failure, separating accelerator memory exhaustion
/// from other errors.
fn classify_inference_error(context: &str, message: &str) -> PipelineError {
    let full = format!("{}: {}", context, message);
    let lower = full.to_lowercase();

    if lower.contains("out of memory")
        || lower.contains("cuda_error_out_of_memory")
        || lower.contains("cudamalloc")
        || lower.contains("oom")
    {
        PipelineError::OutOfMemory(full)
    } else {
        PipelineError::Other(full)
    }
}
