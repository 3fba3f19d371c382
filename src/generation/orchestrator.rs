//! Generation orchestrator.
//!
//! The control core: given validated input, selects a generation path,
//! invokes the pipelines in order through the registry, applies a
//! deterministic seed, and classifies failures. Runs one job at a time;
//! the base pipeline's scheduler slot is the only shared state it mutates.

use std::sync::Arc;

use image::RgbImage;

use crate::error::{Result, WorkerError};
use crate::pipelines::scheduler::Scheduler;
use crate::pipelines::{
    BaseParams, Generator, InpaintParams, PipelineError, PipelineRegistry, RefineImageParams,
    RefineLatentsParams,
};
use crate::types::GenerationInput;

use super::images::ImageSource;

/// Generation path chosen for a job from its validated input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationPath {
    /// Mask-based regeneration of an init image region.
    Inpaint,
    /// Direct image-to-image refinement of a starting image.
    RefineImage,
    /// Two-stage text-to-image: base produces latents, refiner finishes them.
    BaseAndRefine,
}

impl GenerationPath {
    /// Selects the path for a job.
    ///
    /// The inpaint flag wins; otherwise a starting image routes to the
    /// refiner, and pure text-to-image takes the two-stage composition.
    pub fn select(input: &GenerationInput) -> Self {
        if input.use_inpaint {
            GenerationPath::Inpaint
        } else if input.image_url.is_some() {
            GenerationPath::RefineImage
        } else {
            GenerationPath::BaseAndRefine
        }
    }

    /// Returns true if the path consumes an externally fetched starting image.
    ///
    /// Such jobs request a worker refresh: the one-shot image-conditioned
    /// composition leaves pipeline state the next job should not inherit.
    pub fn consumes_source_image(&self) -> bool {
        !matches!(self, GenerationPath::BaseAndRefine)
    }

    /// Returns the path name used in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            GenerationPath::Inpaint => "inpaint",
            GenerationPath::RefineImage => "refine-image",
            GenerationPath::BaseAndRefine => "base+refiner",
        }
    }
}

/// Result of a successful generation run.
#[derive(Debug)]
pub struct GenerationOutcome {
    /// Generated images, in request order.
    pub images: Vec<RgbImage>,
    /// The seed actually used, echoed so the run can be reproduced.
    pub seed: u64,
    /// Whether the external runtime should recycle the worker.
    pub refresh_worker: bool,
}

/// Drives a validated request through the pipelines to pixel output.
pub struct Orchestrator {
    registry: Arc<PipelineRegistry>,
    images: Arc<dyn ImageSource>,
}

impl Orchestrator {
    /// Creates an orchestrator over the given registry and image source.
    pub fn new(registry: Arc<PipelineRegistry>, images: Arc<dyn ImageSource>) -> Self {
        Self { registry, images }
    }

    /// Runs one job.
    ///
    /// The seed is taken from the request or drawn fresh; either way the
    /// response echoes the seed used, so a caller can resubmit it and
    /// reproduce the run.
    pub fn run(&self, input: &GenerationInput) -> Result<GenerationOutcome> {
        let seed = input.seed.unwrap_or_else(fresh_seed);
        let mut generator = Generator::manual_seed(seed);
        let path = GenerationPath::select(input);

        eprintln!("Running {} path (seed {})", path.as_str(), seed);

        let images = match path {
            GenerationPath::Inpaint => self.run_inpaint(input, &mut generator),
            GenerationPath::RefineImage => self.run_refine_image(input, &mut generator),
            GenerationPath::BaseAndRefine => self.run_base_and_refine(input, &mut generator),
        }?;

        // Every path's output passes the safety checker before assembly
        let safety = self.registry.safety_checker()?;
        let images = safety
            .filter(images)
            .map_err(|e| self.generic_failure(path, e.to_string()))?;

        Ok(GenerationOutcome {
            images,
            seed,
            refresh_worker: path.consumes_source_image(),
        })
    }

    fn run_inpaint(
        &self,
        input: &GenerationInput,
        generator: &mut Generator,
    ) -> Result<Vec<RgbImage>> {
        let image_url = input.image_url.as_deref().ok_or_else(|| {
            WorkerError::invalid_input("image_url is required for inpainting")
        })?;
        let mask_url = input.mask_url.as_deref().ok_or_else(|| {
            WorkerError::invalid_input("mask_url is required for inpainting")
        })?;

        let init_image = self.images.fetch(image_url)?;
        let mask_image = self.images.fetch(mask_url)?;

        let pipeline = self.registry.inpaint()?;
        let params = InpaintParams {
            prompt: input.prompt.clone(),
            negative_prompt: input.negative_prompt.clone(),
            steps: input.num_inference_steps,
            guidance_scale: input.guidance_scale,
        };

        pipeline
            .inpaint(&params, &init_image, &mask_image, generator)
            .map_err(|e| self.pipeline_failure(GenerationPath::Inpaint, e))
    }

    fn run_refine_image(
        &self,
        input: &GenerationInput,
        generator: &mut Generator,
    ) -> Result<Vec<RgbImage>> {
        let image_url = input.image_url.as_deref().ok_or_else(|| {
            WorkerError::invalid_input("image_url is required for refinement")
        })?;

        let init_image = self.images.fetch(image_url)?;

        let pipeline = self.registry.refiner()?;
        let params = RefineImageParams {
            prompt: input.prompt.clone(),
            negative_prompt: input.negative_prompt.clone(),
            steps: input.refiner_inference_steps,
            guidance_scale: input.guidance_scale,
            strength: input.strength,
        };

        pipeline
            .refine_image(&params, &init_image, generator)
            .map_err(|e| self.pipeline_failure(GenerationPath::RefineImage, e))
    }

    fn run_base_and_refine(
        &self,
        input: &GenerationInput,
        generator: &mut Generator,
    ) -> Result<Vec<RgbImage>> {
        let base = self.registry.base()?;

        // Substitute the requested sampler before the run. This mutates
        // shared pipeline state; jobs on this handle must not overlap.
        let scheduler = Scheduler::from_config(&input.scheduler, &base.scheduler_config())?;
        base.set_scheduler(scheduler);

        let base_params = BaseParams {
            prompt: input.prompt.clone(),
            negative_prompt: input.negative_prompt.clone(),
            width: input.width,
            height: input.height,
            steps: input.num_inference_steps,
            guidance_scale: input.guidance_scale,
            denoising_end: input.high_noise_frac,
            num_images: input.num_images,
        };
        let latents = base
            .generate_latents(&base_params, generator)
            .map_err(|e| self.pipeline_failure(GenerationPath::BaseAndRefine, e))?;

        // Latent handoff: no intermediate decode between the stages
        let refiner = self.registry.refiner()?;
        let refine_params = RefineLatentsParams {
            prompt: input.prompt.clone(),
            negative_prompt: input.negative_prompt.clone(),
            steps: input.num_inference_steps,
            guidance_scale: input.guidance_scale,
            denoising_start: input.high_noise_frac,
        };

        refiner
            .refine_latents(&refine_params, latents, generator)
            .map_err(|e| self.pipeline_failure(GenerationPath::BaseAndRefine, e))
    }

    /// Classifies a pipeline failure.
    ///
    /// Out-of-memory releases accelerator memory and fails the job without
    /// recycling; anything else is surfaced verbatim, with a refresh when
    /// the run consumed a starting image.
    fn pipeline_failure(&self, path: GenerationPath, err: PipelineError) -> WorkerError {
        match err {
            PipelineError::OutOfMemory(detail) => {
                eprintln!("Accelerator out of memory: {}", detail);
                self.registry.release_accelerator_memory();
                WorkerError::out_of_memory(detail)
            }
            PipelineError::Other(detail) => self.generic_failure(path, detail),
        }
    }

    fn generic_failure(&self, path: GenerationPath, detail: String) -> WorkerError {
        let err = WorkerError::inference_failed(detail);
        if path.consumes_source_image() {
            err.with_refresh()
        } else {
            err
        }
    }
}

/// Draws a fresh non-negative seed for requests that omit one.
fn fresh_seed() -> u64 {
    rand::random::<u32>() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::pipelines::provider::{FetchOptions, ModelProvider};
    use crate::pipelines::scheduler::{SchedulerConfig, SchedulerKind};
    use crate::pipelines::{
        BasePipeline, InpaintPipeline, Latent, PipelineResult, RefinerPipeline, SafetyPipeline,
        VaeCodec,
    };
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::sync::Mutex;

    /// Failure injected into a stub pipeline.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum FailMode {
        None,
        Oom,
        Other,
    }

    impl FailMode {
        fn to_error(self) -> Option<PipelineError> {
            match self {
                FailMode::None => None,
                FailMode::Oom => Some(PipelineError::OutOfMemory(
                    "mock allocation failure".to_string(),
                )),
                FailMode::Other => {
                    Some(PipelineError::Other("mock inference failure".to_string()))
                }
            }
        }
    }

    struct StubVae;

    impl VaeCodec for StubVae {
        fn latent_channels(&self) -> usize {
            4
        }

        fn encode(&self, _image: &RgbImage) -> PipelineResult<Latent> {
            Ok(Latent::zeros((1, 4, 8, 8)))
        }

        fn decode(&self, latents: &Latent) -> PipelineResult<Vec<RgbImage>> {
            Ok(vec![RgbImage::new(8, 8); latents.shape()[0]])
        }
    }

    #[derive(Default)]
    struct StubBase {
        fail: Mutex<Option<FailMode>>,
        calls: AtomicU32,
        schedulers_seen: Mutex<Vec<SchedulerKind>>,
    }

    impl BasePipeline for StubBase {
        fn scheduler_config(&self) -> SchedulerConfig {
            SchedulerConfig::default()
        }

        fn set_scheduler(&self, scheduler: Scheduler) {
            self.schedulers_seen.lock().unwrap().push(scheduler.kind());
        }

        fn generate_latents(
            &self,
            params: &BaseParams,
            _generator: &mut Generator,
        ) -> PipelineResult<Vec<Latent>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(err) = self.fail.lock().unwrap().and_then(FailMode::to_error) {
                return Err(err);
            }
            Ok(vec![Latent::zeros((1, 4, 8, 8)); params.num_images as usize])
        }
    }

    #[derive(Default)]
    struct StubRefiner {
        fail: Mutex<Option<FailMode>>,
        latent_calls: AtomicU32,
        image_calls: AtomicU32,
    }

    impl RefinerPipeline for StubRefiner {
        fn refine_latents(
            &self,
            _params: &RefineLatentsParams,
            latents: Vec<Latent>,
            _generator: &mut Generator,
        ) -> PipelineResult<Vec<RgbImage>> {
            self.latent_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(err) = self.fail.lock().unwrap().and_then(FailMode::to_error) {
                return Err(err);
            }
            Ok(vec![RgbImage::new(8, 8); latents.len()])
        }

        fn refine_image(
            &self,
            _params: &RefineImageParams,
            _image: &RgbImage,
            _generator: &mut Generator,
        ) -> PipelineResult<Vec<RgbImage>> {
            self.image_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(err) = self.fail.lock().unwrap().and_then(FailMode::to_error) {
                return Err(err);
            }
            Ok(vec![RgbImage::new(8, 8)])
        }
    }

    #[derive(Default)]
    struct StubInpaint {
        calls: AtomicU32,
    }

    impl InpaintPipeline for StubInpaint {
        fn inpaint(
            &self,
            _params: &InpaintParams,
            _image: &RgbImage,
            _mask: &RgbImage,
            _generator: &mut Generator,
        ) -> PipelineResult<Vec<RgbImage>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![RgbImage::new(8, 8)])
        }
    }

    #[derive(Default)]
    struct StubSafety {
        calls: AtomicU32,
    }

    impl SafetyPipeline for StubSafety {
        fn filter(&self, images: Vec<RgbImage>) -> PipelineResult<Vec<RgbImage>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(images)
        }
    }

    struct StubProvider {
        base: Arc<StubBase>,
        refiner: Arc<StubRefiner>,
        inpaint: Arc<StubInpaint>,
        safety: Arc<StubSafety>,
        released: AtomicBool,
    }

    impl Default for StubProvider {
        fn default() -> Self {
            Self {
                base: Arc::new(StubBase::default()),
                refiner: Arc::new(StubRefiner::default()),
                inpaint: Arc::new(StubInpaint::default()),
                safety: Arc::new(StubSafety::default()),
                released: AtomicBool::new(false),
            }
        }
    }

    impl ModelProvider for StubProvider {
        fn fetch_vae(
            &self,
            _model_id: &str,
            _options: &FetchOptions,
        ) -> crate::error::Result<Arc<dyn VaeCodec>> {
            Ok(Arc::new(StubVae))
        }

        fn fetch_base(
            &self,
            _model_id: &str,
            _options: &FetchOptions,
            _vae: Arc<dyn VaeCodec>,
        ) -> crate::error::Result<Arc<dyn BasePipeline>> {
            Ok(Arc::clone(&self.base) as Arc<dyn BasePipeline>)
        }

        fn fetch_refiner(
            &self,
            _model_id: &str,
            _options: &FetchOptions,
            _vae: Arc<dyn VaeCodec>,
        ) -> crate::error::Result<Arc<dyn RefinerPipeline>> {
            Ok(Arc::clone(&self.refiner) as Arc<dyn RefinerPipeline>)
        }

        fn fetch_inpaint(
            &self,
            _model_id: &str,
            _options: &FetchOptions,
            _vae: Arc<dyn VaeCodec>,
        ) -> crate::error::Result<Arc<dyn InpaintPipeline>> {
            Ok(Arc::clone(&self.inpaint) as Arc<dyn InpaintPipeline>)
        }

        fn fetch_safety_checker(
            &self,
            _model_id: &str,
            _options: &FetchOptions,
        ) -> crate::error::Result<Arc<dyn SafetyPipeline>> {
            Ok(Arc::clone(&self.safety) as Arc<dyn SafetyPipeline>)
        }

        fn release_accelerator_memory(&self) {
            self.released.store(true, Ordering::SeqCst);
        }
    }

    #[derive(Default)]
    struct StubSource {
        fail: bool,
        fetches: AtomicU32,
    }

    impl ImageSource for StubSource {
        fn fetch(&self, url: &str) -> crate::error::Result<RgbImage> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(WorkerError::image_fetch_failed(url, "connection refused"));
            }
            Ok(RgbImage::new(16, 16))
        }
    }

    fn harness_with(
        provider: Arc<StubProvider>,
        source: Arc<StubSource>,
    ) -> Orchestrator {
        let registry = Arc::new(
            PipelineRegistry::new(Arc::clone(&provider) as Arc<dyn ModelProvider>).unwrap(),
        );
        Orchestrator::new(registry, source as Arc<dyn ImageSource>)
    }

    fn harness() -> (Orchestrator, Arc<StubProvider>) {
        let provider = Arc::new(StubProvider::default());
        let orchestrator =
            harness_with(Arc::clone(&provider), Arc::new(StubSource::default()));
        (orchestrator, provider)
    }

    fn text_to_image_input() -> GenerationInput {
        GenerationInput {
            prompt: "a cat".to_string(),
            seed: Some(42),
            num_inference_steps: 30,
            ..GenerationInput::default()
        }
    }

    #[test]
    fn base_and_refine_produces_requested_count() {
        let (orchestrator, provider) = harness();
        let input = GenerationInput {
            num_images: 3,
            ..text_to_image_input()
        };

        let outcome = orchestrator.run(&input).unwrap();

        assert_eq!(outcome.images.len(), 3);
        assert_eq!(outcome.seed, 42);
        assert!(!outcome.refresh_worker);
        assert_eq!(provider.base.calls.load(Ordering::SeqCst), 1);
        assert_eq!(provider.refiner.latent_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn missing_seed_is_drawn_and_echoed() {
        let (orchestrator, _provider) = harness();
        let input = GenerationInput {
            seed: None,
            ..text_to_image_input()
        };

        let outcome = orchestrator.run(&input).unwrap();

        // Fresh seeds come from the u32 range, so they always fit the
        // non-negative contract and can be resubmitted verbatim
        assert!(outcome.seed <= u32::MAX as u64);

        let replay = GenerationInput {
            seed: Some(outcome.seed),
            ..input
        };
        let replayed = orchestrator.run(&replay).unwrap();
        assert_eq!(replayed.seed, outcome.seed);
    }

    #[test]
    fn requested_scheduler_is_substituted_before_the_run() {
        let (orchestrator, provider) = harness();
        let input = GenerationInput {
            scheduler: "Euler".to_string(),
            ..text_to_image_input()
        };

        orchestrator.run(&input).unwrap();

        let seen = provider.base.schedulers_seen.lock().unwrap();
        assert_eq!(seen.as_slice(), &[SchedulerKind::Euler]);
    }

    #[test]
    fn unknown_scheduler_fails_before_any_pipeline_runs() {
        let (orchestrator, provider) = harness();
        // Bypasses the schema on purpose; the selector still rejects
        let input = GenerationInput {
            scheduler: "TurboSampler".to_string(),
            ..text_to_image_input()
        };

        let err = orchestrator.run(&input).unwrap_err();

        assert_eq!(err.code, ErrorCode::UnknownScheduler);
        assert_eq!(provider.base.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn starting_image_routes_to_refiner_and_requests_refresh() {
        let (orchestrator, provider) = harness();
        let input = GenerationInput {
            image_url: Some("https://example.com/init.png".to_string()),
            ..text_to_image_input()
        };

        let outcome = orchestrator.run(&input).unwrap();

        assert!(outcome.refresh_worker);
        assert_eq!(provider.refiner.image_calls.load(Ordering::SeqCst), 1);
        assert_eq!(provider.base.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn inpaint_fetches_both_images_and_requests_refresh() {
        let provider = Arc::new(StubProvider::default());
        let source = Arc::new(StubSource::default());
        let orchestrator = harness_with(Arc::clone(&provider), Arc::clone(&source));

        let input = GenerationInput {
            use_inpaint: true,
            image_url: Some("https://example.com/init.png".to_string()),
            mask_url: Some("https://example.com/mask.png".to_string()),
            ..text_to_image_input()
        };

        let outcome = orchestrator.run(&input).unwrap();

        assert!(outcome.refresh_worker);
        assert_eq!(source.fetches.load(Ordering::SeqCst), 2);
        assert_eq!(provider.inpaint.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn every_path_passes_the_safety_checker() {
        let (orchestrator, provider) = harness();
        orchestrator.run(&text_to_image_input()).unwrap();
        assert_eq!(provider.safety.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn oom_releases_memory_and_fails_without_refresh() {
        let (orchestrator, provider) = harness();
        *provider.base.fail.lock().unwrap() = Some(FailMode::Oom);

        let err = orchestrator.run(&text_to_image_input()).unwrap_err();

        assert_eq!(err.code, ErrorCode::OutOfMemory);
        assert!(!err.refresh_worker);
        assert!(provider.released.load(Ordering::SeqCst));
    }

    #[test]
    fn generic_failure_on_text_path_does_not_refresh() {
        let (orchestrator, provider) = harness();
        *provider.base.fail.lock().unwrap() = Some(FailMode::Other);

        let err = orchestrator.run(&text_to_image_input()).unwrap_err();

        assert_eq!(err.code, ErrorCode::InferenceFailed);
        assert!(err.message.contains("mock inference failure"));
        assert!(!err.refresh_worker);
        assert!(!provider.released.load(Ordering::SeqCst));
    }

    #[test]
    fn generic_failure_on_image_path_requests_refresh() {
        let (orchestrator, provider) = harness();
        *provider.refiner.fail.lock().unwrap() = Some(FailMode::Other);

        let input = GenerationInput {
            image_url: Some("https://example.com/init.png".to_string()),
            ..text_to_image_input()
        };
        let err = orchestrator.run(&input).unwrap_err();

        assert_eq!(err.code, ErrorCode::InferenceFailed);
        assert!(err.refresh_worker);
    }

    #[test]
    fn image_fetch_failure_surfaces_without_pipeline_calls() {
        let provider = Arc::new(StubProvider::default());
        let source = Arc::new(StubSource {
            fail: true,
            ..StubSource::default()
        });
        let orchestrator = harness_with(Arc::clone(&provider), source);

        let input = GenerationInput {
            image_url: Some("https://example.com/init.png".to_string()),
            ..text_to_image_input()
        };
        let err = orchestrator.run(&input).unwrap_err();

        assert_eq!(err.code, ErrorCode::ImageFetchFailed);
        assert_eq!(provider.refiner.image_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn path_selection() {
        let mut input = GenerationInput::default();
        assert_eq!(
            GenerationPath::select(&input),
            GenerationPath::BaseAndRefine
        );

        input.image_url = Some("https://example.com/a.png".to_string());
        assert_eq!(GenerationPath::select(&input), GenerationPath::RefineImage);

        input.use_inpaint = true;
        assert_eq!(GenerationPath::select(&input), GenerationPath::Inpaint);
    }

    #[test]
    fn image_conditioned_paths_consume_the_source() {
        assert!(GenerationPath::Inpaint.consumes_source_image());
        assert!(GenerationPath::RefineImage.consumes_source_image());
        assert!(!GenerationPath::BaseAndRefine.consumes_source_image());
    }
}
