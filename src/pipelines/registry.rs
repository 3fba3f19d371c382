//! Pipeline registry owning the singleton pipeline handles.
//!
//! One optional slot per pipeline kind, each constructed on first use under
//! a mutual-exclusion guard and cached for the process lifetime. The shared
//! VAE is constructed eagerly, before any pipeline that depends on it. The
//! registry is injected into the orchestrator rather than living in global
//! state.

use std::sync::{Arc, Mutex};

use crate::error::{Result, WorkerError};

use super::provider::{fetch_with_retry, FetchOptions, ModelProvider};
use super::{
    BasePipeline, InpaintPipeline, RefinerPipeline, SafetyPipeline, VaeCodec, BASE_MODEL_ID,
    INPAINT_MODEL_ID, REFINER_MODEL_ID, SAFETY_MODEL_ID, VAE_MODEL_ID,
};

/// Owns lazily-constructed handles to the generation pipelines.
///
/// Accessor discipline: the first caller constructs under the slot lock;
/// late callers for the same uninitialized kind wait on the lock and reuse
/// the cached handle. Construction work happens at most once per kind.
pub struct PipelineRegistry {
    provider: Arc<dyn ModelProvider>,
    vae: Arc<dyn VaeCodec>,
    base: Mutex<Option<Arc<dyn BasePipeline>>>,
    refiner: Mutex<Option<Arc<dyn RefinerPipeline>>>,
    inpaint: Mutex<Option<Arc<dyn InpaintPipeline>>>,
    safety_checker: Mutex<Option<Arc<dyn SafetyPipeline>>>,
}

impl PipelineRegistry {
    /// Creates the registry, fetching the shared VAE up front.
    ///
    /// Fetch failure here is fatal: without the shared decoder no pipeline
    /// can be constructed.
    pub fn new(provider: Arc<dyn ModelProvider>) -> Result<Self> {
        let vae = fetch_with_retry("VAE", || {
            provider.fetch_vae(VAE_MODEL_ID, &FetchOptions::fp16())
        })?;

        Ok(Self {
            provider,
            vae,
            base: Mutex::new(None),
            refiner: Mutex::new(None),
            inpaint: Mutex::new(None),
            safety_checker: Mutex::new(None),
        })
    }

    /// Returns the shared VAE.
    pub fn vae(&self) -> Arc<dyn VaeCodec> {
        Arc::clone(&self.vae)
    }

    /// Returns the base pipeline, constructing it on first use.
    pub fn base(&self) -> Result<Arc<dyn BasePipeline>> {
        let mut slot = self.base.lock().unwrap();
        if let Some(pipeline) = slot.as_ref() {
            return Ok(Arc::clone(pipeline));
        }

        eprintln!("Loading base pipeline ({})...", BASE_MODEL_ID);
        let pipeline = fetch_with_retry("base pipeline", || {
            self.provider
                .fetch_base(BASE_MODEL_ID, &FetchOptions::fp16(), Arc::clone(&self.vae))
        })?;
        *slot = Some(Arc::clone(&pipeline));
        Ok(pipeline)
    }

    /// Returns the refiner pipeline, constructing it on first use.
    pub fn refiner(&self) -> Result<Arc<dyn RefinerPipeline>> {
        let mut slot = self.refiner.lock().unwrap();
        if let Some(pipeline) = slot.as_ref() {
            return Ok(Arc::clone(pipeline));
        }

        eprintln!("Loading refiner pipeline ({})...", REFINER_MODEL_ID);
        let pipeline = fetch_with_retry("refiner pipeline", || {
            self.provider.fetch_refiner(
                REFINER_MODEL_ID,
                &FetchOptions::fp16(),
                Arc::clone(&self.vae),
            )
        })?;
        *slot = Some(Arc::clone(&pipeline));
        Ok(pipeline)
    }

    /// Returns the inpainting pipeline, constructing it on first use.
    pub fn inpaint(&self) -> Result<Arc<dyn InpaintPipeline>> {
        let mut slot = self.inpaint.lock().unwrap();
        if let Some(pipeline) = slot.as_ref() {
            return Ok(Arc::clone(pipeline));
        }

        eprintln!("Loading inpaint pipeline ({})...", INPAINT_MODEL_ID);
        let pipeline = fetch_with_retry("inpaint pipeline", || {
            self.provider.fetch_inpaint(
                INPAINT_MODEL_ID,
                &FetchOptions::fp16(),
                Arc::clone(&self.vae),
            )
        })?;
        *slot = Some(Arc::clone(&pipeline));
        Ok(pipeline)
    }

    /// Returns the safety checker, constructing it on first use.
    pub fn safety_checker(&self) -> Result<Arc<dyn SafetyPipeline>> {
        let mut slot = self.safety_checker.lock().unwrap();
        if let Some(pipeline) = slot.as_ref() {
            return Ok(Arc::clone(pipeline));
        }

        eprintln!("Loading safety checker ({})...", SAFETY_MODEL_ID);
        let pipeline = fetch_with_retry("safety checker", || {
            self.provider
                .fetch_safety_checker(SAFETY_MODEL_ID, &FetchOptions::fp16())
        })?;
        *slot = Some(Arc::clone(&pipeline));
        Ok(pipeline)
    }

    /// Constructs every pipeline ahead of the first job.
    ///
    /// Base and refiner do not depend on one another, so they are built on
    /// parallel threads to cut cold-start latency; results are joined before
    /// the registry is considered ready. Any failure is fatal to startup.
    pub fn warm_up(&self) -> Result<()> {
        eprintln!("Provisioning pipelines...");

        std::thread::scope(|scope| {
            let base = scope.spawn(|| self.base().map(|_| ()));
            let refiner = scope.spawn(|| self.refiner().map(|_| ()));

            join_construction(base.join())?;
            join_construction(refiner.join())
        })?;

        self.inpaint()?;
        self.safety_checker()?;

        eprintln!("All pipelines ready.");
        Ok(())
    }

    /// Releases accelerator memory via the provider.
    ///
    /// Called by the orchestrator when a run fails with an out-of-memory
    /// condition, before the error response is returned.
    pub fn release_accelerator_memory(&self) {
        self.provider.release_accelerator_memory();
    }
}

/// Unwraps a construction thread's result, converting a panic into a load error.
fn join_construction(result: std::thread::Result<Result<()>>) -> Result<()> {
    match result {
        Ok(outcome) => outcome,
        Err(_) => Err(WorkerError::pipeline_load_failed(
            "pipeline construction thread panicked",
        )),
    }
}
