//! Per-job request handling.
//!
//! Stages run strictly in order: validate, generate, assemble. Validation
//! failures return immediately with field-level detail and touch no
//! pipeline; generation and assembly failures become error responses with
//! the recycling policy the orchestrator decided.

use std::sync::Arc;

use crate::config::WorkerConfig;
use crate::error::Result;
use crate::generation::{HttpImageSource, ImageSource, Orchestrator};
use crate::output::{self, BucketUploader, ObjectStore};
use crate::pipelines::PipelineRegistry;
use crate::schema::{render_violations, validate};
use crate::types::{Job, JobResponse};

/// Everything a job needs: configuration, orchestrator, and the optional
/// object store selected by the bucket endpoint setting.
pub struct WorkerContext {
    config: WorkerConfig,
    orchestrator: Orchestrator,
    store: Option<Box<dyn ObjectStore>>,
}

impl WorkerContext {
    /// Builds a context over a ready registry, with the HTTP image source.
    pub fn new(config: WorkerConfig, registry: Arc<PipelineRegistry>) -> Result<Self> {
        let images = Arc::new(HttpImageSource::new()?);
        Self::with_source(config, registry, images)
    }

    /// Builds a context with a custom image source.
    pub fn with_source(
        config: WorkerConfig,
        registry: Arc<PipelineRegistry>,
        images: Arc<dyn ImageSource>,
    ) -> Result<Self> {
        let store: Option<Box<dyn ObjectStore>> = match &config.bucket_endpoint_url {
            Some(endpoint) => Some(Box::new(BucketUploader::new(endpoint)?)),
            None => None,
        };

        Ok(Self {
            config,
            orchestrator: Orchestrator::new(registry, images),
            store,
        })
    }

    /// Returns the worker configuration.
    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }
}

/// Handles one job end to end, always producing a response.
pub fn handle_job(ctx: &WorkerContext, job: &Job) -> JobResponse {
    let input = match validate(&job.input) {
        Ok(input) => input,
        Err(violations) => {
            return JobResponse::error(render_violations(&violations), false);
        }
    };

    let outcome = match ctx.orchestrator.run(&input) {
        Ok(outcome) => outcome,
        Err(err) => return JobResponse::error(err.to_string(), err.refresh_worker),
    };

    let refresh = outcome.refresh_worker;
    match output::assemble_response(
        &ctx.config.effective_cache_path(),
        &job.id,
        &outcome,
        ctx.store.as_deref(),
    ) {
        Ok(response) => response,
        // The run already consumed its inputs, so the recycling decision
        // stands even when delivery fails
        Err(err) => JobResponse::error(err.to_string(), refresh || err.refresh_worker),
    }
}
