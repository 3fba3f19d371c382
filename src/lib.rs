//! sdxl-worker: serverless SDXL image generation worker.
//!
//! Accepts image-generation jobs, routes each through one of three GPU
//! pipelines (text-to-image with a latent refiner handoff, image-to-image
//! refinement, or mask-based inpainting), and returns the generated images
//! as uploaded URLs or inline base64 data URIs.
//!
//! # Modules
//!
//! - [`schema`]: Declarative input schema and validation
//! - [`pipelines`]: Pipeline traits, registry, scheduler selection, provider
//! - [`generation`]: Orchestrator and external image source
//! - [`output`]: Result assembly, upload, and workspace cleanup
//! - [`worker`]: Job handler and worker loop
//! - [`config`]: Runtime configuration (WorkerConfig, Device)
//! - [`error`]: Error types and codes (WorkerError, ErrorCode)
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use sdxl_worker::config::WorkerConfig;
//! use sdxl_worker::pipelines::{OnnxPipelineProvider, PipelineRegistry};
//! use sdxl_worker::types::Job;
//! use sdxl_worker::worker::{handle_job, WorkerContext};
//!
//! let config = WorkerConfig::from_env();
//! let provider = Arc::new(OnnxPipelineProvider::new(&config));
//! let registry = Arc::new(PipelineRegistry::new(provider)?);
//! registry.warm_up()?;
//!
//! let ctx = WorkerContext::new(config, registry)?;
//! let job: Job = serde_json::from_str(r#"{"id": "1", "input": {"prompt": "a cat"}}"#)?;
//! let response = handle_job(&ctx, &job);
//! ```

pub mod cli;
pub mod config;
pub mod error;
pub mod generation;
pub mod output;
pub mod pipelines;
pub mod schema;
pub mod types;
pub mod worker;

// Re-export commonly used types at crate root for convenience
pub use config::{Device, WorkerConfig};
pub use error::{ErrorCode, Result, WorkerError};
pub use types::{GenerationInput, Job, JobResponse};
