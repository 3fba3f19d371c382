//! Core data types for jobs, requests, and responses.

pub mod job;

pub use job::{GenerationInput, Job, JobResponse};
