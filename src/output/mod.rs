//! Result assembly.
//!
//! Persists generated images under a job-scoped workspace, delivers them as
//! uploaded URLs when a bucket endpoint is configured or inline base64 data
//! URIs otherwise, and removes the workspace unconditionally so no job
//! leaves residual files.

pub mod upload;

use std::io::Cursor;
use std::path::{Path, PathBuf};

use base64::prelude::BASE64_STANDARD;
use base64::Engine;
use image::RgbImage;

use crate::error::{Result, WorkerError};
use crate::generation::GenerationOutcome;
use crate::types::JobResponse;

// Re-export commonly used types
pub use upload::{BucketUploader, ObjectStore};

/// Job-scoped temporary workspace.
///
/// Removed on drop, so cleanup holds on every exit path regardless of the
/// upload-vs-inline branch or failures inside it.
pub struct JobWorkspace {
    dir: PathBuf,
}

impl JobWorkspace {
    /// Creates the workspace directory for a job.
    pub fn create(cache_dir: &Path, job_id: &str) -> Result<Self> {
        let dir = cache_dir.join(job_id);
        std::fs::create_dir_all(&dir).map_err(|e| {
            WorkerError::output_failed(format!(
                "Failed to create workspace {}: {}",
                dir.display(),
                e
            ))
        })?;
        Ok(Self { dir })
    }

    /// Returns the workspace directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Writes one image into the workspace as PNG.
    pub fn save_png(&self, index: usize, image: &RgbImage) -> Result<PathBuf> {
        let path = self.dir.join(format!("{}.png", index));
        image.save(&path).map_err(|e| {
            WorkerError::output_failed(format!("Failed to save {}: {}", path.display(), e))
        })?;
        Ok(path)
    }
}

impl Drop for JobWorkspace {
    fn drop(&mut self) {
        std::fs::remove_dir_all(&self.dir).ok();
    }
}

/// Encodes an image as an inline base64 PNG data URI.
pub fn image_to_data_uri(image: &RgbImage) -> Result<String> {
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
        .map_err(|e| WorkerError::output_failed(format!("Failed to encode PNG: {}", e)))?;
    Ok(format!(
        "data:image/png;base64,{}",
        BASE64_STANDARD.encode(&bytes)
    ))
}

/// Assembles the job response from a generation outcome.
///
/// Each image is persisted under the workspace, then uploaded when a store
/// is configured or inline-encoded otherwise. Output order follows image
/// order; the first entry doubles as the response's `image_url`.
pub fn assemble_response(
    cache_dir: &Path,
    job_id: &str,
    outcome: &GenerationOutcome,
    store: Option<&dyn ObjectStore>,
) -> Result<JobResponse> {
    let workspace = JobWorkspace::create(cache_dir, job_id)?;

    let mut entries = Vec::with_capacity(outcome.images.len());
    for (index, image) in outcome.images.iter().enumerate() {
        let path = workspace.save_png(index, image)?;
        let entry = match store {
            Some(store) => store.upload(&path)?,
            None => image_to_data_uri(image)?,
        };
        entries.push(entry);
    }

    Ok(JobResponse::success(
        entries,
        outcome.seed,
        outcome.refresh_worker,
    ))
}
