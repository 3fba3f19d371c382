//! Error types for the worker.
//!
//! Defines all error codes and types used throughout the worker for
//! consistent error handling and reporting.

use std::fmt;

/// Error codes returned by the worker in job responses.
///
/// These codes prefix every error message and allow callers to
/// programmatically handle specific failure conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// Job input failed schema validation.
    /// Trigger: missing required field, wrong type, out-of-range value,
    /// or a violated cross-field dependency.
    InvalidInput,

    /// Requested scheduler name is not in the supported set.
    /// Trigger: scheduler name outside the closed scheduler family list.
    UnknownScheduler,

    /// Failed to fetch model files from the remote source.
    /// Trigger: network error or disk full during download.
    ModelFetchFailed,

    /// Failed to construct a pipeline from fetched model files.
    /// Trigger: corrupt file, wrong format, or OOM during load.
    PipelineLoadFailed,

    /// Accelerator ran out of memory during generation.
    /// Trigger: dimensions, batch size, or step count too large for the device.
    OutOfMemory,

    /// Pipeline inference failed during generation.
    /// Trigger: numerical instability or any unrecoverable runtime error.
    InferenceFailed,

    /// Failed to fetch or decode an input image from its URL.
    /// Trigger: unreachable URL or undecodable payload.
    ImageFetchFailed,

    /// Failed to persist or inline-encode generated images.
    /// Trigger: disk full or encoding error in the result assembler.
    OutputFailed,

    /// Failed to upload a generated image to object storage.
    /// Trigger: bucket endpoint unreachable or rejected the upload.
    UploadFailed,
}

impl ErrorCode {
    /// Returns the string representation of the error code.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidInput => "INVALID_INPUT",
            ErrorCode::UnknownScheduler => "UNKNOWN_SCHEDULER",
            ErrorCode::ModelFetchFailed => "MODEL_FETCH_FAILED",
            ErrorCode::PipelineLoadFailed => "PIPELINE_LOAD_FAILED",
            ErrorCode::OutOfMemory => "OUT_OF_MEMORY",
            ErrorCode::InferenceFailed => "INFERENCE_FAILED",
            ErrorCode::ImageFetchFailed => "IMAGE_FETCH_FAILED",
            ErrorCode::OutputFailed => "OUTPUT_FAILED",
            ErrorCode::UploadFailed => "UPLOAD_FAILED",
        }
    }

    /// Returns a human-readable description of the error.
    pub fn description(&self) -> &'static str {
        match self {
            ErrorCode::InvalidInput => "Job input failed schema validation",
            ErrorCode::UnknownScheduler => "Requested scheduler is not supported",
            ErrorCode::ModelFetchFailed => "Failed to fetch model files from remote source",
            ErrorCode::PipelineLoadFailed => "Failed to construct pipeline from model files",
            ErrorCode::OutOfMemory => "Accelerator ran out of memory during generation",
            ErrorCode::InferenceFailed => "Pipeline inference failed during generation",
            ErrorCode::ImageFetchFailed => "Failed to fetch or decode input image",
            ErrorCode::OutputFailed => "Failed to persist or encode generated images",
            ErrorCode::UploadFailed => "Failed to upload generated image to object storage",
        }
    }

    /// Returns a recovery hint suggesting how to resolve this error.
    pub fn recovery_hint(&self) -> &'static str {
        match self {
            ErrorCode::InvalidInput => {
                "Fix the listed input fields and resubmit the job"
            }
            ErrorCode::UnknownScheduler => {
                "Use one of the supported scheduler names: DDIM, DDPM, \
                 DPMSolverMultistep, Euler, EulerAncestral, Heun, LMS, PNDM, UniPC"
            }
            ErrorCode::ModelFetchFailed => {
                "Check internet connection and disk space (15GB+ required for all \
                 pipelines), then restart the worker"
            }
            ErrorCode::PipelineLoadFailed => {
                "Verify model files are not corrupted, or delete the model cache \
                 and re-download"
            }
            ErrorCode::OutOfMemory => {
                "Retry with smaller width/height, fewer images per request, or \
                 fewer inference steps"
            }
            ErrorCode::InferenceFailed => {
                "Retry the job; if the failure persists, recycle the worker"
            }
            ErrorCode::ImageFetchFailed => {
                "Verify the image URL is reachable and returns a decodable image"
            }
            ErrorCode::OutputFailed => {
                "Check disk space in the worker cache directory and retry"
            }
            ErrorCode::UploadFailed => {
                "Check the bucket endpoint configuration and network connectivity, \
                 or unset BUCKET_ENDPOINT_URL to fall back to inline delivery"
            }
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Main error type for worker operations.
#[derive(Debug)]
pub struct WorkerError {
    /// The error code identifying the type of error.
    pub code: ErrorCode,
    /// Human-readable error message with context.
    pub message: String,
    /// Optional underlying cause of the error.
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
    /// Whether the external runtime should discard this worker after the job.
    pub refresh_worker: bool,
}

impl WorkerError {
    /// Creates a new WorkerError with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            source: None,
            refresh_worker: false,
        }
    }

    /// Creates a new WorkerError with an underlying cause.
    pub fn with_source(
        code: ErrorCode,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            code,
            message: message.into(),
            source: Some(Box::new(source)),
            refresh_worker: false,
        }
    }

    /// Marks this error as requiring a worker refresh after the response.
    pub fn with_refresh(mut self) -> Self {
        self.refresh_worker = true;
        self
    }

    /// Creates an INVALID_INPUT error.
    pub fn invalid_input(detail: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidInput, detail)
    }

    /// Creates an UNKNOWN_SCHEDULER error.
    pub fn unknown_scheduler(name: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::UnknownScheduler,
            format!("Unknown scheduler: {}", name.into()),
        )
    }

    /// Creates a MODEL_FETCH_FAILED error.
    pub fn model_fetch_failed(reason: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::ModelFetchFailed,
            format!("Failed to fetch model: {}", reason.into()),
        )
    }

    /// Creates a PIPELINE_LOAD_FAILED error.
    pub fn pipeline_load_failed(reason: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::PipelineLoadFailed,
            format!("Failed to load pipeline: {}", reason.into()),
        )
    }

    /// Creates an OUT_OF_MEMORY error.
    pub fn out_of_memory(detail: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::OutOfMemory,
            format!(
                "Out of accelerator memory, retry with smaller parameters: {}",
                detail.into()
            ),
        )
    }

    /// Creates an INFERENCE_FAILED error carrying the runtime message verbatim.
    pub fn inference_failed(reason: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::InferenceFailed,
            format!("Inference failed: {}", reason.into()),
        )
    }

    /// Creates an IMAGE_FETCH_FAILED error.
    pub fn image_fetch_failed(url: &str, reason: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::ImageFetchFailed,
            format!("Failed to fetch image {}: {}", url, reason.into()),
        )
    }

    /// Creates an OUTPUT_FAILED error.
    pub fn output_failed(reason: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::OutputFailed,
            format!("Failed to assemble output: {}", reason.into()),
        )
    }

    /// Creates an UPLOAD_FAILED error.
    pub fn upload_failed(reason: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::UploadFailed,
            format!("Failed to upload image: {}", reason.into()),
        )
    }
}

impl fmt::Display for WorkerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}. Recovery: {}",
            self.code,
            self.message,
            self.code.recovery_hint()
        )
    }
}

impl std::error::Error for WorkerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Result type alias using WorkerError.
pub type Result<T> = std::result::Result<T, WorkerError>;
