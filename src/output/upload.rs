//! Object storage upload.
//!
//! Upload is optional: it is used only when a bucket endpoint is configured,
//! otherwise the assembler falls back to inline base64 delivery.

use std::fs;
use std::path::Path;

use crate::error::{Result, WorkerError};

/// Upload-by-path interface returning a public URL.
pub trait ObjectStore: Send + Sync {
    /// Uploads the file at the given path, returning its public URL.
    fn upload(&self, path: &Path) -> Result<String>;
}

/// Uploader that PUTs files to the configured bucket endpoint.
pub struct BucketUploader {
    endpoint: String,
    client: reqwest::blocking::Client,
}

impl BucketUploader {
    /// Creates an uploader for the given endpoint.
    pub fn new(endpoint: &str) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(600))
            .build()
            .map_err(|e| {
                WorkerError::upload_failed(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn object_url(&self, path: &Path) -> String {
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        format!("{}/{}", self.endpoint, filename)
    }
}

impl ObjectStore for BucketUploader {
    fn upload(&self, path: &Path) -> Result<String> {
        let bytes = fs::read(path).map_err(|e| {
            WorkerError::upload_failed(format!("Failed to read {}: {}", path.display(), e))
        })?;

        let url = self.object_url(path);
        let response = self
            .client
            .put(&url)
            .header(reqwest::header::CONTENT_TYPE, "image/png")
            .body(bytes)
            .send()
            .map_err(|e| WorkerError::upload_failed(format!("PUT {}: {}", url, e)))?;

        if !response.status().is_success() {
            return Err(WorkerError::upload_failed(format!(
                "HTTP {} for {}",
                response.status(),
                url
            )));
        }

        // Some buckets echo the public URL in the body when it differs from
        // the upload URL
        let body = response.text().unwrap_or_default();
        let public_url = body.trim();
        Ok(if public_url.is_empty() {
            url
        } else {
            public_url.to_string()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn object_url_joins_endpoint_and_filename() {
        let uploader = BucketUploader::new("https://bucket.example.com/outputs/").unwrap();
        assert_eq!(
            uploader.object_url(&PathBuf::from("/tmp/job-1/0.png")),
            "https://bucket.example.com/outputs/0.png"
        );
    }

    #[test]
    fn trailing_slashes_are_normalized() {
        let uploader = BucketUploader::new("https://bucket.example.com///").unwrap();
        assert_eq!(
            uploader.object_url(&PathBuf::from("1.png")),
            "https://bucket.example.com/1.png"
        );
    }

    #[test]
    fn upload_of_missing_file_fails() {
        let uploader = BucketUploader::new("https://bucket.example.com").unwrap();
        let err = uploader
            .upload(&PathBuf::from("/nonexistent/0.png"))
            .unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::UploadFailed);
    }
}
