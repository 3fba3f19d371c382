//! Model file downloader for the generation pipelines.
//!
//! Downloads pipeline exports from the model hub if not present in the
//! local model directory. Each pipeline kind keeps its files under its own
//! subdirectory; the shared VAE lives beside them.

use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use crate::error::{Result, WorkerError};

use super::provider::FetchOptions;
use super::PipelineKind;

/// Files every diffusion pipeline directory must contain.
pub const PIPELINE_FILES: &[&str] = &["model.onnx", "tokenizer.json"];

/// Files the safety checker directory must contain (no text conditioning).
pub const SAFETY_FILES: &[&str] = &["model.onnx"];

/// Files the shared VAE directory must contain.
pub const VAE_FILES: &[&str] = &["vae_decoder.onnx", "vae_encoder.onnx"];

/// Subdirectory holding the shared VAE exports.
pub const VAE_DIR: &str = "vae";

/// Returns the files a pipeline kind requires.
pub fn required_files(kind: PipelineKind) -> &'static [&'static str] {
    match kind {
        PipelineKind::SafetyChecker => SAFETY_FILES,
        _ => PIPELINE_FILES,
    }
}

/// Returns the local directory for a pipeline kind's model files.
pub fn pipeline_dir(model_dir: &Path, kind: PipelineKind) -> PathBuf {
    model_dir.join(kind.as_str())
}

/// Returns the local directory for the shared VAE.
pub fn vae_dir(model_dir: &Path) -> PathBuf {
    model_dir.join(VAE_DIR)
}

/// Remote location of a model file on the hub.
///
/// Variant exports (e.g. fp16) are published under a suffixed directory.
pub fn model_file_url(model_id: &str, variant: Option<&str>, file: &str) -> String {
    match variant {
        Some(variant) => format!(
            "https://huggingface.co/{}/resolve/main/onnx-{}/{}",
            model_id, variant, file
        ),
        None => format!(
            "https://huggingface.co/{}/resolve/main/onnx/{}",
            model_id, file
        ),
    }
}

/// Checks that all required files exist in the directory.
///
/// Returns Ok(()) if all files exist, or an error listing missing files.
pub fn check_files(dir: &Path, files: &[&str]) -> Result<()> {
    let mut missing = Vec::new();

    for file in files {
        if !dir.join(file).exists() {
            missing.push(*file);
        }
    }

    if missing.is_empty() {
        Ok(())
    } else {
        Err(WorkerError::pipeline_load_failed(format!(
            "Missing model files in {}: {}",
            dir.display(),
            missing.join(", ")
        )))
    }
}

/// Downloads any missing files for one model into the given directory.
///
/// Returns Ok(()) if all files exist or were successfully downloaded.
pub fn ensure_files(
    dir: &Path,
    model_id: &str,
    options: &FetchOptions,
    files: &[&str],
) -> Result<()> {
    if !dir.exists() {
        fs::create_dir_all(dir).map_err(|e| {
            WorkerError::model_fetch_failed(format!(
                "Failed to create model directory {}: {}",
                dir.display(),
                e
            ))
        })?;
    }

    let missing: Vec<&str> = files
        .iter()
        .copied()
        .filter(|file| !dir.join(file).exists())
        .collect();

    if missing.is_empty() {
        return Ok(());
    }

    eprintln!(
        "Downloading {} missing files for {}...",
        missing.len(),
        model_id
    );

    for file in &missing {
        let url = model_file_url(model_id, options.variant, file);
        download_file_streaming(&url, &dir.join(file))?;
    }

    Ok(())
}

/// Downloads the files for a pipeline kind if not present.
pub fn ensure_pipeline_models(
    model_dir: &Path,
    kind: PipelineKind,
    model_id: &str,
    options: &FetchOptions,
) -> Result<()> {
    ensure_files(
        &pipeline_dir(model_dir, kind),
        model_id,
        options,
        required_files(kind),
    )
}

/// Downloads the shared VAE exports if not present.
pub fn ensure_vae_models(model_dir: &Path, model_id: &str, options: &FetchOptions) -> Result<()> {
    ensure_files(&vae_dir(model_dir), model_id, options, VAE_FILES)
}

/// Downloads a file using streaming to handle multi-gigabyte exports.
fn download_file_streaming(url: &str, dest: &Path) -> Result<()> {
    let filename = dest.file_name().unwrap_or_default().to_string_lossy();
    eprint!("  Downloading {}... ", filename);

    // Long timeout: pipeline exports run into the gigabytes
    let client = reqwest::blocking::Client::builder()
        .timeout(std::time::Duration::from_secs(3600))
        .build()
        .map_err(|e| {
            WorkerError::model_fetch_failed(format!("Failed to create HTTP client: {}", e))
        })?;

    let mut response = client.get(url).send().map_err(|e| {
        WorkerError::model_fetch_failed(format!("Failed to download {}: {}", url, e))
    })?;

    if !response.status().is_success() {
        return Err(WorkerError::model_fetch_failed(format!(
            "HTTP {} for {}",
            response.status(),
            url
        )));
    }

    let total_size = response.content_length().unwrap_or(0);

    let mut file = fs::File::create(dest).map_err(|e| {
        WorkerError::model_fetch_failed(format!(
            "Failed to create file {}: {}",
            dest.display(),
            e
        ))
    })?;

    let mut downloaded: u64 = 0;
    let mut buffer = [0u8; 65536];
    let mut last_progress = 0;

    loop {
        let bytes_read = response.read(&mut buffer).map_err(|e| {
            WorkerError::model_fetch_failed(format!("Failed to read response: {}", e))
        })?;

        if bytes_read == 0 {
            break;
        }

        file.write_all(&buffer[..bytes_read]).map_err(|e| {
            WorkerError::model_fetch_failed(format!("Failed to write file: {}", e))
        })?;

        downloaded += bytes_read as u64;

        // Print progress every 10%
        if total_size > 0 {
            let progress = (downloaded * 100 / total_size) as usize;
            if progress >= last_progress + 10 {
                eprint!("{}%... ", progress);
                last_progress = progress;
            }
        }
    }

    let size_mb = downloaded as f64 / (1024.0 * 1024.0);
    eprintln!("done ({:.1} MB)", size_mb);

    Ok(())
}
