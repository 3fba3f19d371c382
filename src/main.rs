//! sdxl-worker: serverless SDXL image generation worker.
//!
//! This binary runs in three modes:
//! - Worker mode: JSON-lines job loop over stdio for the serverless runtime
//! - CLI mode: single generation from command-line flags for testing
//! - Fetch mode: provision every pipeline ahead of time and exit

use std::sync::Arc;
use std::time::Instant;

use sdxl_worker::cli::Cli;
use sdxl_worker::config::WorkerConfig;
use sdxl_worker::error::{Result, WorkerError};
use sdxl_worker::generation::{HttpImageSource, Orchestrator};
use sdxl_worker::pipelines::{OnnxPipelineProvider, PipelineRegistry};
use sdxl_worker::schema;
use sdxl_worker::worker::{run_worker, WorkerContext};

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse_args();

    let mut config = WorkerConfig::from_env();
    if let Some(dir) = &cli.model_dir {
        config.model_path = Some(dir.clone());
    }
    if let Some(message) = config.validate() {
        return Err(WorkerError::invalid_input(format!(
            "invalid configuration: {}",
            message
        )));
    }

    if cli.fetch_models {
        run_fetch_models(&config)
    } else if cli.is_worker_mode() {
        run_worker_mode(config)
    } else if cli.is_cli_mode() {
        run_cli_mode(&cli, &config)
    } else {
        print_usage();
        Ok(())
    }
}

fn build_registry(config: &WorkerConfig) -> Result<Arc<PipelineRegistry>> {
    let provider = Arc::new(OnnxPipelineProvider::new(config));
    Ok(Arc::new(PipelineRegistry::new(provider)?))
}

/// Provisions every pipeline ahead of the first job and exits.
fn run_fetch_models(config: &WorkerConfig) -> Result<()> {
    eprintln!("=== sdxl-worker model fetch ===");
    eprintln!(
        "Model directory: {}",
        config.effective_model_path().display()
    );
    eprintln!();

    let registry = build_registry(config)?;
    registry.warm_up()?;

    eprintln!("All pipelines provisioned.");
    Ok(())
}

/// Runs the worker loop. Provisioning failure at cold start is fatal.
fn run_worker_mode(config: WorkerConfig) -> Result<()> {
    eprintln!("=== sdxl-worker ===");
    eprintln!("Reading jobs from stdin, writing responses to stdout.");
    eprintln!("Device: {}", config.device);
    if config.upload_configured() {
        eprintln!("Delivery: upload to configured bucket endpoint");
    } else {
        eprintln!("Delivery: inline base64 (no bucket endpoint configured)");
    }
    eprintln!();

    let registry = build_registry(&config)?;
    registry.warm_up()?;

    let ctx = WorkerContext::new(config, registry)?;
    run_worker(&ctx)
}

/// Runs a single generation built from command-line flags.
fn run_cli_mode(cli: &Cli, config: &WorkerConfig) -> Result<()> {
    let input_value = cli.input_value();
    let input = schema::validate(&input_value).map_err(|violations| {
        WorkerError::invalid_input(schema::render_violations(&violations))
    })?;

    eprintln!("=== sdxl-worker CLI ===");
    eprintln!("Prompt: \"{}\"", input.prompt);
    eprintln!("Size: {}x{}", input.width, input.height);
    eprintln!(
        "Steps: {} (scheduler: {})",
        input.num_inference_steps, input.scheduler
    );
    eprintln!("Guidance: {:.1}", input.guidance_scale);
    if let Some(seed) = input.seed {
        eprintln!("Seed: {}", seed);
    }
    eprintln!();

    let registry = build_registry(config)?;
    let images = Arc::new(HttpImageSource::new()?);
    let orchestrator = Orchestrator::new(registry, images);

    let start_time = Instant::now();
    let outcome = orchestrator.run(&input)?;
    let generation_time = start_time.elapsed();

    eprintln!();
    eprintln!("Generation complete!");
    eprintln!("  Time: {:.2}s", generation_time.as_secs_f32());
    eprintln!("  Seed: {}", outcome.seed);
    eprintln!("  Images: {}", outcome.images.len());

    let output_dir = cli.output_dir();
    std::fs::create_dir_all(&output_dir).map_err(|e| {
        WorkerError::output_failed(format!(
            "Failed to create {}: {}",
            output_dir.display(),
            e
        ))
    })?;

    for (index, image) in outcome.images.iter().enumerate() {
        let path = output_dir.join(format!("gen-{}-{}.png", outcome.seed, index));
        image.save(&path).map_err(|e| {
            WorkerError::output_failed(format!("Failed to save {}: {}", path.display(), e))
        })?;
        eprintln!("Saved to: {}", path.display());
    }

    Ok(())
}

/// Prints usage information.
fn print_usage() {
    eprintln!("sdxl-worker: serverless SDXL image generation");
    eprintln!();
    eprintln!("Usage:");
    eprintln!("  Single generation:");
    eprintln!("    sdxl-worker --prompt \"a cat in a space suit\" --steps 30 --output ./outputs");
    eprintln!();
    eprintln!("  Worker mode (JSON lines over stdio):");
    eprintln!("    sdxl-worker --worker");
    eprintln!();
    eprintln!("  Provision pipelines ahead of time:");
    eprintln!("    sdxl-worker --fetch-models");
    eprintln!();
    eprintln!("Run 'sdxl-worker --help' for full options.");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn print_usage_doesnt_panic() {
        print_usage();
    }
}
