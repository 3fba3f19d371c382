//! CLI argument parser for standalone mode.
//!
//! Provides a command-line interface for testing generation without the
//! serverless runtime. The flags assemble a raw job input that goes through
//! the same schema validation as a worker-mode job.

use std::path::PathBuf;

use clap::Parser;
use serde_json::{json, Value};

/// sdxl-worker: serverless SDXL image generation worker
#[derive(Parser, Debug)]
#[command(name = "sdxl-worker")]
#[command(about = "Serverless SDXL image generation worker")]
#[command(version)]
pub struct Cli {
    /// Text prompt describing the image to generate
    #[arg(short, long)]
    pub prompt: Option<String>,

    /// Text to steer generation away from
    #[arg(long, default_value = "")]
    pub negative_prompt: String,

    /// Starting image URL for refinement or inpainting
    #[arg(long)]
    pub image_url: Option<String>,

    /// Mask image URL for inpainting
    #[arg(long)]
    pub mask_url: Option<String>,

    /// Route the job to the inpainting pipeline
    #[arg(long)]
    pub use_inpaint: bool,

    /// Random seed for reproducible generation
    #[arg(short, long)]
    pub seed: Option<u64>,

    /// Number of denoising steps for the base pass
    #[arg(long, default_value = "25")]
    pub steps: u32,

    /// Number of denoising steps for image-to-image refinement
    #[arg(long, default_value = "50")]
    pub refiner_steps: u32,

    /// Classifier-free guidance scale
    #[arg(long, default_value = "7.5")]
    pub guidance: f64,

    /// Scheduler family (DDIM, DDPM, DPMSolverMultistep, Euler, ...)
    #[arg(long, default_value = "DDIM")]
    pub scheduler: String,

    /// Denoising strength for image-to-image refinement
    #[arg(long, default_value = "0.3")]
    pub strength: f64,

    /// Output image width in pixels
    #[arg(long, default_value = "1024")]
    pub width: u32,

    /// Output image height in pixels
    #[arg(long, default_value = "1024")]
    pub height: u32,

    /// Number of images to generate
    #[arg(long, default_value = "1")]
    pub num_images: u32,

    /// Fraction of denoising done by the base pass before the refiner handoff
    #[arg(long, default_value = "0.8")]
    pub high_noise_frac: f64,

    /// Directory for images generated in CLI mode
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Path to the directory containing pipeline model files
    #[arg(short, long)]
    pub model_dir: Option<PathBuf>,

    /// Run in worker mode (JSON lines over stdio)
    #[arg(long)]
    pub worker: bool,

    /// Provision every pipeline and exit
    #[arg(long)]
    pub fetch_models: bool,
}

impl Cli {
    /// Parses command-line arguments.
    pub fn parse_args() -> Self {
        Cli::parse()
    }

    /// Returns true if running in worker mode.
    pub fn is_worker_mode(&self) -> bool {
        self.worker
    }

    /// Returns true if running a single generation from the command line.
    pub fn is_cli_mode(&self) -> bool {
        !self.worker && !self.fetch_models && self.prompt.is_some()
    }

    /// Builds the raw job input for CLI mode.
    ///
    /// Optional fields are omitted rather than set to null so schema
    /// defaults apply the same way they do for worker-mode jobs.
    pub fn input_value(&self) -> Value {
        let mut input = json!({
            "prompt": self.prompt.clone().unwrap_or_default(),
            "negative_prompt": self.negative_prompt,
            "num_inference_steps": self.steps,
            "refiner_inference_steps": self.refiner_steps,
            "guidance_scale": self.guidance,
            "scheduler": self.scheduler,
            "strength": self.strength,
            "width": self.width,
            "height": self.height,
            "num_images": self.num_images,
            "high_noise_frac": self.high_noise_frac,
        });

        if self.use_inpaint {
            input["use_inpaint"] = json!(true);
        }
        if let Some(seed) = self.seed {
            input["seed"] = json!(seed);
        }
        if let Some(url) = &self.image_url {
            input["image_url"] = json!(url);
        }
        if let Some(url) = &self.mask_url {
            input["mask_url"] = json!(url);
        }

        input
    }

    /// Returns the effective output directory for CLI mode.
    pub fn output_dir(&self) -> PathBuf {
        self.output
            .clone()
            .unwrap_or_else(|| PathBuf::from("outputs"))
    }
}
