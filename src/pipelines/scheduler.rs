//! Scheduler selection for the diffusion pipelines.
//!
//! Supported sampler families form a closed, named set. A job names one
//! family; the selector builds a configured instance from the target
//! pipeline's current scheduler configuration and hands it to the pipeline
//! for that run. Selection happens per job and is never cached.
//!
//! The numerical stepping update lives inside the pipeline; the instance
//! built here owns the schedule itself: which timesteps are visited, how
//! they are spaced, and how a denoising window is split between the base
//! and refiner passes.

use crate::error::{Result, WorkerError};

/// Supported scheduler families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SchedulerKind {
    /// DDIM - deterministic, the worker default.
    #[default]
    Ddim,
    /// DDPM - ancestral sampling with fresh noise each step.
    Ddpm,
    /// DPM-Solver++ multistep - fast high-order solver.
    DpmSolverMultistep,
    /// Euler ODE solver - fast, deterministic.
    Euler,
    /// Euler ancestral - stochastic Euler variant.
    EulerAncestral,
    /// Heun ODE solver - 2x slower, more accurate.
    Heun,
    /// Linear multistep (Katherine Crowson's k-LMS).
    Lms,
    /// PNDM pseudo-numerical method.
    Pndm,
    /// UniPC unified predictor-corrector.
    UniPc,
}

/// Timestep spacing strategy for a scheduler family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Spacing {
    /// Evenly strided from the start of the training schedule, offset applied.
    Leading,
    /// Evenly interpolated across the full training schedule.
    Linspace,
}

impl SchedulerKind {
    /// Every supported family, in canonical name order.
    pub const ALL: &'static [SchedulerKind] = &[
        SchedulerKind::Ddim,
        SchedulerKind::Ddpm,
        SchedulerKind::DpmSolverMultistep,
        SchedulerKind::Euler,
        SchedulerKind::EulerAncestral,
        SchedulerKind::Heun,
        SchedulerKind::Lms,
        SchedulerKind::Pndm,
        SchedulerKind::UniPc,
    ];

    /// Canonical names, as accepted by the input schema.
    pub const NAMES: &'static [&'static str] = &[
        "DDIM",
        "DDPM",
        "DPMSolverMultistep",
        "Euler",
        "EulerAncestral",
        "Heun",
        "LMS",
        "PNDM",
        "UniPC",
    ];

    /// Parses a scheduler kind from a name.
    ///
    /// Case-insensitive; legacy aliases (K_EULER, K_EULER_ANCESTRAL, KLMS)
    /// are accepted. Unknown names return None rather than falling back to
    /// a default.
    pub fn parse(s: &str) -> Option<Self> {
        let normalized: String = s
            .to_lowercase()
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .collect();

        match normalized.as_str() {
            "ddim" => Some(SchedulerKind::Ddim),
            "ddpm" => Some(SchedulerKind::Ddpm),
            "dpmsolvermultistep" | "dpmmultistep" => Some(SchedulerKind::DpmSolverMultistep),
            "euler" | "keuler" => Some(SchedulerKind::Euler),
            "eulerancestral" | "keulerancestral" => Some(SchedulerKind::EulerAncestral),
            "heun" => Some(SchedulerKind::Heun),
            "lms" | "klms" => Some(SchedulerKind::Lms),
            "pndm" => Some(SchedulerKind::Pndm),
            "unipc" => Some(SchedulerKind::UniPc),
            _ => None,
        }
    }

    /// Returns the canonical name of this family.
    pub fn as_str(&self) -> &'static str {
        match self {
            SchedulerKind::Ddim => "DDIM",
            SchedulerKind::Ddpm => "DDPM",
            SchedulerKind::DpmSolverMultistep => "DPMSolverMultistep",
            SchedulerKind::Euler => "Euler",
            SchedulerKind::EulerAncestral => "EulerAncestral",
            SchedulerKind::Heun => "Heun",
            SchedulerKind::Lms => "LMS",
            SchedulerKind::Pndm => "PNDM",
            SchedulerKind::UniPc => "UniPC",
        }
    }

    /// Solver order: how many model evaluations each user-visible step costs.
    pub fn order(&self) -> u32 {
        match self {
            SchedulerKind::Heun => 2,
            _ => 1,
        }
    }

    /// Returns true if the family injects fresh noise at each step.
    pub fn is_ancestral(&self) -> bool {
        matches!(self, SchedulerKind::Ddpm | SchedulerKind::EulerAncestral)
    }

    fn spacing(&self) -> Spacing {
        match self {
            SchedulerKind::Ddim | SchedulerKind::Ddpm | SchedulerKind::Pndm => Spacing::Leading,
            _ => Spacing::Linspace,
        }
    }
}

impl std::fmt::Display for SchedulerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Scheduler configuration carried by a pipeline.
///
/// Mirrors the configuration the pipeline was trained with; a newly
/// selected scheduler must be built from it so the substituted sampler
/// stays compatible with the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerConfig {
    /// Length of the training noise schedule.
    pub num_train_timesteps: u32,
    /// Variance schedule start.
    pub beta_start: f64,
    /// Variance schedule end.
    pub beta_end: f64,
    /// Variance interpolation curve name.
    pub beta_schedule: String,
    /// What the model predicts at each step (epsilon, v_prediction).
    pub prediction_type: String,
    /// Offset added to leading-spaced timesteps.
    pub steps_offset: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            num_train_timesteps: 1000,
            beta_start: 0.00085,
            beta_end: 0.012,
            beta_schedule: "scaled_linear".to_string(),
            prediction_type: "epsilon".to_string(),
            steps_offset: 1,
        }
    }
}

/// A configured sampler instance for one job.
#[derive(Debug, Clone)]
pub struct Scheduler {
    kind: SchedulerKind,
    config: SchedulerConfig,
}

impl Scheduler {
    /// Creates a scheduler of the given family from a pipeline's configuration.
    pub fn new(kind: SchedulerKind, config: SchedulerConfig) -> Self {
        Self { kind, config }
    }

    /// Builds a scheduler from a requested family name and the target
    /// pipeline's current configuration.
    ///
    /// Unrecognized names fail with a configuration error rather than
    /// silently falling back to a default.
    pub fn from_config(name: &str, config: &SchedulerConfig) -> Result<Self> {
        let kind =
            SchedulerKind::parse(name).ok_or_else(|| WorkerError::unknown_scheduler(name))?;
        Ok(Self::new(kind, config.clone()))
    }

    /// Returns the scheduler family.
    pub fn kind(&self) -> SchedulerKind {
        self.kind
    }

    /// Returns the configuration this instance was built from.
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Computes the descending timestep schedule for a run.
    ///
    /// Second-order families revisit interior timesteps for their correction
    /// evaluations, so their schedule is longer than `num_steps`.
    pub fn timesteps(&self, num_steps: u32) -> Vec<f32> {
        let n = num_steps.max(1);
        let t_max = (self.config.num_train_timesteps - 1) as f32;

        let base: Vec<f32> = match self.kind.spacing() {
            Spacing::Leading => {
                let ratio = self.config.num_train_timesteps / n;
                (0..n)
                    .map(|i| ((i * ratio + self.config.steps_offset) as f32).min(t_max))
                    .rev()
                    .collect()
            }
            Spacing::Linspace => {
                if n == 1 {
                    vec![t_max]
                } else {
                    (0..n)
                        .map(|i| t_max - (i as f32) * t_max / ((n - 1) as f32))
                        .collect()
                }
            }
        };

        if self.kind.order() == 2 {
            // Interior timesteps are visited twice: predict, then correct
            let mut interleaved = Vec::with_capacity(2 * base.len() - 1);
            interleaved.push(base[0]);
            for t in &base[1..] {
                interleaved.push(*t);
                interleaved.push(*t);
            }
            interleaved
        } else {
            base
        }
    }

    /// Returns the sub-schedule covering the window `[start_frac, end_frac)`
    /// of the run.
    ///
    /// The base pass takes `[0, high_noise_frac)` and the refiner takes
    /// `[high_noise_frac, 1)`, so the two windows partition one schedule and
    /// latent-space continuity is preserved across the handoff.
    pub fn timestep_window(&self, num_steps: u32, start_frac: f64, end_frac: f64) -> Vec<f32> {
        let timesteps = self.timesteps(num_steps);
        let len = timesteps.len();
        let start = ((len as f64) * start_frac).round() as usize;
        let end = ((len as f64) * end_frac).round() as usize;
        timesteps[start.min(len)..end.clamp(start.min(len), len)].to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scheduler_kind_parsing() {
        assert_eq!(SchedulerKind::parse("DDIM"), Some(SchedulerKind::Ddim));
        assert_eq!(SchedulerKind::parse("ddim"), Some(SchedulerKind::Ddim));
        assert_eq!(SchedulerKind::parse("Euler"), Some(SchedulerKind::Euler));
        assert_eq!(
            SchedulerKind::parse("DPMSolverMultistep"),
            Some(SchedulerKind::DpmSolverMultistep)
        );
        assert_eq!(SchedulerKind::parse("UniPC"), Some(SchedulerKind::UniPc));
        assert_eq!(SchedulerKind::parse("nonsense"), None);
    }

    #[test]
    fn scheduler_kind_legacy_aliases() {
        assert_eq!(SchedulerKind::parse("K_EULER"), Some(SchedulerKind::Euler));
        assert_eq!(
            SchedulerKind::parse("K_EULER_ANCESTRAL"),
            Some(SchedulerKind::EulerAncestral)
        );
        assert_eq!(SchedulerKind::parse("KLMS"), Some(SchedulerKind::Lms));
    }

    #[test]
    fn names_and_kinds_stay_in_sync() {
        assert_eq!(SchedulerKind::ALL.len(), SchedulerKind::NAMES.len());
        for (kind, name) in SchedulerKind::ALL.iter().zip(SchedulerKind::NAMES) {
            assert_eq!(kind.as_str(), *name);
            assert_eq!(SchedulerKind::parse(name), Some(*kind));
        }
    }

    #[test]
    fn unknown_name_is_a_configuration_error() {
        let err = Scheduler::from_config("TurboSampler", &SchedulerConfig::default())
            .unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::UnknownScheduler);
    }

    #[test]
    fn selection_preserves_pipeline_config() {
        let mut config = SchedulerConfig::default();
        config.num_train_timesteps = 500;
        config.prediction_type = "v_prediction".to_string();

        let scheduler = Scheduler::from_config("Euler", &config).unwrap();
        assert_eq!(scheduler.kind(), SchedulerKind::Euler);
        assert_eq!(scheduler.config(), &config);
    }

    #[test]
    fn timesteps_are_descending() {
        for kind in SchedulerKind::ALL {
            let scheduler = Scheduler::new(*kind, SchedulerConfig::default());
            let timesteps = scheduler.timesteps(30);
            for pair in timesteps.windows(2) {
                assert!(
                    pair[1] <= pair[0],
                    "{} schedule not descending: {:?}",
                    kind,
                    pair
                );
            }
        }
    }

    #[test]
    fn first_order_schedule_length_matches_steps() {
        let scheduler = Scheduler::new(SchedulerKind::Euler, SchedulerConfig::default());
        assert_eq!(scheduler.timesteps(30).len(), 30);
        assert_eq!(scheduler.timesteps(1).len(), 1);
    }

    #[test]
    fn heun_schedule_doubles_interior_steps() {
        let scheduler = Scheduler::new(SchedulerKind::Heun, SchedulerConfig::default());
        assert_eq!(scheduler.timesteps(30).len(), 59);
    }

    #[test]
    fn linspace_starts_at_schedule_top() {
        let scheduler = Scheduler::new(SchedulerKind::Euler, SchedulerConfig::default());
        let timesteps = scheduler.timesteps(30);
        assert_eq!(timesteps[0], 999.0);
        assert_eq!(*timesteps.last().unwrap(), 0.0);
    }

    #[test]
    fn window_partitions_the_schedule() {
        let scheduler = Scheduler::new(SchedulerKind::Euler, SchedulerConfig::default());
        let total = scheduler.timesteps(30);
        let base = scheduler.timestep_window(30, 0.0, 0.8);
        let refiner = scheduler.timestep_window(30, 0.8, 1.0);

        assert_eq!(base.len(), 24);
        assert_eq!(refiner.len(), 6);
        let mut joined = base.clone();
        joined.extend_from_slice(&refiner);
        assert_eq!(joined, total);
    }

    #[test]
    fn full_window_is_the_full_schedule() {
        let scheduler = Scheduler::new(SchedulerKind::Ddim, SchedulerConfig::default());
        assert_eq!(
            scheduler.timestep_window(25, 0.0, 1.0),
            scheduler.timesteps(25)
        );
    }

    #[test]
    fn heun_costs_two_evaluations_per_step() {
        assert_eq!(SchedulerKind::Heun.order(), 2);
        assert_eq!(SchedulerKind::Ddim.order(), 1);
    }

    #[test]
    fn ancestral_families() {
        assert!(SchedulerKind::Ddpm.is_ancestral());
        assert!(SchedulerKind::EulerAncestral.is_ancestral());
        assert!(!SchedulerKind::Ddim.is_ancestral());
        assert!(!SchedulerKind::Heun.is_ancestral());
    }
}
