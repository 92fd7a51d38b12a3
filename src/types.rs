use serde::{Deserialize, Serialize};

// Shared constants

/// Intensities are clamped to this magnitude before any index arithmetic
pub const MAX_INTENSITY: f64 = 1e10;

/// Trial history grows by this many slots at a time to bound reallocation churn
pub const HISTORY_CHUNK: usize = 10_000;

/// During history replay the pdf is renormalized every this many trials to
/// avoid underflow
pub const RENORM_INTERVAL: usize = 100;

/// Default grid step size (intensity units, typically log10 contrast)
pub const DEFAULT_GRAIN: f64 = 0.01;

/// Default number of grid steps when no range is supplied
pub const DEFAULT_DIM: usize = 500;

/// Number of beta variants examined by the beta analysis (geometric sequence 2^(k/4))
pub const BETA_VARIANTS: usize = 16;

/// Grid half-width count used for beta-analysis variant states
pub const BETA_ANALYSIS_DIM: usize = 250;

/// Grid step used for beta-analysis variant states
pub const BETA_ANALYSIS_GRAIN: f64 = 0.02;

/// Mode of the threshold posterior
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Mode {
    /// Threshold estimate at the posterior maximum
    pub threshold: f64,
    /// Value of the (possibly unnormalized) pdf at that threshold
    pub density: f64,
}

/// One row of the compacted trial summary: an intensity and how often each
/// response was given at it
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrialBin {
    pub intensity: f64,
    /// Count of response 0 (wrong / no)
    pub response0: u32,
    /// Count of response 1 (right / yes)
    pub response1: u32,
}

/// Result of re-analyzing a QUEST run with beta as a free parameter
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BetaAnalysis {
    /// Recommended beta estimate, 1 / mean(1/beta). Beta has a long upper
    /// tail while 1/beta is roughly normal, so averaging the inverse is the
    /// statistically efficient choice.
    pub estimate: f64,
    /// Beta of the maximum-density (threshold, beta) combination
    pub mode_beta: f64,
    /// Threshold estimate at that mode
    pub threshold: f64,
    /// Sd of the threshold estimate at the beta of the mode
    pub threshold_sd: f64,
    /// Density-weighted arithmetic mean of beta
    pub beta_mean: f64,
    /// Density-weighted sd of beta
    pub beta_sd: f64,
}
