//! Error types for the QUEST and QUEST+ engines.
//!
//! Two tiers of diagnostics exist in this crate. Fatal model-invariant
//! violations are the variants below: the operation that detected them
//! returns `Err` and the state must be corrected by the caller (wider range,
//! fixed model, valid domains) before further use. Recoverable conditions,
//! like an update intensity falling outside the precomputed grid window, are
//! reported through `log::warn!` and structured return values instead.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum QuestError {
    /// The psychometric function evaluated over the support never crosses
    /// the threshold criterion
    #[error("psychometric function range [{min:.4} {max:.4}] omits {p_threshold} threshold")]
    RangeOmitsThreshold { min: f64, max: f64, p_threshold: f64 },

    /// A derived array contains NaN or infinity
    #[error("{what} is not finite")]
    NotFinite { what: &'static str },

    /// The psychometric function has fewer than 2 strictly monotonic points,
    /// so it cannot be inverted
    #[error("psychometric function has only {points} strictly monotonic point(s)")]
    TooFewMonotonicPoints { points: usize },

    /// Interpolation failed to locate the intensity offset that reaches the
    /// threshold criterion
    #[error("psychometric function has no {p_threshold} threshold")]
    NoThresholdCrossing { p_threshold: f64 },

    /// The posterior sums to zero and cannot be renormalized
    #[error("pdf is all zero")]
    ZeroPosterior,

    /// Response code outside the rows of the likelihood kernel
    #[error("response {response} out of range 0 to {max}")]
    ResponseOutOfRange { response: u32, max: u32 },

    /// A construction parameter failed validation
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// A stimulus or parameter domain is empty
    #[error("{what} domain is empty")]
    EmptyDomain { what: &'static str },

    /// A model returned a probability outside [0, 1] at a precomputed grid point
    #[error(
        "model returned {value} for response {response} at stimulus {stim_index}, \
         parameter {param_index}; probabilities must lie in [0, 1]"
    )]
    ProbabilityOutOfRange {
        value: f64,
        response: usize,
        stim_index: usize,
        param_index: usize,
    },

    /// A caller-supplied prior does not match its parameter domain
    #[error("prior for dimension {dimension} has {prior_len} weights but the domain has {domain_len} values")]
    DomainSizeMismatch {
        dimension: usize,
        prior_len: usize,
        domain_len: usize,
    },

    /// An update named a stimulus tuple that is not in the stimulus grid
    #[error("stimulus {stim:?} is not in the precomputed stimulus grid")]
    UnknownStimulus { stim: Vec<f64> },

    /// Two interpolation knots share the same x, making the ordering ambiguous
    #[error("duplicate interpolation knot at x = {x}")]
    DuplicateKnot { x: f64 },

    /// An interpolation query lies outside the knot range (no extrapolation)
    #[error("query {query} outside interpolation range [{min}, {max}]")]
    OutOfRange { query: f64, min: f64, max: f64 },

    /// The quantile cumulative curve has fewer than 2 strictly increasing points
    #[error("pdf has only {points} nonzero point(s)")]
    DegenerateCdf { points: usize },

    /// An outcome the entropy scan must average over has zero probability
    /// under the whole posterior
    #[error("expected probability of response {response} at stimulus {stim_index} is zero")]
    ZeroOutcomeProbability { stim_index: usize, response: usize },

    /// Fewer than 2 beta variants survived the zero-probability filter
    #[error("beta analysis has only {survivors} variant(s) with nonzero probability; need at least 2")]
    TooFewBetaSurvivors { survivors: usize },
}
