#![deny(clippy::all)]

//! Bayesian adaptive psychometric procedures.
//!
//! Two engines for placing trials and estimating thresholds in
//! psychophysical experiments:
//!
//! - [`Quest`]: the classic 1-D staircase of Watson & Pelli (1983). A fixed
//!   Weibull model, a posterior over threshold offsets and a quantile
//!   placement rule. Fast enough to update between video frames.
//! - [`QuestPlus`]: Watson's (2017) generalization to arbitrary response
//!   models, multidimensional parameter spaces and tuple-valued stimuli,
//!   placing trials by expected-entropy minimization.
//!
//! A typical QUEST session:
//!
//! ```no_run
//! use quest_algo::Quest;
//!
//! # fn present_and_collect(_t: f64) -> u32 { 1 }
//! # fn main() -> Result<(), quest_algo::QuestError> {
//! let mut quest = Quest::new(-1.0, 2.0, 0.82, 3.5, 0.01, 0.5)?;
//! for _ in 0..40 {
//!     let intensity = quest.quantile(None)?;
//!     let response = present_and_collect(intensity);
//!     quest.update(intensity, response)?;
//! }
//! println!("threshold {:.3} +/- {:.3}", quest.mean(), quest.sd());
//! # Ok(())
//! # }
//! ```

pub mod batch;
pub mod error;
pub mod grid;
pub mod interp;
pub mod psychometric;
pub mod quest;
pub mod questplus;
pub mod types;
pub mod vecmath;

pub use error::QuestError;
pub use grid::{combine, uniform_grid};
pub use interp::{interp1, interp1_scalar, InterpMethod};
pub use psychometric::{norm_cdf, quest_weibull, weibull};
pub use quest::{align_window, Quest, QuestOptions, QuestSnapshot, UpdateOutcome};
pub use questplus::{EstimateRule, QuestPlus};
pub use types::{BetaAnalysis, Mode, TrialBin};
