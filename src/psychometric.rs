//! Psychometric model functions.
//!
//! A psychometric function maps stimulus intensity (plus shape parameters)
//! to the probability of a given response. The QUEST engine fixes the shape
//! to the Weibull used by Watson & Pelli; QUEST+ accepts any caller-supplied
//! model, with the two functions below available as ready-made choices.
//!
//! Formulas:
//! - QUEST Weibull (x is intensity relative to threshold, log10 units):
//!   p = delta*gamma + (1-delta)*(1 - (1-gamma)*exp(-10^(beta*x)))
//! - QUEST+ Weibull (dB-style scaling):
//!   p = lapse - (guess + lapse - 1)*exp(-10^(slope*(stim-threshold)/20))
//!
//! References:
//! - Watson, A. B., & Pelli, D. G. (1983). QUEST: a Bayesian adaptive
//!   psychometric method.
//! - Watson, A. B. (2017). QUEST+: a general multidimensional Bayesian
//!   adaptive psychometric method.

/// QUEST-form Weibull: probability of response 1 at intensity offset `x`
/// from threshold.
///
/// `beta` controls steepness (typically 3.5), `delta` is the blind-press
/// lapse fraction (typically 0.01), `gamma` the guess rate at -inf intensity.
pub fn quest_weibull(x: f64, beta: f64, delta: f64, gamma: f64) -> f64 {
    delta * gamma + (1.0 - delta) * (1.0 - (1.0 - gamma) * (-(10f64.powf(beta * x))).exp())
}

/// QUEST+-form Weibull over an absolute stimulus value, parameterized by
/// threshold, slope, guess rate and lapse rate.
///
/// Returns the probability of a *correct* (yes) response; the complementary
/// model for response 0 is `1 - weibull(...)`.
pub fn weibull(stim: f64, threshold: f64, slope: f64, guess: f64, lapse: f64) -> f64 {
    let exponent = slope * (stim - threshold) / 20.0;
    lapse - (guess + lapse - 1.0) * (-(10f64.powf(exponent))).exp()
}

/// Cumulative normal distribution via the Abramowitz–Stegun erf
/// approximation (maximum absolute error ~1.5e-7). An alternative
/// psychometric shape for QUEST+ models.
pub fn norm_cdf(x: f64, mean: f64, sd: f64) -> f64 {
    let z = (x - mean) / (std::f64::consts::SQRT_2 * sd);
    let t = 1.0 / (1.0 + 0.3275911 * z.abs());
    let a1 = 0.254829592;
    let a2 = -0.284496736;
    let a3 = 1.421413741;
    let a4 = -1.453152027;
    let a5 = 1.061405429;
    let erf = 1.0 - (((((a5 * t + a4) * t) + a3) * t + a2) * t + a1) * t * (-z * z).exp();
    let sign = if z < 0.0 { -1.0 } else { 1.0 };
    0.5 * (1.0 + sign * erf)
}
