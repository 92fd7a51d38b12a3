//! Monotone 1-D piecewise interpolation.
//!
//! Used to invert the discretized psychometric function (find the intensity
//! offset that reaches the threshold criterion) and to read arbitrary points
//! off the inverse CDF. Knots are sorted by x; duplicate x values are
//! rejected as ambiguous, and queries outside the knot range are errors —
//! this module never extrapolates.

use crate::error::QuestError;

/// How values between (or at) knots are produced
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum InterpMethod {
    /// Straight line between the bracketing knots
    #[default]
    Linear,
    /// Value of the closest knot (lower knot wins a tie)
    Nearest,
    /// Value of the upper bracketing knot
    Next,
    /// Value of the lower bracketing knot
    Previous,
}

/// Interpolate `queries` on the curve defined by `(xs, vs)` pairs.
pub fn interp1(
    xs: &[f64],
    vs: &[f64],
    queries: &[f64],
    method: InterpMethod,
) -> Result<Vec<f64>, QuestError> {
    if xs.len() != vs.len() {
        return Err(QuestError::InvalidParameter(format!(
            "interp1 got {} x values but {} v values",
            xs.len(),
            vs.len()
        )));
    }
    if xs.len() < 2 {
        return Err(QuestError::InvalidParameter(
            "interp1 needs at least 2 knots".to_string(),
        ));
    }

    // Sort knots by x ascending
    let mut order: Vec<usize> = (0..xs.len()).collect();
    order.sort_by(|&a, &b| xs[a].total_cmp(&xs[b]));
    let sx: Vec<f64> = order.iter().map(|&i| xs[i]).collect();
    let sv: Vec<f64> = order.iter().map(|&i| vs[i]).collect();

    for w in sx.windows(2) {
        if w[0] == w[1] {
            return Err(QuestError::DuplicateKnot { x: w[0] });
        }
    }

    let (lo, hi) = (sx[0], sx[sx.len() - 1]);
    queries
        .iter()
        .map(|&q| {
            if !q.is_finite() || q < lo || q > hi {
                return Err(QuestError::OutOfRange {
                    query: q,
                    min: lo,
                    max: hi,
                });
            }
            // Index of the first knot >= q; q == lo maps to interval 0
            let upper = sx.partition_point(|&x| x < q).max(1);
            let (x0, x1) = (sx[upper - 1], sx[upper]);
            let (v0, v1) = (sv[upper - 1], sv[upper]);
            Ok(match method {
                InterpMethod::Linear => v0 + (v1 - v0) * (q - x0) / (x1 - x0),
                InterpMethod::Nearest => {
                    if q - x0 <= x1 - q {
                        v0
                    } else {
                        v1
                    }
                }
                InterpMethod::Next => {
                    if q == x0 {
                        v0
                    } else {
                        v1
                    }
                }
                InterpMethod::Previous => {
                    if q == x1 {
                        v1
                    } else {
                        v0
                    }
                }
            })
        })
        .collect()
}

/// Linear interpolation of a single query point.
pub fn interp1_scalar(xs: &[f64], vs: &[f64], query: f64) -> Result<f64, QuestError> {
    Ok(interp1(xs, vs, &[query], InterpMethod::Linear)?[0])
}
