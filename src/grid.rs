//! Cartesian-product and uniform-grid utilities.
//!
//! `combine` mirrors MATLAB's `combvec`: the flattened Cartesian product of
//! one or more domains, first domain varying slowest. Both engines build
//! their stimulus and parameter grids with it.

use crate::error::QuestError;

/// Flattened Cartesian product of the given domains.
///
/// Each output tuple has one value per domain, in domain order; the first
/// domain is the major (slowest-varying) axis. A single domain yields
/// one-element tuples; no domains yield a single empty tuple.
pub fn combine(domains: &[Vec<f64>]) -> Vec<Vec<f64>> {
    domains.iter().fold(vec![Vec::new()], |acc, domain| {
        let mut out = Vec::with_capacity(acc.len() * domain.len());
        for prefix in &acc {
            for &value in domain {
                let mut tuple = Vec::with_capacity(prefix.len() + 1);
                tuple.extend_from_slice(prefix);
                tuple.push(value);
                out.push(tuple);
            }
        }
        out
    })
}

/// Evenly spaced ascending sequence from `start` to the largest value that
/// stays at or below `end` in whole multiples of `step`.
///
/// The step count is computed with a small relative tolerance so that grids
/// like `uniform_grid(0.0, 0.1, 1.0)` include the endpoint despite binary
/// representation error.
pub fn uniform_grid(start: f64, step: f64, end: f64) -> Result<Vec<f64>, QuestError> {
    if !(step > 0.0) || !step.is_finite() {
        return Err(QuestError::InvalidParameter(format!(
            "uniform_grid step must be a positive finite number, got {step}"
        )));
    }
    if !start.is_finite() || !end.is_finite() {
        return Err(QuestError::InvalidParameter(
            "uniform_grid bounds must be finite".to_string(),
        ));
    }
    if end < start {
        return Err(QuestError::InvalidParameter(format!(
            "uniform_grid end {end} precedes start {start}"
        )));
    }

    let ratio = (end - start) / step;
    let steps = (ratio * (1.0 + 1e-10) + 1e-10).floor() as usize;
    Ok((0..=steps).map(|k| start + k as f64 * step).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_combine_two_domains() {
        let out = combine(&[vec![1.0, 2.0], vec![10.0, 20.0, 30.0]]);
        assert_eq!(out.len(), 6);
        assert_eq!(out[0], vec![1.0, 10.0]);
        assert_eq!(out[1], vec![1.0, 20.0]);
        assert_eq!(out[3], vec![2.0, 10.0], "first domain is the major axis");
        assert_eq!(out[5], vec![2.0, 30.0]);
    }

    #[test]
    fn test_combine_single_domain() {
        let out = combine(&[vec![3.0, 4.0]]);
        assert_eq!(out, vec![vec![3.0], vec![4.0]]);
    }

    #[test]
    fn test_combine_is_associative_left_to_right() {
        let a = vec![0.0, 1.0];
        let b = vec![5.0];
        let c = vec![7.0, 8.0];
        let all = combine(&[a.clone(), b.clone(), c.clone()]);
        assert_eq!(all.len(), 4);
        assert_eq!(all[0], vec![0.0, 5.0, 7.0]);
        assert_eq!(all[3], vec![1.0, 5.0, 8.0]);
    }

    #[test]
    fn test_uniform_grid_exact() {
        let g = uniform_grid(-4.0, 1.0, -2.0).unwrap();
        assert_eq!(g, vec![-4.0, -3.0, -2.0]);
    }

    #[test]
    fn test_uniform_grid_representation_error() {
        let g = uniform_grid(0.0, 0.1, 1.0).unwrap();
        assert_eq!(g.len(), 11, "0..=1 by 0.1 should have 11 points");
        assert!((g[10] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_uniform_grid_truncates_to_end() {
        let g = uniform_grid(0.0, 0.4, 1.0).unwrap();
        assert_eq!(g.len(), 3);
        assert!((g[2] - 0.8).abs() < 1e-12, "last value must stay at or below end");
    }

    #[test]
    fn test_uniform_grid_rejects_bad_step() {
        assert!(uniform_grid(0.0, 0.0, 1.0).is_err());
        assert!(uniform_grid(0.0, -0.5, 1.0).is_err());
        assert!(uniform_grid(2.0, 0.5, 1.0).is_err());
    }
}
