//! Batch operations over groups of QUEST states.
//!
//! Interleaved staircases and the beta re-analysis both work with a family
//! of states sharing one trial history interpretation. These wrappers apply
//! an operation across the whole slice; per-state normalization is disabled
//! during a group recompute because relative posterior mass *between* states
//! is the quantity of interest there.

use crate::error::QuestError;
use crate::quest::Quest;

/// Rebuild every state's derived tables and replay its history.
///
/// Normalization is switched off on each state first so that posterior mass
/// stays comparable across the group. Stops at the first failing state.
pub fn recompute_all(states: &mut [Quest]) -> Result<(), QuestError> {
    for state in states.iter_mut() {
        state.set_normalize_pdf(false);
        state.recompute()?;
    }
    Ok(())
}

/// Posterior mean threshold of every state.
pub fn means(states: &[Quest]) -> Vec<f64> {
    states.iter().map(Quest::mean).collect()
}

/// Posterior threshold sd of every state.
pub fn sds(states: &[Quest]) -> Vec<f64> {
    states.iter().map(Quest::sd).collect()
}

/// Recommended next-trial quantile intensity of every state.
pub fn quantiles(states: &[Quest]) -> Result<Vec<f64>, QuestError> {
    states.iter().map(|s| s.quantile(None)).collect()
}

/// Posterior density of each state at its paired candidate threshold.
/// `thresholds` must have one entry per state.
pub fn densities_at(states: &[Quest], thresholds: &[f64]) -> Result<Vec<f64>, QuestError> {
    if states.len() != thresholds.len() {
        return Err(QuestError::InvalidParameter(format!(
            "got {} states but {} thresholds",
            states.len(),
            thresholds.len()
        )));
    }
    Ok(states
        .iter()
        .zip(thresholds.iter())
        .map(|(s, &t)| s.pdf_at(t))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quest::QuestOptions;
    use crate::vecmath;

    fn staircases(count: usize) -> Vec<Quest> {
        (0..count)
            .map(|k| {
                Quest::with_options(
                    QuestOptions::new(-1.0, 2.0, 0.82, 3.5, 0.01, 0.5).seed(100 + k as u64),
                )
                .unwrap()
            })
            .collect()
    }

    #[test]
    fn test_interleaved_staircases() {
        let mut group = staircases(3);
        // Round-robin trials against observers at different true thresholds
        let actual = [-2.0, -1.5, -2.5];
        for _ in 0..15 {
            for (k, q) in group.iter_mut().enumerate() {
                let t = q.quantile(None).unwrap();
                let r = q.simulate(t, actual[k]).unwrap();
                q.update(t, r).unwrap();
            }
        }
        let m = means(&group);
        let s = sds(&group);
        assert_eq!(m.len(), 3);
        for k in 0..3 {
            assert!(
                (m[k] - actual[k]).abs() < 1.5,
                "staircase {k}: mean {} too far from {}",
                m[k],
                actual[k]
            );
            assert!(s[k] > 0.0 && s[k] < 2.0);
        }
        let next = quantiles(&group).unwrap();
        assert_eq!(next.len(), 3);
        assert!(next.iter().all(|t| t.is_finite()));
    }

    #[test]
    fn test_recompute_all_disables_normalization() {
        let mut group = staircases(2);
        for q in group.iter_mut() {
            for _ in 0..10 {
                let t = q.quantile(None).unwrap();
                let r = q.simulate(t, -2.0).unwrap();
                q.update(t, r).unwrap();
            }
        }
        recompute_all(&mut group).unwrap();
        for q in &group {
            let total = vecmath::sum(q.pdf());
            assert!(
                total > 0.0 && total < 1.0,
                "replayed unnormalized posterior should have shrunk below 1, got {total}"
            );
        }
    }

    #[test]
    fn test_densities_at_length_check() {
        let group = staircases(2);
        assert!(densities_at(&group, &[-2.0]).is_err());
        let d = densities_at(&group, &[-2.0, -2.0]).unwrap();
        assert_eq!(d.len(), 2);
        assert!(d.iter().all(|v| *v > 0.0));
    }
}
