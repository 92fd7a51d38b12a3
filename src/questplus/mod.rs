//! QUEST+ — multidimensional Bayesian adaptive estimation.
//!
//! Where QUEST tracks a single threshold under a fixed Weibull, QUEST+
//! maintains a joint posterior over the full Cartesian product of any number
//! of model parameter domains (threshold, slope, guess rate, lapse rate, ...)
//! and supports stimuli that are themselves tuples. The caller supplies one
//! probability function per response category; everything else is
//! precomputed tables.
//!
//! Trial placement minimizes the expected entropy of the posterior: for each
//! candidate stimulus the engine averages, over possible responses, the
//! Shannon entropy the posterior would have after observing that response,
//! weighted by the probability of the response under the current posterior.
//! The stimulus with the lowest expected entropy is the most informative one
//! to test next.
//!
//! Reference: Watson, A. B. (2017). QUEST+: a general multidimensional
//! Bayesian adaptive psychometric method. Journal of Vision, 17(3):10.

use rayon::prelude::*;

use crate::error::QuestError;
use crate::grid::combine;
use crate::vecmath;

// ==================== Estimation rules ====================

/// How a point estimate is read off the posterior
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EstimateRule {
    /// Posterior-weighted mean per parameter dimension
    Mean,
    /// Parameter combination with the highest posterior probability
    Mode,
}

// ==================== Engine ====================

/// QUEST+ state: precomputed likelihood tables, the joint posterior over
/// parameter combinations and the expected-entropy score per stimulus.
///
/// The response model functions are consumed during construction (the
/// likelihood table is the only thing the engine needs from them), so the
/// state itself is plain data and can be cloned freely.
#[derive(Clone, Debug)]
pub struct QuestPlus {
    /// Flattened stimulus grid, one tuple per testable stimulus
    comb_stim: Vec<Vec<f64>>,
    /// Flattened parameter grid, one tuple per model candidate
    comb_param: Vec<Vec<f64>>,
    /// Joint prior over `comb_param`, normalized
    normalized_prior: Vec<f64>,
    /// Joint posterior over `comb_param`, normalized
    normalized_posterior: Vec<f64>,
    /// `likelihood[response][stim][param]` — probability of `response` at
    /// `comb_stim[stim]` if `comb_param[param]` were the true model
    likelihood: Vec<Vec<Vec<f64>>>,
    /// Expected posterior entropy after testing each stimulus
    expected_entropy_by_stim: Vec<f64>,

    stim_history: Vec<Vec<f64>>,
    response_history: Vec<u32>,
    stim_index_history: Vec<usize>,
}

impl QuestPlus {
    /// Build a QUEST+ state with a uniform prior.
    ///
    /// `models` holds one probability function per response category, called
    /// as `model(stimulus_tuple, parameter_tuple)`; together they should sum
    /// to 1 over responses (for two categories, `f` and `1 - f`).
    /// `stim_domains` and `param_domains` are the per-dimension candidate
    /// values; their Cartesian products form the stimulus and parameter
    /// grids.
    pub fn new<F>(
        models: &[F],
        stim_domains: &[Vec<f64>],
        param_domains: &[Vec<f64>],
    ) -> Result<Self, QuestError>
    where
        F: Fn(&[f64], &[f64]) -> f64 + Sync,
    {
        Self::with_priors(models, stim_domains, param_domains, None)
    }

    /// Like [`QuestPlus::new`] but with explicit per-dimension prior weights
    /// over the parameter domains. The joint prior is their outer product,
    /// normalized; weights need not sum to 1 but must be non-negative with
    /// positive total.
    pub fn with_priors<F>(
        models: &[F],
        stim_domains: &[Vec<f64>],
        param_domains: &[Vec<f64>],
        priors: Option<&[Vec<f64>]>,
    ) -> Result<Self, QuestError>
    where
        F: Fn(&[f64], &[f64]) -> f64 + Sync,
    {
        if models.is_empty() {
            return Err(QuestError::EmptyDomain {
                what: "response model",
            });
        }
        if stim_domains.is_empty() || stim_domains.iter().any(Vec::is_empty) {
            return Err(QuestError::EmptyDomain { what: "stimulus" });
        }
        if param_domains.is_empty() || param_domains.iter().any(Vec::is_empty) {
            return Err(QuestError::EmptyDomain { what: "parameter" });
        }

        let comb_stim = combine(stim_domains);
        let comb_param = combine(param_domains);

        // Per-dimension priors, uniform unless supplied
        let dim_priors: Vec<Vec<f64>> = match priors {
            None => param_domains
                .iter()
                .map(|d| vec![1.0 / d.len() as f64; d.len()])
                .collect(),
            Some(supplied) => {
                if supplied.len() != param_domains.len() {
                    return Err(QuestError::InvalidParameter(format!(
                        "got {} priors for {} parameter dimensions",
                        supplied.len(),
                        param_domains.len()
                    )));
                }
                for (dimension, (prior, domain)) in
                    supplied.iter().zip(param_domains.iter()).enumerate()
                {
                    if prior.len() != domain.len() {
                        return Err(QuestError::DomainSizeMismatch {
                            dimension,
                            prior_len: prior.len(),
                            domain_len: domain.len(),
                        });
                    }
                    if prior.iter().any(|&w| !w.is_finite() || w < 0.0) {
                        return Err(QuestError::InvalidParameter(format!(
                            "prior for dimension {dimension} has negative or non-finite weights"
                        )));
                    }
                }
                supplied.to_vec()
            }
        };

        // Joint prior: product of the per-dimension weights for each tuple
        let mut normalized_prior: Vec<f64> = combine(&dim_priors)
            .iter()
            .map(|tuple| tuple.iter().product())
            .collect();
        if vecmath::normalize_in_place(&mut normalized_prior) == 0.0 {
            return Err(QuestError::ZeroPosterior);
        }

        // Precompute the full likelihood table; stimulus rows in parallel
        let mut likelihood: Vec<Vec<Vec<f64>>> = Vec::with_capacity(models.len());
        for model in models {
            let table: Vec<Vec<f64>> = comb_stim
                .par_iter()
                .map(|stim| comb_param.iter().map(|param| model(stim, param)).collect())
                .collect();
            likelihood.push(table);
        }
        for (response, table) in likelihood.iter().enumerate() {
            for (stim_index, row) in table.iter().enumerate() {
                for (param_index, &value) in row.iter().enumerate() {
                    if !value.is_finite() || !(0.0..=1.0).contains(&value) {
                        return Err(QuestError::ProbabilityOutOfRange {
                            value,
                            response,
                            stim_index,
                            param_index,
                        });
                    }
                }
            }
        }

        let mut quest = Self {
            comb_stim,
            comb_param,
            normalized_posterior: normalized_prior.clone(),
            normalized_prior,
            likelihood,
            expected_entropy_by_stim: Vec::new(),
            stim_history: Vec::new(),
            response_history: Vec::new(),
            stim_index_history: Vec::new(),
        };
        quest.recompute_expected_entropies()?;
        Ok(quest)
    }

    // ==================== Trial placement ====================

    /// The most informative stimulus to test next: the one minimizing the
    /// expected posterior entropy. Ties resolve to the first stimulus in
    /// grid order.
    pub fn next_stimulus(&self) -> &[f64] {
        &self.comb_stim[self.next_stimulus_index()]
    }

    /// Grid index of [`QuestPlus::next_stimulus`].
    pub fn next_stimulus_index(&self) -> usize {
        vecmath::argmin(&self.expected_entropy_by_stim)
    }

    /// Expected posterior entropy per stimulus, aligned with
    /// [`QuestPlus::stimuli`]. Lower is more informative.
    pub fn expected_entropies(&self) -> &[f64] {
        &self.expected_entropy_by_stim
    }

    // ==================== Update ====================

    /// Fold one trial into the posterior. `stim` must be one of the
    /// precomputed stimulus tuples (usually a value previously returned by
    /// [`QuestPlus::next_stimulus`], but any grid member is accepted).
    pub fn update(&mut self, stim: &[f64], response: u32) -> Result<(), QuestError> {
        let index = self
            .comb_stim
            .iter()
            .position(|s| s.as_slice() == stim)
            .ok_or_else(|| QuestError::UnknownStimulus {
                stim: stim.to_vec(),
            })?;
        self.update_at(index, response)
    }

    /// Fold one trial into the posterior by stimulus grid index.
    pub fn update_at(&mut self, stim_index: usize, response: u32) -> Result<(), QuestError> {
        if stim_index >= self.comb_stim.len() {
            return Err(QuestError::InvalidParameter(format!(
                "stimulus index {stim_index} out of range 0 to {}",
                self.comb_stim.len() - 1
            )));
        }
        if response as usize >= self.likelihood.len() {
            return Err(QuestError::ResponseOutOfRange {
                response,
                max: self.likelihood.len() as u32 - 1,
            });
        }

        let row = &self.likelihood[response as usize][stim_index];
        vecmath::hadamard_in_place(&mut self.normalized_posterior, row);
        if vecmath::normalize_in_place(&mut self.normalized_posterior) == 0.0 {
            return Err(QuestError::ZeroPosterior);
        }

        self.stim_history.push(self.comb_stim[stim_index].clone());
        self.response_history.push(response);
        self.stim_index_history.push(stim_index);

        self.recompute_expected_entropies()
    }

    /// Expected posterior entropy for every stimulus under the current
    /// posterior. For stimulus s and response r:
    ///   weight(r) = sum_p posterior(p) * likelihood[r][s][p]
    ///   H(r)      = entropy of the would-be posterior after observing r
    ///   score(s)  = sum_r weight(r) * H(r)
    fn recompute_expected_entropies(&mut self) -> Result<(), QuestError> {
        let posterior = &self.normalized_posterior;
        let likelihood = &self.likelihood;

        let scores: Result<Vec<f64>, QuestError> = (0..self.comb_stim.len())
            .into_par_iter()
            .map(|stim_index| {
                let mut score = 0.0;
                for (response, table) in likelihood.iter().enumerate() {
                    let row = &table[stim_index];
                    let mut would_be: Vec<f64> = posterior
                        .iter()
                        .zip(row.iter())
                        .map(|(&p, &l)| p * l)
                        .collect();
                    let weight = vecmath::sum(&would_be);
                    if weight == 0.0 {
                        return Err(QuestError::ZeroOutcomeProbability {
                            stim_index,
                            response,
                        });
                    }
                    for v in would_be.iter_mut() {
                        *v /= weight;
                    }
                    // 0 * log2(0) contributes nothing; the NaN it produces
                    // in floating point is dropped rather than propagated
                    let entropy: f64 = -would_be
                        .iter()
                        .map(|&p| {
                            let term = p * p.log2();
                            if term.is_nan() {
                                0.0
                            } else {
                                term
                            }
                        })
                        .sum::<f64>();
                    score += weight * entropy;
                }
                Ok(score)
            })
            .collect();

        self.expected_entropy_by_stim = scores?;
        Ok(())
    }

    // ==================== Estimators ====================

    /// Point estimate of the model parameters, one value per parameter
    /// dimension in domain order.
    ///
    /// With `round_to_domain` the mean estimate is snapped to the parameter
    /// combination closest to it (smallest root-mean-square distance across
    /// dimensions); the mode is always a grid member.
    pub fn estimates(&self, rule: EstimateRule, round_to_domain: bool) -> Vec<f64> {
        match rule {
            EstimateRule::Mode => {
                self.comb_param[vecmath::argmax(&self.normalized_posterior)].clone()
            }
            EstimateRule::Mean => {
                let dims = self.comb_param[0].len();
                let means: Vec<f64> = (0..dims)
                    .map(|d| {
                        self.comb_param
                            .iter()
                            .zip(self.normalized_posterior.iter())
                            .map(|(tuple, &w)| tuple[d] * w)
                            .sum()
                    })
                    .collect();
                if !round_to_domain {
                    return means;
                }
                let nearest = vecmath::argmin(
                    &self
                        .comb_param
                        .iter()
                        .map(|tuple| {
                            tuple
                                .iter()
                                .zip(means.iter())
                                .map(|(&v, &m)| (v - m).powi(2))
                                .sum::<f64>()
                                .sqrt()
                        })
                        .collect::<Vec<f64>>(),
                );
                self.comb_param[nearest].clone()
            }
        }
    }

    /// Posterior standard deviation per parameter dimension.
    pub fn sds(&self) -> Vec<f64> {
        let dims = self.comb_param[0].len();
        (0..dims)
            .map(|d| {
                let column: Vec<f64> = self.comb_param.iter().map(|t| t[d]).collect();
                vecmath::weighted_sd(&column, &self.normalized_posterior)
            })
            .collect()
    }

    // ==================== Accessors ====================

    /// Flattened stimulus grid
    pub fn stimuli(&self) -> &[Vec<f64>] {
        &self.comb_stim
    }

    /// Flattened parameter grid
    pub fn parameters(&self) -> &[Vec<f64>] {
        &self.comb_param
    }

    /// Normalized joint prior over the parameter grid
    pub fn prior(&self) -> &[f64] {
        &self.normalized_prior
    }

    /// Normalized joint posterior over the parameter grid
    pub fn posterior(&self) -> &[f64] {
        &self.normalized_posterior
    }

    pub fn trial_count(&self) -> usize {
        self.response_history.len()
    }

    /// Stimulus tuples tested so far, in trial order
    pub fn stim_history(&self) -> &[Vec<f64>] {
        &self.stim_history
    }

    /// Responses observed so far, in trial order
    pub fn response_history(&self) -> &[u32] {
        &self.response_history
    }

    /// Stimulus grid indices tested so far, in trial order
    pub fn stim_index_history(&self) -> &[usize] {
        &self.stim_index_history
    }
}

// ==================== Unit Tests ====================
