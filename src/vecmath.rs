//! Small fixed-arity helpers over flat `f64` buffers.
//!
//! The engines only need element-wise arithmetic, reductions and a couple of
//! index searches; anything heavier (linear algebra, FFT, splines) is out of
//! scope for this crate.

/// Sum of all elements
pub fn sum(a: &[f64]) -> f64 {
    a.iter().sum()
}

/// Running cumulative sum, same length as the input
pub fn cumsum(a: &[f64]) -> Vec<f64> {
    let mut acc = 0.0;
    a.iter()
        .map(|&v| {
            acc += v;
            acc
        })
        .collect()
}

/// Element-wise product, written into `a`
pub fn hadamard_in_place(a: &mut [f64], b: &[f64]) {
    debug_assert_eq!(a.len(), b.len());
    for (av, &bv) in a.iter_mut().zip(b.iter()) {
        *av *= bv;
    }
}

/// Divide every element by the total so the buffer sums to 1.
/// Returns the pre-normalization sum; the buffer is untouched when it is 0.
pub fn normalize_in_place(a: &mut [f64]) -> f64 {
    let s = sum(a);
    if s != 0.0 {
        for v in a.iter_mut() {
            *v /= s;
        }
    }
    s
}

/// True when every element is finite (no NaN, no infinities)
pub fn all_finite(a: &[f64]) -> bool {
    a.iter().all(|v| v.is_finite())
}

/// Index of the maximum element, first occurrence on ties.
/// Returns 0 for an empty slice.
pub fn argmax(a: &[f64]) -> usize {
    let mut best = 0;
    for (i, &v) in a.iter().enumerate() {
        if v > a[best] {
            best = i;
        }
    }
    best
}

/// Index of the minimum element, first occurrence on ties.
/// Returns 0 for an empty slice.
pub fn argmin(a: &[f64]) -> usize {
    let mut best = 0;
    for (i, &v) in a.iter().enumerate() {
        if v < a[best] {
            best = i;
        }
    }
    best
}

/// Weight-averaged mean of `values`, sum(w*v)/sum(w)
pub fn weighted_mean(values: &[f64], weights: &[f64]) -> f64 {
    debug_assert_eq!(values.len(), weights.len());
    let total: f64 = sum(weights);
    let acc: f64 = values.iter().zip(weights.iter()).map(|(&v, &w)| v * w).sum();
    acc / total
}

/// Weight-averaged standard deviation, sqrt(E[v^2] - E[v]^2)
pub fn weighted_sd(values: &[f64], weights: &[f64]) -> f64 {
    debug_assert_eq!(values.len(), weights.len());
    let total: f64 = sum(weights);
    let mean: f64 = values
        .iter()
        .zip(weights.iter())
        .map(|(&v, &w)| v * w)
        .sum::<f64>()
        / total;
    let second: f64 = values
        .iter()
        .zip(weights.iter())
        .map(|(&v, &w)| v * v * w)
        .sum::<f64>()
        / total;
    (second - mean * mean).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cumsum() {
        assert_eq!(cumsum(&[1.0, 2.0, 3.0]), vec![1.0, 3.0, 6.0]);
        assert!(cumsum(&[]).is_empty());
    }

    #[test]
    fn test_hadamard_in_place() {
        let mut a = vec![1.0, 2.0, 3.0];
        hadamard_in_place(&mut a, &[2.0, 0.5, 0.0]);
        assert_eq!(a, vec![2.0, 1.0, 0.0]);
    }

    #[test]
    fn test_normalize_in_place() {
        let mut a = vec![1.0, 3.0];
        let s = normalize_in_place(&mut a);
        assert!((s - 4.0).abs() < 1e-12, "pre-normalization sum should be 4");
        assert!((sum(&a) - 1.0).abs() < 1e-12, "normalized buffer should sum to 1");

        let mut zeros = vec![0.0, 0.0];
        assert_eq!(normalize_in_place(&mut zeros), 0.0);
        assert_eq!(zeros, vec![0.0, 0.0], "all-zero buffer should be untouched");
    }

    #[test]
    fn test_argmax_argmin_first_occurrence() {
        assert_eq!(argmax(&[1.0, 3.0, 3.0, 2.0]), 1, "ties resolve to first occurrence");
        assert_eq!(argmin(&[2.0, 0.5, 0.5, 1.0]), 1, "ties resolve to first occurrence");
    }

    #[test]
    fn test_weighted_moments() {
        let values = [0.0, 1.0];
        let weights = [0.5, 0.5];
        assert!((weighted_mean(&values, &weights) - 0.5).abs() < 1e-12);
        assert!((weighted_sd(&values, &weights) - 0.5).abs() < 1e-12);

        // Unnormalized weights give the same answer
        let weights2 = [2.0, 2.0];
        assert!((weighted_mean(&values, &weights2) - 0.5).abs() < 1e-12);
    }
}
