//! Multiple-testing corrected statistics.
//!
//! - Deflated Sharpe ratio: probability that an observed best-of-N Sharpe
//!   reflects skill rather than selection from a zero-Sharpe null population.
//! - One-sided t-test on fold-level statistics (H0: mean = 0, H1: mean > 0).
//!
//! The deflated Sharpe inputs are per-observation (non-annualized) Sharpe
//! ratios; `sample_size` is the number of observations behind that Sharpe.

use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, StudentsT};
use statrs::function::erf::erfc;

/// Standard normal CDF.
pub fn normal_cdf(z: f64) -> f64 {
    0.5 * erfc(-z / std::f64::consts::SQRT_2)
}

/// Expected maximum of `n_trials` standard normal draws, `sqrt(2 ln N)`.
///
/// Returns 0.0 for `n_trials <= 1`.
pub fn expected_max_sharpe(n_trials: usize) -> f64 {
    if n_trials <= 1 {
        return 0.0;
    }
    (2.0 * (n_trials as f64).ln()).sqrt()
}

/// Full breakdown of a deflated Sharpe computation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeflatedSharpe {
    pub observed_sharpe: f64,
    pub n_trials: usize,
    pub sample_size: usize,
    pub skew: f64,
    pub kurtosis: f64,
    /// `sqrt(2 ln N)`; 0.0 when `N <= 1`.
    pub expected_max_sharpe: f64,
    /// Standard error of the Sharpe estimator; 0.0 when degenerate.
    pub sharpe_std: f64,
    /// 0.0 when no deflation applies (`N <= 1`) or the variance is degenerate.
    pub z_score: f64,
    /// Probability in [0, 1] that the observed Sharpe is genuine.
    pub probability: f64,
    /// `probability > 0.5`.
    pub probably_genuine: bool,
}

impl DeflatedSharpe {
    pub fn compute(
        observed_sharpe: f64,
        n_trials: usize,
        sample_size: usize,
        skew: f64,
        kurtosis: f64,
    ) -> Self {
        let mut out = Self {
            observed_sharpe,
            n_trials,
            sample_size,
            skew,
            kurtosis,
            expected_max_sharpe: expected_max_sharpe(n_trials),
            sharpe_std: 0.0,
            z_score: 0.0,
            probability: 0.0,
            probably_genuine: false,
        };

        // One trial: nothing to deflate against.
        if n_trials <= 1 {
            out.probability = 1.0;
            out.probably_genuine = true;
            return out;
        }

        let Some(variance) = sharpe_variance(observed_sharpe, sample_size, skew, kurtosis) else {
            return out;
        };

        let sigma = variance.sqrt();
        let z = (observed_sharpe - out.expected_max_sharpe * sigma) / sigma;
        let probability = normal_cdf(z).clamp(0.0, 1.0);

        out.sharpe_std = sigma;
        out.z_score = z;
        out.probability = if probability.is_finite() { probability } else { 0.0 };
        out.probably_genuine = out.probability > 0.5;
        out
    }
}

/// Estimator variance of the Sharpe ratio under non-normal returns.
///
/// `(1 + 0.5 SR² - skew SR + ((kurt - 3) / 4) SR²) / (T - 1)`. `None` when
/// `T <= 1` or the variance is not positive.
fn sharpe_variance(sharpe: f64, sample_size: usize, skew: f64, kurtosis: f64) -> Option<f64> {
    if sample_size <= 1 {
        return None;
    }
    let sr2 = sharpe * sharpe;
    let numerator = 1.0 + 0.5 * sr2 - skew * sharpe + ((kurtosis - 3.0) / 4.0) * sr2;
    let variance = numerator / (sample_size - 1) as f64;
    (variance > 0.0 && variance.is_finite()).then_some(variance)
}

/// Deflated Sharpe probability only.
pub fn deflated_sharpe(
    observed_sharpe: f64,
    n_trials: usize,
    sample_size: usize,
    skew: f64,
    kurtosis: f64,
) -> f64 {
    DeflatedSharpe::compute(observed_sharpe, n_trials, sample_size, skew, kurtosis).probability
}

// ─── t-test ──────────────────────────────────────────────────────────

/// Result of a one-sided t-test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TTestResult {
    pub t_statistic: f64,
    /// One-sided p-value `P(T > t)` under H0.
    pub p_value: f64,
    pub df: f64,
}

/// One-sided t-test, H0: mean = 0 vs H1: mean > 0.
///
/// `None` for fewer than two values. Identical values give `f64::MAX` as the
/// statistic (p = 0) for a positive mean and p = 0.5 otherwise.
pub fn one_sided_t_test(values: &[f64]) -> Option<TTestResult> {
    let n = values.len();
    if n < 2 {
        return None;
    }
    let n_f = n as f64;
    let df = n_f - 1.0;
    let mean = values.iter().sum::<f64>() / n_f;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / df;
    let std_err = (variance / n_f).sqrt();

    if std_err < 1e-15 {
        return Some(if mean > 0.0 {
            TTestResult {
                t_statistic: f64::MAX,
                p_value: 0.0,
                df,
            }
        } else {
            TTestResult {
                t_statistic: 0.0,
                p_value: 0.5,
                df,
            }
        });
    }

    let t = mean / std_err;
    let dist = StudentsT::new(0.0, 1.0, df).ok()?;
    Some(TTestResult {
        t_statistic: t,
        p_value: (1.0 - dist.cdf(t)).clamp(0.0, 1.0),
        df,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normal_cdf_reference_points() {
        assert!((normal_cdf(0.0) - 0.5).abs() < 1e-12);
        assert!((normal_cdf(1.96) - 0.975).abs() < 1e-3);
        assert!((normal_cdf(-1.0) - 0.158_655_25).abs() < 1e-6);
    }

    #[test]
    fn single_trial_is_identity() {
        for sr in [-2.0, -0.1, 0.0, 0.3, 5.0] {
            assert_eq!(deflated_sharpe(sr, 1, 10, 0.0, 3.0), 1.0);
            assert_eq!(deflated_sharpe(sr, 0, 250, 0.5, 6.0), 1.0);
        }
    }

    #[test]
    fn degenerate_sample_is_zero() {
        assert_eq!(deflated_sharpe(0.5, 10, 1, 0.0, 3.0), 0.0);
        assert_eq!(deflated_sharpe(0.5, 10, 0, 0.0, 3.0), 0.0);
    }

    #[test]
    fn non_positive_variance_is_zero() {
        // Large positive skew drives the variance numerator negative.
        assert_eq!(deflated_sharpe(1.0, 10, 100, 5.0, 3.0), 0.0);
    }

    #[test]
    fn known_value_normal_returns() {
        // SR = 0.3, N = 10, T = 100, normal moments.
        let var: f64 = (1.0 + 0.5 * 0.09) / 99.0;
        let sigma = var.sqrt();
        let e = (2.0 * 10f64.ln()).sqrt();
        let z = (0.3 - e * sigma) / sigma;
        let expected = normal_cdf(z);
        let got = DeflatedSharpe::compute(0.3, 10, 100, 0.0, 3.0);
        assert!((got.probability - expected).abs() < 1e-12);
        assert!((got.expected_max_sharpe - e).abs() < 1e-12);
        assert_eq!(got.probably_genuine, expected > 0.5);
    }

    #[test]
    fn more_trials_never_raise_probability() {
        let mut prev = f64::INFINITY;
        for n in 1..200 {
            let p = deflated_sharpe(0.25, n, 120, 0.0, 3.0);
            assert!(p <= prev + 1e-15, "N={n}: {p} > {prev}");
            prev = p;
        }
    }

    #[test]
    fn strong_sharpe_is_genuine() {
        let d = DeflatedSharpe::compute(0.5, 5, 500, 0.0, 3.0);
        assert!(d.probably_genuine);
        assert!(d.probability > 0.99);
    }

    #[test]
    fn t_test_positive_mean() {
        let t = one_sided_t_test(&[0.5, 0.7, 0.6, 0.8, 0.4]).unwrap();
        assert!(t.t_statistic > 0.0);
        assert!(t.p_value < 0.01);
        assert_eq!(t.df, 4.0);
    }

    #[test]
    fn t_test_edge_cases() {
        assert!(one_sided_t_test(&[1.0]).is_none());
        assert_eq!(one_sided_t_test(&[0.3, 0.3]).unwrap().p_value, 0.0);
        assert_eq!(one_sided_t_test(&[-0.3, -0.3]).unwrap().p_value, 0.5);
    }
}
