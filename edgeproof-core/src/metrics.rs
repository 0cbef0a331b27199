//! Performance metrics: pure functions over a per-trade return series.
//!
//! Returns are fractional (0.02 = +2%). Every function is total: empty or
//! degenerate input yields 0.0, never a panic or NaN.

use serde::{Deserialize, Serialize};

/// Default annualization factor (trading days per year).
pub const DEFAULT_PERIODS_PER_YEAR: f64 = 252.0;

const STD_EPSILON: f64 = 1e-12;
const CALMAR_MIN_DRAWDOWN: f64 = 0.001;

/// Aggregate performance metrics for one return series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSummary {
    pub trade_count: usize,
    pub total_return: f64,
    pub mean_return: f64,
    pub sharpe: f64,
    pub sortino: f64,
    pub calmar: f64,
    /// Maximum drawdown as a positive fraction (0.15 = 15% peak-to-trough).
    pub max_drawdown: f64,
    pub win_rate: f64,
    pub profit_factor: f64,
}

impl PerformanceSummary {
    pub fn compute(returns: &[f64], risk_free_rate: f64, periods_per_year: f64) -> Self {
        Self {
            trade_count: returns.len(),
            total_return: total_return(returns),
            mean_return: mean(returns),
            sharpe: sharpe_ratio(returns, risk_free_rate, periods_per_year),
            sortino: sortino_ratio(returns, risk_free_rate, periods_per_year),
            calmar: calmar_ratio(returns, periods_per_year),
            max_drawdown: max_drawdown(returns),
            win_rate: win_rate(returns),
            profit_factor: profit_factor(returns),
        }
    }

    pub fn empty() -> Self {
        Self::compute(&[], 0.0, DEFAULT_PERIODS_PER_YEAR)
    }
}

// ─── Ratios ─────────────────────────────────────────────────────────

/// Annualized Sharpe ratio.
///
/// `mean(r - rf/p) / std(r, ddof=1) * sqrt(p)`. Returns 0.0 for fewer than
/// two observations or zero dispersion.
pub fn sharpe_ratio(returns: &[f64], risk_free_rate: f64, periods_per_year: f64) -> f64 {
    if returns.len() < 2 || periods_per_year <= 0.0 {
        return 0.0;
    }
    let rf = risk_free_rate / periods_per_year;
    let excess: Vec<f64> = returns.iter().map(|r| r - rf).collect();
    let std = std_dev(returns);
    if std < STD_EPSILON {
        return 0.0;
    }
    mean(&excess) / std * periods_per_year.sqrt()
}

/// Annualized Sortino ratio.
///
/// Denominator is the sample standard deviation of the negative excess
/// returns only. With fewer than two negative observations there is no
/// meaningful downside dispersion: returns `mean * sqrt(p)` when the mean
/// excess return is positive, else 0.0.
pub fn sortino_ratio(returns: &[f64], risk_free_rate: f64, periods_per_year: f64) -> f64 {
    if returns.len() < 2 || periods_per_year <= 0.0 {
        return 0.0;
    }
    let rf = risk_free_rate / periods_per_year;
    let excess: Vec<f64> = returns.iter().map(|r| r - rf).collect();
    let m = mean(&excess);

    let downside: Vec<f64> = excess.iter().copied().filter(|r| *r < 0.0).collect();
    if downside.len() < 2 {
        return if m > 0.0 { m * periods_per_year.sqrt() } else { 0.0 };
    }
    let downside_std = std_dev(&downside);
    if downside_std < STD_EPSILON {
        return 0.0;
    }
    m / downside_std * periods_per_year.sqrt()
}

/// Calmar ratio: annualized mean return / |max drawdown|.
///
/// Returns 0.0 when the drawdown is below 0.1%.
pub fn calmar_ratio(returns: &[f64], periods_per_year: f64) -> f64 {
    if returns.is_empty() {
        return 0.0;
    }
    let dd = max_drawdown(returns);
    if dd < CALMAR_MIN_DRAWDOWN {
        return 0.0;
    }
    mean(returns) * periods_per_year / dd
}

// ─── Equity curve ───────────────────────────────────────────────────

/// Cumulative-product equity curve starting at 1.0 (length `n + 1`).
pub fn equity_curve(returns: &[f64]) -> Vec<f64> {
    let mut curve = Vec::with_capacity(returns.len() + 1);
    let mut equity = 1.0;
    curve.push(equity);
    for r in returns {
        equity *= 1.0 + r;
        curve.push(equity);
    }
    curve
}

/// Maximum peak-to-trough drawdown of the equity curve, as a positive fraction.
pub fn max_drawdown(returns: &[f64]) -> f64 {
    let mut peak = 1.0_f64;
    let mut equity = 1.0_f64;
    let mut max_dd = 0.0_f64;
    for r in returns {
        equity *= 1.0 + r;
        if equity > peak {
            peak = equity;
        }
        if peak > 0.0 {
            let dd = (peak - equity) / peak;
            if dd > max_dd {
                max_dd = dd;
            }
        }
    }
    max_dd
}

/// Compounded total return: `prod(1 + r) - 1`.
pub fn total_return(returns: &[f64]) -> f64 {
    if returns.is_empty() {
        return 0.0;
    }
    returns.iter().fold(1.0, |eq, r| eq * (1.0 + r)) - 1.0
}

// ─── Trade statistics ───────────────────────────────────────────────

/// Fraction of strictly positive returns.
pub fn win_rate(returns: &[f64]) -> f64 {
    if returns.is_empty() {
        return 0.0;
    }
    returns.iter().filter(|r| **r > 0.0).count() as f64 / returns.len() as f64
}

/// Gross gains / gross losses, capped at 100.0.
pub fn profit_factor(returns: &[f64]) -> f64 {
    let gains: f64 = returns.iter().filter(|r| **r > 0.0).sum();
    let losses: f64 = returns.iter().filter(|r| **r < 0.0).map(|r| r.abs()).sum();
    if losses < 1e-10 {
        return if gains > 0.0 { 100.0 } else { 0.0 };
    }
    (gains / losses).min(100.0)
}

// ─── Moments ────────────────────────────────────────────────────────

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation (ddof = 1).
pub fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    variance.sqrt()
}

/// Sample skewness (population moments). 0.0 for fewer than 3 observations.
pub fn skewness(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 3 {
        return 0.0;
    }
    let m = mean(values);
    let m2 = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / n as f64;
    if m2 < STD_EPSILON {
        return 0.0;
    }
    let m3 = values.iter().map(|v| (v - m).powi(3)).sum::<f64>() / n as f64;
    m3 / m2.powf(1.5)
}

/// Sample kurtosis, non-excess (normal = 3.0). 3.0 for fewer than 4 observations.
pub fn kurtosis(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 4 {
        return 3.0;
    }
    let m = mean(values);
    let m2 = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / n as f64;
    if m2 < STD_EPSILON {
        return 3.0;
    }
    let m4 = values.iter().map(|v| (v - m).powi(4)).sum::<f64>() / n as f64;
    m4 / (m2 * m2)
}

/// Linear-interpolated percentile of an ascending-sorted slice, `p` in [0, 100].
pub fn percentile_sorted(sorted: &[f64], p: f64) -> f64 {
    let n = sorted.len();
    if n == 0 {
        return 0.0;
    }
    if n == 1 {
        return sorted[0];
    }
    let rank = (p.clamp(0.0, 100.0) / 100.0) * (n - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = (lo + 1).min(n - 1);
    let frac = rank - lo as f64;
    sorted[lo] * (1.0 - frac) + sorted[hi] * frac
}

#[cfg(test)]
mod tests {
    use super::*;

    const P: f64 = DEFAULT_PERIODS_PER_YEAR;

    // ── Sharpe ──

    #[test]
    fn sharpe_known_value() {
        let r = [0.01, -0.005, 0.02, 0.0, 0.015];
        let m = 0.008;
        let sd = std_dev(&r);
        let expected = m / sd * P.sqrt();
        assert!((sharpe_ratio(&r, 0.0, P) - expected).abs() < 1e-10);
    }

    #[test]
    fn sharpe_degenerate_inputs_are_zero() {
        assert_eq!(sharpe_ratio(&[], 0.0, P), 0.0);
        assert_eq!(sharpe_ratio(&[0.05], 0.0, P), 0.0);
        assert_eq!(sharpe_ratio(&[0.01; 20], 0.0, P), 0.0);
    }

    #[test]
    fn sharpe_risk_free_lowers_ratio() {
        let r = [0.01, -0.005, 0.02, 0.0, 0.015];
        assert!(sharpe_ratio(&r, 0.05, P) < sharpe_ratio(&r, 0.0, P));
    }

    // ── Sortino ──

    #[test]
    fn sortino_uses_downside_dispersion() {
        let r = [0.02, -0.01, 0.03, -0.03, 0.01, 0.02];
        let downside = [-0.01, -0.03];
        let expected = mean(&r) / std_dev(&downside) * P.sqrt();
        assert!((sortino_ratio(&r, 0.0, P) - expected).abs() < 1e-10);
    }

    #[test]
    fn sortino_single_loss_falls_back_to_scaled_mean() {
        let r = [0.02, -0.01, 0.03, 0.01];
        let expected = mean(&r) * P.sqrt();
        assert!((sortino_ratio(&r, 0.0, P) - expected).abs() < 1e-10);
    }

    #[test]
    fn sortino_single_loss_negative_mean_is_zero() {
        let r = [0.001, -0.05, 0.001];
        assert_eq!(sortino_ratio(&r, 0.0, P), 0.0);
    }

    #[test]
    fn sortino_short_input_is_zero() {
        assert_eq!(sortino_ratio(&[0.1], 0.0, P), 0.0);
        assert_eq!(sortino_ratio(&[], 0.0, P), 0.0);
    }

    // ── Drawdown / Calmar ──

    #[test]
    fn max_drawdown_known() {
        // 1.0 → 1.1 → 0.88 → 0.924 : peak 1.1, trough 0.88
        let r = [0.1, -0.2, 0.05];
        assert!((max_drawdown(&r) - 0.2).abs() < 1e-10);
    }

    #[test]
    fn max_drawdown_monotonic_is_zero() {
        assert_eq!(max_drawdown(&[0.01, 0.02, 0.0, 0.03]), 0.0);
        assert_eq!(max_drawdown(&[]), 0.0);
    }

    #[test]
    fn calmar_known_value() {
        let r = [0.1, -0.2, 0.05];
        let expected = mean(&r) * P / 0.2;
        assert!((calmar_ratio(&r, P) - expected).abs() < 1e-10);
    }

    #[test]
    fn calmar_tiny_drawdown_is_zero() {
        assert_eq!(calmar_ratio(&[0.01, -0.0005, 0.01], P), 0.0);
        assert_eq!(calmar_ratio(&[], P), 0.0);
    }

    #[test]
    fn equity_curve_compounds() {
        let eq = equity_curve(&[0.1, -0.5]);
        assert_eq!(eq.len(), 3);
        assert!((eq[2] - 0.55).abs() < 1e-12);
        assert!((total_return(&[0.1, -0.5]) + 0.45).abs() < 1e-12);
    }

    // ── Trade stats ──

    #[test]
    fn win_rate_and_profit_factor() {
        let r = [0.05, -0.02, 0.03, 0.0];
        assert!((win_rate(&r) - 0.5).abs() < 1e-12);
        assert!((profit_factor(&r) - 4.0).abs() < 1e-10);
        assert_eq!(profit_factor(&[0.01, 0.02]), 100.0);
        assert_eq!(profit_factor(&[-0.01]), 0.0);
        assert_eq!(win_rate(&[]), 0.0);
    }

    // ── Moments ──

    #[test]
    fn symmetric_series_has_zero_skew() {
        let r = [-0.02, -0.01, 0.0, 0.01, 0.02];
        assert!(skewness(&r).abs() < 1e-12);
    }

    #[test]
    fn right_tail_has_positive_skew() {
        let r = [-0.01, -0.01, -0.01, -0.01, 0.10];
        assert!(skewness(&r) > 0.0);
    }

    #[test]
    fn kurtosis_defaults_to_normal() {
        assert_eq!(kurtosis(&[0.1, 0.2]), 3.0);
        assert_eq!(kurtosis(&[0.1; 10]), 3.0);
    }

    #[test]
    fn percentile_interpolates() {
        let sorted = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(percentile_sorted(&sorted, 0.0), 1.0);
        assert_eq!(percentile_sorted(&sorted, 50.0), 3.0);
        assert_eq!(percentile_sorted(&sorted, 100.0), 5.0);
        assert!((percentile_sorted(&sorted, 12.5) - 1.5).abs() < 1e-12);
        assert_eq!(percentile_sorted(&[], 50.0), 0.0);
    }

    #[test]
    fn summary_is_finite_for_empty_input() {
        let s = PerformanceSummary::empty();
        assert_eq!(s.trade_count, 0);
        assert_eq!(s.sharpe, 0.0);
        assert!(s.sortino.is_finite());
        assert!(s.calmar.is_finite());
    }
}
