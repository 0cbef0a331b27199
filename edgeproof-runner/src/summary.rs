//! Plain-text renderers for validation and update reports.

use crate::monte_carlo::MonteCarloOutcome;
use crate::updater::{UpdateReport, UpdateStatus};
use crate::validation::{ValidationReport, Verdict};

fn mark(passed: bool) -> &'static str {
    if passed {
        "PASS"
    } else {
        "FAIL"
    }
}

pub fn render_validation(report: &ValidationReport) -> String {
    let o = &report.overall;
    let mut out = format!(
        "Validation report ({})\n\n\
Trades: {} ({} invalid dropped, {} without features)\n\
Sharpe: {:.2}  Sortino: {:.2}  Calmar: {:.2}\n\
Total return: {:+.2}%  Max drawdown: {:.2}%\n\
Win rate: {:.1}%  Profit factor: {:.2}\n",
        report.generated_at.format("%Y-%m-%d %H:%M UTC"),
        report.trade_count,
        report.invalid_trades,
        report.feature_skipped,
        o.sharpe,
        o.sortino,
        o.calmar,
        o.total_return * 100.0,
        o.max_drawdown * 100.0,
        o.win_rate * 100.0,
        o.profit_factor,
    );

    if !report.per_algorithm.is_empty() {
        out.push_str("\nPer algorithm\n");
        for (algo, s) in &report.per_algorithm {
            out.push_str(&format!(
                "  {:<20} n={:<5} sharpe={:>6.2} win={:>5.1}% dd={:>6.2}%\n",
                algo,
                s.trade_count,
                s.sharpe,
                s.win_rate * 100.0,
                s.max_drawdown * 100.0
            ));
        }
    }

    if !report.folds.is_empty() {
        out.push_str("\nWalk-forward folds\n");
        out.push_str("  fold  train        test         base WR  filt WR  filt Sharpe  AUC\n");
        for f in &report.folds {
            let auc = f
                .classification
                .as_ref()
                .map(|c| format!("{:.3}", c.auc))
                .unwrap_or_else(|| "-".into());
            out.push_str(&format!(
                "  {:<4}  [{:>4},{:>4})  [{:>4},{:>4})  {:>6.1}%  {:>6.1}%  {:>11.2}  {}\n",
                f.fold.fold_index,
                f.fold.train.start,
                f.fold.train.end,
                f.fold.test.start,
                f.fold.test.end,
                f.baseline.win_rate * 100.0,
                f.filtered.win_rate * 100.0,
                f.filtered.sharpe,
                auc,
            ));
        }
        if let Some(t) = &report.fold_t_test {
            out.push_str(&format!(
                "  t-test on filtered Sharpe: t={:.2}, p={:.4}, df={}\n",
                t.t_statistic.min(1e6),
                t.p_value,
                t.df
            ));
        }
    }

    if let (Some(algo), Some(d)) = (&report.best_algorithm, &report.deflated_sharpe) {
        out.push_str(&format!(
            "\nDeflated Sharpe ({algo}): SR={:.3} N={} T={} -> p={:.3}{}\n",
            d.observed_sharpe,
            d.n_trials,
            d.sample_size,
            d.probability,
            if d.probably_genuine { " (probably genuine)" } else { "" }
        ));
    }

    match &report.monte_carlo {
        MonteCarloOutcome::Completed(mc) => {
            let ci = mc.confidence * 100.0;
            out.push_str(&format!(
                "\nMonte Carlo ({} x {:?}, seed {})\n\
  Sharpe {ci:.0}% CI: [{:.2}, {:.2}]\n\
  Max drawdown {ci:.0}% CI: [{:.2}%, {:.2}%]\n\
  Terminal PnL {ci:.0}% CI: [{:+.2}%, {:+.2}%]\n\
  Positive Sharpe: {:.1}%  Positive PnL: {:.1}%\n",
                mc.n_simulations,
                mc.mode,
                mc.seed,
                mc.sharpe.lower,
                mc.sharpe.upper,
                mc.max_drawdown.lower * 100.0,
                mc.max_drawdown.upper * 100.0,
                mc.terminal_pnl.lower * 100.0,
                mc.terminal_pnl.upper * 100.0,
                mc.positive_sharpe_fraction * 100.0,
                mc.positive_pnl_fraction * 100.0,
            ));
        }
        MonteCarloOutcome::Insufficient { sample_size } => {
            out.push_str(&format!("\nMonte Carlo: insufficient data ({sample_size} trades)\n"));
        }
    }

    if !report.decay.is_empty() {
        out.push_str("\nAlpha decay\n");
        for d in &report.decay {
            out.push_str(&format!(
                "  {:<20} trades={:<5} trend={:+.2}  {:?}\n",
                d.algorithm, d.trade_count, d.trend, d.status
            ));
        }
    }

    out.push_str("\nChecklist\n");
    for item in &report.checklist.items {
        out.push_str(&format!("  [{}] {:<18} {}\n", mark(item.passed), item.name, item.detail));
    }

    let verdict = match report.verdict {
        Verdict::Sound => "SOUND",
        Verdict::NotSound => "NOT SOUND",
        Verdict::InsufficientData => "INSUFFICIENT DATA",
    };
    out.push_str(&format!(
        "\nVerdict: {verdict} ({}/{} checks passed)\n",
        report.checklist.passed_count(),
        report.checklist.items.len()
    ));
    out
}

pub fn render_update(report: &UpdateReport) -> String {
    let status = match report.status {
        UpdateStatus::Updated => "updated",
        UpdateStatus::Skipped => "skipped",
        UpdateStatus::Rejected => "rejected",
        UpdateStatus::DryRun => "dry run",
    };
    let mut out = format!("Model update: {status}\n");
    if let Some(reason) = &report.reason {
        out.push_str(&format!("Reason: {reason}\n"));
    }
    out.push_str(&format!(
        "New trades: {} ({} skipped)\n",
        report.new_trades, report.skipped_trades
    ));
    if let Some(strategy) = &report.strategy {
        out.push_str(&format!("Strategy: {strategy}\n"));
    }

    for (label, metrics) in [
        ("Before", &report.before),
        ("After", &report.after),
        ("Safety", &report.safety),
    ] {
        if let Some(m) = metrics {
            out.push_str(&format!(
                "{label:<7} n={:<4} precision={:.3} recall={:.3} f1={:.3} auc={:.3}\n",
                m.sample_count, m.precision, m.recall, m.f1, m.auc
            ));
        }
    }
    if let Some(passed) = report.safety_passed {
        out.push_str(&format!("Safety gate: {}\n", mark(passed)));
    }

    if let Some(table) = &report.thresholds {
        out.push_str("Thresholds\n");
        for (algo, e) in &table.entries {
            out.push_str(&format!(
                "  {:<20} cutoff={:.2} precision={:.3} recall={:.3} n={}\n",
                algo, e.threshold, e.precision, e.recall, e.sample_count
            ));
        }
    }
    if let Some(sum) = &report.artifact_checksum {
        out.push_str(&format!("Artifact checksum: {sum}\n"));
    }
    out
}
