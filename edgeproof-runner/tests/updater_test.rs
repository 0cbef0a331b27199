//! Integration tests for the guarded incremental updater.
//!
//! Every test works in its own temp directory; artifact bytes are compared
//! before and after a run to prove what was (not) written.

use std::path::Path;

use chrono::{DateTime, Duration, TimeZone, Utc};
use edgeproof_core::{AssetClass, ContextStore, Direction, TradeRecord};
use edgeproof_runner::{
    CalibrationConfig, IncrementalUpdater, ModelStore, PathsConfig, RunState, ThresholdTable,
    TrainingConfig, UpdateConfig, UpdateError, UpdateOptions, UpdateStatus,
};

fn trade(i: usize, win: bool) -> TradeRecord {
    let entry = Utc.with_ymd_and_hms(2024, 1, 1, 14, 30, 0).unwrap() + Duration::days(i as i64);
    let magnitude = 1.0 + (i % 4) as f64 * 0.5;
    TradeRecord {
        algorithm: ["momentum", "reversion"][i % 2].to_string(),
        symbol: format!("SYM{}", i % 5),
        asset_class: AssetClass::Equity,
        direction: if i % 3 == 0 { Direction::Short } else { Direction::Long },
        entry_time: entry,
        exit_time: entry + Duration::days(2),
        return_pct: if win { magnitude } else { -magnitude },
        position_size: 1000.0 + (i % 7) as f64 * 100.0,
        signal_strength: if win { 0.8 } else { 0.3 } + (i % 3) as f64 * 0.05,
    }
}

/// `n` trades starting at day `start`, 80% winners.
fn mostly_winning(start: usize, n: usize) -> Vec<TradeRecord> {
    (start..start + n).map(|i| trade(i, i % 5 != 0)).collect()
}

fn paths(dir: &Path) -> PathsConfig {
    PathsConfig {
        model: dir.join("models/meta_label.json"),
        backup: dir.join("models/meta_label.backup.json"),
        thresholds: dir.join("models/thresholds.json"),
        run_state: dir.join("state/run_state.json"),
        report_dir: dir.join("reports"),
    }
}

fn fast_training() -> TrainingConfig {
    let mut training = TrainingConfig::default();
    training.cold.rounds = 20;
    training
}

fn updater(dir: &Path, config: UpdateConfig) -> IncrementalUpdater {
    IncrementalUpdater::new(config, fast_training(), CalibrationConfig::default(), paths(dir))
}

fn after_last_exit(trades: &[TradeRecord]) -> DateTime<Utc> {
    trades.iter().map(|t| t.exit_time).max().unwrap() + Duration::hours(1)
}

const FORCE: UpdateOptions = UpdateOptions {
    force: true,
    dry_run: false,
};

#[test]
fn too_few_trades_is_a_noop() {
    let dir = tempfile::tempdir().unwrap();
    let trades = mostly_winning(0, 2);
    let report = updater(dir.path(), UpdateConfig::default())
        .run(&trades, &ContextStore::new(), after_last_exit(&trades), UpdateOptions::default())
        .unwrap();

    assert_eq!(report.status, UpdateStatus::Skipped);
    assert_eq!(report.reason.as_deref(), Some("too few trades (2 < 3)"));
    assert!(!paths(dir.path()).model.exists());
    assert!(!paths(dir.path()).run_state.exists());
}

#[test]
fn cold_start_writes_model_thresholds_and_state() {
    let dir = tempfile::tempdir().unwrap();
    let p = paths(dir.path());
    let trades = mostly_winning(0, 40);
    let now = after_last_exit(&trades);

    let report = updater(dir.path(), UpdateConfig::default())
        .run(&trades, &ContextStore::new(), now, UpdateOptions::default())
        .unwrap();

    assert_eq!(report.status, UpdateStatus::Updated, "{:?}", report.reason);
    assert_eq!(report.strategy.as_deref(), Some("cold_start"));
    assert!(report.before.is_none());
    assert_eq!(report.new_trades, 40);
    // Every trade is in the batch, so nothing independent is left to gate on.
    assert_eq!(report.safety_passed, None);
    assert!(report.reason.unwrap().starts_with("insufficient safety sample"));
    assert!(p.model.exists());
    assert!(!p.backup.exists());

    let table = ThresholdTable::load(&p.thresholds).unwrap();
    assert!(table.get("momentum").is_some());
    assert!(table.get("reversion").is_some());

    let state = RunState::load(&p.run_state).unwrap();
    assert_eq!(state.last_update, Some(now));
    assert_eq!(state.last_exit_watermark, trades.iter().map(|t| t.exit_time).max());
    assert_eq!(state.rejected_updates, 0);
}

#[test]
fn cooldown_blocks_unless_forced() {
    let dir = tempfile::tempdir().unwrap();
    let p = paths(dir.path());
    let config = UpdateConfig {
        cooldown_hours: 24 * 30,
        ..Default::default()
    };
    let up = updater(dir.path(), config);
    let ctx = ContextStore::new();

    let mut trades = mostly_winning(0, 40);
    let first = after_last_exit(&trades);
    up.run(&trades, &ctx, first, UpdateOptions::default()).unwrap();
    let model_bytes = std::fs::read(&p.model).unwrap();
    let state_bytes = std::fs::read(&p.run_state).unwrap();

    trades.extend(mostly_winning(40, 5));
    let second = after_last_exit(&trades);
    assert!(second - first < Duration::hours(24 * 30));

    let report = up.run(&trades, &ctx, second, UpdateOptions::default()).unwrap();
    assert_eq!(report.status, UpdateStatus::Skipped);
    assert!(report.reason.unwrap().starts_with("cooldown active"));
    assert_eq!(report.new_trades, 5);
    assert_eq!(std::fs::read(&p.model).unwrap(), model_bytes);
    assert_eq!(std::fs::read(&p.run_state).unwrap(), state_bytes);

    let forced = up.run(&trades, &ctx, second, FORCE).unwrap();
    assert_ne!(forced.status, UpdateStatus::Skipped);
    assert_eq!(forced.strategy.as_deref(), Some("warm_start"));
    assert!(forced.before.is_some());
}

#[test]
fn failed_safety_gate_restores_previous_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let p = paths(dir.path());
    let ctx = ContextStore::new();

    let mut trades = mostly_winning(0, 30);
    trades.extend((30..40).map(|i| trade(i, false)));
    let first = after_last_exit(&trades);
    updater(dir.path(), UpdateConfig::default())
        .run(&trades, &ctx, first, UpdateOptions::default())
        .unwrap();
    let model_bytes = std::fs::read(&p.model).unwrap();
    let thresholds_bytes = std::fs::read(&p.thresholds).unwrap();
    let state_before = RunState::load(&p.run_state).unwrap();

    // The ten prior trades the gate sees all lost: precision is zero.
    trades.extend(mostly_winning(40, 10));
    let second = after_last_exit(&trades);
    let strict = UpdateConfig {
        safety_sample_size: 10,
        ..Default::default()
    };
    let report = updater(dir.path(), strict).run(&trades, &ctx, second, FORCE).unwrap();

    assert_eq!(report.status, UpdateStatus::Rejected);
    assert_eq!(report.safety_passed, Some(false));
    let safety = report.safety.as_ref().unwrap();
    assert_eq!(safety.sample_count, 10);
    assert_eq!(safety.precision, 0.0);
    assert_eq!(std::fs::read(&p.model).unwrap(), model_bytes);
    assert_eq!(std::fs::read(&p.thresholds).unwrap(), thresholds_bytes);
    assert_eq!(
        report.artifact_checksum.as_deref(),
        Some(edgeproof_runner::checksum(&model_bytes).as_str())
    );

    let state = RunState::load(&p.run_state).unwrap();
    assert_eq!(state.last_update, state_before.last_update);
    assert_eq!(state.last_exit_watermark, state_before.last_exit_watermark);
    assert_eq!(state.rejected_updates, 1);
    assert_eq!(state.last_rejection, Some(second));
}

#[test]
fn safety_sample_excludes_new_batch() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = ContextStore::new();

    let mut trades = mostly_winning(0, 40);
    updater(dir.path(), UpdateConfig::default())
        .run(&trades, &ctx, after_last_exit(&trades), UpdateOptions::default())
        .unwrap();

    trades.extend(mostly_winning(40, 10));
    let report = updater(dir.path(), UpdateConfig::default())
        .run(&trades, &ctx, after_last_exit(&trades), FORCE)
        .unwrap();

    assert_eq!(report.new_trades, 10);
    assert_eq!(report.safety.as_ref().unwrap().sample_count, 40);
    assert!(report.safety_passed.is_some());
}

#[test]
fn rejected_cold_start_leaves_no_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let p = paths(dir.path());

    // Old losers are already behind the watermark; only the winners are new.
    let mut trades: Vec<TradeRecord> = (0..10).map(|i| trade(i, false)).collect();
    trades.extend(mostly_winning(10, 10));
    let watermark = trades[9].exit_time;
    RunState {
        last_exit_watermark: Some(watermark),
        ..Default::default()
    }
    .save(&p.run_state)
    .unwrap();

    let report = updater(dir.path(), UpdateConfig::default())
        .run(&trades, &ContextStore::new(), after_last_exit(&trades), UpdateOptions::default())
        .unwrap();

    assert_eq!(report.status, UpdateStatus::Rejected);
    assert_eq!(report.strategy.as_deref(), Some("cold_start"));
    assert_eq!(report.safety.as_ref().unwrap().sample_count, 10);
    assert!(!p.model.exists());
    assert!(!p.thresholds.exists());
    let state = RunState::load(&p.run_state).unwrap();
    assert_eq!(state.rejected_updates, 1);
    assert_eq!(state.last_exit_watermark, Some(watermark));
}

#[test]
fn failed_save_keeps_previous_artifact_and_state() {
    let dir = tempfile::tempdir().unwrap();
    let p = paths(dir.path());
    let ctx = ContextStore::new();

    let mut trades = mostly_winning(0, 40);
    updater(dir.path(), UpdateConfig::default())
        .run(&trades, &ctx, after_last_exit(&trades), UpdateOptions::default())
        .unwrap();
    let model_bytes = std::fs::read(&p.model).unwrap();
    let state_bytes = std::fs::read(&p.run_state).unwrap();

    // A directory squatting on the staging path makes the write fail.
    std::fs::create_dir_all(ModelStore::new(&p.model, &p.backup).staging_path()).unwrap();

    trades.extend(mostly_winning(40, 10));
    let err = updater(dir.path(), UpdateConfig::default())
        .run(&trades, &ctx, after_last_exit(&trades), FORCE)
        .unwrap_err();

    assert!(matches!(err, UpdateError::Artifact(_)));
    assert_eq!(std::fs::read(&p.model).unwrap(), model_bytes);
    assert_eq!(std::fs::read(&p.run_state).unwrap(), state_bytes);
}

#[test]
fn dry_run_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let p = paths(dir.path());
    let trades = mostly_winning(0, 40);

    let report = updater(dir.path(), UpdateConfig::default())
        .run(
            &trades,
            &ContextStore::new(),
            after_last_exit(&trades),
            UpdateOptions {
                force: false,
                dry_run: true,
            },
        )
        .unwrap();

    assert_eq!(report.status, UpdateStatus::DryRun);
    assert!(report.dry_run);
    assert!(report.after.is_some());
    assert!(report.thresholds.is_some());
    assert!(!p.model.exists());
    assert!(!p.thresholds.exists());
    assert!(!p.run_state.exists());
}

#[test]
fn unusable_batch_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let trades: Vec<TradeRecord> = (0..3)
        .map(|i| TradeRecord {
            signal_strength: f64::NAN,
            ..trade(i, true)
        })
        .collect();

    let err = updater(dir.path(), UpdateConfig::default())
        .run(&trades, &ContextStore::new(), after_last_exit(&trades), UpdateOptions::default())
        .unwrap_err();
    assert!(matches!(err, UpdateError::NoUsableData { trades: 3 }));
    assert!(!paths(dir.path()).model.exists());
}

#[test]
fn trades_exiting_after_now_are_not_consumed() {
    let dir = tempfile::tempdir().unwrap();
    let trades = mostly_winning(0, 10);
    let now = trades[2].exit_time;

    let report = updater(dir.path(), UpdateConfig::default())
        .run(&trades, &ContextStore::new(), now, UpdateOptions::default())
        .unwrap();
    assert_eq!(report.new_trades, 3);
    assert_eq!(report.watermark, Some(now));
}
