//! Guarded incremental update of the meta-label model.
//!
//! Stages run in order and any of them may stop the run:
//!
//! 1. eligibility (batch size, then cooldown; `force` bypasses both)
//! 2. scoring of the current artifact on the new batch
//! 3. backup, then warm-start (or cold-start) training on the batch
//! 4. safety gate on the most recent closed trades outside the batch;
//!    rejection rolls the artifact back to the backup bytes
//!
//! Thresholds and the run-state watermark only move after the gate passes.
//! A dry run executes every stage in memory and writes nothing.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use edgeproof_core::{collect_valid, ContextStore, FeatureEngineer, FeatureVector, TradeRecord};

use crate::artifact::{ArtifactError, ModelArtifact, ModelStore};
use crate::calibrator::{calibrate, CalibrationConfig, ScoredTrade, ThresholdTable};
use crate::config::{EdgeproofConfig, PathsConfig};
use crate::model::training::score;
use crate::model::{select_strategy, ClassificationMetrics, ModelError, TrainingConfig};
use crate::run_state::RunState;

#[derive(Debug, Error)]
pub enum UpdateError {
    #[error(transparent)]
    Artifact(#[from] ArtifactError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("no usable feature vectors among {trades} new trades")]
    NoUsableData { trades: usize },
}

/// `[update]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdateConfig {
    pub min_batch_size: usize,
    pub cooldown_hours: i64,
    /// Most recent closed trades outside the batch the safety gate evaluates.
    pub safety_sample_size: usize,
    pub precision_floor: f64,
    /// Probability cutoff used when scoring before/after/safety metrics.
    pub decision_threshold: f64,
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            min_batch_size: 3,
            cooldown_hours: 20,
            safety_sample_size: 100,
            precision_floor: 0.50,
            decision_threshold: 0.5,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateOptions {
    pub force: bool,
    pub dry_run: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateStatus {
    Updated,
    Skipped,
    Rejected,
    DryRun,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateReport {
    pub status: UpdateStatus,
    pub reason: Option<String>,
    pub run_at: DateTime<Utc>,
    pub dry_run: bool,
    pub new_trades: usize,
    /// New trades dropped because their features could not be built.
    pub skipped_trades: usize,
    pub strategy: Option<String>,
    pub before: Option<ClassificationMetrics>,
    pub after: Option<ClassificationMetrics>,
    pub safety: Option<ClassificationMetrics>,
    pub safety_passed: Option<bool>,
    pub thresholds: Option<ThresholdTable>,
    pub artifact_checksum: Option<String>,
    pub watermark: Option<DateTime<Utc>>,
}

impl UpdateReport {
    fn new(run_at: DateTime<Utc>, opts: UpdateOptions) -> Self {
        Self {
            status: UpdateStatus::Skipped,
            reason: None,
            run_at,
            dry_run: opts.dry_run,
            new_trades: 0,
            skipped_trades: 0,
            strategy: None,
            before: None,
            after: None,
            safety: None,
            safety_passed: None,
            thresholds: None,
            artifact_checksum: None,
            watermark: None,
        }
    }

    fn skipped(mut self, reason: String) -> Self {
        info!(%reason, "update skipped");
        self.status = UpdateStatus::Skipped;
        self.reason = Some(reason);
        self
    }
}

pub struct IncrementalUpdater {
    config: UpdateConfig,
    training: TrainingConfig,
    calibration: CalibrationConfig,
    paths: PathsConfig,
}

impl IncrementalUpdater {
    pub fn new(
        config: UpdateConfig,
        training: TrainingConfig,
        calibration: CalibrationConfig,
        paths: PathsConfig,
    ) -> Self {
        Self {
            config,
            training,
            calibration,
            paths,
        }
    }

    pub fn from_config(config: &EdgeproofConfig) -> Self {
        Self::new(
            config.update.clone(),
            config.training.clone(),
            config.calibration.clone(),
            config.paths.clone(),
        )
    }

    fn store(&self) -> ModelStore {
        ModelStore::new(&self.paths.model, &self.paths.backup)
    }

    /// Run one update over the full chronological trade history.
    pub fn run(
        &self,
        trades: &[TradeRecord],
        context: &ContextStore,
        now: DateTime<Utc>,
        opts: UpdateOptions,
    ) -> Result<UpdateReport, UpdateError> {
        let mut report = UpdateReport::new(now, opts);
        let mut state = RunState::load(&self.paths.run_state)?;

        // ── 1. Eligibility ──
        let is_new = |t: &TradeRecord| state.is_new(t.exit_time) && t.exit_time <= now;
        let new_count = trades.iter().filter(|t| is_new(t)).count();
        report.new_trades = new_count;

        if !opts.force {
            if new_count < self.config.min_batch_size {
                return Ok(report.skipped(format!(
                    "too few trades ({new_count} < {})",
                    self.config.min_batch_size
                )));
            }
            let cooldown = Duration::hours(self.config.cooldown_hours);
            if let Some(remaining) = state.cooldown_remaining(now, cooldown) {
                return Ok(report.skipped(format!(
                    "cooldown active ({:.1}h remaining)",
                    remaining.num_minutes() as f64 / 60.0
                )));
            }
        }

        let engineer = FeatureEngineer::new(context);
        let (valid, _) = collect_valid(trades, engineer.build_all(trades));
        let valid: Vec<(usize, FeatureVector)> =
            valid.into_iter().filter(|(i, _)| trades[*i].exit_time <= now).collect();
        let batch: Vec<&(usize, FeatureVector)> = valid.iter().filter(|(i, _)| is_new(&trades[*i])).collect();
        report.skipped_trades = new_count - batch.len();
        if batch.is_empty() {
            return Err(UpdateError::NoUsableData { trades: new_count });
        }

        let batch_features: Vec<FeatureVector> = batch.iter().map(|(_, v)| v.clone()).collect();
        let batch_labels: Vec<bool> = batch.iter().map(|(i, _)| trades[*i].is_win()).collect();
        let watermark = batch.iter().map(|(i, _)| trades[*i].exit_time).max();
        report.watermark = watermark;
        info!(batch = batch.len(), skipped = report.skipped_trades, "update batch assembled");

        // ── 2. Pre-update evaluation ──
        let store = self.store();
        let existing = store.load()?;
        if let Some(artifact) = &existing {
            let probs = score(&artifact.ensemble, &batch_features);
            let before = ClassificationMetrics::compute(&probs, &batch_labels, self.config.decision_threshold);
            info!(precision = before.precision, auc = before.auc, "current model on new batch");
            report.before = Some(before);
        }

        // ── 3. Training ──
        let strategy = select_strategy(existing.as_ref().map(|a| a.ensemble.clone()), &self.training);
        report.strategy = Some(strategy.name().to_string());
        let ensemble = strategy.train(&batch_features, &batch_labels)?;
        let after_probs = score(&ensemble, &batch_features);
        report.after = Some(ClassificationMetrics::compute(
            &after_probs,
            &batch_labels,
            self.config.decision_threshold,
        ));
        let artifact = match &existing {
            Some(prev) => prev.updated(ensemble, now, batch.len()),
            None => ModelArtifact::new(ensemble, now, batch.len()),
        };

        // ── 4. Safety gate ──
        let prior: Vec<&(usize, FeatureVector)> = valid.iter().filter(|(i, _)| !is_new(&trades[*i])).collect();
        let sample = &prior[prior.len().saturating_sub(self.config.safety_sample_size)..];
        let safety = if sample.is_empty() {
            None
        } else {
            let features: Vec<FeatureVector> = sample.iter().map(|(_, v)| v.clone()).collect();
            let labels: Vec<bool> = sample.iter().map(|(i, _)| trades[*i].is_win()).collect();
            let probs = score(&artifact.ensemble, &features);
            Some(ClassificationMetrics::compute(&probs, &labels, self.config.decision_threshold))
        };
        let (passed, gate_note) = match &safety {
            Some(m) if m.precision >= self.config.precision_floor => (true, None),
            Some(m) => (
                false,
                Some(format!(
                    "precision {:.3} on last {} prior trades below floor {:.2}",
                    m.precision, m.sample_count, self.config.precision_floor
                )),
            ),
            None if existing.is_none() => (
                true,
                Some("insufficient safety sample (no closed trades before this batch); gate not evaluated".to_string()),
            ),
            None => (
                false,
                Some("insufficient safety sample (no closed trades before this batch)".to_string()),
            ),
        };
        match &safety {
            Some(m) => info!(
                samples = m.sample_count,
                precision = m.precision,
                floor = self.config.precision_floor,
                passed,
                "safety gate evaluated"
            ),
            None => warn!(cold_start = existing.is_none(), passed, "insufficient safety sample"),
        }
        report.safety_passed = safety.as_ref().map(|_| passed);
        report.safety = safety;

        let thresholds = passed.then(|| {
            let scored: Vec<ScoredTrade> = valid
                .iter()
                .map(|(i, v)| ScoredTrade {
                    algorithm: trades[*i].algorithm.clone(),
                    probability: artifact.ensemble.predict_proba(v.as_slice()),
                    win: trades[*i].is_win(),
                })
                .collect();
            calibrate(&scored, &self.calibration)
        });

        if opts.dry_run {
            report.status = UpdateStatus::DryRun;
            report.reason = Some(match (&gate_note, passed) {
                (Some(note), true) => format!("dry run: safety gate would pass ({note})"),
                (None, _) => "dry run: safety gate would pass".to_string(),
                (Some(note), false) => format!("dry run: safety gate would reject ({note})"),
            });
            report.thresholds = thresholds;
            info!("dry run complete, nothing written");
            return Ok(report);
        }

        let backup_checksum = store.backup()?;
        let written = match store.save(&artifact) {
            Ok(sum) => sum,
            Err(e) => {
                warn!(error = %e, "artifact save failed, rolling back");
                match backup_checksum {
                    Some(_) => {
                        store.restore()?;
                    }
                    None => store.remove()?,
                }
                return Err(e.into());
            }
        };

        if !passed {
            match backup_checksum {
                Some(_) => {
                    let restored = store.restore()?;
                    report.artifact_checksum = Some(restored);
                }
                None => store.remove()?,
            }
            state.record_rejection(now);
            state.save(&self.paths.run_state)?;
            warn!(reason = gate_note.as_deref().unwrap_or_default(), "update rejected by safety gate");
            report.status = UpdateStatus::Rejected;
            report.reason = gate_note;
            return Ok(report);
        }

        if let Some(table) = &thresholds {
            table.save(&self.paths.thresholds)?;
        }
        state.advance(now, watermark);
        state.save(&self.paths.run_state)?;
        info!(
            rounds = artifact.ensemble.round_count(),
            update_count = artifact.update_count,
            "model updated"
        );
        report.status = UpdateStatus::Updated;
        report.reason = gate_note;
        report.artifact_checksum = Some(written);
        report.thresholds = thresholds;
        Ok(report)
    }
}
