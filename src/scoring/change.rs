use serde::Deserialize;

/// Alert threshold knobs: a movement must exceed both an absolute floor and a
/// fraction of the previous score's magnitude before it is alert-worthy.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ChangeDetectorConfig {
    pub min_delta: f64,
    pub relative_fraction: f64,
}

impl Default for ChangeDetectorConfig {
    fn default() -> Self {
        Self {
            min_delta: 0.1,
            relative_fraction: 0.2,
        }
    }
}

/// A score movement that crossed the detection threshold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreJump {
    pub from: f64,
    pub to: f64,
    pub delta: f64,
    pub threshold: f64,
}

/// Compares a freshly computed score against the issuer's most recently
/// persisted one. No prior score means no baseline, so no alert is possible.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChangeDetector {
    cfg: ChangeDetectorConfig,
}

impl ChangeDetector {
    pub fn new(cfg: ChangeDetectorConfig) -> Self {
        Self { cfg }
    }

    /// Strictly-greater comparison: a delta exactly at the threshold does not
    /// alert.
    pub fn evaluate(&self, prev_score: Option<f64>, new_score: f64) -> Option<ScoreJump> {
        let prev = prev_score?;
        let delta = (new_score - prev).abs();
        let threshold = self
            .cfg
            .min_delta
            .max(self.cfg.relative_fraction * prev.abs());
        if delta > threshold {
            Some(ScoreJump {
                from: prev,
                to: new_score,
                delta,
                threshold,
            })
        } else {
            None
        }
    }
}
