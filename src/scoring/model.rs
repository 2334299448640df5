use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::model::feature::{FeatureVector, FEATURE_COUNT, FEATURE_ORDER};

/// SGD hyperparameters for the online scorer. Defaults mirror a
/// Huber-loss, elastic-net regressor with inverse-scaling learning rate.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ScoringModelConfig {
    /// Regularization strength shared by the L1 and L2 terms.
    pub alpha: f64,
    /// Mix between L1 (at 1.0) and L2 (at 0.0) regularization.
    pub l1_ratio: f64,
    /// Initial learning rate.
    pub eta0: f64,
    /// Inverse-scaling exponent: eta_t = eta0 / t^power_t.
    pub power_t: f64,
    /// Residual magnitude beyond which the Huber loss goes linear.
    pub huber_epsilon: f64,
}

impl Default for ScoringModelConfig {
    fn default() -> Self {
        Self {
            alpha: 1e-4,
            l1_ratio: 0.15,
            eta0: 0.01,
            power_t: 0.25,
            huber_epsilon: 0.1,
        }
    }
}

/// Everything the model learns: standardizer statistics, the linear weight
/// vector, and the intercept. Serializable so the orchestrator can stage it
/// into each cycle's commit and reload it on the next cycle (or restart).
///
/// A training step mutates all of this together; there is no partial update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelState {
    /// Welford running mean per feature.
    pub means: [f64; FEATURE_COUNT],
    /// Welford running sum of squared deviations per feature.
    pub m2: [f64; FEATURE_COUNT],
    /// Observations consumed by the standardizer.
    pub count: u64,
    pub weights: [f64; FEATURE_COUNT],
    pub intercept: f64,
    /// SGD steps taken; drives the inverse-scaling learning rate.
    pub steps: u64,
    /// True once at least one training step has been applied.
    pub warm: bool,
}

impl Default for ModelState {
    fn default() -> Self {
        Self {
            means: [0.0; FEATURE_COUNT],
            m2: [0.0; FEATURE_COUNT],
            count: 0,
            weights: [0.0; FEATURE_COUNT],
            intercept: 0.0,
            steps: 0,
            warm: false,
        }
    }
}

impl ModelState {
    /// Population standard deviation per feature. Near-zero variance maps to
    /// a unit scale so constant features pass through unscaled instead of
    /// exploding.
    fn scales(&self) -> [f64; FEATURE_COUNT] {
        let mut out = [1.0; FEATURE_COUNT];
        if self.count == 0 {
            return out;
        }
        for i in 0..FEATURE_COUNT {
            let var = self.m2[i] / self.count as f64;
            let std = var.max(0.0).sqrt();
            if std > 1e-12 {
                out[i] = std;
            }
        }
        out
    }

    fn standardize(&self, x: &[f64; FEATURE_COUNT]) -> [f64; FEATURE_COUNT] {
        let scales = self.scales();
        let mut out = [0.0; FEATURE_COUNT];
        for i in 0..FEATURE_COUNT {
            out[i] = (x[i] - self.means[i]) / scales[i];
        }
        out
    }
}

/// Incrementally trained linear risk scorer.
///
/// Deliberately simple: standardized features times a weight vector keeps the
/// per-feature contribution breakdown exact, trading predictive power for
/// explainability. Two states: untrained (scoring is a contract violation)
/// and warm (at least one training step applied).
#[derive(Debug, Clone)]
pub struct OnlineScoringModel {
    cfg: ScoringModelConfig,
    state: ModelState,
}

impl OnlineScoringModel {
    pub fn new(cfg: ScoringModelConfig) -> Self {
        Self {
            cfg,
            state: ModelState::default(),
        }
    }

    /// Resume from a previously persisted state.
    pub fn from_state(cfg: ScoringModelConfig, state: ModelState) -> Self {
        Self { cfg, state }
    }

    pub fn state(&self) -> &ModelState {
        &self.state
    }

    pub fn is_warm(&self) -> bool {
        self.state.warm
    }

    /// Consume exactly one (features, target) pair: fold the observation into
    /// the running standardizer statistics, standardize against the updated
    /// statistics, then apply one Huber-loss gradient step with elastic-net
    /// regularization.
    pub fn train(&mut self, features: &FeatureVector, target: f64) {
        let x = features.to_ordered();

        self.state.count += 1;
        let n = self.state.count as f64;
        for i in 0..FEATURE_COUNT {
            let delta = x[i] - self.state.means[i];
            self.state.means[i] += delta / n;
            self.state.m2[i] += delta * (x[i] - self.state.means[i]);
        }

        let xs = self.state.standardize(&x);

        self.state.steps += 1;
        let eta = self.cfg.eta0 / (self.state.steps as f64).powf(self.cfg.power_t);

        let pred = dot(&self.state.weights, &xs) + self.state.intercept;
        let dloss = huber_dloss(pred - target, self.cfg.huber_epsilon);

        for i in 0..FEATURE_COUNT {
            let w = self.state.weights[i];
            let penalty = self.cfg.alpha
                * (self.cfg.l1_ratio * w.signum() + (1.0 - self.cfg.l1_ratio) * w);
            self.state.weights[i] -= eta * (dloss * xs[i] + penalty);
        }
        self.state.intercept -= eta * dloss;
        self.state.warm = true;
    }

    /// Score a feature vector with the current state. Contributions map each
    /// feature to weight times standardized value; the intercept is excluded,
    /// so they need not sum to the score.
    ///
    /// Calling this before any `train` is a sequencing bug in the caller and
    /// fails loudly instead of returning a silent default.
    pub fn score(
        &self,
        features: &FeatureVector,
    ) -> Result<(f64, HashMap<String, f64>), AppError> {
        if !self.state.warm {
            return Err(AppError::ModelNotTrained);
        }
        let xs = self.state.standardize(&features.to_ordered());
        let score = dot(&self.state.weights, &xs) + self.state.intercept;
        let mut contributions = HashMap::with_capacity(FEATURE_COUNT);
        for (i, name) in FEATURE_ORDER.iter().enumerate() {
            contributions.insert(name.to_string(), self.state.weights[i] * xs[i]);
        }
        Ok((score, contributions))
    }
}

fn dot(a: &[f64; FEATURE_COUNT], b: &[f64; FEATURE_COUNT]) -> f64 {
    let mut s = 0.0;
    for i in 0..FEATURE_COUNT {
        s += a[i] * b[i];
    }
    s
}

/// Derivative of the Huber loss with respect to the prediction: linear inside
/// the epsilon band, clipped to a constant magnitude outside it.
fn huber_dloss(residual: f64, epsilon: f64) -> f64 {
    if residual.abs() <= epsilon {
        residual
    } else {
        epsilon * residual.signum()
    }
}
