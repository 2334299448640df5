use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Fixed feature order shared by the extractor, the scoring model, and every
/// persisted snapshot. The model's weight vector is indexed by this order, so
/// it must never change for the lifetime of a model state.
pub const FEATURE_ORDER: [&str; 8] = [
    "vol_7",
    "vol_30",
    "drawdown",
    "mom_7",
    "mom_30",
    "liquidity",
    "macro_cpi_yoy",
    "macro_gdp_growth",
];

pub const FEATURE_COUNT: usize = FEATURE_ORDER.len();

/// Named numeric signals describing an issuer's recent market/macro state.
/// A key that was never set reads as 0.0; absence is data sparsity, not an
/// error.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureVector {
    values: HashMap<String, f64>,
}

impl FeatureVector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: &str, value: f64) {
        self.values.insert(name.to_string(), value);
    }

    pub fn get(&self, name: &str) -> f64 {
        self.values.get(name).copied().unwrap_or(0.0)
    }

    /// Copy every entry of `other` into this vector, overwriting duplicates.
    /// Used to fold per-cycle macro features into each issuer's market vector.
    pub fn merge(&mut self, other: &FeatureVector) {
        for (k, v) in &other.values {
            self.values.insert(k.clone(), *v);
        }
    }

    /// Project onto the fixed feature order. Missing keys become 0.0.
    pub fn to_ordered(&self) -> [f64; FEATURE_COUNT] {
        let mut out = [0.0; FEATURE_COUNT];
        for (i, name) in FEATURE_ORDER.iter().enumerate() {
            out[i] = self.get(name);
        }
        out
    }

}
