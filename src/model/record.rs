use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::feature::FeatureVector;

/// One scored observation for an issuer. Unique on (issuer_id, as_of).
#[derive(Debug, Clone)]
pub struct ScoreRecord {
    pub issuer_id: i64,
    pub as_of: DateTime<Utc>,
    pub score: f64,
    /// Per-feature share of the score (weight times standardized value).
    /// The intercept is excluded, so the values need not sum to `score`.
    pub contributions: HashMap<String, f64>,
}

/// The full feature vector an issuer was scored on. Unique on
/// (issuer_id, as_of).
#[derive(Debug, Clone)]
pub struct FeatureSnapshot {
    pub issuer_id: i64,
    pub as_of: DateTime<Utc>,
    pub features: FeatureVector,
}

/// Raised when a freshly computed score moves sharply against the most
/// recently persisted one.
#[derive(Debug, Clone)]
pub struct AlertRecord {
    pub issuer_id: i64,
    pub created_at: DateTime<Utc>,
    pub kind: String,
    pub message: String,
    pub payload: AlertPayload,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AlertPayload {
    pub from: f64,
    pub to: f64,
}

/// A news item assigned to an issuer. Ingestion does not deduplicate, so the
/// same headline seen twice yields two rows.
#[derive(Debug, Clone)]
pub struct EventRecord {
    pub issuer_id: i64,
    pub source: String,
    pub title: String,
    pub url: Option<String>,
    pub published_at: DateTime<Utc>,
    pub sentiment: Option<f64>,
}
