use crate::model::feature::FeatureVector;

/// Synthetic self-supervised training label. No labeled risk outcomes exist,
/// so the pipeline manufactures one from the signals it believes indicate
/// elevated risk: short/long volatility, realized drawdown, and short-term
/// momentum.
pub fn compute_risk_target(features: &FeatureVector) -> f64 {
    let mut risk = 0.0;
    risk += features.get("vol_7").abs() * 0.4;
    risk += features.get("vol_30").abs() * 0.3;
    risk += features.get("drawdown").min(0.0).abs() * 0.2;
    risk += (-features.get("mom_7")).min(0.0).abs() * 0.1;
    risk
}
