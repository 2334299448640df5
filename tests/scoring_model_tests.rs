use credit_radar::error::AppError;
use credit_radar::model::feature::{FeatureVector, FEATURE_COUNT, FEATURE_ORDER};
use credit_radar::scoring::{ModelState, OnlineScoringModel, ScoringModelConfig};

fn features(vol: f64, drawdown: f64) -> FeatureVector {
    let mut fv = FeatureVector::new();
    fv.set("vol_7", vol);
    fv.set("vol_30", vol * 0.8);
    fv.set("drawdown", drawdown);
    fv.set("mom_7", -0.01);
    fv.set("mom_30", 0.03);
    fv.set("liquidity", 750_000.0);
    fv.set("macro_cpi_yoy", 2.9);
    fv.set("macro_gdp_growth", 1.8);
    fv
}

#[test]
/// Scoring an untrained model is a sequencing bug and must fail loudly.
fn untrained_model_refuses_to_score() {
    let model = OnlineScoringModel::new(ScoringModelConfig::default());
    assert!(matches!(
        model.score(&features(0.02, -0.1)),
        Err(AppError::ModelNotTrained)
    ));
}

#[test]
/// Training repeatedly on one (features, target) pair moves the prediction
/// monotonically toward the target.
fn repeated_training_converges() {
    let mut model = OnlineScoringModel::new(ScoringModelConfig::default());
    let fv = features(0.03, -0.2);
    let target = 0.07;

    let mut gaps = Vec::new();
    for _ in 0..250 {
        model.train(&fv, target);
        let (score, _) = model.score(&fv).unwrap();
        gaps.push((score - target).abs());
    }
    for pair in gaps.windows(2) {
        assert!(pair[1] <= pair[0] + 1e-12, "gap widened: {:?}", pair);
    }
    assert!(*gaps.last().unwrap() < 0.5 * target);
}

#[test]
/// Two score calls with no intervening train return identical results.
fn scoring_does_not_mutate_state() {
    let mut model = OnlineScoringModel::new(ScoringModelConfig::default());
    model.train(&features(0.02, -0.1), 0.05);
    model.train(&features(0.05, -0.3), 0.12);

    let (score_a, contribs_a) = model.score(&features(0.03, -0.2)).unwrap();
    let (score_b, contribs_b) = model.score(&features(0.03, -0.2)).unwrap();
    assert_eq!(score_a, score_b);
    assert_eq!(contribs_a, contribs_b);
}

#[test]
/// Contributions cover every declared feature and exclude the intercept, so
/// their sum equals score minus intercept, not the score itself.
fn contributions_exclude_intercept() {
    let mut model = OnlineScoringModel::new(ScoringModelConfig::default());
    for i in 1..=10 {
        model.train(&features(0.01 * i as f64, -0.05 * i as f64), 0.02 * i as f64);
    }
    let (score, contribs) = model.score(&features(0.04, -0.25)).unwrap();

    assert_eq!(contribs.len(), FEATURE_COUNT);
    for name in FEATURE_ORDER {
        assert!(contribs.contains_key(name));
    }
    let sum: f64 = contribs.values().sum();
    let intercept = model.state().intercept;
    assert!((sum + intercept - score).abs() < 1e-9);
}

#[test]
/// A persisted state restores to a model that scores identically.
fn state_survives_serialization() {
    let mut model = OnlineScoringModel::new(ScoringModelConfig::default());
    for i in 1..=7 {
        model.train(&features(0.01 * i as f64, -0.02 * i as f64), 0.015 * i as f64);
    }

    let json = serde_json::to_string(model.state()).unwrap();
    let state: ModelState = serde_json::from_str(&json).unwrap();
    assert_eq!(state.steps, 7);
    assert!(state.warm);

    let restored = OnlineScoringModel::from_state(ScoringModelConfig::default(), state);
    let probe = features(0.035, -0.15);
    let (a, ca) = model.score(&probe).unwrap();
    let (b, cb) = restored.score(&probe).unwrap();
    assert_eq!(a, b);
    assert_eq!(ca, cb);
}

#[test]
/// Each training step advances the standardizer and the regressor together.
fn training_updates_all_state_atomically() {
    let mut model = OnlineScoringModel::new(ScoringModelConfig::default());
    model.train(&features(0.02, -0.1), 0.05);
    let after_one = model.state().clone();
    assert_eq!(after_one.count, 1);
    assert_eq!(after_one.steps, 1);

    model.train(&features(0.06, -0.4), 0.2);
    let after_two = model.state();
    assert_eq!(after_two.count, 2);
    assert_eq!(after_two.steps, 2);
    assert_ne!(after_two.means, after_one.means);
    assert_ne!(after_two.intercept, after_one.intercept);
}
