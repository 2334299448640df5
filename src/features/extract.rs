use crate::model::feature::FeatureVector;
use crate::model::price::PricePoint;

const SHORT_WINDOW: usize = 7;
const LONG_WINDOW: usize = 30;
const LIQUIDITY_WINDOW: usize = 5;

/// Turn a date-ascending daily price series into the six market features:
/// short/long return volatility, drawdown at the last observation, short/long
/// momentum, and a trailing-volume liquidity proxy.
///
/// Short or empty input is not an error. Every quantity that cannot be
/// computed from the data at hand resolves to 0.0 so sparse issuers keep
/// flowing through the pipeline instead of failing the cycle.
pub fn compute_market_features(history: &[PricePoint]) -> FeatureVector {
    let closes: Vec<f64> = history.iter().map(|p| p.close).collect();
    let rets = returns(&closes);

    let mut features = FeatureVector::new();
    features.set("vol_7", trailing_std(&rets, SHORT_WINDOW));
    features.set("vol_30", trailing_std(&rets, LONG_WINDOW));
    features.set("drawdown", drawdown(&closes));
    features.set("mom_7", momentum(&closes, SHORT_WINDOW));
    features.set("mom_30", momentum(&closes, LONG_WINDOW));
    features.set("liquidity", trailing_mean_volume(history, LIQUIDITY_WINDOW));
    features
}

/// Period-over-period relative changes. The first observation has no return.
fn returns(closes: &[f64]) -> Vec<f64> {
    closes
        .windows(2)
        .filter(|w| w[0] != 0.0)
        .map(|w| w[1] / w[0] - 1.0)
        .collect()
}

/// Sample standard deviation (n-1 denominator). Fewer than two values is
/// undefined and resolves to 0.0.
fn sample_std(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / (n - 1.0);
    var.sqrt()
}

/// Standard deviation of the trailing `window` returns, falling back to the
/// standard deviation of all available returns when the series is shorter
/// than the window.
fn trailing_std(rets: &[f64], window: usize) -> f64 {
    if rets.len() >= window {
        sample_std(&rets[rets.len() - window..])
    } else {
        sample_std(rets)
    }
}

/// (latest close / running-maximum close) - 1, evaluated at the last
/// observation. Always <= 0.
fn drawdown(closes: &[f64]) -> f64 {
    let Some(&last) = closes.last() else {
        return 0.0;
    };
    let running_max = closes.iter().copied().fold(f64::MIN, f64::max);
    if running_max <= 0.0 {
        return 0.0;
    }
    last / running_max - 1.0
}

/// (latest close / close `n` observations back) - 1, or 0.0 when the series
/// is shorter than `n`.
fn momentum(closes: &[f64], n: usize) -> f64 {
    if closes.len() < n {
        return 0.0;
    }
    let base = closes[closes.len() - n];
    if base == 0.0 {
        return 0.0;
    }
    closes[closes.len() - 1] / base - 1.0
}

/// Mean volume over the trailing `window` observations. Undefined (fewer than
/// `window` observations, or any of them missing volume) resolves to 0.0.
fn trailing_mean_volume(history: &[PricePoint], window: usize) -> f64 {
    if history.len() < window {
        return 0.0;
    }
    let tail = &history[history.len() - window..];
    let mut sum = 0.0;
    for point in tail {
        match point.volume {
            Some(v) => sum += v,
            None => return 0.0,
        }
    }
    sum / window as f64
}
