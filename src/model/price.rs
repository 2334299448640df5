use chrono::{DateTime, Utc};

/// One daily observation of an issuer's traded price. Volume is optional;
/// some venues and the synthetic fallback may omit it.
#[derive(Debug, Clone, PartialEq)]
pub struct PricePoint {
    pub date: DateTime<Utc>,
    pub close: f64,
    pub volume: Option<f64>,
}

impl PricePoint {
    pub fn new(date: DateTime<Utc>, close: f64, volume: Option<f64>) -> Self {
        Self {
            date,
            close,
            volume,
        }
    }
}
