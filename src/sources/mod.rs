pub mod rss;
pub mod worldbank;
pub mod yahoo;

use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::model::price::PricePoint;

/// Latest macroeconomic indicator values shared by every issuer in a cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MacroFeatures {
    pub cpi_yoy: f64,
    pub gdp_growth: f64,
}

impl MacroFeatures {
    /// Project onto the macro feature keys so the values can be merged into
    /// each issuer's market vector.
    pub fn to_features(self) -> crate::model::feature::FeatureVector {
        let mut fv = crate::model::feature::FeatureVector::new();
        fv.set("macro_cpi_yoy", self.cpi_yoy);
        fv.set("macro_gdp_growth", self.gdp_growth);
        fv
    }
}

/// A news item fetched from a configured feed. Sentiment, when present, was
/// computed upstream by the feed collaborator.
#[derive(Debug, Clone, PartialEq)]
pub struct NewsItem {
    pub source: String,
    pub title: String,
    pub url: Option<String>,
    pub published_at: DateTime<Utc>,
    pub sentiment: Option<f64>,
}

/// Price-history collaborator. Implementations may substitute a deterministic
/// synthetic series when live data is unavailable; an `Ok` result with an
/// empty series means the issuer has no usable history this cycle.
pub trait MarketDataSource {
    fn fetch_price_history(
        &self,
        ticker: &str,
        lookback_days: u32,
    ) -> impl std::future::Future<Output = Result<Vec<PricePoint>>> + Send;
}

/// Macro-indicator collaborator. Callers substitute neutral zeros on failure.
pub trait MacroDataSource {
    fn fetch_macro_features(
        &self,
        country_code: &str,
    ) -> impl std::future::Future<Output = Result<MacroFeatures>> + Send;
}

/// News collaborator. Implementations tolerate individual feed failures and
/// return whatever the remaining feeds produced.
pub trait NewsSource {
    fn fetch_items(
        &self,
        feed_urls: &[String],
    ) -> impl std::future::Future<Output = Result<Vec<NewsItem>>> + Send;
}
