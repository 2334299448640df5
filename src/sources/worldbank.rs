use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::sources::{MacroDataSource, MacroFeatures};

const CPI_INDICATOR: &str = "FP.CPI.TOTL.ZG";
const GDP_INDICATOR: &str = "NY.GDP.MKTP.KD.ZG";

/// Latest annual CPI YoY and GDP growth from the World Bank v2 indicator API.
/// The API returns `[metadata, rows]`; rows are newest-first with nullable
/// values, so the first non-null value is the latest available observation.
pub struct WorldBankClient {
    http: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct IndicatorRow {
    #[serde(default)]
    value: Option<f64>,
}

impl WorldBankClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build macro data HTTP client")?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn fetch_latest(&self, country_code: &str, indicator: &str) -> Result<Option<f64>> {
        let url = format!(
            "{}/country/{}/indicator/{}?format=json",
            self.base_url, country_code, indicator
        );
        let body = self
            .http
            .get(&url)
            .send()
            .await
            .context("indicator request failed")?
            .error_for_status()
            .context("indicator request returned error status")?
            .text()
            .await
            .context("indicator response body unavailable")?;
        Ok(parse_latest_value(&body)?)
    }
}

/// Pull the first non-null value out of a `[metadata, rows]` response.
fn parse_latest_value(body: &str) -> Result<Option<f64>> {
    let (_meta, rows): (serde_json::Value, Option<Vec<IndicatorRow>>) =
        serde_json::from_str(body).context("indicator response was not [metadata, rows]")?;
    Ok(rows
        .unwrap_or_default()
        .into_iter()
        .find_map(|row| row.value))
}

impl MacroDataSource for WorldBankClient {
    async fn fetch_macro_features(&self, country_code: &str) -> Result<MacroFeatures> {
        let cpi = self.fetch_latest(country_code, CPI_INDICATOR).await?;
        let gdp = self.fetch_latest(country_code, GDP_INDICATOR).await?;
        Ok(MacroFeatures {
            cpi_yoy: cpi.unwrap_or(0.0),
            gdp_growth: gdp.unwrap_or(0.0),
        })
    }
}
