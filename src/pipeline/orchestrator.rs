use std::collections::HashMap;

use anyhow::{Context, Result};
use chrono::Utc;
use futures_util::stream::{self, StreamExt};

use crate::config::Config;
use crate::features::{compute_market_features, compute_risk_target};
use crate::model::price::PricePoint;
use crate::model::record::{AlertPayload, AlertRecord, EventRecord, FeatureSnapshot, ScoreRecord};
use crate::pipeline::matcher::NewsMatcher;
use crate::scoring::{ChangeDetector, OnlineScoringModel, ScoringModelConfig};
use crate::sources::{MacroDataSource, MacroFeatures, MarketDataSource, NewsSource};
use crate::store::{CycleBatch, Store};

/// Upper bound on news items consumed per cycle, applied before matching.
const MAX_NEWS_ITEMS_PER_CYCLE: usize = 200;

#[derive(Debug, Default, Clone, Copy)]
pub struct CycleSummary {
    pub scored: usize,
    pub skipped: usize,
    pub alerts: usize,
    pub events: usize,
}

/// Drives one scoring cycle across all tracked issuers and schedules the
/// next: ensure universe -> ingest news -> fetch macro -> fetch price
/// histories (bounded concurrency) -> per issuer train/score/detect
/// (sequential, shared model) -> commit everything in one transaction ->
/// sleep. A single instance must own the store; see the concurrency notes on
/// `Store`.
pub struct CycleOrchestrator<M, X, N>
where
    M: MarketDataSource,
    X: MacroDataSource,
    N: NewsSource,
{
    tickers: Vec<String>,
    feeds: Vec<String>,
    country_code: String,
    lookback_days: u32,
    fetch_concurrency: usize,
    interval: std::time::Duration,
    persist_model: bool,
    model_cfg: ScoringModelConfig,
    market: M,
    macro_source: X,
    news: N,
    matcher: Box<dyn NewsMatcher>,
    detector: ChangeDetector,
    store: Store,
    model: OnlineScoringModel,
}

impl<M, X, N> CycleOrchestrator<M, X, N>
where
    M: MarketDataSource,
    X: MacroDataSource,
    N: NewsSource,
{
    pub fn new(
        config: &Config,
        market: M,
        macro_source: X,
        news: N,
        matcher: Box<dyn NewsMatcher>,
        store: Store,
    ) -> Self {
        Self {
            tickers: config.pipeline.tracked_tickers(),
            feeds: config.sources.news_feeds.clone(),
            country_code: config.pipeline.country_code.clone(),
            lookback_days: config.pipeline.lookback_days,
            fetch_concurrency: config.pipeline.fetch_concurrency,
            interval: config.pipeline.effective_interval(),
            persist_model: config.scoring.persist_model,
            model_cfg: config.scoring.model,
            market,
            macro_source,
            news,
            matcher,
            detector: ChangeDetector::new(config.detector),
            store,
            model: OnlineScoringModel::new(config.scoring.model),
        }
    }

    /// Non-terminating loop. A failed cycle is logged and retried on the next
    /// tick; nothing short of process termination stops the pipeline.
    pub async fn run(&mut self) {
        tracing::info!(
            issuers = self.tickers.len(),
            interval_secs = self.interval.as_secs(),
            "starting scoring loop"
        );
        loop {
            let started = std::time::Instant::now();
            match self.run_cycle().await {
                Ok(summary) => {
                    tracing::info!(
                        scored = summary.scored,
                        skipped = summary.skipped,
                        alerts = summary.alerts,
                        events = summary.events,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "cycle complete"
                    );
                }
                Err(err) => {
                    tracing::error!(error = %err, "cycle failed");
                }
            }
            tokio::time::sleep(self.interval).await;
        }
    }

    /// One full cycle. Per-issuer failures are absorbed here; an error
    /// returned from this function means the cycle as a whole failed (for
    /// example at commit time) and nothing was persisted.
    pub async fn run_cycle(&mut self) -> Result<CycleSummary> {
        let mut batch = CycleBatch::default();
        let mut summary = CycleSummary::default();

        let issuer_ids = self.ensure_issuers()?;

        self.ingest_news(&issuer_ids, &mut batch).await;
        summary.events = batch.events.len();

        let macro_features = match self.macro_source.fetch_macro_features(&self.country_code).await
        {
            Ok(m) => m,
            Err(err) => {
                tracing::warn!(error = %err, "macro fetch failed, using neutral defaults");
                MacroFeatures::default()
            }
        };

        let mut model = self.reload_model();
        let mut histories = self.fetch_histories().await;

        for ticker in &self.tickers {
            let issuer_id = issuer_ids[ticker.as_str()];
            let history = histories.remove(ticker.as_str());
            match self.process_issuer(
                ticker,
                issuer_id,
                history,
                macro_features,
                &mut model,
                &mut batch,
            ) {
                Ok(true) => summary.scored += 1,
                Ok(false) => summary.skipped += 1,
                Err(err) => {
                    tracing::error!(ticker = %ticker, error = %err, "issuer failed, skipping");
                    summary.skipped += 1;
                }
            }
        }
        summary.alerts = batch.alerts.len();

        if self.persist_model {
            batch.model_state = Some(model.state().clone());
        }
        self.model = model;

        self.store
            .commit_cycle(&batch)
            .context("persisting cycle batch failed")?;
        Ok(summary)
    }

    /// Idempotent upsert of the configured universe; ticker -> issuer id.
    fn ensure_issuers(&self) -> Result<HashMap<String, i64>> {
        let mut ids = HashMap::with_capacity(self.tickers.len());
        for ticker in &self.tickers {
            let id = self
                .store
                .upsert_issuer(ticker, ticker, None)
                .with_context(|| format!("upserting issuer {} failed", ticker))?;
            ids.insert(ticker.clone(), id);
        }
        Ok(ids)
    }

    /// Best-effort news ingestion: failures are logged and the cycle moves
    /// on. Items matching no tracked issuer are dropped; there is no dedup,
    /// so a headline seen twice is staged twice.
    async fn ingest_news(&self, issuer_ids: &HashMap<String, i64>, batch: &mut CycleBatch) {
        if self.feeds.is_empty() {
            return;
        }
        let items = match self.news.fetch_items(&self.feeds).await {
            Ok(items) => items,
            Err(err) => {
                tracing::warn!(error = %err, "news ingestion failed, continuing cycle");
                return;
            }
        };
        let total = items.len();
        for item in items.into_iter().take(MAX_NEWS_ITEMS_PER_CYCLE) {
            let Some(ticker) = self.matcher.match_issuer(&item, &self.tickers) else {
                continue;
            };
            let Some(&issuer_id) = issuer_ids.get(ticker) else {
                continue;
            };
            batch.events.push(EventRecord {
                issuer_id,
                source: item.source,
                title: item.title,
                url: item.url,
                published_at: item.published_at,
                sentiment: item.sentiment,
            });
        }
        tracing::debug!(
            fetched = total,
            staged = batch.events.len(),
            "news ingestion done"
        );
    }

    /// Fetch every issuer's price history with bounded concurrency. Only the
    /// I/O overlaps; results are consumed in configured issuer order so the
    /// shared model always trains deterministically.
    async fn fetch_histories(&self) -> HashMap<String, Result<Vec<PricePoint>>> {
        stream::iter(self.tickers.iter().map(|ticker| async move {
            let result = self
                .market
                .fetch_price_history(ticker, self.lookback_days)
                .await;
            (ticker.clone(), result)
        }))
        .buffer_unordered(self.fetch_concurrency)
        .collect()
        .await
    }

    /// Steps (a)-(e) of the per-issuer sequence. Returns Ok(false) when the
    /// issuer is skipped for lack of history; any error skips the issuer
    /// without touching the others.
    fn process_issuer(
        &self,
        ticker: &str,
        issuer_id: i64,
        history: Option<Result<Vec<PricePoint>>>,
        macro_features: MacroFeatures,
        model: &mut OnlineScoringModel,
        batch: &mut CycleBatch,
    ) -> Result<bool> {
        let history = history
            .context("price history fetch produced no result")?
            .with_context(|| format!("price history fetch for {} failed", ticker))?;
        if history.is_empty() {
            tracing::warn!(ticker, "no price history, skipping issuer");
            return Ok(false);
        }

        let mut features = compute_market_features(&history);
        features.merge(&macro_features.to_features());
        let target = compute_risk_target(&features);

        model.train(&features, target);
        let (score, contributions) = model.score(&features)?;

        let as_of = Utc::now();
        tracing::debug!(ticker, score, target, "issuer scored");

        batch.snapshots.push(FeatureSnapshot {
            issuer_id,
            as_of,
            features,
        });
        batch.scores.push(ScoreRecord {
            issuer_id,
            as_of,
            score,
            contributions,
        });

        let prev = self.store.latest_score(issuer_id)?.map(|(_, s)| s);
        if let Some(jump) = self.detector.evaluate(prev, score) {
            tracing::info!(
                ticker,
                from = jump.from,
                to = jump.to,
                threshold = jump.threshold,
                "score jump detected"
            );
            batch.alerts.push(AlertRecord {
                issuer_id,
                created_at: as_of,
                kind: "score_jump".to_string(),
                message: format!("Score changed from {:.2} to {:.2}", jump.from, jump.to),
                payload: AlertPayload {
                    from: jump.from,
                    to: jump.to,
                },
            });
        }
        Ok(true)
    }

    /// The model the cycle trains on: the persisted state when persistence
    /// is on, otherwise the in-memory model carried across cycles.
    fn reload_model(&self) -> OnlineScoringModel {
        if self.persist_model {
            match self.store.load_model_state() {
                Ok(Some(state)) => {
                    return OnlineScoringModel::from_state(self.model_cfg, state);
                }
                Ok(None) => {}
                Err(err) => {
                    tracing::warn!(error = %err, "could not load model state, starting fresh");
                }
            }
        }
        self.model.clone()
    }

    /// Read access for tests and operational tooling.
    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn is_model_warm(&self) -> bool {
        self.model.is_warm()
    }
}
