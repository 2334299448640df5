use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use anyhow::{bail, Result};
use chrono::{TimeZone, Utc};
use credit_radar::config::Config;
use credit_radar::model::price::PricePoint;
use credit_radar::model::record::{AlertPayload, AlertRecord, ScoreRecord};
use credit_radar::pipeline::{CycleOrchestrator, TickerSubstringMatcher};
use credit_radar::sources::{
    MacroDataSource, MacroFeatures, MarketDataSource, NewsItem, NewsSource,
};
use credit_radar::store::{CycleBatch, Store};

#[derive(Clone, Default)]
struct ScriptedMarket {
    histories: HashMap<String, Vec<PricePoint>>,
    failing: HashSet<String>,
}

impl MarketDataSource for ScriptedMarket {
    async fn fetch_price_history(
        &self,
        ticker: &str,
        _lookback_days: u32,
    ) -> Result<Vec<PricePoint>> {
        if self.failing.contains(ticker) {
            bail!("simulated outage for {}", ticker);
        }
        Ok(self.histories.get(ticker).cloned().unwrap_or_default())
    }
}

#[derive(Clone, Copy, Default)]
struct StaticMacro {
    features: MacroFeatures,
    failing: bool,
}

impl MacroDataSource for StaticMacro {
    async fn fetch_macro_features(&self, _country_code: &str) -> Result<MacroFeatures> {
        if self.failing {
            bail!("macro api down");
        }
        Ok(self.features)
    }
}

#[derive(Clone, Default)]
struct ScriptedNews {
    items: Vec<NewsItem>,
    failing: bool,
}

impl NewsSource for ScriptedNews {
    async fn fetch_items(&self, _feed_urls: &[String]) -> Result<Vec<NewsItem>> {
        if self.failing {
            bail!("feeds down");
        }
        Ok(self.items.clone())
    }
}

fn test_config(issuers: &[&str]) -> Config {
    let list = issuers
        .iter()
        .map(|t| format!("\"{}\"", t))
        .collect::<Vec<_>>()
        .join(", ");
    toml::from_str(&format!(
        r#"
[pipeline]
interval_seconds = 60
issuers = [{}]
country_code = "USA"
lookback_days = 60

[sources]
market_base_url = "http://unused.invalid"
macro_base_url = "http://unused.invalid"
news_feeds = ["http://unused.invalid/rss"]

[database]
path = "unused"

[logging]
level = "warn"
"#,
        list
    ))
    .expect("test config parses")
}

fn history(base: f64, len: usize) -> Vec<PricePoint> {
    let start = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
    (0..len)
        .map(|i| PricePoint {
            date: start + chrono::Duration::days(i as i64),
            close: base * (1.0 + 0.02 * (i as f64 * 0.7).sin()),
            volume: Some(1_000_000.0 + i as f64 * 1_000.0),
        })
        .collect()
}

fn news_item(title: &str) -> NewsItem {
    NewsItem {
        source: "news.example.com".to_string(),
        title: title.to_string(),
        url: Some("https://example.com/a".to_string()),
        published_at: Utc.with_ymd_and_hms(2026, 8, 1, 7, 0, 0).unwrap(),
        sentiment: None,
    }
}

fn temp_db_path(tag: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!(
        "credit-radar-test-{}-{}.sqlite",
        tag,
        std::process::id()
    ));
    let _ = std::fs::remove_file(&path);
    path
}

fn orchestrator(
    issuers: &[&str],
    market: ScriptedMarket,
    macro_source: StaticMacro,
    news: ScriptedNews,
    store: Store,
) -> CycleOrchestrator<ScriptedMarket, StaticMacro, ScriptedNews> {
    CycleOrchestrator::new(
        &test_config(issuers),
        market,
        macro_source,
        news,
        Box::new(TickerSubstringMatcher),
        store,
    )
}

#[tokio::test]
/// First cycle: every issuer with history gets a score and a snapshot but no
/// alert, because there is no persisted baseline yet.
async fn first_cycle_scores_without_alerts() {
    let market = ScriptedMarket {
        histories: HashMap::from([
            ("AAPL".to_string(), history(180.0, 60)),
            ("MSFT".to_string(), history(350.0, 60)),
            ("TSLA".to_string(), history(220.0, 60)),
        ]),
        failing: HashSet::new(),
    };
    let mut orch = orchestrator(
        &["AAPL", "MSFT", "TSLA"],
        market,
        StaticMacro::default(),
        ScriptedNews::default(),
        Store::open_in_memory().unwrap(),
    );

    let summary = orch.run_cycle().await.unwrap();
    assert_eq!(summary.scored, 3);
    assert_eq!(summary.skipped, 0);
    assert_eq!(summary.alerts, 0);

    for ticker in ["AAPL", "MSFT", "TSLA"] {
        let issuer = orch.store().issuer_by_ticker(ticker).unwrap().unwrap();
        assert_eq!(orch.store().scores_for(issuer.id).unwrap().len(), 1);
        assert_eq!(orch.store().snapshots_for(issuer.id).unwrap().len(), 1);
        assert!(orch.store().alerts_for(issuer.id).unwrap().is_empty());
    }
}

#[tokio::test]
/// One issuer's fetch failure must not affect the others, and the failing
/// issuer receives no records at all.
async fn failing_issuer_is_isolated() {
    let market = ScriptedMarket {
        histories: HashMap::from([
            ("AAPL".to_string(), history(180.0, 60)),
            ("TSLA".to_string(), history(220.0, 60)),
        ]),
        failing: HashSet::from(["MSFT".to_string()]),
    };
    let mut orch = orchestrator(
        &["AAPL", "MSFT", "TSLA"],
        market,
        StaticMacro::default(),
        ScriptedNews::default(),
        Store::open_in_memory().unwrap(),
    );

    let summary = orch.run_cycle().await.unwrap();
    assert_eq!(summary.scored, 2);
    assert_eq!(summary.skipped, 1);

    let msft = orch.store().issuer_by_ticker("MSFT").unwrap().unwrap();
    assert!(orch.store().scores_for(msft.id).unwrap().is_empty());
    assert!(orch.store().snapshots_for(msft.id).unwrap().is_empty());

    for ticker in ["AAPL", "TSLA"] {
        let issuer = orch.store().issuer_by_ticker(ticker).unwrap().unwrap();
        assert_eq!(orch.store().scores_for(issuer.id).unwrap().len(), 1);
    }
}

#[tokio::test]
/// An empty price history skips the issuer without writing records.
async fn empty_history_skips_issuer() {
    let market = ScriptedMarket {
        histories: HashMap::from([
            ("AAPL".to_string(), history(180.0, 60)),
            ("MSFT".to_string(), Vec::new()),
        ]),
        failing: HashSet::new(),
    };
    let mut orch = orchestrator(
        &["AAPL", "MSFT"],
        market,
        StaticMacro::default(),
        ScriptedNews::default(),
        Store::open_in_memory().unwrap(),
    );

    let summary = orch.run_cycle().await.unwrap();
    assert_eq!(summary.scored, 1);
    assert_eq!(summary.skipped, 1);
    let msft = orch.store().issuer_by_ticker("MSFT").unwrap().unwrap();
    assert!(orch.store().snapshots_for(msft.id).unwrap().is_empty());
}

#[tokio::test]
/// News ingestion: the per-cycle cap applies before matching, unmatched items
/// are dropped, and identical items are staged twice (no dedup).
async fn news_ingestion_caps_matches_and_keeps_duplicates() {
    let mut items = vec![
        news_item("MSFT beats expectations"),
        news_item("MSFT beats expectations"),
        news_item("Bond yields drift lower"),
    ];
    for i in 0..250 {
        items.push(news_item(&format!("AAPL headline {}", i)));
    }
    let market = ScriptedMarket {
        histories: HashMap::from([
            ("AAPL".to_string(), history(180.0, 60)),
            ("MSFT".to_string(), history(350.0, 60)),
        ]),
        failing: HashSet::new(),
    };
    let mut orch = orchestrator(
        &["AAPL", "MSFT"],
        market,
        StaticMacro::default(),
        ScriptedNews {
            items,
            failing: false,
        },
        Store::open_in_memory().unwrap(),
    );

    let summary = orch.run_cycle().await.unwrap();

    let msft = orch.store().issuer_by_ticker("MSFT").unwrap().unwrap();
    let msft_events = orch.store().events_for(msft.id).unwrap();
    assert_eq!(msft_events.len(), 2);
    assert_eq!(msft_events[0].title, msft_events[1].title);

    // Cap of 200 applied to the raw item list: 2 matched MSFT items, one
    // unmatched item dropped, 197 AAPL items fit under the cap.
    let aapl = orch.store().issuer_by_ticker("AAPL").unwrap().unwrap();
    assert_eq!(orch.store().events_for(aapl.id).unwrap().len(), 197);
    assert_eq!(summary.events, 199);
}

#[tokio::test]
/// A news source failure is logged and absorbed; the cycle still scores.
async fn news_failure_does_not_abort_cycle() {
    let market = ScriptedMarket {
        histories: HashMap::from([("AAPL".to_string(), history(180.0, 60))]),
        failing: HashSet::new(),
    };
    let mut orch = orchestrator(
        &["AAPL"],
        market,
        StaticMacro::default(),
        ScriptedNews {
            items: Vec::new(),
            failing: true,
        },
        Store::open_in_memory().unwrap(),
    );

    let summary = orch.run_cycle().await.unwrap();
    assert_eq!(summary.scored, 1);
    assert_eq!(summary.events, 0);
}

#[tokio::test]
/// Macro failure substitutes neutral zeros; success merges the fetched
/// values into every issuer's snapshot.
async fn macro_values_merge_or_default() {
    let market = ScriptedMarket {
        histories: HashMap::from([("AAPL".to_string(), history(180.0, 60))]),
        failing: HashSet::new(),
    };

    let mut failing = orchestrator(
        &["AAPL"],
        market.clone(),
        StaticMacro {
            features: MacroFeatures::default(),
            failing: true,
        },
        ScriptedNews::default(),
        Store::open_in_memory().unwrap(),
    );
    failing.run_cycle().await.unwrap();
    let issuer = failing.store().issuer_by_ticker("AAPL").unwrap().unwrap();
    let snapshot = &failing.store().snapshots_for(issuer.id).unwrap()[0];
    assert_eq!(snapshot.features.get("macro_cpi_yoy"), 0.0);
    assert_eq!(snapshot.features.get("macro_gdp_growth"), 0.0);

    let mut healthy = orchestrator(
        &["AAPL"],
        market,
        StaticMacro {
            features: MacroFeatures {
                cpi_yoy: 3.1,
                gdp_growth: 2.2,
            },
            failing: false,
        },
        ScriptedNews::default(),
        Store::open_in_memory().unwrap(),
    );
    healthy.run_cycle().await.unwrap();
    let issuer = healthy.store().issuer_by_ticker("AAPL").unwrap().unwrap();
    let snapshot = &healthy.store().snapshots_for(issuer.id).unwrap()[0];
    assert!((snapshot.features.get("macro_cpi_yoy") - 3.1).abs() < 1e-12);
    assert!((snapshot.features.get("macro_gdp_growth") - 2.2).abs() < 1e-12);
}

#[tokio::test]
/// The shared model keeps learning across cycles: its persisted state
/// advances by one step per scored issuer per cycle.
async fn model_state_advances_across_cycles() {
    let market = ScriptedMarket {
        histories: HashMap::from([
            ("AAPL".to_string(), history(180.0, 60)),
            ("MSFT".to_string(), history(350.0, 60)),
        ]),
        failing: HashSet::new(),
    };
    let mut orch = orchestrator(
        &["AAPL", "MSFT"],
        market,
        StaticMacro::default(),
        ScriptedNews::default(),
        Store::open_in_memory().unwrap(),
    );

    orch.run_cycle().await.unwrap();
    let state = orch.store().load_model_state().unwrap().unwrap();
    assert_eq!(state.steps, 2);

    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    orch.run_cycle().await.unwrap();
    let state = orch.store().load_model_state().unwrap().unwrap();
    assert_eq!(state.steps, 4);

    let aapl = orch.store().issuer_by_ticker("AAPL").unwrap().unwrap();
    assert_eq!(orch.store().scores_for(aapl.id).unwrap().len(), 2);
}

#[tokio::test]
/// With a file-backed store, a restarted orchestrator resumes from the
/// persisted model state instead of starting cold.
async fn model_state_survives_restart() {
    let path = temp_db_path("restart");
    let market = ScriptedMarket {
        histories: HashMap::from([("AAPL".to_string(), history(180.0, 60))]),
        failing: HashSet::new(),
    };

    {
        let store = Store::open(&path).unwrap();
        let mut orch = orchestrator(
            &["AAPL"],
            market.clone(),
            StaticMacro::default(),
            ScriptedNews::default(),
            store,
        );
        orch.run_cycle().await.unwrap();
    }

    let store = Store::open(&path).unwrap();
    let mut orch = orchestrator(
        &["AAPL"],
        market,
        StaticMacro::default(),
        ScriptedNews::default(),
        store,
    );
    assert!(!orch.is_model_warm(), "in-memory model starts cold");
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    orch.run_cycle().await.unwrap();

    let state = orch.store().load_model_state().unwrap().unwrap();
    assert_eq!(state.steps, 2, "restart must not reset learning");
    let _ = std::fs::remove_file(&path);
}

#[tokio::test]
/// Change detection runs against the most recently persisted score: a large
/// gap between the stored baseline and the fresh score raises a score_jump
/// alert carrying both values.
async fn alert_raised_against_persisted_baseline() {
    let path = temp_db_path("alert");
    {
        let mut store = Store::open(&path).unwrap();
        let issuer_id = store.upsert_issuer("AAPL", "AAPL", None).unwrap();
        let batch = CycleBatch {
            scores: vec![ScoreRecord {
                issuer_id,
                as_of: Utc.with_ymd_and_hms(2026, 8, 1, 0, 0, 0).unwrap(),
                score: 10.0,
                contributions: HashMap::new(),
            }],
            ..Default::default()
        };
        store.commit_cycle(&batch).unwrap();
    }

    let market = ScriptedMarket {
        histories: HashMap::from([("AAPL".to_string(), history(180.0, 60))]),
        failing: HashSet::new(),
    };
    let mut orch = orchestrator(
        &["AAPL"],
        market,
        StaticMacro::default(),
        ScriptedNews::default(),
        Store::open(&path).unwrap(),
    );

    let summary = orch.run_cycle().await.unwrap();
    assert_eq!(summary.alerts, 1);

    let issuer = orch.store().issuer_by_ticker("AAPL").unwrap().unwrap();
    let alerts: Vec<AlertRecord> = orch.store().alerts_for(issuer.id).unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].kind, "score_jump");
    let AlertPayload { from, to } = alerts[0].payload;
    assert!((from - 10.0).abs() < f64::EPSILON);
    assert!(to.abs() < 5.0, "fresh model scores are small: {}", to);
    assert!(alerts[0].message.contains("10.00"));
    let _ = std::fs::remove_file(&path);
}
