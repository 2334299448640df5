use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::model::feature::FeatureVector;
use crate::model::issuer::Issuer;
use crate::model::record::{AlertPayload, AlertRecord, EventRecord, FeatureSnapshot, ScoreRecord};
use crate::scoring::ModelState;

/// Everything one cycle wants to persist. Committed atomically: a failed
/// commit leaves no partial cycle behind, and the model state rolls back
/// together with the records it was trained on.
#[derive(Debug, Default)]
pub struct CycleBatch {
    pub events: Vec<EventRecord>,
    pub snapshots: Vec<FeatureSnapshot>,
    pub scores: Vec<ScoreRecord>,
    pub alerts: Vec<AlertRecord>,
    pub model_state: Option<ModelState>,
}

/// SQLite persistence for issuers, per-cycle records, and the scoring model
/// state. A single orchestrator instance owns the connection; concurrent
/// writers are unsupported.
pub struct Store {
    conn: Connection,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
        }
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open database {}", path.display()))?;
        init_schema(&conn)?;
        Ok(Self { conn })
    }

    /// In-memory database for tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("failed to open in-memory database")?;
        init_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Idempotent upsert by ticker; returns the issuer id either way.
    pub fn upsert_issuer(&self, ticker: &str, name: &str, sector: Option<&str>) -> Result<i64> {
        self.conn.execute(
            r#"
            INSERT INTO issuers (ticker, name, sector) VALUES (?1, ?2, ?3)
            ON CONFLICT(ticker) DO UPDATE SET name = excluded.name
            "#,
            params![ticker, name, sector],
        )?;
        let id = self.conn.query_row(
            "SELECT id FROM issuers WHERE ticker = ?1",
            [ticker],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    pub fn issuer_by_ticker(&self, ticker: &str) -> Result<Option<Issuer>> {
        let issuer = self
            .conn
            .query_row(
                "SELECT id, ticker, name, sector FROM issuers WHERE ticker = ?1",
                [ticker],
                |row| {
                    Ok(Issuer {
                        id: row.get(0)?,
                        ticker: row.get(1)?,
                        name: row.get(2)?,
                        sector: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(issuer)
    }

    /// Most recent persisted score for an issuer, newest first by as_of.
    pub fn latest_score(&self, issuer_id: i64) -> Result<Option<(DateTime<Utc>, f64)>> {
        let row = self
            .conn
            .query_row(
                r#"
                SELECT as_of_ms, score FROM scores
                WHERE issuer_id = ?1
                ORDER BY as_of_ms DESC, id DESC
                LIMIT 1
                "#,
                [issuer_id],
                |row| Ok((row.get::<_, i64>(0)?, row.get::<_, f64>(1)?)),
            )
            .optional()?;
        Ok(row.map(|(ms, score)| (from_ms(ms), score)))
    }

    /// Commit every staged record of one cycle in a single transaction.
    pub fn commit_cycle(&mut self, batch: &CycleBatch) -> Result<()> {
        let tx = self.conn.transaction()?;

        for e in &batch.events {
            tx.execute(
                r#"
                INSERT INTO events (issuer_id, source, title, url, published_at_ms, sentiment)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
                params![
                    e.issuer_id,
                    e.source,
                    e.title,
                    e.url,
                    to_ms(e.published_at),
                    e.sentiment,
                ],
            )?;
        }

        for s in &batch.snapshots {
            tx.execute(
                r#"
                INSERT INTO feature_snapshots (issuer_id, as_of_ms, features)
                VALUES (?1, ?2, ?3)
                ON CONFLICT(issuer_id, as_of_ms) DO NOTHING
                "#,
                params![
                    s.issuer_id,
                    to_ms(s.as_of),
                    serde_json::to_string(&s.features)?,
                ],
            )?;
        }

        for s in &batch.scores {
            tx.execute(
                r#"
                INSERT INTO scores (issuer_id, as_of_ms, score, contributions)
                VALUES (?1, ?2, ?3, ?4)
                ON CONFLICT(issuer_id, as_of_ms) DO NOTHING
                "#,
                params![
                    s.issuer_id,
                    to_ms(s.as_of),
                    s.score,
                    serde_json::to_string(&s.contributions)?,
                ],
            )?;
        }

        for a in &batch.alerts {
            tx.execute(
                r#"
                INSERT INTO alerts (issuer_id, created_at_ms, kind, message, payload)
                VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
                params![
                    a.issuer_id,
                    to_ms(a.created_at),
                    a.kind,
                    a.message,
                    serde_json::to_string(&a.payload)?,
                ],
            )?;
        }

        if let Some(state) = &batch.model_state {
            tx.execute(
                r#"
                INSERT INTO model_state (id, updated_at_ms, state)
                VALUES (1, ?1, ?2)
                ON CONFLICT(id) DO UPDATE SET
                    updated_at_ms = excluded.updated_at_ms,
                    state = excluded.state
                "#,
                params![Utc::now().timestamp_millis(), serde_json::to_string(state)?],
            )?;
        }

        tx.commit().context("cycle commit failed")?;
        Ok(())
    }

    pub fn load_model_state(&self) -> Result<Option<ModelState>> {
        let json = self
            .conn
            .query_row(
                "SELECT state FROM model_state WHERE id = 1",
                [],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        match json {
            Some(json) => Ok(Some(
                serde_json::from_str(&json).context("persisted model state is corrupt")?,
            )),
            None => Ok(None),
        }
    }

    pub fn scores_for(&self, issuer_id: i64) -> Result<Vec<ScoreRecord>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT as_of_ms, score, contributions FROM scores
            WHERE issuer_id = ?1
            ORDER BY as_of_ms DESC, id DESC
            "#,
        )?;
        let rows = stmt.query_map([issuer_id], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, f64>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;
        let mut out = Vec::new();
        for row in rows {
            let (ms, score, contributions) = row?;
            out.push(ScoreRecord {
                issuer_id,
                as_of: from_ms(ms),
                score,
                contributions: serde_json::from_str(&contributions)?,
            });
        }
        Ok(out)
    }

    pub fn snapshots_for(&self, issuer_id: i64) -> Result<Vec<FeatureSnapshot>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT as_of_ms, features FROM feature_snapshots
            WHERE issuer_id = ?1
            ORDER BY as_of_ms DESC, id DESC
            "#,
        )?;
        let rows = stmt.query_map([issuer_id], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
        })?;
        let mut out = Vec::new();
        for row in rows {
            let (ms, features) = row?;
            let features: FeatureVector = serde_json::from_str(&features)?;
            out.push(FeatureSnapshot {
                issuer_id,
                as_of: from_ms(ms),
                features,
            });
        }
        Ok(out)
    }

    pub fn alerts_for(&self, issuer_id: i64) -> Result<Vec<AlertRecord>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT created_at_ms, kind, message, payload FROM alerts
            WHERE issuer_id = ?1
            ORDER BY created_at_ms DESC, id DESC
            "#,
        )?;
        let rows = stmt.query_map([issuer_id], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;
        let mut out = Vec::new();
        for row in rows {
            let (ms, kind, message, payload) = row?;
            let payload: AlertPayload = serde_json::from_str(&payload)?;
            out.push(AlertRecord {
                issuer_id,
                created_at: from_ms(ms),
                kind,
                message,
                payload,
            });
        }
        Ok(out)
    }

    pub fn events_for(&self, issuer_id: i64) -> Result<Vec<EventRecord>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT source, title, url, published_at_ms, sentiment FROM events
            WHERE issuer_id = ?1
            ORDER BY published_at_ms DESC, id DESC
            "#,
        )?;
        let rows = stmt.query_map([issuer_id], |row| {
            Ok(EventRecord {
                issuer_id,
                source: row.get(0)?,
                title: row.get(1)?,
                url: row.get(2)?,
                published_at: from_ms(row.get::<_, i64>(3)?),
                sentiment: row.get(4)?,
            })
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }
}

fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA foreign_keys = ON;

        CREATE TABLE IF NOT EXISTS issuers (
            id INTEGER PRIMARY KEY,
            ticker TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            sector TEXT
        );

        CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY,
            issuer_id INTEGER NOT NULL REFERENCES issuers(id) ON DELETE CASCADE,
            source TEXT NOT NULL,
            title TEXT NOT NULL,
            url TEXT,
            published_at_ms INTEGER NOT NULL,
            sentiment REAL
        );

        CREATE TABLE IF NOT EXISTS feature_snapshots (
            id INTEGER PRIMARY KEY,
            issuer_id INTEGER NOT NULL REFERENCES issuers(id) ON DELETE CASCADE,
            as_of_ms INTEGER NOT NULL,
            features TEXT NOT NULL,
            UNIQUE(issuer_id, as_of_ms)
        );

        CREATE TABLE IF NOT EXISTS scores (
            id INTEGER PRIMARY KEY,
            issuer_id INTEGER NOT NULL REFERENCES issuers(id) ON DELETE CASCADE,
            as_of_ms INTEGER NOT NULL,
            score REAL NOT NULL,
            contributions TEXT NOT NULL,
            UNIQUE(issuer_id, as_of_ms)
        );

        CREATE TABLE IF NOT EXISTS alerts (
            id INTEGER PRIMARY KEY,
            issuer_id INTEGER NOT NULL REFERENCES issuers(id) ON DELETE CASCADE,
            created_at_ms INTEGER NOT NULL,
            kind TEXT NOT NULL,
            message TEXT NOT NULL,
            payload TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS model_state (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            updated_at_ms INTEGER NOT NULL,
            state TEXT NOT NULL
        );
        "#,
    )
    .context("failed to initialize database schema")?;
    Ok(())
}

fn to_ms(dt: DateTime<Utc>) -> i64 {
    dt.timestamp_millis()
}

fn from_ms(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .unwrap_or_else(|| Utc.timestamp_opt(0, 0).unwrap())
}
