//! Component 2 — Observation Store.
//!
//! Persists observations keyed by `observation_id`, assigns a monotone
//! `server_version` per write, and serves version-filtered pulls (spec §3,
//! §4.1, §8).

use rusqlite::params;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::db::Db;
use crate::error::Result;
use crate::version;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Observation {
    pub observation_id: String,
    pub form_type: String,
    pub form_version: String,
    pub data: Value,
    pub created_at: String,
    pub updated_at: String,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub geolocation: Option<Value>,
    #[serde(default)]
    pub server_version: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Success,
    Invalid,
    Conflict,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecordOutcome {
    pub observation_id: String,
    pub status: OutcomeStatus,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PullPage {
    pub records: Vec<Observation>,
    pub current_version: i64,
    pub next_page_token: Option<String>,
}

#[derive(Clone)]
pub struct ObservationStore {
    db: Db,
}

impl ObservationStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// Upserts a batch of records. Every valid record commits and consumes
    /// exactly one version; invalid records are reported per-record and
    /// never touch the counter (spec §4.1, §9 Open Question #1). The whole
    /// batch runs in one transaction: either every valid record's row and
    /// version allocation lands together, or (on a store error) none do.
    pub async fn upsert(&self, records: Vec<Observation>) -> Result<(Vec<RecordOutcome>, i64)> {
        self.db
            .with_conn(move |conn| {
                let tx = conn.transaction()?;
                let mut outcomes = Vec::with_capacity(records.len());

                for record in records {
                    if record.observation_id.trim().is_empty() {
                        outcomes.push(RecordOutcome {
                            observation_id: record.observation_id,
                            status: OutcomeStatus::Invalid,
                            reason: Some("invalid".to_string()),
                        });
                        continue;
                    }

                    let server_version = version::allocate_next_version(&tx)?;
                    let geolocation = record.geolocation.map(|g| g.to_string());
                    tx.execute(
                        "INSERT INTO observations
                            (observation_id, form_type, form_version, data, created_at,
                             updated_at, deleted, geolocation, server_version)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                         ON CONFLICT(observation_id) DO UPDATE SET
                            form_type = excluded.form_type,
                            form_version = excluded.form_version,
                            data = excluded.data,
                            updated_at = excluded.updated_at,
                            deleted = excluded.deleted,
                            geolocation = excluded.geolocation,
                            server_version = excluded.server_version",
                        params![
                            record.observation_id,
                            record.form_type,
                            record.form_version,
                            record.data.to_string(),
                            record.created_at,
                            record.updated_at,
                            record.deleted as i64,
                            geolocation,
                            server_version,
                        ],
                    )?;

                    outcomes.push(RecordOutcome {
                        observation_id: record.observation_id,
                        status: OutcomeStatus::Success,
                        reason: None,
                    });
                }

                let current = version::current_version(&tx)?;
                tx.commit()?;
                Ok((outcomes, current))
            })
            .await
    }

    /// Returns records with `server_version > since_version`, ascending,
    /// optionally filtered by `schema_types` (empty/absent both mean "all",
    /// spec §9 Open Question #2), bounded by `limit` and resumed from
    /// `page_token`.
    pub async fn pull(
        &self,
        since_version: i64,
        schema_types: Option<Vec<String>>,
        limit: usize,
        page_token: Option<String>,
    ) -> Result<PullPage> {
        let floor = match page_token {
            Some(token) => decode_page_token(&token).unwrap_or(since_version),
            None => since_version,
        };

        self.db
            .with_conn(move |conn| {
                let tx = conn.transaction()?;
                let current_version = version::current_version(&tx)?;

                let types = schema_types.filter(|v| !v.is_empty());
                let mut records = Vec::new();

                if limit > 0 {
                    let mut stmt = tx.prepare(
                        "SELECT observation_id, form_type, form_version, data, created_at,
                                updated_at, deleted, geolocation, server_version
                         FROM observations
                         WHERE server_version > ?1
                         ORDER BY server_version ASC",
                    )?;
                    let rows = stmt.query_map(params![floor], |row| {
                        let geolocation: Option<String> = row.get(7)?;
                        let data: String = row.get(3)?;
                        Ok(Observation {
                            observation_id: row.get(0)?,
                            form_type: row.get(1)?,
                            form_version: row.get(2)?,
                            data: serde_json::from_str(&data).unwrap_or(Value::Null),
                            created_at: row.get(4)?,
                            updated_at: row.get(5)?,
                            deleted: row.get::<_, i64>(6)? != 0,
                            geolocation: geolocation
                                .and_then(|g| serde_json::from_str(&g).ok()),
                            server_version: row.get(8)?,
                        })
                    })?;

                    for row in rows {
                        let obs = row?;
                        if let Some(types) = &types {
                            if !types.contains(&obs.form_type) {
                                continue;
                            }
                        }
                        records.push(obs);
                        if records.len() >= limit {
                            break;
                        }
                    }
                }

                let next_page_token = records
                    .len()
                    .eq(&limit)
                    .then(|| records.last())
                    .flatten()
                    .filter(|last| last.server_version < current_version)
                    .map(|last| encode_page_token(last.server_version));

                Ok(PullPage {
                    records,
                    current_version,
                    next_page_token,
                })
            })
            .await
    }
}

fn encode_page_token(server_version: i64) -> String {
    base64::Engine::encode(&base64::engine::general_purpose::STANDARD, server_version.to_string())
}

fn decode_page_token(token: &str) -> Option<i64> {
    let bytes = base64::Engine::decode(&base64::engine::general_purpose::STANDARD, token).ok()?;
    String::from_utf8(bytes).ok()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn store() -> (tempfile::TempDir, ObservationStore) {
        let dir = tempfile::tempdir().unwrap();
        let db = Db::open(&dir.path().join("obs.db")).unwrap();
        (dir, ObservationStore::new(db))
    }

    fn obs(id: &str, data: serde_json::Value) -> Observation {
        Observation {
            observation_id: id.to_string(),
            form_type: "survey".to_string(),
            form_version: "1".to_string(),
            data,
            created_at: "2026-01-01T00:00:00Z".to_string(),
            updated_at: "2026-01-01T00:00:00Z".to_string(),
            deleted: false,
            geolocation: None,
            server_version: 0,
        }
    }

    #[tokio::test]
    async fn push_then_pull_roundtrip() {
        let (_dir, store) = store().await;
        let (outcomes, current) = store.upsert(vec![obs("a", json!({"x": 1}))]).await.unwrap();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].status, OutcomeStatus::Success);
        assert_eq!(current, 1);

        let page = store.pull(0, None, 100, None).await.unwrap();
        assert_eq!(page.records.len(), 1);
        assert_eq!(page.current_version, 1);
        assert!(page.next_page_token.is_none());

        let page = store.pull(1, None, 100, None).await.unwrap();
        assert_eq!(page.records.len(), 0);
    }

    #[tokio::test]
    async fn invalid_record_does_not_consume_a_version() {
        let (_dir, store) = store().await;
        let (outcomes, current) = store
            .upsert(vec![obs("b", json!({"y": 2})), obs("", json!({}))])
            .await
            .unwrap();
        assert_eq!(outcomes[0].status, OutcomeStatus::Success);
        assert_eq!(outcomes[1].status, OutcomeStatus::Invalid);
        assert_eq!(outcomes[1].reason.as_deref(), Some("invalid"));
        assert_eq!(current, 2);

        let page = store.pull(1, None, 100, None).await.unwrap();
        assert_eq!(page.records.len(), 1);
        assert_eq!(page.records[0].observation_id, "b");
    }

    #[tokio::test]
    async fn repeated_push_overwrites_and_bumps_version() {
        let (_dir, store) = store().await;
        store.upsert(vec![obs("a", json!({"v": 1}))]).await.unwrap();
        let (_, current) = store.upsert(vec![obs("a", json!({"v": 2}))]).await.unwrap();
        assert_eq!(current, 2);

        let page = store.pull(0, None, 100, None).await.unwrap();
        assert_eq!(page.records.len(), 1);
        assert_eq!(page.records[0].data, json!({"v": 2}));
        assert_eq!(page.records[0].server_version, 2);
    }

    #[tokio::test]
    async fn pull_limit_zero_returns_nothing_but_current_version() {
        let (_dir, store) = store().await;
        store.upsert(vec![obs("a", json!({}))]).await.unwrap();
        let page = store.pull(0, None, 0, None).await.unwrap();
        assert_eq!(page.records.len(), 0);
        assert_eq!(page.current_version, 1);
    }

    #[tokio::test]
    async fn deleted_tombstone_is_returned_once() {
        let (_dir, store) = store().await;
        store.upsert(vec![obs("a", json!({}))]).await.unwrap();
        let mut tombstone = obs("a", json!({}));
        tombstone.deleted = true;
        store.upsert(vec![tombstone]).await.unwrap();

        let page = store.pull(0, None, 100, None).await.unwrap();
        assert_eq!(page.records.len(), 1);
        assert!(page.records[0].deleted);
    }

    #[tokio::test]
    async fn pagination_returns_next_page_token_when_truncated() {
        let (_dir, store) = store().await;
        store
            .upsert(vec![obs("a", json!({})), obs("b", json!({})), obs("c", json!({}))])
            .await
            .unwrap();

        let page1 = store.pull(0, None, 2, None).await.unwrap();
        assert_eq!(page1.records.len(), 2);
        assert!(page1.next_page_token.is_some());

        let page2 = store
            .pull(0, None, 2, page1.next_page_token.clone())
            .await
            .unwrap();
        assert_eq!(page2.records.len(), 1);
        assert_eq!(page2.records[0].observation_id, "c");
        assert!(page2.next_page_token.is_none());
    }
}
