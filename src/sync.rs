//! Component 7 — Sync Engine.
//!
//! `pull` and `push` are independent, state-machine-free operations layered
//! directly on the Observation Store (spec §4.8).

use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::error::Result;
use crate::observations::{Observation, ObservationStore, OutcomeStatus};

#[derive(Debug, Deserialize)]
pub struct Since {
    pub version: i64,
}

#[derive(Debug, Deserialize)]
pub struct PullRequest {
    pub client_id: String,
    pub since: Since,
    #[serde(default)]
    pub schema_types: Option<Vec<String>>,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub page_token: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PullResponse {
    pub records: Vec<Observation>,
    pub current_version: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PushRequest {
    pub client_id: String,
    pub transmission_id: String,
    pub records: Vec<Observation>,
}

#[derive(Debug, Serialize)]
pub struct FailedRecord {
    pub observation_id: String,
    pub reason: String,
}

#[derive(Debug, Serialize)]
pub struct PushResponse {
    pub success_count: usize,
    pub failed_records: Vec<FailedRecord>,
    pub current_version: i64,
}

#[derive(Clone)]
pub struct SyncEngine {
    observations: ObservationStore,
    max_pull_page: usize,
}

impl SyncEngine {
    pub fn new(observations: ObservationStore, max_pull_page: usize) -> Self {
        Self {
            observations,
            max_pull_page,
        }
    }

    #[instrument(skip(self, req), fields(client_id = %req.client_id))]
    pub async fn pull(&self, req: PullRequest) -> Result<PullResponse> {
        let limit = req.limit.unwrap_or(self.max_pull_page).min(self.max_pull_page);
        let page = self
            .observations
            .pull(req.since.version, req.schema_types, limit, req.page_token)
            .await?;
        Ok(PullResponse {
            records: page.records,
            current_version: page.current_version,
            next_page_token: page.next_page_token,
        })
    }

    #[instrument(skip(self, req), fields(client_id = %req.client_id, transmission_id = %req.transmission_id))]
    pub async fn push(&self, req: PushRequest) -> Result<PushResponse> {
        let (outcomes, current_version) = self.observations.upsert(req.records).await?;
        let mut success_count = 0;
        let mut failed_records = Vec::new();
        for outcome in outcomes {
            match outcome.status {
                OutcomeStatus::Success => success_count += 1,
                OutcomeStatus::Invalid | OutcomeStatus::Conflict => {
                    failed_records.push(FailedRecord {
                        observation_id: outcome.observation_id,
                        reason: outcome.reason.unwrap_or_else(|| "invalid".to_string()),
                    });
                }
            }
        }
        Ok(PushResponse {
            success_count,
            failed_records,
            current_version,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Db;
    use serde_json::json;

    async fn engine() -> (tempfile::TempDir, SyncEngine) {
        let dir = tempfile::tempdir().unwrap();
        let db = Db::open(&dir.path().join("sync.db")).unwrap();
        let store = ObservationStore::new(db);
        (dir, SyncEngine::new(store, 500))
    }

    #[tokio::test]
    async fn push_then_pull_end_to_end() {
        let (_dir, engine) = engine().await;
        let push = engine
            .push(PushRequest {
                client_id: "device-1".to_string(),
                transmission_id: "t1".to_string(),
                records: vec![Observation {
                    observation_id: "a".to_string(),
                    form_type: "survey".to_string(),
                    form_version: "1".to_string(),
                    data: json!({"x": 1}),
                    created_at: "T0".to_string(),
                    updated_at: "T0".to_string(),
                    deleted: false,
                    geolocation: None,
                    server_version: 0,
                }],
            })
            .await
            .unwrap();
        assert_eq!(push.success_count, 1);
        assert_eq!(push.current_version, 1);

        let pull = engine
            .pull(PullRequest {
                client_id: "device-1".to_string(),
                since: Since { version: 0 },
                schema_types: None,
                limit: None,
                page_token: None,
            })
            .await
            .unwrap();
        assert_eq!(pull.records.len(), 1);
        assert_eq!(pull.current_version, 1);
    }

    #[tokio::test]
    async fn push_reports_invalid_record_in_envelope() {
        let (_dir, engine) = engine().await;
        let push = engine
            .push(PushRequest {
                client_id: "device-1".to_string(),
                transmission_id: "t2".to_string(),
                records: vec![
                    Observation {
                        observation_id: "b".to_string(),
                        form_type: "survey".to_string(),
                        form_version: "1".to_string(),
                        data: json!({"y": 2}),
                        created_at: "T0".to_string(),
                        updated_at: "T0".to_string(),
                        deleted: false,
                        geolocation: None,
                        server_version: 0,
                    },
                    Observation {
                        observation_id: "".to_string(),
                        form_type: "survey".to_string(),
                        form_version: "1".to_string(),
                        data: json!({}),
                        created_at: "T0".to_string(),
                        updated_at: "T0".to_string(),
                        deleted: false,
                        geolocation: None,
                        server_version: 0,
                    },
                ],
            })
            .await
            .unwrap();
        assert_eq!(push.success_count, 1);
        assert_eq!(push.failed_records.len(), 1);
        assert_eq!(push.failed_records[0].observation_id, "");
        assert_eq!(push.failed_records[0].reason, "invalid");
    }
}
