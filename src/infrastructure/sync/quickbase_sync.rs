use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

use crate::application::ports::{RecordSync, SyncError};
use crate::domain::FieldMap;

/// Connection and mapping parameters for the Quickbase records API.
/// Passed in at construction so tests can substitute stubs without touching
/// process-wide state.
#[derive(Debug, Clone)]
pub struct QuickbaseConfig {
    pub api_url: String,
    pub realm: String,
    pub user_token: String,
    pub table_id: String,
    /// Field id that identifies the record being updated.
    pub record_field_id: u32,
    /// Extracted field name -> Quickbase field id. Extracted fields with no
    /// mapping are skipped.
    pub field_ids: HashMap<String, u32>,
    /// Field that receives the failure message when a job fails. `None`
    /// disables error writeback entirely.
    pub error_field_id: Option<u32>,
    pub timeout: Duration,
}

/// Writes extraction results back to a Quickbase table via the records
/// endpoint.
pub struct QuickbaseSync {
    client: Client,
    config: QuickbaseConfig,
}

impl QuickbaseSync {
    pub fn new(config: QuickbaseConfig) -> Self {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .expect("reqwest client build never fails with valid TLS config");
        Self { client, config }
    }

    fn build_record(
        &self,
        record_id: &str,
        fields: &FieldMap,
    ) -> serde_json::Map<String, serde_json::Value> {
        let mut record = serde_json::Map::new();
        record.insert(
            self.config.record_field_id.to_string(),
            json!({ "value": record_id }),
        );
        for (name, value) in fields {
            match self.config.field_ids.get(name) {
                Some(fid) => {
                    record.insert(fid.to_string(), json!({ "value": value }));
                }
                None => {
                    tracing::warn!(field = %name, "No field id mapping, skipping field");
                }
            }
        }
        record
    }

    fn build_error_record(
        &self,
        record_id: &str,
        error_field_id: u32,
        message: &str,
    ) -> serde_json::Map<String, serde_json::Value> {
        let mut record = serde_json::Map::new();
        record.insert(
            self.config.record_field_id.to_string(),
            json!({ "value": record_id }),
        );
        record.insert(error_field_id.to_string(), json!({ "value": message }));
        record
    }

    async fn post_records(
        &self,
        record: serde_json::Map<String, serde_json::Value>,
    ) -> Result<(), SyncError> {
        let body = json!({
            "to": self.config.table_id,
            "data": [record],
        });

        let response = self
            .client
            .post(&self.config.api_url)
            .header("QB-Realm-Hostname", &self.config.realm)
            .header(
                "Authorization",
                format!("QB-USER-TOKEN {}", self.config.user_token),
            )
            .json(&body)
            .send()
            .await
            .map_err(|e| SyncError::RequestFailed(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(SyncError::Rejected { status, body });
        }

        Ok(())
    }
}

#[async_trait]
impl RecordSync for QuickbaseSync {
    async fn write(&self, record_id: &str, fields: &FieldMap) -> Result<(), SyncError> {
        self.post_records(self.build_record(record_id, fields)).await
    }

    async fn write_error(&self, record_id: &str, message: &str) -> Result<(), SyncError> {
        let Some(error_field_id) = self.config.error_field_id else {
            tracing::debug!(record_id = %record_id, "No error field configured, skipping writeback");
            return Ok(());
        };
        self.post_records(self.build_error_record(record_id, error_field_id, message))
            .await
    }
}
