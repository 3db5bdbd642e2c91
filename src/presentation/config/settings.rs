use std::collections::HashMap;
use std::time::Duration;

use serde::Deserialize;

/// Process configuration, loaded from environment variables with the same
/// defaults the service has always shipped with. Everything the pipeline
/// needs to talk to the outside world lives here; adapters receive their
/// slice at construction instead of reading ambient state.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server: ServerSettings,
    pub worker: WorkerSettings,
    pub ollama: OllamaSettings,
    pub quickbase: QuickbaseSettings,
    pub database_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkerSettings {
    pub count: usize,
    pub max_attempts: u32,
    pub visibility_timeout_secs: u64,
    pub poll_interval_ms: u64,
    pub sync_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OllamaSettings {
    pub base_url: String,
    pub model: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QuickbaseSettings {
    pub api_url: String,
    pub realm: String,
    pub user_token: String,
    pub table_id: String,
    pub record_field_id: u32,
    /// Extracted field name -> Quickbase field id, as a JSON object in
    /// `QUICKBASE_FIELD_IDS` (for example `{"vendor": 6, "total": 7}`).
    pub field_ids: HashMap<String, u32>,
    /// Field that receives the failure message when a job fails; unset
    /// disables error writeback.
    pub error_field_id: Option<u32>,
}

impl Settings {
    pub fn from_env() -> Result<Self, String> {
        Ok(Self {
            server: ServerSettings {
                host: env_or("SERVER_HOST", "0.0.0.0"),
                port: parse_env("SERVER_PORT", 3000)?,
            },
            worker: WorkerSettings {
                count: parse_env("WORKER_COUNT", 4)?,
                max_attempts: parse_env("WORKER_MAX_ATTEMPTS", 3)?,
                visibility_timeout_secs: parse_env("WORKER_VISIBILITY_TIMEOUT_SECS", 660)?,
                poll_interval_ms: parse_env("WORKER_POLL_INTERVAL_MS", 500)?,
                sync_timeout_secs: parse_env("SYNC_TIMEOUT_SECS", 30)?,
            },
            ollama: OllamaSettings {
                base_url: env_or("OLLAMA_URL", "http://localhost:11434"),
                model: env_or("OLLAMA_MODEL", "llama3"),
                timeout_secs: parse_env("OLLAMA_TIMEOUT_SECS", 600)?,
            },
            quickbase: QuickbaseSettings {
                api_url: env_or("QUICKBASE_URL", "https://api.quickbase.com/v1/records"),
                realm: env_or("QUICKBASE_REALM", "your-realm.quickbase.com"),
                user_token: env_or("QUICKBASE_USER_TOKEN", ""),
                table_id: env_or("QUICKBASE_TABLE_ID", ""),
                record_field_id: parse_env("QUICKBASE_RECORD_FIELD_ID", 3)?,
                field_ids: parse_field_ids()?,
                error_field_id: parse_opt_env("QUICKBASE_ERROR_FIELD_ID")?,
            },
            database_url: std::env::var("DATABASE_URL").ok(),
        })
    }

    pub fn ollama_timeout(&self) -> Duration {
        Duration::from_secs(self.ollama.timeout_secs)
    }

    pub fn sync_timeout(&self) -> Duration {
        Duration::from_secs(self.worker.sync_timeout_secs)
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> Result<T, String> {
    match std::env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| format!("{} has an invalid value: {}", key, raw)),
        Err(_) => Ok(default),
    }
}

fn parse_opt_env<T: std::str::FromStr>(key: &str) -> Result<Option<T>, String> {
    match std::env::var(key) {
        Ok(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| format!("{} has an invalid value: {}", key, raw)),
        Err(_) => Ok(None),
    }
}

fn parse_field_ids() -> Result<HashMap<String, u32>, String> {
    match std::env::var("QUICKBASE_FIELD_IDS") {
        Ok(raw) => serde_json::from_str(&raw)
            .map_err(|e| format!("QUICKBASE_FIELD_IDS is not a JSON object of field ids: {}", e)),
        Err(_) => Ok(HashMap::new()),
    }
}
