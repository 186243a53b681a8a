//! Lambda configuration loaded from environment variables.
//!
//! Only the complaints table is required; everything else has a default that
//! matches the deployed stack. Missing or malformed values fail the cold start
//! instead of surfacing on the first request.

use std::time::Duration;

use icrs_atoms::media::RESOLUTION_BUCKET;
use icrs_atoms::retry::{DEFAULT_BASE_DELAY, DEFAULT_MAX_RETRIES};
use icrs_atoms::RetryPolicy;
use thiserror::Error;

pub const DEFAULT_RESOLVED_INDEX: &str = "status-updated_at-index";
pub const DEFAULT_CONNECTIONS_TABLE: &str = "complaint-connections";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("invalid {key}={value:?}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    /// Env: `COMPLAINTS_TABLE` (required)
    pub complaints_table: String,

    /// GSI on `status` / `updated_at` backing the resolved feed.
    /// Env: `RESOLVED_INDEX`
    pub resolved_index: String,

    /// Env: `RESOLUTION_BUCKET`
    /// Default: `resolution-images`
    pub resolution_bucket: String,

    /// Open websocket view-sessions.
    /// Env: `CONNECTIONS_TABLE`
    pub connections_table: String,

    /// `https://{api-id}.execute-api.{region}.amazonaws.com/{stage}`.
    /// Env: `WEBSOCKET_ENDPOINT`
    pub websocket_endpoint: Option<String>,

    /// Local DynamoDB override.
    /// Env: `DYNAMODB_ENDPOINT`
    pub dynamodb_endpoint: Option<String>,

    /// CDN in front of the bucket; image URLs use it when set.
    /// Env: `PUBLIC_ASSET_BASE_URL`
    pub public_asset_base_url: Option<String>,

    /// Browser origins allowed to make credentialed requests, comma
    /// separated. Empty means no origin gets credentials.
    /// Env: `ALLOWED_ORIGINS`
    pub allowed_origins: Vec<String>,

    /// Env: `RETRY_MAX_RETRIES`, `RETRY_BASE_DELAY_MS`
    pub retry: RetryPolicy,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let complaints_table = get("COMPLAINTS_TABLE").ok_or(ConfigError::Missing("COMPLAINTS_TABLE"))?;

        let max_retries = match get("RETRY_MAX_RETRIES") {
            Some(value) => value.parse::<u32>().map_err(|e| ConfigError::Invalid {
                key: "RETRY_MAX_RETRIES",
                value: value.clone(),
                reason: e.to_string(),
            })?,
            None => DEFAULT_MAX_RETRIES,
        };
        let base_delay = match get("RETRY_BASE_DELAY_MS") {
            Some(value) => value
                .parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|e| ConfigError::Invalid {
                    key: "RETRY_BASE_DELAY_MS",
                    value: value.clone(),
                    reason: e.to_string(),
                })?,
            None => DEFAULT_BASE_DELAY,
        };

        let websocket_endpoint = get("WEBSOCKET_ENDPOINT");
        if let Some(endpoint) = &websocket_endpoint {
            if !endpoint.starts_with("https://") && !endpoint.starts_with("http://") {
                return Err(ConfigError::Invalid {
                    key: "WEBSOCKET_ENDPOINT",
                    value: endpoint.clone(),
                    reason: "expected an http(s) URL".into(),
                });
            }
        }

        let allowed_origins: Vec<String> = get("ALLOWED_ORIGINS")
            .map(|raw| {
                raw.split(',')
                    .map(|origin| origin.trim().trim_end_matches('/').to_string())
                    .filter(|origin| !origin.is_empty())
                    .collect()
            })
            .unwrap_or_default();
        if let Some(origin) = allowed_origins
            .iter()
            .find(|origin| !origin.starts_with("https://") && !origin.starts_with("http://"))
        {
            return Err(ConfigError::Invalid {
                key: "ALLOWED_ORIGINS",
                value: origin.clone(),
                reason: "expected an http(s) origin, wildcards are not allowed".into(),
            });
        }

        Ok(Self {
            complaints_table,
            resolved_index: get("RESOLVED_INDEX").unwrap_or_else(|| DEFAULT_RESOLVED_INDEX.into()),
            resolution_bucket: get("RESOLUTION_BUCKET").unwrap_or_else(|| RESOLUTION_BUCKET.into()),
            connections_table: get("CONNECTIONS_TABLE")
                .unwrap_or_else(|| DEFAULT_CONNECTIONS_TABLE.into()),
            websocket_endpoint,
            dynamodb_endpoint: get("DYNAMODB_ENDPOINT"),
            public_asset_base_url: get("PUBLIC_ASSET_BASE_URL")
                .map(|url| url.trim_end_matches('/').to_string()),
            allowed_origins,
            retry: RetryPolicy::new(max_retries, base_delay),
        })
    }
}
