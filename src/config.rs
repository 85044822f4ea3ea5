//! Service configuration.
//!
//! Tunables live in a TOML file (see `iow_report.toml` at the repository
//! root); API credentials come from the environment, optionally seeded from
//! a `.env` file. Every section has defaults matching the production
//! reports, so an empty file is a valid configuration.

use std::path::Path;
use std::time::Duration;

use chrono::FixedOffset;
use serde::Deserialize;

use crate::analysis::dispatch::MAX_LOOKBACK_HOURS;
use crate::model::ReportError;

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServiceConfig {
    pub api: ApiConfig,
    pub retry: RetryConfig,
    pub engine: EngineConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL of the versioned API, without the trailing `/api`.
    pub base_url: String,
    pub token_url: String,
    /// Per-request timeout.
    pub timeout_secs: u64,
    /// Local time zone of the monitored region, as minutes east of UTC.
    /// Calendar-day grouping and day splitting use this offset.
    pub utc_offset_minutes: i32,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://iapi.wra.gov.tw/v3".to_string(),
            token_url: "https://iapi.wra.gov.tw/v3/oauth2/token".to_string(),
            timeout_secs: 5,
            utc_offset_minutes: 480,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts per request, including the first.
    pub max_retries: u32,
    /// Flat delay between attempts.
    pub delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            delay_ms: 4000,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    pub pump_gap_tolerance_minutes: u32,
    pub flood_gap_tolerance_minutes: u32,
    pub expected_samples_per_day: u32,
    /// Pump intervals at or below this volume (m³) are discarded.
    pub min_volume_threshold: f64,
    pub flow_rate_m3_per_sec: f64,
    pub dispatch_lookback_hours: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            pump_gap_tolerance_minutes: 10,
            flood_gap_tolerance_minutes: 8,
            expected_samples_per_day: 24,
            min_volume_threshold: 3.0,
            flow_rate_m3_per_sec: 0.3,
            dispatch_lookback_hours: 12,
        }
    }
}

impl ServiceConfig {
    /// Reads and validates a TOML configuration file.
    pub fn load(path: &Path) -> Result<Self, ReportError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self, ReportError> {
        let config: ServiceConfig = toml::from_str(text)
            .map_err(|e| ReportError::Config(format!("invalid TOML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ReportError> {
        if self.retry.max_retries == 0 {
            return Err(ReportError::Config("retry.max_retries must be at least 1".to_string()));
        }
        if self.engine.expected_samples_per_day == 0 {
            return Err(ReportError::Config(
                "engine.expected_samples_per_day must be at least 1".to_string(),
            ));
        }
        if !self.engine.flow_rate_m3_per_sec.is_finite() || self.engine.flow_rate_m3_per_sec <= 0.0 {
            return Err(ReportError::Config(
                "engine.flow_rate_m3_per_sec must be a positive number".to_string(),
            ));
        }
        if !self.engine.min_volume_threshold.is_finite() {
            return Err(ReportError::Config(
                "engine.min_volume_threshold must be finite".to_string(),
            ));
        }
        if !(1..=MAX_LOOKBACK_HOURS).contains(&self.engine.dispatch_lookback_hours) {
            return Err(ReportError::Config(format!(
                "engine.dispatch_lookback_hours must be between 1 and {}",
                MAX_LOOKBACK_HOURS
            )));
        }
        self.local_offset()?;
        Ok(())
    }

    pub fn local_offset(&self) -> Result<FixedOffset, ReportError> {
        FixedOffset::east_opt(self.api.utc_offset_minutes * 60).ok_or_else(|| {
            ReportError::Config(format!(
                "api.utc_offset_minutes out of range: {}",
                self.api.utc_offset_minutes
            ))
        })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.api.timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry.delay_ms)
    }
}

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

/// Client-credentials grant parameters for the token endpoint.
#[derive(Clone, PartialEq)]
pub struct Credentials {
    pub grant_type: String,
    pub client_id: String,
    pub client_secret: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("grant_type", &self.grant_type)
            .field("client_id", &self.client_id)
            .field("client_secret", &"***")
            .finish()
    }
}

impl Credentials {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            grant_type: "client_credentials".to_string(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    /// Reads `API_CLIENT_ID`, `API_CLIENT_SECRET` and the optional
    /// `API_GRANT_TYPE` from the environment, loading `.env` first if present.
    pub fn from_env() -> Result<Self, ReportError> {
        dotenv::dotenv().ok();
        let var = |name: &str| {
            std::env::var(name)
                .map_err(|_| ReportError::Config(format!("{} must be set", name)))
        };
        let mut credentials = Self::new(var("API_CLIENT_ID")?, var("API_CLIENT_SECRET")?);
        if let Ok(grant_type) = std::env::var("API_GRANT_TYPE") {
            credentials.grant_type = grant_type;
        }
        Ok(credentials)
    }
}
