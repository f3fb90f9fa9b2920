use std::fmt;

use runscope_logs::{
    DEFAULT_MAX_LINES, DEFAULT_MAX_QUERIES, DEFAULT_PAGE_SIZE, DEFAULT_TAIL_SIZE_KB, SourceLimits,
    StreamOptions,
};
use serde::Deserialize;
use thiserror::Error;

/// Invalid Loki or Grafana settings
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field} url '{url}': {reason}")]
    InvalidUrl {
        field: &'static str,
        url: String,
        reason: String,
    },

    #[error("missing required setting: {0}")]
    MissingField(&'static str),

    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("invalid limit: {0}")]
    InvalidLimit(String),

    #[error("failed to build http client: {0}")]
    HttpClient(String),
}

/// Credentials sent preemptively on every request
#[derive(Clone, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LokiCredentials {
    Basic { username: String, password: String },
    Bearer { token: String },
    ApiKey { key: String },
}

impl LokiCredentials {
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self {
            LokiCredentials::Basic { username, .. } if username.trim().is_empty() => Err(
                ConfigError::InvalidCredentials("basic auth username is empty".to_string()),
            ),
            LokiCredentials::Bearer { token } if token.trim().is_empty() => Err(
                ConfigError::InvalidCredentials("bearer token is empty".to_string()),
            ),
            LokiCredentials::ApiKey { key } if key.trim().is_empty() => Err(
                ConfigError::InvalidCredentials("api key is empty".to_string()),
            ),
            _ => Ok(()),
        }
    }
}

// Never print secrets
impl fmt::Debug for LokiCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LokiCredentials::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"***")
                .finish(),
            LokiCredentials::Bearer { .. } => f.debug_struct("Bearer").field("token", &"***").finish(),
            LokiCredentials::ApiKey { .. } => f.debug_struct("ApiKey").field("key", &"***").finish(),
        }
    }
}

/// How OpenTelemetry logs were written into Loki, which decides the LogQL of
/// the "view in Grafana" link
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LokiLogFormat {
    /// Loki 3 native OTLP: labels plus structured metadata
    #[default]
    LokiV3Otel,
    /// Loki 2 exporter: one JSON document per line
    LokiV2JsonOtel,
}

/// Grafana instance used to render the visualization link
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GrafanaConfig {
    pub base_url: String,
    pub org_id: String,
    pub loki_datasource: String,
    pub log_format: LokiLogFormat,
    pub backend_name: String,
}

impl Default for GrafanaConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            org_id: "1".to_string(),
            loki_datasource: "grafanacloud-logs".to_string(),
            log_format: LokiLogFormat::default(),
            backend_name: "Grafana".to_string(),
        }
    }
}

/// Loki connection and retrieval settings
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LokiConfig {
    pub url: String,
    pub credentials: Option<LokiCredentials>,
    pub tenant_id: Option<String>,
    pub service_name: String,
    pub service_namespace: Option<String>,
    pub page_size: usize,
    pub max_queries: u32,
    pub max_lines: u64,
    pub timeout_secs: u64,
    pub disable_ssl_verification: bool,
    pub truncation_marker: bool,
    pub tail_size_kb: u64,
    pub grafana: Option<GrafanaConfig>,
}

impl Default for LokiConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            credentials: None,
            tenant_id: None,
            service_name: "jenkins".to_string(),
            service_namespace: None,
            page_size: DEFAULT_PAGE_SIZE,
            max_queries: DEFAULT_MAX_QUERIES,
            max_lines: DEFAULT_MAX_LINES,
            timeout_secs: 30,
            disable_ssl_verification: false,
            truncation_marker: true,
            tail_size_kb: DEFAULT_TAIL_SIZE_KB,
            grafana: None,
        }
    }
}

impl LokiConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Base URL without trailing slashes
    pub fn base_url(&self) -> &str {
        self.url.trim().trim_end_matches('/')
    }

    pub fn limits(&self) -> SourceLimits {
        SourceLimits::default()
            .with_page_size(self.page_size)
            .with_max_queries(self.max_queries)
            .with_max_lines(self.max_lines)
    }

    pub fn stream_options(&self) -> StreamOptions {
        StreamOptions {
            truncation_marker: self.truncation_marker,
            tail_size_kb: self.tail_size_kb,
        }
    }

    /// Check everything that can be checked without talking to Loki
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_url().is_empty() {
            return Err(ConfigError::MissingField("url"));
        }
        check_url("loki", self.base_url())?;

        if self.service_name.trim().is_empty() {
            return Err(ConfigError::MissingField("service_name"));
        }
        if let Some(credentials) = &self.credentials {
            credentials.validate()?;
        }
        if self.tenant_id.as_deref().is_some_and(|t| t.trim().is_empty()) {
            return Err(ConfigError::MissingField("tenant_id"));
        }
        if self.page_size == 0 {
            return Err(ConfigError::InvalidLimit("page_size must be at least 1".to_string()));
        }
        if self.max_queries == 0 {
            return Err(ConfigError::InvalidLimit("max_queries must be at least 1".to_string()));
        }
        if let Some(grafana) = &self.grafana {
            if grafana.base_url.trim().is_empty() {
                return Err(ConfigError::MissingField("grafana.base_url"));
            }
            check_url("grafana", grafana.base_url.trim())?;
        }
        Ok(())
    }
}

fn check_url(field: &'static str, url: &str) -> Result<(), ConfigError> {
    let parsed = reqwest::Url::parse(url).map_err(|e| ConfigError::InvalidUrl {
        field,
        url: url.to_string(),
        reason: e.to_string(),
    })?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(ConfigError::InvalidUrl {
            field,
            url: url.to_string(),
            reason: format!("unsupported scheme '{}'", other),
        }),
    }
}
