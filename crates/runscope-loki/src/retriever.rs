use std::fmt;

use chrono::Utc;
use reqwest::blocking::Client;
use runscope_logs::{
    CursorCache, LogStorageRetriever, LogsQueryResult, PaginatedSource, QueryScope, Result,
    RetrievalError, open_log_stream,
};
use tracing::{info, instrument, warn};

use crate::client::{LokiPageFetcher, authenticate, build_http_client};
use crate::config::{ConfigError, LokiConfig};
use crate::query::{FORMAT_QUERY_PATH, LokiQueryParameters};
use crate::visualization::logs_view_header;

/// Outcome of one setup check
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Validation {
    Ok(String),
    Error(String),
}

impl Validation {
    pub fn is_ok(&self) -> bool {
        matches!(self, Validation::Ok(_))
    }
}

impl fmt::Display for Validation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Validation::Ok(message) => write!(f, "ok: {}", message),
            Validation::Error(message) => write!(f, "error: {}", message),
        }
    }
}

/// Loki implementation of [`LogStorageRetriever`]
pub struct LokiRetriever {
    config: LokiConfig,
    client: Client,
}

impl fmt::Debug for LokiRetriever {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LokiRetriever")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl LokiRetriever {
    /// Validate `config` and build the HTTP client.
    ///
    /// Bad credentials or URLs are rejected here, before any request.
    pub fn new(config: LokiConfig) -> std::result::Result<Self, ConfigError> {
        config.validate()?;
        let client = build_http_client(&config)?;
        Ok(Self { config, client })
    }

    pub fn config(&self) -> &LokiConfig {
        &self.config
    }

    /// Page source over `scope`, without fetching anything yet
    pub fn page_source(&self, scope: &QueryScope) -> PaginatedSource<LokiPageFetcher> {
        let params = LokiQueryParameters::from_config(scope.clone(), &self.config);
        let window_start = params.initial_window_start();
        let fetcher = LokiPageFetcher::new(self.client.clone(), &self.config, params);
        PaginatedSource::new(fetcher, window_start, self.config.limits())
            .with_label(scope.key().to_string())
    }

    /// Check that Loki is reachable and accepts our credentials
    #[instrument(skip(self), fields(url = %self.config.base_url()))]
    pub fn check_setup(&self) -> Vec<Validation> {
        let endpoint = format!("{}{}", self.config.base_url(), FORMAT_QUERY_PATH);
        let url = match reqwest::Url::parse_with_params(&endpoint, [("query", "{foo=\"bar\"}")]) {
            Ok(url) => url,
            Err(e) => return vec![Validation::Error(format!("invalid url {}: {}", endpoint, e))],
        };

        let request = authenticate(
            self.client.get(url),
            self.config.credentials.as_ref(),
            self.config.tenant_id.as_deref(),
        );
        let validation = match request.send() {
            Ok(response) if response.status().is_success() => {
                info!("loki setup check passed");
                Validation::Ok(format!("Connected to Loki at {}", self.config.base_url()))
            }
            Ok(response) => {
                let status = response.status();
                let body = response.text().unwrap_or_default();
                warn!(status = status.as_u16(), "loki setup check failed");
                match status.as_u16() {
                    401 | 403 => Validation::Error(format!(
                        "Loki at {} rejected the credentials ({}): {}",
                        self.config.base_url(),
                        status,
                        body.trim()
                    )),
                    _ => Validation::Error(format!(
                        "Loki at {} answered {}: {}",
                        self.config.base_url(),
                        status,
                        body.trim()
                    )),
                }
            }
            Err(e) => {
                warn!(error = %e, "loki unreachable");
                Validation::Error(format!(
                    "Loki at {} is unreachable: {}",
                    self.config.base_url(),
                    e
                ))
            }
        };
        vec![validation]
    }
}

impl LogStorageRetriever for LokiRetriever {
    fn backend_name(&self) -> &str {
        match &self.config.grafana {
            Some(grafana) => &grafana.backend_name,
            None => "Loki",
        }
    }

    #[instrument(skip(self, cursors), fields(stream = %scope.key()))]
    fn retrieve(&self, scope: &QueryScope, cursors: &CursorCache) -> Result<LogsQueryResult> {
        let source = self.page_source(scope);
        let stream = open_log_stream(
            Box::new(source),
            cursors.scoped(scope.key()),
            self.config.stream_options(),
        )
        .map_err(|e| {
            if matches!(e, RetrievalError::BackendQuery { status: 401 | 403, .. }) {
                RetrievalError::Authentication(e.to_string())
            } else {
                e
            }
        })?;

        Ok(LogsQueryResult {
            stream,
            header: logs_view_header(&self.config, scope, Utc::now()),
            complete: scope.is_complete(),
        })
    }
}
