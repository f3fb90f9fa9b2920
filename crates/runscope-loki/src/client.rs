//! Blocking HTTP access to Loki
//!
//! Loki (and Grafana Cloud Logs) never answers with `WWW-Authenticate`, so
//! credentials are attached to every request up front instead of waiting for
//! a challenge.

use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder};
use runscope_logs::{LineId, Page, PageFetcher, RetrievalError};
use tracing::{debug, instrument};

use crate::config::{ConfigError, LokiConfig, LokiCredentials};
use crate::query::LokiQueryParameters;
use crate::response::parse_query_range;

/// Header carrying the Loki tenant
pub const TENANT_HEADER: &str = "X-Scope-OrgID";

/// Build the HTTP client for one retriever
pub fn build_http_client(config: &LokiConfig) -> Result<Client, ConfigError> {
    Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .danger_accept_invalid_certs(config.disable_ssl_verification)
        .user_agent(concat!("runscope/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| ConfigError::HttpClient(e.to_string()))
}

/// Attach preemptive credentials and the tenant header
pub fn authenticate(
    request: RequestBuilder,
    credentials: Option<&LokiCredentials>,
    tenant_id: Option<&str>,
) -> RequestBuilder {
    let request = match credentials {
        Some(LokiCredentials::Basic { username, password }) => {
            request.basic_auth(username, Some(password))
        }
        Some(LokiCredentials::Bearer { token }) => request.bearer_auth(token),
        Some(LokiCredentials::ApiKey { key }) => {
            request.header(reqwest::header::AUTHORIZATION, format!("ApiKey {}", key))
        }
        None => request,
    };
    match tenant_id {
        Some(tenant) => request.header(TENANT_HEADER, tenant),
        None => request,
    }
}

pub(crate) fn transport_error(err: reqwest::Error) -> RetrievalError {
    RetrievalError::unreachable(err.to_string())
}

/// Issues one `query_range` request per page
pub struct LokiPageFetcher {
    client: Client,
    base_url: String,
    params: LokiQueryParameters,
    credentials: Option<LokiCredentials>,
    tenant_id: Option<String>,
}

impl LokiPageFetcher {
    pub fn new(client: Client, config: &LokiConfig, params: LokiQueryParameters) -> Self {
        Self {
            client,
            base_url: config.base_url().to_string(),
            params,
            credentials: config.credentials.clone(),
            tenant_id: config.tenant_id.clone(),
        }
    }

    pub fn params(&self) -> &LokiQueryParameters {
        &self.params
    }
}

impl PageFetcher for LokiPageFetcher {
    #[instrument(
        level = "debug",
        skip(self),
        fields(
            pipeline = %self.params.scope().pipeline_id,
            run = self.params.scope().run_number,
            step = ?self.params.scope().step_id,
        )
    )]
    fn fetch(&mut self, window_start: LineId, limit: usize) -> Result<Page, RetrievalError> {
        let url = self
            .params
            .request_url(&self.base_url, window_start, limit)
            .map_err(|e| RetrievalError::unreachable(e.to_string()))?;
        let request = authenticate(
            self.client.get(url),
            self.credentials.as_ref(),
            self.tenant_id.as_deref(),
        );

        let response = request.send().map_err(transport_error)?;
        let status = response.status();
        let body = response.text().map_err(transport_error)?;
        if !status.is_success() {
            return Err(RetrievalError::BackendQuery {
                status: status.as_u16(),
                body,
            });
        }

        let lines = parse_query_range(&body)?;
        debug!(lines = lines.len(), status = status.as_u16(), "loki page received");
        Ok(Page::new(lines, status.as_u16()))
    }
}
