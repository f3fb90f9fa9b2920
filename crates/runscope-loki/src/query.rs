//! LogQL range queries for pipeline logs
//!
//! See <https://grafana.com/docs/loki/latest/reference/loki-http-api/#query-logs-within-a-range-of-time>

use runscope_types::{LineId, QueryScope};

use crate::config::{ConfigError, LokiConfig};

/// Stream label holding `service.name`
pub const LABEL_SERVICE_NAME: &str = "service_name";
/// Stream label holding `service.namespace`
pub const LABEL_SERVICE_NAMESPACE: &str = "service_namespace";
/// Structured metadata holding the trace id
pub const META_DATA_TRACE_ID: &str = "trace_id";
pub const META_DATA_CI_PIPELINE_ID: &str = "ci_pipeline_id";
pub const META_DATA_CI_PIPELINE_RUN_NUMBER: &str = "ci_pipeline_run_number";
pub const META_DATA_PIPELINE_STEP_ID: &str = "jenkins_pipeline_step_id";

/// Path of the range query endpoint
pub const QUERY_RANGE_PATH: &str = "/loki/api/v1/query_range";
/// Path of the endpoint used as a reachability and credentials check
pub const FORMAT_QUERY_PATH: &str = "/loki/api/v1/format_query";

/// Everything needed to query one pipeline log stream in Loki
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LokiQueryParameters {
    scope: QueryScope,
    service_name: String,
    service_namespace: Option<String>,
}

impl LokiQueryParameters {
    pub fn new(
        scope: QueryScope,
        service_name: impl Into<String>,
        service_namespace: Option<String>,
    ) -> Self {
        Self {
            scope,
            service_name: service_name.into(),
            service_namespace,
        }
    }

    pub fn from_config(scope: QueryScope, config: &LokiConfig) -> Self {
        Self::new(
            scope,
            config.service_name.clone(),
            config.service_namespace.clone(),
        )
    }

    pub fn scope(&self) -> &QueryScope {
        &self.scope
    }

    /// Where pagination starts: the scope's start time
    pub fn initial_window_start(&self) -> LineId {
        LineId::from_instant(self.scope.start_time)
    }

    /// LogQL selecting the scope's lines, keeping only the line text
    pub fn logql(&self) -> String {
        let mut logql = String::from("{");
        if let Some(namespace) = &self.service_namespace {
            logql.push_str(&format!(
                "{}=\"{}\", ",
                LABEL_SERVICE_NAMESPACE,
                escape_label_value(namespace)
            ));
        }
        logql.push_str(&format!(
            "{}=\"{}\"}}",
            LABEL_SERVICE_NAME,
            escape_label_value(&self.service_name)
        ));

        logql.push_str(&format!(
            " | {}=\"{}\", {}=\"{}\", {}={}",
            META_DATA_TRACE_ID,
            escape_label_value(&self.scope.trace_id),
            META_DATA_CI_PIPELINE_ID,
            escape_label_value(&self.scope.pipeline_id),
            META_DATA_CI_PIPELINE_RUN_NUMBER,
            self.scope.run_number
        ));
        if let Some(step_id) = &self.scope.step_id {
            logql.push_str(&format!(
                ", {}=\"{}\"",
                META_DATA_PIPELINE_STEP_ID,
                escape_label_value(step_id)
            ));
        }

        logql.push_str(" | keep __line__");
        logql
    }

    /// Query string parameters for one page starting at `window_start`
    pub fn query_pairs(&self, window_start: LineId, limit: usize) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            ("query", self.logql()),
            ("start", window_start.to_string()),
        ];
        if let Some(end) = self.scope.end_nanos() {
            pairs.push(("end", end.to_string()));
        }
        pairs.push(("direction", "forward".to_string()));
        pairs.push(("limit", limit.to_string()));
        pairs
    }

    /// Fully encoded range query URL for one page
    pub fn request_url(
        &self,
        base_url: &str,
        window_start: LineId,
        limit: usize,
    ) -> Result<reqwest::Url, ConfigError> {
        let endpoint = format!("{}{}", base_url.trim_end_matches('/'), QUERY_RANGE_PATH);
        reqwest::Url::parse_with_params(&endpoint, self.query_pairs(window_start, limit)).map_err(
            |e| ConfigError::InvalidUrl {
                field: "loki",
                url: endpoint.clone(),
                reason: e.to_string(),
            },
        )
    }
}

/// Escape a value for use inside a double-quoted LogQL string
pub fn escape_label_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            _ => escaped.push(c),
        }
    }
    escaped
}
