//! "View logs in Grafana" links

use chrono::{DateTime, Duration, Utc};
use runscope_types::{LogsViewHeader, QueryScope};
use serde_json::json;

use crate::config::{GrafanaConfig, LokiConfig, LokiLogFormat};
use crate::query::{LABEL_SERVICE_NAME, META_DATA_TRACE_ID, escape_label_value};

const BACKEND_NAME_LOKI: &str = "Loki";
const EXPLORE_PANE: &str = "NZj";
const GRAFANA_ICON_PATH: &str = "/public/img/grafana_icon.svg";

/// Header pointing the user at the backend's own UI for `scope`
pub fn logs_view_header(config: &LokiConfig, scope: &QueryScope, now: DateTime<Utc>) -> LogsViewHeader {
    match &config.grafana {
        Some(grafana) => LogsViewHeader::new(
            grafana.backend_name.clone(),
            explore_url(grafana, config, scope, now),
        )
        .with_icon(format!(
            "{}{}",
            grafana.base_url.trim_end_matches('/'),
            GRAFANA_ICON_PATH
        )),
        None => LogsViewHeader::new(BACKEND_NAME_LOKI, config.base_url()),
    }
}

/// LogQL shown in Grafana Explore; depends on how the logs were ingested
pub fn explore_logql(format: LokiLogFormat, config: &LokiConfig, scope: &QueryScope) -> String {
    let trace_id = escape_label_value(&scope.trace_id);
    match format {
        LokiLogFormat::LokiV3Otel => format!(
            "{{{}=\"{}\"}} | {}=\"{}\"",
            LABEL_SERVICE_NAME,
            escape_label_value(&config.service_name),
            META_DATA_TRACE_ID,
            trace_id
        ),
        LokiLogFormat::LokiV2JsonOtel => {
            let job = match &config.service_namespace {
                Some(namespace) => format!("{}/{}", namespace, config.service_name),
                None => config.service_name.clone(),
            };
            format!(
                "{{job=\"{}\"}} | json | traceid=\"{}\" | line_format \"{{{{.body}}}}\"",
                escape_label_value(&job),
                trace_id
            )
        }
    }
}

/// Grafana Explore URL, padded by a day on each side of the run
pub fn explore_url(
    grafana: &GrafanaConfig,
    config: &LokiConfig,
    scope: &QueryScope,
    now: DateTime<Utc>,
) -> String {
    let from = scope.start_time - Duration::days(1);
    let to = scope.end_time.unwrap_or(now) + Duration::days(1);

    let panes = json!({
        EXPLORE_PANE: {
            "datasource": grafana.loki_datasource,
            "queries": [{
                "refId": "A",
                "expr": explore_logql(grafana.log_format, config, scope),
                "queryType": "range",
                "datasource": {"type": "loki", "uid": grafana.loki_datasource},
                "editorMode": "code",
            }],
            "range": {
                "from": from.timestamp_millis().to_string(),
                "to": to.timestamp_millis().to_string(),
            },
        }
    });

    let endpoint = format!("{}/explore", grafana.base_url.trim().trim_end_matches('/'));
    let params = [
        ("panes", panes.to_string()),
        ("schemaVersion", "1".to_string()),
        ("orgId", grafana.org_id.clone()),
    ];
    match reqwest::Url::parse_with_params(&endpoint, &params) {
        Ok(url) => url.to_string(),
        // validated config never gets here; keep the bare endpoint usable
        Err(_) => endpoint,
    }
}
