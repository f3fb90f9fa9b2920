//! Loki backend for runscope
//!
//! Pipeline log lines are stored in Loki with the pipeline id, run number,
//! trace id and step id as structured metadata. [`LokiRetriever`] pages
//! through them with `query_range` and hands out resumable byte streams.

mod client;
mod config;
mod query;
mod response;
mod retriever;
mod visualization;

pub use client::{LokiPageFetcher, TENANT_HEADER, authenticate, build_http_client};
pub use config::{ConfigError, GrafanaConfig, LokiConfig, LokiCredentials, LokiLogFormat};
pub use query::{
    FORMAT_QUERY_PATH, LABEL_SERVICE_NAME, LABEL_SERVICE_NAMESPACE, LokiQueryParameters,
    META_DATA_CI_PIPELINE_ID, META_DATA_CI_PIPELINE_RUN_NUMBER, META_DATA_PIPELINE_STEP_ID,
    META_DATA_TRACE_ID, QUERY_RANGE_PATH, escape_label_value,
};
pub use response::parse_query_range;
pub use retriever::{LokiRetriever, Validation};
pub use visualization::{explore_logql, explore_url, logs_view_header};
