mod common;

use std::io::Read;

use chrono::{DateTime, TimeZone, Utc};
use common::MockLoki;
use runscope_logs::{CursorCache, LogStorageRetriever, QueryScope, RetrievalError};
use runscope_loki::{LokiConfig, LokiCredentials, LokiRetriever, Validation};

fn start() -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000, 0).unwrap()
}

fn start_nanos() -> u64 {
    1_700_000_000_000_000_000
}

fn scope() -> QueryScope {
    QueryScope::new("my-war/master", 7, "69a627b7", start())
}

fn retriever(url: &str, configure: impl FnOnce(&mut LokiConfig)) -> LokiRetriever {
    let mut config = LokiConfig::new(url);
    configure(&mut config);
    LokiRetriever::new(config).unwrap()
}

fn read_all(retriever: &LokiRetriever, scope: &QueryScope) -> String {
    let mut result = retriever.retrieve(scope, &CursorCache::new()).unwrap();
    let mut out = String::new();
    result.stream.read_to_string(&mut out).unwrap();
    result.stream.close();
    out
}

#[test]
fn test_query_carries_scope_auth_and_tenant() {
    let loki = MockLoki::with_lines(start_nanos(), 3);
    let retriever = retriever(&loki.url, |c| {
        c.credentials = Some(LokiCredentials::Bearer {
            token: "s3cret".to_string(),
        });
        c.tenant_id = Some("ci-team".to_string());
        c.service_namespace = Some("ci".to_string());
    });

    let out = read_all(&retriever, &scope().with_step("12"));
    assert_eq!(out, "line 0000\nline 0001\nline 0002\n");

    let requests = loki.range_requests();
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    assert_eq!(request.authorization.as_deref(), Some("Bearer s3cret"));
    assert_eq!(request.tenant.as_deref(), Some("ci-team"));
    assert_eq!(request.param("start"), Some("1700000000000000000"));
    assert_eq!(request.param("direction"), Some("forward"));
    assert_eq!(request.param("limit"), Some("1000"));
    assert_eq!(request.param("end"), None);
    let query = request.param("query").unwrap();
    assert!(query.starts_with("{service_namespace=\"ci\", service_name=\"jenkins\"}"));
    assert!(query.contains("ci_pipeline_id=\"my-war/master\""));
    assert!(query.contains("jenkins_pipeline_step_id=\"12\""));
}

#[test]
fn test_basic_and_api_key_auth_are_preemptive() {
    let loki = MockLoki::with_lines(start_nanos(), 1);
    let basic = retriever(&loki.url, |c| {
        c.credentials = Some(LokiCredentials::Basic {
            username: "admin".to_string(),
            password: "admin".to_string(),
        });
    });
    read_all(&basic, &scope());
    let api_key = retriever(&loki.url, |c| {
        c.credentials = Some(LokiCredentials::ApiKey {
            key: "glc_123".to_string(),
        });
    });
    read_all(&api_key, &scope());

    let auth: Vec<_> = loki
        .range_requests()
        .into_iter()
        .map(|r| r.authorization)
        .collect();
    assert_eq!(
        auth,
        vec![
            Some("Basic YWRtaW46YWRtaW4=".to_string()),
            Some("ApiKey glc_123".to_string()),
        ]
    );
}

#[test]
fn test_pages_until_short_page() {
    let loki = MockLoki::with_lines(start_nanos(), 2500);
    let retriever = retriever(&loki.url, |_| {});

    let out = read_all(&retriever, &scope());
    assert_eq!(out.lines().count(), 2500);
    assert!(out.ends_with("line 2499\n"));

    let starts: Vec<_> = loki
        .range_requests()
        .iter()
        .map(|r| r.param("start").unwrap().parse::<u64>().unwrap())
        .collect();
    assert_eq!(
        starts,
        vec![
            start_nanos(),
            start_nanos() + 999 * 1_000 + 1,
            start_nanos() + 1_999 * 1_000 + 1,
        ]
    );
}

#[test]
fn test_end_time_bounds_the_query() {
    let loki = MockLoki::with_lines(start_nanos(), 10);
    let retriever = retriever(&loki.url, |_| {});
    let end = Utc.timestamp_opt(1_700_000_000, 5_000).unwrap();

    let mut result = retriever
        .retrieve(&scope().with_end_time(end), &CursorCache::new())
        .unwrap();
    assert!(result.complete);
    let mut out = String::new();
    result.stream.read_to_string(&mut out).unwrap();

    assert_eq!(out.lines().count(), 5);
    assert_eq!(
        loki.range_requests()[0].param("end"),
        Some("1700000000000005000")
    );
}

#[test]
fn test_max_queries_truncates_with_marker() {
    let loki = MockLoki::with_lines(start_nanos(), 50);
    let retriever = retriever(&loki.url, |c| {
        c.page_size = 10;
        c.max_queries = 2;
    });

    let out = read_all(&retriever, &scope());
    let lines: Vec<_> = out.lines().collect();
    assert_eq!(lines.len(), 21);
    assert_eq!(lines[19], "line 0019");
    assert_eq!(lines[20], "…");
    assert_eq!(loki.range_requests().len(), 2);
}

#[test]
fn test_max_lines_without_marker() {
    let loki = MockLoki::with_lines(start_nanos(), 50);
    let retriever = retriever(&loki.url, |c| {
        c.page_size = 10;
        c.max_lines = 15;
        c.truncation_marker = false;
    });

    let out = read_all(&retriever, &scope());
    assert_eq!(out.lines().count(), 15);
    assert!(out.ends_with("line 0014\n"));
    assert_eq!(loki.range_requests().len(), 2);
}

#[test]
fn test_empty_window() {
    let loki = MockLoki::with_lines(start_nanos(), 0);
    let retriever = retriever(&loki.url, |_| {});

    let mut result = retriever.retrieve(&scope(), &CursorCache::new()).unwrap();
    assert_eq!(result.stream.reader().available().unwrap(), 0);
    let mut out = String::new();
    assert_eq!(result.stream.read_to_string(&mut out).unwrap(), 0);
    assert_eq!(loki.range_requests().len(), 1);
}

#[test]
fn test_backend_error_on_first_page_fails_retrieve() {
    let loki = MockLoki::with_lines(start_nanos(), 5);
    loki.fail_with(400, "parse error at line 1, col 9");
    let retriever = retriever(&loki.url, |_| {});

    match retriever.retrieve(&scope(), &CursorCache::new()) {
        Err(RetrievalError::BackendQuery { status, body }) => {
            assert_eq!(status, 400);
            assert!(body.contains("parse error"));
        }
        Err(other) => panic!("unexpected error: {}", other),
        Ok(_) => panic!("retrieve should fail"),
    }
}

#[test]
fn test_rejected_credentials_are_an_authentication_error() {
    let loki = MockLoki::with_lines(start_nanos(), 5);
    loki.fail_with(401, "no org id");
    let retriever = retriever(&loki.url, |_| {});

    assert!(matches!(
        retriever.retrieve(&scope(), &CursorCache::new()),
        Err(RetrievalError::Authentication(_))
    ));
}

#[test]
fn test_error_mid_stream_surfaces_on_read() {
    let loki = MockLoki::with_lines(start_nanos(), 30);
    let retriever = retriever(&loki.url, |c| c.page_size = 10);

    let mut result = retriever.retrieve(&scope(), &CursorCache::new()).unwrap();
    let mut first_page = vec![0u8; 100];
    result.stream.read_exact(&mut first_page).unwrap();
    loki.fail_with(503, "too many outstanding requests");

    let err = result.stream.read(&mut [0u8; 16]).unwrap_err();
    assert!(matches!(
        RetrievalError::from_io(&err),
        Some(RetrievalError::BackendQuery { status: 503, .. })
    ));
}

#[test]
fn test_unreachable_backend() {
    // nothing listens on the discard port
    let retriever = retriever("http://127.0.0.1:9", |c| c.timeout_secs = 2);
    assert!(matches!(
        retriever.retrieve(&scope(), &CursorCache::new()),
        Err(RetrievalError::BackendUnreachable { .. })
    ));
}

#[test]
fn test_resume_skips_server_side() {
    let loki = MockLoki::with_lines(start_nanos(), 6);
    let retriever = retriever(&loki.url, |c| c.page_size = 2);
    let cursors = CursorCache::new();

    let mut first = retriever.retrieve(&scope(), &cursors).unwrap();
    let mut head = vec![0u8; 30];
    first.stream.read_exact(&mut head).unwrap();
    first.stream.close();
    assert_eq!(String::from_utf8(head).unwrap(), "line 0000\nline 0001\nline 0002\n");
    let first_requests = loki.range_requests().len();

    let mut second = retriever.retrieve(&scope(), &cursors).unwrap();
    let mut rest = Vec::new();
    let offset = second.stream.write_log_to(30, &mut rest).unwrap();
    assert_eq!(String::from_utf8(rest).unwrap(), "line 0003\nline 0004\nline 0005\n");
    assert_eq!(offset, 60);

    let resumed: Vec<_> = loki.range_requests()[first_requests..]
        .iter()
        .map(|r| r.param("start").unwrap().to_string())
        .collect();
    // priming page, then straight past the cached line
    assert_eq!(resumed[0], start_nanos().to_string());
    assert_eq!(resumed[1], (start_nanos() + 2 * 1_000 + 1).to_string());
}

#[test]
fn test_header_and_backend_name() {
    let loki = MockLoki::with_lines(start_nanos(), 1);
    let plain = retriever(&loki.url, |_| {});
    assert_eq!(plain.backend_name(), "Loki");
    let result = plain.retrieve(&scope(), &CursorCache::new()).unwrap();
    assert_eq!(result.header.url, loki.url);
    assert!(!result.complete);
}

#[test]
fn test_check_setup() {
    let loki = MockLoki::with_lines(start_nanos(), 0);
    let retriever = retriever(&loki.url, |c| c.tenant_id = Some("ci".to_string()));

    let validations = retriever.check_setup();
    assert_eq!(validations.len(), 1);
    assert!(validations[0].is_ok(), "{}", validations[0]);
    let request = &loki.requests()[0];
    assert_eq!(request.path, "/loki/api/v1/format_query");
    assert_eq!(request.param("query"), Some("{foo=\"bar\"}"));
    assert_eq!(request.tenant.as_deref(), Some("ci"));

    loki.fail_with(401, "invalid token");
    match &retriever.check_setup()[..] {
        [Validation::Error(message)] => assert!(message.contains("rejected the credentials")),
        other => panic!("unexpected: {:?}", other),
    }
}

#[test]
fn test_invalid_config_rejected_before_any_request() {
    let mut config = LokiConfig::new("http://127.0.0.1:9");
    config.credentials = Some(LokiCredentials::ApiKey { key: String::new() });
    assert!(LokiRetriever::new(config).is_err());
}
