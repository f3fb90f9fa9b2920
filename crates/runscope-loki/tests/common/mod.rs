//! In-process stand-in for Loki's HTTP API

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;
use serde_json::json;
use tiny_http::{Header, Response, Server, StatusCode};

/// One request as Loki saw it
#[derive(Clone, Debug)]
pub struct SeenRequest {
    pub path: String,
    pub params: Vec<(String, String)>,
    pub authorization: Option<String>,
    pub tenant: Option<String>,
}

impl SeenRequest {
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Clone, Debug)]
pub enum Behavior {
    /// Serve the stored lines
    Serve,
    /// Answer every request with this status and body
    Fail(u16, &'static str),
}

struct State {
    lines: Vec<(u64, String)>,
    behavior: Behavior,
    seen: Vec<SeenRequest>,
}

pub struct MockLoki {
    server: Arc<Server>,
    state: Arc<Mutex<State>>,
    handle: Option<JoinHandle<()>>,
    pub url: String,
}

impl MockLoki {
    pub fn start(lines: Vec<(u64, String)>) -> Self {
        let server = Arc::new(Server::http("127.0.0.1:0").expect("bind mock loki"));
        let addr = server.server_addr().to_ip().expect("tcp listener");
        let state = Arc::new(Mutex::new(State {
            lines,
            behavior: Behavior::Serve,
            seen: Vec::new(),
        }));

        let handle = {
            let server = Arc::clone(&server);
            let state = Arc::clone(&state);
            thread::spawn(move || {
                for request in server.incoming_requests() {
                    let (status, body) = handle(&request, &state);
                    let response = Response::from_string(body)
                        .with_status_code(StatusCode(status))
                        .with_header(
                            Header::from_bytes("Content-Type", "application/json")
                                .expect("static header"),
                        );
                    let _ = request.respond(response);
                }
            })
        };

        Self {
            server,
            state,
            handle: Some(handle),
            url: format!("http://{}", addr),
        }
    }

    /// `count` lines, one microsecond apart from `first_id`, as `line 0000`
    pub fn with_lines(first_id: u64, count: u64) -> Self {
        let lines = (0..count)
            .map(|i| (first_id + i * 1_000, format!("line {:04}", i)))
            .collect();
        Self::start(lines)
    }

    pub fn fail_with(&self, status: u16, body: &'static str) {
        self.state.lock().behavior = Behavior::Fail(status, body);
    }

    pub fn requests(&self) -> Vec<SeenRequest> {
        self.state.lock().seen.clone()
    }

    pub fn range_requests(&self) -> Vec<SeenRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.path == "/loki/api/v1/query_range")
            .collect()
    }
}

impl Drop for MockLoki {
    fn drop(&mut self) {
        self.server.unblock();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn header(request: &tiny_http::Request, name: &'static str) -> Option<String> {
    request
        .headers()
        .iter()
        .find(|h| h.field.equiv(name))
        .map(|h| h.value.as_str().to_string())
}

fn handle(request: &tiny_http::Request, state: &Mutex<State>) -> (u16, String) {
    let url = reqwest::Url::parse(&format!("http://loki{}", request.url())).expect("request url");
    let seen = SeenRequest {
        path: url.path().to_string(),
        params: url.query_pairs().into_owned().collect(),
        authorization: header(request, "Authorization"),
        tenant: header(request, "X-Scope-OrgID"),
    };

    let mut state = state.lock();
    state.seen.push(seen.clone());
    if let Behavior::Fail(status, body) = state.behavior {
        return (status, body.to_string());
    }

    match seen.path.as_str() {
        "/loki/api/v1/format_query" => (
            200,
            json!({"status": "success", "data": seen.param("query")}).to_string(),
        ),
        "/loki/api/v1/query_range" => {
            let start: u64 = seen.param("start").and_then(|s| s.parse().ok()).unwrap_or(0);
            let end: u64 = seen
                .param("end")
                .and_then(|s| s.parse().ok())
                .unwrap_or(u64::MAX);
            let limit: usize = seen
                .param("limit")
                .and_then(|s| s.parse().ok())
                .unwrap_or(100);
            let values: Vec<_> = state
                .lines
                .iter()
                .filter(|(id, _)| *id >= start && *id < end)
                .take(limit)
                .map(|(id, text)| json!([id.to_string(), text]))
                .collect();
            let body = json!({
                "status": "success",
                "data": {
                    "resultType": "streams",
                    "result": [{"stream": {"service_name": "jenkins"}, "values": values}],
                },
            });
            (200, body.to_string())
        }
        _ => (404, "404 page not found".to_string()),
    }
}
