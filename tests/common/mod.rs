#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::fs;
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use maimai_tracker::config::ClientConfig;
use maimai_tracker::error::ApiError;
use maimai_tracker::fetcher::{HttpRequest, HttpResponse, Transport};
use maimai_tracker::storage::SessionStore;
use maimai_tracker::TrackerClient;
use serde_json::{json, Value};

pub const BASE_URL: &str = "http://api.test/api/v0/";
pub const SITE_URL: &str = "http://site.test";
pub const WAIT: Duration = Duration::from_secs(5);

pub fn read_fixture(name: &str) -> String {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests");
    path.push("fixtures");
    path.push(name);
    fs::read_to_string(path).expect("fixture file should be readable")
}

/// Fixture file parsed as the `data` payload of a successful envelope.
pub fn fixture_data(name: &str) -> Value {
    serde_json::from_str(&read_fixture(name)).expect("fixture should be valid json")
}

#[derive(Clone)]
pub struct Reply {
    status: u16,
    body: String,
    error: Option<ApiError>,
    gate: Option<Arc<Mutex<Receiver<()>>>>,
    delay: Option<Duration>,
}

impl Reply {
    pub fn ok(data: Value) -> Self {
        Self::raw(200, json!({ "success": true, "message": "ok", "data": data }).to_string())
    }

    pub fn fail(status: u16, message: &str) -> Self {
        Self::raw(status, json!({ "success": false, "message": message }).to_string())
    }

    pub fn raw(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
            error: None,
            gate: None,
            delay: None,
        }
    }

    pub fn transport(message: &str) -> Self {
        Self {
            error: Some(ApiError::Transport(message.to_string())),
            ..Self::raw(0, "")
        }
    }

    /// The reply is held back until the returned sender fires (or drops).
    pub fn gated(mut self) -> (Self, Sender<()>) {
        let (tx, rx) = mpsc::channel();
        self.gate = Some(Arc::new(Mutex::new(rx)));
        (self, tx)
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

/// Scripted transport. Replies are queued per route (path after the base
/// URL, query included); the last reply of a route is repeated forever.
/// Unknown routes answer 404.
#[derive(Default)]
pub struct MockTransport {
    routes: Mutex<HashMap<String, VecDeque<Reply>>>,
    calls: Mutex<Vec<HttpRequest>>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn on(&self, route: &str, reply: Reply) -> &Self {
        self.routes
            .lock()
            .expect("routes lock")
            .entry(route.to_string())
            .or_default()
            .push_back(reply);
        self
    }

    pub fn calls(&self) -> Vec<HttpRequest> {
        self.calls.lock().expect("calls lock").clone()
    }

    /// Requests to `route`, with or without a query string.
    pub fn count(&self, route: &str) -> usize {
        self.calls()
            .iter()
            .filter(|req| {
                let full = route_of(&req.url);
                full == route || full.split('?').next() == Some(route)
            })
            .count()
    }

    /// Polls until `route` has seen at least `n` requests.
    pub fn wait_for_count(&self, route: &str, n: usize) -> bool {
        let deadline = std::time::Instant::now() + WAIT;
        while std::time::Instant::now() < deadline {
            if self.count(route) >= n {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }

    pub fn last_request(&self, route: &str) -> Option<HttpRequest> {
        self.calls()
            .into_iter()
            .rev()
            .find(|req| route_of(&req.url).split('?').next() == Some(route))
    }

    fn next_reply(&self, route: &str) -> Option<Reply> {
        let mut routes = self.routes.lock().expect("routes lock");
        let path = route.split('?').next().unwrap_or(route);
        let key = if routes.contains_key(route) { route } else { path };
        let queue = routes.get_mut(key)?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }
}

fn route_of(url: &str) -> String {
    url.strip_prefix(BASE_URL).unwrap_or(url).to_string()
}

impl Transport for MockTransport {
    fn send(&self, request: HttpRequest) -> Result<HttpResponse, ApiError> {
        let route = route_of(&request.url);
        self.calls.lock().expect("calls lock").push(request);

        let Some(reply) = self.next_reply(&route) else {
            return Ok(HttpResponse {
                status: 404,
                body: json!({ "success": false, "message": "not found" }).to_string(),
            });
        };
        if let Some(gate) = &reply.gate {
            let _ = gate.lock().expect("gate lock").recv_timeout(WAIT);
        }
        if let Some(delay) = reply.delay {
            thread::sleep(delay);
        }
        match reply.error {
            Some(err) => Err(err),
            None => Ok(HttpResponse {
                status: reply.status,
                body: reply.body,
            }),
        }
    }
}

pub fn test_config() -> ClientConfig {
    ClientConfig {
        api_base_url: BASE_URL.to_string(),
        site_url: SITE_URL.to_string(),
        storage_dir: None,
        production: true,
        request_timeout: Duration::from_secs(1),
        version_poll_interval: Duration::from_millis(20),
        error_retry_count: 2,
        error_retry_interval: Duration::from_millis(10),
        dedupe_interval: Duration::from_millis(0),
        fetch_parallelism: 4,
    }
}

pub fn client_with(transport: &Arc<MockTransport>, config: ClientConfig) -> TrackerClient {
    let transport: Arc<dyn Transport> = transport.clone();
    TrackerClient::with_transport(config, transport, SessionStore::in_memory())
}

pub fn client(transport: &Arc<MockTransport>) -> TrackerClient {
    client_with(transport, test_config())
}

pub fn logged_in_client(transport: &Arc<MockTransport>) -> TrackerClient {
    let client = client(transport);
    client
        .session()
        .set_token("test-token")
        .expect("in-memory session");
    client
}
