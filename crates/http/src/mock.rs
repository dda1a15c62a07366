//! Scripted transport and navigator for exercising services without a network.

use agentdesk_core::{Navigator, Route};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use crate::transport::*;

#[derive(Debug, Clone)]
enum Reply {
    Body(u16, Vec<u8>),
    Fail(String),
}

type RouteKey = (Method, String);

/// Replies are matched by method and by the longest registered path the request
/// URL ends with. Queued replies are consumed first, then the sticky reply;
/// anything else gets a 404.
#[derive(Default)]
pub struct MockTransport {
    queued: Mutex<HashMap<RouteKey, VecDeque<Reply>>>,
    sticky: Mutex<HashMap<RouteKey, Reply>>,
    requests: Mutex<Vec<HttpRequest>>,
    delay: Option<Duration>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn reply(&self, method: Method, path: &str, status: u16, body: Value) {
        self.push(method, path, Reply::Body(status, body.to_string().into_bytes()));
    }

    pub fn reply_raw(&self, method: Method, path: &str, status: u16, body: &[u8]) {
        self.push(method, path, Reply::Body(status, body.to_vec()));
    }

    pub fn fail(&self, method: Method, path: &str, message: &str) {
        self.push(method, path, Reply::Fail(message.to_string()));
    }

    pub fn always(&self, method: Method, path: &str, status: u16, body: Value) {
        self.sticky.lock().insert(
            (method, path.to_string()),
            Reply::Body(status, body.to_string().into_bytes()),
        );
    }

    pub fn always_fail(&self, method: Method, path: &str, message: &str) {
        self.sticky
            .lock()
            .insert((method, path.to_string()), Reply::Fail(message.to_string()));
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().clone()
    }

    pub fn count(&self, method: Method, path: &str) -> usize {
        self.requests
            .lock()
            .iter()
            .filter(|r| r.method == method && r.url.ends_with(path))
            .count()
    }

    fn push(&self, method: Method, path: &str, reply: Reply) {
        self.queued
            .lock()
            .entry((method, path.to_string()))
            .or_default()
            .push_back(reply);
    }

    fn best_key<'a, I>(keys: I, method: Method, url: &str) -> Option<RouteKey>
    where
        I: Iterator<Item = &'a RouteKey>,
    {
        keys.filter(|(m, path)| *m == method && url.ends_with(path.as_str()))
            .max_by_key(|(_, path)| path.len())
            .cloned()
    }

    fn next_reply(&self, method: Method, url: &str) -> Reply {
        {
            let mut queued = self.queued.lock();
            let key = Self::best_key(
                queued.iter().filter(|(_, q)| !q.is_empty()).map(|(k, _)| k),
                method,
                url,
            );
            if let Some(reply) = key.and_then(|k| queued.get_mut(&k)).and_then(|q| q.pop_front()) {
                return reply;
            }
        }

        let sticky = self.sticky.lock();
        Self::best_key(sticky.keys(), method, url)
            .and_then(|k| sticky.get(&k).cloned())
            .unwrap_or_else(|| Reply::Body(404, br#"{"detail":"Not found."}"#.to_vec()))
    }
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let reply = self.next_reply(request.method, &request.url);
        self.requests.lock().push(request);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match reply {
            Reply::Body(status, body) => Ok(HttpResponse { status, body }),
            Reply::Fail(message) => Err(TransportError(message)),
        }
    }
}

#[derive(Debug, Default)]
pub struct RecordingNavigator {
    routes: Mutex<Vec<Route>>,
}

impl RecordingNavigator {
    pub fn routes(&self) -> Vec<Route> {
        self.routes.lock().clone()
    }
}

impl Navigator for RecordingNavigator {
    fn navigate(&self, route: Route) {
        self.routes.lock().push(route);
    }
}
