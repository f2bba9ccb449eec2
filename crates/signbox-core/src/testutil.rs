//! In-memory transport for exercising the request layer without a server.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::StatusCode;

use crate::api::{ApiError, ApiRequest, ApiResponse, Transport};

#[derive(Clone)]
enum Scripted {
    Respond(u16, String),
    Fail(String),
    BadUrl(String),
}

type SendHook = Box<dyn Fn() + Send + Sync>;

/// Replays canned responses per request path and records every request.
///
/// Responses queued for a path are consumed in order; the last one repeats.
/// `send` yields once before answering so concurrent callers interleave.
#[derive(Default)]
pub struct ScriptedTransport {
    routes: Mutex<HashMap<String, VecDeque<Scripted>>>,
    requests: Mutex<Vec<ApiRequest>>,
    hook: Mutex<Option<SendHook>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn respond(&self, path: &str, status: u16, body: &str) {
        self.push(path, Scripted::Respond(status, body.to_string()));
    }

    pub fn fail(&self, path: &str, message: &str) {
        self.push(path, Scripted::Fail(message.to_string()));
    }

    /// Answer `path` as if its URL could not be built.
    pub fn reject_url(&self, path: &str, message: &str) {
        self.push(path, Scripted::BadUrl(message.to_string()));
    }

    /// Run `hook` each time a request is sent, before it is answered.
    pub fn on_send(&self, hook: impl Fn() + Send + Sync + 'static) {
        *self.hook.lock() = Some(Box::new(hook));
    }

    pub fn requests(&self) -> Vec<ApiRequest> {
        self.requests.lock().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn calls_to(&self, path: &str) -> usize {
        self.requests.lock().iter().filter(|r| r.path == path).count()
    }

    fn push(&self, path: &str, scripted: Scripted) {
        self.routes
            .lock()
            .entry(path.to_string())
            .or_default()
            .push_back(scripted);
    }

    fn next_for(&self, path: &str) -> Option<Scripted> {
        let mut routes = self.routes.lock();
        let queue = routes.get_mut(path)?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
        let path = request.path.clone();
        self.requests.lock().push(request);
        {
            let hook = self.hook.lock();
            if let Some(ref hook) = *hook {
                hook();
            }
        }

        tokio::task::yield_now().await;

        match self.next_for(&path) {
            Some(Scripted::Respond(status, body)) => {
                let status = StatusCode::from_u16(status)
                    .map_err(|e| ApiError::Transport(format!("bad scripted status: {}", e)))?;
                Ok(ApiResponse::new(status, body.into_bytes()))
            }
            Some(Scripted::Fail(message)) => Err(ApiError::Transport(message)),
            Some(Scripted::BadUrl(message)) => Err(ApiError::InvalidUrl(message)),
            None => Err(ApiError::Transport(format!("no scripted response for {}", path))),
        }
    }
}
