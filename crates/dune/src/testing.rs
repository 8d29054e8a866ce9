//! In-process transport for driving [`crate::RemoteQueryClient`] in tests.
//!
//! Responses are queued per `(method, path)`. When a queue runs dry the
//! route's default response is used, or a 404 if none was set.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use crate::transport::{ApiRequest, ApiResponse, Method, Transport, TransportError};

pub type Scripted = Result<ApiResponse, TransportError>;

#[derive(Default)]
struct Routes {
    queued: HashMap<(Method, String), VecDeque<Scripted>>,
    defaults: HashMap<(Method, String), Scripted>,
    log: Vec<ApiRequest>,
}

#[derive(Default)]
pub struct ScriptedTransport {
    routes: Mutex<Routes>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues one response for the route.
    pub fn push(&self, method: Method, path: &str, response: Scripted) {
        let mut routes = self.routes.lock().unwrap();
        routes
            .queued
            .entry((method, path.to_string()))
            .or_default()
            .push_back(response);
    }

    /// Response returned once the route's queue is empty.
    pub fn set_default(&self, method: Method, path: &str, response: Scripted) {
        let mut routes = self.routes.lock().unwrap();
        routes.defaults.insert((method, path.to_string()), response);
    }

    pub fn requests(&self) -> Vec<ApiRequest> {
        self.routes.lock().unwrap().log.clone()
    }

    pub fn calls(&self, method: Method, path: &str) -> usize {
        self.routes
            .lock()
            .unwrap()
            .log
            .iter()
            .filter(|r| r.method == method && r.path == path)
            .count()
    }

    pub fn accept_execution(&self, query_id: i64, execution_id: &str) {
        self.push(
            Method::Post,
            &format!("/query/{query_id}/execute"),
            Ok(ApiResponse::json(serde_json::json!({
                "execution_id": execution_id,
                "state": "QUERY_STATE_PENDING"
            }))),
        );
    }

    pub fn report_state(&self, execution_id: &str, state: &str) {
        self.push(
            Method::Get,
            &format!("/execution/{execution_id}/status"),
            Ok(ApiResponse::json(serde_json::json!({
                "execution_id": execution_id,
                "state": state
            }))),
        );
    }

    pub fn serve_rows(&self, execution_id: &str, rows: serde_json::Value) {
        let row_count = rows.as_array().map(Vec::len).unwrap_or(0);
        self.push(
            Method::Get,
            &format!("/execution/{execution_id}/results"),
            Ok(ApiResponse::json(serde_json::json!({
                "execution_id": execution_id,
                "state": "QUERY_STATE_COMPLETED",
                "result": {
                    "rows": rows,
                    "metadata": {"row_count": row_count}
                }
            }))),
        );
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, TransportError> {
        let mut routes = self.routes.lock().unwrap();
        routes.log.push(request.clone());
        let key = (request.method, request.path.clone());
        if let Some(next) = routes.queued.get_mut(&key).and_then(VecDeque::pop_front) {
            return next;
        }
        match routes.defaults.get(&key) {
            Some(response) => response.clone(),
            None => Ok(ApiResponse::error(404, "no scripted response")),
        }
    }
}

impl ApiResponse {
    pub fn json(body: serde_json::Value) -> Self {
        Self {
            status: 200,
            reason: "OK".to_string(),
            body: body.to_string(),
        }
    }

    pub fn error(status: u16, body: &str) -> Self {
        Self {
            status,
            reason: String::new(),
            body: body.to_string(),
        }
    }
}
