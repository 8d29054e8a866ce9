use backoff::backoff::Backoff;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use analyst_common::{Clock, Error, Result, SystemClock};

use crate::config::ClientSettings;
use crate::retry::RetryPolicy;
use crate::transport::{ApiRequest, HttpTransport, Transport};
use crate::types::{
    ExecuteRequest, ExecuteResponse, ExecutionState, ExecutionStatusResponse, ResultSet,
    ResultsResponse,
};

/// How a bounded wait for completion ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Completed,
    /// The execution reached FAILED or CANCELLED.
    Failed(ExecutionState),
    TimedOut,
}

impl WaitOutcome {
    pub fn is_completed(self) -> bool {
        matches!(self, WaitOutcome::Completed)
    }

    /// Reason recorded in the ledger when the wait did not complete.
    pub fn failure_reason(self) -> Option<String> {
        match self {
            WaitOutcome::Completed => None,
            WaitOutcome::Failed(ExecutionState::Cancelled) => {
                Some("Query was cancelled".to_string())
            }
            WaitOutcome::Failed(_) => Some("Query failed".to_string()),
            WaitOutcome::TimedOut => Some("Query execution timeout".to_string()),
        }
    }
}

/// Client for the remote query execution API.
///
/// Constructed once per process invocation and shared by reference; there is
/// no process-global instance.
pub struct RemoteQueryClient {
    transport: Arc<dyn Transport>,
    retry: RetryPolicy,
    clock: Arc<dyn Clock>,
}

impl RemoteQueryClient {
    pub fn new(transport: Arc<dyn Transport>, retry: RetryPolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            transport,
            retry,
            clock,
        }
    }

    /// Builds an HTTP-backed client. Fails fast when the API key is missing.
    pub fn from_settings(settings: &ClientSettings) -> Result<Self> {
        let transport = HttpTransport::new(settings)?;
        Ok(Self::new(
            Arc::new(transport),
            settings.retry.clone(),
            Arc::new(SystemClock),
        ))
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    /// Starts a new remote execution and returns its id.
    ///
    /// Not idempotent: every successful call creates another remote execution.
    #[instrument(skip(self, parameters))]
    pub async fn submit(
        &self,
        query_id: i64,
        parameters: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<String> {
        let body = ExecuteRequest {
            query_parameters: (!parameters.is_empty()).then_some(parameters),
        };
        let body = serde_json::to_value(&body)
            .map_err(|e| Error::InvalidData(format!("failed to encode query parameters: {e}")))?;
        let response: ExecuteResponse = self
            .call(ApiRequest::post(format!("/query/{query_id}/execute"), body))
            .await?;
        info!(query_id, execution_id = %response.execution_id, "query execution started");
        Ok(response.execution_id)
    }

    pub async fn poll_status(&self, execution_id: &str) -> Result<ExecutionStatusResponse> {
        self.call(ApiRequest::get(format!("/execution/{execution_id}/status")))
            .await
    }

    /// Downloads results. Only meaningful after the execution was observed COMPLETED.
    pub async fn fetch_results(&self, execution_id: &str) -> Result<ResultSet> {
        let response: ResultsResponse = self
            .call(ApiRequest::get(format!("/execution/{execution_id}/results")))
            .await?;
        Ok(response.into())
    }

    /// Polls until the execution is terminal or `timeout` elapses.
    ///
    /// Returns `true` only for COMPLETED.
    pub async fn wait_until_done(
        &self,
        execution_id: &str,
        timeout: Duration,
        poll_interval: Duration,
    ) -> Result<bool> {
        Ok(self
            .wait_for_terminal(execution_id, timeout, poll_interval)
            .await?
            .is_completed())
    }

    #[instrument(skip(self))]
    pub async fn wait_for_terminal(
        &self,
        execution_id: &str,
        timeout: Duration,
        poll_interval: Duration,
    ) -> Result<WaitOutcome> {
        let started = self.clock.now();

        while self.clock.now().duration_since(started) < timeout {
            let status = self.poll_status(execution_id).await?;
            debug!(execution_id, state = status.state.as_str(), "execution status");

            match status.state {
                ExecutionState::Completed => return Ok(WaitOutcome::Completed),
                state if state.is_failure() => {
                    warn!(execution_id, state = state.as_str(), "query execution failed");
                    return Ok(WaitOutcome::Failed(state));
                }
                _ => self.clock.sleep(poll_interval).await,
            }
        }

        warn!(
            execution_id,
            timeout_secs = timeout.as_secs(),
            "query execution did not complete in time"
        );
        Ok(WaitOutcome::TimedOut)
    }

    /// Sends one request under the retry policy and decodes a 2xx body.
    async fn call<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T> {
        let mut backoff = self.retry.backoff();
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            let (status, failure) = match self.transport.send(&request).await {
                Ok(response) if response.is_success() => {
                    match serde_json::from_str::<T>(&response.body) {
                        Ok(decoded) => return Ok(decoded),
                        Err(e) => (
                            Some(response.status),
                            format!("malformed response body: {e}"),
                        ),
                    }
                }
                Ok(response) if response.status == 429 => (
                    Some(429),
                    format!("HTTP 429: rate limited - {}", response.body),
                ),
                Ok(response) => (
                    Some(response.status),
                    format!(
                        "HTTP {}: {} - {}",
                        response.status, response.reason, response.body
                    ),
                ),
                Err(e) => (None, format!("request failed: {e}")),
            };

            let delay = if attempt <= self.retry.max_retries {
                backoff.next_backoff()
            } else {
                None
            };
            match delay {
                Some(delay) => {
                    warn!(
                        method = %request.method,
                        path = %request.path,
                        attempt,
                        max_retries = self.retry.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %failure,
                        "remote call failed, retrying"
                    );
                    self.clock.sleep(delay).await;
                }
                None => return Err(Error::remote(status, failure)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Scripted, ScriptedTransport};
    use crate::transport::{ApiResponse, Method, TransportError};
    use analyst_common::ManualClock;
    use chrono::Utc;
    use serde_json::json;

    fn client(transport: &Arc<ScriptedTransport>, clock: &Arc<ManualClock>) -> RemoteQueryClient {
        RemoteQueryClient::new(transport.clone(), RetryPolicy::default(), clock.clone())
    }

    fn state(state: &str) -> Scripted {
        Ok(ApiResponse::json(json!({ "state": state })))
    }

    fn params() -> serde_json::Map<String, serde_json::Value> {
        let mut map = serde_json::Map::new();
        map.insert("p_date".to_string(), json!("2024-01-01"));
        map
    }

    #[tokio::test]
    async fn test_two_failures_then_success_backs_off_1s_then_2s() {
        let transport = Arc::new(ScriptedTransport::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let path = "/query/5963629/execute";
        transport.push(Method::Post, path, Ok(ApiResponse::error(500, "boom")));
        transport.push(Method::Post, path, Ok(ApiResponse::error(502, "bad gateway")));
        transport.push(
            Method::Post,
            path,
            Ok(ApiResponse::json(
                json!({"execution_id": "E1", "state": "QUERY_STATE_PENDING"}),
            )),
        );

        let id = client(&transport, &clock).submit(5963629, &params()).await.unwrap();

        assert_eq!(id, "E1");
        assert_eq!(transport.calls(Method::Post, path), 3);
        assert_eq!(
            clock.sleeps(),
            vec![Duration::from_millis(1000), Duration::from_millis(2000)]
        );
    }

    #[tokio::test]
    async fn test_submit_sends_query_parameters() {
        let transport = Arc::new(ScriptedTransport::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        transport.push(
            Method::Post,
            "/query/1/execute",
            Ok(ApiResponse::json(json!({"execution_id": "E9"}))),
        );

        client(&transport, &clock).submit(1, &params()).await.unwrap();

        let sent = transport.requests();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].body, Some(json!({"query_parameters": {"p_date": "2024-01-01"}})));
    }

    #[tokio::test]
    async fn test_rate_limit_is_retried_on_same_schedule() {
        let transport = Arc::new(ScriptedTransport::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let path = "/execution/E1/status";
        transport.push(Method::Get, path, Ok(ApiResponse::error(429, "slow down")));
        transport.push(Method::Get, path, state("QUERY_STATE_EXECUTING"));

        let status = client(&transport, &clock).poll_status("E1").await.unwrap();

        assert_eq!(status.state, ExecutionState::Executing);
        assert_eq!(clock.sleeps(), vec![Duration::from_millis(1000)]);
    }

    #[tokio::test]
    async fn test_exhausted_retries_surface_last_failure() {
        let transport = Arc::new(ScriptedTransport::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let path = "/execution/E1/results";
        transport.push(Method::Get, path, Err(TransportError("connection refused".into())));
        transport.push(Method::Get, path, Ok(ApiResponse::error(500, "first")));
        transport.push(Method::Get, path, Ok(ApiResponse::error(503, "second")));
        transport.push(Method::Get, path, Ok(ApiResponse::error(504, "last")));

        let err = client(&transport, &clock).fetch_results("E1").await.unwrap_err();

        match err {
            Error::Remote { status, message } => {
                assert_eq!(status, Some(504));
                assert!(message.contains("last"), "unexpected message: {message}");
            }
            other => panic!("expected remote error, got {other:?}"),
        }
        assert_eq!(transport.calls(Method::Get, path), 4);
        assert_eq!(
            clock.sleeps(),
            vec![
                Duration::from_millis(1000),
                Duration::from_millis(2000),
                Duration::from_millis(4000)
            ]
        );
    }

    #[tokio::test]
    async fn test_network_failures_are_retried() {
        let transport = Arc::new(ScriptedTransport::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let path = "/execution/E1/status";
        transport.push(Method::Get, path, Err(TransportError("reset by peer".into())));
        transport.push(Method::Get, path, state("QUERY_STATE_COMPLETED"));

        let status = client(&transport, &clock).poll_status("E1").await.unwrap();
        assert_eq!(status.state, ExecutionState::Completed);
        assert_eq!(transport.calls(Method::Get, path), 2);
    }

    #[tokio::test]
    async fn test_fetch_results_reads_rows_and_count() {
        let transport = Arc::new(ScriptedTransport::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        transport.push(
            Method::Get,
            "/execution/E1/results",
            Ok(ApiResponse::json(json!({
                "execution_id": "E1",
                "result": {
                    "rows": [{"date": "2024-01-01", "symbol": "WLD", "close_price": 2.1}],
                    "metadata": {"row_count": 1, "column_names": ["date", "symbol", "close_price"]}
                }
            }))),
        );

        let set = client(&transport, &clock).fetch_results("E1").await.unwrap();
        assert_eq!(set.row_count, 1);
        assert_eq!(set.rows[0]["symbol"], json!("WLD"));
    }

    #[tokio::test]
    async fn test_wait_until_done_completed() {
        let transport = Arc::new(ScriptedTransport::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let path = "/execution/E1/status";
        transport.push(Method::Get, path, state("QUERY_STATE_PENDING"));
        transport.push(Method::Get, path, state("QUERY_STATE_EXECUTING"));
        transport.push(Method::Get, path, state("QUERY_STATE_COMPLETED"));

        let done = client(&transport, &clock)
            .wait_until_done("E1", Duration::from_secs(300), Duration::from_secs(5))
            .await
            .unwrap();

        assert!(done);
        assert_eq!(clock.sleeps(), vec![Duration::from_secs(5), Duration::from_secs(5)]);
    }

    #[tokio::test]
    async fn test_wait_until_done_failed_and_cancelled_return_false() {
        for terminal in ["QUERY_STATE_FAILED", "QUERY_STATE_CANCELLED"] {
            let transport = Arc::new(ScriptedTransport::new());
            let clock = Arc::new(ManualClock::new(Utc::now()));
            transport.push(Method::Get, "/execution/E1/status", state(terminal));

            let outcome = client(&transport, &clock)
                .wait_for_terminal("E1", Duration::from_secs(300), Duration::from_secs(5))
                .await
                .unwrap();

            assert!(matches!(outcome, WaitOutcome::Failed(_)), "{terminal}");
            assert!(outcome.failure_reason().is_some());
        }
    }

    #[tokio::test]
    async fn test_wait_until_done_times_out_without_error() {
        let transport = Arc::new(ScriptedTransport::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        transport.set_default(
            Method::Get,
            "/execution/E1/status",
            state("QUERY_STATE_EXECUTING"),
        );

        let outcome = client(&transport, &clock)
            .wait_for_terminal("E1", Duration::from_secs(10), Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(outcome, WaitOutcome::TimedOut);
        assert_eq!(transport.calls(Method::Get, "/execution/E1/status"), 2);
        assert_eq!(clock.elapsed(), Duration::from_secs(10));
        assert_eq!(outcome.failure_reason().as_deref(), Some("Query execution timeout"));
    }

    #[tokio::test]
    async fn test_retry_budget_comes_from_policy() {
        let transport = Arc::new(ScriptedTransport::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let path = "/execution/E1/status";
        transport.set_default(Method::Get, path, Ok(ApiResponse::error(500, "down")));

        let once =
            RemoteQueryClient::new(transport.clone(), RetryPolicy::none(), clock.clone());
        assert!(once.poll_status("E1").await.is_err());
        assert_eq!(transport.calls(Method::Get, path), 1);
        assert!(clock.sleeps().is_empty());

        let policy = RetryPolicy {
            max_retries: 5,
            ..RetryPolicy::default()
        };
        let patient = RemoteQueryClient::new(transport.clone(), policy, clock.clone());
        assert!(patient.poll_status("E1").await.is_err());
        assert_eq!(transport.calls(Method::Get, path), 7);
        assert_eq!(
            clock.sleeps(),
            [1000, 2000, 4000, 8000, 8000]
                .map(Duration::from_millis)
                .to_vec()
        );
    }
}
