use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single result row as returned by the API: column name to JSON value.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Remote execution state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionState {
    #[serde(rename = "QUERY_STATE_PENDING")]
    Pending,
    #[serde(rename = "QUERY_STATE_EXECUTING")]
    Executing,
    #[serde(rename = "QUERY_STATE_COMPLETED")]
    Completed,
    #[serde(rename = "QUERY_STATE_FAILED")]
    Failed,
    #[serde(rename = "QUERY_STATE_CANCELLED")]
    Cancelled,
}

impl ExecutionState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ExecutionState::Completed | ExecutionState::Failed | ExecutionState::Cancelled
        )
    }

    /// Cancelled executions are handled exactly like failed ones.
    pub fn is_failure(self) -> bool {
        matches!(self, ExecutionState::Failed | ExecutionState::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ExecutionState::Pending => "QUERY_STATE_PENDING",
            ExecutionState::Executing => "QUERY_STATE_EXECUTING",
            ExecutionState::Completed => "QUERY_STATE_COMPLETED",
            ExecutionState::Failed => "QUERY_STATE_FAILED",
            ExecutionState::Cancelled => "QUERY_STATE_CANCELLED",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct ExecuteRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query_parameters: Option<&'a serde_json::Map<String, serde_json::Value>>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ExecuteResponse {
    pub execution_id: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ExecutionStatusResponse {
    #[serde(default)]
    pub execution_id: Option<String>,
    #[serde(default)]
    pub query_id: Option<i64>,
    pub state: ExecutionState,
    #[serde(default)]
    pub submitted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub execution_started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub execution_ended_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub result_set_row_count: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ResultsResponse {
    pub result: ResultBody,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ResultBody {
    #[serde(default)]
    pub rows: Vec<Row>,
    #[serde(default)]
    pub metadata: Option<ResultMetadata>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ResultMetadata {
    #[serde(default)]
    pub row_count: Option<u64>,
}

/// Downloaded rows of a completed execution.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    pub rows: Vec<Row>,
    /// Row count reported by the API metadata, falling back to `rows.len()`.
    pub row_count: u64,
}

impl From<ResultsResponse> for ResultSet {
    fn from(response: ResultsResponse) -> Self {
        let rows = response.result.rows;
        let row_count = response
            .result
            .metadata
            .and_then(|m| m.row_count)
            .unwrap_or(rows.len() as u64);
        ResultSet { rows, row_count }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_response_with_timestamps() {
        let body = r#"{
            "execution_id": "01HKZ",
            "query_id": 5963629,
            "state": "QUERY_STATE_EXECUTING",
            "submitted_at": "2024-01-02T03:00:00.123Z",
            "execution_started_at": "2024-01-02T03:00:01Z"
        }"#;
        let status: ExecutionStatusResponse = serde_json::from_str(body).unwrap();
        assert_eq!(status.state, ExecutionState::Executing);
        assert!(status.submitted_at.is_some());
        assert!(status.execution_ended_at.is_none());
    }

    #[test]
    fn test_cancelled_counts_as_failure() {
        assert!(ExecutionState::Cancelled.is_failure());
        assert!(ExecutionState::Cancelled.is_terminal());
        assert!(!ExecutionState::Completed.is_failure());
        assert!(!ExecutionState::Pending.is_terminal());
    }

    #[test]
    fn test_result_set_prefers_metadata_row_count() {
        let body = r#"{"result": {"rows": [{"a": 1}], "metadata": {"row_count": 7}}}"#;
        let response: ResultsResponse = serde_json::from_str(body).unwrap();
        assert_eq!(ResultSet::from(response).row_count, 7);

        let body = r#"{"result": {"rows": [{"a": 1}, {"a": 2}]}}"#;
        let response: ResultsResponse = serde_json::from_str(body).unwrap();
        let set = ResultSet::from(response);
        assert_eq!(set.row_count, 2);
        assert_eq!(set.rows[1]["a"], serde_json::json!(2));
    }

    #[test]
    fn test_execute_response_ignores_initial_state() {
        let body = r#"{"execution_id": "01HKZ", "state": "QUERY_STATE_PENDING"}"#;
        let response: ExecuteResponse = serde_json::from_str(body).unwrap();
        assert_eq!(response.execution_id, "01HKZ");
    }
}
