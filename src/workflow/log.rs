//! Execution log records written after each workflow run

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::agent::RunOutcome;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionLog {
    pub workflow_name: String,
    /// RFC 3339
    pub start_time: String,
    /// RFC 3339
    pub end_time: String,
    pub duration_seconds: f64,
    pub success: bool,
    pub result: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExecutionLog {
    pub fn from_outcome(
        workflow_name: impl Into<String>,
        started: DateTime<Utc>,
        finished: DateTime<Utc>,
        outcome: &RunOutcome,
    ) -> Self {
        let duration_seconds = (finished - started).num_milliseconds().max(0) as f64 / 1000.0;
        Self {
            workflow_name: workflow_name.into(),
            start_time: started.to_rfc3339(),
            end_time: finished.to_rfc3339(),
            duration_seconds,
            success: outcome.success,
            result: outcome.response_text.clone(),
            error: outcome.error_message(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{ExecutionState, Termination};
    use chrono::Duration;

    #[test]
    fn test_from_successful_outcome() {
        let mut state = ExecutionState::new("Who's the queen?");
        state.set_response("Queen Camilla is queen consort").unwrap();
        let outcome = state.into_outcome(Termination::Satisfied, None);

        let start = Utc::now();
        let log = ExecutionLog::from_outcome("Queen Facts", start, start + Duration::milliseconds(2500), &outcome);
        assert_eq!(log.workflow_name, "Queen Facts");
        assert_eq!(log.duration_seconds, 2.5);
        assert!(log.success);
        assert!(log.error.is_none());

        let json = serde_json::to_value(&log).unwrap();
        assert!(json.get("error").is_none());
    }

    #[test]
    fn test_forced_termination_carries_error() {
        let outcome = ExecutionState::new("objective").into_outcome(Termination::StepCeiling, None);
        let now = Utc::now();
        let log = ExecutionLog::from_outcome("wf", now, now, &outcome);
        assert!(!log.success);
        assert_eq!(log.error.as_deref(), Some("Step ceiling reached"));
    }
}
