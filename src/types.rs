use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Name → value map threaded between statements of one run
pub type Variables = serde_json::Map<String, JsonValue>;

/* ===================== Run metadata keys ===================== */

pub const WORKFLOW_ID_KEY: &str = "workflow_id";
pub const RUN_ID_KEY: &str = "run_id";
pub const WORKFLOW_TYPE_KEY: &str = "workflow_type";
pub const ATTEMPT_KEY: &str = "attempt";
pub const WORKFLOW_STATUS_KEY: &str = "workflow_status";

/// Run-type tag written under `workflow_type` unless configured otherwise
pub const DEFAULT_WORKFLOW_TYPE: &str = "DSLWorkflow";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowStatus {
    Completed,
    Failed,
    Cancelled,
}

impl WorkflowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowStatus::Completed => "completed",
            WorkflowStatus::Failed => "failed",
            WorkflowStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
