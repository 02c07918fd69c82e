use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::db::types::{ExecutionStatus, VariantKind};
use crate::services::execution_engine::Direction;
use crate::services::scoring::{ElapsedBreakdown, ScoreSummary, TaskStatus};

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct StartByNumber {
    #[validate(range(min = 1, message = "number must be positive"))]
    pub(crate) number: i64,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct SaveAnswer {
    #[serde(alias = "taskId")]
    #[validate(length(min = 1, message = "task_id must not be empty"))]
    pub(crate) task_id: String,
    #[serde(default)]
    pub(crate) answer: String,
    #[serde(default)]
    #[serde(alias = "currentTaskOrder")]
    pub(crate) current_task_order: Option<i32>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum NavigationDirection {
    Next,
    Prev,
}

impl From<NavigationDirection> for Direction {
    fn from(value: NavigationDirection) -> Self {
        match value {
            NavigationDirection::Next => Direction::Next,
            NavigationDirection::Prev => Direction::Prev,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct Navigate {
    pub(crate) direction: NavigationDirection,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct CompleteRequest {
    #[serde(default)]
    pub(crate) answers: Option<HashMap<String, String>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ListExecutionsQuery {
    #[serde(default)]
    pub(crate) status: Option<ExecutionStatus>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ExecutionTaskView {
    pub(crate) order: i32,
    pub(crate) task_id: String,
    pub(crate) text: String,
    pub(crate) answer: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct ExecutionView {
    pub(crate) id: String,
    pub(crate) variant_id: String,
    pub(crate) variant_name: String,
    pub(crate) variant_kind: VariantKind,
    pub(crate) assignment_id: Option<String>,
    pub(crate) status: ExecutionStatus,
    pub(crate) started_at: Option<String>,
    pub(crate) completed_at: Option<String>,
    pub(crate) time_limit_minutes: Option<i32>,
    pub(crate) remaining_seconds: Option<i64>,
    pub(crate) current_task_order: i32,
    pub(crate) total_tasks: usize,
    pub(crate) tasks: Vec<ExecutionTaskView>,
}

#[derive(Debug, Serialize)]
pub(crate) struct NavigationResponse {
    pub(crate) current_task_order: i32,
    /// `first` or `last` when the move hit a boundary and nothing changed.
    pub(crate) boundary: Option<&'static str>,
}

#[derive(Debug, Serialize)]
pub(crate) struct SaveAnswerResponse {
    pub(crate) task_id: String,
    pub(crate) current_task_order: i32,
    pub(crate) answered_count: usize,
}

#[derive(Debug, Serialize)]
pub(crate) struct ResultTaskView {
    pub(crate) order: i32,
    pub(crate) task_id: String,
    pub(crate) text: String,
    pub(crate) answer: String,
    pub(crate) correct_answer: String,
    pub(crate) status: TaskStatus,
}

#[derive(Debug, Serialize)]
pub(crate) struct ExecutionResult {
    pub(crate) execution_id: String,
    pub(crate) variant_id: String,
    pub(crate) variant_name: String,
    pub(crate) status: ExecutionStatus,
    pub(crate) started_at: Option<String>,
    pub(crate) completed_at: Option<String>,
    #[serde(flatten)]
    pub(crate) score: ScoreSummary,
    pub(crate) elapsed: Option<ElapsedBreakdown>,
    pub(crate) tasks: Vec<ResultTaskView>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ExecutionSummary {
    pub(crate) id: String,
    pub(crate) variant_id: String,
    pub(crate) variant_name: String,
    pub(crate) variant_number: i64,
    pub(crate) variant_kind: VariantKind,
    pub(crate) assignment_id: Option<String>,
    pub(crate) status: ExecutionStatus,
    pub(crate) started_at: Option<String>,
    pub(crate) completed_at: Option<String>,
    pub(crate) remaining_seconds: Option<i64>,
    pub(crate) answered_count: usize,
    pub(crate) total_tasks: i64,
}
