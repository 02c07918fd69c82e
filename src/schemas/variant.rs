use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::core::time::format_primitive;
use crate::db::models::{Variant, VariantTaskDetail};
use crate::db::types::{DifficultyLevel, VariantKind};
use crate::repositories::variants::VariantSummaryRow;
use crate::schemas::task::TaskFilterParams;
use crate::services::scoring::StudentStatistics;

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct VariantPoolCreate {
    #[serde(alias = "baseName")]
    #[validate(length(min = 1, max = 200, message = "base_name must not be empty"))]
    pub(crate) base_name: String,
    #[serde(flatten)]
    pub(crate) filter: TaskFilterParams,
    /// Explicit pool. Takes the place of the catalog filters when present.
    #[serde(default)]
    #[serde(alias = "taskIds")]
    pub(crate) task_ids: Option<Vec<String>>,
    #[serde(alias = "tasksPerVariant")]
    #[validate(range(min = 1, max = 50, message = "tasks_per_variant must be between 1 and 50"))]
    pub(crate) tasks_per_variant: usize,
    #[serde(alias = "variantCount")]
    #[validate(range(min = 1, max = 20, message = "variant_count must be between 1 and 20"))]
    pub(crate) variant_count: usize,
    #[serde(default = "default_kind")]
    pub(crate) kind: VariantKind,
    #[serde(default)]
    #[serde(alias = "timeLimitMinutes")]
    #[validate(range(min = 1, max = 480, message = "time_limit_minutes must be between 1 and 480"))]
    pub(crate) time_limit_minutes: Option<i32>,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct VariantTasksCreate {
    #[validate(length(min = 1, max = 200, message = "name must not be empty"))]
    pub(crate) name: String,
    #[serde(alias = "taskIds")]
    #[validate(length(min = 1, max = 50, message = "task_ids must hold 1 to 50 tasks"))]
    pub(crate) task_ids: Vec<String>,
    #[serde(default = "default_kind")]
    pub(crate) kind: VariantKind,
    #[serde(default)]
    #[serde(alias = "timeLimitMinutes")]
    #[validate(range(min = 1, max = 480, message = "time_limit_minutes must be between 1 and 480"))]
    pub(crate) time_limit_minutes: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ListVariantsQuery {
    #[serde(default)]
    pub(crate) kind: Option<VariantKind>,
    #[serde(default)]
    pub(crate) skip: i64,
    #[serde(default = "crate::api::pagination::default_limit")]
    pub(crate) limit: i64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct StatisticsQuery {
    #[serde(default)]
    #[serde(alias = "groupId")]
    pub(crate) group_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct VariantResponse {
    pub(crate) id: String,
    pub(crate) number: i64,
    pub(crate) name: String,
    pub(crate) task_type: Option<String>,
    pub(crate) kind: VariantKind,
    pub(crate) time_limit_minutes: Option<i32>,
    pub(crate) control_work_id: Option<String>,
    pub(crate) created_by: String,
    pub(crate) created_at: String,
    pub(crate) task_count: i64,
    pub(crate) active_assignment_count: i64,
}

impl VariantResponse {
    pub(crate) fn from_db(variant: Variant, task_count: i64) -> Self {
        Self {
            id: variant.id,
            number: variant.number,
            name: variant.name,
            task_type: variant.task_type,
            kind: variant.kind,
            time_limit_minutes: variant.time_limit_minutes,
            control_work_id: variant.control_work_id,
            created_by: variant.created_by,
            created_at: format_primitive(variant.created_at),
            task_count,
            active_assignment_count: 0,
        }
    }

    pub(crate) fn from_summary(row: VariantSummaryRow) -> Self {
        Self {
            id: row.id,
            number: row.number,
            name: row.name,
            task_type: row.task_type,
            kind: row.kind,
            time_limit_minutes: row.time_limit_minutes,
            control_work_id: row.control_work_id,
            created_by: row.created_by,
            created_at: format_primitive(row.created_at),
            task_count: row.task_count,
            active_assignment_count: row.active_assignment_count,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct VariantTaskResponse {
    pub(crate) order: i32,
    pub(crate) task_id: String,
    pub(crate) text: String,
    pub(crate) task_type: String,
    pub(crate) subtype: Option<String>,
    pub(crate) difficulty: DifficultyLevel,
    pub(crate) correct_answer: String,
}

impl VariantTaskResponse {
    pub(crate) fn from_db(task: VariantTaskDetail) -> Self {
        Self {
            order: task.order,
            task_id: task.task_id,
            text: task.text,
            task_type: task.task_type,
            subtype: task.subtype,
            difficulty: task.difficulty,
            correct_answer: task.correct_answer,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct VariantDetailResponse {
    #[serde(flatten)]
    pub(crate) variant: VariantResponse,
    pub(crate) tasks: Vec<VariantTaskResponse>,
}

#[derive(Debug, Serialize)]
pub(crate) struct VariantBatchResponse {
    pub(crate) strategy: &'static str,
    pub(crate) pool_size: usize,
    pub(crate) variants: Vec<VariantDetailResponse>,
}

#[derive(Debug, Serialize)]
pub(crate) struct VariantStatisticsResponse {
    pub(crate) variant_id: String,
    pub(crate) variant_name: String,
    pub(crate) kind: VariantKind,
    pub(crate) time_limit_minutes: Option<i32>,
    pub(crate) total_tasks: usize,
    pub(crate) rows: Vec<StudentStatistics>,
}

fn default_kind() -> VariantKind {
    VariantKind::Normal
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_request_accepts_flattened_filters() {
        let payload: VariantPoolCreate = serde_json::from_value(serde_json::json!({
            "baseName": "Fractions",
            "taskType": "arithmetic",
            "difficulty": "medium",
            "tasksPerVariant": 5,
            "variantCount": 4
        }))
        .expect("payload");

        assert_eq!(payload.filter.task_type.as_deref(), Some("arithmetic"));
        assert_eq!(payload.filter.difficulty, Some(DifficultyLevel::Medium));
        assert_eq!(payload.kind, VariantKind::Normal);
        assert!(payload.validate().is_ok());
    }

    #[test]
    fn soft_bounds_are_enforced_on_requests() {
        let payload: VariantPoolCreate = serde_json::from_value(serde_json::json!({
            "base_name": "Big",
            "tasks_per_variant": 51,
            "variant_count": 21,
            "time_limit_minutes": 481
        }))
        .expect("payload");

        let errors = payload.validate().expect_err("out of bounds");
        let fields = errors.field_errors();
        assert!(fields.contains_key("tasks_per_variant"));
        assert!(fields.contains_key("variant_count"));
        assert!(fields.contains_key("time_limit_minutes"));
    }
}
