use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::core::time::format_primitive;
use crate::db::models::Task;
use crate::db::types::DifficultyLevel;
use crate::repositories::tasks::TaskFilter;

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct TaskCreate {
    #[validate(length(min = 1, message = "text must not be empty"))]
    pub(crate) text: String,
    #[serde(alias = "taskType")]
    #[validate(length(min = 1, max = 64, message = "task_type must not be empty"))]
    pub(crate) task_type: String,
    #[serde(default)]
    pub(crate) subtype: Option<String>,
    #[serde(default = "default_difficulty")]
    pub(crate) difficulty: DifficultyLevel,
    #[serde(alias = "correctAnswer")]
    #[validate(length(min = 1, message = "correct_answer must not be empty"))]
    pub(crate) correct_answer: String,
}

/// Partial edit; absent fields keep their stored value.
#[derive(Debug, Deserialize, Validate)]
pub(crate) struct TaskUpdate {
    #[serde(default)]
    #[validate(length(min = 1, message = "text must not be empty"))]
    pub(crate) text: Option<String>,
    #[serde(default)]
    pub(crate) subtype: Option<String>,
    #[serde(default)]
    pub(crate) difficulty: Option<DifficultyLevel>,
    #[serde(default)]
    #[serde(alias = "correctAnswer")]
    #[validate(length(min = 1, message = "correct_answer must not be empty"))]
    pub(crate) correct_answer: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ImportDeleteResponse {
    pub(crate) import_id: String,
    pub(crate) deleted: u64,
}

/// Catalog filters shared by task listing and pool-based variant creation.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct TaskFilterParams {
    #[serde(default)]
    #[serde(alias = "taskType")]
    pub(crate) task_type: Option<String>,
    #[serde(default)]
    pub(crate) subtype: Option<String>,
    #[serde(default)]
    pub(crate) difficulty: Option<DifficultyLevel>,
    #[serde(default)]
    pub(crate) search: Option<String>,
}

impl TaskFilterParams {
    pub(crate) fn to_filter(&self, ids: Option<Vec<String>>) -> TaskFilter {
        TaskFilter {
            task_type: non_blank(self.task_type.as_deref()),
            subtype: non_blank(self.subtype.as_deref()),
            difficulty: self.difficulty,
            search: non_blank(self.search.as_deref()),
            ids,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct TaskImportQuery {
    #[serde(alias = "taskType")]
    pub(crate) task_type: String,
    #[serde(default)]
    pub(crate) subtype: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct TaskResponse {
    pub(crate) id: String,
    pub(crate) text: String,
    pub(crate) task_type: String,
    pub(crate) subtype: Option<String>,
    pub(crate) difficulty: DifficultyLevel,
    pub(crate) correct_answer: String,
    pub(crate) import_id: Option<String>,
    pub(crate) created_by: String,
    pub(crate) created_at: String,
}

impl TaskResponse {
    pub(crate) fn from_db(task: Task) -> Self {
        Self {
            id: task.id,
            text: task.text,
            task_type: task.task_type,
            subtype: task.subtype,
            difficulty: task.difficulty,
            correct_answer: task.correct_answer,
            import_id: task.import_id,
            created_by: task.created_by,
            created_at: format_primitive(task.created_at),
        }
    }
}

pub(crate) fn non_blank(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|value| !value.is_empty()).map(str::to_string)
}

fn default_difficulty() -> DifficultyLevel {
    DifficultyLevel::Easy
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_filters_are_ignored() {
        let params = TaskFilterParams {
            task_type: Some("  ".to_string()),
            subtype: Some("fractions".to_string()),
            difficulty: None,
            search: Some("".to_string()),
        };
        let filter = params.to_filter(None);

        assert_eq!(filter.task_type, None);
        assert_eq!(filter.subtype.as_deref(), Some("fractions"));
        assert_eq!(filter.search, None);
    }
}
