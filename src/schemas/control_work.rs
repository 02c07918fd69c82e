use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::core::time::format_primitive;
use crate::db::models::ControlWork;
use crate::schemas::task::TaskFilterParams;
use crate::schemas::variant::VariantResponse;
use crate::services::control_wizard::{WizardDraft, WizardStep};

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct WizardDetails {
    #[validate(length(min = 1, max = 200, message = "title must not be empty"))]
    pub(crate) title: String,
    #[serde(default)]
    pub(crate) description: Option<String>,
}

/// Pool selection: explicit ids, or every catalog task matching the filters.
#[derive(Debug, Deserialize)]
pub(crate) struct WizardTasks {
    #[serde(default)]
    #[serde(alias = "taskIds")]
    pub(crate) task_ids: Option<Vec<String>>,
    #[serde(flatten)]
    pub(crate) filter: TaskFilterParams,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct WizardSettings {
    #[serde(alias = "tasksPerVariant")]
    #[validate(range(min = 1, max = 50, message = "tasks_per_variant must be between 1 and 50"))]
    pub(crate) tasks_per_variant: usize,
    #[serde(alias = "variantsCount")]
    #[validate(range(min = 1, max = 20, message = "variants_count must be between 1 and 20"))]
    pub(crate) variants_count: usize,
    #[serde(default)]
    #[serde(alias = "timeLimitMinutes")]
    #[validate(range(min = 1, max = 480, message = "time_limit_minutes must be between 1 and 480"))]
    pub(crate) time_limit_minutes: Option<i32>,
}

#[derive(Debug, Serialize)]
pub(crate) struct WizardResponse {
    pub(crate) wizard_id: String,
    pub(crate) step: WizardStep,
    pub(crate) title: Option<String>,
    pub(crate) description: Option<String>,
    pub(crate) task_pool: Vec<String>,
    pub(crate) tasks_per_variant: Option<usize>,
    pub(crate) variants_count: Option<usize>,
    pub(crate) time_limit_minutes: Option<i32>,
}

impl WizardResponse {
    pub(crate) fn from_draft(draft: WizardDraft) -> Self {
        Self {
            wizard_id: draft.id,
            step: draft.step,
            title: draft.title,
            description: draft.description,
            task_pool: draft.task_pool,
            tasks_per_variant: draft.tasks_per_variant,
            variants_count: draft.variants_count,
            time_limit_minutes: draft.time_limit_minutes,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct ControlWorkResponse {
    pub(crate) id: String,
    pub(crate) title: String,
    pub(crate) description: Option<String>,
    pub(crate) variants_count: i32,
    pub(crate) tasks_per_variant: i32,
    pub(crate) time_limit_minutes: Option<i32>,
    pub(crate) task_pool: Vec<String>,
    pub(crate) created_by: String,
    pub(crate) created_at: String,
    pub(crate) updated_at: String,
}

impl ControlWorkResponse {
    pub(crate) fn from_db(work: ControlWork) -> Self {
        Self {
            id: work.id,
            title: work.title,
            description: work.description,
            variants_count: work.variants_count,
            tasks_per_variant: work.tasks_per_variant,
            time_limit_minutes: work.time_limit_minutes,
            task_pool: work.task_pool.0,
            created_by: work.created_by,
            created_at: format_primitive(work.created_at),
            updated_at: format_primitive(work.updated_at),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct ControlWorkDetailResponse {
    #[serde(flatten)]
    pub(crate) control_work: ControlWorkResponse,
    pub(crate) variants: Vec<VariantResponse>,
}
