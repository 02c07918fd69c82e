use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use time::PrimitiveDateTime;

use crate::db::types::{DifficultyLevel, ExecutionStatus, UserRole, VariantKind};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct User {
    pub(crate) id: String,
    pub(crate) username: String,
    pub(crate) hashed_password: String,
    pub(crate) full_name: String,
    pub(crate) role: UserRole,
    pub(crate) is_active: bool,
    pub(crate) created_by: Option<String>,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct StudentGroup {
    pub(crate) id: String,
    pub(crate) name: String,
    pub(crate) created_by: String,
    pub(crate) created_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Task {
    pub(crate) id: String,
    pub(crate) text: String,
    pub(crate) task_type: String,
    pub(crate) subtype: Option<String>,
    pub(crate) difficulty: DifficultyLevel,
    pub(crate) correct_answer: String,
    /// Set on tasks created by a bulk import; the whole batch can be removed by it.
    pub(crate) import_id: Option<String>,
    pub(crate) created_by: String,
    pub(crate) created_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Variant {
    pub(crate) id: String,
    pub(crate) number: i64,
    pub(crate) name: String,
    pub(crate) task_type: Option<String>,
    pub(crate) kind: VariantKind,
    pub(crate) time_limit_minutes: Option<i32>,
    pub(crate) control_work_id: Option<String>,
    pub(crate) created_by: String,
    pub(crate) created_at: PrimitiveDateTime,
}

/// A variant task link joined with the task it points to.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct VariantTaskDetail {
    pub(crate) variant_id: String,
    pub(crate) task_id: String,
    #[sqlx(rename = "task_order")]
    pub(crate) order: i32,
    pub(crate) text: String,
    pub(crate) task_type: String,
    pub(crate) subtype: Option<String>,
    pub(crate) difficulty: DifficultyLevel,
    pub(crate) correct_answer: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Assignment {
    pub(crate) id: String,
    pub(crate) variant_id: String,
    pub(crate) student_id: String,
    pub(crate) assigned_by: String,
    pub(crate) assigned_at: PrimitiveDateTime,
    pub(crate) deadline: Option<PrimitiveDateTime>,
    pub(crate) is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Execution {
    pub(crate) id: String,
    pub(crate) variant_id: String,
    pub(crate) student_id: String,
    pub(crate) assignment_id: Option<String>,
    pub(crate) status: ExecutionStatus,
    pub(crate) is_active: bool,
    pub(crate) started_at: Option<PrimitiveDateTime>,
    pub(crate) completed_at: Option<PrimitiveDateTime>,
    pub(crate) answers: Json<HashMap<String, String>>,
    pub(crate) current_task_order: i32,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct ControlWork {
    pub(crate) id: String,
    pub(crate) title: String,
    pub(crate) description: Option<String>,
    pub(crate) variants_count: i32,
    pub(crate) tasks_per_variant: i32,
    pub(crate) time_limit_minutes: Option<i32>,
    pub(crate) task_pool: Json<Vec<String>>,
    pub(crate) created_by: String,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}
