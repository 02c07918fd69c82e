use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use time::{format_description::well_known::Rfc3339, OffsetDateTime, PrimitiveDateTime};
use validator::Validate;

use crate::core::time::{format_primitive, to_primitive_utc};
use crate::db::models::Assignment;
use crate::db::types::{ExecutionStatus, VariantKind};
use crate::repositories::assignments::AssignmentOverviewRow;

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct AssignToStudent {
    #[serde(alias = "variantId")]
    #[validate(length(min = 1, message = "variant_id must not be empty"))]
    pub(crate) variant_id: String,
    #[serde(alias = "studentId")]
    #[validate(length(min = 1, message = "student_id must not be empty"))]
    pub(crate) student_id: String,
    #[serde(default, deserialize_with = "deserialize_deadline")]
    pub(crate) deadline: Option<PrimitiveDateTime>,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct AssignToGroup {
    #[serde(alias = "groupId")]
    #[validate(length(min = 1, message = "group_id must not be empty"))]
    pub(crate) group_id: String,
    #[serde(alias = "variantIds")]
    #[validate(length(min = 1, message = "variant_ids must not be empty"))]
    pub(crate) variant_ids: Vec<String>,
    #[serde(default, deserialize_with = "deserialize_deadline")]
    pub(crate) deadline: Option<PrimitiveDateTime>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ListAssignmentsQuery {
    #[serde(default)]
    #[serde(alias = "includeInactive")]
    pub(crate) include_inactive: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct AssignmentResponse {
    pub(crate) id: String,
    pub(crate) variant_id: String,
    pub(crate) student_id: String,
    pub(crate) assigned_by: String,
    pub(crate) assigned_at: String,
    pub(crate) deadline: Option<String>,
    pub(crate) is_active: bool,
}

impl AssignmentResponse {
    pub(crate) fn from_db(assignment: Assignment) -> Self {
        Self {
            id: assignment.id,
            variant_id: assignment.variant_id,
            student_id: assignment.student_id,
            assigned_by: assignment.assigned_by,
            assigned_at: format_primitive(assignment.assigned_at),
            deadline: assignment.deadline.map(format_primitive),
            is_active: assignment.is_active,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct AssignmentOverviewResponse {
    pub(crate) id: String,
    pub(crate) variant_id: String,
    pub(crate) variant_name: String,
    pub(crate) variant_number: i64,
    pub(crate) variant_kind: VariantKind,
    pub(crate) time_limit_minutes: Option<i32>,
    pub(crate) student_id: String,
    pub(crate) student_name: String,
    pub(crate) assigned_at: String,
    pub(crate) deadline: Option<String>,
    pub(crate) is_active: bool,
    pub(crate) is_overdue: bool,
    pub(crate) execution_id: Option<String>,
    pub(crate) execution_status: Option<ExecutionStatus>,
}

impl AssignmentOverviewResponse {
    pub(crate) fn from_row(row: AssignmentOverviewRow, now: PrimitiveDateTime) -> Self {
        let is_overdue = is_overdue(row.deadline, row.execution_status, now);
        Self {
            id: row.id,
            variant_id: row.variant_id,
            variant_name: row.variant_name,
            variant_number: row.variant_number,
            variant_kind: row.variant_kind,
            time_limit_minutes: row.time_limit_minutes,
            student_id: row.student_id,
            student_name: row.student_name,
            assigned_at: format_primitive(row.assigned_at),
            deadline: row.deadline.map(format_primitive),
            is_active: row.is_active,
            is_overdue,
            execution_id: row.execution_id,
            execution_status: row.execution_status,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct GroupAssignmentResponse {
    pub(crate) group_id: String,
    pub(crate) assignments: Vec<AssignmentResponse>,
}

#[derive(Debug, Serialize)]
pub(crate) struct DeactivateResponse {
    pub(crate) assignment_id: String,
    pub(crate) cancelled_executions: u64,
    pub(crate) hidden_executions: u64,
}

/// Past the deadline without a completed attempt.
pub(crate) fn is_overdue(
    deadline: Option<PrimitiveDateTime>,
    execution_status: Option<ExecutionStatus>,
    now: PrimitiveDateTime,
) -> bool {
    match deadline {
        Some(deadline) => now > deadline && execution_status != Some(ExecutionStatus::Completed),
        None => false,
    }
}

fn deserialize_deadline<'de, D>(deserializer: D) -> Result<Option<PrimitiveDateTime>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => OffsetDateTime::parse(value, &Rfc3339)
            .map(|parsed| Some(to_primitive_utc(parsed)))
            .map_err(|_| D::Error::custom(format!("invalid datetime: {value}"))),
    }
}
