use std::collections::HashMap;

use serde::Serialize;
use time::PrimitiveDateTime;

use crate::core::time::seconds_between;
use crate::db::models::VariantTaskDetail;
use crate::db::types::{ExecutionStatus, VariantKind};
use crate::services::execution_engine;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum TaskStatus {
    NotStarted,
    Correct,
    Incorrect,
}

/// The answer key of one task in a variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct AnswerKey {
    pub(crate) task_id: String,
    pub(crate) order: i32,
    pub(crate) correct_answer: String,
}

impl From<&VariantTaskDetail> for AnswerKey {
    fn from(task: &VariantTaskDetail) -> Self {
        Self {
            task_id: task.task_id.clone(),
            order: task.order,
            correct_answer: task.correct_answer.clone(),
        }
    }
}

/// Whitespace-trimmed, case-sensitive comparison.
pub(crate) fn is_correct(answer: &str, correct_answer: &str) -> bool {
    answer.trim() == correct_answer.trim()
}

pub(crate) fn task_status(answer: Option<&str>, correct_answer: &str) -> TaskStatus {
    match answer.map(str::trim) {
        None | Some("") => TaskStatus::NotStarted,
        Some(given) if given == correct_answer.trim() => TaskStatus::Correct,
        Some(_) => TaskStatus::Incorrect,
    }
}

pub(crate) fn count_correct(keys: &[AnswerKey], answers: &HashMap<String, String>) -> usize {
    keys.iter()
        .filter(|key| {
            answers.get(&key.task_id).is_some_and(|answer| is_correct(answer, &key.correct_answer))
        })
        .count()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct ScoreSummary {
    pub(crate) correct: usize,
    pub(crate) total: usize,
    pub(crate) answered: usize,
    pub(crate) percentage: f64,
}

/// Score of a finished attempt. `correct` stays 0 until `completed_at` is set.
pub(crate) fn summarize(
    keys: &[AnswerKey],
    answers: &HashMap<String, String>,
    completed_at: Option<PrimitiveDateTime>,
) -> ScoreSummary {
    let total = keys.len();
    let correct = if completed_at.is_some() { count_correct(keys, answers) } else { 0 };
    let answered = keys
        .iter()
        .filter(|key| answers.get(&key.task_id).is_some_and(|answer| !answer.trim().is_empty()))
        .count();

    ScoreSummary { correct, total, answered, percentage: percentage(correct, total) }
}

fn percentage(correct: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (correct as f64 * 1000.0 / total as f64).round() / 10.0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub(crate) struct ElapsedBreakdown {
    pub(crate) hours: i64,
    pub(crate) minutes: i64,
    pub(crate) seconds: i64,
    pub(crate) total_seconds: i64,
}

impl ElapsedBreakdown {
    pub(crate) fn from_seconds(total_seconds: i64) -> Self {
        let total_seconds = total_seconds.max(0);
        Self {
            hours: total_seconds / 3600,
            minutes: (total_seconds % 3600) / 60,
            seconds: total_seconds % 60,
            total_seconds,
        }
    }

    /// `1h 5m 3s`; zero hours and minutes are left out, seconds are always shown.
    pub(crate) fn label(&self) -> String {
        let mut parts = Vec::with_capacity(3);
        if self.hours > 0 {
            parts.push(format!("{}h", self.hours));
        }
        if self.minutes > 0 {
            parts.push(format!("{}m", self.minutes));
        }
        parts.push(format!("{}s", self.seconds));
        parts.join(" ")
    }
}

pub(crate) fn elapsed_breakdown(
    started_at: Option<PrimitiveDateTime>,
    completed_at: Option<PrimitiveDateTime>,
) -> Option<ElapsedBreakdown> {
    let (started_at, completed_at) = (started_at?, completed_at?);
    Some(ElapsedBreakdown::from_seconds(seconds_between(started_at, completed_at)))
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct VariantProfile {
    pub(crate) kind: VariantKind,
    pub(crate) time_limit_minutes: Option<i32>,
}

#[derive(Debug, Clone)]
pub(crate) struct StudentRef {
    pub(crate) id: String,
    pub(crate) full_name: String,
}

/// The parts of an execution the statistics read.
#[derive(Debug, Clone)]
pub(crate) struct ExecutionRecord {
    pub(crate) id: String,
    pub(crate) student_id: String,
    pub(crate) status: ExecutionStatus,
    pub(crate) started_at: Option<PrimitiveDateTime>,
    pub(crate) completed_at: Option<PrimitiveDateTime>,
    pub(crate) answers: HashMap<String, String>,
    pub(crate) current_task_order: i32,
    pub(crate) created_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct TaskStatusEntry {
    pub(crate) order: i32,
    pub(crate) status: TaskStatus,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct StudentStatistics {
    pub(crate) student_id: String,
    pub(crate) student_name: String,
    pub(crate) execution_id: Option<String>,
    pub(crate) status: Option<ExecutionStatus>,
    pub(crate) current_task_order: Option<i32>,
    pub(crate) task_statuses: Vec<TaskStatusEntry>,
    pub(crate) correct_count: usize,
    pub(crate) total_count: usize,
    pub(crate) remaining_seconds: Option<i64>,
    pub(crate) elapsed: Option<ElapsedBreakdown>,
    pub(crate) elapsed_label: Option<String>,
}

/// Picks the execution with the latest `started_at`, ties broken by the later
/// `created_at`. Executions that never started rank below started ones.
pub(crate) fn latest_execution<'a>(
    executions: impl IntoIterator<Item = &'a ExecutionRecord>,
) -> Option<&'a ExecutionRecord> {
    executions.into_iter().max_by(|left, right| {
        (left.started_at, left.created_at, &left.id).cmp(&(
            right.started_at,
            right.created_at,
            &right.id,
        ))
    })
}

/// One row per student, in the order given. Students without an execution get a row
/// of `not_started` tasks.
pub(crate) fn build_statistics(
    variant: VariantProfile,
    keys: &[AnswerKey],
    students: &[StudentRef],
    executions: &[ExecutionRecord],
    now: PrimitiveDateTime,
) -> Vec<StudentStatistics> {
    let mut by_student: HashMap<&str, Vec<&ExecutionRecord>> = HashMap::new();
    for execution in executions {
        by_student.entry(execution.student_id.as_str()).or_default().push(execution);
    }

    students
        .iter()
        .map(|student| {
            let latest = by_student
                .get(student.id.as_str())
                .and_then(|records| latest_execution(records.iter().copied()));
            student_row(variant, keys, student, latest, now)
        })
        .collect()
}

fn student_row(
    variant: VariantProfile,
    keys: &[AnswerKey],
    student: &StudentRef,
    execution: Option<&ExecutionRecord>,
    now: PrimitiveDateTime,
) -> StudentStatistics {
    let task_statuses: Vec<TaskStatusEntry> = keys
        .iter()
        .map(|key| TaskStatusEntry {
            order: key.order,
            status: execution
                .map(|record| {
                    task_status(record.answers.get(&key.task_id).map(String::as_str), &key.correct_answer)
                })
                .unwrap_or(TaskStatus::NotStarted),
        })
        .collect();
    let correct_count =
        task_statuses.iter().filter(|entry| entry.status == TaskStatus::Correct).count();

    let Some(record) = execution else {
        return StudentStatistics {
            student_id: student.id.clone(),
            student_name: student.full_name.clone(),
            execution_id: None,
            status: None,
            current_task_order: None,
            total_count: task_statuses.len(),
            task_statuses,
            correct_count,
            remaining_seconds: None,
            elapsed: None,
            elapsed_label: None,
        };
    };

    let remaining_seconds = execution_engine::remaining_seconds(
        variant.time_limit_minutes,
        record.started_at,
        record.completed_at,
        now,
    );
    let elapsed = if variant.kind == VariantKind::Control
        && matches!(record.status, ExecutionStatus::Completed | ExecutionStatus::Timeout)
    {
        elapsed_breakdown(record.started_at, record.completed_at)
    } else {
        None
    };

    StudentStatistics {
        student_id: student.id.clone(),
        student_name: student.full_name.clone(),
        execution_id: Some(record.id.clone()),
        status: Some(record.status),
        current_task_order: (record.status == ExecutionStatus::InProgress)
            .then_some(record.current_task_order),
        total_count: task_statuses.len(),
        task_statuses,
        correct_count,
        remaining_seconds,
        elapsed_label: elapsed.map(|value| value.label()),
        elapsed,
    }
}
