//! Per-student attempt state machine.
//!
//! `not_started -> in_progress -> completed | timeout`, with `cancelled` reachable only by
//! deactivating the owning assignment. The functions here never touch storage; callers load
//! an [`ExecutionState`], apply a transition and persist the result in the same transaction.

use std::collections::HashMap;

use time::{Duration, PrimitiveDateTime};

use crate::core::time::seconds_between;
use crate::db::models::Execution;
use crate::db::types::ExecutionStatus;
use crate::services::errors::DomainError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ExecutionState {
    pub(crate) status: ExecutionStatus,
    pub(crate) started_at: Option<PrimitiveDateTime>,
    pub(crate) completed_at: Option<PrimitiveDateTime>,
    pub(crate) answers: HashMap<String, String>,
    /// Zero-based index of the task the student looked at last.
    pub(crate) current_task_order: i32,
}

impl From<&Execution> for ExecutionState {
    fn from(execution: &Execution) -> Self {
        Self {
            status: execution.status,
            started_at: execution.started_at,
            completed_at: execution.completed_at,
            answers: execution.answers.0.clone(),
            current_task_order: execution.current_task_order,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Direction {
    Next,
    Prev,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum NavigationOutcome {
    Moved(i32),
    AtFirst,
    AtLast,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CompletionOutcome {
    Completed,
    AlreadyFinished,
}

impl ExecutionState {
    pub(crate) fn new() -> Self {
        Self {
            status: ExecutionStatus::NotStarted,
            started_at: None,
            completed_at: None,
            answers: HashMap::new(),
            current_task_order: 0,
        }
    }

    pub(crate) fn start(&mut self, now: PrimitiveDateTime) -> Result<(), DomainError> {
        if self.status != ExecutionStatus::NotStarted {
            return Err(self.rejected("start"));
        }
        self.status = ExecutionStatus::InProgress;
        self.started_at = Some(now);
        Ok(())
    }

    /// Stores `text` under `task_id`, replacing any previous answer. `current` moves the
    /// task pointer when it falls inside the variant.
    pub(crate) fn save_answer(
        &mut self,
        task_id: &str,
        text: &str,
        current: Option<i32>,
        total_tasks: usize,
    ) -> Result<(), DomainError> {
        if self.status != ExecutionStatus::InProgress {
            return Err(self.rejected("save an answer for"));
        }
        self.answers.insert(task_id.to_string(), text.to_string());
        if let Some(order) = current {
            if order >= 0 && (order as usize) < total_tasks {
                self.current_task_order = order;
            }
        }
        Ok(())
    }

    pub(crate) fn advance(
        &mut self,
        direction: Direction,
        total_tasks: usize,
    ) -> Result<NavigationOutcome, DomainError> {
        if self.status != ExecutionStatus::InProgress {
            return Err(self.rejected("navigate"));
        }
        let last = total_tasks.saturating_sub(1) as i32;
        let outcome = match direction {
            Direction::Next if self.current_task_order >= last => NavigationOutcome::AtLast,
            Direction::Prev if self.current_task_order <= 0 => NavigationOutcome::AtFirst,
            Direction::Next => NavigationOutcome::Moved(self.current_task_order + 1),
            Direction::Prev => NavigationOutcome::Moved(self.current_task_order - 1),
        };
        if let NavigationOutcome::Moved(order) = outcome {
            self.current_task_order = order;
        }
        Ok(outcome)
    }

    /// Merges `incoming` into the stored answers for every task of the variant and closes
    /// the attempt. A key present in `incoming` wins even when empty, a stored answer
    /// survives when the key is absent, and a task never answered gets `""`.
    ///
    /// Terminal executions are left untouched.
    pub(crate) fn complete(
        &mut self,
        task_ids: &[String],
        incoming: Option<&HashMap<String, String>>,
        now: PrimitiveDateTime,
    ) -> CompletionOutcome {
        if self.status.is_terminal() {
            return CompletionOutcome::AlreadyFinished;
        }

        for task_id in task_ids {
            let merged = incoming
                .and_then(|answers| answers.get(task_id))
                .or_else(|| self.answers.get(task_id))
                .cloned()
                .unwrap_or_default();
            self.answers.insert(task_id.clone(), merged);
        }

        if self.started_at.is_none() {
            self.started_at = Some(now);
        }
        self.completed_at = Some(now);
        self.status = ExecutionStatus::Completed;
        CompletionOutcome::Completed
    }

    /// Moves a running attempt to `timeout` once its time is up. Returns whether the
    /// status changed.
    pub(crate) fn expire_if_due(
        &mut self,
        time_limit_minutes: Option<i32>,
        now: PrimitiveDateTime,
    ) -> bool {
        if self.status != ExecutionStatus::InProgress {
            return false;
        }
        match self.remaining_seconds(time_limit_minutes, now) {
            Some(remaining) if remaining <= 0 => {
                self.status = ExecutionStatus::Timeout;
                self.completed_at = Some(now);
                true
            }
            _ => false,
        }
    }

    pub(crate) fn remaining_seconds(
        &self,
        time_limit_minutes: Option<i32>,
        now: PrimitiveDateTime,
    ) -> Option<i64> {
        remaining_seconds(time_limit_minutes, self.started_at, self.completed_at, now)
    }

    fn rejected(&self, action: &'static str) -> DomainError {
        DomainError::InvalidStateTransition { from: self.status, action }
    }
}

impl Default for ExecutionState {
    fn default() -> Self {
        Self::new()
    }
}

/// `None` without a limit, the whole limit before the start, otherwise what is left of
/// it measured up to `completed_at` (or `now`), never below zero.
pub(crate) fn remaining_seconds(
    time_limit_minutes: Option<i32>,
    started_at: Option<PrimitiveDateTime>,
    completed_at: Option<PrimitiveDateTime>,
    now: PrimitiveDateTime,
) -> Option<i64> {
    let limit = i64::from(time_limit_minutes?) * 60;
    let Some(started_at) = started_at else {
        return Some(limit);
    };
    let elapsed = seconds_between(started_at, completed_at.unwrap_or(now));
    Some((limit - elapsed).max(0))
}

/// Whether an assignment made at `assigned_at` counts as a fresh attempt after an
/// execution that finished at `previous_completed_at`. Without a completion time the
/// assignment only counts when it is younger than `window`.
pub(crate) fn is_new_attempt(
    assigned_at: PrimitiveDateTime,
    previous_completed_at: Option<PrimitiveDateTime>,
    now: PrimitiveDateTime,
    window: Duration,
) -> bool {
    match previous_completed_at {
        Some(completed_at) => assigned_at > completed_at,
        None => assigned_at >= now - window,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct LatestExecution {
    pub(crate) status: ExecutionStatus,
    pub(crate) completed_at: Option<PrimitiveDateTime>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct AssignmentCandidate {
    pub(crate) assigned_at: PrimitiveDateTime,
    pub(crate) has_execution: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StartPlan {
    /// Keep working on the latest execution (starting it if it never started).
    ResumeLatest,
    /// Open a new execution for the newest active assignment.
    StartNew,
}

/// Decides what a start request for one (variant, student) pair does.
pub(crate) fn plan_start(
    latest: Option<LatestExecution>,
    newest_assignment: Option<AssignmentCandidate>,
    now: PrimitiveDateTime,
    window: Duration,
) -> Result<StartPlan, DomainError> {
    match (latest, newest_assignment) {
        (Some(execution), _) if !execution.status.is_terminal() => Ok(StartPlan::ResumeLatest),
        (None, Some(_)) => Ok(StartPlan::StartNew),
        (None, None) => Err(DomainError::NotFound("Assignment")),
        (Some(execution), Some(candidate))
            if !candidate.has_execution
                && is_new_attempt(candidate.assigned_at, execution.completed_at, now, window) =>
        {
            Ok(StartPlan::StartNew)
        }
        (Some(execution), _) => {
            Err(DomainError::InvalidStateTransition { from: execution.status, action: "start" })
        }
    }
}
