use anyhow::{Context, Result};

use crate::core::state::AppState;
use crate::core::time::primitive_now_utc as now_primitive;
use crate::repositories;

const ORPHAN_BATCH_SIZE: i64 = 500;

#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct BackfillOutcome {
    pub(crate) linked: usize,
    pub(crate) skipped: usize,
}

/// Hides executions whose assignment was deactivated without the cascade reaching them.
pub(crate) async fn deactivate_stale_executions(state: &AppState) -> Result<u64> {
    let hidden =
        repositories::executions::deactivate_for_inactive_assignments(state.db(), now_primitive())
            .await
            .context("Failed to deactivate executions of inactive assignments")?;

    if hidden > 0 {
        metrics::counter!("maintenance_executions_deactivated_total").increment(hidden);
        tracing::info!(hidden, "Deactivated executions of inactive assignments");
    }

    Ok(hidden)
}

/// Links executions without an assignment to the newest active assignment of the same
/// student and variant, provided that assignment has no execution yet.
pub(crate) async fn backfill_orphan_executions(state: &AppState) -> Result<BackfillOutcome> {
    let orphans = repositories::executions::list_orphans(state.db(), ORPHAN_BATCH_SIZE)
        .await
        .context("Failed to list orphan executions")?;

    let mut outcome = BackfillOutcome::default();
    if orphans.is_empty() {
        return Ok(outcome);
    }

    let now = now_primitive();
    for orphan in &orphans {
        let newest = repositories::assignments::find_newest_active(
            state.db(),
            &orphan.variant_id,
            &orphan.student_id,
        )
        .await
        .context("Failed to fetch newest assignment")?;

        let Some(assignment) = newest.filter(|assignment| !assignment.has_execution) else {
            outcome.skipped += 1;
            continue;
        };

        let linked =
            repositories::executions::link_to_assignment(state.db(), &orphan.id, &assignment.id, now)
                .await
                .context("Failed to link orphan execution")?;
        if linked {
            outcome.linked += 1;
            tracing::debug!(
                execution_id = %orphan.id,
                assignment_id = %assignment.id,
                "Orphan execution linked"
            );
        } else {
            outcome.skipped += 1;
        }
    }

    metrics::counter!("maintenance_executions_linked_total").increment(outcome.linked as u64);
    tracing::info!(
        linked = outcome.linked,
        skipped = outcome.skipped,
        "Orphan execution backfill finished"
    );

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;
    use crate::db::models::User;
    use crate::db::types::{UserRole, VariantKind};
    use crate::test_support::{self, TestContext};

    struct Seed {
        teacher: User,
        student: User,
        variant_id: String,
    }

    async fn seed(ctx: &TestContext) -> Seed {
        let db = ctx.state.db();
        let teacher = test_support::insert_user(
            db,
            "teacher1",
            "Teacher",
            "teacher-pass",
            UserRole::Teacher,
            None,
        )
        .await;
        let student = test_support::insert_user(
            db,
            "student1",
            "Student One",
            "student-pass",
            UserRole::Student,
            Some(&teacher.id),
        )
        .await;
        let task = test_support::insert_task(db, &teacher.id, "1 + 1", "2").await;

        let mut tx = db.begin().await.expect("begin");
        let variant = repositories::variants::create(
            &mut *tx,
            repositories::variants::CreateVariant {
                id: &Uuid::new_v4().to_string(),
                name: "Check - 1",
                task_type: None,
                kind: VariantKind::Normal,
                time_limit_minutes: None,
                control_work_id: None,
                created_by: &teacher.id,
                now: now_primitive(),
            },
        )
        .await
        .expect("variant");
        repositories::variants::insert_tasks(&mut tx, &variant.id, &[task.id])
            .await
            .expect("variant tasks");
        tx.commit().await.expect("commit");

        Seed { teacher, student, variant_id: variant.id }
    }

    async fn assign(ctx: &TestContext, seed: &Seed) -> String {
        repositories::assignments::create(
            ctx.state.db(),
            repositories::assignments::CreateAssignment {
                id: &Uuid::new_v4().to_string(),
                variant_id: &seed.variant_id,
                student_id: &seed.student.id,
                assigned_by: &seed.teacher.id,
                deadline: None,
                now: now_primitive(),
            },
        )
        .await
        .expect("assignment")
        .id
    }

    async fn execution(ctx: &TestContext, seed: &Seed, assignment_id: Option<&str>) -> String {
        let id = Uuid::new_v4().to_string();
        let created = repositories::executions::create(
            ctx.state.db(),
            repositories::executions::CreateExecution {
                id: &id,
                variant_id: &seed.variant_id,
                student_id: &seed.student.id,
                assignment_id,
                now: now_primitive(),
            },
        )
        .await
        .expect("execution");
        assert!(created);
        id
    }

    #[tokio::test]
    async fn orphan_execution_is_linked_to_free_assignment() {
        let ctx = test_support::setup_test_context().await;
        let seed = seed(&ctx).await;
        let orphan_id = execution(&ctx, &seed, None).await;
        let assignment_id = assign(&ctx, &seed).await;

        let outcome = backfill_orphan_executions(&ctx.state).await.expect("backfill");
        assert_eq!(outcome, BackfillOutcome { linked: 1, skipped: 0 });

        let linked = repositories::executions::find_by_id(ctx.state.db(), &orphan_id)
            .await
            .expect("fetch")
            .expect("execution");
        assert_eq!(linked.assignment_id.as_deref(), Some(assignment_id.as_str()));

        let again = backfill_orphan_executions(&ctx.state).await.expect("second backfill");
        assert_eq!(again, BackfillOutcome::default());
    }

    #[tokio::test]
    async fn orphan_stays_when_assignment_already_has_execution() {
        let ctx = test_support::setup_test_context().await;
        let seed = seed(&ctx).await;
        let orphan_id = execution(&ctx, &seed, None).await;
        let assignment_id = assign(&ctx, &seed).await;
        execution(&ctx, &seed, Some(&assignment_id)).await;

        let outcome = backfill_orphan_executions(&ctx.state).await.expect("backfill");
        assert_eq!(outcome, BackfillOutcome::default());

        let orphan = repositories::executions::find_by_id(ctx.state.db(), &orphan_id)
            .await
            .expect("fetch")
            .expect("execution");
        assert_eq!(orphan.assignment_id, None);
    }

    #[tokio::test]
    async fn executions_of_inactive_assignments_are_hidden() {
        let ctx = test_support::setup_test_context().await;
        let seed = seed(&ctx).await;
        let assignment_id = assign(&ctx, &seed).await;
        let execution_id = execution(&ctx, &seed, Some(&assignment_id)).await;

        repositories::assignments::deactivate(ctx.state.db(), &assignment_id)
            .await
            .expect("deactivate");

        assert_eq!(deactivate_stale_executions(&ctx.state).await.expect("cleanup"), 1);
        assert_eq!(deactivate_stale_executions(&ctx.state).await.expect("cleanup"), 0);

        let hidden = repositories::executions::find_by_id(ctx.state.db(), &execution_id)
            .await
            .expect("fetch")
            .expect("execution");
        assert!(!hidden.is_active);
    }
}
