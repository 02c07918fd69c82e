use axum::http::{Method, StatusCode};
use serde_json::json;
use time::{Duration, PrimitiveDateTime};
use tower::ServiceExt;
use uuid::Uuid;

use crate::core::time::primitive_now_utc;
use crate::db::models::{User, Variant};
use crate::db::types::{ExecutionStatus, UserRole, VariantKind};
use crate::repositories;
use crate::test_support::{self, TestContext};

struct Fixture {
    student: User,
    variant: Variant,
    task_ids: Vec<String>,
    token: String,
}

async fn fixture(ctx: &TestContext, time_limit_minutes: Option<i32>) -> Fixture {
    let db = ctx.state.db();
    let teacher =
        test_support::insert_user(db, "teacher1", "Teacher", "teacher-pass", UserRole::Teacher, None)
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

    let mut task_ids = Vec::new();
    for (text, answer) in [("2 + 2", "4"), ("Capital of France", "Paris"), ("3 * 3", "9")] {
        task_ids.push(test_support::insert_task(db, &teacher.id, text, answer).await.id);
    }

    let mut tx = db.begin().await.expect("begin");
    let variant = repositories::variants::create(
        &mut *tx,
        repositories::variants::CreateVariant {
            id: &Uuid::new_v4().to_string(),
            name: "Quiz - 1",
            task_type: None,
            kind: VariantKind::Normal,
            time_limit_minutes,
            control_work_id: None,
            created_by: &teacher.id,
            now: primitive_now_utc(),
        },
    )
    .await
    .expect("create variant");
    repositories::variants::insert_tasks(&mut tx, &variant.id, &task_ids)
        .await
        .expect("insert tasks");
    tx.commit().await.expect("commit");

    assign(ctx, &variant, &student, &teacher.id, primitive_now_utc()).await;

    let token = test_support::bearer_token(&student, ctx.state.settings());
    Fixture { student, variant, task_ids, token }
}

async fn assign(
    ctx: &TestContext,
    variant: &Variant,
    student: &User,
    assigned_by: &str,
    now: PrimitiveDateTime,
) -> String {
    repositories::assignments::create(
        ctx.state.db(),
        repositories::assignments::CreateAssignment {
            id: &Uuid::new_v4().to_string(),
            variant_id: &variant.id,
            student_id: &student.id,
            assigned_by,
            deadline: None,
            now,
        },
    )
    .await
    .expect("assign")
    .id
}

async fn call(
    ctx: &TestContext,
    method: Method,
    uri: &str,
    token: &str,
    body: Option<serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(method, uri, Some(token), body))
        .await
        .expect("request");
    let status = response.status();
    (status, test_support::read_json(response).await)
}

#[tokio::test]
async fn student_runs_attempt_to_completion() {
    let ctx = test_support::setup_test_context().await;
    let fx = fixture(&ctx, Some(30)).await;

    let (status, started) = call(
        &ctx,
        Method::POST,
        &format!("/api/v1/executions/start/{}", fx.variant.id),
        &fx.token,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "response: {started}");
    assert_eq!(started["status"], "in_progress");
    assert_eq!(started["total_tasks"], 3);
    assert_eq!(started["remaining_seconds"].as_i64().map(|left| left > 0), Some(true));
    let execution_id = started["id"].as_str().expect("execution id").to_string();

    let (status, saved) = call(
        &ctx,
        Method::POST,
        &format!("/api/v1/executions/{execution_id}/answers"),
        &fx.token,
        Some(json!({"task_id": fx.task_ids[0], "answer": "4", "current_task_order": 1})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "response: {saved}");
    assert_eq!(saved["answered_count"], 1);
    assert_eq!(saved["current_task_order"], 1);

    let (_, moved) = call(
        &ctx,
        Method::POST,
        &format!("/api/v1/executions/{execution_id}/navigate"),
        &fx.token,
        Some(json!({"direction": "prev"})),
    )
    .await;
    assert_eq!(moved["current_task_order"], 0);
    let (_, bounded) = call(
        &ctx,
        Method::POST,
        &format!("/api/v1/executions/{execution_id}/navigate"),
        &fx.token,
        Some(json!({"direction": "prev"})),
    )
    .await;
    assert_eq!(bounded["boundary"], "first");
    assert_eq!(bounded["current_task_order"], 0);

    let mut answers = serde_json::Map::new();
    answers.insert(fx.task_ids[1].clone(), json!(" Paris "));
    let (status, result) = call(
        &ctx,
        Method::POST,
        &format!("/api/v1/executions/{execution_id}/complete"),
        &fx.token,
        Some(json!({"answers": answers})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "response: {result}");
    assert_eq!(result["status"], "completed");
    assert_eq!(result["correct"], 2);
    assert_eq!(result["total"], 3);
    assert_eq!(result["answered"], 2);
    assert_eq!(result["tasks"][2]["answer"], "");
    let completed_at = result["completed_at"].clone();

    let (status, _) = call(
        &ctx,
        Method::POST,
        &format!("/api/v1/executions/{execution_id}/answers"),
        &fx.token,
        Some(json!({"task_id": fx.task_ids[2], "answer": "9"})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, again) = call(
        &ctx,
        Method::GET,
        &format!("/api/v1/executions/{execution_id}/result"),
        &fx.token,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(again["completed_at"], completed_at);
    assert_eq!(again["correct"], 2);
}

#[tokio::test]
async fn expired_attempt_times_out_on_access() {
    let ctx = test_support::setup_test_context().await;
    let fx = fixture(&ctx, Some(10)).await;

    let (_, started) = call(
        &ctx,
        Method::POST,
        &format!("/api/v1/executions/start/{}", fx.variant.id),
        &fx.token,
        None,
    )
    .await;
    let execution_id = started["id"].as_str().expect("execution id").to_string();

    let now = primitive_now_utc();
    let execution = repositories::executions::find_by_id(ctx.state.db(), &execution_id)
        .await
        .expect("fetch")
        .expect("execution");
    repositories::executions::save_state(
        ctx.state.db(),
        &execution.id,
        repositories::executions::SaveExecutionState {
            status: ExecutionStatus::InProgress,
            started_at: Some(now - Duration::minutes(11)),
            completed_at: None,
            answers: &execution.answers.0,
            current_task_order: 0,
            now,
        },
    )
    .await
    .expect("backdate");

    let (status, view) = call(
        &ctx,
        Method::GET,
        &format!("/api/v1/executions/{execution_id}"),
        &fx.token,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["status"], "timeout");
    assert_eq!(view["remaining_seconds"], 0);

    let stored = repositories::executions::find_by_id(ctx.state.db(), &execution_id)
        .await
        .expect("fetch")
        .expect("execution");
    assert_eq!(stored.status, ExecutionStatus::Timeout);
}

#[tokio::test]
async fn reassignment_after_completion_opens_new_attempt() {
    let ctx = test_support::setup_test_context().await;
    let fx = fixture(&ctx, None).await;
    let start_uri = format!("/api/v1/executions/start/{}", fx.variant.id);

    let (_, first) = call(&ctx, Method::POST, &start_uri, &fx.token, None).await;
    let first_id = first["id"].as_str().expect("execution id").to_string();
    let (status, _) = call(
        &ctx,
        Method::POST,
        &format!("/api/v1/executions/{first_id}/complete"),
        &fx.token,
        Some(json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = call(&ctx, Method::POST, &start_uri, &fx.token, None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let later = primitive_now_utc() + Duration::seconds(1);
    assign(&ctx, &fx.variant, &fx.student, &fx.variant.created_by, later).await;

    let (status, second) = call(&ctx, Method::POST, &start_uri, &fx.token, None).await;
    assert_eq!(status, StatusCode::OK, "response: {second}");
    assert_ne!(second["id"], first["id"]);
    assert_eq!(second["status"], "in_progress");

    let (_, listed) = call(&ctx, Method::GET, "/api/v1/executions", &fx.token, None).await;
    assert_eq!(listed.as_array().map(Vec::len), Some(2));
}

#[tokio::test]
async fn start_without_assignment_is_not_found_but_number_works() {
    let ctx = test_support::setup_test_context().await;
    let fx = fixture(&ctx, None).await;
    let other = test_support::insert_user(
        ctx.state.db(),
        "student2",
        "Student Two",
        "student-pass",
        UserRole::Student,
        None,
    )
    .await;
    let token = test_support::bearer_token(&other, ctx.state.settings());

    let (status, _) = call(
        &ctx,
        Method::POST,
        &format!("/api/v1/executions/start/{}", fx.variant.id),
        &token,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, view) = call(
        &ctx,
        Method::POST,
        "/api/v1/executions/start-by-number",
        &token,
        Some(json!({"number": fx.variant.number})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "response: {view}");
    assert_eq!(view["assignment_id"], serde_json::Value::Null);
    assert_eq!(view["status"], "in_progress");

    let (status, _) = call(
        &ctx,
        Method::GET,
        &format!("/api/v1/executions/{}", view["id"].as_str().expect("id")),
        &fx.token,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn simultaneous_starts_share_one_execution() {
    let ctx = test_support::setup_test_context().await;
    let fx = fixture(&ctx, None).await;
    let uri = format!("/api/v1/executions/start/{}", fx.variant.id);

    let ((first_status, first), (second_status, second)) = tokio::join!(
        call(&ctx, Method::POST, &uri, &fx.token, None),
        call(&ctx, Method::POST, &uri, &fx.token, None),
    );
    assert_eq!(first_status, StatusCode::OK, "response: {first}");
    assert_eq!(second_status, StatusCode::OK, "response: {second}");
    assert_eq!(first["id"], second["id"]);

    let rows: Vec<(String, Option<String>)> = sqlx::query_as(
        "SELECT id, assignment_id FROM executions WHERE variant_id = $1 AND student_id = $2",
    )
    .bind(&fx.variant.id)
    .bind(&fx.student.id)
    .fetch_all(ctx.state.db())
    .await
    .expect("executions");
    assert_eq!(rows.len(), 1);
    assert_eq!(first["id"].as_str(), Some(rows[0].0.as_str()));
    assert!(rows[0].1.is_some());
}

#[tokio::test]
async fn foreign_saves_do_not_spend_owner_quota() {
    let ctx = test_support::setup_test_context().await;
    let fx = fixture(&ctx, None).await;
    let intruder = test_support::insert_user(
        ctx.state.db(),
        "student2",
        "Student Two",
        "student-pass",
        UserRole::Student,
        None,
    )
    .await;
    let intruder_token = test_support::bearer_token(&intruder, ctx.state.settings());

    let (status, started) = call(
        &ctx,
        Method::POST,
        &format!("/api/v1/executions/start/{}", fx.variant.id),
        &fx.token,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "response: {started}");
    let uri = format!("/api/v1/executions/{}/answers", started["id"].as_str().expect("id"));
    let body = json!({"task_id": fx.task_ids[0], "answer": "4"});

    let limit = ctx.state.settings().variants().answer_save_limit;
    for _ in 0..=limit {
        let (status, _) =
            call(&ctx, Method::POST, &uri, &intruder_token, Some(body.clone())).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    let (status, saved) = call(&ctx, Method::POST, &uri, &fx.token, Some(body)).await;
    assert_eq!(status, StatusCode::OK, "response: {saved}");
    assert_eq!(saved["answered_count"], 1);
}
