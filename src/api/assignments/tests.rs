use std::collections::HashMap;

use axum::http::{Method, StatusCode};
use serde_json::json;
use tower::ServiceExt;

use crate::db::models::User;
use crate::db::types::{ExecutionStatus, UserRole};
use crate::repositories;
use crate::test_support::{self, TestContext};

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

async fn create_variants(ctx: &TestContext, teacher: &User, token: &str, count: usize) -> Vec<String> {
    let mut task_ids = Vec::new();
    for index in 0..count {
        let task =
            test_support::insert_task(ctx.state.db(), &teacher.id, &format!("task {index}"), "1")
                .await;
        task_ids.push(task.id);
    }

    let (status, body) = call(
        ctx,
        Method::POST,
        "/api/v1/variants/from-pool",
        token,
        Some(json!({
            "base_name": "Test",
            "task_ids": task_ids,
            "tasks_per_variant": 1,
            "variant_count": count
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "response: {body}");
    body["variants"]
        .as_array()
        .expect("variants")
        .iter()
        .map(|variant| variant["id"].as_str().expect("id").to_string())
        .collect()
}

#[tokio::test]
async fn group_assignment_balances_variants_over_students() {
    let ctx = test_support::setup_test_context().await;
    let db = ctx.state.db();
    let teacher =
        test_support::insert_user(db, "teacher1", "Teacher", "teacher-pass", UserRole::Teacher, None)
            .await;
    let token = test_support::bearer_token(&teacher, ctx.state.settings());

    let mut students = Vec::new();
    for index in 0..5 {
        students.push(
            test_support::insert_user(
                db,
                &format!("student{index}"),
                &format!("Student {index}"),
                "student-pass",
                UserRole::Student,
                Some(&teacher.id),
            )
            .await,
        );
    }
    let members: Vec<&User> = students.iter().collect();
    let group_id = test_support::insert_group(db, "9C", &teacher, &members).await;
    let variant_ids = create_variants(&ctx, &teacher, &token, 2).await;

    let (status, body) = call(
        &ctx,
        Method::POST,
        "/api/v1/assignments/group",
        &token,
        Some(json!({"group_id": group_id, "variant_ids": variant_ids})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "response: {body}");

    let assignments = body["assignments"].as_array().expect("assignments");
    assert_eq!(assignments.len(), 5);
    let mut usage: HashMap<String, usize> = HashMap::new();
    for assignment in assignments {
        *usage.entry(assignment["variant_id"].as_str().expect("variant").to_string()).or_default() +=
            1;
    }
    let mut counts: Vec<usize> = usage.into_values().collect();
    counts.sort_unstable();
    assert_eq!(counts, vec![2, 3]);
}

#[tokio::test]
async fn empty_group_is_rejected() {
    let ctx = test_support::setup_test_context().await;
    let db = ctx.state.db();
    let teacher =
        test_support::insert_user(db, "teacher1", "Teacher", "teacher-pass", UserRole::Teacher, None)
            .await;
    let token = test_support::bearer_token(&teacher, ctx.state.settings());
    let group_id = test_support::insert_group(db, "Empty", &teacher, &[]).await;
    let variant_ids = create_variants(&ctx, &teacher, &token, 1).await;

    let (status, _) = call(
        &ctx,
        Method::POST,
        "/api/v1/assignments/group",
        &token,
        Some(json!({"group_id": group_id, "variant_ids": variant_ids})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn deactivation_cancels_running_execution_and_hides_assignment() {
    let ctx = test_support::setup_test_context().await;
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
    let token = test_support::bearer_token(&teacher, ctx.state.settings());
    let student_token = test_support::bearer_token(&student, ctx.state.settings());
    let variant_id = create_variants(&ctx, &teacher, &token, 1).await.remove(0);

    let (status, assignment) = call(
        &ctx,
        Method::POST,
        "/api/v1/assignments",
        &token,
        Some(json!({
            "variant_id": variant_id,
            "student_id": student.id,
            "deadline": "2020-01-01T00:00:00Z"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "response: {assignment}");
    let assignment_id = assignment["id"].as_str().expect("assignment id").to_string();

    let (_, mine) = call(&ctx, Method::GET, "/api/v1/assignments/my", &student_token, None).await;
    assert_eq!(mine[0]["is_overdue"], true);

    let (status, started) = call(
        &ctx,
        Method::POST,
        &format!("/api/v1/executions/start/{variant_id}"),
        &student_token,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "response: {started}");
    let execution_id = started["id"].as_str().expect("execution id").to_string();

    let (status, outcome) = call(
        &ctx,
        Method::POST,
        &format!("/api/v1/assignments/{assignment_id}/deactivate"),
        &token,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "response: {outcome}");
    assert_eq!(outcome["cancelled_executions"], 1);
    assert_eq!(outcome["hidden_executions"], 0);

    let execution = repositories::executions::find_by_id(db, &execution_id)
        .await
        .expect("fetch execution")
        .expect("execution kept");
    assert_eq!(execution.status, ExecutionStatus::Cancelled);
    assert!(!execution.is_active);

    let (_, mine) = call(&ctx, Method::GET, "/api/v1/assignments/my", &student_token, None).await;
    assert_eq!(mine, json!([]));

    let (_, listed) = call(
        &ctx,
        Method::GET,
        &format!("/api/v1/assignments/variant/{variant_id}?include_inactive=true"),
        &token,
        None,
    )
    .await;
    assert_eq!(listed[0]["is_active"], false);
}
