use axum::http::{Method, StatusCode};
use serde_json::json;
use tower::ServiceExt;
use uuid::Uuid;

use crate::core::time::primitive_now_utc;
use crate::db::types::UserRole;
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

#[tokio::test]
async fn wizard_creates_control_work_with_cyclic_variants() {
    let ctx = test_support::setup_test_context().await;
    let db = ctx.state.db();
    let teacher =
        test_support::insert_user(db, "teacher1", "Teacher", "teacher-pass", UserRole::Teacher, None)
            .await;
    let token = test_support::bearer_token(&teacher, ctx.state.settings());

    let mut task_ids = Vec::new();
    for index in 0..5 {
        task_ids.push(
            test_support::insert_task(db, &teacher.id, &format!("task {index}"), "1").await.id,
        );
    }

    let (status, draft) = call(
        &ctx,
        Method::POST,
        "/api/v1/control-works/wizard",
        &token,
        Some(json!({"title": "Quarter"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "response: {draft}");
    assert_eq!(draft["step"], "tasks");
    let wizard_id = draft["wizard_id"].as_str().expect("wizard id").to_string();
    let base = format!("/api/v1/control-works/wizard/{wizard_id}");

    let (status, _) = call(
        &ctx,
        Method::PUT,
        &format!("{base}/settings"),
        &token,
        Some(json!({"tasks_per_variant": 3, "variants_count": 4})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, draft) = call(
        &ctx,
        Method::PUT,
        &format!("{base}/tasks"),
        &token,
        Some(json!({"task_ids": task_ids})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "response: {draft}");
    assert_eq!(draft["step"], "settings");
    assert_eq!(draft["task_pool"].as_array().map(Vec::len), Some(5));

    let (status, draft) = call(
        &ctx,
        Method::PUT,
        &format!("{base}/settings"),
        &token,
        Some(json!({"tasks_per_variant": 3, "variants_count": 4, "time_limit_minutes": 40})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "response: {draft}");
    assert_eq!(draft["step"], "confirm");

    let (status, work) =
        call(&ctx, Method::POST, &format!("{base}/confirm"), &token, None).await;
    assert_eq!(status, StatusCode::CREATED, "response: {work}");
    assert_eq!(work["title"], "Quarter");
    assert_eq!(work["variants_count"], 4);
    let variants = work["variants"].as_array().expect("variants");
    assert_eq!(variants.len(), 4);
    assert_eq!(variants[0]["name"], "Quarter - 1");
    assert_eq!(variants[3]["name"], "Quarter - 4");
    for variant in variants {
        assert_eq!(variant["kind"], "control");
        assert_eq!(variant["time_limit_minutes"], 40);
    }

    let first_variant = variants[0]["id"].as_str().expect("variant id").to_string();
    let tasks = repositories::variants::list_tasks(db, &first_variant).await.expect("tasks");
    assert_eq!(tasks.len(), 3);

    let (status, _) = call(&ctx, Method::GET, &base, &token, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn wizard_is_private_to_its_owner() {
    let ctx = test_support::setup_test_context().await;
    let db = ctx.state.db();
    let owner =
        test_support::insert_user(db, "teacher1", "Teacher", "teacher-pass", UserRole::Teacher, None)
            .await;
    let other =
        test_support::insert_user(db, "teacher2", "Other", "teacher-pass", UserRole::Teacher, None)
            .await;
    let owner_token = test_support::bearer_token(&owner, ctx.state.settings());
    let other_token = test_support::bearer_token(&other, ctx.state.settings());

    let (_, draft) = call(
        &ctx,
        Method::POST,
        "/api/v1/control-works/wizard",
        &owner_token,
        Some(json!({"title": "Private"})),
    )
    .await;
    let uri = format!(
        "/api/v1/control-works/wizard/{}",
        draft["wizard_id"].as_str().expect("wizard id")
    );

    let (status, _) = call(&ctx, Method::GET, &uri, &other_token, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = call(&ctx, Method::GET, &uri, &owner_token, None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn regeneration_is_refused_once_assigned() {
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
    for index in 0..4 {
        test_support::insert_task(db, &teacher.id, &format!("task {index}"), "1").await;
    }

    let (_, draft) = call(
        &ctx,
        Method::POST,
        "/api/v1/control-works/wizard",
        &token,
        Some(json!({"title": "Final"})),
    )
    .await;
    let base = format!(
        "/api/v1/control-works/wizard/{}",
        draft["wizard_id"].as_str().expect("wizard id")
    );
    let (status, _) = call(
        &ctx,
        Method::PUT,
        &format!("{base}/tasks"),
        &token,
        Some(json!({"task_type": "arithmetic"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    call(
        &ctx,
        Method::PUT,
        &format!("{base}/settings"),
        &token,
        Some(json!({"tasks_per_variant": 2, "variants_count": 2})),
    )
    .await;
    let (_, work) = call(&ctx, Method::POST, &format!("{base}/confirm"), &token, None).await;
    let work_id = work["id"].as_str().expect("control work id").to_string();
    let regenerate = format!("/api/v1/control-works/{work_id}/regenerate");

    let (status, fresh) = call(&ctx, Method::POST, &regenerate, &token, None).await;
    assert_eq!(status, StatusCode::OK, "response: {fresh}");
    assert_eq!(fresh["variants"].as_array().map(Vec::len), Some(2));
    assert_ne!(fresh["variants"][0]["id"], work["variants"][0]["id"]);

    repositories::assignments::create(
        db,
        repositories::assignments::CreateAssignment {
            id: &Uuid::new_v4().to_string(),
            variant_id: fresh["variants"][0]["id"].as_str().expect("variant id"),
            student_id: &student.id,
            assigned_by: &teacher.id,
            deadline: None,
            now: primitive_now_utc(),
        },
    )
    .await
    .expect("assign");

    let (status, _) = call(&ctx, Method::POST, &regenerate, &token, None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, listed) = call(&ctx, Method::GET, "/api/v1/control-works", &token, None).await;
    assert_eq!(listed.as_array().map(Vec::len), Some(1));
}
