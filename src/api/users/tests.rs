use axum::http::{Method, StatusCode};
use serde_json::json;
use tower::ServiceExt;

use crate::db::types::UserRole;
use crate::repositories;
use crate::test_support;

#[tokio::test]
async fn admin_can_create_and_deactivate_teacher() {
    let ctx = test_support::setup_test_context().await;

    let admin = test_support::insert_user(
        ctx.state.db(),
        "admin001",
        "Admin User",
        "admin-pass",
        UserRole::Admin,
        None,
    )
    .await;
    let token = test_support::bearer_token(&admin, ctx.state.settings());

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::POST,
            "/api/v1/users",
            Some(&token),
            Some(json!({
                "username": "teacher42",
                "full_name": "Olga Teacher",
                "password": "teacher-pass",
                "role": "teacher"
            })),
        ))
        .await
        .expect("create user");

    let status = response.status();
    let created = test_support::read_json(response).await;
    assert_eq!(status, StatusCode::CREATED, "response: {created}");
    assert_eq!(created["role"], "teacher");
    assert_eq!(created["created_by"], admin.id.as_str());
    let user_id = created["id"].as_str().expect("user id").to_string();

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::PATCH,
            &format!("/api/v1/users/{user_id}"),
            Some(&token),
            Some(json!({"full_name": "Olga Updated", "is_active": false})),
        ))
        .await
        .expect("update user");

    let status = response.status();
    let updated = test_support::read_json(response).await;
    assert_eq!(status, StatusCode::OK, "response: {updated}");
    assert_eq!(updated["full_name"], "Olga Updated");
    assert_eq!(updated["is_active"], false);

    let stored = repositories::users::find_by_id(ctx.state.db(), &user_id)
        .await
        .expect("fetch user")
        .expect("user exists");
    assert!(!stored.is_active);
}

#[tokio::test]
async fn teacher_creates_and_lists_only_own_students() {
    let ctx = test_support::setup_test_context().await;

    let teacher = test_support::insert_user(
        ctx.state.db(),
        "teacher1",
        "First Teacher",
        "teacher-pass",
        UserRole::Teacher,
        None,
    )
    .await;
    let other = test_support::insert_user(
        ctx.state.db(),
        "teacher2",
        "Second Teacher",
        "teacher-pass",
        UserRole::Teacher,
        None,
    )
    .await;
    let foreign = test_support::insert_user(
        ctx.state.db(),
        "foreign",
        "Foreign Student",
        "student-pass",
        UserRole::Student,
        Some(&other.id),
    )
    .await;
    let token = test_support::bearer_token(&teacher, ctx.state.settings());

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::POST,
            "/api/v1/users",
            Some(&token),
            Some(json!({
                "username": "pupil1",
                "full_name": "Pupil One",
                "password": "pupil-pass"
            })),
        ))
        .await
        .expect("create student");
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::POST,
            "/api/v1/users",
            Some(&token),
            Some(json!({
                "username": "sneaky",
                "full_name": "Sneaky Teacher",
                "password": "sneaky-pass",
                "role": "teacher"
            })),
        ))
        .await
        .expect("create teacher");
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(Method::GET, "/api/v1/users", Some(&token), None))
        .await
        .expect("list users");
    assert_eq!(response.status(), StatusCode::OK);
    let listed = test_support::read_json(response).await;
    let usernames: Vec<&str> = listed
        .as_array()
        .expect("array")
        .iter()
        .filter_map(|user| user["username"].as_str())
        .collect();
    assert_eq!(usernames, vec!["pupil1"]);

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::GET,
            &format!("/api/v1/users/{}", foreign.id),
            Some(&token),
            None,
        ))
        .await
        .expect("get foreign student");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn duplicate_username_conflicts_and_students_are_forbidden() {
    let ctx = test_support::setup_test_context().await;

    let admin = test_support::insert_user(
        ctx.state.db(),
        "admin001",
        "Admin User",
        "admin-pass",
        UserRole::Admin,
        None,
    )
    .await;
    let student = test_support::insert_user(
        ctx.state.db(),
        "student1",
        "Student One",
        "student-pass",
        UserRole::Student,
        Some(&admin.id),
    )
    .await;

    let admin_token = test_support::bearer_token(&admin, ctx.state.settings());
    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::POST,
            "/api/v1/users",
            Some(&admin_token),
            Some(json!({
                "username": "student1",
                "full_name": "Duplicate",
                "password": "student-pass"
            })),
        ))
        .await
        .expect("duplicate user");
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let student_token = test_support::bearer_token(&student, ctx.state.settings());
    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::GET,
            "/api/v1/users",
            Some(&student_token),
            None,
        ))
        .await
        .expect("student list");
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}
