use axum::http::{Method, StatusCode};
use serde_json::json;
use tower::ServiceExt;

use crate::db::types::UserRole;
use crate::test_support;

#[tokio::test]
async fn teacher_builds_group_and_skips_non_students() {
    let ctx = test_support::setup_test_context().await;
    let db = ctx.state.db();

    let teacher =
        test_support::insert_user(db, "teacher1", "Teacher", "teacher-pass", UserRole::Teacher, None)
            .await;
    let anna =
        test_support::insert_user(db, "anna", "Anna", "student-pass", UserRole::Student, None).await;
    let boris =
        test_support::insert_user(db, "boris", "Boris", "student-pass", UserRole::Student, None)
            .await;
    let token = test_support::bearer_token(&teacher, ctx.state.settings());

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::POST,
            "/api/v1/groups",
            Some(&token),
            Some(json!({"name": "7A"})),
        ))
        .await
        .expect("create group");
    let status = response.status();
    let created = test_support::read_json(response).await;
    assert_eq!(status, StatusCode::CREATED, "response: {created}");
    let group_id = created["id"].as_str().expect("group id").to_string();

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::POST,
            &format!("/api/v1/groups/{group_id}/members"),
            Some(&token),
            Some(json!({"student_ids": [anna.id, boris.id, teacher.id, anna.id]})),
        ))
        .await
        .expect("add members");
    assert_eq!(response.status(), StatusCode::OK);
    let body = test_support::read_json(response).await;
    assert_eq!(body["added"], 2);
    assert_eq!(body["skipped"], json!([teacher.id]));

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::DELETE,
            &format!("/api/v1/groups/{group_id}/members/{}", boris.id),
            Some(&token),
            None,
        ))
        .await
        .expect("remove member");
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::GET,
            &format!("/api/v1/groups/{group_id}"),
            Some(&token),
            None,
        ))
        .await
        .expect("get group");
    assert_eq!(response.status(), StatusCode::OK);
    let body = test_support::read_json(response).await;
    assert_eq!(body["member_count"], 1);
    assert_eq!(body["members"][0]["username"], "anna");
}

#[tokio::test]
async fn other_teacher_cannot_touch_group() {
    let ctx = test_support::setup_test_context().await;
    let db = ctx.state.db();

    let owner =
        test_support::insert_user(db, "owner", "Owner", "teacher-pass", UserRole::Teacher, None)
            .await;
    let stranger =
        test_support::insert_user(db, "stranger", "Stranger", "teacher-pass", UserRole::Teacher, None)
            .await;
    let group_id = test_support::insert_group(db, "8B", &owner, &[]).await;
    let token = test_support::bearer_token(&stranger, ctx.state.settings());

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::DELETE,
            &format!("/api/v1/groups/{group_id}"),
            Some(&token),
            None,
        ))
        .await
        .expect("delete group");
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(Method::GET, "/api/v1/groups", Some(&token), None))
        .await
        .expect("list groups");
    let body = test_support::read_json(response).await;
    assert_eq!(body, json!([]));
}

#[tokio::test]
async fn owner_renames_group() {
    let ctx = test_support::setup_test_context().await;
    let db = ctx.state.db();

    let owner =
        test_support::insert_user(db, "owner", "Owner", "teacher-pass", UserRole::Teacher, None)
            .await;
    let stranger =
        test_support::insert_user(db, "stranger", "Stranger", "teacher-pass", UserRole::Teacher, None)
            .await;
    let anna =
        test_support::insert_user(db, "anna", "Anna", "student-pass", UserRole::Student, None).await;
    let group_id = test_support::insert_group(db, "9C", &owner, &[&anna]).await;
    let uri = format!("/api/v1/groups/{group_id}");

    let stranger_token = test_support::bearer_token(&stranger, ctx.state.settings());
    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::PATCH,
            &uri,
            Some(&stranger_token),
            Some(json!({"name": "Taken"})),
        ))
        .await
        .expect("rename by stranger");
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let token = test_support::bearer_token(&owner, ctx.state.settings());
    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::PATCH,
            &uri,
            Some(&token),
            Some(json!({"name": "   "})),
        ))
        .await
        .expect("blank rename");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::PATCH,
            &uri,
            Some(&token),
            Some(json!({"name": "  9C advanced "})),
        ))
        .await
        .expect("rename");
    assert_eq!(response.status(), StatusCode::OK);
    let body = test_support::read_json(response).await;
    assert_eq!(body["name"], "9C advanced");
    assert_eq!(body["member_count"], 1);

    let stored = crate::repositories::groups::find_by_id(db, &group_id)
        .await
        .expect("fetch group")
        .expect("group");
    assert_eq!(stored.name, "9C advanced");
}
