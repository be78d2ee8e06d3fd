use axum::http::{Method, StatusCode};
use serde_json::json;
use tower::ServiceExt;

use crate::test_support;

#[tokio::test]
async fn invite_link_admits_a_single_student() {
    let ctx = test_support::setup_test_context();
    let test = test_support::published_test(ctx.state.repos(), "teacher-1").await;
    let owner = test_support::bearer_token("teacher-1", ctx.state.settings());
    let first = test_support::bearer_token("student-1", ctx.state.settings());
    let second = test_support::bearer_token("student-2", ctx.state.settings());

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::POST,
            &format!("/api/v1/tests/{}/access/invites", test.id),
            Some(&owner),
            Some(json!({"max_uses": 1})),
        ))
        .await
        .expect("create invite");

    let status = response.status();
    let invite = test_support::read_json(response).await;
    assert_eq!(status, StatusCode::CREATED, "response: {invite}");
    assert_eq!(invite["grant_type"], "invite_link");
    let code = invite["invite_code"].as_str().expect("invite code").to_string();
    assert_eq!(invite["join_url"], format!("https://quiz.example.com/join/{code}"));

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::POST,
            &format!("/api/v1/invites/{code}/join"),
            Some(&first),
            None,
        ))
        .await
        .expect("first join");

    let status = response.status();
    let joined = test_support::read_json(response).await;
    assert_eq!(status, StatusCode::OK, "response: {joined}");
    assert_eq!(joined["test"]["id"], test.id);
    assert_eq!(joined["access"]["grant_type"], "user");
    assert_eq!(joined["access"]["user_id"], "student-1");

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::POST,
            &format!("/api/v1/invites/{code}/join"),
            Some(&second),
            None,
        ))
        .await
        .expect("second join");
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::POST,
            "/api/v1/invites/no-such-code/join",
            Some(&second),
            None,
        ))
        .await
        .expect("unknown code");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = ctx
        .app
        .oneshot(test_support::json_request(
            Method::GET,
            &format!("/api/v1/tests/{}/access", test.id),
            Some(&owner),
            None,
        ))
        .await
        .expect("list access");

    let status = response.status();
    let grants = test_support::read_json(response).await;
    assert_eq!(status, StatusCode::OK, "response: {grants}");
    let grants = grants.as_array().expect("grant list");
    assert_eq!(grants.len(), 2);
    let invite_row =
        grants.iter().find(|grant| grant["grant_type"] == "invite_link").expect("invite row");
    assert_eq!(invite_row["used_count"], 1);
}

#[tokio::test]
async fn duplicate_user_grant_conflicts_and_revoke_expires_it() {
    let ctx = test_support::setup_test_context();
    let test = test_support::published_test(ctx.state.repos(), "teacher-1").await;
    let owner = test_support::bearer_token("teacher-1", ctx.state.settings());
    let student = test_support::bearer_token("student-1", ctx.state.settings());

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::POST,
            &format!("/api/v1/tests/{}/access/users", test.id),
            Some(&owner),
            Some(json!({"user_id": "student-1"})),
        ))
        .await
        .expect("grant user");

    let status = response.status();
    let grant = test_support::read_json(response).await;
    assert_eq!(status, StatusCode::CREATED, "response: {grant}");
    let access_id = grant["id"].as_str().expect("access id").to_string();

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::POST,
            &format!("/api/v1/tests/{}/access/users", test.id),
            Some(&owner),
            Some(json!({"userId": "student-1"})),
        ))
        .await
        .expect("duplicate grant");
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::POST,
            &format!("/api/v1/tests/{}/attempts", test.id),
            Some(&student),
            None,
        ))
        .await
        .expect("start with grant");
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::DELETE,
            &format!("/api/v1/access/{access_id}"),
            Some(&student),
            None,
        ))
        .await
        .expect("student revoke");
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = ctx
        .app
        .oneshot(test_support::json_request(
            Method::DELETE,
            &format!("/api/v1/access/{access_id}"),
            Some(&owner),
            None,
        ))
        .await
        .expect("owner revoke");

    let status = response.status();
    let revoked = test_support::read_json(response).await;
    assert_eq!(status, StatusCode::OK, "response: {revoked}");
    assert!(revoked["expires_at"].is_string());
}

#[tokio::test]
async fn group_grant_admits_members_only() {
    let ctx = test_support::setup_test_context();
    let test = test_support::published_test(ctx.state.repos(), "teacher-1").await;
    ctx.store.add_group_member("class-7b", "student-1");
    let owner = test_support::bearer_token("teacher-1", ctx.state.settings());
    let member = test_support::bearer_token("student-1", ctx.state.settings());
    let outsider = test_support::bearer_token("student-2", ctx.state.settings());

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::POST,
            &format!("/api/v1/tests/{}/access/groups", test.id),
            Some(&owner),
            Some(json!({"group_id": "class-7b"})),
        ))
        .await
        .expect("grant group");
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::POST,
            &format!("/api/v1/tests/{}/attempts", test.id),
            Some(&outsider),
            None,
        ))
        .await
        .expect("outsider start");
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = ctx
        .app
        .oneshot(test_support::json_request(
            Method::POST,
            &format!("/api/v1/tests/{}/attempts", test.id),
            Some(&member),
            None,
        ))
        .await
        .expect("member start");
    assert_eq!(response.status(), StatusCode::CREATED);
}
