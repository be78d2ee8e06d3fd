use axum::http::{Method, StatusCode};
use serde_json::json;
use tower::ServiceExt;

use crate::test_support;

#[tokio::test]
async fn student_attempt_is_scored_then_manually_graded() {
    let ctx = test_support::setup_test_context();
    let (test, essay, choice) = test_support::add_essay_and_choice_test(ctx.state.repos()).await;
    let owner = test_support::bearer_token("owner", ctx.state.settings());
    let student = test_support::bearer_token("student-1", ctx.state.settings());
    let right = choice.options.iter().find(|option| option.is_correct).expect("right option");

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
        .expect("start attempt");

    let status = response.status();
    let attempt = test_support::read_json(response).await;
    assert_eq!(status, StatusCode::CREATED, "response: {attempt}");
    assert_eq!(attempt["status"], "in_progress");
    let attempt_id = attempt["id"].as_str().expect("attempt id").to_string();

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
        .expect("restart attempt");
    let resumed = test_support::read_json(response).await;
    assert_eq!(resumed["id"], attempt_id);

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::PUT,
            &format!("/api/v1/attempts/{attempt_id}/answers"),
            Some(&student),
            Some(json!({
                "question_id": choice.id,
                "answer": {"kind": "text", "text": "4"}
            })),
        ))
        .await
        .expect("save mismatched answer");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    for (question_id, answer) in [
        (&choice.id, json!({"kind": "single_option", "option_id": right.id})),
        (&essay.id, json!({"kind": "text", "text": "Because two plus two is four"})),
    ] {
        let response = ctx
            .app
            .clone()
            .oneshot(test_support::json_request(
                Method::PUT,
                &format!("/api/v1/attempts/{attempt_id}/answers"),
                Some(&student),
                Some(json!({"question_id": question_id, "answer": answer})),
            ))
            .await
            .expect("save answer");
        let status = response.status();
        let saved = test_support::read_json(response).await;
        assert_eq!(status, StatusCode::OK, "response: {saved}");
        assert_eq!(saved["question_id"], question_id.as_str());
    }

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::GET,
            &format!("/api/v1/attempts/{attempt_id}/result"),
            Some(&student),
            None,
        ))
        .await
        .expect("early result");
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::POST,
            &format!("/api/v1/attempts/{attempt_id}/submit"),
            Some(&student),
            None,
        ))
        .await
        .expect("submit");

    let status = response.status();
    let submitted = test_support::read_json(response).await;
    assert_eq!(status, StatusCode::OK, "response: {submitted}");
    assert_eq!(submitted["status"], "submitted");
    assert_eq!(submitted["score"], 50);

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::POST,
            &format!("/api/v1/attempts/{attempt_id}/submit"),
            Some(&student),
            None,
        ))
        .await
        .expect("double submit");
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::GET,
            &format!("/api/v1/tests/{}/pending-review", test.id),
            Some(&student),
            None,
        ))
        .await
        .expect("student pending review");
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::GET,
            &format!("/api/v1/tests/{}/pending-review", test.id),
            Some(&owner),
            None,
        ))
        .await
        .expect("owner pending review");

    let status = response.status();
    let pending = test_support::read_json(response).await;
    assert_eq!(status, StatusCode::OK, "response: {pending}");
    let pending = pending.as_array().expect("pending list");
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0]["question_id"], essay.id);

    let intruder = test_support::bearer_token("student-2", ctx.state.settings());
    for (token, points, expected) in [
        (&intruder, -1, StatusCode::FORBIDDEN),
        (&owner, -1, StatusCode::UNPROCESSABLE_ENTITY),
        (&owner, 11, StatusCode::UNPROCESSABLE_ENTITY),
    ] {
        let response = ctx
            .app
            .clone()
            .oneshot(test_support::json_request(
                Method::POST,
                &format!("/api/v1/attempts/{attempt_id}/answers/{}/grade", essay.id),
                Some(token.as_str()),
                Some(json!({"points": points})),
            ))
            .await
            .expect("grade out of range");
        assert_eq!(response.status(), expected, "points {points}");
    }

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::POST,
            &format!("/api/v1/attempts/{attempt_id}/answers/{}/grade", essay.id),
            Some(&owner),
            Some(json!({"points": 8, "feedback": "Show more steps"})),
        ))
        .await
        .expect("grade essay");

    let status = response.status();
    let graded = test_support::read_json(response).await;
    assert_eq!(status, StatusCode::OK, "response: {graded}");
    assert_eq!(graded["score"], 90);

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::GET,
            &format!("/api/v1/attempts/{attempt_id}/result"),
            Some(&student),
            None,
        ))
        .await
        .expect("result");

    let status = response.status();
    let result = test_support::read_json(response).await;
    assert_eq!(status, StatusCode::OK, "response: {result}");
    assert_eq!(result["score"], 90);
    assert_eq!(result["earned_points"], 18);
    assert_eq!(result["total_points"], 20);
    assert_eq!(result["question_count"], 2);
    let essay_row = result["questions"]
        .as_array()
        .expect("question results")
        .iter()
        .find(|row| row["question_id"] == essay.id.as_str())
        .expect("essay row");
    assert_eq!(essay_row["feedback"], "Show more steps");
    assert!(essay_row["correct_answer"].is_null());

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::GET,
            &format!("/api/v1/tests/{}/results", test.id),
            Some(&owner),
            None,
        ))
        .await
        .expect("test results");
    let rows = test_support::read_json(response).await;
    assert_eq!(rows.as_array().expect("result rows").len(), 1);
    assert_eq!(rows[0]["user_id"], "student-1");

    let response = ctx
        .app
        .oneshot(test_support::json_request(
            Method::GET,
            "/api/v1/attempts/mine",
            Some(&student),
            None,
        ))
        .await
        .expect("my attempts");

    let status = response.status();
    let mine = test_support::read_json(response).await;
    assert_eq!(status, StatusCode::OK, "response: {mine}");
    assert_eq!(mine.as_array().expect("attempt list").len(), 1);
}

#[tokio::test]
async fn attempts_are_private_to_student_and_owner() {
    let ctx = test_support::setup_test_context();
    let (test, _) = test_support::published_public_test(ctx.state.repos(), "teacher-1", 1).await;
    let owner = test_support::bearer_token("teacher-1", ctx.state.settings());
    let student = test_support::bearer_token("student-1", ctx.state.settings());
    let other = test_support::bearer_token("student-2", ctx.state.settings());

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
        .expect("start attempt");
    let attempt = test_support::read_json(response).await;
    let attempt_id = attempt["id"].as_str().expect("attempt id").to_string();

    for (token, expected) in
        [(&student, StatusCode::OK), (&owner, StatusCode::OK), (&other, StatusCode::FORBIDDEN)]
    {
        let response = ctx
            .app
            .clone()
            .oneshot(test_support::json_request(
                Method::GET,
                &format!("/api/v1/attempts/{attempt_id}"),
                Some(token.as_str()),
                None,
            ))
            .await
            .expect("get attempt");
        assert_eq!(response.status(), expected);
    }

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::POST,
            &format!("/api/v1/attempts/{attempt_id}/submit"),
            Some(&other),
            None,
        ))
        .await
        .expect("foreign submit");
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::GET,
            &format!("/api/v1/tests/{}/attempts", test.id),
            Some(&owner),
            None,
        ))
        .await
        .expect("owner lists attempts");

    let status = response.status();
    let attempts = test_support::read_json(response).await;
    assert_eq!(status, StatusCode::OK, "response: {attempts}");
    assert_eq!(attempts.as_array().expect("attempt list").len(), 1);

    let response = ctx
        .app
        .oneshot(test_support::json_request(
            Method::GET,
            "/api/v1/attempts/missing",
            Some(&student),
            None,
        ))
        .await
        .expect("missing attempt");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
