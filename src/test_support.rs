use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request},
    Router,
};
use time::macros::datetime;
use time::PrimitiveDateTime;

use crate::api;
use crate::core::{config::Settings, security, state::AppState};
use crate::db::models::{Question, Test};
use crate::db::types::{AccessType, QuestionType};
use crate::repositories::{memory::MemoryStore, Repositories};
use crate::services::questions::{add_question, OptionDraft, QuestionDraft};
use crate::services::test_lifecycle::{
    create_test, publish_test, set_access_type, set_availability,
};

pub(crate) struct TestContext {
    pub(crate) state: AppState,
    pub(crate) app: Router,
    pub(crate) store: MemoryStore,
}

pub(crate) fn test_settings() -> Settings {
    Settings::for_tests()
}

/// Fixed clock for service-level tests.
pub(crate) fn now() -> PrimitiveDateTime {
    datetime!(2026-03-02 10:00:00)
}

pub(crate) fn memory_repos() -> (Repositories, MemoryStore) {
    let store = MemoryStore::new();
    (Repositories::memory(store.clone()), store)
}

pub(crate) fn setup_test_context() -> TestContext {
    let (repos, store) = memory_repos();
    let state = AppState::new(test_settings(), repos, None);
    let app = api::router::router(state.clone());
    TestContext { state, app, store }
}

/// Single-choice question with one right ("4") and one wrong ("5") option.
pub(crate) async fn add_choice_question(repos: &Repositories, test_id: &str, points: i32) -> Question {
    let test = repos.tests.find_by_id(test_id).await.expect("load test").expect("test exists");
    let draft = QuestionDraft {
        question_type: QuestionType::SingleChoice,
        text: "What is 2 + 2?".to_string(),
        is_required: true,
        points,
        media_url: None,
        options: vec![
            OptionDraft { text: "4".to_string(), is_correct: true, media_url: None },
            OptionDraft { text: "5".to_string(), is_correct: false, media_url: None },
        ],
    };
    add_question(repos, test_id, &test.owner_user_id, draft).await.expect("add question")
}

/// Published private test with a single 10-point question.
pub(crate) async fn published_test(repos: &Repositories, owner: &str) -> Test {
    let test = create_test(repos, owner, "Private quiz", "", now()).await.expect("create test");
    add_choice_question(repos, &test.id, 10).await;
    publish_test(repos, &test.id, owner, now()).await.expect("publish test")
}

/// Published public test with `question_count` 10-point questions; returns the first one.
pub(crate) async fn published_public_test(
    repos: &Repositories,
    owner: &str,
    question_count: usize,
) -> (Test, Question) {
    let test = create_test(repos, owner, "Public quiz", "", now()).await.expect("create test");
    let mut questions = Vec::with_capacity(question_count);
    for _ in 0..question_count {
        questions.push(add_choice_question(repos, &test.id, 10).await);
    }
    set_access_type(repos, &test.id, owner, AccessType::Public, now()).await.expect("access type");
    let test = publish_test(repos, &test.id, owner, now()).await.expect("publish test");
    (test, questions.remove(0))
}

/// Published test with one question, open only between `from` and `until`.
pub(crate) async fn published_windowed_test(
    repos: &Repositories,
    owner: &str,
    access_type: AccessType,
    from: Option<PrimitiveDateTime>,
    until: Option<PrimitiveDateTime>,
) -> Test {
    let test = create_test(repos, owner, "Timed quiz", "", now()).await.expect("create test");
    add_choice_question(repos, &test.id, 10).await;
    set_availability(repos, &test.id, owner, from, until, now()).await.expect("availability");
    set_access_type(repos, &test.id, owner, access_type, now()).await.expect("access type");
    publish_test(repos, &test.id, owner, now()).await.expect("publish test")
}

/// Public test owned by "owner" with a 10-point essay and a 10-point choice question.
pub(crate) async fn essay_and_choice_test() -> (Repositories, Test, Question, Question) {
    let (repos, _) = memory_repos();
    let (test, essay, choice) = add_essay_and_choice_test(&repos).await;
    (repos, test, essay, choice)
}

pub(crate) async fn add_essay_and_choice_test(repos: &Repositories) -> (Test, Question, Question) {
    let test = create_test(repos, "owner", "Mixed", "", now()).await.expect("create test");
    let essay = add_question(
        repos,
        &test.id,
        "owner",
        QuestionDraft {
            question_type: QuestionType::LongText,
            text: "Explain your reasoning".to_string(),
            is_required: true,
            points: 10,
            media_url: None,
            options: Vec::new(),
        },
    )
    .await
    .expect("add essay");
    let choice = add_choice_question(repos, &test.id, 10).await;
    set_access_type(repos, &test.id, "owner", AccessType::Public, now())
        .await
        .expect("access type");
    let test = publish_test(repos, &test.id, "owner", now()).await.expect("publish test");
    (test, essay, choice)
}

pub(crate) fn bearer_token(user_id: &str, settings: &Settings) -> String {
    security::create_access_token(user_id, settings, None).expect("token")
}

pub(crate) fn json_request(
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<serde_json::Value>,
) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);

    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }

    if let Some(body) = body {
        let bytes = serde_json::to_vec(&body).expect("serialize body");
        builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(bytes))
            .expect("request body")
    } else {
        builder.body(Body::empty()).expect("request body")
    }
}

pub(crate) async fn read_json(response: axum::response::Response<Body>) -> serde_json::Value {
    let body = to_bytes(response.into_body(), usize::MAX).await.expect("response body");
    serde_json::from_slice(&body).unwrap_or_else(|err| {
        let body_text = String::from_utf8_lossy(&body);
        panic!("json parse: {err}; body: {body_text}");
    })
}
