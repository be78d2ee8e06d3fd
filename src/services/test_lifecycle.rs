//! Draft/Published state machine of a test and its owner-side commands.
//!
//! The pure transitions (`apply_update`, `publish`, `unpublish`, ...) mutate a
//! `Test` in memory; the async commands load, check ownership, transition and
//! persist.

use time::PrimitiveDateTime;
use uuid::Uuid;

use crate::db::models::{Question, Test};
use crate::db::types::{AccessType, AttemptStatus, TestStatus};
use crate::repositories::Repositories;
use crate::services::access_resolver;
use crate::services::errors::{ServiceError, ServiceResult};

const MAX_PASS_SCORE: i32 = 100;

#[derive(Debug, Clone, Default)]
pub(crate) struct TestChanges {
    pub(crate) title: Option<String>,
    pub(crate) description: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct SettingsChanges {
    pub(crate) pass_score: Option<i32>,
    pub(crate) attempts_limit: Option<i32>,
    /// `Some(None)` removes the time limit.
    pub(crate) time_limit_seconds: Option<Option<i32>>,
}

/// A test together with its questions as seen by a particular caller.
#[derive(Debug, Clone)]
pub(crate) struct TestDetails {
    pub(crate) test: Test,
    pub(crate) questions: Vec<Question>,
    pub(crate) reveal_answers: bool,
}

pub(crate) fn new_test(
    owner_user_id: &str,
    title: &str,
    description: &str,
    now: PrimitiveDateTime,
) -> ServiceResult<Test> {
    let title = normalized_title(title)?;
    Ok(Test {
        id: Uuid::new_v4().to_string(),
        title,
        description: description.trim().to_string(),
        owner_user_id: owner_user_id.to_string(),
        status: TestStatus::Draft,
        time_limit_seconds: None,
        pass_score: 0,
        attempts_limit: 1,
        access_type: AccessType::Private,
        available_from: None,
        available_until: None,
        created_at: now,
        updated_at: now,
        published_at: None,
    })
}

fn normalized_title(title: &str) -> ServiceResult<String> {
    let title = title.trim();
    if title.is_empty() {
        return Err(ServiceError::validation("Title must not be empty"));
    }
    Ok(title.to_string())
}

fn ensure_draft(test: &Test) -> ServiceResult<()> {
    if test.status == TestStatus::Published {
        return Err(ServiceError::invalid_state(
            "Published tests cannot be edited; unpublish the test first",
        ));
    }
    Ok(())
}

/// Full update of the editable fields. Rejected once the test is published.
pub(crate) fn apply_update(
    test: &mut Test,
    title: &str,
    description: &str,
    pass_score: i32,
    attempts_limit: i32,
    time_limit_seconds: Option<i32>,
    now: PrimitiveDateTime,
) -> ServiceResult<()> {
    ensure_draft(test)?;
    let title = normalized_title(title)?;
    if !(0..=MAX_PASS_SCORE).contains(&pass_score) {
        return Err(ServiceError::validation("Pass score must be between 0 and 100"));
    }
    if attempts_limit <= 0 {
        return Err(ServiceError::validation("Attempts limit must be positive"));
    }
    if time_limit_seconds.is_some_and(|limit| limit <= 0) {
        return Err(ServiceError::validation("Time limit must be positive"));
    }

    test.title = title;
    test.description = description.trim().to_string();
    test.pass_score = pass_score;
    test.attempts_limit = attempts_limit;
    test.time_limit_seconds = time_limit_seconds;
    test.updated_at = now;
    Ok(())
}

pub(crate) fn publish(
    test: &mut Test,
    question_count: i64,
    now: PrimitiveDateTime,
) -> ServiceResult<()> {
    if test.status != TestStatus::Draft {
        return Err(ServiceError::invalid_state("Only draft tests can be published"));
    }
    if question_count == 0 {
        return Err(ServiceError::invalid_state("A test needs at least one question to be published"));
    }
    test.status = TestStatus::Published;
    test.published_at = Some(now);
    test.updated_at = now;
    Ok(())
}

pub(crate) fn unpublish(test: &mut Test, now: PrimitiveDateTime) -> ServiceResult<()> {
    if test.status != TestStatus::Published {
        return Err(ServiceError::invalid_state("Only published tests can be unpublished"));
    }
    test.status = TestStatus::Draft;
    test.published_at = None;
    test.updated_at = now;
    Ok(())
}

pub(crate) fn apply_access_type(
    test: &mut Test,
    access_type: AccessType,
    now: PrimitiveDateTime,
) -> ServiceResult<()> {
    ensure_draft(test)?;
    test.access_type = access_type;
    test.updated_at = now;
    Ok(())
}

pub(crate) fn apply_availability(
    test: &mut Test,
    available_from: Option<PrimitiveDateTime>,
    available_until: Option<PrimitiveDateTime>,
    now: PrimitiveDateTime,
) -> ServiceResult<()> {
    ensure_draft(test)?;
    if let (Some(from), Some(until)) = (available_from, available_until) {
        if from >= until {
            return Err(ServiceError::validation(
                "Availability start must be before availability end",
            ));
        }
    }
    test.available_from = available_from;
    test.available_until = available_until;
    test.updated_at = now;
    Ok(())
}

pub(crate) async fn load_test(repos: &Repositories, test_id: &str) -> ServiceResult<Test> {
    repos.tests.find_by_id(test_id).await?.ok_or_else(|| ServiceError::not_found("Test"))
}

/// Loads a test the caller owns.
pub(crate) async fn load_owned(
    repos: &Repositories,
    test_id: &str,
    caller_id: &str,
) -> ServiceResult<Test> {
    let test = load_test(repos, test_id).await?;
    if test.owner_user_id != caller_id {
        return Err(ServiceError::Forbidden("Only the test owner can perform this action"));
    }
    Ok(test)
}

pub(crate) async fn create_test(
    repos: &Repositories,
    owner_user_id: &str,
    title: &str,
    description: &str,
    now: PrimitiveDateTime,
) -> ServiceResult<Test> {
    let test = new_test(owner_user_id, title, description, now)?;
    repos.tests.add(&test).await?;
    tracing::info!(test_id = %test.id, owner_user_id, "Test created");
    Ok(test)
}

pub(crate) async fn update_test(
    repos: &Repositories,
    test_id: &str,
    caller_id: &str,
    changes: TestChanges,
    now: PrimitiveDateTime,
) -> ServiceResult<Test> {
    let mut test = load_owned(repos, test_id, caller_id).await?;
    let title = changes.title.unwrap_or_else(|| test.title.clone());
    let description = changes.description.unwrap_or_else(|| test.description.clone());
    let (pass_score, attempts_limit, time_limit) =
        (test.pass_score, test.attempts_limit, test.time_limit_seconds);
    apply_update(&mut test, &title, &description, pass_score, attempts_limit, time_limit, now)?;
    repos.tests.update(&test).await?;
    Ok(test)
}

pub(crate) async fn update_settings(
    repos: &Repositories,
    test_id: &str,
    caller_id: &str,
    changes: SettingsChanges,
    now: PrimitiveDateTime,
) -> ServiceResult<Test> {
    let mut test = load_owned(repos, test_id, caller_id).await?;
    let title = test.title.clone();
    let description = test.description.clone();
    let pass_score = changes.pass_score.unwrap_or(test.pass_score);
    let attempts_limit = changes.attempts_limit.unwrap_or(test.attempts_limit);
    let time_limit = changes.time_limit_seconds.unwrap_or(test.time_limit_seconds);
    apply_update(&mut test, &title, &description, pass_score, attempts_limit, time_limit, now)?;
    repos.tests.update(&test).await?;
    Ok(test)
}

pub(crate) async fn publish_test(
    repos: &Repositories,
    test_id: &str,
    caller_id: &str,
    now: PrimitiveDateTime,
) -> ServiceResult<Test> {
    let mut test = load_owned(repos, test_id, caller_id).await?;
    let question_count = repos.questions.count_by_test(&test.id).await?;
    publish(&mut test, question_count, now)?;
    repos.tests.update(&test).await?;
    tracing::info!(test_id = %test.id, question_count, "Test published");
    Ok(test)
}

pub(crate) async fn unpublish_test(
    repos: &Repositories,
    test_id: &str,
    caller_id: &str,
    now: PrimitiveDateTime,
) -> ServiceResult<Test> {
    let mut test = load_owned(repos, test_id, caller_id).await?;
    unpublish(&mut test, now)?;
    repos.tests.update(&test).await?;
    tracing::info!(test_id = %test.id, "Test unpublished");
    Ok(test)
}

pub(crate) async fn set_access_type(
    repos: &Repositories,
    test_id: &str,
    caller_id: &str,
    access_type: AccessType,
    now: PrimitiveDateTime,
) -> ServiceResult<Test> {
    let mut test = load_owned(repos, test_id, caller_id).await?;
    apply_access_type(&mut test, access_type, now)?;
    repos.tests.update(&test).await?;
    Ok(test)
}

pub(crate) async fn set_availability(
    repos: &Repositories,
    test_id: &str,
    caller_id: &str,
    available_from: Option<PrimitiveDateTime>,
    available_until: Option<PrimitiveDateTime>,
    now: PrimitiveDateTime,
) -> ServiceResult<Test> {
    let mut test = load_owned(repos, test_id, caller_id).await?;
    apply_availability(&mut test, available_from, available_until, now)?;
    repos.tests.update(&test).await?;
    Ok(test)
}

pub(crate) async fn delete_test(
    repos: &Repositories,
    test_id: &str,
    caller_id: &str,
) -> ServiceResult<()> {
    let test = load_owned(repos, test_id, caller_id).await?;
    let attempts = repos.attempts.list_by_test(&test.id).await?;
    if attempts.iter().any(|attempt| attempt.status == AttemptStatus::InProgress) {
        return Err(ServiceError::invalid_state(
            "Test has attempts in progress and cannot be deleted",
        ));
    }
    repos.tests.delete(&test.id).await?;
    tracing::info!(test_id = %test.id, attempts = attempts.len(), "Test deleted");
    Ok(())
}

/// Owners see any state with correct answers; everyone else only sees tests
/// they could attempt right now, without answer keys.
pub(crate) async fn get_test(
    repos: &Repositories,
    test_id: &str,
    caller_id: &str,
    now: PrimitiveDateTime,
) -> ServiceResult<TestDetails> {
    let test = load_test(repos, test_id).await?;
    let is_owner = test.owner_user_id == caller_id;
    if !is_owner && !access_resolver::can_attempt(repos, &test, caller_id, now).await? {
        return Err(ServiceError::not_found("Test"));
    }
    let questions = repos.questions.list_by_test(&test.id).await?;
    Ok(TestDetails { test, questions, reveal_answers: is_owner })
}

pub(crate) async fn list_my_tests(repos: &Repositories, owner_user_id: &str) -> ServiceResult<Vec<Test>> {
    Ok(repos.tests.list_by_owner(owner_user_id).await?)
}
