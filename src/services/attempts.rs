//! Attempt lifecycle: InProgress -> Submitted.

use sqlx::types::Json;
use time::{Duration, PrimitiveDateTime};
use uuid::Uuid;

use crate::db::models::{AnswerPayload, Attempt, AttemptAnswer, Question};
use crate::db::types::{AttemptStatus, TestStatus};
use crate::repositories::{InsertOutcome, Repositories};
use crate::services::access_resolver::{self, AccessDecision};
use crate::services::errors::{ServiceError, ServiceResult};
use crate::services::scoring::{grade_answer, summarize};
use crate::services::test_lifecycle::{load_owned, load_test};

/// Loads an attempt with its answers.
pub(crate) async fn load_attempt(repos: &Repositories, attempt_id: &str) -> ServiceResult<Attempt> {
    repos.attempts.find_by_id(attempt_id).await?.ok_or_else(|| ServiceError::not_found("Attempt"))
}

/// Loads an attempt that belongs to the caller and is still in progress.
async fn load_active_for(
    repos: &Repositories,
    attempt_id: &str,
    caller_id: &str,
) -> ServiceResult<Attempt> {
    let attempt = load_attempt(repos, attempt_id).await?;
    if attempt.user_id != caller_id {
        return Err(ServiceError::Forbidden("Attempt belongs to another user"));
    }
    if attempt.status != AttemptStatus::InProgress {
        return Err(ServiceError::invalid_state("Attempt is already submitted"));
    }
    Ok(attempt)
}

/// Resumes the caller's in-progress attempt or opens a new one once the test is
/// published, available and within the attempts limit.
pub(crate) async fn start_attempt(
    repos: &Repositories,
    test_id: &str,
    user_id: &str,
    now: PrimitiveDateTime,
) -> ServiceResult<Attempt> {
    let test = load_test(repos, test_id).await?;
    if test.status != TestStatus::Published {
        return Err(ServiceError::invalid_state("Test is not published"));
    }

    if let Some(active) = repos.attempts.find_active(&test.id, user_id).await? {
        return Ok(active);
    }

    match access_resolver::resolve(repos, &test, user_id, now).await? {
        AccessDecision::Allowed => {}
        AccessDecision::NotAvailable => {
            return Err(ServiceError::invalid_state("Test is not available at this time"));
        }
        AccessDecision::NoGrant => {
            return Err(ServiceError::Forbidden("No access to this test"));
        }
    }

    let previous = repos.attempts.count_by_test_and_user(&test.id, user_id).await?;
    if previous >= i64::from(test.attempts_limit) {
        // A concurrent start may have just created the active attempt.
        if let Some(active) = repos.attempts.find_active(&test.id, user_id).await? {
            return Ok(active);
        }
        return Err(ServiceError::invalid_state("Attempts limit exceeded"));
    }

    let attempt = Attempt {
        id: Uuid::new_v4().to_string(),
        test_id: test.id.clone(),
        user_id: user_id.to_string(),
        status: AttemptStatus::InProgress,
        started_at: now,
        submitted_at: None,
        score: None,
        is_passed: None,
        answers: Vec::new(),
    };

    match repos.attempts.insert_or_get_active(&attempt).await? {
        InsertOutcome::Inserted(attempt) => {
            tracing::info!(
                attempt_id = %attempt.id,
                test_id = %attempt.test_id,
                user_id,
                attempt_number = previous + 1,
                "Attempt started"
            );
            Ok(attempt)
        }
        InsertOutcome::AlreadyExists(existing) => {
            tracing::debug!(
                attempt_id = %existing.id,
                user_id,
                "Concurrent start resolved to existing attempt"
            );
            Ok(existing)
        }
    }
}

fn validate_payload(question: &Question, payload: &AnswerPayload) -> ServiceResult<()> {
    if !payload.fits(question.question_type) {
        return Err(ServiceError::validation(format!(
            "Answer of kind '{}' does not fit this question",
            payload.kind()
        )));
    }

    let known = |option_id: &String| question.options.iter().any(|option| option.id == *option_id);
    let all_known = match payload {
        AnswerPayload::SingleOption { option_id } => known(option_id),
        AnswerPayload::MultipleOptions { option_ids } => option_ids.iter().all(known),
        AnswerPayload::Text { .. } => true,
    };
    if !all_known {
        return Err(ServiceError::validation("Answer references an unknown option"));
    }
    Ok(())
}

/// Stores the caller's answer, replacing any earlier one for the same question.
pub(crate) async fn save_answer(
    repos: &Repositories,
    attempt_id: &str,
    question_id: &str,
    payload: AnswerPayload,
    caller_id: &str,
    now: PrimitiveDateTime,
) -> ServiceResult<AttemptAnswer> {
    let attempt = load_active_for(repos, attempt_id, caller_id).await?;
    let test = load_test(repos, &attempt.test_id).await?;

    if let Some(limit) = test.time_limit_seconds {
        if now - attempt.started_at > Duration::seconds(i64::from(limit)) {
            return Err(ServiceError::invalid_state("Time limit expired"));
        }
    }

    let question = repos
        .questions
        .find_by_id(question_id)
        .await?
        .filter(|question| question.test_id == attempt.test_id)
        .ok_or_else(|| ServiceError::not_found("Question"))?;
    validate_payload(&question, &payload)?;

    let answer = AttemptAnswer {
        id: Uuid::new_v4().to_string(),
        attempt_id: attempt.id.clone(),
        question_id: question.id.clone(),
        answer: Json(payload),
        is_correct: None,
        points_awarded: None,
        manual_grading_required: false,
        feedback: None,
        created_at: now,
        updated_at: now,
    };

    repos
        .attempts
        .upsert_answer(&answer)
        .await?
        .ok_or_else(|| ServiceError::invalid_state("Attempt is already submitted"))
}

/// Grades `answers` in place and returns `(score, is_passed)`.
fn grade_stored_answers(
    questions: &[Question],
    pass_score: i32,
    graded_at: PrimitiveDateTime,
    answers: &mut [AttemptAnswer],
) -> (i32, bool) {
    for answer in answers.iter_mut() {
        let Some(question) = questions.iter().find(|question| question.id == answer.question_id)
        else {
            continue;
        };
        let grade = grade_answer(question, &answer.answer);
        answer.is_correct = (!grade.manual_grading_required).then_some(grade.is_correct);
        answer.points_awarded = Some(grade.points);
        answer.manual_grading_required = grade.manual_grading_required;
        answer.updated_at = graded_at;
    }

    let summary = summarize(questions, answers);
    (summary.score, summary.score >= pass_score)
}

/// Grades every answer and closes the attempt. Grading runs against the
/// answers stored when the attempt is locked, and the status change is the only
/// gate against a double submit.
pub(crate) async fn submit_attempt(
    repos: &Repositories,
    attempt_id: &str,
    caller_id: &str,
    now: PrimitiveDateTime,
) -> ServiceResult<Attempt> {
    let attempt = load_active_for(repos, attempt_id, caller_id).await?;
    let test = load_test(repos, &attempt.test_id).await?;
    let questions = repos.questions.list_by_test(&test.id).await?;

    let grade = |answers: &mut [AttemptAnswer]| {
        grade_stored_answers(&questions, test.pass_score, now, answers)
    };
    let attempt = repos
        .attempts
        .finalize(&attempt.id, now, &grade)
        .await?
        .ok_or_else(|| ServiceError::invalid_state("Attempt is already submitted"))?;

    let summary = summarize(&questions, &attempt.answers);
    tracing::info!(
        attempt_id = %attempt.id,
        test_id = %test.id,
        score = summary.score,
        earned_points = summary.earned_points,
        total_points = summary.total_points,
        "Attempt submitted"
    );
    Ok(attempt)
}

/// Visible to the student who made the attempt and to the test owner.
pub(crate) async fn get_attempt(
    repos: &Repositories,
    attempt_id: &str,
    caller_id: &str,
) -> ServiceResult<Attempt> {
    let attempt = load_attempt(repos, attempt_id).await?;
    if attempt.user_id == caller_id {
        return Ok(attempt);
    }
    let test = load_test(repos, &attempt.test_id).await?;
    if test.owner_user_id != caller_id {
        return Err(ServiceError::Forbidden("Attempt belongs to another user"));
    }
    Ok(attempt)
}

pub(crate) async fn my_attempts(repos: &Repositories, caller_id: &str) -> ServiceResult<Vec<Attempt>> {
    Ok(repos.attempts.list_by_user(caller_id).await?)
}

/// Every attempt on a test, for its owner.
pub(crate) async fn test_attempts(
    repos: &Repositories,
    test_id: &str,
    caller_id: &str,
) -> ServiceResult<Vec<Attempt>> {
    let test = load_owned(repos, test_id, caller_id).await?;
    Ok(repos.attempts.list_by_test(&test.id).await?)
}
