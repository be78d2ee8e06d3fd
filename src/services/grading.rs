//! Manual grading of answers that scoring could not decide on its own.

use time::PrimitiveDateTime;

use crate::db::models::{Attempt, AttemptAnswer, Question};
use crate::db::types::AttemptStatus;
use crate::repositories::Repositories;
use crate::services::attempts::load_attempt;
use crate::services::errors::{ServiceError, ServiceResult};
use crate::services::scoring::summarize;
use crate::services::test_lifecycle::{load_owned, load_test};

#[derive(Debug, Clone)]
pub(crate) struct PendingAnswer {
    pub(crate) attempt_id: String,
    pub(crate) user_id: String,
    pub(crate) question: Question,
    pub(crate) answer: AttemptAnswer,
}

pub(crate) fn is_pending(answer: &AttemptAnswer) -> bool {
    answer.manual_grading_required && answer.is_correct.is_none()
}

/// Overwrites the grade of one manually graded answer and recomputes the
/// attempt score from every answer's awarded points.
pub(crate) async fn grade_answer(
    repos: &Repositories,
    attempt_id: &str,
    question_id: &str,
    points: i32,
    feedback: Option<String>,
    grader_id: &str,
    now: PrimitiveDateTime,
) -> ServiceResult<Attempt> {
    let attempt = load_attempt(repos, attempt_id).await?;
    let test = load_test(repos, &attempt.test_id).await?;
    if test.owner_user_id != grader_id {
        return Err(ServiceError::Forbidden("Only the test owner can grade answers"));
    }
    if attempt.status != AttemptStatus::Submitted {
        return Err(ServiceError::invalid_state("Only submitted attempts can be graded"));
    }

    let mut answer = attempt
        .answer_for(question_id)
        .cloned()
        .ok_or_else(|| ServiceError::not_found("Answer"))?;
    if !answer.manual_grading_required {
        return Err(ServiceError::invalid_state("Answer does not require manual grading"));
    }

    let questions = repos.questions.list_by_test(&test.id).await?;
    let question = questions
        .iter()
        .find(|question| question.id == question_id)
        .ok_or_else(|| ServiceError::not_found("Question"))?;
    if !(0..=question.points).contains(&points) {
        return Err(ServiceError::invalid_state(format!(
            "Points must be between 0 and {}",
            question.points
        )));
    }

    answer.points_awarded = Some(points);
    answer.is_correct = Some(points == question.points);
    answer.feedback = feedback.map(|text| text.trim().to_string()).filter(|text| !text.is_empty());
    answer.updated_at = now;

    let pass_score = test.pass_score;
    let rescore = |answers: &[AttemptAnswer]| {
        let summary = summarize(&questions, answers);
        (summary.score, summary.score >= pass_score)
    };
    let graded = repos
        .attempts
        .apply_grade(&answer, &rescore)
        .await?
        .ok_or_else(|| ServiceError::invalid_state("Only submitted attempts can be graded"))?;

    tracing::info!(
        attempt_id = %graded.id,
        question_id,
        points,
        score = ?graded.score,
        grader_id,
        "Answer graded"
    );
    Ok(graded)
}

pub(crate) async fn pending_review(
    repos: &Repositories,
    test_id: &str,
    caller_id: &str,
) -> ServiceResult<Vec<PendingAnswer>> {
    let test = load_owned(repos, test_id, caller_id).await?;
    let questions = repos.questions.list_by_test(&test.id).await?;
    let attempts = repos.attempts.list_by_test(&test.id).await?;

    let mut pending = Vec::new();
    for attempt in attempts.into_iter().filter(|attempt| attempt.status == AttemptStatus::Submitted) {
        for answer in attempt.answers.iter().filter(|answer| is_pending(answer)) {
            let Some(question) = questions.iter().find(|question| question.id == answer.question_id)
            else {
                continue;
            };
            pending.push(PendingAnswer {
                attempt_id: attempt.id.clone(),
                user_id: attempt.user_id.clone(),
                question: question.clone(),
                answer: answer.clone(),
            });
        }
    }
    Ok(pending)
}
