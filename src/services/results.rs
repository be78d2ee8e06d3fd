//! Student- and teacher-facing views of submitted attempts.

use time::PrimitiveDateTime;

use crate::core::time::seconds_between;
use crate::db::models::{AnswerPayload, Attempt, Question, Test};
use crate::db::types::{AttemptStatus, QuestionType};
use crate::repositories::Repositories;
use crate::services::attempts::get_attempt;
use crate::services::errors::{ServiceError, ServiceResult};
use crate::services::scoring::summarize;
use crate::services::test_lifecycle::{load_owned, load_test};

#[derive(Debug, Clone)]
pub(crate) struct QuestionResult {
    pub(crate) question_id: String,
    pub(crate) question_type: QuestionType,
    pub(crate) text: String,
    pub(crate) max_points: i32,
    pub(crate) submitted: Option<AnswerPayload>,
    pub(crate) is_correct: Option<bool>,
    pub(crate) points_awarded: Option<i32>,
    pub(crate) manual_grading_required: bool,
    pub(crate) feedback: Option<String>,
    pub(crate) correct_answer: Option<AnswerPayload>,
}

#[derive(Debug, Clone)]
pub(crate) struct AttemptResult {
    pub(crate) attempt_id: String,
    pub(crate) test_id: String,
    pub(crate) test_title: String,
    pub(crate) user_id: String,
    pub(crate) score: i32,
    pub(crate) is_passed: bool,
    pub(crate) total_points: i32,
    pub(crate) earned_points: i32,
    pub(crate) question_count: usize,
    pub(crate) correct_count: i32,
    pub(crate) started_at: PrimitiveDateTime,
    pub(crate) submitted_at: PrimitiveDateTime,
    pub(crate) duration_seconds: i64,
    pub(crate) questions: Vec<QuestionResult>,
}

#[derive(Debug, Clone)]
pub(crate) struct ResultSummary {
    pub(crate) attempt_id: String,
    pub(crate) user_id: String,
    pub(crate) score: i32,
    pub(crate) is_passed: bool,
    pub(crate) submitted_at: PrimitiveDateTime,
    pub(crate) duration_seconds: i64,
}

/// The canonical answer shown next to a submitted one. Long text has none.
pub(crate) fn correct_answer(question: &Question) -> Option<AnswerPayload> {
    let mut correct = question.options.iter().filter(|option| option.is_correct);
    match question.question_type {
        QuestionType::SingleChoice | QuestionType::TrueFalse => {
            correct.next().map(|option| AnswerPayload::SingleOption { option_id: option.id.clone() })
        }
        QuestionType::MultiChoice => Some(AnswerPayload::MultipleOptions {
            option_ids: correct.map(|option| option.id.clone()).collect(),
        }),
        QuestionType::ShortText => {
            correct.next().map(|option| AnswerPayload::Text { text: option.text.clone() })
        }
        QuestionType::LongText => None,
    }
}

pub(crate) fn build_result(
    attempt: &Attempt,
    test: &Test,
    questions: &[Question],
) -> ServiceResult<AttemptResult> {
    let submitted_at = match (attempt.status, attempt.submitted_at) {
        (AttemptStatus::Submitted, Some(submitted_at)) => submitted_at,
        _ => return Err(ServiceError::invalid_state("Attempt has not been submitted yet")),
    };

    let summary = summarize(questions, &attempt.answers);
    let items = questions
        .iter()
        .map(|question| {
            let answer = attempt.answer_for(&question.id);
            QuestionResult {
                question_id: question.id.clone(),
                question_type: question.question_type,
                text: question.text.clone(),
                max_points: question.points,
                submitted: answer.map(|answer| answer.answer.0.clone()),
                is_correct: answer.and_then(|answer| answer.is_correct),
                points_awarded: answer.and_then(|answer| answer.points_awarded),
                manual_grading_required: answer.is_some_and(|answer| answer.manual_grading_required),
                feedback: answer.and_then(|answer| answer.feedback.clone()),
                correct_answer: correct_answer(question),
            }
        })
        .collect();

    Ok(AttemptResult {
        attempt_id: attempt.id.clone(),
        test_id: test.id.clone(),
        test_title: test.title.clone(),
        user_id: attempt.user_id.clone(),
        score: attempt.score.unwrap_or(summary.score),
        is_passed: attempt.is_passed.unwrap_or(summary.score >= test.pass_score),
        total_points: summary.total_points,
        earned_points: summary.earned_points,
        question_count: questions.len(),
        correct_count: summary.correct_count,
        started_at: attempt.started_at,
        submitted_at,
        duration_seconds: seconds_between(attempt.started_at, submitted_at),
        questions: items,
    })
}

pub(crate) async fn get_attempt_result(
    repos: &Repositories,
    attempt_id: &str,
    caller_id: &str,
) -> ServiceResult<AttemptResult> {
    let attempt = get_attempt(repos, attempt_id, caller_id).await?;
    let test = load_test(repos, &attempt.test_id).await?;
    let questions = repos.questions.list_by_test(&test.id).await?;
    build_result(&attempt, &test, &questions)
}

pub(crate) async fn test_results(
    repos: &Repositories,
    test_id: &str,
    caller_id: &str,
) -> ServiceResult<Vec<ResultSummary>> {
    let test = load_owned(repos, test_id, caller_id).await?;
    let attempts = repos.attempts.list_by_test(&test.id).await?;

    Ok(attempts
        .into_iter()
        .filter_map(|attempt| {
            let submitted_at = attempt
                .submitted_at
                .filter(|_| attempt.status == AttemptStatus::Submitted)?;
            Some(ResultSummary {
                duration_seconds: seconds_between(attempt.started_at, submitted_at),
                score: attempt.score.unwrap_or(0),
                is_passed: attempt.is_passed.unwrap_or(false),
                attempt_id: attempt.id,
                user_id: attempt.user_id,
                submitted_at,
            })
        })
        .collect())
}
