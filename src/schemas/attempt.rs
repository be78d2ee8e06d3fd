use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::core::time::format_primitive;
use crate::db::models::{AnswerPayload, Attempt, AttemptAnswer};
use crate::db::types::{AttemptStatus, QuestionType};
use crate::services::grading::PendingAnswer;
use crate::services::results::{AttemptResult, QuestionResult, ResultSummary};

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct SaveAnswerRequest {
    #[serde(alias = "questionId")]
    #[validate(length(min = 1, message = "question_id must not be empty"))]
    pub(crate) question_id: String,
    pub(crate) answer: AnswerPayload,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct GradeRequest {
    pub(crate) points: i32,
    #[serde(default)]
    #[validate(length(max = 4000, message = "feedback is too long"))]
    pub(crate) feedback: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct AnswerResponse {
    pub(crate) id: String,
    pub(crate) question_id: String,
    pub(crate) answer: AnswerPayload,
    pub(crate) is_correct: Option<bool>,
    pub(crate) points_awarded: Option<i32>,
    pub(crate) manual_grading_required: bool,
    pub(crate) feedback: Option<String>,
    pub(crate) updated_at: String,
}

impl From<AttemptAnswer> for AnswerResponse {
    fn from(answer: AttemptAnswer) -> Self {
        Self {
            id: answer.id,
            question_id: answer.question_id,
            answer: answer.answer.0,
            is_correct: answer.is_correct,
            points_awarded: answer.points_awarded,
            manual_grading_required: answer.manual_grading_required,
            feedback: answer.feedback,
            updated_at: format_primitive(answer.updated_at),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct AttemptResponse {
    pub(crate) id: String,
    pub(crate) test_id: String,
    pub(crate) user_id: String,
    pub(crate) status: AttemptStatus,
    pub(crate) started_at: String,
    pub(crate) submitted_at: Option<String>,
    pub(crate) score: Option<i32>,
    pub(crate) is_passed: Option<bool>,
    pub(crate) answers: Vec<AnswerResponse>,
}

impl From<Attempt> for AttemptResponse {
    fn from(attempt: Attempt) -> Self {
        Self {
            id: attempt.id,
            test_id: attempt.test_id,
            user_id: attempt.user_id,
            status: attempt.status,
            started_at: format_primitive(attempt.started_at),
            submitted_at: attempt.submitted_at.map(format_primitive),
            score: attempt.score,
            is_passed: attempt.is_passed,
            answers: attempt.answers.into_iter().map(AnswerResponse::from).collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct QuestionResultResponse {
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

impl From<QuestionResult> for QuestionResultResponse {
    fn from(item: QuestionResult) -> Self {
        Self {
            question_id: item.question_id,
            question_type: item.question_type,
            text: item.text,
            max_points: item.max_points,
            submitted: item.submitted,
            is_correct: item.is_correct,
            points_awarded: item.points_awarded,
            manual_grading_required: item.manual_grading_required,
            feedback: item.feedback,
            correct_answer: item.correct_answer,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct ResultResponse {
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
    pub(crate) started_at: String,
    pub(crate) submitted_at: String,
    pub(crate) duration_seconds: i64,
    pub(crate) questions: Vec<QuestionResultResponse>,
}

impl From<AttemptResult> for ResultResponse {
    fn from(result: AttemptResult) -> Self {
        Self {
            attempt_id: result.attempt_id,
            test_id: result.test_id,
            test_title: result.test_title,
            user_id: result.user_id,
            score: result.score,
            is_passed: result.is_passed,
            total_points: result.total_points,
            earned_points: result.earned_points,
            question_count: result.question_count,
            correct_count: result.correct_count,
            started_at: format_primitive(result.started_at),
            submitted_at: format_primitive(result.submitted_at),
            duration_seconds: result.duration_seconds,
            questions: result.questions.into_iter().map(QuestionResultResponse::from).collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct ResultSummaryResponse {
    pub(crate) attempt_id: String,
    pub(crate) user_id: String,
    pub(crate) score: i32,
    pub(crate) is_passed: bool,
    pub(crate) submitted_at: String,
    pub(crate) duration_seconds: i64,
}

impl From<ResultSummary> for ResultSummaryResponse {
    fn from(summary: ResultSummary) -> Self {
        Self {
            attempt_id: summary.attempt_id,
            user_id: summary.user_id,
            score: summary.score,
            is_passed: summary.is_passed,
            submitted_at: format_primitive(summary.submitted_at),
            duration_seconds: summary.duration_seconds,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct PendingAnswerResponse {
    pub(crate) attempt_id: String,
    pub(crate) user_id: String,
    pub(crate) question_id: String,
    pub(crate) question_text: String,
    pub(crate) max_points: i32,
    pub(crate) answer: AnswerResponse,
}

impl From<PendingAnswer> for PendingAnswerResponse {
    fn from(pending: PendingAnswer) -> Self {
        Self {
            attempt_id: pending.attempt_id,
            user_id: pending.user_id,
            question_id: pending.question.id,
            question_text: pending.question.text,
            max_points: pending.question.points,
            answer: pending.answer.into(),
        }
    }
}
