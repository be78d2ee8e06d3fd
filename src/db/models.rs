use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use time::PrimitiveDateTime;

use crate::db::types::{AccessType, AttemptStatus, GrantType, QuestionType, TestStatus};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Test {
    pub(crate) id: String,
    pub(crate) title: String,
    pub(crate) description: String,
    pub(crate) owner_user_id: String,
    pub(crate) status: TestStatus,
    pub(crate) time_limit_seconds: Option<i32>,
    pub(crate) pass_score: i32,
    pub(crate) attempts_limit: i32,
    pub(crate) access_type: AccessType,
    pub(crate) available_from: Option<PrimitiveDateTime>,
    pub(crate) available_until: Option<PrimitiveDateTime>,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
    pub(crate) published_at: Option<PrimitiveDateTime>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Question {
    pub(crate) id: String,
    pub(crate) test_id: String,
    pub(crate) order_index: i32,
    pub(crate) question_type: QuestionType,
    pub(crate) text: String,
    pub(crate) is_required: bool,
    pub(crate) points: i32,
    pub(crate) media_url: Option<String>,
    #[sqlx(skip)]
    #[serde(default)]
    pub(crate) options: Vec<QuestionOption>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct QuestionOption {
    pub(crate) id: String,
    pub(crate) question_id: String,
    pub(crate) order_index: i32,
    pub(crate) text: String,
    pub(crate) is_correct: bool,
    pub(crate) media_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct TestAccess {
    pub(crate) id: String,
    pub(crate) test_id: String,
    pub(crate) grant_type: GrantType,
    pub(crate) user_id: Option<String>,
    pub(crate) group_id: Option<String>,
    pub(crate) invite_code: Option<String>,
    pub(crate) granted_by_user_id: String,
    pub(crate) granted_at: PrimitiveDateTime,
    pub(crate) expires_at: Option<PrimitiveDateTime>,
    pub(crate) max_uses: Option<i32>,
    pub(crate) used_count: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Attempt {
    pub(crate) id: String,
    pub(crate) test_id: String,
    pub(crate) user_id: String,
    pub(crate) status: AttemptStatus,
    pub(crate) started_at: PrimitiveDateTime,
    pub(crate) submitted_at: Option<PrimitiveDateTime>,
    pub(crate) score: Option<i32>,
    pub(crate) is_passed: Option<bool>,
    #[sqlx(skip)]
    #[serde(default)]
    pub(crate) answers: Vec<AttemptAnswer>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct AttemptAnswer {
    pub(crate) id: String,
    pub(crate) attempt_id: String,
    pub(crate) question_id: String,
    pub(crate) answer: Json<AnswerPayload>,
    pub(crate) is_correct: Option<bool>,
    pub(crate) points_awarded: Option<i32>,
    pub(crate) manual_grading_required: bool,
    pub(crate) feedback: Option<String>,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

/// A submitted answer. The variant is fixed by the owning question's type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub(crate) enum AnswerPayload {
    SingleOption { option_id: String },
    MultipleOptions { option_ids: Vec<String> },
    Text { text: String },
}

impl AnswerPayload {
    pub(crate) fn kind(&self) -> &'static str {
        match self {
            AnswerPayload::SingleOption { .. } => "single_option",
            AnswerPayload::MultipleOptions { .. } => "multiple_options",
            AnswerPayload::Text { .. } => "text",
        }
    }

    /// Whether this variant is the one a question of `question_type` accepts.
    pub(crate) fn fits(&self, question_type: QuestionType) -> bool {
        match self {
            AnswerPayload::SingleOption { .. } => {
                matches!(question_type, QuestionType::SingleChoice | QuestionType::TrueFalse)
            }
            AnswerPayload::MultipleOptions { .. } => question_type == QuestionType::MultiChoice,
            AnswerPayload::Text { .. } => {
                matches!(question_type, QuestionType::ShortText | QuestionType::LongText)
            }
        }
    }
}

impl Test {
    /// Published and inside the optional `[available_from, available_until]` window.
    pub(crate) fn is_available(&self, now: PrimitiveDateTime) -> bool {
        self.status == TestStatus::Published
            && self.available_from.map_or(true, |from| now >= from)
            && self.available_until.map_or(true, |until| now <= until)
    }
}

impl TestAccess {
    pub(crate) fn is_expired(&self, now: PrimitiveDateTime) -> bool {
        self.expires_at.is_some_and(|expires_at| now >= expires_at)
    }

    pub(crate) fn can_be_used(&self, now: PrimitiveDateTime) -> bool {
        !self.is_expired(now) && self.max_uses.map_or(true, |max_uses| self.used_count < max_uses)
    }
}

impl Attempt {
    pub(crate) fn answer_for(&self, question_id: &str) -> Option<&AttemptAnswer> {
        self.answers.iter().find(|answer| answer.question_id == question_id)
    }
}
