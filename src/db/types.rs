use serde::{Deserialize, Serialize};
use sqlx::Type;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "teststatus", rename_all = "lowercase")]
pub(crate) enum TestStatus {
    Draft,
    Published,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "accesstype", rename_all = "lowercase")]
pub(crate) enum AccessType {
    Public,
    Private,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "questiontype", rename_all = "snake_case")]
pub(crate) enum QuestionType {
    SingleChoice,
    MultiChoice,
    TrueFalse,
    ShortText,
    LongText,
}

impl QuestionType {
    /// Question types whose answers reference option ids.
    pub(crate) fn uses_options(self) -> bool {
        matches!(self, QuestionType::SingleChoice | QuestionType::MultiChoice | QuestionType::TrueFalse)
    }

    pub(crate) fn is_auto_gradable(self) -> bool {
        !matches!(self, QuestionType::LongText)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "granttype", rename_all = "snake_case")]
pub(crate) enum GrantType {
    User,
    Group,
    InviteLink,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "attemptstatus", rename_all = "snake_case")]
pub(crate) enum AttemptStatus {
    InProgress,
    Submitted,
}
