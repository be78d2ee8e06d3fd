use uuid::Uuid;

use crate::db::models::{Question, QuestionOption, Test};
use crate::db::types::{QuestionType, TestStatus};
use crate::repositories::Repositories;
use crate::services::errors::{ServiceError, ServiceResult};
use crate::services::test_lifecycle::load_owned;

#[derive(Debug, Clone)]
pub(crate) struct OptionDraft {
    pub(crate) text: String,
    pub(crate) is_correct: bool,
    pub(crate) media_url: Option<String>,
}

#[derive(Debug, Clone)]
pub(crate) struct QuestionDraft {
    pub(crate) question_type: QuestionType,
    pub(crate) text: String,
    pub(crate) is_required: bool,
    pub(crate) points: i32,
    pub(crate) media_url: Option<String>,
    pub(crate) options: Vec<OptionDraft>,
}

pub(crate) fn validate_draft(draft: &QuestionDraft) -> ServiceResult<()> {
    if draft.text.trim().is_empty() {
        return Err(ServiceError::validation("Question text must not be empty"));
    }
    if draft.points <= 0 {
        return Err(ServiceError::validation("Question points must be positive"));
    }
    if draft.options.iter().any(|option| option.text.trim().is_empty()) {
        return Err(ServiceError::validation("Option text must not be empty"));
    }

    let correct = draft.options.iter().filter(|option| option.is_correct).count();
    match draft.question_type {
        QuestionType::LongText if !draft.options.is_empty() => {
            Err(ServiceError::validation("Long text questions take no options"))
        }
        QuestionType::TrueFalse if draft.options.len() != 2 => {
            Err(ServiceError::validation("True/false questions need exactly two options"))
        }
        QuestionType::ShortText if correct == 0 => {
            Err(ServiceError::validation("Short text questions need at least one accepted answer"))
        }
        question_type if question_type.uses_options() && correct == 0 => {
            Err(ServiceError::validation("Choice questions need at least one correct option"))
        }
        _ => Ok(()),
    }
}

fn build_options(question_id: &str, drafts: &[OptionDraft]) -> Vec<QuestionOption> {
    drafts
        .iter()
        .enumerate()
        .map(|(index, draft)| QuestionOption {
            id: Uuid::new_v4().to_string(),
            question_id: question_id.to_string(),
            order_index: index as i32 + 1,
            text: draft.text.trim().to_string(),
            is_correct: draft.is_correct,
            media_url: draft.media_url.clone(),
        })
        .collect()
}

async fn load_editable(
    repos: &Repositories,
    test_id: &str,
    caller_id: &str,
) -> ServiceResult<Test> {
    let test = load_owned(repos, test_id, caller_id).await?;
    if test.status != TestStatus::Draft {
        return Err(ServiceError::invalid_state(
            "Questions can only be changed while the test is a draft",
        ));
    }
    Ok(test)
}

async fn load_question(
    repos: &Repositories,
    test_id: &str,
    question_id: &str,
) -> ServiceResult<Question> {
    repos
        .questions
        .find_by_id(question_id)
        .await?
        .filter(|question| question.test_id == test_id)
        .ok_or_else(|| ServiceError::not_found("Question"))
}

pub(crate) async fn add_question(
    repos: &Repositories,
    test_id: &str,
    caller_id: &str,
    draft: QuestionDraft,
) -> ServiceResult<Question> {
    let test = load_editable(repos, test_id, caller_id).await?;
    validate_draft(&draft)?;

    let existing = repos.questions.list_by_test(&test.id).await?;
    let order_index = existing.iter().map(|question| question.order_index).max().unwrap_or(0) + 1;

    let id = Uuid::new_v4().to_string();
    let question = Question {
        options: build_options(&id, &draft.options),
        id,
        test_id: test.id.clone(),
        order_index,
        question_type: draft.question_type,
        text: draft.text.trim().to_string(),
        is_required: draft.is_required,
        points: draft.points,
        media_url: draft.media_url,
    };
    repos.questions.add(&question).await?;
    tracing::info!(
        test_id = %test.id,
        question_id = %question.id,
        order_index,
        "Question added"
    );
    Ok(question)
}

/// Replaces the question's content and full option list; the order is kept.
pub(crate) async fn update_question(
    repos: &Repositories,
    test_id: &str,
    question_id: &str,
    caller_id: &str,
    draft: QuestionDraft,
) -> ServiceResult<Question> {
    load_editable(repos, test_id, caller_id).await?;
    let mut question = load_question(repos, test_id, question_id).await?;
    validate_draft(&draft)?;

    question.question_type = draft.question_type;
    question.text = draft.text.trim().to_string();
    question.is_required = draft.is_required;
    question.points = draft.points;
    question.media_url = draft.media_url;
    question.options = build_options(&question.id, &draft.options);
    repos.questions.update(&question).await?;
    Ok(question)
}

pub(crate) async fn delete_question(
    repos: &Repositories,
    test_id: &str,
    question_id: &str,
    caller_id: &str,
) -> ServiceResult<()> {
    load_editable(repos, test_id, caller_id).await?;
    let question = load_question(repos, test_id, question_id).await?;
    repos.questions.delete(&question.id).await?;
    Ok(())
}

pub(crate) async fn list_questions(
    repos: &Repositories,
    test_id: &str,
    caller_id: &str,
) -> ServiceResult<Vec<Question>> {
    let test = load_owned(repos, test_id, caller_id).await?;
    Ok(repos.questions.list_by_test(&test.id).await?)
}
