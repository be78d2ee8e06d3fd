//! Per-question scoring and attempt score aggregation. Everything here is pure.

use std::collections::HashSet;

use crate::db::models::{AnswerPayload, AttemptAnswer, Question};
use crate::db::types::QuestionType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Grade {
    pub(crate) is_correct: bool,
    pub(crate) points: i32,
    pub(crate) manual_grading_required: bool,
}

impl Grade {
    fn auto(is_correct: bool, points: i32) -> Self {
        Self { is_correct, points, manual_grading_required: false }
    }

    fn manual() -> Self {
        Self { is_correct: false, points: 0, manual_grading_required: true }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct ScoreSummary {
    pub(crate) earned_points: i32,
    pub(crate) total_points: i32,
    pub(crate) correct_count: i32,
    pub(crate) score: i32,
}

pub(crate) fn grade_answer(question: &Question, payload: &AnswerPayload) -> Grade {
    match (question.question_type, payload) {
        (question_type, _) if !question_type.is_auto_gradable() => Grade::manual(),
        (
            QuestionType::SingleChoice | QuestionType::TrueFalse,
            AnswerPayload::SingleOption { option_id },
        ) => {
            let correct = question
                .options
                .iter()
                .any(|option| option.is_correct && option.id == *option_id);
            Grade::auto(correct, if correct { question.points } else { 0 })
        }
        (QuestionType::MultiChoice, AnswerPayload::MultipleOptions { option_ids }) => {
            grade_multi_choice(question, option_ids)
        }
        (QuestionType::ShortText, AnswerPayload::Text { text }) => {
            let submitted = text.trim().to_lowercase();
            let correct = question
                .options
                .iter()
                .filter(|option| option.is_correct)
                .any(|option| option.text.trim().to_lowercase() == submitted);
            Grade::auto(correct, if correct { question.points } else { 0 })
        }
        _ => Grade::auto(false, 0),
    }
}

/// Exact set match earns full points; otherwise each wrong pick cancels a right one.
fn grade_multi_choice(question: &Question, option_ids: &[String]) -> Grade {
    let correct: HashSet<&str> = question
        .options
        .iter()
        .filter(|option| option.is_correct)
        .map(|option| option.id.as_str())
        .collect();
    let selected: HashSet<&str> = option_ids.iter().map(String::as_str).collect();

    if correct.is_empty() {
        return Grade::auto(false, 0);
    }
    if selected == correct {
        return Grade::auto(true, question.points);
    }

    let hits = selected.intersection(&correct).count() as f64;
    let misses = selected.difference(&correct).count() as f64;
    let partial = (hits - misses) / correct.len() as f64;
    let points = round_half_even(partial * f64::from(question.points)).max(0);
    Grade::auto(false, points)
}

pub(crate) fn round_half_even(value: f64) -> i32 {
    value.round_ties_even() as i32
}

/// `round(earned / total * 100)`, or 0 for a test without points.
pub(crate) fn percent_score(earned_points: i32, total_points: i32) -> i32 {
    if total_points <= 0 {
        return 0;
    }
    round_half_even(f64::from(earned_points) / f64::from(total_points) * 100.0)
}

/// Aggregates already-graded answers over the test's questions. Answers to
/// questions that are no longer part of the test are ignored.
pub(crate) fn summarize(questions: &[Question], answers: &[AttemptAnswer]) -> ScoreSummary {
    let mut summary = ScoreSummary::default();
    for question in questions {
        summary.total_points += question.points;
        let Some(answer) = answers.iter().find(|answer| answer.question_id == question.id) else {
            continue;
        };
        summary.earned_points += answer.points_awarded.unwrap_or(0);
        if answer.is_correct == Some(true) {
            summary.correct_count += 1;
        }
    }
    summary.score = percent_score(summary.earned_points, summary.total_points);
    summary
}


#[cfg(test)]
mod tests {
    use super::fixtures::question;
    use super::*;
    use crate::core::time::primitive_now_utc;
    use sqlx::types::Json;

    fn multi() -> Question {
        question(
            "q-multi",
            QuestionType::MultiChoice,
            10,
            &[("A", "a", true), ("B", "b", true), ("C", "c", false), ("D", "d", false)],
        )
    }

    fn pick(ids: &[&str]) -> AnswerPayload {
        AnswerPayload::MultipleOptions { option_ids: ids.iter().map(|id| id.to_string()).collect() }
    }

    #[test]
    fn multi_choice_partial_credit() {
        assert_eq!(grade_answer(&multi(), &pick(&["A", "C"])), Grade::auto(false, 0));
        assert_eq!(grade_answer(&multi(), &pick(&["A", "B"])), Grade::auto(true, 10));
        assert_eq!(grade_answer(&multi(), &pick(&[])), Grade::auto(false, 0));
        assert_eq!(grade_answer(&multi(), &pick(&["A"])), Grade::auto(false, 5));
        assert_eq!(grade_answer(&multi(), &pick(&["A", "C", "D"])), Grade::auto(false, 0));
        assert_eq!(grade_answer(&multi(), &pick(&["B", "A", "A"])), Grade::auto(true, 10));
    }

    #[test]
    fn partial_credit_rounds_half_to_even() {
        let question = question(
            "q-odd",
            QuestionType::MultiChoice,
            5,
            &[("A", "a", true), ("B", "b", true), ("C", "c", false)],
        );
        // 1/2 * 5 = 2.5
        assert_eq!(grade_answer(&question, &pick(&["A"])).points, 2);
        assert_eq!(percent_score(1, 8), 12);
        assert_eq!(percent_score(3, 8), 38);
    }

    #[test]
    fn single_choice_and_true_false_are_all_or_nothing() {
        let single = question(
            "q-single",
            QuestionType::SingleChoice,
            4,
            &[("A", "a", false), ("B", "b", true)],
        );
        let choose = |id: &str| AnswerPayload::SingleOption { option_id: id.to_string() };
        assert_eq!(grade_answer(&single, &choose("B")), Grade::auto(true, 4));
        assert_eq!(grade_answer(&single, &choose("A")), Grade::auto(false, 0));
        assert_eq!(grade_answer(&single, &choose("missing")), Grade::auto(false, 0));

        let true_false = question(
            "q-tf",
            QuestionType::TrueFalse,
            2,
            &[("T", "True", true), ("F", "False", false)],
        );
        assert_eq!(grade_answer(&true_false, &choose("T")), Grade::auto(true, 2));
    }

    #[test]
    fn short_text_ignores_case_and_surrounding_whitespace() {
        let capital = question(
            "q-short",
            QuestionType::ShortText,
            3,
            &[("A", " Paris ", true), ("B", "Lyon", false)],
        );
        let text = |value: &str| AnswerPayload::Text { text: value.to_string() };
        assert_eq!(grade_answer(&capital, &text("  pArIs")), Grade::auto(true, 3));
        assert_eq!(grade_answer(&capital, &text("Lyon")), Grade::auto(false, 0));
    }

    #[test]
    fn long_text_and_mismatched_payloads() {
        let essay = question("q-essay", QuestionType::LongText, 10, &[]);
        let graded = grade_answer(&essay, &AnswerPayload::Text { text: "essay".into() });
        assert_eq!(graded, Grade::manual());

        let single = question("q-single", QuestionType::SingleChoice, 4, &[("A", "a", true)]);
        assert_eq!(grade_answer(&single, &pick(&["A"])), Grade::auto(false, 0));
    }

    #[test]
    fn summary_counts_unanswered_questions_as_zero() {
        let first = question("q-1", QuestionType::SingleChoice, 10, &[("A", "a", true)]);
        let second = question("q-2", QuestionType::SingleChoice, 10, &[("B", "b", true)]);
        let now = primitive_now_utc();
        let answer = AttemptAnswer {
            id: "ans-1".to_string(),
            attempt_id: "attempt-1".to_string(),
            question_id: "q-1".to_string(),
            answer: Json(AnswerPayload::SingleOption { option_id: "A".to_string() }),
            is_correct: Some(true),
            points_awarded: Some(10),
            manual_grading_required: false,
            feedback: None,
            created_at: now,
            updated_at: now,
        };

        let summary = summarize(&[first, second], &[answer]);
        assert_eq!(
            summary,
            ScoreSummary { earned_points: 10, total_points: 20, correct_count: 1, score: 50 }
        );
        assert_eq!(summarize(&[], &[]).score, 0);
    }
}
