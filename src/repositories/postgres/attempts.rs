use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::PgPool;
use time::PrimitiveDateTime;

use crate::db::models::{Attempt, AttemptAnswer};
use crate::db::types::AttemptStatus;
use crate::repositories::{
    AttemptRepository, Grader, InsertOutcome, RepoError, RepoResult, Rescore,
};

const ATTEMPT_COLUMNS: &str = "\
    id, test_id, user_id, status, started_at, submitted_at, score, is_passed";

const ANSWER_COLUMNS: &str = "\
    id, attempt_id, question_id, answer, is_correct, points_awarded, \
    manual_grading_required, feedback, created_at, updated_at";

pub(crate) struct PgAttempts {
    pool: PgPool,
}

impl PgAttempts {
    pub(crate) fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn answers_of(
        &self,
        executor: impl sqlx::PgExecutor<'_>,
        attempt_id: &str,
    ) -> Result<Vec<AttemptAnswer>, sqlx::Error> {
        sqlx::query_as::<_, AttemptAnswer>(&format!(
            "SELECT {ANSWER_COLUMNS} FROM attempt_answers
             WHERE attempt_id = $1
             ORDER BY created_at, id"
        ))
        .bind(attempt_id)
        .fetch_all(executor)
        .await
    }
}

#[async_trait]
impl AttemptRepository for PgAttempts {
    async fn find_by_id(&self, id: &str) -> RepoResult<Option<Attempt>> {
        let attempt = sqlx::query_as::<_, Attempt>(&format!(
            "SELECT {ATTEMPT_COLUMNS} FROM attempts WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(mut attempt) = attempt else {
            return Ok(None);
        };
        attempt.answers = self.answers_of(&self.pool, &attempt.id).await?;
        Ok(Some(attempt))
    }

    async fn find_active(&self, test_id: &str, user_id: &str) -> RepoResult<Option<Attempt>> {
        let attempt = sqlx::query_as::<_, Attempt>(&format!(
            "SELECT {ATTEMPT_COLUMNS} FROM attempts
             WHERE test_id = $1 AND user_id = $2 AND status = $3"
        ))
        .bind(test_id)
        .bind(user_id)
        .bind(AttemptStatus::InProgress)
        .fetch_optional(&self.pool)
        .await?;

        let Some(mut attempt) = attempt else {
            return Ok(None);
        };
        attempt.answers = self.answers_of(&self.pool, &attempt.id).await?;
        Ok(Some(attempt))
    }

    async fn count_by_test_and_user(&self, test_id: &str, user_id: &str) -> RepoResult<i64> {
        let count =
            sqlx::query_scalar("SELECT COUNT(*) FROM attempts WHERE test_id = $1 AND user_id = $2")
                .bind(test_id)
                .bind(user_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }

    async fn insert_or_get_active(&self, attempt: &Attempt) -> RepoResult<InsertOutcome<Attempt>> {
        let result = sqlx::query(&format!(
            "INSERT INTO attempts ({ATTEMPT_COLUMNS})
             VALUES ($1,$2,$3,$4,$5,$6,$7,$8)
             ON CONFLICT DO NOTHING"
        ))
        .bind(&attempt.id)
        .bind(&attempt.test_id)
        .bind(&attempt.user_id)
        .bind(attempt.status)
        .bind(attempt.started_at)
        .bind(attempt.submitted_at)
        .bind(attempt.score)
        .bind(attempt.is_passed)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            return Ok(InsertOutcome::Inserted(attempt.clone()));
        }

        // Lost the race on uq_attempts_one_in_progress.
        match self.find_active(&attempt.test_id, &attempt.user_id).await? {
            Some(existing) => Ok(InsertOutcome::AlreadyExists(existing)),
            None => Err(RepoError::Conflict(format!(
                "attempt for test {} could not be created",
                attempt.test_id
            ))),
        }
    }

    async fn upsert_answer(&self, answer: &AttemptAnswer) -> RepoResult<Option<AttemptAnswer>> {
        let mut tx = self.pool.begin().await?;

        let in_progress = sqlx::query_scalar::<_, String>(
            "SELECT id FROM attempts WHERE id = $1 AND status = $2 FOR SHARE",
        )
        .bind(&answer.attempt_id)
        .bind(AttemptStatus::InProgress)
        .fetch_optional(&mut *tx)
        .await?;
        if in_progress.is_none() {
            return Ok(None);
        }

        let stored = sqlx::query_as::<_, AttemptAnswer>(&format!(
            "INSERT INTO attempt_answers ({ANSWER_COLUMNS})
             VALUES ($1,$2,$3,$4,NULL,NULL,FALSE,NULL,$5,$5)
             ON CONFLICT (attempt_id, question_id) DO UPDATE
                 SET answer = EXCLUDED.answer,
                     is_correct = NULL,
                     points_awarded = NULL,
                     manual_grading_required = FALSE,
                     feedback = NULL,
                     updated_at = EXCLUDED.updated_at
             RETURNING {ANSWER_COLUMNS}"
        ))
        .bind(&answer.id)
        .bind(&answer.attempt_id)
        .bind(&answer.question_id)
        .bind(&answer.answer)
        .bind(answer.updated_at)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(stored))
    }

    async fn finalize(
        &self,
        attempt_id: &str,
        submitted_at: PrimitiveDateTime,
        grade: Grader<'_>,
    ) -> RepoResult<Option<Attempt>> {
        let mut tx = self.pool.begin().await?;

        // Conflicts with the FOR SHARE taken by upsert_answer.
        let attempt = sqlx::query_as::<_, Attempt>(&format!(
            "SELECT {ATTEMPT_COLUMNS} FROM attempts WHERE id = $1 AND status = $2 FOR UPDATE"
        ))
        .bind(attempt_id)
        .bind(AttemptStatus::InProgress)
        .fetch_optional(&mut *tx)
        .await?;
        let Some(mut attempt) = attempt else {
            return Ok(None);
        };

        attempt.answers = self.answers_of(&mut *tx, &attempt.id).await?;
        let (score, is_passed) = grade(&mut attempt.answers);

        sqlx::query(
            "UPDATE attempts
             SET status = $2, submitted_at = $3, score = $4, is_passed = $5
             WHERE id = $1",
        )
        .bind(&attempt.id)
        .bind(AttemptStatus::Submitted)
        .bind(submitted_at)
        .bind(score)
        .bind(is_passed)
        .execute(&mut *tx)
        .await?;

        for answer in &attempt.answers {
            sqlx::query(
                "UPDATE attempt_answers
                 SET is_correct = $2, points_awarded = $3, manual_grading_required = $4,
                     updated_at = $5
                 WHERE id = $1",
            )
            .bind(&answer.id)
            .bind(answer.is_correct)
            .bind(answer.points_awarded)
            .bind(answer.manual_grading_required)
            .bind(answer.updated_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        attempt.status = AttemptStatus::Submitted;
        attempt.submitted_at = Some(submitted_at);
        attempt.score = Some(score);
        attempt.is_passed = Some(is_passed);
        Ok(Some(attempt))
    }

    async fn apply_grade(
        &self,
        answer: &AttemptAnswer,
        rescore: Rescore<'_>,
    ) -> RepoResult<Option<Attempt>> {
        let mut tx = self.pool.begin().await?;

        let attempt = sqlx::query_as::<_, Attempt>(&format!(
            "SELECT {ATTEMPT_COLUMNS} FROM attempts WHERE id = $1 AND status = $2 FOR UPDATE"
        ))
        .bind(&answer.attempt_id)
        .bind(AttemptStatus::Submitted)
        .fetch_optional(&mut *tx)
        .await?;
        let Some(mut attempt) = attempt else {
            return Ok(None);
        };

        sqlx::query(
            "UPDATE attempt_answers
             SET is_correct = $3, points_awarded = $4, feedback = $5, updated_at = $6
             WHERE id = $1 AND attempt_id = $2",
        )
        .bind(&answer.id)
        .bind(&answer.attempt_id)
        .bind(answer.is_correct)
        .bind(answer.points_awarded)
        .bind(&answer.feedback)
        .bind(answer.updated_at)
        .execute(&mut *tx)
        .await?;

        attempt.answers = self.answers_of(&mut *tx, &attempt.id).await?;
        let (score, is_passed) = rescore(&attempt.answers);
        sqlx::query("UPDATE attempts SET score = $2, is_passed = $3 WHERE id = $1")
            .bind(&attempt.id)
            .bind(score)
            .bind(is_passed)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        attempt.score = Some(score);
        attempt.is_passed = Some(is_passed);
        Ok(Some(attempt))
    }

    async fn list_by_user(&self, user_id: &str) -> RepoResult<Vec<Attempt>> {
        let attempts = sqlx::query_as::<_, Attempt>(&format!(
            "SELECT {ATTEMPT_COLUMNS} FROM attempts WHERE user_id = $1 ORDER BY started_at DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(attempts)
    }

    async fn list_by_test(&self, test_id: &str) -> RepoResult<Vec<Attempt>> {
        let mut attempts = sqlx::query_as::<_, Attempt>(&format!(
            "SELECT {ATTEMPT_COLUMNS} FROM attempts WHERE test_id = $1 ORDER BY started_at DESC"
        ))
        .bind(test_id)
        .fetch_all(&self.pool)
        .await?;
        if attempts.is_empty() {
            return Ok(attempts);
        }

        let ids: Vec<String> = attempts.iter().map(|attempt| attempt.id.clone()).collect();
        let answers = sqlx::query_as::<_, AttemptAnswer>(&format!(
            "SELECT {ANSWER_COLUMNS} FROM attempt_answers
             WHERE attempt_id = ANY($1)
             ORDER BY created_at, id"
        ))
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let mut grouped: HashMap<String, Vec<AttemptAnswer>> = HashMap::new();
        for answer in answers {
            grouped.entry(answer.attempt_id.clone()).or_default().push(answer);
        }
        for attempt in &mut attempts {
            attempt.answers = grouped.remove(&attempt.id).unwrap_or_default();
        }
        Ok(attempts)
    }
}
