use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};

use crate::db::models::{Question, QuestionOption, Test};
use crate::repositories::{QuestionRepository, RepoResult, TestRepository};

use super::conflict_on_unique;

const TEST_COLUMNS: &str = "\
    id, title, description, owner_user_id, status, time_limit_seconds, pass_score, \
    attempts_limit, access_type, available_from, available_until, created_at, updated_at, \
    published_at";

const QUESTION_COLUMNS: &str = "\
    id, test_id, order_index, question_type, text, is_required, points, media_url";

const OPTION_COLUMNS: &str = "id, question_id, order_index, text, is_correct, media_url";

pub(crate) struct PgTests {
    pool: PgPool,
}

impl PgTests {
    pub(crate) fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TestRepository for PgTests {
    async fn find_by_id(&self, id: &str) -> RepoResult<Option<Test>> {
        let test = sqlx::query_as::<_, Test>(&format!("SELECT {TEST_COLUMNS} FROM tests WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(test)
    }

    async fn add(&self, test: &Test) -> RepoResult<()> {
        sqlx::query(&format!(
            "INSERT INTO tests ({TEST_COLUMNS})
             VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14)"
        ))
        .bind(&test.id)
        .bind(&test.title)
        .bind(&test.description)
        .bind(&test.owner_user_id)
        .bind(test.status)
        .bind(test.time_limit_seconds)
        .bind(test.pass_score)
        .bind(test.attempts_limit)
        .bind(test.access_type)
        .bind(test.available_from)
        .bind(test.available_until)
        .bind(test.created_at)
        .bind(test.updated_at)
        .bind(test.published_at)
        .execute(&self.pool)
        .await
        .map_err(|err| conflict_on_unique(err, "test already exists"))?;
        Ok(())
    }

    async fn update(&self, test: &Test) -> RepoResult<()> {
        sqlx::query(
            "UPDATE tests
             SET title = $2,
                 description = $3,
                 status = $4,
                 time_limit_seconds = $5,
                 pass_score = $6,
                 attempts_limit = $7,
                 access_type = $8,
                 available_from = $9,
                 available_until = $10,
                 updated_at = $11,
                 published_at = $12
             WHERE id = $1",
        )
        .bind(&test.id)
        .bind(&test.title)
        .bind(&test.description)
        .bind(test.status)
        .bind(test.time_limit_seconds)
        .bind(test.pass_score)
        .bind(test.attempts_limit)
        .bind(test.access_type)
        .bind(test.available_from)
        .bind(test.available_until)
        .bind(test.updated_at)
        .bind(test.published_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete(&self, id: &str) -> RepoResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "DELETE FROM attempt_answers
             WHERE attempt_id IN (SELECT id FROM attempts WHERE test_id = $1)",
        )
        .bind(id)
        .execute(&mut *tx)
        .await?;
        sqlx::query("DELETE FROM attempts WHERE test_id = $1").bind(id).execute(&mut *tx).await?;
        sqlx::query("DELETE FROM test_access WHERE test_id = $1").bind(id).execute(&mut *tx).await?;
        sqlx::query(
            "DELETE FROM question_options
             WHERE question_id IN (SELECT id FROM questions WHERE test_id = $1)",
        )
        .bind(id)
        .execute(&mut *tx)
        .await?;
        sqlx::query("DELETE FROM questions WHERE test_id = $1").bind(id).execute(&mut *tx).await?;
        sqlx::query("DELETE FROM tests WHERE id = $1").bind(id).execute(&mut *tx).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn list_by_owner(&self, owner_user_id: &str) -> RepoResult<Vec<Test>> {
        let tests = sqlx::query_as::<_, Test>(&format!(
            "SELECT {TEST_COLUMNS} FROM tests WHERE owner_user_id = $1 ORDER BY created_at DESC"
        ))
        .bind(owner_user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(tests)
    }
}

pub(crate) struct PgQuestions {
    pool: PgPool,
}

impl PgQuestions {
    pub(crate) fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn attach_options(&self, questions: &mut [Question]) -> RepoResult<()> {
        if questions.is_empty() {
            return Ok(());
        }
        let ids: Vec<String> = questions.iter().map(|question| question.id.clone()).collect();
        let options = sqlx::query_as::<_, QuestionOption>(&format!(
            "SELECT {OPTION_COLUMNS} FROM question_options
             WHERE question_id = ANY($1)
             ORDER BY question_id, order_index"
        ))
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let mut grouped: HashMap<String, Vec<QuestionOption>> = HashMap::new();
        for option in options {
            grouped.entry(option.question_id.clone()).or_default().push(option);
        }
        for question in questions {
            question.options = grouped.remove(&question.id).unwrap_or_default();
        }
        Ok(())
    }
}

async fn insert_options(
    tx: &mut Transaction<'_, Postgres>,
    options: &[QuestionOption],
) -> Result<(), sqlx::Error> {
    for option in options {
        sqlx::query(&format!(
            "INSERT INTO question_options ({OPTION_COLUMNS}) VALUES ($1,$2,$3,$4,$5,$6)"
        ))
        .bind(&option.id)
        .bind(&option.question_id)
        .bind(option.order_index)
        .bind(&option.text)
        .bind(option.is_correct)
        .bind(&option.media_url)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

#[async_trait]
impl QuestionRepository for PgQuestions {
    async fn find_by_id(&self, id: &str) -> RepoResult<Option<Question>> {
        let question = sqlx::query_as::<_, Question>(&format!(
            "SELECT {QUESTION_COLUMNS} FROM questions WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(question) = question else {
            return Ok(None);
        };
        let mut found = [question];
        self.attach_options(&mut found).await?;
        let [question] = found;
        Ok(Some(question))
    }

    async fn list_by_test(&self, test_id: &str) -> RepoResult<Vec<Question>> {
        let mut questions = sqlx::query_as::<_, Question>(&format!(
            "SELECT {QUESTION_COLUMNS} FROM questions WHERE test_id = $1 ORDER BY order_index"
        ))
        .bind(test_id)
        .fetch_all(&self.pool)
        .await?;
        self.attach_options(&mut questions).await?;
        Ok(questions)
    }

    async fn count_by_test(&self, test_id: &str) -> RepoResult<i64> {
        let count = sqlx::query_scalar("SELECT COUNT(*) FROM questions WHERE test_id = $1")
            .bind(test_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn add(&self, question: &Question) -> RepoResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(&format!(
            "INSERT INTO questions ({QUESTION_COLUMNS}) VALUES ($1,$2,$3,$4,$5,$6,$7,$8)"
        ))
        .bind(&question.id)
        .bind(&question.test_id)
        .bind(question.order_index)
        .bind(question.question_type)
        .bind(&question.text)
        .bind(question.is_required)
        .bind(question.points)
        .bind(&question.media_url)
        .execute(&mut *tx)
        .await
        .map_err(|err| conflict_on_unique(err, "question order already used"))?;
        insert_options(&mut tx, &question.options).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn update(&self, question: &Question) -> RepoResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "UPDATE questions
             SET order_index = $2,
                 question_type = $3,
                 text = $4,
                 is_required = $5,
                 points = $6,
                 media_url = $7
             WHERE id = $1",
        )
        .bind(&question.id)
        .bind(question.order_index)
        .bind(question.question_type)
        .bind(&question.text)
        .bind(question.is_required)
        .bind(question.points)
        .bind(&question.media_url)
        .execute(&mut *tx)
        .await
        .map_err(|err| conflict_on_unique(err, "question order already used"))?;
        sqlx::query("DELETE FROM question_options WHERE question_id = $1")
            .bind(&question.id)
            .execute(&mut *tx)
            .await?;
        insert_options(&mut tx, &question.options).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn delete(&self, id: &str) -> RepoResult<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM question_options WHERE question_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM questions WHERE id = $1").bind(id).execute(&mut *tx).await?;
        tx.commit().await?;
        Ok(())
    }
}
