//! Persistence seam for the assessment engine.
//!
//! Every entity is reached through an object-safe trait so the services can run
//! against PostgreSQL in production and against [`memory::MemoryStore`] in tests.
//! Operations that must be atomic (racing attempt starts, submit, regrade, invite
//! redemption) are single trait methods; each implementation makes them
//! all-or-nothing. Dropping a returned future rolls back any open transaction.

pub(crate) mod memory;
pub(crate) mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::PgPool;
use thiserror::Error;
use time::PrimitiveDateTime;

use crate::db::models::{Attempt, AttemptAnswer, Question, Test, TestAccess};

#[derive(Debug, Error)]
pub(crate) enum RepoError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("storage conflict: {0}")]
    Conflict(String),
}

pub(crate) type RepoResult<T> = Result<T, RepoError>;

/// Result of an insert guarded by a uniqueness constraint.
#[derive(Debug, Clone)]
pub(crate) enum InsertOutcome<T> {
    Inserted(T),
    AlreadyExists(T),
}

/// Recomputes `(score, is_passed)` from the full answer set of an attempt.
pub(crate) type Rescore<'a> = &'a (dyn Fn(&[AttemptAnswer]) -> (i32, bool) + Send + Sync);

/// Grades the stored answers of an attempt in place and returns `(score, is_passed)`.
pub(crate) type Grader<'a> = &'a (dyn Fn(&mut [AttemptAnswer]) -> (i32, bool) + Send + Sync);

#[async_trait]
pub(crate) trait TestRepository: Send + Sync {
    async fn find_by_id(&self, id: &str) -> RepoResult<Option<Test>>;
    async fn add(&self, test: &Test) -> RepoResult<()>;
    async fn update(&self, test: &Test) -> RepoResult<()>;
    /// Deletes the test with its questions, options, grants, attempts and answers.
    async fn delete(&self, id: &str) -> RepoResult<()>;
    async fn list_by_owner(&self, owner_user_id: &str) -> RepoResult<Vec<Test>>;
}

#[async_trait]
pub(crate) trait QuestionRepository: Send + Sync {
    async fn find_by_id(&self, id: &str) -> RepoResult<Option<Question>>;
    /// Questions of a test ordered by `order_index`, options included.
    async fn list_by_test(&self, test_id: &str) -> RepoResult<Vec<Question>>;
    async fn count_by_test(&self, test_id: &str) -> RepoResult<i64>;
    async fn add(&self, question: &Question) -> RepoResult<()>;
    /// Replaces the question row and its full option list.
    async fn update(&self, question: &Question) -> RepoResult<()>;
    async fn delete(&self, id: &str) -> RepoResult<()>;
}

#[async_trait]
pub(crate) trait AttemptRepository: Send + Sync {
    /// Attempt with its answers in insertion order.
    async fn find_by_id(&self, id: &str) -> RepoResult<Option<Attempt>>;
    async fn find_active(&self, test_id: &str, user_id: &str) -> RepoResult<Option<Attempt>>;
    async fn count_by_test_and_user(&self, test_id: &str, user_id: &str) -> RepoResult<i64>;
    /// Inserts an in-progress attempt unless one already exists for the same
    /// (user, test), in which case the existing attempt is returned.
    async fn insert_or_get_active(&self, attempt: &Attempt) -> RepoResult<InsertOutcome<Attempt>>;
    /// Upserts keyed by (attempt, question), clearing any grading fields.
    /// Returns `None` when the attempt is no longer in progress.
    async fn upsert_answer(&self, answer: &AttemptAnswer) -> RepoResult<Option<AttemptAnswer>>;
    /// Holds the in-progress attempt, grades the answers stored at that moment
    /// and moves it to submitted. Saves racing with this call either land before
    /// grading or see a submitted attempt.
    /// Returns `None` when the attempt was not in progress anymore.
    async fn finalize(
        &self,
        attempt_id: &str,
        submitted_at: PrimitiveDateTime,
        grade: Grader<'_>,
    ) -> RepoResult<Option<Attempt>>;
    /// Stores a manual grade and recomputes the attempt score while holding the
    /// attempt row. Returns `None` when the attempt is not submitted.
    async fn apply_grade(
        &self,
        answer: &AttemptAnswer,
        rescore: Rescore<'_>,
    ) -> RepoResult<Option<Attempt>>;
    /// Attempts of a user, newest first, without answers.
    async fn list_by_user(&self, user_id: &str) -> RepoResult<Vec<Attempt>>;
    /// Attempts of a test, newest first, with answers.
    async fn list_by_test(&self, test_id: &str) -> RepoResult<Vec<Attempt>>;
}

#[async_trait]
pub(crate) trait AccessRepository: Send + Sync {
    async fn find_by_id(&self, id: &str) -> RepoResult<Option<TestAccess>>;
    async fn add(&self, access: &TestAccess) -> RepoResult<()>;
    async fn update(&self, access: &TestAccess) -> RepoResult<()>;
    async fn find_by_invite_code(&self, code: &str) -> RepoResult<Option<TestAccess>>;
    async fn list_by_test(&self, test_id: &str) -> RepoResult<Vec<TestAccess>>;
    async fn list_by_test_and_user(&self, test_id: &str, user_id: &str)
        -> RepoResult<Vec<TestAccess>>;
    async fn list_by_test_and_group(
        &self,
        test_id: &str,
        group_id: &str,
    ) -> RepoResult<Vec<TestAccess>>;
    /// Increments the invite's usage if it is still usable at `now` and, when
    /// given, stores the personal grant in the same unit of work.
    /// Returns `false` when the invite was expired or exhausted at commit time.
    async fn redeem_invite(
        &self,
        invite_id: &str,
        personal_grant: Option<&TestAccess>,
        now: PrimitiveDateTime,
    ) -> RepoResult<bool>;
}

/// Group membership is owned by the identity side; this is a read-only view.
#[async_trait]
pub(crate) trait GroupDirectory: Send + Sync {
    async fn is_member(&self, group_id: &str, user_id: &str) -> RepoResult<bool>;
}

#[derive(Clone)]
pub(crate) struct Repositories {
    pub(crate) tests: Arc<dyn TestRepository>,
    pub(crate) questions: Arc<dyn QuestionRepository>,
    pub(crate) attempts: Arc<dyn AttemptRepository>,
    pub(crate) access: Arc<dyn AccessRepository>,
    pub(crate) groups: Arc<dyn GroupDirectory>,
}

impl Repositories {
    pub(crate) fn postgres(pool: PgPool) -> Self {
        Self {
            tests: Arc::new(postgres::PgTests::new(pool.clone())),
            questions: Arc::new(postgres::PgQuestions::new(pool.clone())),
            attempts: Arc::new(postgres::PgAttempts::new(pool.clone())),
            access: Arc::new(postgres::PgAccess::new(pool.clone())),
            groups: Arc::new(postgres::PgGroups::new(pool)),
        }
    }

    pub(crate) fn memory(store: memory::MemoryStore) -> Self {
        Self {
            tests: Arc::new(store.clone()),
            questions: Arc::new(store.clone()),
            attempts: Arc::new(store.clone()),
            access: Arc::new(store.clone()),
            groups: Arc::new(store),
        }
    }
}
