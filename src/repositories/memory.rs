use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use time::PrimitiveDateTime;

use crate::db::models::{Attempt, AttemptAnswer, Question, Test, TestAccess};
use crate::db::types::{AttemptStatus, GrantType};

use super::{
    AccessRepository, AttemptRepository, Grader, GroupDirectory, InsertOutcome,
    QuestionRepository, RepoError, RepoResult, Rescore, TestRepository,
};

/// Process-local store backing every repository trait.
///
/// One mutex guards all maps, so each trait method is a single critical section
/// and gets the same atomicity a transaction gives the PostgreSQL store. The lock
/// is never held across an `.await`.
#[derive(Clone, Default)]
pub(crate) struct MemoryStore {
    inner: Arc<Mutex<MemoryState>>,
}

#[derive(Default)]
struct MemoryState {
    tests: HashMap<String, Test>,
    questions: HashMap<String, Question>,
    attempts: Vec<Attempt>,
    access: Vec<TestAccess>,
    group_members: HashSet<(String, String)>,
}

impl MemoryStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[cfg(test)]
    pub(crate) fn add_group_member(&self, group_id: &str, user_id: &str) {
        self.state().group_members.insert((group_id.to_string(), user_id.to_string()));
    }

    #[cfg(test)]
    pub(crate) fn in_progress_count(&self, test_id: &str, user_id: &str) -> usize {
        self.state()
            .attempts
            .iter()
            .filter(|attempt| {
                attempt.test_id == test_id
                    && attempt.user_id == user_id
                    && attempt.status == AttemptStatus::InProgress
            })
            .count()
    }
}

fn newest_first(attempts: &mut [Attempt]) {
    attempts.sort_by(|left, right| right.started_at.cmp(&left.started_at));
}

#[async_trait]
impl TestRepository for MemoryStore {
    async fn find_by_id(&self, id: &str) -> RepoResult<Option<Test>> {
        Ok(self.state().tests.get(id).cloned())
    }

    async fn add(&self, test: &Test) -> RepoResult<()> {
        let mut state = self.state();
        if state.tests.contains_key(&test.id) {
            return Err(RepoError::Conflict(format!("test {} already exists", test.id)));
        }
        state.tests.insert(test.id.clone(), test.clone());
        Ok(())
    }

    async fn update(&self, test: &Test) -> RepoResult<()> {
        let mut state = self.state();
        if let Some(stored) = state.tests.get_mut(&test.id) {
            *stored = test.clone();
        }
        Ok(())
    }

    async fn delete(&self, id: &str) -> RepoResult<()> {
        let mut state = self.state();
        state.questions.retain(|_, question| question.test_id != id);
        state.attempts.retain(|attempt| attempt.test_id != id);
        state.access.retain(|access| access.test_id != id);
        state.tests.remove(id);
        Ok(())
    }

    async fn list_by_owner(&self, owner_user_id: &str) -> RepoResult<Vec<Test>> {
        let mut tests: Vec<Test> = self
            .state()
            .tests
            .values()
            .filter(|test| test.owner_user_id == owner_user_id)
            .cloned()
            .collect();
        tests.sort_by(|left, right| right.created_at.cmp(&left.created_at));
        Ok(tests)
    }
}

#[async_trait]
impl QuestionRepository for MemoryStore {
    async fn find_by_id(&self, id: &str) -> RepoResult<Option<Question>> {
        Ok(self.state().questions.get(id).cloned())
    }

    async fn list_by_test(&self, test_id: &str) -> RepoResult<Vec<Question>> {
        let mut questions: Vec<Question> = self
            .state()
            .questions
            .values()
            .filter(|question| question.test_id == test_id)
            .cloned()
            .collect();
        questions.sort_by_key(|question| question.order_index);
        for question in &mut questions {
            question.options.sort_by_key(|option| option.order_index);
        }
        Ok(questions)
    }

    async fn count_by_test(&self, test_id: &str) -> RepoResult<i64> {
        let count =
            self.state().questions.values().filter(|question| question.test_id == test_id).count();
        Ok(count as i64)
    }

    async fn add(&self, question: &Question) -> RepoResult<()> {
        let mut state = self.state();
        let order_taken = state.questions.values().any(|existing| {
            existing.test_id == question.test_id && existing.order_index == question.order_index
        });
        if order_taken || state.questions.contains_key(&question.id) {
            return Err(RepoError::Conflict(format!(
                "question order {} already used in test {}",
                question.order_index, question.test_id
            )));
        }
        state.questions.insert(question.id.clone(), question.clone());
        Ok(())
    }

    async fn update(&self, question: &Question) -> RepoResult<()> {
        let mut state = self.state();
        if let Some(stored) = state.questions.get_mut(&question.id) {
            *stored = question.clone();
        }
        Ok(())
    }

    async fn delete(&self, id: &str) -> RepoResult<()> {
        self.state().questions.remove(id);
        Ok(())
    }
}

#[async_trait]
impl AttemptRepository for MemoryStore {
    async fn find_by_id(&self, id: &str) -> RepoResult<Option<Attempt>> {
        Ok(self.state().attempts.iter().find(|attempt| attempt.id == id).cloned())
    }

    async fn find_active(&self, test_id: &str, user_id: &str) -> RepoResult<Option<Attempt>> {
        Ok(self
            .state()
            .attempts
            .iter()
            .find(|attempt| {
                attempt.test_id == test_id
                    && attempt.user_id == user_id
                    && attempt.status == AttemptStatus::InProgress
            })
            .cloned())
    }

    async fn count_by_test_and_user(&self, test_id: &str, user_id: &str) -> RepoResult<i64> {
        let count = self
            .state()
            .attempts
            .iter()
            .filter(|attempt| attempt.test_id == test_id && attempt.user_id == user_id)
            .count();
        Ok(count as i64)
    }

    async fn insert_or_get_active(&self, attempt: &Attempt) -> RepoResult<InsertOutcome<Attempt>> {
        let mut state = self.state();
        let existing = state.attempts.iter().find(|stored| {
            stored.test_id == attempt.test_id
                && stored.user_id == attempt.user_id
                && stored.status == AttemptStatus::InProgress
        });
        if let Some(existing) = existing {
            return Ok(InsertOutcome::AlreadyExists(existing.clone()));
        }
        state.attempts.push(attempt.clone());
        Ok(InsertOutcome::Inserted(attempt.clone()))
    }

    async fn upsert_answer(&self, answer: &AttemptAnswer) -> RepoResult<Option<AttemptAnswer>> {
        let mut state = self.state();
        let Some(attempt) = state
            .attempts
            .iter_mut()
            .find(|attempt| attempt.id == answer.attempt_id)
            .filter(|attempt| attempt.status == AttemptStatus::InProgress)
        else {
            return Ok(None);
        };

        let stored = match attempt
            .answers
            .iter_mut()
            .find(|existing| existing.question_id == answer.question_id)
        {
            Some(existing) => {
                existing.answer = answer.answer.clone();
                existing.is_correct = None;
                existing.points_awarded = None;
                existing.manual_grading_required = false;
                existing.feedback = None;
                existing.updated_at = answer.updated_at;
                existing.clone()
            }
            None => {
                attempt.answers.push(answer.clone());
                answer.clone()
            }
        };
        Ok(Some(stored))
    }

    async fn finalize(
        &self,
        attempt_id: &str,
        submitted_at: PrimitiveDateTime,
        grade: Grader<'_>,
    ) -> RepoResult<Option<Attempt>> {
        let mut state = self.state();
        let Some(stored) = state
            .attempts
            .iter_mut()
            .find(|stored| stored.id == attempt_id)
            .filter(|stored| stored.status == AttemptStatus::InProgress)
        else {
            return Ok(None);
        };

        let (score, is_passed) = grade(&mut stored.answers);
        stored.status = AttemptStatus::Submitted;
        stored.submitted_at = Some(submitted_at);
        stored.score = Some(score);
        stored.is_passed = Some(is_passed);
        Ok(Some(stored.clone()))
    }

    async fn apply_grade(
        &self,
        answer: &AttemptAnswer,
        rescore: Rescore<'_>,
    ) -> RepoResult<Option<Attempt>> {
        let mut state = self.state();
        let Some(stored) = state
            .attempts
            .iter_mut()
            .find(|stored| stored.id == answer.attempt_id)
            .filter(|stored| stored.status == AttemptStatus::Submitted)
        else {
            return Ok(None);
        };

        if let Some(target) = stored.answers.iter_mut().find(|existing| existing.id == answer.id) {
            target.is_correct = answer.is_correct;
            target.points_awarded = answer.points_awarded;
            target.feedback = answer.feedback.clone();
            target.updated_at = answer.updated_at;
        }

        let (score, is_passed) = rescore(&stored.answers);
        stored.score = Some(score);
        stored.is_passed = Some(is_passed);
        Ok(Some(stored.clone()))
    }

    async fn list_by_user(&self, user_id: &str) -> RepoResult<Vec<Attempt>> {
        let mut attempts: Vec<Attempt> = self
            .state()
            .attempts
            .iter()
            .filter(|attempt| attempt.user_id == user_id)
            .map(|attempt| Attempt { answers: Vec::new(), ..attempt.clone() })
            .collect();
        newest_first(&mut attempts);
        Ok(attempts)
    }

    async fn list_by_test(&self, test_id: &str) -> RepoResult<Vec<Attempt>> {
        let mut attempts: Vec<Attempt> = self
            .state()
            .attempts
            .iter()
            .filter(|attempt| attempt.test_id == test_id)
            .cloned()
            .collect();
        newest_first(&mut attempts);
        Ok(attempts)
    }
}

#[async_trait]
impl AccessRepository for MemoryStore {
    async fn find_by_id(&self, id: &str) -> RepoResult<Option<TestAccess>> {
        Ok(self.state().access.iter().find(|access| access.id == id).cloned())
    }

    async fn add(&self, access: &TestAccess) -> RepoResult<()> {
        let mut state = self.state();
        let duplicate_code = access.invite_code.is_some()
            && state.access.iter().any(|existing| existing.invite_code == access.invite_code);
        if duplicate_code || state.access.iter().any(|existing| existing.id == access.id) {
            return Err(RepoError::Conflict(format!("grant {} already exists", access.id)));
        }
        state.access.push(access.clone());
        Ok(())
    }

    async fn update(&self, access: &TestAccess) -> RepoResult<()> {
        let mut state = self.state();
        if let Some(stored) = state.access.iter_mut().find(|stored| stored.id == access.id) {
            *stored = access.clone();
        }
        Ok(())
    }

    async fn find_by_invite_code(&self, code: &str) -> RepoResult<Option<TestAccess>> {
        Ok(self
            .state()
            .access
            .iter()
            .find(|access| {
                access.grant_type == GrantType::InviteLink
                    && access.invite_code.as_deref() == Some(code)
            })
            .cloned())
    }

    async fn list_by_test(&self, test_id: &str) -> RepoResult<Vec<TestAccess>> {
        let mut grants: Vec<TestAccess> =
            self.state().access.iter().filter(|access| access.test_id == test_id).cloned().collect();
        grants.sort_by(|left, right| right.granted_at.cmp(&left.granted_at));
        Ok(grants)
    }

    async fn list_by_test_and_user(
        &self,
        test_id: &str,
        user_id: &str,
    ) -> RepoResult<Vec<TestAccess>> {
        Ok(self
            .state()
            .access
            .iter()
            .filter(|access| {
                access.test_id == test_id
                    && access.grant_type == GrantType::User
                    && access.user_id.as_deref() == Some(user_id)
            })
            .cloned()
            .collect())
    }

    async fn list_by_test_and_group(
        &self,
        test_id: &str,
        group_id: &str,
    ) -> RepoResult<Vec<TestAccess>> {
        Ok(self
            .state()
            .access
            .iter()
            .filter(|access| {
                access.test_id == test_id
                    && access.grant_type == GrantType::Group
                    && access.group_id.as_deref() == Some(group_id)
            })
            .cloned()
            .collect())
    }

    async fn redeem_invite(
        &self,
        invite_id: &str,
        personal_grant: Option<&TestAccess>,
        now: PrimitiveDateTime,
    ) -> RepoResult<bool> {
        let mut state = self.state();
        let Some(invite) = state
            .access
            .iter_mut()
            .find(|access| access.id == invite_id && access.grant_type == GrantType::InviteLink)
        else {
            return Ok(false);
        };

        if !invite.can_be_used(now) {
            return Ok(false);
        }
        invite.used_count += 1;

        if let Some(grant) = personal_grant {
            state.access.push(grant.clone());
        }
        Ok(true)
    }
}

#[async_trait]
impl GroupDirectory for MemoryStore {
    async fn is_member(&self, group_id: &str, user_id: &str) -> RepoResult<bool> {
        Ok(self.state().group_members.contains(&(group_id.to_string(), user_id.to_string())))
    }
}
