use async_trait::async_trait;
use sqlx::PgPool;
use time::PrimitiveDateTime;

use crate::db::models::TestAccess;
use crate::db::types::GrantType;
use crate::repositories::{AccessRepository, GroupDirectory, RepoResult};

use super::conflict_on_unique;

const COLUMNS: &str = "\
    id, test_id, grant_type, user_id, group_id, invite_code, granted_by_user_id, \
    granted_at, expires_at, max_uses, used_count";

async fn insert_grant(
    executor: impl sqlx::PgExecutor<'_>,
    access: &TestAccess,
) -> Result<(), sqlx::Error> {
    sqlx::query(&format!(
        "INSERT INTO test_access ({COLUMNS}) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11)"
    ))
    .bind(&access.id)
    .bind(&access.test_id)
    .bind(access.grant_type)
    .bind(&access.user_id)
    .bind(&access.group_id)
    .bind(&access.invite_code)
    .bind(&access.granted_by_user_id)
    .bind(access.granted_at)
    .bind(access.expires_at)
    .bind(access.max_uses)
    .bind(access.used_count)
    .execute(executor)
    .await?;
    Ok(())
}

pub(crate) struct PgAccess {
    pool: PgPool,
}

impl PgAccess {
    pub(crate) fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AccessRepository for PgAccess {
    async fn find_by_id(&self, id: &str) -> RepoResult<Option<TestAccess>> {
        let access =
            sqlx::query_as::<_, TestAccess>(&format!("SELECT {COLUMNS} FROM test_access WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(access)
    }

    async fn add(&self, access: &TestAccess) -> RepoResult<()> {
        insert_grant(&self.pool, access)
            .await
            .map_err(|err| conflict_on_unique(err, "grant or invite code already exists"))
    }

    async fn update(&self, access: &TestAccess) -> RepoResult<()> {
        sqlx::query(
            "UPDATE test_access
             SET expires_at = $2, max_uses = $3, used_count = $4
             WHERE id = $1",
        )
        .bind(&access.id)
        .bind(access.expires_at)
        .bind(access.max_uses)
        .bind(access.used_count)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_by_invite_code(&self, code: &str) -> RepoResult<Option<TestAccess>> {
        let access = sqlx::query_as::<_, TestAccess>(&format!(
            "SELECT {COLUMNS} FROM test_access WHERE invite_code = $1 AND grant_type = $2"
        ))
        .bind(code)
        .bind(GrantType::InviteLink)
        .fetch_optional(&self.pool)
        .await?;
        Ok(access)
    }

    async fn list_by_test(&self, test_id: &str) -> RepoResult<Vec<TestAccess>> {
        let grants = sqlx::query_as::<_, TestAccess>(&format!(
            "SELECT {COLUMNS} FROM test_access WHERE test_id = $1 ORDER BY granted_at DESC"
        ))
        .bind(test_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(grants)
    }

    async fn list_by_test_and_user(
        &self,
        test_id: &str,
        user_id: &str,
    ) -> RepoResult<Vec<TestAccess>> {
        let grants = sqlx::query_as::<_, TestAccess>(&format!(
            "SELECT {COLUMNS} FROM test_access
             WHERE test_id = $1 AND grant_type = $2 AND user_id = $3"
        ))
        .bind(test_id)
        .bind(GrantType::User)
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(grants)
    }

    async fn list_by_test_and_group(
        &self,
        test_id: &str,
        group_id: &str,
    ) -> RepoResult<Vec<TestAccess>> {
        let grants = sqlx::query_as::<_, TestAccess>(&format!(
            "SELECT {COLUMNS} FROM test_access
             WHERE test_id = $1 AND grant_type = $2 AND group_id = $3"
        ))
        .bind(test_id)
        .bind(GrantType::Group)
        .bind(group_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(grants)
    }

    async fn redeem_invite(
        &self,
        invite_id: &str,
        personal_grant: Option<&TestAccess>,
        now: PrimitiveDateTime,
    ) -> RepoResult<bool> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            "UPDATE test_access
             SET used_count = used_count + 1
             WHERE id = $1
               AND grant_type = $2
               AND (expires_at IS NULL OR expires_at > $3)
               AND (max_uses IS NULL OR used_count < max_uses)",
        )
        .bind(invite_id)
        .bind(GrantType::InviteLink)
        .bind(now)
        .execute(&mut *tx)
        .await?;
        if result.rows_affected() == 0 {
            return Ok(false);
        }

        if let Some(grant) = personal_grant {
            insert_grant(&mut *tx, grant).await?;
        }

        tx.commit().await?;
        Ok(true)
    }
}

pub(crate) struct PgGroups {
    pool: PgPool,
}

impl PgGroups {
    pub(crate) fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl GroupDirectory for PgGroups {
    async fn is_member(&self, group_id: &str, user_id: &str) -> RepoResult<bool> {
        let member = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM group_members WHERE group_id = $1 AND user_id = $2)",
        )
        .bind(group_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(member)
    }
}
