//! Access grants: per-user, per-group and invite links with a usage quota.

use time::PrimitiveDateTime;
use uuid::Uuid;

use crate::core::config::Settings;
use crate::db::models::{Test, TestAccess};
use crate::db::types::GrantType;
use crate::repositories::Repositories;
use crate::services::errors::{ServiceError, ServiceResult};
use crate::services::invite_codes::{generate_invite_code, join_url};
use crate::services::test_lifecycle::{load_owned, load_test};

#[derive(Debug, Clone)]
pub(crate) struct InviteLink {
    pub(crate) grant: TestAccess,
    pub(crate) join_url: String,
}

#[derive(Debug, Clone)]
pub(crate) struct JoinedTest {
    pub(crate) test: Test,
    /// The caller's personal grant, newly created or pre-existing.
    pub(crate) access: TestAccess,
}

enum Subject<'a> {
    User(&'a str),
    Group(&'a str),
    Invite { code: String, max_uses: Option<i32> },
}

fn new_grant(
    test_id: &str,
    subject: Subject<'_>,
    granted_by_user_id: &str,
    expires_at: Option<PrimitiveDateTime>,
    now: PrimitiveDateTime,
) -> TestAccess {
    let mut grant = TestAccess {
        id: Uuid::new_v4().to_string(),
        test_id: test_id.to_string(),
        grant_type: GrantType::User,
        user_id: None,
        group_id: None,
        invite_code: None,
        granted_by_user_id: granted_by_user_id.to_string(),
        granted_at: now,
        expires_at,
        max_uses: None,
        used_count: 0,
    };
    match subject {
        Subject::User(user_id) => grant.user_id = Some(user_id.to_string()),
        Subject::Group(group_id) => {
            grant.grant_type = GrantType::Group;
            grant.group_id = Some(group_id.to_string());
        }
        Subject::Invite { code, max_uses } => {
            grant.grant_type = GrantType::InviteLink;
            grant.invite_code = Some(code);
            grant.max_uses = max_uses;
        }
    }
    grant
}

fn ensure_future_expiry(
    expires_at: Option<PrimitiveDateTime>,
    now: PrimitiveDateTime,
) -> ServiceResult<()> {
    if expires_at.is_some_and(|expires_at| expires_at <= now) {
        return Err(ServiceError::validation("Expiry must be in the future"));
    }
    Ok(())
}

fn non_blank<'a>(value: &'a str, field: &str) -> ServiceResult<&'a str> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ServiceError::validation(format!("{field} must not be empty")));
    }
    Ok(value)
}

pub(crate) async fn grant_to_user(
    repos: &Repositories,
    test_id: &str,
    caller_id: &str,
    user_id: &str,
    expires_at: Option<PrimitiveDateTime>,
    now: PrimitiveDateTime,
) -> ServiceResult<TestAccess> {
    let test = load_owned(repos, test_id, caller_id).await?;
    let user_id = non_blank(user_id, "User id")?;
    ensure_future_expiry(expires_at, now)?;

    let existing = repos.access.list_by_test_and_user(&test.id, user_id).await?;
    if existing.iter().any(|grant| grant.can_be_used(now)) {
        return Err(ServiceError::Conflict("User already has access to this test".to_string()));
    }

    let grant = new_grant(&test.id, Subject::User(user_id), caller_id, expires_at, now);
    repos.access.add(&grant).await?;
    tracing::info!(test_id = %test.id, access_id = %grant.id, user_id, "User access granted");
    Ok(grant)
}

pub(crate) async fn grant_to_group(
    repos: &Repositories,
    test_id: &str,
    caller_id: &str,
    group_id: &str,
    expires_at: Option<PrimitiveDateTime>,
    now: PrimitiveDateTime,
) -> ServiceResult<TestAccess> {
    let test = load_owned(repos, test_id, caller_id).await?;
    let group_id = non_blank(group_id, "Group id")?;
    ensure_future_expiry(expires_at, now)?;

    let existing = repos.access.list_by_test_and_group(&test.id, group_id).await?;
    if existing.iter().any(|grant| grant.can_be_used(now)) {
        return Err(ServiceError::Conflict("Group already has access to this test".to_string()));
    }

    let grant = new_grant(&test.id, Subject::Group(group_id), caller_id, expires_at, now);
    repos.access.add(&grant).await?;
    tracing::info!(test_id = %test.id, access_id = %grant.id, group_id, "Group access granted");
    Ok(grant)
}

pub(crate) async fn create_invite_link(
    repos: &Repositories,
    settings: &Settings,
    test_id: &str,
    caller_id: &str,
    max_uses: Option<i32>,
    expires_at: Option<PrimitiveDateTime>,
    now: PrimitiveDateTime,
) -> ServiceResult<InviteLink> {
    let test = load_owned(repos, test_id, caller_id).await?;
    if max_uses.is_some_and(|max_uses| max_uses <= 0) {
        return Err(ServiceError::validation("Max uses must be positive"));
    }
    ensure_future_expiry(expires_at, now)?;

    let code = generate_invite_code(settings.invites().code_bytes);
    let url = join_url(&settings.invites().public_base_url, &code);
    let grant = new_grant(&test.id, Subject::Invite { code, max_uses }, caller_id, expires_at, now);
    repos.access.add(&grant).await?;
    tracing::info!(test_id = %test.id, access_id = %grant.id, ?max_uses, "Invite link created");
    Ok(InviteLink { grant, join_url: url })
}

pub(crate) async fn join_by_invite(
    repos: &Repositories,
    invite_code: &str,
    caller_id: &str,
    now: PrimitiveDateTime,
) -> ServiceResult<JoinedTest> {
    let invite = repos
        .access
        .find_by_invite_code(invite_code.trim())
        .await?
        .ok_or_else(|| ServiceError::not_found("Invite"))?;
    if !invite.can_be_used(now) {
        return Err(ServiceError::invalid_state("Invite link is expired or exhausted"));
    }

    let test = load_test(repos, &invite.test_id).await?;
    if !test.is_available(now) {
        return Err(ServiceError::invalid_state("Test is not available"));
    }

    let existing = repos
        .access
        .list_by_test_and_user(&test.id, caller_id)
        .await?
        .into_iter()
        .find(|grant| grant.can_be_used(now));
    let (access, personal) = match existing {
        Some(grant) => (grant, None),
        None => {
            let grant = new_grant(
                &test.id,
                Subject::User(caller_id),
                &invite.granted_by_user_id,
                invite.expires_at,
                now,
            );
            (grant.clone(), Some(grant))
        }
    };

    if !repos.access.redeem_invite(&invite.id, personal.as_ref(), now).await? {
        return Err(ServiceError::invalid_state("Invite link is expired or exhausted"));
    }

    tracing::info!(
        test_id = %test.id,
        invite_id = %invite.id,
        user_id = caller_id,
        "Joined test by invite"
    );
    Ok(JoinedTest { test, access })
}

/// Soft delete: the grant expires now and stays in the ledger.
pub(crate) async fn revoke(
    repos: &Repositories,
    access_id: &str,
    caller_id: &str,
    now: PrimitiveDateTime,
) -> ServiceResult<TestAccess> {
    let mut grant = repos
        .access
        .find_by_id(access_id)
        .await?
        .ok_or_else(|| ServiceError::not_found("Access grant"))?;
    load_owned(repos, &grant.test_id, caller_id).await?;

    if !grant.is_expired(now) {
        grant.expires_at = Some(now);
        repos.access.update(&grant).await?;
        tracing::info!(access_id = %grant.id, test_id = %grant.test_id, "Access revoked");
    }
    Ok(grant)
}

pub(crate) async fn list_test_access(
    repos: &Repositories,
    test_id: &str,
    caller_id: &str,
) -> ServiceResult<Vec<TestAccess>> {
    let test = load_owned(repos, test_id, caller_id).await?;
    Ok(repos.access.list_by_test(&test.id).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::access_resolver::{resolve, AccessDecision};
    use crate::db::types::AccessType;
    use crate::services::test_lifecycle::create_test;
    use crate::test_support::{
        add_choice_question, memory_repos, now, published_test, published_windowed_test,
        test_settings,
    };
    use time::Duration;

    #[tokio::test]
    async fn duplicate_usable_user_grant_conflicts() {
        let (repos, _) = memory_repos();
        let test = published_test(&repos, "owner").await;

        grant_to_user(&repos, &test.id, "owner", "student", None, now()).await.unwrap();
        let result = grant_to_user(&repos, &test.id, "owner", "student", None, now()).await;
        assert!(matches!(result, Err(ServiceError::Conflict(_))));

        let result = grant_to_user(&repos, &test.id, "student", "other", None, now()).await;
        assert!(matches!(result, Err(ServiceError::Forbidden(_))));
    }

    #[tokio::test]
    async fn revoked_grant_can_be_reissued() {
        let (repos, _) = memory_repos();
        let test = published_test(&repos, "owner").await;
        let grant = grant_to_user(&repos, &test.id, "owner", "student", None, now()).await.unwrap();

        let revoked = revoke(&repos, &grant.id, "owner", now()).await.unwrap();
        assert_eq!(revoked.expires_at, Some(now()));
        assert_eq!(resolve(&repos, &test, "student", now()).await.unwrap(), AccessDecision::NoGrant);

        grant_to_user(&repos, &test.id, "owner", "student", None, now()).await.unwrap();
        assert_eq!(resolve(&repos, &test, "student", now()).await.unwrap(), AccessDecision::Allowed);
        assert_eq!(list_test_access(&repos, &test.id, "owner").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn group_grant_authorizes_members_only() {
        let (repos, store) = memory_repos();
        let test = published_test(&repos, "owner").await;
        grant_to_group(&repos, &test.id, "owner", "group-a", None, now()).await.unwrap();
        store.add_group_member("group-a", "member");

        assert_eq!(resolve(&repos, &test, "member", now()).await.unwrap(), AccessDecision::Allowed);
        assert_eq!(resolve(&repos, &test, "outsider", now()).await.unwrap(), AccessDecision::NoGrant);
    }

    #[tokio::test]
    async fn invite_quota_allows_a_single_join() {
        let (repos, _) = memory_repos();
        let settings = test_settings();
        let test = published_test(&repos, "owner").await;

        let invite = create_invite_link(&repos, &settings, &test.id, "owner", Some(1), None, now())
            .await
            .unwrap();
        let code = invite.grant.invite_code.clone().unwrap();
        assert_eq!(invite.join_url, format!("https://quiz.example.com/join/{code}"));

        let joined = join_by_invite(&repos, &code, "first", now()).await.unwrap();
        assert_eq!(joined.access.user_id.as_deref(), Some("first"));
        let stored = repos.access.find_by_id(&invite.grant.id).await.unwrap().unwrap();
        assert_eq!(stored.used_count, 1);

        let result = join_by_invite(&repos, &code, "second", now()).await;
        assert!(matches!(result, Err(ServiceError::InvalidState(_))));
        assert_eq!(resolve(&repos, &test, "second", now()).await.unwrap(), AccessDecision::NoGrant);
    }

    #[tokio::test]
    async fn concurrent_joins_never_exceed_quota() {
        let (repos, _) = memory_repos();
        let settings = test_settings();
        let test = published_test(&repos, "owner").await;
        let invite = create_invite_link(&repos, &settings, &test.id, "owner", Some(1), None, now())
            .await
            .unwrap();
        let code = invite.grant.invite_code.clone().unwrap();

        let mut handles = Vec::new();
        for index in 0..8 {
            let repos = repos.clone();
            let code = code.clone();
            handles.push(tokio::spawn(async move {
                join_by_invite(&repos, &code, &format!("student-{index}"), now()).await
            }));
        }
        let mut joined = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                joined += 1;
            }
        }

        assert_eq!(joined, 1);
        let stored = repos.access.find_by_id(&invite.grant.id).await.unwrap().unwrap();
        assert_eq!(stored.used_count, 1);
    }

    #[tokio::test]
    async fn join_with_existing_grant_only_counts_usage() {
        let (repos, _) = memory_repos();
        let settings = test_settings();
        let test = published_test(&repos, "owner").await;
        let direct = grant_to_user(&repos, &test.id, "owner", "student", None, now()).await.unwrap();
        let invite = create_invite_link(&repos, &settings, &test.id, "owner", None, None, now())
            .await
            .unwrap();

        let code = invite.grant.invite_code.unwrap();
        let joined = join_by_invite(&repos, &code, "student", now()).await.unwrap();
        assert_eq!(joined.access.id, direct.id);
        assert_eq!(list_test_access(&repos, &test.id, "owner").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn invite_inputs_are_validated() {
        let (repos, _) = memory_repos();
        let settings = test_settings();
        let test = published_test(&repos, "owner").await;

        let result =
            create_invite_link(&repos, &settings, &test.id, "owner", Some(0), None, now()).await;
        assert!(matches!(result, Err(ServiceError::Validation(_))));

        let past = Some(now() - time::Duration::minutes(1));
        let result = create_invite_link(&repos, &settings, &test.id, "owner", None, past, now()).await;
        assert!(matches!(result, Err(ServiceError::Validation(_))));

        let result = join_by_invite(&repos, "unknown", "student", now()).await;
        assert!(matches!(result, Err(ServiceError::NotFound(_))));
    }

    #[tokio::test]
    async fn join_requires_an_available_test() {
        let (repos, _) = memory_repos();
        let settings = test_settings();

        let draft = create_test(&repos, "owner", "Draft", "", now()).await.unwrap();
        add_choice_question(&repos, &draft.id, 10).await;
        let invite = create_invite_link(&repos, &settings, &draft.id, "owner", None, None, now())
            .await
            .unwrap();
        let code = invite.grant.invite_code.unwrap();
        let result = join_by_invite(&repos, &code, "student", now()).await;
        assert!(matches!(result, Err(ServiceError::InvalidState(_))));

        let until = now() + Duration::hours(1);
        let windowed =
            published_windowed_test(&repos, "owner", AccessType::Private, None, Some(until)).await;
        let invite = create_invite_link(&repos, &settings, &windowed.id, "owner", None, None, now())
            .await
            .unwrap();
        let code = invite.grant.invite_code.unwrap();
        let late = until + Duration::minutes(1);
        let result = join_by_invite(&repos, &code, "student", late).await;
        assert!(matches!(result, Err(ServiceError::InvalidState(_))));

        let stored = repos.access.find_by_id(&invite.grant.id).await.unwrap().unwrap();
        assert_eq!(stored.used_count, 0);
        assert!(list_test_access(&repos, &windowed.id, "owner")
            .await
            .unwrap()
            .iter()
            .all(|grant| grant.grant_type == GrantType::InviteLink));
    }

    #[tokio::test]
    async fn expired_or_revoked_invites_cannot_be_redeemed() {
        let (repos, _) = memory_repos();
        let settings = test_settings();
        let test = published_test(&repos, "owner").await;

        let expires_at = Some(now() + Duration::hours(1));
        let expiring =
            create_invite_link(&repos, &settings, &test.id, "owner", None, expires_at, now())
                .await
                .unwrap();
        let code = expiring.grant.invite_code.unwrap();
        let result = join_by_invite(&repos, &code, "student", now() + Duration::hours(2)).await;
        assert!(matches!(result, Err(ServiceError::InvalidState(_))));

        let revocable = create_invite_link(&repos, &settings, &test.id, "owner", None, None, now())
            .await
            .unwrap();
        revoke(&repos, &revocable.grant.id, "owner", now()).await.unwrap();
        let code = revocable.grant.invite_code.unwrap();
        let result = join_by_invite(&repos, &code, "student", now()).await;
        assert!(matches!(result, Err(ServiceError::InvalidState(_))));

        assert_eq!(resolve(&repos, &test, "student", now()).await.unwrap(), AccessDecision::NoGrant);
    }
}
