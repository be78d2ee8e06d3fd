use time::PrimitiveDateTime;

use crate::db::models::Test;
use crate::db::types::{AccessType, GrantType};
use crate::repositories::{RepoResult, Repositories};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AccessDecision {
    Allowed,
    /// Not published or outside the availability window.
    NotAvailable,
    NoGrant,
}

pub(crate) async fn resolve(
    repos: &Repositories,
    test: &Test,
    user_id: &str,
    now: PrimitiveDateTime,
) -> RepoResult<AccessDecision> {
    if !test.is_available(now) {
        return Ok(AccessDecision::NotAvailable);
    }
    if test.access_type == AccessType::Public {
        return Ok(AccessDecision::Allowed);
    }

    let direct = repos.access.list_by_test_and_user(&test.id, user_id).await?;
    if direct.iter().any(|grant| grant.can_be_used(now)) {
        return Ok(AccessDecision::Allowed);
    }

    for grant in repos.access.list_by_test(&test.id).await? {
        if grant.grant_type != GrantType::Group || !grant.can_be_used(now) {
            continue;
        }
        let Some(group_id) = grant.group_id.as_deref() else {
            continue;
        };
        if repos.groups.is_member(group_id, user_id).await? {
            return Ok(AccessDecision::Allowed);
        }
    }

    Ok(AccessDecision::NoGrant)
}

pub(crate) async fn can_attempt(
    repos: &Repositories,
    test: &Test,
    user_id: &str,
    now: PrimitiveDateTime,
) -> RepoResult<bool> {
    Ok(resolve(repos, test, user_id, now).await? == AccessDecision::Allowed)
}
