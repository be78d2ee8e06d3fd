use serde::{Deserialize, Serialize};
use time::PrimitiveDateTime;
use validator::Validate;

use crate::core::time::format_primitive;
use crate::db::models::TestAccess;
use crate::db::types::GrantType;
use crate::schemas::deserialize_option_datetime;
use crate::schemas::test::TestResponse;
use crate::services::grants::{InviteLink, JoinedTest};

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct UserGrantCreate {
    #[serde(alias = "userId")]
    #[validate(length(min = 1, message = "user_id must not be empty"))]
    pub(crate) user_id: String,
    #[serde(default, alias = "expiresAt", deserialize_with = "deserialize_option_datetime")]
    pub(crate) expires_at: Option<PrimitiveDateTime>,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct GroupGrantCreate {
    #[serde(alias = "groupId")]
    #[validate(length(min = 1, message = "group_id must not be empty"))]
    pub(crate) group_id: String,
    #[serde(default, alias = "expiresAt", deserialize_with = "deserialize_option_datetime")]
    pub(crate) expires_at: Option<PrimitiveDateTime>,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub(crate) struct InviteCreate {
    #[serde(default, alias = "maxUses")]
    #[validate(range(min = 1, message = "max_uses must be positive"))]
    pub(crate) max_uses: Option<i32>,
    #[serde(default, alias = "expiresAt", deserialize_with = "deserialize_option_datetime")]
    pub(crate) expires_at: Option<PrimitiveDateTime>,
}

#[derive(Debug, Serialize)]
pub(crate) struct AccessResponse {
    pub(crate) id: String,
    pub(crate) test_id: String,
    pub(crate) grant_type: GrantType,
    pub(crate) user_id: Option<String>,
    pub(crate) group_id: Option<String>,
    pub(crate) invite_code: Option<String>,
    pub(crate) granted_by_user_id: String,
    pub(crate) granted_at: String,
    pub(crate) expires_at: Option<String>,
    pub(crate) max_uses: Option<i32>,
    pub(crate) used_count: i32,
}

impl From<TestAccess> for AccessResponse {
    fn from(access: TestAccess) -> Self {
        Self {
            id: access.id,
            test_id: access.test_id,
            grant_type: access.grant_type,
            user_id: access.user_id,
            group_id: access.group_id,
            invite_code: access.invite_code,
            granted_by_user_id: access.granted_by_user_id,
            granted_at: format_primitive(access.granted_at),
            expires_at: access.expires_at.map(format_primitive),
            max_uses: access.max_uses,
            used_count: access.used_count,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct InviteLinkResponse {
    #[serde(flatten)]
    pub(crate) access: AccessResponse,
    pub(crate) join_url: String,
}

impl From<InviteLink> for InviteLinkResponse {
    fn from(link: InviteLink) -> Self {
        Self { access: link.grant.into(), join_url: link.join_url }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct JoinResponse {
    pub(crate) test: TestResponse,
    pub(crate) access: AccessResponse,
}

impl From<JoinedTest> for JoinResponse {
    fn from(joined: JoinedTest) -> Self {
        Self { test: joined.test.into(), access: joined.access.into() }
    }
}
