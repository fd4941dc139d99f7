// src/access/mod.rs
//! Structure-scoped authorization.
//!
//! Every protected collection declares an [`Ownership`]: either global, or a
//! path of foreign keys from its rows to the owning structure plus the payload
//! field that names the same chain's first hop. Handlers call the three entry
//! points below in a fixed order:
//!
//! * writes: [`authorize_payload`] → load (404) → [`authorize_object`] → validate → store
//! * reads: load (404) → [`authorize_object`]
//! * lists: [`list_scope`] turned into SQL with [`ownership::scope_condition`]

pub mod evaluator;
pub mod membership;
pub mod ownership;

pub use evaluator::{Access, Decision, Denial, ListScope};
pub use membership::MembershipSnapshot;
pub use ownership::{hop, Hop, Ownership, STRUCTURES};

use serde::Serialize;
use sqlx::SqlitePool;
use crate::auth::User;
use crate::error::{ApiError, ApiResult};

/// The caller of one request, with memberships loaded up front.
#[derive(Debug, Clone, Default)]
pub struct Requester {
    pub user_id: Option<String>,
    pub is_superuser: bool,
    pub is_staff: bool,
    pub memberships: MembershipSnapshot,
}

impl Requester {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub async fn for_user(pool: &SqlitePool, user: &User) -> ApiResult<Self> {
        let memberships = if user.is_superuser {
            MembershipSnapshot::default()
        } else {
            MembershipSnapshot::load(pool, &user.id).await?
        };
        Ok(Self {
            user_id: Some(user.id.clone()),
            is_superuser: user.is_superuser,
            is_staff: user.is_staff,
            memberships,
        })
    }

    pub fn is_authenticated(&self) -> bool {
        self.user_id.is_some()
    }

    /// The id of an authenticated requester, 401 otherwise.
    pub fn require_user(&self) -> ApiResult<&str> {
        self.user_id
            .as_deref()
            .ok_or_else(|| ApiError::Unauthorized(Denial::Unauthenticated.reason().to_string()))
    }
}

fn enforce(decision: Decision, requester: &Requester, collection: &str, stage: &str) -> ApiResult<()> {
    match decision {
        Decision::Allow => Ok(()),
        Decision::Deny(denial) => {
            log::debug!(
                "Access denied ({}) on {} for user {:?}: {:?}",
                stage,
                collection,
                requester.user_id,
                denial
            );
            match denial {
                Denial::Unauthenticated => Err(ApiError::Unauthorized(denial.reason().to_string())),
                _ => Err(ApiError::forbidden(denial.reason())),
            }
        }
    }
}

pub fn list_scope(requester: &Requester, ownership: &Ownership, collection: &str) -> ApiResult<ListScope> {
    match evaluator::list_scope(requester, ownership) {
        Ok(scope) => Ok(scope),
        Err(denial) => {
            enforce(Decision::Deny(denial), requester, collection, "list")?;
            Ok(ListScope::Nothing)
        }
    }
}

/// The structure named by a create/update payload must be writable.
#[tracing::instrument(skip(pool, requester, payload), fields(user = ?requester.user_id))]
pub async fn authorize_payload<P: Serialize>(
    pool: &SqlitePool,
    requester: &Requester,
    ownership: &Ownership,
    collection: &str,
    payload: &P,
) -> ApiResult<()> {
    if requester.is_superuser {
        return Ok(());
    }
    requester.require_user()?;

    let value = serde_json::to_value(payload)
        .map_err(|e| ApiError::InternalServerError(format!("Failed to inspect payload: {}", e)))?;
    let requested = ownership::resolve_request(pool, ownership, &value).await?;

    enforce(
        evaluator::precheck(requester, Access::Write, requested.as_deref()),
        requester,
        collection,
        "payload",
    )
}

/// The loaded row's owning structure decides.
#[tracing::instrument(skip(pool, requester), fields(user = ?requester.user_id))]
pub async fn authorize_object(
    pool: &SqlitePool,
    requester: &Requester,
    ownership: &Ownership,
    access: Access,
    table: &'static str,
    id: &str,
) -> ApiResult<()> {
    if requester.is_superuser {
        return Ok(());
    }
    requester.require_user()?;

    let owner = if ownership.is_scoped() {
        let owner = ownership::resolve_owner(pool, table, id, ownership).await?;
        if owner.is_none() {
            log::debug!("No owner for {} {} along {}", table, id, ownership.describe());
        }
        owner
    } else {
        None
    };

    enforce(
        evaluator::object_check(requester, access, ownership, owner.as_deref()),
        requester,
        table,
        "object",
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use crate::models::MembershipRole;
    use crate::testing;
    use serde_json::json;

    const CONTAINERS: Ownership = Ownership::Structure {
        path: &[hop("structure_id", STRUCTURES)],
        request_field: Some("structure"),
    };

    #[actix_rt::test]
    async fn test_viewer_payload_denied_referent_allowed() {
        let pool = test_pool().await;
        let world = testing::World::seed(&pool).await;
        let payload = json!({ "structure": world.ul01, "type": "BAG_OXY", "identifier": "X" });

        let viewer = Requester::for_user(&pool, &world.viewer).await.unwrap();
        let err = authorize_payload(&pool, &viewer, &CONTAINERS, "containers", &payload)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Forbidden(_)));

        let referent = Requester::for_user(&pool, &world.referent).await.unwrap();
        authorize_payload(&pool, &referent, &CONTAINERS, "containers", &payload)
            .await
            .unwrap();
    }

    #[actix_rt::test]
    async fn test_object_check_uses_stored_owner() {
        let pool = test_pool().await;
        let world = testing::World::seed(&pool).await;
        let referent = Requester::for_user(&pool, &world.referent).await.unwrap();

        authorize_object(&pool, &referent, &CONTAINERS, Access::Write, "containers", &world.ul01_container)
            .await
            .unwrap();
        let err = authorize_object(&pool, &referent, &CONTAINERS, Access::Read, "containers", &world.ul02_container)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Forbidden(_)));
    }

    #[actix_rt::test]
    async fn test_anonymous_is_unauthorized() {
        let pool = test_pool().await;
        let err = authorize_payload(&pool, &Requester::anonymous(), &Ownership::Global, "items", &json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized(_)));
        assert!(matches!(
            list_scope(&Requester::anonymous(), &CONTAINERS, "containers"),
            Err(ApiError::Unauthorized(_))
        ));
    }

    #[actix_rt::test]
    async fn test_superuser_snapshot_is_not_loaded() {
        let pool = test_pool().await;
        let world = testing::World::seed(&pool).await;
        testing::add_membership(&pool, &world.root.id, &world.ul01, MembershipRole::Viewer).await;

        let root = Requester::for_user(&pool, &world.root).await.unwrap();
        assert!(root.is_superuser);
        assert!(root.memberships.is_empty());
        assert_eq!(list_scope(&root, &CONTAINERS, "containers").unwrap(), ListScope::All);
    }
}
