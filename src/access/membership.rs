// src/access/membership.rs
//! Who may act where: active (user, structure) role assignments.
//!
//! Roles are attached to one structure only. A membership on a territorial
//! structure grants nothing on the local structures below it.

use std::collections::HashMap;
use sqlx::SqlitePool;
use crate::error::ApiResult;
use crate::models::MembershipRole;

/// The requester's active memberships, read once per request.
#[derive(Debug, Clone, Default)]
pub struct MembershipSnapshot {
    roles: HashMap<String, MembershipRole>,
}

impl MembershipSnapshot {
    pub async fn load(pool: &SqlitePool, user_id: &str) -> ApiResult<Self> {
        let rows: Vec<(String, MembershipRole)> = sqlx::query_as(
            "SELECT structure_id, role FROM memberships WHERE user_id = ? AND is_active = 1",
        )
        .bind(user_id)
        .fetch_all(pool)
        .await?;

        Ok(Self::from_roles(rows))
    }

    pub fn from_roles<I, S>(rows: I) -> Self
    where
        I: IntoIterator<Item = (S, MembershipRole)>,
        S: Into<String>,
    {
        Self {
            roles: rows.into_iter().map(|(s, r)| (s.into(), r)).collect(),
        }
    }

    /// Sorted so generated SQL and logs are stable.
    pub fn active_structure_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.roles.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn is_member(&self, structure_id: &str) -> bool {
        self.roles.contains_key(structure_id)
    }

    pub fn has_role(&self, structure_id: &str, allowed: &[MembershipRole]) -> bool {
        self.roles
            .get(structure_id)
            .map(|role| allowed.contains(role))
            .unwrap_or(false)
    }

    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use crate::testing;
    use MembershipRole::*;

    #[test]
    fn test_snapshot_role_lookup() {
        let snapshot = MembershipSnapshot::from_roles(vec![("ul01", Referent), ("dt75", Viewer)]);

        assert_eq!(snapshot.active_structure_ids(), vec!["dt75".to_string(), "ul01".to_string()]);
        assert!(snapshot.has_role("ul01", MembershipRole::WRITERS));
        assert!(!snapshot.has_role("dt75", MembershipRole::WRITERS));
        assert!(snapshot.is_member("dt75"));
        assert!(!snapshot.is_member("ul02"));
        assert!(!snapshot.has_role("ul02", &[Viewer, Referent, Admin]));
    }

    #[actix_rt::test]
    async fn test_has_role_matches_active_rows_exactly() {
        let pool = test_pool().await;
        let org = testing::create_organization(&pool, "crf").await;
        let dt = testing::create_structure(&pool, &org, "DT75", None).await;
        let ul = testing::create_structure(&pool, &org, "UL01", Some(&dt)).await;
        let user = testing::create_user(&pool, "admin@ul01.org", false).await;

        let membership = testing::add_membership(&pool, &user.id, &dt, Admin).await;

        let snapshot = MembershipSnapshot::load(&pool, &user.id).await.unwrap();
        assert!(snapshot.has_role(&dt, &[Admin]));
        assert!(!snapshot.has_role(&dt, &[Referent]));
        // Parent membership is not inherited.
        assert!(!snapshot.has_role(&ul, &[Admin]));

        sqlx::query("UPDATE memberships SET is_active = 0 WHERE id = ?")
            .bind(&membership)
            .execute(&pool)
            .await
            .unwrap();
        let snapshot = MembershipSnapshot::load(&pool, &user.id).await.unwrap();
        assert!(!snapshot.has_role(&dt, &[Admin]));
        assert!(snapshot.active_structure_ids().is_empty());
    }

    #[actix_rt::test]
    async fn test_snapshot_load_skips_inactive() {
        let pool = test_pool().await;
        let org = testing::create_organization(&pool, "crf").await;
        let ul01 = testing::create_structure(&pool, &org, "UL01", None).await;
        let ul02 = testing::create_structure(&pool, &org, "UL02", None).await;
        let user = testing::create_user(&pool, "viewer@crf.org", false).await;

        testing::add_membership(&pool, &user.id, &ul01, Viewer).await;
        let inactive = testing::add_membership(&pool, &user.id, &ul02, Referent).await;
        sqlx::query("UPDATE memberships SET is_active = 0 WHERE id = ?")
            .bind(&inactive)
            .execute(&pool)
            .await
            .unwrap();

        let snapshot = MembershipSnapshot::load(&pool, &user.id).await.unwrap();
        assert_eq!(snapshot.active_structure_ids(), vec![ul01]);
        assert!(!snapshot.has_role(&ul02, MembershipRole::WRITERS));
    }
}
