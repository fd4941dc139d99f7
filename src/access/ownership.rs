// src/access/ownership.rs
//! Declared paths from a row to the structure that owns it.

use serde_json::Value;
use sqlx::SqlitePool;
use crate::error::ApiResult;

pub const STRUCTURES: &str = "structures";

/// One relationship step: `column` on the current table references `table`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hop {
    pub column: &'static str,
    pub table: &'static str,
}

pub const fn hop(column: &'static str, table: &'static str) -> Hop {
    Hop { column, table }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    /// Organization-wide catalog data, not scoped to a structure.
    Global,
    /// `path` ends on `structures`. `request_field` names the payload key holding
    /// the id of `path[0].table`.
    Structure {
        path: &'static [Hop],
        request_field: Option<&'static str>,
    },
}

impl Ownership {
    pub fn path(&self) -> Option<&'static [Hop]> {
        match self {
            Ownership::Global => None,
            Ownership::Structure { path, .. } => Some(path),
        }
    }

    pub fn is_scoped(&self) -> bool {
        matches!(self, Ownership::Structure { .. })
    }

    /// "lot_instance.container.structure" style rendering for logs.
    pub fn describe(&self) -> String {
        match self {
            Ownership::Global => "global".to_string(),
            Ownership::Structure { path, .. } => path
                .iter()
                .map(|h| h.column.trim_end_matches("_id"))
                .collect::<Vec<_>>()
                .join("."),
        }
    }
}

async fn walk(
    pool: &SqlitePool,
    mut table: &'static str,
    id: &str,
    hops: &[Hop],
) -> ApiResult<Option<String>> {
    let mut current = id.to_string();

    for hop in hops {
        let sql = format!("SELECT {} FROM {} WHERE id = ?", hop.column, table);
        let next: Option<Option<String>> = sqlx::query_scalar(&sql)
            .bind(&current)
            .fetch_optional(pool)
            .await?;

        match next.flatten() {
            Some(value) => current = value,
            None => return Ok(None),
        }
        table = hop.table;
    }

    Ok(Some(current))
}

/// Owning structure of a stored row. Missing rows or null hops give `None`.
pub async fn resolve_owner(
    pool: &SqlitePool,
    table: &'static str,
    id: &str,
    ownership: &Ownership,
) -> ApiResult<Option<String>> {
    match ownership.path() {
        Some(path) if !path.is_empty() => walk(pool, table, id, path).await,
        _ => Ok(None),
    }
}

/// Owning structure named by a pending create/update payload.
///
/// An absent or non-string field gives `None`. So does an id that does not
/// lead to an existing structure; storage rejects such references later.
pub async fn resolve_request(
    pool: &SqlitePool,
    ownership: &Ownership,
    payload: &Value,
) -> ApiResult<Option<String>> {
    let (path, field) = match ownership {
        Ownership::Structure { path, request_field: Some(field) } if !path.is_empty() => (*path, *field),
        _ => return Ok(None),
    };

    let start = match payload.get(field).and_then(Value::as_str) {
        Some(id) => id,
        None => return Ok(None),
    };

    let structure_id = match walk(pool, path[0].table, start, &path[1..]).await? {
        Some(id) => id,
        None => return Ok(None),
    };

    let exists: Option<String> = sqlx::query_scalar("SELECT id FROM structures WHERE id = ?")
        .bind(&structure_id)
        .fetch_optional(pool)
        .await?;
    Ok(exists)
}

/// WHERE condition keeping rows owned by one of `structure_count` bound ids.
///
/// The ids are bound in order after any other parameters of the query.
pub fn scope_condition(path: &[Hop], structure_count: usize) -> String {
    let placeholders = vec!["?"; structure_count.max(1)].join(", ");
    let mut hops = path.iter().rev();

    let mut condition = match hops.next() {
        Some(last) => format!("{} IN ({})", last.column, placeholders),
        None => return "0 = 1".to_string(),
    };
    for hop in hops {
        condition = format!("{} IN (SELECT id FROM {} WHERE {})", hop.column, hop.table, condition);
    }
    condition
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use crate::testing;
    use serde_json::json;

    const STOCK_LINE_PATH: &[Hop] = &[
        hop("lot_instance_id", "lot_instances"),
        hop("container_id", "containers"),
        hop("structure_id", STRUCTURES),
    ];
    const STOCK_LINES: Ownership = Ownership::Structure {
        path: STOCK_LINE_PATH,
        request_field: Some("lot_instance"),
    };

    #[test]
    fn test_scope_condition_nests_hops() {
        assert_eq!(
            scope_condition(STOCK_LINE_PATH, 2),
            "lot_instance_id IN (SELECT id FROM lot_instances WHERE container_id IN \
             (SELECT id FROM containers WHERE structure_id IN (?, ?)))"
        );
        assert_eq!(scope_condition(&[hop("structure_id", STRUCTURES)], 1), "structure_id IN (?)");
        assert_eq!(scope_condition(&[], 3), "0 = 1");
    }

    #[test]
    fn test_describe() {
        assert_eq!(STOCK_LINES.describe(), "lot_instance.container.structure");
        assert_eq!(Ownership::Global.describe(), "global");
        assert!(!Ownership::Global.is_scoped());
    }

    #[actix_rt::test]
    async fn test_resolves_owner_through_three_hops() {
        let pool = test_pool().await;
        let world = testing::World::seed(&pool).await;

        let owner = resolve_owner(&pool, "stock_lines", &world.ul01_stock_line, &STOCK_LINES)
            .await
            .unwrap();
        assert_eq!(owner.as_deref(), Some(world.ul01.as_str()));

        let missing = resolve_owner(&pool, "stock_lines", "no-such-line", &STOCK_LINES)
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    #[actix_rt::test]
    async fn test_resolves_request_payload() {
        let pool = test_pool().await;
        let world = testing::World::seed(&pool).await;

        let payload = json!({ "lot_instance": world.ul02_lot, "item": world.item, "quantity": 1 });
        let resolved = resolve_request(&pool, &STOCK_LINES, &payload).await.unwrap();
        assert_eq!(resolved.as_deref(), Some(world.ul02.as_str()));

        let absent = resolve_request(&pool, &STOCK_LINES, &json!({ "quantity": 2 })).await.unwrap();
        assert!(absent.is_none());

        let dangling = resolve_request(&pool, &STOCK_LINES, &json!({ "lot_instance": "ghost" }))
            .await
            .unwrap();
        assert!(dangling.is_none());

        let global = resolve_request(&pool, &Ownership::Global, &payload).await.unwrap();
        assert!(global.is_none());
    }
}
