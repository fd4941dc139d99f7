// src/db.rs - Database schema and setup

use sqlx::SqlitePool;
use anyhow::Result;

/// Each statement is idempotent; running the list twice is a no-op.
const SCHEMA: &[&str] = &[
    // Users are never hard-deleted: memberships, movements and validations keep pointing at them.
    r#"
    CREATE TABLE IF NOT EXISTS users (
        id TEXT PRIMARY KEY,
        email TEXT NOT NULL UNIQUE CHECK(length(email) >= 3 AND length(email) <= 254),
        full_name TEXT NOT NULL DEFAULT '' CHECK(length(full_name) <= 255),
        password_hash TEXT NOT NULL,
        role TEXT NOT NULL DEFAULT 'MEMBER' CHECK(role IN ('ADMIN_GLOBAL', 'REFERENT', 'MEMBER')),
        is_active INTEGER NOT NULL DEFAULT 1 CHECK(is_active IN (0, 1)),
        is_staff INTEGER NOT NULL DEFAULT 0 CHECK(is_staff IN (0, 1)),
        is_superuser INTEGER NOT NULL DEFAULT 0 CHECK(is_superuser IN (0, 1)),
        last_login DATETIME,
        created_at DATETIME NOT NULL,
        updated_at DATETIME NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS revoked_tokens (
        jti TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        expires_at DATETIME NOT NULL,
        revoked_at DATETIME NOT NULL,
        FOREIGN KEY (user_id) REFERENCES users (id) ON DELETE RESTRICT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS organizations (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL CHECK(length(name) > 0 AND length(name) <= 255),
        slug TEXT NOT NULL UNIQUE CHECK(length(slug) > 0 AND length(slug) <= 50),
        is_active INTEGER NOT NULL DEFAULT 1 CHECK(is_active IN (0, 1)),
        created_at DATETIME NOT NULL,
        updated_at DATETIME NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS structures (
        id TEXT PRIMARY KEY,
        organization_id TEXT NOT NULL,
        level TEXT NOT NULL CHECK(level IN ('NATIONAL', 'TERRITORIAL', 'LOCAL')),
        name TEXT NOT NULL CHECK(length(name) > 0 AND length(name) <= 255),
        parent_id TEXT,
        code TEXT NOT NULL DEFAULT '' CHECK(length(code) <= 64),
        is_active INTEGER NOT NULL DEFAULT 1 CHECK(is_active IN (0, 1)),
        created_at DATETIME NOT NULL,
        updated_at DATETIME NOT NULL,
        CONSTRAINT check_structure_not_own_parent CHECK(parent_id IS NULL OR parent_id <> id),
        FOREIGN KEY (organization_id) REFERENCES organizations (id) ON DELETE CASCADE,
        FOREIGN KEY (parent_id) REFERENCES structures (id) ON DELETE RESTRICT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS memberships (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        structure_id TEXT NOT NULL,
        role TEXT NOT NULL DEFAULT 'VIEWER' CHECK(role IN ('VIEWER', 'REFERENT', 'ADMIN')),
        grade TEXT NOT NULL DEFAULT 'STAGIAIRE' CHECK(
            grade IN ('STAGIAIRE', 'PSE1', 'PSE2', 'CI', 'CDPE', 'CDMGE')
        ),
        is_fc_up_to_date INTEGER NOT NULL DEFAULT 0 CHECK(is_fc_up_to_date IN (0, 1)),
        is_active INTEGER NOT NULL DEFAULT 1 CHECK(is_active IN (0, 1)),
        created_at DATETIME NOT NULL,
        CONSTRAINT uniq_membership_user_structure UNIQUE (user_id, structure_id),
        FOREIGN KEY (user_id) REFERENCES users (id) ON DELETE RESTRICT,
        FOREIGN KEY (structure_id) REFERENCES structures (id) ON DELETE CASCADE
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS items (
        id TEXT PRIMARY KEY,
        organization_id TEXT NOT NULL,
        name TEXT NOT NULL CHECK(length(name) > 0 AND length(name) <= 255),
        sku TEXT NOT NULL DEFAULT '' CHECK(length(sku) <= 64),
        unit TEXT NOT NULL DEFAULT '' CHECK(length(unit) <= 32),
        category TEXT NOT NULL DEFAULT '' CHECK(length(category) <= 128),
        is_consumable INTEGER NOT NULL DEFAULT 1 CHECK(is_consumable IN (0, 1)),
        requires_expiry INTEGER NOT NULL DEFAULT 0 CHECK(requires_expiry IN (0, 1)),
        requires_lot_number INTEGER NOT NULL DEFAULT 0 CHECK(requires_lot_number IN (0, 1)),
        is_active INTEGER NOT NULL DEFAULT 1 CHECK(is_active IN (0, 1)),
        created_at DATETIME NOT NULL,
        updated_at DATETIME NOT NULL,
        CONSTRAINT uniq_item_name_per_org UNIQUE (organization_id, name),
        FOREIGN KEY (organization_id) REFERENCES organizations (id) ON DELETE CASCADE
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS sites (
        id TEXT PRIMARY KEY,
        structure_id TEXT NOT NULL,
        name TEXT NOT NULL CHECK(length(name) > 0 AND length(name) <= 255),
        address TEXT NOT NULL DEFAULT '',
        created_at DATETIME NOT NULL,
        updated_at DATETIME NOT NULL,
        FOREIGN KEY (structure_id) REFERENCES structures (id) ON DELETE RESTRICT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS locations (
        id TEXT PRIMARY KEY,
        site_id TEXT NOT NULL,
        name TEXT NOT NULL CHECK(length(name) > 0 AND length(name) <= 255),
        location_type TEXT NOT NULL DEFAULT '' CHECK(length(location_type) <= 64),
        created_at DATETIME NOT NULL,
        updated_at DATETIME NOT NULL,
        CONSTRAINT uniq_location_name_per_site UNIQUE (site_id, name),
        FOREIGN KEY (site_id) REFERENCES sites (id) ON DELETE CASCADE
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS containers (
        id TEXT PRIMARY KEY,
        structure_id TEXT NOT NULL,
        location_id TEXT,
        container_type TEXT NOT NULL CHECK(container_type IN (
            'BAG_INTERVENTION', 'BAG_OXY', 'BAG_FIRST_AID', 'VEHICLE_VPSP',
            'OXYGEN_CYLINDER', 'RESERVE_CASE', 'OTHER'
        )),
        identifier TEXT NOT NULL CHECK(length(identifier) > 0 AND length(identifier) <= 64),
        label TEXT NOT NULL DEFAULT '' CHECK(length(label) <= 255),
        is_active INTEGER NOT NULL DEFAULT 1 CHECK(is_active IN (0, 1)),
        created_at DATETIME NOT NULL,
        updated_at DATETIME NOT NULL,
        CONSTRAINT uniq_container_identifier_per_structure UNIQUE (structure_id, identifier),
        FOREIGN KEY (structure_id) REFERENCES structures (id) ON DELETE RESTRICT,
        FOREIGN KEY (location_id) REFERENCES locations (id) ON DELETE SET NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS lot_templates (
        id TEXT PRIMARY KEY,
        organization_id TEXT NOT NULL,
        code TEXT NOT NULL CHECK(code IN ('LOT_A', 'LOT_B', 'LOT_C', 'VPSP')),
        name TEXT NOT NULL CHECK(length(name) > 0 AND length(name) <= 255),
        version TEXT NOT NULL DEFAULT '' CHECK(length(version) <= 32),
        is_active INTEGER NOT NULL DEFAULT 1 CHECK(is_active IN (0, 1)),
        created_at DATETIME NOT NULL,
        updated_at DATETIME NOT NULL,
        CONSTRAINT uniq_template_per_org_code_version UNIQUE (organization_id, code, version),
        FOREIGN KEY (organization_id) REFERENCES organizations (id) ON DELETE CASCADE
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS lot_template_items (
        id TEXT PRIMARY KEY,
        template_id TEXT NOT NULL,
        "group" TEXT NOT NULL CHECK("group" IN (
            'ADMIN_DOCS', 'COMMS', 'PROTECTION', 'VITALS', 'WOUNDS',
            'TRAUMA', 'RESUSC', 'DIVERS', 'SPECIFIC_KITS'
        )),
        item_id TEXT NOT NULL,
        expected_qty REAL NOT NULL,
        notes TEXT NOT NULL DEFAULT '' CHECK(length(notes) <= 255),
        created_at DATETIME NOT NULL,
        updated_at DATETIME NOT NULL,
        CONSTRAINT uniq_template_group_item UNIQUE (template_id, "group", item_id),
        CONSTRAINT check_expected_qty_non_negative CHECK(expected_qty >= 0),
        FOREIGN KEY (template_id) REFERENCES lot_templates (id) ON DELETE CASCADE,
        FOREIGN KEY (item_id) REFERENCES items (id) ON DELETE RESTRICT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS lot_instances (
        id TEXT PRIMARY KEY,
        template_id TEXT NOT NULL,
        container_id TEXT NOT NULL,
        last_checked_at DATETIME,
        next_check_due_at DATETIME,
        status TEXT NOT NULL DEFAULT 'READY' CHECK(length(status) > 0 AND length(status) <= 32),
        created_at DATETIME NOT NULL,
        updated_at DATETIME NOT NULL,
        CONSTRAINT uniq_template_container UNIQUE (template_id, container_id),
        FOREIGN KEY (template_id) REFERENCES lot_templates (id) ON DELETE RESTRICT,
        FOREIGN KEY (container_id) REFERENCES containers (id) ON DELETE CASCADE
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS batches (
        id TEXT PRIMARY KEY,
        item_id TEXT NOT NULL,
        lot_number TEXT NOT NULL DEFAULT '' CHECK(length(lot_number) <= 64),
        expires_at DATE,
        created_at DATETIME NOT NULL,
        updated_at DATETIME NOT NULL,
        CONSTRAINT uniq_batch_per_item_number_expiry UNIQUE (item_id, lot_number, expires_at),
        FOREIGN KEY (item_id) REFERENCES items (id) ON DELETE CASCADE
    )
    "#,
    // SQLite treats NULLs as distinct in UNIQUE constraints.
    r#"
    CREATE UNIQUE INDEX IF NOT EXISTS uniq_batch_per_item_number_no_expiry
        ON batches (item_id, lot_number) WHERE expires_at IS NULL
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS stock_lines (
        id TEXT PRIMARY KEY,
        lot_instance_id TEXT NOT NULL,
        item_id TEXT NOT NULL,
        batch_id TEXT,
        quantity REAL NOT NULL DEFAULT 0,
        created_at DATETIME NOT NULL,
        updated_at DATETIME NOT NULL,
        CONSTRAINT uniq_stockline_per_lot_item_batch UNIQUE (lot_instance_id, item_id, batch_id),
        CONSTRAINT check_stock_quantity_non_negative CHECK(quantity >= 0),
        FOREIGN KEY (lot_instance_id) REFERENCES lot_instances (id) ON DELETE CASCADE,
        FOREIGN KEY (item_id) REFERENCES items (id) ON DELETE RESTRICT,
        FOREIGN KEY (batch_id) REFERENCES batches (id) ON DELETE RESTRICT
    )
    "#,
    r#"
    CREATE UNIQUE INDEX IF NOT EXISTS uniq_stockline_per_lot_item_no_batch
        ON stock_lines (lot_instance_id, item_id) WHERE batch_id IS NULL
    "#,
    // Movements are the audit trail: nothing they point to may disappear underneath them.
    r#"
    CREATE TABLE IF NOT EXISTS stock_movements (
        id TEXT PRIMARY KEY,
        structure_id TEXT NOT NULL,
        created_by TEXT,
        movement_type TEXT NOT NULL CHECK(movement_type IN (
            'IN', 'OUT', 'TRANSFER', 'ADJUST', 'CONSUME', 'RESTOCK'
        )),
        from_lot_id TEXT,
        to_lot_id TEXT,
        item_id TEXT NOT NULL,
        batch_id TEXT,
        quantity REAL NOT NULL,
        reason TEXT NOT NULL DEFAULT '' CHECK(length(reason) <= 255),
        created_at DATETIME NOT NULL,
        updated_at DATETIME NOT NULL,
        CONSTRAINT check_movement_qty_positive CHECK(quantity > 0),
        CONSTRAINT check_movement_lot_consistency CHECK(
            (movement_type = 'TRANSFER' AND from_lot_id IS NOT NULL AND to_lot_id IS NOT NULL)
            OR (movement_type = 'IN' AND to_lot_id IS NOT NULL)
            OR (movement_type = 'OUT' AND from_lot_id IS NOT NULL)
            OR (movement_type = 'ADJUST')
            OR (movement_type = 'CONSUME' AND from_lot_id IS NOT NULL)
            OR (movement_type = 'RESTOCK' AND to_lot_id IS NOT NULL)
        ),
        FOREIGN KEY (structure_id) REFERENCES structures (id) ON DELETE RESTRICT,
        FOREIGN KEY (created_by) REFERENCES users (id) ON DELETE RESTRICT,
        FOREIGN KEY (from_lot_id) REFERENCES lot_instances (id) ON DELETE RESTRICT,
        FOREIGN KEY (to_lot_id) REFERENCES lot_instances (id) ON DELETE RESTRICT,
        FOREIGN KEY (item_id) REFERENCES items (id) ON DELETE RESTRICT,
        FOREIGN KEY (batch_id) REFERENCES batches (id) ON DELETE RESTRICT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS inventory_sessions (
        id TEXT PRIMARY KEY,
        structure_id TEXT NOT NULL,
        container_id TEXT NOT NULL,
        validated_at DATETIME,
        validated_by TEXT,
        created_at DATETIME NOT NULL,
        updated_at DATETIME NOT NULL,
        FOREIGN KEY (structure_id) REFERENCES structures (id) ON DELETE RESTRICT,
        FOREIGN KEY (container_id) REFERENCES containers (id) ON DELETE RESTRICT,
        FOREIGN KEY (validated_by) REFERENCES users (id) ON DELETE RESTRICT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS inventory_lines (
        id TEXT PRIMARY KEY,
        session_id TEXT NOT NULL,
        item_id TEXT NOT NULL,
        expected_qty REAL NOT NULL DEFAULT 0,
        counted_qty REAL NOT NULL DEFAULT 0,
        created_at DATETIME NOT NULL,
        updated_at DATETIME NOT NULL,
        CONSTRAINT uniq_inventory_line_per_session_item UNIQUE (session_id, item_id),
        CONSTRAINT check_expected_non_negative CHECK(expected_qty >= 0),
        CONSTRAINT check_counted_non_negative CHECK(counted_qty >= 0),
        FOREIGN KEY (session_id) REFERENCES inventory_sessions (id) ON DELETE CASCADE,
        FOREIGN KEY (item_id) REFERENCES items (id) ON DELETE RESTRICT
    )
    "#,
];

const INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_structures_org_level ON structures(organization_id, level)",
    "CREATE INDEX IF NOT EXISTS idx_structures_parent ON structures(parent_id)",
    "CREATE INDEX IF NOT EXISTS idx_memberships_user_active ON memberships(user_id, is_active)",
    "CREATE INDEX IF NOT EXISTS idx_items_org_sku ON items(organization_id, sku)",
    "CREATE INDEX IF NOT EXISTS idx_sites_structure ON sites(structure_id, name)",
    "CREATE INDEX IF NOT EXISTS idx_containers_structure_type ON containers(structure_id, container_type)",
    "CREATE INDEX IF NOT EXISTS idx_lot_instances_container ON lot_instances(container_id)",
    "CREATE INDEX IF NOT EXISTS idx_batches_item_expiry ON batches(item_id, expires_at)",
    "CREATE INDEX IF NOT EXISTS idx_stock_lines_lot ON stock_lines(lot_instance_id)",
    "CREATE INDEX IF NOT EXISTS idx_movements_structure ON stock_movements(structure_id, created_at)",
    "CREATE INDEX IF NOT EXISTS idx_sessions_structure ON inventory_sessions(structure_id)",
    "CREATE INDEX IF NOT EXISTS idx_inventory_lines_session ON inventory_lines(session_id)",
    "CREATE INDEX IF NOT EXISTS idx_revoked_tokens_expiry ON revoked_tokens(expires_at)",
];

pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    // Enable foreign keys and WAL mode
    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(pool)
        .await?;

    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(pool)
        .await?;

    for statement in SCHEMA.iter().chain(INDEXES.iter()) {
        sqlx::query(statement).execute(pool).await?;
    }

    log::info!("Database schema is up to date ({} tables)", table_names(pool).await?.len());
    Ok(())
}

pub async fn table_names(pool: &SqlitePool) -> Result<Vec<String>> {
    let names = sqlx::query_scalar::<_, String>(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
    )
    .fetch_all(pool)
    .await?;
    Ok(names)
}

/// Drops expired entries from the refresh-token blacklist.
pub async fn purge_expired_revocations(pool: &SqlitePool) -> Result<u64> {
    let result = sqlx::query("DELETE FROM revoked_tokens WHERE expires_at < ?")
        .bind(chrono::Utc::now())
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

/// Single-connection in-memory database with the full schema.
#[cfg(test)]
pub async fn test_pool() -> SqlitePool {
    use sqlx::sqlite::SqlitePoolOptions;

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory database");
    run_migrations(&pool).await.expect("schema");
    pool
}

#[cfg(test)]
mod tests {
    use super::*;

    #[actix_rt::test]
    async fn test_migrations_are_idempotent() {
        let pool = test_pool().await;
        run_migrations(&pool).await.unwrap();

        let tables = table_names(&pool).await.unwrap();
        for expected in [
            "users", "organizations", "structures", "memberships", "items", "sites", "locations",
            "containers", "lot_templates", "lot_template_items", "lot_instances", "batches",
            "stock_lines", "stock_movements", "inventory_sessions", "inventory_lines", "revoked_tokens",
        ] {
            assert!(tables.iter().any(|t| t == expected), "missing table {}", expected);
        }
    }

    #[actix_rt::test]
    async fn test_foreign_keys_enforced() {
        let pool = test_pool().await;
        let now = chrono::Utc::now();
        let err = sqlx::query(
            "INSERT INTO sites (id, structure_id, name, created_at, updated_at) VALUES ('s', 'missing', 'Garage', ?, ?)",
        )
        .bind(now)
        .bind(now)
        .execute(&pool)
        .await
        .unwrap_err();
        assert!(err.to_string().contains("FOREIGN KEY"));
    }

    #[actix_rt::test]
    async fn test_purge_expired_revocations() {
        let pool = test_pool().await;
        let now = chrono::Utc::now();
        sqlx::query(
            "INSERT INTO users (id, email, password_hash, created_at, updated_at) VALUES ('u', 'u@example.org', 'x', ?, ?)",
        )
        .bind(now)
        .bind(now)
        .execute(&pool)
        .await
        .unwrap();
        for (jti, expires) in [("old", now - chrono::Duration::days(1)), ("live", now + chrono::Duration::days(1))] {
            sqlx::query("INSERT INTO revoked_tokens (jti, user_id, expires_at, revoked_at) VALUES (?, 'u', ?, ?)")
                .bind(jti)
                .bind(expires)
                .bind(now)
                .execute(&pool)
                .await
                .unwrap();
        }

        assert_eq!(purge_expired_revocations(&pool).await.unwrap(), 1);
    }
}
