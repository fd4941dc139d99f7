// src/seed.rs
//! Demo data for a Croix-Rouge française deployment: the national structure,
//! one territorial direction, two local units, their members, kits and stock.
//!
//! Rows are looked up by natural key before being inserted, so a second run
//! adds nothing. Demo accounts always get their seed password back.

use chrono::{NaiveDate, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;
use validator::Validate;
use crate::access::Requester;
use crate::auth::{AuthService, RegisterRequest, User, UserRole};
use crate::error::{ApiError, ApiResult};
use crate::models::*;
use crate::repositories::*;

pub const DEMO_ORGANIZATION: &str = "crf";
pub const DEMO_EMAIL_DOMAIN: &str = "@croix-rouge.fr";

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SeedReport {
    pub created: usize,
    pub existing: usize,
}

struct UserSeed {
    email: &'static str,
    password: &'static str,
    full_name: &'static str,
    role: UserRole,
    is_superuser: bool,
}

const USERS: &[UserSeed] = &[
    UserSeed { email: "admin@croix-rouge.fr", password: "adminadmin", full_name: "Audran Scieur", role: UserRole::AdminGlobal, is_superuser: true },
    UserSeed { email: "jeremy.vernadet@croix-rouge.fr", password: "referent", full_name: "Jérémy Vernadet", role: UserRole::Referent, is_superuser: false },
    UserSeed { email: "alex.dupont@croix-rouge.fr", password: "utilisateur", full_name: "Alex Dupont", role: UserRole::Member, is_superuser: false },
    UserSeed { email: "lea.martin@croix-rouge.fr", password: "utilisateur", full_name: "Léa Martin", role: UserRole::Member, is_superuser: false },
    UserSeed { email: "jean.leroy@croix-rouge.fr", password: "utilisateur", full_name: "Jean Leroy", role: UserRole::Member, is_superuser: false },
    UserSeed { email: "chloe.bonnin@croix-rouge.fr", password: "utilisateur", full_name: "Chloé Bonnin", role: UserRole::Member, is_superuser: false },
    UserSeed { email: "paul.gauthier@croix-rouge.fr", password: "utilisateur", full_name: "Paul Gauthier", role: UserRole::Member, is_superuser: false },
];

/// (user, structure code, role, grade, first-aid training up to date)
const MEMBERSHIPS: &[(&str, &str, MembershipRole, Grade, bool)] = &[
    ("admin@croix-rouge.fr", "CRF", MembershipRole::Admin, Grade::Cdmge, true),
    ("jeremy.vernadet@croix-rouge.fr", "UL01", MembershipRole::Referent, Grade::Ci, true),
    ("alex.dupont@croix-rouge.fr", "UL02", MembershipRole::Viewer, Grade::Pse1, false),
    ("lea.martin@croix-rouge.fr", "UL01", MembershipRole::Admin, Grade::Cdpe, true),
    ("jean.leroy@croix-rouge.fr", "UL01", MembershipRole::Viewer, Grade::Pse2, true),
    ("chloe.bonnin@croix-rouge.fr", "UL02", MembershipRole::Referent, Grade::Pse2, false),
    ("paul.gauthier@croix-rouge.fr", "UL02", MembershipRole::Viewer, Grade::Stagiaire, true),
];

/// (key, sku, name, unit, category, consumable, expiry, lot number)
const ITEMS: &[(&str, &str, &str, &str, &str, bool, bool, bool)] = &[
    ("GANTS", "CRF-GNT-NIT", "Gants nitrile", "paire", "Protection", true, false, false),
    ("O2_2L", "CRF-O2-2L", "Bouteille d'oxygène 2L", "unité", "Respiration", false, false, false),
    ("FFP2", "CRF-FFP2", "Masque FFP2", "unité", "Protection", true, false, false),
    ("PAN_COMP", "CRF-PAN-COMP", "Pansement compressif d'urgence", "unité", "Trauma", true, false, false),
    ("COUV", "CRF-COUV-ISO", "Couverture isotherme", "unité", "Divers", true, false, false),
    ("GEL", "CRF-GEL-HA", "Gel hydroalcoolique", "flacon", "Protection", true, true, true),
];

/// (key, structure code, name, address)
const SITES: &[(&str, &str, &str, &str)] = &[
    ("UL01", "UL01", "Local UL bassin-burgien", "1 Avenue des belges, 01000 Bourg-en-Bresse"),
    ("UL02", "UL02", "Local UL Ambérieu", "5 avenue des Secours, 01500 Ambérieu-en-Bugey"),
];

/// (key, site, name, type)
const LOCATIONS: &[(&str, &str, &str, &str)] = &[
    ("UL01_ARM", "UL01", "Armoire principale", "Stock"),
    ("UL01_VPSP", "UL01", "VPSP 1", "Véhicule"),
    ("UL02_ARM", "UL02", "Armoire d'urgence", "Stock"),
    ("UL02_REM", "UL02", "Remorque logistique", "Véhicule"),
];

/// (key, identifier, structure code, location, type, label)
const CONTAINERS: &[(&str, &str, &str, &str, ContainerType, &str)] = &[
    ("UL01_BAG_INT", "UL01-BAG-INT-01", "UL01", "UL01_ARM", ContainerType::BagIntervention, "Sac intervention principal"),
    ("UL01_BAG_OXY", "UL01-BAG-OXY-01", "UL01", "UL01_ARM", ContainerType::BagOxy, "Sac oxygénothérapie"),
    ("UL01_RES", "UL01-RES-01", "UL01", "UL01_VPSP", ContainerType::ReserveCase, "Malle réserve"),
    ("UL02_BAG_PS", "UL02-BAG-PS-01", "UL02", "UL02_ARM", ContainerType::BagFirstAid, "Sac premiers secours"),
    ("UL02_O2", "UL02-O2-01", "UL02", "UL02_REM", ContainerType::OxygenCylinder, "Bouteille O2 terrain"),
    ("UL02_VPSP", "UL02-VPSP-01", "UL02", "UL02_REM", ContainerType::VehicleVpsp, "VPSP 01"),
];

const TEMPLATE_VERSION: &str = "CRF-2024-001";

const TEMPLATES: &[(LotCode, &str)] = &[
    (LotCode::LotA, "Lot A secours"),
    (LotCode::LotB, "Lot B premiers secours"),
    (LotCode::Vpsp, "Lot VPSP"),
];

/// (template, group, item, expected quantity, notes)
const TEMPLATE_ITEMS: &[(LotCode, ItemGroup, &str, f64, &str)] = &[
    (LotCode::LotA, ItemGroup::Protection, "GANTS", 20.0, "Gants nitrile taille mixte"),
    (LotCode::LotA, ItemGroup::Wounds, "PAN_COMP", 6.0, "Pansements compressifs"),
    (LotCode::LotA, ItemGroup::Divers, "COUV", 4.0, "Couvertures isothermes"),
    (LotCode::LotB, ItemGroup::Protection, "FFP2", 15.0, "Masques FFP2"),
    (LotCode::LotB, ItemGroup::Protection, "GEL", 3.0, "Gel hydroalcoolique"),
    (LotCode::Vpsp, ItemGroup::Resusc, "O2_2L", 1.0, "Bouteille O2 pour VPSP"),
];

/// (key, template, container)
const LOT_INSTANCES: &[(&str, LotCode, &str)] = &[
    ("LI_1", LotCode::LotA, "UL01_BAG_INT"),
    ("LI_2", LotCode::LotB, "UL01_BAG_OXY"),
    ("LI_3", LotCode::LotB, "UL02_BAG_PS"),
    ("LI_4", LotCode::Vpsp, "UL02_VPSP"),
];

/// (item, lot number, expiry y/m/d)
const BATCHES: &[(&str, &str, (i32, u32, u32))] = &[
    ("GEL", "GEL-2024-01", (2026, 6, 30)),
    ("FFP2", "FFP2-2024-07", (2027, 1, 31)),
];

/// (lot instance, item, quantity, batch item)
const STOCK_LINES: &[(&str, &str, f64, Option<&str>)] = &[
    ("LI_1", "GANTS", 18.0, None),
    ("LI_1", "PAN_COMP", 6.0, None),
    ("LI_1", "COUV", 4.0, None),
    ("LI_2", "FFP2", 14.0, Some("FFP2")),
    ("LI_2", "GEL", 3.0, Some("GEL")),
    ("LI_3", "FFP2", 10.0, Some("FFP2")),
    ("LI_3", "GEL", 2.0, Some("GEL")),
    ("LI_4", "O2_2L", 1.0, None),
];

struct Seeder<'a> {
    pool: &'a SqlitePool,
    report: SeedReport,
}

impl<'a> Seeder<'a> {
    async fn find(&self, sql: &str, keys: &[Option<&str>]) -> ApiResult<Option<String>> {
        let mut query = sqlx::query_scalar::<_, String>(sql);
        for key in keys {
            query = query.bind(*key);
        }
        Ok(query.fetch_optional(self.pool).await?)
    }

    /// Id of the row matching `lookup`, inserting `data` through the repository when there is none.
    async fn upsert<R: Repository>(&mut self, lookup: &str, keys: &[Option<&str>], data: R::Create) -> ApiResult<String> {
        if let Some(id) = self.find(lookup, keys).await? {
            self.report.existing += 1;
            return Ok(id);
        }

        let repo = R::default();
        data.validate()?;
        repo.check_create(&data).into_result()?;

        let id = Uuid::new_v4().to_string();
        repo.insert(self.pool, &id, data, &Requester::anonymous()).await?;
        log::debug!("Seeded {} {}", R::NAME, id);
        self.report.created += 1;
        Ok(id)
    }

    async fn user(&mut self, auth_service: &AuthService, seed: &UserSeed) -> ApiResult<String> {
        let user = match User::find_by_email(self.pool, seed.email).await? {
            Some(user) => {
                self.report.existing += 1;
                user
            }
            None => {
                self.report.created += 1;
                let request = RegisterRequest {
                    email: seed.email.to_string(),
                    full_name: seed.full_name.to_string(),
                    password: seed.password.to_string(),
                };
                User::create(self.pool, request, auth_service, seed.is_superuser, seed.is_superuser).await?
            }
        };

        sqlx::query(
            r#"UPDATE users SET
                full_name = ?, password_hash = ?, role = ?, is_active = 1, is_staff = ?, is_superuser = ?, updated_at = ?
            WHERE id = ?"#,
        )
        .bind(seed.full_name)
        .bind(auth_service.hash_password(seed.password)?)
        .bind(seed.role)
        .bind(seed.is_superuser)
        .bind(seed.is_superuser)
        .bind(Utc::now())
        .bind(&user.id)
        .execute(self.pool)
        .await?;

        Ok(user.id)
    }
}

fn key_of<K: PartialEq + std::fmt::Debug>(table: &[(K, String)], key: K) -> ApiResult<&str> {
    table
        .iter()
        .find(|(k, _)| *k == key)
        .map(|(_, id)| id.as_str())
        .ok_or_else(|| ApiError::InternalServerError(format!("Unknown seed key {:?}", key)))
}

/// Seeds the demo data set. With `flush`, previously seeded demo data is removed first.
pub async fn seed_demo(pool: &SqlitePool, auth_service: &AuthService, flush: bool) -> ApiResult<SeedReport> {
    if flush {
        flush_demo_data(pool).await?;
    }

    let mut seeder = Seeder { pool, report: SeedReport::default() };

    let org = seeder
        .upsert::<OrganizationRepository>(
            "SELECT id FROM organizations WHERE slug = ?",
            &[Some(DEMO_ORGANIZATION)],
            CreateOrganizationRequest {
                name: "Croix-Rouge française".to_string(),
                slug: DEMO_ORGANIZATION.to_string(),
                is_active: Some(true),
            },
        )
        .await?;

    let mut structures: Vec<(&str, String)> = Vec::new();
    for (code, level, name, parent) in [
        ("CRF", StructureLevel::National, "Croix-Rouge française", None),
        ("DT01", StructureLevel::Territorial, "Direction territoriale de l'Ain", Some("CRF")),
        ("UL01", StructureLevel::Local, "Unité locale du bassin-burgien", Some("DT01")),
        ("UL02", StructureLevel::Local, "Unité locale du Bugey", Some("DT01")),
    ] {
        let parent = match parent {
            Some(code) => Some(key_of(&structures, code)?.to_string()),
            None => None,
        };
        let id = seeder
            .upsert::<StructureRepository>(
                "SELECT id FROM structures WHERE organization_id = ? AND code = ?",
                &[Some(org.as_str()), Some(code)],
                CreateStructureRequest {
                    organization: org.clone(),
                    level,
                    name: name.to_string(),
                    parent,
                    code: Some(code.to_string()),
                    is_active: Some(true),
                },
            )
            .await?;
        structures.push((code, id));
    }

    let mut users: Vec<(&str, String)> = Vec::new();
    for seed in USERS {
        let id = seeder.user(auth_service, seed).await?;
        users.push((seed.email, id));
    }

    for &(email, structure, role, grade, is_fc) in MEMBERSHIPS {
        let user = key_of(&users, email)?;
        let structure = key_of(&structures, structure)?;
        seeder
            .upsert::<MembershipRepository>(
                "SELECT id FROM memberships WHERE user_id = ? AND structure_id = ?",
                &[Some(user), Some(structure)],
                CreateMembershipRequest {
                    user: user.to_string(),
                    structure: structure.to_string(),
                    role: Some(role),
                    grade: Some(grade),
                    is_fc_up_to_date: Some(is_fc),
                    is_active: Some(true),
                },
            )
            .await?;
    }

    let mut items: Vec<(&str, String)> = Vec::new();
    for &(key, sku, name, unit, category, consumable, expiry, lot_number) in ITEMS {
        let id = seeder
            .upsert::<ItemRepository>(
                "SELECT id FROM items WHERE organization_id = ? AND sku = ?",
                &[Some(org.as_str()), Some(sku)],
                CreateItemRequest {
                    organization: org.clone(),
                    name: name.to_string(),
                    sku: Some(sku.to_string()),
                    unit: Some(unit.to_string()),
                    category: Some(category.to_string()),
                    is_consumable: Some(consumable),
                    requires_expiry: Some(expiry),
                    requires_lot_number: Some(lot_number),
                    is_active: Some(true),
                },
            )
            .await?;
        items.push((key, id));
    }

    let mut sites: Vec<(&str, String)> = Vec::new();
    for &(key, structure, name, address) in SITES {
        let structure = key_of(&structures, structure)?;
        let id = seeder
            .upsert::<SiteRepository>(
                "SELECT id FROM sites WHERE structure_id = ? AND name = ?",
                &[Some(structure), Some(name)],
                CreateSiteRequest {
                    structure: structure.to_string(),
                    name: name.to_string(),
                    address: Some(address.to_string()),
                },
            )
            .await?;
        sites.push((key, id));
    }

    let mut locations: Vec<(&str, String)> = Vec::new();
    for &(key, site, name, location_type) in LOCATIONS {
        let site = key_of(&sites, site)?;
        let id = seeder
            .upsert::<LocationRepository>(
                "SELECT id FROM locations WHERE site_id = ? AND name = ?",
                &[Some(site), Some(name)],
                CreateLocationRequest {
                    site: site.to_string(),
                    name: name.to_string(),
                    location_type: Some(location_type.to_string()),
                },
            )
            .await?;
        locations.push((key, id));
    }

    let mut containers: Vec<(&str, String)> = Vec::new();
    for &(key, identifier, structure, location, container_type, label) in CONTAINERS {
        let structure = key_of(&structures, structure)?;
        let location = key_of(&locations, location)?;
        let id = seeder
            .upsert::<ContainerRepository>(
                "SELECT id FROM containers WHERE structure_id = ? AND identifier = ?",
                &[Some(structure), Some(identifier)],
                CreateContainerRequest {
                    structure: structure.to_string(),
                    location: Some(location.to_string()),
                    container_type,
                    identifier: identifier.to_string(),
                    label: Some(label.to_string()),
                    is_active: Some(true),
                },
            )
            .await?;
        containers.push((key, id));
    }

    let mut templates: Vec<(LotCode, String)> = Vec::new();
    for &(code, name) in TEMPLATES {
        let id = seeder
            .upsert::<LotTemplateRepository>(
                "SELECT id FROM lot_templates WHERE organization_id = ? AND code = ? AND version = ?",
                &[Some(org.as_str()), Some(code.as_ref()), Some(TEMPLATE_VERSION)],
                CreateLotTemplateRequest {
                    organization: org.clone(),
                    code,
                    name: name.to_string(),
                    version: Some(TEMPLATE_VERSION.to_string()),
                    is_active: Some(true),
                },
            )
            .await?;
        templates.push((code, id));
    }

    for &(code, group, item, expected_qty, notes) in TEMPLATE_ITEMS {
        let template = key_of(&templates, code)?;
        let item = key_of(&items, item)?;
        seeder
            .upsert::<LotTemplateItemRepository>(
                r#"SELECT id FROM lot_template_items WHERE template_id = ? AND "group" = ? AND item_id = ?"#,
                &[Some(template), Some(group.as_ref()), Some(item)],
                CreateLotTemplateItemRequest {
                    template: template.to_string(),
                    group,
                    item: item.to_string(),
                    expected_qty,
                    notes: Some(notes.to_string()),
                },
            )
            .await?;
    }

    let mut lots: Vec<(&str, String)> = Vec::new();
    for &(key, code, container) in LOT_INSTANCES {
        let template = key_of(&templates, code)?;
        let container = key_of(&containers, container)?;
        let id = seeder
            .upsert::<LotInstanceRepository>(
                "SELECT id FROM lot_instances WHERE template_id = ? AND container_id = ?",
                &[Some(template), Some(container)],
                CreateLotInstanceRequest {
                    template: template.to_string(),
                    container: container.to_string(),
                    last_checked_at: None,
                    next_check_due_at: None,
                    status: Some(DEFAULT_LOT_STATUS.to_string()),
                },
            )
            .await?;
        lots.push((key, id));
    }

    let mut batches: Vec<(&str, String)> = Vec::new();
    for &(item_key, lot_number, (y, m, d)) in BATCHES {
        let item = key_of(&items, item_key)?;
        let id = seeder
            .upsert::<BatchRepository>(
                "SELECT id FROM batches WHERE item_id = ? AND lot_number = ?",
                &[Some(item), Some(lot_number)],
                CreateBatchRequest {
                    item: item.to_string(),
                    lot_number: Some(lot_number.to_string()),
                    expires_at: NaiveDate::from_ymd_opt(y, m, d),
                },
            )
            .await?;
        batches.push((item_key, id));
    }

    for &(lot, item, quantity, batch) in STOCK_LINES {
        let lot = key_of(&lots, lot)?;
        let item = key_of(&items, item)?;
        let batch = match batch {
            Some(key) => Some(key_of(&batches, key)?),
            None => None,
        };
        seeder
            .upsert::<StockLineRepository>(
                "SELECT id FROM stock_lines WHERE lot_instance_id = ? AND item_id = ? AND batch_id IS ?",
                &[Some(lot), Some(item), batch],
                CreateStockLineRequest {
                    lot_instance: lot.to_string(),
                    item: item.to_string(),
                    batch: batch.map(str::to_string),
                    quantity: Some(quantity),
                },
            )
            .await?;
    }

    log::info!(
        "Demo data seeded: {} rows created, {} already present",
        seeder.report.created,
        seeder.report.existing
    );
    Ok(seeder.report)
}

/// Development only: removes all inventory data, memberships and structures,
/// the demo organization and the demo accounts, in one transaction.
pub async fn flush_demo_data(pool: &SqlitePool) -> ApiResult<()> {
    log::warn!("Flushing demo data");
    let demo_users = format!("%{}", DEMO_EMAIL_DOMAIN);
    let mut tx = pool.begin().await?;

    for statement in [
        "DELETE FROM inventory_lines",
        "DELETE FROM inventory_sessions",
        "DELETE FROM stock_movements",
        "DELETE FROM stock_lines",
        "DELETE FROM batches",
        "DELETE FROM lot_instances",
        "DELETE FROM lot_template_items",
        "DELETE FROM lot_templates",
        "DELETE FROM containers",
        "DELETE FROM locations",
        "DELETE FROM sites",
        "DELETE FROM items",
        "DELETE FROM memberships",
        "UPDATE structures SET parent_id = NULL",
        "DELETE FROM structures",
    ] {
        sqlx::query(statement).execute(&mut *tx).await?;
    }

    sqlx::query("DELETE FROM organizations WHERE slug = ?")
        .bind(DEMO_ORGANIZATION)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM revoked_tokens WHERE user_id IN (SELECT id FROM users WHERE email LIKE ?)")
        .bind(&demo_users)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM users WHERE email LIKE ?")
        .bind(&demo_users)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use crate::testing;

    async fn count(pool: &SqlitePool, table: &str) -> i64 {
        sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
            .fetch_one(pool)
            .await
            .unwrap()
    }

    #[actix_rt::test]
    async fn test_seed_is_idempotent() {
        let pool = test_pool().await;
        let auth = AuthService::new(&testing::test_config().auth);

        let first = seed_demo(&pool, &auth, false).await.unwrap();
        assert_eq!(first.existing, 0);
        assert_eq!(count(&pool, "structures").await, 4);
        assert_eq!(count(&pool, "users").await, 7);
        assert_eq!(count(&pool, "memberships").await, 7);
        assert_eq!(count(&pool, "containers").await, 6);
        assert_eq!(count(&pool, "lot_instances").await, 4);
        assert_eq!(count(&pool, "stock_lines").await, 8);

        let second = seed_demo(&pool, &auth, false).await.unwrap();
        assert_eq!(second.created, 0);
        assert_eq!(second.existing, first.created);
        assert_eq!(count(&pool, "stock_lines").await, 8);
    }

    #[actix_rt::test]
    async fn test_seeded_accounts_and_scoping() {
        let pool = test_pool().await;
        let auth = AuthService::new(&testing::test_config().auth);
        seed_demo(&pool, &auth, false).await.unwrap();

        let admin = User::find_by_email(&pool, "admin@croix-rouge.fr").await.unwrap().unwrap();
        assert!(admin.is_superuser && admin.is_staff);
        assert_eq!(admin.role, UserRole::AdminGlobal);
        assert!(auth.verify_password("adminadmin", &admin.password_hash));

        let referent = User::find_by_email(&pool, "jeremy.vernadet@croix-rouge.fr").await.unwrap().unwrap();
        assert_eq!(referent.role, UserRole::Referent);
        let requester = Requester::for_user(&pool, &referent).await.unwrap();
        assert_eq!(requester.memberships.active_structure_ids().len(), 1);
        assert!(requester.memberships.has_role(
            &sqlx::query_scalar::<_, String>("SELECT id FROM structures WHERE code = 'UL01'")
                .fetch_one(&pool)
                .await
                .unwrap(),
            MembershipRole::WRITERS,
        ));

        let parent: Option<String> = sqlx::query_scalar(
            "SELECT p.code FROM structures s JOIN structures p ON p.id = s.parent_id WHERE s.code = 'UL02'",
        )
        .fetch_optional(&pool)
        .await
        .unwrap();
        assert_eq!(parent.as_deref(), Some("DT01"));
    }

    #[actix_rt::test]
    async fn test_flush_then_reseed() {
        let pool = test_pool().await;
        let auth = AuthService::new(&testing::test_config().auth);
        seed_demo(&pool, &auth, false).await.unwrap();
        let other = testing::create_user(&pool, "someone@example.org", false).await;

        let report = seed_demo(&pool, &auth, true).await.unwrap();
        assert_eq!(report.existing, 0);
        assert_eq!(count(&pool, "users").await, 8);
        assert!(User::find_by_id(&pool, &other.id).await.unwrap().is_some());
        assert_eq!(count(&pool, "organizations").await, 1);
        assert_eq!(count(&pool, "stock_lines").await, 8);
    }
}
