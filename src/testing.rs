// src/testing.rs
//! Fixtures shared by the test modules.

use sqlx::SqlitePool;
use uuid::Uuid;
use crate::access::Requester;
use crate::auth::{AuthService, RegisterRequest, User};
use crate::config::Config;
use crate::models::*;
use crate::repositories::*;

pub const PASSWORD: &str = "password123";

pub fn test_config() -> Config {
    let mut config = Config::default();
    config.auth.bcrypt_cost = 4;
    config
}

/// Builds the full application around `pool`, as `main` does minus the outer middleware.
#[macro_export]
macro_rules! test_app {
    ($pool:expr) => {{
        let config = $crate::testing::test_config();
        let auth_service = std::sync::Arc::new($crate::auth::AuthService::new(&config.auth));
        let state = std::sync::Arc::new($crate::AppState { db_pool: $pool, config });
        actix_web::test::init_service(
            actix_web::App::new()
                .app_data(actix_web::web::Data::new(state))
                .app_data(actix_web::web::Data::new(auth_service))
                .app_data(actix_web::web::Data::new(std::sync::Arc::new($crate::monitoring::Metrics::new())))
                .wrap(actix_web::middleware::NormalizePath::trim())
                .configure($crate::configure_routes),
        )
        .await
    }};
}

/// `Authorization` header carrying a fresh access token for `user`.
pub fn bearer(user: &User) -> (&'static str, String) {
    let service = AuthService::new(&test_config().auth);
    let token = service.generate_access_token(user).unwrap();
    ("Authorization", format!("Bearer {}", token))
}

pub async fn create_user(pool: &SqlitePool, email: &str, is_superuser: bool) -> User {
    let service = AuthService::new(&test_config().auth);
    let request = RegisterRequest {
        email: email.to_string(),
        full_name: email.split('@').next().unwrap_or_default().to_string(),
        password: PASSWORD.to_string(),
    };
    User::create(pool, request, &service, is_superuser, is_superuser).await.unwrap()
}

pub async fn create_organization(pool: &SqlitePool, slug: &str) -> String {
    let id = Uuid::new_v4().to_string();
    let data = CreateOrganizationRequest {
        name: slug.to_uppercase(),
        slug: slug.to_string(),
        is_active: None,
    };
    OrganizationRepository.insert(pool, &id, data, &Requester::anonymous()).await.unwrap();
    id
}

pub async fn create_structure(pool: &SqlitePool, organization: &str, code: &str, parent: Option<&str>) -> String {
    let id = Uuid::new_v4().to_string();
    let data = CreateStructureRequest {
        organization: organization.to_string(),
        level: if parent.is_some() { StructureLevel::Local } else { StructureLevel::Territorial },
        name: code.to_string(),
        parent: parent.map(str::to_string),
        code: Some(code.to_string()),
        is_active: None,
    };
    StructureRepository.insert(pool, &id, data, &Requester::anonymous()).await.unwrap();
    id
}

pub async fn add_membership(pool: &SqlitePool, user_id: &str, structure_id: &str, role: MembershipRole) -> String {
    let id = Uuid::new_v4().to_string();
    let data = CreateMembershipRequest {
        user: user_id.to_string(),
        structure: structure_id.to_string(),
        role: Some(role),
        grade: None,
        is_fc_up_to_date: None,
        is_active: None,
    };
    MembershipRepository.insert(pool, &id, data, &Requester::anonymous()).await.unwrap();
    id
}

async fn create_container(pool: &SqlitePool, structure: &str, identifier: &str) -> String {
    let id = Uuid::new_v4().to_string();
    let data = CreateContainerRequest {
        structure: structure.to_string(),
        location: None,
        container_type: ContainerType::BagIntervention,
        identifier: identifier.to_string(),
        label: None,
        is_active: None,
    };
    ContainerRepository.insert(pool, &id, data, &Requester::anonymous()).await.unwrap();
    id
}

async fn create_lot(pool: &SqlitePool, template: &str, container: &str) -> String {
    let id = Uuid::new_v4().to_string();
    let data = CreateLotInstanceRequest {
        template: template.to_string(),
        container: container.to_string(),
        last_checked_at: None,
        next_check_due_at: None,
        status: None,
    };
    LotInstanceRepository.insert(pool, &id, data, &Requester::anonymous()).await.unwrap();
    id
}

async fn create_stock_line(pool: &SqlitePool, lot: &str, item: &str) -> String {
    let id = Uuid::new_v4().to_string();
    let data = CreateStockLineRequest {
        lot_instance: lot.to_string(),
        item: item.to_string(),
        batch: None,
        quantity: Some(10.0),
    };
    StockLineRepository.insert(pool, &id, data, &Requester::anonymous()).await.unwrap();
    id
}

/// One organization, a territorial structure with two local units and a bag in each.
///
/// `viewer` is VIEWER and `referent` is REFERENT on UL01 only; `root` is a superuser.
pub struct World {
    pub org: String,
    pub dt: String,
    pub ul01: String,
    pub ul02: String,
    pub root: User,
    pub viewer: User,
    pub referent: User,
    pub item: String,
    pub template: String,
    pub ul01_container: String,
    pub ul02_container: String,
    pub ul01_lot: String,
    pub ul02_lot: String,
    pub ul01_stock_line: String,
    pub ul02_stock_line: String,
}

impl World {
    pub async fn seed(pool: &SqlitePool) -> Self {
        let org = create_organization(pool, "crf").await;
        let dt = create_structure(pool, &org, "DT75", None).await;
        let ul01 = create_structure(pool, &org, "UL01", Some(&dt)).await;
        let ul02 = create_structure(pool, &org, "UL02", Some(&dt)).await;

        let root = create_user(pool, "root@crf.org", true).await;
        let viewer = create_user(pool, "viewer@crf.org", false).await;
        let referent = create_user(pool, "referent@crf.org", false).await;
        add_membership(pool, &viewer.id, &ul01, MembershipRole::Viewer).await;
        add_membership(pool, &referent.id, &ul01, MembershipRole::Referent).await;

        let item = Uuid::new_v4().to_string();
        let data = CreateItemRequest {
            organization: org.clone(),
            name: "Compresses stériles".to_string(),
            sku: Some("CMP-10".to_string()),
            unit: Some("box".to_string()),
            category: None,
            is_consumable: None,
            requires_expiry: Some(true),
            requires_lot_number: None,
            is_active: None,
        };
        ItemRepository.insert(pool, &item, data, &Requester::anonymous()).await.unwrap();

        let template = Uuid::new_v4().to_string();
        let data = CreateLotTemplateRequest {
            organization: org.clone(),
            code: LotCode::LotA,
            name: "Lot A".to_string(),
            version: Some("2024".to_string()),
            is_active: None,
        };
        LotTemplateRepository.insert(pool, &template, data, &Requester::anonymous()).await.unwrap();

        let ul01_container = create_container(pool, &ul01, "UL01-BAG-1").await;
        let ul02_container = create_container(pool, &ul02, "UL02-BAG-1").await;
        let ul01_lot = create_lot(pool, &template, &ul01_container).await;
        let ul02_lot = create_lot(pool, &template, &ul02_container).await;
        let ul01_stock_line = create_stock_line(pool, &ul01_lot, &item).await;
        let ul02_stock_line = create_stock_line(pool, &ul02_lot, &item).await;

        Self {
            org,
            dt,
            ul01,
            ul02,
            root,
            viewer,
            referent,
            item,
            template,
            ul01_container,
            ul02_container,
            ul01_lot,
            ul02_lot,
            ul01_stock_line,
            ul02_stock_line,
        }
    }
}
