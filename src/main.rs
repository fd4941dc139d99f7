// src/main.rs - Hygie API server: wiring, middleware and routes
use actix_web::{
    middleware::{DefaultHeaders, Logger, NormalizePath},
    web, App, HttpServer,
};
use actix_web::http::header;
use actix_web_httpauth::middleware::HttpAuthentication;
use actix_cors::Cors;
use anyhow::Context;
use clap::{Parser, Subcommand};
use rand::{distributions::Alphanumeric, thread_rng, Rng};
use sqlx::{sqlite::{SqliteConnectOptions, SqlitePoolOptions}, SqlitePool};
use std::env;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod access;
mod auth;
mod auth_handlers;
mod config;
mod db;
mod error;
mod handlers;
mod inventory_handlers;
mod models;
mod monitoring;
mod organization_handlers;
pub mod repositories;
mod seed;
pub mod validator;
#[cfg(test)]
mod testing;

use auth::{jwt_middleware, AuthService, RegisterRequest, User};
use config::Config;
use handlers::crud_scope;
use monitoring::{Metrics, RequestLogger};
use repositories::*;

pub struct AppState {
    pub db_pool: SqlitePool,
    pub config: Config,
}

#[derive(Parser)]
#[command(name = "hygie")]
#[command(about = "First-aid equipment and stock tracking API")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API (default)
    Serve,
    /// Load the Croix-Rouge demo data set
    SeedDemo {
        /// Delete existing inventory data and demo accounts first
        #[arg(long)]
        flush: bool,
    },
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::load()?;
    setup_logging(&config)?;

    let pool = create_database_pool(&config.database).await?;
    db::run_migrations(&pool).await.context("Failed to run migrations")?;
    let auth_service = Arc::new(AuthService::new(&config.auth));

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config, pool, auth_service).await,
        Command::SeedDemo { flush } => {
            if flush && Config::is_production() {
                anyhow::bail!("Refusing to flush data in production");
            }
            let report = seed::seed_demo(&pool, &auth_service, flush)
                .await
                .map_err(|e| anyhow::anyhow!("Failed to seed demo data: {}", e))?;
            println!("Demo data ready ({} created, {} already present)", report.created, report.existing);
            Ok(())
        }
    }
}

async fn serve(config: Config, pool: SqlitePool, auth_service: Arc<AuthService>) -> anyhow::Result<()> {
    if Config::is_production() {
        config.validate_production()?;
    }
    config.print_startup_info();

    create_default_admin_if_needed(&pool, &auth_service).await?;

    let app_state = Arc::new(AppState {
        db_pool: pool.clone(),
        config: config.clone(),
    });

    let maintenance_pool = pool.clone();
    tokio::spawn(async move {
        monitoring::start_maintenance_tasks(maintenance_pool).await;
    });

    let bind_address = format!("{}:{}", config.server.host, config.server.port);
    log::info!("Starting server at http://{}", bind_address);

    let metrics = Arc::new(Metrics::new());
    let workers = config.server.workers;

    let server = HttpServer::new(move || {
        App::new()
            .wrap(NormalizePath::trim())
            .wrap(RequestLogger::new(metrics.clone()))
            .wrap(Logger::default())
            .wrap(setup_security_headers(&config.security))
            .wrap(setup_cors(&config.security.allowed_origins))
            .app_data(web::Data::new(app_state.clone()))
            .app_data(web::Data::new(auth_service.clone()))
            .app_data(web::Data::new(metrics.clone()))
            .app_data(web::PayloadConfig::new(config.security.max_request_size))
            .configure(configure_routes)
    });

    let server = match workers {
        Some(n) => server.workers(n),
        None => server,
    };

    server.bind(&bind_address)?.run().await?;
    Ok(())
}

/// Every route of the API. Public probes and token endpoints are matched
/// before the authenticated `/api/v1` scope.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.app_data(handlers::json_config())
        .app_data(handlers::query_config())
        .route("/api/v1/health", web::get().to(monitoring::health_check))
        .route("/api/v1/ready", web::get().to(monitoring::readiness_check))
        .route("/api/v1/version", web::get().to(monitoring::version_info))
        .route("/api/v1/metrics", web::get().to(monitoring::metrics_endpoint))
        .service(
            web::scope("/api/v1/auth")
                .route("/register", web::post().to(auth_handlers::register))
                .route("/jwt/create", web::post().to(auth_handlers::create_token))
                .route("/jwt/refresh", web::post().to(auth_handlers::refresh_token))
                .service(
                    web::resource("/jwt/logout")
                        .wrap(HttpAuthentication::bearer(jwt_middleware))
                        .route(web::post().to(auth_handlers::logout)),
                ),
        )
        .service(
            web::scope("/api/v1")
                .wrap(HttpAuthentication::bearer(jwt_middleware))
                .service(
                    web::scope("/users")
                        .route("/me", web::get().to(auth_handlers::get_me))
                        .route("/me", web::patch().to(auth_handlers::update_me))
                        .route("/me", web::put().to(auth_handlers::update_me))
                        .route("", web::get().to(auth_handlers::get_users))
                        .route("/{id}", web::get().to(auth_handlers::get_user))
                        .route("/{id}", web::patch().to(auth_handlers::update_user))
                        .route("/{id}", web::put().to(auth_handlers::update_user))
                        .route("/{id}", web::delete().to(auth_handlers::delete_user)),
                )
                .service(crud_scope::<OrganizationRepository>("/organizations"))
                .service(crud_scope::<StructureRepository>("/structures"))
                .service(organization_handlers::memberships_scope())
                .service(crud_scope::<ItemRepository>("/items"))
                .service(crud_scope::<SiteRepository>("/sites"))
                .service(crud_scope::<LocationRepository>("/locations"))
                .service(crud_scope::<ContainerRepository>("/containers"))
                .service(crud_scope::<LotTemplateRepository>("/lot-templates"))
                .service(crud_scope::<LotTemplateItemRepository>("/lot-template-items"))
                .service(crud_scope::<LotInstanceRepository>("/lot-instances"))
                .service(crud_scope::<BatchRepository>("/batches"))
                .service(crud_scope::<StockLineRepository>("/stock-lines"))
                .service(crud_scope::<StockMovementRepository>("/stock-movements"))
                .service(inventory_handlers::sessions_scope())
                .service(crud_scope::<InventoryLineRepository>("/inventory-lines")),
        );
}

fn setup_logging(config: &Config) -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(config.logging.level.as_str()));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .context("Failed to initialise logging")?;

    Ok(())
}

async fn create_database_pool(db_config: &config::DatabaseConfig) -> anyhow::Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(&db_config.url)
        .with_context(|| format!("Invalid database URL: {}", db_config.url))?
        .create_if_missing(true)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(db_config.max_connections)
        .min_connections(db_config.min_connections)
        .acquire_timeout(Duration::from_secs(db_config.connect_timeout))
        .connect_with(options)
        .await
        .with_context(|| format!("Failed to open database: {}", db_config.url))?;
    Ok(pool)
}

fn setup_cors(allowed_origins: &[String]) -> Cors {
    let mut cors = Cors::default()
        .allowed_methods(vec!["GET", "POST", "PUT", "PATCH", "DELETE", "OPTIONS"])
        .allowed_headers(vec![header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT])
        .expose_headers(vec![header::CONTENT_LENGTH])
        .max_age(3600);

    if allowed_origins.iter().any(|o| o == "*") {
        // Production configs with a wildcard are refused at start-up.
        log::warn!("Using wildcard CORS (*)");
        cors = cors.allow_any_origin();
    } else {
        for origin in allowed_origins.iter().filter(|o| !o.is_empty()) {
            cors = cors.allowed_origin(origin);
        }
    }
    cors
}

fn setup_security_headers(config: &config::SecurityConfig) -> DefaultHeaders {
    let mut headers = DefaultHeaders::new()
        .add(("X-Content-Type-Options", "nosniff"))
        .add(("X-Frame-Options", "DENY"))
        .add(("Referrer-Policy", "strict-origin-when-cross-origin"));

    if config.require_https {
        headers = headers.add(("Strict-Transport-Security", "max-age=31536000; includeSubDomains"));
    }
    headers
}

/// First start: a superuser from `DEFAULT_ADMIN_EMAIL` / `DEFAULT_ADMIN_PASSWORD`.
async fn create_default_admin_if_needed(pool: &SqlitePool, auth_service: &AuthService) -> anyhow::Result<()> {
    if User::count(pool).await.map_err(|e| anyhow::anyhow!("{}", e))? > 0 {
        return Ok(());
    }

    let email = env::var("DEFAULT_ADMIN_EMAIL").unwrap_or_else(|_| "admin@hygie.local".to_string());
    let password = env::var("DEFAULT_ADMIN_PASSWORD").unwrap_or_else(|_| {
        let generated: String = thread_rng()
            .sample_iter(&Alphanumeric)
            .take(20)
            .map(char::from)
            .collect();
        log::warn!("Generated admin password: {}", generated);
        generated
    });

    let request = RegisterRequest {
        email: email.clone(),
        full_name: "Administrator".to_string(),
        password,
    };
    User::create(pool, request, auth_service, true, true)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create default admin user: {}", e))?;

    log::info!("Default superuser {} created", email);
    Ok(())
}
