// src/monitoring.rs
use actix_web::{HttpResponse, web};
use serde::Serialize;
use std::env;
use std::sync::{Arc, atomic::{AtomicU64, Ordering}};
use sqlx::SqlitePool;
use tokio::time::{interval, Duration};
use crate::AppState;

/// Response times kept for the rolling average.
const RESPONSE_WINDOW: usize = 1000;

#[derive(Debug, Default)]
pub struct Metrics {
    pub request_count: AtomicU64,
    pub client_error_count: AtomicU64,
    pub server_error_count: AtomicU64,
    pub response_times: std::sync::Mutex<Vec<u64>>,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_requests(&self) {
        self.request_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_status(&self, status: actix_web::http::StatusCode) {
        if status.is_client_error() {
            self.client_error_count.fetch_add(1, Ordering::Relaxed);
        } else if status.is_server_error() {
            self.server_error_count.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_response_time(&self, time_ms: u64) {
        if let Ok(mut times) = self.response_times.lock() {
            times.push(time_ms);
            if times.len() > RESPONSE_WINDOW {
                times.remove(0);
            }
        }
    }

    pub fn snapshot(&self) -> MetricsResponse {
        let avg_response_time_ms = match self.response_times.lock() {
            Ok(times) if !times.is_empty() => times.iter().sum::<u64>() as f64 / times.len() as f64,
            _ => 0.0,
        };
        MetricsResponse {
            requests_total: self.request_count.load(Ordering::Relaxed),
            client_errors_total: self.client_error_count.load(Ordering::Relaxed),
            server_errors_total: self.server_error_count.load(Ordering::Relaxed),
            avg_response_time_ms,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MetricsResponse {
    pub requests_total: u64,
    pub client_errors_total: u64,
    pub server_errors_total: u64,
    pub avg_response_time_ms: f64,
}

#[derive(Debug, Serialize)]
pub struct VersionResponse {
    pub name: String,
    pub version: String,
    pub environment: String,
}

// ==================== PROBES ====================

pub async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({ "status": "ok" }))
}

pub async fn readiness_check(app_state: web::Data<Arc<AppState>>) -> HttpResponse {
    match sqlx::query("SELECT 1").execute(&app_state.db_pool).await {
        Ok(_) => HttpResponse::Ok().json(serde_json::json!({ "status": "ok", "db": "ok" })),
        Err(e) => {
            log::error!("Readiness check failed: {}", e);
            HttpResponse::ServiceUnavailable().json(serde_json::json!({
                "status": "down",
                "db": "down",
                "error": e.to_string()
            }))
        }
    }
}

/// `APP_VERSION` wins over the crate version when set and non-blank.
fn app_version(configured: Option<String>) -> String {
    configured
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| env!("CARGO_PKG_VERSION").to_string())
}

pub async fn version_info() -> HttpResponse {
    HttpResponse::Ok().json(VersionResponse {
        name: env::var("APP_NAME").unwrap_or_else(|_| "hygie-api".to_string()),
        version: app_version(env::var("APP_VERSION").ok()),
        environment: crate::config::Config::environment(),
    })
}

pub async fn metrics_endpoint(metrics: web::Data<Arc<Metrics>>) -> HttpResponse {
    HttpResponse::Ok().json(metrics.snapshot())
}

// ==================== REQUEST LOGGER ====================

pub struct RequestLogger {
    metrics: Arc<Metrics>,
}

impl RequestLogger {
    pub fn new(metrics: Arc<Metrics>) -> Self {
        Self { metrics }
    }
}

impl<S, B> actix_web::dev::Transform<S, actix_web::dev::ServiceRequest> for RequestLogger
where
    S: actix_web::dev::Service<
        actix_web::dev::ServiceRequest,
        Response = actix_web::dev::ServiceResponse<B>,
        Error = actix_web::Error,
    >,
    S::Future: 'static,
    B: 'static,
{
    type Response = actix_web::dev::ServiceResponse<B>;
    type Error = actix_web::Error;
    type InitError = ();
    type Transform = RequestLoggerMiddleware<S>;
    type Future = std::future::Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        std::future::ready(Ok(RequestLoggerMiddleware {
            service,
            metrics: self.metrics.clone(),
        }))
    }
}

pub struct RequestLoggerMiddleware<S> {
    service: S,
    metrics: Arc<Metrics>,
}

impl<S, B> actix_web::dev::Service<actix_web::dev::ServiceRequest> for RequestLoggerMiddleware<S>
where
    S: actix_web::dev::Service<
        actix_web::dev::ServiceRequest,
        Response = actix_web::dev::ServiceResponse<B>,
        Error = actix_web::Error,
    >,
    S::Future: 'static,
    B: 'static,
{
    type Response = actix_web::dev::ServiceResponse<B>;
    type Error = actix_web::Error;
    type Future = std::pin::Pin<Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>>>>;

    fn poll_ready(&self, ctx: &mut std::task::Context<'_>) -> std::task::Poll<Result<(), Self::Error>> {
        self.service.poll_ready(ctx)
    }

    fn call(&self, req: actix_web::dev::ServiceRequest) -> Self::Future {
        let start_time = std::time::Instant::now();
        let metrics = self.metrics.clone();
        let fut = self.service.call(req);

        Box::pin(async move {
            metrics.increment_requests();
            let res = fut.await;
            metrics.record_response_time(start_time.elapsed().as_millis() as u64);

            match res {
                Ok(ref response) => metrics.record_status(response.status()),
                Err(ref err) => metrics.record_status(err.as_response_error().status_code()),
            }
            res
        })
    }
}

// ==================== MAINTENANCE ====================

/// Hourly purge of refresh-token revocations that can no longer matter.
pub async fn start_maintenance_tasks(pool: SqlitePool) {
    let mut interval = interval(Duration::from_secs(3600));

    loop {
        interval.tick().await;
        match crate::db::purge_expired_revocations(&pool).await {
            Ok(0) => {}
            Ok(count) => log::info!("Purged {} expired token revocations", count),
            Err(e) => log::error!("Failed to purge token revocations: {}", e),
        }
    }
}
