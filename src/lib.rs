pub mod config;
pub mod error;
pub mod identity;
pub mod websocket;

use std::sync::Arc;
use actix_cors::Cors;
use actix_web::{web, HttpResponse};
use serde::Serialize;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

pub use error::AppError;
pub type Result<T> = std::result::Result<T, AppError>;
pub use crate::config::Settings;

pub use identity::{GuestNameGenerator, UsernameService};
pub use websocket::{ConnectionPool, UpgradeGate};

/// Application state shared across all components
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Settings>,
    pub pool: Arc<ConnectionPool>,
    pub names: Arc<Mutex<GuestNameGenerator>>,
    /// Cancelled once on shutdown; every live session closes with 1001.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(config: Settings) -> Self {
        Self {
            config: Arc::new(config),
            pool: Arc::new(ConnectionPool::new()),
            names: Arc::new(Mutex::new(GuestNameGenerator::new())),
            shutdown: CancellationToken::new(),
        }
    }

    /// Gate for the real-time endpoint. Build one per worker.
    pub fn upgrade_gate(&self) -> UpgradeGate {
        UpgradeGate::new(
            self.config.websocket.clone(),
            self.pool.clone(),
            self.shutdown.clone(),
        )
    }

    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

/// Health check endpoint handler
/// Returns a JSON response with server status, timestamp and live connections
pub async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "connections": state.pool.connection_count().await,
    }))
}

#[derive(Debug, Serialize)]
pub struct GuestNameResponse {
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct GuestNameCheck {
    pub name: String,
    pub is_guest_name: bool,
}

pub async fn guest_name(state: web::Data<AppState>) -> HttpResponse {
    let name = state.names.lock().await.generate_unique_name();
    HttpResponse::Ok().json(GuestNameResponse { name })
}

pub async fn check_guest_name(path: web::Path<String>) -> HttpResponse {
    let name = path.into_inner();
    let is_guest_name = identity::is_guest_name(&name);
    HttpResponse::Ok().json(GuestNameCheck { name, is_guest_name })
}

/// HTTP routes served alongside the real-time endpoint.
pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health_check))
        .route("/api/guest-name", web::get().to(guest_name))
        .route("/api/guest-name/{name}", web::get().to(check_guest_name));
}

pub fn cors(config: &crate::config::CorsConfig) -> Cors {
    if !config.enabled {
        // CORS disabled - use most restrictive settings
        return Cors::default();
    }

    let cors = if config.allow_any_origin {
        Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
    } else {
        config
            .allowed_origins
            .iter()
            .fold(Cors::default(), |cors, origin| cors.allowed_origin(origin))
            .allowed_methods(vec!["GET"])
    };

    cors.max_age(config.max_age as usize)
}
