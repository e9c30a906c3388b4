use actix_web::{web, App, HttpServer};
use dotenv::dotenv;
use horizon_chat::{AppError, AppState, Settings};
use std::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[actix_web::main]
async fn main() -> horizon_chat::Result<()> {
    // Load environment variables
    dotenv().ok();

    // Initialize logging
    FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();

    // Load configuration
    let config = Settings::new()?;
    info!("Configuration loaded successfully ({})", config.environment);

    info!("Starting server at {}:{}", config.server.host, config.server.port);

    let state = AppState::new(config.clone());
    let data = web::Data::new(state.clone());

    // Create and bind TCP listener
    let listener = TcpListener::bind(format!("{}:{}", config.server.host, config.server.port))?;

    info!("WebSocket endpoint ready at {}", config.websocket_url());

    let cors_config = config.cors.clone();
    let server = HttpServer::new(move || {
        App::new()
            .wrap(data.upgrade_gate())
            .wrap(horizon_chat::cors(&cors_config))
            .app_data(data.clone())
            .configure(horizon_chat::routes)
    })
    .listen(listener)?
    .workers(config.server.workers as usize)
    .disable_signals()
    .run();

    // Close live sessions before the server stops accepting work
    let handle = server.handle();
    actix_web::rt::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for shutdown signal: {}", e);
            return;
        }
        info!("Shutdown requested, closing {} sessions", state.pool.connection_count().await);
        state.shutdown();
        handle.stop(true).await;
    });

    server.await.map_err(|e| {
        error!("Server error: {}", e);
        AppError::InternalError(e.to_string())
    })?;

    info!("Server stopped");
    Ok(())
}
