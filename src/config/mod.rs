use config::{builder::DefaultState, Config, ConfigBuilder, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub workers: u32,
}

/// Settings for the real-time endpoint and every session it spawns.
#[derive(Debug, Deserialize, Clone)]
pub struct WebSocketConfig {
    pub path: String,
    pub read_buffer_size: usize,
    pub max_message_size: usize,
    pub close_timeout_secs: u64,
}

impl WebSocketConfig {
    pub fn close_timeout(&self) -> Duration {
        Duration::from_secs(self.close_timeout_secs)
    }
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            path: "/ws".to_string(),
            read_buffer_size: 4096,
            max_message_size: 64 * 1024,
            close_timeout_secs: 5,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct CorsConfig {
    pub enabled: bool,
    pub allow_any_origin: bool,
    pub allowed_origins: Vec<String>,
    pub max_age: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IdentityConfig {
    pub storage_path: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub environment: String,
    pub server: ServerConfig,
    pub websocket: WebSocketConfig,
    pub cors: CorsConfig,
    pub identity: IdentityConfig,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = Self::defaults("development")?
            // Add in settings from the config file if it exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Add in settings from environment variables (with prefix "APP_")
            // E.g., `APP_SERVER__PORT=5001` would set `Settings.server.port`
            .add_source(Self::environment())
            .build()?;

        s.try_deserialize()
    }

    /// Defaults only, with the `test` environment; no files or env vars.
    pub fn new_for_test() -> Result<Self, ConfigError> {
        Self::defaults("test")?
            .build()?
            .try_deserialize()
    }

    /// Base URL a client uses to reach the real-time endpoint.
    pub fn websocket_url(&self) -> String {
        format!("ws://{}:{}{}", self.server.host, self.server.port, self.websocket.path)
    }

    /// `APP_` prefix, `__` between nested keys.
    fn environment() -> Environment {
        Environment::with_prefix("app")
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
    }

    fn defaults(environment: &str) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        let websocket = WebSocketConfig::default();

        Config::builder()
            .set_default("environment", environment)?
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8080)?
            .set_default("server.workers", num_cpus::get() as i64)?
            .set_default("websocket.path", websocket.path)?
            .set_default("websocket.read_buffer_size", websocket.read_buffer_size as i64)?
            .set_default("websocket.max_message_size", websocket.max_message_size as i64)?
            .set_default("websocket.close_timeout_secs", websocket.close_timeout_secs as i64)?
            .set_default("cors.enabled", true)?
            .set_default("cors.allow_any_origin", false)?
            .set_default(
                "cors.allowed_origins",
                vec!["http://localhost:8080", "http://127.0.0.1:8080"],
            )?
            .set_default("cors.max_age", 3600)?
            .set_default("identity.storage_path", ".horizon-chat/identity.json")
    }
}
