//! Configuration for quilld

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// Main service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub render: RenderConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,

    /// Allow cross-origin requests from any origin
    #[serde(default = "default_true")]
    pub enable_cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            enable_cors: true,
        }
    }
}

/// Storage backend selection
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    /// In-memory storage (for development/testing)
    #[default]
    Memory,

    /// PostgreSQL storage
    Postgres {
        /// Connection URL
        url: String,

        /// Maximum connections in pool
        #[serde(default = "default_pool_size")]
        max_connections: u32,

        /// Connection timeout in seconds
        #[serde(default = "default_connection_timeout")]
        connect_timeout_secs: u64,
    },
}

/// Optional image rendering service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderConfig {
    /// Endpoint accepting `{"prompt": ...}`. Rendering is disabled when unset.
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Request timeout in seconds
    #[serde(default = "default_render_timeout")]
    pub timeout_secs: u64,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout_secs: default_render_timeout(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// JSON format
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8000))
}

fn default_true() -> bool {
    true
}

fn default_pool_size() -> u32 {
    10
}

fn default_connection_timeout() -> u64 {
    5
}

fn default_render_timeout() -> u64 {
    120
}

fn default_log_level() -> String {
    "info".to_string()
}

impl ServiceConfig {
    /// Load configuration: defaults, then an optional file, then
    /// `QUILL__SECTION__KEY` environment variables.
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder()
            .add_source(config::Config::try_from(&ServiceConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("QUILL")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_use_memory_storage_and_no_renderer() {
        let config = ServiceConfig::default();
        assert_eq!(config.server.listen_addr.port(), 8000);
        assert!(matches!(config.storage, StorageConfig::Memory));
        assert!(config.render.endpoint.is_none());
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn load_without_file_yields_defaults() {
        let config = ServiceConfig::load(None).unwrap();
        assert!(config.server.enable_cors);
        assert_eq!(config.render.timeout_secs, 120);
    }

    #[test]
    fn postgres_section_parses_with_defaults() {
        let storage: StorageConfig =
            serde_json::from_str(r#"{"type":"postgres","url":"postgres://localhost/quill"}"#)
                .unwrap();
        match storage {
            StorageConfig::Postgres {
                url,
                max_connections,
                connect_timeout_secs,
            } => {
                assert_eq!(url, "postgres://localhost/quill");
                assert_eq!(max_connections, 10);
                assert_eq!(connect_timeout_secs, 5);
            }
            StorageConfig::Memory => panic!("expected postgres"),
        }
    }
}
