//! State store configuration.

use serde::{Deserialize, Serialize};

/// State store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// SQLite URL.
    #[serde(default = "default_database_url")]
    pub database_url: String,
    /// Connection pool size.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
            max_connections: default_max_connections(),
        }
    }
}

fn default_database_url() -> String {
    "sqlite://order_engine.db".to_string()
}

const fn default_max_connections() -> u32 {
    5
}
