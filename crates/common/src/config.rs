use serde::{Deserialize, Serialize};

/// Top-level system configuration, deserialized from system.toml.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SystemConfig {
    pub store: StoreConfig,
    pub listing: ListingConfig,
    pub reconciliation: ReconciliationConfig,
}

/// Relationship store connection parameters.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Max pooled PostgreSQL connections.
    pub max_connections: u32,
    /// Seconds to wait for a pooled connection before failing the operation.
    pub acquire_timeout_seconds: u64,
}

/// Pagination limits for listing endpoints.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ListingConfig {
    /// Page size used when the caller does not supply one.
    pub default_page_size: u32,
    /// Upper bound on caller-supplied page sizes.
    pub max_page_size: u32,
}

/// Connection counter repair pass.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReconciliationConfig {
    /// Whether the binary spawns the periodic repair task.
    pub enabled: bool,
    pub interval_minutes: u32,
    /// Identities processed per page of the repair scan.
    pub batch_size: u32,
}

impl SystemConfig {
    /// Parse the contents of a system.toml file.
    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig {
                max_connections: 10,
                acquire_timeout_seconds: 5,
            },
            listing: ListingConfig {
                default_page_size: 20,
                max_page_size: 100,
            },
            reconciliation: ReconciliationConfig {
                enabled: false,
                interval_minutes: 60,
                batch_size: 500,
            },
        }
    }
}
