//! Indexer configuration.

use serde::{Deserialize, Serialize};

/// Options for a [`crate::CubeIndexer`].
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IndexerOptions {
    /// Database schema the cube tables are materialized into.
    #[serde(default = "default_schema")]
    pub schema: String,
    /// Whether indexing is active at all. Disabled indexers answer every
    /// request with "not indexable" and hold no state.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_schema() -> String {
    "mosaic".to_string()
}

fn default_enabled() -> bool {
    true
}

impl Default for IndexerOptions {
    fn default() -> Self {
        IndexerOptions { schema: default_schema(), enabled: default_enabled() }
    }
}
