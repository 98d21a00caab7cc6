use serde::{Deserialize, Serialize};

/// GET /health response. Only the index fields matter to the client.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    #[serde(default)]
    pub chroma_db_exists: bool,
    #[serde(default)]
    pub collection_exists: bool,
    #[serde(default)]
    pub collection_count: u64,
}

impl HealthStatus {
    /// Whether the retrieval index is missing or empty and should be (re)built.
    pub fn needs_index(&self) -> bool {
        !self.collection_exists || self.collection_count == 0
    }
}

/// POST /check_and_index response.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IndexOutcome {
    pub indexed: bool,
    #[serde(default)]
    pub count: u64,
    #[serde(default)]
    pub message: String,
}

impl IndexOutcome {
    /// The reason an index build did not produce an index, if it failed.
    pub fn failure(&self) -> Option<&str> {
        if self.indexed {
            return None;
        }
        Some(if self.message.is_empty() {
            "Index build failed"
        } else {
            self.message.as_str()
        })
    }
}
