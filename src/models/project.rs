use serde::{Deserialize, Serialize};

/// Isolation boundary for sources, index and search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    /// Unix milliseconds
    pub created_at: i64,
    /// Set when an import dropped vectors that could not be merged.
    #[serde(default)]
    pub needs_reindex: bool,
}

impl Project {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            created_at: chrono::Utc::now().timestamp_millis(),
            needs_reindex: false,
        }
    }

    /// Generate an id of the form `proj-xxxxxxxx`.
    pub fn generate_id() -> String {
        let uuid = uuid::Uuid::new_v4().simple().to_string();
        format!("proj-{}", &uuid[..8])
    }
}
