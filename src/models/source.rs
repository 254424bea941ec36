//! Source model: one ingested page, document or transcript.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a source's text came from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum SourceOrigin {
    /// Scraped web page
    Url(String),
    /// Uploaded document
    File(String),
    /// Transcribed audio file
    Audio(String),
}

impl SourceOrigin {
    pub fn kind(&self) -> &'static str {
        match self {
            SourceOrigin::Url(_) => "url",
            SourceOrigin::File(_) => "file",
            SourceOrigin::Audio(_) => "audio",
        }
    }

    pub fn location(&self) -> &str {
        match self {
            SourceOrigin::Url(s) | SourceOrigin::File(s) | SourceOrigin::Audio(s) => s,
        }
    }
}

impl fmt::Display for SourceOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind(), self.location())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceStatus {
    #[default]
    Pending,
    Success,
    Error,
}

impl fmt::Display for SourceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceStatus::Pending => write!(f, "pending"),
            SourceStatus::Success => write!(f, "success"),
            SourceStatus::Error => write!(f, "error"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    /// Unique within the owning project
    pub id: String,

    pub project_id: String,

    pub origin: SourceOrigin,

    pub title: String,

    pub status: SourceStatus,

    /// Extracted plain text; the authoritative input for indexing
    #[serde(default)]
    pub text: String,

    /// Adapter failure message when `status` is `error`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Unix milliseconds
    pub created_at: i64,
}

impl Source {
    pub fn generate_id() -> String {
        format!("src-{}", uuid::Uuid::new_v4().simple())
    }

    /// Create a successfully extracted source.
    pub fn new(
        project_id: impl Into<String>,
        origin: SourceOrigin,
        title: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            id: Self::generate_id(),
            project_id: project_id.into(),
            origin,
            title: title.into(),
            status: SourceStatus::Success,
            text: text.into(),
            error: None,
            created_at: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Create a placeholder while an adapter is still extracting text.
    pub fn pending(
        project_id: impl Into<String>,
        origin: SourceOrigin,
        title: impl Into<String>,
    ) -> Self {
        Self {
            status: SourceStatus::Pending,
            ..Self::new(project_id, origin, title, String::new())
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn is_indexable(&self) -> bool {
        self.status == SourceStatus::Success && !self.text.trim().is_empty()
    }
}
