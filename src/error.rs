//! Error types for the project retrieval index.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::utils::retry::Retryable;

/// Errors related to embedding operations.
#[derive(Debug, Clone, Error)]
pub enum EmbeddingError {
    #[error("embedding runtime unavailable: {0}")]
    Unavailable(String),

    #[error("invalid embedding response: {0}")]
    InvalidResponse(String),

    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

impl Retryable for EmbeddingError {
    fn is_retryable(&self) -> bool {
        match self {
            EmbeddingError::Unavailable(msg) => {
                let msg = msg.to_lowercase();
                msg.contains("timeout") || msg.contains("busy") || msg.contains("unavailable")
            }
            EmbeddingError::InvalidResponse(_) | EmbeddingError::DimensionMismatch { .. } => false,
        }
    }
}

/// Errors raised while loading or running a local embedding model.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("model not found: {0}")]
    NotFound(String),

    #[error("failed to load model: {0}")]
    LoadError(String),

    #[error("tokenizer error: {0}")]
    TokenizerError(String),

    #[error("inference error: {0}")]
    InferenceError(String),
}

impl From<ModelError> for EmbeddingError {
    fn from(err: ModelError) -> Self {
        EmbeddingError::Unavailable(err.to_string())
    }
}

/// Errors related to vector store operations.
#[derive(Debug, Clone, Error)]
pub enum VectorStoreError {
    #[error("failed to connect to vector backend: {0}")]
    ConnectionError(String),

    #[error("collection error: {0}")]
    CollectionError(String),

    #[error("upsert error: {0}")]
    UpsertError(String),

    #[error("search error: {0}")]
    SearchError(String),

    #[error("delete error: {0}")]
    DeleteError(String),

    #[error("dimension mismatch for project {project}: expected {expected}, got {actual}")]
    DimensionMismatch {
        project: String,
        expected: usize,
        actual: usize,
    },
}

impl Retryable for VectorStoreError {
    fn is_retryable(&self) -> bool {
        match self {
            VectorStoreError::ConnectionError(_) => true,
            VectorStoreError::CollectionError(msg)
            | VectorStoreError::UpsertError(msg)
            | VectorStoreError::SearchError(msg)
            | VectorStoreError::DeleteError(msg) => {
                let msg_lower = msg.to_lowercase();
                msg_lower.contains("timeout")
                    || msg_lower.contains("connection")
                    || msg_lower.contains("unavailable")
                    || msg_lower.contains("too many")
            }
            VectorStoreError::DimensionMismatch { .. } => false,
        }
    }
}

/// Errors related to index builds.
#[derive(Debug, Clone, Error)]
pub enum IndexError {
    #[error("project not found: {0}")]
    ProjectNotFound(String),

    #[error("embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("vector store error: {0}")]
    VectorStore(#[from] VectorStoreError),

    #[error("reindex worker for project {0} stopped")]
    WorkerStopped(String),
}

/// Errors related to search operations.
#[derive(Debug, Clone, Error)]
pub enum SearchError {
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("project not found: {0}")]
    ProjectNotFound(String),

    #[error("project {0} has not been indexed yet")]
    IndexNotReady(String),

    #[error("index for project {project} was built with dimension {indexed}, query has {query}; reindex required")]
    StaleIndex {
        project: String,
        indexed: usize,
        query: usize,
    },

    #[error("embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("vector store error: {0}")]
    VectorStore(#[from] VectorStoreError),
}

/// Errors related to project and source management.
#[derive(Debug, Clone, Error)]
pub enum ProjectError {
    #[error("project not found: {0}")]
    NotFound(String),

    #[error("source not found: {0}")]
    SourceNotFound(String),

    #[error("project {0} cannot be deleted")]
    Protected(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("vector store error: {0}")]
    VectorStore(#[from] VectorStoreError),
}

/// Errors related to project export and import.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("bundle corrupt: {0}")]
    BundleCorrupt(String),

    #[error("project not found: {0}")]
    ProjectNotFound(String),

    #[error("bundle IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("vector store error: {0}")]
    VectorStore(#[from] VectorStoreError),
}

impl From<ProjectError> for ArchiveError {
    fn from(err: ProjectError) -> Self {
        match err {
            ProjectError::NotFound(id) => ArchiveError::ProjectNotFound(id),
            ProjectError::VectorStore(e) => ArchiveError::VectorStore(e),
            other => ArchiveError::BundleCorrupt(other.to_string()),
        }
    }
}

/// Errors related to configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParseError(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),

    #[error("path error: {0}")]
    PathError(String),

    #[error("validation error: {0}")]
    ValidationError(String),
}

/// Errors related to the local daemon and its socket protocol.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("daemon is not running")]
    NotRunning,

    #[error("failed to spawn daemon: {0}")]
    SpawnError(String),

    #[error("timed out waiting for daemon")]
    Timeout,

    #[error("failed to connect to daemon: {0}")]
    ConnectionFailed(String),

    #[error("socket error: {0}")]
    SocketError(String),

    #[error("protocol error: {0}")]
    ProtocolError(String),

    #[error("{message}")]
    Remote { kind: ErrorKind, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse error classification carried across the daemon socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    NotFound,
    IndexNotReady,
    EmbeddingUnavailable,
    BundleCorrupt,
    Internal,
}

/// Application-level errors that wrap domain errors.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("index error: {0}")]
    Index(#[from] IndexError),

    #[error("search error: {0}")]
    Search(#[from] SearchError),

    #[error("project error: {0}")]
    Project(#[from] ProjectError),

    #[error("archive error: {0}")]
    Archive(#[from] ArchiveError),

    #[error("embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("vector store error: {0}")]
    VectorStore(#[from] VectorStoreError),

    #[error("{0}")]
    Other(String),
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::Search(SearchError::InvalidQuery(_))
            | AppError::Project(ProjectError::Validation(_))
            | AppError::Project(ProjectError::Protected(_))
            | AppError::Config(_) => ErrorKind::Validation,
            AppError::Search(SearchError::ProjectNotFound(_))
            | AppError::Index(IndexError::ProjectNotFound(_))
            | AppError::Project(ProjectError::NotFound(_))
            | AppError::Project(ProjectError::SourceNotFound(_))
            | AppError::Archive(ArchiveError::ProjectNotFound(_)) => ErrorKind::NotFound,
            AppError::Search(SearchError::IndexNotReady(_))
            | AppError::Search(SearchError::StaleIndex { .. }) => ErrorKind::IndexNotReady,
            AppError::Search(SearchError::Embedding(EmbeddingError::Unavailable(_)))
            | AppError::Index(IndexError::Embedding(EmbeddingError::Unavailable(_)))
            | AppError::Embedding(EmbeddingError::Unavailable(_)) => {
                ErrorKind::EmbeddingUnavailable
            }
            AppError::Archive(ArchiveError::BundleCorrupt(_)) => ErrorKind::BundleCorrupt,
            _ => ErrorKind::Internal,
        }
    }
}
