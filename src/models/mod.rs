mod bundle;
mod chunk;
mod config;
mod project;
mod search;
mod source;

pub use bundle::{
    BUNDLE_ENTRY, BUNDLE_FORMAT_VERSION, BundleProject, BundledProject, ImportMode, ImportSummary,
    ProjectBundle, VectorDump, VectorItem, WORKSPACE_BUNDLE_ENTRY, WorkspaceBundle,
    WorkspaceImportSummary,
};
pub use chunk::{Chunk, ChunkMetadata};
pub use config::{
    Config, DEFAULT_COLLECTION_PREFIX, DEFAULT_EMBEDDING_DIMENSION, DEFAULT_EMBEDDING_MODEL,
    DEFAULT_PROJECT_ID, DEFAULT_QDRANT_URL, DaemonConfig, Device, EmbeddingConfig,
    EmbeddingProfile, ImportConfig, IndexingConfig, MetricsConfig, Pooling, ProjectsConfig,
    SearchConfig, VectorDriver, VectorStoreConfig,
};
pub use project::Project;
pub use search::{OutputFormat, SearchHit, SearchQuery, SearchResults};
pub use source::{Source, SourceOrigin, SourceStatus};
