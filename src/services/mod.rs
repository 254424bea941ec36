mod archiver;
mod chunker;
pub mod embedding;
mod indexer;
mod metrics;
mod projects;
mod retriever;
mod scheduler;
mod source_cache;
pub mod vector_store;
mod workspace;

pub use archiver::ProjectArchiver;
pub use chunker::{ChunkedText, TextChunker};
pub use embedding::{Embedder, EmbeddingProvider, EmbeddingRole, OnnxEmbedder};
pub use indexer::{IndexReport, Indexer, ProjectGates};
pub use metrics::{BuildSummary, MetricsStore};
pub use projects::ProjectRegistry;
pub use retriever::Retriever;
pub use scheduler::ReindexScheduler;
pub use source_cache::SourceCache;
pub use vector_store::{
    CollectionInfo, MemoryBackend, QdrantBackend, VectorBackend, VectorMatch, VectorStore,
    create_backend,
};
pub use workspace::{ProjectStatus, Workspace, WorkspaceStatus};
