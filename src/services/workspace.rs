//! Service root: owns the source cache, project registry, vector store and
//! reindex scheduler for one process, and exposes the operations the daemon
//! serves.

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::archiver::ProjectArchiver;
use super::chunker::TextChunker;
use super::embedding::{Embedder, EmbeddingProvider, OnnxEmbedder};
use super::indexer::{IndexReport, Indexer, ProjectGates};
use super::metrics::{BuildSummary, MetricsStore};
use super::projects::ProjectRegistry;
use super::retriever::Retriever;
use super::scheduler::ReindexScheduler;
use super::source_cache::SourceCache;
use super::vector_store::{CollectionInfo, VectorBackend, VectorStore, create_backend};
use crate::error::{AppError, ProjectError};
use crate::models::{
    Config, EmbeddingProfile, ImportMode, ImportSummary, Project, SearchQuery, SearchResults,
    Source, SourceOrigin, VectorDriver, WorkspaceImportSummary,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectStatus {
    pub project: Project,
    pub sources: usize,
    pub indexable_sources: usize,
    pub index: Option<CollectionInfo>,
    pub builds_started: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceStatus {
    pub model_id: String,
    pub profile: EmbeddingProfile,
    pub dimension: usize,
    pub driver: VectorDriver,
    pub backend_healthy: bool,
    pub uptime_secs: u64,
    pub projects: Vec<ProjectStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub builds: Option<BuildSummary>,
}

pub struct Workspace {
    config: Config,
    sources: Arc<SourceCache>,
    projects: Arc<ProjectRegistry>,
    embeddings: Arc<EmbeddingProvider>,
    store: Arc<VectorStore>,
    gates: Arc<ProjectGates>,
    scheduler: ReindexScheduler,
    retriever: Retriever,
    archiver: ProjectArchiver,
    metrics: Option<Arc<MetricsStore>>,
    started_at: Instant,
}

impl Workspace {
    /// Build the workspace from configuration: ONNX embedder, configured
    /// backend, metrics database. Orphaned collections from earlier runs are
    /// purged.
    pub async fn start(config: Config) -> Result<Self, AppError> {
        config.validate()?;

        let embedder: Arc<dyn Embedder> = Arc::new(OnnxEmbedder::new(&config.embedding)?);
        let backend = create_backend(&config.vector_store)?;
        let metrics = if config.metrics.enabled {
            open_metrics(config.metrics.retention_days)
        } else {
            None
        };

        let workspace = Self::assemble(config, embedder, backend, metrics)?;
        match workspace.store.purge_orphans().await {
            Ok(_) => {}
            Err(e) => warn!(error = %e, "could not purge orphaned collections"),
        }

        info!(
            model = %workspace.embeddings.model_id(),
            profile = %workspace.embeddings.profile(),
            driver = %workspace.store.backend().driver(),
            "workspace started"
        );
        Ok(workspace)
    }

    /// Build a workspace around caller-supplied collaborators.
    pub fn with_components(
        config: Config,
        embedder: Arc<dyn Embedder>,
        backend: Arc<dyn VectorBackend>,
    ) -> Result<Self, AppError> {
        Self::assemble(config, embedder, backend, None)
    }

    fn assemble(
        config: Config,
        embedder: Arc<dyn Embedder>,
        backend: Arc<dyn VectorBackend>,
        metrics: Option<Arc<MetricsStore>>,
    ) -> Result<Self, AppError> {
        config.validate()?;
        let chunker = TextChunker::from_config(&config.indexing)?;

        let sources = Arc::new(SourceCache::new());
        let projects = Arc::new(ProjectRegistry::new(&config.projects));
        sources.register(projects.default_id());
        let embeddings = Arc::new(EmbeddingProvider::new(embedder, &config.embedding));
        let store = Arc::new(VectorStore::new(
            backend,
            config.vector_store.collection_prefix.clone(),
        ));
        let gates = Arc::new(ProjectGates::default());

        let mut indexer = Indexer::new(
            sources.clone(),
            projects.clone(),
            embeddings.clone(),
            store.clone(),
            gates.clone(),
            chunker,
        );
        if let Some(m) = &metrics {
            indexer = indexer.with_metrics(m.clone());
        }

        let retriever = Retriever::new(
            projects.clone(),
            embeddings.clone(),
            store.clone(),
            config.search.default_top_k,
            config.search.default_min_score,
        );
        let archiver = ProjectArchiver::new(
            sources.clone(),
            projects.clone(),
            store.clone(),
            embeddings.clone(),
            gates.clone(),
            config.import.clone(),
        );

        Ok(Self {
            scheduler: ReindexScheduler::new(Arc::new(indexer)),
            config,
            sources,
            projects,
            embeddings,
            store,
            gates,
            retriever,
            archiver,
            metrics,
            started_at: Instant::now(),
        })
    }

    /// Drain reindex workers and drop in-memory state.
    pub async fn shutdown(&self) {
        self.scheduler.shutdown().await;
        self.sources.clear_all();
        info!("workspace stopped");
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn default_project_id(&self) -> &str {
        self.projects.default_id()
    }

    fn require_project(&self, project_id: &str) -> Result<Project, ProjectError> {
        if project_id.trim().is_empty() {
            return Err(ProjectError::Validation(
                "project id must not be empty".to_string(),
            ));
        }
        self.projects.require(project_id)
    }

    fn auto_reindex(&self, project_id: &str) {
        if !self.config.indexing.auto_reindex {
            return;
        }
        if let Err(e) = self.scheduler.trigger(project_id) {
            warn!(project = project_id, error = %e, "could not schedule reindex");
        }
    }

    // Indexing and search

    pub async fn reindex(&self, project_id: &str) -> Result<IndexReport, AppError> {
        self.require_project(project_id)?;
        Ok(self.scheduler.reindex(project_id).await?)
    }

    pub fn trigger_reindex(&self, project_id: &str) -> Result<(), AppError> {
        self.require_project(project_id)?;
        Ok(self.scheduler.trigger(project_id)?)
    }

    pub async fn search(&self, query: &SearchQuery) -> Result<SearchResults, AppError> {
        Ok(self.retriever.search(query).await?)
    }

    pub fn builds_started(&self, project_id: &str) -> u64 {
        self.scheduler.builds_started(project_id)
    }

    // Sources

    pub fn add_source(
        &self,
        project_id: &str,
        origin: SourceOrigin,
        title: &str,
        text: String,
    ) -> Result<Source, AppError> {
        self.require_project(project_id)?;
        let title = match title.trim() {
            "" => origin.location().to_string(),
            t => t.to_string(),
        };
        let source = self
            .sources
            .add_source(Source::new(project_id, origin, title, text))?;
        info!(project = project_id, source = %source.id, chars = source.text.chars().count(), "source added");
        self.auto_reindex(project_id);
        Ok(source)
    }

    pub fn add_pending_source(
        &self,
        project_id: &str,
        origin: SourceOrigin,
        title: &str,
    ) -> Result<Source, AppError> {
        self.require_project(project_id)?;
        Ok(self.sources.add_pending(project_id, origin, title)?)
    }

    pub fn complete_source(
        &self,
        project_id: &str,
        source_id: &str,
        text: String,
    ) -> Result<Source, AppError> {
        self.require_project(project_id)?;
        let source = self.sources.complete_source(project_id, source_id, text)?;
        self.auto_reindex(project_id);
        Ok(source)
    }

    pub fn fail_source(
        &self,
        project_id: &str,
        source_id: &str,
        error: String,
    ) -> Result<Source, AppError> {
        self.require_project(project_id)?;
        Ok(self.sources.fail_source(project_id, source_id, error)?)
    }

    pub fn list_sources(&self, project_id: &str) -> Result<Vec<Source>, AppError> {
        self.require_project(project_id)?;
        Ok(self.sources.list_sources(project_id))
    }

    pub fn remove_source(&self, project_id: &str, source_id: &str) -> Result<(), AppError> {
        self.require_project(project_id)?;
        if !self.sources.remove_source(project_id, source_id) {
            return Err(ProjectError::SourceNotFound(source_id.to_string()).into());
        }
        info!(project = project_id, source = source_id, "source removed");
        self.auto_reindex(project_id);
        Ok(())
    }

    /// Drop every source and the collection. Searches then report the
    /// project as not indexed.
    pub async fn clear_project(&self, project_id: &str) -> Result<usize, AppError> {
        self.require_project(project_id)?;
        let _gate = self.gates.acquire(project_id).await;
        self.store.clear(project_id).await?;
        let removed = self.sources.clear(project_id)?;
        self.projects.set_needs_reindex(project_id, false);
        info!(project = project_id, sources = removed, "project cleared");
        Ok(removed)
    }

    // Projects

    pub fn create_project(&self, name: &str) -> Result<Project, AppError> {
        let project = self.projects.create(name);
        self.sources.register(&project.id);
        info!(project = %project.id, name = %project.name, "project created");
        Ok(project)
    }

    pub fn list_projects(&self) -> Vec<Project> {
        self.projects.list()
    }

    /// Delete a project with its collection, sources and reindex worker.
    pub async fn delete_project(&self, project_id: &str) -> Result<(), AppError> {
        self.require_project(project_id)?;
        if project_id == self.projects.default_id() {
            return Err(ProjectError::Protected(project_id.to_string()).into());
        }

        {
            let _gate = self.gates.acquire(project_id).await;
            self.store.remove_project(project_id).await?;
            self.sources.remove_project(project_id);
            self.projects.remove(project_id)?;
            self.scheduler.remove(project_id);
        }
        self.gates.remove(project_id);

        info!(project = project_id, "project deleted");
        Ok(())
    }

    // Bundles

    pub async fn export_project(
        &self,
        project_id: &str,
        include_vectors: bool,
    ) -> Result<Vec<u8>, AppError> {
        self.require_project(project_id)?;
        Ok(self.archiver.export(project_id, include_vectors).await?)
    }

    pub async fn import_project(
        &self,
        bundle: &[u8],
        mode: ImportMode,
        target: Option<&str>,
    ) -> Result<ImportSummary, AppError> {
        let summary = self.archiver.import(bundle, mode, target).await?;
        if summary.needs_reindex {
            self.auto_reindex(&summary.project_id);
        }
        Ok(summary)
    }

    /// Export every project into one workspace bundle.
    pub async fn export_all(&self, include_vectors: bool) -> Result<Vec<u8>, AppError> {
        Ok(self.archiver.export_all(include_vectors).await?)
    }

    /// Import a workspace bundle. With `replace` the bundle becomes the whole
    /// project set.
    pub async fn import_workspace(
        &self,
        bundle: &[u8],
        mode: ImportMode,
    ) -> Result<WorkspaceImportSummary, AppError> {
        let summary = self.archiver.import_workspace(bundle, mode).await?;
        for project_id in &summary.removed {
            self.scheduler.remove(project_id);
            self.gates.remove(project_id);
        }
        for project in summary.projects.iter().filter(|p| p.needs_reindex) {
            self.auto_reindex(&project.project_id);
        }
        Ok(summary)
    }

    // Status

    pub async fn project_status(&self, project_id: &str) -> Result<ProjectStatus, AppError> {
        let project = self.require_project(project_id)?;
        let sources = self.sources.list_sources(project_id);
        Ok(ProjectStatus {
            indexable_sources: sources.iter().filter(|s| s.is_indexable()).count(),
            sources: sources.len(),
            index: self.store.info(project_id).await,
            builds_started: self.scheduler.builds_started(project_id),
            project,
        })
    }

    pub async fn status(&self) -> WorkspaceStatus {
        let mut projects = Vec::new();
        for project in self.projects.list() {
            if let Ok(status) = self.project_status(&project.id).await {
                projects.push(status);
            }
        }

        WorkspaceStatus {
            model_id: self.embeddings.model_id().to_string(),
            profile: self.embeddings.profile(),
            dimension: self.embeddings.dimension(),
            driver: self.store.backend().driver(),
            backend_healthy: self.store.health_check().await.unwrap_or(false),
            uptime_secs: self.started_at.elapsed().as_secs(),
            projects,
            builds: self
                .metrics
                .as_ref()
                .map(|m| m.summary(self.config.metrics.retention_days, None)),
        }
    }
}

fn open_metrics(retention_days: u32) -> Option<Arc<MetricsStore>> {
    let path = Config::metrics_db_path()?;
    if let Some(parent) = path.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            warn!(error = %e, "metrics directory unavailable");
            return None;
        }
    }
    match MetricsStore::open(&path) {
        Ok(store) => {
            store.cleanup(retention_days);
            Some(Arc::new(store))
        }
        Err(e) => {
            warn!(error = %e, path = %path.display(), "metrics disabled");
            None
        }
    }
}
