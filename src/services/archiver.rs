//! Project export and import as zip bundles.
//!
//! A project bundle holds one project in `project.json`; a workspace bundle
//! holds every project in `projects.json`. Imports are validated in full
//! before anything is written, and the vector collection is written before
//! the source cache so a backend failure leaves the destination untouched.

use std::collections::{HashMap, HashSet};
use std::io::{Cursor, Read, Write};
use std::sync::Arc;

use tracing::{info, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use super::embedding::EmbeddingProvider;
use super::indexer::ProjectGates;
use super::projects::ProjectRegistry;
use super::source_cache::SourceCache;
use super::vector_store::VectorStore;
use crate::error::ArchiveError;
use crate::models::{
    BUNDLE_ENTRY, BUNDLE_FORMAT_VERSION, BundleProject, BundledProject, Chunk, ImportConfig,
    ImportMode, ImportSummary, Project, ProjectBundle, Source, SourceStatus, VectorDump,
    VectorItem, WORKSPACE_BUNDLE_ENTRY, WorkspaceBundle, WorkspaceImportSummary,
};

const MB: u64 = 1024 * 1024;

fn corrupt(msg: impl Into<String>) -> ArchiveError {
    ArchiveError::BundleCorrupt(msg.into())
}

pub struct ProjectArchiver {
    sources: Arc<SourceCache>,
    projects: Arc<ProjectRegistry>,
    store: Arc<VectorStore>,
    embeddings: Arc<EmbeddingProvider>,
    gates: Arc<ProjectGates>,
    limits: ImportConfig,
}

impl ProjectArchiver {
    pub fn new(
        sources: Arc<SourceCache>,
        projects: Arc<ProjectRegistry>,
        store: Arc<VectorStore>,
        embeddings: Arc<EmbeddingProvider>,
        gates: Arc<ProjectGates>,
        limits: ImportConfig,
    ) -> Self {
        Self {
            sources,
            projects,
            store,
            embeddings,
            gates,
            limits,
        }
    }

    /// Serialize a project's sources and, optionally, its vector collection.
    pub async fn export(
        &self,
        project_id: &str,
        include_vectors: bool,
    ) -> Result<Vec<u8>, ArchiveError> {
        let project = self
            .projects
            .get(project_id)
            .ok_or_else(|| ArchiveError::ProjectNotFound(project_id.to_string()))?;
        let exported_at = chrono::Utc::now().to_rfc3339();
        let bundle = self
            .snapshot(&project, include_vectors)
            .await?
            .into_bundle(BUNDLE_FORMAT_VERSION, &exported_at);

        let json = serde_json::to_vec(&bundle).map_err(std::io::Error::other)?;
        let bytes = write_archive(BUNDLE_ENTRY, &json)?;

        info!(
            project = project_id,
            sources = bundle.sources.len(),
            vectors = bundle.vectors.as_ref().map_or(0, |v| v.items.len()),
            bytes = bytes.len(),
            "project exported"
        );
        Ok(bytes)
    }

    /// Serialize every registered project into one workspace bundle. Each
    /// project is captured under its own gate.
    pub async fn export_all(&self, include_vectors: bool) -> Result<Vec<u8>, ArchiveError> {
        let mut projects = Vec::new();
        for project in self.projects.list() {
            projects.push(self.snapshot(&project, include_vectors).await?);
        }

        let bundle = WorkspaceBundle {
            format_version: BUNDLE_FORMAT_VERSION,
            exported_at: chrono::Utc::now().to_rfc3339(),
            projects,
        };
        let json = serde_json::to_vec(&bundle).map_err(std::io::Error::other)?;
        let bytes = write_archive(WORKSPACE_BUNDLE_ENTRY, &json)?;

        info!(
            projects = bundle.projects.len(),
            sources = bundle.projects.iter().map(|p| p.sources.len()).sum::<usize>(),
            bytes = bytes.len(),
            "workspace exported"
        );
        Ok(bytes)
    }

    async fn snapshot(
        &self,
        project: &Project,
        include_vectors: bool,
    ) -> Result<BundledProject, ArchiveError> {
        let _gate = self.gates.acquire(&project.id).await;

        let vectors = if include_vectors {
            self.store
                .dump(&project.id)
                .await?
                .map(|(info, items)| VectorDump {
                    dimension: info.dimension,
                    model_id: self.embeddings.model_id().to_string(),
                    indexed_at: info.indexed_at,
                    items,
                })
        } else {
            None
        };

        Ok(BundledProject {
            project: BundleProject::from(project),
            sources: self.sources.list_sources(&project.id),
            vectors,
        })
    }

    /// Check the archive against the configured limits and return the bytes
    /// of entry `name`.
    fn read_entry(&self, bytes: &[u8], name: &str) -> Result<Vec<u8>, ArchiveError> {
        let max_bundle = self.limits.max_bundle_mb * MB;
        let max_unpacked = self.limits.max_unpacked_mb * MB;

        if bytes.len() as u64 > max_bundle {
            return Err(corrupt(format!(
                "bundle is {} bytes, limit is {}",
                bytes.len(),
                max_bundle
            )));
        }

        let mut archive =
            ZipArchive::new(Cursor::new(bytes)).map_err(|e| corrupt(format!("not a zip archive: {e}")))?;
        if archive.len() > self.limits.max_entries {
            return Err(corrupt(format!(
                "bundle has {} entries, limit is {}",
                archive.len(),
                self.limits.max_entries
            )));
        }

        let mut declared = 0u64;
        for i in 0..archive.len() {
            let entry = archive.by_index(i).map_err(|e| corrupt(e.to_string()))?;
            declared = declared.saturating_add(entry.size());
        }
        if declared > max_unpacked {
            return Err(corrupt(format!(
                "bundle unpacks to {declared} bytes, limit is {max_unpacked}"
            )));
        }

        let entry = archive
            .by_name(name)
            .map_err(|_| corrupt(format!("missing {name}")))?;
        let mut json = Vec::new();
        entry
            .take(max_unpacked + 1)
            .read_to_end(&mut json)
            .map_err(|e| corrupt(e.to_string()))?;
        if json.len() as u64 > max_unpacked {
            return Err(corrupt(format!("{name} exceeds size limit")));
        }
        Ok(json)
    }

    /// Unpack and validate a bundle without touching any state.
    pub fn decode(&self, bytes: &[u8]) -> Result<ProjectBundle, ArchiveError> {
        let json = self.read_entry(bytes, BUNDLE_ENTRY)?;
        let bundle: ProjectBundle =
            serde_json::from_slice(&json).map_err(|e| corrupt(format!("invalid {BUNDLE_ENTRY}: {e}")))?;
        validate_version(bundle.format_version)?;
        validate_contents(&bundle.project, &bundle.sources, bundle.vectors.as_ref())?;
        Ok(bundle)
    }

    /// Unpack and validate a workspace bundle without touching any state.
    pub fn decode_workspace(&self, bytes: &[u8]) -> Result<WorkspaceBundle, ArchiveError> {
        let json = self.read_entry(bytes, WORKSPACE_BUNDLE_ENTRY)?;
        let bundle: WorkspaceBundle = serde_json::from_slice(&json)
            .map_err(|e| corrupt(format!("invalid {WORKSPACE_BUNDLE_ENTRY}: {e}")))?;
        validate_version(bundle.format_version)?;
        if bundle.projects.is_empty() {
            return Err(corrupt("bundle holds no projects"));
        }

        let mut project_ids = HashSet::new();
        for entry in &bundle.projects {
            validate_contents(&entry.project, &entry.sources, entry.vectors.as_ref())?;
            if !project_ids.insert(entry.project.id.as_str()) {
                return Err(corrupt(format!("duplicate project id {}", entry.project.id)));
            }
        }
        Ok(bundle)
    }

    /// Load a bundle into `target` (default: the bundle's own project id).
    ///
    /// An explicit target must already exist. A missing default target is
    /// registered only once everything else has been written.
    pub async fn import(
        &self,
        bytes: &[u8],
        mode: ImportMode,
        target: Option<&str>,
    ) -> Result<ImportSummary, ArchiveError> {
        let bundle = self.decode(bytes)?;

        let target_id = match target {
            Some(t) if !self.projects.exists(t) => {
                return Err(ArchiveError::ProjectNotFound(t.to_string()));
            }
            Some(t) => t.to_string(),
            None => bundle.project.id.clone(),
        };

        let _gate = self.gates.acquire(&target_id).await;
        let creating = !self.projects.exists(&target_id);
        if creating && target.is_some() {
            return Err(ArchiveError::ProjectNotFound(target_id));
        }

        let project_name = bundle.project.name.clone();
        if creating {
            self.sources.register(&target_id);
        }
        let contents = BundledProject::from(bundle);
        let result = match mode {
            ImportMode::Replace => self.import_replace(contents, &target_id).await,
            ImportMode::Merge => self.import_merge(contents, &target_id).await,
        };
        let summary = match result {
            Ok(summary) => summary,
            Err(e) => {
                if creating {
                    self.sources.remove_project(&target_id);
                }
                return Err(e);
            }
        };

        if creating {
            self.projects
                .insert(Project::new(target_id.clone(), project_name))?;
        }
        if summary.needs_reindex {
            self.projects.set_needs_reindex(&target_id, true);
        }

        info!(
            project = %target_id,
            mode = %mode,
            sources = summary.sources_imported,
            vectors = summary.vectors_imported,
            needs_reindex = summary.needs_reindex,
            "project imported"
        );
        Ok(summary)
    }

    /// Load a workspace bundle.
    ///
    /// `merge` imports every bundled project into the project with the same
    /// id, creating missing ones. `replace` makes the bundle the whole
    /// project set: projects absent from the bundle are deleted (the default
    /// project is emptied instead) and bundled projects are loaded verbatim,
    /// names included.
    pub async fn import_workspace(
        &self,
        bytes: &[u8],
        mode: ImportMode,
    ) -> Result<WorkspaceImportSummary, ArchiveError> {
        let bundle = self.decode_workspace(bytes)?;
        let incoming: HashSet<String> = bundle
            .projects
            .iter()
            .map(|p| p.project.id.clone())
            .collect();

        let mut removed = Vec::new();
        if mode == ImportMode::Replace {
            for project in self.projects.list() {
                if incoming.contains(&project.id) {
                    continue;
                }
                let _gate = self.gates.acquire(&project.id).await;
                self.store.remove_project(&project.id).await?;
                if project.id == self.projects.default_id() {
                    self.sources.clear(&project.id)?;
                    self.projects.set_needs_reindex(&project.id, false);
                    continue;
                }
                self.sources.remove_project(&project.id);
                self.projects.remove(&project.id)?;
                removed.push(project.id);
            }
        }

        let mut projects = Vec::with_capacity(bundle.projects.len());
        for contents in bundle.projects {
            let record = Project {
                id: contents.project.id.clone(),
                name: contents.project.name.clone(),
                created_at: contents.project.created_at,
                needs_reindex: false,
            };
            let target_id = record.id.clone();

            let _gate = self.gates.acquire(&target_id).await;
            let creating = !self.projects.exists(&target_id);
            if creating {
                self.sources.register(&target_id);
            }
            let result = match mode {
                ImportMode::Replace => self.import_replace(contents, &target_id).await,
                ImportMode::Merge => self.import_merge(contents, &target_id).await,
            };
            let summary = match result {
                Ok(summary) => summary,
                Err(e) => {
                    if creating {
                        self.sources.remove_project(&target_id);
                    }
                    return Err(e);
                }
            };

            match mode {
                ImportMode::Replace => {
                    self.projects.upsert(record)?;
                }
                ImportMode::Merge if creating => {
                    self.projects.insert(record)?;
                }
                ImportMode::Merge => {}
            }
            if summary.needs_reindex {
                self.projects.set_needs_reindex(&target_id, true);
            }
            projects.push(summary);
        }

        let summary = WorkspaceImportSummary {
            mode,
            projects,
            removed,
        };
        info!(
            mode = %mode,
            projects = summary.projects.len(),
            sources = summary.sources_imported(),
            removed = summary.removed.len(),
            "workspace imported"
        );
        Ok(summary)
    }

    async fn import_replace(
        &self,
        bundle: BundledProject,
        target_id: &str,
    ) -> Result<ImportSummary, ArchiveError> {
        let sources: Vec<Source> = bundle
            .sources
            .into_iter()
            .map(|s| Source {
                project_id: target_id.to_string(),
                ..s
            })
            .collect();

        let (vectors_imported, mut needs_reindex) = match bundle.vectors {
            Some(dump) => {
                let stale = dump.dimension != self.embeddings.dimension();
                self.store
                    .upsert_collection(target_id, dump.dimension, dump.items)
                    .await?;
                (true, stale)
            }
            None => {
                self.store.clear(target_id).await?;
                (false, false)
            }
        };
        if !vectors_imported && sources.iter().any(Source::is_indexable) {
            needs_reindex = true;
        }

        let sources_imported = sources.len();
        self.sources.set_sources(target_id, sources)?;

        Ok(ImportSummary {
            project_id: target_id.to_string(),
            sources_imported,
            vectors_imported,
            needs_reindex,
        })
    }

    async fn import_merge(
        &self,
        bundle: BundledProject,
        target_id: &str,
    ) -> Result<ImportSummary, ArchiveError> {
        let existing_indexed = self.sources.snapshot(target_id).len() as u32;

        let mut id_map: HashMap<String, String> = HashMap::new();
        let mut index_map: HashMap<String, u32> = HashMap::new();
        let mut next_index = existing_indexed;
        let sources: Vec<Source> = bundle
            .sources
            .into_iter()
            .map(|s| {
                let new_id = Source::generate_id();
                id_map.insert(s.id.clone(), new_id.clone());
                if s.status == SourceStatus::Success {
                    index_map.insert(new_id.clone(), next_index);
                    next_index += 1;
                }
                Source {
                    id: new_id,
                    project_id: target_id.to_string(),
                    ..s
                }
            })
            .collect();

        let mut vectors_imported = false;
        let mut needs_reindex = false;

        if let Some(dump) = bundle.vectors {
            let remapped: Vec<VectorItem> = dump
                .items
                .into_iter()
                .filter_map(|mut item| {
                    let new_source = id_map.get(&item.metadata.source_id)?.clone();
                    item.chunk_id = Chunk::generate_id(&new_source, item.metadata.ordinal);
                    item.metadata.source_index =
                        index_map.get(&new_source).copied().unwrap_or(next_index);
                    item.metadata.source_id = new_source;
                    Some(item)
                })
                .collect();

            match self.store.info(target_id).await {
                Some(info) if info.dimension == dump.dimension => {
                    let mut merged = self
                        .store
                        .dump(target_id)
                        .await?
                        .map(|(_, items)| items)
                        .unwrap_or_default();
                    merged.extend(remapped);
                    self.store
                        .upsert_collection(target_id, dump.dimension, merged)
                        .await?;
                    vectors_imported = true;
                }
                None if !self.sources.has_indexable(target_id) => {
                    self.store
                        .upsert_collection(target_id, dump.dimension, remapped)
                        .await?;
                    vectors_imported = true;
                }
                other => {
                    warn!(
                        project = target_id,
                        bundle_dimension = dump.dimension,
                        existing_dimension = other.map(|i| i.dimension),
                        "dropping bundle vectors that cannot be merged"
                    );
                    needs_reindex = true;
                }
            }
            if vectors_imported && dump.dimension != self.embeddings.dimension() {
                needs_reindex = true;
            }
        } else if sources.iter().any(Source::is_indexable) {
            needs_reindex = true;
        }

        let sources_imported = sources.len();
        self.sources.extend_sources(target_id, sources)?;

        Ok(ImportSummary {
            project_id: target_id.to_string(),
            sources_imported,
            vectors_imported,
            needs_reindex,
        })
    }
}

fn write_archive(name: &str, json: &[u8]) -> Result<Vec<u8>, ArchiveError> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    writer
        .start_file(
            name,
            SimpleFileOptions::default().compression_method(CompressionMethod::Deflated),
        )
        .map_err(std::io::Error::other)?;
    writer.write_all(json)?;
    Ok(writer.finish().map_err(std::io::Error::other)?.into_inner())
}

fn validate_version(format_version: u32) -> Result<(), ArchiveError> {
    if format_version != BUNDLE_FORMAT_VERSION {
        return Err(corrupt(format!("unsupported format version {format_version}")));
    }
    Ok(())
}

fn validate_contents(
    project: &BundleProject,
    sources: &[Source],
    vectors: Option<&VectorDump>,
) -> Result<(), ArchiveError> {
    if project.id.trim().is_empty() {
        return Err(corrupt("project id is empty"));
    }

    let mut source_ids = HashSet::new();
    for source in sources {
        if source.id.trim().is_empty() {
            return Err(corrupt("source with empty id"));
        }
        if !source_ids.insert(source.id.as_str()) {
            return Err(corrupt(format!("duplicate source id {}", source.id)));
        }
    }

    if let Some(dump) = vectors {
        if dump.dimension == 0 {
            return Err(corrupt("vector dimension is 0"));
        }
        let mut chunk_ids = HashSet::new();
        for item in &dump.items {
            if item.vector.len() != dump.dimension {
                return Err(corrupt(format!(
                    "vector {} has length {}, expected {}",
                    item.chunk_id,
                    item.vector.len(),
                    dump.dimension
                )));
            }
            if item.chunk_id.is_empty() || !chunk_ids.insert(item.chunk_id.as_str()) {
                return Err(corrupt(format!("duplicate or empty chunk id {:?}", item.chunk_id)));
            }
            if !source_ids.contains(item.metadata.source_id.as_str()) {
                return Err(corrupt(format!(
                    "vector {} references unknown source {}",
                    item.chunk_id, item.metadata.source_id
                )));
            }
        }
    }
    Ok(())
}
