//! Portable project bundle layout.

use serde::{Deserialize, Serialize};

use super::chunk::ChunkMetadata;
use super::project::Project;
use super::source::Source;

pub const BUNDLE_FORMAT_VERSION: u32 = 1;
pub const BUNDLE_ENTRY: &str = "project.json";
pub const WORKSPACE_BUNDLE_ENTRY: &str = "projects.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleProject {
    pub id: String,
    pub name: String,
    pub created_at: i64,
}

impl From<&Project> for BundleProject {
    fn from(project: &Project) -> Self {
        Self {
            id: project.id.clone(),
            name: project.name.clone(),
            created_at: project.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectBundle {
    pub format_version: u32,
    /// RFC 3339
    pub exported_at: String,
    pub project: BundleProject,
    pub sources: Vec<Source>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vectors: Option<VectorDump>,
}

/// Every project of a workspace in one archive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceBundle {
    pub format_version: u32,
    /// RFC 3339
    pub exported_at: String,
    pub projects: Vec<BundledProject>,
}

/// One project inside a [`WorkspaceBundle`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundledProject {
    pub project: BundleProject,
    pub sources: Vec<Source>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vectors: Option<VectorDump>,
}

impl BundledProject {
    pub fn into_bundle(self, format_version: u32, exported_at: &str) -> ProjectBundle {
        ProjectBundle {
            format_version,
            exported_at: exported_at.to_string(),
            project: self.project,
            sources: self.sources,
            vectors: self.vectors,
        }
    }
}

impl From<ProjectBundle> for BundledProject {
    fn from(bundle: ProjectBundle) -> Self {
        Self {
            project: bundle.project,
            sources: bundle.sources,
            vectors: bundle.vectors,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorDump {
    pub dimension: usize,
    pub model_id: String,
    /// Unix milliseconds of the build the dump was taken from
    pub indexed_at: i64,
    pub items: Vec<VectorItem>,
}

/// One stored chunk: the unit written to and read back from a collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorItem {
    pub chunk_id: String,
    pub vector: Vec<f32>,
    pub text: String,
    pub metadata: ChunkMetadata,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportMode {
    #[default]
    Merge,
    Replace,
}

impl std::str::FromStr for ImportMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "merge" => Ok(ImportMode::Merge),
            "replace" => Ok(ImportMode::Replace),
            _ => Err(format!("unknown import mode: {}", s)),
        }
    }
}

impl std::fmt::Display for ImportMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImportMode::Merge => write!(f, "merge"),
            ImportMode::Replace => write!(f, "replace"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportSummary {
    pub project_id: String,
    pub sources_imported: usize,
    pub vectors_imported: bool,
    pub needs_reindex: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceImportSummary {
    pub mode: ImportMode,
    pub projects: Vec<ImportSummary>,
    /// Projects dropped by a replace import because the bundle did not hold them
    #[serde(default)]
    pub removed: Vec<String>,
}

impl WorkspaceImportSummary {
    pub fn sources_imported(&self) -> usize {
        self.projects.iter().map(|p| p.sources_imported).sum()
    }
}
