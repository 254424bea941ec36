use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::ProjectError;
use crate::models::{Project, ProjectsConfig};

/// Known projects. The default project always exists.
pub struct ProjectRegistry {
    default_id: String,
    projects: RwLock<HashMap<String, Project>>,
}

impl ProjectRegistry {
    pub fn new(config: &ProjectsConfig) -> Self {
        let default = Project::new(
            config.default_project_id.clone(),
            config.default_project_name.clone(),
        );
        let mut projects = HashMap::new();
        projects.insert(default.id.clone(), default);
        Self {
            default_id: config.default_project_id.clone(),
            projects: RwLock::new(projects),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Project>> {
        self.projects.read().unwrap_or_else(|p| p.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Project>> {
        self.projects.write().unwrap_or_else(|p| p.into_inner())
    }

    pub fn default_id(&self) -> &str {
        &self.default_id
    }

    pub fn get(&self, project_id: &str) -> Option<Project> {
        self.read().get(project_id).cloned()
    }

    pub fn exists(&self, project_id: &str) -> bool {
        self.get(project_id).is_some()
    }

    pub fn require(&self, project_id: &str) -> Result<Project, ProjectError> {
        self.get(project_id)
            .ok_or_else(|| ProjectError::NotFound(project_id.to_string()))
    }

    /// Projects ordered by creation time.
    pub fn list(&self) -> Vec<Project> {
        let mut projects: Vec<Project> = self.read().values().cloned().collect();
        projects.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        projects
    }

    /// Create a project with a generated id. A blank name becomes `Project N`.
    pub fn create(&self, name: &str) -> Project {
        let mut projects = self.write();

        let name = match name.trim() {
            "" => format!("Project {}", projects.len() + 1),
            trimmed => trimmed.to_string(),
        };

        let mut id = Project::generate_id();
        while projects.contains_key(&id) {
            id = Project::generate_id();
        }

        let project = Project::new(id, name);
        projects.insert(project.id.clone(), project.clone());
        project
    }

    /// Register a project under a caller-chosen id (used by imports).
    pub fn insert(&self, project: Project) -> Result<Project, ProjectError> {
        if project.id.trim().is_empty() {
            return Err(ProjectError::Validation(
                "project id must not be empty".to_string(),
            ));
        }
        let mut projects = self.write();
        let stored = projects
            .entry(project.id.clone())
            .or_insert(project)
            .clone();
        Ok(stored)
    }

    /// Register or overwrite a project record (used by workspace restores).
    pub fn upsert(&self, project: Project) -> Result<Project, ProjectError> {
        if project.id.trim().is_empty() {
            return Err(ProjectError::Validation(
                "project id must not be empty".to_string(),
            ));
        }
        self.write().insert(project.id.clone(), project.clone());
        Ok(project)
    }

    /// Remove a project. The default project cannot be removed.
    pub fn remove(&self, project_id: &str) -> Result<Project, ProjectError> {
        if project_id == self.default_id {
            return Err(ProjectError::Protected(project_id.to_string()));
        }
        self.write()
            .remove(project_id)
            .ok_or_else(|| ProjectError::NotFound(project_id.to_string()))
    }

    pub fn set_needs_reindex(&self, project_id: &str, value: bool) {
        if let Some(project) = self.write().get_mut(project_id) {
            project.needs_reindex = value;
        }
    }
}
