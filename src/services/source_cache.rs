//! In-memory record of which sources each project holds.
//!
//! Each project's list sits behind its own lock; the outer map lock is only
//! held long enough to find that entry. Entries exist only for registered
//! projects: writes never create one, so a write racing a project deletion
//! fails instead of resurrecting the deleted list.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use crate::error::ProjectError;
use crate::models::{Source, SourceOrigin, SourceStatus};

type Entry = Arc<RwLock<Vec<Source>>>;

#[derive(Default)]
pub struct SourceCache {
    projects: Mutex<HashMap<String, Entry>>,
}

fn guard<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl SourceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open an empty source list for a newly registered project. An existing
    /// list is kept.
    pub fn register(&self, project_id: &str) {
        guard(&self.projects)
            .entry(project_id.to_string())
            .or_default();
    }

    pub fn contains(&self, project_id: &str) -> bool {
        guard(&self.projects).contains_key(project_id)
    }

    fn existing(&self, project_id: &str) -> Option<Entry> {
        guard(&self.projects).get(project_id).cloned()
    }

    fn write<R>(
        &self,
        project_id: &str,
        f: impl FnOnce(&mut Vec<Source>) -> R,
    ) -> Result<R, ProjectError> {
        let entry = self
            .existing(project_id)
            .ok_or_else(|| ProjectError::NotFound(project_id.to_string()))?;
        let mut sources = entry.write().unwrap_or_else(|p| p.into_inner());
        Ok(f(&mut sources))
    }

    fn read<R>(&self, project_id: &str, f: impl FnOnce(&[Source]) -> R) -> Option<R> {
        let entry = self.existing(project_id)?;
        let sources = entry.read().unwrap_or_else(|p| p.into_inner());
        Some(f(&sources))
    }

    /// Insert `source`, replacing any source with the same id in place.
    /// New ids are appended.
    pub fn add_source(&self, source: Source) -> Result<Source, ProjectError> {
        let project_id = source.project_id.clone();
        self.write(&project_id, |sources| {
            match sources.iter_mut().find(|s| s.id == source.id) {
                Some(existing) => *existing = source.clone(),
                None => sources.push(source.clone()),
            }
            source
        })
    }

    /// Register a source whose text is still being extracted.
    pub fn add_pending(
        &self,
        project_id: &str,
        origin: SourceOrigin,
        title: &str,
    ) -> Result<Source, ProjectError> {
        self.add_source(Source::pending(project_id, origin, title))
    }

    /// Mark a pending source as extracted.
    pub fn complete_source(
        &self,
        project_id: &str,
        source_id: &str,
        text: String,
    ) -> Result<Source, ProjectError> {
        self.update(project_id, source_id, |s| {
            s.status = SourceStatus::Success;
            s.text = text;
            s.error = None;
        })
    }

    /// Mark a source as failed; it stays listed but is never indexed.
    pub fn fail_source(
        &self,
        project_id: &str,
        source_id: &str,
        error: String,
    ) -> Result<Source, ProjectError> {
        self.update(project_id, source_id, |s| {
            s.status = SourceStatus::Error;
            s.error = Some(error);
        })
    }

    fn update(
        &self,
        project_id: &str,
        source_id: &str,
        f: impl FnOnce(&mut Source),
    ) -> Result<Source, ProjectError> {
        self.write(project_id, |sources| {
            let source = sources
                .iter_mut()
                .find(|s| s.id == source_id)
                .ok_or_else(|| ProjectError::SourceNotFound(source_id.to_string()))?;
            f(source);
            Ok(source.clone())
        })?
    }

    /// Remove a source. Returns whether it was present.
    pub fn remove_source(&self, project_id: &str, source_id: &str) -> bool {
        let Some(entry) = self.existing(project_id) else {
            return false;
        };
        let mut sources = entry.write().unwrap_or_else(|p| p.into_inner());
        let before = sources.len();
        sources.retain(|s| s.id != source_id);
        sources.len() != before
    }

    /// Sources in insertion order.
    pub fn list_sources(&self, project_id: &str) -> Vec<Source> {
        self.read(project_id, |sources| sources.to_vec())
            .unwrap_or_default()
    }

    /// Sources eligible for indexing, in insertion order.
    pub fn snapshot(&self, project_id: &str) -> Vec<Source> {
        self.read(project_id, |sources| {
            sources
                .iter()
                .filter(|s| s.status == SourceStatus::Success)
                .cloned()
                .collect()
        })
        .unwrap_or_default()
    }

    pub fn has_indexable(&self, project_id: &str) -> bool {
        self.read(project_id, |sources| sources.iter().any(|s| s.is_indexable()))
            .unwrap_or(false)
    }

    /// Replace a project's whole source list.
    pub fn set_sources(&self, project_id: &str, sources: Vec<Source>) -> Result<(), ProjectError> {
        self.write(project_id, |current| *current = sources)
    }

    /// Append sources after the existing ones.
    pub fn extend_sources(
        &self,
        project_id: &str,
        sources: Vec<Source>,
    ) -> Result<(), ProjectError> {
        self.write(project_id, |current| current.extend(sources))
    }

    /// Empty a project's source list. Returns how many sources were removed.
    pub fn clear(&self, project_id: &str) -> Result<usize, ProjectError> {
        self.write(project_id, |sources| std::mem::take(sources).len())
    }

    /// Forget a project entirely.
    pub fn remove_project(&self, project_id: &str) {
        guard(&self.projects).remove(project_id);
    }

    pub fn clear_all(&self) {
        guard(&self.projects).clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn file(name: &str) -> SourceOrigin {
        SourceOrigin::File(name.to_string())
    }

    fn cache_with(projects: &[&str]) -> SourceCache {
        let cache = SourceCache::new();
        for p in projects {
            cache.register(p);
        }
        cache
    }

    #[test]
    fn test_add_upserts_by_id_and_keeps_order() {
        let cache = cache_with(&["p"]);
        let a = cache
            .add_source(Source::new("p", file("a"), "A", "alpha").with_id("s1"))
            .unwrap();
        cache
            .add_source(Source::new("p", file("b"), "B", "beta").with_id("s2"))
            .unwrap();
        cache
            .add_source(Source {
                text: "alpha v2".to_string(),
                ..a
            })
            .unwrap();

        let sources = cache.list_sources("p");
        assert_eq!(sources.len(), 2);
        assert_eq!(sources[0].id, "s1");
        assert_eq!(sources[0].text, "alpha v2");
        assert_eq!(sources[1].id, "s2");
    }

    #[test]
    fn test_pending_lifecycle_and_snapshot() {
        let cache = cache_with(&["p"]);
        let pending = cache.add_pending("p", file("a.pdf"), "A").unwrap();
        let failing = cache.add_pending("p", file("b.pdf"), "B").unwrap();
        assert!(cache.snapshot("p").is_empty());

        cache
            .complete_source("p", &pending.id, "extracted".to_string())
            .unwrap();
        let failed = cache
            .fail_source("p", &failing.id, "unsupported".to_string())
            .unwrap();
        assert_eq!(failed.status, SourceStatus::Error);
        assert_eq!(failed.error.as_deref(), Some("unsupported"));

        let snapshot = cache.snapshot("p");
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].text, "extracted");
        assert_eq!(cache.list_sources("p").len(), 2);

        assert!(matches!(
            cache.complete_source("p", "missing", String::new()),
            Err(ProjectError::SourceNotFound(_))
        ));
    }

    #[test]
    fn test_remove_and_clear() {
        let cache = cache_with(&["p"]);
        cache
            .add_source(Source::new("p", file("a"), "A", "alpha").with_id("s1"))
            .unwrap();
        assert!(cache.remove_source("p", "s1"));
        assert!(!cache.remove_source("p", "s1"));
        assert!(!cache.remove_source("other", "s1"));

        cache
            .add_source(Source::new("p", file("a"), "A", "alpha"))
            .unwrap();
        assert_eq!(cache.clear("p").unwrap(), 1);
        assert!(cache.list_sources("p").is_empty());
    }

    #[test]
    fn test_concurrent_mutation_across_projects() {
        let cache = Arc::new(cache_with(&["p0", "p1"]));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let cache = cache.clone();
                thread::spawn(move || {
                    let project = format!("p{}", t % 2);
                    for i in 0..50 {
                        let s = cache
                            .add_source(Source::new(
                                project.as_str(),
                                file("x"),
                                format!("{t}-{i}"),
                                "text",
                            ))
                            .unwrap();
                        if i % 5 == 0 {
                            cache.remove_source(&project, &s.id);
                        }
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(cache.list_sources("p0").len(), 160);
        assert_eq!(cache.list_sources("p1").len(), 160);
    }

    #[test]
    fn test_writes_never_create_entries() {
        let cache = cache_with(&["p"]);
        assert!(matches!(
            cache.add_source(Source::new("ghost", file("a"), "A", "alpha")),
            Err(ProjectError::NotFound(_))
        ));
        assert!(matches!(
            cache.set_sources("ghost", Vec::new()),
            Err(ProjectError::NotFound(_))
        ));
        assert!(!cache.contains("ghost"));

        cache.remove_project("p");
        assert!(cache.add_pending("p", file("a"), "A").is_err());
        assert!(!cache.contains("p"));

        cache.register("p");
        assert!(cache.list_sources("p").is_empty());
    }

    #[test]
    fn test_add_racing_remove_project_leaves_no_entry() {
        for _ in 0..200 {
            let cache = Arc::new(cache_with(&["p"]));
            let writer = {
                let cache = cache.clone();
                thread::spawn(move || {
                    for i in 0..20 {
                        let _ = cache.add_source(Source::new("p", file("x"), format!("{i}"), "t"));
                    }
                })
            };
            cache.remove_project("p");
            writer.join().unwrap();

            assert!(!cache.contains("p"));
            cache.register("p");
            assert!(cache.list_sources("p").is_empty());
        }
    }
}
