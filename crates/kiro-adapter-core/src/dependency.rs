use crate::config::DependencyConfig;
use crate::discovery::AgentMetadata;
use crate::error::{AdapterError, Result};
use crate::paths;
use crate::types::{AgentSource, DependencyCategory};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

// ---------------------------------------------------------------------------
// ResolvedDependencies
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedResource {
    pub name: String,
    pub path: PathBuf,
    pub content: String,
    pub last_modified: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingDependency {
    pub category: DependencyCategory,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionError {
    pub category: DependencyCategory,
    pub name: String,
    pub reason: String,
}

/// Outcome of resolving one agent's dependencies. Every declared name lands
/// in exactly one of the resolved lists or `missing`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResolvedDependencies {
    pub tasks: Vec<ResolvedResource>,
    pub templates: Vec<ResolvedResource>,
    pub checklists: Vec<ResolvedResource>,
    pub data: Vec<ResolvedResource>,
    pub missing: Vec<MissingDependency>,
    pub errors: Vec<ResolutionError>,
}

impl ResolvedDependencies {
    pub fn get(&self, category: DependencyCategory) -> &[ResolvedResource] {
        match category {
            DependencyCategory::Tasks => &self.tasks,
            DependencyCategory::Templates => &self.templates,
            DependencyCategory::Checklists => &self.checklists,
            DependencyCategory::Data => &self.data,
        }
    }

    fn get_mut(&mut self, category: DependencyCategory) -> &mut Vec<ResolvedResource> {
        match category {
            DependencyCategory::Tasks => &mut self.tasks,
            DependencyCategory::Templates => &mut self.templates,
            DependencyCategory::Checklists => &mut self.checklists,
            DependencyCategory::Data => &mut self.data,
        }
    }

    pub fn resolved_count(&self) -> usize {
        DependencyCategory::all()
            .iter()
            .map(|c| self.get(*c).len())
            .sum()
    }

    pub fn missing_names(&self) -> Vec<&str> {
        self.missing.iter().map(|m| m.name.as_str()).collect()
    }

    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }

    /// Fail with the first missing dependency, for callers that require a
    /// complete set.
    pub fn ensure_complete(&self, agent_id: &str) -> Result<()> {
        match self.missing.first() {
            None => Ok(()),
            Some(m) => Err(AdapterError::Dependency {
                agent_id: agent_id.to_string(),
                category: m.category,
                name: m.name.clone(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// DependencyResolver
// ---------------------------------------------------------------------------

#[derive(Clone)]
struct CachedFile {
    content: String,
    last_modified: DateTime<Utc>,
}

/// Locates task/template/checklist/data files by name.
///
/// Lookups for an expansion-pack agent search the pack directory before the
/// configured base paths. Nothing is shared between `resolve` calls unless
/// the cache is enabled.
pub struct DependencyResolver {
    base_paths: Vec<PathBuf>,
    expansion_packs_dir: PathBuf,
    cache: Option<Mutex<HashMap<PathBuf, CachedFile>>>,
}

impl DependencyResolver {
    pub fn new(base_paths: Vec<PathBuf>, expansion_packs_dir: PathBuf) -> Self {
        Self {
            base_paths,
            expansion_packs_dir,
            cache: None,
        }
    }

    pub fn from_config(root: &Path, deps: &DependencyConfig, expansion_packs_dir: &Path) -> Self {
        let base_paths = deps
            .base_paths
            .iter()
            .map(|p| paths::resolve(root, p))
            .collect();
        Self::new(base_paths, paths::resolve(root, expansion_packs_dir)).with_cache(deps.cache)
    }

    pub fn with_cache(mut self, enabled: bool) -> Self {
        self.cache = enabled.then(|| Mutex::new(HashMap::new()));
        self
    }

    /// Directories searched for `agent`, in order.
    pub fn search_paths(&self, agent: &AgentMetadata) -> Vec<PathBuf> {
        let mut dirs = Vec::with_capacity(self.base_paths.len() + 1);
        if let AgentSource::ExpansionPack { pack } = &agent.source {
            dirs.push(self.expansion_packs_dir.join(pack));
        }
        dirs.extend(self.base_paths.iter().cloned());
        dirs
    }

    pub async fn resolve(&self, agent: &AgentMetadata) -> ResolvedDependencies {
        let search = self.search_paths(agent);
        let mut out = ResolvedDependencies::default();

        for &category in DependencyCategory::all() {
            for name in agent.dependencies.get(category) {
                let Some(path) = locate(&search, category, name).await else {
                    debug!(agent = %agent.id, %category, name = %name, "dependency not found");
                    out.missing.push(MissingDependency {
                        category,
                        name: name.clone(),
                    });
                    continue;
                };

                match self.read(&path).await {
                    Ok(file) => out.get_mut(category).push(ResolvedResource {
                        name: name.clone(),
                        path,
                        content: file.content,
                        last_modified: file.last_modified,
                    }),
                    Err(e) => {
                        out.missing.push(MissingDependency {
                            category,
                            name: name.clone(),
                        });
                        out.errors.push(ResolutionError {
                            category,
                            name: name.clone(),
                            reason: e.to_string(),
                        });
                    }
                }
            }
        }
        out
    }

    async fn read(&self, path: &Path) -> std::io::Result<CachedFile> {
        if let Some(cache) = &self.cache {
            if let Some(hit) = cache.lock().ok().and_then(|c| c.get(path).cloned()) {
                return Ok(hit);
            }
        }

        let content = tokio::fs::read_to_string(path).await?;
        let last_modified = tokio::fs::metadata(path)
            .await?
            .modified()
            .map(DateTime::<Utc>::from)?;
        let file = CachedFile {
            content,
            last_modified,
        };

        if let Some(cache) = &self.cache {
            if let Ok(mut c) = cache.lock() {
                c.insert(path.to_path_buf(), file.clone());
            }
        }
        Ok(file)
    }
}

/// Names must stay inside the category directory: relative, made only of
/// plain components.
fn is_contained(name: &str) -> bool {
    !name.is_empty()
        && Path::new(name)
            .components()
            .all(|c| matches!(c, Component::Normal(_)))
}

/// First existing candidate for `name` under `<dir>/<category>/`. A name
/// without an extension also tries `.md` and `.yaml`.
async fn locate(search: &[PathBuf], category: DependencyCategory, name: &str) -> Option<PathBuf> {
    if !is_contained(name) {
        debug!(%category, name, "dependency name escapes its directory");
        return None;
    }
    let has_ext = Path::new(name).extension().is_some();
    for dir in search {
        let base = dir.join(category.as_str());
        let mut candidates = vec![base.join(name)];
        if !has_ext {
            candidates.push(base.join(format!("{name}.md")));
            candidates.push(base.join(format!("{name}.yaml")));
        }
        for candidate in candidates {
            if tokio::fs::metadata(&candidate)
                .await
                .map(|m| m.is_file())
                .unwrap_or(false)
            {
                return Some(candidate);
            }
        }
    }
    None
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::AgentDependencies;
    use tempfile::TempDir;

    fn agent(id: &str, source: AgentSource, deps: AgentDependencies) -> AgentMetadata {
        AgentMetadata {
            id: id.into(),
            name: id.into(),
            title: None,
            icon: None,
            description: String::new(),
            source,
            path: PathBuf::from(format!("{id}.md")),
            last_modified: Utc::now(),
            dependencies: deps,
            context_needs: Vec::new(),
            front_matter: Default::default(),
            content: String::new(),
        }
    }

    fn write(dir: &Path, rel: &str, content: &str) {
        let path = dir.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    fn resolver(dir: &TempDir) -> DependencyResolver {
        DependencyResolver::new(
            vec![dir.path().join(".bmad-core")],
            dir.path().join("expansion-packs"),
        )
    }

    #[tokio::test]
    async fn resolves_existing_task() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), ".bmad-core/tasks/create-doc.md", "# Create doc");
        let a = agent(
            "dev",
            AgentSource::Core,
            AgentDependencies {
                tasks: vec!["create-doc.md".into()],
                ..Default::default()
            },
        );

        let resolved = resolver(&dir).resolve(&a).await;
        assert_eq!(resolved.tasks.len(), 1);
        assert_eq!(resolved.tasks[0].content, "# Create doc");
        assert!(resolved.missing.is_empty());
        assert!(resolved.ensure_complete("dev").is_ok());
    }

    #[tokio::test]
    async fn missing_task_is_collected_not_thrown() {
        let dir = TempDir::new().unwrap();
        let a = agent(
            "qa",
            AgentSource::Core,
            AgentDependencies {
                tasks: vec!["missing-task.md".into()],
                ..Default::default()
            },
        );

        let resolved = resolver(&dir).resolve(&a).await;
        assert_eq!(resolved.missing_names(), vec!["missing-task.md"]);
        assert!(resolved.tasks.is_empty());
        let err = resolved.ensure_complete("qa").unwrap_err();
        assert!(matches!(err, AdapterError::Dependency { ref name, .. } if name == "missing-task.md"));
    }

    #[tokio::test]
    async fn names_outside_the_category_dir_are_missing() {
        let dir = TempDir::new().unwrap();
        let outside = TempDir::new().unwrap();
        write(outside.path(), "secret.md", "do not leak");
        write(dir.path(), ".bmad-core/secret.md", "parent");
        let absolute = outside.path().join("secret.md").display().to_string();
        let a = agent(
            "dev",
            AgentSource::Core,
            AgentDependencies {
                tasks: vec![absolute.clone(), "../secret.md".into(), "./secret.md".into()],
                ..Default::default()
            },
        );

        let resolved = resolver(&dir).resolve(&a).await;
        assert!(resolved.tasks.is_empty());
        assert_eq!(
            resolved.missing_names(),
            vec![absolute.as_str(), "../secret.md", "./secret.md"]
        );
    }

    #[test]
    fn nested_relative_names_are_allowed() {
        assert!(is_contained("stories/develop-story.md"));
        assert!(!is_contained("/etc/passwd"));
        assert!(!is_contained("a/../../b.md"));
        assert!(!is_contained(""));
    }

    #[tokio::test]
    async fn zero_dependencies_gives_empty_lists() {
        let dir = TempDir::new().unwrap();
        let a = agent("pm", AgentSource::Core, AgentDependencies::default());
        let resolved = resolver(&dir).resolve(&a).await;
        assert_eq!(resolved, ResolvedDependencies::default());
        assert_eq!(resolved.resolved_count(), 0);
    }

    #[tokio::test]
    async fn pack_directory_searched_first_and_extension_inferred() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), ".bmad-core/templates/story-tmpl.yaml", "core");
        write(
            dir.path(),
            "expansion-packs/game/templates/story-tmpl.yaml",
            "pack",
        );
        write(dir.path(), ".bmad-core/checklists/story-dod.md", "dod");
        let a = agent(
            "game-sm",
            AgentSource::ExpansionPack {
                pack: "game".into(),
            },
            AgentDependencies {
                templates: vec!["story-tmpl.yaml".into()],
                checklists: vec!["story-dod".into()],
                ..Default::default()
            },
        );

        let resolved = resolver(&dir).resolve(&a).await;
        assert_eq!(resolved.templates[0].content, "pack");
        assert_eq!(resolved.checklists[0].content, "dod");
        assert_eq!(resolved.checklists[0].name, "story-dod");
    }

    #[tokio::test]
    async fn every_name_is_resolved_or_missing() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), ".bmad-core/data/kb.md", "kb");
        let a = agent(
            "analyst",
            AgentSource::Core,
            AgentDependencies {
                data: vec!["kb.md".into(), "nope.md".into()],
                tasks: vec!["../escape.md".into()],
                ..Default::default()
            },
        );
        let resolved = resolver(&dir).resolve(&a).await;
        assert_eq!(resolved.resolved_count() + resolved.missing.len(), 3);
        assert_eq!(resolved.data.len(), 1);
    }

    #[tokio::test]
    async fn uncached_resolver_sees_updated_content() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), ".bmad-core/tasks/t.md", "v1");
        let a = agent(
            "dev",
            AgentSource::Core,
            AgentDependencies {
                tasks: vec!["t.md".into()],
                ..Default::default()
            },
        );

        let uncached = resolver(&dir);
        let cached = resolver(&dir).with_cache(true);
        assert_eq!(uncached.resolve(&a).await.tasks[0].content, "v1");
        assert_eq!(cached.resolve(&a).await.tasks[0].content, "v1");

        write(dir.path(), ".bmad-core/tasks/t.md", "v2");
        assert_eq!(uncached.resolve(&a).await.tasks[0].content, "v2");
        assert_eq!(cached.resolve(&a).await.tasks[0].content, "v1");
    }
}
