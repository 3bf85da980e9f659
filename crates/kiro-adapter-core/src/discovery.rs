use crate::config::DiscoveryConfig;
use crate::error::{AdapterError, Result};
use crate::frontmatter::{self, AgentDocument};
use crate::paths;
use crate::types::{AgentSource, DependencyCategory};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

// ---------------------------------------------------------------------------
// AgentMetadata
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentDependencies {
    #[serde(default)]
    pub tasks: Vec<String>,
    #[serde(default)]
    pub templates: Vec<String>,
    #[serde(default)]
    pub checklists: Vec<String>,
    #[serde(default)]
    pub data: Vec<String>,
}

impl AgentDependencies {
    pub fn get(&self, category: DependencyCategory) -> &[String] {
        match category {
            DependencyCategory::Tasks => &self.tasks,
            DependencyCategory::Templates => &self.templates,
            DependencyCategory::Checklists => &self.checklists,
            DependencyCategory::Data => &self.data,
        }
    }

    pub fn total(&self) -> usize {
        DependencyCategory::all()
            .iter()
            .map(|c| self.get(*c).len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    fn from_front_matter(front_matter: &Mapping) -> std::result::Result<Self, String> {
        let deps = match front_matter.get("dependencies") {
            None | Some(Value::Null) => return Ok(Self::default()),
            Some(Value::Mapping(m)) => m,
            Some(_) => return Err("'dependencies' must be a mapping".to_string()),
        };
        Ok(Self {
            tasks: frontmatter::string_list(deps, "tasks")?,
            templates: frontmatter::string_list(deps, "templates")?,
            checklists: frontmatter::string_list(deps, "checklists")?,
            data: frontmatter::string_list(deps, "data")?,
        })
    }
}

/// One discovered agent definition. Immutable once produced by a scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentMetadata {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    pub description: String,
    pub source: AgentSource,
    pub path: PathBuf,
    pub last_modified: DateTime<Utc>,
    pub dependencies: AgentDependencies,
    /// Abstract context needs declared under `context:`; empty when the
    /// agent relies on the role defaults.
    #[serde(default)]
    pub context_needs: Vec<String>,
    #[serde(default)]
    pub front_matter: Mapping,
    pub content: String,
}

impl AgentMetadata {
    /// Build metadata from a parsed document. The id falls back to the file
    /// stem and the name to the title or id.
    pub fn from_document(input: &ScanInput, doc: AgentDocument) -> std::result::Result<Self, String> {
        let agent = frontmatter::agent_section(&doc.front_matter);
        let stem = input
            .path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_string();

        let id = frontmatter::str_field(agent, "id")
            .or_else(|| frontmatter::str_field(&doc.front_matter, "id"))
            .unwrap_or(stem);
        paths::validate_agent_id(&id).map_err(|e| e.to_string())?;

        let title = frontmatter::str_field(agent, "title");
        let name = frontmatter::str_field(agent, "name")
            .or_else(|| title.clone())
            .unwrap_or_else(|| id.clone());
        let description = frontmatter::str_field(agent, "whenToUse")
            .or_else(|| frontmatter::str_field(agent, "description"))
            .or_else(|| frontmatter::str_field(&doc.front_matter, "description"))
            .or_else(|| title.clone())
            .unwrap_or_default();

        Ok(Self {
            id,
            name,
            title,
            icon: frontmatter::str_field(agent, "icon"),
            description,
            source: input.source.clone(),
            path: input.path.clone(),
            last_modified: input.modified,
            dependencies: AgentDependencies::from_front_matter(&doc.front_matter)?,
            context_needs: frontmatter::string_list(&doc.front_matter, "context")?,
            front_matter: doc.front_matter,
            content: doc.body,
        })
    }

    /// Plain `key: value` string entries of the front-matter, for callers
    /// that only need flat metadata.
    pub fn front_matter_str(&self, key: &str) -> Option<String> {
        frontmatter::str_field(&self.front_matter, key)
    }
}

// ---------------------------------------------------------------------------
// Scanners
// ---------------------------------------------------------------------------

/// A file handed to a scanner, already read from disk.
#[derive(Debug, Clone)]
pub struct ScanInput {
    pub path: PathBuf,
    pub source: AgentSource,
    pub content: String,
    pub modified: DateTime<Utc>,
}

/// Turns one file into agent metadata. Scanners are tried in descending
/// priority; the first whose `applies` accepts the path handles it.
pub trait AgentScanner: Send + Sync {
    fn name(&self) -> &str;
    fn priority(&self) -> i32 {
        0
    }
    fn applies(&self, path: &Path) -> bool;
    fn scan(&self, input: &ScanInput) -> std::result::Result<AgentMetadata, String>;
}

fn has_extension(path: &Path, exts: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| exts.iter().any(|x| e.eq_ignore_ascii_case(x)))
        .unwrap_or(false)
}

/// Markdown agents with `---` front-matter or an embedded YAML block.
pub struct MarkdownAgentScanner;

impl AgentScanner for MarkdownAgentScanner {
    fn name(&self) -> &str {
        "markdown"
    }

    fn applies(&self, path: &Path) -> bool {
        has_extension(path, &["md"])
    }

    fn scan(&self, input: &ScanInput) -> std::result::Result<AgentMetadata, String> {
        let doc = frontmatter::parse_document(&input.content)?;
        AgentMetadata::from_document(input, doc)
    }
}

/// Whole-file YAML agent definitions.
pub struct YamlAgentScanner;

impl AgentScanner for YamlAgentScanner {
    fn name(&self) -> &str {
        "yaml"
    }

    fn applies(&self, path: &Path) -> bool {
        has_extension(path, &["yaml", "yml"])
    }

    fn scan(&self, input: &ScanInput) -> std::result::Result<AgentMetadata, String> {
        let front_matter = frontmatter::parse_mapping(&input.content)?;
        if front_matter.is_empty() {
            return Err("empty agent definition".to_string());
        }
        let doc = AgentDocument {
            front_matter,
            body: input.content.clone(),
            format: frontmatter::FrontMatterFormat::None,
        };
        AgentMetadata::from_document(input, doc)
    }
}

// ---------------------------------------------------------------------------
// Observer
// ---------------------------------------------------------------------------

/// Progress callbacks for a scan. All methods default to no-ops.
pub trait DiscoveryObserver: Send + Sync {
    fn on_agent_found(&self, _agent: &AgentMetadata) {}
    fn on_scan_complete(&self, _stats: &DiscoveryStats) {}
    fn on_error(&self, _error: &AdapterError) {}
}

// ---------------------------------------------------------------------------
// SourceRoot / DiscoveryStats
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRoot {
    pub path: PathBuf,
    pub source: AgentSource,
}

impl SourceRoot {
    pub fn core(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            source: AgentSource::Core,
        }
    }

    pub fn expansion_pack(path: impl Into<PathBuf>, pack: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            source: AgentSource::ExpansionPack { pack: pack.into() },
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryStats {
    pub total: usize,
    pub core: usize,
    pub expansion_packs: BTreeMap<String, usize>,
    pub skipped: usize,
}

impl DiscoveryStats {
    pub fn from_agents(agents: &[AgentMetadata]) -> Self {
        let mut stats = DiscoveryStats {
            total: agents.len(),
            ..Default::default()
        };
        for agent in agents {
            match &agent.source {
                AgentSource::Core => stats.core += 1,
                AgentSource::ExpansionPack { pack } => {
                    *stats.expansion_packs.entry(pack.clone()).or_default() += 1
                }
            }
        }
        stats
    }
}

// ---------------------------------------------------------------------------
// AgentDiscovery
// ---------------------------------------------------------------------------

pub struct AgentDiscovery {
    scanners: Vec<Arc<dyn AgentScanner>>,
    observers: Vec<Arc<dyn DiscoveryObserver>>,
}

impl Default for AgentDiscovery {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentDiscovery {
    /// Discovery with the built-in Markdown and YAML scanners.
    pub fn new() -> Self {
        Self::empty()
            .with_scanner(Arc::new(MarkdownAgentScanner))
            .with_scanner(Arc::new(YamlAgentScanner))
    }

    pub fn empty() -> Self {
        Self {
            scanners: Vec::new(),
            observers: Vec::new(),
        }
    }

    /// Insert a scanner, keeping descending priority order. Equal priorities
    /// keep insertion order.
    pub fn with_scanner(mut self, scanner: Arc<dyn AgentScanner>) -> Self {
        let pos = self
            .scanners
            .iter()
            .position(|s| s.priority() < scanner.priority())
            .unwrap_or(self.scanners.len());
        self.scanners.insert(pos, scanner);
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn DiscoveryObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn scanner_names(&self) -> Vec<&str> {
        self.scanners.iter().map(|s| s.name()).collect()
    }

    /// Roots for a project: the core agents directory plus every
    /// `<expansion_packs_dir>/<pack>/agents` that exists.
    pub fn source_roots(root: &Path, config: &DiscoveryConfig) -> Result<Vec<SourceRoot>> {
        let mut roots = vec![SourceRoot::core(paths::resolve(
            root,
            &config.core_agents_dir,
        ))];
        if !config.include_expansion_packs {
            return Ok(roots);
        }

        let packs_dir = paths::resolve(root, &config.expansion_packs_dir);
        if !packs_dir.is_dir() {
            return Ok(roots);
        }
        let mut packs: Vec<_> = std::fs::read_dir(&packs_dir)
            .map_err(|source| AdapterError::Discovery {
                path: packs_dir.clone(),
                source,
            })?
            .filter_map(|e| e.ok())
            .filter(|e| e.path().join(paths::PACK_AGENTS_SUBDIR).is_dir())
            .collect();
        packs.sort_by_key(|e| e.file_name());

        for entry in packs {
            let pack = entry.file_name().to_string_lossy().into_owned();
            roots.push(SourceRoot::expansion_pack(
                entry.path().join(paths::PACK_AGENTS_SUBDIR),
                pack,
            ));
        }
        Ok(roots)
    }

    /// Scan the configured project sources.
    pub async fn scan_all_agents(
        &self,
        root: &Path,
        config: &DiscoveryConfig,
    ) -> Result<Vec<AgentMetadata>> {
        let roots = Self::source_roots(root, config)?;
        self.scan(&roots).await
    }

    /// Scan every root in order. An unreadable root fails the whole scan; a
    /// malformed file is reported and skipped. Two files declaring the same
    /// id is an error.
    pub async fn scan(&self, roots: &[SourceRoot]) -> Result<Vec<AgentMetadata>> {
        let mut agents: Vec<AgentMetadata> = Vec::new();
        let mut seen: HashMap<String, PathBuf> = HashMap::new();
        let mut skipped = 0usize;

        for root in roots {
            for path in list_files(&root.path).await? {
                let Some(scanner) = self.scanners.iter().find(|s| s.applies(&path)) else {
                    debug!(path = %path.display(), "no scanner applies, skipping");
                    continue;
                };

                match self.scan_file(scanner.as_ref(), &path, &root.source).await {
                    Ok(agent) => {
                        if let Some(first) = seen.get(&agent.id) {
                            let err = AdapterError::DuplicateAgent {
                                id: agent.id.clone(),
                                first: first.clone(),
                                second: agent.path.clone(),
                            };
                            self.notify_error(&err);
                            return Err(err);
                        }
                        debug!(agent = %agent.id, scanner = scanner.name(), "agent found");
                        seen.insert(agent.id.clone(), agent.path.clone());
                        for o in &self.observers {
                            o.on_agent_found(&agent);
                        }
                        agents.push(agent);
                    }
                    Err(err) => {
                        warn!(path = %path.display(), error = %err, "skipping malformed agent file");
                        skipped += 1;
                        self.notify_error(&err);
                    }
                }
            }
        }

        let mut stats = DiscoveryStats::from_agents(&agents);
        stats.skipped = skipped;
        for o in &self.observers {
            o.on_scan_complete(&stats);
        }
        Ok(agents)
    }

    async fn scan_file(
        &self,
        scanner: &dyn AgentScanner,
        path: &Path,
        source: &AgentSource,
    ) -> Result<AgentMetadata> {
        let extraction = |reason: String| AdapterError::MetadataExtraction {
            path: path.to_path_buf(),
            reason,
        };

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| extraction(e.to_string()))?;
        let modified = tokio::fs::metadata(path)
            .await
            .and_then(|m| m.modified())
            .map(DateTime::<Utc>::from)
            .map_err(|e| extraction(e.to_string()))?;

        let input = ScanInput {
            path: path.to_path_buf(),
            source: source.clone(),
            content,
            modified,
        };
        scanner.scan(&input).map_err(extraction)
    }

    fn notify_error(&self, err: &AdapterError) {
        for o in &self.observers {
            o.on_error(err);
        }
    }
}

/// Regular files directly under `dir`, sorted by name.
async fn list_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let discovery_err = |source: std::io::Error| AdapterError::Discovery {
        path: dir.to_path_buf(),
        source,
    };
    let mut entries = tokio::fs::read_dir(dir).await.map_err(discovery_err)?;
    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(discovery_err)? {
        let is_file = entry
            .file_type()
            .await
            .map(|t| t.is_file())
            .unwrap_or(false);
        if is_file {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
