//! Skill catalog: directories of `SKILL.md` documents, disclosed progressively.
//!
//! 1. **Index**: name + description of every skill, rendered into the chat
//!    system prompt by [`SkillCatalog::format_for_prompt`].
//! 2. **Content**: the full `SKILL.md` body, fetched by the model through the
//!    `loadSkill` tool when it decides a skill applies.
//!
//! Each skill lives in `<dir>/<name>/SKILL.md` and starts with a frontmatter
//! block carrying `name` and `description`. The catalog is an explicit cache:
//! it scans on first use and again only after [`SkillCatalog::invalidate`] or
//! [`SkillCatalog::reload`].
//!
//! ```rust,no_run
//! use switchboard::skills::{SkillCatalog, SkillSource};
//!
//! let catalog = SkillCatalog::new(vec![
//!     SkillSource::new("global", "/etc/switchboard/skills"),
//!     SkillSource::new("workspace", "./skills"),
//! ]);
//! println!("{}", catalog.format_for_prompt());
//! ```

use crate::schema::Schema;
use crate::tool::{str_arg, AgentTool, ToolError, ToolKind};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};

/// A directory scanned for skills, tagged with where it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillSource {
    pub label: String,
    pub path: PathBuf,
}

impl SkillSource {
    pub fn new(label: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            label: label.into(),
            path: path.into(),
        }
    }
}

/// A discovered skill.
#[derive(Debug, Clone)]
pub struct Skill {
    /// Directory name; lowercase and hyphens by convention
    pub name: String,
    pub description: String,
    /// Absolute path to SKILL.md
    pub file_path: PathBuf,
    /// Label of the [`SkillSource`] it was found in
    pub source: String,
}

/// What `listSkills` reports per skill.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkillSummary {
    pub name: String,
    pub description: String,
    pub source: String,
}

#[derive(Debug, thiserror::Error)]
pub enum SkillError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("SKILL.md in {path} missing required frontmatter field: {field}")]
    MissingField { path: PathBuf, field: &'static str },
    #[error("SKILL.md in {path} has invalid frontmatter: {detail}")]
    InvalidFrontmatter { path: PathBuf, detail: String },
    #[error("skill not found: {name}")]
    NotFound { name: String, available: Vec<String> },
}

/// Lazily loaded, explicitly invalidated set of skills.
pub struct SkillCatalog {
    sources: Vec<SkillSource>,
    cache: RwLock<Option<Arc<Vec<Skill>>>>,
}

impl SkillCatalog {
    pub fn new(sources: Vec<SkillSource>) -> Self {
        Self {
            sources,
            cache: RwLock::new(None),
        }
    }

    /// A catalog with no sources.
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn sources(&self) -> &[SkillSource] {
        &self.sources
    }

    /// Drop the cached scan; the next read rescans.
    pub fn invalidate(&self) {
        *self.cache.write().unwrap_or_else(|e| e.into_inner()) = None;
        debug!("Skill cache invalidated");
    }

    /// Rescan now. Returns the number of skills found.
    pub fn reload(&self) -> Result<usize, SkillError> {
        let skills = Arc::new(scan(&self.sources)?);
        let count = skills.len();
        *self.cache.write().unwrap_or_else(|e| e.into_inner()) = Some(skills);
        info!("Loaded {} skill(s) from {} source(s)", count, self.sources.len());
        Ok(count)
    }

    fn skills(&self) -> Result<Arc<Vec<Skill>>, SkillError> {
        if let Some(skills) = self
            .cache
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
        {
            return Ok(skills.clone());
        }
        self.reload()?;
        self.cache
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .ok_or_else(|| SkillError::InvalidFrontmatter {
                path: PathBuf::new(),
                detail: "skill cache cleared during reload".into(),
            })
    }

    pub fn list(&self) -> Result<Vec<SkillSummary>, SkillError> {
        Ok(self
            .skills()?
            .iter()
            .map(|s| SkillSummary {
                name: s.name.clone(),
                description: s.description.clone(),
                source: s.source.clone(),
            })
            .collect())
    }

    pub fn names(&self) -> Result<Vec<String>, SkillError> {
        Ok(self.skills()?.iter().map(|s| s.name.clone()).collect())
    }

    /// Full SKILL.md body (frontmatter stripped) for `name`.
    pub fn content(&self, name: &str) -> Result<String, SkillError> {
        let skills = self.skills()?;
        let skill = skills
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| SkillError::NotFound {
                name: name.to_string(),
                available: skills.iter().map(|s| s.name.clone()).collect(),
            })?;

        let raw = fs::read_to_string(&skill.file_path).map_err(|e| SkillError::Io {
            path: skill.file_path.clone(),
            source: e,
        })?;
        Ok(strip_frontmatter(&raw).trim().to_string())
    }

    /// XML index of every skill for the system prompt; empty when there are none.
    ///
    /// ```xml
    /// <available_skills>
    ///   <skill>
    ///     <name>weather</name>
    ///     <description>Get current weather and forecasts.</description>
    ///     <source>workspace</source>
    ///   </skill>
    /// </available_skills>
    /// ```
    pub fn format_for_prompt(&self) -> String {
        let skills = match self.skills() {
            Ok(skills) => skills,
            Err(e) => {
                warn!("Skills unavailable for prompt: {}", e);
                return String::new();
            }
        };
        if skills.is_empty() {
            return String::new();
        }

        let mut out = String::from("<available_skills>\n");
        for skill in skills.iter() {
            out.push_str("  <skill>\n");
            out.push_str(&format!("    <name>{}</name>\n", xml_escape(&skill.name)));
            out.push_str(&format!(
                "    <description>{}</description>\n",
                xml_escape(&skill.description)
            ));
            out.push_str(&format!("    <source>{}</source>\n", xml_escape(&skill.source)));
            out.push_str("  </skill>\n");
        }
        out.push_str("</available_skills>\n");
        out.push_str("Call `loadSkill` with a skill name to read its full instructions.");
        out
    }
}

/// Later sources override earlier ones on name conflict.
fn scan(sources: &[SkillSource]) -> Result<Vec<Skill>, SkillError> {
    let mut by_name: HashMap<String, Skill> = HashMap::new();
    for source in sources {
        if !source.path.exists() {
            debug!("Skill directory {} does not exist, skipping", source.path.display());
            continue;
        }
        for skill in load_skills_from_dir(&source.path, &source.label)? {
            by_name.insert(skill.name.clone(), skill);
        }
    }
    let mut skills: Vec<Skill> = by_name.into_values().collect();
    skills.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(skills)
}

/// Scan `<dir>/<name>/SKILL.md`. A malformed SKILL.md is logged and skipped.
fn load_skills_from_dir(dir: &Path, source: &str) -> Result<Vec<Skill>, SkillError> {
    let io_err = |e| SkillError::Io {
        path: dir.to_path_buf(),
        source: e,
    };
    let mut skills = Vec::new();

    for entry in fs::read_dir(dir).map_err(io_err)? {
        let path = entry.map_err(io_err)?.path();
        if !path.is_dir() {
            continue;
        }
        let skill_md = path.join("SKILL.md");
        if !skill_md.exists() {
            continue;
        }

        let content = fs::read_to_string(&skill_md).map_err(|e| SkillError::Io {
            path: skill_md.clone(),
            source: e,
        })?;
        let description = match parse_frontmatter(&content, &skill_md) {
            Ok((_, description)) => description,
            Err(e) => {
                warn!("Skipping skill: {}", e);
                continue;
            }
        };

        // The directory name is authoritative.
        let name = path
            .file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string();
        let file_path = fs::canonicalize(&skill_md).unwrap_or(skill_md);

        skills.push(Skill {
            name,
            description,
            file_path,
            source: source.to_string(),
        });
    }

    Ok(skills)
}

fn frontmatter_bounds(content: &str) -> Option<(&str, &str)> {
    let after_open = content.trim_start().strip_prefix("---")?;
    let end = after_open.find("\n---")?;
    let rest = &after_open[end + 4..];
    Some((&after_open[..end], rest))
}

fn strip_frontmatter(content: &str) -> &str {
    frontmatter_bounds(content)
        .map(|(_, rest)| rest)
        .unwrap_or(content)
}

/// Returns `(name, description)` from the frontmatter block.
fn parse_frontmatter(content: &str, path: &Path) -> Result<(String, String), SkillError> {
    let (block, _) = frontmatter_bounds(content).ok_or_else(|| SkillError::InvalidFrontmatter {
        path: path.to_path_buf(),
        detail: "expected a block delimited by ---".into(),
    })?;

    let mut name = None;
    let mut description = None;
    for line in block.lines() {
        let line = line.trim();
        if let Some(rest) = line.strip_prefix("name:") {
            name = Some(unquote(rest.trim()));
        } else if let Some(rest) = line.strip_prefix("description:") {
            description = Some(unquote(rest.trim()));
        }
    }

    let missing = |field| SkillError::MissingField {
        path: path.to_path_buf(),
        field,
    };
    let name = name.filter(|n| !n.is_empty()).ok_or_else(|| missing("name"))?;
    let description = description
        .filter(|d| !d.is_empty())
        .ok_or_else(|| missing("description"))?;
    Ok((name, description))
}

fn unquote(s: &str) -> String {
    if s.len() >= 2
        && ((s.starts_with('"') && s.ends_with('"')) || (s.starts_with('\'') && s.ends_with('\'')))
    {
        s[1..s.len() - 1].to_string()
    } else {
        s.to_string()
    }
}

fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

// ---------------------------------------------------------------------------
// Tools
// ---------------------------------------------------------------------------

fn catalog_failure(e: SkillError) -> ToolError {
    match e {
        SkillError::NotFound { name, available } => ToolError::NotFound {
            kind: "skill",
            name,
            available,
        },
        other => ToolError::Failed(other.to_string()),
    }
}

/// Catalog reads touch the disk, so they run on the blocking pool.
async fn off_runtime<T, F>(catalog: &Arc<SkillCatalog>, read: F) -> Result<T, ToolError>
where
    T: Send + 'static,
    F: FnOnce(&SkillCatalog) -> Result<T, SkillError> + Send + 'static,
{
    let catalog = Arc::clone(catalog);
    tokio::task::spawn_blocking(move || read(&catalog))
        .await
        .map_err(|e| ToolError::Failed(format!("skill lookup aborted: {}", e)))?
        .map_err(catalog_failure)
}

/// `listSkills`: every skill's name, description and source.
pub struct ListSkillsTool {
    catalog: Arc<SkillCatalog>,
}

impl ListSkillsTool {
    pub fn new(catalog: Arc<SkillCatalog>) -> Self {
        Self { catalog }
    }
}

#[async_trait]
impl AgentTool for ListSkillsTool {
    fn name(&self) -> &str {
        "listSkills"
    }

    fn description(&self) -> &str {
        "List the available skills with their descriptions. Use loadSkill to read one."
    }

    fn parameters(&self) -> Schema {
        Schema::object()
    }

    fn kind(&self) -> ToolKind {
        ToolKind::Skill
    }

    async fn execute(&self, _args: Value) -> Result<Value, ToolError> {
        let skills = off_runtime(&self.catalog, |c| c.list()).await?;
        Ok(json!({"success": true, "skills": skills}))
    }
}

/// `loadSkill { name }`: the full instructions of one skill.
pub struct LoadSkillTool {
    catalog: Arc<SkillCatalog>,
}

impl LoadSkillTool {
    pub fn new(catalog: Arc<SkillCatalog>) -> Self {
        Self { catalog }
    }
}

#[async_trait]
impl AgentTool for LoadSkillTool {
    fn name(&self) -> &str {
        "loadSkill"
    }

    fn description(&self) -> &str {
        "Load the full instructions of a skill by name."
    }

    fn parameters(&self) -> Schema {
        Schema::object().required("name", Schema::String, "Skill name from listSkills")
    }

    fn kind(&self) -> ToolKind {
        ToolKind::Skill
    }

    async fn execute(&self, args: Value) -> Result<Value, ToolError> {
        let name = str_arg(&args, "name")?.to_string();
        let lookup = name.clone();
        let content = off_runtime(&self.catalog, move |c| c.content(&lookup)).await?;
        Ok(json!({"success": true, "name": name, "content": content}))
    }
}

/// Both skill tools over one catalog.
pub fn skill_tools(catalog: Arc<SkillCatalog>) -> Vec<Arc<dyn AgentTool>> {
    vec![
        Arc::new(ListSkillsTool::new(catalog.clone())),
        Arc::new(LoadSkillTool::new(catalog)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ToolRegistry;
    use tempfile::TempDir;

    fn create_skill(dir: &Path, name: &str, description: &str) {
        let skill_dir = dir.join(name);
        fs::create_dir_all(&skill_dir).unwrap();
        fs::write(
            skill_dir.join("SKILL.md"),
            format!(
                "---\nname: {}\ndescription: {}\n---\n\n# {}\n\nInstructions here.\n",
                name, description, name
            ),
        )
        .unwrap();
    }

    fn catalog(dirs: &[&Path]) -> SkillCatalog {
        SkillCatalog::new(
            dirs.iter()
                .enumerate()
                .map(|(i, d)| SkillSource::new(format!("dir{}", i), *d))
                .collect(),
        )
    }

    #[test]
    fn lists_skills_sorted_with_source() {
        let tmp = TempDir::new().unwrap();
        create_skill(tmp.path(), "weather", "Get current weather and forecasts.");
        create_skill(tmp.path(), "git", "Git operations: commit, branch, merge.");

        let skills = catalog(&[tmp.path()]).list().unwrap();
        let names: Vec<&str> = skills.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["git", "weather"]);
        assert_eq!(skills[0].source, "dir0");
    }

    #[test]
    fn later_sources_override_earlier() {
        let dir1 = TempDir::new().unwrap();
        let dir2 = TempDir::new().unwrap();
        create_skill(dir1.path(), "weather", "Old description.");
        create_skill(dir2.path(), "weather", "New description.");

        let skills = catalog(&[dir1.path(), dir2.path()]).list().unwrap();
        assert_eq!(skills.len(), 1);
        assert_eq!(skills[0].description, "New description.");
        assert_eq!(skills[0].source, "dir1");
    }

    #[test]
    fn content_strips_frontmatter() {
        let tmp = TempDir::new().unwrap();
        create_skill(tmp.path(), "weather", "Get weather.");

        let body = catalog(&[tmp.path()]).content("weather").unwrap();
        assert_eq!(body, "# weather\n\nInstructions here.");
    }

    #[test]
    fn unknown_skill_lists_alternatives() {
        let tmp = TempDir::new().unwrap();
        create_skill(tmp.path(), "git", "Git.");

        let err = catalog(&[tmp.path()]).content("weather").unwrap_err();
        match err {
            SkillError::NotFound { name, available } => {
                assert_eq!(name, "weather");
                assert_eq!(available, vec!["git".to_string()]);
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn cache_holds_until_invalidated() {
        let tmp = TempDir::new().unwrap();
        create_skill(tmp.path(), "git", "Git.");
        let catalog = catalog(&[tmp.path()]);
        assert_eq!(catalog.list().unwrap().len(), 1);

        create_skill(tmp.path(), "docker", "Docker.");
        assert_eq!(catalog.list().unwrap().len(), 1);

        catalog.invalidate();
        assert_eq!(catalog.list().unwrap().len(), 2);

        create_skill(tmp.path(), "weather", "Weather.");
        assert_eq!(catalog.reload().unwrap(), 3);
    }

    #[test]
    fn malformed_skills_are_skipped() {
        let tmp = TempDir::new().unwrap();
        create_skill(tmp.path(), "good", "Works.");
        let bad = tmp.path().join("bad");
        fs::create_dir_all(&bad).unwrap();
        fs::write(bad.join("SKILL.md"), "# No frontmatter\n").unwrap();
        let no_desc = tmp.path().join("no-desc");
        fs::create_dir_all(&no_desc).unwrap();
        fs::write(no_desc.join("SKILL.md"), "---\nname: no-desc\n---\n").unwrap();

        let names = catalog(&[tmp.path()]).names().unwrap();
        assert_eq!(names, vec!["good".to_string()]);
    }

    #[test]
    fn missing_directories_are_ignored() {
        let catalog = catalog(&[Path::new("/nonexistent/path")]);
        assert!(catalog.list().unwrap().is_empty());
        assert_eq!(catalog.format_for_prompt(), "");
    }

    #[test]
    fn quoted_frontmatter_values() {
        let tmp = TempDir::new().unwrap();
        let skill_dir = tmp.path().join("quoted");
        fs::create_dir_all(&skill_dir).unwrap();
        fs::write(
            skill_dir.join("SKILL.md"),
            "---\nname: \"quoted\"\ndescription: 'A quoted description.'\n---\n",
        )
        .unwrap();

        let skills = catalog(&[tmp.path()]).list().unwrap();
        assert_eq!(skills[0].description, "A quoted description.");
    }

    #[test]
    fn prompt_index_escapes_xml() {
        let tmp = TempDir::new().unwrap();
        create_skill(tmp.path(), "escape-test", "Uses <tags> & \"quotes\"");

        let prompt = catalog(&[tmp.path()]).format_for_prompt();
        assert!(prompt.starts_with("<available_skills>"));
        assert!(prompt.contains("<name>escape-test</name>"));
        assert!(prompt.contains("&lt;tags&gt; &amp; &quot;quotes&quot;"));
        assert!(prompt.contains("loadSkill"));
    }

    #[tokio::test]
    async fn skill_tools_through_registry() {
        let tmp = TempDir::new().unwrap();
        create_skill(tmp.path(), "git", "Git operations.");
        let mut registry = ToolRegistry::new();
        registry.extend(skill_tools(Arc::new(catalog(&[tmp.path()]))));

        let (listing, is_error) = registry.invoke("listSkills", json!({})).await;
        assert!(!is_error);
        assert_eq!(listing["skills"][0]["name"], "git");

        let (loaded, is_error) = registry.invoke("loadSkill", json!({"name": "git"})).await;
        assert!(!is_error);
        assert!(loaded["content"].as_str().unwrap().contains("Instructions here."));

        let (missing, is_error) = registry.invoke("loadSkill", json!({"name": "nope"})).await;
        assert!(is_error);
        assert_eq!(missing["success"], false);
        assert_eq!(missing["available"], json!(["git"]));
        assert!(missing["hint"].is_string());

        let (invalid, is_error) = registry.invoke("loadSkill", json!({})).await;
        assert!(is_error);
        assert!(invalid["error"].as_str().unwrap().contains("name"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_skill_loads_succeed() {
        let tmp = TempDir::new().unwrap();
        for name in ["git", "docker", "release"] {
            create_skill(tmp.path(), name, "Skill.");
        }
        let mut registry = ToolRegistry::new();
        registry.extend(skill_tools(Arc::new(catalog(&[tmp.path()]))));

        let calls = ["git", "docker", "release", "git"]
            .into_iter()
            .map(|name| registry.invoke("loadSkill", json!({"name": name})));
        let results = futures::future::join_all(calls).await;

        for (loaded, is_error) in results {
            assert!(!is_error, "{}", loaded);
            assert!(loaded["content"].as_str().unwrap().contains("Instructions here."));
        }
    }
}
