use crate::document::AdminToolFilter;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// A statically declared tool loaded from the tools directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaticTool {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub parameters: Option<Value>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ToolFile {
    Many(Vec<StaticTool>),
    One(StaticTool),
}

/// Loads tool definition files (`.json`, `.yaml`, `.yml`) from a directory
/// tree. Unreadable files are skipped with a warning.
#[derive(Debug, Clone)]
pub struct ToolAssembler {
    directory: PathBuf,
}

impl ToolAssembler {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Tools allowed by `filter`, sorted by name, first definition of a name
    /// wins.
    pub fn assemble(&self, filter: &AdminToolFilter) -> Vec<StaticTool> {
        if !self.directory.is_dir() {
            warn!(directory = %self.directory.display(), "Tools directory not found");
            return Vec::new();
        }

        let mut files: Vec<PathBuf> = WalkDir::new(&self.directory)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file())
            .map(walkdir::DirEntry::into_path)
            .filter(|p| {
                matches!(
                    p.extension().and_then(|s| s.to_str()),
                    Some("json" | "yaml" | "yml")
                )
            })
            .collect();
        files.sort();

        let mut seen = HashSet::new();
        let mut tools = Vec::new();
        for path in files {
            let parsed = match Self::load_file(&path) {
                Ok(parsed) => parsed,
                Err(e) => {
                    warn!(file = %path.display(), error = %e, "Skipping unreadable tool definition");
                    continue;
                }
            };
            for tool in parsed {
                if !filter.allows(&tool.name) {
                    debug!(tool = %tool.name, "Tool excluded by admin filter");
                    continue;
                }
                if seen.insert(tool.name.clone()) {
                    tools.push(tool);
                }
            }
        }

        tools.sort_by(|a, b| a.name.cmp(&b.name));
        tools
    }

    fn load_file(path: &Path) -> anyhow::Result<Vec<StaticTool>> {
        let text = std::fs::read_to_string(path)?;
        let parsed: ToolFile = match path.extension().and_then(|s| s.to_str()) {
            Some("json") => serde_json::from_str(&text)?,
            _ => serde_yaml::from_str(&text)?,
        };
        Ok(match parsed {
            ToolFile::Many(tools) => tools,
            ToolFile::One(tool) => vec![tool],
        })
    }
}
