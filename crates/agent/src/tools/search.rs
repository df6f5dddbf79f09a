//! Code search across the project tree

use async_trait::async_trait;
use regex::Regex;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

use super::filesystem::IGNORED_DIRS;
use super::path_utils::display_relative;
use super::{Param, ParamKind, ToolArgs, ToolContext, ToolError, ToolOutput, ToolTrait};

/// Most matches reported for one search
pub const MAX_MATCHES: usize = 50;

/// Files larger than this are skipped
const MAX_FILE_BYTES: u64 = 2 * 1024 * 1024;

/// One matching line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchMatch {
    pub path: String,
    pub line: usize,
    pub text: String,
}

impl std::fmt::Display for SearchMatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.path, self.line, self.text)
    }
}

/// Lazily walks `start` in file-name order, yielding matches one file at a time
pub struct SearchMatches {
    files: walkdir::IntoIter,
    regex: Regex,
    include: Option<glob::Pattern>,
    root: PathBuf,
    buffered: std::vec::IntoIter<SearchMatch>,
}

impl SearchMatches {
    pub fn new(start: &Path, root: &Path, regex: Regex, include: Option<glob::Pattern>) -> Self {
        let files = WalkDir::new(start)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter();
        Self {
            files,
            regex,
            include,
            root: root.to_path_buf(),
            buffered: Vec::new().into_iter(),
        }
    }

    fn scan_file(&self, path: &Path) -> Vec<SearchMatch> {
        let bytes = match std::fs::read(path) {
            Ok(b) => b,
            Err(_) => return Vec::new(),
        };
        // binary
        if bytes.contains(&0) {
            return Vec::new();
        }
        let content = String::from_utf8_lossy(&bytes);
        let rel = display_relative(path, &self.root);
        content
            .lines()
            .enumerate()
            .filter(|(_, line)| self.regex.is_match(line))
            .map(|(i, line)| SearchMatch {
                path: rel.clone(),
                line: i + 1,
                text: line.trim().to_string(),
            })
            .collect()
    }
}

impl Iterator for SearchMatches {
    type Item = SearchMatch;

    fn next(&mut self) -> Option<SearchMatch> {
        loop {
            if let Some(found) = self.buffered.next() {
                return Some(found);
            }

            let entry = match self.files.next()? {
                Ok(entry) => entry,
                Err(_) => continue,
            };

            if entry.file_type().is_dir() {
                let name = entry.file_name().to_string_lossy();
                if entry.depth() > 0 && IGNORED_DIRS.contains(&&*name) {
                    self.files.skip_current_dir();
                }
                continue;
            }
            if !entry.file_type().is_file() {
                continue;
            }
            if let Some(ref pattern) = self.include {
                let name = entry.file_name().to_string_lossy();
                if !pattern.matches(&name) {
                    continue;
                }
            }
            if entry.metadata().map(|m| m.len() > MAX_FILE_BYTES).unwrap_or(true) {
                continue;
            }

            self.buffered = self.scan_file(entry.path()).into_iter();
        }
    }
}

/// Compile `pattern`, falling back to a literal match when it is not a valid regex
pub fn compile_pattern(pattern: &str) -> Result<Regex, ToolError> {
    match Regex::new(pattern) {
        Ok(regex) => Ok(regex),
        Err(e) => {
            debug!("pattern {:?} is not a regex ({}), searching literally", pattern, e);
            Regex::new(&regex::escape(pattern))
                .map_err(|e| ToolError::Validation(format!("invalid pattern: {e}")))
        }
    }
}

pub struct SearchCodeTool;

#[async_trait]
impl ToolTrait for SearchCodeTool {
    fn name(&self) -> &str {
        "search_code"
    }

    fn description(&self) -> &str {
        "Search project files for a regex pattern. Returns file:line:text for each match."
    }

    fn params(&self) -> &[Param] {
        const PARAMS: &[Param] = &[
            Param::required("pattern", ParamKind::String, "Search pattern (regex supported)"),
            Param::optional("path", ParamKind::Path, "Directory or file to search (default: '.')"),
            Param::optional("include", ParamKind::String, "File name glob, e.g. '*.rs'"),
        ];
        PARAMS
    }

    async fn execute(&self, args: &ToolArgs, ctx: &ToolContext) -> Result<ToolOutput, ToolError> {
        let pattern = args.required_str("pattern")?.to_string();
        if pattern.is_empty() {
            return Err(ToolError::Validation("pattern must not be empty".to_string()));
        }
        let regex = compile_pattern(&pattern)?;
        let include = args
            .str("include")
            .map(|g| {
                glob::Pattern::new(g)
                    .map_err(|e| ToolError::Validation(format!("invalid include glob: {e}")))
            })
            .transpose()?;
        let start = args
            .path("path")
            .map(Path::to_path_buf)
            .unwrap_or_else(|| ctx.root.clone());

        if !start.exists() {
            return Err(ToolError::NotFound(format!(
                "path {}",
                display_relative(&start, &ctx.root)
            )));
        }
        debug!("◆ searching {:?} under {}", pattern, start.display());

        let root = ctx.root.clone();
        let found = tokio::task::spawn_blocking(move || {
            SearchMatches::new(&start, &root, regex, include)
                .take(MAX_MATCHES + 1)
                .collect::<Vec<_>>()
        })
        .await
        .map_err(|e| {
            warn!("search task failed: {}", e);
            ToolError::Execution(format!("search failed: {e}"))
        })?;

        if found.is_empty() {
            return Ok(ToolOutput::ok(format!("No matches found for '{pattern}'")));
        }

        let truncated = found.len() > MAX_MATCHES;
        let mut lines: Vec<String> = found
            .iter()
            .take(MAX_MATCHES)
            .map(ToString::to_string)
            .collect();
        if truncated {
            lines.push(format!("[results truncated at {MAX_MATCHES} matches]"));
        }
        Ok(ToolOutput::ok(lines.join("\n")))
    }
}
