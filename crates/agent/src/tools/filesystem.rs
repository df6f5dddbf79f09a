//! Filesystem tools: read, list, write, edit

use async_trait::async_trait;
use std::path::Path;
use tracing::debug;

use super::path_utils::display_relative;
use super::{Param, ParamKind, ToolArgs, ToolContext, ToolError, ToolOutput, ToolTrait};

/// Directory names hidden from listings and searches
pub const IGNORED_DIRS: &[&str] = &[".git", "node_modules", "target", "__pycache__", ".venv"];

fn path_arg<'a>(args: &'a ToolArgs, name: &str) -> Result<&'a Path, ToolError> {
    args.path(name)
        .ok_or_else(|| ToolError::Validation(format!("missing required parameter '{name}'")))
}

async fn read_text(path: &Path, rel: &str) -> Result<String, ToolError> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(String::from_utf8_lossy(&bytes).into_owned()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(ToolError::NotFound(format!("file {rel}")))
        }
        Err(e) => Err(e.into()),
    }
}

/// Lines in `content`, counting a final unterminated line
fn count_lines(content: &str) -> usize {
    content.lines().count()
}

pub struct ReadFileTool;

#[async_trait]
impl ToolTrait for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read a file. Returns the content with line numbers."
    }

    fn params(&self) -> &[Param] {
        const PARAMS: &[Param] = &[
            Param::required("path", ParamKind::Path, "File path relative to project root"),
            Param::optional("start_line", ParamKind::Integer, "First line, 1-based"),
            Param::optional("end_line", ParamKind::Integer, "Last line, 1-based, inclusive"),
        ];
        PARAMS
    }

    async fn execute(&self, args: &ToolArgs, ctx: &ToolContext) -> Result<ToolOutput, ToolError> {
        let path = path_arg(args, "path")?;
        let rel = display_relative(path, &ctx.root);
        debug!("◆ reading {}", rel);

        if path.is_dir() {
            return Err(ToolError::Execution(format!("{rel} is a directory, not a file")));
        }
        let content = read_text(path, &rel).await?;
        let lines: Vec<&str> = content.lines().collect();
        let total = lines.len();

        let start = args.int("start_line").unwrap_or(1).max(1) as usize;
        let end = args
            .int("end_line")
            .map(|n| n.max(0) as usize)
            .unwrap_or(total)
            .min(total);

        let mut out = format!("File: {rel} ({total} lines total)");
        if start <= end {
            for (i, line) in lines[start - 1..end].iter().enumerate() {
                out.push_str(&format!("\n{:4} | {}", start + i, line));
            }
        }
        Ok(ToolOutput::ok(out))
    }
}

pub struct ListDirTool;

#[async_trait]
impl ToolTrait for ListDirTool {
    fn name(&self) -> &str {
        "list_dir"
    }

    fn description(&self) -> &str {
        "List a directory. Directories end with '/', files show their size. Use '.' for the project root."
    }

    fn params(&self) -> &[Param] {
        const PARAMS: &[Param] = &[Param::optional(
            "path",
            ParamKind::Path,
            "Directory path relative to project root (default: '.')",
        )];
        PARAMS
    }

    async fn execute(&self, args: &ToolArgs, ctx: &ToolContext) -> Result<ToolOutput, ToolError> {
        let path = args.path("path").unwrap_or(ctx.root.as_path());
        let rel = display_relative(path, &ctx.root);
        debug!("◆ listing {}", rel);

        if !path.exists() {
            return Err(ToolError::NotFound(format!("directory {rel}")));
        }
        if !path.is_dir() {
            return Err(ToolError::Execution(format!("{rel} is not a directory")));
        }

        let mut dirs = Vec::new();
        let mut files = Vec::new();
        let mut entries = tokio::fs::read_dir(path).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            let file_type = entry.file_type().await?;
            if file_type.is_dir() {
                if !IGNORED_DIRS.contains(&name.as_str()) {
                    dirs.push(name);
                }
            } else {
                let size = entry.metadata().await.map(|m| m.len()).unwrap_or(0);
                files.push((name, size));
            }
        }
        dirs.sort_by_key(|n| n.to_lowercase());
        files.sort_by_key(|(n, _)| n.to_lowercase());

        if dirs.is_empty() && files.is_empty() {
            return Ok(ToolOutput::ok(format!("Directory: {rel} (empty)")));
        }

        let prefix = if rel == "." { String::new() } else { format!("{rel}/") };
        let mut out = format!("Directory: {rel}");
        for name in &dirs {
            out.push_str(&format!("\n  {prefix}{name}/"));
        }
        for (name, size) in &files {
            out.push_str(&format!("\n  {prefix}{name}  ({size} bytes)"));
        }
        Ok(ToolOutput::ok(out))
    }
}

pub struct WriteFileTool;

#[async_trait]
impl ToolTrait for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Create or overwrite a file with the given content. Parent directories are created."
    }

    fn params(&self) -> &[Param] {
        const PARAMS: &[Param] = &[
            Param::required("path", ParamKind::Path, "File path relative to project root"),
            Param::required("content", ParamKind::String, "Full file content"),
        ];
        PARAMS
    }

    fn mutates(&self) -> bool {
        true
    }

    async fn execute(&self, args: &ToolArgs, ctx: &ToolContext) -> Result<ToolOutput, ToolError> {
        let path = path_arg(args, "path")?;
        let content = args.required_str("content")?;
        let rel = display_relative(path, &ctx.root);
        debug!("◆ writing {}", rel);

        if path.is_dir() {
            return Err(ToolError::Execution(format!("{rel} is a directory")));
        }
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, content).await?;
        Ok(ToolOutput::ok(format!(
            "OK: wrote {} lines to {}",
            count_lines(content),
            rel
        )))
    }
}

pub struct EditFileTool;

#[async_trait]
impl ToolTrait for EditFileTool {
    fn name(&self) -> &str {
        "edit_file"
    }

    fn description(&self) -> &str {
        "Replace one exact occurrence of old_string in a file. Must match exactly once, including whitespace."
    }

    fn params(&self) -> &[Param] {
        const PARAMS: &[Param] = &[
            Param::required("path", ParamKind::Path, "File path relative to project root"),
            Param::required("old_string", ParamKind::String, "Exact text to replace"),
            Param::required("new_string", ParamKind::String, "Replacement text"),
        ];
        PARAMS
    }

    fn mutates(&self) -> bool {
        true
    }

    async fn execute(&self, args: &ToolArgs, ctx: &ToolContext) -> Result<ToolOutput, ToolError> {
        let path = path_arg(args, "path")?;
        let old = args.required_str("old_string")?;
        let new = args.required_str("new_string")?;
        let rel = display_relative(path, &ctx.root);

        if old.is_empty() {
            return Err(ToolError::Validation(
                "old_string must not be empty".to_string(),
            ));
        }
        debug!("◆ editing {}", rel);

        let content = match tokio::fs::read_to_string(path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ToolError::NotFound(format!("file {rel}")))
            }
            Err(e) => return Err(e.into()),
        };

        match content.matches(old).count() {
            0 => Err(ToolError::NotFound(format!("old_string not found in {rel}"))),
            1 => {
                tokio::fs::write(path, content.replacen(old, new, 1)).await?;
                Ok(ToolOutput::ok(format!("OK: replaced 1 occurrence in {rel}")))
            }
            n => Err(ToolError::NotFound(format!(
                "old_string matches {n} times in {rel}, must be unique; include more context"
            ))),
        }
    }
}
