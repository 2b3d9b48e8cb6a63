use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

use super::schema::{optional_bool, optional_str, required_str};
use super::System;
use crate::errors::{AgentError, AgentResult};
use crate::models::tool::{Tool, ToolCall};
use crate::workspace::FileSystem;

pub const MAX_LISTED_FILES: usize = 100;
pub const MAX_SEARCHED_FILES: usize = 500;
pub const MAX_SEARCH_MATCHES: usize = 100;

/// Read, write, list, search and delete files in the working tree
pub struct FileSystemTools {
    tools: Vec<Tool>,
    fs: Arc<dyn FileSystem>,
}

impl FileSystemTools {
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        let read_file = Tool::new(
            "read_file",
            "Read a file from the working directory. Returns its content, size in bytes and line count.",
            json!({
                "type": "object",
                "required": ["path"],
                "properties": {
                    "path": {"type": "string", "description": "Path relative to the working directory."}
                }
            }),
        );

        let write_file = Tool::new(
            "write_file",
            "Create or overwrite a file with the given content. Parent directories are created as needed.",
            json!({
                "type": "object",
                "required": ["path", "content"],
                "properties": {
                    "path": {"type": "string", "description": "Path relative to the working directory."},
                    "content": {"type": "string", "description": "The full content to write."}
                }
            }),
        );

        let list_files = Tool::new(
            "list_files",
            "List files matching a glob pattern such as `src/**/*.ts`. Dependency and build directories are skipped.",
            json!({
                "type": "object",
                "required": ["pattern"],
                "properties": {
                    "pattern": {"type": "string", "description": "Glob pattern relative to the working directory."}
                }
            }),
        );

        let search_files = Tool::new(
            "search_files",
            "Search file contents for a text query and return matching lines.",
            json!({
                "type": "object",
                "required": ["query"],
                "properties": {
                    "query": {"type": "string", "description": "Text to search for."},
                    "pattern": {"type": "string", "default": "**/*", "description": "Glob restricting which files are searched."},
                    "case_sensitive": {"type": "boolean", "default": false, "description": "Match case exactly."}
                }
            }),
        );

        let delete_file = Tool::new(
            "delete_file",
            "Delete a single file from the working directory.",
            json!({
                "type": "object",
                "required": ["path"],
                "properties": {
                    "path": {"type": "string", "description": "Path relative to the working directory."}
                }
            }),
        );

        let get_working_directory = Tool::new(
            "get_working_directory",
            "Return the working directory and its top-level entries.",
            json!({"type": "object", "properties": {}}),
        );

        Self {
            tools: vec![
                read_file,
                write_file,
                list_files,
                search_files,
                delete_file,
                get_working_directory,
            ],
            fs,
        }
    }

    async fn read_file(&self, params: Value) -> AgentResult<Value> {
        let path = required_str(&params, "path")?;
        let content = self.fs.read(path).await?;
        Ok(json!({
            "path": path,
            "size": content.len(),
            "lines": content.lines().count(),
            "content": content,
        }))
    }

    async fn write_file(&self, params: Value) -> AgentResult<Value> {
        let path = required_str(&params, "path")?;
        let content = required_str(&params, "content")?;
        self.fs.write(path, content).await?;
        Ok(json!({
            "path": path,
            "size": content.len(),
            "lines": content.lines().count(),
        }))
    }

    async fn list_files(&self, params: Value) -> AgentResult<Value> {
        let pattern = required_str(&params, "pattern")?;
        let files = self.fs.list(pattern).await?;
        let total = files.len();
        let shown: Vec<String> = files.into_iter().take(MAX_LISTED_FILES).collect();
        Ok(json!({
            "pattern": pattern,
            "files": shown,
            "total": total,
            "truncated": total > MAX_LISTED_FILES,
        }))
    }

    async fn search_files(&self, params: Value) -> AgentResult<Value> {
        let query = required_str(&params, "query")?;
        if query.is_empty() {
            return Err(AgentError::InvalidParameters("'query' must not be empty".into()));
        }
        let pattern = optional_str(&params, "pattern").unwrap_or("**/*");
        let case_sensitive = optional_bool(&params, "case_sensitive").unwrap_or(false);
        let needle = if case_sensitive {
            query.to_string()
        } else {
            query.to_lowercase()
        };

        let files = self.fs.list(pattern).await?;
        let mut matches = Vec::new();
        let mut files_searched = 0;
        let mut truncated = false;

        'files: for file in files.iter().take(MAX_SEARCHED_FILES) {
            // Binary or unreadable files are skipped
            let Ok(content) = self.fs.read(file).await else {
                continue;
            };
            files_searched += 1;
            for (number, line) in content.lines().enumerate() {
                let haystack = if case_sensitive {
                    line.to_string()
                } else {
                    line.to_lowercase()
                };
                if haystack.contains(&needle) {
                    if matches.len() == MAX_SEARCH_MATCHES {
                        truncated = true;
                        break 'files;
                    }
                    matches.push(json!({
                        "file": file,
                        "line": number + 1,
                        "text": line.trim(),
                    }));
                }
            }
        }

        Ok(json!({
            "query": query,
            "matches": matches,
            "files_searched": files_searched,
            "truncated": truncated,
        }))
    }

    async fn delete_file(&self, params: Value) -> AgentResult<Value> {
        let path = required_str(&params, "path")?;
        let trimmed = path.trim();
        if matches!(trimmed, "" | "/" | "." | "./" | "..") {
            return Err(AgentError::InvalidParameters(format!(
                "Refusing to delete '{}'",
                path
            )));
        }
        self.fs.delete(trimmed).await?;
        Ok(json!({ "path": trimmed, "deleted": true }))
    }

    async fn get_working_directory(&self) -> AgentResult<Value> {
        let info = self.fs.directory_info(".").await?;
        Ok(json!({
            "path": self.fs.root().display().to_string(),
            "files": info.files,
            "directories": info.directories,
        }))
    }
}

#[async_trait]
impl System for FileSystemTools {
    fn name(&self) -> &str {
        "files"
    }

    fn description(&self) -> &str {
        "Read, write, list, search and delete files in the working directory"
    }

    fn instructions(&self) -> &str {
        "Paths are relative to the working directory. Read a file before rewriting it, \
        and prefer search_files over reading many files when looking for something."
    }

    fn tools(&self) -> &[Tool] {
        &self.tools
    }

    async fn call(&self, tool_call: ToolCall) -> AgentResult<Value> {
        match tool_call.name.as_str() {
            "read_file" => self.read_file(tool_call.parameters).await,
            "write_file" => self.write_file(tool_call.parameters).await,
            "list_files" => self.list_files(tool_call.parameters).await,
            "search_files" => self.search_files(tool_call.parameters).await,
            "delete_file" => self.delete_file(tool_call.parameters).await,
            "get_working_directory" => self.get_working_directory().await,
            _ => Err(AgentError::ToolNotFound(tool_call.name)),
        }
    }
}
