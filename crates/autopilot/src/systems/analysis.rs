use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use super::schema::required_str;
use super::System;
use crate::errors::{AgentError, AgentResult};
use crate::models::tool::{Tool, ToolCall};
use crate::project::{is_test_file, language_for_extension, Manifest};
use crate::workspace::FileSystem;

const MAX_LINE_LENGTH: usize = 120;
const LARGE_FILE_LINES: usize = 500;
const HIGH_COMPLEXITY: usize = 20;
const MAX_REFERENCE_SCAN: usize = 200;

lazy_static! {
    static ref BRANCH: Regex = Regex::new(r"\b(if|elif|for|while|switch|case)\b").unwrap();
    static ref FUNCTION: Regex = Regex::new(
        r"(?m)\bfunction\s+\w+|\bdef\s+\w+|\bfn\s+\w+|\bfunc\s+\w+|(?:const|let|var)\s+\w+\s*=\s*(?:async\s*)?(?:\([^)]*\)|\w+)\s*=>"
    )
    .unwrap();
    static ref CLASS: Regex = Regex::new(r"\b(?:class|struct|interface|trait)\s+[A-Za-z_]\w*").unwrap();
    static ref IMPORT: Regex = Regex::new(
        r#"(?m)^\s*import\s+(?:[^'"]*?\s+from\s+)?['"]([^'"]+)['"]|require\(\s*['"]([^'"]+)['"]\s*\)|^\s*from\s+([\w.]+)\s+import\b|^\s*import\s+([\w.]+)\s*$|^\s*use\s+([\w:]+)"#
    )
    .unwrap();
    static ref EXPORT: Regex = Regex::new(r"(?m)^\s*(?:export\s|module\.exports|exports\.|pub\s)").unwrap();
    static ref DEBUG_PRINT: Regex = Regex::new(r"\bconsole\.(?:log|debug)\(|\bprint\(|\bprintln!\(|\bdbg!\(").unwrap();
    static ref ANY_TYPE: Regex = Regex::new(r":\s*any\b|\bas\s+any\b").unwrap();
    static ref EMPTY_CATCH: Regex = Regex::new(r"catch\s*(?:\([^)]*\))?\s*\{\s*\}").unwrap();
    static ref AWAIT: Regex = Regex::new(r"\bawait\b").unwrap();
    static ref TRY: Regex = Regex::new(r"\btry\b").unwrap();
    static ref TODO: Regex = Regex::new(r"\b(?:TODO|FIXME)\b").unwrap();
}

/// Static measurements of a single source file
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CodeMetrics {
    pub lines: usize,
    pub functions: usize,
    pub classes: usize,
    pub imports: usize,
    pub exports: usize,
    pub complexity: usize,
    pub issues: Vec<String>,
}

/// Module specifiers imported by `content`, in document order
pub fn extract_imports(content: &str) -> Vec<String> {
    IMPORT
        .captures_iter(content)
        .filter_map(|caps| caps.iter().skip(1).flatten().next().map(|m| m.as_str().to_string()))
        .collect()
}

/// Measure a file's content with line-oriented heuristics
pub fn analyze_source(content: &str) -> CodeMetrics {
    let lines = content.lines().count();
    let complexity =
        BRANCH.find_iter(content).count() + content.matches("&&").count() + content.matches("||").count() + 1;

    let mut issues = Vec::new();
    let debug_prints = DEBUG_PRINT.find_iter(content).count();
    if debug_prints > 0 {
        issues.push(format!("{} debug print statement(s)", debug_prints));
    }
    if ANY_TYPE.is_match(content) {
        issues.push("uses the 'any' type".to_string());
    }
    if EMPTY_CATCH.is_match(content) {
        issues.push("empty catch block".to_string());
    }
    if AWAIT.is_match(content) && !TRY.is_match(content) {
        issues.push("await without error handling".to_string());
    }
    let long_lines = content.lines().filter(|l| l.chars().count() > MAX_LINE_LENGTH).count();
    if long_lines > 0 {
        issues.push(format!("{} line(s) longer than {} characters", long_lines, MAX_LINE_LENGTH));
    }
    let todos = TODO.find_iter(content).count();
    if todos > 0 {
        issues.push(format!("{} TODO/FIXME comment(s)", todos));
    }
    if lines > LARGE_FILE_LINES {
        issues.push(format!("large file ({} lines)", lines));
    }
    if complexity > HIGH_COMPLEXITY {
        issues.push(format!("high cyclomatic complexity ({})", complexity));
    }

    CodeMetrics {
        lines,
        functions: FUNCTION.find_iter(content).count(),
        classes: CLASS.find_iter(content).count(),
        imports: extract_imports(content).len(),
        exports: EXPORT.find_iter(content).count(),
        complexity,
        issues,
    }
}

fn file_stem(path: &str) -> &str {
    let name = path.rsplit('/').next().unwrap_or(path);
    name.split('.').next().unwrap_or(name)
}

/// The module name an import specifier most likely refers to
fn import_stem(import: &str) -> &str {
    match import.rfind('/') {
        Some(i) => file_stem(&import[i + 1..]),
        None => import.rsplit(|c: char| c == ':' || c == '.').next().unwrap_or(import),
    }
}

/// Project-level and file-level code analysis
pub struct AnalysisSystem {
    tools: Vec<Tool>,
    fs: Arc<dyn FileSystem>,
}

impl AnalysisSystem {
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        let analyze_project = Tool::new(
            "analyze_project",
            "Summarize the project: its type, manifest and how many files of each kind it has.",
            json!({"type": "object", "properties": {}}),
        );

        let analyze_code = Tool::new(
            "analyze_code",
            "Measure a source file: lines, functions, classes, imports, exports, cyclomatic complexity and likely issues.",
            json!({
                "type": "object",
                "required": ["path"],
                "properties": {
                    "path": {"type": "string", "description": "File to analyze."}
                }
            }),
        );

        let find_dependencies = Tool::new(
            "find_dependencies",
            "List the modules a file imports and the files that appear to import it.",
            json!({
                "type": "object",
                "required": ["path"],
                "properties": {
                    "path": {"type": "string", "description": "File whose dependencies to find."}
                }
            }),
        );

        Self {
            tools: vec![analyze_project, analyze_code, find_dependencies],
            fs,
        }
    }

    async fn analyze_project(&self) -> AgentResult<Value> {
        let files = self.fs.list("**/*").await?;
        let manifest = Manifest::load(self.fs.as_ref()).await;

        let mut by_extension: BTreeMap<String, usize> = BTreeMap::new();
        let mut by_language: BTreeMap<&str, usize> = BTreeMap::new();
        let mut tests = 0;
        for file in &files {
            if let Some(ext) = Path::new(file).extension().and_then(|e| e.to_str()) {
                *by_extension.entry(ext.to_lowercase()).or_default() += 1;
                if let Some(language) = language_for_extension(ext) {
                    *by_language.entry(language).or_default() += 1;
                }
            }
            if is_test_file(file) {
                tests += 1;
            }
        }

        Ok(json!({
            "project_type": manifest.as_ref().map(Manifest::project_type).unwrap_or("unknown"),
            "manifest": manifest,
            "total_files": files.len(),
            "test_files": tests,
            "files_by_extension": by_extension,
            "files_by_language": by_language,
        }))
    }

    async fn analyze_code(&self, params: Value) -> AgentResult<Value> {
        let path = required_str(&params, "path")?;
        let content = self.fs.read(path).await?;
        let metrics = analyze_source(&content);
        let mut value = serde_json::to_value(metrics).map_err(|e| AgentError::Internal(e.to_string()))?;
        value["path"] = json!(path);
        Ok(value)
    }

    async fn find_dependencies(&self, params: Value) -> AgentResult<Value> {
        let path = required_str(&params, "path")?;
        let content = self.fs.read(path).await?;
        let imports = extract_imports(&content);

        let stem = file_stem(path);
        let mut imported_by = Vec::new();
        if !stem.is_empty() {
            let candidates = self.fs.list("**/*").await?;
            for file in candidates
                .iter()
                .filter(|f| f.as_str() != path && Path::new(f).extension().is_some())
                .take(MAX_REFERENCE_SCAN)
            {
                let Ok(other) = self.fs.read(file).await else {
                    continue;
                };
                if extract_imports(&other)
                    .iter()
                    .any(|import| import_stem(import) == stem)
                {
                    imported_by.push(file.clone());
                }
            }
        }

        Ok(json!({
            "path": path,
            "imports": imports,
            "imported_by": imported_by,
        }))
    }
}

#[async_trait]
impl System for AnalysisSystem {
    fn name(&self) -> &str {
        "analysis"
    }

    fn description(&self) -> &str {
        "Inspect the project and its source files"
    }

    fn instructions(&self) -> &str {
        "Use analyze_project to orient yourself in an unfamiliar tree, and analyze_code \
        or find_dependencies before changing a file other code relies on."
    }

    fn tools(&self) -> &[Tool] {
        &self.tools
    }

    async fn call(&self, tool_call: ToolCall) -> AgentResult<Value> {
        match tool_call.name.as_str() {
            "analyze_project" => self.analyze_project().await,
            "analyze_code" => self.analyze_code(tool_call.parameters).await,
            "find_dependencies" => self.find_dependencies(tool_call.parameters).await,
            _ => Err(AgentError::ToolNotFound(tool_call.name)),
        }
    }
}
