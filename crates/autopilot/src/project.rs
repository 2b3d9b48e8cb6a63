//! A heuristic picture of the working tree: how it is laid out, what it is
//! written in and with, and which conventions it follows. Computed once and
//! cached until explicitly invalidated.
pub mod manifest;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;
use strum_macros::Display;
use tokio::sync::Mutex;

use crate::errors::AgentResult;
use crate::workspace::FileSystem;
pub use manifest::{Manifest, ManifestKind};

/// Upper bound on files considered when classifying the tree
pub const MAX_ANALYZED_FILES: usize = 2_000;
const MAX_KEY_FILES: usize = 10;

lazy_static! {
    static ref PASCAL_CASE: Regex = Regex::new(r"^[A-Z][a-z0-9]+(?:[A-Z][a-z0-9]*)+$|^[A-Z][a-z0-9]+$").unwrap();
    static ref CAMEL_CASE: Regex = Regex::new(r"^[a-z][a-z0-9]*(?:[A-Z][a-z0-9]*)+$").unwrap();
    static ref KEBAB_CASE: Regex = Regex::new(r"^[a-z0-9]+(?:-[a-z0-9]+)+$").unwrap();
    static ref SNAKE_CASE: Regex = Regex::new(r"^[a-z0-9]+(?:_[a-z0-9]+)+$").unwrap();
    static ref HOOK_FILE: Regex = Regex::new(r"^use[A-Z]").unwrap();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum Architecture {
    Monorepo,
    Microservices,
    Layered,
    FeatureBased,
    Standard,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Conventions {
    pub naming: String,
    pub structure: String,
    pub testing: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KeyFiles {
    pub config: Vec<String>,
    pub entry_points: Vec<String>,
    pub tests: Vec<String>,
    pub docs: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DependencyGroups {
    pub ui: Vec<String>,
    pub backend: Vec<String>,
    pub testing: Vec<String>,
    pub build: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectUnderstanding {
    pub architecture: Architecture,
    pub framework: String,
    pub language: String,
    pub patterns: Vec<String>,
    pub conventions: Conventions,
    pub key_files: KeyFiles,
    pub dependencies: DependencyGroups,
    pub file_count: usize,
}

/// Map a file extension to the language it is written in
pub fn language_for_extension(extension: &str) -> Option<&'static str> {
    let language = match extension.to_ascii_lowercase().as_str() {
        "ts" | "tsx" | "mts" | "cts" => "TypeScript",
        "js" | "jsx" | "mjs" | "cjs" => "JavaScript",
        "rs" => "Rust",
        "py" => "Python",
        "go" => "Go",
        "java" => "Java",
        "kt" | "kts" => "Kotlin",
        "rb" => "Ruby",
        "php" => "PHP",
        "cs" => "C#",
        "cpp" | "cc" | "cxx" | "hpp" => "C++",
        "c" | "h" => "C",
        "swift" => "Swift",
        "vue" => "Vue",
        "svelte" => "Svelte",
        _ => return None,
    };
    Some(language)
}

fn extension(path: &str) -> Option<&str> {
    Path::new(path).extension().and_then(|e| e.to_str())
}

fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

fn stem(path: &str) -> &str {
    let name = file_name(path);
    name.split('.').next().unwrap_or(name)
}

fn directories(path: &str) -> impl Iterator<Item = &str> {
    let mut parts: Vec<&str> = path.split('/').collect();
    parts.pop();
    parts.into_iter()
}

pub fn is_test_file(path: &str) -> bool {
    let name = file_name(path).to_ascii_lowercase();
    name.contains(".test.")
        || name.contains(".spec.")
        || name.contains("_test.")
        || name.starts_with("test_")
        || directories(path).any(|d| matches!(d, "tests" | "test" | "__tests__" | "spec"))
}

const FRAMEWORKS: &[(&str, &str)] = &[
    ("next", "Next.js"),
    ("nuxt", "Nuxt"),
    ("@angular/core", "Angular"),
    ("react", "React"),
    ("vue", "Vue"),
    ("svelte", "Svelte"),
    ("@nestjs/core", "NestJS"),
    ("express", "Express"),
    ("fastify", "Fastify"),
    ("koa", "Koa"),
    ("django", "Django"),
    ("flask", "Flask"),
    ("fastapi", "FastAPI"),
    ("axum", "Axum"),
    ("actix-web", "Actix Web"),
    ("rocket", "Rocket"),
    ("github.com/gin-gonic/gin", "Gin"),
];

/// Checked in order; a dependency lands in the first group it matches
const DEPENDENCY_GROUPS: &[(&str, &[&str])] = &[
    (
        "testing",
        &[
            "jest", "mocha", "vitest", "cypress", "playwright", "@testing-library", "pytest",
            "chai", "sinon", "mockall", "proptest", "criterion", "wiremock",
        ],
    ),
    (
        "build",
        &[
            "webpack", "vite", "rollup", "esbuild", "babel", "typescript", "eslint", "prettier",
            "parcel", "turbo", "swc", "tsup",
        ],
    ),
    (
        "ui",
        &[
            "react", "vue", "angular", "svelte", "next", "nuxt", "tailwind", "styled-components",
            "@mui", "antd", "bootstrap", "chakra", "yew", "leptos", "dioxus",
        ],
    ),
    (
        "backend",
        &[
            "express", "koa", "fastify", "nestjs", "django", "flask", "fastapi", "axum", "actix",
            "rocket", "hyper", "prisma", "mongoose", "sequelize", "typeorm", "pg", "mysql",
            "redis", "sqlx", "diesel", "tokio", "graphql", "gin",
        ],
    ),
];

const PATTERNS: &[(&str, &[&str])] = &[
    ("hooks", &["hooks"]),
    ("context", &["context"]),
    ("state-store", &["store", "redux", "zustand", "slice"]),
    ("middleware", &["middleware"]),
    ("decorators", &["decorator"]),
    ("factories", &["factory"]),
    ("adapters", &["adapter"]),
];

const CONFIG_FILES: &[&str] = &[
    "package.json",
    "tsconfig.json",
    "Cargo.toml",
    "pyproject.toml",
    "requirements.txt",
    "go.mod",
    "vite.config",
    "webpack.config",
    "jest.config",
    "babel.config",
    ".eslintrc",
    "Dockerfile",
    "docker-compose",
    "Makefile",
];

impl ProjectUnderstanding {
    /// Classify a tree from its file paths (relative, `/` separated) and manifest
    pub fn analyze(files: &[String], manifest: Option<&Manifest>) -> Self {
        let files: Vec<&str> = files
            .iter()
            .take(MAX_ANALYZED_FILES)
            .map(String::as_str)
            .collect();
        let dirs: BTreeSet<String> = files
            .iter()
            .flat_map(|f| directories(f))
            .map(str::to_lowercase)
            .collect();

        Self {
            architecture: detect_architecture(&files, &dirs, manifest),
            framework: detect_framework(manifest),
            language: detect_language(&files, manifest),
            patterns: detect_patterns(&files),
            conventions: Conventions {
                naming: detect_naming(&files),
                structure: detect_structure(&files),
                testing: detect_testing(&files),
            },
            key_files: collect_key_files(&files),
            dependencies: group_dependencies(manifest),
            file_count: files.len(),
        }
    }

    /// A short description meant for the model's context
    pub fn summary(&self) -> String {
        fn join(items: &[String]) -> String {
            if items.is_empty() {
                "none".to_string()
            } else {
                items.join(", ")
            }
        }

        let mut lines = vec![
            "Project overview:".to_string(),
            format!("- Architecture: {}", self.architecture),
            format!("- Language: {}", self.language),
            format!("- Framework: {}", self.framework),
            format!("- Patterns: {}", join(&self.patterns)),
            format!(
                "- Conventions: naming {}; structure {}; testing {}",
                self.conventions.naming, self.conventions.structure, self.conventions.testing
            ),
            format!(
                "- Key files: config: {}; entry points: {}",
                join(&self.key_files.config),
                join(&self.key_files.entry_points)
            ),
        ];
        let deps = &self.dependencies;
        lines.push(format!(
            "- Dependencies: ui: {}; backend: {}; testing: {}; build: {}",
            join(&deps.ui),
            join(&deps.backend),
            join(&deps.testing),
            join(&deps.build)
        ));
        lines.push(format!("- Files analyzed: {}", self.file_count));
        lines.join("\n")
    }
}

fn detect_architecture(files: &[&str], dirs: &BTreeSet<String>, manifest: Option<&Manifest>) -> Architecture {
    let nested_manifests = files
        .iter()
        .filter(|f| f.contains('/'))
        .filter(|f| matches!(file_name(f), "package.json" | "Cargo.toml" | "go.mod" | "pyproject.toml"))
        .filter(|f| f.starts_with("packages/") || f.starts_with("apps/") || f.starts_with("crates/"))
        .count();
    let workspace_files = files
        .iter()
        .any(|f| matches!(*f, "pnpm-workspace.yaml" | "lerna.json" | "nx.json" | "turbo.json"));
    if manifest.map(|m| m.workspace).unwrap_or(false) || workspace_files || nested_manifests >= 2 {
        return Architecture::Monorepo;
    }

    let services: BTreeSet<&str> = files
        .iter()
        .filter_map(|f| f.strip_prefix("services/"))
        .filter_map(|rest| rest.split_once('/').map(|(service, _)| service))
        .collect();
    let dockerfiles = files.iter().filter(|f| file_name(f) == "Dockerfile").count();
    if services.len() >= 2 || dockerfiles >= 2 {
        return Architecture::Microservices;
    }

    let mvc = ["controllers", "services", "models", "repositories", "routes"]
        .iter()
        .filter(|d| dirs.contains(**d))
        .count();
    let clean = ["domain", "infrastructure", "application"]
        .iter()
        .filter(|d| dirs.contains(**d))
        .count();
    if mvc >= 2 || clean >= 2 {
        return Architecture::Layered;
    }

    if dirs.contains("features") || dirs.contains("modules") {
        return Architecture::FeatureBased;
    }

    Architecture::Standard
}

fn detect_framework(manifest: Option<&Manifest>) -> String {
    manifest
        .and_then(|m| {
            FRAMEWORKS
                .iter()
                .find(|(dependency, _)| m.has_dependency(dependency))
                .map(|(_, label)| label.to_string())
        })
        .unwrap_or_else(|| "none".to_string())
}

fn detect_language(files: &[&str], manifest: Option<&Manifest>) -> String {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for language in files.iter().filter_map(|f| extension(f)).filter_map(language_for_extension) {
        *counts.entry(language).or_default() += 1;
    }
    // Highest count wins, ties broken alphabetically
    let most_common = counts
        .iter()
        .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
        .map(|(language, _)| language.to_string());

    most_common
        .or_else(|| {
            manifest.map(|m| {
                match m.kind {
                    ManifestKind::Npm => "JavaScript",
                    ManifestKind::Cargo => "Rust",
                    ManifestKind::Python => "Python",
                    ManifestKind::Go => "Go",
                }
                .to_string()
            })
        })
        .unwrap_or_else(|| "unknown".to_string())
}

fn detect_patterns(files: &[&str]) -> Vec<String> {
    PATTERNS
        .iter()
        .filter(|(label, needles)| {
            files.iter().any(|f| {
                let lower = f.to_lowercase();
                needles.iter().any(|needle| lower.contains(needle))
                    || (*label == "hooks" && HOOK_FILE.is_match(file_name(f)))
            })
        })
        .map(|(label, _)| label.to_string())
        .collect()
}

fn detect_naming(files: &[&str]) -> String {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for f in files {
        let s = stem(f);
        let style = if KEBAB_CASE.is_match(s) {
            "kebab-case"
        } else if SNAKE_CASE.is_match(s) {
            "snake_case"
        } else if CAMEL_CASE.is_match(s) {
            "camelCase"
        } else if PASCAL_CASE.is_match(s) {
            "PascalCase"
        } else {
            continue;
        };
        *counts.entry(style).or_default() += 1;
    }

    let classified: usize = counts.values().sum();
    match counts.iter().max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0))) {
        Some((style, count)) if count * 2 > classified => style.to_string(),
        Some(_) => "mixed".to_string(),
        None => "undetermined".to_string(),
    }
}

fn detect_structure(files: &[&str]) -> String {
    if files.iter().any(|f| f.starts_with("src/")) {
        "src directory".to_string()
    } else if files.iter().all(|f| !f.contains('/')) {
        "flat".to_string()
    } else {
        "nested".to_string()
    }
}

fn detect_testing(files: &[&str]) -> String {
    let in_test_dir = |f: &&str| directories(f).any(|d| matches!(d, "tests" | "test" | "__tests__" | "spec"));
    let separate = files.iter().any(in_test_dir);
    let colocated = files
        .iter()
        .filter(|f| !in_test_dir(f))
        .any(|f| is_test_file(f));
    match (separate, colocated) {
        (true, true) => "mixed test layout",
        (true, false) => "separate test directory",
        (false, true) => "co-located tests",
        (false, false) => "no tests detected",
    }
    .to_string()
}

fn collect_key_files(files: &[&str]) -> KeyFiles {
    let pick = |predicate: &dyn Fn(&str) -> bool| -> Vec<String> {
        files
            .iter()
            .filter(|f| predicate(**f))
            .take(MAX_KEY_FILES)
            .map(|f| f.to_string())
            .collect()
    };

    KeyFiles {
        config: pick(&|f| {
            let name = file_name(f);
            f.split('/').count() <= 2 && CONFIG_FILES.iter().any(|c| name.starts_with(c))
        }),
        entry_points: pick(&|f| {
            f.split('/').count() <= 2
                && extension(f).and_then(language_for_extension).is_some()
                && matches!(stem(f), "main" | "index" | "app" | "App" | "server" | "lib")
        }),
        tests: pick(&|f| is_test_file(f)),
        docs: pick(&|f| {
            let upper = file_name(f).to_uppercase();
            upper.starts_with("README") || upper.starts_with("CHANGELOG") || upper.starts_with("CONTRIBUTING") || f.starts_with("docs/")
        }),
    }
}

fn group_dependencies(manifest: Option<&Manifest>) -> DependencyGroups {
    let mut groups = DependencyGroups::default();
    let Some(manifest) = manifest else {
        return groups;
    };
    for dependency in manifest.all_dependencies() {
        let lower = dependency.to_lowercase();
        let group = DEPENDENCY_GROUPS
            .iter()
            .find(|(_, needles)| needles.iter().any(|needle| lower.contains(needle)))
            .map(|(group, _)| *group);
        let target = match group {
            Some("testing") => &mut groups.testing,
            Some("build") => &mut groups.build,
            Some("ui") => &mut groups.ui,
            Some("backend") => &mut groups.backend,
            _ => continue,
        };
        target.push(dependency.to_string());
    }
    groups
}

/// Computes the project understanding on first use and hands out the same
/// snapshot until cleared
pub struct ProjectCache {
    fs: Arc<dyn FileSystem>,
    cached: Mutex<Option<Arc<ProjectUnderstanding>>>,
}

impl ProjectCache {
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self {
            fs,
            cached: Mutex::new(None),
        }
    }

    /// The cached snapshot, if one has been computed
    pub async fn cached(&self) -> Option<Arc<ProjectUnderstanding>> {
        self.cached.lock().await.clone()
    }

    /// Return the snapshot, walking the tree if it hasn't been computed yet
    pub async fn get(&self) -> AgentResult<Arc<ProjectUnderstanding>> {
        let mut cached = self.cached.lock().await;
        if let Some(understanding) = cached.as_ref() {
            return Ok(understanding.clone());
        }

        let files = self.fs.list("**/*").await?;
        let manifest = Manifest::load(self.fs.as_ref()).await;
        let understanding = Arc::new(ProjectUnderstanding::analyze(&files, manifest.as_ref()));
        tracing::info!(
            architecture = %understanding.architecture,
            language = %understanding.language,
            framework = %understanding.framework,
            files = understanding.file_count,
            "analyzed project"
        );
        *cached = Some(understanding.clone());
        Ok(understanding)
    }

    pub async fn clear(&self) {
        *self.cached.lock().await = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workspace::LocalFileSystem;

    fn paths(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn npm(dependencies: &[&str], dev: &[&str]) -> Manifest {
        Manifest {
            kind: ManifestKind::Npm,
            file: "package.json".into(),
            name: Some("app".into()),
            dependencies: paths(dependencies),
            dev_dependencies: paths(dev),
            workspace: false,
        }
    }

    #[test]
    fn test_react_feature_project() {
        let files = paths(&[
            "package.json",
            "tsconfig.json",
            "README.md",
            "src/index.tsx",
            "src/App.tsx",
            "src/features/auth/LoginForm.tsx",
            "src/features/auth/useAuth.ts",
            "src/features/auth/LoginForm.test.tsx",
            "src/context/ThemeContext.tsx",
            "src/store/userSlice.ts",
        ]);
        let manifest = npm(&["react", "react-dom", "express"], &["jest", "vite", "@testing-library/react"]);
        let understanding = ProjectUnderstanding::analyze(&files, Some(&manifest));

        assert_eq!(understanding.architecture, Architecture::FeatureBased);
        assert_eq!(understanding.framework, "React");
        assert_eq!(understanding.language, "TypeScript");
        assert_eq!(understanding.patterns, vec!["hooks", "context", "state-store"]);
        assert_eq!(understanding.conventions.naming, "PascalCase");
        assert_eq!(understanding.conventions.structure, "src directory");
        assert_eq!(understanding.conventions.testing, "co-located tests");
        assert_eq!(understanding.key_files.config, vec!["package.json", "tsconfig.json"]);
        assert_eq!(understanding.key_files.entry_points, vec!["src/index.tsx", "src/App.tsx"]);
        assert_eq!(understanding.key_files.docs, vec!["README.md"]);
        assert_eq!(understanding.dependencies.ui, vec!["react", "react-dom"]);
        assert_eq!(understanding.dependencies.backend, vec!["express"]);
        assert_eq!(understanding.dependencies.testing, vec!["jest", "@testing-library/react"]);
        assert_eq!(understanding.dependencies.build, vec!["vite"]);
    }

    #[test]
    fn test_architecture_labels() {
        let monorepo = paths(&["package.json", "packages/a/package.json", "packages/b/package.json"]);
        assert_eq!(ProjectUnderstanding::analyze(&monorepo, None).architecture, Architecture::Monorepo);

        let services = paths(&["services/users/main.go", "services/billing/main.go"]);
        assert_eq!(ProjectUnderstanding::analyze(&services, None).architecture, Architecture::Microservices);

        let layered = paths(&["app/controllers/user.py", "app/models/user.py", "app/services/user.py"]);
        assert_eq!(ProjectUnderstanding::analyze(&layered, None).architecture, Architecture::Layered);

        let standard = paths(&["main.py", "util.py"]);
        let understanding = ProjectUnderstanding::analyze(&standard, None);
        assert_eq!(understanding.architecture, Architecture::Standard);
        assert_eq!(understanding.conventions.structure, "flat");
        assert_eq!(understanding.conventions.testing, "no tests detected");
        assert_eq!(understanding.framework, "none");
    }

    #[test]
    fn test_empty_tree() {
        let understanding = ProjectUnderstanding::analyze(&[], None);
        assert_eq!(understanding.language, "unknown");
        assert_eq!(understanding.conventions.naming, "undetermined");
        assert!(understanding.patterns.is_empty());
        assert!(understanding.summary().contains("Architecture: standard"));
    }

    #[test]
    fn test_summary_lists_everything() {
        let files = paths(&["src/main.rs", "src/request_handler.rs", "tests/api_test.rs"]);
        let manifest = Manifest::parse_cargo_toml("[package]\nname = \"svc\"\n[dependencies]\naxum = \"0.7\"\n").unwrap();
        let summary = ProjectUnderstanding::analyze(&files, Some(&manifest)).summary();
        assert!(summary.starts_with("Project overview:"));
        assert!(summary.contains("- Language: Rust"));
        assert!(summary.contains("- Framework: Axum"));
        assert!(summary.contains("naming snake_case"));
        assert!(summary.contains("testing separate test directory"));
        assert!(summary.contains("backend: axum"));
    }

    #[tokio::test]
    async fn test_cache_computes_once_until_cleared() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("main.py"), "print('hi')").unwrap();
        let fs = Arc::new(LocalFileSystem::new(dir.path()).unwrap());
        let cache = ProjectCache::new(fs);

        assert!(cache.cached().await.is_none());
        let first = cache.get().await.unwrap();
        assert_eq!(first.file_count, 1);

        std::fs::write(dir.path().join("other.py"), "").unwrap();
        let second = cache.get().await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        cache.clear().await;
        assert!(cache.cached().await.is_none());
        assert_eq!(cache.get().await.unwrap().file_count, 2);
    }
}
