use serde::Serialize;
use serde_json::Value as JsonValue;
use strum_macros::Display;
use toml::Value as TomlValue;

use crate::workspace::FileSystem;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ManifestKind {
    Npm,
    Cargo,
    Python,
    Go,
}

/// The dependency declarations of a project, whatever its ecosystem
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Manifest {
    pub kind: ManifestKind,
    pub file: String,
    pub name: Option<String>,
    pub dependencies: Vec<String>,
    pub dev_dependencies: Vec<String>,
    /// Declares a multi-package workspace
    pub workspace: bool,
}

/// Manifests probed in order; the first one found wins
const MANIFEST_FILES: &[&str] = &[
    "package.json",
    "Cargo.toml",
    "pyproject.toml",
    "requirements.txt",
    "go.mod",
];

/// Strip version specifiers and extras from a python requirement
fn requirement_name(requirement: &str) -> Option<String> {
    let name: String = requirement
        .trim()
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        .collect();
    if name.is_empty() {
        None
    } else {
        Some(name.to_lowercase())
    }
}

fn json_keys(value: Option<&JsonValue>) -> Vec<String> {
    value
        .and_then(JsonValue::as_object)
        .map(|map| map.keys().cloned().collect())
        .unwrap_or_default()
}

fn toml_keys(value: Option<&TomlValue>) -> Vec<String> {
    value
        .and_then(TomlValue::as_table)
        .map(|table| table.keys().cloned().collect())
        .unwrap_or_default()
}

impl Manifest {
    /// Find and parse the project manifest at the root of the working tree
    pub async fn load(fs: &dyn FileSystem) -> Option<Manifest> {
        for file in MANIFEST_FILES {
            let Ok(content) = fs.read(file).await else {
                continue;
            };
            let parsed = Self::parse(file, &content);
            if parsed.is_none() {
                tracing::warn!(file, "could not parse manifest");
            }
            return parsed;
        }
        None
    }

    pub fn parse(file: &str, content: &str) -> Option<Manifest> {
        match file {
            "package.json" => Self::parse_package_json(content),
            "Cargo.toml" => Self::parse_cargo_toml(content),
            "pyproject.toml" => Self::parse_pyproject(content),
            "requirements.txt" => Some(Self::parse_requirements(content)),
            "go.mod" => Some(Self::parse_go_mod(content)),
            _ => None,
        }
    }

    pub fn parse_package_json(content: &str) -> Option<Manifest> {
        let json: JsonValue = serde_json::from_str(content).ok()?;
        Some(Manifest {
            kind: ManifestKind::Npm,
            file: "package.json".to_string(),
            name: json.get("name").and_then(JsonValue::as_str).map(String::from),
            dependencies: json_keys(json.get("dependencies")),
            dev_dependencies: json_keys(json.get("devDependencies")),
            workspace: json.get("workspaces").is_some(),
        })
    }

    pub fn parse_cargo_toml(content: &str) -> Option<Manifest> {
        let toml: TomlValue = content.parse().ok()?;
        let workspace = toml.get("workspace");
        let mut dependencies = toml_keys(toml.get("dependencies"));
        dependencies.extend(toml_keys(workspace.and_then(|w| w.get("dependencies"))));
        Some(Manifest {
            kind: ManifestKind::Cargo,
            file: "Cargo.toml".to_string(),
            name: toml
                .get("package")
                .and_then(|p| p.get("name"))
                .and_then(TomlValue::as_str)
                .map(String::from),
            dependencies,
            dev_dependencies: toml_keys(toml.get("dev-dependencies")),
            workspace: workspace.is_some(),
        })
    }

    pub fn parse_pyproject(content: &str) -> Option<Manifest> {
        let toml: TomlValue = content.parse().ok()?;
        let project = toml.get("project");
        let mut dependencies: Vec<String> = project
            .and_then(|p| p.get("dependencies"))
            .and_then(TomlValue::as_array)
            .map(|deps| {
                deps.iter()
                    .filter_map(TomlValue::as_str)
                    .filter_map(requirement_name)
                    .collect()
            })
            .unwrap_or_default();

        let poetry = toml.get("tool").and_then(|t| t.get("poetry"));
        dependencies.extend(
            toml_keys(poetry.and_then(|p| p.get("dependencies")))
                .into_iter()
                .filter(|name| name != "python"),
        );

        Some(Manifest {
            kind: ManifestKind::Python,
            file: "pyproject.toml".to_string(),
            name: project
                .and_then(|p| p.get("name"))
                .and_then(TomlValue::as_str)
                .map(String::from),
            dependencies,
            dev_dependencies: toml_keys(poetry.and_then(|p| p.get("dev-dependencies"))),
            workspace: false,
        })
    }

    pub fn parse_requirements(content: &str) -> Manifest {
        Manifest {
            kind: ManifestKind::Python,
            file: "requirements.txt".to_string(),
            name: None,
            dependencies: content
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty() && !line.starts_with('#') && !line.starts_with('-'))
                .filter_map(requirement_name)
                .collect(),
            dev_dependencies: Vec::new(),
            workspace: false,
        }
    }

    pub fn parse_go_mod(content: &str) -> Manifest {
        let mut name = None;
        let mut dependencies = Vec::new();
        let mut in_require = false;
        for line in content.lines().map(str::trim) {
            if let Some(module) = line.strip_prefix("module ") {
                name = Some(module.trim().to_string());
            } else if line.starts_with("require (") {
                in_require = true;
            } else if in_require && line == ")" {
                in_require = false;
            } else if let Some(single) = line.strip_prefix("require ") {
                if let Some(dep) = single.split_whitespace().next() {
                    dependencies.push(dep.to_string());
                }
            } else if in_require {
                if let Some(dep) = line.split_whitespace().next().filter(|d| !d.starts_with("//")) {
                    dependencies.push(dep.to_string());
                }
            }
        }
        Manifest {
            kind: ManifestKind::Go,
            file: "go.mod".to_string(),
            name,
            dependencies,
            dev_dependencies: Vec::new(),
            workspace: false,
        }
    }

    pub fn all_dependencies(&self) -> impl Iterator<Item = &str> {
        self.dependencies
            .iter()
            .chain(self.dev_dependencies.iter())
            .map(String::as_str)
    }

    pub fn has_dependency(&self, name: &str) -> bool {
        self.all_dependencies().any(|dep| dep == name)
    }

    /// A coarse label for the kind of project the manifest describes
    pub fn project_type(&self) -> &'static str {
        let checks: &[(&str, &str)] = match self.kind {
            ManifestKind::Npm => &[
                ("next", "nextjs"),
                ("@angular/core", "angular"),
                ("react", "react"),
                ("vue", "vue"),
                ("svelte", "svelte"),
                ("@nestjs/core", "nestjs"),
                ("express", "express"),
            ],
            ManifestKind::Python => &[("django", "django"), ("flask", "flask"), ("fastapi", "fastapi")],
            ManifestKind::Cargo | ManifestKind::Go => &[],
        };
        for (dependency, label) in checks {
            if self.has_dependency(dependency) {
                return *label;
            }
        }
        match self.kind {
            ManifestKind::Npm => "node",
            ManifestKind::Cargo => "rust",
            ManifestKind::Python => "python",
            ManifestKind::Go => "go",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    #[test]
    fn test_package_json() {
        let manifest = Manifest::parse_package_json(
            r#"{"name": "web", "dependencies": {"react": "^18"}, "devDependencies": {"jest": "^29"}, "workspaces": ["packages/*"]}"#,
        )
        .unwrap();
        assert_eq!(manifest.name.as_deref(), Some("web"));
        assert_eq!(manifest.dependencies, vec!["react"]);
        assert_eq!(manifest.dev_dependencies, vec!["jest"]);
        assert!(manifest.workspace);
        assert_eq!(manifest.project_type(), "react");
    }

    #[test]
    fn test_cargo_toml() {
        let manifest = Manifest::parse_cargo_toml(indoc! {r#"
            [package]
            name = "demo"

            [dependencies]
            axum = "0.7"
            tokio = { version = "1", features = ["full"] }

            [dev-dependencies]
            mockall = "0.11"
        "#})
        .unwrap();
        assert_eq!(manifest.name.as_deref(), Some("demo"));
        assert!(manifest.has_dependency("axum"));
        assert!(manifest.has_dependency("mockall"));
        assert!(!manifest.workspace);
        assert_eq!(manifest.project_type(), "rust");
    }

    #[test]
    fn test_requirements_and_pyproject() {
        let manifest = Manifest::parse_requirements("# web\nDjango>=4.2\nrequests[socks]==2.0\n-r dev.txt\n");
        assert_eq!(manifest.dependencies, vec!["django", "requests"]);
        assert_eq!(manifest.project_type(), "django");

        let manifest = Manifest::parse_pyproject(indoc! {r#"
            [project]
            name = "api"
            dependencies = ["fastapi>=0.110", "uvicorn"]
        "#})
        .unwrap();
        assert_eq!(manifest.dependencies, vec!["fastapi", "uvicorn"]);
        assert_eq!(manifest.project_type(), "fastapi");
    }

    #[test]
    fn test_go_mod() {
        let manifest = Manifest::parse_go_mod(indoc! {"
            module example.com/svc

            go 1.22

            require (
                github.com/gin-gonic/gin v1.9.1
                golang.org/x/sync v0.6.0 // indirect
            )
        "});
        assert_eq!(manifest.name.as_deref(), Some("example.com/svc"));
        assert_eq!(
            manifest.dependencies,
            vec!["github.com/gin-gonic/gin", "golang.org/x/sync"]
        );
        assert_eq!(manifest.project_type(), "go");
    }

    #[test]
    fn test_invalid_json_is_none() {
        assert!(Manifest::parse("package.json", "{not json").is_none());
    }
}
