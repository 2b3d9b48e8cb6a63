//! Systems group the tools the agent can invoke. Each system declares its
//! tools with a JSON schema and executes calls against the workspace
//! collaborators; the catalog indexes every tool by its unique name.
mod analysis;
mod catalog;
mod files;
mod git;
mod packages;
pub mod schema;
mod shell;
mod system;
mod testing;

pub use analysis::{analyze_source, extract_imports, AnalysisSystem, CodeMetrics};
pub use catalog::ToolCatalog;
pub use files::FileSystemTools;
pub use git::{parse_status, GitStatus, GitSystem};
pub use packages::{PackageManager, PackageSystem};
pub use shell::{check_command, ShellSystem};
pub use system::System;
pub use testing::TestingSystem;
