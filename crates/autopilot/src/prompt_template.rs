use serde::Serialize;
use serde_json::json;
use std::fs;
use std::path::PathBuf;
use tera::{Context, Error as TeraError, Tera};

use crate::models::tool::{Tool, ToolCall};
use crate::protocol::{encode, FENCE_TAG};
use crate::systems::ToolCatalog;

/// Get the path to the prompts directory
fn prompts_dir() -> PathBuf {
    let manifest_dir = env!("CARGO_MANIFEST_DIR");
    PathBuf::from(manifest_dir).join("src").join("prompts")
}

pub fn load_prompt<T: Serialize>(template: &str, context_data: &T) -> Result<String, TeraError> {
    let mut tera = Tera::default();
    tera.add_raw_template("inline_template", template)?;
    let context = Context::from_serialize(context_data)?;
    let rendered = tera.render("inline_template", &context)?;
    Ok(rendered)
}

pub fn load_prompt_file<T: Serialize>(
    template_file: impl Into<PathBuf>,
    context_data: &T,
) -> Result<String, TeraError> {
    let template_path = template_file.into();
    // if the template_file doesn't exist, try to load it from the prompts directory
    let file_path = if !template_path.exists() {
        prompts_dir().join(template_path)
    } else {
        template_path
    };

    let template_content = fs::read_to_string(file_path)
        .map_err(|e| TeraError::chain("Failed to read template file", e))?;
    load_prompt(&template_content, context_data)
}

#[derive(Clone, Debug, Serialize)]
struct SystemInfo {
    name: String,
    description: String,
    instructions: String,
}

#[derive(Debug, Serialize)]
struct SystemPromptContext {
    systems: Vec<SystemInfo>,
    tools: Vec<Tool>,
    fence_tag: &'static str,
    example: String,
}

/// Render `system.md` for every system and tool in the catalog
pub fn system_prompt(catalog: &ToolCatalog) -> Result<String, TeraError> {
    let context = SystemPromptContext {
        systems: catalog
            .systems()
            .map(|system| SystemInfo {
                name: system.name().to_string(),
                description: system.description().to_string(),
                instructions: system.instructions().to_string(),
            })
            .collect(),
        tools: catalog.tools(),
        fence_tag: FENCE_TAG,
        example: encode(&[
            ToolCall::new("call_1", "list_files", json!({"pattern": "src/**/*.rs"})),
            ToolCall::new("call_2", "read_file", json!({"path": "Cargo.toml"})),
        ]),
    };
    load_prompt_file("system.md", &context)
}
