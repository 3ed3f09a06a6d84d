use serde::Serialize;
use tera::{Context, Error as TeraError, Tera};

use crate::developer::Platform;
use crate::registry::ToolRegistry;

const SYSTEM_TEMPLATE: &str = include_str!("prompts/system.md");

pub fn load_prompt<T: Serialize>(template: &str, context_data: &T) -> Result<String, TeraError> {
    let mut tera = Tera::default();
    tera.add_raw_template("inline_template", template)?;
    let context = Context::from_serialize(context_data)?;
    let rendered = tera.render("inline_template", &context)?;
    Ok(rendered)
}

#[derive(Serialize)]
struct SystemInfo<'a> {
    name: &'a str,
    description: &'a str,
    instructions: &'a str,
}

#[derive(Serialize)]
struct SystemPromptContext<'a> {
    platform: &'a str,
    tools: &'a [crate::models::tool::Tool],
    systems: Vec<SystemInfo<'a>>,
}

/// The system instruction sent with every model request
pub fn system_prompt(platform: Platform, registry: &ToolRegistry) -> Result<String, TeraError> {
    let context = SystemPromptContext {
        platform: platform.name(),
        tools: registry.tools(),
        systems: registry
            .systems()
            .map(|system| SystemInfo {
                name: system.name(),
                description: system.description(),
                instructions: system.instructions(),
            })
            .collect(),
    };
    load_prompt(SYSTEM_TEMPLATE, &context)
}
