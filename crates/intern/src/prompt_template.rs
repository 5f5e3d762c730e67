use serde::Serialize;
use tera::{Context, Error as TeraError, Tera};

/// Prompts compiled into the binary, looked up by file name
const PROMPTS: &[(&str, &str)] = &[("agent.md", include_str!("prompts/agent.md"))];

pub fn load_prompt<T: Serialize>(template: &str, context_data: &T) -> Result<String, TeraError> {
    let mut tera = Tera::default();
    tera.add_raw_template("inline_template", template)?;
    let context = Context::from_serialize(context_data)?;
    let rendered = tera.render("inline_template", &context)?;
    Ok(rendered)
}

pub fn load_prompt_file<T: Serialize>(name: &str, context_data: &T) -> Result<String, TeraError> {
    let template = PROMPTS
        .iter()
        .find(|(file, _)| *file == name)
        .map(|(_, template)| *template)
        .ok_or_else(|| TeraError::template_not_found(name))?;
    load_prompt(template, context_data)
}
