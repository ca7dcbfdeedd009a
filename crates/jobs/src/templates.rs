use std::sync::OnceLock;

use anyhow::{Context, Result};
use minijinja::Environment;
use recipe_bot_core::artifacts::ArtifactSet;
use serde::Serialize;

pub const ARTIFACTS_TEMPLATE: &str = "artifacts.md";

fn environment() -> &'static Environment<'static> {
    static ENV: OnceLock<Environment<'static>> = OnceLock::new();
    ENV.get_or_init(|| {
        let mut env = Environment::new();
        env.set_trim_blocks(true);
        env.set_lstrip_blocks(true);
        env.add_template(ARTIFACTS_TEMPLATE, include_str!("../templates/artifacts.md"))
            .expect("Failed to parse artifacts template");
        env
    })
}

pub fn render<S>(template_name: &str, context: S) -> Result<String>
where S: Serialize {
    let template = environment().get_template(template_name).context("Failed to get template")?;
    template.render(context).context("Failed to render template")
}

/// Comment body listing the artifacts of a CI build.
pub fn render_artifacts(artifacts: &ArtifactSet) -> Result<String> {
    render(ARTIFACTS_TEMPLATE, artifacts)
}
