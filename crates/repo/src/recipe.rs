use std::{path::Path, sync::OnceLock};

use anyhow::{Context, Result, anyhow};
use regex::Regex;

/// A build number change applied to a recipe file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildBump {
    /// Recipe directory, relative to the repository root.
    pub recipe: String,
    pub from: u64,
    pub to: u64,
}

fn build_number_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    // Either a jinja variable (`{% set build = 3 %}`) or the `number:` key of the build section
    REGEX.get_or_init(|| {
        Regex::new(
            r"(?m)(?P<prefix>\{%\s*set\s+build(?:_number|num)?\s*=\s*|^[ \t]+number:[ \t]*)(?P<number>\d+)",
        )
        .unwrap()
    })
}

/// Increment the first build number found in a recipe's text.
pub fn bump_text(text: &str) -> Option<(String, u64)> {
    let caps = build_number_regex().captures(text)?;
    let number = caps.name("number")?;
    let current = number.as_str().parse::<u64>().ok()?;
    let mut out = String::with_capacity(text.len() + 1);
    out.push_str(&text[..number.start()]);
    out.push_str(&(current + 1).to_string());
    out.push_str(&text[number.end()..]);
    Some((out, current))
}

/// Increment the build number of the recipe file at `root/meta_path`.
pub fn bump_build_number(root: &Path, meta_path: &Path) -> Result<BuildBump> {
    let path = root.join(meta_path);
    let text = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let (bumped, from) = bump_text(&text)
        .ok_or_else(|| anyhow!("No build number found in {}", meta_path.display()))?;
    std::fs::write(&path, bumped).with_context(|| format!("Failed to write {}", path.display()))?;
    let recipe = meta_path.parent().unwrap_or(meta_path).to_string_lossy().into_owned();
    Ok(BuildBump { recipe, from, to: from + 1 })
}
