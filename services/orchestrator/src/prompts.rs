//! Prompt loading and assembly.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

pub const DEFAULT_BASE_PROMPT: &str = "\
You are a real-time voice assistant. You hear the user through their \
microphone and see through their camera. Speak naturally and briefly. Use the \
tools you are given when they fit; never invent tool results.";

/// Loads every `*.md` file in a directory, keyed by file stem.
pub fn load_prompts(prompts_path: &Path) -> Result<HashMap<String, String>> {
    let mut prompts = HashMap::new();
    for entry in fs::read_dir(prompts_path)
        .with_context(|| format!("Could not read prompts directory {}", prompts_path.display()))?
    {
        let entry = entry?;
        let path = entry.path();
        if path.is_file() && path.extension().and_then(|s| s.to_str()) == Some("md") {
            let prompt_key = path
                .file_stem()
                .and_then(|s| s.to_str())
                .context("Could not get file stem")?
                .to_string();
            let content = fs::read_to_string(&path)?;
            prompts.insert(prompt_key, content);
        }
    }
    Ok(prompts)
}

/// Returns `base_prompt.md` from the prompts directory, or the built-in
/// prompt when the directory or file is absent.
pub fn base_prompt(prompts_path: &Path) -> Result<String> {
    if !prompts_path.is_dir() {
        return Ok(DEFAULT_BASE_PROMPT.to_string());
    }
    let prompts = load_prompts(prompts_path)?;
    Ok(prompts
        .get("base_prompt")
        .map(|p| p.trim().to_string())
        .unwrap_or_else(|| DEFAULT_BASE_PROMPT.to_string()))
}

/// Joins the non-empty prompt sections with blank lines.
pub fn assemble_prompt(base: &str, vertical_prompt: &str, context_block: Option<&str>) -> String {
    [Some(base), Some(vertical_prompt), context_block]
        .into_iter()
        .flatten()
        .map(str::trim)
        .filter(|section| !section.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}
