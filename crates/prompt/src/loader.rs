//! Prompt loader for YAML prompt policies.

use crate::types::PromptPolicy;
use ragline_core::config::STATE_DIR;
use ragline_core::{AppError, AppResult};
use std::path::{Path, PathBuf};

fn prompts_dir(workspace_path: &Path) -> PathBuf {
    workspace_path.join(STATE_DIR).join("prompts")
}

/// Load a prompt policy by ID from the workspace.
///
/// Looks for `<id>.yml` in the `.ragline/prompts/` directory.
///
/// # Example
/// ```no_run
/// use ragline_prompt::load_prompt;
/// use std::path::Path;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let policy = load_prompt(Path::new("."), "chat.rag.default")?;
/// println!("Loaded policy: {}", policy.title);
/// # Ok(())
/// # }
/// ```
pub fn load_prompt(workspace_path: &Path, prompt_id: &str) -> AppResult<PromptPolicy> {
    let prompt_file = prompts_dir(workspace_path).join(format!("{}.yml", prompt_id));

    tracing::debug!("Loading prompt from: {:?}", prompt_file);

    if !prompt_file.exists() {
        return Err(AppError::Prompt(format!(
            "Prompt file not found: {:?}",
            prompt_file
        )));
    }

    let contents = std::fs::read_to_string(&prompt_file).map_err(|e| {
        AppError::Prompt(format!(
            "Failed to read prompt file {:?}: {}",
            prompt_file, e
        ))
    })?;

    let policy: PromptPolicy = serde_yaml::from_str(&contents).map_err(|e| {
        AppError::Prompt(format!(
            "Failed to parse prompt YAML {:?}: {}",
            prompt_file, e
        ))
    })?;

    validate_policy(&policy)?;

    tracing::info!("Loaded prompt: {} ({})", policy.id, policy.title);

    Ok(policy)
}

/// Load a policy, falling back to the built-in one when the file is absent.
///
/// A file that exists but fails to parse or validate is still an error.
pub fn load_or_default(workspace_path: &Path, prompt_id: &str) -> AppResult<PromptPolicy> {
    let prompt_file = prompts_dir(workspace_path).join(format!("{}.yml", prompt_id));
    if prompt_file.exists() {
        return load_prompt(workspace_path, prompt_id);
    }

    tracing::debug!(prompt_id, "No prompt file found, using built-in policy");
    Ok(PromptPolicy::default())
}

/// List all available prompt IDs in the workspace.
pub fn list_prompts(workspace_path: &Path) -> AppResult<Vec<String>> {
    let dir = prompts_dir(workspace_path);

    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut prompt_ids = Vec::new();

    for entry in walkdir::WalkDir::new(&dir)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if path.is_file() && path.extension().and_then(|s| s.to_str()) == Some("yml") {
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                prompt_ids.push(stem.to_string());
            }
        }
    }

    prompt_ids.sort();
    Ok(prompt_ids)
}

fn validate_policy(policy: &PromptPolicy) -> AppResult<()> {
    if policy.id.is_empty() {
        return Err(AppError::Prompt("Prompt ID cannot be empty".to_string()));
    }

    if policy.title.is_empty() {
        return Err(AppError::Prompt("Prompt title cannot be empty".to_string()));
    }

    if !policy.api_version.contains('.') {
        return Err(AppError::Prompt(format!(
            "Invalid apiVersion format: {}. Expected format: 'x.y'",
            policy.api_version
        )));
    }

    if policy.system.trim().is_empty() {
        return Err(AppError::Prompt(
            "Prompt system template cannot be empty".to_string(),
        ));
    }

    if !policy.context.contains("{{context}}") {
        return Err(AppError::Prompt(
            "Prompt context template must reference {{context}}".to_string(),
        ));
    }

    if policy.refusal.trim().is_empty() {
        return Err(AppError::Prompt("Prompt refusal cannot be empty".to_string()));
    }

    Ok(())
}
