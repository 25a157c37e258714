//! Load command handler.
//!
//! Splits a text file into passages and writes them to a namespace's table.

use clap::Args;
use ragline_chat::Runtime;
use ragline_core::{config::AppConfig, AppError, AppResult};
use ragline_knowledge::{split_passages, DEFAULT_PASSAGE_CHARS};
use std::path::PathBuf;

/// Load a text file into a namespace
#[derive(Args, Debug)]
pub struct LoadCommand {
    /// Namespace (knowledge base) to load into
    #[arg(short, long, env = "RAGLINE_NAMESPACE")]
    pub namespace: String,

    /// Plain-text file; paragraphs are separated by blank lines
    pub file: PathBuf,

    /// Replace the namespace's existing passages
    #[arg(long)]
    pub reset: bool,

    /// Maximum characters per passage
    #[arg(long, default_value_t = DEFAULT_PASSAGE_CHARS)]
    pub max_chars: usize,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl LoadCommand {
    /// Execute the load command.
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!(namespace = %self.namespace, file = ?self.file, "Executing load command");

        let text = tokio::fs::read_to_string(&self.file).await.map_err(|e| {
            AppError::InvalidInput(format!("Failed to read {:?}: {}", self.file, e))
        })?;

        let passages = split_passages(&text, self.max_chars);
        if passages.is_empty() {
            return Err(AppError::InvalidInput(format!(
                "No text found in {:?}",
                self.file
            )));
        }
        tracing::debug!(passages = passages.len(), "Split file into passages");

        let store = Runtime::open_store(config).await?;
        let stats = store
            .load_passages(&self.namespace, &passages, self.reset)
            .await?;
        let total = store.count(&self.namespace).await?;

        if self.json {
            let output = serde_json::json!({
                "namespace": stats.namespace,
                "loaded": stats.passages,
                "total": total,
                "reset": stats.reset,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        } else {
            println!(
                "Loaded {} passages into '{}' ({} total)",
                stats.passages, stats.namespace, total
            );
        }

        Ok(())
    }
}
