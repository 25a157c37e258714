//! Ask command handler.
//!
//! Sends one question through the engine and streams the answer to stdout.

use clap::Args;
use futures::StreamExt;
use ragline_chat::{ChatEngine, ChatRequest, Runtime, StreamEvent};
use ragline_core::{config::AppConfig, AppError, AppResult};
use std::io::Write;
use std::path::PathBuf;

/// Ask a single question
#[derive(Args, Debug)]
pub struct AskCommand {
    /// Namespace (knowledge base) to answer from
    #[arg(short, long, env = "RAGLINE_NAMESPACE")]
    pub namespace: String,

    /// The question to ask
    pub question: Option<String>,

    /// Read the question from a file
    #[arg(short, long, conflicts_with = "question")]
    pub file: Option<PathBuf>,

    /// Print raw events as JSON lines
    #[arg(long)]
    pub json: bool,
}

impl AskCommand {
    /// Execute the ask command.
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!(namespace = %self.namespace, "Executing ask command");

        let question = self.get_question()?;
        let runtime = Runtime::start(config).await?;

        let result = render_answer(
            runtime.engine(),
            ChatRequest::new(&self.namespace, question),
            self.json,
        )
        .await;

        runtime.shutdown().await;
        result
    }

    fn get_question(&self) -> AppResult<String> {
        if let Some(question) = &self.question {
            return Ok(question.clone());
        }

        match &self.file {
            Some(path) => std::fs::read_to_string(path).map_err(|e| {
                AppError::InvalidInput(format!("Failed to read question file {:?}: {}", path, e))
            }),
            None => Err(AppError::InvalidInput("No question provided".to_string())),
        }
    }
}

/// Stream one answer to stdout.
///
/// Plain mode prints content as it arrives; JSON mode prints every event as
/// one line. An error event becomes the command's error.
pub async fn render_answer(engine: &ChatEngine, request: ChatRequest, json: bool) -> AppResult<()> {
    let mut events = engine.ask(request);
    let mut stdout = std::io::stdout();

    while let Some(event) = events.next().await {
        if json {
            writeln!(stdout, "{}", event.to_json()?)?;
        }

        match event {
            StreamEvent::Content { content } => {
                if !json {
                    write!(stdout, "{}", content)?;
                    stdout.flush()?;
                }
            }
            StreamEvent::Done { final_content, .. } => {
                if !json {
                    writeln!(stdout)?;
                }
                tracing::debug!(chars = final_content.chars().count(), "Answer complete");
                return Ok(());
            }
            StreamEvent::Error { error } => {
                if !json {
                    writeln!(stdout)?;
                }
                return Err(AppError::Other(error));
            }
        }
    }

    Err(AppError::Other("Answer stream ended without a result".to_string()))
}
