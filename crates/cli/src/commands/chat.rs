//! Interactive chat over stdin.
//!
//! One engine serves the whole session, so history and cached answers carry
//! over between questions.

use super::ask::render_answer;
use clap::Args;
use ragline_chat::{ChatRequest, Runtime};
use ragline_core::{config::AppConfig, AppResult};
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};

/// Chat with a namespace interactively
#[derive(Args, Debug)]
pub struct ChatCommand {
    /// Namespace (knowledge base) to answer from
    #[arg(short, long, env = "RAGLINE_NAMESPACE")]
    pub namespace: String,

    /// Print raw events as JSON lines
    #[arg(long)]
    pub json: bool,
}

impl ChatCommand {
    /// Execute the chat command.
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!(namespace = %self.namespace, "Starting chat session");

        let runtime = Runtime::start(config).await?;
        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        loop {
            prompt()?;

            let Some(line) = lines.next_line().await? else {
                break;
            };
            let line = line.trim();

            if line.is_empty() {
                continue;
            }
            if matches!(line, "exit" | "quit" | "/exit" | "/quit") {
                break;
            }

            let request = ChatRequest::new(&self.namespace, line);
            if let Err(e) = render_answer(runtime.engine(), request, self.json).await {
                eprintln!("error: {}", e);
            }
        }

        tracing::info!(
            turns = runtime.engine().history().len(&self.namespace),
            "Chat session ended"
        );
        runtime.shutdown().await;
        Ok(())
    }
}

fn prompt() -> AppResult<()> {
    let mut stdout = std::io::stdout();
    write!(stdout, "> ")?;
    stdout.flush()?;
    Ok(())
}
