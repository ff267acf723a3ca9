use std::io::{self, Write};

use anyhow::Result;
use colored::Colorize;
use futures_util::StreamExt;
use tracing::error;

use super::commands::{AppState, handle_command};
use super::session::ChatSession;
use crate::client::groq::{ChatModel, GroqClient};
use crate::rag::embeddings::Embedder;
use crate::rag::pipeline::{NO_CONTEXT_ANSWER, RagOptions, RagPipeline};
use crate::rag::store::KnowledgeBase;
use crate::ui::prompt::Repl;
use crate::ui::report::rule;
use crate::ui::theme::create_skin;

/// Interactive knowledge-base chat. Answers stream as they are generated and
/// are re-rendered as Markdown once complete.
pub async fn run(
    kb: &KnowledgeBase<'_>,
    embedder: &dyn Embedder,
    mut model: GroqClient,
    options: RagOptions,
) -> Result<()> {
    let mut session = ChatSession::new();
    let mut repl = Repl::new();
    let skin = create_skin();

    println!("{}", "Leki knowledge-base chat".green().bold());
    println!("Model: {}", model.model().cyan());
    println!("{}\n", "Type /help for commands, /exit or Ctrl-D to leave.".dimmed());

    loop {
        let line = match repl.read_line() {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                error!("Failed to read input: {}", e);
                break;
            }
        };
        let question = line.trim();
        if question.is_empty() {
            continue;
        }

        if question.starts_with('/') {
            let mut state = AppState {
                session: &mut session,
                model: &mut model,
            };
            if !handle_command(question, &mut state) {
                break;
            }
            continue;
        }

        let pipeline = RagPipeline::new(embedder, &model, kb, options.clone());
        let sources = match pipeline.retrieve(question).await {
            Ok(sources) => sources,
            Err(e) => {
                eprintln!("{} {}", "✗".red(), e);
                continue;
            }
        };

        if sources.is_empty() {
            println!("{}", NO_CONTEXT_ANSWER);
            session.record(question, NO_CONTEXT_ANSWER, sources);
            continue;
        }

        let messages = pipeline.build_messages(question, &sources);
        let mut stream = match model
            .stream_complete(&messages, options.temperature, options.max_tokens)
            .await
        {
            Ok(stream) => stream,
            Err(e) => {
                eprintln!("{} {}", "✗".red(), e);
                continue;
            }
        };

        let mut answer = String::new();
        while let Some(delta) = stream.next().await {
            match delta {
                Ok(text) => {
                    print!("{}", text);
                    io::stdout().flush()?;
                    answer.push_str(&text);
                }
                Err(e) => {
                    eprintln!("\n{} {}", "Stream error:".red(), e);
                    break;
                }
            }
        }
        println!();

        if !answer.is_empty() {
            rule();
            skin.print_text(&answer);
            rule();
            session.record(question, &answer, sources);
        }
    }

    Ok(())
}
