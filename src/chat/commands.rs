use colored::Colorize;

use crate::chat::session::ChatSession;
use crate::client::groq::{ChatModel, GroqClient};
use crate::ui::report::truncate;

pub struct AppState<'a> {
    pub session: &'a mut ChatSession,
    pub model: &'a mut GroqClient,
}

/// Runs a slash command. Returns `false` when the REPL should exit.
pub fn handle_command(line: &str, state: &mut AppState<'_>) -> bool {
    let parts: Vec<&str> = line.split_whitespace().collect();
    let Some((&command, args)) = parts.split_first() else {
        return true;
    };

    match command {
        "/help" => {
            println!("{}", "Commands:".yellow());
            println!("  /sources     - show the chunks behind the last answer");
            println!("  /history     - list questions asked this session");
            println!("  /clear       - forget this session's history");
            println!("  /model <id>  - switch chat model (no id: show current)");
            println!("  /exit        - leave the chat");
        }
        "/exit" | "/quit" => {
            return false;
        }
        "/clear" => {
            state.session.clear();
            println!("{}", "History cleared.".green());
        }
        "/history" => {
            if state.session.history.is_empty() {
                println!("{}", "No questions yet.".dimmed());
            }
            for (i, exchange) in state.session.history.iter().enumerate() {
                println!(
                    "{:>3}. [{}] {}",
                    i + 1,
                    exchange.timestamp.format("%H:%M:%S"),
                    truncate(&exchange.question, 80)
                );
            }
        }
        "/sources" => match state.session.last() {
            Some(last) if !last.sources.is_empty() => {
                for (i, source) in last.sources.iter().enumerate() {
                    let similarity = source
                        .similarity
                        .map(|s| format!("{s:.3}"))
                        .unwrap_or_else(|| "-".into());
                    println!("{:>3}. ({}) {}", i + 1, similarity.cyan(), truncate(&source.content, 100));
                }
            }
            Some(_) => println!("{}", "The last answer used no knowledge-base context.".dimmed()),
            None => println!("{}", "Ask a question first.".dimmed()),
        },
        "/model" => {
            if let Some(model) = args.first() {
                state.model.set_model(*model);
            }
            println!("Current model: {}", state.model.model().cyan());
        }
        _ => {
            println!("Unknown command: {} (try /help)", command.red());
        }
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn groq() -> GroqClient {
        GroqClient::new(
            "key".into(),
            "llama-3.3-70b-versatile".into(),
            "https://api.groq.com/openai/v1".into(),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn exit_stops_the_loop() {
        let mut session = ChatSession::new();
        let mut model = groq();
        let mut state = AppState {
            session: &mut session,
            model: &mut model,
        };
        assert!(!handle_command("/exit", &mut state));
        assert!(handle_command("/help", &mut state));
        assert!(handle_command("/nope", &mut state));
    }

    #[test]
    fn model_switch_and_clear() {
        let mut session = ChatSession::new();
        session.record("q", "a", Vec::new());
        let mut model = groq();
        let mut state = AppState {
            session: &mut session,
            model: &mut model,
        };

        handle_command("/model llama-3.1-8b-instant", &mut state);
        handle_command("/clear", &mut state);

        assert_eq!(model.model(), "llama-3.1-8b-instant");
        assert!(session.history.is_empty());
    }
}
