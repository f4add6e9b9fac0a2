//! `eventide chat`: interactive REPL against the in-memory store.

use std::sync::Arc;

use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;

use crate::agent::TurnOutcome;
use crate::assistant::{Assistant, AssistantDeps, TurnRequest};
use crate::auth::Identity;
use crate::config::Config;
use crate::context::ConversationRole;
use crate::llm::create_llm_provider;

const HELP: &str = "Commands: /history, /clear, /help, /quit";

pub async fn run(config: &Config, identity: Identity) -> anyhow::Result<()> {
    config.require_llm_key()?;
    let llm = create_llm_provider(&config.llm)?;
    let assistant = Assistant::new(AssistantDeps::in_memory(Arc::clone(&llm), config), config);

    let mut rl = DefaultEditor::new()?;
    println!(
        "Chatting as {} <{}> using {}. {}",
        identity.display_name,
        identity.email,
        llm.model_name(),
        HELP
    );

    loop {
        let line = match rl.readline(">>> ") {
            Ok(line) => line,
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => break,
            Err(err) => return Err(err.into()),
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let _ = rl.add_history_entry(line);

        match line {
            "/quit" | "/exit" => break,
            "/help" => println!("{}", HELP),
            "/history" => {
                for message in assistant.get_history(&identity).await? {
                    let who = match message.role {
                        ConversationRole::User => "you",
                        ConversationRole::Assistant => "assistant",
                    };
                    println!("[{}] {}: {}", message.seq, who, message.text);
                }
            }
            "/clear" => {
                let removed = assistant.clear_history(&identity).await?;
                println!("Cleared {} messages.", removed);
            }
            message => match assistant.run_turn(&identity, TurnRequest::new(message)).await {
                Ok(reply) => {
                    if !reply.tools_used.is_empty() {
                        println!("  (tools: {})", reply.tools_used.join(", "));
                    }
                    println!("{}", reply.reply);
                    if reply.outcome == TurnOutcome::Aborted {
                        println!("  (stopped after {} steps)", reply.iterations);
                    }
                }
                Err(e) => {
                    tracing::debug!(error = %e, "Turn failed");
                    println!("{}", e.user_message());
                }
            },
        }
    }
    Ok(())
}
