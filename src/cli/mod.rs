//! Command-line interface.

mod chat;
mod config;

use std::sync::Arc;

use clap::{Parser, Subcommand};

use crate::assistant::{Assistant, AssistantDeps};
use crate::auth::{Identity, IdentityVerifier};
use crate::config::Config;
use crate::gateway;
use crate::llm::create_llm_provider;
use crate::notify::{LogNotifier, Notifier, WebhookNotifier};

pub use config::run_config_command;

#[derive(Parser, Debug)]
#[command(name = "eventide", author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the HTTP gateway
    Serve {
        /// Override GATEWAY_HOST
        #[arg(long)]
        host: Option<String>,

        /// Override GATEWAY_PORT
        #[arg(long)]
        port: Option<u16>,
    },

    /// Chat with the assistant in the terminal
    Chat {
        /// Caller id to act as
        #[arg(long, default_value = "local-user")]
        user: String,

        /// Caller email, used to match invitations
        #[arg(long)]
        email: Option<String>,

        /// Display name
        #[arg(long)]
        name: Option<String>,
    },

    /// Print the resolved configuration (secrets redacted)
    Config {
        /// Only show this section (llm, rate_limit, agent, memory, gateway, notify)
        #[arg(short, long)]
        section: Option<String>,
    },
}

/// Run a parsed command.
pub async fn run(cli: Cli, config: Config) -> anyhow::Result<()> {
    match cli.command {
        Command::Serve { host, port } => serve(config, host, port).await,
        Command::Chat { user, email, name } => {
            let email = email.unwrap_or_else(|| format!("{}@localhost", user));
            let name = name.unwrap_or_else(|| user.clone());
            chat::run(&config, Identity::new(user, email, name)).await
        }
        Command::Config { section } => run_config_command(&config, section.as_deref()),
    }
}

async fn serve(mut config: Config, host: Option<String>, port: Option<u16>) -> anyhow::Result<()> {
    if let Some(host) = host {
        config.gateway.host = host;
    }
    if let Some(port) = port {
        config.gateway.port = port;
    }
    config.require_llm_key()?;

    let verifier = config.gateway.verifier()?;
    if verifier.is_empty() {
        tracing::warn!("GATEWAY_TOKENS is empty; every /api request will be rejected");
    }
    let verifier: Arc<dyn IdentityVerifier> = Arc::new(verifier);

    let llm = create_llm_provider(&config.llm)?;
    let mut deps = AssistantDeps::in_memory(llm, &config);
    deps.notifier = match &config.notify.webhook_url {
        Some(url) => {
            let notifier: Arc<dyn Notifier> = Arc::new(WebhookNotifier::new(
                url,
                &config.notify.from_address,
                config.llm.timeout,
            )?);
            notifier
        }
        None => Arc::new(LogNotifier),
    };

    let assistant = Arc::new(Assistant::new(deps, &config));
    let mut router = gateway::router(assistant, verifier);
    if let Some(cors) = gateway::cors_layer(&config.gateway.cors_origins)? {
        router = router.layer(cors);
    }
    gateway::serve(router, &config.gateway.host, config.gateway.port).await?;
    Ok(())
}
