use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use taskpilot_config::{ConfigLoader, TaskPilotConfig};
use taskpilot_llm::ModelRouter;
use taskpilot_llm::cloudflare::CloudflareProvider;
use taskpilot_llm::local::LocalProvider;
use taskpilot_llm::openai::OpenAiProvider;
use taskpilot_runtime::{Extractor, SessionRegistry};
use taskpilot_store::Store;

mod chat;
mod start;

const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";

/// TaskPilot: a conversational task manager with reminders and live updates
#[derive(Parser)]
#[command(name = "taskpilot", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to taskpilot.toml config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level override (e.g. debug, info, warn, error)
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Enable verbose output (debug logging)
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Suppress all log output (errors only)
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API and WebSocket server
    Start {
        /// Address to listen on (overrides server.listen)
        #[arg(long)]
        listen: Option<String>,
    },
    /// Chat with the agent in the terminal
    Chat {
        /// Send one message and exit; omit for an interactive session
        message: Option<String>,
        /// Session to talk to (default: agent.default_session)
        #[arg(short, long)]
        session: Option<String>,
        /// User id recorded on your messages
        #[arg(short, long)]
        user: Option<String>,
    },
    /// Show current configuration
    Config {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show version and build info
    Version,
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<()> {
        // Load config first so we can use it for log format
        let config_loader = ConfigLoader::load(self.config.as_deref())?;
        let config = config_loader.get();

        // Resolve log level: --verbose > --quiet > --log-level > config
        let log_level = if self.verbose {
            "debug"
        } else if self.quiet {
            "error"
        } else {
            self.log_level.as_deref().unwrap_or(&config.logging.level)
        };
        init_logging(&config.logging.format, log_level);

        match self.command {
            Commands::Start { listen } => start::cmd_start(config, listen).await,
            Commands::Chat {
                message,
                session,
                user,
            } => chat::cmd_chat(config, message, session, user).await,
            Commands::Config { json } => cmd_config(&config, json),
            Commands::Version => cmd_version(),
        }
    }
}

/// Install the global subscriber. `RUST_LOG` wins over `level`.
fn init_logging(format: &str, level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        "json" => builder.json().with_target(true).init(),
        "compact" => builder.compact().with_target(false).init(),
        _ => builder.with_target(false).init(),
    }
}

/// Register every provider the config has credentials for.
pub fn build_model_router(config: &TaskPilotConfig) -> ModelRouter {
    let mut router = ModelRouter::new();
    let services = &config.services;

    if let (Some(account), Some(token)) = (
        &services.cloudflare_account_id,
        &services.cloudflare_api_token,
    ) {
        router.add_provider(Arc::new(CloudflareProvider::new(
            account.clone(),
            token.clone(),
        )));
    }
    if let Some(ref key) = services.openai_api_key {
        let mut provider = OpenAiProvider::new(key.clone());
        if let Some(ref url) = services.openai_base_url {
            provider = provider.with_base_url(url.clone());
        }
        router.add_provider(Arc::new(provider));
    }

    // Ollama needs no credentials, only a model to serve.
    let ollama_url = services
        .ollama_url
        .clone()
        .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string());
    let local_model = std::iter::once(&config.agent.model)
        .chain(config.agent.fallback_model.as_ref())
        .find_map(|m| m.strip_prefix("ollama/"));
    if let Some(model) = local_model {
        router.add_provider(Arc::new(LocalProvider::new(ollama_url, model.to_string())));
    }

    router
}

/// Print setup hints when no provider can serve the configured model.
fn warn_if_unconfigured(router: &ModelRouter, config: &TaskPilotConfig) {
    if !router.is_empty() {
        return;
    }
    let model = &config.agent.model;
    eprintln!("No inference provider configured. Replies will use the offline fallback.");
    if model.starts_with("cloudflare/") {
        eprintln!("   Your model is '{}'. Set your credentials:", model);
        eprintln!("   In taskpilot.toml:  [services]");
        eprintln!("                       cloudflare_account_id = \"...\"");
        eprintln!("                       cloudflare_api_token = \"...\"");
        eprintln!("   Or env vars:        CLOUDFLARE_ACCOUNT_ID / CLOUDFLARE_API_TOKEN");
    } else if model.starts_with("openai/") {
        eprintln!("   Your model is '{}'. Set your key:", model);
        eprintln!("   In taskpilot.toml:  [services]");
        eprintln!("                       openai_api_key = \"sk-...\"");
        eprintln!("   Or env var:         export OPENAI_API_KEY=sk-...");
    }
    eprintln!();
}

/// Open the store and build the session registry shared by `start` and `chat`.
fn build_registry(
    config: &TaskPilotConfig,
    router: Arc<ModelRouter>,
) -> anyhow::Result<SessionRegistry> {
    let db_path = config.storage.resolved_db_path();
    let store = Store::open(&db_path)
        .with_context(|| format!("failed to open store at {}", db_path.display()))?;

    warn_if_unconfigured(&router, config);
    let extractor = Extractor::from_config(router, config);

    Ok(SessionRegistry::from_config(
        store,
        Arc::new(extractor),
        config,
    ))
}

fn cmd_config(config: &TaskPilotConfig, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(config)?);
    } else {
        println!("{}", toml::to_string_pretty(config)?);
    }
    Ok(())
}

fn cmd_version() -> anyhow::Result<()> {
    println!("TaskPilot v{}", env!("CARGO_PKG_VERSION"));
    println!("   Rust edition: 2024");
    println!("   Target: {}", std::env::consts::ARCH);
    println!("   OS: {}", std::env::consts::OS);
    #[cfg(debug_assertions)]
    println!("   Build: debug");
    #[cfg(not(debug_assertions))]
    println!("   Build: release");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_chat_message() {
        let cli =
            Cli::try_parse_from(["taskpilot", "chat", "add milk", "--session", "home"]).unwrap();
        match cli.command {
            Commands::Chat {
                message, session, ..
            } => {
                assert_eq!(message.as_deref(), Some("add milk"));
                assert_eq!(session.as_deref(), Some("home"));
            }
            _ => panic!("expected chat"),
        }
    }

    #[test]
    fn test_verbose_conflicts_with_quiet() {
        assert!(Cli::try_parse_from(["taskpilot", "-v", "-q", "version"]).is_err());
    }

    #[test]
    fn test_router_registers_configured_providers() {
        let mut config = TaskPilotConfig::default();
        assert!(build_model_router(&config).is_empty());

        config.services.cloudflare_account_id = Some("acct".into());
        config.services.cloudflare_api_token = Some("token".into());
        config.services.openai_api_key = Some("sk-test".into());
        config.agent.fallback_model = Some("ollama/llama3".into());
        let router = build_model_router(&config);
        assert_eq!(router.provider_names(), vec!["cloudflare", "openai", "ollama"]);
    }

    #[test]
    fn test_cloudflare_needs_both_credentials() {
        let mut config = TaskPilotConfig::default();
        config.services.cloudflare_api_token = Some("token".into());
        assert!(build_model_router(&config).is_empty());
    }
}
