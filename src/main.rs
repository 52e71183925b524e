// ABOUTME: Main entry point for ferry - Telegram relay for the Claude CLI
// ABOUTME: Initializes logging, config, metrics, and runs the bot or a one-off terminal turn

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use ferry::handler::Handler;
use ferry::telegram::TelegramBot;
use ferry::terminal::TerminalSurface;
use ferry_agent::{AgentRunner, ClaudeCli, TurnRequest};
use ferry_core::{paths, run_turn, Config, DeliveryThrottler, RateLimiter, SessionStore};
use std::sync::Arc;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

#[derive(Parser)]
#[command(name = "ferry", version, about = "Relay Telegram messages to the Claude CLI")]
struct Cli {
    /// Log line format; `json` also wins when `[logging] json = true`
    #[arg(long, value_enum, global = true, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the Telegram bot (default)
    Run,
    /// Load the configuration and print it with secrets redacted
    CheckConfig,
    /// Run one turn against the agent and stream it to the terminal
    Prompt {
        /// The prompt text
        text: String,
        /// Session id to resume
        #[arg(long)]
        session: Option<String>,
        /// Print the turn outcome as JSON instead of the answer text
        #[arg(long)]
        json: bool,
    },
}

fn init_logging(config: &Config, json: bool) -> Result<Option<WorkerGuard>> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());

    let stderr_layer = if json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .boxed()
    };

    let (file_layer, guard) = if config.logging.file {
        let log_dir = paths::log_dir();
        std::fs::create_dir_all(&log_dir)
            .with_context(|| format!("Failed to create {}", log_dir.display()))?;
        let appender = tracing_appender::rolling::daily(&log_dir, "ferry.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(writer)
            .boxed();
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();

    Ok(guard)
}

fn install_metrics(config: &Config) -> Result<()> {
    if let Some(addr) = config.metrics.listen {
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("Failed to install Prometheus exporter")?;
        tracing::info!(%addr, "Prometheus metrics endpoint listening");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Set up panic hook to log panics before they crash the process
    std::panic::set_hook(Box::new(|panic_info| {
        tracing::error!(panic = %panic_info, "ferry panicked");
        eprintln!("\nPANIC: {}", panic_info);
        eprintln!("{:?}", std::backtrace::Backtrace::force_capture());
    }));

    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = Config::load()?;
    let _log_guard = init_logging(&config, cli.log_format == LogFormat::Json || config.logging.json)?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run_bot(config).await,
        Commands::CheckConfig => {
            println!("{:#?}", config);
            Ok(())
        }
        Commands::Prompt {
            text,
            session,
            json,
        } => run_prompt(config, text, session, json).await,
    }
}

async fn run_bot(config: Config) -> Result<()> {
    let token = config.require_bot_token()?.to_string();
    install_metrics(&config)?;

    tracing::info!(
        allowed_users = config.telegram.allowed_users.len(),
        allow_all = config.telegram.allow_all,
        workspace = %config.workspace.path,
        agent = %config.agent.binary,
        "Configuration loaded"
    );

    let sessions = SessionStore::new(&config.workspace.path)?;
    let limiter = Arc::new(RateLimiter::new(
        config.rate_limit.max_requests,
        config.rate_limit.window(),
    ));
    let _sweeper = limiter.spawn_sweeper(config.rate_limit.sweep_interval());

    let runner: Arc<dyn AgentRunner> = Arc::new(ClaudeCli::new(config.agent.clone()));
    let bot = TelegramBot::connect(&token).await?;
    let handler = Arc::new(
        Handler::new(Arc::new(config), runner, sessions, limiter)
            .with_bot_username(bot.username()),
    );

    tracing::info!("Starting Telegram long polling");
    tokio::select! {
        result = bot.run(handler) => result,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutting down");
            Ok(())
        }
    }
}

async fn run_prompt(config: Config, text: String, session: Option<String>, json: bool) -> Result<()> {
    let runner = ClaudeCli::new(config.agent.clone());
    let working_dir = std::env::current_dir().context("Failed to read current directory")?;
    let throttler = DeliveryThrottler::new(TerminalSurface::new(), config.delivery.settings());
    let request = TurnRequest::new(text)
        .with_session(session)
        .with_working_dir(working_dir);

    let report = run_turn(&runner, &throttler, request).await;
    let outcome = &report.outcome;

    if json {
        println!("{}", serde_json::to_string_pretty(outcome)?);
    } else {
        println!("{}", outcome.display_text());
        if let Some(ref session_id) = outcome.session_id {
            eprintln!("session: {}", session_id);
        }
    }

    if !outcome.success {
        std::process::exit(1);
    }
    Ok(())
}
