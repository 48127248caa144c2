mod bot_commands;
mod config_commands;
mod setup;
mod webhook_commands;

use std::path::PathBuf;

use {
    clap::{Parser, Subcommand},
    tracing::info,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(name = "courier", about = "Courier: Telegram Bot API dispatcher")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Config file (overrides discovery of ./courier.toml and the user config dir).
    #[arg(long, short, global = true, env = "COURIER_CONFIG")]
    config: Option<PathBuf>,

    /// Bot token (overrides the config value).
    #[arg(long, global = true, env = "COURIER_TOKEN", hide_env_values = true)]
    token: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Receive and dispatch updates (default when no subcommand is provided).
    Run,
    /// Publish the configured command menu and exit.
    SyncCommands,
    /// Show the webhook currently registered for the bot.
    WebhookInfo,
    /// Remove the registered webhook.
    DeleteWebhook {
        /// Also discard updates queued on the server.
        #[arg(long)]
        drop_pending_updates: bool,
    },
    /// Validate the configuration and report errors/warnings.
    Check,
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    init_telemetry(&cli);

    info!(version = env!("CARGO_PKG_VERSION"), "courier starting");

    let loaded = setup::load(cli.config.as_deref(), cli.token)?;

    match cli.command {
        None | Some(Commands::Run) => bot_commands::run(loaded).await,
        Some(Commands::SyncCommands) => bot_commands::sync_commands(loaded).await,
        Some(Commands::WebhookInfo) => webhook_commands::webhook_info(loaded).await,
        Some(Commands::DeleteWebhook {
            drop_pending_updates,
        }) => webhook_commands::delete_webhook(loaded, drop_pending_updates).await,
        Some(Commands::Check) => config_commands::check(&loaded),
    }
}
