//! pgroster CLI.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use colored::*;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pgroster::config::{Config, resolve_show_migrations};
use pgroster::inventory::InventoryQuery;
use pgroster::postgres::{PgElevatedConnector, PgInventory, connect_options};
use pgroster::render::print_report;
use pgroster::report::build_report;

#[derive(Parser)]
#[command(name = "pgroster")]
#[command(version, about = "List Postgres databases and their latest migrations")]
struct Cli {
    /// Config file (default: ./pgroster.toml, then the user config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Inventory database URL
    #[arg(long, env = "DATABASE_URL", global = true, hide_env_values = true)]
    url: Option<String>,

    /// Log pipeline details to stderr
    #[arg(long, global = true)]
    debug: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print all databases, filtered by an optional prefix
    #[command(visible_aliases = ["ls", "l"])]
    List(ListArgs),
}

#[derive(Args)]
struct ListArgs {
    /// Only list databases that start with the given string
    prefix: Option<String>,

    /// Order database lists by creation time descending
    #[arg(short = 'c', long)]
    created: bool,

    /// Show the latest migration of each database
    #[arg(short, long, overrides_with = "no_verbose")]
    verbose: bool,

    /// Never show migrations, even when configured
    #[arg(long, overrides_with = "verbose")]
    no_verbose: bool,

    /// Maximum simultaneous status connections
    #[arg(long)]
    concurrency: Option<usize>,
}

impl ListArgs {
    fn explicit_verbose(&self) -> Option<bool> {
        match (self.verbose, self.no_verbose) {
            (true, _) => Some(true),
            (_, true) => Some(false),
            _ => None,
        }
    }
}

fn init_tracing(debug: bool) {
    let default_filter = if debug { "warn,pgroster=debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    if cli.no_color {
        colored::control::set_override(false);
    }

    let code = match run(cli).await {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("postgres: {}", format!("{:#}", e).bright_red());
            1
        }
    };
    std::process::exit(code);
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::List(args) => list(&config, cli.url, args).await,
    }
}

async fn list(config: &Config, url: Option<String>, args: ListArgs) -> Result<()> {
    let url = url.or_else(|| config.database_url.clone()).ok_or_else(|| {
        anyhow!("no database url: pass --url, set DATABASE_URL, or add database_url to pgroster.toml")
    })?;
    let options = connect_options(&url)?;

    let show_migrations = resolve_show_migrations(args.explicit_verbose(), config);

    let mut settings = config.report_settings();
    if let Some(n) = args.concurrency {
        settings.concurrency = n.max(1);
    }

    let query = InventoryQuery {
        prefix: args.prefix.unwrap_or_else(|| config.default_prefix()),
        sort_by_creation: args.created,
        include_templates: false,
    };

    let connector = Arc::new(PgElevatedConnector::new(
        options.clone(),
        config.superuser.as_ref(),
    )?);
    let inventory = PgInventory::connect(options)
        .await
        .context("Failed to connect")?;

    let report = build_report(&inventory, connector, &settings, &query, show_migrations).await;
    inventory.close().await;

    print_report(&report?, Utc::now());
    Ok(())
}
