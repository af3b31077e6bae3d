//! Command-line and environment configuration
//!
//! Highest-priority tiers of the configuration: clap reads each flag from
//! the command line first, then from its environment variable. Anything
//! left unset falls back to the TOML file, then to compiled defaults.

use banlist_common::config::{load_toml_config, TomlConfig};
use banlist_common::Result;
use clap::Parser;
use std::path::PathBuf;

/// Command-line arguments for banlist-ingest
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "banlist-ingest")]
#[command(about = "Moderation blacklist ingestion service")]
#[command(version)]
pub struct Args {
    /// TOML configuration file
    #[arg(short, long, env = "BANLIST_CONFIG")]
    pub config: Option<PathBuf>,

    /// SQLite database file
    #[arg(short, long, env = "BANLIST_DATABASE")]
    pub database: Option<PathBuf>,

    /// HTTP listen address
    #[arg(short, long, env = "BANLIST_LISTEN")]
    pub listen: Option<String>,

    /// Webhook for summaries and errors
    #[arg(long, env = "BANLIST_WEBHOOK_URL")]
    pub webhook_url: Option<String>,

    /// Webhook for management audit events
    #[arg(long, env = "BANLIST_MANAGEMENT_WEBHOOK_URL")]
    pub management_webhook_url: Option<String>,

    /// Directory of bulk JSON files, imported once at startup
    #[arg(short, long, env = "BANLIST_BATCH_DIR")]
    pub batch_dir: Option<PathBuf>,
}

/// Merge arguments over the TOML file and validate the result
pub fn resolve_config(args: &Args) -> Result<TomlConfig> {
    let config = load_toml_config(args.config.as_deref())?;
    let config = apply_overrides(config, args);
    config.validate()?;
    Ok(config)
}

fn apply_overrides(mut config: TomlConfig, args: &Args) -> TomlConfig {
    if let Some(database) = &args.database {
        config.database_path = database.clone();
    }
    if let Some(listen) = &args.listen {
        config.listen = listen.clone();
    }
    if let Some(url) = &args.webhook_url {
        config.webhook_url = Some(url.clone());
    }
    if let Some(url) = &args.management_webhook_url {
        config.management_webhook_url = Some(url.clone());
    }
    if let Some(dir) = &args.batch_dir {
        config.batch_dir = Some(dir.clone());
    }
    config
}
