//! TipChain CLI
//!
//! Register a profile and send tips on a ledger-backed registry.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tipchain_client::commands;
use tipchain_client::commands::profile::ProfileEdits;
use tipchain_client::config::{default_config_path, ClientConfig};

#[derive(Parser)]
#[command(name = "tipchain")]
#[command(about = "TipChain - profiles and tips on the ledger")]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Custom config file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Wallet address to act as
    #[arg(short, long, global = true)]
    identity: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
struct ProfileArgs {
    /// Username (new profiles only)
    #[arg(long)]
    username: Option<String>,

    /// Display name
    #[arg(long)]
    name: Option<String>,

    #[arg(long)]
    bio: Option<String>,

    /// Profile image URL
    #[arg(long)]
    image: Option<String>,

    /// Banner image URL
    #[arg(long)]
    banner: Option<String>,

    #[arg(long)]
    twitter: Option<String>,

    #[arg(long)]
    website: Option<String>,
}

impl From<ProfileArgs> for ProfileEdits {
    fn from(args: ProfileArgs) -> Self {
        Self {
            username: args.username,
            name: args.name,
            bio: args.bio,
            image: args.image,
            banner: args.banner,
            twitter: args.twitter,
            website: args.website,
        }
    }
}

#[derive(Subcommand)]
enum ProfileCommands {
    /// Show your profile, or another user's
    Show {
        /// Username to look up
        username: Option<String>,
    },

    /// Create or update your profile
    Save(ProfileArgs),

    /// Edit your existing profile
    Edit(ProfileArgs),
}

#[derive(Subcommand)]
enum Commands {
    /// Check wallet balance
    Balance,

    /// Send a tip to a username
    Tip {
        /// Recipient username
        username: String,

        /// Amount in display units (defaults to the configured amount)
        amount: Option<String>,

        /// Message attached to the tip
        #[arg(short, long)]
        message: Option<String>,

        /// Skip confirmation prompt
        #[arg(long)]
        yes: bool,
    },

    /// Record tips whose transfer went through but whose record did not
    RetryRecord,

    /// Manage profiles
    #[command(subcommand)]
    Profile(ProfileCommands),

    /// Check whether a username is available
    CheckUsername { username: String },

    /// Browse registered profiles
    Discover {
        /// Filter by username, name or bio
        #[arg(short, long)]
        search: Option<String>,

        /// Page to show
        #[arg(short, long, default_value = "1")]
        page: usize,
    },

    /// Show tip history
    History {
        /// Maximum number of tips to show
        #[arg(short, long, default_value = "20")]
        limit: u32,

        /// Show tips sent instead of received
        #[arg(long)]
        sent: bool,
    },

    /// Show tip statistics
    Stats {
        /// Username (defaults to your own)
        username: Option<String>,
    },

    /// Upload an image for use in a profile
    Upload { path: PathBuf },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let config_path = cli.config.unwrap_or_else(default_config_path);
    let mut config = ClientConfig::load(&config_path)?;
    if let Some(identity) = cli.identity {
        config.session.identity = Some(identity);
    }

    match cli.command {
        Commands::Balance => commands::balance::run(config).await,
        Commands::Tip {
            username,
            amount,
            message,
            yes,
        } => {
            commands::tip::run(config, &username, amount.as_deref(), message.as_deref(), yes).await
        }
        Commands::RetryRecord => commands::tip::retry(config).await,
        Commands::Profile(ProfileCommands::Show { username }) => {
            commands::profile::show(config, username.as_deref()).await
        }
        Commands::Profile(ProfileCommands::Save(args)) => {
            commands::profile::save(config, args.into()).await
        }
        Commands::Profile(ProfileCommands::Edit(args)) => {
            commands::profile::edit(config, args.into()).await
        }
        Commands::CheckUsername { username } => {
            commands::profile::check_username(config, &username).await
        }
        Commands::Discover { search, page } => {
            commands::discover::run(config, search.as_deref(), page).await
        }
        Commands::History { limit, sent } => commands::history::run(config, limit, sent).await,
        Commands::Stats { username } => commands::history::stats(config, username.as_deref()).await,
        Commands::Upload { path } => commands::upload::run(config, &path).await,
    }
}
