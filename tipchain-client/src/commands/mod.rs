//! CLI Commands
//!
//! Implementation of all tipchain CLI commands.

pub mod balance;
pub mod discover;
pub mod history;
pub mod profile;
pub mod tip;
pub mod upload;

use anyhow::Result;
use chrono::{TimeZone, Utc};
use std::io::{self, Write};

use crate::amount::AmountCodec;
use crate::config::ClientConfig;
use crate::dashboard::Recovery;
use crate::error::RecoveryAction;
use crate::ledger::Identity;
use crate::registry::{Timestamp, TipRecord};
use crate::session::Session;

/// Prompt for confirmation
pub fn prompt_confirm(message: &str) -> Result<bool> {
    print!("{} [y/N]: ", message);
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;

    Ok(input.trim().eq_ignore_ascii_case("y") || input.trim().eq_ignore_ascii_case("yes"))
}

/// Print an error message
pub fn print_error(message: &str) {
    eprintln!("\x1b[31mError:\x1b[0m {}", message);
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("\x1b[32m{}\x1b[0m", message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("\x1b[33mWarning:\x1b[0m {}", message);
}

/// Print the way out of a state with nothing to show
pub fn print_recovery(recovery: &Recovery) {
    print_warning(&recovery.message);
    println!("  {}", recovery_hint(recovery.action));
}

pub fn recovery_hint(action: RecoveryAction) -> &'static str {
    match action {
        RecoveryAction::ConnectWallet => {
            "Connect a wallet with --identity <address> or [session] identity in the config."
        }
        RecoveryAction::CreateProfile => "Create one with 'tipchain profile save'.",
        RecoveryAction::RetryRecord => "Run 'tipchain retry-record' to record it.",
        RecoveryAction::BrowseProfiles => "Browse profiles with 'tipchain discover'.",
    }
}

/// Connect to the network as the configured identity
pub async fn open_session(config: ClientConfig) -> Result<Session> {
    println!("Connecting to network...");
    let session = Session::open(config).await?;
    println!(
        "Connected to {} endpoint(s)",
        session.config().network.endpoints.len()
    );
    Ok(session)
}

/// The signed-in identity, or a printed hint on how to connect one
pub fn require_identity(session: &Session) -> Option<Identity> {
    match session.identity() {
        Ok(identity) => Some(identity.clone()),
        Err(e) => {
            print_error(&e.to_string());
            if let Some(action) = e.recovery_action() {
                println!("  {}", recovery_hint(action));
            }
            None
        }
    }
}

/// Human-readable timestamp
pub fn format_timestamp(timestamp: Timestamp) -> String {
    Utc.timestamp_opt(timestamp.seconds() as i64, 0)
        .single()
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| timestamp.seconds().to_string())
}

/// Registry coin string rendered in display units
pub fn format_coin(codec: &AmountCodec, coin: &str) -> String {
    match codec.parse_coin_string(coin) {
        Ok(minimal) => format!("{} {}", codec.to_display(minimal), codec.display_denom()),
        Err(_) => coin.to_string(),
    }
}

/// Print a list of tips, one per line
pub fn print_tips(codec: &AmountCodec, tips: &[TipRecord], incoming: bool) {
    if tips.is_empty() {
        println!("  (none)");
        return;
    }
    for tip in tips {
        let counterpart = if incoming {
            format!("from @{}", tip.from_username)
        } else {
            format!("to @{}", tip.to_username)
        };
        println!(
            "  {}  {:>16}  {}",
            format_timestamp(tip.timestamp),
            format_coin(codec, &tip.amount),
            counterpart
        );
        if let Some(message) = &tip.message {
            println!("      \"{}\"", message);
        }
    }
}
