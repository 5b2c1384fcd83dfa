//! Tip history and stats commands

use anyhow::Result;

use crate::config::ClientConfig;
use crate::dashboard::Recovery;
use crate::error::RecoveryAction;
use crate::session::Session;

use super::{
    format_coin, open_session, print_recovery, print_tips, print_warning, require_identity,
};

/// Username of the connected wallet's profile, or a printed recovery
async fn own_username(session: &Session) -> Result<Option<String>> {
    let Some(identity) = require_identity(session) else {
        return Ok(None);
    };
    match session.registry().profile_by_wallet(&identity).await? {
        Some(profile) => Ok(Some(profile.username)),
        None => {
            print_recovery(&Recovery {
                action: RecoveryAction::CreateProfile,
                message: "You don't have a profile yet.".to_string(),
            });
            Ok(None)
        }
    }
}

/// Show tips received and sent
pub async fn run(config: ClientConfig, limit: u32, sent: bool) -> Result<()> {
    let session = open_session(config).await?;
    let Some(username) = own_username(&session).await? else {
        return Ok(());
    };
    let registry = session.registry();
    let codec = session.config().codec();

    println!();
    let (title, result) = if sent {
        ("Tips sent", registry.tips_sent(&username, limit).await)
    } else {
        ("Tips received", registry.tips_received(&username, limit).await)
    };
    println!("{} by @{}:", title, username);
    match result {
        Ok(tips) => print_tips(&codec, &tips, !sent),
        Err(e) => print_warning(&format!("Could not load tips: {}", e)),
    }
    Ok(())
}

/// Show aggregate tip statistics
pub async fn stats(config: ClientConfig, username: Option<&str>) -> Result<()> {
    let session = open_session(config).await?;
    let username = match username {
        Some(username) => username.trim().to_lowercase(),
        None => match own_username(&session).await? {
            Some(username) => username,
            None => return Ok(()),
        },
    };

    if session.registry().profile(&username).await?.is_none() {
        print_recovery(&Recovery {
            action: RecoveryAction::BrowseProfiles,
            message: format!("Profile '{}' not found.", username),
        });
        return Ok(());
    }

    let codec = session.config().codec();
    match session.registry().user_stats(&username).await {
        Ok(stats) => {
            println!();
            println!("Stats for @{}:", username);
            println!(
                "  Received: {} tip(s), {}",
                stats.total_tips_received,
                format_coin(&codec, &stats.total_amount_received)
            );
            println!(
                "  Sent:     {} tip(s), {}",
                stats.total_tips_sent,
                format_coin(&codec, &stats.total_amount_sent)
            );
        }
        Err(e) => print_warning(&format!("Could not load stats: {}", e)),
    }
    Ok(())
}
