//! Profile commands

use anyhow::Result;

use crate::config::ClientConfig;
use crate::dashboard::{ProfileDashboard, ProfilePage, View};
use crate::error::Error;
use crate::profile::{validate_username, ArbitrationState, ProfileMode};
use crate::registry::Profile;
use crate::session::Session;

use super::{
    open_session, print_error, print_recovery, print_success, print_tips, print_warning,
    recovery_hint, require_identity,
};

/// Field values given on the command line; `None` keeps the current value
#[derive(Debug, Default)]
pub struct ProfileEdits {
    pub username: Option<String>,
    pub name: Option<String>,
    pub bio: Option<String>,
    pub image: Option<String>,
    pub banner: Option<String>,
    pub twitter: Option<String>,
    pub website: Option<String>,
}

fn print_profile(profile: &Profile) {
    println!("@{}  {}", profile.username, profile.display_name);
    if let Some(bio) = &profile.bio {
        println!("  {}", bio);
    }
    if let Some(twitter) = &profile.social_links.twitter {
        println!("  Twitter: {}", twitter);
    }
    if let Some(website) = &profile.social_links.website {
        println!("  Website: {}", website);
    }
    if let Some(image) = &profile.profile_image {
        println!("  Image:   {}", image);
    }
    println!("  Wallet:  {}", profile.owner);
}

/// Show the connected wallet's profile, or someone else's by username
pub async fn show(config: ClientConfig, username: Option<&str>) -> Result<()> {
    let session = open_session(config).await?;
    let registry = session.registry();
    let codec = session.config().codec();
    println!();

    if let Some(username) = username {
        match ProfilePage::load(&registry, username).await? {
            View::Ready(page) => {
                print_profile(&page.profile);
                println!();
                println!("Recent tips:");
                print_tips(&codec, &page.recent_tips, true);
                for notice in &page.notices {
                    print_warning(notice);
                }
            }
            View::Recover(recovery) => print_recovery(&recovery),
        }
        return Ok(());
    }

    if require_identity(&session).is_none() {
        return Ok(());
    }
    let mut tracker = session.balance_tracker()?;
    match ProfileDashboard::load(&registry, &mut tracker).await? {
        View::Ready(dashboard) => {
            print_profile(&dashboard.profile);
            if let Some(balance) = dashboard.balance {
                println!("  Balance: {}", codec.format(balance));
            }
            if let Some(stats) = &dashboard.stats {
                println!(
                    "  Tips:    {} received, {} sent",
                    stats.total_tips_received, stats.total_tips_sent
                );
            }
            println!();
            println!("Tips received:");
            print_tips(&codec, &dashboard.tips_received, true);
            println!();
            println!("Tips sent:");
            print_tips(&codec, &dashboard.tips_sent, false);
            for notice in &dashboard.notices {
                print_warning(notice);
            }
        }
        View::Recover(recovery) => print_recovery(&recovery),
    }
    Ok(())
}

/// Check whether a username is free
pub async fn check_username(config: ClientConfig, username: &str) -> Result<()> {
    let max_len = config.profile.max_username_len;
    let session = open_session(config).await?;

    if let Err(e) = validate_username(username, max_len) {
        print_error(&e.to_string());
        return Ok(());
    }

    // Without a wallet there is no existing profile to compare against
    if session.identity().is_err() {
        let available = session.registry().is_username_available(username).await?;
        report_availability(username, available);
        return Ok(());
    }

    let mut arbitrator = session.profile_arbitrator()?;
    arbitrator.load().await?;
    arbitrator.check_availability(username);

    match arbitrator.next_availability().await {
        ArbitrationState::Available => report_availability(username, true),
        ArbitrationState::Taken => report_availability(username, false),
        ArbitrationState::CheckFailed(reason) => print_error(reason),
        _ => print_success(&format!("'{}' is your current username.", username.trim())),
    }
    Ok(())
}

fn report_availability(username: &str, available: bool) {
    let username = username.trim().to_lowercase();
    if available {
        print_success(&format!("'{}' is available.", username));
    } else {
        print_warning(&format!("'{}' is already taken.", username));
    }
}

/// Start editing the connected wallet's existing profile
pub async fn edit(config: ClientConfig, edits: ProfileEdits) -> Result<()> {
    let session = open_session(config).await?;
    edit_with(&session, edits).await
}

async fn edit_with(session: &Session, edits: ProfileEdits) -> Result<()> {
    let Some(identity) = require_identity(session) else {
        return Ok(());
    };

    match session.registry().profile_by_wallet(&identity).await? {
        Some(profile) => {
            // The save flow picks this up without another lookup
            session.handoff().put(&profile)?;
        }
        None => {
            print_error("You don't have a profile yet.");
            println!("  {}", recovery_hint(crate::error::RecoveryAction::CreateProfile));
            return Ok(());
        }
    }

    save_with(session, edits).await
}

/// Create or update the connected wallet's profile
pub async fn save(config: ClientConfig, edits: ProfileEdits) -> Result<()> {
    let session = open_session(config).await?;
    if require_identity(&session).is_none() {
        return Ok(());
    }
    save_with(&session, edits).await
}

async fn save_with(session: &Session, edits: ProfileEdits) -> Result<()> {
    let mut arbitrator = session.profile_arbitrator()?;
    arbitrator.load().await?;

    match arbitrator.mode() {
        ProfileMode::Create => println!("Creating a new profile."),
        ProfileMode::Update { existing } => {
            println!("Updating profile @{}.", existing.username)
        }
    }

    if let Some(username) = &edits.username {
        if let Err(e) = arbitrator.set_username(username) {
            print_error(&e.to_string());
            return Ok(());
        }
        if let ArbitrationState::Taken = arbitrator.next_availability().await {
            print_warning(&format!("'{}' is already taken.", username.trim()));
            return Ok(());
        }
    }

    let form = arbitrator.form_mut();
    if let Some(name) = edits.name {
        form.display_name = name;
    }
    if let Some(bio) = edits.bio {
        form.bio = bio;
    }
    if let Some(image) = edits.image {
        form.profile_image = image;
    }
    if let Some(banner) = edits.banner {
        form.banner_image = banner;
    }
    if let Some(twitter) = edits.twitter {
        form.twitter = twitter;
    }
    if let Some(website) = edits.website {
        form.website = website;
    }

    match arbitrator.submit().await {
        Ok(profile) => {
            let verb = match arbitrator.state() {
                ArbitrationState::Created(_) => "Created",
                _ => "Updated",
            };
            println!();
            print_success(&format!("{} profile @{}", verb, profile.username));
            print_profile(&profile);
        }
        Err(Error::UsernameTaken(username)) => {
            print_warning(&format!("'{}' was taken before it could be registered.", username));
        }
        Err(e) => print_error(&e.to_string()),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::Identity;
    use crate::memory_ledger::MemoryLedger;
    use crate::registry::ProfileFields;
    use std::sync::Arc;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_edit_saves_through_its_own_session() {
        let dir = tempdir().unwrap();
        let mut config = ClientConfig::default();
        config.data_dir = Some(dir.path().to_path_buf());
        config.session.identity = Some("xion1alice".to_string());

        let ledger = Arc::new(MemoryLedger::new("uxion"));
        ledger.insert_profile(
            ProfileFields {
                username: "alice".to_string(),
                name: "Alice".to_string(),
                ..Default::default()
            },
            &Identity::new("xion1alice").unwrap(),
        );
        let session = Session::new(config, ledger.clone());

        let edits = ProfileEdits {
            bio: Some("Builder".to_string()),
            ..Default::default()
        };
        edit_with(&session, edits).await.unwrap();

        // The save step reads the handoff instead of looking the wallet up again
        assert_eq!(ledger.query_count("get_profile_by_wallet"), 1);
        assert_eq!(ledger.execute_count("update_profile"), 1);
        let stored = session.registry().profile("alice").await.unwrap().unwrap();
        assert_eq!(stored.bio.as_deref(), Some("Builder"));
    }
}
