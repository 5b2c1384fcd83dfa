//! Profile Views
//!
//! Read-only views assembled from several registry queries. The queries
//! are independent and run concurrently; any that fails leaves its part of
//! the view empty and adds a notice instead of failing the whole view.

use tracing::{debug, warn};

use crate::balance::BalanceTracker;
use crate::error::{RecoveryAction, Result};
use crate::ledger::Identity;
use crate::registry::{Profile, RegistryGateway, TipRecord, UserStats};

/// Tips shown per list on the owner's dashboard
pub const DASHBOARD_TIP_LIMIT: u32 = 20;

/// Tips shown on a public profile page
pub const PUBLIC_TIP_LIMIT: u32 = 10;

/// What a view shows when there is no profile to render
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recovery {
    pub action: RecoveryAction,
    pub message: String,
}

/// The connected identity's own profile with its tip activity
#[derive(Debug, Clone)]
pub struct ProfileDashboard {
    pub profile: Profile,
    pub tips_received: Vec<TipRecord>,
    pub tips_sent: Vec<TipRecord>,
    pub stats: Option<UserStats>,
    /// Balance in minimal units
    pub balance: Option<u128>,
    pub notices: Vec<String>,
}

/// Outcome of loading a view
#[derive(Debug, Clone)]
pub enum View<T> {
    Ready(T),
    Recover(Recovery),
}

fn degrade<T: Default>(result: Result<T>, what: &str, notices: &mut Vec<String>) -> T {
    match result {
        Ok(value) => value,
        Err(e) => {
            warn!("Could not load {}: {}", what, e);
            notices.push(format!("Could not load {}: {}", what, e));
            T::default()
        }
    }
}

impl ProfileDashboard {
    /// Load the dashboard for the tracker's identity
    pub async fn load(
        registry: &RegistryGateway,
        balance: &mut BalanceTracker,
    ) -> Result<View<Self>> {
        let identity: Identity = balance.identity().clone();

        let profile = match registry.profile_by_wallet(&identity).await? {
            Some(profile) => profile,
            None => {
                return Ok(View::Recover(Recovery {
                    action: RecoveryAction::CreateProfile,
                    message: "You don't have a profile yet.".to_string(),
                }))
            }
        };
        debug!("Loading dashboard for '{}'", profile.username);

        let (received, sent, stats, refreshed) = futures::join!(
            registry.tips_received(&profile.username, DASHBOARD_TIP_LIMIT),
            registry.tips_sent(&profile.username, DASHBOARD_TIP_LIMIT),
            registry.user_stats(&profile.username),
            balance.refresh(),
        );

        let mut notices = Vec::new();
        let tips_received = degrade(received, "tips received", &mut notices);
        let tips_sent = degrade(sent, "tips sent", &mut notices);
        let stats = degrade(stats.map(Some), "stats", &mut notices);
        let balance = degrade(refreshed.map(Some), "balance", &mut notices);

        Ok(View::Ready(Self {
            profile,
            tips_received,
            tips_sent,
            stats,
            balance,
            notices,
        }))
    }
}

/// A profile as anyone can see it
#[derive(Debug, Clone)]
pub struct ProfilePage {
    pub profile: Profile,
    pub recent_tips: Vec<TipRecord>,
    pub notices: Vec<String>,
}

impl ProfilePage {
    pub async fn load(registry: &RegistryGateway, username: &str) -> Result<View<Self>> {
        let username = username.trim().to_lowercase();

        let profile = match registry.profile(&username).await? {
            Some(profile) => profile,
            None => {
                return Ok(View::Recover(Recovery {
                    action: RecoveryAction::BrowseProfiles,
                    message: format!("Profile '{}' not found.", username),
                }))
            }
        };

        let mut notices = Vec::new();
        let recent_tips = degrade(
            registry.tips_received(&username, PUBLIC_TIP_LIMIT).await,
            "recent tips",
            &mut notices,
        );

        Ok(View::Ready(Self {
            profile,
            recent_tips,
            notices,
        }))
    }
}
