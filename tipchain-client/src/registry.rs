//! Registry Gateway
//!
//! Typed access to the profile/tip registry contract. Builds the contract's
//! query and execute messages, sends them through a [`LedgerClient`] and
//! decodes the raw JSON responses.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use serde_with::{serde_as, DisplayFromStr, PickFirst};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::{Error, LedgerError, Result};
use crate::ledger::{FeeMode, Identity, LedgerClient, TxResult};

/// Ledger timestamp in nanoseconds since the Unix epoch
#[serde_as]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(#[serde_as(as = "PickFirst<(DisplayFromStr, _)>")] pub u64);

impl Timestamp {
    pub fn from_nanos(nanos: u64) -> Self {
        Self(nanos)
    }

    pub fn nanos(&self) -> u64 {
        self.0
    }

    pub fn seconds(&self) -> u64 {
        self.0 / 1_000_000_000
    }
}

/// Social links attached to a profile
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SocialLinks {
    #[serde(default)]
    pub twitter: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
}

/// A registered profile
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    /// Unique, immutable username
    pub username: String,
    #[serde(rename = "name")]
    pub display_name: String,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(rename = "profile_picture", default)]
    pub profile_image: Option<String>,
    #[serde(default)]
    pub banner_image: Option<String>,
    #[serde(flatten)]
    pub social_links: SocialLinks,
    /// Wallet that owns the profile and receives tips
    #[serde(rename = "wallet_address")]
    pub owner: Identity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<Timestamp>,
}

/// A recorded tip
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TipRecord {
    pub from_username: String,
    pub to_username: String,
    /// Coin string, e.g. `5000000uxion`
    pub amount: String,
    #[serde(default)]
    pub message: Option<String>,
    pub timestamp: Timestamp,
}

/// Aggregate tip statistics for a username
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserStats {
    pub total_tips_sent: u64,
    pub total_tips_received: u64,
    pub total_amount_sent: String,
    pub total_amount_received: String,
}

/// Full field set for `register_profile` / `update_profile`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileFields {
    pub username: String,
    pub name: String,
    pub bio: Option<String>,
    pub profile_picture: Option<String>,
    pub banner_image: Option<String>,
    pub twitter: Option<String>,
    pub website: Option<String>,
}

impl ProfileFields {
    /// The profile these fields describe once stored for `owner`
    pub fn into_profile(self, owner: Identity) -> Profile {
        Profile {
            username: self.username,
            display_name: self.name,
            bio: self.bio,
            profile_image: self.profile_picture,
            banner_image: self.banner_image,
            social_links: SocialLinks {
                twitter: self.twitter,
                website: self.website,
            },
            owner,
            created_at: None,
            updated_at: None,
        }
    }

    /// Apply an `update_profile` to a stored profile. The display name is
    /// always replaced; an optional field left `None` keeps its old value.
    pub fn apply_to(self, profile: &mut Profile) {
        profile.display_name = self.name;
        if self.bio.is_some() {
            profile.bio = self.bio;
        }
        if self.profile_picture.is_some() {
            profile.profile_image = self.profile_picture;
        }
        if self.banner_image.is_some() {
            profile.banner_image = self.banner_image;
        }
        if self.twitter.is_some() {
            profile.social_links.twitter = self.twitter;
        }
        if self.website.is_some() {
            profile.social_links.website = self.website;
        }
    }
}

impl From<&Profile> for ProfileFields {
    fn from(profile: &Profile) -> Self {
        Self {
            username: profile.username.clone(),
            name: profile.display_name.clone(),
            bio: profile.bio.clone(),
            profile_picture: profile.profile_image.clone(),
            banner_image: profile.banner_image.clone(),
            twitter: profile.social_links.twitter.clone(),
            website: profile.social_links.website.clone(),
        }
    }
}

/// Registry query messages
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryMsg {
    GetProfile {
        username: String,
    },
    GetProfileByWallet {
        wallet: String,
    },
    IsUsernameAvailable {
        username: String,
    },
    ListProfiles {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        limit: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        start_after: Option<String>,
    },
    GetTipsReceived {
        username: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        limit: Option<u32>,
    },
    GetTipsSent {
        username: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        limit: Option<u32>,
    },
    GetUserStats {
        username: String,
    },
}

/// Registry execute messages
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecuteMsg {
    RegisterProfile(ProfileFields),
    UpdateProfile(ProfileFields),
    RecordTip {
        to_username: String,
        amount: String,
        message: Option<String>,
    },
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProfileResponse {
    pub profile: Option<Profile>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProfilesResponse {
    pub profiles: Vec<Profile>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TipsResponse {
    pub tips: Vec<TipRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UsernameAvailableResponse {
    pub is_available: bool,
}

/// Decode an `is_username_available` response.
///
/// Compatibility shim: the canonical shape is `{"is_available": bool}`.
/// Older registry deployments (and some relays) answered with
/// `{"data": {"is_available": bool}}` or `{"available": bool}`; those are
/// accepted as deprecated fallbacks, in that order, and logged. Anything
/// else is a decode failure rather than a silent "taken".
pub fn decode_availability(response: &Value) -> Result<bool> {
    if let Some(available) = response.get("is_available").and_then(Value::as_bool) {
        return Ok(available);
    }

    if let Some(available) = response
        .get("data")
        .and_then(|d| d.get("is_available"))
        .and_then(Value::as_bool)
    {
        warn!("Registry answered availability with deprecated `data.is_available` shape");
        return Ok(available);
    }

    if let Some(available) = response.get("available").and_then(Value::as_bool) {
        warn!("Registry answered availability with deprecated `available` shape");
        return Ok(available);
    }

    Err(Error::NetworkError(format!(
        "unrecognized availability response: {}",
        response
    )))
}

/// Typed gateway to the registry contract
#[derive(Clone)]
pub struct RegistryGateway {
    ledger: Arc<dyn LedgerClient>,
    contract: String,
}

impl RegistryGateway {
    pub fn new(ledger: Arc<dyn LedgerClient>, contract: &str) -> Self {
        Self {
            ledger,
            contract: contract.to_string(),
        }
    }

    pub fn contract(&self) -> &str {
        &self.contract
    }

    pub fn ledger(&self) -> &Arc<dyn LedgerClient> {
        &self.ledger
    }

    async fn query_raw(&self, msg: &QueryMsg) -> Result<Value> {
        let msg = serde_json::to_value(msg).map_err(|e| Error::NetworkError(e.to_string()))?;
        debug!("Registry query: {}", msg);
        Ok(self.ledger.query(&self.contract, msg).await?)
    }

    async fn query<T: DeserializeOwned>(&self, msg: &QueryMsg) -> Result<T> {
        let raw = self.query_raw(msg).await?;
        serde_json::from_value(raw)
            .map_err(|e| Error::NetworkError(format!("unexpected registry response: {}", e)))
    }

    async fn execute(
        &self,
        sender: &Identity,
        msg: &ExecuteMsg,
    ) -> std::result::Result<TxResult, LedgerError> {
        let msg = serde_json::to_value(msg)?;
        debug!("Registry execute from {}: {}", sender, msg);
        self.ledger
            .execute(sender, &self.contract, msg, FeeMode::Auto)
            .await
    }

    /// Profile owned by a wallet, if any
    pub async fn profile_by_wallet(&self, wallet: &Identity) -> Result<Option<Profile>> {
        let response: ProfileResponse = self
            .query(&QueryMsg::GetProfileByWallet {
                wallet: wallet.to_string(),
            })
            .await?;
        Ok(response.profile)
    }

    /// Profile registered under a username, if any
    pub async fn profile(&self, username: &str) -> Result<Option<Profile>> {
        let response: ProfileResponse = self
            .query(&QueryMsg::GetProfile {
                username: username.to_string(),
            })
            .await?;
        Ok(response.profile)
    }

    /// Whether a username is still free
    pub async fn is_username_available(&self, username: &str) -> Result<bool> {
        let raw = self
            .query_raw(&QueryMsg::IsUsernameAvailable {
                username: username.to_string(),
            })
            .await?;
        decode_availability(&raw)
    }

    /// Up to `limit` profiles ordered by username, strictly after `start_after`
    pub async fn list_profiles(
        &self,
        limit: u32,
        start_after: Option<&str>,
    ) -> Result<Vec<Profile>> {
        let response: ProfilesResponse = self
            .query(&QueryMsg::ListProfiles {
                limit: Some(limit),
                start_after: start_after.map(str::to_string),
            })
            .await?;
        Ok(response.profiles)
    }

    pub async fn tips_received(&self, username: &str, limit: u32) -> Result<Vec<TipRecord>> {
        let response: TipsResponse = self
            .query(&QueryMsg::GetTipsReceived {
                username: username.to_string(),
                limit: Some(limit),
            })
            .await?;
        Ok(response.tips)
    }

    pub async fn tips_sent(&self, username: &str, limit: u32) -> Result<Vec<TipRecord>> {
        let response: TipsResponse = self
            .query(&QueryMsg::GetTipsSent {
                username: username.to_string(),
                limit: Some(limit),
            })
            .await?;
        Ok(response.tips)
    }

    pub async fn user_stats(&self, username: &str) -> Result<UserStats> {
        self.query(&QueryMsg::GetUserStats {
            username: username.to_string(),
        })
        .await
    }

    /// Register a new profile. A registry rejection is returned as
    /// `ValidationError` carrying the registry's message; a transport
    /// failure is a `NetworkError`.
    pub async fn register(&self, sender: &Identity, fields: &ProfileFields) -> Result<TxResult> {
        self.execute(sender, &ExecuteMsg::RegisterProfile(fields.clone()))
            .await
            .map_err(classify_rejection)
    }

    /// Update the sender's existing profile
    pub async fn update(&self, sender: &Identity, fields: &ProfileFields) -> Result<TxResult> {
        self.execute(sender, &ExecuteMsg::UpdateProfile(fields.clone()))
            .await
            .map_err(classify_rejection)
    }

    /// Append a tip record attributed to `sender`. The raw failure reason is
    /// returned so the caller can classify it against the transfer state.
    pub async fn record_tip(
        &self,
        sender: &Identity,
        to_username: &str,
        amount: &str,
        message: Option<&str>,
    ) -> std::result::Result<TxResult, String> {
        self.execute(
            sender,
            &ExecuteMsg::RecordTip {
                to_username: to_username.to_string(),
                amount: amount.to_string(),
                message: message.map(str::to_string),
            },
        )
        .await
        .map_err(|e| e.to_string())
    }
}

/// Contract rejections are the caller's to fix; anything else never reached
/// the registry's rules.
fn classify_rejection(err: LedgerError) -> Error {
    match err {
        LedgerError::Rejected(reason) | LedgerError::Rpc { message: reason, .. } => {
            Error::ValidationError(reason)
        }
        other => other.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_query_messages_match_contract_shape() {
        let msg = serde_json::to_value(QueryMsg::IsUsernameAvailable {
            username: "alice".to_string(),
        })
        .unwrap();
        assert_eq!(msg, json!({ "is_username_available": { "username": "alice" } }));

        let msg = serde_json::to_value(QueryMsg::ListProfiles {
            limit: Some(50),
            start_after: None,
        })
        .unwrap();
        assert_eq!(msg, json!({ "list_profiles": { "limit": 50 } }));
    }

    #[test]
    fn test_execute_messages_match_contract_shape() {
        let fields = ProfileFields {
            username: "alice".to_string(),
            name: "Alice".to_string(),
            ..Default::default()
        };
        let msg = serde_json::to_value(ExecuteMsg::RegisterProfile(fields)).unwrap();
        assert_eq!(msg["register_profile"]["username"], "alice");
        assert_eq!(msg["register_profile"]["name"], "Alice");
        assert!(msg["register_profile"]["bio"].is_null());

        let msg = serde_json::to_value(ExecuteMsg::RecordTip {
            to_username: "bob".to_string(),
            amount: "5000000uxion".to_string(),
            message: None,
        })
        .unwrap();
        assert_eq!(msg["record_tip"]["to_username"], "bob");
    }

    #[test]
    fn test_profile_decodes_contract_json() {
        let raw = json!({
            "username": "alice",
            "name": "Alice",
            "bio": null,
            "profile_picture": "https://img/alice.png",
            "banner_image": null,
            "twitter": "@alice",
            "website": null,
            "wallet_address": "xion1alice",
            "created_at": "1700000000000000000",
            "updated_at": "1700000000000000000"
        });
        let profile: Profile = serde_json::from_value(raw).unwrap();
        assert_eq!(profile.display_name, "Alice");
        assert_eq!(profile.profile_image.as_deref(), Some("https://img/alice.png"));
        assert_eq!(profile.social_links.twitter.as_deref(), Some("@alice"));
        assert_eq!(profile.owner.as_str(), "xion1alice");
        assert_eq!(profile.created_at.unwrap().seconds(), 1_700_000_000);
    }

    #[test]
    fn test_decode_availability_canonical_first() {
        assert!(decode_availability(&json!({ "is_available": true })).unwrap());
        assert!(!decode_availability(&json!({ "is_available": false, "available": true })).unwrap());
    }

    #[test]
    fn test_only_contract_rejections_are_validation_errors() {
        let rejected = classify_rejection(LedgerError::Rejected("Unauthorized".to_string()));
        assert_eq!(rejected, Error::ValidationError("Unauthorized".to_string()));

        let rpc = classify_rejection(LedgerError::Rpc {
            code: -32000,
            message: "Username 'bob' already exists".to_string(),
        });
        assert_eq!(rpc, Error::ValidationError("Username 'bob' already exists".to_string()));

        for err in [LedgerError::AllEndpointsFailed, LedgerError::Status(502)] {
            let err = classify_rejection(err);
            assert!(matches!(err, Error::NetworkError(_)));
            assert!(!err.is_validation());
        }
    }

    #[test]
    fn test_decode_availability_fallbacks() {
        assert!(decode_availability(&json!({ "data": { "is_available": true } })).unwrap());
        assert!(!decode_availability(&json!({ "available": false })).unwrap());
        assert!(matches!(
            decode_availability(&json!({ "free": true })),
            Err(Error::NetworkError(_))
        ));
    }
}
