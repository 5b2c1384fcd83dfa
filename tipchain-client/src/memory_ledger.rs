//! In-Memory Ledger
//!
//! A [`LedgerClient`] that keeps native balances and the registry contract
//! state in memory. It enforces the registry's rules (unique usernames, one
//! profile per wallet, owner-only updates, no self-tipping) and records every
//! call it receives, with optional response delays and injected failures.
//! The test suite drives the client against it; it also backs offline demos.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::time::Duration;

use crate::error::LedgerError;
use crate::ledger::{Coin, FeeMode, Identity, LedgerClient, TxResult};
use crate::registry::{
    ExecuteMsg, Profile, ProfileFields, ProfileResponse, ProfilesResponse, QueryMsg, Timestamp,
    TipRecord, TipsResponse, UserStats,
};

/// Default page size the registry applies when no limit is given
const DEFAULT_LIMIT: usize = 30;

/// Genesis block time of the in-memory chain (nanoseconds)
const GENESIS_NANOS: u64 = 1_700_000_000_000_000_000;

/// Block time advance per transaction
const BLOCK_NANOS: u64 = 1_000_000_000;

/// A call received by the ledger
#[derive(Debug, Clone, PartialEq)]
pub enum LedgerCall {
    Query(Value),
    Execute { sender: String, msg: Value },
    SendValue { sender: String, recipient: String, coin: Coin },
    GetBalance { address: String },
}

/// Which response shape `is_username_available` answers with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AvailabilityShape {
    #[default]
    Canonical,
    NestedData,
    Bare,
}

#[derive(Default)]
struct Faults {
    send_failures: VecDeque<String>,
    record_failures: VecDeque<String>,
    query_failure: Option<String>,
    execute_outages: usize,
    availability_delays: HashMap<String, Duration>,
    availability_shape: AvailabilityShape,
}

#[derive(Default)]
struct State {
    balances: HashMap<String, u128>,
    profiles: BTreeMap<String, Profile>,
    wallet_to_username: HashMap<String, String>,
    tips: Vec<TipRecord>,
    calls: Vec<LedgerCall>,
    clock: u64,
    tx_count: u64,
    faults: Faults,
}

impl State {
    fn next_tx(&mut self) -> TxResult {
        self.tx_count += 1;
        self.clock += BLOCK_NANOS;
        TxResult {
            tx_hash: format!("{:064X}", self.tx_count),
            height: self.tx_count,
            gas_used: 0,
        }
    }

    fn now(&self) -> Timestamp {
        Timestamp::from_nanos(self.clock)
    }
}

/// In-memory ledger with registry contract semantics
pub struct MemoryLedger {
    denom: String,
    state: Mutex<State>,
}

impl MemoryLedger {
    pub fn new(denom: &str) -> Self {
        Self {
            denom: denom.to_string(),
            state: Mutex::new(State {
                clock: GENESIS_NANOS,
                ..Default::default()
            }),
        }
    }

    /// Set the native balance of an address
    pub fn set_balance(&self, address: &str, amount: u128) {
        self.state.lock().balances.insert(address.to_string(), amount);
    }

    pub fn balance_of(&self, address: &str) -> u128 {
        self.state.lock().balances.get(address).copied().unwrap_or(0)
    }

    /// Store a profile directly, bypassing registration rules
    pub fn insert_profile(&self, fields: ProfileFields, owner: &Identity) {
        let mut state = self.state.lock();
        let now = state.now();
        let mut profile = fields.into_profile(owner.clone());
        profile.created_at = Some(now);
        profile.updated_at = Some(now);
        state
            .wallet_to_username
            .insert(owner.to_string(), profile.username.clone());
        state.profiles.insert(profile.username.clone(), profile);
    }

    /// Stored tip records, oldest first
    pub fn tips(&self) -> Vec<TipRecord> {
        self.state.lock().tips.clone()
    }

    /// Every call received so far
    pub fn calls(&self) -> Vec<LedgerCall> {
        self.state.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    /// Number of value transfers received
    pub fn send_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, LedgerCall::SendValue { .. }))
            .count()
    }

    /// Number of contract queries of a given kind (e.g. `is_username_available`)
    pub fn query_count(&self, kind: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, LedgerCall::Query(msg) if msg.get(kind).is_some()))
            .count()
    }

    /// Number of executions of a given kind (e.g. `record_tip`)
    pub fn execute_count(&self, kind: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, LedgerCall::Execute { msg, .. } if msg.get(kind).is_some()))
            .count()
    }

    /// Reject the next value transfer with `reason`
    pub fn fail_next_send(&self, reason: &str) {
        self.state
            .lock()
            .faults
            .send_failures
            .push_back(reason.to_string());
    }

    /// Reject the next `record_tip` execution with `reason`
    pub fn fail_next_record(&self, reason: &str) {
        self.state
            .lock()
            .faults
            .record_failures
            .push_back(reason.to_string());
    }

    /// Fail the next execution as if no endpoint answered
    pub fn fail_next_execute_unreachable(&self) {
        self.state.lock().faults.execute_outages += 1;
    }

    /// Fail every query until cleared with `None`
    pub fn fail_queries(&self, reason: Option<&str>) {
        self.state.lock().faults.query_failure = reason.map(str::to_string);
    }

    /// Delay the availability answer for one username
    pub fn delay_availability(&self, username: &str, delay: Duration) {
        self.state
            .lock()
            .faults
            .availability_delays
            .insert(username.to_string(), delay);
    }

    pub fn set_availability_shape(&self, shape: AvailabilityShape) {
        self.state.lock().faults.availability_shape = shape;
    }

    fn to_value<T: Serialize>(value: &T) -> Result<Value, LedgerError> {
        Ok(serde_json::to_value(value)?)
    }

    fn run_query(&self, msg: QueryMsg) -> Result<Value, LedgerError> {
        let state = self.state.lock();
        match msg {
            QueryMsg::GetProfile { username } => Self::to_value(&ProfileResponse {
                profile: state.profiles.get(&username).cloned(),
            }),
            QueryMsg::GetProfileByWallet { wallet } => {
                let profile = state
                    .wallet_to_username
                    .get(&wallet)
                    .and_then(|u| state.profiles.get(u))
                    .cloned();
                Self::to_value(&ProfileResponse { profile })
            }
            QueryMsg::IsUsernameAvailable { username } => {
                let available = validate_username(&username).is_ok()
                    && !state.profiles.contains_key(&username);
                Ok(match state.faults.availability_shape {
                    AvailabilityShape::Canonical => serde_json::json!({ "is_available": available }),
                    AvailabilityShape::NestedData => {
                        serde_json::json!({ "data": { "is_available": available } })
                    }
                    AvailabilityShape::Bare => serde_json::json!({ "available": available }),
                })
            }
            QueryMsg::ListProfiles { limit, start_after } => {
                let limit = limit.map(|l| l as usize).unwrap_or(DEFAULT_LIMIT);
                let profiles = state
                    .profiles
                    .values()
                    .filter(|p| match &start_after {
                        Some(start) => p.username > *start,
                        None => true,
                    })
                    .take(limit)
                    .cloned()
                    .collect();
                Self::to_value(&ProfilesResponse { profiles })
            }
            QueryMsg::GetTipsReceived { username, limit } => {
                let tips = newest_first(&state.tips, limit, |t| t.to_username == username);
                Self::to_value(&TipsResponse { tips })
            }
            QueryMsg::GetTipsSent { username, limit } => {
                let tips = newest_first(&state.tips, limit, |t| t.from_username == username);
                Self::to_value(&TipsResponse { tips })
            }
            QueryMsg::GetUserStats { username } => {
                let mut stats = UserStats {
                    total_amount_sent: format!("0{}", self.denom),
                    total_amount_received: format!("0{}", self.denom),
                    ..Default::default()
                };
                if state.profiles.contains_key(&username) {
                    let mut sent = 0u128;
                    let mut received = 0u128;
                    for tip in &state.tips {
                        let amount = tip
                            .amount
                            .strip_suffix(self.denom.as_str())
                            .and_then(|a| a.parse::<u128>().ok())
                            .unwrap_or(0);
                        if tip.from_username == username {
                            stats.total_tips_sent += 1;
                            sent += amount;
                        }
                        if tip.to_username == username {
                            stats.total_tips_received += 1;
                            received += amount;
                        }
                    }
                    stats.total_amount_sent = format!("{}{}", sent, self.denom);
                    stats.total_amount_received = format!("{}{}", received, self.denom);
                }
                Self::to_value(&stats)
            }
        }
    }

    fn run_execute(&self, sender: &Identity, msg: ExecuteMsg) -> Result<TxResult, LedgerError> {
        let mut state = self.state.lock();
        let sender = sender.as_str().to_string();

        match msg {
            ExecuteMsg::RegisterProfile(fields) => {
                validate_username(&fields.username)?;
                if state.profiles.contains_key(&fields.username) {
                    return Err(LedgerError::Rejected(format!(
                        "Username '{}' already exists",
                        fields.username
                    )));
                }
                if let Some(existing) = state.wallet_to_username.get(&sender) {
                    return Err(LedgerError::Rejected(format!(
                        "Wallet address already registered with username '{}'",
                        existing
                    )));
                }
                let tx = state.next_tx();
                let now = state.now();
                let username = fields.username.clone();
                let owner = Identity::new(sender.clone())
                    .ok_or_else(|| LedgerError::Rejected("Unauthorized".to_string()))?;
                let mut profile = fields.into_profile(owner);
                profile.created_at = Some(now);
                profile.updated_at = Some(now);
                state.profiles.insert(username.clone(), profile);
                state.wallet_to_username.insert(sender, username);
                Ok(tx)
            }
            ExecuteMsg::UpdateProfile(fields) => {
                let owner = match state.profiles.get(&fields.username) {
                    Some(profile) => profile.owner.as_str().to_string(),
                    None => {
                        return Err(LedgerError::Rejected(format!(
                            "Username '{}' not found",
                            fields.username
                        )))
                    }
                };
                if owner != sender {
                    return Err(LedgerError::Rejected("Unauthorized".to_string()));
                }
                let tx = state.next_tx();
                let now = state.now();
                if let Some(profile) = state.profiles.get_mut(&fields.username) {
                    fields.apply_to(profile);
                    profile.updated_at = Some(now);
                }
                Ok(tx)
            }
            ExecuteMsg::RecordTip {
                to_username,
                amount,
                message,
            } => {
                if let Some(reason) = state.faults.record_failures.pop_front() {
                    return Err(LedgerError::Rejected(reason));
                }
                let from_username =
                    state.wallet_to_username.get(&sender).cloned().ok_or_else(|| {
                        LedgerError::Rejected(
                            "Sender wallet address not registered with a profile".to_string(),
                        )
                    })?;
                if from_username == to_username {
                    return Err(LedgerError::Rejected("Cannot tip yourself".to_string()));
                }
                if !state.profiles.contains_key(&to_username) {
                    return Err(LedgerError::Rejected(format!(
                        "Username '{}' not found",
                        to_username
                    )));
                }
                let tx = state.next_tx();
                let timestamp = state.now();
                state.tips.push(TipRecord {
                    from_username,
                    to_username,
                    amount,
                    message,
                    timestamp,
                });
                Ok(tx)
            }
        }
    }
}

fn newest_first(
    tips: &[TipRecord],
    limit: Option<u32>,
    filter: impl Fn(&TipRecord) -> bool,
) -> Vec<TipRecord> {
    let limit = limit.map(|l| l as usize).unwrap_or(DEFAULT_LIMIT);
    let mut selected: Vec<TipRecord> = tips.iter().filter(|t| filter(t)).cloned().collect();
    selected.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    selected.truncate(limit);
    selected
}

/// Username rule enforced by the registry contract
fn validate_username(username: &str) -> Result<(), LedgerError> {
    if username.len() < 3 || username.len() > 30 {
        return Err(LedgerError::Rejected(
            "Username must be between 3 and 30 characters".to_string(),
        ));
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(LedgerError::Rejected(format!(
            "Username '{}' contains invalid characters",
            username
        )));
    }
    Ok(())
}

#[async_trait]
impl LedgerClient for MemoryLedger {
    async fn query(&self, _contract: &str, msg: Value) -> Result<Value, LedgerError> {
        let delay = {
            let mut state = self.state.lock();
            state.calls.push(LedgerCall::Query(msg.clone()));
            if let Some(reason) = &state.faults.query_failure {
                return Err(LedgerError::Rejected(reason.clone()));
            }
            msg.get("is_username_available")
                .and_then(|q| q.get("username"))
                .and_then(Value::as_str)
                .and_then(|u| state.faults.availability_delays.get(u).copied())
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let parsed: QueryMsg = serde_json::from_value(msg)?;
        self.run_query(parsed)
    }

    async fn execute(
        &self,
        sender: &Identity,
        _contract: &str,
        msg: Value,
        _fee: FeeMode,
    ) -> Result<TxResult, LedgerError> {
        {
            let mut state = self.state.lock();
            state.calls.push(LedgerCall::Execute {
                sender: sender.to_string(),
                msg: msg.clone(),
            });
            if state.faults.execute_outages > 0 {
                state.faults.execute_outages -= 1;
                return Err(LedgerError::AllEndpointsFailed);
            }
        }
        let parsed: ExecuteMsg = serde_json::from_value(msg)?;
        self.run_execute(sender, parsed)
    }

    async fn send_value(
        &self,
        sender: &Identity,
        recipient: &str,
        coin: &Coin,
    ) -> Result<TxResult, LedgerError> {
        let mut state = self.state.lock();
        state.calls.push(LedgerCall::SendValue {
            sender: sender.to_string(),
            recipient: recipient.to_string(),
            coin: coin.clone(),
        });

        if let Some(reason) = state.faults.send_failures.pop_front() {
            return Err(LedgerError::Rejected(reason));
        }
        if coin.denom != self.denom {
            return Err(LedgerError::Rejected(format!(
                "unsupported denomination {}",
                coin.denom
            )));
        }

        let amount: u128 = coin
            .amount
            .parse()
            .map_err(|_| LedgerError::Rejected(format!("invalid coin amount {}", coin.amount)))?;
        let available = state.balances.get(sender.as_str()).copied().unwrap_or(0);
        if available < amount {
            return Err(LedgerError::Rejected(format!(
                "insufficient funds: {}{} is smaller than {}{}",
                available, self.denom, amount, self.denom
            )));
        }

        state
            .balances
            .insert(sender.as_str().to_string(), available - amount);
        *state.balances.entry(recipient.to_string()).or_default() += amount;
        Ok(state.next_tx())
    }

    async fn get_balance(&self, address: &str, denom: &str) -> Result<Coin, LedgerError> {
        let mut state = self.state.lock();
        state.calls.push(LedgerCall::GetBalance {
            address: address.to_string(),
        });
        let amount = if denom == self.denom {
            state.balances.get(address).copied().unwrap_or(0)
        } else {
            0
        };
        Ok(Coin::new(amount, denom))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(username: &str) -> ProfileFields {
        ProfileFields {
            username: username.to_string(),
            name: username.to_uppercase(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_register_rejects_duplicate_username_and_wallet() {
        let ledger = MemoryLedger::new("uxion");
        let alice = Identity::new("xion1alice").unwrap();
        let bob = Identity::new("xion1bob").unwrap();

        let msg = serde_json::to_value(ExecuteMsg::RegisterProfile(fields("alice"))).unwrap();
        ledger
            .execute(&alice, "registry", msg.clone(), FeeMode::Auto)
            .await
            .unwrap();

        let err = ledger
            .execute(&bob, "registry", msg, FeeMode::Auto)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("already exists"));

        let second = serde_json::to_value(ExecuteMsg::RegisterProfile(fields("alice2"))).unwrap();
        let err = ledger
            .execute(&alice, "registry", second, FeeMode::Auto)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("already registered"));
    }

    #[tokio::test]
    async fn test_send_value_moves_funds() {
        let ledger = MemoryLedger::new("uxion");
        ledger.set_balance("xion1alice", 10);
        let alice = Identity::new("xion1alice").unwrap();

        ledger
            .send_value(&alice, "xion1bob", &Coin::new(4, "uxion"))
            .await
            .unwrap();
        assert_eq!(ledger.balance_of("xion1alice"), 6);
        assert_eq!(ledger.balance_of("xion1bob"), 4);

        let err = ledger
            .send_value(&alice, "xion1bob", &Coin::new(7, "uxion"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("insufficient funds"));
    }

    #[tokio::test]
    async fn test_list_profiles_orders_and_pages() {
        let ledger = MemoryLedger::new("uxion");
        for name in ["carol", "alice", "bob"] {
            let owner = Identity::new(format!("xion1{}", name)).unwrap();
            ledger.insert_profile(fields(name), &owner);
        }

        let response = ledger
            .query("registry", json!({ "list_profiles": { "limit": 2 } }))
            .await
            .unwrap();
        let page: ProfilesResponse = serde_json::from_value(response).unwrap();
        let names: Vec<_> = page.profiles.iter().map(|p| p.username.as_str()).collect();
        assert_eq!(names, vec!["alice", "bob"]);

        let response = ledger
            .query(
                "registry",
                json!({ "list_profiles": { "limit": 2, "start_after": "bob" } }),
            )
            .await
            .unwrap();
        let page: ProfilesResponse = serde_json::from_value(response).unwrap();
        assert_eq!(page.profiles.len(), 1);
        assert_eq!(page.profiles[0].username, "carol");
    }
}
