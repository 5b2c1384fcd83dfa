//! Balance Tracking
//!
//! Holds the last confirmed balance of the active identity, the amount the
//! user is about to tip, and the predicted balance after that tip. A fresh
//! ledger read always replaces the snapshot; a local debit after a confirmed
//! transfer marks it stale until the next read.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::debug;

use crate::amount::AmountCodec;
use crate::error::Result;
use crate::ledger::{Identity, LedgerClient};

/// Last confirmed balance read for an identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceSnapshot {
    pub identity: Identity,
    /// Confirmed balance in minimal units
    pub confirmed_amount: u128,
    /// When the ledger reported it
    pub as_of: DateTime<Utc>,
}

/// Tracks the spendable balance of one identity
pub struct BalanceTracker {
    ledger: Arc<dyn LedgerClient>,
    identity: Identity,
    codec: AmountCodec,
    snapshot: Option<BalanceSnapshot>,
    pending_amount: u128,
    stale: bool,
}

impl BalanceTracker {
    pub fn new(ledger: Arc<dyn LedgerClient>, identity: Identity, codec: AmountCodec) -> Self {
        Self {
            ledger,
            identity,
            codec,
            snapshot: None,
            pending_amount: 0,
            stale: false,
        }
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn codec(&self) -> &AmountCodec {
        &self.codec
    }

    /// Read the balance from the ledger and replace the snapshot
    pub async fn refresh(&mut self) -> Result<u128> {
        let coin = self
            .ledger
            .get_balance(self.identity.as_str(), self.codec.minimal_denom())
            .await?;
        let confirmed = self.codec.parse_coin_string(&coin.amount)?;

        debug!("Balance for {}: {} {}", self.identity, confirmed, coin.denom);
        self.snapshot = Some(BalanceSnapshot {
            identity: self.identity.clone(),
            confirmed_amount: confirmed,
            as_of: Utc::now(),
        });
        self.stale = false;
        Ok(confirmed)
    }

    pub fn snapshot(&self) -> Option<&BalanceSnapshot> {
        self.snapshot.as_ref()
    }

    /// Last confirmed (or locally debited) balance, if ever read
    pub fn confirmed_amount(&self) -> Option<u128> {
        self.snapshot.as_ref().map(|s| s.confirmed_amount)
    }

    /// Whether a local debit has been applied since the last ledger read
    pub fn is_stale(&self) -> bool {
        self.stale
    }

    /// Record the amount the user is about to tip, as typed. Input that does
    /// not parse counts as zero; it is rejected later, at submission.
    pub fn set_pending(&mut self, amount_display: &str) {
        self.pending_amount = self.codec.to_minimal(amount_display).unwrap_or(0);
    }

    pub fn pending_amount(&self) -> u128 {
        self.pending_amount
    }

    /// Balance left after `pending`, clamped at zero
    pub fn predict(&self, pending: u128) -> u128 {
        self.confirmed_amount().unwrap_or(0).saturating_sub(pending)
    }

    /// Balance left after the pending amount
    pub fn predicted_amount(&self) -> u128 {
        self.predict(self.pending_amount)
    }

    /// Optimistically subtract a confirmed transfer without a ledger read
    pub fn apply_debit(&mut self, amount: u128) {
        if let Some(snapshot) = self.snapshot.as_mut() {
            snapshot.confirmed_amount = snapshot.confirmed_amount.saturating_sub(amount);
            self.stale = true;
            debug!(
                "Applied local debit of {}, balance now {}",
                amount, snapshot.confirmed_amount
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_ledger::MemoryLedger;

    fn tracker(balance: u128) -> BalanceTracker {
        let ledger = Arc::new(MemoryLedger::new("uxion"));
        ledger.set_balance("xion1alice", balance);
        BalanceTracker::new(
            ledger,
            Identity::new("xion1alice").unwrap(),
            AmountCodec::default(),
        )
    }

    #[tokio::test]
    async fn test_refresh_replaces_snapshot() {
        let mut tracker = tracker(10_000_000);
        assert_eq!(tracker.confirmed_amount(), None);
        assert_eq!(tracker.refresh().await.unwrap(), 10_000_000);
        assert_eq!(tracker.confirmed_amount(), Some(10_000_000));
        assert_eq!(tracker.snapshot().unwrap().identity.as_str(), "xion1alice");
    }

    #[tokio::test]
    async fn test_predict_clamps_at_zero() {
        let mut tracker = tracker(10_000_000);
        tracker.refresh().await.unwrap();

        tracker.set_pending("4");
        assert_eq!(tracker.predicted_amount(), 6_000_000);

        tracker.set_pending("15");
        assert_eq!(tracker.predicted_amount(), 0);

        tracker.set_pending("not a number");
        assert_eq!(tracker.pending_amount(), 0);
        assert_eq!(tracker.predicted_amount(), 10_000_000);
    }

    #[tokio::test]
    async fn test_debit_marks_stale_until_refresh() {
        let mut tracker = tracker(10_000_000);
        tracker.refresh().await.unwrap();

        tracker.apply_debit(3_000_000);
        assert_eq!(tracker.confirmed_amount(), Some(7_000_000));
        assert!(tracker.is_stale());

        tracker.refresh().await.unwrap();
        assert_eq!(tracker.confirmed_amount(), Some(10_000_000));
        assert!(!tracker.is_stale());
    }
}
