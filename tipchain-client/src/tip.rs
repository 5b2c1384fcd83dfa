//! Tip Commitment
//!
//! Sending a tip is two ledger calls that cannot be made atomic: a native
//! value transfer to the recipient's wallet, then a registry call that
//! records the tip. The protocol runs them strictly in order:
//!
//! ```text
//! Idle -> Validating -> Transferring -> Recording -> Settled
//!            |               |              |
//!         Rejected     TransferFailed   RecordFailed { transferred: true }
//! ```
//!
//! The transfer is sent exactly once and never retried. If the record call
//! fails after the transfer confirmed, the tip is reported as sent with its
//! record pending, and only the record call may be retried.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::balance::BalanceTracker;
use crate::error::{Error, Result};
use crate::ledger::{Coin, Identity};
use crate::registry::RegistryGateway;

/// Amount the tip form starts with
pub const DEFAULT_TIP_AMOUNT: &str = "5";

/// How long a settled tip stays visible
pub const SUCCESS_DISPLAY: Duration = Duration::from_secs(5);

/// A tip as entered by the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TipRequest {
    pub recipient_username: String,
    /// Amount in display units, as typed
    pub amount_display: String,
    pub message: Option<String>,
}

/// A fully committed tip
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TipReceipt {
    pub recipient_username: String,
    pub recipient_address: Identity,
    pub amount_minimal: u128,
    pub transfer_tx: String,
    pub record_tx: String,
}

/// A tip whose transfer confirmed but whose record did not
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingRecord {
    pub sender: Identity,
    pub to_username: String,
    /// Coin string passed to the registry
    pub amount: String,
    pub amount_minimal: u128,
    pub message: Option<String>,
    /// Hash of the transfer that already moved the value
    pub transfer_tx: String,
}

/// Protocol state
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TipState {
    #[default]
    Idle,
    Validating,
    Transferring,
    Recording,
    Settled(TipReceipt),
    Rejected(Error),
    TransferFailed(String),
    RecordFailed { transferred: bool },
}

impl TipState {
    pub fn name(&self) -> &'static str {
        match self {
            TipState::Idle => "idle",
            TipState::Validating => "validating",
            TipState::Transferring => "transferring",
            TipState::Recording => "recording",
            TipState::Settled(_) => "settled",
            TipState::Rejected(_) => "rejected",
            TipState::TransferFailed(_) => "transfer_failed",
            TipState::RecordFailed { .. } => "record_failed",
        }
    }
}

/// Editable tip form fields
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TipForm {
    pub amount: String,
    pub message: String,
}

/// Tunables for the protocol
#[derive(Debug, Clone)]
pub struct TipOptions {
    pub default_amount: String,
    pub success_display: Duration,
    /// Re-read the balance after a tip settles
    pub refresh_after_settle: bool,
}

impl Default for TipOptions {
    fn default() -> Self {
        Self {
            default_amount: DEFAULT_TIP_AMOUNT.to_string(),
            success_display: SUCCESS_DISPLAY,
            refresh_after_settle: true,
        }
    }
}

/// Two-step tip commit for one sender
pub struct TipCommitProtocol {
    registry: RegistryGateway,
    balance: BalanceTracker,
    options: TipOptions,
    state: TipState,
    form: TipForm,
    pending: Option<PendingRecord>,
    success_until: Option<Instant>,
}

impl TipCommitProtocol {
    pub fn new(registry: RegistryGateway, balance: BalanceTracker, options: TipOptions) -> Self {
        let form = TipForm {
            amount: options.default_amount.clone(),
            message: String::new(),
        };
        Self {
            registry,
            balance,
            options,
            state: TipState::Idle,
            form,
            pending: None,
            success_until: None,
        }
    }

    pub fn state(&self) -> &TipState {
        &self.state
    }

    pub fn form(&self) -> &TipForm {
        &self.form
    }

    pub fn balance(&self) -> &BalanceTracker {
        &self.balance
    }

    pub fn balance_mut(&mut self) -> &mut BalanceTracker {
        &mut self.balance
    }

    pub fn sender(&self) -> &Identity {
        self.balance.identity()
    }

    /// Record awaiting a retry, if the last tip stopped after its transfer
    pub fn pending_record(&self) -> Option<&PendingRecord> {
        self.pending.as_ref()
    }

    /// Hand the pending record over, e.g. once it has been persisted
    pub fn take_pending(&mut self) -> Option<PendingRecord> {
        let pending = self.pending.take();
        if pending.is_some() {
            self.transition(TipState::Idle);
        }
        pending
    }

    fn unrecorded_transfer(&self) -> Option<Error> {
        self.pending.as_ref().map(|pending| {
            Error::ValidationError(format!(
                "transfer {} to {} is not recorded yet; retry its record first",
                pending.transfer_tx, pending.to_username
            ))
        })
    }

    pub fn set_amount(&mut self, amount: &str) {
        self.form.amount = amount.to_string();
        self.balance.set_pending(amount);
    }

    pub fn set_message(&mut self, message: &str) {
        self.form.message = message.to_string();
    }

    fn transition(&mut self, next: TipState) {
        debug!("Tip state {} -> {}", self.state.name(), next.name());
        self.state = next;
    }

    fn reject(&mut self, err: Error) -> Error {
        info!("Tip rejected: {}", err);
        self.transition(TipState::Rejected(err.clone()));
        err
    }

    /// Submit the current form to `recipient`
    pub async fn submit_form(&mut self, recipient: &str) -> Result<TipReceipt> {
        let message = self.form.message.trim();
        let request = TipRequest {
            recipient_username: recipient.to_string(),
            amount_display: self.form.amount.clone(),
            message: (!message.is_empty()).then(|| message.to_string()),
        };
        self.submit(request).await
    }

    /// Validate, transfer, then record a tip
    pub async fn submit(&mut self, request: TipRequest) -> Result<TipReceipt> {
        // A moved but unrecorded tip must not be dropped by a new one
        if let Some(err) = self.unrecorded_transfer() {
            warn!("Tip refused: {}", err);
            return Err(err);
        }

        self.transition(TipState::Validating);
        self.success_until = None;
        self.balance.set_pending(&request.amount_display);

        let amount = match self.balance.codec().to_minimal(&request.amount_display) {
            Ok(0) => {
                return Err(self.reject(Error::InvalidAmount(
                    "amount must be greater than zero".to_string(),
                )))
            }
            Ok(amount) => amount,
            Err(e) => return Err(self.reject(e)),
        };

        // Only the last confirmed read counts, never the prediction
        let confirmed = match self.balance.confirmed_amount() {
            Some(confirmed) => confirmed,
            None => match self.balance.refresh().await {
                Ok(confirmed) => confirmed,
                Err(e) => return Err(self.reject(e)),
            },
        };
        if amount > confirmed {
            return Err(self.reject(Error::InsufficientBalance {
                available: confirmed,
                requested: amount,
            }));
        }

        let username = request.recipient_username.trim().to_lowercase();
        if username.is_empty() {
            return Err(self.reject(Error::ValidationError(
                "recipient username is required".to_string(),
            )));
        }

        let recipient = match self.registry.profile(&username).await {
            Ok(Some(profile)) => profile,
            Ok(None) => {
                return Err(self.reject(Error::RecipientUnresolved {
                    username,
                    reason: "no profile is registered under this username".to_string(),
                }))
            }
            Err(e) => {
                return Err(self.reject(Error::RecipientUnresolved {
                    username,
                    reason: e.to_string(),
                }))
            }
        };

        if &recipient.owner == self.sender() {
            return Err(self.reject(Error::ValidationError(
                "you cannot tip your own profile".to_string(),
            )));
        }

        self.transition(TipState::Transferring);
        let coin = Coin::new(amount, self.balance.codec().minimal_denom());
        info!(
            "Sending {} to {} ({})",
            self.balance.codec().format(amount),
            username,
            recipient.owner
        );

        let transfer = match self
            .registry
            .ledger()
            .send_value(self.sender(), recipient.owner.as_str(), &coin)
            .await
        {
            Ok(tx) => tx,
            Err(e) => {
                let reason = e.to_string();
                warn!("Transfer to {} failed: {}", username, reason);
                self.transition(TipState::TransferFailed(reason.clone()));
                return Err(Error::TransferFailed(reason));
            }
        };

        // The value has left the wallet whatever happens to the record
        self.balance.apply_debit(amount);

        let pending = PendingRecord {
            sender: self.sender().clone(),
            to_username: username,
            amount: self.balance.codec().coin_string(amount),
            amount_minimal: amount,
            message: request
                .message
                .map(|m| m.trim().to_string())
                .filter(|m| !m.is_empty()),
            transfer_tx: transfer.tx_hash,
        };

        self.record(pending, recipient.owner).await
    }

    /// Re-issue only the record call of the pending tip. Never transfers.
    pub async fn retry_record(&mut self) -> Result<TipReceipt> {
        let pending = self.pending.take().ok_or_else(|| {
            Error::ValidationError("there is no pending tip record to retry".to_string())
        })?;

        let recipient_address = match self.registry.profile(&pending.to_username).await {
            Ok(Some(profile)) => profile.owner,
            Ok(None) => {
                let reason = format!("profile '{}' no longer exists", pending.to_username);
                return Err(self.record_failed(pending, reason));
            }
            Err(e) => return Err(self.record_failed(pending, e.to_string())),
        };

        self.record(pending, recipient_address).await
    }

    /// Resume a pending record persisted by an earlier session
    pub fn restore_pending(&mut self, record: PendingRecord) -> Result<()> {
        if &record.sender != self.sender() {
            return Err(Error::ValidationError(format!(
                "pending record belongs to {}, not {}",
                record.sender,
                self.sender()
            )));
        }
        if self
            .pending
            .as_ref()
            .is_some_and(|p| p.transfer_tx != record.transfer_tx)
        {
            if let Some(err) = self.unrecorded_transfer() {
                return Err(err);
            }
        }
        self.pending = Some(record);
        self.transition(TipState::RecordFailed { transferred: true });
        Ok(())
    }

    async fn record(
        &mut self,
        pending: PendingRecord,
        recipient_address: Identity,
    ) -> Result<TipReceipt> {
        self.transition(TipState::Recording);

        let result = self
            .registry
            .record_tip(
                &pending.sender,
                &pending.to_username,
                &pending.amount,
                pending.message.as_deref(),
            )
            .await;

        match result {
            Ok(tx) => {
                let receipt = TipReceipt {
                    recipient_username: pending.to_username,
                    recipient_address,
                    amount_minimal: pending.amount_minimal,
                    transfer_tx: pending.transfer_tx,
                    record_tx: tx.tx_hash,
                };
                self.settle(receipt.clone()).await;
                Ok(receipt)
            }
            Err(reason) => Err(self.record_failed(pending, reason)),
        }
    }

    fn record_failed(&mut self, pending: PendingRecord, reason: String) -> Error {
        warn!(
            "Tip to {} sent in {} but not recorded: {}",
            pending.to_username, pending.transfer_tx, reason
        );
        let err = Error::RecordFailed {
            transferred: true,
            tx_hash: Some(pending.transfer_tx.clone()),
            reason,
        };
        self.pending = Some(pending);
        self.transition(TipState::RecordFailed { transferred: true });
        err
    }

    async fn settle(&mut self, receipt: TipReceipt) {
        info!(
            "Tip to {} settled (transfer {}, record {})",
            receipt.recipient_username, receipt.transfer_tx, receipt.record_tx
        );
        self.pending = None;
        self.form = TipForm {
            amount: self.options.default_amount.clone(),
            message: String::new(),
        };
        self.balance.set_pending(&self.options.default_amount);
        self.success_until = Some(Instant::now() + self.options.success_display);

        if self.options.refresh_after_settle {
            if let Err(e) = self.balance.refresh().await {
                warn!("Balance refresh after tip failed: {}", e);
            }
        }

        self.transition(TipState::Settled(receipt));
    }

    /// The settled tip while its success notice is still due. Clears the
    /// notice, returning the protocol to idle, once the display time is up.
    pub fn success_signal(&mut self) -> Option<&TipReceipt> {
        match self.success_until {
            Some(until) if Instant::now() >= until => {
                self.success_until = None;
                self.transition(TipState::Idle);
                None
            }
            Some(_) => match &self.state {
                TipState::Settled(receipt) => Some(receipt),
                _ => None,
            },
            None => None,
        }
    }
}
