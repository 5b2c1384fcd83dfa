//! Client Errors
//!
//! Every failure the client surfaces to a caller is one of the variants of
//! [`Error`]. Transport problems are reported by the ledger layer as
//! [`LedgerError`] and folded into [`Error::NetworkError`] on read paths.

use thiserror::Error;

/// Result alias used throughout the library
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the client core
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Amount is not a non-negative decimal, or is zero where a positive
    /// amount is required.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// Requested amount exceeds the last confirmed balance.
    #[error("insufficient balance: requested {requested}, available {available} (minimal units)")]
    InsufficientBalance { available: u128, requested: u128 },

    /// The recipient's wallet address could not be resolved.
    #[error("recipient '{username}' could not be resolved: {reason}")]
    RecipientUnresolved { username: String, reason: String },

    /// The value transfer was rejected. No funds moved.
    #[error("transfer failed: {0}")]
    TransferFailed(String),

    /// The registry record call did not confirm.
    #[error("{}", record_failed_message(.transferred, .reason))]
    RecordFailed {
        transferred: bool,
        tx_hash: Option<String>,
        reason: String,
    },

    /// Local validation rejected the input.
    #[error("{0}")]
    ValidationError(String),

    /// The username is already registered to another wallet.
    #[error("username '{0}' is already taken")]
    UsernameTaken(String),

    /// No wallet identity is connected.
    #[error("no wallet connected")]
    NotConnected,

    /// Image hosting failed.
    #[error("upload failed: {0}")]
    UploadError(String),

    /// A query or availability check could not be completed.
    #[error("network error: {0}")]
    NetworkError(String),

    /// Local state (handoff, pending record) could not be read or written.
    #[error("storage error: {0}")]
    Storage(String),
}

fn record_failed_message(transferred: &bool, reason: &str) -> String {
    if *transferred {
        format!("tip sent, but the record is still pending: {}", reason)
    } else {
        format!("tip record failed: {}", reason)
    }
}

/// What a caller should offer the user instead of a bare error string
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryAction {
    /// Connect a wallet before continuing
    ConnectWallet,
    /// Create a profile for the connected wallet
    CreateProfile,
    /// Re-issue only the record step of a tip
    RetryRecord,
    /// Go back and pick another profile
    BrowseProfiles,
}

impl Error {
    /// Whether value left the sender's wallet during the failed operation.
    pub fn value_moved(&self) -> bool {
        matches!(
            self,
            Error::RecordFailed {
                transferred: true,
                ..
            }
        )
    }

    /// Errors that are resolved locally and never reached the ledger's
    /// mutating surface.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Error::InvalidAmount(_)
                | Error::InsufficientBalance { .. }
                | Error::ValidationError(_)
                | Error::UsernameTaken(_)
        )
    }

    /// Recovery action for fatal-looking states
    pub fn recovery_action(&self) -> Option<RecoveryAction> {
        match self {
            Error::NotConnected => Some(RecoveryAction::ConnectWallet),
            Error::RecordFailed {
                transferred: true,
                ..
            } => Some(RecoveryAction::RetryRecord),
            Error::RecipientUnresolved { .. } => Some(RecoveryAction::BrowseProfiles),
            _ => None,
        }
    }
}

/// Errors from the ledger transport
#[derive(Debug, Error)]
pub enum LedgerError {
    /// HTTP transport failure
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success HTTP status
    #[error("http status {0}")]
    Status(u16),

    /// JSON-RPC error object returned by the endpoint
    #[error("rpc error {code}: {message}")]
    Rpc { code: i32, message: String },

    /// Response carried neither a result nor an error
    #[error("missing result in rpc response")]
    MissingResult,

    /// Response could not be decoded
    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// The ledger (or registry contract) rejected the call
    #[error("{0}")]
    Rejected(String),

    /// No endpoint answered
    #[error("all endpoints failed")]
    AllEndpointsFailed,

    /// No endpoint is configured
    #[error("no endpoints configured")]
    NoEndpoints,
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Storage(err.to_string())
    }
}

impl From<LedgerError> for Error {
    fn from(err: LedgerError) -> Self {
        Error::NetworkError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_failed_message_distinguishes_moved_value() {
        let moved = Error::RecordFailed {
            transferred: true,
            tx_hash: Some("ABC".to_string()),
            reason: "timeout".to_string(),
        };
        assert!(moved.to_string().starts_with("tip sent"));
        assert!(moved.value_moved());
        assert_eq!(moved.recovery_action(), Some(RecoveryAction::RetryRecord));

        let not_moved = Error::TransferFailed("out of gas".to_string());
        assert!(!not_moved.value_moved());
        assert_eq!(not_moved.to_string(), "transfer failed: out of gas");
    }

    #[test]
    fn test_not_connected_recovery() {
        assert_eq!(
            Error::NotConnected.recovery_action(),
            Some(RecoveryAction::ConnectWallet)
        );
    }

    #[test]
    fn test_ledger_error_is_network_error() {
        let err: Error = LedgerError::AllEndpointsFailed.into();
        assert!(matches!(err, Error::NetworkError(_)));
    }
}
