//! Ledger Client Interface
//!
//! The opaque surface the client consumes from the remote ledger: contract
//! queries, signed contract executions, native value transfers and balance
//! reads. Key management and signing live behind this trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::error::LedgerError;

/// The signed-in wallet address. Fixed for the lifetime of a session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    /// Wrap a wallet address. Returns `None` for a blank address.
    pub fn new(address: impl Into<String>) -> Option<Self> {
        let address = address.into().trim().to_string();
        if address.is_empty() {
            None
        } else {
            Some(Self(address))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Native coin amount in minimal units
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coin {
    pub denom: String,
    /// Integer amount, string encoded as on the wire
    pub amount: String,
}

impl Coin {
    pub fn new(amount: u128, denom: &str) -> Self {
        Self {
            denom: denom.to_string(),
            amount: amount.to_string(),
        }
    }
}

/// Fee selection for signed calls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeeMode {
    /// Let the signer simulate and pick the fee
    #[default]
    Auto,
}

/// Result of a broadcast transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxResult {
    /// Transaction hash
    #[serde(rename = "transactionHash", alias = "tx_hash")]
    pub tx_hash: String,
    /// Block height the transaction was included at
    #[serde(default)]
    pub height: u64,
    #[serde(rename = "gasUsed", alias = "gas_used", default)]
    pub gas_used: u64,
}

/// Operations the client needs from the ledger
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Run a read-only contract query
    async fn query(&self, contract: &str, msg: Value) -> Result<Value, LedgerError>;

    /// Sign and broadcast a contract execution
    async fn execute(
        &self,
        sender: &Identity,
        contract: &str,
        msg: Value,
        fee: FeeMode,
    ) -> Result<TxResult, LedgerError>;

    /// Sign and broadcast a native value transfer
    async fn send_value(
        &self,
        sender: &Identity,
        recipient: &str,
        coin: &Coin,
    ) -> Result<TxResult, LedgerError>;

    /// Read the balance of `address` in `denom`
    async fn get_balance(&self, address: &str, denom: &str) -> Result<Coin, LedgerError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_rejects_blank() {
        assert!(Identity::new("   ").is_none());
        assert_eq!(Identity::new(" xion1abc ").unwrap().as_str(), "xion1abc");
    }

    #[test]
    fn test_tx_result_accepts_both_spellings() {
        let camel: TxResult =
            serde_json::from_str(r#"{"transactionHash":"AA","height":7,"gasUsed":10}"#).unwrap();
        let snake: TxResult = serde_json::from_str(r#"{"tx_hash":"AA","height":7}"#).unwrap();
        assert_eq!(camel.tx_hash, snake.tx_hash);
        assert_eq!(snake.gas_used, 0);
    }
}
