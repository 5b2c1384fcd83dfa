//! TipChain Client
//!
//! Client-side orchestration for a ledger-backed profile and tipping
//! registry. The ledger and its registry contract are remote; this crate
//! sequences the calls made against them and keeps local state consistent
//! with what the ledger confirmed.
//!
//! ## Guarantees
//!
//! - A tip transfer is sent at most once; only its record call is retried
//! - A tip whose transfer confirmed is never reported as a plain failure
//! - Stale username availability answers never overwrite newer ones
//! - Failed read-only queries degrade to partial views with a notice

pub mod amount;
pub mod balance;
pub mod config;
pub mod dashboard;
pub mod discovery;
pub mod error;
pub mod ledger;
pub mod memory_ledger;
pub mod profile;
pub mod registry;
pub mod rpc_pool;
pub mod session;
pub mod storage;
pub mod tip;
pub mod upload;

pub mod commands;

pub use amount::AmountCodec;
pub use balance::BalanceTracker;
pub use config::ClientConfig;
pub use discovery::DiscoveryFeed;
pub use error::{Error, RecoveryAction, Result};
pub use ledger::{Identity, LedgerClient};
pub use memory_ledger::MemoryLedger;
pub use profile::ProfileArbitrator;
pub use registry::RegistryGateway;
pub use rpc_pool::JsonRpcLedger;
pub use session::Session;
pub use tip::TipCommitProtocol;
