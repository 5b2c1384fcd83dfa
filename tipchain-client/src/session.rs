//! Wallet Session
//!
//! The context every component is built from: the ledger connection, the
//! configuration and the signed-in identity. Components take what they need
//! from the session at construction; nothing is held in global state.

use std::sync::Arc;
use tracing::info;

use crate::balance::BalanceTracker;
use crate::config::ClientConfig;
use crate::discovery::DiscoveryFeed;
use crate::error::{Error, Result};
use crate::ledger::{Identity, LedgerClient};
use crate::profile::ProfileArbitrator;
use crate::registry::RegistryGateway;
use crate::rpc_pool::JsonRpcLedger;
use crate::storage::{PendingRecordStore, ProfileHandoff};
use crate::tip::TipCommitProtocol;

/// An open connection to the ledger, optionally with a signed-in wallet
pub struct Session {
    config: ClientConfig,
    ledger: Arc<dyn LedgerClient>,
    identity: Option<Identity>,
}

impl Session {
    /// Session over an existing ledger client, signed in as the configured
    /// identity if there is one
    pub fn new(config: ClientConfig, ledger: Arc<dyn LedgerClient>) -> Self {
        let identity = config.identity();
        Self {
            config,
            ledger,
            identity,
        }
    }

    /// Connect to the configured JSON-RPC endpoints
    pub async fn open(config: ClientConfig) -> Result<Self> {
        if config.network.contract_address.trim().is_empty() {
            return Err(Error::ValidationError(
                "registry contract address is not configured".to_string(),
            ));
        }

        let ledger = JsonRpcLedger::new(&config.network.endpoints)?;
        ledger.connect().await?;
        Ok(Self::new(config, Arc::new(ledger)))
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn ledger(&self) -> &Arc<dyn LedgerClient> {
        &self.ledger
    }

    /// Sign in as `identity`
    pub fn connect(&mut self, identity: Identity) {
        info!("Connected wallet {}", identity);
        self.identity = Some(identity);
    }

    /// Sign out
    pub fn disconnect(&mut self) {
        if let Some(identity) = self.identity.take() {
            info!("Disconnected wallet {}", identity);
        }
    }

    pub fn is_connected(&self) -> bool {
        self.identity.is_some()
    }

    /// The signed-in identity
    pub fn identity(&self) -> Result<&Identity> {
        self.identity.as_ref().ok_or(Error::NotConnected)
    }

    pub fn registry(&self) -> RegistryGateway {
        RegistryGateway::new(self.ledger.clone(), &self.config.network.contract_address)
    }

    pub fn handoff(&self) -> ProfileHandoff {
        ProfileHandoff::new(&self.config.data_dir())
    }

    pub fn pending_records(&self) -> PendingRecordStore {
        PendingRecordStore::new(&self.config.data_dir())
    }

    pub fn balance_tracker(&self) -> Result<BalanceTracker> {
        Ok(BalanceTracker::new(
            self.ledger.clone(),
            self.identity()?.clone(),
            self.config.codec(),
        ))
    }

    pub fn tip_protocol(&self) -> Result<TipCommitProtocol> {
        Ok(TipCommitProtocol::new(
            self.registry(),
            self.balance_tracker()?,
            self.config.tip_options(),
        ))
    }

    pub fn profile_arbitrator(&self) -> Result<ProfileArbitrator> {
        Ok(ProfileArbitrator::new(
            self.registry(),
            self.identity()?.clone(),
            self.handoff(),
            self.config.profile_options(),
        ))
    }

    /// Discovery needs no signed-in wallet
    pub fn discovery_feed(&self) -> DiscoveryFeed {
        DiscoveryFeed::new(
            self.registry(),
            self.config.discovery.fetch_size,
            self.config.discovery.page_size,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_ledger::MemoryLedger;

    #[test]
    fn test_components_require_identity() {
        let mut session = Session::new(
            ClientConfig::default(),
            Arc::new(MemoryLedger::new("uxion")),
        );
        assert_eq!(session.identity().unwrap_err(), Error::NotConnected);
        assert!(session.tip_protocol().is_err());
        assert!(session.profile_arbitrator().is_err());

        session.connect(Identity::new("xion1alice").unwrap());
        assert!(session.tip_protocol().is_ok());

        session.disconnect();
        assert!(!session.is_connected());
    }

    #[tokio::test]
    async fn test_open_requires_contract_address() {
        let err = Session::open(ClientConfig::default()).await.err().unwrap();
        assert!(matches!(err, Error::ValidationError(_)));
    }
}
