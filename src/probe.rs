//! Ledger reads performed before assembling a transaction.

use solana_sdk::pubkey::Pubkey;

use crate::error::ErrorKind;
use crate::ledger::{LedgerClient, LedgerError};
use crate::state::{CollectionPoolState, GlobalPoolState, RaffleState};

/// Read-only view of the ledger used while planning an operation.
///
/// Transport failures surface as [`ErrorKind::ProbeUnavailable`] and are
/// never read as "account absent".
pub struct AccountProbe<'a, L> {
    ledger: &'a L,
}

impl<'a, L: LedgerClient> AccountProbe<'a, L> {
    pub fn new(ledger: &'a L) -> Self {
        Self { ledger }
    }

    /// Whether any account lives at `address`. Contents are not inspected.
    pub async fn exists(&self, address: &Pubkey) -> Result<bool, ErrorKind> {
        self.ledger.account_exists(address).await.map_err(unavailable)
    }

    /// Fetch and decode a raffle account.
    pub async fn raffle(&self, address: &Pubkey) -> Result<RaffleState, ErrorKind> {
        let data = self.fetch(address).await?;
        RaffleState::from_account_data(&data).map_err(|e| ErrorKind::InvalidAccountData(e.to_string()))
    }

    /// Fetch and decode the collection pool.
    pub async fn collection_pool(&self, address: &Pubkey) -> Result<CollectionPoolState, ErrorKind> {
        let data = self.fetch(address).await?;
        CollectionPoolState::from_account_data(&data)
            .map_err(|e| ErrorKind::InvalidAccountData(e.to_string()))
    }

    /// Fetch and decode the global pool written by `initialize`.
    pub async fn global_pool(&self, address: &Pubkey) -> Result<GlobalPoolState, ErrorKind> {
        let data = self.fetch(address).await?;
        GlobalPoolState::from_account_data(&data).map_err(|e| ErrorKind::InvalidAccountData(e.to_string()))
    }

    async fn fetch(&self, address: &Pubkey) -> Result<Vec<u8>, ErrorKind> {
        self.ledger
            .account_data(address)
            .await
            .map_err(unavailable)?
            .ok_or(ErrorKind::AccountMissing)
    }
}

fn unavailable(err: LedgerError) -> ErrorKind {
    ErrorKind::ProbeUnavailable(err.to_string())
}
