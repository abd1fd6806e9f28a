//! The ledger capability the lifecycle operations run against.
//!
//! [`LedgerClient`] is the seam between the orchestration core and the
//! network: account existence and data, rent-exemption minimums, and
//! submit-and-confirm. [`RpcLedger`] implements it over the nonblocking
//! Solana JSON-RPC client, signing with the configured wallet.

use solana_account_decoder::UiAccountEncoding;
use solana_client::client_error::ClientError;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_config::{RpcAccountInfoConfig, RpcProgramAccountsConfig};
use solana_client::rpc_filter::{Memcmp, RpcFilterType};
use solana_commitment_config::CommitmentConfig;
use solana_sdk::hash::Hash;
use solana_sdk::instruction::Instruction;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signature, Signer};
use solana_sdk::transaction::{Transaction, TransactionError};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::AppConfig;
use crate::instructions::build_set_compute_unit_price_instruction;
use crate::state::{self, RaffleState};

/// Failure reported by a [`LedgerClient`].
#[derive(Debug, Clone, Error)]
pub enum LedgerError {
    /// The request never produced an answer from the cluster.
    #[error("{0}")]
    Transport(String),
    /// The transaction executed and failed. `instruction_index` is `None` when
    /// the failure belongs to the transaction as a whole, including the
    /// priority-fee instruction the client prepends.
    #[error("transaction rejected{}: {message}", .instruction_index.map(|i| format!(" at instruction {i}")).unwrap_or_default())]
    Rejected {
        /// Index of the failing instruction within the submitted list.
        instruction_index: Option<u8>,
        /// Custom program error code, when the failure carried one.
        custom_code: Option<u32>,
        message: String,
    },
    #[error("{0}")]
    InsufficientFunds(String),
    /// The configured wallet cannot provide every required signature.
    #[error("failed to sign transaction: {0}")]
    Signing(String),
    /// Submitted but not confirmed within the wait; the outcome is unknown.
    #[error("confirmation timed out for {signature}")]
    ConfirmationTimeout { signature: Signature },
}

/// Ledger capability consumed by the lifecycle operations.
///
/// Implementations must allow concurrent outstanding requests from one shared
/// handle.
pub trait LedgerClient: Send + Sync {
    /// Wallet that pays fees and rent and signs submitted transactions.
    fn payer(&self) -> Pubkey;

    /// `true` if any account is stored at `address`.
    fn account_exists(&self, address: &Pubkey) -> impl Future<Output = Result<bool, LedgerError>> + Send;

    /// Raw data of the account at `address`, `None` if there is none.
    fn account_data(
        &self,
        address: &Pubkey,
    ) -> impl Future<Output = Result<Option<Vec<u8>>, LedgerError>> + Send;

    /// Lamports an account of `size` bytes must hold to be rent exempt.
    fn minimum_balance_for_rent_exemption(
        &self,
        size: usize,
    ) -> impl Future<Output = Result<u64, LedgerError>> + Send;

    /// Submit `instructions` as one transaction and wait for confirmation.
    fn submit(
        &self,
        instructions: &[Instruction],
    ) -> impl Future<Output = Result<Signature, LedgerError>> + Send;
}

/// [`LedgerClient`] over Solana JSON-RPC.
pub struct RpcLedger {
    rpc_client: RpcClient,
    wallet: Arc<Keypair>,
    confirm_timeout: Duration,
    priority_fee_micro_lamports: u64,
}

impl RpcLedger {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            rpc_client: RpcClient::new_with_commitment(
                config.rpc_url.clone(),
                CommitmentConfig::confirmed(),
            ),
            wallet: config.wallet_keypair.clone(),
            confirm_timeout: Duration::from_secs(config.confirm_timeout_secs),
            priority_fee_micro_lamports: config.priority_fee_micro_lamports,
        }
    }

    /// List the raffle accounts created by `creator`.
    ///
    /// Uses `getProgramAccounts` with two Memcmp filters:
    /// - the `Raffle` account discriminator at offset 0;
    /// - the creator key at offset 8, the first field after the discriminator.
    pub async fn find_raffles(
        &self,
        program_id: &Pubkey,
        creator: &Pubkey,
    ) -> Result<Vec<(Pubkey, RaffleState)>, LedgerError> {
        let filters = vec![
            RpcFilterType::Memcmp(Memcmp::new_raw_bytes(
                0,
                state::account_discriminator("Raffle").to_vec(),
            )),
            RpcFilterType::Memcmp(Memcmp::new_raw_bytes(8, creator.to_bytes().to_vec())),
        ];

        let account_config = RpcProgramAccountsConfig {
            filters: Some(filters),
            account_config: RpcAccountInfoConfig {
                encoding: Some(UiAccountEncoding::Base64),
                commitment: Some(CommitmentConfig::confirmed()),
                ..Default::default()
            },
            ..Default::default()
        };

        let accounts = self
            .rpc_client
            .get_program_ui_accounts_with_config(program_id, account_config)
            .await
            .map_err(|e| LedgerError::Transport(e.to_string()))?;

        let mut raffles = Vec::with_capacity(accounts.len());
        for (pubkey, ui_account) in accounts {
            let Some(data) = ui_account.data.decode() else {
                warn!(account = %pubkey, "Failed to decode account data, skipping");
                continue;
            };
            match RaffleState::from_account_data(&data) {
                Ok(raffle) => raffles.push((pubkey, raffle)),
                Err(e) => warn!(account = %pubkey, error = %e, "Skipping malformed raffle"),
            }
        }
        Ok(raffles)
    }
}

impl LedgerClient for RpcLedger {
    fn payer(&self) -> Pubkey {
        self.wallet.pubkey()
    }

    async fn account_exists(&self, address: &Pubkey) -> Result<bool, LedgerError> {
        Ok(self.account_data(address).await?.is_some())
    }

    async fn account_data(&self, address: &Pubkey) -> Result<Option<Vec<u8>>, LedgerError> {
        let response = self
            .rpc_client
            .get_account_with_commitment(address, CommitmentConfig::confirmed())
            .await
            .map_err(|e| LedgerError::Transport(e.to_string()))?;
        Ok(response.value.map(|account| account.data))
    }

    async fn minimum_balance_for_rent_exemption(&self, size: usize) -> Result<u64, LedgerError> {
        self.rpc_client
            .get_minimum_balance_for_rent_exemption(size)
            .await
            .map_err(|e| LedgerError::Transport(e.to_string()))
    }

    async fn submit(&self, instructions: &[Instruction]) -> Result<Signature, LedgerError> {
        let mut all = Vec::with_capacity(instructions.len() + 1);
        let offset = if self.priority_fee_micro_lamports > 0 {
            all.push(build_set_compute_unit_price_instruction(
                self.priority_fee_micro_lamports,
            ));
            1
        } else {
            0
        };
        all.extend_from_slice(instructions);

        let blockhash = self
            .rpc_client
            .get_latest_blockhash()
            .await
            .map_err(|e| LedgerError::Transport(format!("failed to fetch latest blockhash: {e}")))?;

        let tx = sign_transaction(&all, &self.wallet, blockhash)?;
        let signature = tx.signatures[0];

        debug!(%signature, instructions = all.len(), "Submitting transaction");

        match tokio::time::timeout(
            self.confirm_timeout,
            self.rpc_client.send_and_confirm_transaction(&tx),
        )
        .await
        {
            Err(_) => Err(LedgerError::ConfirmationTimeout { signature }),
            Ok(Ok(sig)) => Ok(sig),
            Ok(Err(e)) => Err(shift_index(classify_client_error(&e, signature), offset)),
        }
    }
}

/// Build and sign a transaction paid by `wallet`. Fails when an instruction
/// requires a signer other than the wallet.
fn sign_transaction(
    instructions: &[Instruction],
    wallet: &Keypair,
    blockhash: Hash,
) -> Result<Transaction, LedgerError> {
    let mut tx = Transaction::new_with_payer(instructions, Some(&wallet.pubkey()));
    tx.try_sign(&[wallet], blockhash)
        .map_err(|e| LedgerError::Signing(e.to_string()))?;
    Ok(tx)
}

/// Translate an RPC client error into a [`LedgerError`].
fn classify_client_error(err: &ClientError, signature: Signature) -> LedgerError {
    if let Some(tx_err) = err.get_transaction_error() {
        return match &tx_err {
            TransactionError::InstructionError(index, ix_err) => {
                let message = ix_err.to_string();
                LedgerError::Rejected {
                    instruction_index: Some(*index),
                    custom_code: parse_custom_code(&message),
                    message,
                }
            }
            TransactionError::InsufficientFundsForFee
            | TransactionError::InsufficientFundsForRent { .. } => {
                LedgerError::InsufficientFunds(tx_err.to_string())
            }
            other => LedgerError::Rejected {
                instruction_index: None,
                custom_code: None,
                message: other.to_string(),
            },
        };
    }

    let err_str = err.to_string();
    if err_str.contains("unable to confirm transaction") {
        LedgerError::ConfirmationTimeout { signature }
    } else {
        LedgerError::Transport(err_str)
    }
}

/// Undo the shift introduced by a prepended priority-fee instruction so the
/// index refers to the caller's instruction list.
fn shift_index(err: LedgerError, offset: u8) -> LedgerError {
    match err {
        LedgerError::Rejected {
            instruction_index,
            custom_code,
            message,
        } => LedgerError::Rejected {
            // A failure inside the prepended instructions is not the caller's.
            instruction_index: instruction_index.and_then(|i| i.checked_sub(offset)),
            custom_code,
            message,
        },
        other => other,
    }
}

/// Extract `N` from `"custom program error: 0x{N:x}"`.
pub fn parse_custom_code(message: &str) -> Option<u32> {
    let (_, hex) = message.split_once("custom program error: 0x")?;
    let digits: String = hex.chars().take_while(|c| c.is_ascii_hexdigit()).collect();
    u32::from_str_radix(&digits, 16).ok()
}
