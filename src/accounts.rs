//! Creation instructions for the supporting accounts an operation references.
//!
//! Ledger accounts must exist before an instruction can use them, so each
//! operation prepends the creations it needs:
//!
//! - Associated token accounts are probed first and created only when absent,
//!   so a transaction never carries a creation that would fail on an existing
//!   account.
//! - Seeded program accounts (collection pool, raffles) are always allocated
//!   fresh: their seed is unique per creation.

use futures_util::future::try_join;
use solana_sdk::instruction::Instruction;
use solana_sdk::pubkey::Pubkey;
use solana_system_interface::instruction::create_account_with_seed;
use spl_associated_token_account_interface::instruction::create_associated_token_account;

use crate::constants::TOKEN_PROGRAM_ID;
use crate::derive::associated_token_address;
use crate::error::{ErrorKind, Operation, OperationError};
use crate::ledger::LedgerClient;
use crate::probe::AccountProbe;

/// Associated accounts resolved for one owner/mint pair.
#[derive(Debug, Clone)]
pub struct AssociatedAccounts {
    /// Creations for the accounts that were missing, in execution order.
    pub instructions: Vec<Instruction>,
    /// The owner's associated token account.
    pub destination: Pubkey,
}

/// Creation instruction for `owner`'s associated account, or `None` if the
/// probe found it already present.
pub fn plan_associated_account(
    payer: &Pubkey,
    owner: &Pubkey,
    mint: &Pubkey,
    exists: bool,
) -> Option<Instruction> {
    if exists {
        return None;
    }
    Some(create_associated_token_account(payer, owner, mint, &TOKEN_PROGRAM_ID))
}

/// Make sure `owner` and `wallet` both hold an associated account for `mint`.
///
/// The owner's account is funded by `wallet`. When the two differ, the
/// wallet's own account is checked too; both probes run concurrently.
pub async fn ensure_associated_account<L: LedgerClient>(
    probe: &AccountProbe<'_, L>,
    operation: Operation,
    owner: &Pubkey,
    wallet: &Pubkey,
    mint: &Pubkey,
) -> Result<AssociatedAccounts, OperationError> {
    let destination = associated_token_address(owner, mint);

    if owner == wallet {
        let exists = probe
            .exists(&destination)
            .await
            .map_err(|kind| OperationError::new(operation, "owner_ata", destination, kind))?;
        return Ok(AssociatedAccounts {
            instructions: plan_associated_account(wallet, owner, mint, exists)
                .into_iter()
                .collect(),
            destination,
        });
    }

    let wallet_account = associated_token_address(wallet, mint);
    let (owner_exists, wallet_exists) = try_join(
        async {
            probe
                .exists(&destination)
                .await
                .map_err(|kind| OperationError::new(operation, "owner_ata", destination, kind))
        },
        async {
            probe
                .exists(&wallet_account)
                .await
                .map_err(|kind| OperationError::new(operation, "wallet_ata", wallet_account, kind))
        },
    )
    .await?;

    let instructions = plan_associated_account(wallet, owner, mint, owner_exists)
        .into_iter()
        .chain(plan_associated_account(wallet, wallet, mint, wallet_exists))
        .collect();

    Ok(AssociatedAccounts {
        instructions,
        destination,
    })
}

/// Allocation of a fixed-size seeded account owned by `owning_program`,
/// funded at the rent-exempt minimum for `size` bytes.
#[allow(clippy::too_many_arguments)]
pub async fn ensure_fixed_account<L: LedgerClient>(
    ledger: &L,
    operation: Operation,
    role: &'static str,
    payer: &Pubkey,
    target: &Pubkey,
    base: &Pubkey,
    seed: &str,
    size: u64,
    owning_program: &Pubkey,
) -> Result<Instruction, OperationError> {
    let lamports = ledger
        .minimum_balance_for_rent_exemption(size as usize)
        .await
        .map_err(|e| {
            OperationError::new(operation, role, *target, ErrorKind::ProbeUnavailable(e.to_string()))
        })?;

    Ok(create_account_with_seed(
        payer,
        target,
        base,
        seed,
        lamports,
        size,
        owning_program,
    ))
}
