//! Instruction encoders for the raffle program, plus the compute-budget price
//! instruction. System and associated-token instructions come from their
//! interface crates (see [`crate::accounts`]).
//!
//! Raffle program instructions follow the Anchor wire format:
//!
//! ```text
//! data = sha256("global:<instruction_name>")[..8] || borsh(args)
//! ```
//!
//! Account metas are listed in the order the program declares them.

use solana_sdk::instruction::{AccountMeta, Instruction};
use solana_sdk::pubkey::Pubkey;

use crate::constants::{
    COMPUTE_BUDGET_PROGRAM_ID, RENT_SYSVAR_ID, SYSTEM_PROGRAM_ID, TOKEN_METADATA_PROGRAM_ID,
    TOKEN_PROGRAM_ID,
};

/// `ComputeBudgetInstruction::SetComputeUnitPrice` variant index.
const COMPUTE_BUDGET_SET_UNIT_PRICE: u8 = 3;

/// Compute the Anchor instruction discriminator: `sha256("global:<name>")[..8]`.
pub fn instruction_discriminator(name: &str) -> [u8; 8] {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(format!("global:{name}"));
    let hash = hasher.finalize();
    let mut disc = [0u8; 8];
    disc.copy_from_slice(&hash[..8]);
    disc
}

/// Build a `SetComputeUnitPrice` instruction.
pub fn build_set_compute_unit_price_instruction(micro_lamports: u64) -> Instruction {
    let mut data = Vec::with_capacity(9);
    data.push(COMPUTE_BUDGET_SET_UNIT_PRICE);
    data.extend_from_slice(&micro_lamports.to_le_bytes());
    Instruction {
        program_id: COMPUTE_BUDGET_PROGRAM_ID,
        accounts: vec![],
        data,
    }
}

/// `initialize`: records the super user and takes over the allocated pool.
pub fn initialize(
    program_id: &Pubkey,
    super_user: &Pubkey,
    global_authority: &Pubkey,
    collection_pool: &Pubkey,
) -> Instruction {
    Instruction {
        program_id: *program_id,
        accounts: vec![
            AccountMeta::new(*super_user, true),
            AccountMeta::new(*global_authority, false),
            AccountMeta::new(*collection_pool, false),
            AccountMeta::new_readonly(SYSTEM_PROGRAM_ID, false),
            AccountMeta::new_readonly(RENT_SYSVAR_ID, false),
        ],
        data: instruction_discriminator("initialize").to_vec(),
    }
}

/// `add_collection`: appends a verified creator key to the pool.
pub fn add_collection(
    program_id: &Pubkey,
    super_user: &Pubkey,
    collection_pool: &Pubkey,
    collection_id: &Pubkey,
) -> Instruction {
    Instruction {
        program_id: *program_id,
        accounts: vec![
            AccountMeta::new(*super_user, true),
            AccountMeta::new(*collection_pool, false),
            AccountMeta::new_readonly(*collection_id, false),
        ],
        data: instruction_discriminator("add_collection").to_vec(),
    }
}

/// Accounts of the `create_raffle` instruction.
pub struct CreateRaffleAccounts {
    pub creator: Pubkey,
    pub global_authority: Pubkey,
    pub raffle: Pubkey,
    pub collection_pool: Pubkey,
    pub creator_ata: Pubkey,
    pub program_ata: Pubkey,
    pub nft_mint: Pubkey,
    pub mint_metadata: Pubkey,
}

/// `create_raffle(ticket_price: u64, timestamp_end: i64, ticket_max: u16)`.
pub fn create_raffle(
    program_id: &Pubkey,
    accounts: &CreateRaffleAccounts,
    ticket_price: u64,
    timestamp_end: i64,
    ticket_max: u16,
) -> Instruction {
    let mut data = Vec::with_capacity(8 + 8 + 8 + 2);
    data.extend_from_slice(&instruction_discriminator("create_raffle"));
    data.extend_from_slice(&ticket_price.to_le_bytes());
    data.extend_from_slice(&timestamp_end.to_le_bytes());
    data.extend_from_slice(&ticket_max.to_le_bytes());

    Instruction {
        program_id: *program_id,
        accounts: vec![
            AccountMeta::new_readonly(accounts.creator, true),
            AccountMeta::new_readonly(accounts.global_authority, false),
            AccountMeta::new(accounts.raffle, false),
            AccountMeta::new(accounts.collection_pool, false),
            AccountMeta::new(accounts.creator_ata, false),
            AccountMeta::new(accounts.program_ata, false),
            AccountMeta::new_readonly(accounts.nft_mint, false),
            AccountMeta::new_readonly(accounts.mint_metadata, false),
            AccountMeta::new_readonly(TOKEN_PROGRAM_ID, false),
            AccountMeta::new_readonly(TOKEN_METADATA_PROGRAM_ID, false),
        ],
        data,
    }
}

/// `buy_tickets(ticket_demand: u16)`.
pub fn buy_tickets(
    program_id: &Pubkey,
    buyer: &Pubkey,
    raffle: &Pubkey,
    global_authority: &Pubkey,
    raffle_creator: &Pubkey,
    treasury: &Pubkey,
    ticket_demand: u16,
) -> Instruction {
    let mut data = Vec::with_capacity(8 + 2);
    data.extend_from_slice(&instruction_discriminator("buy_tickets"));
    data.extend_from_slice(&ticket_demand.to_le_bytes());

    Instruction {
        program_id: *program_id,
        accounts: vec![
            AccountMeta::new(*buyer, true),
            AccountMeta::new(*raffle, false),
            AccountMeta::new(*global_authority, false),
            AccountMeta::new_readonly(*raffle_creator, false),
            AccountMeta::new(*treasury, false),
            AccountMeta::new_readonly(SYSTEM_PROGRAM_ID, false),
        ],
        data,
    }
}

/// `reveal_winner`. The caller rides along as a read-only signer after the
/// raffle account.
pub fn reveal_winner(program_id: &Pubkey, raffle: &Pubkey, caller: &Pubkey) -> Instruction {
    Instruction {
        program_id: *program_id,
        accounts: vec![
            AccountMeta::new(*raffle, false),
            AccountMeta::new_readonly(*caller, true),
        ],
        data: instruction_discriminator("reveal_winner").to_vec(),
    }
}

/// Accounts shared by `claim_reward` and `withdraw_nft`: both move the NFT out
/// of the global authority's token account.
pub struct PayoutAccounts {
    pub recipient: Pubkey,
    pub global_authority: Pubkey,
    pub raffle: Pubkey,
    pub recipient_ata: Pubkey,
    pub program_ata: Pubkey,
    pub nft_mint: Pubkey,
}

/// `claim_reward(global_bump: u8)`.
pub fn claim_reward(program_id: &Pubkey, accounts: &PayoutAccounts, global_bump: u8) -> Instruction {
    payout_instruction(program_id, "claim_reward", accounts, global_bump)
}

/// `withdraw_nft(global_bump: u8)`.
pub fn withdraw_nft(program_id: &Pubkey, accounts: &PayoutAccounts, global_bump: u8) -> Instruction {
    payout_instruction(program_id, "withdraw_nft", accounts, global_bump)
}

fn payout_instruction(
    program_id: &Pubkey,
    name: &str,
    accounts: &PayoutAccounts,
    global_bump: u8,
) -> Instruction {
    let mut data = Vec::with_capacity(8 + 1);
    data.extend_from_slice(&instruction_discriminator(name));
    data.push(global_bump);

    Instruction {
        program_id: *program_id,
        accounts: vec![
            AccountMeta::new(accounts.recipient, true),
            AccountMeta::new(accounts.global_authority, false),
            AccountMeta::new(accounts.raffle, false),
            AccountMeta::new(accounts.recipient_ata, false),
            AccountMeta::new(accounts.program_ata, false),
            AccountMeta::new_readonly(accounts.nft_mint, false),
            AccountMeta::new_readonly(TOKEN_PROGRAM_ID, false),
        ],
        data,
    }
}
