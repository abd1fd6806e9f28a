//! Deterministic address derivation for every account the raffle lifecycle
//! touches.
//!
//! Two schemes are in play:
//!
//! - **Program-derived addresses** ([`Pubkey::find_program_address`]) for the
//!   global authority and Metaplex metadata. Associated token accounts come
//!   from the associated-token interface crate.
//! - **Seeded addresses** ([`Pubkey::create_with_seed`]) for the collection pool
//!   and raffle accounts, which the client allocates itself with
//!   `CreateAccountWithSeed` before handing them to the program.
//!
//! Nothing here performs I/O; the same inputs always yield the same address.

use solana_sdk::pubkey::Pubkey;
use thiserror::Error;

use spl_associated_token_account_interface::address::get_associated_token_address_with_program_id;

use crate::constants::{
    COLLECTION_POOL_SEED, GLOBAL_AUTHORITY_SEED, MAX_SEED_LEN, METADATA_SEED,
    TOKEN_METADATA_PROGRAM_ID, TOKEN_PROGRAM_ID,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeriveError {
    #[error("seed {seed:?} is {len} bytes, over the 32-byte limit", len = .seed.len())]
    SeedTooLong { seed: String },
    #[error("{owner} cannot own seeded accounts")]
    IllegalOwner { owner: Pubkey },
}

/// Global authority PDA. Seeds: `["global-authority"]`.
pub fn global_authority(program_id: &Pubkey) -> (Pubkey, u8) {
    Pubkey::find_program_address(&[GLOBAL_AUTHORITY_SEED.as_bytes()], program_id)
}

/// Address of an account created with `CreateAccountWithSeed`.
pub fn derive_with_seed(base: &Pubkey, seed: &str, owner: &Pubkey) -> Result<Pubkey, DeriveError> {
    if seed.len() > MAX_SEED_LEN {
        return Err(DeriveError::SeedTooLong {
            seed: seed.to_string(),
        });
    }
    Pubkey::create_with_seed(base, seed, owner).map_err(|_| DeriveError::IllegalOwner { owner: *owner })
}

/// Collection pool, seeded from the super user's wallet.
pub fn collection_pool(super_user: &Pubkey, program_id: &Pubkey) -> Result<Pubkey, DeriveError> {
    derive_with_seed(super_user, COLLECTION_POOL_SEED, program_id)
}

/// Seed string of a raffle account: the mint's base58 text followed by the
/// creation time in unix milliseconds.
///
/// The mint text is cut short so the seed stays within [`MAX_SEED_LEN`]. Two
/// raffles by the same creator for the same mint in the same millisecond share
/// an address; the second allocation is then refused by the system program.
pub fn raffle_seed(nft_mint: &Pubkey, created_at_ms: u64) -> String {
    let stamp = created_at_ms.to_string();
    let mint = nft_mint.to_string();
    let keep = MAX_SEED_LEN.saturating_sub(stamp.len()).min(mint.len());
    format!("{}{stamp}", &mint[..keep])
}

/// Raffle account address and the seed it was derived from.
pub fn raffle_address(
    creator: &Pubkey,
    nft_mint: &Pubkey,
    created_at_ms: u64,
    program_id: &Pubkey,
) -> Result<(Pubkey, String), DeriveError> {
    let seed = raffle_seed(nft_mint, created_at_ms);
    let address = derive_with_seed(creator, &seed, program_id)?;
    Ok((address, seed))
}

/// `owner`'s associated token account for `mint` under the legacy token program.
pub fn associated_token_address(owner: &Pubkey, mint: &Pubkey) -> Pubkey {
    get_associated_token_address_with_program_id(owner, mint, &TOKEN_PROGRAM_ID)
}

/// Metaplex metadata PDA. Seeds: `["metadata", metadata_program, mint]`.
pub fn metadata_address(mint: &Pubkey) -> Pubkey {
    Pubkey::find_program_address(
        &[
            METADATA_SEED.as_bytes(),
            TOKEN_METADATA_PROGRAM_ID.as_ref(),
            mint.as_ref(),
        ],
        &TOKEN_METADATA_PROGRAM_ID,
    )
    .0
}
