//! Seeds, account sizes and well-known program ids shared with the on-chain
//! raffle program. A mismatch in any of these produces addresses or layouts
//! the program does not recognize.

use solana_sdk::pubkey::Pubkey;

/// PDA seed of the global authority singleton.
pub const GLOBAL_AUTHORITY_SEED: &str = "global-authority";

/// `create_with_seed` seed of the collection pool (base = super user).
pub const COLLECTION_POOL_SEED: &str = "collection-pool";

/// First seed of a Metaplex metadata PDA.
pub const METADATA_SEED: &str = "metadata";

/// Maximum length of a `create_with_seed` seed string.
pub const MAX_SEED_LEN: usize = 32;

/// Capacity of the collection pool.
pub const MAX_COLLECTIONS: usize = 200;

/// Capacity of a single raffle.
pub const MAX_ENTRANTS: usize = 2000;

/// Bytes allocated for the collection pool: 8 + 2 + 32 * 200.
pub const COLLECTION_POOL_SIZE: u64 = 6410;

/// Bytes allocated for a raffle account.
pub const RAFFLE_SIZE: u64 = 64167;

/// Ticket prices are entered in SOL and sent in lamports.
pub const LAMPORTS_PER_SOL: u64 = 1_000_000_000;

/// Number of fractional digits of [`LAMPORTS_PER_SOL`].
pub const SOL_DECIMALS: u32 = 9;

/// Default fee wallet the program checks in `buy_tickets`.
pub const DEFAULT_TREASURY_WALLET: &str = "kVGZXZHFsZKRmR9DPQHaVQppvuD3LB4H8QzHxsrquTG";

pub const SYSTEM_PROGRAM_ID: Pubkey = solana_system_interface::program::ID;
pub const RENT_SYSVAR_ID: Pubkey =
    solana_sdk::pubkey!("SysvarRent111111111111111111111111111111111");
pub const TOKEN_PROGRAM_ID: Pubkey =
    solana_sdk::pubkey!("TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA");
pub const ASSOCIATED_TOKEN_PROGRAM_ID: Pubkey = spl_associated_token_account_interface::program::ID;
pub const TOKEN_METADATA_PROGRAM_ID: Pubkey =
    solana_sdk::pubkey!("metaqbxxUerdq28cj1RbAWkYQm3ybzjb6a8bt518x1s");
pub const COMPUTE_BUDGET_PROGRAM_ID: Pubkey =
    solana_sdk::pubkey!("ComputeBudget111111111111111111111111111111");
