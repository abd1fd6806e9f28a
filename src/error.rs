use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use std::fmt;
use thiserror::Error;

use crate::derive::DeriveError;

/// Lifecycle operation an error is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    InitializePool,
    RegisterCollection,
    CreateRaffle,
    BuyTickets,
    RevealWinner,
    ClaimReward,
    WithdrawUnsoldNft,
    FetchRaffle,
    FetchCollectionPool,
    FetchGlobalPool,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::InitializePool => "initialize_pool",
            Operation::RegisterCollection => "register_collection",
            Operation::CreateRaffle => "create_raffle",
            Operation::BuyTickets => "buy_tickets",
            Operation::RevealWinner => "reveal_winner",
            Operation::ClaimReward => "claim_reward",
            Operation::WithdrawUnsoldNft => "withdraw_unsold_nft",
            Operation::FetchRaffle => "fetch_raffle",
            Operation::FetchCollectionPool => "fetch_collection_pool",
            Operation::FetchGlobalPool => "fetch_global_pool",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Anchor custom error codes start here; the raffle program's variants follow
/// in declaration order.
pub const ANCHOR_ERROR_OFFSET: u32 = 6000;

/// Reason the raffle program (or the system program on its behalf) refused a
/// transaction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("the pool is already initialized")]
    AlreadyInitialized,
    #[error("the collection pool is full")]
    PoolFull,
    #[error("invalid metadata address")]
    InvalidMetadata,
    #[error("the NFT does not belong to a registered collection")]
    InvalidCollection,
    #[error("can't parse the NFT's creators")]
    MetadataCreatorParseError,
    #[error("the number of max entrants is too large")]
    MaxEntrantsTooLarge,
    #[error("end time is too early")]
    EndTimeTooEarly,
    #[error("the raffle has ended")]
    RaffleEnded,
    #[error("not enough tickets left")]
    RaffleFull,
    #[error("the buyer does not have enough SOL")]
    NotEnoughSol,
    #[error("the raffle has not ended yet")]
    NotYetEnded,
    #[error("the raffle has no entrants")]
    NoEntrants,
    #[error("there is no unclaimed reward")]
    AlreadyClaimed,
    #[error("the caller is not the winner")]
    NotWinner,
    #[error("the caller is not the raffle creator")]
    NotCreator,
    #[error("the raffle has entrants")]
    HasEntrants,
    #[error("{0}")]
    Opaque(String),
}

impl Rejection {
    /// Map a raffle program custom error code to its reason.
    pub fn from_program_code(code: u32) -> Option<Self> {
        let reason = match code.checked_sub(ANCHOR_ERROR_OFFSET)? {
            0 => Rejection::InvalidMetadata,
            1 => Rejection::InvalidCollection,
            2 => Rejection::MetadataCreatorParseError,
            3 => Rejection::MaxEntrantsTooLarge,
            4 => Rejection::EndTimeTooEarly,
            5 => Rejection::RaffleEnded,
            6 => Rejection::RaffleFull,
            7 => Rejection::NotEnoughSol,
            8 => Rejection::NotYetEnded,
            9 => Rejection::NoEntrants,
            10 => Rejection::AlreadyClaimed,
            11 => Rejection::NotWinner,
            12 => Rejection::NotCreator,
            13 => Rejection::HasEntrants,
            _ => return None,
        };
        Some(reason)
    }

    /// Inverse of [`Rejection::from_program_code`].
    pub fn program_code(&self) -> Option<u32> {
        let index = match self {
            Rejection::InvalidMetadata => 0,
            Rejection::InvalidCollection => 1,
            Rejection::MetadataCreatorParseError => 2,
            Rejection::MaxEntrantsTooLarge => 3,
            Rejection::EndTimeTooEarly => 4,
            Rejection::RaffleEnded => 5,
            Rejection::RaffleFull => 6,
            Rejection::NotEnoughSol => 7,
            Rejection::NotYetEnded => 8,
            Rejection::NoEntrants => 9,
            Rejection::AlreadyClaimed => 10,
            Rejection::NotWinner => 11,
            Rejection::NotCreator => 12,
            Rejection::HasEntrants => 13,
            Rejection::AlreadyInitialized | Rejection::PoolFull | Rejection::Opaque(_) => {
                return None;
            }
        };
        Some(ANCHOR_ERROR_OFFSET + index)
    }
}

/// What went wrong, independent of which operation hit it.
#[derive(Debug, Error)]
pub enum ErrorKind {
    #[error(transparent)]
    Derivation(#[from] DeriveError),
    #[error("account probe unavailable: {0}")]
    ProbeUnavailable(String),
    #[error("insufficient funds: {0}")]
    InsufficientFunds(String),
    #[error("rejected: {0}")]
    Rejected(Rejection),
    #[error("confirmation of {signature} not observed in time; the transaction may still land")]
    ConfirmationTimeout { signature: Signature },
    #[error("transport failure: {0}")]
    Transport(String),
    /// The wallet cannot sign for every required signer, e.g. a super user
    /// other than the wallet.
    #[error("signing failed: {0}")]
    Signing(String),
    #[error("account does not exist")]
    AccountMissing,
    #[error("unexpected account data: {0}")]
    InvalidAccountData(String),
    #[error("invalid ticket price {0:?}")]
    InvalidTicketPrice(String),
}

/// A failed lifecycle operation together with the account it was working on.
#[derive(Debug, Error)]
#[error("{operation} failed at {role} {address}: {kind}")]
pub struct OperationError {
    pub operation: Operation,
    /// Role of the implicated account, e.g. `"raffle"` or `"claimer_ata"`.
    pub role: &'static str,
    pub address: Pubkey,
    pub kind: ErrorKind,
}

impl OperationError {
    pub fn new(operation: Operation, role: &'static str, address: Pubkey, kind: ErrorKind) -> Self {
        Self {
            operation,
            role,
            address,
            kind,
        }
    }

    pub fn rejection(&self) -> Option<&Rejection> {
        match &self.kind {
            ErrorKind::Rejected(reason) => Some(reason),
            _ => None,
        }
    }

    /// Transport-level failures that are safe to retry from an outer layer.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::ProbeUnavailable(_) | ErrorKind::Transport(_)
        )
    }
}
