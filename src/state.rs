//! Decoders for the raffle program's zero-copy accounts.
//!
//! Every account starts with the 8-byte Anchor account discriminator
//! `sha256("account:<Name>")[..8]`; the body is packed with no padding.
//!
//! The `to_account_data` encoders write the same layouts. They exist for
//! in-memory ledgers that stand in for the program; nothing on the submit
//! path encodes account data.

use serde::Serialize;
use solana_sdk::pubkey::Pubkey;
use thiserror::Error;

use crate::constants::{MAX_COLLECTIONS, MAX_ENTRANTS};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("account data is {len} bytes, expected at least {expected}")]
    TooShort { len: usize, expected: usize },
    #[error("discriminator does not match a {0} account")]
    WrongDiscriminator(&'static str),
    #[error("{field} count {count} exceeds capacity {capacity}")]
    CountOverflow {
        field: &'static str,
        count: usize,
        capacity: usize,
    },
}

/// Compute the Anchor account discriminator: `sha256("account:<Name>")[..8]`.
pub fn account_discriminator(account_name: &str) -> [u8; 8] {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(format!("account:{account_name}"));
    let hash = hasher.finalize();
    let mut disc = [0u8; 8];
    disc.copy_from_slice(&hash[..8]);
    disc
}

fn check_header(data: &[u8], name: &'static str, min_len: usize) -> Result<(), DecodeError> {
    if data.len() < min_len {
        return Err(DecodeError::TooShort {
            len: data.len(),
            expected: min_len,
        });
    }
    if data[..8] != account_discriminator(name) {
        return Err(DecodeError::WrongDiscriminator(name));
    }
    Ok(())
}

fn read_pubkey(data: &[u8], offset: usize) -> Pubkey {
    let mut bytes = [0u8; 32];
    bytes.copy_from_slice(&data[offset..offset + 32]);
    Pubkey::new_from_array(bytes)
}

fn read_u16(data: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([data[offset], data[offset + 1]])
}

fn read_u64(data: &[u8], offset: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&data[offset..offset + 8]);
    u64::from_le_bytes(bytes)
}

/// Decoded `GlobalPool` account (stored at the global authority PDA).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalPoolState {
    pub super_user: Pubkey,
}

impl GlobalPoolState {
    /// Discriminator (8) + super_user (32).
    pub const LEN: usize = 8 + 32;

    pub fn from_account_data(data: &[u8]) -> Result<Self, DecodeError> {
        check_header(data, "GlobalPool", Self::LEN)?;
        Ok(Self {
            super_user: read_pubkey(data, 8),
        })
    }

    /// Account image as `initialize` leaves it. Simulation support.
    pub fn to_account_data(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::LEN);
        buf.extend_from_slice(&account_discriminator("GlobalPool"));
        buf.extend_from_slice(self.super_user.as_ref());
        buf
    }
}

/// Decoded `CollectionPool` account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollectionPoolState {
    #[serde(serialize_with = "serialize_pubkeys")]
    pub collections: Vec<Pubkey>,
}

impl CollectionPoolState {
    /// Discriminator (8) + cnt_collection (2) + collections (32 * 200).
    pub const LEN: usize = 8 + 2 + 32 * MAX_COLLECTIONS;

    pub fn from_account_data(data: &[u8]) -> Result<Self, DecodeError> {
        check_header(data, "CollectionPool", Self::LEN)?;
        let count = read_u16(data, 8) as usize;
        if count > MAX_COLLECTIONS {
            return Err(DecodeError::CountOverflow {
                field: "cnt_collection",
                count,
                capacity: MAX_COLLECTIONS,
            });
        }
        let collections = (0..count).map(|i| read_pubkey(data, 10 + 32 * i)).collect();
        Ok(Self { collections })
    }

    /// Serialize into a full-size account image.
    pub fn to_account_data(&self) -> Vec<u8> {
        let mut buf = vec![0u8; Self::LEN];
        buf[..8].copy_from_slice(&account_discriminator("CollectionPool"));
        buf[8..10].copy_from_slice(&(self.collections.len() as u16).to_le_bytes());
        for (i, key) in self.collections.iter().enumerate() {
            buf[10 + 32 * i..42 + 32 * i].copy_from_slice(key.as_ref());
        }
        buf
    }

    pub fn is_full(&self) -> bool {
        self.collections.len() >= MAX_COLLECTIONS
    }
}

/// Where a raffle is in its lifecycle, read from the `claimed` latch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RaffleStatus {
    Active,
    WinnerRevealed,
    Claimed,
    Withdrawn,
}

impl RaffleStatus {
    pub fn from_latch(claimed: u8) -> Self {
        match claimed {
            0 => RaffleStatus::Active,
            1 => RaffleStatus::WinnerRevealed,
            2 => RaffleStatus::Claimed,
            _ => RaffleStatus::Withdrawn,
        }
    }

    /// Inverse of [`RaffleStatus::from_latch`], for encoding account images.
    pub fn latch(&self) -> u8 {
        match self {
            RaffleStatus::Active => 0,
            RaffleStatus::WinnerRevealed => 1,
            RaffleStatus::Claimed => 2,
            RaffleStatus::Withdrawn => 3,
        }
    }
}

/// Decoded `Raffle` account.
///
/// Layout after the discriminator:
///
/// ```text
/// [0..32]    creator
/// [32..64]   nft_mint
/// [64..66]   ticket_cnt      (u16)
/// [66..68]   ticket_max      (u16)
/// [68..76]   timestamp_start (i64)
/// [76..84]   timestamp_end   (i64)
/// [84..92]   ticket_price    (u64, lamports)
/// [92..124]  winner
/// [124]      claimed         (u8 latch)
/// [125..127] cnt_entrants    (u16)
/// [127..]    entrants        ([Pubkey; 2000])
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RaffleState {
    #[serde(serialize_with = "serialize_pubkey")]
    pub creator: Pubkey,
    #[serde(serialize_with = "serialize_pubkey")]
    pub nft_mint: Pubkey,
    pub ticket_count: u16,
    pub max_entrants: u16,
    pub timestamp_start: i64,
    pub timestamp_end: i64,
    pub ticket_price: u64,
    #[serde(serialize_with = "serialize_optional_pubkey")]
    pub winner: Option<Pubkey>,
    pub status: RaffleStatus,
    #[serde(serialize_with = "serialize_pubkeys")]
    pub entrants: Vec<Pubkey>,
}

impl RaffleState {
    const BODY: usize = 8;
    const ENTRANTS_OFFSET: usize = Self::BODY + 127;
    /// Smallest account image the decoder accepts.
    pub const LEN: usize = Self::ENTRANTS_OFFSET + 32 * MAX_ENTRANTS;

    pub fn from_account_data(data: &[u8]) -> Result<Self, DecodeError> {
        check_header(data, "Raffle", Self::LEN)?;
        let body = Self::BODY;
        let count = read_u16(data, body + 125) as usize;
        if count > MAX_ENTRANTS {
            return Err(DecodeError::CountOverflow {
                field: "cnt_entrants",
                count,
                capacity: MAX_ENTRANTS,
            });
        }
        let winner = read_pubkey(data, body + 92);
        let entrants = (0..count)
            .map(|i| read_pubkey(data, Self::ENTRANTS_OFFSET + 32 * i))
            .collect();

        Ok(Self {
            creator: read_pubkey(data, body),
            nft_mint: read_pubkey(data, body + 32),
            ticket_count: read_u16(data, body + 64),
            max_entrants: read_u16(data, body + 66),
            timestamp_start: read_u64(data, body + 68) as i64,
            timestamp_end: read_u64(data, body + 76) as i64,
            ticket_price: read_u64(data, body + 84),
            winner: (winner != Pubkey::default()).then_some(winner),
            status: RaffleStatus::from_latch(data[body + 124]),
            entrants,
        })
    }

    /// Serialize into an account image of `size` bytes (at least [`Self::LEN`]).
    pub fn to_account_data(&self, size: usize) -> Vec<u8> {
        let body = Self::BODY;
        let mut buf = vec![0u8; size.max(Self::LEN)];
        buf[..8].copy_from_slice(&account_discriminator("Raffle"));
        buf[body..body + 32].copy_from_slice(self.creator.as_ref());
        buf[body + 32..body + 64].copy_from_slice(self.nft_mint.as_ref());
        buf[body + 64..body + 66].copy_from_slice(&self.ticket_count.to_le_bytes());
        buf[body + 66..body + 68].copy_from_slice(&self.max_entrants.to_le_bytes());
        buf[body + 68..body + 76].copy_from_slice(&self.timestamp_start.to_le_bytes());
        buf[body + 76..body + 84].copy_from_slice(&self.timestamp_end.to_le_bytes());
        buf[body + 84..body + 92].copy_from_slice(&self.ticket_price.to_le_bytes());
        let winner = self.winner.unwrap_or_default();
        buf[body + 92..body + 124].copy_from_slice(winner.as_ref());
        buf[body + 124] = self.status.latch();
        buf[body + 125..body + 127].copy_from_slice(&(self.entrants.len() as u16).to_le_bytes());
        for (i, key) in self.entrants.iter().enumerate() {
            let at = Self::ENTRANTS_OFFSET + 32 * i;
            buf[at..at + 32].copy_from_slice(key.as_ref());
        }
        buf
    }

    pub fn entrant_count(&self) -> usize {
        self.entrants.len()
    }
}

fn serialize_pubkey<S: serde::Serializer>(key: &Pubkey, s: S) -> Result<S::Ok, S::Error> {
    s.collect_str(key)
}

fn serialize_optional_pubkey<S: serde::Serializer>(
    key: &Option<Pubkey>,
    s: S,
) -> Result<S::Ok, S::Error> {
    match key {
        Some(key) => s.collect_str(key),
        None => s.serialize_none(),
    }
}

fn serialize_pubkeys<S: serde::Serializer>(keys: &[Pubkey], s: S) -> Result<S::Ok, S::Error> {
    s.collect_seq(keys.iter().map(|k| k.to_string()))
}
