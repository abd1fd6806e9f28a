//! In-memory ledger running the raffle program's rules.
//!
//! Transactions are atomic: instructions run against a copy of the world that
//! is committed only when every instruction succeeds.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use raffle_orchestrator::config::ProgramContext;
use raffle_orchestrator::constants::{
    ASSOCIATED_TOKEN_PROGRAM_ID, COMPUTE_BUDGET_PROGRAM_ID, MAX_ENTRANTS, SYSTEM_PROGRAM_ID,
    TOKEN_PROGRAM_ID,
};
use raffle_orchestrator::derive::{associated_token_address, global_authority, metadata_address};
use raffle_orchestrator::error::Rejection;
use raffle_orchestrator::instructions::instruction_discriminator;
use raffle_orchestrator::ledger::{LedgerClient, LedgerError};
use raffle_orchestrator::state::{
    CollectionPoolState, GlobalPoolState, RaffleState, RaffleStatus,
};
use solana_sdk::instruction::Instruction;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;

pub const DAY: i64 = 24 * 60 * 60;
pub const START: i64 = 1_700_000_000;
pub const ATA_RENT: u64 = 2_039_280;
const TOKEN_ACCOUNT_LEN: usize = 165;
const COMMISSION_PERCENT: u64 = 5;

#[derive(Debug, Clone)]
struct Account {
    owner: Pubkey,
    data: Vec<u8>,
}

#[derive(Debug, Clone)]
struct TokenAccount {
    mint: Pubkey,
    amount: u64,
}

#[derive(Debug, Clone, Default)]
struct World {
    now: i64,
    accounts: HashMap<Pubkey, Account>,
    tokens: HashMap<Pubkey, TokenAccount>,
    lamports: HashMap<Pubkey, u64>,
    /// Verified creator key recorded in each mint's metadata.
    mint_collections: HashMap<Pubkey, Pubkey>,
}

struct Fail {
    code: Option<u32>,
    message: String,
}

impl Fail {
    fn system(code: u32, message: &str) -> Self {
        Self {
            code: Some(code),
            message: format!("custom program error: {code:#x} ({message})"),
        }
    }

    fn program(reason: Rejection) -> Self {
        let code = reason.program_code().unwrap_or_default();
        Self {
            code: Some(code),
            message: format!("custom program error: {code:#x}"),
        }
    }

    fn panicked(message: &str) -> Self {
        Self {
            code: None,
            message: format!("Program failed to complete: {message}"),
        }
    }

    fn opaque(message: &str) -> Self {
        Self {
            code: None,
            message: message.to_string(),
        }
    }
}

pub struct SimulatedLedger {
    payer: Pubkey,
    program_id: Pubkey,
    world: Mutex<World>,
    submissions: Mutex<Vec<Vec<Instruction>>>,
    /// ATAs another client creates right before the next submission lands.
    preempt: Mutex<Vec<(Pubkey, Pubkey)>>,
    signatures: AtomicU64,
    reads_fail: AtomicBool,
    submits_time_out: AtomicBool,
}

impl SimulatedLedger {
    pub fn new(payer: Pubkey, program_id: Pubkey) -> Self {
        let world = World {
            now: START,
            ..Default::default()
        };
        Self {
            payer,
            program_id,
            world: Mutex::new(world),
            submissions: Mutex::new(Vec::new()),
            preempt: Mutex::new(Vec::new()),
            signatures: AtomicU64::new(0),
            reads_fail: AtomicBool::new(false),
            submits_time_out: AtomicBool::new(false),
        }
    }

    pub fn airdrop(&self, wallet: &Pubkey, lamports: u64) {
        *self.world.lock().unwrap().lamports.entry(*wallet).or_default() += lamports;
    }

    pub fn lamports(&self, wallet: &Pubkey) -> u64 {
        self.world.lock().unwrap().lamports.get(wallet).copied().unwrap_or_default()
    }

    /// Mint one NFT whose metadata names `collection` as verified creator,
    /// held in `owner`'s associated account.
    pub fn mint_nft(&self, owner: &Pubkey, collection: &Pubkey) -> Pubkey {
        let mint = Pubkey::new_unique();
        let mut world = self.world.lock().unwrap();
        world.mint_collections.insert(mint, *collection);
        let ata = associated_token_address(owner, &mint);
        world.open_token_account(ata, mint);
        if let Some(account) = world.tokens.get_mut(&ata) {
            account.amount = 1;
        }
        mint
    }

    pub fn token_balance(&self, owner: &Pubkey, mint: &Pubkey) -> Option<u64> {
        let ata = associated_token_address(owner, mint);
        self.world.lock().unwrap().tokens.get(&ata).map(|t| t.amount)
    }

    pub fn has_account(&self, address: &Pubkey) -> bool {
        self.world.lock().unwrap().accounts.contains_key(address)
    }

    pub fn now(&self) -> i64 {
        self.world.lock().unwrap().now
    }

    pub fn advance_clock(&self, seconds: i64) {
        self.world.lock().unwrap().now += seconds;
    }

    pub fn set_reads_fail(&self, fail: bool) {
        self.reads_fail.store(fail, Ordering::SeqCst);
    }

    pub fn set_submits_time_out(&self, time_out: bool) {
        self.submits_time_out.store(time_out, Ordering::SeqCst);
    }

    /// Have a concurrent client create `owner`'s associated account for
    /// `mint` just before the next transaction executes.
    pub fn preempt_associated_account(&self, owner: &Pubkey, mint: &Pubkey) {
        self.preempt.lock().unwrap().push((*owner, *mint));
    }

    pub fn submissions(&self) -> Vec<Vec<Instruction>> {
        self.submissions.lock().unwrap().clone()
    }

    pub fn raffle(&self, address: &Pubkey) -> RaffleState {
        let world = self.world.lock().unwrap();
        RaffleState::from_account_data(&world.accounts[address].data).unwrap()
    }

    fn next_signature(&self) -> Signature {
        let n = self.signatures.fetch_add(1, Ordering::SeqCst) + 1;
        let mut bytes = [0u8; 64];
        bytes[..8].copy_from_slice(&n.to_le_bytes());
        Signature::from(bytes)
    }

    fn execute(&self, instructions: &[Instruction]) -> Result<(), LedgerError> {
        let mut world = self.world.lock().unwrap();
        for (owner, mint) in self.preempt.lock().unwrap().drain(..) {
            let ata = associated_token_address(&owner, &mint);
            world.open_token_account(ata, mint);
        }

        let mut staged = world.clone();
        for (index, ix) in instructions.iter().enumerate() {
            self.apply(&mut staged, ix).map_err(|fail| LedgerError::Rejected {
                instruction_index: Some(index as u8),
                custom_code: fail.code,
                message: fail.message,
            })?;
        }
        *world = staged;
        Ok(())
    }

    fn apply(&self, world: &mut World, ix: &Instruction) -> Result<(), Fail> {
        match ix.program_id {
            id if id == COMPUTE_BUDGET_PROGRAM_ID => Ok(()),
            id if id == SYSTEM_PROGRAM_ID => world.create_account_with_seed(ix),
            id if id == ASSOCIATED_TOKEN_PROGRAM_ID => world.create_associated_account(ix),
            id if id == self.program_id => self.apply_program(world, ix),
            other => Err(Fail::opaque(&format!("unknown program {other}"))),
        }
    }

    fn apply_program(&self, world: &mut World, ix: &Instruction) -> Result<(), Fail> {
        let (disc, args) = ix.data.split_at(8);
        let key = |i: usize| ix.accounts[i].pubkey;
        let is = |name: &str| disc == instruction_discriminator(name);

        if is("initialize") {
            self.initialize(world, key(0), key(1), key(2))
        } else if is("add_collection") {
            world.add_collection(key(1), key(2))
        } else if is("create_raffle") {
            let price = u64::from_le_bytes(args[0..8].try_into().unwrap());
            let end = i64::from_le_bytes(args[8..16].try_into().unwrap());
            let max = u16::from_le_bytes(args[16..18].try_into().unwrap());
            world.create_raffle(&ix.accounts.iter().map(|m| m.pubkey).collect::<Vec<_>>(), price, end, max)
        } else if is("buy_tickets") {
            let demand = u16::from_le_bytes(args[0..2].try_into().unwrap());
            world.buy_tickets(key(0), key(1), key(3), key(4), demand)
        } else if is("reveal_winner") {
            world.reveal_winner(key(0))
        } else if is("claim_reward") {
            world.claim_reward(key(0), key(2), key(3), key(4))
        } else if is("withdraw_nft") {
            world.withdraw_nft(key(0), key(2), key(3), key(4))
        } else {
            Err(Fail::opaque("unknown instruction"))
        }
    }

    fn initialize(&self, world: &mut World, su: Pubkey, global: Pubkey, pool: Pubkey) -> Result<(), Fail> {
        if global != global_authority(&self.program_id).0 {
            return Err(Fail::opaque("ConstraintSeeds"));
        }
        if world.accounts.contains_key(&global) {
            return Err(Fail::system(0, "account already in use"));
        }
        let pool_account = world
            .accounts
            .get_mut(&pool)
            .filter(|a| a.owner == self.program_id)
            .ok_or_else(|| Fail::opaque("AccountNotInitialized"))?;
        if pool_account.data[..8] != [0u8; 8] {
            return Err(Fail::opaque("AccountDiscriminatorAlreadySet"));
        }
        pool_account.data = CollectionPoolState { collections: vec![] }.to_account_data();
        world.accounts.insert(
            global,
            Account {
                owner: self.program_id,
                data: GlobalPoolState { super_user: su }.to_account_data(),
            },
        );
        Ok(())
    }
}

impl World {
    fn open_token_account(&mut self, address: Pubkey, mint: Pubkey) {
        self.accounts.insert(
            address,
            Account {
                owner: TOKEN_PROGRAM_ID,
                data: vec![0u8; TOKEN_ACCOUNT_LEN],
            },
        );
        self.tokens.insert(address, TokenAccount { mint, amount: 0 });
    }

    fn debit(&mut self, wallet: &Pubkey, lamports: u64) -> Result<(), Fail> {
        let balance = self.lamports.entry(*wallet).or_default();
        if *balance < lamports {
            return Err(Fail::system(1, "insufficient lamports"));
        }
        *balance -= lamports;
        Ok(())
    }

    fn credit(&mut self, wallet: &Pubkey, lamports: u64) {
        *self.lamports.entry(*wallet).or_default() += lamports;
    }

    fn create_account_with_seed(&mut self, ix: &Instruction) -> Result<(), Fail> {
        let data = &ix.data;
        if data[0..4] != 3u32.to_le_bytes() {
            return Err(Fail::opaque("unsupported system instruction"));
        }
        let base = Pubkey::try_from(&data[4..36]).unwrap();
        let seed_len = u64::from_le_bytes(data[36..44].try_into().unwrap()) as usize;
        let seed = std::str::from_utf8(&data[44..44 + seed_len]).unwrap();
        let rest = &data[44 + seed_len..];
        let lamports = u64::from_le_bytes(rest[0..8].try_into().unwrap());
        let space = u64::from_le_bytes(rest[8..16].try_into().unwrap()) as usize;
        let owner = Pubkey::try_from(&rest[16..48]).unwrap();

        let target = ix.accounts[1].pubkey;
        if Pubkey::create_with_seed(&base, seed, &owner).ok() != Some(target) {
            return Err(Fail::system(5, "address with seed mismatch"));
        }
        if self.accounts.contains_key(&target) {
            return Err(Fail::system(0, "account already in use"));
        }
        self.debit(&ix.accounts[0].pubkey, lamports)?;
        self.accounts.insert(
            target,
            Account {
                owner,
                data: vec![0u8; space],
            },
        );
        Ok(())
    }

    fn create_associated_account(&mut self, ix: &Instruction) -> Result<(), Fail> {
        let (payer, address, owner, mint) = (
            ix.accounts[0].pubkey,
            ix.accounts[1].pubkey,
            ix.accounts[2].pubkey,
            ix.accounts[3].pubkey,
        );
        if associated_token_address(&owner, &mint) != address {
            return Err(Fail::opaque("invalid associated token address"));
        }
        if self.accounts.contains_key(&address) {
            return Err(Fail::system(0, "account already in use"));
        }
        self.debit(&payer, ATA_RENT)?;
        self.open_token_account(address, mint);
        Ok(())
    }

    fn transfer_nft(&mut self, from: &Pubkey, to: &Pubkey, mint: &Pubkey) -> Result<(), Fail> {
        let source = self.tokens.get(from).filter(|t| t.mint == *mint && t.amount >= 1);
        if source.is_none() {
            return Err(Fail::system(1, "token: insufficient funds"));
        }
        if self.tokens.get(to).filter(|t| t.mint == *mint).is_none() {
            return Err(Fail::opaque("token: invalid destination account"));
        }
        if let Some(t) = self.tokens.get_mut(from) {
            t.amount -= 1;
        }
        if let Some(t) = self.tokens.get_mut(to) {
            t.amount += 1;
        }
        Ok(())
    }

    fn add_collection(&mut self, pool: Pubkey, collection: Pubkey) -> Result<(), Fail> {
        let account = self
            .accounts
            .get_mut(&pool)
            .ok_or_else(|| Fail::opaque("AccountNotInitialized"))?;
        let mut state = CollectionPoolState::from_account_data(&account.data)
            .map_err(|e| Fail::opaque(&e.to_string()))?;
        if state.collections.contains(&collection) {
            return Ok(());
        }
        if state.is_full() {
            return Err(Fail::panicked("index out of bounds"));
        }
        state.collections.push(collection);
        account.data = state.to_account_data();
        Ok(())
    }

    fn load_raffle(&self, raffle: &Pubkey) -> Result<RaffleState, Fail> {
        let account = self
            .accounts
            .get(raffle)
            .ok_or_else(|| Fail::opaque("AccountNotInitialized"))?;
        RaffleState::from_account_data(&account.data).map_err(|e| Fail::opaque(&e.to_string()))
    }

    fn store_raffle(&mut self, raffle: &Pubkey, state: &RaffleState) {
        if let Some(account) = self.accounts.get_mut(raffle) {
            let len = account.data.len();
            account.data = state.to_account_data(len);
        }
    }

    fn create_raffle(&mut self, keys: &[Pubkey], price: u64, end: i64, max: u16) -> Result<(), Fail> {
        let [creator, _global, raffle, pool, creator_ata, program_ata, mint, metadata, ..] = keys else {
            return Err(Fail::opaque("missing accounts"));
        };

        let raffle_account = self
            .accounts
            .get(raffle)
            .ok_or_else(|| Fail::opaque("AccountNotInitialized"))?;
        if raffle_account.data.len() < RaffleState::LEN || raffle_account.data[..8] != [0u8; 8] {
            return Err(Fail::opaque("AccountDiscriminatorAlreadySet"));
        }
        if *metadata != metadata_address(mint) {
            return Err(Fail::program(Rejection::InvalidMetadata));
        }
        let Some(collection) = self.mint_collections.get(mint).copied() else {
            return Err(Fail::program(Rejection::MetadataCreatorParseError));
        };
        let pool_state = self
            .accounts
            .get(pool)
            .and_then(|a| CollectionPoolState::from_account_data(&a.data).ok())
            .ok_or_else(|| Fail::opaque("AccountNotInitialized"))?;
        if !pool_state.collections.contains(&collection) {
            return Err(Fail::program(Rejection::InvalidCollection));
        }
        if max as usize > MAX_ENTRANTS {
            return Err(Fail::program(Rejection::MaxEntrantsTooLarge));
        }
        if self.now + DAY > end {
            return Err(Fail::program(Rejection::EndTimeTooEarly));
        }

        self.transfer_nft(creator_ata, program_ata, mint)?;

        let state = RaffleState {
            creator: *creator,
            nft_mint: *mint,
            ticket_count: 0,
            max_entrants: max,
            timestamp_start: self.now,
            timestamp_end: end,
            ticket_price: price,
            winner: None,
            status: RaffleStatus::Active,
            entrants: vec![],
        };
        self.store_raffle(raffle, &state);
        Ok(())
    }

    fn buy_tickets(
        &mut self,
        buyer: Pubkey,
        raffle: Pubkey,
        creator: Pubkey,
        treasury: Pubkey,
        demand: u16,
    ) -> Result<(), Fail> {
        let mut state = self.load_raffle(&raffle)?;
        if state.creator != creator {
            return Err(Fail::opaque("ConstraintRaw: raffle_creator"));
        }
        if self.now >= state.timestamp_end {
            return Err(Fail::program(Rejection::RaffleEnded));
        }
        if state.ticket_count as u32 + demand as u32 > state.max_entrants as u32 {
            return Err(Fail::program(Rejection::RaffleFull));
        }
        let total = state.ticket_price * demand as u64;
        if total >= self.lamports.get(&buyer).copied().unwrap_or_default() {
            return Err(Fail::program(Rejection::NotEnoughSol));
        }

        let fee = total * COMMISSION_PERCENT / 100;
        self.debit(&buyer, total)?;
        self.credit(&creator, total - fee);
        self.credit(&treasury, fee);

        state.ticket_count += demand;
        state.entrants.extend(std::iter::repeat_n(buyer, demand as usize));
        self.store_raffle(&raffle, &state);
        Ok(())
    }

    fn reveal_winner(&mut self, raffle: Pubkey) -> Result<(), Fail> {
        let mut state = self.load_raffle(&raffle)?;
        if self.now < state.timestamp_end {
            return Err(Fail::program(Rejection::NotYetEnded));
        }
        if state.entrants.is_empty() {
            return Err(Fail::program(Rejection::NoEntrants));
        }
        if state.status != RaffleStatus::Active {
            return Err(Fail::program(Rejection::AlreadyClaimed));
        }
        let index = self.now.unsigned_abs() as usize % state.entrants.len();
        state.winner = Some(state.entrants[index]);
        state.status = RaffleStatus::WinnerRevealed;
        self.store_raffle(&raffle, &state);
        Ok(())
    }

    fn claim_reward(&mut self, claimer: Pubkey, raffle: Pubkey, claimer_ata: Pubkey, program_ata: Pubkey) -> Result<(), Fail> {
        let mut state = self.load_raffle(&raffle)?;
        if state.winner != Some(claimer) {
            return Err(Fail::program(Rejection::NotWinner));
        }
        if self.now < state.timestamp_end {
            return Err(Fail::program(Rejection::NotYetEnded));
        }
        if state.status != RaffleStatus::WinnerRevealed {
            return Err(Fail::program(Rejection::AlreadyClaimed));
        }
        self.transfer_nft(&program_ata, &claimer_ata, &state.nft_mint)?;
        state.status = RaffleStatus::Claimed;
        self.store_raffle(&raffle, &state);
        Ok(())
    }

    fn withdraw_nft(&mut self, creator: Pubkey, raffle: Pubkey, creator_ata: Pubkey, program_ata: Pubkey) -> Result<(), Fail> {
        let mut state = self.load_raffle(&raffle)?;
        if state.creator != creator {
            return Err(Fail::program(Rejection::NotCreator));
        }
        if self.now < state.timestamp_end {
            return Err(Fail::program(Rejection::NotYetEnded));
        }
        if !state.entrants.is_empty() {
            return Err(Fail::program(Rejection::HasEntrants));
        }
        if state.status != RaffleStatus::Active {
            return Err(Fail::program(Rejection::AlreadyClaimed));
        }
        self.transfer_nft(&program_ata, &creator_ata, &state.nft_mint)?;
        state.status = RaffleStatus::Withdrawn;
        self.store_raffle(&raffle, &state);
        Ok(())
    }
}

impl LedgerClient for SimulatedLedger {
    fn payer(&self) -> Pubkey {
        self.payer
    }

    async fn account_exists(&self, address: &Pubkey) -> Result<bool, LedgerError> {
        Ok(self.account_data(address).await?.is_some())
    }

    async fn account_data(&self, address: &Pubkey) -> Result<Option<Vec<u8>>, LedgerError> {
        if self.reads_fail.load(Ordering::SeqCst) {
            return Err(LedgerError::Transport("connection refused".into()));
        }
        tokio::task::yield_now().await;
        let world = self.world.lock().unwrap();
        Ok(world.accounts.get(address).map(|a| a.data.clone()))
    }

    async fn minimum_balance_for_rent_exemption(&self, size: usize) -> Result<u64, LedgerError> {
        if self.reads_fail.load(Ordering::SeqCst) {
            return Err(LedgerError::Transport("connection refused".into()));
        }
        Ok((128 + size as u64) * 3480 * 2)
    }

    async fn submit(&self, instructions: &[Instruction]) -> Result<Signature, LedgerError> {
        self.submissions.lock().unwrap().push(instructions.to_vec());
        tokio::task::yield_now().await;
        let signature = self.next_signature();
        self.execute(instructions)?;
        if self.submits_time_out.load(Ordering::SeqCst) {
            return Err(LedgerError::ConfirmationTimeout { signature });
        }
        Ok(signature)
    }
}

/// A program deployment with a funded super user acting as the wallet.
pub struct Fixture {
    pub ledger: SimulatedLedger,
    pub ctx: ProgramContext,
    pub collection: Pubkey,
}

impl Fixture {
    pub fn new() -> Self {
        let super_user = Pubkey::new_unique();
        let ctx = ProgramContext {
            program_id: Pubkey::new_unique(),
            super_user,
            treasury: Pubkey::new_unique(),
        };
        let ledger = SimulatedLedger::new(super_user, ctx.program_id);
        ledger.airdrop(&super_user, 100 * 1_000_000_000);
        Self {
            ledger,
            ctx,
            collection: Pubkey::new_unique(),
        }
    }

    pub fn funded_wallet(&self, sol: u64) -> Pubkey {
        let wallet = Pubkey::new_unique();
        self.ledger.airdrop(&wallet, sol * 1_000_000_000);
        wallet
    }
}
