//! Raffle lifecycle operations.
//!
//! Each operation derives the addresses it needs, probes the accounts that
//! may be missing, prepends their creations to the program instruction and
//! submits everything as one transaction:
//!
//! ```text
//! initialize_pool      allocate pool         -> initialize
//! register_collection                        -> add_collection
//! create_raffle        allocate raffle, ATAs -> create_raffle
//! buy_tickets                                -> buy_tickets
//! reveal_winner                              -> reveal_winner
//! claim_reward         claimer ATA           -> claim_reward
//! withdraw_unsold_nft  creator ATA           -> withdraw_nft
//! ```
//!
//! Program rules (capacity, timing, ownership) are enforced on-chain; a
//! refusal comes back as [`ErrorKind::Rejected`] with the program's reason.

use solana_sdk::instruction::Instruction;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use tracing::{info, instrument, warn};

use crate::accounts::{ensure_associated_account, ensure_fixed_account};
use crate::config::ProgramContext;
use crate::constants::{
    COLLECTION_POOL_SEED, COLLECTION_POOL_SIZE, LAMPORTS_PER_SOL, RAFFLE_SIZE, SOL_DECIMALS,
};
use crate::derive::{self, associated_token_address, metadata_address};
use crate::error::{ErrorKind, Operation, OperationError, Rejection};
use crate::instructions::{self, CreateRaffleAccounts, PayoutAccounts};
use crate::ledger::{LedgerClient, LedgerError};
use crate::probe::AccountProbe;
use crate::state::{CollectionPoolState, GlobalPoolState, RaffleState};

/// `SystemError::AccountAlreadyInUse`.
const SYSTEM_ACCOUNT_ALREADY_IN_USE: u32 = 0;
/// `SystemError::ResultWithNegativeLamports`.
const SYSTEM_RESULT_WITH_NEGATIVE_LAMPORTS: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StepKind {
    Allocation,
    AssociatedCreation,
    Primary,
}

#[derive(Debug, Clone)]
struct Step {
    kind: StepKind,
    role: &'static str,
    address: Pubkey,
    instruction: Instruction,
}

/// Ordered instruction list of one transaction, with the account each
/// instruction is about.
#[derive(Debug, Clone, Default)]
struct Plan {
    steps: Vec<Step>,
}

impl Plan {
    fn allocate(&mut self, role: &'static str, address: Pubkey, instruction: Instruction) {
        self.push(StepKind::Allocation, role, address, instruction);
    }

    fn create_associated(&mut self, role: &'static str, instructions: Vec<Instruction>) {
        for instruction in instructions {
            let address = instruction.accounts[1].pubkey;
            self.push(StepKind::AssociatedCreation, role, address, instruction);
        }
    }

    fn primary(mut self, role: &'static str, address: Pubkey, instruction: Instruction) -> Self {
        self.push(StepKind::Primary, role, address, instruction);
        self
    }

    fn push(&mut self, kind: StepKind, role: &'static str, address: Pubkey, instruction: Instruction) {
        self.steps.push(Step {
            kind,
            role,
            address,
            instruction,
        });
    }

    fn instructions(&self) -> Vec<Instruction> {
        self.steps.iter().map(|s| s.instruction.clone()).collect()
    }

    fn creations(&self) -> usize {
        self.steps.iter().filter(|s| s.kind != StepKind::Primary).count()
    }

    fn step(&self, index: u8) -> Option<&Step> {
        self.steps.get(index as usize)
    }

    fn primary_step(&self) -> Option<&Step> {
        self.steps.last()
    }
}

enum Failure {
    /// An associated account was created by someone else between the probe
    /// and the submission.
    CreationRaced { address: Pubkey },
    Failed(OperationError),
}

/// Submit a plan and wait for confirmation, re-planning once if an
/// associated account creation lost a race with a concurrent creator.
async fn submit_planned<L: LedgerClient>(
    ledger: &L,
    operation: Operation,
    mut plan: impl AsyncFnMut() -> Result<Plan, OperationError>,
) -> Result<Signature, OperationError> {
    let first = plan().await?;
    match execute(ledger, operation, &first).await {
        Ok(signature) => Ok(signature),
        Err(Failure::Failed(err)) => Err(err),
        Err(Failure::CreationRaced { address }) => {
            warn!(%operation, account = %address, "Associated account appeared concurrently, re-planning");
            let second = plan().await?;
            execute(ledger, operation, &second).await.map_err(|failure| match failure {
                Failure::Failed(err) => err,
                Failure::CreationRaced { address } => OperationError::new(
                    operation,
                    "associated_account",
                    address,
                    ErrorKind::Rejected(Rejection::Opaque(
                        "associated account creation raced twice".into(),
                    )),
                ),
            })
        }
    }
}

async fn execute<L: LedgerClient>(
    ledger: &L,
    operation: Operation,
    plan: &Plan,
) -> Result<Signature, Failure> {
    let signature = ledger
        .submit(&plan.instructions())
        .await
        .map_err(|err| classify(operation, plan, err))?;
    info!(
        %operation,
        %signature,
        created_accounts = plan.creations(),
        "Transaction confirmed"
    );
    Ok(signature)
}

/// Attribute a ledger failure to the step that caused it.
///
/// A rejection without a step of ours (a transaction-level failure or the
/// prepended priority-fee instruction) is reported against the transaction.
/// Failures that never reached execution are reported against the primary
/// instruction's account.
fn classify(operation: Operation, plan: &Plan, err: LedgerError) -> Failure {
    let (step, kind) = match err {
        LedgerError::Rejected {
            instruction_index,
            custom_code,
            message,
        } => {
            let Some(step) = instruction_index.and_then(|i| plan.step(i)) else {
                let reason = rejection_reason(operation, custom_code, message);
                return Failure::Failed(OperationError::new(
                    operation,
                    "transaction",
                    Pubkey::default(),
                    ErrorKind::Rejected(reason),
                ));
            };
            let kind = match (step.kind, custom_code) {
                (StepKind::AssociatedCreation, Some(SYSTEM_ACCOUNT_ALREADY_IN_USE)) => {
                    return Failure::CreationRaced {
                        address: step.address,
                    };
                }
                (
                    StepKind::AssociatedCreation | StepKind::Allocation,
                    Some(SYSTEM_RESULT_WITH_NEGATIVE_LAMPORTS),
                ) => ErrorKind::InsufficientFunds(message),
                _ => ErrorKind::Rejected(rejection_reason(operation, custom_code, message)),
            };
            (Some(step), kind)
        }
        LedgerError::InsufficientFunds(message) => {
            (plan.primary_step(), ErrorKind::InsufficientFunds(message))
        }
        LedgerError::ConfirmationTimeout { signature } => {
            (plan.primary_step(), ErrorKind::ConfirmationTimeout { signature })
        }
        LedgerError::Transport(message) => (plan.primary_step(), ErrorKind::Transport(message)),
        LedgerError::Signing(message) => (plan.primary_step(), ErrorKind::Signing(message)),
    };

    let (role, address) = step
        .map(|s| (s.role, s.address))
        .unwrap_or(("transaction", Pubkey::default()));
    Failure::Failed(OperationError::new(operation, role, address, kind))
}

/// Name the refusal. Codes from the raffle program map directly; the two
/// conditions the program does not code are recognized per operation.
fn rejection_reason(operation: Operation, custom_code: Option<u32>, message: String) -> Rejection {
    if let Some(reason) = custom_code.and_then(Rejection::from_program_code) {
        return reason;
    }
    match (operation, custom_code) {
        (Operation::InitializePool, Some(SYSTEM_ACCOUNT_ALREADY_IN_USE)) => {
            Rejection::AlreadyInitialized
        }
        // The program indexes past the end of its fixed collection array.
        (Operation::RegisterCollection, None) if message.contains("failed to complete") => {
            Rejection::PoolFull
        }
        _ => Rejection::Opaque(message),
    }
}

/// Convert a decimal SOL amount such as `"0.01"` into lamports.
pub fn sol_to_lamports(price: &str) -> Result<u64, ErrorKind> {
    let invalid = || ErrorKind::InvalidTicketPrice(price.to_string());
    let trimmed = price.trim();
    let (whole, frac) = trimmed.split_once('.').unwrap_or((trimmed, ""));

    let digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    if (whole.is_empty() && frac.is_empty())
        || !digits(whole)
        || !digits(frac)
        || frac.len() > SOL_DECIMALS as usize
    {
        return Err(invalid());
    }

    let whole: u64 = if whole.is_empty() {
        0
    } else {
        whole.parse().map_err(|_| invalid())?
    };
    let frac: u64 = if frac.is_empty() {
        0
    } else {
        format!("{frac:0<width$}", width = SOL_DECIMALS as usize)
            .parse()
            .map_err(|_| invalid())?
    };

    whole
        .checked_mul(LAMPORTS_PER_SOL)
        .and_then(|lamports| lamports.checked_add(frac))
        .ok_or_else(invalid)
}

/// Allocate the collection pool and initialize the global authority.
#[instrument(skip_all, fields(super_user = %ctx.super_user))]
pub async fn initialize_pool<L: LedgerClient>(
    ledger: &L,
    ctx: &ProgramContext,
) -> Result<Signature, OperationError> {
    let operation = Operation::InitializePool;
    let (global_authority, _) = derive::global_authority(&ctx.program_id);
    let collection_pool = derive::collection_pool(&ctx.super_user, &ctx.program_id)
        .map_err(|e| OperationError::new(operation, "collection_pool", ctx.super_user, e.into()))?;

    info!(%global_authority, %collection_pool, "Initializing raffle pool");

    submit_planned(ledger, operation, async || {
        let mut plan = Plan::default();
        let allocation = ensure_fixed_account(
            ledger,
            operation,
            "collection_pool",
            &ctx.super_user,
            &collection_pool,
            &ctx.super_user,
            COLLECTION_POOL_SEED,
            COLLECTION_POOL_SIZE,
            &ctx.program_id,
        )
        .await?;
        plan.allocate("collection_pool", collection_pool, allocation);

        let initialize = instructions::initialize(
            &ctx.program_id,
            &ctx.super_user,
            &global_authority,
            &collection_pool,
        );
        Ok(plan.primary("global_authority", global_authority, initialize))
    })
    .await
}

/// Add a collection's verified creator key to the pool.
#[instrument(skip_all, fields(collection = %collection_id))]
pub async fn register_collection<L: LedgerClient>(
    ledger: &L,
    ctx: &ProgramContext,
    collection_id: &Pubkey,
) -> Result<Signature, OperationError> {
    let operation = Operation::RegisterCollection;
    let collection_pool = derive::collection_pool(&ctx.super_user, &ctx.program_id)
        .map_err(|e| OperationError::new(operation, "collection_pool", ctx.super_user, e.into()))?;

    submit_planned(ledger, operation, async || {
        let ix = instructions::add_collection(
            &ctx.program_id,
            &ctx.super_user,
            &collection_pool,
            collection_id,
        );
        Ok(Plan::default().primary("collection_pool", collection_pool, ix))
    })
    .await
}

/// Inputs of [`create_raffle`].
#[derive(Debug, Clone)]
pub struct CreateRaffleParams {
    pub creator: Pubkey,
    pub nft_mint: Pubkey,
    /// Ticket price in SOL as entered, e.g. `"0.01"`.
    pub ticket_price_sol: String,
    /// Unix timestamp (seconds) after which no tickets are sold.
    pub end_timestamp: i64,
    pub max_entrants: u16,
    /// Creation time in unix milliseconds; part of the raffle seed.
    pub created_at_ms: u64,
}

/// A raffle created by [`create_raffle`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedRaffle {
    pub signature: Signature,
    pub raffle: Pubkey,
    pub seed: String,
}

/// Allocate a raffle account and hand the NFT to the global authority.
#[instrument(skip_all, fields(creator = %params.creator, nft_mint = %params.nft_mint))]
pub async fn create_raffle<L: LedgerClient>(
    ledger: &L,
    ctx: &ProgramContext,
    params: &CreateRaffleParams,
) -> Result<CreatedRaffle, OperationError> {
    let operation = Operation::CreateRaffle;
    let creator = params.creator;
    let nft_mint = params.nft_mint;

    let (raffle, seed) = derive::raffle_address(&creator, &nft_mint, params.created_at_ms, &ctx.program_id)
        .map_err(|e| OperationError::new(operation, "raffle", creator, e.into()))?;
    let ticket_price = sol_to_lamports(&params.ticket_price_sol)
        .map_err(|kind| OperationError::new(operation, "raffle", raffle, kind))?;
    let collection_pool = derive::collection_pool(&ctx.super_user, &ctx.program_id)
        .map_err(|e| OperationError::new(operation, "collection_pool", ctx.super_user, e.into()))?;
    let (global_authority, _) = derive::global_authority(&ctx.program_id);
    let mint_metadata = metadata_address(&nft_mint);

    info!(%raffle, %seed, ticket_price, end = params.end_timestamp, max = params.max_entrants, "Creating raffle");

    let probe = AccountProbe::new(ledger);
    let signature = submit_planned(ledger, operation, async || {
        let mut plan = Plan::default();
        let allocation = ensure_fixed_account(
            ledger,
            operation,
            "raffle",
            &creator,
            &raffle,
            &creator,
            &seed,
            RAFFLE_SIZE,
            &ctx.program_id,
        )
        .await?;
        plan.allocate("raffle", raffle, allocation);

        let atas =
            ensure_associated_account(&probe, operation, &global_authority, &creator, &nft_mint)
                .await?;
        plan.create_associated("associated_account", atas.instructions);

        let accounts = CreateRaffleAccounts {
            creator,
            global_authority,
            raffle,
            collection_pool,
            creator_ata: associated_token_address(&creator, &nft_mint),
            program_ata: atas.destination,
            nft_mint,
            mint_metadata,
        };
        let ix = instructions::create_raffle(
            &ctx.program_id,
            &accounts,
            ticket_price,
            params.end_timestamp,
            params.max_entrants,
        );
        Ok(plan.primary("raffle", raffle, ix))
    })
    .await?;

    Ok(CreatedRaffle {
        signature,
        raffle,
        seed,
    })
}

/// Buy `amount` tickets of `raffle` for `buyer`.
#[instrument(skip_all, fields(%raffle, buyer = %buyer, amount = amount))]
pub async fn buy_tickets<L: LedgerClient>(
    ledger: &L,
    ctx: &ProgramContext,
    buyer: &Pubkey,
    raffle: &Pubkey,
    amount: u16,
) -> Result<Signature, OperationError> {
    let operation = Operation::BuyTickets;
    let (global_authority, _) = derive::global_authority(&ctx.program_id);

    let state = AccountProbe::new(ledger)
        .raffle(raffle)
        .await
        .map_err(|kind| OperationError::new(operation, "raffle", *raffle, kind))?;

    submit_planned(ledger, operation, async || {
        let ix = instructions::buy_tickets(
            &ctx.program_id,
            buyer,
            raffle,
            &global_authority,
            &state.creator,
            &ctx.treasury,
            amount,
        );
        Ok(Plan::default().primary("raffle", *raffle, ix))
    })
    .await
}

/// Ask the program to pick the winner of an ended raffle.
#[instrument(skip_all, fields(%raffle, caller = %caller))]
pub async fn reveal_winner<L: LedgerClient>(
    ledger: &L,
    ctx: &ProgramContext,
    caller: &Pubkey,
    raffle: &Pubkey,
) -> Result<Signature, OperationError> {
    submit_planned(ledger, Operation::RevealWinner, async || {
        let ix = instructions::reveal_winner(&ctx.program_id, raffle, caller);
        Ok(Plan::default().primary("raffle", *raffle, ix))
    })
    .await
}

/// Transfer the raffled NFT to the winner.
#[instrument(skip_all, fields(%raffle, winner = %winner))]
pub async fn claim_reward<L: LedgerClient>(
    ledger: &L,
    ctx: &ProgramContext,
    winner: &Pubkey,
    raffle: &Pubkey,
) -> Result<Signature, OperationError> {
    payout(ledger, ctx, Operation::ClaimReward, winner, raffle).await
}

/// Return the NFT of a raffle that sold no tickets to its creator.
#[instrument(skip_all, fields(%raffle, creator = %creator))]
pub async fn withdraw_unsold_nft<L: LedgerClient>(
    ledger: &L,
    ctx: &ProgramContext,
    creator: &Pubkey,
    raffle: &Pubkey,
) -> Result<Signature, OperationError> {
    payout(ledger, ctx, Operation::WithdrawUnsoldNft, creator, raffle).await
}

/// Shared body of `claim_reward` and `withdraw_nft`: both move the NFT from
/// the global authority's account to the recipient's, creating the latter if
/// needed.
async fn payout<L: LedgerClient>(
    ledger: &L,
    ctx: &ProgramContext,
    operation: Operation,
    recipient: &Pubkey,
    raffle: &Pubkey,
) -> Result<Signature, OperationError> {
    let probe = AccountProbe::new(ledger);
    let state = probe
        .raffle(raffle)
        .await
        .map_err(|kind| OperationError::new(operation, "raffle", *raffle, kind))?;
    let nft_mint = state.nft_mint;
    let (global_authority, global_bump) = derive::global_authority(&ctx.program_id);
    let program_ata = associated_token_address(&global_authority, &nft_mint);

    submit_planned(ledger, operation, async || {
        let atas = ensure_associated_account(&probe, operation, recipient, recipient, &nft_mint).await?;
        let accounts = PayoutAccounts {
            recipient: *recipient,
            global_authority,
            raffle: *raffle,
            recipient_ata: atas.destination,
            program_ata,
            nft_mint,
        };
        let ix = match operation {
            Operation::WithdrawUnsoldNft => {
                instructions::withdraw_nft(&ctx.program_id, &accounts, global_bump)
            }
            _ => instructions::claim_reward(&ctx.program_id, &accounts, global_bump),
        };

        let mut plan = Plan::default();
        plan.create_associated("recipient_ata", atas.instructions);
        Ok(plan.primary("raffle", *raffle, ix))
    })
    .await
}

/// Read a raffle's current on-chain state.
pub async fn fetch_raffle<L: LedgerClient>(ledger: &L, raffle: &Pubkey) -> Result<RaffleState, OperationError> {
    AccountProbe::new(ledger)
        .raffle(raffle)
        .await
        .map_err(|kind| OperationError::new(Operation::FetchRaffle, "raffle", *raffle, kind))
}

/// Read the registered collections.
pub async fn fetch_collection_pool<L: LedgerClient>(
    ledger: &L,
    ctx: &ProgramContext,
) -> Result<CollectionPoolState, OperationError> {
    let operation = Operation::FetchCollectionPool;
    let collection_pool = derive::collection_pool(&ctx.super_user, &ctx.program_id)
        .map_err(|e| OperationError::new(operation, "collection_pool", ctx.super_user, e.into()))?;
    AccountProbe::new(ledger)
        .collection_pool(&collection_pool)
        .await
        .map_err(|kind| OperationError::new(operation, "collection_pool", collection_pool, kind))
}

/// Read the deployment's global pool. Its super user is the one the
/// collection pool was derived from at initialization.
pub async fn fetch_global_pool<L: LedgerClient>(
    ledger: &L,
    ctx: &ProgramContext,
) -> Result<GlobalPoolState, OperationError> {
    let operation = Operation::FetchGlobalPool;
    let (global_authority, _) = derive::global_authority(&ctx.program_id);
    AccountProbe::new(ledger)
        .global_pool(&global_authority)
        .await
        .map_err(|kind| OperationError::new(operation, "global_authority", global_authority, kind))
}
