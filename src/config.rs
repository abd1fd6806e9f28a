//! Application configuration loaded from environment variables.
//!
//! Required: `PROGRAM_ID`
//! Optional: `RPC_URL`, `WALLET_KEYPAIR_PATH`, `SUPER_USER`, `TREASURY_WALLET`,
//!           `CLUSTER`, `HTTP_PORT`, `CONFIRM_TIMEOUT_SECS`,
//!           `PRIORITY_FEE_MICRO_LAMPORTS`

use anyhow::{Context, Result};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signer, read_keypair_file};
use std::str::FromStr;
use std::sync::Arc;

use crate::constants::DEFAULT_TREASURY_WALLET;

/// Program identities every lifecycle operation derives from.
///
/// Built once at startup and passed by reference into each operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramContext {
    /// The deployed raffle program.
    pub program_id: Pubkey,
    /// Wallet that initialized the pool; base of the collection pool address.
    pub super_user: Pubkey,
    /// Fee wallet the program pays ticket commissions into.
    pub treasury: Pubkey,
}

/// Application configuration for the raffle orchestrator.
#[derive(Clone)]
pub struct AppConfig {
    /// Solana JSON-RPC endpoint (HTTP).
    pub rpc_url: String,
    /// Wallet that signs and pays for every submitted transaction.
    pub wallet_keypair: Arc<Keypair>,
    /// The deployed raffle program ID.
    pub program_id: Pubkey,
    /// Super user of the collection pool. Defaults to the wallet.
    pub super_user: Pubkey,
    /// Treasury wallet receiving ticket commissions.
    pub treasury: Pubkey,
    /// Cluster name for explorer URLs.
    pub cluster: String,
    /// HTTP server port.
    pub http_port: u16,
    /// How long to wait for a submitted transaction to confirm.
    pub confirm_timeout_secs: u64,
    /// Priority fee in micro-lamports per compute unit.
    pub priority_fee_micro_lamports: u64,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let rpc_url = std::env::var("RPC_URL").unwrap_or_else(|_| "http://127.0.0.1:8899".into());

        let keypair_path = std::env::var("WALLET_KEYPAIR_PATH")
            .unwrap_or_else(|_| "~/.config/solana/id.json".into());
        let keypair_path = shellexpand::tilde(&keypair_path).to_string();
        let wallet_keypair = read_keypair_file(&keypair_path)
            .map_err(|e| anyhow::anyhow!("{e}"))
            .with_context(|| format!("failed to read keypair from {keypair_path}"))?;

        let program_id_str = std::env::var("PROGRAM_ID").context("PROGRAM_ID env var must be set")?;
        let program_id = parse_pubkey("PROGRAM_ID", &program_id_str)?;

        let super_user = match std::env::var("SUPER_USER") {
            Ok(s) => parse_pubkey("SUPER_USER", &s)?,
            Err(_) => wallet_keypair.pubkey(),
        };

        let treasury_str =
            std::env::var("TREASURY_WALLET").unwrap_or_else(|_| DEFAULT_TREASURY_WALLET.into());
        let treasury = parse_pubkey("TREASURY_WALLET", &treasury_str)?;

        let cluster = std::env::var("CLUSTER").unwrap_or_else(|_| "devnet".into());

        let http_port = std::env::var("HTTP_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(8080);

        let confirm_timeout_secs = std::env::var("CONFIRM_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(60);

        let priority_fee_micro_lamports = std::env::var("PRIORITY_FEE_MICRO_LAMPORTS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);

        Ok(Self {
            rpc_url,
            wallet_keypair: Arc::new(wallet_keypair),
            program_id,
            super_user,
            treasury,
            cluster,
            http_port,
            confirm_timeout_secs,
            priority_fee_micro_lamports,
        })
    }

    pub fn program_context(&self) -> ProgramContext {
        ProgramContext {
            program_id: self.program_id,
            super_user: self.super_user,
            treasury: self.treasury,
        }
    }

    /// Return the Solscan explorer URL for a given transaction signature.
    pub fn explorer_url(&self, signature: &str) -> String {
        match self.cluster.as_str() {
            "mainnet-beta" => format!("https://solscan.io/tx/{signature}"),
            cluster => format!("https://solscan.io/tx/{signature}?cluster={cluster}"),
        }
    }
}

fn parse_pubkey(var: &str, value: &str) -> Result<Pubkey> {
    Pubkey::from_str(value).with_context(|| format!("invalid {var}: {value}"))
}
