//! Client-side orchestration for the NFT raffle program.
//!
//! - [`derive`] computes every account address an operation touches.
//! - [`probe`] reads the ledger before a transaction is assembled.
//! - [`instructions`] encodes the raffle program's instructions.
//! - [`lifecycle`] sequences probe, plan and submit for each operation.
//! - [`ledger`] is the network seam; [`ledger::RpcLedger`] is the JSON-RPC implementation.

pub mod accounts;
pub mod api;
pub mod config;
pub mod constants;
pub mod derive;
pub mod error;
pub mod instructions;
pub mod ledger;
pub mod lifecycle;
pub mod metrics;
pub mod probe;
pub mod state;
