//! HTTP surface over the lifecycle operations.
//!
//! Every mutating route acts as the configured wallet: it creates raffles,
//! buys tickets and claims as that wallet.

use actix_web::http::StatusCode;
use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use std::future::Future;
use std::str::FromStr;
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use tracing::warn;

use crate::config::{AppConfig, ProgramContext};
use crate::error::{ErrorKind, OperationError};
use crate::ledger::{LedgerClient, RpcLedger};
use crate::lifecycle::{self, CreateRaffleParams};
use crate::metrics::Metrics;
use crate::state::GlobalPoolState;

/// Shared application state accessible from HTTP handlers.
pub struct AppState {
    pub ledger: RpcLedger,
    pub ctx: ProgramContext,
    pub config: AppConfig,
    pub metrics: Metrics,
}

/// Register every route on an actix `App`.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health))
        .route("/status", web::get().to(status))
        .route("/pool", web::get().to(get_pool))
        .route("/pool/initialize", web::post().to(initialize_pool))
        .route("/pool/collections", web::post().to(register_collection))
        .route("/raffles", web::post().to(create_raffle))
        .route("/raffles", web::get().to(list_raffles))
        .route("/raffles/{address}", web::get().to(get_raffle))
        .route("/raffles/{address}/tickets", web::post().to(buy_tickets))
        .route("/raffles/{address}/reveal", web::post().to(reveal_winner))
        .route("/raffles/{address}/claim", web::post().to(claim_reward))
        .route("/raffles/{address}/withdraw", web::post().to(withdraw_unsold_nft));
}

#[derive(Debug, Deserialize)]
pub struct RegisterCollectionRequest {
    pub collection_id: String,
}

/// Ticket price as either a JSON string (`"0.01"`) or number (`0.01`).
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum TicketPrice {
    Text(String),
    Number(serde_json::Number),
}

impl TicketPrice {
    fn as_decimal(&self) -> String {
        match self {
            TicketPrice::Text(s) => s.clone(),
            TicketPrice::Number(n) => n.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateRaffleRequest {
    pub nft_mint: String,
    pub ticket_price: TicketPrice,
    pub end_timestamp: i64,
    pub max_entrants: u16,
}

#[derive(Debug, Deserialize)]
pub struct BuyTicketsRequest {
    pub amount: u16,
}

#[derive(Debug, Deserialize)]
pub struct RaffleQuery {
    pub creator: Option<String>,
}

#[derive(Debug, Serialize)]
struct Submitted {
    signature: String,
    explorer_url: String,
}

async fn health() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({"status": "ok"}))
}

async fn status(data: web::Data<AppState>) -> HttpResponse {
    let global_pool = lifecycle::fetch_global_pool(&data.ledger, &data.ctx).await;
    HttpResponse::Ok().json(serde_json::json!({
        "status": "running",
        "program": data.ctx.program_id.to_string(),
        "wallet": data.ledger.payer().to_string(),
        "deployment": deployment_json(&data.ctx, &global_pool),
        "metrics": data.metrics.to_json(),
    }))
}

/// Whether the pool is initialized and whether its on-chain super user is
/// the one this service derives the collection pool from.
fn deployment_json(
    ctx: &ProgramContext,
    global_pool: &Result<GlobalPoolState, OperationError>,
) -> serde_json::Value {
    match global_pool {
        Ok(pool) => serde_json::json!({
            "initialized": true,
            "super_user": pool.super_user.to_string(),
            "super_user_matches": pool.super_user == ctx.super_user,
        }),
        Err(err) if matches!(err.kind, ErrorKind::AccountMissing) => serde_json::json!({
            "initialized": false,
            "super_user": ctx.super_user.to_string(),
        }),
        Err(err) => {
            warn!(error = %err, "Global pool unreadable");
            serde_json::json!({ "error": err.to_string() })
        }
    }
}

async fn get_pool(data: web::Data<AppState>) -> HttpResponse {
    match lifecycle::fetch_collection_pool(&data.ledger, &data.ctx).await {
        Ok(pool) => HttpResponse::Ok().json(pool),
        Err(err) => error_response(&err),
    }
}

async fn initialize_pool(data: web::Data<AppState>) -> HttpResponse {
    let result = tracked(&data, lifecycle::initialize_pool(&data.ledger, &data.ctx)).await;
    signature_response(&data.config, result)
}

async fn register_collection(
    data: web::Data<AppState>,
    body: web::Json<RegisterCollectionRequest>,
) -> HttpResponse {
    let collection_id = match parse_pubkey("collection_id", &body.collection_id) {
        Ok(key) => key,
        Err(resp) => return resp,
    };
    let result = tracked(
        &data,
        lifecycle::register_collection(&data.ledger, &data.ctx, &collection_id),
    )
    .await;
    signature_response(&data.config, result)
}

async fn create_raffle(
    data: web::Data<AppState>,
    body: web::Json<CreateRaffleRequest>,
) -> HttpResponse {
    let nft_mint = match parse_pubkey("nft_mint", &body.nft_mint) {
        Ok(key) => key,
        Err(resp) => return resp,
    };
    let created_at_ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default();
    let params = CreateRaffleParams {
        creator: data.ledger.payer(),
        nft_mint,
        ticket_price_sol: body.ticket_price.as_decimal(),
        end_timestamp: body.end_timestamp,
        max_entrants: body.max_entrants,
        created_at_ms,
    };

    match tracked(&data, lifecycle::create_raffle(&data.ledger, &data.ctx, &params)).await {
        Ok(created) => HttpResponse::Ok().json(serde_json::json!({
            "raffle": created.raffle.to_string(),
            "seed": created.seed,
            "signature": created.signature.to_string(),
            "explorer_url": data.config.explorer_url(&created.signature.to_string()),
        })),
        Err(err) => error_response(&err),
    }
}

async fn list_raffles(data: web::Data<AppState>, query: web::Query<RaffleQuery>) -> HttpResponse {
    let creator = match &query.creator {
        Some(s) => match parse_pubkey("creator", s) {
            Ok(key) => key,
            Err(resp) => return resp,
        },
        None => data.ledger.payer(),
    };

    match data.ledger.find_raffles(&data.ctx.program_id, &creator).await {
        Ok(raffles) => {
            let body: Vec<_> = raffles
                .into_iter()
                .map(|(address, raffle)| {
                    serde_json::json!({ "address": address.to_string(), "raffle": raffle })
                })
                .collect();
            HttpResponse::Ok().json(body)
        }
        Err(err) => {
            warn!(%creator, error = %err, "Raffle listing failed");
            HttpResponse::ServiceUnavailable().json(serde_json::json!({"error": err.to_string()}))
        }
    }
}

async fn get_raffle(data: web::Data<AppState>, path: web::Path<String>) -> HttpResponse {
    let raffle = match parse_pubkey("address", &path) {
        Ok(key) => key,
        Err(resp) => return resp,
    };
    match lifecycle::fetch_raffle(&data.ledger, &raffle).await {
        Ok(state) => HttpResponse::Ok().json(state),
        Err(err) => error_response(&err),
    }
}

async fn buy_tickets(
    data: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<BuyTicketsRequest>,
) -> HttpResponse {
    let raffle = match parse_pubkey("address", &path) {
        Ok(key) => key,
        Err(resp) => return resp,
    };
    let buyer = data.ledger.payer();
    let result = tracked(
        &data,
        lifecycle::buy_tickets(&data.ledger, &data.ctx, &buyer, &raffle, body.amount),
    )
    .await;
    signature_response(&data.config, result)
}

async fn reveal_winner(data: web::Data<AppState>, path: web::Path<String>) -> HttpResponse {
    let raffle = match parse_pubkey("address", &path) {
        Ok(key) => key,
        Err(resp) => return resp,
    };
    let caller = data.ledger.payer();
    let result = tracked(
        &data,
        lifecycle::reveal_winner(&data.ledger, &data.ctx, &caller, &raffle),
    )
    .await;
    signature_response(&data.config, result)
}

async fn claim_reward(data: web::Data<AppState>, path: web::Path<String>) -> HttpResponse {
    let raffle = match parse_pubkey("address", &path) {
        Ok(key) => key,
        Err(resp) => return resp,
    };
    let winner = data.ledger.payer();
    let result = tracked(
        &data,
        lifecycle::claim_reward(&data.ledger, &data.ctx, &winner, &raffle),
    )
    .await;
    signature_response(&data.config, result)
}

async fn withdraw_unsold_nft(data: web::Data<AppState>, path: web::Path<String>) -> HttpResponse {
    let raffle = match parse_pubkey("address", &path) {
        Ok(key) => key,
        Err(resp) => return resp,
    };
    let creator = data.ledger.payer();
    let result = tracked(
        &data,
        lifecycle::withdraw_unsold_nft(&data.ledger, &data.ctx, &creator, &raffle),
    )
    .await;
    signature_response(&data.config, result)
}

/// Run an operation, recording its outcome in the metrics.
async fn tracked<T>(
    data: &AppState,
    operation: impl Future<Output = Result<T, OperationError>>,
) -> Result<T, OperationError> {
    data.metrics.record_submission();
    let started = Instant::now();
    let result = operation.await;
    match &result {
        Ok(_) => data
            .metrics
            .record_confirmation(started.elapsed().as_millis() as u64),
        Err(err) => {
            warn!(error = %err, retryable = err.is_retryable(), "Operation failed");
            data.metrics.record_error(err);
        }
    }
    result
}

fn signature_response(config: &AppConfig, result: Result<Signature, OperationError>) -> HttpResponse {
    match result {
        Ok(signature) => {
            let signature = signature.to_string();
            HttpResponse::Ok().json(Submitted {
                explorer_url: config.explorer_url(&signature),
                signature,
            })
        }
        Err(err) => error_response(&err),
    }
}

fn parse_pubkey(field: &str, value: &str) -> Result<Pubkey, HttpResponse> {
    Pubkey::from_str(value).map_err(|e| {
        HttpResponse::BadRequest().json(serde_json::json!({
            "error": format!("invalid {field}: {e}"),
        }))
    })
}

/// HTTP status for a failed operation.
pub fn status_code(kind: &ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Derivation(_) | ErrorKind::InvalidTicketPrice(_) => StatusCode::BAD_REQUEST,
        ErrorKind::AccountMissing => StatusCode::NOT_FOUND,
        ErrorKind::Signing(_) => StatusCode::FORBIDDEN,
        ErrorKind::Rejected(_) => StatusCode::CONFLICT,
        ErrorKind::InsufficientFunds(_) => StatusCode::PAYMENT_REQUIRED,
        ErrorKind::InvalidAccountData(_) => StatusCode::BAD_GATEWAY,
        ErrorKind::ProbeUnavailable(_) | ErrorKind::Transport(_) => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::ConfirmationTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
    }
}

fn error_response(err: &OperationError) -> HttpResponse {
    let mut body = serde_json::json!({
        "error": err.to_string(),
        "operation": err.operation.as_str(),
        "account": err.role,
        "address": err.address.to_string(),
        "retryable": err.is_retryable(),
    });
    if let Some(code) = err.rejection().and_then(|r| r.program_code()) {
        body["program_code"] = code.into();
    }
    if let ErrorKind::ConfirmationTimeout { signature } = &err.kind {
        body["signature"] = signature.to_string().into();
    }
    HttpResponse::build(status_code(&err.kind)).json(body)
}
