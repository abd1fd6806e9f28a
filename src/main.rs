//! Raffle orchestrator service.
//!
//! Exposes the raffle lifecycle (pool setup, raffle creation, ticket sales,
//! winner reveal, claim and withdrawal) over HTTP, acting as the configured
//! wallet. Liveness on `/health`, operation metrics on `/status`.

use actix_web::{web, App, HttpServer};
use solana_sdk::signature::Signer;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use raffle_orchestrator::api::{self, AppState};
use raffle_orchestrator::config::AppConfig;
use raffle_orchestrator::ledger::RpcLedger;
use raffle_orchestrator::metrics::Metrics;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,solana_client=warn,solana_rpc_client=warn,hyper=warn,reqwest=warn")),
        )
        .with_target(true)
        .with_ansi(true)
        .init();

    let config = AppConfig::from_env()?;
    let ctx = config.program_context();

    info!(
        program = %ctx.program_id,
        wallet = %config.wallet_keypair.pubkey(),
        super_user = %ctx.super_user,
        treasury = %ctx.treasury,
        "Starting raffle orchestrator"
    );
    info!(
        rpc = %config.rpc_url,
        confirm_timeout_secs = config.confirm_timeout_secs,
        priority_fee = config.priority_fee_micro_lamports,
        "Ledger configured"
    );

    let addr = format!("0.0.0.0:{}", config.http_port);
    let state = web::Data::new(AppState {
        ledger: RpcLedger::new(&config),
        ctx,
        config,
        metrics: Metrics::new(),
    });

    info!(%addr, "Starting HTTP server");

    HttpServer::new(move || App::new().app_data(state.clone()).configure(api::configure))
        .bind(&addr)?
        .run()
        .await?;
    Ok(())
}
