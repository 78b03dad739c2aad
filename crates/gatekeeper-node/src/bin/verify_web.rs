//! verify-web — the HTTP flow for `/r` (shortlink return) and `/v` (final
//! verification + countdown page).
//!
//! Startup sequence:
//!   1. Open the state database
//!   2. Load the runtime settings layer
//!   3. Build the Telegram gateway/archive client
//!   4. Serve the axum router

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use gatekeeper_engine::EntitlementEngine;
use gatekeeper_gateway::TeloxideGateway;
use gatekeeper_node::{expand_tilde, init_tracing, load_runtime_config};
use gatekeeper_store::StateDb;
use gatekeeper_web::AppState;
use teloxide::Bot;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "verify-web", version, about = "Verification web flow for the gatekeeper bot")]
struct Args {
    /// Directory for the persistent state database.
    #[arg(long, env = "GATEKEEPER_DATA_DIR", default_value = "~/.gatekeeper/data")]
    data_dir: PathBuf,

    /// HTTP listen address for the verification endpoints.
    #[arg(long, env = "GATEKEEPER_WEB_ADDR", default_value = "0.0.0.0:8080")]
    web_addr: SocketAddr,

    /// Telegram bot token (shared with user-bot; this process only uses it
    /// to query membership and delete delivered messages).
    #[arg(long, env = "GATEKEEPER_BOT_TOKEN")]
    bot_token: String,

    /// `@handle` of the user-bot, used for the post-verification deep link.
    #[arg(long, env = "GATEKEEPER_BOT_USERNAME")]
    bot_username: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let args = Args::parse();
    info!("verify-web starting");

    let data_dir = expand_tilde(&args.data_dir);
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("creating data dir {}", data_dir.display()))?;
    let db = Arc::new(StateDb::open(&data_dir).context("opening state database")?);
    let cfg = load_runtime_config(&db).context("loading runtime settings")?;

    let bot = Bot::new(&args.bot_token);
    let gateway = Arc::new(TeloxideGateway::new(bot));
    let engine = Arc::new(EntitlementEngine::new(db.clone(), gateway.clone(), gateway, args.bot_username.clone()));

    let state = AppState { engine, cfg, bot_username: args.bot_username };
    let app = gatekeeper_web::router(state);

    let listener = tokio::net::TcpListener::bind(args.web_addr)
        .await
        .with_context(|| format!("binding {}", args.web_addr))?;
    info!(addr = %args.web_addr, "verify-web listening");

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
