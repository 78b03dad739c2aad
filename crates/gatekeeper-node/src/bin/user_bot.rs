//! user-bot — the end-user-facing Telegram bot. `/start <payload>` deep
//! links (spec.md §6, base64 of `get-<post_no>` or `verify-<token_id>`)
//! trigger the access pipeline or the verification completion; everything
//! else is a no-op.
//!
//! Startup sequence mirrors `verify-web`: open the state database, load the
//! runtime settings layer, build the Telegram client, then hand control to
//! teloxide's command dispatcher instead of an axum router.
//!
//! `verify-<token_id>` is handled only here, never by `verify-web`'s HTTP
//! surface (spec.md §4.4) — the `user_id` driving the COMPLETED transition
//! comes from Telegram's own authenticated sender field, not a URL
//! parameter an attacker could forge.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use gatekeeper_core::{Button, PostNo, RuntimeConfig, ShortlinkMinter, UserId};
use gatekeeper_engine::{DeliveryOutcome, EntitlementEngine};
use gatekeeper_gateway::{HttpShortlinkMinter, TeloxideGateway};
use gatekeeper_node::{expand_tilde, init_tracing, load_runtime_config};
use gatekeeper_store::StateDb;
use gatekeeper_token::TokenManager;
use teloxide::prelude::*;
use teloxide::utils::command::BotCommands;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "user-bot", version, about = "User-facing Telegram bot for the gatekeeper")]
struct Args {
    #[arg(long, env = "GATEKEEPER_DATA_DIR", default_value = "~/.gatekeeper/data")]
    data_dir: PathBuf,

    #[arg(long, env = "GATEKEEPER_BOT_TOKEN")]
    bot_token: String,

    /// This bot's own `@handle`, used to build `get-<post_no>` re-access
    /// deep links after an auto-deleted file.
    #[arg(long, env = "GATEKEEPER_BOT_USERNAME")]
    bot_username: String,

    /// Base URL of the verification web flow (`verify-web`'s `/r` route).
    #[arg(long, env = "GATEKEEPER_VERIFY_BASE_URL")]
    verify_base_url: String,

    /// Third-party shortlink API base (X2).
    #[arg(long, env = "GATEKEEPER_SHORTLINK_BASE_URL")]
    shortlink_base_url: String,

    #[arg(long, env = "GATEKEEPER_SHORTLINK_API_KEY")]
    shortlink_api_key: String,
}

#[derive(BotCommands, Clone)]
#[command(rename_rule = "lowercase")]
enum Command {
    Start(String),
}

struct Handler {
    engine: Arc<EntitlementEngine<TeloxideGateway, TeloxideGateway>>,
    db: Arc<StateDb>,
    cfg: RuntimeConfig,
    shortlink: HttpShortlinkMinter,
    verify_base_url: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let args = Args::parse();
    info!("user-bot starting");

    let data_dir = expand_tilde(&args.data_dir);
    std::fs::create_dir_all(&data_dir).with_context(|| format!("creating data dir {}", data_dir.display()))?;
    let db = Arc::new(StateDb::open(&data_dir).context("opening state database")?);
    let cfg = load_runtime_config(&db).context("loading runtime settings")?;

    let bot = Bot::new(&args.bot_token);
    let gateway = Arc::new(TeloxideGateway::new(bot.clone()));
    let engine = Arc::new(EntitlementEngine::new(db.clone(), gateway.clone(), gateway, args.bot_username.clone()));
    let shortlink = HttpShortlinkMinter::new(args.shortlink_base_url, args.shortlink_api_key);

    let handler = Arc::new(Handler {
        engine,
        db,
        cfg,
        shortlink,
        verify_base_url: args.verify_base_url,
    });

    teloxide::repl(bot, move |bot: Bot, msg: Message| {
        let handler = handler.clone();
        async move {
            if let Err(e) = handler.handle_message(&bot, &msg).await {
                warn!(error = %e, "failed to handle incoming message");
            }
            respond(())
        }
    })
    .await;

    Ok(())
}

impl Handler {
    async fn handle_message(&self, bot: &Bot, msg: &Message) -> anyhow::Result<()> {
        let Some(text) = msg.text() else { return Ok(()) };
        let Ok(Command::Start(payload)) = Command::parse(text, "") else { return Ok(()) };
        let Some(user) = msg.from() else { return Ok(()) };
        let user_id = UserId(user.id.0 as i64);

        if payload.trim().is_empty() {
            bot.send_message(msg.chat.id, "Welcome! Use a post link to request a file.").await?;
            return Ok(());
        }

        let now = chrono::Utc::now().timestamp();
        let decoded = match gatekeeper_crypto::decode_start_payload(payload.trim()) {
            Ok(s) => s,
            Err(_) => {
                bot.send_message(msg.chat.id, "That link looks malformed.").await?;
                return Ok(());
            }
        };

        if let Some(rest) = decoded.strip_prefix("get-") {
            let Ok(post_no) = rest.parse::<u64>() else {
                bot.send_message(msg.chat.id, "That link looks malformed.").await?;
                return Ok(());
            };
            self.handle_get(bot, msg, user_id, PostNo(post_no), now).await
        } else if let Some(rest) = decoded.strip_prefix("verify-") {
            self.handle_verify(bot, msg, user_id, rest, now).await
        } else {
            bot.send_message(msg.chat.id, "That link looks malformed.").await?;
            Ok(())
        }
    }

    async fn handle_get(
        &self,
        bot: &Bot,
        msg: &Message,
        user_id: UserId,
        post_no: PostNo,
        now: i64,
    ) -> anyhow::Result<()> {
        match self.engine.deliver_file(user_id, post_no, now, &self.cfg).await {
            Ok(DeliveryOutcome::Delivered { re_access, .. }) => {
                if re_access {
                    bot.send_message(msg.chat.id, "Here's your file again.").await?;
                }
            }
            Ok(DeliveryOutcome::NeedsSubscription(channels)) => {
                let keyboard: Vec<Vec<Button>> = channels
                    .iter()
                    .map(|c| vec![Button::Url { label: c.cta_label.clone(), url: c.public_link.clone() }])
                    .collect();
                bot.send_message(msg.chat.id, "Join these channels first, then try again.")
                    .reply_markup(gatekeeper_gateway::keyboard::to_inline_markup(keyboard))
                    .await?;
            }
            Ok(DeliveryOutcome::NeedsVerification) => {
                self.send_verification_prompt(bot, msg, user_id, post_no.0, now).await?;
            }
            Ok(DeliveryOutcome::QuotaExceeded) => {
                bot.send_message(msg.chat.id, "You've reached your file limit for this verification period.").await?;
            }
            Err(e) => {
                warn!(error = %e, %user_id, post_no = post_no.0, "delivery pipeline error");
                bot.send_message(msg.chat.id, "Something went wrong handling that request.").await?;
            }
        }

        Ok(())
    }

    /// `verify-<token_id>` (spec.md §4.4, §6): the only call site for the
    /// COMPLETED transition. `user_id` is this message's authenticated
    /// sender — the countdown page that linked here carries only the token
    /// id, never a user id, so there is nothing for a forged URL to spoof.
    async fn handle_verify(
        &self,
        bot: &Bot,
        msg: &Message,
        user_id: UserId,
        token_id_str: &str,
        now: i64,
    ) -> anyhow::Result<()> {
        let Ok(token_id) = gatekeeper_crypto::decode_token_id(token_id_str) else {
            bot.send_message(msg.chat.id, "That link looks malformed.").await?;
            return Ok(());
        };

        match self.engine.complete_verification(token_id, user_id, now, &self.cfg) {
            Ok(_) => {
                bot.send_message(msg.chat.id, "You're verified. Send me a post link to get your file.").await?;
            }
            Err(e) => {
                warn!(error = %e, %user_id, "verification completion rejected");
                bot.send_message(msg.chat.id, "That verification link is no longer valid.").await?;
            }
        }

        Ok(())
    }

    async fn send_verification_prompt(
        &self,
        bot: &Bot,
        msg: &Message,
        user_id: UserId,
        post_no: u64,
        now: i64,
    ) -> anyhow::Result<()> {
        let token = TokenManager::new(&self.db).mint(user_id, now, self.cfg.verification_token_ttl_seconds)?;
        let verify_url = format!(
            "{}/r?t={}",
            self.verify_base_url.trim_end_matches('/'),
            gatekeeper_crypto::encode_token_id(&token.token_id)
        );

        let destination = match self.shortlink.mint(&verify_url).await {
            Ok(shortened) => shortened,
            Err(e) => {
                warn!(error = %e, %user_id, post_no, "shortlink mint failed, falling back to direct link");
                verify_url
            }
        };

        let keyboard = vec![vec![Button::Url { label: "Verify".into(), url: destination }]];
        bot.send_message(msg.chat.id, "Please verify to continue.")
            .reply_markup(gatekeeper_gateway::keyboard::to_inline_markup(keyboard))
            .await?;
        Ok(())
    }
}
