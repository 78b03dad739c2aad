//! admin-bot — the operator-facing surface: a minimal CRUD contract over
//! channels, settings, and file records, plus a read-only view of the
//! operator action log.
//!
//! Everything beyond this contract (the operator's own storage-channel
//! upload workflow, broadcast composition, dashboards) is out of scope —
//! this binary registers bookkeeping rows, it doesn't move bytes.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use gatekeeper_core::{ChannelEntry, FileRecord, MessageCoordinate, OperatorLogEntry, Setting, UserId};
use gatekeeper_node::{expand_tilde, init_tracing};
use gatekeeper_store::StateDb;
use teloxide::prelude::*;
use teloxide::utils::command::BotCommands;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "admin-bot", version, about = "Operator CRUD bot for the gatekeeper")]
struct Args {
    #[arg(long, env = "GATEKEEPER_DATA_DIR", default_value = "~/.gatekeeper/data")]
    data_dir: PathBuf,

    #[arg(long, env = "GATEKEEPER_ADMIN_BOT_TOKEN")]
    bot_token: String,

    /// Comma-separated Telegram user ids allowed to issue operator commands.
    #[arg(long, env = "GATEKEEPER_ADMIN_USER_IDS", value_delimiter = ',')]
    admin_user_ids: Vec<i64>,
}

/// Each variant captures the rest of the line as one string and is split by
/// the handler — teloxide's command parser reliably supports that single-
/// field shape; hand-splitting keeps the argument grammar unambiguous.
#[derive(BotCommands, Clone)]
#[command(rename_rule = "lowercase", description = "Operator commands:")]
enum Command {
    #[command(description = "/addchannel <handle> <link> <label> <order>")]
    Addchannel(String),
    #[command(description = "/removechannel <handle>")]
    Removechannel(String),
    #[command(description = "/upload <chat_id> <message_id> <title> <password>")]
    Upload(String),
    #[command(description = "/setconfig <key> <value>")]
    Setconfig(String),
    #[command(description = "/log [count]")]
    Log(String),
}

struct Handler {
    db: Arc<StateDb>,
    admins: HashSet<i64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let args = Args::parse();
    info!("admin-bot starting");

    let data_dir = expand_tilde(&args.data_dir);
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("creating data dir {}", data_dir.display()))?;
    let db = Arc::new(StateDb::open(&data_dir).context("opening state database")?);

    let bot = Bot::new(&args.bot_token);
    let handler = Arc::new(Handler { db, admins: args.admin_user_ids.into_iter().collect() });

    teloxide::repl(bot, move |bot: Bot, msg: Message| {
        let handler = handler.clone();
        async move {
            if let Err(e) = handler.handle_message(&bot, &msg).await {
                warn!(error = %e, "failed to handle admin command");
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
        let Some(user) = msg.from() else { return Ok(()) };
        let actor = UserId(user.id.0 as i64);

        if !self.admins.contains(&actor.0) {
            return Ok(());
        }

        let Ok(command) = Command::parse(text, "") else { return Ok(()) };
        let now = chrono::Utc::now().timestamp();

        let reply = match self.dispatch(command, actor, now) {
            Ok(reply) => reply,
            Err(e) => {
                warn!(error = %e, %actor, "admin command failed");
                format!("Error: {e}")
            }
        };

        bot.send_message(msg.chat.id, reply).await?;
        Ok(())
    }

    fn dispatch(&self, command: Command, actor: UserId, now: i64) -> anyhow::Result<String> {
        match command {
            Command::Addchannel(args) => {
                let parts: Vec<&str> = args.splitn(4, ' ').collect();
                let (handle, link, label, order) = match parts.as_slice() {
                    [handle, link, label, order] => (*handle, *link, *label, *order),
                    _ => return Ok("Usage: /addchannel <handle> <link> <label> <order>".into()),
                };
                let order: i32 = order.parse().context("order must be an integer")?;
                let entry = ChannelEntry {
                    handle: handle.to_string(),
                    public_link: link.to_string(),
                    cta_label: label.to_string(),
                    display_order: order,
                    active: true,
                    inserted_at: now,
                };
                self.db.put_channel(&entry)?;
                self.log(actor, "channel_add", Some(handle.to_string()), "channel activated", now)?;
                Ok(format!("Channel {handle} added."))
            }
            Command::Removechannel(handle) => {
                let handle = handle.trim().to_string();
                match self.db.get_channel(&handle)? {
                    Some(mut entry) => {
                        entry.active = false;
                        self.db.put_channel(&entry)?;
                        self.log(actor, "channel_remove", Some(handle.clone()), "channel deactivated", now)?;
                        Ok(format!("Channel {handle} deactivated."))
                    }
                    None => Ok(format!("No such channel: {handle}")),
                }
            }
            Command::Upload(args) => {
                let parts: Vec<&str> = args.splitn(4, ' ').collect();
                let (chat_id, message_id, title, password) = match parts.as_slice() {
                    [chat_id, message_id, title, password] => (*chat_id, *message_id, *title, *password),
                    _ => return Ok("Usage: /upload <chat_id> <message_id> <title> <password>".into()),
                };
                let chat_id: i64 = chat_id.parse().context("chat_id must be an integer")?;
                let message_id: i32 = message_id.parse().context("message_id must be an integer")?;
                let record = FileRecord {
                    post_no: gatekeeper_core::PostNo(0),
                    title: title.to_string(),
                    extra: None,
                    archive_coordinate: MessageCoordinate { chat_id, message_id },
                    public_post_coordinate: None,
                    password: password.to_string(),
                    downloads: 0,
                    created_at: now,
                };
                let inserted = self.db.insert_file(record)?;
                self.log(actor, "upload", Some(inserted.post_no.to_string()), title, now)?;
                Ok(format!("Registered as post #{}.", inserted.post_no))
            }
            Command::Setconfig(args) => {
                let parts: Vec<&str> = args.splitn(2, ' ').collect();
                let (key, value) = match parts.as_slice() {
                    [key, value] => (*key, *value),
                    _ => return Ok("Usage: /setconfig <key> <value>".into()),
                };
                self.db.put_setting(&Setting { key: key.to_string(), value: value.to_string() })?;
                self.log(actor, "setting_change", Some(key.to_string()), value, now)?;
                Ok(format!("{key} = {value}"))
            }
            Command::Log(args) => {
                let limit = args.trim().parse::<usize>().unwrap_or(20).min(100);
                let entries = self.recent_log_entries(limit)?;
                if entries.is_empty() {
                    Ok("No log entries.".into())
                } else {
                    let lines: Vec<String> = entries
                        .iter()
                        .map(|e| format!("#{} {} {} {}", e.log_id, e.action, e.target.clone().unwrap_or_default(), e.detail))
                        .collect();
                    Ok(lines.join("\n"))
                }
            }
        }
    }

    fn log(&self, actor: UserId, action: &str, target: Option<String>, detail: &str, now: i64) -> anyhow::Result<()> {
        self.db.append_operator_log(OperatorLogEntry {
            log_id: 0,
            actor_user_id: Some(actor),
            action: action.into(),
            target,
            detail: detail.into(),
            at: now,
        })?;
        Ok(())
    }

    fn recent_log_entries(&self, limit: usize) -> anyhow::Result<Vec<OperatorLogEntry>> {
        // The store exposes append-only writes but no reverse scan yet —
        // sled's tree iterator is forward-only by insertion key, so walk it
        // fully and keep the tail. Acceptable for an operator console; the
        // log isn't expected to grow past what a human reviews interactively.
        let mut all = self.db.list_operator_log()?;
        if all.len() > limit {
            all.drain(0..all.len() - limit);
        }
        Ok(all)
    }
}
