use async_trait::async_trait;
use gatekeeper_core::{
    ArchiveStore, ChatGateway, GatekeeperError, Keyboard, MessageCoordinate, RawMemberStatus,
    Result, UserId,
};
use teloxide::prelude::*;
use teloxide::types::ChatMemberKind;
use teloxide::RequestError;

use crate::keyboard::to_inline_markup;

/// `ChatGateway`/`ArchiveStore` backed by a live `teloxide::Bot`.
///
/// One bot token drives both roles in this system — the user-bot sends
/// messages, checks membership, and copies archived files into a user's
/// chat — so a single struct implements both traits over the same client,
/// the way `chronx-wallet`'s `WalletRpcClient` wraps one `reqwest::Client`
/// for every RPC method it needs.
pub struct TeloxideGateway {
    bot: Bot,
}

impl TeloxideGateway {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

fn classify(err: RequestError) -> GatekeeperError {
    match &err {
        RequestError::RetryAfter(_) | RequestError::Network(_) | RequestError::Io(_) => {
            GatekeeperError::Transient { collaborator: "telegram".into(), detail: err.to_string() }
        }
        _ => GatekeeperError::Storage(format!("telegram request failed: {err}")),
    }
}

#[async_trait]
impl ChatGateway for TeloxideGateway {
    async fn send_with_keyboard(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: Option<Keyboard>,
    ) -> Result<MessageCoordinate> {
        let mut request = self.bot.send_message(ChatId(chat_id), text);
        if let Some(keyboard) = keyboard {
            request = request.reply_markup(to_inline_markup(keyboard));
        }
        let message = request.await.map_err(classify)?;
        Ok(MessageCoordinate { chat_id, message_id: message.id.0 })
    }

    async fn delete_message(&self, coordinate: MessageCoordinate) -> Result<()> {
        self.bot
            .delete_message(ChatId(coordinate.chat_id), teloxide::types::MessageId(coordinate.message_id))
            .await
            .map_err(classify)?;
        Ok(())
    }

    async fn get_chat_member(&self, channel_handle: &str, user_id: UserId) -> Result<Option<RawMemberStatus>> {
        let chat = parse_channel_ref(channel_handle);
        let member = match self.bot.get_chat_member(chat, teloxide::types::UserId(user_id.0 as u64)).await {
            Ok(member) => member,
            Err(RequestError::Api(_)) => return Ok(None),
            Err(e) => return Err(classify(e)),
        };

        Ok(Some(match member.kind {
            ChatMemberKind::Owner(_) => RawMemberStatus::Creator,
            ChatMemberKind::Administrator(_) => RawMemberStatus::Administrator,
            ChatMemberKind::Member => RawMemberStatus::Member,
            ChatMemberKind::Restricted(_) => RawMemberStatus::Restricted,
            ChatMemberKind::Left => RawMemberStatus::Left,
            ChatMemberKind::Banned(_) => RawMemberStatus::Kicked,
        }))
    }
}

#[async_trait]
impl ArchiveStore for TeloxideGateway {
    async fn copy_to_chat(&self, source: MessageCoordinate, dest_chat_id: i64, caption: &str) -> Result<MessageCoordinate> {
        let copied = self
            .bot
            .copy_message(ChatId(dest_chat_id), ChatId(source.chat_id), teloxide::types::MessageId(source.message_id))
            .caption(caption)
            .await
            .map_err(classify)?;
        Ok(MessageCoordinate { chat_id: dest_chat_id, message_id: copied.0 })
    }
}

/// Channel handles are stored as either `@handle` or a numeric chat id
/// string; resolve either form to teloxide's `Recipient`.
fn parse_channel_ref(handle: &str) -> teloxide::types::Recipient {
    if let Ok(id) = handle.parse::<i64>() {
        teloxide::types::Recipient::Id(ChatId(id))
    } else {
        teloxide::types::Recipient::ChannelUsername(handle.to_string())
    }
}
