use gatekeeper_core::{Button, Keyboard};
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};
use tracing::warn;

/// Translate the collaborator-agnostic `Keyboard` into teloxide's markup
/// type. A malformed URL button is dropped and logged rather than failing
/// the whole send — a missing button is recoverable, a failed send is not.
pub fn to_inline_markup(keyboard: Keyboard) -> InlineKeyboardMarkup {
    let rows = keyboard.into_iter().map(|row| {
        row.into_iter()
            .filter_map(|button| match button {
                Button::Url { label, url } => match url.parse() {
                    Ok(parsed) => Some(InlineKeyboardButton::url(label, parsed)),
                    Err(e) => {
                        warn!(url, error = %e, "dropping malformed URL button");
                        None
                    }
                },
                Button::Callback { label, data } => Some(InlineKeyboardButton::callback(label, data)),
            })
            .collect::<Vec<_>>()
    });
    InlineKeyboardMarkup::new(rows)
}
