//! Terminus Networking - Telegram Bot API and TON blockchain clients

pub mod telegram;
pub mod ton;

pub use telegram::{LabeledPrice, TelegramClient};
pub use ton::TonApiClient;
