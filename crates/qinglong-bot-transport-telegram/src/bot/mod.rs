/// Throttled access-denied replies
pub mod denial;
/// Command and update handlers
pub mod handlers;
/// `Messenger` implementation over the Bot API
pub mod messenger;
/// Resilient messaging with automatic retry for Telegram API operations
pub mod resilient;

pub use denial::DenialThrottle;
pub use messenger::TelegramMessenger;
