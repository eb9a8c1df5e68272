use crate::bot::handlers::{
    get_user_id_safe, handle_callback, handle_command, handle_message, handle_unauthorized,
    handle_unauthorized_callback, Command,
};
use crate::bot::{DenialThrottle, TelegramMessenger};
use crate::config::{
    get_unauthorized_cache_max_size, get_unauthorized_cache_ttl, get_unauthorized_cooldown,
    BotSettings,
};
use anyhow::{Context, Result};
use qinglong_bot_core::controller::PanelBot;
use std::sync::Arc;
use teloxide::dispatching::{DefaultKey, UpdateHandler};
use teloxide::prelude::*;
use teloxide::types::CallbackQuery;
use teloxide::update_listeners::webhooks;
use teloxide::utils::command::BotCommands;
use tracing::{error, info};

/// Run the Telegram transport runtime.
///
/// Serves the webhook when one is configured, long polling otherwise.
///
/// # Errors
///
/// Returns an error if the webhook settings are invalid or the listener
/// cannot be set up.
pub async fn run_bot(settings: Arc<BotSettings>) -> Result<()> {
    let bot = Bot::new(settings.telegram.telegram_token.clone());

    let messenger = Arc::new(TelegramMessenger::new(bot.clone()));
    let panel = Arc::new(
        PanelBot::from_settings(&settings.panel, messenger)
            .context("Failed to build panel HTTP clients")?,
    );
    info!("Panel client initialized for {}", settings.panel.ql_base_url);

    settings.telegram.log_allow_list();

    register_commands(&bot).await;
    let throttle = init_denial_throttle();
    let webhook = settings
        .telegram
        .webhook()
        .context("Invalid webhook_url")?;

    let mut dispatcher = Dispatcher::builder(bot.clone(), setup_handler())
        .dependencies(dptree::deps![panel, settings.clone(), throttle])
        .enable_ctrlc_handler()
        .build();

    match webhook {
        Some(url) => serve_webhook(bot, &settings, url, &mut dispatcher).await,
        None => {
            info!("Bot is running (long polling)...");
            dispatcher.dispatch().await;
            Ok(())
        }
    }
}

async fn serve_webhook(
    bot: Bot,
    settings: &BotSettings,
    url: url::Url,
    dispatcher: &mut Dispatcher<Bot, teloxide::RequestError, DefaultKey>,
) -> Result<()> {
    let addr = settings
        .telegram
        .listen_addr()
        .context("Invalid webhook_listen_addr")?;

    let mut options = webhooks::Options::new(addr, url.clone());
    if let Some(secret) = settings.telegram.webhook_secret.clone() {
        options = options.secret_token(secret);
    }

    let listener = webhooks::axum(bot, options)
        .await
        .context("Failed to set up webhook listener")?;

    info!("Bot is running (webhook {} on {})...", url, addr);
    dispatcher
        .dispatch_with_listener(
            listener,
            LoggingErrorHandler::with_custom_text("An error from the update listener"),
        )
        .await;
    Ok(())
}

async fn register_commands(bot: &Bot) {
    if let Err(e) = bot.set_my_commands(Command::bot_commands()).await {
        error!("Failed to register bot commands: {}", e);
    }
}

fn init_denial_throttle() -> Arc<DenialThrottle> {
    let cooldown = get_unauthorized_cooldown();
    let ttl = get_unauthorized_cache_ttl();
    let max_size = get_unauthorized_cache_max_size();

    info!(
        "Initializing DenialThrottle (cooldown: {}s, ttl: {}s, max_size: {})",
        cooldown, ttl, max_size
    );

    Arc::new(DenialThrottle::new(cooldown, ttl, max_size))
}

fn setup_handler() -> UpdateHandler<teloxide::RequestError> {
    dptree::entry()
        .branch(
            Update::filter_callback_query()
                .branch(
                    dptree::filter(|q: CallbackQuery, settings: Arc<BotSettings>| {
                        settings.telegram.is_allowed(q.from.id.0.cast_signed())
                    })
                    .endpoint(handle_callback),
                )
                .branch(dptree::endpoint(handle_unauthorized_callback)),
        )
        .branch(
            Update::filter_message()
                .branch(
                    dptree::filter(|msg: Message, settings: Arc<BotSettings>| {
                        settings.telegram.is_allowed(get_user_id_safe(&msg))
                    })
                    .branch(
                        dptree::entry()
                            .filter_command::<Command>()
                            .endpoint(handle_command),
                    )
                    .branch(dptree::endpoint(handle_message)),
                )
                // Everyone the filter above rejected
                .branch(dptree::endpoint(handle_unauthorized)),
        )
}
