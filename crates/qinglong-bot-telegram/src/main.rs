use dotenvy::dotenv;
use qinglong_bot_core::config::PanelSettings;
use qinglong_bot_transport_telegram::config::{BotSettings, TelegramSettings};
use qinglong_bot_transport_telegram::runner::run_bot;
use regex::Regex;
use std::io::{self, Write};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{prelude::*, EnvFilter};

/// Secrets masked in every log line.
struct RedactionPatterns {
    bot_url: Regex,
    bot_token: Regex,
    client_secret_env: Regex,
    client_secret_param: Regex,
    bearer: Regex,
}

impl RedactionPatterns {
    fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            bot_url: Regex::new(r"(https?://[^/]+/bot)([0-9]+:[A-Za-z0-9_-]+)")?,
            bot_token: Regex::new(r"[0-9]{8,10}:[A-Za-z0-9_-]{35}")?,
            client_secret_env: Regex::new(r"QL_CLIENT_SECRET=[^\s&]+")?,
            client_secret_param: Regex::new(r"client_secret=[^\s&]+")?,
            bearer: Regex::new(r"Bearer\s+[A-Za-z0-9._~+/=-]+")?,
        })
    }

    fn redact(&self, input: &str) -> String {
        let output = self.bot_url.replace_all(input, "$1[TELEGRAM_TOKEN]");
        let output = self.bot_token.replace_all(&output, "[TELEGRAM_TOKEN]");
        let output = self
            .client_secret_env
            .replace_all(&output, "QL_CLIENT_SECRET=[MASKED]");
        let output = self
            .client_secret_param
            .replace_all(&output, "client_secret=[MASKED]");
        self.bearer
            .replace_all(&output, "Bearer [MASKED]")
            .into_owned()
    }
}

struct RedactingWriter<W: Write> {
    inner: W,
    patterns: Arc<RedactionPatterns>,
}

impl<W: Write> Write for RedactingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let redacted = self.patterns.redact(&String::from_utf8_lossy(buf));
        self.inner.write_all(redacted.as_bytes())?;
        // Report the caller's length even though the redacted text differs
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

struct RedactingMakeWriter<F> {
    make_inner: F,
    patterns: Arc<RedactionPatterns>,
}

impl<'a, F, W> tracing_subscriber::fmt::MakeWriter<'a> for RedactingMakeWriter<F>
where
    F: Fn() -> W + 'static,
    W: Write,
{
    type Writer = RedactingWriter<W>;

    fn make_writer(&'a self) -> Self::Writer {
        RedactingWriter {
            inner: (self.make_inner)(),
            patterns: Arc::clone(&self.patterns),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();

    let patterns = Arc::new(RedactionPatterns::new().map_err(|e| {
        eprintln!("Failed to compile regex patterns: {e}");
        e
    })?);
    init_logging(patterns);

    info!("Starting Qinglong panel bot...");

    let settings = init_settings();
    if let Err(e) = run_bot(settings).await {
        error!("Bot stopped: {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}

fn init_logging(patterns: Arc<RedactionPatterns>) {
    let make_writer = RedactingMakeWriter {
        make_inner: io::stderr,
        patterns,
    };

    let debug_mode = std::env::var("DEBUG_MODE")
        .map(|v| v == "true" || v == "1")
        .unwrap_or(false);

    let filter = if debug_mode {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(
                "qinglong_bot_core=info,qinglong_bot_transport_telegram=info,qinglong_bot_telegram=info,hyper=warn,reqwest=warn,teloxide=warn",
            )
        })
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(make_writer))
        .init();
}

fn init_settings() -> Arc<BotSettings> {
    let panel_settings = match PanelSettings::new() {
        Ok(settings) => settings,
        Err(e) => {
            error!("Failed to load panel configuration: {}", e);
            std::process::exit(1);
        }
    };
    let telegram_settings = match TelegramSettings::new() {
        Ok(settings) => settings,
        Err(e) => {
            error!("Failed to load telegram configuration: {}", e);
            std::process::exit(1);
        }
    };

    info!("Configuration loaded successfully.");
    Arc::new(BotSettings::new(panel_settings, telegram_settings))
}

#[cfg(test)]
mod tests {
    use super::RedactionPatterns;

    #[test]
    fn test_secrets_are_masked() {
        let patterns = RedactionPatterns::new().expect("patterns compile");

        let line = "GET https://api.telegram.org/bot123456789:AAHdqTcvCH1vGWJxfSeofSAs0K5PALDsaw/getMe";
        let redacted = patterns.redact(line);
        assert!(redacted.contains("/bot[TELEGRAM_TOKEN]/getMe"));
        assert!(!redacted.contains("AAHdqTcv"));

        let redacted = patterns.redact("GET /open/auth/token?client_id=a&client_secret=s3cr3t");
        assert!(redacted.ends_with("client_secret=[MASKED]"));

        let redacted = patterns.redact("authorization: Bearer eyJhbGciOi.abc-def");
        assert_eq!(redacted, "authorization: Bearer [MASKED]");

        let redacted = patterns.redact("QL_CLIENT_SECRET=abc other");
        assert_eq!(redacted, "QL_CLIENT_SECRET=[MASKED] other");
    }
}
