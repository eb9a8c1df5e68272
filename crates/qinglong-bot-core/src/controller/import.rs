//! Script import from uploaded documents and links.

use super::views::{self, Target};
use super::PanelBot;
use crate::action::{Action, TaskAction};
use crate::config::{PANEL_REQUEST_TIMEOUT, SCRIPT_EXTENSIONS, SCRIPT_MAX_BYTES};
use crate::dispatch::Attachment;
use crate::messenger::{Button, Layout, MessengerError};
use crate::panel::PanelError;
use anyhow::Result;
use async_trait::async_trait;
use lazy_regex::lazy_regex;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};
use url::Url;

/// Smallest fetched script worth storing.
const SCRIPT_MIN_BYTES: usize = 10;
const USER_AGENT: &str = "Mozilla/5.0 (compatible; QinglongBot/1.0)";

/// Reasons a script could not be imported.
#[derive(Debug, Error)]
pub enum ImportError {
    /// The message holds no usable link
    #[error("No valid link found")]
    NoLink,
    /// The file is not a runnable script
    #[error("Unsupported file type `{0}`, expected one of .js .py .sh .ts")]
    UnsupportedType(String),
    /// Over the upload ceiling
    #[error("File is too large ({0} bytes), the limit is 1 MiB")]
    TooLarge(usize),
    /// Suspiciously small download
    #[error("Downloaded content is empty or too small")]
    TooSmall,
    /// Fetching the content failed
    #[error("Download failed: {0}")]
    Download(String),
    /// The content is not text
    #[error("File is not valid UTF-8 text")]
    NotText,
    /// The panel refused the upload
    #[error(transparent)]
    Panel(#[from] PanelError),
    /// The messenger could not provide the attachment
    #[error(transparent)]
    Messenger(#[from] MessengerError),
}

/// Fetches remote script content.
#[async_trait]
pub trait ScriptFetcher: Send + Sync {
    /// Downloads `url`.
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, ImportError>;
}

/// [`ScriptFetcher`] over plain HTTP.
pub struct HttpScriptFetcher {
    http: reqwest::Client,
}

impl HttpScriptFetcher {
    /// Fetcher with the standard panel timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new() -> Result<Self, reqwest::Error> {
        Self::with_timeout(PANEL_REQUEST_TIMEOUT)
    }

    /// Fetcher with a custom timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn with_timeout(timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self { http })
    }
}

#[async_trait]
impl ScriptFetcher for HttpScriptFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, ImportError> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| ImportError::Download(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(ImportError::Download(format!("HTTP {}", status.as_u16())));
        }
        let body = response
            .bytes()
            .await
            .map_err(|e| ImportError::Download(e.to_string()))?;
        Ok(body.to_vec())
    }
}

/// Rewrites repository page links to their raw-content form.
///
/// GitHub `blob` pages move to `raw.githubusercontent.com`; Gitee `blob`
/// pages become `raw` pages. Anything else is returned unchanged.
#[must_use]
pub fn normalize_script_url(url: &str) -> String {
    if url.contains("github.com") && url.contains("/blob/") {
        url.replacen("github.com", "raw.githubusercontent.com", 1)
            .replacen("/blob/", "/", 1)
    } else if url.contains("gitee.com") && url.contains("/blob/") {
        url.replacen("/blob/", "/raw/", 1)
    } else {
        url.to_string()
    }
}

/// Where a link points, for the confirmation message.
fn source_label(url: &str) -> &'static str {
    if url.contains("githubusercontent.com") || url.contains("github.com") {
        "GitHub"
    } else if url.contains("gitee.com") {
        "Gitee"
    } else {
        "Direct link"
    }
}

fn first_link(text: &str) -> Option<&str> {
    static RE_LINK: lazy_regex::Lazy<regex::Regex> = lazy_regex!(r"https?://\S+");
    RE_LINK.find(text).map(|m| m.as_str())
}

/// Last path segment, without query or fragment.
fn link_file_name(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let name = parsed.path_segments()?.rev().find(|s| !s.is_empty())?;
    let name = percent_encoding::percent_decode_str(name)
        .decode_utf8_lossy()
        .into_owned();
    Some(name)
}

fn check_extension(file_name: &str) -> Result<(), ImportError> {
    let lower = file_name.to_lowercase();
    if SCRIPT_EXTENSIONS.iter().any(|ext| lower.ends_with(ext)) {
        Ok(())
    } else {
        Err(ImportError::UnsupportedType(file_name.to_string()))
    }
}

fn into_text(bytes: Vec<u8>) -> Result<String, ImportError> {
    String::from_utf8(bytes).map_err(|_| ImportError::NotText)
}

fn schedule_offer(file_name: &str) -> Layout {
    Layout::Inline(vec![vec![
        Button::new(
            "⏰ Create task",
            Action::Tasks(TaskAction::ScheduleUpload(file_name.to_string())),
        ),
        Button::label("💾 Save only"),
    ]])
}

impl PanelBot {
    /// Uploads an attached script to the root folder.
    pub(super) async fn import_document(&self, chat_id: i64, document: &Attachment) -> Result<()> {
        let file_name = document.file_name.clone().unwrap_or_default();
        match self.upload_document(chat_id, &file_name, document).await {
            Ok(size) => {
                info!(chat_id, %file_name, size, "Script uploaded");
                let text = format!(
                    "✅ <b>Uploaded</b>\n\nFile: <code>{}</code>\nSize: {:.1} KB\n\n\
                     Create a scheduled task for it?",
                    views::escape(&file_name),
                    kib(size),
                );
                let layout = schedule_offer(&file_name);
                self.messenger.notify(chat_id, &text, Some(layout)).await?;
            }
            Err(e) => {
                warn!(chat_id, %file_name, error = %e, "Script upload failed");
                let text = format!("❌ Upload failed: {}", views::escape(&e.to_string()));
                self.messenger.notify(chat_id, &text, None).await?;
            }
        }
        Ok(())
    }

    async fn upload_document(
        &self,
        chat_id: i64,
        file_name: &str,
        document: &Attachment,
    ) -> Result<usize, ImportError> {
        check_extension(file_name)?;
        if let Some(size) = document.size.and_then(|s| usize::try_from(s).ok()) {
            if size > SCRIPT_MAX_BYTES {
                return Err(ImportError::TooLarge(size));
            }
        }

        self.messenger
            .notify(chat_id, &format!("⏳ Uploading {}...", views::escape(file_name)), None)
            .await?;
        let bytes = self.messenger.download_file(&document.file_id).await?;
        if bytes.len() > SCRIPT_MAX_BYTES {
            return Err(ImportError::TooLarge(bytes.len()));
        }
        let size = bytes.len();
        let content = into_text(bytes)?;
        self.api.upload_script(chat_id, file_name, &content, "").await?;
        Ok(size)
    }

    /// Downloads a linked script and uploads it to the root folder.
    pub(super) async fn import_link(&self, chat_id: i64, text: &str) -> Result<()> {
        match self.fetch_link(chat_id, text).await {
            Ok((file_name, url, size)) => {
                info!(chat_id, %file_name, size, "Script imported from link");
                let text = format!(
                    "✅ <b>Imported</b>\n\nFile: <code>{}</code>\nSize: {:.1} KB\nSource: {}\n\n\
                     Create a scheduled task for it?",
                    views::escape(&file_name),
                    kib(size),
                    source_label(&url),
                );
                let layout = schedule_offer(&file_name);
                self.render(Target::Fresh(chat_id), &text, Some(layout)).await
            }
            Err(e) => {
                warn!(chat_id, error = %e, "Link import failed");
                let text = format!("❌ Import failed: {}", views::escape(&e.to_string()));
                self.render(Target::Fresh(chat_id), &text, None).await
            }
        }
    }

    async fn fetch_link(
        &self,
        chat_id: i64,
        text: &str,
    ) -> Result<(String, String, usize), ImportError> {
        let link = first_link(text).ok_or(ImportError::NoLink)?;
        let url = normalize_script_url(link);
        let file_name = link_file_name(&url).ok_or(ImportError::NoLink)?;
        check_extension(&file_name)?;

        let notice = format!(
            "⏳ Downloading <code>{}</code>...",
            views::escape(&views::clip_marked(&url, 60))
        );
        self.messenger.notify(chat_id, &notice, None).await?;

        let bytes = self.fetcher.fetch(&url).await?;
        if bytes.len() > SCRIPT_MAX_BYTES {
            return Err(ImportError::TooLarge(bytes.len()));
        }
        if bytes.len() < SCRIPT_MIN_BYTES {
            return Err(ImportError::TooSmall);
        }
        let size = bytes.len();
        let content = into_text(bytes)?;
        self.api.upload_script(chat_id, &file_name, &content, "").await?;
        Ok((file_name, url, size))
    }
}

#[allow(clippy::cast_precision_loss)]
fn kib(bytes: usize) -> f64 {
    bytes as f64 / 1024.0
}
