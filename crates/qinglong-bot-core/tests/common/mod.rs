//! Hand-written fakes shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use qinglong_bot_core::cache::PartitionedCache;
use qinglong_bot_core::config::PanelSettings;
use qinglong_bot_core::controller::{ImportError, PanelBot, ScriptFetcher};
use qinglong_bot_core::conversation::ConversationStore;
use qinglong_bot_core::dispatch::{CallbackEvent, MessageEvent};
use qinglong_bot_core::messenger::{Layout, MessageRef, Messenger, MessengerError};
use qinglong_bot_core::panel::{
    ApiResponse, CachedGateway, CredentialCache, HttpMethod, IssuedToken, PanelApi, PanelError,
    PanelTransport, TokenIssuer,
};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const USER: i64 = 7;
pub const CHAT: i64 = 42;

#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub method: HttpMethod,
    pub endpoint: String,
    pub body: Option<Value>,
}

/// Panel double answering from a per-endpoint table.
#[derive(Default)]
pub struct FakeTransport {
    responses: Mutex<HashMap<String, ApiResponse>>,
    calls: Mutex<Vec<Call>>,
}

impl FakeTransport {
    pub fn respond(&self, endpoint: &str, data: Value) {
        self.respond_with(endpoint, ApiResponse::ok(data));
    }

    pub fn respond_with(&self, endpoint: &str, response: ApiResponse) {
        self.responses
            .lock()
            .expect("responses lock")
            .insert(endpoint.to_string(), response);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().expect("calls lock").clone()
    }

    pub fn count(&self, method: HttpMethod, endpoint: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.method == method && c.endpoint == endpoint)
            .count()
    }

    pub fn writes(&self) -> usize {
        self.calls().iter().filter(|c| !c.method.is_read()).count()
    }
}

#[async_trait]
impl PanelTransport for FakeTransport {
    async fn send(
        &self,
        method: HttpMethod,
        endpoint: &str,
        body: Option<Value>,
        _token: &str,
    ) -> Result<ApiResponse, PanelError> {
        self.calls.lock().expect("calls lock").push(Call {
            method,
            endpoint: endpoint.to_string(),
            body,
        });
        let response = self
            .responses
            .lock()
            .expect("responses lock")
            .get(endpoint)
            .cloned();
        Ok(response.unwrap_or_else(|| ApiResponse::ok(Value::Null)))
    }
}

/// Token issuer counting how often it is asked.
pub struct FakeIssuer {
    pub issued: AtomicUsize,
    pub lifetime: Duration,
    pub delay: Duration,
}

impl FakeIssuer {
    pub fn new(lifetime: Duration, delay: Duration) -> Self {
        Self {
            issued: AtomicUsize::new(0),
            lifetime,
            delay,
        }
    }

    pub fn count(&self) -> usize {
        self.issued.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenIssuer for FakeIssuer {
    async fn issue(&self) -> Result<IssuedToken, PanelError> {
        let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        tokio::time::sleep(self.delay).await;
        Ok(IssuedToken {
            token: format!("token-{n}"),
            lifetime: self.lifetime,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sent {
    pub chat_id: i64,
    pub text: String,
    pub layout: Option<Layout>,
    pub edited: bool,
}

/// Messenger recording everything it is asked to deliver.
#[derive(Default)]
pub struct RecordingMessenger {
    sent: Mutex<Vec<Sent>>,
    acknowledged: AtomicUsize,
    next_id: AtomicI32,
    files: Mutex<HashMap<String, Vec<u8>>>,
}

impl RecordingMessenger {
    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().expect("sent lock").clone()
    }

    pub fn last(&self) -> Sent {
        self.sent().pop().expect("at least one message")
    }

    pub fn acknowledged(&self) -> usize {
        self.acknowledged.load(Ordering::SeqCst)
    }

    pub fn attach(&self, file_id: &str, bytes: &[u8]) {
        self.files
            .lock()
            .expect("files lock")
            .insert(file_id.to_string(), bytes.to_vec());
    }

    fn record(&self, chat_id: i64, text: &str, layout: Option<Layout>, edited: bool) {
        self.sent.lock().expect("sent lock").push(Sent {
            chat_id,
            text: text.to_string(),
            layout,
            edited,
        });
    }
}

#[async_trait]
impl Messenger for RecordingMessenger {
    async fn notify(
        &self,
        chat_id: i64,
        text: &str,
        layout: Option<Layout>,
    ) -> Result<MessageRef, MessengerError> {
        self.record(chat_id, text, layout, false);
        Ok(MessageRef {
            chat_id,
            message_id: self.next_id.fetch_add(1, Ordering::SeqCst) + 1,
        })
    }

    async fn edit(
        &self,
        target: MessageRef,
        text: &str,
        layout: Option<Layout>,
    ) -> Result<(), MessengerError> {
        self.record(target.chat_id, text, layout, true);
        Ok(())
    }

    async fn acknowledge(
        &self,
        _interaction_id: &str,
        _text: Option<String>,
    ) -> Result<(), MessengerError> {
        self.acknowledged.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn download_file(&self, file_id: &str) -> Result<Vec<u8>, MessengerError> {
        self.files
            .lock()
            .expect("files lock")
            .get(file_id)
            .cloned()
            .ok_or_else(|| MessengerError::Download(format!("unknown file {file_id}")))
    }
}

/// Fetcher serving fixed content and recording requested URLs.
#[derive(Default)]
pub struct FakeFetcher {
    pub body: Vec<u8>,
    pub urls: Mutex<Vec<String>>,
}

#[async_trait]
impl ScriptFetcher for FakeFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, ImportError> {
        self.urls.lock().expect("urls lock").push(url.to_string());
        Ok(self.body.clone())
    }
}

pub struct Harness {
    pub bot: PanelBot,
    pub transport: Arc<FakeTransport>,
    pub messenger: Arc<RecordingMessenger>,
    pub fetcher: Arc<FakeFetcher>,
}

pub fn settings() -> PanelSettings {
    PanelSettings {
        ql_base_url: "http://panel.local".to_string(),
        ql_client_id: "id".to_string(),
        ql_client_secret: "secret".to_string(),
        ..PanelSettings::default()
    }
}

pub fn harness_with(fetcher: FakeFetcher) -> Harness {
    let settings = settings();
    let transport = Arc::new(FakeTransport::default());
    let messenger = Arc::new(RecordingMessenger::default());
    let fetcher = Arc::new(fetcher);
    let issuer = Arc::new(FakeIssuer::new(Duration::from_secs(3600), Duration::ZERO));
    let gateway = CachedGateway::new(
        PartitionedCache::in_memory(1_000),
        Arc::new(CredentialCache::new(issuer)),
        transport.clone(),
    );
    let bot = PanelBot::new(
        PanelApi::new(gateway, settings.clone()),
        ConversationStore::new(settings.conversation_ttl()),
        messenger.clone(),
        fetcher.clone(),
    );
    Harness {
        bot,
        transport,
        messenger,
        fetcher,
    }
}

pub fn harness() -> Harness {
    harness_with(FakeFetcher::default())
}

pub fn text(body: &str) -> MessageEvent {
    MessageEvent {
        user_id: USER,
        chat_id: CHAT,
        text: body.to_string(),
        document: None,
    }
}

pub fn press(data: &str) -> CallbackEvent {
    CallbackEvent {
        user_id: USER,
        chat_id: CHAT,
        message_id: 100,
        data: data.to_string(),
        interaction_id: "interaction".to_string(),
    }
}
