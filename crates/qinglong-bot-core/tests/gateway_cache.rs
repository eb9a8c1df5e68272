mod common;

use common::*;
use qinglong_bot_core::cache::PartitionedCache;
use qinglong_bot_core::panel::{
    ApiResponse, CachedGateway, CredentialCache, HttpMethod, PanelApi, ResourceClass,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn api() -> (PanelApi, Arc<FakeTransport>) {
    let transport = Arc::new(FakeTransport::default());
    let issuer = Arc::new(FakeIssuer::new(Duration::from_secs(3600), Duration::ZERO));
    let gateway = CachedGateway::new(
        PartitionedCache::in_memory(1_000),
        Arc::new(CredentialCache::new(issuer)),
        transport.clone(),
    );
    (PanelApi::new(gateway, settings()), transport)
}

#[tokio::test(start_paused = true)]
async fn reads_are_served_from_cache_until_ttl() {
    let (api, transport) = api();
    transport.respond("/open/crons", json!([{"id": 1, "name": "a"}]));

    api.crons(CHAT).await.expect("first read");
    api.crons(CHAT).await.expect("cached read");
    assert_eq!(transport.count(HttpMethod::Get, "/open/crons"), 1);

    let ttl = ResourceClass::Tasks.ttl(&settings());
    tokio::time::advance(ttl + Duration::from_secs(1)).await;

    api.crons(CHAT).await.expect("expired read");
    assert_eq!(transport.count(HttpMethod::Get, "/open/crons"), 2);
}

#[tokio::test]
async fn write_invalidates_only_its_class() {
    let (api, transport) = api();
    transport.respond("/open/crons", json!([]));
    transport.respond("/open/envs", json!([]));

    api.crons(CHAT).await.expect("tasks");
    api.envs(CHAT).await.expect("envs");
    api.delete_cron(CHAT, 3).await.expect("delete");
    api.crons(CHAT).await.expect("tasks again");
    api.envs(CHAT).await.expect("envs again");

    assert_eq!(transport.count(HttpMethod::Get, "/open/crons"), 2);
    assert_eq!(transport.count(HttpMethod::Get, "/open/envs"), 1);
}

#[tokio::test]
async fn detail_keys_share_the_class_invalidation() {
    let (api, transport) = api();
    transport.respond("/open/crons/5", json!({"id": 5, "name": "job"}));

    api.cron(CHAT, 5).await.expect("detail");
    api.cron(CHAT, 5).await.expect("cached detail");
    api.update_cron_schedule(CHAT, 5, "0 9 * * *")
        .await
        .expect("update");
    api.cron(CHAT, 5).await.expect("fresh detail");

    assert_eq!(transport.count(HttpMethod::Get, "/open/crons/5"), 2);
}

#[tokio::test]
async fn partitions_do_not_share_entries() {
    let (api, transport) = api();
    transport.respond("/open/subscriptions", json!([]));

    api.subscriptions(1).await.expect("chat 1");
    api.subscriptions(2).await.expect("chat 2");
    api.subscriptions(1).await.expect("chat 1 cached");

    assert_eq!(transport.count(HttpMethod::Get, "/open/subscriptions"), 2);
}

#[tokio::test]
async fn failure_envelopes_are_not_cached() {
    let (api, transport) = api();
    transport.respond_with(
        "/open/envs",
        ApiResponse {
            code: 500,
            data: json!(null),
            message: Some("busy".to_string()),
        },
    );

    assert!(api.envs(CHAT).await.is_err());
    transport.respond("/open/envs", json!([{"id": 1, "name": "A", "value": "1"}]));
    let entries = api.envs(CHAT).await.expect("recovered read");

    assert_eq!(entries.len(), 1);
    assert_eq!(transport.count(HttpMethod::Get, "/open/envs"), 2);
}

#[tokio::test]
async fn rejected_token_is_replaced_and_the_call_repeated_once() {
    let transport = Arc::new(FakeTransport::default());
    let issuer = Arc::new(FakeIssuer::new(Duration::from_secs(3600), Duration::ZERO));
    let gateway = CachedGateway::new(
        PartitionedCache::in_memory(1_000),
        Arc::new(CredentialCache::new(issuer.clone())),
        transport.clone(),
    );
    transport.respond_with(
        "/open/envs",
        ApiResponse {
            code: 401,
            data: json!(null),
            message: Some("UnauthorizedError".to_string()),
        },
    );

    let response = gateway
        .read(CHAT, "/open/envs", "envs:list", Duration::from_secs(30))
        .await
        .expect("envelope");

    assert_eq!(response.code, 401);
    assert_eq!(issuer.count(), 2);
    assert_eq!(transport.count(HttpMethod::Get, "/open/envs"), 2);
}

#[tokio::test]
async fn clearing_a_chat_forces_refetch() {
    let (api, transport) = api();
    transport.respond("/open/scripts", json!([{"title": "a.js"}]));

    api.script_tree(CHAT).await.expect("tree");
    api.clear_cache(CHAT).await;
    api.script_tree(CHAT).await.expect("tree again");

    assert_eq!(transport.count(HttpMethod::Get, "/open/scripts"), 2);
}

#[tokio::test]
async fn log_reads_bypass_the_cache() {
    let (api, transport) = api();
    transport.respond("/open/crons/2/log", json!("line one\nline two"));

    let first = api.cron_log(2).await.expect("log");
    api.cron_log(2).await.expect("log again");

    assert_eq!(first.as_deref(), Some("line one\nline two"));
    assert_eq!(transport.count(HttpMethod::Get, "/open/crons/2/log"), 2);
}
