//! Cache expiry and eviction observed through the HTTP surface.

use std::time::Duration;

use reqwest::header::ACCEPT;
use reqwest::StatusCode;

mod common;

use common::{client, json_answer, proxy_config, start_mock_upstream, start_proxy, TestProxy};

async fn lookup(proxy: &TestProxy, name: &str) -> String {
    let res = client()
        .get(proxy.url(&format!("/dns-query?name={name}&type=A")))
        .header(ACCEPT, "application/dns-json")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    res.headers()["x-cache"].to_str().unwrap().to_string()
}

#[tokio::test]
async fn test_entry_expires_after_ttl() {
    let upstream = start_mock_upstream(|_| (200, "application/dns-json", json_answer("a.test"))).await;
    let mut config = proxy_config(&upstream);
    config.cache.ttl_secs = 1;
    let proxy = start_proxy(config).await;

    assert_eq!(lookup(&proxy, "a.test").await, "MISS");
    assert_eq!(lookup(&proxy, "a.test").await, "HIT");
    assert_eq!(upstream.call_count(), 1);

    tokio::time::sleep(Duration::from_millis(1100)).await;

    assert_eq!(lookup(&proxy, "a.test").await, "MISS");
    assert_eq!(upstream.call_count(), 2);
    assert!(proxy.cache.stats().expirations >= 1);
}

#[tokio::test]
async fn test_oldest_entry_is_evicted_at_capacity() {
    let upstream = start_mock_upstream(|_| (200, "application/dns-json", json_answer("x.test"))).await;
    let mut config = proxy_config(&upstream);
    config.cache.max_entries = 2;
    let proxy = start_proxy(config).await;

    assert_eq!(lookup(&proxy, "one.test").await, "MISS");
    assert_eq!(lookup(&proxy, "two.test").await, "MISS");
    assert_eq!(lookup(&proxy, "three.test").await, "MISS");
    assert_eq!(proxy.cache.len(), 2);

    assert_eq!(lookup(&proxy, "three.test").await, "HIT");
    assert_eq!(lookup(&proxy, "two.test").await, "HIT");
    assert_eq!(lookup(&proxy, "one.test").await, "MISS");
    assert_eq!(upstream.call_count(), 4);
    assert_eq!(proxy.cache.stats().evictions, 2);
}

#[tokio::test]
async fn test_disabled_cache_always_forwards() {
    let upstream = start_mock_upstream(|_| (200, "application/dns-json", json_answer("a.test"))).await;
    let mut config = proxy_config(&upstream);
    config.cache.max_entries = 0;
    let proxy = start_proxy(config).await;

    for _ in 0..3 {
        assert_eq!(lookup(&proxy, "a.test").await, "MISS");
    }
    assert_eq!(upstream.call_count(), 3);
    assert!(proxy.cache.is_empty());
}

#[tokio::test]
async fn test_formats_do_not_share_entries() {
    let upstream = start_mock_upstream(|req| {
        if req.query.as_deref().is_some_and(|q| q.starts_with("dns=")) {
            (200, "application/dns-message", vec![0xab, 0xcd, 0x81, 0x80])
        } else {
            (200, "application/dns-json", json_answer("a.test"))
        }
    })
    .await;
    let proxy = start_proxy(proxy_config(&upstream)).await;
    let client = client();

    assert_eq!(lookup(&proxy, "a.test").await, "MISS");
    let wire = client
        .get(proxy.url("/dns-query?dns=q80BAA&name=a.test&type=A"))
        .header(ACCEPT, "application/dns-message")
        .send()
        .await
        .unwrap();
    assert_eq!(wire.headers()["x-cache"], "MISS");
    assert_eq!(wire.headers()["content-type"], "application/dns-message");
    assert_eq!(upstream.call_count(), 2);
}
