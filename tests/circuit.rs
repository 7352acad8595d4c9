//! Circuit breaker integration tests: opening, fail-fast rejection,
//! probe-based recovery, and the manual reset endpoint.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use resilient_proxy::config::ProxyConfig;

mod common;

/// Breaker tuned to trip quickly: 3 failures, no retries per attempt.
fn trippy_config(cooldown_secs: u64) -> ProxyConfig {
    let mut config = ProxyConfig::default();
    config.circuit_breaker.failure_threshold = 3;
    config.circuit_breaker.cooldown_secs = cooldown_secs;
    config.retries.max_retries = 0;
    config.retries.base_delay_ms = 10;
    config.timeouts.attempt_ms = 2_000;
    config
}

fn client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}

async fn fetch(
    client: &reqwest::Client,
    proxy: &common::TestProxy,
    target: &str,
) -> reqwest::Response {
    client
        .get(proxy.url("/proxy/fetch"))
        .query(&[("url", target)])
        .send()
        .await
        .unwrap()
}

#[tokio::test]
async fn circuit_opens_after_threshold_and_fails_fast() {
    let calls = Arc::new(AtomicU32::new(0));
    let c = calls.clone();
    let upstream = common::start_programmable_upstream(move || {
        let c = c.clone();
        async move {
            c.fetch_add(1, Ordering::SeqCst);
            (500, "boom".to_string())
        }
    })
    .await;

    let proxy = common::start_proxy(trippy_config(30)).await;
    let client = client();
    let target = format!("http://{upstream}/doomed");

    // Three upstream failures trip the breaker.
    for _ in 0..3 {
        let response = fetch(&client, &proxy, &target).await;
        assert_eq!(response.status(), 502);
        let body: serde_json::Value = response.json().await.unwrap();
        assert_eq!(body["error"]["errorType"], "HTTP_ERROR");
    }
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    // The fourth request is rejected without touching the upstream.
    let rejected = fetch(&client, &proxy, &target).await;
    assert_eq!(rejected.status(), 503);
    let body: serde_json::Value = rejected.json().await.unwrap();
    assert_eq!(body["error"]["errorType"], "CIRCUIT_OPEN");
    assert_eq!(body["circuitState"], "OPEN");
    assert_eq!(body["attempts"], 0);
    assert!(body["error"]["willRetryAt"].is_number());
    assert_eq!(calls.load(Ordering::SeqCst), 3, "open circuit must not call out");

    let health: serde_json::Value = client
        .get(proxy.url("/proxy/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["circuitBreaker"]["open"], 1);
    assert_eq!(health["circuitBreaker"]["closed"], 0);

    proxy.shutdown.trigger();
}

#[tokio::test]
async fn manual_reset_readmits_traffic_immediately() {
    let calls = Arc::new(AtomicU32::new(0));
    let c = calls.clone();
    let upstream = common::start_programmable_upstream(move || {
        let c = c.clone();
        async move {
            // Fails three times, then recovers.
            if c.fetch_add(1, Ordering::SeqCst) < 3 {
                (500, "boom".to_string())
            } else {
                (200, "back".to_string())
            }
        }
    })
    .await;

    let proxy = common::start_proxy(trippy_config(300)).await;
    let client = client();
    let target = format!("http://{upstream}/flappy");

    for _ in 0..3 {
        fetch(&client, &proxy, &target).await;
    }
    let rejected = fetch(&client, &proxy, &target).await;
    assert_eq!(rejected.status(), 503);

    // Reset every breaker; cooldown no longer applies.
    let reset = client
        .post(proxy.url("/proxy/circuit/reset"))
        .json(&serde_json::json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(reset.status(), 200);
    let body: serde_json::Value = reset.json().await.unwrap();
    assert_eq!(body["success"], true);

    let recovered = fetch(&client, &proxy, &target).await;
    assert_eq!(recovered.status(), 200);
    assert_eq!(recovered.headers()["x-circuit-state"], "CLOSED");
    assert_eq!(recovered.text().await.unwrap(), "back");

    proxy.shutdown.trigger();
}

#[tokio::test]
async fn successful_probe_after_cooldown_closes_the_circuit() {
    let calls = Arc::new(AtomicU32::new(0));
    let c = calls.clone();
    let upstream = common::start_programmable_upstream(move || {
        let c = c.clone();
        async move {
            if c.fetch_add(1, Ordering::SeqCst) < 3 {
                (500, "boom".to_string())
            } else {
                (200, "healthy".to_string())
            }
        }
    })
    .await;

    let proxy = common::start_proxy(trippy_config(1)).await;
    let client = client();
    let target = format!("http://{upstream}/recovering");

    for _ in 0..3 {
        fetch(&client, &proxy, &target).await;
    }
    assert_eq!(fetch(&client, &proxy, &target).await.status(), 503);

    // Let the cooldown elapse; the next request is admitted as a probe.
    tokio::time::sleep(Duration::from_millis(1_200)).await;

    let probe = fetch(&client, &proxy, &target).await;
    assert_eq!(probe.status(), 200);
    assert_eq!(probe.text().await.unwrap(), "healthy");
    assert_eq!(calls.load(Ordering::SeqCst), 4);

    let stats: serde_json::Value = client
        .get(proxy.url("/proxy/stats"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let origin = format!("http://{upstream}");
    assert_eq!(stats["circuits"][&origin]["state"], "CLOSED");
    assert_eq!(stats["circuits"][&origin]["failures"], 0);

    proxy.shutdown.trigger();
}

#[tokio::test]
async fn failed_probe_reopens_the_circuit() {
    let calls = Arc::new(AtomicU32::new(0));
    let c = calls.clone();
    let upstream = common::start_programmable_upstream(move || {
        let c = c.clone();
        async move {
            c.fetch_add(1, Ordering::SeqCst);
            (500, "still down".to_string())
        }
    })
    .await;

    let proxy = common::start_proxy(trippy_config(1)).await;
    let client = client();
    let target = format!("http://{upstream}/still-down");

    for _ in 0..3 {
        fetch(&client, &proxy, &target).await;
    }
    assert_eq!(fetch(&client, &proxy, &target).await.status(), 503);

    tokio::time::sleep(Duration::from_millis(1_200)).await;

    // The probe goes through and fails against the upstream.
    let probe = fetch(&client, &proxy, &target).await;
    assert_eq!(probe.status(), 502);
    assert_eq!(calls.load(Ordering::SeqCst), 4);

    // Back to fail-fast without another upstream call.
    let rejected = fetch(&client, &proxy, &target).await;
    assert_eq!(rejected.status(), 503);
    let body: serde_json::Value = rejected.json().await.unwrap();
    assert_eq!(body["error"]["errorType"], "CIRCUIT_OPEN");
    assert_eq!(calls.load(Ordering::SeqCst), 4);

    proxy.shutdown.trigger();
}

#[tokio::test]
async fn abandoned_probe_does_not_wedge_the_breaker() {
    let calls = Arc::new(AtomicU32::new(0));
    let c = calls.clone();
    let upstream = common::start_programmable_upstream(move || {
        let c = c.clone();
        async move {
            match c.fetch_add(1, Ordering::SeqCst) {
                0..=2 => (500, "boom".to_string()),
                // The admitted probe hangs; its caller gives up below.
                3 => {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    (200, "late".to_string())
                }
                _ => (200, "healthy".to_string()),
            }
        }
    })
    .await;

    let proxy = common::start_proxy(trippy_config(1)).await;
    let client = client();
    let target = format!("http://{upstream}/wedge");

    for _ in 0..3 {
        fetch(&client, &proxy, &target).await;
    }
    assert_eq!(fetch(&client, &proxy, &target).await.status(), 503);

    tokio::time::sleep(Duration::from_millis(1_200)).await;

    // This caller is admitted as the probe, then disconnects mid-flight
    // without any outcome ever being recorded.
    let abandoned = {
        let client = client.clone();
        let url = proxy.url("/proxy/execute");
        let target = target.clone();
        tokio::spawn(async move {
            let _ = client
                .post(&url)
                .json(&serde_json::json!({ "url": target, "timeout": 20_000 }))
                .send()
                .await;
        })
    };
    tokio::time::sleep(Duration::from_millis(300)).await;
    abandoned.abort();
    let _ = abandoned.await;
    tokio::time::sleep(Duration::from_millis(200)).await;

    // The probe slot is free again; the next request probes and recovers.
    let recovered = fetch(&client, &proxy, &target).await;
    assert_eq!(recovered.status(), 200);
    assert_eq!(recovered.headers()["x-circuit-state"], "CLOSED");
    assert_eq!(recovered.text().await.unwrap(), "healthy");

    proxy.shutdown.trigger();
}

#[tokio::test]
async fn failures_on_one_origin_leave_others_closed() {
    let bad_calls = Arc::new(AtomicU32::new(0));
    let bc = bad_calls.clone();
    let bad = common::start_programmable_upstream(move || {
        let bc = bc.clone();
        async move {
            bc.fetch_add(1, Ordering::SeqCst);
            (500, "boom".to_string())
        }
    })
    .await;
    let good = common::start_mock_upstream("fine").await;

    let proxy = common::start_proxy(trippy_config(30)).await;
    let client = client();

    for _ in 0..3 {
        fetch(&client, &proxy, &format!("http://{bad}/x")).await;
    }
    assert_eq!(fetch(&client, &proxy, &format!("http://{bad}/x")).await.status(), 503);

    let response = fetch(&client, &proxy, &format!("http://{good}/y")).await;
    assert_eq!(response.status(), 200);
    assert_eq!(response.headers()["x-circuit-state"], "CLOSED");
    assert_eq!(response.text().await.unwrap(), "fine");

    proxy.shutdown.trigger();
}
