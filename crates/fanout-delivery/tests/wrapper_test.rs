//! Integration tests for the sender wrapper and its reconcile semantics.

use std::{collections::HashMap, sync::Arc, time::Duration};

use bytes::Bytes;
use chrono::Utc;
use fanout_core::{DeliveryJob, Listener, SystemClock, Timestamps};
use fanout_delivery::{DeliveryClient, SenderWrapper, WrapperConfig};
use wiremock::{
    matchers::{method, path},
    Mock, MockServer, ResponseTemplate,
};

fn wrapper_config() -> WrapperConfig {
    WrapperConfig {
        num_workers_per_sender: 10,
        queue_size_per_sender: 10,
        cut_off_period: Duration::from_secs(30),
        linger: Duration::from_secs(1),
    }
}

fn wrapper(config: WrapperConfig) -> SenderWrapper {
    SenderWrapper::new(
        config,
        DeliveryClient::with_defaults().expect("client builds"),
        Arc::new(SystemClock::new()),
    )
    .expect("wrapper builds")
}

fn listener(url: String, events: &[&str], until_secs: i64) -> Listener {
    Listener {
        url,
        content_type: "application/json".to_string(),
        secret: None,
        events: events.iter().map(ToString::to_string).collect(),
        matchers: HashMap::new(),
        until: Utc::now() + chrono::Duration::seconds(until_secs),
        failure_url: None,
        address: String::new(),
    }
}

/// Inbound-shaped job: routing fields are blank, the wrapper derives them
/// from the target URL.
fn inbound(event: &str) -> DeliveryJob {
    DeliveryJob {
        payload: Bytes::from_static(b"Hello, world."),
        content_type: "application/json".to_string(),
        target_url: format!(
            "http://foo.com/api/v2/notification/device/mac:112233445566/event/{event}"
        ),
        event: String::new(),
        device_id: String::new(),
        transaction_id: "1234".to_string(),
        timestamps: Timestamps::default(),
    }
}

async fn mount_ok(server: &MockServer, at: &str) {
    Mock::given(method("POST"))
        .and(path(at))
        .respond_with(ResponseTemplate::new(200))
        .mount(server)
        .await;
}

#[tokio::test]
async fn zero_linger_rejected() {
    let config = WrapperConfig { linger: Duration::ZERO, ..wrapper_config() };
    assert!(
        SenderWrapper::new(
            config,
            DeliveryClient::with_defaults().unwrap(),
            Arc::new(SystemClock::new()),
        )
        .is_err()
    );
}

#[tokio::test]
async fn zero_workers_per_sender_rejected() {
    let config = WrapperConfig { num_workers_per_sender: 0, ..wrapper_config() };
    assert!(
        SenderWrapper::new(
            config,
            DeliveryClient::with_defaults().unwrap(),
            Arc::new(SystemClock::new()),
        )
        .is_err()
    );
}

#[tokio::test]
async fn no_listeners_means_no_outbound_requests() {
    let server = MockServer::start().await;
    mount_ok(&server, "/foo").await;

    let wrapper = wrapper(wrapper_config());

    wrapper.queue(inbound("iot")).await;
    wrapper.queue(inbound("iot")).await;
    wrapper.queue(inbound("iot")).await;

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(server.received_requests().await.expect("requests recorded").is_empty());
    assert_eq!(wrapper.sender_count().await, 0);

    wrapper.shutdown(true).await;
}

#[tokio::test]
async fn events_fan_out_to_every_matching_listener() {
    let server = MockServer::start().await;
    mount_ok(&server, "/foo").await;
    mount_ok(&server, "/bar").await;

    let wrapper = wrapper(wrapper_config());
    wrapper
        .update(vec![
            listener(format!("{}/foo", server.uri()), &["iot"], 6),
            listener(format!("{}/bar", server.uri()), &["iot", "test"], 6),
        ])
        .await;

    wrapper.queue(inbound("iot")).await;
    tokio::time::sleep(Duration::from_millis(300)).await;

    let requests = server.received_requests().await.expect("requests recorded");
    assert_eq!(requests.len(), 2, "both listeners subscribe to iot");
    assert!(requests.iter().all(|r| r.body == b"Hello, world."));

    wrapper.queue(inbound("test")).await;
    tokio::time::sleep(Duration::from_millis(300)).await;

    let requests = server.received_requests().await.expect("requests recorded");
    assert_eq!(requests.len(), 3, "only the second listener subscribes to test");

    wrapper.shutdown(true).await;
}

#[tokio::test]
async fn routing_fields_come_from_the_target_url() {
    let server = MockServer::start().await;
    mount_ok(&server, "/foo").await;

    let wrapper = wrapper(wrapper_config());
    wrapper
        .update(vec![listener(format!("{}/foo", server.uri()), &["iot"], 6)])
        .await;

    wrapper.queue(inbound("iot")).await;
    wrapper.shutdown(true).await;

    let requests = server.received_requests().await.expect("requests recorded");
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].headers.get("X-Webpa-Event").unwrap(), "iot");
    assert_eq!(
        requests[0].headers.get("X-Webpa-Device-Id").unwrap(),
        "mac:112233445566"
    );
}

#[tokio::test]
async fn expired_listener_stops_receiving() {
    let server = MockServer::start().await;
    mount_ok(&server, "/foo").await;

    let wrapper = wrapper(wrapper_config());
    wrapper
        .update(vec![listener(format!("{}/foo", server.uri()), &["iot"], 1)])
        .await;

    tokio::time::sleep(Duration::from_millis(1500)).await;
    wrapper.queue(inbound("iot")).await;
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert!(server.received_requests().await.expect("requests recorded").is_empty());

    wrapper.shutdown(true).await;
}

#[tokio::test]
async fn re_registration_extends_an_unchanged_listener() {
    let server = MockServer::start().await;
    mount_ok(&server, "/foo").await;

    let wrapper = wrapper(wrapper_config());
    wrapper
        .update(vec![listener(format!("{}/foo", server.uri()), &["iot"], 1)])
        .await;
    wrapper
        .update(vec![listener(format!("{}/foo", server.uri()), &["iot"], 10)])
        .await;

    tokio::time::sleep(Duration::from_millis(1500)).await;
    wrapper.queue(inbound("iot")).await;
    wrapper.shutdown(true).await;

    let requests = server.received_requests().await.expect("requests recorded");
    assert_eq!(requests.len(), 1, "the extension outlives the original deadline");
}

#[tokio::test]
async fn changed_subscription_replaces_the_sender() {
    let server = MockServer::start().await;
    mount_ok(&server, "/foo").await;

    let wrapper = wrapper(wrapper_config());
    wrapper
        .update(vec![listener(format!("{}/foo", server.uri()), &["iot"], 10)])
        .await;
    wrapper
        .update(vec![listener(format!("{}/foo", server.uri()), &["test"], 10)])
        .await;

    assert_eq!(wrapper.sender_count().await, 1, "same URL keeps a single sender");

    wrapper.queue(inbound("iot")).await;
    wrapper.queue(inbound("test")).await;
    wrapper.shutdown(true).await;

    let requests = server.received_requests().await.expect("requests recorded");
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].headers.get("X-Webpa-Event").unwrap(), "test");
}

#[tokio::test]
async fn invalid_listener_records_are_ignored() {
    let wrapper = wrapper(wrapper_config());

    let mut bad_regex = listener("http://localhost:9999/foo".to_string(), &["iot(.*"], 10);
    bad_regex.matchers.clear();

    wrapper
        .update(vec![
            bad_regex,
            listener("invalid".to_string(), &["iot"], 10),
        ])
        .await;

    assert_eq!(wrapper.sender_count().await, 0);
    wrapper.shutdown(true).await;
}

#[tokio::test]
async fn reaper_evicts_after_linger() {
    let server = MockServer::start().await;
    mount_ok(&server, "/foo").await;

    let wrapper = wrapper(wrapper_config());
    wrapper
        .update(vec![listener(format!("{}/foo", server.uri()), &["iot"], 1)])
        .await;
    assert_eq!(wrapper.sender_count().await, 1);

    // Deadline (1s) + linger (1s) + one reaper sweep (2s interval).
    tokio::time::sleep(Duration::from_millis(4500)).await;
    assert_eq!(wrapper.sender_count().await, 0, "lingered-out sender was evicted");

    wrapper.shutdown(true).await;
}

#[tokio::test]
async fn missing_from_snapshot_lingers_until_deadline_passes() {
    let server = MockServer::start().await;
    mount_ok(&server, "/foo").await;

    let wrapper = wrapper(wrapper_config());
    wrapper
        .update(vec![listener(format!("{}/foo", server.uri()), &["iot"], 30)])
        .await;

    // A snapshot omitting the listener does not tear it down.
    wrapper.update(Vec::new()).await;
    assert_eq!(wrapper.sender_count().await, 1);

    wrapper.queue(inbound("iot")).await;
    wrapper.shutdown(true).await;

    let requests = server.received_requests().await.expect("requests recorded");
    assert_eq!(requests.len(), 1, "lingering sender still delivers");
}

#[tokio::test]
async fn shutdown_is_idempotent() {
    let wrapper = wrapper(wrapper_config());
    wrapper.shutdown(true).await;
    wrapper.shutdown(true).await;
    wrapper.shutdown(false).await;
}
