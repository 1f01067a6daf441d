//! `HttpTransport` against a local mock server.

use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use percolate_poll::{
    Endpoint, HttpTransport, Method, PollEvent, PollOptions, PollOutcome, PollRequest,
    PollingRegistry, Priority, Transport,
};

fn request(endpoint: Endpoint, headers: &[(&str, &str)]) -> PollRequest {
    PollRequest {
        key: "k".to_string(),
        endpoint,
        headers: headers
            .iter()
            .map(|(name, value)| ((*name).to_string(), (*value).to_string()))
            .collect(),
        signal: CancellationToken::new(),
    }
}

#[tokio::test]
async fn returns_status_validator_and_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/orders"))
        .and(header("accept", "application/json"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("ETag", "\"v7\"")
                .set_body_json(json!({"data": []})),
        )
        .mount(&server)
        .await;

    let transport = HttpTransport::new().unwrap();
    let response = transport
        .send(request(
            Endpoint::get(format!("{}/api/orders", server.uri())),
            &[("Accept", "application/json")],
        ))
        .await
        .unwrap();

    assert_eq!(response.status, 200);
    assert_eq!(response.validator.as_deref(), Some("\"v7\""));
    assert_eq!(
        serde_json::from_slice::<serde_json::Value>(&response.body).unwrap(),
        json!({"data": []})
    );
}

#[tokio::test]
async fn sends_method_and_json_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/orders/search"))
        .and(header("content-type", "application/json"))
        .and(body_json(json!({"status": "pending"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let transport = HttpTransport::new().unwrap();
    let endpoint = Endpoint::new(
        format!("{}/api/orders/search", server.uri()),
        Method::Post,
        Some(json!({"status": "pending"})),
    );
    let response = transport.send(request(endpoint, &[])).await.unwrap();

    assert!(response.is_success());
}

#[tokio::test]
async fn non_success_status_is_not_a_transport_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let transport = HttpTransport::new().unwrap();
    let response = transport
        .send(request(Endpoint::get(server.uri()), &[]))
        .await
        .unwrap();

    assert_eq!(response.status, 503);
    assert!(response.validator.is_none());
}

#[tokio::test]
async fn unreachable_host_is_a_request_error() {
    let transport = HttpTransport::new().unwrap();
    let result = transport
        .send(request(Endpoint::get("http://127.0.0.1:9/unreachable"), &[]))
        .await;

    assert!(result.is_err());
}

#[tokio::test]
async fn registry_revalidates_with_stored_etag() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/orders"))
        .and(header("if-none-match", "\"v1\""))
        .respond_with(ResponseTemplate::new(304))
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/orders"))
        .and(header("cache-control", "no-cache"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("ETag", "\"v1\"")
                .set_body_json(json!([{"id": 1, "status": "pending"}])),
        )
        .with_priority(2)
        .mount(&server)
        .await;

    let registry = PollingRegistry::new(HttpTransport::new().unwrap());
    let mut subscription = registry.start(
        "cashier-orders",
        format!("{}/api/orders", server.uri()),
        PollOptions::every(Duration::from_secs(60)).with_priority(Priority::High),
    );

    let first = subscription.next().await.unwrap();
    assert_eq!(first.payload(), Some(&json!([{"id": 1, "status": "pending"}])));

    tokio::time::sleep(Duration::from_millis(600)).await;
    assert!(registry.refresh("cashier-orders"));

    let PollEvent::Attempt { outcome, .. } = subscription.next().await.unwrap() else {
        panic!("expected an attempt event");
    };
    assert_eq!(outcome, PollOutcome::NotModified);
    assert_eq!(
        registry.snapshot("cashier-orders").unwrap().validator.as_deref(),
        Some("\"v1\"")
    );
    assert!(registry.stop("cashier-orders"));
}
