#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(coverage_nightly, coverage(off))]
#![allow(clippy::unwrap_used, clippy::expect_used)]

//! `HttpHelloClient` against a mock hello service.

use hello_sdk::{HelloClient, HelloClientConfig, HelloError, HttpHelloClient, VersioningSettings};
use httpmock::prelude::*;
use rest_client::{RestError, VersioningConfig};
use std::collections::HashMap;
use std::time::{Duration, Instant};

fn config_for(server: &MockServer) -> HelloClientConfig {
    HelloClientConfig {
        base_url: server.base_url(),
        allow_insecure_http: true,
        max_retries: 0,
        runtime_worker_threads: 1,
        ..HelloClientConfig::default()
    }
}

fn client_for(server: &MockServer) -> HttpHelloClient {
    HttpHelloClient::new(&config_for(server)).unwrap()
}

#[test]
fn say_hello_sends_version_one() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET)
            .path("/hello/greeting/world")
            .header("x-api-version", "1");
        then.status(200).body("Hello world");
    });

    assert_eq!(client_for(&server).say_hello("world").unwrap(), "Hello world");
    mock.assert();
}

#[tokio::test]
async fn say_hello_two_sends_version_two() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET)
            .path("/hello/greeting/world")
            .header("x-api-version", "2");
        then.status(200).body("Hi there, world");
    });

    let greeting = client_for(&server).say_hello_two("world").await.unwrap();
    assert_eq!(greeting, "Hi there, world");
    mock.assert();
}

#[tokio::test]
async fn say_hello_blocks_inside_async_code() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET)
            .path("/hello/greeting/Fred")
            .header("x-api-version", "1");
        then.status(200).body("Hello Fred");
    });

    let client = client_for(&server);
    assert_eq!(client.say_hello("Fred").unwrap(), "Hello Fred");
    mock.assert();
}

#[test]
fn say_hello_two_resolves_after_client_is_dropped() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/hello/greeting/Fred");
        then.status(200).body("Hi there, Fred");
    });

    let pending = client_for(&server).say_hello_two("Fred");
    assert_eq!(futures::executor::block_on(pending).unwrap(), "Hi there, Fred");
}

#[tokio::test]
async fn unknown_version_is_reported() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/hello/greeting/Fred");
        then.status(404).body("Not Found");
    });

    let err = client_for(&server).say_hello_two("Fred").await.unwrap_err();
    assert!(
        matches!(err, HelloError::VersionNotFound { ref version } if version == "2"),
        "got {err:?}"
    );
}

#[test]
fn server_error_carries_status_and_body() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/hello/greeting/Fred");
        then.status(503).body("maintenance");
    });

    match client_for(&server).say_hello("Fred").unwrap_err() {
        HelloError::Status { status, body } => {
            assert_eq!(status, http::StatusCode::SERVICE_UNAVAILABLE);
            assert_eq!(body, "maintenance");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn connection_refused_is_transport_error() {
    let config = HelloClientConfig {
        base_url: "http://127.0.0.1:1".to_owned(),
        allow_insecure_http: true,
        max_retries: 0,
        ..HelloClientConfig::default()
    };
    let err = HttpHelloClient::new(&config)
        .unwrap()
        .say_hello("Fred")
        .unwrap_err();
    assert!(matches!(err, HelloError::Transport(_)), "got {err:?}");
}

#[test]
fn per_client_versioning_override_uses_query_parameter() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET)
            .path("/hello/greeting/Fred")
            .query_param("api-version", "1")
            .header_missing("x-api-version");
        then.status(200).body("Hello Fred");
    });

    let config = HelloClientConfig {
        versioning: VersioningSettings {
            default: VersioningConfig::default(),
            clients: HashMap::from([(
                "hello".to_owned(),
                VersioningConfig::parameter("api-version"),
            )]),
        },
        ..config_for(&server)
    };

    let client = HttpHelloClient::new(&config).unwrap();
    assert_eq!(client.say_hello("Fred").unwrap(), "Hello Fred");
    mock.assert();
}

#[test]
fn name_is_encoded_as_one_segment() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET).path("/hello/greeting/Fred%2FSmith");
        then.status(200).body("Hello Fred/Smith");
    });

    assert_eq!(
        client_for(&server).say_hello("Fred/Smith").unwrap(),
        "Hello Fred/Smith"
    );
    mock.assert();
}

#[test]
fn total_timeout_cuts_slow_response() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/hello/greeting/Fred");
        then.status(200)
            .body("late")
            .delay(Duration::from_millis(1500));
    });

    for max_retries in [0, 3] {
        let config = HelloClientConfig {
            request_timeout_ms: 5000,
            total_timeout_ms: Some(200),
            max_retries,
            ..config_for(&server)
        };
        let started = Instant::now();
        let err = HttpHelloClient::new(&config)
            .unwrap()
            .say_hello("Fred")
            .unwrap_err();
        assert!(
            matches!(err, HelloError::Transport(RestError::DeadlineExceeded(_))),
            "max_retries={max_retries}: {err:?}"
        );
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}

#[tokio::test]
async fn total_timeout_cuts_slow_deferred_response() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/hello/greeting/Fred");
        then.status(200)
            .body("late")
            .delay(Duration::from_millis(1500));
    });

    let config = HelloClientConfig {
        request_timeout_ms: 5000,
        total_timeout_ms: Some(200),
        ..config_for(&server)
    };
    let err = HttpHelloClient::new(&config)
        .unwrap()
        .say_hello_two("Fred")
        .await
        .unwrap_err();
    assert!(
        matches!(err, HelloError::Transport(RestError::DeadlineExceeded(_))),
        "got {err:?}"
    );
}
