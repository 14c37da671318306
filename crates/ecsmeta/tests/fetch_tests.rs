//! Metadata fetch tests against a mock ECS agent.
//!
//! # Invariants
//! - A busy agent (non-200) is retried until it answers.
//! - Exhausting the retry budget surfaces `MaxRetriesExceeded`.
//! - The fetched document is usable from templates via the data context.

use confmerge::Loader;
use confmerge_ecsmeta::{DATA_KEY, MetadataError, MetadataOptions, fetch};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn load_fixture() -> Value {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/task_metadata.json");
    let text = std::fs::read_to_string(path).expect("read fixture");
    serde_json::from_str(&text).expect("parse fixture")
}

/// Agent that is busy once, then serves the sample task document.
async fn busy_once_agent() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/task"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/task"))
        .respond_with(ResponseTemplate::new(200).set_body_json(load_fixture()))
        .mount(&server)
        .await;
    server
}

fn fast_options(endpoint: String) -> MetadataOptions {
    MetadataOptions::from_env()
        .with_endpoint(endpoint)
        .with_max_retries(1)
        .with_interval(Duration::from_millis(5))
}

#[tokio::test]
async fn test_fetch_retries_busy_agent() {
    let server = busy_once_agent().await;
    let options = fast_options(format!("{}/task", server.uri()));

    let data = fetch(&options).await.unwrap();
    assert_eq!(data.get(DATA_KEY), Some(&load_fixture()));
}

#[tokio::test]
async fn test_fetch_exhausts_retries() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/task"))
        .respond_with(ResponseTemplate::new(503))
        .expect(2)
        .mount(&server)
        .await;
    let options = fast_options(format!("{}/task", server.uri()));

    let err = fetch(&options).await.unwrap_err();
    match &err {
        MetadataError::MaxRetriesExceeded { attempts, last } => {
            assert_eq!(*attempts, 2);
            assert!(matches!(**last, MetadataError::Status { status: 503, .. }));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(!err.is_retryable());
    assert!(err.to_string().contains("max retries reached"));
}

#[tokio::test]
async fn test_fetch_retries_undecodable_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/task"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;
    let options = fast_options(format!("{}/task", server.uri())).with_max_retries(0);

    let err = fetch(&options).await.unwrap_err();
    match err {
        MetadataError::MaxRetriesExceeded { attempts, last } => {
            assert_eq!(attempts, 1);
            assert!(matches!(*last, MetadataError::Decode(_)));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_container_images_from_template() {
    let server = busy_once_agent().await;
    let options = fast_options(format!("{}/task", server.uri()));

    let loader = Loader::new();
    loader.data(fetch(&options).await.unwrap());

    let src = b"
Images:
  {{ range  $c := .ecsTaskMetadata.Containers }}
  - {{ $c.Image }}
  {{ end }}
";
    let mut c: HashMap<String, Vec<String>> = HashMap::new();
    loader.load_with_env_bytes(&mut c, src).unwrap();
    assert_eq!(
        c["Images"],
        vec![
            "amazon/amazon-ecs-pause:0.1.0".to_string(),
            "nrdlngr/nginx-curl".to_string()
        ]
    );
}
