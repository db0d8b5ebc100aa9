use clicktail::buffer::{Batch, BatchType};
use clicktail::domain::{Event, SampledEvent};
use clicktail::sender::{BatchTransmitter, ClickHouseClient, ClientConfig, SendOutcome};
use flate2::read::GzDecoder;
use std::io::Read;
use std::time::Duration;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn transmitter(server: &MockServer, compress: bool) -> BatchTransmitter {
    let client = ClickHouseClient::new(ClientConfig {
        api_host: server.uri(),
        dataset: "web.access".to_string(),
        timeout: Duration::from_millis(500),
        user_agent: "clicktail/test (nginx)".to_string(),
        compress,
        ..Default::default()
    })
    .unwrap();
    BatchTransmitter::new(client)
}

fn batch() -> Batch {
    let events = (0..3)
        .map(|i| {
            let mut event = Event::new();
            event.insert("status", 200_i64 + i);
            SampledEvent::new(event, 10)
        })
        .collect();
    Batch::new(events, BatchType::SizeBased)
}

#[tokio::test]
async fn test_gzip_insert_with_user_agent() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/"))
        .and(query_param("query", "INSERT INTO web.access FORMAT JSONEachRow"))
        .and(header("content-encoding", "gzip"))
        .and(header("user-agent", "clicktail/test (nginx)"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = transmitter(&server, true).send_batch(&batch()).await;
    assert_eq!(outcome, SendOutcome::Success);

    let requests = server.received_requests().await.unwrap();
    let mut body = String::new();
    GzDecoder::new(requests[0].body.as_slice())
        .read_to_string(&mut body)
        .unwrap();
    let rows: Vec<serde_json::Value> = body
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(rows.len(), 3);
    assert!(rows.iter().all(|row| row["_sample_rate"] == 10));
    assert_eq!(rows[2]["status"], 202);
}

#[tokio::test]
async fn test_response_classification() {
    for (status, expect_retryable) in [(429, true), (503, true), (502, true), (400, false), (404, false)] {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(status))
            .mount(&server)
            .await;

        let outcome = transmitter(&server, false).send_batch(&batch()).await;
        assert_eq!(outcome.is_retryable(), expect_retryable, "status {status}");
    }
}

#[tokio::test]
async fn test_timeout_is_transient() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
        .mount(&server)
        .await;

    let outcome = transmitter(&server, false).send_batch(&batch()).await;
    assert!(matches!(outcome, SendOutcome::Transient(_)));
}

#[tokio::test]
async fn test_ping() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ping"))
        .respond_with(ResponseTemplate::new(200).set_body_string("Ok.\n"))
        .mount(&server)
        .await;

    assert!(transmitter(&server, false).client().verify().await.is_ok());
}

#[tokio::test]
async fn test_ping_connection_refused() {
    let server = MockServer::start().await;
    let uri = server.uri();
    drop(server);

    let client = ClickHouseClient::new(ClientConfig {
        api_host: uri,
        ..Default::default()
    })
    .unwrap();
    assert!(client.verify().await.is_err());
}
