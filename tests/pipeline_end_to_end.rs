use clicktail::app::Config;
use clicktail::collector::ReadFrom;
use clicktail::domain::PipelineError;
use serde_json::{Map, Value};
use std::io::Write;
use std::time::Duration;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn clickhouse() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ping"))
        .respond_with(ResponseTemplate::new(200).set_body_string("Ok.\n"))
        .mount(&server)
        .await;
    server
}

async fn accept_inserts(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/"))
        .and(query_param("query", "INSERT INTO logs FORMAT JSONEachRow"))
        .respond_with(ResponseTemplate::new(200))
        .mount(server)
        .await;
}

fn log_file(lines: &[&str]) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    for line in lines {
        writeln!(file, "{line}").unwrap();
    }
    file.flush().unwrap();
    file
}

fn config(server: &MockServer, parser: &str, file: &tempfile::NamedTempFile) -> Config {
    let mut config = Config {
        parser: Some(parser.to_string()),
        files: vec![file.path().display().to_string()],
        dataset: Some("logs".to_string()),
        api_host: server.uri(),
        // inputs end quickly, so the closing flush forms a single batch
        send_frequency_ms: 60_000,
        poolsize: 2,
        backoff_base_ms: 5,
        backoff_max_ms: 20,
        ..Config::default()
    };
    config.tail.stop = true;
    config.post_process();
    config.validate().unwrap();
    config
}

/// Every inserted row, without the reserved columns.
async fn inserted_rows(server: &MockServer) -> Vec<Map<String, Value>> {
    let requests = server.received_requests().await.unwrap();
    requests
        .iter()
        .filter(|r| r.method.as_str() == "POST")
        .flat_map(|r| {
            String::from_utf8(r.body.clone())
                .unwrap()
                .lines()
                .map(|line| serde_json::from_str::<Map<String, Value>>(line).unwrap())
                .collect::<Vec<_>>()
        })
        .map(|mut row| {
            assert!(row.contains_key("_time"));
            assert!(row.contains_key("_date"));
            assert_eq!(row.remove("_sample_rate"), Some(Value::from(1)));
            row.remove("_time");
            row.remove("_date");
            row
        })
        .collect()
}

#[tokio::test]
async fn test_three_keyval_lines_delivered_and_run_terminates() {
    let server = clickhouse().await;
    accept_inserts(&server).await;
    let file = log_file(&["a=1", "b=2", "c=3"]);

    let handle = clicktail::start(config(&server, "keyval", &file)).await.unwrap();
    let snapshot = tokio::time::timeout(Duration::from_secs(10), handle.wait())
        .await
        .expect("run should terminate with --tail.stop")
        .unwrap();

    assert_eq!(snapshot.lines_read, 3);
    assert_eq!(snapshot.events_sent, 3);
    assert_eq!(snapshot.events_dropped, 0);

    let mut rows = inserted_rows(&server).await;
    rows.sort_by_key(|row| row.keys().next().cloned());
    let expected: Vec<Map<String, Value>> = [("a", 1), ("b", 2), ("c", 3)]
        .into_iter()
        .map(|(k, v)| Map::from_iter([(k.to_string(), Value::from(v))]))
        .collect();
    assert_eq!(rows, expected);
}

#[tokio::test]
async fn test_malformed_line_counted_once() {
    let server = clickhouse().await;
    accept_inserts(&server).await;
    let file = log_file(&[r#"{"status":200}"#, "{not json", r#"{"status":404}"#]);

    let snapshot = clicktail::start(config(&server, "json", &file))
        .await
        .unwrap()
        .wait()
        .await
        .unwrap();

    assert_eq!(snapshot.parse_errors, 1);
    assert_eq!(snapshot.events_sent, 2);
    assert_eq!(inserted_rows(&server).await.len(), 2);
}

#[tokio::test]
async fn test_rate_limited_insert_is_retried() {
    let server = clickhouse().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(2)
        .with_priority(1)
        .mount(&server)
        .await;
    accept_inserts(&server).await;
    let file = log_file(&["a=1", "b=2"]);

    let mut config = config(&server, "keyval", &file);
    config.backoff = true;
    let snapshot = clicktail::start(config).await.unwrap().wait().await.unwrap();

    assert_eq!(snapshot.rate_limited, 2);
    assert_eq!(snapshot.retries, 2);
    assert_eq!(snapshot.events_sent, 2);
    assert_eq!(snapshot.events_dropped, 0);
}

#[tokio::test]
async fn test_rate_limited_without_backoff_is_dropped() {
    let server = clickhouse().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    let file = log_file(&["a=1", "b=2"]);

    let snapshot = clicktail::start(config(&server, "keyval", &file))
        .await
        .unwrap()
        .wait()
        .await
        .unwrap();

    assert_eq!(snapshot.events_sent, 0);
    assert_eq!(snapshot.events_dropped, 2);
    assert_eq!(snapshot.retries, 0);
}

#[tokio::test]
async fn test_rejected_batch_is_not_retried() {
    let server = clickhouse().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(400).set_body_string("Code: 26. DB::Exception: Cannot parse JSON"),
        )
        .expect(1)
        .mount(&server)
        .await;
    let file = log_file(&["a=1", "b=2", "c=3"]);

    let mut config = config(&server, "keyval", &file);
    config.backoff = true;
    let snapshot = clicktail::start(config).await.unwrap().wait().await.unwrap();

    assert_eq!(snapshot.permanent_errors, 1);
    assert_eq!(snapshot.events_dropped, 3);
    assert_eq!(snapshot.retries, 0);
}

#[tokio::test]
async fn test_unreachable_backend_is_fatal() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ping"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    let file = log_file(&["a=1"]);

    let err = clicktail::start(config(&server, "keyval", &file))
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Backend(_)));
    assert!(err.is_fatal());
}

#[tokio::test]
async fn test_transforms_and_scrub_reach_backend() {
    let server = clickhouse().await;
    accept_inserts(&server).await;
    let file = log_file(&[r#"{"user":"alice","password":"hunter2","status":200}"#]);

    let mut config = config(&server, "json", &file);
    config.scrub_field = vec!["user".into()];
    config.drop_field = vec!["password".into()];
    config.add_field = vec!["env=prod".into()];
    clicktail::start(config).await.unwrap().wait().await.unwrap();

    let rows = inserted_rows(&server).await;
    assert_eq!(rows.len(), 1);
    let row = &rows[0];
    assert!(!row.contains_key("password"));
    assert_eq!(row["env"], Value::from("prod"));
    let scrubbed = row["user"].as_str().unwrap();
    assert_eq!(scrubbed.len(), 64);
    assert_ne!(scrubbed, "alice");
}

#[tokio::test]
async fn test_follow_mode_stops_on_cancel() {
    let server = clickhouse().await;
    accept_inserts(&server).await;
    let mut file = log_file(&["old=1"]);

    let mut config = config(&server, "keyval", &file);
    config.tail.stop = false;
    config.tail.read_from = ReadFrom::End;
    config.tail.poll_interval_ms = 10;
    config.send_frequency_ms = 20;

    let handle = clicktail::start(config).await.unwrap();
    let counters = handle.counters();
    tokio::time::sleep(Duration::from_millis(100)).await;
    writeln!(file, "new=2").unwrap();
    file.flush().unwrap();

    tokio::time::timeout(Duration::from_secs(10), async {
        while counters.snapshot().events_sent < 1 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("appended line should be delivered");

    handle.cancel();
    let snapshot = tokio::time::timeout(Duration::from_secs(10), handle.wait())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(snapshot.lines_read, 1);

    let rows = inserted_rows(&server).await;
    assert_eq!(rows, vec![Map::from_iter([("new".to_string(), Value::from(2))])]);
}

#[tokio::test]
async fn test_sources_read_concurrently_keep_their_own_order() {
    let server = clickhouse().await;
    accept_inserts(&server).await;
    let lines = |src: &str| -> Vec<String> { (1..=50).map(|n| format!("src={src} n={n}")).collect() };
    let first_lines = lines("a");
    let second_lines = lines("b");
    let first = log_file(&first_lines.iter().map(String::as_str).collect::<Vec<_>>());
    let second = log_file(&second_lines.iter().map(String::as_str).collect::<Vec<_>>());

    let mut config = config(&server, "keyval", &first);
    config.files.push(second.path().display().to_string());
    let snapshot = tokio::time::timeout(
        Duration::from_secs(10),
        clicktail::start(config).await.unwrap().wait(),
    )
    .await
    .unwrap()
    .unwrap();

    assert_eq!(snapshot.lines_read, 100);
    assert_eq!(snapshot.events_sent, 100);
    assert_eq!(snapshot.source_errors, 0);

    let rows = inserted_rows(&server).await;
    for src in ["a", "b"] {
        let seen: Vec<i64> = rows
            .iter()
            .filter(|row| row["src"] == src)
            .map(|row| row["n"].as_i64().unwrap())
            .collect();
        assert_eq!(seen, (1..=50).collect::<Vec<_>>(), "source {src}");
    }
}

#[tokio::test]
async fn test_vanished_source_leaves_others_running() {
    let server = clickhouse().await;
    accept_inserts(&server).await;
    let dir = tempfile::tempdir().unwrap();
    let doomed = dir.path().join("doomed.log");
    let survivor = dir.path().join("survivor.log");
    std::fs::write(&doomed, "").unwrap();
    std::fs::write(&survivor, "").unwrap();

    let anchor = log_file(&[]);
    let mut config = config(&server, "keyval", &anchor);
    config.files = vec![
        doomed.display().to_string(),
        survivor.display().to_string(),
    ];
    config.tail.stop = false;
    config.tail.read_from = ReadFrom::End;
    config.tail.poll_interval_ms = 10;
    config.send_frequency_ms = 20;

    let handle = clicktail::start(config).await.unwrap();
    let counters = handle.counters();
    tokio::time::sleep(Duration::from_millis(50)).await;
    std::fs::remove_file(&doomed).unwrap();

    tokio::time::timeout(Duration::from_secs(10), async {
        while counters.snapshot().source_errors < 1 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("removed file should end its source");

    let mut file = std::fs::OpenOptions::new().append(true).open(&survivor).unwrap();
    writeln!(file, "src=survivor n=1").unwrap();
    file.flush().unwrap();

    tokio::time::timeout(Duration::from_secs(10), async {
        while counters.snapshot().events_sent < 1 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("surviving source should keep delivering");

    handle.cancel();
    let snapshot = tokio::time::timeout(Duration::from_secs(10), handle.wait())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(snapshot.source_errors, 1);
    assert_eq!(snapshot.lines_read, 1);

    let rows = inserted_rows(&server).await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["src"], "survivor");
}
