//! Integration tests for batch runs.
//!
//! These tests drive the full fetch → extract → price → persist loop with
//! mock fetchers and backends:
//! 1. Per-URL failures are isolated
//! 2. Configuration errors stop the run before any fetch
//! 3. Pagination discovery and merging
//! 4. Ordering, cancellation and persistence failures
//! 5. Provider usage payloads with missing counters

use listing_extractor::{
    backends::OpenAIBackend,
    sinks::json::read_rows,
    testing::{FailingSink, MockBackend, MockFailure},
    tokens::estimate_tokens,
    ApiKey, BackendKind, BatchOrchestrator, BatchRequest, BatchStatus, ConfigError,
    CostAccountant, CsvSink, ExtractionError, FanOutSink, JsonSink, MemorySink, MockFetcher,
    ModelEntry, TokenUsage, UrlOutcome, UrlStage,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

const MODEL: &str = "gpt-4o-mini";

/// Helper to create a fetcher serving three car listing pages.
fn car_pages() -> MockFetcher {
    MockFetcher::new()
        .with_page("https://cars.example.com/1", "PAGE-ONE Honda Civic $9,000")
        .with_page("https://cars.example.com/2", "PAGE-TWO Toyota Corolla $7,500")
        .with_page("https://cars.example.com/3", "PAGE-THREE Mazda 3 $8,200")
}

/// Helper to create a backend answering one listing per page marker.
fn car_backend() -> MockBackend {
    with_car_replies(MockBackend::new())
}

/// Helper to add the page marker replies after any rules already on `backend`.
fn with_car_replies(backend: MockBackend) -> MockBackend {
    backend
        .with_reply(
            "PAGE-ONE",
            json!({"listings": [{"title": "Honda Civic", "price": "$9,000"}]}),
            TokenUsage::new(1_000, 100),
        )
        .with_reply(
            "PAGE-TWO",
            json!({"listings": [{"title": "Toyota Corolla", "price": "$7,500"}]}),
            TokenUsage::new(1_000, 100),
        )
        .with_reply(
            "PAGE-THREE",
            json!({"listings": [{"title": "Mazda 3", "price": "$8,200"}]}),
            TokenUsage::new(1_000, 100),
        )
}

fn car_urls() -> Vec<&'static str> {
    vec![
        "https://cars.example.com/1",
        "https://cars.example.com/2",
        "https://cars.example.com/3",
    ]
}

#[tokio::test]
async fn test_failed_fetch_is_isolated() {
    let fetcher = car_pages().with_failure("https://cars.example.com/2", 503);
    let orchestrator = BatchOrchestrator::new(Arc::new(fetcher), Arc::new(car_backend()));
    let dir = tempfile::tempdir().unwrap();
    let csv_path = dir.path().join("all_sorted_data.csv");
    let json_path = dir.path().join("sorted_data.json");

    let mut sink = FanOutSink::new()
        .with_sink(CsvSink::new(&csv_path))
        .with_sink(JsonSink::new(&json_path));
    let request = BatchRequest::new(car_urls(), MODEL).with_fields(["title", "price"]);

    let report = orchestrator.run(&request, &mut sink).await.unwrap();
    let summary = report.summary();

    assert_eq!(report.status(), &BatchStatus::Completed);
    assert_eq!(summary.processed_count, 3);
    assert_eq!(summary.failed_count, 1);
    assert!(!summary.cancelled);
    assert_eq!(summary.input_tokens, 2_000);
    assert_eq!(summary.output_tokens, 200);
    assert!(summary.total_cost > 0.0);
    assert_eq!(report.state.failed_urls(), vec!["https://cars.example.com/2"]);

    let mut reader = csv::Reader::from_path(&csv_path).unwrap();
    assert_eq!(
        reader.headers().unwrap().iter().collect::<Vec<_>>(),
        vec!["URL", "title", "price"]
    );
    let rows: Vec<csv::StringRecord> = reader.records().map(Result::unwrap).collect();
    assert_eq!(rows.len(), 2);
    assert_eq!(&rows[0][0], "https://cars.example.com/1");
    assert_eq!(&rows[0][1], "Honda Civic");
    assert_eq!(&rows[1][0], "https://cars.example.com/3");

    let objects = read_rows(&json_path).unwrap();
    assert_eq!(objects.len(), 2);
    assert_eq!(objects[1]["title"], json!("Mazda 3"));
}

#[tokio::test]
async fn test_failed_extraction_is_isolated() {
    let backend = MockBackend::new()
        .with_failure("PAGE-TWO", MockFailure::Parse)
        .with_default_reply(json!({"listings": [{"title": "x"}]}), TokenUsage::new(1, 1));
    let orchestrator = BatchOrchestrator::new(Arc::new(car_pages()), Arc::new(backend));
    let mut sink = MemorySink::new();
    let request = BatchRequest::new(car_urls(), MODEL).with_fields(["title", "price"]);

    let report = orchestrator.run(&request, &mut sink).await.unwrap();
    assert_eq!(report.state.processed_count, 3);
    assert!(matches!(
        &report.state.outcomes[1],
        UrlOutcome::Failed { stage: UrlStage::Extracting, .. }
    ));
    assert_eq!(sink.groups().len(), 2);
    // Raw text is kept even when extraction fails
    assert_eq!(report.state.raw_texts.len(), 3);
}

#[tokio::test]
async fn test_unsupported_model_fails_before_fetching() {
    let fetcher = car_pages();
    let backend = car_backend().with_models([MODEL]);
    let orchestrator = BatchOrchestrator::new(Arc::new(fetcher.clone()), Arc::new(backend.clone()));
    let mut sink = MemorySink::new();
    let request = BatchRequest::new(car_urls(), "gpt-5-turbo").with_fields(["title"]);

    let err = orchestrator.run(&request, &mut sink).await.unwrap_err();

    assert!(matches!(
        err,
        ExtractionError::Config(ConfigError::UnsupportedModel { .. })
    ));
    assert_eq!(fetcher.call_count(), 0);
    assert_eq!(backend.call_count(), 0);
    assert!(sink.layout().is_none());
}

#[tokio::test]
async fn test_unpriced_model_fails_before_fetching() {
    let fetcher = car_pages();
    let orchestrator = BatchOrchestrator::new(Arc::new(fetcher.clone()), Arc::new(car_backend()));
    let mut sink = MemorySink::new();
    let request = BatchRequest::new(car_urls(), "unpriced-model").with_fields(["title"]);

    let err = orchestrator.run(&request, &mut sink).await.unwrap_err();

    assert!(matches!(
        err,
        ExtractionError::Config(ConfigError::MissingPricing { .. })
    ));
    assert_eq!(fetcher.call_count(), 0);
}

#[tokio::test]
async fn test_invalid_fields_fail_before_fetching() {
    let fetcher = car_pages();
    let orchestrator = BatchOrchestrator::new(Arc::new(fetcher.clone()), Arc::new(car_backend()));
    let mut sink = MemorySink::new();
    let request = BatchRequest::new(car_urls(), MODEL).with_fields(["title", "title"]);

    let err = orchestrator.run(&request, &mut sink).await.unwrap_err();

    assert!(matches!(
        err,
        ExtractionError::Config(ConfigError::DuplicateField { .. })
    ));
    assert_eq!(fetcher.call_count(), 0);
}

#[tokio::test]
async fn test_raw_only_mode_skips_backend() {
    let backend = car_backend();
    let orchestrator = BatchOrchestrator::new(Arc::new(car_pages()), Arc::new(backend.clone()));
    let mut sink = MemorySink::new();
    let request = BatchRequest::new(car_urls(), "any-model");

    let report = orchestrator.run(&request, &mut sink).await.unwrap();

    assert_eq!(backend.call_count(), 0);
    assert_eq!(report.summary().total_cost, 0.0);
    assert_eq!(
        sink.layout().unwrap().columns(),
        &["URL".to_string(), "Scraped_Content".to_string()]
    );
    assert_eq!(
        sink.rows()[1],
        vec![
            "https://cars.example.com/2".to_string(),
            "PAGE-TWO Toyota Corolla $7,500".to_string()
        ]
    );
    assert!(report
        .state
        .joined_raw_text()
        .contains("PAGE-ONE Honda Civic $9,000"));
}

#[tokio::test]
async fn test_pagination_without_links() {
    let backend = with_car_replies(MockBackend::new().with_reply(
        "Page URL: https://cars.example.com/1",
        json!({"page_urls": []}),
        TokenUsage::new(500, 10),
    ));
    let fetcher = car_pages();
    let orchestrator = BatchOrchestrator::new(Arc::new(fetcher.clone()), Arc::new(backend.clone()));
    let mut sink = MemorySink::new();
    let request = BatchRequest::new(car_urls(), MODEL)
        .with_fields(["title", "price"])
        .with_pagination(None);

    let report = orchestrator.run(&request, &mut sink).await.unwrap();
    let summary = report.summary();

    let pagination = summary.pagination.as_ref().unwrap();
    assert!(pagination.urls.is_empty());
    assert_eq!(pagination.usage, TokenUsage::new(500, 10));

    // Pagination usage counts toward the batch totals
    assert_eq!(summary.input_tokens, 3_500);
    assert_eq!(report.state.usage.input_tokens, 3_000);

    // The first page is fetched once and reused for extraction
    assert_eq!(fetcher.call_count(), 3);
    assert_eq!(backend.call_count(), 4);
    assert_eq!(sink.groups().len(), 3);
}

#[tokio::test]
async fn test_discovered_urls_are_merged() {
    let fetcher = MockFetcher::new()
        .with_page("https://cars.example.com/list", "PAGE-ONE first page")
        .with_page("https://cars.example.com/list?page=2", "PAGE-TWO second page");
    let backend = with_car_replies(MockBackend::new().with_reply(
        "Page URL: https://cars.example.com/list",
        json!({"page_urls": ["?page=2", "https://cars.example.com/list"]}),
        TokenUsage::new(10, 1),
    ));
    let orchestrator = BatchOrchestrator::new(Arc::new(fetcher.clone()), Arc::new(backend));
    let mut sink = MemorySink::new();
    let request = BatchRequest::new(["https://cars.example.com/list"], MODEL)
        .with_fields(["title"])
        .with_pagination(Some("numbered links at the bottom".to_string()))
        .merge_discovered_urls(true);

    let report = orchestrator.run(&request, &mut sink).await.unwrap();

    assert_eq!(
        report.state.urls,
        vec![
            "https://cars.example.com/list".to_string(),
            "https://cars.example.com/list?page=2".to_string()
        ]
    );
    assert_eq!(report.state.processed_count, 2);
    assert_eq!(report.state.failed_count(), 0);
    assert_eq!(
        fetcher.calls(),
        vec![
            "https://cars.example.com/list".to_string(),
            "https://cars.example.com/list?page=2".to_string()
        ]
    );
}

#[tokio::test]
async fn test_pagination_failure_does_not_stop_batch() {
    let backend = with_car_replies(MockBackend::new().with_failure("Page URL:", MockFailure::Parse));
    let orchestrator = BatchOrchestrator::new(Arc::new(car_pages()), Arc::new(backend));
    let mut sink = MemorySink::new();
    let request = BatchRequest::new(car_urls(), MODEL)
        .with_fields(["title"])
        .with_pagination(None);

    let report = orchestrator.run(&request, &mut sink).await.unwrap();

    assert!(report.state.pagination.is_none());
    assert_eq!(report.status(), &BatchStatus::Completed);
    assert_eq!(sink.groups().len(), 3);
}

#[tokio::test]
async fn test_concurrent_run_appends_in_input_order() {
    let fetcher = car_pages().with_delay(Duration::from_millis(10));
    let orchestrator = BatchOrchestrator::new(Arc::new(fetcher), Arc::new(car_backend()))
        .with_concurrency(3);
    let mut sink = MemorySink::new();
    let request = BatchRequest::new(car_urls(), MODEL).with_fields(["title"]);

    let report = orchestrator.run(&request, &mut sink).await.unwrap();

    let sources: Vec<&str> = sink.groups().iter().map(|g| g[0].source()).collect();
    assert_eq!(sources, car_urls());
    let outcome_urls: Vec<&str> = report.state.outcomes.iter().map(|o| o.url()).collect();
    assert_eq!(outcome_urls, car_urls());
}

#[tokio::test]
async fn test_cancel_before_start_processes_nothing() {
    let fetcher = car_pages();
    let orchestrator = BatchOrchestrator::new(Arc::new(fetcher.clone()), Arc::new(car_backend()));
    orchestrator.cancellation_token().cancel();
    let mut sink = MemorySink::new();
    let request = BatchRequest::new(car_urls(), MODEL).with_fields(["title"]);

    let report = orchestrator.run(&request, &mut sink).await.unwrap();

    assert_eq!(report.status(), &BatchStatus::Completed);
    assert!(report.summary().cancelled);
    assert_eq!(report.state.processed_count, 0);
    assert_eq!(fetcher.call_count(), 0);
}

#[tokio::test]
async fn test_cancel_between_urls() {
    let fetcher = car_pages().with_delay(Duration::from_millis(20));
    let orchestrator = BatchOrchestrator::new(Arc::new(fetcher), Arc::new(car_backend()));
    let token = orchestrator.cancellation_token();
    let mut progress = orchestrator.subscribe();

    let watcher = tokio::spawn(async move {
        while progress.changed().await.is_ok() {
            if progress.borrow().processed >= 1 {
                token.cancel();
                break;
            }
        }
    });

    let mut sink = MemorySink::new();
    let request = BatchRequest::new(car_urls(), MODEL).with_fields(["title"]);
    let report = orchestrator.run(&request, &mut sink).await.unwrap();
    watcher.await.unwrap();

    assert_eq!(report.status(), &BatchStatus::Completed);
    assert!(report.state.cancelled);
    assert_eq!(report.state.processed_count, 1);
    assert_eq!(sink.groups().len(), 1);
}

#[tokio::test]
async fn test_persist_failure_halts_and_keeps_state() {
    let orchestrator = BatchOrchestrator::new(Arc::new(car_pages()), Arc::new(car_backend()));
    let mut sink = FailingSink::new(1);
    let request = BatchRequest::new(car_urls(), MODEL).with_fields(["title", "price"]);

    let report = orchestrator.run(&request, &mut sink).await.unwrap();

    assert!(matches!(report.status(), BatchStatus::Halted { .. }));
    assert!(matches!(report.error, Some(ExtractionError::Persist(_))));
    assert_eq!(report.state.processed_count, 2);
    assert_eq!(report.state.records.len(), 1);
    assert!(matches!(
        &report.state.outcomes[1],
        UrlOutcome::Failed { stage: UrlStage::Persisting, .. }
    ));
    assert_eq!(sink.appended().len(), 1);
    assert!(report.into_result().is_err());
}

#[tokio::test]
async fn test_progress_reflects_final_state() {
    let fetcher = car_pages().with_failure("https://cars.example.com/3", 500);
    let orchestrator = BatchOrchestrator::new(Arc::new(fetcher), Arc::new(car_backend()));
    let progress = orchestrator.subscribe();
    let mut sink = MemorySink::new();
    let request = BatchRequest::new(car_urls(), MODEL).with_fields(["title"]);

    orchestrator.run(&request, &mut sink).await.unwrap();

    let last = progress.borrow().clone();
    assert_eq!(last.total, 3);
    assert_eq!(last.processed, 3);
    assert_eq!(last.failed, 1);
    assert_eq!(last.status, BatchStatus::Completed);
    assert_eq!(last.last_url.as_deref(), Some("https://cars.example.com/3"));
}

#[tokio::test]
async fn test_raw_only_with_pagination() {
    let backend = MockBackend::new().with_reply(
        "Page URL: https://cars.example.com/1",
        json!({"page_urls": ["https://cars.example.com/2", "/cars?page=9"]}),
        TokenUsage::new(400, 20),
    );
    let fetcher = car_pages();
    let orchestrator = BatchOrchestrator::new(Arc::new(fetcher.clone()), Arc::new(backend.clone()));
    let dir = tempfile::tempdir().unwrap();
    let csv_path = dir.path().join("all_sorted_data.csv");
    let mut sink = CsvSink::new(&csv_path);
    let request = BatchRequest::new(car_urls(), MODEL).with_pagination(None);

    let report = orchestrator.run(&request, &mut sink).await.unwrap();

    // Pagination ran on the first page's raw text, extraction never did
    assert_eq!(backend.call_count(), 1);
    assert!(backend.calls()[0].user.contains("PAGE-ONE Honda Civic"));
    assert_eq!(fetcher.call_count(), 3);
    let pagination = report.state.pagination.as_ref().unwrap();
    assert_eq!(
        pagination.urls,
        vec![
            "https://cars.example.com/2".to_string(),
            "https://cars.example.com/cars?page=9".to_string()
        ]
    );
    assert_eq!(report.summary().input_tokens, 400);
    assert!(report.summary().total_cost > 0.0);

    let mut reader = csv::Reader::from_path(&csv_path).unwrap();
    assert_eq!(
        reader.headers().unwrap().iter().collect::<Vec<_>>(),
        vec!["URL", "Scraped_Content"]
    );
    let rows: Vec<csv::StringRecord> = reader.records().map(Result::unwrap).collect();
    assert_eq!(rows.len(), 3);
    assert_eq!(&rows[0][0], "https://cars.example.com/1");
    assert_eq!(&rows[0][1], "PAGE-ONE Honda Civic $9,000");
}

#[tokio::test]
async fn test_rows_after_failed_fetch_keep_their_own_url() {
    let fetcher = car_pages()
        .with_page("https://cars.example.com/4", "PAGE-FOUR Ford Focus $6,100")
        .with_failure("https://cars.example.com/2", 404)
        .with_delay(Duration::from_millis(5));
    let backend = car_backend().with_reply(
        "PAGE-FOUR",
        json!({"listings": [{"title": "Ford Focus", "price": "$6,100"}]}),
        TokenUsage::new(1_000, 100),
    );
    let orchestrator =
        BatchOrchestrator::new(Arc::new(fetcher), Arc::new(backend)).with_concurrency(2);
    let dir = tempfile::tempdir().unwrap();
    let csv_path = dir.path().join("all_sorted_data.csv");
    let mut sink = CsvSink::new(&csv_path);
    let mut urls = car_urls();
    urls.push("https://cars.example.com/4");
    let request = BatchRequest::new(urls, MODEL).with_fields(["title", "price"]);

    let report = orchestrator.run(&request, &mut sink).await.unwrap();
    assert_eq!(report.state.failed_urls(), vec!["https://cars.example.com/2"]);

    let rows: Vec<(String, String)> = csv::Reader::from_path(&csv_path)
        .unwrap()
        .records()
        .map(|row| {
            let row = row.unwrap();
            (row[0].to_string(), row[1].to_string())
        })
        .collect();
    assert_eq!(
        rows,
        vec![
            ("https://cars.example.com/1".to_string(), "Honda Civic".to_string()),
            ("https://cars.example.com/3".to_string(), "Mazda 3".to_string()),
            ("https://cars.example.com/4".to_string(), "Ford Focus".to_string()),
        ]
    );
}

/// Read one HTTP request off `socket`, body included.
async fn read_request(socket: &mut TcpStream) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = socket.read(&mut chunk).await.unwrap_or(0);
        if n == 0 {
            return;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            let head = String::from_utf8_lossy(&buf[..end]).to_ascii_lowercase();
            let length = head
                .lines()
                .find_map(|line| line.strip_prefix("content-length:"))
                .and_then(|value| value.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buf.len() >= end + 4 + length {
                return;
            }
        }
    }
}

/// Answer every request on a local port with `body`. Returns the base URL.
async fn serve_json(body: serde_json::Value) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let body = body.to_string();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let body = body.clone();
            tokio::spawn(async move {
                read_request(&mut socket).await;
                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                socket.write_all(response.as_bytes()).await.ok();
                socket.shutdown().await.ok();
            });
        }
    });

    format!("http://{}", addr)
}

#[tokio::test]
async fn test_partial_provider_usage_is_completed_by_estimate() {
    let content = r#"{"listings": [{"title": "Honda Civic", "price": "$9,000"}]}"#;
    let base_url = serve_json(json!({
        "choices": [{"message": {"role": "assistant", "content": content}}],
        "usage": {"prompt_tokens": 1200}
    }))
    .await;
    let backend = OpenAIBackend::new(
        ModelEntry::new(MODEL, BackendKind::HostedCompletion, MODEL),
        &ApiKey::new("sk-test"),
    )
    .with_base_url(base_url);
    let orchestrator = BatchOrchestrator::new(Arc::new(car_pages()), Arc::new(backend));
    let mut sink = MemorySink::new();
    let request = BatchRequest::new(
        ["https://cars.example.com/1", "https://cars.example.com/3"],
        MODEL,
    )
    .with_fields(["title", "price"]);

    let report = orchestrator.run(&request, &mut sink).await.unwrap();
    let summary = report.summary();

    assert_eq!(report.state.failed_count(), 0, "{:?}", report.state.outcomes);
    let estimated_output = estimate_tokens(content, MODEL);
    assert!(estimated_output > 0);
    assert_eq!(summary.input_tokens, 2 * 1_200);
    assert_eq!(summary.output_tokens, 2 * estimated_output);

    let expected_cost = CostAccountant::default()
        .price(TokenUsage::new(2 * 1_200, 2 * estimated_output), MODEL)
        .unwrap();
    assert!((summary.total_cost - expected_cost).abs() < 1e-12);
    assert_eq!(sink.groups().len(), 2);
}
