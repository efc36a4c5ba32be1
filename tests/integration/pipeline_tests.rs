//! Integration tests for the scrape pipeline
//!
//! These tests use wiremock to serve a mock list site and run the whole
//! fetch, extract, cover and checkpoint cycle end-to-end.

use shelf_scrape::config::{resolve_config, ConfigOverrides, ScraperConfig};
use shelf_scrape::storage::{CsvStore, RecordStore};
use shelf_scrape::{Coordinator, RunPhase};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path, path_regex, query_param};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

const LIST_PATH: &str = "/list/show/1.Best_Books_Ever";

/// Creates a test configuration pointing at the mock server
fn create_test_config(base_url: &str, dir: &Path, end_page: u32) -> ScraperConfig {
    let mut config = ScraperConfig::default();
    config.list.base_url = base_url.to_string();
    config.list.end_page = end_page;
    config.covers.enabled = false;
    config.covers.directory = dir.join("covers");
    config.covers.delay = 0.0;
    config.network.delay_between_pages = 0.0;
    config.network.rate_limit_wait = 0.0;
    config.output.csv_path = Some(dir.join("dataset").join("books.csv"));
    config
}

/// Renders a list page with `count` books starting at `first_id`
fn list_page(first_id: u32, count: u32, has_next: bool) -> String {
    let rows: String = (0..count)
        .map(|i| {
            let id = first_id + i;
            format!(
                r##"<tr itemscope itemtype="http://schema.org/Book">
                     <td valign="top" class="number">{rank}</td>
                     <td><a href="/book/show/{id}-book"><img class="bookCover" src="/covers/{id}._SY75_.jpg"></a></td>
                     <td>
                       <a class="bookTitle" href="/book/show/{id}-book?from_list=1"><span itemprop="name">Book {id}</span></a>
                       <span class="by">by</span>
                       <a class="authorName" href="/author/show/{id}.Writer"><span itemprop="name">Writer {id}</span></a>
                       <span class="greyText smallText uitext"><span class="minirating">4.{rank}0 avg rating &mdash; 1,{id:03} ratings</span></span>
                       <span class="smallText uitext"><a href="#">score: 9,{id:03}</a></span>
                     </td>
                   </tr>"##,
                rank = i + 1,
                id = id
            )
        })
        .collect();

    let pager = if has_next {
        r#"<a class="next_page" rel="next" href="?page=next">next »</a>"#
    } else {
        r#"<span class="next_page disabled">next »</span>"#
    };

    format!(
        r#"<html><body><table class="tableList js-dataTooltip">{}</table><div class="pagination">{}</div></body></html>"#,
        rows, pager
    )
}

fn html(body: String) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .set_body_string(body)
        .insert_header("content-type", "text/html")
}

async fn mount_page(server: &MockServer, page: u32, body: String) {
    Mock::given(method("GET"))
        .and(path(LIST_PATH))
        .and(query_param("page", page.to_string().as_str()))
        .respond_with(html(body))
        .mount(server)
        .await;
}

async fn requests_for_page(server: &MockServer, page: u32) -> usize {
    let wanted = format!("page={}", page);
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.url.path() == LIST_PATH && r.url.query() == Some(wanted.as_str()))
        .count()
}

fn stored_pages(config: &ScraperConfig) -> BTreeSet<u32> {
    CsvStore::new(config.csv_path())
        .load()
        .expect("Failed to load output")
        .iter()
        .map(|r| r.page)
        .collect()
}

/// Responds with a page and cancels the run while doing so
struct CancelWhileServing {
    token: CancellationToken,
    body: String,
}

impl Respond for CancelWhileServing {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        self.token.cancel();
        html(self.body.clone())
    }
}

#[tokio::test]
async fn test_full_scrape_with_covers() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    mount_page(&server, 1, list_page(100, 4, true)).await;
    mount_page(&server, 2, list_page(200, 4, false)).await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/covers/\d+\.jpg$"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"\xFF\xD8\xFFimage".to_vec()))
        .mount(&server)
        .await;

    let mut config = create_test_config(&server.uri(), dir.path(), 5);
    config.covers.enabled = true;
    config.covers.max_per_page = 2;

    let mut coordinator = Coordinator::new(config.clone(), CancellationToken::new())
        .expect("Failed to create coordinator");
    let report = coordinator.run().await.expect("Run failed");

    assert_eq!(report.outcome, RunPhase::Completed);
    assert!(report.is_success());
    assert_eq!(report.records_total, 8);
    assert_eq!(report.counts.covers_downloaded, 4);
    assert_eq!(report.pages, Some((1, 2)));
    assert_eq!(requests_for_page(&server, 3).await, 0);

    let records = CsvStore::new(config.csv_path()).load().unwrap();
    let first = records.get("100").expect("Book 100 missing");
    assert_eq!(first.title, "Book 100");
    assert_eq!(first.author, "Writer 100");
    assert_eq!(first.average_rating, Some(4.1));
    assert_eq!(first.ratings_count, Some(1100));
    assert_eq!(first.list_score, Some(9100));
    assert_eq!(first.rank, 1);
    assert_eq!(first.cover_id.as_deref(), Some("100.jpg"));
    assert_eq!(
        first.cover_url.as_deref(),
        Some(format!("{}/covers/100.jpg", server.uri()).as_str())
    );

    // Quota of two per page: the last two books of each page have no cover
    assert!(records.get("102").unwrap().cover_id.is_none());
    assert!(records.get("201").unwrap().cover_id.is_some());
    assert!(records.get("203").unwrap().cover_id.is_none());

    let covers = dir.path().join("covers");
    for id in ["100", "101", "200", "201"] {
        assert!(covers.join(format!("{}.jpg", id)).exists(), "cover {} missing", id);
    }
    assert!(!covers.join("102.jpg").exists());

    let text = std::fs::read_to_string(config.csv_path()).unwrap();
    assert!(text.starts_with("book_id,title,author,average_rating,"));
    assert_eq!(text.lines().count(), 9);
}

#[tokio::test]
async fn test_rate_limit_cooldown_then_retry() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path(LIST_PATH))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_page(&server, 1, list_page(1, 3, false)).await;

    let mut config = create_test_config(&server.uri(), dir.path(), 1);
    config.network.rate_limit_wait = 0.05;

    let mut coordinator = Coordinator::new(config, CancellationToken::new()).unwrap();
    let report = coordinator.run().await.unwrap();

    assert_eq!(report.fetch.cooldowns, 1);
    assert_eq!(report.fetch.retries, 1);
    assert_eq!(requests_for_page(&server, 1).await, 2);
    assert_eq!(report.records_total, 3);
    assert_eq!(report.counts.pages_failed, 0);
}

/// Serves `body` on a raw socket, closing the first connection unanswered
async fn flaky_server(body: String) -> (String, Arc<AtomicUsize>) {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());
    let accepted = Arc::new(AtomicUsize::new(0));
    let counter = accepted.clone();

    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            let seen = counter.fetch_add(1, Ordering::SeqCst);
            let mut buf = [0u8; 4096];
            let _ = socket.read(&mut buf).await;
            if seen == 0 {
                continue;
            }
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.shutdown().await;
        }
    });

    (base_url, accepted)
}

#[tokio::test]
async fn test_dropped_connection_retried() {
    let dir = TempDir::new().unwrap();
    let (base_url, accepted) = flaky_server(list_page(1, 3, false)).await;

    let config = create_test_config(&base_url, dir.path(), 1);
    let mut coordinator = Coordinator::new(config.clone(), CancellationToken::new()).unwrap();
    let report = coordinator.run().await.unwrap();

    assert_eq!(accepted.load(Ordering::SeqCst), 2);
    assert_eq!(report.fetch.cooldowns, 1);
    assert_eq!(report.fetch.retries, 1);
    assert_eq!(report.counts.pages_failed, 0);
    assert_eq!(report.records_total, 3);
    assert_eq!(stored_pages(&config), BTreeSet::from([1]));
}

#[tokio::test]
async fn test_persistent_rate_limit_skips_page() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path(LIST_PATH))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;
    mount_page(&server, 2, list_page(20, 2, false)).await;

    let config = create_test_config(&server.uri(), dir.path(), 2);
    let mut coordinator = Coordinator::new(config.clone(), CancellationToken::new()).unwrap();
    let report = coordinator.run().await.unwrap();

    assert_eq!(requests_for_page(&server, 1).await, 3);
    assert_eq!(report.counts.pages_failed, 1);
    assert_eq!(stored_pages(&config), BTreeSet::from([2]));
}

#[tokio::test]
async fn test_interrupt_keeps_completed_pages() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let cancel = CancellationToken::new();

    mount_page(&server, 1, list_page(10, 3, true)).await;
    mount_page(&server, 2, list_page(20, 3, true)).await;
    Mock::given(method("GET"))
        .and(path(LIST_PATH))
        .and(query_param("page", "3"))
        .respond_with(CancelWhileServing {
            token: cancel.clone(),
            body: list_page(30, 3, true),
        })
        .mount(&server)
        .await;
    mount_page(&server, 4, list_page(40, 3, true)).await;
    mount_page(&server, 5, list_page(50, 3, false)).await;

    let config = create_test_config(&server.uri(), dir.path(), 5);
    let mut coordinator = Coordinator::new(config.clone(), cancel).unwrap();
    let report = coordinator.run().await.unwrap();

    assert_eq!(report.outcome, RunPhase::Interrupted);
    assert!(report.is_success());
    assert_eq!(report.counts.pages_completed, 2);
    assert_eq!(requests_for_page(&server, 4).await, 0);
    assert_eq!(stored_pages(&config), BTreeSet::from([1, 2]));

    // A second run picks up after the stored pages
    let mut resumed = Coordinator::new(config.clone(), CancellationToken::new()).unwrap();
    let report = resumed.run().await.unwrap();

    assert_eq!(report.outcome, RunPhase::Completed);
    assert_eq!(report.pages, Some((3, 5)));
    assert_eq!(requests_for_page(&server, 1).await, 1);
    assert_eq!(stored_pages(&config), BTreeSet::from([1, 2, 3, 4, 5]));
    assert_eq!(report.records_total, 15);
}

#[tokio::test]
async fn test_rerun_produces_identical_file() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    mount_page(&server, 1, list_page(1, 5, true)).await;
    mount_page(&server, 2, list_page(6, 5, false)).await;

    let mut config = create_test_config(&server.uri(), dir.path(), 2);
    config.list.resume_after_last_page = false;

    Coordinator::new(config.clone(), CancellationToken::new())
        .unwrap()
        .run()
        .await
        .unwrap();
    let first = std::fs::read_to_string(config.csv_path()).unwrap();

    let report = Coordinator::new(config.clone(), CancellationToken::new())
        .unwrap()
        .run()
        .await
        .unwrap();
    let second = std::fs::read_to_string(config.csv_path()).unwrap();

    assert_eq!(first, second);
    assert_eq!(report.counts.inserted, 0);
    assert_eq!(report.counts.updated, 0);
    assert_eq!(report.records_total, 10);
}

#[tokio::test]
async fn test_missing_page_skipped() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    mount_page(&server, 1, list_page(1, 2, true)).await;
    Mock::given(method("GET"))
        .and(path(LIST_PATH))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    mount_page(&server, 3, list_page(30, 2, false)).await;

    let config = create_test_config(&server.uri(), dir.path(), 3);
    let mut coordinator = Coordinator::new(config.clone(), CancellationToken::new()).unwrap();
    let report = coordinator.run().await.unwrap();

    assert_eq!(report.outcome, RunPhase::Completed);
    assert_eq!(report.counts.pages_failed, 1);
    assert_eq!(requests_for_page(&server, 2).await, 1);
    assert_eq!(stored_pages(&config), BTreeSet::from([1, 3]));
}

#[tokio::test]
async fn test_partial_page_drops_bad_row() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    let broken = list_page(1, 5, false).replacen(
        r#"<a class="bookTitle" href="/book/show/2-book?from_list=1"><span itemprop="name">Book 2</span></a>"#,
        "",
        1,
    );
    mount_page(&server, 1, broken).await;

    let config = create_test_config(&server.uri(), dir.path(), 1);
    let mut coordinator = Coordinator::new(config.clone(), CancellationToken::new()).unwrap();
    let report = coordinator.run().await.unwrap();

    assert_eq!(report.records_total, 4);
    assert_eq!(report.counts.records_dropped, 1);
    let records = CsvStore::new(config.csv_path()).load().unwrap();
    assert!(!records.contains("2"));
    assert_eq!(records.get("3").unwrap().rank, 3);
}

#[tokio::test]
async fn test_invalid_range_rejected_before_network() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    let overrides = ConfigOverrides {
        start_page: Some(5),
        end_page: Some(2),
        output: Some(dir.path().join("books.csv")),
        ..Default::default()
    };

    assert!(resolve_config(None, &overrides).is_err());
    assert!(server.received_requests().await.unwrap_or_default().is_empty());
    assert!(!dir.path().join("books.csv").exists());
}
