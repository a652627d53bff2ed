//! Integration tests for the crawler
//!
//! These tests run the full crawl against a wiremock search server and an
//! on-disk SQLite database.

use chrono::NaiveDate;
use std::path::Path;
use std::sync::Arc;
use sumi_sieve::config::{
    Config, CrawlerConfig, ExtractionConfig, MediaFilter, OutputConfig, PostType, SearchConfig,
    SessionConfig,
};
use sumi_sieve::crawler::{check_session, run_crawl};
use sumi_sieve::storage::{RunStatus, SqliteStorage, Storage};
use sumi_sieve::RegionTable;
use tempfile::TempDir;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TWO_DAYS: &str = "custom:2025-02-01-0:2025-02-03-0";
const DAY_ONE: &str = "custom:2025-02-01-0:2025-02-02-0";
const DAY_TWO: &str = "custom:2025-02-02-0:2025-02-03-0";

/// Creates a test configuration crawling one keyword over two days
fn create_test_config(base_url: &str, db_path: &Path) -> Config {
    Config {
        search: SearchConfig {
            keywords: vec!["春节".to_string()],
            keywords_file: None,
            post_type: PostType::All,
            media_filter: MediaFilter::None,
            regions: vec!["all".to_string()],
            start_date: NaiveDate::from_ymd_opt(2025, 2, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2025, 2, 2).unwrap(),
            further_threshold: 46,
        },
        crawler: CrawlerConfig {
            base_url: base_url.to_string(),
            request_delay: 0,
            max_attempts: 1,
            ..CrawlerConfig::default()
        },
        session: SessionConfig {
            user_agent: "TestBrowser/1.0".to_string(),
            accept_language: "zh-CN".to_string(),
            cookie: "SUB=test".to_string(),
        },
        extraction: ExtractionConfig::default(),
        output: OutputConfig {
            database_path: db_path.to_string_lossy().into_owned(),
            csv_dir: db_path.with_file_name("csv").to_string_lossy().into_owned(),
        },
    }
}

fn regions() -> Arc<RegionTable> {
    Arc::new(RegionTable::builtin().unwrap())
}

fn entry(mid: &str, text: &str) -> String {
    format!(
        r#"<div class="card-wrap" mid="{mid}"><div class="card"><div class="card-feed">
<div class="avator"><a href="//weibo.com/7"><svg id="woo_svg_vyellow"></svg></a></div>
<div class="content">
  <div class="info"><div><a href="//weibo.com/7?refer_flag=1" class="name" nick-name="用户七">用户七</a></div></div>
  <p class="txt" node-type="feed_list_content">  {text}</p>
  <div class="from"><a href="//weibo.com/7/B{mid}?refer_flag=1">2025年02月01日 08:30</a><a>微博网页版</a></div>
</div></div>
<div class="card-act"><ul>
  <li><a action-type="feed_list_forward">转发</a></li>
  <li><a action-type="feed_list_comment">评论 4</a></li>
  <li><a action-type="feed_list_like"><span class="woo-like-count">1.2万</span></a></li>
</ul></div></div></div>"#
    )
}

fn result_page(entries: &[String], pagination_links: usize, next: Option<&str>) -> String {
    let pages: String = (1..=pagination_links)
        .map(|n| format!(r#"<li><a href="/weibo?page={n}">第{n}页</a></li>"#))
        .collect();
    let next = next
        .map(|href| format!(r#"<a class="next" href="{href}">下一页</a>"#))
        .unwrap_or_default();
    format!(
        r#"<html><body><div id="pl_feedlist_index">{}</div>
<div class="m-page"><ul class="s-scroll">{}</ul>{}</div></body></html>"#,
        entries.concat(),
        pages,
        next
    )
}

fn no_result_page() -> String {
    r#"<html><body><div id="pl_feedlist_index"><div class="card card-no-result"><p>抱歉，未找到相关结果。</p></div></div></body></html>"#
        .to_string()
}

async fn mount_page(server: &MockServer, params: &[(&str, &str)], body: String) {
    let mut mock = Mock::given(method("GET")).and(path("/weibo"));
    for (key, value) in params {
        mock = mock.and(query_param(*key, *value));
    }
    mock.respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

fn latest_run(db_path: &Path) -> sumi_sieve::storage::RunRecord {
    let storage = SqliteStorage::new(db_path).unwrap();
    storage.get_latest_run().unwrap().expect("a run was recorded")
}

#[tokio::test]
async fn test_walks_scope_below_threshold() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("posts.db");

    mount_page(
        &server,
        &[("timescope", TWO_DAYS), ("page", "1")],
        result_page(
            &[entry("100", "第一条"), entry("101", "第二条")],
            2,
            Some("/weibo?q=%E6%98%A5%E8%8A%82&page=2"),
        ),
    )
    .await;
    mount_page(
        &server,
        &[("page", "2")],
        result_page(&[entry("102", "第三条")], 2, None),
    )
    .await;

    let config = create_test_config(&server.uri(), &db_path);
    let counters = run_crawl(&config, "hash", regions()).await.unwrap();

    assert_eq!(counters.leaves, 1);
    assert_eq!(counters.pages_walked, 2);
    assert_eq!(counters.posts_emitted, 3);

    let storage = SqliteStorage::new(&db_path).unwrap();
    assert_eq!(storage.count_posts().unwrap(), 3);

    let post = storage.get_post("101").unwrap().unwrap();
    assert_eq!(post.bid, "B101");
    assert_eq!(post.author_id, "7");
    assert_eq!(post.author_name, "用户七");
    assert_eq!(post.text, "第二条");
    assert_eq!(post.like_count, 12_000);
    assert_eq!(post.comment_count, 4);
    assert_eq!(post.repost_count, 0);
    assert_eq!(storage.get_post_keywords("101").unwrap(), vec!["春节"]);

    let run = latest_run(&db_path);
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.config_hash, "hash");
}

#[tokio::test]
async fn test_splits_oversized_scope_by_day() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("posts.db");

    mount_page(
        &server,
        &[("timescope", TWO_DAYS)],
        result_page(&[entry("1", "太多了")], 50, Some("/weibo?page=2")),
    )
    .await;
    mount_page(
        &server,
        &[("timescope", DAY_ONE)],
        result_page(&[entry("10", "第一天")], 3, None),
    )
    .await;
    mount_page(
        &server,
        &[("timescope", DAY_TWO)],
        result_page(&[entry("20", "第二天"), entry("21", "第二天")], 3, None),
    )
    .await;

    let config = create_test_config(&server.uri(), &db_path);
    let counters = run_crawl(&config, "hash", regions()).await.unwrap();

    assert_eq!(counters.time_splits, 1);
    assert_eq!(counters.leaves, 2);
    assert_eq!(counters.posts_emitted, 3);

    let storage = SqliteStorage::new(&db_path).unwrap();
    assert!(storage.get_post("1").unwrap().is_none());
    assert!(storage.get_post("10").unwrap().is_some());
    assert_eq!(storage.count_leaves().unwrap(), (2, 0));
}

#[tokio::test]
async fn test_empty_result_completes_without_posts() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("posts.db");

    mount_page(&server, &[], no_result_page()).await;

    let config = create_test_config(&server.uri(), &db_path);
    let counters = run_crawl(&config, "hash", regions()).await.unwrap();

    assert_eq!(counters.empty_scopes, 1);
    assert_eq!(counters.posts_emitted, 0);
    assert_eq!(latest_run(&db_path).status, RunStatus::Completed);
}

#[tokio::test]
async fn test_rejected_session_fails_before_crawling() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("posts.db");

    mount_page(
        &server,
        &[],
        r#"<html><head><title>Sina Visitor System</title></head><body></body></html>"#.to_string(),
    )
    .await;

    let config = create_test_config(&server.uri(), &db_path);
    let err = run_crawl(&config, "hash", regions()).await.unwrap_err();
    assert!(err.is_session_failure());

    let run = latest_run(&db_path);
    assert_eq!(run.status, RunStatus::Failed);
    assert!(run.error_message.is_some());
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_rerun_stores_nothing_twice() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("posts.db");

    mount_page(
        &server,
        &[("page", "1")],
        result_page(&[entry("1", "甲"), entry("2", "乙")], 1, None),
    )
    .await;

    let config = create_test_config(&server.uri(), &db_path);
    let first = run_crawl(&config, "hash", regions()).await.unwrap();
    let second = run_crawl(&config, "hash", regions()).await.unwrap();

    assert_eq!(first.posts_emitted, 2);
    assert_eq!(second.posts_emitted, 0);
    assert_eq!(second.duplicates, 2);

    let storage = SqliteStorage::new(&db_path).unwrap();
    assert_eq!(storage.count_posts().unwrap(), 2);
    assert_eq!(storage.get_post_keywords("1").unwrap(), vec!["春节"]);
}

#[tokio::test]
async fn test_check_session_sends_cookie() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/weibo"))
        .and(header("cookie", "SUB=test"))
        .and(header("user-agent", "TestBrowser/1.0"))
        .respond_with(ResponseTemplate::new(200).set_body_string(result_page(
            &[entry("1", "甲")],
            1,
            None,
        )))
        .mount(&server)
        .await;

    let config = create_test_config(&server.uri(), &dir.path().join("posts.db"));
    let page = check_session(&config, &regions()).await.unwrap();

    assert_eq!(page.entries().len(), 1);
    assert!(!dir.path().join("posts.db").exists());
}

#[tokio::test]
async fn test_crawled_posts_export_to_keyword_csv() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("posts.db");

    mount_page(
        &server,
        &[("page", "1")],
        result_page(&[entry("1", "甲"), entry("2", "乙")], 1, None),
    )
    .await;

    let config = create_test_config(&server.uri(), &db_path);
    run_crawl(&config, "hash", regions()).await.unwrap();

    let storage = SqliteStorage::new(&db_path).unwrap();
    let csv_dir = Path::new(&config.output.csv_dir);
    let paths = sumi_sieve::output::export_csv(&storage, csv_dir).unwrap();
    assert_eq!(paths, vec![csv_dir.join("春节").join("春节.csv")]);

    let content = std::fs::read_to_string(&paths[0]).unwrap();
    let mut lines = content.trim_start_matches('\u{feff}').lines();
    assert!(lines.next().unwrap().starts_with("id,bid,user_id,用户昵称,微博正文"));
    assert!(lines.next().unwrap().starts_with("1,B1,7,用户七,甲,"));
    assert!(lines.next().unwrap().starts_with("2,B2,7,用户七,乙,"));
    assert!(lines.next().is_none());
}
