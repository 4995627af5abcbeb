//! Archive-replay crawls against a mock web archive

use crate::{create_test_config, Snapshot};
use reqwest::Client;
use sitesnap::config::CrawlMode;
use sitesnap::crawler::{latest_timestamp, run_crawl};
use sitesnap::SnapError;
use std::time::Duration;
use wiremock::matchers::{method, path, path_regex, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TS: &str = "20200101000000";

fn archive_config(archive: &MockServer) -> sitesnap::Config {
    let mut config = create_test_config(archive);
    config.crawler.start_url = "http://a.test/".to_string();
    config.crawler.mode = CrawlMode::Archive;
    config.archive.replay_base = format!("{}/web/", archive.uri());
    config.archive.index_url = format!("{}/cdx/search/cdx", archive.uri());
    config
}

async fn mount_index(archive: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/cdx/search/cdx"))
        .and(query_param("url", "a.test"))
        .and(query_param("output", "json"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            format!(
                r#"[["timestamp","original","statuscode"],
                ["20190101000000","http://a.test/","200"],
                ["{}","http://a.test/","200"]]"#,
                TS
            ),
            "application/json",
        ))
        .expect(1)
        .mount(archive)
        .await;
}

async fn mount_snapshot(archive: &MockServer) {
    Mock::given(method("GET"))
        .and(path_regex(format!(r"^/web/{}/http://a\.test/$", TS)))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            format!(
                r#"<html><head><title>Archived home</title></head><body>
                <div id="wm-ipp">archive toolbar</div>
                <a href="/web/{ts}/http://a.test/about/">About</a>
                <a href="{origin}/web/{ts}/http://a.test/fr/">Accueil</a>
                <img src="/web/{ts}im_/http://a.test/logo.png" alt="Logo">
                </body></html>"#,
                ts = TS,
                origin = archive.uri()
            ),
            "text/html",
        ))
        .expect(1)
        .mount(archive)
        .await;

    Mock::given(method("GET"))
        .and(path_regex(format!(r"^/web/{}/http://a\.test/about/$", TS)))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            "<html><head><title>About</title></head><body><a href=\"/\">Home</a></body></html>",
            "text/html",
        ))
        .expect(1)
        .mount(archive)
        .await;

    Mock::given(method("HEAD"))
        .and(path_regex(r"^/web/.*logo\.png$"))
        .respond_with(ResponseTemplate::new(200).insert_header("content-type", "image/png"))
        .mount(archive)
        .await;

    Mock::given(method("GET"))
        .and(path_regex(r"^/web/.*logo\.png$"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(vec![0x89, b'P', b'N', b'G'], "image/png"))
        .expect(1)
        .mount(archive)
        .await;
}

#[tokio::test]
async fn test_archive_crawl_maps_links_back_to_the_site() {
    let archive = MockServer::start().await;
    mount_index(&archive).await;
    mount_snapshot(&archive).await;

    let report = run_crawl(archive_config(&archive)).await.unwrap();
    assert_eq!(report.summary.pages_crawled, 2);
    assert_eq!(report.summary.snapshot_timestamp.as_deref(), Some(TS));

    let mut snapshot = Snapshot::open(report.archive);

    let pages = snapshot.table("pages.csv");
    let mut urls: Vec<&str> = pages.iter().map(|p| p["page_url"].as_str()).collect();
    urls.sort();
    assert_eq!(urls, vec!["http://a.test/", "http://a.test/about/"]);
    assert!(pages.iter().all(|p| p["snapshot_timestamp"] == TS));

    let links = snapshot.table("links.csv");
    assert!(links.iter().all(|l| !l["link_url"].contains("/web/")));
    assert!(links
        .iter()
        .any(|l| l["page_url"] == "http://a.test/" && l["link_url"] == "http://a.test/about/"));

    let home = snapshot.text("site/a.test/index.html");
    assert!(home.contains("Archived home"));
    assert!(!home.contains("wm-ipp"));
    assert!(!home.contains("<base"));

    let manifest = snapshot.table("manifest.csv");
    let mode = manifest.iter().find(|row| row["key"] == "mode").unwrap();
    assert_eq!(mode["value"], "archive");
    let ts = manifest
        .iter()
        .find(|row| row["key"] == "snapshot_timestamp")
        .unwrap();
    assert_eq!(ts["value"], TS);
}

#[tokio::test]
async fn test_given_timestamp_skips_the_index() {
    let archive = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/cdx/search/cdx"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&archive)
        .await;
    mount_snapshot(&archive).await;

    let mut config = archive_config(&archive);
    config.crawler.snapshot_timestamp = Some(TS.to_string());

    let report = run_crawl(config).await.unwrap();
    assert_eq!(report.summary.pages_crawled, 2);
}

#[tokio::test]
async fn test_empty_index_is_fatal() {
    let archive = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/cdx/search/cdx"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("[]", "application/json"))
        .mount(&archive)
        .await;

    let result = run_crawl(archive_config(&archive)).await;
    assert!(matches!(result, Err(SnapError::ArchiveIndex(_))));
}

#[tokio::test]
async fn test_latest_timestamp_takes_the_last_row() {
    let archive = MockServer::start().await;
    mount_index(&archive).await;

    let ts = latest_timestamp(
        &Client::new(),
        &format!("{}/cdx/search/cdx", archive.uri()),
        "a.test",
        Duration::from_secs(5),
    )
    .await
    .unwrap();
    assert_eq!(ts, TS);
}
