//! End-to-end crawls of a small mock site

use crate::{create_test_config, host_dir, Snapshot};
use sitesnap::crawler::run_crawl;
use sitesnap::SnapError;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn html(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body.to_string(), "text/html")
}

/// Mounts the five-page fixture
///
/// `/` links to four pages, a French page and an external host, and references a
/// stylesheet and two images. The inner pages link back home and reuse the stylesheet.
/// With a three-page ceiling, `/c/`, `/d/` and the French page are never fetched.
async fn mount_site(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(
            r#"<html lang="en"><head>
            <title>Home</title>
            <meta name="description" content="Mock home page">
            <link rel="stylesheet" href="/css/site.css">
            </head><body>
            <h1>Welcome</h1>
            <a href="/a">Page A</a>
            <a href="/b">Page B</a>
            <a href="/c">Page C</a>
            <a href="/d">Page D</a>
            <a href="/fr/">Accueil</a>
            <a href="https://other.test/x">Elsewhere</a>
            <img src="/img/logo.png" alt="Logo">
            <img src="/img/missing.png">
            </body></html>"#,
        ))
        .expect(1)
        .mount(server)
        .await;

    for page in ["a", "b"] {
        Mock::given(method("GET"))
            .and(path(format!("/{}/", page)))
            .respond_with(html(&format!(
                r#"<html><head><title>Page {page}</title>
                <link rel="stylesheet" href="/css/site.css"></head>
                <body><a href="/">Home</a><a href="/c/">C</a></body></html>"#
            )))
            .expect(1)
            .mount(server)
            .await;
    }

    for page in ["c", "d", "fr"] {
        Mock::given(method("GET"))
            .and(path(format!("/{}/", page)))
            .respond_with(html("<html><body>unreachable</body></html>"))
            .expect(0)
            .mount(server)
            .await;
    }

    Mock::given(method("GET"))
        .and(path("/css/site.css"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw("body { background: url(../img/bg.png) }", "text/css"),
        )
        .expect(1)
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/img/bg.png"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(vec![0x89, b'P', b'N', b'G'], "image/png"))
        .expect(1)
        .mount(server)
        .await;

    Mock::given(method("HEAD"))
        .and(path("/img/logo.png"))
        .respond_with(ResponseTemplate::new(200).insert_header("content-type", "image/png"))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/img/logo.png"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(vec![0x89, b'P', b'N', b'G'], "image/png"))
        .mount(server)
        .await;

    Mock::given(method("HEAD"))
        .and(path("/img/missing.png"))
        .respond_with(ResponseTemplate::new(404))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_crawl_respects_page_ceiling() {
    let server = MockServer::start().await;
    mount_site(&server).await;

    let mut config = create_test_config(&server);
    config.crawler.max_pages = 3;

    let report = run_crawl(config).await.unwrap();
    assert_eq!(report.summary.pages_crawled, 3);
    assert_eq!(report.summary.pages_dropped, 0);

    let mut snapshot = Snapshot::open(report.archive);
    let pages = snapshot.table("pages.csv");
    assert_eq!(pages.len(), 3);

    let mut urls: Vec<String> = pages.iter().map(|p| p["page_url"].clone()).collect();
    urls.sort();
    let root = server.uri();
    assert_eq!(
        urls,
        vec![
            format!("{}/", root),
            format!("{}/a/", root),
            format!("{}/b/", root),
        ]
    );

    let home = pages
        .iter()
        .find(|p| p["page_url"] == format!("{}/", root))
        .unwrap();
    assert_eq!(home["page_title"], "Home");
    assert_eq!(home["meta_description"], "Mock home page");
    assert_eq!(home["h1"], "Welcome");
    assert_eq!(home["is_homepage"], "yes");
    assert_eq!(home["status_code"], "200");

    // no drops, so no failures table
    assert!(!snapshot.contains("failures.csv"));
}

#[tokio::test]
async fn test_links_table_skips_non_english_links() {
    let server = MockServer::start().await;
    mount_site(&server).await;

    let mut config = create_test_config(&server);
    config.crawler.max_pages = 3;

    let report = run_crawl(config).await.unwrap();
    let mut snapshot = Snapshot::open(report.archive);
    let links = snapshot.table("links.csv");

    let home = format!("{}/", server.uri());
    let from_home: Vec<&str> = links
        .iter()
        .filter(|l| l["page_url"] == home)
        .map(|l| l["link_url"].as_str())
        .collect();

    assert!(from_home.contains(&"https://other.test/x"));
    // links are recorded as written, not in their normalized frontier form
    assert!(from_home.contains(&format!("{}/d", server.uri()).as_str()));
    assert!(!from_home.iter().any(|l| l.contains("/fr/")));
    assert_eq!(from_home.len(), 5);

    let external = links
        .iter()
        .find(|l| l["link_url"] == "https://other.test/x")
        .unwrap();
    assert_eq!(external["link_text"], "Elsewhere");
}

#[tokio::test]
async fn test_image_rows_carry_probe_results() {
    let server = MockServer::start().await;
    mount_site(&server).await;

    let mut config = create_test_config(&server);
    config.crawler.max_pages = 3;

    let report = run_crawl(config).await.unwrap();
    assert_eq!(report.summary.images_broken, 1);

    let mut snapshot = Snapshot::open(report.archive);
    let images = snapshot.table("images.csv");
    assert_eq!(images.len(), 2);

    let missing = images
        .iter()
        .find(|i| i["image_url"].ends_with("/img/missing.png"))
        .unwrap();
    assert_eq!(missing["status_code"], "404");
    assert_eq!(missing["is_broken"], "yes");
    assert_eq!(missing["alt_text"], "");

    let logo = images
        .iter()
        .find(|i| i["image_url"].ends_with("/img/logo.png"))
        .unwrap();
    assert_eq!(logo["status_code"], "200");
    assert_eq!(logo["content_type"], "image/png");
    assert_eq!(logo["is_broken"], "");
    assert_eq!(logo["alt_text"], "Logo");
}

#[tokio::test]
async fn test_mirror_rewrites_pages_and_stylesheets() {
    let server = MockServer::start().await;
    mount_site(&server).await;

    let mut config = create_test_config(&server);
    config.crawler.max_pages = 3;

    let report = run_crawl(config).await.unwrap();
    let host = host_dir(&server);
    let mut snapshot = Snapshot::open(report.archive);

    let css = snapshot.text(&format!("site/_assets/css/{}/css/site.css", host));
    assert_eq!(
        css,
        format!("body {{ background: url(../../../img/{}/img/bg.png) }}", host)
    );
    assert!(snapshot.contains(&format!("site/_assets/img/{}/img/bg.png", host)));

    let home = snapshot.text(&format!("site/{}/index.html", host));
    assert!(home.contains(&format!(r#"href="../_assets/css/{}/css/site.css""#, host)));
    assert!(home.contains(&format!(r#"src="../_assets/img/{}/img/logo.png""#, host)));

    let page_a = snapshot.text(&format!("site/{}/a/index.html", host));
    assert!(page_a.contains(&format!(r#"href="../../_assets/css/{}/css/site.css""#, host)));

    // the stylesheet is shared by three pages but listed once
    let assets = snapshot.table("assets.csv");
    let css_rows = assets
        .iter()
        .filter(|a| a["asset_url"].ends_with("/css/site.css"))
        .count();
    assert_eq!(css_rows, 1);

    let missing = assets
        .iter()
        .find(|a| a["asset_url"].ends_with("/img/missing.png"))
        .unwrap();
    assert_eq!(missing["status_code"], "404");
    assert_eq!(missing["local_path"], "");
}

#[tokio::test]
async fn test_manifest_describes_the_run() {
    let server = MockServer::start().await;
    mount_site(&server).await;

    let mut config = create_test_config(&server);
    config.crawler.max_pages = 3;

    let report = run_crawl(config).await.unwrap();
    let mut snapshot = Snapshot::open(report.archive);
    let manifest = snapshot.table("manifest.csv");

    let value = |key: &str| {
        manifest
            .iter()
            .find(|row| row["key"] == key)
            .map(|row| row["value"].clone())
            .unwrap()
    };
    assert_eq!(value("mode"), "live");
    assert_eq!(value("start_url"), format!("{}/", server.uri()));
    assert_eq!(value("snapshot_timestamp"), "");
    assert_eq!(value("pages_crawled"), "3");
    assert!(!value("started_at").is_empty());
    assert!(!value("finished_at").is_empty());
}

#[tokio::test]
async fn test_robots_disallow_is_respected() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /private/"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(
            r#"<html><body><a href="/private/">Secret</a><a href="/public/">Open</a></body></html>"#,
        ))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/public/"))
        .respond_with(html("<html><body>open</body></html>"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/private/"))
        .respond_with(html("<html><body>secret</body></html>"))
        .expect(0)
        .mount(&server)
        .await;

    let report = run_crawl(create_test_config(&server)).await.unwrap();
    assert_eq!(report.summary.pages_crawled, 2);
}

#[tokio::test]
async fn test_dropped_pages_are_listed_in_failures() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(r#"<html><body><a href="/busy/">Busy</a></body></html>"#))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/busy/"))
        .respond_with(ResponseTemplate::new(503))
        .expect(2)
        .mount(&server)
        .await;

    let report = run_crawl(create_test_config(&server)).await.unwrap();
    assert_eq!(report.summary.pages_crawled, 1);
    assert_eq!(report.summary.pages_dropped, 1);

    let mut snapshot = Snapshot::open(report.archive);
    let failures = snapshot.table("failures.csv");
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0]["url"], format!("{}/busy/", server.uri()));
    assert_eq!(failures[0]["reason"], "503 after retries");
}

#[tokio::test]
async fn test_non_english_seed_fails_the_run() {
    let server = MockServer::start().await;
    let mut config = create_test_config(&server);
    config.crawler.start_url = format!("{}/de/", server.uri());

    let result = run_crawl(config).await;
    assert!(matches!(result, Err(SnapError::LanguageGate { .. })));
}

#[tokio::test]
async fn test_mirror_disabled_still_saves_pages() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(
            r#"<html><head><link rel="stylesheet" href="/css/site.css"></head><body>hi</body></html>"#,
        ))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/css/site.css"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("p{}", "text/css"))
        .expect(0)
        .mount(&server)
        .await;

    let mut config = create_test_config(&server);
    config.mirror.enabled = false;

    let report = run_crawl(config).await.unwrap();
    let host = host_dir(&server);
    let mut snapshot = Snapshot::open(report.archive);
    let home = snapshot.text(&format!("site/{}/index.html", host));
    assert!(home.contains(r#"href="/css/site.css""#));
    assert!(snapshot.table("assets.csv").is_empty());
}
