//! Integration tests for Sitesnap
//!
//! Every test stands up wiremock servers in place of the crawled site (and the web
//! archive) and inspects the produced zip archive.

mod archive_tests;
mod crawl_tests;
mod fetch_tests;

use sitesnap::config::Config;
use std::collections::HashMap;
use std::io::{Cursor, Read};
use wiremock::MockServer;

/// A configuration pointed at `server`, with budgets fast enough for tests
pub fn create_test_config(server: &MockServer) -> Config {
    let mut config = Config::for_url(format!("{}/", server.uri()));
    config.crawler.concurrency = 2;
    config.rates.page_rps = 200.0;
    config.rates.image_rps = 200.0;
    config.rates.asset_rps = 200.0;
    config.rates.archive_page_rps = 200.0;
    config.rates.archive_image_rps = 200.0;
    config.rates.archive_asset_rps = 200.0;
    config.retry.max_retries = 2;
    config.retry.backoff_unit_ms = 10;
    config.retry.jitter_ms = 0;
    config
}

/// Host directory the mirror uses for `server`
pub fn host_dir(server: &MockServer) -> String {
    let url = url::Url::parse(&server.uri()).unwrap();
    sitesnap::mirror::host_dir(&url)
}

/// Read access to a produced archive
pub struct Snapshot {
    archive: zip::ZipArchive<Cursor<Vec<u8>>>,
}

impl Snapshot {
    pub fn open(bytes: Vec<u8>) -> Self {
        Self {
            archive: zip::ZipArchive::new(Cursor::new(bytes)).unwrap(),
        }
    }

    pub fn contains(&mut self, name: &str) -> bool {
        self.archive.by_name(name).is_ok()
    }

    pub fn text(&mut self, name: &str) -> String {
        let mut file = self
            .archive
            .by_name(name)
            .unwrap_or_else(|_| panic!("{} missing from archive", name));
        let mut text = String::new();
        file.read_to_string(&mut text).unwrap();
        text
    }

    /// Rows of a CSV table keyed by column name
    pub fn table(&mut self, name: &str) -> Vec<HashMap<String, String>> {
        let text = self.text(name);
        let mut reader = csv::Reader::from_reader(text.as_bytes());
        let headers = reader.headers().unwrap().clone();
        reader
            .records()
            .map(|record| {
                let record = record.unwrap();
                headers
                    .iter()
                    .zip(record.iter())
                    .map(|(h, v)| (h.to_string(), v.to_string()))
                    .collect()
            })
            .collect()
    }
}
