//! Search API export: page through results into one CSV file

use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::NaiveDateTime;
use indicatif::ProgressBar;
use powertrack_core::{CancelToken, CsvSink, RowCodec};
use reqwest::Method;
use serde_json::{Value, json};

use crate::client::PowerTrack;
use crate::query::{format_date, geo_rule};

/// Largest page the provider returns
pub const MAX_RESULTS: u32 = 500;

/// Outcome of a paged search export
#[derive(Debug, Clone, Default)]
pub struct SearchSummary {
    pub pages: u64,
    pub results: u64,
    pub rows_written: u64,
    /// Paging stopped early (provider error or cancellation)
    pub interrupted: bool,
}

/// One search query over a time window
#[derive(Debug, Clone)]
pub struct SearchJob {
    pub title: String,
    pub from: NaiveDateTime,
    pub to: NaiveDateTime,
    /// Full query, geo filter included
    pub query: String,
}

impl SearchJob {
    /// Build a job for `rule`, restricted to located tweets
    pub fn new(title: &str, from: NaiveDateTime, to: NaiveDateTime, rule: &str) -> Self {
        Self {
            title: title.to_string(),
            from,
            to,
            query: geo_rule(rule),
        }
    }

    pub fn output_path(&self, folder: &Path) -> PathBuf {
        folder.join(format!("{}.csv", self.title))
    }

    /// Request body for one page
    pub fn request_body(&self, next: Option<&str>) -> Value {
        let mut body = json!({
            "publisher": "twitter",
            "fromDate": format_date(&self.from),
            "toDate": format_date(&self.to),
            "query": self.query,
            "maxResults": MAX_RESULTS,
        });
        if let Some(next) = next {
            body["next"] = Value::String(next.to_string());
        }
        body
    }

    /// Follow `next` tokens until exhausted, writing rows to `<folder>/<title>.csv`.
    ///
    /// A provider error response stops paging; rows written so far are kept.
    pub fn export(
        &self,
        pt: &PowerTrack,
        codec: &dyn RowCodec,
        folder: &Path,
        append: bool,
        progress: &ProgressBar,
        cancel: &CancelToken,
    ) -> anyhow::Result<SearchSummary> {
        let url = pt.search_url(&format!("search/{}.json", pt.config().label))?;
        let output = self.output_path(folder);
        log::info!("Building CSV file {}", output.display());

        let mut sink = CsvSink::open(&output, &codec.header(), append)
            .with_context(|| format!("Cannot open {}", output.display()))?;
        let mut summary = SearchSummary::default();
        let mut next: Option<String> = None;

        loop {
            if cancel.is_cancelled() {
                log::warn!("Search cancelled after {} pages", summary.pages);
                summary.interrupted = true;
                break;
            }
            let resp = pt.request(Method::POST, &url, Some(&self.request_body(next.as_deref())))?;
            if !resp.is_success() {
                log::error!("{}", resp.error_message());
                summary.interrupted = true;
                break;
            }

            let page = write_page(&resp.body, codec, &mut sink)
                .with_context(|| format!("Cannot write {}", output.display()))?;
            summary.pages += 1;
            summary.results += page.results;
            summary.rows_written += page.rows;
            progress.set_message(format!(
                "{} pages, {} rows",
                summary.pages, summary.rows_written
            ));
            log::debug!(
                "page {}: {} results, {} rows",
                summary.pages,
                page.results,
                page.rows
            );

            next = resp.body.get("next").and_then(Value::as_str).map(String::from);
            if next.is_none() {
                break;
            }
        }

        sink.finish()
            .with_context(|| format!("Cannot flush {}", output.display()))?;
        Ok(summary)
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
struct PageCounts {
    results: u64,
    rows: u64,
}

/// Write every accepted result of one response page
fn write_page(page: &Value, codec: &dyn RowCodec, sink: &mut CsvSink) -> std::io::Result<PageCounts> {
    let mut counts = PageCounts::default();
    let Some(results) = page.get("results").and_then(Value::as_array) else {
        return Ok(counts);
    };
    for tweet in results {
        counts.results += 1;
        if let Some(row) = codec.to_row(tweet) {
            sink.write_row(&row)?;
            counts.rows += 1;
        }
    }
    Ok(counts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::ActivityCodec;
    use crate::query::parse_date;

    fn job() -> SearchJob {
        SearchJob::new(
            "madrid",
            parse_date("2015-03-01").unwrap(),
            parse_date("2015-03-02").unwrap(),
            "#madrid",
        )
    }

    #[test]
    fn first_page_body() {
        let body = job().request_body(None);
        assert_eq!(body["publisher"], "twitter");
        assert_eq!(body["fromDate"], "201503010000");
        assert_eq!(body["toDate"], "201503020000");
        assert_eq!(body["query"], "(#madrid) (has:geo OR has:profile_geo)");
        assert_eq!(body["maxResults"], 500);
        assert!(body.get("next").is_none());
    }

    #[test]
    fn next_page_body_carries_token() {
        let body = job().request_body(Some("eyJhIjoxfQ"));
        assert_eq!(body["next"], "eyJhIjoxfQ");
    }

    #[test]
    fn page_rows_written_and_skips_counted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("madrid.csv");
        let codec = ActivityCodec::with_columns(&["id", "the_geom"]).unwrap();
        let mut sink = CsvSink::open(&path, &codec.header(), false).unwrap();

        let page = json!({
            "results": [
                {"id": "1", "geo": {"type": "Point", "coordinates": [40.4, -3.7]}},
                {"id": "2"},
                {"id": "3", "gnip": {"profileLocations": [{"geo": {"type": "point", "coordinates": [2.1, 41.4]}}]}}
            ],
            "next": "abc"
        });
        let counts = write_page(&page, &codec, &mut sink).unwrap();
        assert_eq!(counts, PageCounts { results: 3, rows: 2 });
        sink.finish().unwrap();

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let ids: Vec<String> = reader
            .records()
            .map(|r| r.unwrap()[0].to_string())
            .collect();
        assert_eq!(ids, vec!["1", "3"]);
    }

    #[test]
    fn page_without_results() {
        let dir = tempfile::tempdir().unwrap();
        let codec = ActivityCodec::new();
        let mut sink = CsvSink::open(&dir.path().join("x.csv"), &codec.header(), false).unwrap();
        let counts = write_page(&json!({"next": null}), &codec, &mut sink).unwrap();
        assert_eq!(counts, PageCounts::default());
    }

    #[test]
    fn output_named_after_title() {
        assert_eq!(
            job().output_path(Path::new("out")),
            PathBuf::from("out/madrid.csv")
        );
    }
}
