//! Historical PowerTrack jobs: create, quote, accept/reject, export

use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::NaiveDateTime;
use powertrack_core::{CancelToken, Pipeline, Summary};
use serde::{Deserialize, Deserializer};
use serde_json::{Value, json};

use crate::client::PowerTrack;
use crate::query::{GNIP_DATE_FORMAT, format_date, geo_rule};

const ISO_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Relative path of a job's status document
pub fn job_path(uuid: &str) -> String {
    format!("publishers/twitter/historical/track/jobs/{uuid}.json")
}

/// One historical job as reported by the provider
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Job {
    pub title: Option<String>,
    pub account: Option<String>,
    pub publisher: Option<String>,
    pub stream_type: Option<String>,
    pub format: Option<String>,
    #[serde(deserialize_with = "compact_date")]
    pub from_date: Option<NaiveDateTime>,
    #[serde(deserialize_with = "compact_date")]
    pub to_date: Option<NaiveDateTime>,
    pub requested_by: Option<String>,
    #[serde(deserialize_with = "iso_date")]
    pub requested_at: Option<NaiveDateTime>,
    pub accepted_by: Option<String>,
    #[serde(deserialize_with = "iso_date")]
    pub accepted_at: Option<NaiveDateTime>,
    #[serde(deserialize_with = "iso_date")]
    pub expires_at: Option<NaiveDateTime>,
    pub status: Option<String>,
    pub status_message: Option<String>,
    pub percent_complete: Option<f64>,
    pub quote: Option<Value>,
    #[serde(rename = "jobURL")]
    pub job_url: Option<String>,
    pub results: Option<JobResults>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct JobResults {
    #[serde(rename = "dataURL")]
    pub data_url: Option<String>,
    pub activity_count: Option<u64>,
    pub file_count: Option<u64>,
}

fn parse_opt_date<'de, D>(deserializer: D, fmt: &str) -> Result<Option<NaiveDateTime>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.and_then(|s| NaiveDateTime::parse_from_str(&s, fmt).ok()))
}

fn compact_date<'de, D: Deserializer<'de>>(d: D) -> Result<Option<NaiveDateTime>, D::Error> {
    parse_opt_date(d, GNIP_DATE_FORMAT)
}

fn iso_date<'de, D: Deserializer<'de>>(d: D) -> Result<Option<NaiveDateTime>, D::Error> {
    parse_opt_date(d, ISO_FORMAT)
}

impl Job {
    pub fn from_value(value: Value) -> anyhow::Result<Self> {
        serde_json::from_value(value).context("Invalid job document")
    }

    /// Job id: last segment of the job URL without `.json`
    pub fn uuid(&self) -> Option<&str> {
        let url = self.job_url.as_deref()?;
        let last = url.trim_end_matches('/').rsplit('/').next()?;
        let uuid = last.strip_suffix(".json").unwrap_or(last);
        (!uuid.is_empty()).then_some(uuid)
    }

    pub fn data_url(&self) -> Option<&str> {
        self.results.as_ref()?.data_url.as_deref()
    }

    pub fn status(&self) -> &str {
        self.status.as_deref().unwrap_or("unknown")
    }

    fn status_url(&self, pt: &PowerTrack) -> anyhow::Result<String> {
        match (&self.job_url, self.uuid()) {
            (Some(url), _) => Ok(url.clone()),
            (None, Some(uuid)) => pt.historical_url(&job_path(uuid)),
            (None, None) => anyhow::bail!("Job has no URL"),
        }
    }

    /// Re-read the job from the provider
    pub fn refresh(&mut self, pt: &PowerTrack) -> anyhow::Result<()> {
        let url = self.status_url(pt)?;
        *self = Self::from_value(pt.get(&url).context("Cannot refresh job")?)?;
        Ok(())
    }

    /// Cost estimate, fetched when not yet known
    pub fn quote(&mut self, pt: &PowerTrack) -> anyhow::Result<Option<&Value>> {
        if self.quote.is_none() {
            self.refresh(pt)?;
        }
        Ok(self.quote.as_ref())
    }

    pub fn accept(&mut self, pt: &PowerTrack) -> anyhow::Result<bool> {
        self.set_status(pt, "accept", "accepted")
    }

    pub fn reject(&mut self, pt: &PowerTrack) -> anyhow::Result<bool> {
        self.set_status(pt, "reject", "rejected")
    }

    fn set_status(&mut self, pt: &PowerTrack, action: &str, expected: &str) -> anyhow::Result<bool> {
        let url = self.status_url(pt)?;
        let updated = pt
            .put(&url, &json!({ "status": action }))
            .with_context(|| format!("Cannot {action} job"))?;
        *self = Self::from_value(updated)?;
        Ok(self.status.as_deref() == Some(expected))
    }

    /// Result file URLs; `None` while the job has no results yet
    pub fn data_urls(&mut self, pt: &PowerTrack) -> anyhow::Result<Option<Vec<String>>> {
        if self.data_url().is_none() {
            self.refresh(pt)?;
        }
        let Some(data_url) = self.data_url() else {
            return Ok(None);
        };
        let listing = pt.get(data_url).context("Cannot fetch result file list")?;
        Ok(Some(url_list(&listing)?))
    }

    /// `<folder>/<title>.csv`
    pub fn output_path(&self, folder: &Path) -> PathBuf {
        let title = self
            .title
            .clone()
            .or_else(|| self.uuid().map(String::from))
            .unwrap_or_else(|| "job".to_string());
        folder.join(format!("{title}.csv"))
    }

    /// Download every result file into `<folder>/<title>.csv` with `pipeline`.
    ///
    /// Returns `None` when the job has no results yet.
    pub fn export(
        &mut self,
        pt: &PowerTrack,
        folder: &Path,
        pipeline: Pipeline,
        cancel: &CancelToken,
    ) -> anyhow::Result<Option<Summary>> {
        let Some(urls) = self.data_urls(pt)? else {
            log::warn!(
                "Job {} has no results yet (status: {})",
                self.uuid().unwrap_or("?"),
                self.status()
            );
            return Ok(None);
        };
        let pipeline = pipeline.with_output(self.output_path(folder));
        Ok(Some(pipeline.run(urls, cancel)?))
    }
}

/// Extract `urlList` from a result listing document
pub fn url_list(listing: &Value) -> anyhow::Result<Vec<String>> {
    let urls = listing
        .get("urlList")
        .and_then(Value::as_array)
        .context("No 'urlList' array in result listing")?;
    Ok(urls
        .iter()
        .filter_map(Value::as_str)
        .map(String::from)
        .collect())
}

/// Body of a job creation request
pub fn create_request(
    from: &NaiveDateTime,
    to: &NaiveDateTime,
    title: &str,
    rules: &[String],
) -> Value {
    let rules: Vec<Value> = rules
        .iter()
        .map(|rule| json!({ "value": geo_rule(rule) }))
        .collect();
    json!({
        "publisher": "twitter",
        "streamType": "track",
        "dataFormat": "activity-streams",
        "fromDate": format_date(from),
        "toDate": format_date(to),
        "title": title,
        "rules": rules,
    })
}

/// Entry point for account-level job operations
pub struct JobManager<'a> {
    pt: &'a PowerTrack,
}

impl<'a> JobManager<'a> {
    pub fn new(pt: &'a PowerTrack) -> Self {
        Self { pt }
    }

    pub fn create(
        &self,
        from: &NaiveDateTime,
        to: &NaiveDateTime,
        title: &str,
        rules: &[String],
    ) -> anyhow::Result<Job> {
        anyhow::ensure!(!rules.is_empty(), "At least one rule is required");
        anyhow::ensure!(from < to, "fromDate must be before toDate");
        let url = self.pt.historical_url("jobs.json")?;
        let created = self
            .pt
            .post(&url, &create_request(from, to, title, rules))
            .context("Cannot create job")?;
        Job::from_value(created)
    }

    pub fn list(&self) -> anyhow::Result<Vec<Job>> {
        let url = self.pt.historical_url("jobs.json")?;
        let listing = self.pt.get(&url).context("Cannot list jobs")?;
        parse_job_list(listing)
    }

    /// Fetch one job. The provider computes a quote on this call.
    pub fn get(&self, uuid: &str) -> anyhow::Result<Job> {
        let url = self.pt.historical_url(&job_path(uuid))?;
        let doc = self
            .pt
            .get(&url)
            .with_context(|| format!("Cannot fetch job {uuid}"))?;
        Job::from_value(doc)
    }
}

fn parse_job_list(listing: Value) -> anyhow::Result<Vec<Job>> {
    let Value::Object(mut map) = listing else {
        anyhow::bail!("Job listing is not an object");
    };
    match map.remove("jobs") {
        Some(Value::Array(jobs)) => jobs.into_iter().map(Job::from_value).collect(),
        Some(Value::Null) | None => Ok(Vec::new()),
        Some(_) => anyhow::bail!("'jobs' is not an array"),
    }
}
