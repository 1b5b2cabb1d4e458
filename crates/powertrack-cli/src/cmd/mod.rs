//! Subcommands and the helpers they share

pub mod categories;
pub mod export;
pub mod jobs;
pub mod search;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use comfy_table::{Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};
use powertrack_core::progress::fmt_num;
use powertrack_core::{HttpSource, Pipeline, PipelineState, Summary};
use powertrack_gnip::{ActivityCodec, PowerTrack};

use crate::Ctx;
use crate::config::Config;

fn table(header: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(header.iter().map(|h| Cell::new(h).fg(Color::Cyan)));
    table
}

/// Print a key-value summary table on stderr
pub fn print_summary(title: &str, rows: &[(&str, String)]) {
    let mut table = table(&[title, "Value"]);
    for (label, value) in rows {
        table.add_row(vec![Cell::new(label), Cell::new(value)]);
    }
    eprintln!("\n{table}");
}

pub fn print_config(config: &Config) {
    let set = |s: &str| if s.is_empty() { "not set" } else { "configured" };
    let retries = match config.http.max_retries {
        0 => "unlimited".to_string(),
        n => n.to_string(),
    };
    print_summary(
        "Setting",
        &[
            ("Account", config.credentials.account.clone()),
            ("Username", config.credentials.username.clone()),
            ("Password", set(&config.credentials.password).to_string()),
            ("Search label", config.credentials.label.clone()),
            ("Output folder", config.output.folder.display().to_string()),
            ("Workers", config.output.workers.to_string()),
            ("Connect timeout", format!("{}s", config.http.connect_timeout)),
            ("Read timeout", format!("{}s", config.http.read_timeout)),
            ("Max retries", retries),
            (
                "Backoff",
                format!("{}s (max {}s)", config.http.backoff, config.http.max_backoff),
            ),
            ("Grace period", format!("{}s", config.pipeline.grace_period)),
        ],
    );
}

/// Table with one row per entry
pub fn print_rows(header: &[&str], rows: Vec<Vec<String>>) {
    let mut table = table(header);
    for row in rows {
        table.add_row(row);
    }
    eprintln!("\n{table}");
}

pub fn connect(ctx: &Ctx) -> Result<PowerTrack> {
    PowerTrack::new(ctx.config.api_config(), &ctx.config.http_config())
        .context("Check [credentials] in the config file")
}

pub fn codec(columns: Option<&[String]>) -> Result<Arc<ActivityCodec>> {
    let codec = match columns {
        Some(cols) => ActivityCodec::with_columns(cols)?,
        None => ActivityCodec::new(),
    };
    Ok(Arc::new(codec))
}

/// Fetch-and-write pipeline over HTTP with the configured settings
pub fn pipeline(
    ctx: &Ctx,
    name: &str,
    output: PathBuf,
    workers: Option<usize>,
    append: bool,
    codec: Arc<ActivityCodec>,
) -> Result<Pipeline> {
    let source = HttpSource::new(&ctx.config.http_config()).context("Cannot build HTTP client")?;
    let config = ctx.config.pipeline_config(output, workers, append);
    Ok(Pipeline::new(config, Arc::new(source), codec).with_progress(ctx.progress.pipeline_bar(name)))
}

/// Log and print the run summary, mapping it to the process exit code
pub fn report(title: &str, summary: &Summary) -> ExitCode {
    summary.log();
    print_summary(
        title,
        &[
            ("State", summary.state.to_string()),
            (
                "Shards",
                format!(
                    "{}/{} ({} failed, {} abandoned, {} retries)",
                    summary.shards_completed,
                    summary.shards_total,
                    summary.shards_failed,
                    summary.shards_abandoned,
                    summary.retries
                ),
            ),
            (
                "Rows",
                format!(
                    "{} from {} lines ({} skipped, {} malformed)",
                    fmt_num(summary.rows_written),
                    fmt_num(summary.lines_scanned),
                    fmt_num(summary.skipped),
                    fmt_num(summary.malformed)
                ),
            ),
            ("Time", format!("{:.1}s", summary.elapsed.as_secs_f64())),
        ],
    );
    exit_code(summary)
}

pub fn exit_code(summary: &Summary) -> ExitCode {
    ExitCode::from(exit_status(summary))
}

/// 130 when aborted, 1 when any shard did not complete
fn exit_status(summary: &Summary) -> u8 {
    match summary.state {
        PipelineState::Aborted => 130,
        _ if !summary.is_success() => 1,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn summary(state: PipelineState, failed: u64) -> Summary {
        Summary {
            state,
            shards_total: 3,
            shards_completed: 3 - failed,
            shards_failed: failed,
            shards_abandoned: 0,
            retries: 0,
            lines_scanned: 10,
            malformed: 0,
            skipped: 0,
            rows_written: 10,
            elapsed: Duration::from_secs(1),
        }
    }

    #[test]
    fn exit_codes() {
        assert_eq!(exit_status(&summary(PipelineState::Done, 0)), 0);
        assert_eq!(exit_status(&summary(PipelineState::Done, 1)), 1);
        assert_eq!(exit_status(&summary(PipelineState::Aborted, 1)), 130);
    }

    #[test]
    fn unknown_column_rejected() {
        let cols = vec!["id".to_string(), "bogus".to_string()];
        assert!(codec(Some(cols.as_slice())).is_err());
        assert!(codec(None).is_ok());
    }
}
