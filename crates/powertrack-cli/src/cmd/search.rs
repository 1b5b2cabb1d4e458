//! Search subcommand - page one query into <output>/<title>.csv

use std::process::ExitCode;

use anyhow::Result;
use chrono::NaiveDateTime;
use clap::Args;
use powertrack_core::progress::fmt_num;
use powertrack_gnip::SearchJob;

use super::jobs::parse_date_arg;
use crate::Ctx;

#[derive(Args, Debug)]
pub struct SearchArgs {
    /// Search rule (the geo filter is added automatically)
    pub rule: String,

    /// Output file name inside the output folder (without .csv)
    #[arg(short, long)]
    pub title: String,

    /// Window start (YYYY-MM-DD[THH:MM], UTC)
    #[arg(long, value_parser = parse_date_arg)]
    pub from: NaiveDateTime,

    /// Window end, defaults to now
    #[arg(long, value_parser = parse_date_arg)]
    pub to: Option<NaiveDateTime>,

    /// Append to an existing CSV instead of replacing it
    #[arg(long)]
    pub append: bool,

    /// Output only these columns (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub columns: Option<Vec<String>>,
}

pub fn run(args: SearchArgs, ctx: &Ctx) -> Result<ExitCode> {
    let pt = super::connect(ctx)?;
    let codec = super::codec(args.columns.as_deref())?;
    let to = args.to.unwrap_or_else(|| chrono::Utc::now().naive_utc());
    anyhow::ensure!(args.from < to, "--from must be before --to");

    let job = SearchJob::new(&args.title, args.from, to, &args.rule);
    let progress = ctx.progress.stage_line("search");
    let summary = job.export(
        &pt,
        codec.as_ref(),
        &ctx.config.output.folder,
        args.append,
        &progress,
        &ctx.cancel,
    )?;
    progress.finish_and_clear();

    super::print_summary(
        "Search",
        &[
            ("Pages", summary.pages.to_string()),
            (
                "Rows",
                format!(
                    "{} of {} results",
                    fmt_num(summary.rows_written),
                    fmt_num(summary.results)
                ),
            ),
            ("Output", job.output_path(&ctx.config.output.folder).display().to_string()),
        ],
    );
    Ok(if ctx.cancel.is_cancelled() {
        ExitCode::from(130)
    } else if summary.interrupted {
        ExitCode::from(1)
    } else {
        ExitCode::SUCCESS
    })
}
