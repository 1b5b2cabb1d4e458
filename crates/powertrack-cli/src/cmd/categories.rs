//! Categories subcommand - search a category file and tag every row

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use chrono::NaiveDateTime;
use clap::Args;
use powertrack_core::progress::fmt_num;
use powertrack_gnip::CategoryJob;

use super::jobs::parse_date_arg;
use crate::Ctx;

#[derive(Args, Debug)]
pub struct CategoriesArgs {
    /// Category file (TOML with `name` and `[[category]]` tables)
    pub file: PathBuf,

    /// Window start (YYYY-MM-DD[THH:MM], UTC)
    #[arg(long, value_parser = parse_date_arg)]
    pub from: NaiveDateTime,

    /// Window end, defaults to now
    #[arg(long, value_parser = parse_date_arg)]
    pub to: Option<NaiveDateTime>,

    /// Output name, defaults to the file's `name`
    #[arg(short, long)]
    pub title: Option<String>,

    /// Only print the queries that would be run
    #[arg(long)]
    pub dry_run: bool,

    /// Output only these columns (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub columns: Option<Vec<String>>,
}

pub fn run(args: CategoriesArgs, ctx: &Ctx) -> Result<ExitCode> {
    let mut job = CategoryJob::load(&args.file)?;
    if let Some(title) = args.title {
        job.name = title;
    }

    if args.dry_run {
        let rows = job
            .queries()
            .into_iter()
            .enumerate()
            .map(|(i, q)| vec![(i + 1).to_string(), q])
            .collect();
        super::print_rows(&["#", "Query"], rows);
        return Ok(ExitCode::SUCCESS);
    }

    let pt = super::connect(ctx)?;
    let codec = super::codec(args.columns.as_deref())?;
    let to = args.to.unwrap_or_else(|| chrono::Utc::now().naive_utc());
    anyhow::ensure!(args.from < to, "--from must be before --to");

    let progress = ctx.progress.stage_line("categories");
    let summary = job.run(
        &pt,
        codec.as_ref(),
        &ctx.config.output.folder,
        args.from..to,
        &progress,
        &ctx.cancel,
    )?;
    progress.finish_and_clear();

    super::print_summary(
        "Categories",
        &[
            ("Categories", job.categories().len().to_string()),
            ("Queries", summary.queries.to_string()),
            ("Pages", summary.search.pages.to_string()),
            ("Rows", fmt_num(summary.tagged)),
            ("Output", summary.output.display().to_string()),
        ],
    );
    Ok(if ctx.cancel.is_cancelled() {
        ExitCode::from(130)
    } else if summary.search.interrupted {
        ExitCode::from(1)
    } else {
        ExitCode::SUCCESS
    })
}
