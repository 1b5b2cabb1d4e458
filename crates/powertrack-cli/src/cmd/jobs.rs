//! Jobs subcommand - historical PowerTrack job lifecycle

use std::process::ExitCode;

use anyhow::Result;
use chrono::NaiveDateTime;
use clap::{Args, Subcommand};
use powertrack_gnip::{Job, JobManager, parse_date};

use crate::Ctx;

#[derive(Args, Debug)]
pub struct JobsArgs {
    #[command(subcommand)]
    pub action: JobsAction,
}

#[derive(Subcommand, Debug)]
pub enum JobsAction {
    /// List all jobs of the account
    List,
    /// Show one job, including its quote
    Show { uuid: String },
    /// Create a job (it will be quoted, not started)
    Create(CreateArgs),
    /// Accept a quoted job
    Accept { uuid: String },
    /// Reject a quoted job
    Reject { uuid: String },
    /// Download a delivered job's results into <output>/<title>.csv
    Export(JobExportArgs),
}

#[derive(Args, Debug)]
pub struct CreateArgs {
    /// Job title, also the export file name
    #[arg(short, long)]
    pub title: String,

    /// Window start (YYYY-MM-DD[THH:MM], UTC)
    #[arg(long, value_parser = parse_date_arg)]
    pub from: NaiveDateTime,

    /// Window end (YYYY-MM-DD[THH:MM], UTC)
    #[arg(long, value_parser = parse_date_arg)]
    pub to: NaiveDateTime,

    /// PowerTrack rule; repeat for several rules
    #[arg(short, long = "rule", required = true)]
    pub rules: Vec<String>,
}

#[derive(Args, Debug)]
pub struct JobExportArgs {
    pub uuid: String,

    /// Number of parallel downloads
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Output only these columns (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub columns: Option<Vec<String>>,
}

pub(crate) fn parse_date_arg(s: &str) -> Result<NaiveDateTime, String> {
    parse_date(s).map_err(|e| e.to_string())
}

pub fn run(args: JobsArgs, ctx: &Ctx) -> Result<ExitCode> {
    let pt = super::connect(ctx)?;
    let jobs = JobManager::new(&pt);

    match args.action {
        JobsAction::List => {
            let list = jobs.list()?;
            log::info!("{} jobs", list.len());
            let rows = list.iter().map(list_row).collect();
            super::print_rows(&["UUID", "Title", "Status", "Done", "From", "To"], rows);
        }
        JobsAction::Show { uuid } => {
            let job = jobs.get(&uuid)?;
            print_job(&job);
        }
        JobsAction::Create(args) => {
            let job = jobs.create(&args.from, &args.to, &args.title, &args.rules)?;
            log::info!("Created job {}", job.uuid().unwrap_or("?"));
            print_job(&job);
        }
        JobsAction::Accept { uuid } => {
            let mut job = jobs.get(&uuid)?;
            if !job.accept(&pt)? {
                anyhow::bail!("Job {uuid} not accepted (status: {})", job.status());
            }
            log::info!("Job {uuid} accepted");
        }
        JobsAction::Reject { uuid } => {
            let mut job = jobs.get(&uuid)?;
            if !job.reject(&pt)? {
                anyhow::bail!("Job {uuid} not rejected (status: {})", job.status());
            }
            log::info!("Job {uuid} rejected");
        }
        JobsAction::Export(args) => {
            let mut job = jobs.get(&args.uuid)?;
            let codec = super::codec(args.columns.as_deref())?;
            let title = job.title.clone().unwrap_or_else(|| args.uuid.clone());
            let folder = ctx.config.output.folder.clone();
            let pipeline = super::pipeline(
                ctx,
                &title,
                job.output_path(&folder),
                args.workers,
                false,
                codec,
            )?;
            return match job.export(&pt, &folder, pipeline, &ctx.cancel)? {
                Some(summary) => Ok(super::report(&title, &summary)),
                None => Ok(ExitCode::from(1)),
            };
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn fmt_date(date: Option<NaiveDateTime>) -> String {
    date.map(|d| d.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_default()
}

fn list_row(job: &Job) -> Vec<String> {
    vec![
        job.uuid().unwrap_or_default().to_string(),
        job.title.clone().unwrap_or_default(),
        job.status().to_string(),
        job.percent_complete
            .map(|p| format!("{p:.0}%"))
            .unwrap_or_default(),
        fmt_date(job.from_date),
        fmt_date(job.to_date),
    ]
}

fn print_job(job: &Job) {
    let text = |v: &Option<String>| v.clone().unwrap_or_default();
    let mut rows = vec![
        ("UUID", job.uuid().unwrap_or_default().to_string()),
        ("Title", text(&job.title)),
        ("Status", job.status().to_string()),
        ("Message", text(&job.status_message)),
        (
            "Progress",
            job.percent_complete
                .map(|p| format!("{p:.0}%"))
                .unwrap_or_default(),
        ),
        ("From", fmt_date(job.from_date)),
        ("To", fmt_date(job.to_date)),
        ("Requested", format!("{} {}", fmt_date(job.requested_at), text(&job.requested_by))),
        ("Accepted", format!("{} {}", fmt_date(job.accepted_at), text(&job.accepted_by))),
        ("Expires", fmt_date(job.expires_at)),
    ];
    if let Some(quote) = &job.quote {
        rows.push(("Quote", quote.to_string()));
    }
    if let Some(results) = &job.results {
        if let Some(count) = results.activity_count {
            rows.push(("Activities", count.to_string()));
        }
        if let Some(files) = results.file_count {
            rows.push(("Files", files.to_string()));
        }
    }
    super::print_summary("Job", &rows);
}
