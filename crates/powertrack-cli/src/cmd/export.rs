//! Export subcommand - download an explicit list of result files

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Args;

use crate::Ctx;

#[derive(Args, Debug)]
pub struct ExportArgs {
    /// Result file URLs (gzip NDJSON)
    pub urls: Vec<String>,

    /// File with one URL per line
    #[arg(short = 'f', long)]
    pub urls_file: Option<PathBuf>,

    /// Output file name inside the output folder (without .csv)
    #[arg(short, long, default_value = "export")]
    pub title: String,

    /// Number of parallel downloads
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Append to an existing CSV instead of replacing it
    #[arg(long)]
    pub append: bool,

    /// Output only these columns (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub columns: Option<Vec<String>>,
}

pub fn run(args: ExportArgs, ctx: &Ctx) -> Result<ExitCode> {
    let mut urls = args.urls;
    if let Some(path) = &args.urls_file {
        urls.extend(read_url_file(path)?);
    }
    anyhow::ensure!(!urls.is_empty(), "No URLs given (pass URLs or --urls-file)");

    let codec = super::codec(args.columns.as_deref())?;
    let output = ctx.config.output.folder.join(format!("{}.csv", args.title));
    let pipeline = super::pipeline(ctx, &args.title, output, args.workers, args.append, codec)?;
    let summary = pipeline.run(urls, &ctx.cancel)?;
    Ok(super::report("Export", &summary))
}

/// Non-empty, non-comment lines of `path`
fn read_url_file(path: &std::path::Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Cannot read {}", path.display()))?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(String::from)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_file_skips_blanks_and_comments() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("urls.txt");
        std::fs::write(&path, "# job abc\nhttps://a/1.gz\n\n  https://a/2.gz  \n").unwrap();
        assert_eq!(
            read_url_file(&path).unwrap(),
            vec!["https://a/1.gz", "https://a/2.gz"]
        );
    }

    #[test]
    fn missing_url_file() {
        assert!(read_url_file(std::path::Path::new("/nonexistent/urls.txt")).is_err());
    }
}
