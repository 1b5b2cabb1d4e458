//! Shard fetcher: raw body → gunzip → JSON lines → codec rows

use std::io::{BufRead, BufReader, Read};

use flate2::read::MultiGzDecoder;

use crate::codec::{Row, RowCodec};
use crate::error::FetchError;
use crate::shutdown::CancelToken;
use crate::stream::StreamError;

/// Buffer size for gzip stream reader (256KB)
const GZIP_BUF_SIZE: usize = 256 * 1024;

/// Initial capacity for per-line JSON read buffer (typical activity: 2–8KB)
const LINE_BUF_CAPACITY: usize = 8192;

/// Cancellation check interval (every N lines)
const CANCEL_CHECK_INTERVAL: usize = 1_000;

/// Where shard bytes come from.
///
/// `open` returns the raw, still gzip-compressed body. Errors carry enough
/// detail to classify them as transient or fatal (see [`StreamError::is_transient`]).
pub trait ShardSource: Send + Sync {
    fn open(&self, url: &str) -> Result<Box<dyn Read + Send>, StreamError>;
}

/// Rows and counters from one successfully read shard
#[derive(Debug, Default)]
pub struct ShardOutput {
    pub rows: Vec<Row>,
    pub lines_scanned: usize,
    pub malformed: usize,
    pub skipped: usize,
}

/// Download one shard and project every record through `codec`.
///
/// Rows are collected in memory and returned only if the whole shard was
/// read; a failure at any point yields no rows at all, so a retry never
/// duplicates output.
pub fn fetch_shard(
    source: &dyn ShardSource,
    codec: &dyn RowCodec,
    url: &str,
    cancel: &CancelToken,
) -> Result<ShardOutput, FetchError> {
    let raw = source.open(url)?;
    let reader = BufReader::with_capacity(GZIP_BUF_SIZE, MultiGzDecoder::new(raw));
    read_records(reader, codec, cancel)
}

/// Parse newline-delimited JSON from an already decompressed reader
pub fn read_records(
    mut reader: impl BufRead,
    codec: &dyn RowCodec,
    cancel: &CancelToken,
) -> Result<ShardOutput, FetchError> {
    let mut out = ShardOutput::default();
    let mut buf = Vec::with_capacity(LINE_BUF_CAPACITY);

    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            break;
        }
        let line = buf.trim_ascii();
        if line.is_empty() {
            continue;
        }
        out.lines_scanned += 1;

        if out.lines_scanned % CANCEL_CHECK_INTERVAL == 0 && cancel.is_cancelled() {
            return Err(FetchError::Cancelled);
        }

        let record: serde_json::Value = match serde_json::from_slice(line) {
            Ok(v) => v,
            Err(e) => {
                log::debug!("skipping malformed line {}: {e}", out.lines_scanned);
                out.malformed += 1;
                continue;
            }
        };

        match codec.to_row(&record) {
            Some(row) => out.rows.push(row),
            None => out.skipped += 1,
        }
    }
    Ok(out)
}
