//! HTTP shard source with read-stall timeout.
//!
//! Uses async reqwest internally with tokio::time::timeout for stall detection,
//! but presents a sync `Read` interface so fetch workers can stay on plain threads.

use std::io::{self, Read};
use std::pin::Pin;
use std::sync::LazyLock;
use std::task::Context;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::io::{AsyncRead, ReadBuf};

use crate::shard::ShardSource;

/// Error types for stream operations
#[derive(Debug)]
pub enum StreamError {
    /// HTTP error with optional status code (`None` = connection/TLS level)
    Http {
        status: Option<u16>,
        message: String,
    },
    /// Request rejected before reaching the server (bad URL, redirect loop)
    Request(String),
    /// I/O error while reading or decompressing the body
    Io(std::io::Error),
}

impl std::fmt::Display for StreamError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Http {
                status: Some(s),
                message,
            } => write!(f, "HTTP {s}: {message}"),
            Self::Http {
                status: None,
                message,
            } => write!(f, "HTTP error: {message}"),
            Self::Request(message) => write!(f, "invalid request: {message}"),
            Self::Io(e) => write!(f, "IO error: {e}"),
        }
    }
}

impl std::error::Error for StreamError {}

impl StreamError {
    /// Create HTTP error from reqwest error.
    ///
    /// The URL is stripped: shard URLs are pre-signed and must not end up in logs.
    pub fn from_reqwest(e: reqwest::Error) -> Self {
        let status = e.status().map(|s| s.as_u16());
        let unsendable = e.is_builder() || e.is_redirect() || e.is_decode();
        let message = e.without_url().to_string();
        if status.is_none() && unsendable {
            return Self::Request(message);
        }
        Self::Http { status, message }
    }

    /// Transient = connection-level failure worth another attempt.
    ///
    /// Any response carrying a status code is a provider-side rejection and
    /// is not retried. Unsendable requests and corrupt gzip data are not
    /// retried either.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http { status, .. } => status.is_none(),
            Self::Request(_) => false,
            Self::Io(e) => !matches!(
                e.kind(),
                io::ErrorKind::StorageFull | io::ErrorKind::InvalidData | io::ErrorKind::InvalidInput
            ),
        }
    }
}

impl From<std::io::Error> for StreamError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

/// Network settings for shard downloads
#[derive(Debug, Clone, Copy)]
pub struct HttpConfig {
    /// Max time to establish a connection
    pub connect_timeout: Duration,
    /// Max time without receiving any body bytes before the read fails
    pub read_timeout: Duration,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            read_timeout: Duration::from_secs(30),
        }
    }
}

/// Shared tokio runtime for HTTP operations.
pub static SHARED_RUNTIME: LazyLock<tokio::runtime::Runtime> = LazyLock::new(|| {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .thread_name("powertrack-http")
        .enable_all()
        .build()
        .expect("failed to build tokio runtime")
});

/// Build an async client with the given timeouts and connection pooling.
pub fn build_client(config: &HttpConfig) -> Result<reqwest::Client, StreamError> {
    reqwest::Client::builder()
        .connect_timeout(config.connect_timeout)
        .pool_max_idle_per_host(8)
        .build()
        .map_err(StreamError::from_reqwest)
}

/// Shard source downloading result files over HTTP(S).
#[derive(Debug, Clone)]
pub struct HttpSource {
    client: reqwest::Client,
    read_timeout: Duration,
}

impl HttpSource {
    pub fn new(config: &HttpConfig) -> Result<Self, StreamError> {
        Ok(Self {
            client: build_client(config)?,
            read_timeout: config.read_timeout,
        })
    }
}

impl ShardSource for HttpSource {
    /// HTTP GET → raw (still gzipped) body reader
    fn open(&self, url: &str) -> Result<Box<dyn Read + Send>, StreamError> {
        let reader = SHARED_RUNTIME.handle().block_on(async {
            let response = self
                .client
                .get(url)
                .send()
                .await
                .and_then(|r| r.error_for_status())
                .map_err(StreamError::from_reqwest)?;

            let stream = response.bytes_stream();
            let async_reader = tokio_util::io::StreamReader::new(
                stream.map(|result| result.map_err(io::Error::other)),
            );
            Ok::<_, StreamError>(TimeoutReader::new(
                Box::pin(async_reader),
                self.read_timeout,
            ))
        })?;
        Ok(Box::new(reader))
    }
}

/// Async-to-sync bridge with read timeout.
///
/// Each read operation has a timeout - if no data arrives within
/// `timeout`, returns TimedOut error (which is transient).
pub struct TimeoutReader {
    inner: Pin<Box<dyn AsyncRead + Send>>,
    timeout: Duration,
}

impl TimeoutReader {
    fn new(inner: Pin<Box<dyn AsyncRead + Send>>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }
}

impl Read for TimeoutReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let timeout = self.timeout;
        SHARED_RUNTIME.handle().block_on(async {
            let read_future = async {
                let mut read_buf = ReadBuf::new(buf);
                std::future::poll_fn(|cx: &mut Context<'_>| {
                    Pin::as_mut(&mut self.inner).poll_read(cx, &mut read_buf)
                })
                .await?;
                Ok::<_, io::Error>(read_buf.filled().len())
            };

            match tokio::time::timeout(timeout, read_future).await {
                Ok(result) => result,
                Err(_) => Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("read timeout ({}s with no data)", timeout.as_secs()),
                )),
            }
        })
    }
}
