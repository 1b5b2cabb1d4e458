//! Powertrack Core - concurrent shard fetch-and-write pipeline
//!
//! Downloads gzip-compressed, newline-delimited JSON result shards in
//! parallel, projects each record to a CSV row through a [`RowCodec`], and
//! serializes every row through a single writer into one output file.

pub mod codec;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod progress;
pub mod retry;
pub mod shard;
pub mod shutdown;
pub mod sink;
pub mod stats;
pub mod stream;
pub mod work_queue;
pub mod worker;
pub mod writer;

// Re-exports for convenience
pub use codec::{Row, RowCodec};
pub use error::{FetchError, PipelineError};
pub use logging::init_logging;
pub use pipeline::{Pipeline, PipelineConfig};
pub use progress::{ProgressContext, SharedProgress};
pub use retry::RetryPolicy;
pub use shard::{ShardOutput, ShardSource, fetch_shard};
pub use shutdown::CancelToken;
pub use sink::CsvSink;
pub use stats::{PipelineState, Summary};
pub use stream::{HttpConfig, HttpSource, SHARED_RUNTIME, StreamError, build_client};
