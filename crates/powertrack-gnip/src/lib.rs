//! Powertrack GNIP - historical jobs, search paging and tweet projection
//!
//! Provider-specific layer on top of `powertrack-core`: talks to the GNIP
//! historical and search endpoints and turns activity-streams tweets into
//! CSV rows.

pub mod activity;
pub mod category;
pub mod client;
pub mod historical;
pub mod query;
pub mod search;

pub use activity::{ActivityCodec, UnknownColumn};
pub use category::{Category, CategoryJob, CategorySummary, SEARCH_API_MAX_POSITIVE_CLAUSES};
pub use client::{ApiConfig, ApiResponse, PowerTrack};
pub use historical::{Job, JobManager, JobResults};
pub use query::{geo_rule, parse_date};
pub use search::{SearchJob, SearchSummary};
