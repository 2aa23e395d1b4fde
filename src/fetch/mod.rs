//! The fetch-dedupe-notify pipeline.
//!
//! - [`client`] - conditional HTTP retrieval (ETag-aware)
//! - [`parser`] - dialect-tolerant entry extraction preserving raw XML
//! - [`ingest`] - content-addressed dedup and per-entry persistence
//! - [`diag`] - the buffered diagnostic accumulator for one fetch
//! - [`pipeline`] - the per-feed orchestration (`Hub::fetch_one`) and the
//!   collection loop (`Hub::fetch_collection`)

pub mod client;
pub mod diag;
pub mod ingest;
pub mod parser;
pub mod pipeline;

pub use client::{fetch, FetchError, FetchedContent};
pub use diag::Diagnostics;
pub use parser::{entry_id, parse_entries, ParseError, RawEntry};
