//! # rustlitreview
//!
//! Semantic Scholar literature feed: searches for recent papers on a keyword
//! and appends the ones not seen before to a header-mapped sheet.
//!
//! ## Modules
//!
//! - [`fetch`] - HTTP GET with exponential backoff
//! - [`semanticscholar`] - Bulk search query and response decoding
//! - [`columns`] - Header row to column index mapping
//! - [`rows`] - Row building and title deduplication
//! - [`runner`] - One complete feed run
//! - [`store`] - Sheet/workbook abstraction and in-memory backend
//! - [`csv_store`] - CSV directory workbook
//! - [`config`] - Run configuration
//! - [`error`] - Custom error types
//!
//! ## Usage
//!
//! ```rust,no_run
//! use rustlitreview::{config::RunConfig, csv_store::CsvWorkbook, fetch::HttpTransport, runner::Runner};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = RunConfig::default();
//!     let transport = HttpTransport::from_config(&config)?;
//!     let mut workbook = CsvWorkbook::open("./workbook")?;
//!     let summary = Runner::new(config, transport).run(&mut workbook).await?;
//!     println!("Appended {} rows", summary.appended);
//!     Ok(())
//! }
//! ```

pub mod columns;
pub mod config;
pub mod csv_store;
pub mod error;
pub mod fetch;
pub mod rows;
pub mod runner;
pub mod semanticscholar;
pub mod store;

pub use error::{LitReviewError, Result};
