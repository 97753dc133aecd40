//! Spreadsheet-driven email delivery through BlastEngine.
//!
//! Rows of a send list become typed [`delivery::Delivery`] records, each
//! rendered through a text and an HTML template and submitted (or checked,
//! in a dry-run) by the [`pipeline`]. Every run writes a JSON-lines
//! [`runlog`], which [`report`] later joins with the provider's results.

pub mod blastengine;
pub mod config;
pub mod delivery;
pub mod pipeline;
pub mod report;
pub mod runlog;
pub mod sheet;
pub mod template;
pub mod transport;
pub mod txt2html;

mod error;

pub use error::Error;
