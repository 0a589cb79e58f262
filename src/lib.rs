//! Ring data model for circular genome comparison figures.
//!
//! Tool output (alignments, feature annotations, segment tables, windowed
//! classifier scores) is parsed into [`segment::Segment`]s, wrapped into
//! [`ring::Ring`]s by the ring factories and placed inside its reference
//! group by [`index`].

pub mod blast;
pub mod classifier;
pub mod config;
pub mod contiguous;
pub mod engine;
pub mod error;
pub mod file_validation;
pub mod genbank;
pub mod index;
pub mod io_util;
pub mod ring;
pub mod sanitize;
pub mod segment;
pub mod session;
pub mod slicing;
pub mod store;
pub mod tsv;

pub use error::{BrickError, ErrorCode, Result};

pub const BRICK_VERSION: &str = env!("CARGO_PKG_VERSION");

pub fn version_cli_text() -> String {
    format!("BRICK {BRICK_VERSION}\nRing data model and index management")
}
