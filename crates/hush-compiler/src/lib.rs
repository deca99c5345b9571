//! hush Filter Compiler
//!
//! This crate turns Adblock Plus filter text into compiled [`Filter`]s and
//! splits downloaded list bodies into metadata and filter lines.
//!
//! [`Filter`]: hush_core::filter::Filter

pub mod list;
pub mod optimizer;
pub mod parser;

pub use list::{parse_expires, parse_list, ParsedList};
pub use optimizer::{dedupe, DedupeStats};
pub use parser::{compile, normalize};
