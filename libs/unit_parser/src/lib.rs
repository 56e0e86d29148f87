//! Crate for reading systemd-style unit files.
//! A unit file is kept as ordered sections holding ordered, possibly
//! repeated `key=value` entries, so that multi-occurrence directives keep
//! their authored order. Values are stored exactly as written apart from
//! line continuation joining: quotes and inner whitespace are preserved.

pub mod error;
mod parser;
mod unit;

/// All public interfaces for normal usage.
/// Use `use unit_parser::prelude::*;` to include.
pub mod prelude;
