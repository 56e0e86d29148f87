//! Error types of the unit parser.
use snafu::prelude::*;
use std::path::PathBuf;

#[allow(missing_docs)]
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
#[non_exhaustive]
pub enum Error {
    #[snafu(display("Failed to read '{}': {}", path.display(), source))]
    ReadUnit {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("line {}: key '{}' appears before any section header", line, key))]
    EntryOutsideSection { line: usize, key: String },

    #[snafu(display("line {}: invalid syntax '{}'", line, content))]
    Syntax { line: usize, content: String },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
