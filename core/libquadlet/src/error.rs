// Copyright (c) 2022 Huawei Technologies Co.,Ltd. All rights reserved.
//
// sysMaster is licensed under Mulan PSL v2.
// You can use this software according to the terms and conditions of the Mulan
// PSL v2.
// You may obtain a copy of Mulan PSL v2 at:
//         http://license.coscl.org.cn/MulanPSL2
// THIS SOFTWARE IS PROVIDED ON AN "AS IS" BASIS, WITHOUT WARRANTIES OF ANY
// KIND, EITHER EXPRESS OR IMPLIED, INCLUDING BUT NOT LIMITED TO
// NON-INFRINGEMENT, MERCHANTABILITY OR FIT FOR A PARTICULAR PURPOSE.
// See the Mulan PSL v2 for more details.

//! Error define of the quadlet core. Every failure of one source unit's
//! pipeline ends up as one of these and is reported to the caller.
use snafu::prelude::*;
#[allow(unused_imports)]
pub use snafu::ResultExt;
use std::path::PathBuf;

#[allow(missing_docs)]
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
#[non_exhaustive]
pub enum Error {
    #[snafu(display("Malformed {}= directive '{}': {}", key, value, reason))]
    MalformedInstallDirective {
        key: String,
        value: String,
        reason: String,
    },

    #[snafu(display("Alias '{}' escapes the output directory", alias))]
    UnsafeAliasPath { alias: String },

    #[snafu(display(
        "Link '{}' is planned with two targets: '{}' and '{}'",
        link.display(),
        first.display(),
        second.display()
    ))]
    ConflictingLink {
        link: PathBuf,
        first: PathBuf,
        second: PathBuf,
    },

    #[snafu(display("Failed to {} '{}': {}", action, path.display(), source))]
    Filesystem {
        action: &'static str,
        path: PathBuf,
        source: basic::Error,
    },

    #[snafu(display("{}", source))]
    UnitParse { source: unit_parser::error::Error },

    #[snafu(display("Unsupported quadlet file '{}'", name))]
    UnsupportedSource { name: String },

    #[snafu(display("{}: {}", path.display(), source))]
    Generate { path: PathBuf, source: Box<Error> },
}

impl Error {
    /// The innermost error, without the per-file wrapper.
    pub fn root(&self) -> &Error {
        match self {
            Error::Generate { source, .. } => source.root(),
            e => e,
        }
    }
}

///
pub type Result<T, E = Error> = std::result::Result<T, E>;
