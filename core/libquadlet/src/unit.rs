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

//! Source kinds and the identity of the unit generated from a source.
use crate::error::*;
use basic::unit_name::unit_name_is_valid;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use unit_parser::prelude::UnitFile;

/// The kind of a quadlet source file, given by its extension.
#[allow(missing_docs)]
#[derive(PartialEq, Eq, Hash, Copy, Clone, Debug)]
pub enum QuadletKind {
    Container,
    Kube,
    Pod,
    Network,
    Volume,
    Image,
    Build,
}

/// Key in the kind's own section that overrides the generated base name.
pub const SERVICE_NAME_KEY: &str = "ServiceName";

impl QuadletKind {
    ///
    pub fn iterator() -> impl Iterator<Item = QuadletKind> {
        [
            QuadletKind::Container,
            QuadletKind::Kube,
            QuadletKind::Pod,
            QuadletKind::Network,
            QuadletKind::Volume,
            QuadletKind::Image,
            QuadletKind::Build,
        ]
        .iter()
        .copied()
    }

    /// file extension without the dot
    pub fn extension(&self) -> &'static str {
        match self {
            QuadletKind::Container => "container",
            QuadletKind::Kube => "kube",
            QuadletKind::Pod => "pod",
            QuadletKind::Network => "network",
            QuadletKind::Volume => "volume",
            QuadletKind::Image => "image",
            QuadletKind::Build => "build",
        }
    }

    /// the section carrying the runtime definition, e.g. `Container`
    pub fn section(&self) -> &'static str {
        match self {
            QuadletKind::Container => "Container",
            QuadletKind::Kube => "Kube",
            QuadletKind::Pod => "Pod",
            QuadletKind::Network => "Network",
            QuadletKind::Volume => "Volume",
            QuadletKind::Image => "Image",
            QuadletKind::Build => "Build",
        }
    }

    /// appended to the base name of the generated service
    fn service_suffix(&self) -> &'static str {
        match self {
            QuadletKind::Container | QuadletKind::Kube => "",
            QuadletKind::Pod => "-pod",
            QuadletKind::Network => "-network",
            QuadletKind::Volume => "-volume",
            QuadletKind::Image => "-image",
            QuadletKind::Build => "-build",
        }
    }

    /// The kind of the source file at `path`, if it is one.
    pub fn from_path(path: &Path) -> Option<QuadletKind> {
        let ext = path.extension()?.to_str()?;
        QuadletKind::from_str(ext).ok()
    }
}

impl FromStr for QuadletKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        QuadletKind::iterator()
            .find(|k| k.extension() == s)
            .ok_or(())
    }
}

impl fmt::Display for QuadletKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// The generated unit's file name and the directory it is written into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitIdentity {
    name: String,
    output_dir: PathBuf,
}

impl UnitIdentity {
    /// `name` must be a plain unit file name.
    pub fn new(name: &str, output_dir: &Path) -> Result<Self> {
        if !unit_name_is_valid(name) {
            return Err(Error::UnsupportedSource {
                name: name.to_string(),
            });
        }

        Ok(UnitIdentity {
            name: name.to_string(),
            output_dir: output_dir.to_path_buf(),
        })
    }

    /// Derive the generated service for a source file: `web.container`
    /// becomes `web.service`, `db.volume` becomes `db-volume.service`, and
    /// `ServiceName=` in the kind's section replaces the base name.
    pub fn from_source(source: &Path, unit: &UnitFile, output_dir: &Path) -> Result<Self> {
        let file_name = source
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        let kind = QuadletKind::from_path(source).ok_or(Error::UnsupportedSource {
            name: file_name.clone(),
        })?;

        let name = match unit.lookup_last(kind.section(), SERVICE_NAME_KEY) {
            Some(service_name) if !service_name.trim().is_empty() => {
                format!("{}.service", service_name.trim())
            }
            _ => {
                let stem = source
                    .file_stem()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default();
                format!("{}{}.service", stem, kind.service_suffix())
            }
        };

        UnitIdentity::new(&name, output_dir).map_err(|_| Error::UnsupportedSource {
            name: file_name,
        })
    }

    /// file name of the generated unit, e.g. `install.service`
    pub fn name(&self) -> &str {
        &self.name
    }

    ///
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// absolute path of the generated unit file
    pub fn unit_path(&self) -> PathBuf {
        self.output_dir.join(&self.name)
    }
}
