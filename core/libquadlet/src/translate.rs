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

//! Turning a quadlet source into the text of its generated service.
use crate::error::*;
use crate::unit::{QuadletKind, UnitIdentity};
use std::path::Path;
use unit_parser::prelude::UnitFile;

const UNIT_SECTION: &str = "Unit";
const QUADLET_SECTION: &str = "Quadlet";
const SOURCE_PATH_KEY: &str = "SourcePath";

/// Produces the generated unit file for a parsed quadlet source.
pub trait UnitTranslator: Send + Sync {
    /// the complete contents of `identity.unit_path()`
    fn translate(&self, source: &Path, unit: &UnitFile, identity: &UnitIdentity)
        -> Result<String>;
}

/// Copies the plain systemd sections of the source and drops the quadlet
/// ones, recording where the unit came from.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassthroughTranslator;

fn is_quadlet_section(name: &str) -> bool {
    name == QUADLET_SECTION || QuadletKind::iterator().any(|k| k.section() == name)
}

impl UnitTranslator for PassthroughTranslator {
    fn translate(
        &self,
        source: &Path,
        unit: &UnitFile,
        _identity: &UnitIdentity,
    ) -> Result<String> {
        let mut out = UnitFile::new();
        out.section_mut(UNIT_SECTION);

        for section in unit.sections() {
            if is_quadlet_section(section.name()) {
                continue;
            }
            let target = out.section_mut(section.name());
            for entry in section.entries() {
                target.push(entry.key(), entry.value());
            }
        }

        out.section_mut(UNIT_SECTION)
            .push(SOURCE_PATH_KEY, &source.to_string_lossy());

        Ok(format!(
            "# Automatically generated by quadlet-generator\n#\n{}",
            out
        ))
    }
}
