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

#![allow(non_snake_case)]
use crate::manifest::MANIFEST_DIR;
use confique::Config;
use log::Level;

/// default configuration path
pub const GENERATOR_CONFIG: &str = "/etc/containers/quadlet-generator.toml";

/// contents of the generator configuration file
#[derive(Config, Debug)]
pub struct GeneratorConfig {
    #[config(nested)]
    pub Generator: SectionGenerator,
}

/// the `[Generator]` table
#[derive(Config, Debug)]
pub struct SectionGenerator {
    #[config(env = "QUADLET_LOG_LEVEL", default = "info")]
    pub LogLevel: String,
    #[config(default = 4)]
    pub Jobs: usize,
    #[config(default = ".quadlet-links")]
    pub ManifestDir: String,
    pub UnitDirs: Option<Vec<String>>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        GeneratorConfig {
            Generator: SectionGenerator::default(),
        }
    }
}

impl Default for SectionGenerator {
    fn default() -> Self {
        SectionGenerator {
            LogLevel: "info".to_string(),
            Jobs: 4,
            ManifestDir: MANIFEST_DIR.to_string(),
            UnitDirs: None,
        }
    }
}

impl GeneratorConfig {
    /// load `file` (or the default path), defaults on any failure
    pub fn new(file: Option<&str>) -> GeneratorConfig {
        let path = file.unwrap_or(GENERATOR_CONFIG);
        let builder = GeneratorConfig::builder().env();
        match builder.file(path).load() {
            Ok(c) => c,
            Err(e) => {
                log::warn!("Failed to load {}: {}, using defaults", path, e);
                GeneratorConfig::default()
            }
        }
    }

    /// number of worker threads, at least one
    pub fn jobs(&self) -> usize {
        self.Generator.Jobs.max(1)
    }

    /// configured level, info when it does not parse
    pub fn log_level(&self) -> Level {
        log::parse_level(&self.Generator.LogLevel).unwrap_or(Level::Info)
    }

    ///
    pub fn manifest_dir(&self) -> &str {
        &self.Generator.ManifestDir
    }

    ///
    pub fn unit_dirs(&self) -> Option<&[String]> {
        self.Generator.UnitDirs.as_deref()
    }
}
