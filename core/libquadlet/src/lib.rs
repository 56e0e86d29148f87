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


//! quadlet install wiring
//!
//! Reads the `[Install]` section of quadlet sources, plans the alias and
//! `.wants`/`.requires`/`.upholds` links of each generated service and
//! realizes them below a generator output directory.
pub mod config;
pub mod error;
pub mod generator;
pub mod install;
pub mod manifest;
pub mod materialize;
pub mod plan;
pub mod translate;
pub mod unit;

pub use error::{Error, Result};
pub use generator::{GenerateSummary, Generator, GeneratorOptions};
pub use install::{InstallSpec, Relation};
pub use materialize::{materialize, HostFs, LinkFs, MaterializeReport};
pub use plan::{plan, SymlinkPlan, SymlinkPlanEntry};
pub use unit::{QuadletKind, UnitIdentity};
