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

//! Low level helpers shared by the quadlet crates: errors, atomic filesystem
//! primitives and unit name handling.
pub mod error;
pub use error::*;
#[cfg(feature = "fs")]
pub mod fs;
#[cfg(feature = "unit_name")]
pub mod unit_name;

/// Maximum length of a unit name, the terminating NUL excluded.
pub const UNIT_NAME_MAX: usize = 255;

/// Prefix of temporary names created next to their final destination.
pub const TMP_PREFIX: &str = ".#";
