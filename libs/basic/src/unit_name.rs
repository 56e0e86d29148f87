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

//! Interfaces related to the unit name.
//!
use crate::fs::path_name_is_safe;
use crate::UNIT_NAME_MAX;
use std::fmt;
use std::str::FromStr;

/// The unit types systemd knows about, keyed by file suffix.
#[allow(missing_docs)]
#[derive(PartialEq, Eq, Hash, Copy, Clone, Debug)]
pub enum UnitType {
    Service,
    Socket,
    Target,
    Device,
    Mount,
    Automount,
    Swap,
    Timer,
    Path,
    Slice,
    Scope,
}

impl UnitType {
    ///
    pub fn iterator() -> impl Iterator<Item = UnitType> {
        [
            UnitType::Service,
            UnitType::Socket,
            UnitType::Target,
            UnitType::Device,
            UnitType::Mount,
            UnitType::Automount,
            UnitType::Swap,
            UnitType::Timer,
            UnitType::Path,
            UnitType::Slice,
            UnitType::Scope,
        ]
        .iter()
        .copied()
    }

    /// the suffix without the leading dot
    pub fn as_str(&self) -> &'static str {
        match self {
            UnitType::Service => "service",
            UnitType::Socket => "socket",
            UnitType::Target => "target",
            UnitType::Device => "device",
            UnitType::Mount => "mount",
            UnitType::Automount => "automount",
            UnitType::Swap => "swap",
            UnitType::Timer => "timer",
            UnitType::Path => "path",
            UnitType::Slice => "slice",
            UnitType::Scope => "scope",
        }
    }
}

impl FromStr for UnitType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        UnitType::iterator().find(|t| t.as_str() == s).ok_or(())
    }
}

impl fmt::Display for UnitType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// parse UnitType by unit_name
pub fn unit_name_to_type(unit_name: &str) -> Option<UnitType> {
    let (_, suffix) = unit_name.rsplit_once('.')?;
    UnitType::from_str(suffix).ok()
}

/// Split "foo@bar.service" into ("foo@bar", UnitType::Service)
pub fn unit_name_split(unit_name: &str) -> Option<(&str, UnitType)> {
    let (prefix, suffix) = unit_name.rsplit_once('.')?;
    let t = UnitType::from_str(suffix).ok()?;
    Some((prefix, t))
}

/// Check whether a plain file name is acceptable as unit name.
///
/// The prefix must be non-empty, the suffix a known unit type, and an
/// instance separator `@` may not start the name.
pub fn unit_name_is_valid(name: &str) -> bool {
    if name.len() > UNIT_NAME_MAX || name.contains('/') {
        return false;
    }

    if !path_name_is_safe(name) {
        return false;
    }

    match unit_name_split(name) {
        Some((prefix, _)) => !prefix.is_empty() && !prefix.starts_with('@'),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_name_to_type() {
        assert_eq!(unit_name_to_type("a.service"), Some(UnitType::Service));
        assert_eq!(unit_name_to_type("a.b.timer"), Some(UnitType::Timer));
        assert_eq!(
            unit_name_to_type("multi-user.target"),
            Some(UnitType::Target)
        );
        assert_eq!(unit_name_to_type("a.container"), None);
        assert_eq!(unit_name_to_type("service"), None);
    }

    #[test]
    fn test_unit_name_is_valid() {
        assert!(unit_name_is_valid("install.service"));
        assert!(unit_name_is_valid("getty@tty1.service"));
        assert!(unit_name_is_valid("getty@.service"));
        assert!(unit_name_is_valid("another alias.service"));
        assert!(!unit_name_is_valid(".service"));
        assert!(!unit_name_is_valid("@foo.service"));
        assert!(!unit_name_is_valid("foo"));
        assert!(!unit_name_is_valid("foo.conf"));
        assert!(!unit_name_is_valid("dir/foo.service"));
        assert!(!unit_name_is_valid("foo\t.service"));
        assert!(!unit_name_is_valid(&format!("{}.service", "a".repeat(250))));
    }
}
