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

//! Symlink planning: a pure computation from the generated unit and its
//! install spec to the exact set of links that wire it into systemd.
//!
//! Alias links live at the alias path below the output root and point back
//! up to the unit with one `../` per directory level. Relation links live
//! in `<target>.wants/` (or `.requires/`, `.upholds/`) directly below the
//! root and always point to `../<unit>`.
use crate::error::*;
use crate::install::{InstallSpec, Relation};
use crate::unit::UnitIdentity;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// One link to realize: `link_path` is relative to the output root,
/// `link_target` is the value the symlink stores.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SymlinkPlanEntry {
    link_path: PathBuf,
    link_target: PathBuf,
}

impl SymlinkPlanEntry {
    ///
    pub fn new<P: Into<PathBuf>, T: Into<PathBuf>>(link_path: P, link_target: T) -> Self {
        SymlinkPlanEntry {
            link_path: link_path.into(),
            link_target: link_target.into(),
        }
    }

    ///
    pub fn link_path(&self) -> &Path {
        &self.link_path
    }

    ///
    pub fn link_target(&self) -> &Path {
        &self.link_target
    }
}

/// The ordered links of one generated unit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SymlinkPlan {
    entries: Vec<SymlinkPlanEntry>,
}

impl SymlinkPlan {
    /// Build a plan from entries that were planned before, e.g. read back
    /// from a manifest. Later duplicates of a link path are dropped.
    pub fn from_entries(entries: Vec<SymlinkPlanEntry>) -> Self {
        let mut plan = SymlinkPlan::default();
        for entry in entries {
            if !plan.contains_link(entry.link_path()) {
                plan.entries.push(entry);
            }
        }
        plan
    }

    ///
    pub fn entries(&self) -> &[SymlinkPlanEntry] {
        &self.entries
    }

    ///
    pub fn iter(&self) -> std::slice::Iter<'_, SymlinkPlanEntry> {
        self.entries.iter()
    }

    ///
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    ///
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// whether some entry creates a link at `link_path`
    pub fn contains_link(&self, link_path: &Path) -> bool {
        self.entries.iter().any(|e| e.link_path == link_path)
    }

    /// self followed by the entries of `other` whose link path is new
    pub fn union(&self, other: &SymlinkPlan) -> SymlinkPlan {
        SymlinkPlan::from_entries(self.iter().chain(other.iter()).cloned().collect())
    }
}

impl<'a> IntoIterator for &'a SymlinkPlan {
    type Item = &'a SymlinkPlanEntry;
    type IntoIter = std::slice::Iter<'a, SymlinkPlanEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/* Normalize an alias into its path segments below the output root.
 * Empty and "." segments are dropped, anything that could leave the
 * root is refused. */
fn alias_segments(alias: &str) -> Result<Vec<&str>> {
    let unsafe_alias = || Error::UnsafeAliasPath {
        alias: alias.to_string(),
    };

    if alias.starts_with('/') {
        return Err(unsafe_alias());
    }

    let segments: Vec<&str> = alias
        .split('/')
        .filter(|s| !s.is_empty() && *s != ".")
        .collect();

    if segments.is_empty() || segments.iter().any(|s| *s == "..") {
        return Err(unsafe_alias());
    }

    Ok(segments)
}

/// `depth` times `../` followed by the unit name
fn relative_target(depth: usize, unit_name: &str) -> PathBuf {
    PathBuf::from(format!("{}{}", "../".repeat(depth), unit_name))
}

/// Accumulates entries, enforcing one target per link path.
struct PlanBuilder {
    entries: Vec<SymlinkPlanEntry>,
    index: HashMap<PathBuf, usize>,
}

impl PlanBuilder {
    fn new() -> Self {
        PlanBuilder {
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }

    fn add(&mut self, entry: SymlinkPlanEntry) -> Result<()> {
        if let Some(&idx) = self.index.get(&entry.link_path) {
            let first = &self.entries[idx];
            if first.link_target != entry.link_target {
                return Err(Error::ConflictingLink {
                    link: entry.link_path,
                    first: first.link_target.clone(),
                    second: entry.link_target,
                });
            }
            log::debug!(
                "Link {:?} is planned twice with the same target, keeping the first",
                entry.link_path
            );
            return Ok(());
        }

        self.index
            .insert(entry.link_path.clone(), self.entries.len());
        self.entries.push(entry);
        Ok(())
    }

    fn finish(self) -> SymlinkPlan {
        SymlinkPlan {
            entries: self.entries,
        }
    }
}

/// Compute the links for `unit` from `spec`.
///
/// Entries are grouped Alias, WantedBy, RequiredBy, UpheldBy, each group in
/// the spec's order, so repeated runs yield identical plans.
pub fn plan(unit: &UnitIdentity, spec: &InstallSpec) -> Result<SymlinkPlan> {
    let unit_name = unit.name();
    let mut builder = PlanBuilder::new();

    for alias in spec.aliases() {
        let segments = alias_segments(alias)?;
        let depth = segments.len() - 1;
        let link_path = segments.join("/");

        if link_path == unit_name {
            log::debug!("Alias {} names the unit itself, skipping", alias);
            continue;
        }

        builder.add(SymlinkPlanEntry::new(
            link_path,
            relative_target(depth, unit_name),
        ))?;
    }

    for relation in Relation::iterator() {
        for target in spec.relation(relation) {
            let link_path = format!("{}{}/{}", target, relation.dir_suffix(), unit_name);
            builder.add(SymlinkPlanEntry::new(
                link_path,
                relative_target(1, unit_name),
            ))?;
        }
    }

    let plan = builder.finish();
    log::debug!("Planned {} links for {}", plan.len(), unit_name);
    Ok(plan)
}
