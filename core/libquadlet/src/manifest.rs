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

//! Remember which links were planned for each generated unit, so that the
//! next run can remove the ones a unit no longer declares.
use crate::error::*;
use crate::plan::{SymlinkPlan, SymlinkPlanEntry};
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

/// default manifest directory, below the output root
pub const MANIFEST_DIR: &str = ".quadlet-links";
const MANIFEST_HEADER: &str = "# quadlet install links v1";
const MANIFEST_SUFFIX: &str = ".links";

/// Storage of the previous plan of every generated unit.
pub trait PlanStore: Send + Sync {
    /// the last stored plan, None when nothing usable is stored
    fn load(&self, unit: &str) -> Option<SymlinkPlan>;

    ///
    fn store(&self, unit: &str, plan: &SymlinkPlan) -> Result<()>;

    ///
    fn remove(&self, unit: &str) -> Result<()>;

    /// names of all units with a stored plan, sorted
    fn units(&self) -> Vec<String>;
}

/// [`PlanStore`] keeping one `<unit>.links` file per unit in a directory.
#[derive(Debug, Clone)]
pub struct ManifestStore {
    dir: PathBuf,
}

impl ManifestStore {
    /// manifests live in `root/dir_name`
    pub fn new(root: &Path, dir_name: &str) -> Self {
        ManifestStore {
            dir: root.join(dir_name),
        }
    }

    ///
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn manifest_path(&self, unit: &str) -> PathBuf {
        self.dir.join(format!("{}{}", unit, MANIFEST_SUFFIX))
    }
}

fn link_path_is_contained(path: &Path) -> bool {
    path.components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

/// Parse manifest text, None if it is not a manifest at all.
fn parse_manifest(unit: &str, content: &str) -> Option<SymlinkPlan> {
    let mut lines = content.lines();
    if lines.next() != Some(MANIFEST_HEADER) {
        log::warn!("Manifest of {} has an unknown header, ignoring it", unit);
        return None;
    }

    let mut entries = Vec::new();
    for (nr, line) in lines.enumerate() {
        if line.is_empty() {
            continue;
        }

        let (link, target) = match line.split_once('\t') {
            Some(pair) => pair,
            None => {
                log::warn!(
                    "Manifest of {} is garbled at line {}, ignoring it",
                    unit,
                    nr + 2
                );
                return None;
            }
        };

        let link = Path::new(link);
        if link.as_os_str().is_empty() || !link_path_is_contained(link) {
            log::warn!(
                "Manifest of {} lists {:?} outside the output directory, dropping it",
                unit,
                link
            );
            continue;
        }

        entries.push(SymlinkPlanEntry::new(link, target));
    }

    Some(SymlinkPlan::from_entries(entries))
}

fn format_manifest(plan: &SymlinkPlan) -> String {
    let mut content = String::from(MANIFEST_HEADER);
    content.push('\n');
    for entry in plan {
        content.push_str(&format!(
            "{}\t{}\n",
            entry.link_path().to_string_lossy(),
            entry.link_target().to_string_lossy()
        ));
    }
    content
}

impl PlanStore for ManifestStore {
    fn load(&self, unit: &str) -> Option<SymlinkPlan> {
        let path = self.manifest_path(unit);
        match std::fs::read_to_string(&path) {
            Ok(content) => parse_manifest(unit, &content),
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => {
                log::warn!("Failed to read manifest {:?}: {}, ignoring it", path, e);
                None
            }
        }
    }

    fn store(&self, unit: &str, plan: &SymlinkPlan) -> Result<()> {
        let path = self.manifest_path(unit);
        basic::fs::mkdir_parents(&path).context(FilesystemSnafu {
            action: "create directory",
            path: self.dir.clone(),
        })?;

        basic::fs::write_file_atomic(&path, format_manifest(plan).as_bytes(), 0o644).context(
            FilesystemSnafu {
                action: "write manifest",
                path: path.clone(),
            },
        )?;

        log::debug!("Stored {} links of {} in {:?}", plan.len(), unit, path);
        Ok(())
    }

    fn remove(&self, unit: &str) -> Result<()> {
        let path = self.manifest_path(unit);
        basic::fs::unlink_if_exists(&path).context(FilesystemSnafu {
            action: "remove manifest",
            path,
        })?;
        Ok(())
    }

    fn units(&self) -> Vec<String> {
        let dir = match std::fs::read_dir(&self.dir) {
            Ok(dir) => dir,
            Err(e) => {
                if e.kind() != ErrorKind::NotFound {
                    log::warn!("Failed to list manifests in {:?}: {}", self.dir, e);
                }
                return Vec::new();
            }
        };

        let mut units: Vec<String> = dir
            .flatten()
            .filter_map(|de| {
                let name = de.file_name().to_string_lossy().to_string();
                if name.starts_with(basic::TMP_PREFIX) {
                    return None;
                }
                name.strip_suffix(MANIFEST_SUFFIX).map(str::to_string)
            })
            .filter(|unit| !unit.is_empty())
            .collect();
        units.sort();
        units
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample() -> SymlinkPlan {
        SymlinkPlan::from_entries(vec![
            SymlinkPlanEntry::new("alias.service", "install.service"),
            SymlinkPlanEntry::new("in/a/dir/alias3.service", "../../../install.service"),
            SymlinkPlanEntry::new("want1.service.wants/install.service", "../install.service"),
        ])
    }

    #[test]
    fn test_store_load_remove() {
        let root = tempdir().unwrap();
        let store = ManifestStore::new(root.path(), MANIFEST_DIR);

        assert!(store.load("install.service").is_none());
        assert!(store.units().is_empty());

        store.store("install.service", &sample()).unwrap();
        store.store("web-pod.service", &SymlinkPlan::default()).unwrap();
        assert_eq!(store.load("install.service"), Some(sample()));
        assert_eq!(store.load("web-pod.service"), Some(SymlinkPlan::default()));
        assert_eq!(
            store.units(),
            vec!["install.service".to_string(), "web-pod.service".to_string()]
        );

        let raw =
            std::fs::read_to_string(root.path().join(".quadlet-links/install.service.links"))
                .unwrap();
        assert_eq!(
            raw,
            "# quadlet install links v1\n\
             alias.service\tinstall.service\n\
             in/a/dir/alias3.service\t../../../install.service\n\
             want1.service.wants/install.service\t../install.service\n"
        );

        store.remove("install.service").unwrap();
        store.remove("install.service").unwrap();
        assert!(store.load("install.service").is_none());
        assert_eq!(store.units(), vec!["web-pod.service".to_string()]);
    }

    #[test]
    fn test_unsafe_entries_are_dropped() {
        let content = "# quadlet install links v1\n\
                       ../escape.service\tinstall.service\n\
                       /etc/passwd\tinstall.service\n\
                       a/../../b.service\tinstall.service\n\
                       ok.service\tinstall.service\n";
        let plan = parse_manifest("install.service", content).unwrap();
        assert_eq!(
            plan,
            SymlinkPlan::from_entries(vec![SymlinkPlanEntry::new(
                "ok.service",
                "install.service"
            )])
        );
    }

    #[test]
    fn test_garbled_manifest_is_ignored() {
        assert!(parse_manifest("x.service", "").is_none());
        assert!(parse_manifest("x.service", "# some other file\n").is_none());
        assert!(parse_manifest("x.service", "# quadlet install links v1\nno tab here\n").is_none());

        let root = tempdir().unwrap();
        let store = ManifestStore::new(root.path(), "m");
        std::fs::create_dir_all(store.dir()).unwrap();
        std::fs::write(store.dir().join("x.service.links"), "garbage").unwrap();
        std::fs::write(store.dir().join(".#y.service.links.0000abcd"), "").unwrap();
        std::fs::write(store.dir().join("README"), "").unwrap();
        assert!(store.load("x.service").is_none());
        assert_eq!(store.units(), vec!["x.service".to_string()]);
    }
}
