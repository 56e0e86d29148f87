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

//! Realize a symlink plan below an output root.
//!
//! Every decision about an existing entry goes through [`LinkState`], and
//! every filesystem access goes through [`LinkFs`], so the policy can be
//! exercised without touching the host.
use crate::error::*;
use crate::plan::{SymlinkPlan, SymlinkPlanEntry};
use basic::fs::FileKind;
use nix::errno::Errno;
use std::path::{Path, PathBuf};

/* a concurrent generator may prune a shared relation directory between our
 * mkdir and our symlink, in which case the directory is created again */
const VANISHED_PARENT_RETRIES: u32 = 3;

/// What is currently at a planned link path, relative to the desired target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkState {
    /// nothing at the path
    Absent,
    /// a symlink that already stores the desired target
    Correct,
    /// a symlink storing another target
    WrongTarget(PathBuf),
    /// a regular file or other non-directory entry
    NotSymlink,
    /// a directory, which is never replaced
    Directory,
}

/// What the materializer does about a [`LinkState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkAction {
    ///
    Create,
    ///
    Keep,
    ///
    Replace,
}

impl LinkState {
    /// classify `kind` against the target the link should store
    pub fn classify(kind: FileKind, desired: &Path) -> LinkState {
        match kind {
            FileKind::Missing => LinkState::Absent,
            FileKind::Symlink(target) if target == desired => LinkState::Correct,
            FileKind::Symlink(target) => LinkState::WrongTarget(target),
            FileKind::Directory => LinkState::Directory,
            FileKind::Other => LinkState::NotSymlink,
        }
    }

    /// None means the entry must not be touched and the unit fails
    pub fn action(&self) -> Option<LinkAction> {
        match self {
            LinkState::Absent => Some(LinkAction::Create),
            LinkState::Correct => Some(LinkAction::Keep),
            LinkState::WrongTarget(_) | LinkState::NotSymlink => Some(LinkAction::Replace),
            LinkState::Directory => None,
        }
    }
}

/// The filesystem operations the materializer needs.
///
/// Implementations must be safe to call from several threads writing into
/// the same output root.
pub trait LinkFs: Send + Sync {
    /// lstat-like classification of `path`
    fn entry_kind(&self, path: &Path) -> basic::Result<FileKind>;

    /// mkdir -p, an existing directory is fine
    fn create_dir_all(&self, path: &Path) -> basic::Result<()>;

    /// atomically make `link` a symlink storing `target`
    fn replace_symlink(&self, target: &Path, link: &Path) -> basic::Result<()>;

    /// unlink `path`, false if it was already gone
    fn remove_link(&self, path: &Path) -> basic::Result<bool>;

    /// remove `dir` and its parents while they are empty, `stop` is kept
    fn remove_empty_dirs(&self, dir: &Path, stop: &Path) -> basic::Result<()>;
}

/// [`LinkFs`] on the real filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct HostFs;

impl LinkFs for HostFs {
    fn entry_kind(&self, path: &Path) -> basic::Result<FileKind> {
        basic::fs::file_kind(path)
    }

    fn create_dir_all(&self, path: &Path) -> basic::Result<()> {
        std::fs::create_dir_all(path).map_err(basic::Error::from)
    }

    fn replace_symlink(&self, target: &Path, link: &Path) -> basic::Result<()> {
        basic::fs::symlink_atomic(target, link)
    }

    fn remove_link(&self, path: &Path) -> basic::Result<bool> {
        basic::fs::unlink_if_exists(path)
    }

    fn remove_empty_dirs(&self, dir: &Path, stop: &Path) -> basic::Result<()> {
        basic::fs::remove_dir_until(dir, stop)
    }
}

/// Counts of what one materialize call did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaterializeReport {
    /// links that did not exist
    pub created: usize,
    /// entries replaced by the planned link
    pub replaced: usize,
    /// links that were already correct
    pub unchanged: usize,
    /// stale links of the previous plan that were removed
    pub removed: usize,
}

impl MaterializeReport {
    /// whether anything on disk changed
    pub fn changed(&self) -> bool {
        self.created + self.replaced + self.removed > 0
    }
}

fn fs_error(action: &'static str, path: &Path, source: basic::Error) -> Error {
    Error::Filesystem {
        action,
        path: path.to_path_buf(),
        source,
    }
}

fn link_parent<'a>(root: &'a Path, link: &'a Path) -> &'a Path {
    match link.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => root,
    }
}

fn realize_entry<F: LinkFs + ?Sized>(
    fs: &F,
    root: &Path,
    entry: &SymlinkPlanEntry,
    report: &mut MaterializeReport,
) -> Result<()> {
    let link = root.join(entry.link_path());
    let target = entry.link_target();

    let kind = fs
        .entry_kind(&link)
        .map_err(|e| fs_error("inspect", &link, e))?;
    let state = LinkState::classify(kind, target);
    let action = match state.action() {
        Some(action) => action,
        None => {
            log::error!("{:?} is a directory, refusing to replace it with a link", link);
            return Err(fs_error(
                "replace directory",
                &link,
                basic::Error::Nix {
                    source: Errno::EISDIR,
                },
            ));
        }
    };

    if action == LinkAction::Keep {
        report.unchanged += 1;
        return Ok(());
    }

    let parent = link_parent(root, &link);
    let mut attempts = 0;
    loop {
        fs.create_dir_all(parent)
            .map_err(|e| fs_error("create directory", parent, e))?;
        match fs.replace_symlink(target, &link) {
            Ok(()) => break,
            Err(e) if e.is_not_found() && attempts < VANISHED_PARENT_RETRIES => {
                log::debug!("{:?} vanished while linking, retrying", parent);
                attempts += 1;
            }
            Err(e) => return Err(fs_error("create link", &link, e)),
        }
    }

    match state {
        LinkState::Absent => {
            log::debug!("Created {:?} -> {:?}", link, target);
            report.created += 1;
        }
        LinkState::WrongTarget(old) => {
            log::debug!("Replaced {:?} -> {:?} (was {:?})", link, target, old);
            report.replaced += 1;
        }
        _ => {
            log::debug!("Replaced non-link {:?} with a link to {:?}", link, target);
            report.replaced += 1;
        }
    }

    Ok(())
}

fn remove_stale<F: LinkFs + ?Sized>(
    fs: &F,
    root: &Path,
    entry: &SymlinkPlanEntry,
    report: &mut MaterializeReport,
) -> Result<()> {
    let link = root.join(entry.link_path());

    let kind = fs
        .entry_kind(&link)
        .map_err(|e| fs_error("inspect", &link, e))?;
    if LinkState::classify(kind, entry.link_target()) != LinkState::Correct {
        log::debug!("{:?} is no longer ours, leaving it alone", link);
        return Ok(());
    }

    if fs
        .remove_link(&link)
        .map_err(|e| fs_error("remove link", &link, e))?
    {
        log::debug!("Removed stale link {:?}", link);
        report.removed += 1;
    }

    let parent = link_parent(root, &link);
    fs.remove_empty_dirs(parent, root)
        .map_err(|e| fs_error("prune directory", parent, e))?;

    Ok(())
}

/// Make the links below `root` match `plan`.
///
/// Links already correct are left untouched. Any other entry in the way,
/// except a directory, is replaced atomically. Afterwards the links of
/// `previous` that are no longer planned are removed, but only while they
/// still hold the recorded target. The first failure aborts the call and
/// keeps everything already done, so calling again with the same plan
/// converges.
pub fn materialize<F: LinkFs + ?Sized>(
    fs: &F,
    root: &Path,
    plan: &SymlinkPlan,
    previous: Option<&SymlinkPlan>,
) -> Result<MaterializeReport> {
    let mut report = MaterializeReport::default();

    for entry in plan {
        realize_entry(fs, root, entry, &mut report)?;
    }

    if let Some(previous) = previous {
        for entry in previous
            .iter()
            .filter(|e| !plan.contains_link(e.link_path()))
        {
            remove_stale(fs, root, entry, &mut report)?;
        }
    }

    log::debug!(
        "Materialized {} links below {:?}: {} created, {} replaced, {} unchanged, {} removed",
        plan.len(),
        root,
        report.created,
        report.replaced,
        report.unchanged,
        report.removed
    );

    Ok(report)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub(crate) enum Node {
        Dir,
        File,
        Link(PathBuf),
    }

    /// in-memory LinkFs; `fail_links_after` makes the n+1-th link fail
    #[derive(Default)]
    pub(crate) struct FakeFs {
        pub(crate) nodes: Mutex<BTreeMap<PathBuf, Node>>,
        pub(crate) fail_links_after: Mutex<Option<usize>>,
        pub(crate) link_writes: Mutex<usize>,
    }

    impl FakeFs {
        pub(crate) fn with_root(root: &str) -> Self {
            let fs = FakeFs::default();
            fs.create_dir_all(Path::new(root)).unwrap();
            fs
        }

        pub(crate) fn put(&self, path: &str, node: Node) {
            let path = Path::new(path);
            self.create_dir_all(path.parent().unwrap()).unwrap();
            self.nodes.lock().unwrap().insert(path.to_path_buf(), node);
        }

        pub(crate) fn get(&self, path: &str) -> Option<Node> {
            self.nodes.lock().unwrap().get(Path::new(path)).cloned()
        }

        pub(crate) fn links(&self) -> Vec<(String, String)> {
            self.nodes
                .lock()
                .unwrap()
                .iter()
                .filter_map(|(p, n)| match n {
                    Node::Link(t) => Some((
                        p.to_string_lossy().to_string(),
                        t.to_string_lossy().to_string(),
                    )),
                    _ => None,
                })
                .collect()
        }

        fn has_children(nodes: &BTreeMap<PathBuf, Node>, dir: &Path) -> bool {
            nodes.keys().any(|p| p != dir && p.starts_with(dir))
        }
    }

    impl LinkFs for FakeFs {
        fn entry_kind(&self, path: &Path) -> basic::Result<FileKind> {
            Ok(match self.nodes.lock().unwrap().get(path) {
                None => FileKind::Missing,
                Some(Node::Dir) => FileKind::Directory,
                Some(Node::File) => FileKind::Other,
                Some(Node::Link(t)) => FileKind::Symlink(t.clone()),
            })
        }

        fn create_dir_all(&self, path: &Path) -> basic::Result<()> {
            let mut nodes = self.nodes.lock().unwrap();
            for dir in path.ancestors() {
                match nodes.get(dir) {
                    Some(Node::Dir) => {}
                    Some(_) => {
                        return Err(basic::Error::Nix {
                            source: Errno::ENOTDIR,
                        })
                    }
                    None => {
                        nodes.insert(dir.to_path_buf(), Node::Dir);
                    }
                }
            }
            Ok(())
        }

        fn replace_symlink(&self, target: &Path, link: &Path) -> basic::Result<()> {
            {
                let mut writes = self.link_writes.lock().unwrap();
                if let Some(limit) = *self.fail_links_after.lock().unwrap() {
                    if *writes >= limit {
                        return Err(basic::Error::Nix {
                            source: Errno::ENOSPC,
                        });
                    }
                }
                *writes += 1;
            }

            let mut nodes = self.nodes.lock().unwrap();
            if nodes.get(link.parent().unwrap()) != Some(&Node::Dir) {
                return Err(basic::Error::Nix {
                    source: Errno::ENOENT,
                });
            }
            if nodes.get(link) == Some(&Node::Dir) {
                return Err(basic::Error::Nix {
                    source: Errno::EISDIR,
                });
            }
            nodes.insert(link.to_path_buf(), Node::Link(target.to_path_buf()));
            Ok(())
        }

        fn remove_link(&self, path: &Path) -> basic::Result<bool> {
            let mut nodes = self.nodes.lock().unwrap();
            match nodes.get(path) {
                None => Ok(false),
                Some(Node::Dir) => Err(basic::Error::Nix {
                    source: Errno::EISDIR,
                }),
                Some(_) => {
                    nodes.remove(path);
                    Ok(true)
                }
            }
        }

        fn remove_empty_dirs(&self, dir: &Path, stop: &Path) -> basic::Result<()> {
            let mut nodes = self.nodes.lock().unwrap();
            let mut dir = dir;
            while dir != stop && dir.starts_with(stop) {
                if FakeFs::has_children(&nodes, dir) {
                    break;
                }
                nodes.remove(dir);
                dir = match dir.parent() {
                    Some(p) => p,
                    None => break,
                };
            }
            Ok(())
        }
    }

    fn fixture_plan() -> SymlinkPlan {
        SymlinkPlan::from_entries(vec![
            SymlinkPlanEntry::new("alias.service", "install.service"),
            SymlinkPlanEntry::new("in/a/dir/alias3.service", "../../../install.service"),
            SymlinkPlanEntry::new("want1.service.wants/install.service", "../install.service"),
            SymlinkPlanEntry::new("req1.service.requires/install.service", "../install.service"),
        ])
    }

    #[test]
    fn test_classify() {
        let want = Path::new("../x.service");
        let cases = [
            (FileKind::Missing, LinkState::Absent, Some(LinkAction::Create)),
            (
                FileKind::Symlink(PathBuf::from("../x.service")),
                LinkState::Correct,
                Some(LinkAction::Keep),
            ),
            (
                FileKind::Symlink(PathBuf::from("x.service")),
                LinkState::WrongTarget(PathBuf::from("x.service")),
                Some(LinkAction::Replace),
            ),
            (FileKind::Other, LinkState::NotSymlink, Some(LinkAction::Replace)),
            (FileKind::Directory, LinkState::Directory, None),
        ];

        for (kind, state, action) in cases {
            let s = LinkState::classify(kind, want);
            assert_eq!(s, state);
            assert_eq!(s.action(), action);
        }
    }

    #[test]
    fn test_fresh_then_idempotent() {
        let fs = FakeFs::with_root("/out");
        let plan = fixture_plan();

        let report = materialize(&fs, Path::new("/out"), &plan, None).unwrap();
        assert_eq!(report.created, 4);
        assert!(report.changed());
        assert_eq!(
            fs.get("/out/in/a/dir/alias3.service"),
            Some(Node::Link(PathBuf::from("../../../install.service")))
        );
        assert_eq!(fs.get("/out/in/a"), Some(Node::Dir));

        let writes = *fs.link_writes.lock().unwrap();
        let report = materialize(&fs, Path::new("/out"), &plan, Some(&plan)).unwrap();
        assert_eq!(
            report,
            MaterializeReport {
                unchanged: 4,
                ..Default::default()
            }
        );
        assert!(!report.changed());
        assert_eq!(*fs.link_writes.lock().unwrap(), writes);
    }

    #[test]
    fn test_replace_wrong_target_and_file() {
        let fs = FakeFs::with_root("/out");
        fs.put("/out/alias.service", Node::Link(PathBuf::from("old.service")));
        fs.put("/out/want1.service.wants/install.service", Node::File);

        let report = materialize(&fs, Path::new("/out"), &fixture_plan(), None).unwrap();
        assert_eq!(report.replaced, 2);
        assert_eq!(report.created, 2);
        assert_eq!(
            fs.get("/out/alias.service"),
            Some(Node::Link(PathBuf::from("install.service")))
        );
        assert_eq!(
            fs.get("/out/want1.service.wants/install.service"),
            Some(Node::Link(PathBuf::from("../install.service")))
        );
    }

    #[test]
    fn test_directory_in_the_way() {
        let fs = FakeFs::with_root("/out");
        fs.put("/out/alias.service", Node::Dir);

        match materialize(&fs, Path::new("/out"), &fixture_plan(), None) {
            Err(Error::Filesystem { path, source, .. }) => {
                assert_eq!(path, PathBuf::from("/out/alias.service"));
                assert_eq!(source.get_errno(), Errno::EISDIR as i32);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(fs.get("/out/alias.service"), Some(Node::Dir));
    }

    #[test]
    fn test_partial_failure_converges() {
        let fs = FakeFs::with_root("/out");
        let plan = fixture_plan();
        *fs.fail_links_after.lock().unwrap() = Some(2);

        let err = materialize(&fs, Path::new("/out"), &plan, None).unwrap_err();
        assert!(matches!(err, Error::Filesystem { action: "create link", .. }));
        let first_two = fs.links();
        assert_eq!(first_two.len(), 2);

        *fs.fail_links_after.lock().unwrap() = None;
        let report = materialize(&fs, Path::new("/out"), &plan, None).unwrap();
        assert_eq!(report.unchanged, 2);
        assert_eq!(report.created, 2);
        for link in first_two {
            assert!(fs.links().contains(&link));
        }
        assert_eq!(fs.links().len(), 4);
    }

    #[test]
    fn test_stale_cleanup() {
        let fs = FakeFs::with_root("/out");
        let old = fixture_plan();
        materialize(&fs, Path::new("/out"), &old, None).unwrap();
        fs.put("/out/want1.service.wants/other.service", Node::Link(PathBuf::from("../other.service")));

        let new = SymlinkPlan::from_entries(vec![SymlinkPlanEntry::new(
            "alias.service",
            "install.service",
        )]);
        let report = materialize(&fs, Path::new("/out"), &new, Some(&old)).unwrap();
        assert_eq!(report.unchanged, 1);
        assert_eq!(report.removed, 3);

        assert_eq!(fs.get("/out/in"), None);
        assert_eq!(fs.get("/out/req1.service.requires"), None);
        assert_eq!(fs.get("/out/want1.service.wants"), Some(Node::Dir));
        assert_eq!(fs.get("/out"), Some(Node::Dir));
        assert_eq!(
            fs.links(),
            vec![
                ("/out/alias.service".to_string(), "install.service".to_string()),
                (
                    "/out/want1.service.wants/other.service".to_string(),
                    "../other.service".to_string()
                ),
            ]
        );
    }

    #[test]
    fn test_stale_cleanup_respects_ownership() {
        let fs = FakeFs::with_root("/out");
        let old = fixture_plan();
        materialize(&fs, Path::new("/out"), &old, None).unwrap();
        fs.put("/out/alias.service", Node::Link(PathBuf::from("someone-else.service")));
        fs.put("/out/in/a/dir/alias3.service", Node::File);

        let report =
            materialize(&fs, Path::new("/out"), &SymlinkPlan::default(), Some(&old)).unwrap();
        assert_eq!(report.removed, 2);
        assert_eq!(
            fs.get("/out/alias.service"),
            Some(Node::Link(PathBuf::from("someone-else.service")))
        );
        assert_eq!(fs.get("/out/in/a/dir/alias3.service"), Some(Node::File));
    }

    #[test]
    fn test_report_counts_nothing_for_empty_plan() {
        let fs = FakeFs::with_root("/out");
        let report = materialize(&fs, Path::new("/out"), &SymlinkPlan::default(), None).unwrap();
        assert_eq!(report, MaterializeReport::default());
        assert_eq!(fs.links(), Vec::<(String, String)>::new());
    }
}
