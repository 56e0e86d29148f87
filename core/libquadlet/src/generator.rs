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

//! The generator run: find quadlet sources, and for each one write the
//! generated service and wire it into the output directory.
use crate::error::*;
use crate::install::InstallSpec;
use crate::manifest::{ManifestStore, PlanStore, MANIFEST_DIR};
use crate::materialize::{materialize, HostFs, LinkFs, MaterializeReport};
use crate::plan::{plan, SymlinkPlan};
use crate::translate::{PassthroughTranslator, UnitTranslator};
use crate::unit::{QuadletKind, UnitIdentity};
use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use unit_parser::prelude::UnitFile;
use walkdir::WalkDir;

/// colon separated list replacing all search directories
pub const UNIT_DIRS_ENV: &str = "QUADLET_UNIT_DIRS";

const SYSTEM_UNIT_DIRS: [&str; 3] = [
    "/run/containers/systemd",
    "/etc/containers/systemd",
    "/usr/share/containers/systemd",
];

/* per-user sources for every user live below here; system mode skips it */
const USERS_UNIT_DIR: &str = "/etc/containers/systemd/users";

/// Search directories given by the environment, the configuration or the
/// built-in defaults, in that order of preference.
pub fn unit_search_dirs(user: bool, configured: Option<&[String]>) -> Vec<PathBuf> {
    if let Ok(dirs) = std::env::var(UNIT_DIRS_ENV) {
        let dirs = split_unit_dirs(&dirs);
        if !dirs.is_empty() {
            return dirs;
        }
    }

    if let Some(dirs) = configured {
        if !dirs.is_empty() {
            return dirs.iter().map(PathBuf::from).collect();
        }
    }

    default_unit_dirs(user)
}

fn split_unit_dirs(value: &str) -> Vec<PathBuf> {
    value
        .split(':')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
        .collect()
}

/// built-in search directories for system or user mode
pub fn default_unit_dirs(user: bool) -> Vec<PathBuf> {
    if !user {
        return SYSTEM_UNIT_DIRS.iter().map(PathBuf::from).collect();
    }

    let mut dirs = Vec::new();
    if let Ok(runtime) = std::env::var("XDG_RUNTIME_DIR") {
        dirs.push(Path::new(&runtime).join("containers/systemd"));
    }

    match std::env::var("XDG_CONFIG_HOME") {
        Ok(config) if !config.is_empty() => {
            dirs.push(Path::new(&config).join("containers/systemd"))
        }
        _ => {
            if let Ok(home) = std::env::var("HOME") {
                dirs.push(Path::new(&home).join(".config/containers/systemd"));
            }
        }
    }

    let uid = nix::unistd::getuid();
    dirs.push(Path::new(USERS_UNIT_DIR).join(uid.to_string()));
    dirs.push(PathBuf::from(USERS_UNIT_DIR));
    dirs
}

/// All quadlet sources below `dirs`. A file name found in an earlier
/// directory hides the same name in later ones.
pub fn discover_sources(dirs: &[PathBuf]) -> Vec<PathBuf> {
    let mut seen = HashSet::new();
    let mut sources = Vec::new();
    let users_dir = Path::new(USERS_UNIT_DIR);

    for dir in dirs {
        let shallow = dir.as_path() == users_dir;
        let walker = WalkDir::new(dir)
            .follow_links(true)
            .sort_by_file_name()
            .max_depth(if shallow { 1 } else { usize::MAX })
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || e.path() != users_dir);

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    let missing_root = e.depth() == 0
                        && e.io_error().map(|io| io.kind()) == Some(ErrorKind::NotFound);
                    if !missing_root {
                        log::warn!("Failed to read quadlet directory entry: {}", e);
                    }
                    continue;
                }
            };

            if !entry.file_type().is_file() || QuadletKind::from_path(entry.path()).is_none()
            {
                continue;
            }

            let name = entry.file_name().to_os_string();
            if !seen.insert(name) {
                log::debug!(
                    "{:?} is hidden by an earlier file of the same name",
                    entry.path()
                );
                continue;
            }
            sources.push(entry.into_path());
        }
    }

    sources
}

/// Knobs of a generator run.
#[derive(Debug, Clone)]
pub struct GeneratorOptions {
    /// generate user units
    pub user: bool,
    /// print instead of writing
    pub dry_run: bool,
    /// worker threads
    pub jobs: usize,
    /// manifest directory name below the output directory
    pub manifest_dir: String,
    /// where the quadlet sources are searched
    pub unit_dirs: Vec<PathBuf>,
}

impl Default for GeneratorOptions {
    fn default() -> Self {
        GeneratorOptions {
            user: false,
            dry_run: false,
            jobs: 1,
            manifest_dir: MANIFEST_DIR.to_string(),
            unit_dirs: default_unit_dirs(false),
        }
    }
}

/// A source that was parsed and named, waiting to be generated.
#[derive(Debug)]
struct LoadedUnit {
    source: PathBuf,
    unit: UnitFile,
    identity: UnitIdentity,
}

/// What generating one unit produced.
#[derive(Debug)]
struct Generated {
    name: String,
    text: String,
    plan: SymlinkPlan,
    report: Option<MaterializeReport>,
}

/// Result of a whole generator run.
#[derive(Debug, Default)]
pub struct GenerateSummary {
    /// generated unit names, in source order
    pub generated: Vec<String>,
    /// one error per failed source, wrapped with its path
    pub failed: Vec<Error>,
    /// units whose stale links were removed because their source is gone
    pub pruned: Vec<String>,
}

impl GenerateSummary {
    /// true when no unit failed
    pub fn success(&self) -> bool {
        self.failed.is_empty()
    }
}

fn with_source(source: &Path, e: Error) -> Error {
    Error::Generate {
        path: source.to_path_buf(),
        source: Box::new(e),
    }
}

/// Drives the generation of every quadlet source into one output directory.
pub struct Generator {
    output_dir: PathBuf,
    options: GeneratorOptions,
    fs: Box<dyn LinkFs>,
    store: Box<dyn PlanStore>,
    translator: Box<dyn UnitTranslator>,
}

impl Generator {
    /// generator on the host filesystem with manifests and the pass-through
    /// translator
    pub fn new(output_dir: &Path, options: GeneratorOptions) -> Self {
        let store = ManifestStore::new(output_dir, &options.manifest_dir);
        Generator::with_parts(
            output_dir,
            options,
            Box::new(HostFs),
            Box::new(store),
            Box::new(PassthroughTranslator),
        )
    }

    ///
    pub fn with_parts(
        output_dir: &Path,
        options: GeneratorOptions,
        fs: Box<dyn LinkFs>,
        store: Box<dyn PlanStore>,
        translator: Box<dyn UnitTranslator>,
    ) -> Self {
        Generator {
            output_dir: output_dir.to_path_buf(),
            options,
            fs,
            store,
            translator,
        }
    }

    ///
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Generate everything found in the search directories.
    pub fn run(&self) -> GenerateSummary {
        let sources = discover_sources(&self.options.unit_dirs);
        log::debug!(
            "Found {} quadlet sources in {:?}",
            sources.len(),
            self.options.unit_dirs
        );
        self.run_sources(&sources)
    }

    /// Generate the given sources, then prune units that are gone.
    pub fn run_sources(&self, sources: &[PathBuf]) -> GenerateSummary {
        let mut summary = GenerateSummary::default();
        let loaded = self.load_all(sources, &mut summary);
        let claimed: HashSet<String> = loaded
            .iter()
            .map(|u| u.identity.name().to_string())
            .collect();

        for (unit, result) in loaded.iter().zip(self.generate_all(&loaded)) {
            match result {
                Ok(generated) => {
                    match &generated.report {
                        Some(report) if report.changed() => log::info!(
                            "{}: {} links created, {} replaced, {} removed",
                            generated.name,
                            report.created,
                            report.replaced,
                            report.removed
                        ),
                        Some(_) => log::debug!("{}: links up to date", generated.name),
                        None => print_dry_run(&generated),
                    }
                    summary.generated.push(generated.name);
                }
                Err(e) => {
                    let e = with_source(&unit.source, e);
                    log::error!("{}", e);
                    summary.failed.push(e);
                }
            }
        }

        if !self.options.dry_run {
            self.prune_orphans(&claimed, &mut summary);
        }

        log::info!(
            "Generated {} units, {} failed, {} pruned",
            summary.generated.len(),
            summary.failed.len(),
            summary.pruned.len()
        );
        summary
    }

    /* sequential so the first source of a generated name wins */
    fn load_all(&self, sources: &[PathBuf], summary: &mut GenerateSummary) -> Vec<LoadedUnit> {
        let mut claimed: HashSet<String> = HashSet::new();
        let mut loaded = Vec::new();

        for source in sources {
            let unit = match UnitFile::load(source)
                .context(UnitParseSnafu)
                .and_then(|unit| {
                    UnitIdentity::from_source(source, &unit, &self.output_dir)
                        .map(|identity| (unit, identity))
                }) {
                Ok((unit, identity)) => LoadedUnit {
                    source: source.clone(),
                    unit,
                    identity,
                },
                Err(e) => {
                    let e = with_source(source, e);
                    log::error!("{}", e);
                    summary.failed.push(e);
                    continue;
                }
            };

            if !claimed.insert(unit.identity.name().to_string()) {
                log::warn!(
                    "{:?} generates {}, which an earlier source already generates, skipping it",
                    source,
                    unit.identity.name()
                );
                continue;
            }
            loaded.push(unit);
        }

        loaded
    }

    /// Run the per-unit pipeline on a bounded pool of worker threads,
    /// results come back in the order of `units`.
    fn generate_all(&self, units: &[LoadedUnit]) -> Vec<Result<Generated>> {
        let jobs = self.options.jobs.max(1).min(units.len().max(1));
        let queue = Mutex::new(units.iter().enumerate());
        let results: Mutex<Vec<(usize, Result<Generated>)>> =
            Mutex::new(Vec::with_capacity(units.len()));

        std::thread::scope(|s| {
            for _ in 0..jobs {
                s.spawn(|| loop {
                    let next = queue.lock().unwrap_or_else(|e| e.into_inner()).next();
                    let (idx, unit) = match next {
                        Some(next) => next,
                        None => break,
                    };
                    let result = self.generate_unit(unit);
                    results
                        .lock()
                        .unwrap_or_else(|e| e.into_inner())
                        .push((idx, result));
                });
            }
        });

        let mut results = results.into_inner().unwrap_or_else(|e| e.into_inner());
        results.sort_by_key(|(idx, _)| *idx);
        results.into_iter().map(|(_, r)| r).collect()
    }

    fn generate_unit(&self, loaded: &LoadedUnit) -> Result<Generated> {
        let identity = &loaded.identity;
        let name = identity.name();

        let spec = InstallSpec::from_unit(&loaded.unit)?;
        let plan = plan(identity, &spec)?;
        let text = self
            .translator
            .translate(&loaded.source, &loaded.unit, identity)?;

        if self.options.dry_run {
            return Ok(Generated {
                name: name.to_string(),
                text,
                plan,
                report: None,
            });
        }

        let unit_path = identity.unit_path();
        basic::fs::write_file_atomic(&unit_path, text.as_bytes(), 0o644).context(
            FilesystemSnafu {
                action: "write unit",
                path: unit_path.clone(),
            },
        )?;

        let previous = self.store.load(name);
        let owned = match &previous {
            Some(previous) => plan.union(previous),
            None => plan.clone(),
        };
        if !owned.is_empty() && previous.as_ref() != Some(&owned) {
            self.store.store(name, &owned)?;
        }

        let report = materialize(
            self.fs.as_ref(),
            &self.output_dir,
            &plan,
            previous.as_ref(),
        )?;

        if plan.is_empty() {
            self.store.remove(name)?;
        } else if owned != plan {
            self.store.store(name, &plan)?;
        }

        log::debug!("Generated {} from {:?}", name, loaded.source);
        Ok(Generated {
            name: name.to_string(),
            text,
            plan,
            report: Some(report),
        })
    }

    fn prune_orphans(&self, claimed: &HashSet<String>, summary: &mut GenerateSummary) {
        for unit in self.store.units() {
            if claimed.contains(&unit) {
                continue;
            }

            let previous = self.store.load(&unit);
            let result = materialize(
                self.fs.as_ref(),
                &self.output_dir,
                &SymlinkPlan::default(),
                previous.as_ref(),
            )
            .and_then(|_| self.store.remove(&unit));

            match result {
                Ok(()) => {
                    log::info!("Removed the links of {}, its source is gone", unit);
                    summary.pruned.push(unit);
                }
                Err(e) => {
                    log::error!("Failed to remove the links of {}: {}", unit, e);
                    summary.failed.push(e);
                }
            }
        }
    }
}

fn print_dry_run(generated: &Generated) {
    println!("---{}---", generated.name);
    print!("{}", generated.text);
    for entry in &generated.plan {
        println!(
            "# link {} -> {}",
            entry.link_path().display(),
            entry.link_target().display()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::materialize::tests::FakeFs;
    use std::collections::BTreeMap;
    use std::fs;
    use tempfile::tempdir;

    #[derive(Default)]
    struct MemStore {
        plans: Mutex<BTreeMap<String, SymlinkPlan>>,
    }

    impl PlanStore for MemStore {
        fn load(&self, unit: &str) -> Option<SymlinkPlan> {
            self.plans.lock().unwrap().get(unit).cloned()
        }

        fn store(&self, unit: &str, plan: &SymlinkPlan) -> Result<()> {
            self.plans
                .lock()
                .unwrap()
                .insert(unit.to_string(), plan.clone());
            Ok(())
        }

        fn remove(&self, unit: &str) -> Result<()> {
            self.plans.lock().unwrap().remove(unit);
            Ok(())
        }

        fn units(&self) -> Vec<String> {
            self.plans.lock().unwrap().keys().cloned().collect()
        }
    }

    #[test]
    fn test_split_unit_dirs() {
        assert_eq!(
            split_unit_dirs("/a: /b ::/c/d"),
            vec![
                PathBuf::from("/a"),
                PathBuf::from("/b"),
                PathBuf::from("/c/d")
            ]
        );
        assert!(split_unit_dirs(" : ").is_empty());
    }

    #[test]
    fn test_default_dirs() {
        assert_eq!(
            default_unit_dirs(false),
            vec![
                PathBuf::from("/run/containers/systemd"),
                PathBuf::from("/etc/containers/systemd"),
                PathBuf::from("/usr/share/containers/systemd"),
            ]
        );

        let user = default_unit_dirs(true);
        assert_eq!(user.last(), Some(&PathBuf::from(USERS_UNIT_DIR)));
        assert_eq!(
            user[user.len() - 2],
            Path::new(USERS_UNIT_DIR).join(nix::unistd::getuid().to_string())
        );
    }

    #[test]
    fn test_discover_first_name_wins() {
        let a = tempdir().unwrap();
        let b = tempdir().unwrap();
        fs::create_dir_all(a.path().join("nested")).unwrap();
        fs::write(a.path().join("nested/web.container"), "").unwrap();
        fs::write(a.path().join("notes.txt"), "").unwrap();
        fs::write(b.path().join("web.container"), "").unwrap();
        fs::write(b.path().join("db.volume"), "").unwrap();

        let found = discover_sources(&[
            a.path().to_path_buf(),
            b.path().to_path_buf(),
            PathBuf::from("/nonexistent/quadlets"),
        ]);
        assert_eq!(
            found,
            vec![a.path().join("nested/web.container"), b.path().join("db.volume")]
        );
    }

    fn fake_generator(sources: &Path, jobs: usize, dry_run: bool) -> Generator {
        let options = GeneratorOptions {
            dry_run,
            jobs,
            unit_dirs: vec![sources.to_path_buf()],
            ..Default::default()
        };
        Generator::with_parts(
            Path::new("/out"),
            options,
            Box::new(FakeFs::with_root("/out")),
            Box::new(MemStore::default()),
            Box::new(PassthroughTranslator),
        )
    }

    #[test]
    fn test_duplicate_generated_name_is_skipped() {
        let src = tempdir().unwrap();
        fs::write(
            src.path().join("a.container"),
            "[Container]\nServiceName=web\n[Install]\nAlias=a-alias.service\n",
        )
        .unwrap();
        fs::write(
            src.path().join("web.container"),
            "[Install]\nAlias=web-alias.service\n",
        )
        .unwrap();

        let gen = fake_generator(src.path(), 1, true);
        let summary = gen.run();
        assert!(summary.success());
        assert_eq!(summary.generated, vec!["web.service".to_string()]);
    }

    #[test]
    fn test_failures_are_reported_per_source() {
        let src = tempdir().unwrap();
        fs::write(
            src.path().join("bad.container"),
            "[Install]\nAlias=../escape.service\n",
        )
        .unwrap();
        fs::write(src.path().join("broken.pod"), "[Pod\n").unwrap();
        fs::write(
            src.path().join("good.network"),
            "[Install]\nWantedBy=multi-user.target\n",
        )
        .unwrap();

        let gen = fake_generator(src.path(), 3, true);
        let summary = gen.run();
        assert!(!summary.success());
        assert_eq!(summary.generated, vec!["good-network.service".to_string()]);
        assert_eq!(summary.failed.len(), 2);

        let bad = summary
            .failed
            .iter()
            .find(|e| matches!(e.root(), Error::UnsafeAliasPath { .. }))
            .unwrap();
        assert!(bad.to_string().contains("bad.container"));
        assert!(summary
            .failed
            .iter()
            .any(|e| matches!(e.root(), Error::UnitParse { .. })));
    }

    #[test]
    fn test_pool_keeps_source_order() {
        let src = tempdir().unwrap();
        for i in 0..12 {
            fs::write(
                src.path().join(format!("c{:02}.container", i)),
                "[Install]\nWantedBy=default.target\n",
            )
            .unwrap();
        }

        let gen = fake_generator(src.path(), 4, true);
        let summary = gen.run();
        let expected: Vec<String> = (0..12).map(|i| format!("c{:02}.service", i)).collect();
        assert_eq!(summary.generated, expected);
    }

    #[test]
    fn test_orphans_are_pruned() {
        let src = tempdir().unwrap();
        let out = tempdir().unwrap();
        fs::write(
            src.path().join("keep.container"),
            "[Install]\nWantedBy=default.target\n",
        )
        .unwrap();
        fs::write(
            src.path().join("gone.container"),
            "[Install]\nWantedBy=default.target\nAlias=gone-alias.service\n",
        )
        .unwrap();

        let options = GeneratorOptions {
            jobs: 2,
            unit_dirs: vec![src.path().to_path_buf()],
            ..Default::default()
        };
        let gen = Generator::new(out.path(), options);
        assert!(gen.run().success());
        assert!(out.path().join("gone-alias.service").exists());

        fs::remove_file(src.path().join("gone.container")).unwrap();
        let summary = gen.run();
        assert!(summary.success());
        assert_eq!(summary.pruned, vec!["gone.service".to_string()]);
        assert!(!basic::fs::is_symlink(&out.path().join("gone-alias.service")));
        assert!(!basic::fs::is_symlink(
            &out.path().join("default.target.wants/gone.service")
        ));
        assert!(basic::fs::is_symlink(
            &out.path().join("default.target.wants/keep.service")
        ));
    }

    #[test]
    fn test_dry_run_touches_nothing() {
        let src = tempdir().unwrap();
        fs::write(
            src.path().join("web.container"),
            "[Install]\nAlias=www.service\n",
        )
        .unwrap();

        let fake = FakeFs::with_root("/out");
        let options = GeneratorOptions {
            dry_run: true,
            unit_dirs: vec![src.path().to_path_buf()],
            ..Default::default()
        };
        let gen = Generator::with_parts(
            Path::new("/out"),
            options,
            Box::new(fake),
            Box::new(MemStore::default()),
            Box::new(PassthroughTranslator),
        );
        let summary = gen.run();
        assert_eq!(summary.generated, vec!["web.service".to_string()]);
        assert!(summary.pruned.is_empty());
        assert!(!Path::new("/out/web.service").exists());
    }
}
