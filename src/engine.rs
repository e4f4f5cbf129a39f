//! Orchestration of the whole extraction and publication process.
//!
//! The engine walks `(suite × section × architecture)`, seeds the contents
//! index, fans package extraction out over the worker pool, publishes
//! per-suite catalog files, hints and media, renders reports and owns the
//! maintenance verbs (`cleanup`, `remove-found`, `forget`, `info`).

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{Result, bail};
use rayon::prelude::*;
use tracing::{debug, error, info, warn};

use crate::backends::{Package, PackageIndex, PackageRef, dummy::FakePackage};
use crate::config::{Config, DataType, IconState, Suite};
use crate::contentsstore::ContentsStore;
use crate::cptmodifiers::InjectedModifications;
use crate::datastore::DataStore;
use crate::extractor::DataExtractor;
use crate::iconhandler::IconHandler;
use crate::reportgenerator::ReportGenerator;
use crate::result::GeneratorResult;
use crate::utils::copy_dir;
use crate::zarchive::{ArchiveCompressor, ArchiveType, compress_and_save};

/// File paths that make a package worth extracting.
fn is_interesting_file(path: &str) -> bool {
    (path.starts_with("/usr/share/applications/") && path.ends_with(".desktop"))
        || (path.starts_with("/usr/share/metainfo/") && path.ends_with(".xml"))
        || (path.starts_with("/usr/share/appdata/") && path.ends_with(".xml"))
}

/// The top-level generator driver.
pub struct Engine {
    conf: Arc<Config>,
    pkg_index: PackageIndex,
    dstore: Arc<DataStore>,
    cstore: Arc<ContentsStore>,
    forced: bool,
}

impl Engine {
    /// Open the stores and instantiate the configured backend.
    pub fn new(conf: Arc<Config>) -> Result<Self> {
        let pkg_index = PackageIndex::for_config(&conf)?;
        let dstore = Arc::new(DataStore::open_with_config(&conf)?);
        let cstore = Arc::new(ContentsStore::open(&conf.database_dir().join("contents"))?);

        info!(
            version = env!("CARGO_PKG_VERSION"),
            backend = conf.backend.name(),
            "generator initialized"
        );
        Ok(Self {
            conf,
            pkg_index,
            dstore,
            cstore,
            forced: false,
        })
    }

    /// Whether forced reprocessing is enabled.
    #[must_use]
    pub fn forced(&self) -> bool {
        self.forced
    }

    /// Enable or disable forced reprocessing.
    pub fn set_forced(&mut self, v: bool) {
        self.forced = v;
    }

    fn check_suite_usable(&self, suite_name: &str) -> Result<Suite> {
        let Some(suite) = self.conf.suite(suite_name) else {
            bail!("suite '{suite_name}' does not exist in the configuration");
        };
        if suite.sections.is_empty() {
            bail!("suite '{suite_name}' has no sections");
        }
        if suite.architectures.is_empty() {
            bail!("suite '{suite_name}' has no architectures");
        }
        if let Some(base) = &suite.base_suite
            && self.conf.suite(base).is_none()
        {
            bail!("base suite '{base}' of suite '{suite_name}' does not exist");
        }
        Ok(suite.clone())
    }

    /// What: Seed the contents index for one triple.
    ///
    /// Output:
    /// - `true` when new, interesting packages showed up
    ///
    /// Details:
    /// - Packages without desktop/metainfo data are marked `ignore` in
    ///   the data store so later runs skip them quickly.
    fn seed_contents_data(&self, suite: &Suite, section: &str, arch: &str) -> Result<bool> {
        info!(suite = %suite.name, section, arch, "seeding contents data");

        let pkgs = self
            .pkg_index
            .packages_for(&suite.name, section, arch, false)?;

        let mut has_new_interesting = false;
        for pkg in &pkgs {
            let pkid = pkg.id();

            let contents = if self.cstore.package_exists(&pkid)? && !self.forced {
                self.cstore.get_contents(&pkid)?
            } else {
                let contents = match pkg.contents() {
                    Ok(c) => c,
                    Err(e) => {
                        warn!(pkid = %pkid, error = %e, "unable to read package contents");
                        pkg.finish();
                        continue;
                    }
                };
                self.cstore.add_contents(&pkid, &contents)?;
                pkg.finish();
                contents
            };

            if self.dstore.package_exists(&pkid)? {
                continue;
            }
            if contents.iter().any(|f| is_interesting_file(f)) {
                has_new_interesting = true;
            } else {
                // nothing this package could contribute; skip it in all
                // future runs
                self.dstore.set_package_ignore(&pkid)?;
            }
        }

        Ok(has_new_interesting)
    }

    /// The icon-search candidate set: packages of this triple plus the
    /// base suite's, keyed by package ID.
    fn icon_candidate_packages(
        &self,
        suite: &Suite,
        section: &str,
        arch: &str,
    ) -> Result<HashMap<String, PackageRef>> {
        let mut map = HashMap::new();
        if let Some(base) = &suite.base_suite {
            for pkg in self.pkg_index.packages_for(base, section, arch, false)? {
                map.insert(pkg.id(), pkg);
            }
        }
        for pkg in self.pkg_index.packages_for(&suite.name, section, arch, true)? {
            map.insert(pkg.id(), pkg);
        }
        Ok(map)
    }

    /// What: Extract a set of packages in parallel.
    ///
    /// Details:
    /// - Extraction failures and panics become `internal-error` hints on
    ///   the affected package; store errors abort the run.
    fn process_packages(
        &self,
        pkgs: &[PackageRef],
        iconh: &IconHandler,
        inj_mods: &InjectedModifications,
    ) -> Result<()> {
        let to_process: Vec<&PackageRef> = pkgs
            .iter()
            .filter(|pkg| {
                self.forced
                    || !self
                        .dstore
                        .package_exists(&pkg.id())
                        .unwrap_or(false)
            })
            .collect();
        if to_process.is_empty() {
            return Ok(());
        }
        info!(count = to_process.len(), "processing packages");

        let store_errors: Mutex<Vec<anyhow::Error>> = Mutex::new(Vec::new());
        to_process.par_iter().for_each(|&pkg| {
            let extractor = DataExtractor::new(&self.conf, &self.dstore, iconh, Some(inj_mods));

            let outcome = catch_unwind(AssertUnwindSafe(|| extractor.process_package(pkg)));
            let mut gres = match outcome {
                Ok(Ok(gres)) => gres,
                Ok(Err(e)) => {
                    warn!(pkid = %pkg.id(), error = %e, "extraction failed");
                    let mut gres = GeneratorResult::empty_for(PackageRef::clone(pkg));
                    gres.add_hint_msg("", "internal-error", &e.to_string());
                    pkg.finish();
                    gres
                }
                Err(panic) => {
                    let msg = panic
                        .downcast_ref::<String>()
                        .cloned()
                        .or_else(|| panic.downcast_ref::<&str>().map(|s| (*s).to_string()))
                        .unwrap_or_else(|| "unknown panic during extraction".to_string());
                    error!(pkid = %pkg.id(), panic = %msg, "extraction panicked");
                    let mut gres = GeneratorResult::empty_for(PackageRef::clone(pkg));
                    gres.add_hint_msg("", "internal-error", &msg);
                    pkg.finish();
                    gres
                }
            };

            if let Err(e) =
                self.dstore
                    .add_generator_result(self.conf.metadata_type, &mut gres, self.forced)
            {
                if let Ok(mut errors) = store_errors.lock() {
                    errors.push(e);
                }
            } else {
                debug!(
                    pkid = %gres.pkid(),
                    components = gres.components_count(),
                    hints = gres.hints_count(),
                    "processed package"
                );
            }
        });

        let mut errors = store_errors
            .into_inner()
            .map_err(|_| anyhow::anyhow!("store error collection lock poisoned"))?;
        if let Some(e) = errors.pop() {
            return Err(e.context("failed to write extraction results"));
        }
        Ok(())
    }

    /// Feed repo-owner supplied metainfo through the extractor as a fake
    /// package.
    fn process_extra_metainfo(
        &self,
        suite: &Suite,
        iconh: &IconHandler,
        arch: &str,
        inj_mods: &InjectedModifications,
    ) -> Result<()> {
        let Some(extra_dir) = &suite.extra_metainfo_dir else {
            return Ok(());
        };

        let mut file_map: BTreeMap<String, PathBuf> = BTreeMap::new();
        for entry in walkdir::WalkDir::new(extra_dir).max_depth(2) {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let fname = entry.file_name().to_string_lossy();
            if !fname.ends_with(".xml") {
                continue;
            }
            file_map.insert(
                format!("/usr/share/metainfo/{fname}"),
                entry.path().to_path_buf(),
            );
        }
        if file_map.is_empty() {
            return Ok(());
        }

        info!(suite = %suite.name, arch, files = file_map.len(), "processing injected extra metainfo");
        let fake_pkg: PackageRef = Arc::new(FakePackage::new(&suite.name, arch, file_map));

        let extractor = DataExtractor::new(&self.conf, &self.dstore, iconh, Some(inj_mods));
        let mut gres = extractor.process_package(&fake_pkg)?;
        self.dstore
            .add_generator_result(self.conf.metadata_type, &mut gres, true)?;
        Ok(())
    }

    /// Scan and extract one section of a suite.
    fn process_suite_section(&self, suite: &Suite, section: &str) -> Result<()> {
        let inj_mods = InjectedModifications::new();
        inj_mods.load_for_suite(suite)?;

        for arch in &suite.architectures {
            let changed = self
                .pkg_index
                .has_changes(&self.dstore, &suite.name, section, arch)?;
            if !changed && !self.forced {
                info!(suite = %suite.name, section, arch, "index unchanged, skipping extraction");
                continue;
            }

            match self.seed_contents_data(suite, section, arch) {
                Ok(seeded) => {
                    if !seeded && !self.forced {
                        info!(suite = %suite.name, section, arch, "no new interesting packages");
                        continue;
                    }
                }
                Err(e) => {
                    // an unreadable index costs this section only
                    warn!(suite = %suite.name, section, arch, error = %e, "unable to seed contents data");
                    continue;
                }
            }

            let pkgs = self
                .pkg_index
                .packages_for(&suite.name, section, arch, true)?;
            let candidates = self.icon_candidate_packages(suite, section, arch)?;
            let iconh = IconHandler::new(
                &self.cstore,
                self.dstore.media_export_pool_dir(),
                &candidates,
                suite.icon_theme.as_deref(),
                None,
                &self.conf,
            )?;

            self.process_packages(&pkgs, &iconh, &inj_mods)?;
            self.process_extra_metainfo(suite, &iconh, arch, &inj_mods)?;
        }

        Ok(())
    }

    /// The catalog header for one published metadata file.
    fn metadata_head(&self, suite: &Suite, section: &str) -> String {
        let origin = format!("{}-{}", suite.name, section);
        match self.conf.metadata_type {
            DataType::Xml => format!(
                "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<components version=\"{}\" origin=\"{}\">",
                self.conf.format_version, origin
            ),
            DataType::Yaml => {
                let mut head = format!(
                    "---\nFile: DEP-11\nVersion: '{}'\nOrigin: {}",
                    self.conf.format_version, origin
                );
                if !self.conf.media_base_url.is_empty() {
                    head.push_str(&format!("\nMediaBaseUrl: {}/pool", self.conf.media_base_url));
                }
                head
            }
        }
    }

    /// What: Write the catalog file of one triple.
    ///
    /// Details:
    /// - Fragments of all active gcids reachable from the given packages
    ///   are concatenated under the catalog header and stored as
    ///   `Components-<arch>.<ext>.gz` plus an `.xz` variant.
    fn export_metadata(
        &self,
        suite: &Suite,
        section: &str,
        arch: &str,
        pkgs: &[PackageRef],
    ) -> Result<()> {
        let dtype = self.conf.metadata_type;

        let mut gcids: Vec<String> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        for pkg in pkgs {
            for gcid in self.dstore.get_gcids_for_package(&pkg.id())? {
                if seen.insert(gcid.clone()) {
                    gcids.push(gcid);
                }
            }
        }

        let mut data = self.metadata_head(suite, section);
        let mut exported = 0usize;
        for gcid in &gcids {
            let Some(fragment) = self.dstore.get_metadata(dtype, gcid)? else {
                warn!(gcid = %gcid, "active component has no stored metadata");
                continue;
            };
            match dtype {
                DataType::Xml => {
                    data.push('\n');
                    data.push_str(&fragment);
                }
                DataType::Yaml => {
                    data.push_str("\n---\n");
                    data.push_str(&fragment);
                }
            }
            exported += 1;
        }
        if dtype == DataType::Xml {
            data.push_str("\n</components>\n");
        } else {
            data.push('\n');
        }

        let ext = match dtype {
            DataType::Xml => "xml",
            DataType::Yaml => "yml",
        };
        let export_dir = self
            .conf
            .data_export_dir()
            .join(&suite.name)
            .join(section);
        fs::create_dir_all(&export_dir)?;

        let base = export_dir.join(format!("Components-{arch}.{ext}"));
        let gz_name = PathBuf::from(format!("{}.gz", base.display()));
        let xz_name = PathBuf::from(format!("{}.xz", base.display()));
        compress_and_save(data.as_bytes(), &gz_name, ArchiveType::Gzip)?;
        compress_and_save(data.as_bytes(), &xz_name, ArchiveType::Xz)?;

        info!(
            suite = %suite.name,
            section,
            arch,
            components = exported,
            "exported catalog metadata"
        );
        Ok(())
    }

    /// Write the hints export artifact of one triple.
    fn export_hints(&self, suite: &Suite, section: &str, arch: &str, pkgs: &[PackageRef]) -> Result<()> {
        let mut docs: Vec<serde_json::Value> = Vec::new();
        for pkg in pkgs {
            if let Some(hints_json) = self.dstore.get_hints(&pkg.id())?
                && let Ok(doc) = serde_json::from_str(&hints_json)
            {
                docs.push(doc);
            }
        }

        let export_dir = self
            .conf
            .hints_export_dir()
            .join(&suite.name)
            .join(section);
        fs::create_dir_all(&export_dir)?;
        let fname = export_dir.join(format!("Hints-{arch}.json.gz"));
        let body = serde_json::to_string(&docs)?;
        compress_and_save(body.as_bytes(), &fname, ArchiveType::Gzip)?;
        Ok(())
    }

    /// Bundle the cached icons of a section into per-size tarballs.
    fn export_icon_tarballs(&self, suite: &Suite, section: &str, pkgs: &[PackageRef]) -> Result<()> {
        let mut gcids: HashSet<String> = HashSet::new();
        for pkg in pkgs {
            gcids.extend(self.dstore.get_gcids_for_package(&pkg.id())?);
        }

        let export_dir = self
            .conf
            .data_export_dir()
            .join(&suite.name)
            .join(section);

        for (size, state) in self.conf.icon_policy.iter() {
            if matches!(state, IconState::Ignored | IconState::RemoteOnly) {
                continue;
            }
            let tar_fname = export_dir.join(format!("icons-{size}.tar.gz"));
            let mut compressor = ArchiveCompressor::new(ArchiveType::Gzip);
            compressor.open(&tar_fname)?;

            let mut added = 0usize;
            for gcid in &gcids {
                let icon_dir = self
                    .dstore
                    .media_export_pool_dir()
                    .join(gcid)
                    .join("icons")
                    .join(size.to_string());
                let Ok(entries) = fs::read_dir(&icon_dir) else { continue };
                for entry in entries.flatten() {
                    if entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                        let leaf = entry.file_name().to_string_lossy().into_owned();
                        compressor.add_file(&entry.path(), Some(&leaf))?;
                        added += 1;
                    }
                }
            }
            compressor.close()?;
            debug!(suite = %suite.name, section, size = %size, icons = added, "exported icon tarball");
        }
        Ok(())
    }

    /// Copy (hardlink) the media of an immutable suite into its own tree.
    fn export_suite_media(&self, suite: &Suite, pkgs: &[PackageRef]) -> Result<()> {
        if !suite.is_immutable || !self.conf.feature.immutable_suites {
            return Ok(());
        }

        let mut gcids: HashSet<String> = HashSet::new();
        for pkg in pkgs {
            gcids.extend(self.dstore.get_gcids_for_package(&pkg.id())?);
        }

        let suite_media_dir = self.conf.media_export_dir().join(&suite.name);
        for gcid in &gcids {
            let src = self.dstore.media_export_pool_dir().join(gcid);
            if !src.is_dir() {
                continue;
            }
            let dest = suite_media_dir.join(gcid);
            if dest.exists() {
                continue;
            }
            copy_dir(&src, &dest, true)?;
        }
        Ok(())
    }

    /// Export metadata, hints, icons and reports for one section.
    fn publish_suite_section(
        &self,
        suite: &Suite,
        section: &str,
        rgen: &ReportGenerator<'_>,
    ) -> Result<()> {
        let mut section_pkgs: Vec<PackageRef> = Vec::new();
        for arch in &suite.architectures {
            let pkgs = self
                .pkg_index
                .packages_for(&suite.name, section, arch, true)?;
            self.export_metadata(suite, section, arch, &pkgs)?;
            self.export_hints(suite, section, arch, &pkgs)?;
            section_pkgs.extend(pkgs);
        }

        self.export_icon_tarballs(suite, section, &section_pkgs)?;
        self.export_suite_media(suite, &section_pkgs)?;
        rgen.process_for(&suite.name, section, &section_pkgs)?;
        Ok(())
    }

    fn run_suite(&self, suite_name: &str, only_section: Option<&str>) -> Result<()> {
        let suite = self.check_suite_usable(suite_name)?;
        let rgen = ReportGenerator::new(&self.conf, &self.dstore);

        for section in &suite.sections {
            if let Some(only) = only_section
                && section != only
            {
                continue;
            }
            self.process_suite_section(&suite, section)?;
            self.publish_suite_section(&suite, section, &rgen)?;
        }

        rgen.update_index_pages()?;
        rgen.export_statistics()?;
        self.pkg_index.release();
        Ok(())
    }

    /// Process metadata for all suites.
    pub fn run_all(&self) -> Result<()> {
        let suite_names: Vec<String> = self.conf.suites.iter().map(|s| s.name.clone()).collect();
        for name in suite_names {
            self.run_suite(&name, None)?;
        }
        Ok(())
    }

    /// Process metadata for one suite (and optionally one section).
    pub fn run(&self, suite_name: &str, section: Option<&str>) -> Result<()> {
        if let Some(section_name) = section {
            let suite = self.check_suite_usable(suite_name)?;
            if !suite.sections.iter().any(|s| s == section_name) {
                bail!("suite '{suite_name}' has no section '{section_name}'");
            }
        }
        self.run_suite(suite_name, section)
    }

    /// Publish (export + reports) without extracting new data.
    pub fn publish(&self, suite_name: &str, section: Option<&str>) -> Result<()> {
        let suite = self.check_suite_usable(suite_name)?;
        let rgen = ReportGenerator::new(&self.conf, &self.dstore);

        for sec in &suite.sections {
            if let Some(only) = section
                && sec != only
            {
                continue;
            }
            self.publish_suite_section(&suite, sec, &rgen)?;
        }
        rgen.update_index_pages()?;
        rgen.export_statistics()?;
        self.pkg_index.release();
        Ok(())
    }

    /// Process individual package files through the extractor.
    pub fn process_file(&self, suite_name: &str, section: &str, files: &[String]) -> Result<()> {
        let suite = self.check_suite_usable(suite_name)?;
        let inj_mods = InjectedModifications::new();
        inj_mods.load_for_suite(&suite)?;

        for fname in files {
            let Some(pkg) = self.pkg_index.package_for_file(fname, suite_name, section)? else {
                bail!("the selected backend can not process individual package files");
            };
            let pkid = pkg.id();
            info!(pkid = %pkid, file = %fname, "processing single package file");

            let contents = pkg.contents()?;
            self.cstore.add_contents(&pkid, &contents)?;

            let mut candidates = HashMap::new();
            candidates.insert(pkid.clone(), PackageRef::clone(&pkg));
            let iconh = IconHandler::new(
                &self.cstore,
                self.dstore.media_export_pool_dir(),
                &candidates,
                suite.icon_theme.as_deref(),
                None,
                &self.conf,
            )?;

            let extractor = DataExtractor::new(&self.conf, &self.dstore, &iconh, Some(&inj_mods));
            let mut gres = extractor.process_package(&pkg)?;
            self.dstore
                .add_generator_result(self.conf.metadata_type, &mut gres, true)?;
            info!(
                pkid = %pkid,
                components = gres.components_count(),
                hints = gres.hints_count(),
                "processed package file"
            );
        }
        Ok(())
    }

    /// What: Remove all traces of packages no longer in any index, then
    /// sweep orphaned metadata and media.
    pub fn run_cleanup(&self) -> Result<()> {
        info!("collecting information about alive packages");
        let mut alive: HashSet<String> = HashSet::new();
        for suite in &self.conf.suites {
            for section in &suite.sections {
                for arch in &suite.architectures {
                    match self
                        .pkg_index
                        .packages_for(&suite.name, section, arch, false)
                    {
                        Ok(pkgs) => alive.extend(pkgs.iter().map(|p| p.id())),
                        Err(e) => {
                            warn!(
                                suite = %suite.name,
                                section,
                                arch,
                                error = %e,
                                "unable to enumerate packages during cleanup"
                            );
                        }
                    }
                }
            }
        }
        self.pkg_index.release();

        let known = self.dstore.get_package_id_set()?;
        let stale: HashSet<String> = known.difference(&alive).cloned().collect();
        if !stale.is_empty() {
            info!(count = stale.len(), "removing stale packages");
            self.dstore.remove_packages(&stale)?;
            self.cstore.remove_packages(&stale)?;
        }

        let known_contents = self.cstore.get_package_id_set()?;
        let stale_contents: HashSet<String> =
            known_contents.difference(&alive).cloned().collect();
        if !stale_contents.is_empty() {
            self.cstore.remove_packages(&stale_contents)?;
        }

        self.dstore.cleanup_cruft(&self.conf)?;
        Ok(())
    }

    /// Drop all packages of a suite that produced components or hints, so
    /// they get reprocessed on the next run.
    pub fn remove_hints_components(&self, suite_name: &str) -> Result<()> {
        let suite = self.check_suite_usable(suite_name)?;

        let mut to_remove: HashSet<String> = HashSet::new();
        for section in &suite.sections {
            for arch in &suite.architectures {
                let pkgs = self
                    .pkg_index
                    .packages_for(&suite.name, section, arch, false)?;
                for pkg in pkgs {
                    let pkid = pkg.id();
                    if let Some(value) = self.dstore.get_package_value(&pkid)?
                        && value != "ignore"
                    {
                        to_remove.insert(pkid);
                    }
                }
            }
        }
        self.pkg_index.release();

        info!(count = to_remove.len(), suite = %suite.name, "dropping processed packages");
        self.dstore.remove_packages(&to_remove)?;
        Ok(())
    }

    /// Forget everything about a package ID or package-name prefix.
    pub fn forget_package(&self, identifier: &str) -> Result<()> {
        if identifier.split('/').count() == 3 {
            // a complete package ID
            self.dstore.remove_package(identifier)?;
            self.cstore.remove_package(identifier)?;
            info!(pkid = %identifier, "removed package");
            return Ok(());
        }

        let pkids = self.dstore.get_pkids_matching(identifier)?;
        for pkid in &pkids {
            self.dstore.remove_package(pkid)?;
            self.cstore.remove_package(pkid)?;
            debug!(pkid = %pkid, "removed package");
        }
        info!(count = pkids.len(), prefix = %identifier, "forgot matching packages");
        Ok(())
    }

    /// What: Print all stored information about one package.
    ///
    /// Output:
    /// - `false` for malformed identifiers (a full `name/version/arch`
    ///   ID is required)
    #[allow(clippy::print_stdout)]
    pub fn print_package_info(&self, identifier: &str) -> Result<bool> {
        if identifier.split('/').count() != 3 {
            eprintln!(
                "Please enter a full package-id in the format name/version/arch to get information about a package."
            );
            return Ok(false);
        }

        println!("== {identifier} ==");
        match self.dstore.get_package_value(identifier)? {
            Some(value) => {
                println!("Contents:");
                for line in value.split('\n') {
                    println!("  {line}");
                }
            }
            None => println!("Contents: (none)"),
        }

        for gcid in self.dstore.get_gcids_for_package(identifier)? {
            if let Some(mdata) = self.dstore.get_metadata(self.conf.metadata_type, &gcid)? {
                println!("---- {gcid} ----");
                println!("{mdata}");
            }
        }

        if let Some(hints) = self.dstore.get_hints(identifier)? {
            println!("Hints:");
            println!("{hints}");
        }

        Ok(true)
    }
}
