//! The Arch Linux backend.
//!
//! Arch repositories ship a `<section>.files.tar.gz` tarball with one
//! directory per package, holding `desc` and `files` records in a simple
//! `%BLOCK%` line format. Package payloads are zstd-compressed tarballs
//! read directly through the archive layer.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Result, bail};
use tracing::{debug, warn};

use super::{Package, PackageRef};
use crate::config::Config;
use crate::utils::escape_xml;
use crate::zarchive::{ArchiveDecompressor, EntryData};

/// Parser for the `%BLOCK%`-structured list files of Arch repositories.
#[derive(Clone, Debug, Default)]
pub struct ListFile {
    entries: HashMap<String, String>,
}

impl ListFile {
    /// Parse list-file data.
    #[must_use]
    pub fn parse(data: &[u8]) -> Self {
        let text = String::from_utf8_lossy(data);
        let mut entries: HashMap<String, String> = HashMap::new();
        let mut block_name = String::new();

        for line in text.lines() {
            if line.starts_with('%') && line.ends_with('%') && line.len() > 1 {
                block_name = line[1..line.len() - 1].to_string();
                continue;
            }
            if line.is_empty() {
                block_name.clear();
                continue;
            }
            if block_name.is_empty() {
                continue;
            }
            entries
                .entry(block_name.clone())
                .and_modify(|v| {
                    v.push('\n');
                    v.push_str(line);
                })
                .or_insert_with(|| line.to_string());
        }

        Self { entries }
    }

    /// Get the value of a block, or an empty string.
    #[must_use]
    pub fn entry(&self, name: &str) -> &str {
        self.entries.get(name).map(String::as_str).unwrap_or("")
    }
}

#[derive(Default)]
struct ArchPkgData {
    maintainer: String,
    filename: String,
    summary: BTreeMap<String, String>,
    description: BTreeMap<String, String>,
    contents: Vec<String>,
}

/// A package from an Arch Linux repository.
pub struct ArchPackage {
    name: Mutex<String>,
    version: Mutex<String>,
    arch: Mutex<String>,
    data: Mutex<ArchPkgData>,
    archive: Mutex<Option<ArchiveDecompressor>>,
}

impl ArchPackage {
    fn new() -> Self {
        Self {
            name: Mutex::new(String::new()),
            version: Mutex::new(String::new()),
            arch: Mutex::new(String::new()),
            data: Mutex::new(ArchPkgData::default()),
            archive: Mutex::new(None),
        }
    }

    fn set_identity(&self, name: &str, version: &str, arch: &str) {
        if let Ok(mut n) = self.name.lock() {
            *n = name.to_string();
        }
        if let Ok(mut v) = self.version.lock() {
            *v = version.to_string();
        }
        if let Ok(mut a) = self.arch.lock() {
            *a = arch.to_string();
        }
    }
}

impl Package for ArchPackage {
    fn name(&self) -> String {
        self.name.lock().map(|v| v.clone()).unwrap_or_default()
    }
    fn version(&self) -> String {
        self.version.lock().map(|v| v.clone()).unwrap_or_default()
    }
    fn arch(&self) -> String {
        self.arch.lock().map(|v| v.clone()).unwrap_or_default()
    }
    fn maintainer(&self) -> String {
        self.data.lock().map(|d| d.maintainer.clone()).unwrap_or_default()
    }
    fn summary(&self) -> BTreeMap<String, String> {
        self.data.lock().map(|d| d.summary.clone()).unwrap_or_default()
    }
    fn description(&self) -> BTreeMap<String, String> {
        self.data.lock().map(|d| d.description.clone()).unwrap_or_default()
    }
    fn filename(&self) -> String {
        self.data.lock().map(|d| d.filename.clone()).unwrap_or_default()
    }

    fn contents(&self) -> Result<Vec<String>> {
        Ok(self.data.lock().map(|d| d.contents.clone()).unwrap_or_default())
    }

    fn file_data(&self, path: &str) -> Result<Vec<u8>> {
        let mut archive_guard = self
            .archive
            .lock()
            .map_err(|_| anyhow::anyhow!("package archive lock poisoned"))?;
        if archive_guard.is_none() {
            let fname = self.filename();
            if fname.is_empty() {
                bail!("package {} has no file location set", self.id());
            }
            let mut ad = ArchiveDecompressor::new();
            ad.open(Path::new(&fname));
            *archive_guard = Some(ad);
        }
        let archive = archive_guard
            .as_ref()
            .unwrap_or_else(|| unreachable!("archive was just opened"));
        Ok(archive.read_data(path)?)
    }

    fn finish(&self) {
        if let Ok(mut archive) = self.archive.lock() {
            *archive = None;
        }
    }
}

/// Reads `<suite>/<section>/os/<arch>/<section>.files.tar.gz` indexes.
pub struct ArchPackageIndex {
    root_dir: PathBuf,
    pkg_cache: Mutex<HashMap<String, Vec<PackageRef>>>,
}

impl ArchPackageIndex {
    /// Create an index reader rooted at a local path.
    pub fn new(dir: &str, _conf: &Config) -> Result<Self> {
        let root = PathBuf::from(dir);
        if !root.exists() {
            bail!("directory '{dir}' does not exist");
        }
        Ok(Self {
            root_dir: root,
            pkg_cache: Mutex::new(HashMap::new()),
        })
    }

    /// Drop all caches.
    pub fn release(&self) {
        if let Ok(mut cache) = self.pkg_cache.lock() {
            cache.clear();
        }
    }

    fn set_pkg_description(pkg_data: &mut ArchPkgData, desc: &str) {
        if desc.is_empty() {
            return;
        }
        pkg_data.summary.insert("C".to_string(), desc.to_string());
        pkg_data
            .description
            .insert("C".to_string(), format!("<p>{}</p>", escape_xml(desc)));
    }

    fn load_packages(&self, suite: &str, section: &str, arch: &str) -> Result<Vec<PackageRef>> {
        let pkg_root = self.root_dir.join(suite).join(section).join("os").join(arch);
        let lists_tar = pkg_root.join(format!("{section}.files.tar.gz"));

        if !lists_tar.exists() {
            warn!(file = %lists_tar.display(), "package lists tarball does not exist");
            return Ok(Vec::new());
        }

        let mut ad = ArchiveDecompressor::new();
        ad.open(&lists_tar);
        debug!(file = %lists_tar.display(), "opened package lists tarball");

        let mut pkgs_map: HashMap<String, Arc<ArchPackage>> = HashMap::new();
        let mut reader = ad.read()?;
        for entry in reader.entries()? {
            let entry = entry?;
            let EntryData::Regular(entry_data) = &entry.data else {
                continue;
            };

            // entries are "<name>-<version>/desc" and "<name>-<version>/files"
            let parts: Vec<&str> = entry.fname.trim_start_matches('/').split('/').collect();
            let [arch_pkid, info_base_name] = parts.as_slice() else {
                continue;
            };

            let pkg = Arc::clone(
                pkgs_map
                    .entry((*arch_pkid).to_string())
                    .or_insert_with(|| Arc::new(ArchPackage::new())),
            );

            match *info_base_name {
                "desc" => {
                    let desc = ListFile::parse(entry_data);
                    pkg.set_identity(desc.entry("NAME"), desc.entry("VERSION"), desc.entry("ARCH"));
                    if let Ok(mut data) = pkg.data.lock() {
                        data.maintainer = desc.entry("PACKAGER").to_string();
                        data.filename = pkg_root.join(desc.entry("FILENAME")).display().to_string();
                        Self::set_pkg_description(&mut data, desc.entry("DESC"));
                    }
                }
                "files" => {
                    let files = ListFile::parse(entry_data);
                    let raw = files.entry("FILES");
                    if !raw.is_empty() {
                        let list: Vec<String> = raw
                            .split('\n')
                            .filter(|f| !f.is_empty())
                            .map(|f| {
                                if f.starts_with('/') {
                                    f.to_string()
                                } else {
                                    format!("/{f}")
                                }
                            })
                            .collect();
                        if let Ok(mut data) = pkg.data.lock() {
                            data.contents = list;
                        }
                    }
                }
                _ => {}
            }
        }

        let mut result: Vec<PackageRef> = Vec::with_capacity(pkgs_map.len());
        for (_, pkg) in pkgs_map {
            if !pkg.is_valid() {
                warn!(pkid = %pkg.id(), "found invalid package, skipping it");
                continue;
            }
            result.push(pkg as PackageRef);
        }
        Ok(result)
    }

    /// Enumerate the packages of a triple, memoized per run.
    pub fn packages_for(&self, suite: &str, section: &str, arch: &str) -> Result<Vec<PackageRef>> {
        let id = format!("{suite}/{section}/{arch}");
        if let Ok(cache) = self.pkg_cache.lock()
            && let Some(pkgs) = cache.get(&id)
        {
            return Ok(pkgs.clone());
        }

        let pkgs = self.load_packages(suite, section, arch)?;
        if let Ok(mut cache) = self.pkg_cache.lock() {
            cache.insert(id, pkgs.clone());
        }
        Ok(pkgs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DESC_SAMPLE: &str = "\
%FILENAME%
calculator-1.2-1-x86_64.pkg.tar.zst

%NAME%
calculator

%VERSION%
1.2-1

%DESC%
A simple calculator

%ARCH%
x86_64

%PACKAGER%
Alice Packager <alice@example.org>
";

    #[test]
    fn list_file_parsing() {
        let lf = ListFile::parse(DESC_SAMPLE.as_bytes());
        assert_eq!(lf.entry("NAME"), "calculator");
        assert_eq!(lf.entry("VERSION"), "1.2-1");
        assert_eq!(lf.entry("ARCH"), "x86_64");
        assert_eq!(lf.entry("PACKAGER"), "Alice Packager <alice@example.org>");
        assert_eq!(lf.entry("NOPE"), "");
    }

    #[test]
    fn list_file_multiline_blocks() {
        let lf = ListFile::parse(b"%FILES%\nusr/\nusr/bin/\nusr/bin/calc\n");
        assert_eq!(lf.entry("FILES"), "usr/\nusr/bin/\nusr/bin/calc");
    }
}
