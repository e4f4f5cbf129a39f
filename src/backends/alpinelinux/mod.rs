//! The Alpine Linux backend.
//!
//! Alpine indexes live in `APKINDEX.tar.gz`, a tarball holding a single
//! line-oriented `APKINDEX` file with one `X:value` block per package,
//! blocks separated by blank lines. Package payloads are gzip tarballs.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Result, bail};
use tracing::{debug, warn};

use super::{Package, PackageRef};
use crate::config::Config;
use crate::downloader::Downloader;
use crate::utils::{escape_xml, is_remote};
use crate::zarchive::ArchiveDecompressor;

/// One parsed APKINDEX block.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ApkIndexBlock {
    /// Package name (`P:`).
    pub pkgname: String,
    /// Package version (`V:`).
    pub pkgversion: String,
    /// Architecture (`A:`).
    pub arch: String,
    /// Maintainer (`m:`).
    pub maintainer: String,
    /// One-line description (`T:`).
    pub pkgdesc: String,
}

impl ApkIndexBlock {
    /// The archive file name of this package.
    #[must_use]
    pub fn archive_name(&self) -> String {
        format!("{}-{}.apk", self.pkgname, self.pkgversion)
    }
}

/// What: Parse APKINDEX data into its package blocks.
///
/// Inputs:
/// - `index`: The decompressed `APKINDEX` contents
///
/// Output:
/// - All blocks with at least a package name
pub fn parse_apk_index(index: &str) -> Vec<ApkIndexBlock> {
    let mut entries = Vec::new();
    let mut current = ApkIndexBlock::default();

    for line in index.lines() {
        if line.is_empty() {
            if !current.pkgname.is_empty() {
                entries.push(std::mem::take(&mut current));
            } else {
                current = ApkIndexBlock::default();
            }
            continue;
        }

        let Some((field, value)) = line.split_once(':') else {
            continue;
        };
        match field {
            "P" => current.pkgname = value.to_string(),
            "V" => current.pkgversion = value.to_string(),
            "A" => current.arch = value.to_string(),
            "m" => current.maintainer = value.to_string(),
            "T" => current.pkgdesc = value.to_string(),
            _ => {}
        }
    }
    if !current.pkgname.is_empty() {
        entries.push(current);
    }

    entries
}

/// A package from an Alpine repository.
pub struct AlpinePackage {
    name: String,
    version: String,
    arch: String,
    maintainer: Mutex<String>,
    filename: Mutex<String>,
    summary: Mutex<BTreeMap<String, String>>,
    description: Mutex<BTreeMap<String, String>>,
    state: Mutex<AlpinePkgState>,
}

#[derive(Default)]
struct AlpinePkgState {
    archive: Option<ArchiveDecompressor>,
    contents: Option<Vec<String>>,
}

impl AlpinePackage {
    fn new(name: &str, version: &str, arch: &str) -> Self {
        Self {
            name: name.to_string(),
            version: version.to_string(),
            arch: arch.to_string(),
            maintainer: Mutex::new(String::new()),
            filename: Mutex::new(String::new()),
            summary: Mutex::new(BTreeMap::new()),
            description: Mutex::new(BTreeMap::new()),
            state: Mutex::new(AlpinePkgState::default()),
        }
    }

    fn open_archive<'a>(&self, state: &'a mut AlpinePkgState) -> Result<&'a ArchiveDecompressor> {
        if state.archive.is_none() {
            let fname = self.filename();
            if fname.is_empty() {
                bail!("package {} has no file location set", self.id());
            }
            let mut ad = ArchiveDecompressor::new();
            ad.open(Path::new(&fname));
            state.archive = Some(ad);
        }
        Ok(state
            .archive
            .as_ref()
            .unwrap_or_else(|| unreachable!("archive was just opened")))
    }
}

impl Package for AlpinePackage {
    fn name(&self) -> String {
        self.name.clone()
    }
    fn version(&self) -> String {
        self.version.clone()
    }
    fn arch(&self) -> String {
        self.arch.clone()
    }
    fn maintainer(&self) -> String {
        self.maintainer.lock().map(|m| m.clone()).unwrap_or_default()
    }
    fn summary(&self) -> BTreeMap<String, String> {
        self.summary.lock().map(|s| s.clone()).unwrap_or_default()
    }
    fn description(&self) -> BTreeMap<String, String> {
        self.description.lock().map(|d| d.clone()).unwrap_or_default()
    }
    fn filename(&self) -> String {
        self.filename.lock().map(|f| f.clone()).unwrap_or_default()
    }

    fn contents(&self) -> Result<Vec<String>> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| anyhow::anyhow!("package state lock poisoned"))?;
        if let Some(contents) = &state.contents {
            return Ok(contents.clone());
        }
        let archive = self.open_archive(&mut state)?;
        let contents: Vec<String> = archive
            .read_contents()?
            .into_iter()
            // apk archives carry control files prefixed with a dot
            .filter(|f| !f.starts_with("/."))
            .collect();
        state.contents = Some(contents.clone());
        Ok(contents)
    }

    fn file_data(&self, path: &str) -> Result<Vec<u8>> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| anyhow::anyhow!("package state lock poisoned"))?;
        let archive = self.open_archive(&mut state)?;
        Ok(archive.read_data(path)?)
    }

    fn finish(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.archive = None;
        }
    }
}

/// Reads `<suite>/<section>/<arch>/APKINDEX.tar.gz` indexes.
pub struct AlpinePackageIndex {
    root_dir: String,
    tmp_dir: PathBuf,
    pkg_cache: Mutex<HashMap<String, Vec<PackageRef>>>,
}

impl AlpinePackageIndex {
    /// Create an index reader rooted at a local path or URL.
    pub fn new(dir: &str, conf: &Config) -> Result<Self> {
        if !is_remote(dir) && !Path::new(dir).exists() {
            bail!("directory '{dir}' does not exist");
        }
        let leaf = crate::utils::path_basename(dir.trim_end_matches('/'));
        Ok(Self {
            root_dir: dir.to_string(),
            tmp_dir: conf.tmp_dir().join(leaf),
            pkg_cache: Mutex::new(HashMap::new()),
        })
    }

    /// Drop all caches.
    pub fn release(&self) {
        if let Ok(mut cache) = self.pkg_cache.lock() {
            cache.clear();
        }
    }

    fn fetch_index(&self, suite: &str, section: &str, arch: &str) -> Result<PathBuf> {
        let full_path = format!(
            "{}/{suite}/{section}/{arch}/APKINDEX.tar.gz",
            self.root_dir.trim_end_matches('/')
        );
        if is_remote(&full_path) {
            std::fs::create_dir_all(&self.tmp_dir)?;
            let cache_name = format!("APKINDEX-{suite}-{section}-{arch}.tar.gz");
            let dest = self.tmp_dir.join(cache_name);
            let dl = Downloader::acquire()?;
            dl.download_file(&full_path, &dest, 2)?;
            Ok(dest)
        } else {
            let path = PathBuf::from(&full_path);
            if !path.exists() {
                bail!("file '{}' does not exist", path.display());
            }
            Ok(path)
        }
    }

    fn load_packages(&self, suite: &str, section: &str, arch: &str) -> Result<Vec<PackageRef>> {
        let index_path = self.fetch_index(suite, section, arch)?;

        let mut ad = ArchiveDecompressor::new();
        ad.open(&index_path);
        let index_data = ad.read_data("APKINDEX")?;
        let index_str = String::from_utf8_lossy(&index_data);
        debug!(file = %index_path.display(), "opened APKINDEX");

        let mut pkgs_map: HashMap<String, Arc<AlpinePackage>> = HashMap::new();
        for block in parse_apk_index(&index_str) {
            let file_name = block.archive_name();
            let pkg = pkgs_map.entry(file_name.clone()).or_insert_with(|| {
                Arc::new(AlpinePackage::new(&block.pkgname, &block.pkgversion, &block.arch))
            });

            if let Ok(mut fname) = pkg.filename.lock() {
                *fname = format!(
                    "{}/{suite}/{section}/{arch}/{file_name}",
                    self.root_dir.trim_end_matches('/')
                );
            }
            if let Ok(mut maint) = pkg.maintainer.lock() {
                *maint = block.maintainer.clone();
            }
            if !block.pkgdesc.is_empty() {
                if let Ok(mut summary) = pkg.summary.lock() {
                    summary.insert("C".to_string(), block.pkgdesc.clone());
                }
                if let Ok(mut desc) = pkg.description.lock() {
                    desc.insert(
                        "C".to_string(),
                        format!("<p>{}</p>", escape_xml(&block.pkgdesc)),
                    );
                }
            }
        }

        let mut packages: Vec<PackageRef> = Vec::with_capacity(pkgs_map.len());
        for (_, pkg) in pkgs_map {
            if !pkg.is_valid() {
                warn!(pkid = %pkg.id(), "found invalid package, skipping it");
                continue;
            }
            packages.push(pkg as PackageRef);
        }
        Ok(packages)
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

    const INDEX_SAMPLE: &str = "\
C:Q1pfnKwFUEyqvmvQlMYmw4dXPc8bI=
P:gnumeric
V:1.12.55-r0
A:x86_64
S:15859950
T:A GNOME spreadsheet program
U:http://www.gnumeric.org/
m:Natanael Copa <ncopa@alpinelinux.org>

C:Q1kDBAfJrNkfbBBSRDCqzCSJyEXbY=
P:nano
V:7.2-r1
A:x86_64
T:Enhanced clone of the Pico text editor
";

    #[test]
    fn apk_index_block_parsing() {
        let blocks = parse_apk_index(INDEX_SAMPLE);
        assert_eq!(blocks.len(), 2);

        assert_eq!(blocks[0].pkgname, "gnumeric");
        assert_eq!(blocks[0].pkgversion, "1.12.55-r0");
        assert_eq!(blocks[0].arch, "x86_64");
        assert_eq!(blocks[0].maintainer, "Natanael Copa <ncopa@alpinelinux.org>");
        assert_eq!(blocks[0].pkgdesc, "A GNOME spreadsheet program");
        assert_eq!(blocks[0].archive_name(), "gnumeric-1.12.55-r0.apk");

        assert_eq!(blocks[1].pkgname, "nano");
        assert!(blocks[1].maintainer.is_empty());
    }

    #[test]
    fn empty_index_yields_no_blocks() {
        assert!(parse_apk_index("").is_empty());
        assert!(parse_apk_index("\n\n").is_empty());
    }
}
