//! The RPM-MD backend (`repodata/repomd.xml` repositories).
//!
//! `repomd.xml` announces the locations of the `primary` and `filelists`
//! metadata documents. Package identity comes from `primary`, file lists
//! from `filelists`; records are joined over the pkgid checksum.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result, bail};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use tracing::{debug, warn};

use super::{Package, PackageRef};
use crate::config::Config;
use crate::downloader::Downloader;
use crate::utils::is_remote;

fn attr_value(e: &BytesStart<'_>, name: &str) -> Option<String> {
    for attr in e.attributes().flatten() {
        if attr.key.as_ref() == name.as_bytes() {
            return attr.unescape_value().ok().map(|v| v.into_owned());
        }
    }
    None
}

/// Data locations read from `repomd.xml`.
#[derive(Debug, Default)]
struct RepoMdLocations {
    primary: Vec<String>,
    filelists: Vec<String>,
}

/// Parse `repomd.xml`, collecting `primary` and `filelists` hrefs.
fn parse_repomd(data: &str) -> Result<RepoMdLocations> {
    let mut reader = Reader::from_str(data);
    reader.config_mut().trim_text(true);

    let mut locations = RepoMdLocations::default();
    let mut current_type: Option<String> = None;

    loop {
        match reader.read_event().context("failed to parse repomd.xml")? {
            Event::Start(e) if e.name().as_ref() == b"data" => {
                current_type = attr_value(&e, "type");
            }
            Event::End(e) if e.name().as_ref() == b"data" => current_type = None,
            Event::Start(e) | Event::Empty(e) if e.name().as_ref() == b"location" => {
                if let Some(href) = attr_value(&e, "href") {
                    match current_type.as_deref() {
                        Some("primary") => locations.primary.push(href),
                        Some("filelists") => locations.filelists.push(href),
                        _ => {}
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(locations)
}

/// What: Skip the rpm lead and headers, returning the payload offset.
///
/// Details:
/// - An rpm file is a 96-byte lead, a signature header (padded to 8
///   bytes), a main header, then the compressed cpio payload. Headers
///   carry a 16-byte preamble with big-endian index count and data size.
fn rpm_payload_offset(data: &[u8]) -> Result<usize> {
    const HEADER_MAGIC: [u8; 3] = [0x8e, 0xad, 0xe8];

    if data.len() < 96 + 16 || &data[0..4] != b"\xed\xab\xee\xdb" {
        bail!("not an rpm package");
    }

    let mut pos = 96usize;
    for padded in [true, false] {
        if data.len() < pos + 16 || data[pos..pos + 3] != HEADER_MAGIC {
            bail!("malformed rpm header structure");
        }
        let nindex = u32::from_be_bytes(data[pos + 8..pos + 12].try_into()?) as usize;
        let hsize = u32::from_be_bytes(data[pos + 12..pos + 16].try_into()?) as usize;
        pos += 16 + nindex * 16 + hsize;
        if padded {
            pos = (pos + 7) & !7;
        }
    }

    if pos >= data.len() {
        bail!("rpm payload is missing");
    }
    Ok(pos)
}

/// Look up one member in a cpio "newc" stream. Symbolic links are chased
/// within the stream up to a small depth.
fn cpio_member(data: &[u8], wanted: &str, depth: u32) -> Result<Vec<u8>> {
    if depth > 6 {
        bail!("too many levels of links while resolving '{wanted}' in the payload");
    }

    let wanted_norm = crate::zarchive::normalize_path(wanted);
    let mut pos = 0usize;
    loop {
        if pos + 110 > data.len() {
            bail!("file '{wanted}' was not found in the rpm payload");
        }
        if &data[pos..pos + 6] != b"070701" && &data[pos..pos + 6] != b"070702" {
            bail!("unsupported cpio stream format");
        }

        let field = |idx: usize| -> Result<usize> {
            let start = pos + 6 + idx * 8;
            let hex = std::str::from_utf8(&data[start..start + 8])?;
            Ok(usize::from_str_radix(hex, 16)?)
        };
        let mode = field(1)?;
        let filesize = field(6)?;
        let namesize = field(11)?;

        let name_start = pos + 110;
        let name_end = name_start + namesize.saturating_sub(1);
        if name_end > data.len() {
            bail!("truncated cpio member name");
        }
        let name = String::from_utf8_lossy(&data[name_start..name_end]).into_owned();

        let data_start = (name_start + namesize + 3) & !3;
        let data_end = data_start + filesize;

        if name == "TRAILER!!!" {
            bail!("file '{wanted}' was not found in the rpm payload");
        }
        if data_end > data.len() {
            bail!("truncated cpio member data");
        }

        if crate::zarchive::normalize_path(&name) == wanted_norm {
            let ftype = mode & 0o170_000;
            if ftype == 0o120_000 {
                // symlink: the data is the target path
                let target = String::from_utf8_lossy(&data[data_start..data_end]).into_owned();
                let resolved = if target.starts_with('/') {
                    target
                } else {
                    let parent = wanted_norm.rfind('/').map_or("", |i| &wanted_norm[..i]);
                    format!("{parent}/{target}")
                };
                return cpio_member(data, &resolved, depth + 1);
            }
            if ftype == 0o040_000 {
                bail!("path '{wanted}' is a directory and can not be extracted");
            }
            return Ok(data[data_start..data_end].to_vec());
        }

        pos = (data_end + 3) & !3;
    }
}

#[derive(Default)]
struct RpmPkgData {
    name: String,
    version: String,
    arch: String,
    maintainer: String,
    filename: String,
    summary: BTreeMap<String, String>,
    description: BTreeMap<String, String>,
    contents: Vec<String>,
}

#[derive(Default)]
struct RpmPkgState {
    payload: Option<Arc<Vec<u8>>>,
    local_rpm: Option<PathBuf>,
}

/// A package from an RPM-MD repository.
pub struct RpmPackage {
    data: RpmPkgData,
    tmp_dir: PathBuf,
    state: Mutex<RpmPkgState>,
}

impl RpmPackage {
    fn new(data: RpmPkgData, tmp_dir: &Path) -> Self {
        Self {
            data,
            tmp_dir: tmp_dir.to_path_buf(),
            state: Mutex::new(RpmPkgState::default()),
        }
    }

    fn payload(&self, state: &mut RpmPkgState) -> Result<Arc<Vec<u8>>> {
        if let Some(payload) = &state.payload {
            return Ok(Arc::clone(payload));
        }

        let fname = self.filename();
        if fname.is_empty() {
            bail!("package {} has no file location set", self.id());
        }
        let local = if let Some(local) = &state.local_rpm {
            local.clone()
        } else if is_remote(&fname) {
            let dl = Downloader::acquire()?;
            let dest = self.tmp_dir.join(crate::utils::filename_from_uri(&fname));
            dl.download_file(&fname, &dest, 2)?;
            state.local_rpm = Some(dest.clone());
            dest
        } else {
            PathBuf::from(&fname)
        };

        let raw = std::fs::read(&local)
            .with_context(|| format!("unable to open package {}", local.display()))?;
        let offset = rpm_payload_offset(&raw)?;
        let payload = Arc::new(crate::zarchive::decompress_data(&raw[offset..])?);
        state.payload = Some(Arc::clone(&payload));
        Ok(payload)
    }
}

impl Package for RpmPackage {
    fn name(&self) -> String {
        self.data.name.clone()
    }
    fn version(&self) -> String {
        self.data.version.clone()
    }
    fn arch(&self) -> String {
        self.data.arch.clone()
    }
    fn maintainer(&self) -> String {
        self.data.maintainer.clone()
    }
    fn summary(&self) -> BTreeMap<String, String> {
        self.data.summary.clone()
    }
    fn description(&self) -> BTreeMap<String, String> {
        self.data.description.clone()
    }
    fn filename(&self) -> String {
        self.data.filename.clone()
    }

    fn contents(&self) -> Result<Vec<String>> {
        Ok(self.data.contents.clone())
    }

    fn file_data(&self, path: &str) -> Result<Vec<u8>> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| anyhow::anyhow!("package state lock poisoned"))?;
        let payload = self.payload(&mut state)?;
        cpio_member(&payload, path, 0)
    }

    fn finish(&self) {
        let Ok(mut state) = self.state.lock() else { return };
        state.payload = None;
        if let Some(local) = state.local_rpm.take() {
            if local.starts_with(&self.tmp_dir) {
                let _ = std::fs::remove_file(local);
            }
        }
    }
}

/// Reads `<suite>/<section>/<arch>/os/repodata/repomd.xml` repositories.
pub struct RpmPackageIndex {
    root_dir: String,
    tmp_dir: PathBuf,
    pkg_cache: Mutex<HashMap<String, Vec<PackageRef>>>,
}

impl RpmPackageIndex {
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

    /// Fetch a repository file, downloading remote locations into the
    /// cache directory.
    fn fetch_file(&self, path: &str) -> Result<PathBuf> {
        if is_remote(path) {
            std::fs::create_dir_all(&self.tmp_dir)?;
            let dest = self.tmp_dir.join(crate::utils::filename_from_uri(path));
            let dl = Downloader::acquire()?;
            dl.download_file(path, &dest, 2)?;
            Ok(dest)
        } else {
            let p = PathBuf::from(path);
            if !p.exists() {
                bail!("file '{path}' does not exist");
            }
            Ok(p)
        }
    }

    fn read_metadata_file(&self, repo_root: &str, href: &str) -> Result<String> {
        let full = format!("{}/{}", repo_root.trim_end_matches('/'), href);
        let local = self.fetch_file(&full)?;
        let data = if href.ends_with(".xml") {
            std::fs::read(&local)?
        } else {
            crate::zarchive::decompress_file(&local)?
        };
        Ok(String::from_utf8_lossy(&data).into_owned())
    }

    /// Parse `primary` metadata into packages keyed by pkgid checksum.
    fn parse_primary(
        &self,
        repo_root: &str,
        data: &str,
    ) -> Result<HashMap<String, RpmPkgData>> {
        let mut reader = Reader::from_str(data);
        reader.config_mut().trim_text(true);

        let mut pkgs: HashMap<String, RpmPkgData> = HashMap::new();
        let mut current: Option<RpmPkgData> = None;
        let mut pkgid_checksum = String::new();
        let mut is_rpm = false;
        let mut text_target: Option<&'static str> = None;
        let mut checksum_is_pkgid = false;

        loop {
            match reader.read_event().context("failed to parse primary metadata")? {
                Event::Start(e) => match e.name().as_ref() {
                    b"package" => {
                        is_rpm = attr_value(&e, "type").as_deref() == Some("rpm");
                        if is_rpm {
                            current = Some(RpmPkgData {
                                maintainer: "None".to_string(),
                                ..RpmPkgData::default()
                            });
                            pkgid_checksum.clear();
                        }
                    }
                    b"name" if current.is_some() => text_target = Some("name"),
                    b"arch" if current.is_some() => text_target = Some("arch"),
                    b"summary" if current.is_some() => text_target = Some("summary"),
                    b"description" if current.is_some() => text_target = Some("description"),
                    b"packager" if current.is_some() => text_target = Some("packager"),
                    b"checksum" if current.is_some() => {
                        checksum_is_pkgid = attr_value(&e, "pkgid").as_deref() == Some("YES");
                        text_target = Some("checksum");
                    }
                    b"version" if current.is_some() => {
                        if let Some(pkg) = &mut current {
                            let epoch = attr_value(&e, "epoch").unwrap_or_default();
                            let ver = attr_value(&e, "ver").unwrap_or_default();
                            let rel = attr_value(&e, "rel").unwrap_or_default();
                            pkg.version = if epoch.is_empty() || epoch == "0" {
                                format!("{ver}-{rel}")
                            } else {
                                format!("{epoch}:{ver}-{rel}")
                            };
                        }
                    }
                    b"location" => {
                        if let (Some(pkg), Some(href)) = (&mut current, attr_value(&e, "href")) {
                            pkg.filename =
                                format!("{}/{}", repo_root.trim_end_matches('/'), href);
                        }
                    }
                    _ => {}
                },
                Event::Empty(e) => match e.name().as_ref() {
                    b"version" if current.is_some() => {
                        if let Some(pkg) = &mut current {
                            let epoch = attr_value(&e, "epoch").unwrap_or_default();
                            let ver = attr_value(&e, "ver").unwrap_or_default();
                            let rel = attr_value(&e, "rel").unwrap_or_default();
                            pkg.version = if epoch.is_empty() || epoch == "0" {
                                format!("{ver}-{rel}")
                            } else {
                                format!("{epoch}:{ver}-{rel}")
                            };
                        }
                    }
                    b"location" => {
                        if let (Some(pkg), Some(href)) = (&mut current, attr_value(&e, "href")) {
                            pkg.filename =
                                format!("{}/{}", repo_root.trim_end_matches('/'), href);
                        }
                    }
                    _ => {}
                },
                Event::Text(t) => {
                    if let (Some(pkg), Some(target)) = (&mut current, text_target) {
                        let text = t.unescape().unwrap_or_default().into_owned();
                        match target {
                            "name" => pkg.name = text,
                            "arch" => pkg.arch = text,
                            "summary" => {
                                pkg.summary.insert("C".to_string(), text);
                            }
                            "description" => {
                                pkg.description.insert(
                                    "C".to_string(),
                                    format!("<p>{}</p>", crate::utils::escape_xml(&text)),
                                );
                            }
                            "packager" => pkg.maintainer = text,
                            "checksum" => {
                                if checksum_is_pkgid {
                                    pkgid_checksum = text;
                                }
                            }
                            _ => {}
                        }
                    }
                }
                Event::End(e) => match e.name().as_ref() {
                    b"package" => {
                        if let Some(pkg) = current.take() {
                            if is_rpm {
                                if pkgid_checksum.is_empty() {
                                    warn!(
                                        pkg = %pkg.name,
                                        "found package without suitable pkgid, ignoring it"
                                    );
                                } else {
                                    pkgs.insert(std::mem::take(&mut pkgid_checksum), pkg);
                                }
                            }
                        }
                    }
                    _ => text_target = None,
                },
                Event::Eof => break,
                _ => {}
            }
        }
        Ok(pkgs)
    }

    /// Attach file lists from `filelists` metadata by pkgid.
    fn parse_filelists(data: &str, pkgs: &mut HashMap<String, RpmPkgData>) -> Result<()> {
        let mut reader = Reader::from_str(data);
        reader.config_mut().trim_text(true);

        let mut current_pkgid: Option<String> = None;
        let mut in_file = false;

        loop {
            match reader.read_event().context("failed to parse filelists metadata")? {
                Event::Start(e) => match e.name().as_ref() {
                    b"package" => {
                        current_pkgid = attr_value(&e, "pkgid").filter(|id| pkgs.contains_key(id));
                    }
                    b"file" => in_file = current_pkgid.is_some(),
                    _ => {}
                },
                Event::Text(t) if in_file => {
                    if let Some(pkgid) = &current_pkgid
                        && let Some(pkg) = pkgs.get_mut(pkgid)
                    {
                        let path = t.unescape().unwrap_or_default().into_owned();
                        if !path.is_empty() {
                            pkg.contents.push(path);
                        }
                    }
                }
                Event::End(e) => match e.name().as_ref() {
                    b"file" => in_file = false,
                    b"package" => current_pkgid = None,
                    _ => {}
                },
                Event::Eof => break,
                _ => {}
            }
        }
        Ok(())
    }

    fn load_packages(&self, suite: &str, section: &str, arch: &str) -> Result<Vec<PackageRef>> {
        let repo_root = format!(
            "{}/{suite}/{section}/{arch}/os",
            self.root_dir.trim_end_matches('/')
        );

        let repomd_local = self.fetch_file(&format!("{repo_root}/repodata/repomd.xml"))?;
        let repomd_data = std::fs::read_to_string(&repomd_local)
            .with_context(|| format!("could not open repomd.xml file: {}", repomd_local.display()))?;
        let locations = parse_repomd(&repomd_data)?;

        if locations.primary.is_empty() {
            warn!("no primary metadata found in repomd.xml");
            return Ok(Vec::new());
        }

        let mut pkg_map: HashMap<String, RpmPkgData> = HashMap::new();
        for primary_href in &locations.primary {
            let data = match self.read_metadata_file(&repo_root, primary_href) {
                Ok(d) => d,
                Err(e) => {
                    warn!(file = %primary_href, error = %e, "could not read primary metadata");
                    continue;
                }
            };
            pkg_map.extend(self.parse_primary(&repo_root, &data)?);
        }

        for filelist_href in &locations.filelists {
            let data = match self.read_metadata_file(&repo_root, filelist_href) {
                Ok(d) => d,
                Err(e) => {
                    warn!(file = %filelist_href, error = %e, "could not read filelist metadata");
                    continue;
                }
            };
            Self::parse_filelists(&data, &mut pkg_map)?;
        }

        debug!(count = pkg_map.len(), "loaded packages from RPM metadata");

        let mut packages: Vec<PackageRef> = Vec::with_capacity(pkg_map.len());
        for (_, data) in pkg_map {
            let pkg = Arc::new(RpmPackage::new(data, &self.tmp_dir));
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
        let id = format!("{suite}-{section}-{arch}");
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

    const REPOMD: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<repomd xmlns="http://linux.duke.edu/metadata/repo">
  <data type="primary">
    <location href="repodata/primary.xml"/>
  </data>
  <data type="filelists">
    <location href="repodata/filelists.xml"/>
  </data>
  <data type="other">
    <location href="repodata/other.xml"/>
  </data>
</repomd>"#;

    const PRIMARY: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<metadata xmlns="http://linux.duke.edu/metadata/common" packages="1">
  <package type="rpm">
    <name>gnome-calculator</name>
    <arch>x86_64</arch>
    <version epoch="0" ver="45.0" rel="1.fc39"/>
    <checksum type="sha256" pkgid="YES">abc123</checksum>
    <summary>A calculator</summary>
    <description>Calculates things.</description>
    <packager>Fedora Project</packager>
    <location href="Packages/g/gnome-calculator-45.0-1.fc39.x86_64.rpm"/>
  </package>
</metadata>"#;

    const FILELISTS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<filelists xmlns="http://linux.duke.edu/metadata/filelists" packages="1">
  <package pkgid="abc123" name="gnome-calculator" arch="x86_64">
    <version epoch="0" ver="45.0" rel="1.fc39"/>
    <file>/usr/bin/gnome-calculator</file>
    <file>/usr/share/applications/org.gnome.Calculator.desktop</file>
  </package>
</filelists>"#;

    #[test]
    fn repomd_locations_are_discovered() {
        let locations = parse_repomd(REPOMD).expect("parse");
        assert_eq!(locations.primary, vec!["repodata/primary.xml".to_string()]);
        assert_eq!(locations.filelists, vec!["repodata/filelists.xml".to_string()]);
    }

    #[test]
    fn primary_and_filelists_join_on_pkgid() {
        let dir = tempfile::tempdir().expect("tempdir");
        let conf_dir = dir.path().join("repo");
        std::fs::create_dir_all(&conf_dir).expect("mkdir");

        // a config is only needed for the tmp dir here
        let config_path = dir.path().join("asgen-config.json");
        std::fs::write(
            &config_path,
            format!(
                r#"{{"ProjectName": "T", "ArchiveRoot": "{}", "Backend": "rpmmd"}}"#,
                conf_dir.display()
            ),
        )
        .expect("write config");
        let conf = Config::load(&config_path, None, None).expect("config");

        let index = RpmPackageIndex::new(&conf_dir.display().to_string(), &conf).expect("index");
        let mut pkgs = index
            .parse_primary("/repo/os", PRIMARY)
            .expect("parse primary");
        assert_eq!(pkgs.len(), 1);

        RpmPackageIndex::parse_filelists(FILELISTS, &mut pkgs).expect("parse filelists");
        let pkg = pkgs.get("abc123").expect("package");
        assert_eq!(pkg.name, "gnome-calculator");
        assert_eq!(pkg.version, "45.0-1.fc39");
        assert_eq!(pkg.contents.len(), 2);
        assert!(pkg.filename.ends_with("gnome-calculator-45.0-1.fc39.x86_64.rpm"));
    }
}
