//! The Ubuntu backend: Debian plus language packs.
//!
//! Ubuntu splits application translations out of the packages into
//! `language-pack-*` packages. The provider extracts those once per run,
//! optionally generates system locales with `localedef`, and then serves
//! desktop-entry translations by looking the source text up in the
//! message catalogs of the declared gettext domain.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use rayon::prelude::*;
use tracing::{debug, warn};

use super::debian::{DebPackage, DebianPackageIndex};
use super::{GStreamer, Package, PackageKind, PackageRef};
use crate::compose::desktop::DesktopEntry;
use crate::config::Config;
use crate::datastore::DataStore;

/// What: Parse a gettext `.mo` message catalog.
///
/// Inputs:
/// - `data`: Raw catalog bytes
///
/// Output:
/// - `msgid → msgstr` map; plural forms keep only the singular
///
/// Details:
/// - Handles both little- and big-endian catalogs (magic `0x950412de`).
fn parse_mo_catalog(data: &[u8]) -> Option<HashMap<String, String>> {
    if data.len() < 28 {
        return None;
    }

    let magic_le = u32::from_le_bytes(data[0..4].try_into().ok()?);
    let read_u32: fn(&[u8]) -> Option<u32> = match magic_le {
        0x950412de => |b| b.get(0..4).and_then(|s| s.try_into().ok()).map(u32::from_le_bytes),
        0xde120495 => |b| b.get(0..4).and_then(|s| s.try_into().ok()).map(u32::from_be_bytes),
        _ => return None,
    };

    let count = read_u32(&data[8..])? as usize;
    let orig_offset = read_u32(&data[12..])? as usize;
    let trans_offset = read_u32(&data[16..])? as usize;

    let mut catalog = HashMap::with_capacity(count);
    for i in 0..count {
        let o_entry = orig_offset + i * 8;
        let t_entry = trans_offset + i * 8;
        let o_len = read_u32(data.get(o_entry..)?)? as usize;
        let o_off = read_u32(data.get(o_entry + 4..)?)? as usize;
        let t_len = read_u32(data.get(t_entry..)?)? as usize;
        let t_off = read_u32(data.get(t_entry + 4..)?)? as usize;

        let msgid = data.get(o_off..o_off + o_len)?;
        let msgstr = data.get(t_off..t_off + t_len)?;

        // plural entries separate forms with NUL; keep the singular only
        let msgid = msgid.split(|&b| b == 0).next().unwrap_or(msgid);
        let msgstr = msgstr.split(|&b| b == 0).next().unwrap_or(msgstr);
        if msgid.is_empty() {
            continue;
        }
        catalog.insert(
            String::from_utf8_lossy(msgid).into_owned(),
            String::from_utf8_lossy(msgstr).into_owned(),
        );
    }

    Some(catalog)
}

/// Extracts language packs and answers translation lookups from their
/// message catalogs.
pub struct LanguagePackProvider {
    langpack_dir: PathBuf,
    locale_dir: PathBuf,
    localedef_exe: Option<PathBuf>,
    langpacks: Mutex<Vec<Arc<DebPackage>>>,
    extracted: Mutex<bool>,
    catalog_cache: Mutex<HashMap<PathBuf, Arc<HashMap<String, String>>>>,
}

impl LanguagePackProvider {
    /// Create a provider rooted below the global temporary directory.
    #[must_use]
    pub fn new(global_tmp_dir: &Path) -> Self {
        let langpack_dir = global_tmp_dir.join("langpacks");
        let locale_dir = langpack_dir.join("locales");
        let localedef_exe = which::which("localedef").ok();
        if localedef_exe.is_none() {
            warn!("localedef executable not found in PATH");
        }
        Self {
            langpack_dir,
            locale_dir,
            localedef_exe,
            langpacks: Mutex::new(Vec::new()),
            extracted: Mutex::new(false),
            catalog_cache: Mutex::new(HashMap::new()),
        }
    }

    /// Register language packs found while loading the index.
    pub fn add_language_packs(&self, packs: Vec<Arc<DebPackage>>) {
        if let Ok(mut langpacks) = self.langpacks.lock() {
            langpacks.extend(packs);
        }
    }

    /// Drop registered packs (index release).
    pub fn clear(&self) {
        if let Ok(mut langpacks) = self.langpacks.lock() {
            langpacks.clear();
        }
        if let Ok(mut cache) = self.catalog_cache.lock() {
            cache.clear();
        }
    }

    /// What: Extract all registered language packs, once.
    ///
    /// Details:
    /// - Every distinct pack is unpacked below the langpack directory.
    /// - Locales listed in `var/lib/locales/supported.d` are generated
    ///   with `localedef` (in parallel) when the tool is available.
    pub fn extract_langpacks(&self) {
        let Ok(mut extracted) = self.extracted.lock() else { return };
        if *extracted {
            return;
        }
        *extracted = true;

        let langpacks = self
            .langpacks
            .lock()
            .map(|l| l.clone())
            .unwrap_or_default();

        if let Err(e) = fs::create_dir_all(&self.langpack_dir) {
            warn!(error = %e, "unable to create langpack directory");
            return;
        }

        let mut seen: HashSet<String> = HashSet::new();
        for pkg in &langpacks {
            if !seen.insert(pkg.name()) {
                continue;
            }
            debug!(pkg = %pkg.name(), "extracting language pack");
            if let Err(e) = pkg.extract_package(&self.langpack_dir) {
                warn!(pkg = %pkg.name(), error = %e, "unable to extract language pack");
            }
        }
        if seen.is_empty() {
            warn!("we have extracted no language packs for this repository");
            return;
        }

        let _ = fs::create_dir_all(&self.locale_dir);

        let supported_dir = self.langpack_dir.join("var/lib/locales/supported.d");
        if !supported_dir.exists() {
            warn!("no supported locales directory found in language packs");
            return;
        }
        let Some(localedef) = &self.localedef_exe else {
            warn!("not generating locales: the localedef binary is missing");
            return;
        };

        let mut locale_lines: Vec<String> = Vec::new();
        if let Ok(entries) = fs::read_dir(&supported_dir) {
            for entry in entries.flatten() {
                if let Ok(text) = fs::read_to_string(entry.path()) {
                    locale_lines.extend(
                        text.lines()
                            .map(str::trim)
                            .filter(|l| !l.is_empty())
                            .map(str::to_string),
                    );
                }
            }
        }

        locale_lines.par_iter().for_each(|line| {
            let components: Vec<&str> = line.split(' ').collect();
            if components.len() < 2 {
                return;
            }
            let Some(locale_base) = components[0].split('.').next() else {
                return;
            };
            let outdir = self.locale_dir.join(components[0]);
            debug!(locale = %components[0], "generating locale");
            let status = std::process::Command::new(localedef)
                .arg("--no-archive")
                .arg("-i")
                .arg(locale_base)
                .arg("-c")
                .arg("-f")
                .arg(components[1])
                .arg(&outdir)
                .status();
            if let Err(e) = status {
                debug!(locale = %components[0], error = %e, "localedef failed");
            }
        });
    }

    fn catalog(&self, path: &Path) -> Option<Arc<HashMap<String, String>>> {
        if let Ok(cache) = self.catalog_cache.lock()
            && let Some(catalog) = cache.get(path)
        {
            return Some(Arc::clone(catalog));
        }
        let data = fs::read(path).ok()?;
        let catalog = Arc::new(parse_mo_catalog(&data)?);
        if let Ok(mut cache) = self.catalog_cache.lock() {
            cache.insert(path.to_path_buf(), Arc::clone(&catalog));
        }
        Some(catalog)
    }

    /// What: Look up translations of a desktop-entry text.
    ///
    /// Inputs:
    /// - `entry`: The desktop entry (provides the gettext domain)
    /// - `text`: Source text (`Name`/`Comment` value)
    ///
    /// Output:
    /// - `locale → translated text`, omitting identity translations
    pub fn desktop_file_translations(
        &self,
        entry: &DesktopEntry,
        text: &str,
    ) -> BTreeMap<String, String> {
        let Some(domain) = entry.gettext_domain() else {
            return BTreeMap::new();
        };
        self.extract_langpacks();

        let locale_root = self.langpack_dir.join("usr/share/locale-langpack");
        let mut result = BTreeMap::new();
        let Ok(entries) = fs::read_dir(&locale_root) else {
            return result;
        };

        for dir_entry in entries.flatten() {
            if !dir_entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
                continue;
            }
            let locale = dir_entry.file_name().to_string_lossy().into_owned();
            let mo_path = dir_entry
                .path()
                .join("LC_MESSAGES")
                .join(format!("{domain}.mo"));
            if !mo_path.exists() {
                continue;
            }
            let Some(catalog) = self.catalog(&mo_path) else { continue };
            if let Some(translated) = catalog.get(text)
                && !translated.is_empty()
                && translated != text
            {
                result.insert(locale.clone(), translated.clone());
            }
        }

        result
    }
}

/// A Debian package with language-pack translation support.
pub struct UbuntuPackage {
    deb: Arc<DebPackage>,
    langpack: Arc<LanguagePackProvider>,
}

impl UbuntuPackage {
    /// Wrap a Debian package with the shared language-pack provider.
    #[must_use]
    pub fn new(deb: Arc<DebPackage>, langpack: Arc<LanguagePackProvider>) -> Self {
        Self { deb, langpack }
    }
}

impl Package for UbuntuPackage {
    fn name(&self) -> String {
        self.deb.name()
    }
    fn version(&self) -> String {
        self.deb.version()
    }
    fn arch(&self) -> String {
        self.deb.arch()
    }
    fn maintainer(&self) -> String {
        self.deb.maintainer()
    }
    fn kind(&self) -> PackageKind {
        self.deb.kind()
    }
    fn summary(&self) -> BTreeMap<String, String> {
        self.deb.summary()
    }
    fn description(&self) -> BTreeMap<String, String> {
        self.deb.description()
    }
    fn gst(&self) -> Option<GStreamer> {
        self.deb.gst()
    }
    fn filename(&self) -> String {
        self.deb.filename()
    }
    fn contents(&self) -> Result<Vec<String>> {
        self.deb.contents()
    }
    fn file_data(&self, path: &str) -> Result<Vec<u8>> {
        self.deb.file_data(path)
    }
    fn finish(&self) {
        self.deb.finish();
    }

    fn has_desktop_file_translations(&self) -> bool {
        true
    }

    fn desktop_file_translations(
        &self,
        entry: &DesktopEntry,
        text: &str,
    ) -> BTreeMap<String, String> {
        self.langpack.desktop_file_translations(entry, text)
    }
}

/// The Ubuntu package index: a thin decorator over the Debian reader that
/// installs the language-pack provider.
pub struct UbuntuPackageIndex {
    inner: DebianPackageIndex,
    langpack: Arc<LanguagePackProvider>,
    pkg_cache: Mutex<HashMap<String, Vec<PackageRef>>>,
}

impl UbuntuPackageIndex {
    /// Create the index reader.
    pub fn new(dir: &str, conf: &Config) -> Result<Self> {
        let inner = DebianPackageIndex::new(dir, conf)?;
        let langpack = Arc::new(LanguagePackProvider::new(conf.tmp_dir()));
        Ok(Self {
            inner,
            langpack,
            pkg_cache: Mutex::new(HashMap::new()),
        })
    }

    /// Enumerate packages, wiring every package to the language packs of
    /// its section.
    pub fn packages_for(
        &self,
        suite: &str,
        section: &str,
        arch: &str,
        with_long_descs: bool,
    ) -> Result<Vec<PackageRef>> {
        let id = format!("{suite}/{section}/{arch}");
        if let Ok(cache) = self.pkg_cache.lock()
            && let Some(pkgs) = cache.get(&id)
        {
            return Ok(pkgs.clone());
        }

        let debs = self.inner.load_packages(suite, section, arch, with_long_descs)?;

        let langpacks: Vec<Arc<DebPackage>> = debs
            .iter()
            .filter(|p| p.name().starts_with("language-pack-"))
            .map(Arc::clone)
            .collect();
        self.langpack.add_language_packs(langpacks);

        let refs: Vec<PackageRef> = debs
            .into_iter()
            .map(|deb| {
                Arc::new(UbuntuPackage::new(deb, Arc::clone(&self.langpack))) as PackageRef
            })
            .collect();
        if let Ok(mut cache) = self.pkg_cache.lock() {
            cache.insert(id, refs.clone());
        }
        Ok(refs)
    }

    /// Build a package from a single `.deb` file.
    pub fn package_for_file(&self, fname: &str) -> Result<PackageRef> {
        self.inner.package_for_file(fname)
    }

    /// Delegate index freshness to the Debian reader.
    pub fn has_changes(
        &self,
        dstore: &DataStore,
        suite: &str,
        section: &str,
        arch: &str,
    ) -> Result<bool> {
        self.inner.has_changes(dstore, suite, section, arch)
    }

    /// Drop all caches.
    pub fn release(&self) {
        if let Ok(mut cache) = self.pkg_cache.lock() {
            cache.clear();
        }
        self.langpack.clear();
        self.inner.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a minimal little-endian .mo catalog with the given entries.
    fn build_mo(entries: &[(&str, &str)]) -> Vec<u8> {
        let n = entries.len() as u32;
        let orig_table = 28u32;
        let trans_table = orig_table + n * 8;
        let mut strings_offset = trans_table + n * 8;

        let mut header = Vec::new();
        header.extend_from_slice(&0x950412deu32.to_le_bytes());
        header.extend_from_slice(&0u32.to_le_bytes());
        header.extend_from_slice(&n.to_le_bytes());
        header.extend_from_slice(&orig_table.to_le_bytes());
        header.extend_from_slice(&trans_table.to_le_bytes());
        header.extend_from_slice(&0u32.to_le_bytes());
        header.extend_from_slice(&0u32.to_le_bytes());

        let mut orig_entries = Vec::new();
        let mut trans_entries = Vec::new();
        let mut strings = Vec::new();
        for (msgid, _) in entries {
            orig_entries.extend_from_slice(&(msgid.len() as u32).to_le_bytes());
            orig_entries.extend_from_slice(&strings_offset.to_le_bytes());
            strings.extend_from_slice(msgid.as_bytes());
            strings.push(0);
            strings_offset += msgid.len() as u32 + 1;
        }
        for (_, msgstr) in entries {
            trans_entries.extend_from_slice(&(msgstr.len() as u32).to_le_bytes());
            trans_entries.extend_from_slice(&strings_offset.to_le_bytes());
            strings.extend_from_slice(msgstr.as_bytes());
            strings.push(0);
            strings_offset += msgstr.len() as u32 + 1;
        }

        let mut out = header;
        out.extend_from_slice(&orig_entries);
        out.extend_from_slice(&trans_entries);
        out.extend_from_slice(&strings);
        out
    }

    #[test]
    fn mo_catalog_parsing() {
        let mo = build_mo(&[("Calculator", "Taschenrechner"), ("Editor", "Editor")]);
        let catalog = parse_mo_catalog(&mo).expect("parse");
        assert_eq!(catalog.get("Calculator").map(String::as_str), Some("Taschenrechner"));
        assert_eq!(catalog.get("Editor").map(String::as_str), Some("Editor"));
        assert!(parse_mo_catalog(b"garbage").is_none());
    }

    #[test]
    fn translations_resolved_through_langpack_tree() {
        let dir = tempfile::tempdir().expect("tempdir");
        let provider = LanguagePackProvider::new(dir.path());

        // fake an extracted langpack tree; mark extraction as done
        *provider.extracted.lock().expect("lock") = true;
        let mo_dir = dir
            .path()
            .join("langpacks/usr/share/locale-langpack/de/LC_MESSAGES");
        fs::create_dir_all(&mo_dir).expect("mkdir");
        fs::write(mo_dir.join("calculator.mo"), build_mo(&[("Calculator", "Taschenrechner")]))
            .expect("write mo");

        let entry = DesktopEntry::parse(
            b"[Desktop Entry]\nName=Calculator\nX-Ubuntu-Gettext-Domain=calculator\n",
        )
        .expect("entry");

        let translations = provider.desktop_file_translations(&entry, "Calculator");
        assert_eq!(translations.get("de").map(String::as_str), Some("Taschenrechner"));

        // identity translations are dropped
        let entry_no_domain =
            DesktopEntry::parse(b"[Desktop Entry]\nName=Calculator\n").expect("entry");
        assert!(
            provider
                .desktop_file_translations(&entry_no_domain, "Calculator")
                .is_empty()
        );
    }
}
