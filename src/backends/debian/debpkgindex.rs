//! The Debian-style package index reader.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::UNIX_EPOCH;

use anyhow::{Context, Result, bail};
use regex::Regex;
use tracing::{debug, warn};

use super::debpkg::{DebPackage, DebPackageLocaleTexts};
use super::debutils::{compare_versions, download_if_necessary};
use super::tagfile::{TagFile, TagSection};
use crate::backends::{GStreamer, Package, PackageRef};
use crate::config::Config;
use crate::datastore::{DataStore, DataValue};
use crate::downloader::get_text_file_contents;
use crate::utils::{escape_xml, is_remote};

/// Reads `dists/<suite>/<section>/binary-<arch>/Packages.*` indexes.
pub struct DebianPackageIndex {
    root_dir: String,
    tmp_dir: PathBuf,
    pkg_cache: Mutex<HashMap<String, Vec<PackageRef>>>,
    l10n_text_index: Mutex<HashMap<String, Arc<DebPackageLocaleTexts>>>,
    index_changed: Mutex<HashMap<PathBuf, bool>>,
}

/// Convert a Debian package description body into description markup:
/// paragraphs separated by ` .` lines become `<p>` blocks.
pub(crate) fn package_desc_to_markup(lines: &[&str]) -> String {
    let mut description = String::from("<p>");
    let mut first = true;
    for line in lines {
        let trimmed = line.trim();
        if trimmed == "." {
            description.push_str("</p>\n<p>");
            first = true;
            continue;
        }
        if first {
            first = false;
        } else {
            description.push(' ');
        }
        description.push_str(&escape_xml(trimmed));
    }
    description.push_str("</p>");
    description
}

/// Parse `;`-separated GStreamer capability fields off a package section.
fn gstreamer_from_section(section: &TagSection) -> Option<GStreamer> {
    let split = |field: &str| -> Vec<String> {
        section
            .field(field)
            .unwrap_or_default()
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    };

    let gst = GStreamer {
        decoders: split("Gstreamer-Decoders"),
        encoders: split("Gstreamer-Encoders"),
        elements: split("Gstreamer-Elements"),
        uri_sinks: split("Gstreamer-Uri-Sinks"),
        uri_sources: split("Gstreamer-Uri-Sources"),
    };
    gst.is_not_empty().then_some(gst)
}

impl DebianPackageIndex {
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
            l10n_text_index: Mutex::new(HashMap::new()),
            index_changed: Mutex::new(HashMap::new()),
        })
    }

    /// Drop all caches.
    pub fn release(&self) {
        if let Ok(mut cache) = self.pkg_cache.lock() {
            cache.clear();
        }
        if let Ok(mut index) = self.l10n_text_index.lock() {
            index.clear();
        }
        if let Ok(mut changed) = self.index_changed.lock() {
            changed.clear();
        }
    }

    /// Languages with `Translation-<lang>` data, from the `InRelease` file.
    fn find_translations(&self, suite: &str, section: &str) -> Vec<String> {
        let in_release = format!(
            "{}/dists/{}/InRelease",
            self.root_dir.trim_end_matches('/'),
            suite
        );
        let Ok(re) = Regex::new(&format!(r"{}/i18n/Translation-(\w+)$", regex::escape(section)))
        else {
            return vec!["en".to_string()];
        };

        match get_text_file_contents(&in_release, 2) {
            Ok(lines) => {
                let mut translations: Vec<String> = lines
                    .iter()
                    .filter_map(|line| re.captures(line))
                    .filter_map(|caps| caps.get(1))
                    .map(|m| m.as_str().to_string())
                    .collect();
                translations.sort();
                translations.dedup();
                translations
            }
            Err(_) => {
                warn!(file = %in_release, "could not get InRelease, will assume 'en' is available");
                vec!["en".to_string()]
            }
        }
    }

    fn load_package_long_descs(
        &self,
        pkgs: &HashMap<String, Arc<DebPackage>>,
        suite: &str,
        section: &str,
    ) {
        let langs = self.find_translations(suite, section);
        debug!(languages = ?langs, "found translations");

        for lang in langs {
            let full_path = format!("dists/{suite}/{section}/i18n/Translation-{lang}.{{}}");
            let fname = match download_if_necessary(&self.root_dir, &self.tmp_dir, &full_path) {
                Ok(f) => f,
                Err(_) => {
                    debug!(lang = %lang, suite, section, "no translations");
                    continue;
                }
            };

            let data = match crate::zarchive::decompress_file(&fname) {
                Ok(d) => d,
                Err(e) => {
                    warn!(file = %fname.display(), error = %e, "unable to read translation file");
                    continue;
                }
            };
            let tagf = TagFile::parse(&String::from_utf8_lossy(&data));
            let desc_field = format!("Description-{lang}");

            for tsection in tagf.sections() {
                let Some(pkgname) = tsection.field("Package") else { continue };
                let Some(raw_desc) = tsection.field(&desc_field) else { continue };
                let Some(pkg) = pkgs.get(pkgname) else { continue };

                let text_pkg_id = format!("{}/{}", pkg.name(), pkg.version());
                let l10n_texts = {
                    let mut index = match self.l10n_text_index.lock() {
                        Ok(i) => i,
                        Err(_) => continue,
                    };
                    if let Some(texts) = index.get(&text_pkg_id) {
                        let texts = Arc::clone(texts);
                        pkg.set_localized_texts(Arc::clone(&texts));
                        texts
                    } else {
                        let texts = pkg.localized_texts();
                        index.insert(text_pkg_id, Arc::clone(&texts));
                        texts
                    }
                };

                let lines: Vec<&str> = raw_desc.split('\n').collect();
                if lines.len() < 2 {
                    continue;
                }

                if lang == "en" {
                    l10n_texts.set_summary(lines[0], "C");
                }
                l10n_texts.set_summary(lines[0], &lang);

                let description = package_desc_to_markup(&lines[1..]);
                if lang == "en" {
                    l10n_texts.set_description(&description, "C");
                }
                l10n_texts.set_description(&description, &lang);
            }
        }
    }

    fn get_index_file(&self, suite: &str, section: &str, arch: &str) -> Result<PathBuf> {
        let path = format!("dists/{suite}/{section}/binary-{arch}/Packages.{{}}");
        download_if_necessary(&self.root_dir, &self.tmp_dir, &path)
    }

    /// Load the packages of one triple as concrete [`DebPackage`] values.
    pub(crate) fn load_packages(
        &self,
        suite: &str,
        section: &str,
        arch: &str,
        with_long_descs: bool,
    ) -> Result<Vec<Arc<DebPackage>>> {
        let index_fname = self.get_index_file(suite, section, arch)?;
        if !index_fname.exists() {
            warn!(file = %index_fname.display(), "archive package index file does not exist");
            return Ok(Vec::new());
        }

        let data = crate::zarchive::decompress_file(&index_fname)
            .with_context(|| format!("unable to read index {}", index_fname.display()))?;
        let tagf = TagFile::parse(&String::from_utf8_lossy(&data));
        debug!(file = %index_fname.display(), sections = tagf.len(), "opened package index");

        let mut pkgs: HashMap<String, Arc<DebPackage>> = HashMap::new();
        for psection in tagf.sections() {
            let Some(name) = psection.field("Package") else { continue };
            let ver = psection.field_or_empty("Version");
            let fname = psection.field_or_empty("Filename");
            let pkg_arch = psection.field_or_empty("Architecture");

            // arch:all entries mix with every concrete architecture; record
            // the concrete one
            let actual_arch = if pkg_arch == "all" { arch } else { pkg_arch };

            let pkg = Arc::new(DebPackage::new(name, ver, actual_arch, &self.tmp_dir, None));
            pkg.set_filename(&format!(
                "{}/{}",
                self.root_dir.trim_end_matches('/'),
                fname
            ));
            pkg.set_maintainer(psection.field_or_empty("Maintainer"));

            if let Some(raw_desc) = psection.field("Description") {
                // old-style descriptions embedded in the Packages file
                let lines: Vec<&str> = raw_desc.split('\n').collect();
                if lines.len() >= 2 {
                    let texts = pkg.localized_texts();
                    texts.set_summary(lines[0], "C");
                    texts.set_description(&package_desc_to_markup(&lines[1..]), "C");
                }
            }

            if let Some(gst) = gstreamer_from_section(psection) {
                pkg.set_gst(gst);
            }

            if !pkg.is_valid() {
                warn!(pkid = %pkg.id(), "found invalid package, skipping it");
                continue;
            }

            // keep only the most recent version per package name
            if let Some(existing) = pkgs.get(name)
                && compare_versions(&existing.version(), &pkg.version()) > 0
            {
                continue;
            }
            pkgs.insert(name.to_string(), pkg);
        }

        if with_long_descs {
            self.load_package_long_descs(&pkgs, suite, section);
        }

        Ok(pkgs.into_values().collect())
    }

    /// Enumerate the packages of a triple, memoized per run.
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

        let pkgs = self.load_packages(suite, section, arch, with_long_descs)?;
        let refs: Vec<PackageRef> = pkgs.into_iter().map(|p| p as PackageRef).collect();
        if let Ok(mut cache) = self.pkg_cache.lock() {
            cache.insert(id, refs.clone());
        }
        Ok(refs)
    }

    /// Build a package from a single `.deb` file, reading its control data.
    pub fn package_for_file(&self, fname: &str) -> Result<PackageRef> {
        let probe = DebPackage::new("pkg", "probe", "unknown", &self.tmp_dir, None);
        probe.set_filename(fname);
        let control = probe
            .read_control_information()
            .with_context(|| format!("unable to read control information for package {fname}"))?;
        probe.finish();

        let Some(csection) = control.first_section() else {
            bail!("unable to get control data for package {fname}");
        };
        let name = csection.field_or_empty("Package");
        let ver = csection.field_or_empty("Version");
        let arch = csection.field_or_empty("Architecture");
        if name.is_empty() || ver.is_empty() || arch.is_empty() {
            bail!("unable to get control data for package {fname}");
        }

        let pkg = Arc::new(DebPackage::new(name, ver, arch, &self.tmp_dir, None));
        pkg.set_filename(fname);
        pkg.set_maintainer(csection.field_or_empty("Maintainer"));
        if let Some(raw_desc) = csection.field("Description") {
            let lines: Vec<&str> = raw_desc.split('\n').collect();
            if lines.len() >= 2 {
                let texts = pkg.localized_texts();
                texts.set_summary(lines[0], "C");
                texts.set_description(&package_desc_to_markup(&lines[1..]), "C");
            }
        }

        Ok(pkg as PackageRef)
    }

    /// What: Compare the index mtime against the stored repository state.
    ///
    /// Inputs:
    /// - `dstore`: Data store with the `repository` records
    /// - `suite`/`section`/`arch`: The triple to check
    ///
    /// Output:
    /// - `true` when the index changed (or freshness is unknown)
    ///
    /// Details:
    /// - The stored mtime is updated on every call; per-index answers are
    ///   cached for the lifetime of this reader.
    pub fn has_changes(
        &self,
        dstore: &DataStore,
        suite: &str,
        section: &str,
        arch: &str,
    ) -> Result<bool> {
        let Ok(index_fname) = self.get_index_file(suite, section, arch) else {
            // a missing index is reported later anyway
            return Ok(true);
        };
        if !index_fname.exists() {
            return Ok(true);
        }

        if let Ok(cache) = self.index_changed.lock()
            && let Some(answer) = cache.get(&index_fname)
        {
            return Ok(*answer);
        }

        let mtime = index_fname
            .metadata()?
            .modified()?
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);

        let mut repo_info = dstore.get_repo_info(suite, section, arch)?;
        let changed = match repo_info.data.get("mtime").and_then(DataValue::as_int) {
            Some(past_time) => past_time != mtime,
            None => true,
        };

        repo_info.data.insert("mtime".to_string(), DataValue::Int(mtime));
        dstore.set_repo_info(suite, section, arch, &repo_info)?;

        if let Ok(mut cache) = self.index_changed.lock() {
            cache.insert(index_fname, changed);
        }
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn description_markup_conversion() {
        let lines = vec![
            "Vim is an almost compatible version of the UNIX editor Vi.",
            ".",
            "Many new features: <markup> & entities.",
        ];
        let markup = package_desc_to_markup(&lines);
        assert!(markup.starts_with("<p>"));
        assert!(markup.contains("</p>\n<p>"));
        assert!(markup.contains("&lt;markup&gt; &amp; entities."));
        assert!(markup.ends_with("</p>"));
    }

    #[test]
    fn gstreamer_fields_are_parsed() {
        let tagf = TagFile::parse(
            "Package: gst-plugins\nGstreamer-Decoders: audio/mpeg; video/x-h264\nGstreamer-Elements: mpegaudioparse\n",
        );
        let section = tagf.first_section().expect("section");
        let gst = gstreamer_from_section(section).expect("gst data");
        assert_eq!(gst.decoders, vec!["audio/mpeg".to_string(), "video/x-h264".to_string()]);
        assert_eq!(gst.elements, vec!["mpegaudioparse".to_string()]);

        let tagf = TagFile::parse("Package: plain\n");
        assert!(gstreamer_from_section(tagf.first_section().expect("section")).is_none());
    }
}
