//! Debian binary packages (`.deb`).
//!
//! A `.deb` is an `ar` container holding `control.tar.*` and `data.tar.*`
//! members. Contents are read from the control archive's `md5sums` file
//! (fast), except for icon themes where symlinked aliases only show up in
//! a full payload walk. File data is served from the payload tarball,
//! which is staged into the package's temporary directory on first use.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result, bail};
use tracing::{debug, warn};

use super::tagfile::TagFile;
use crate::backends::{GStreamer, Package};
use crate::compose::desktop::DesktopEntry;
use crate::downloader::Downloader;
use crate::utils::is_remote;
use crate::zarchive::ArchiveDecompressor;

/// What: Extract `ar` members whose name matches a prefix.
///
/// Inputs:
/// - `deb_path`: The `.deb` file
/// - `member_prefix`: Member name prefix (`control.tar`, `data.tar`)
/// - `dest_dir`: Directory receiving the member file
///
/// Output:
/// - Path of the extracted member
///
/// Details:
/// - `ar` is a trivial format: a global magic followed by 60-byte headers
///   with name, decimal size and a two-byte terminator, data padded to
///   even offsets.
fn extract_ar_member(deb_path: &Path, member_prefix: &str, dest_dir: &Path) -> Result<PathBuf> {
    let mut file = File::open(deb_path)
        .with_context(|| format!("unable to open package {}", deb_path.display()))?;

    let mut magic = [0u8; 8];
    file.read_exact(&mut magic)?;
    if &magic != b"!<arch>\n" {
        bail!("{} is not an ar archive", deb_path.display());
    }

    loop {
        let mut header = [0u8; 60];
        match file.read_exact(&mut header) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e.into()),
        }
        if &header[58..60] != b"`\n" {
            bail!("malformed ar member header in {}", deb_path.display());
        }

        let name = String::from_utf8_lossy(&header[0..16])
            .trim_end()
            .trim_end_matches('/')
            .to_string();
        let size: u64 = String::from_utf8_lossy(&header[48..58])
            .trim()
            .parse()
            .context("invalid ar member size")?;

        if name.starts_with(member_prefix) {
            fs::create_dir_all(dest_dir)?;
            let dest = dest_dir.join(&name);
            let mut out = File::create(&dest)?;
            std::io::copy(&mut (&mut file).take(size), &mut out)?;
            return Ok(dest);
        }

        // data is padded to even offsets
        let skip = size + (size % 2);
        file.seek(SeekFrom::Current(skip as i64))?;
    }

    bail!(
        "unable to find member '{member_prefix}*' in Debian package {}",
        deb_path.display()
    )
}

/// Localized summary/description texts, shared between the package
/// variants of different architectures.
#[derive(Debug, Default)]
pub struct DebPackageLocaleTexts {
    inner: Mutex<LocaleTextsInner>,
}

#[derive(Debug, Default)]
struct LocaleTextsInner {
    summary: BTreeMap<String, String>,
    description: BTreeMap<String, String>,
}

impl DebPackageLocaleTexts {
    /// Set the one-line summary for a locale.
    pub fn set_summary(&self, text: &str, locale: &str) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.summary.insert(locale.to_string(), text.to_string());
        }
    }

    /// Set the long description (markup) for a locale.
    pub fn set_description(&self, text: &str, locale: &str) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.description.insert(locale.to_string(), text.to_string());
        }
    }

    /// Snapshot of all summaries.
    #[must_use]
    pub fn summaries(&self) -> BTreeMap<String, String> {
        self.inner.lock().map(|i| i.summary.clone()).unwrap_or_default()
    }

    /// Snapshot of all descriptions.
    #[must_use]
    pub fn descriptions(&self) -> BTreeMap<String, String> {
        self.inner.lock().map(|i| i.description.clone()).unwrap_or_default()
    }
}

#[derive(Default)]
struct DebPackageState {
    local_deb_fname: Option<PathBuf>,
    control_archive: Option<ArchiveDecompressor>,
    data_archive: Option<ArchiveDecompressor>,
    contents: Option<Vec<String>>,
}

/// A package in a Debian-style archive.
pub struct DebPackage {
    name: String,
    version: String,
    arch: String,
    maintainer: Mutex<String>,
    deb_fname: Mutex<String>,
    gst: Mutex<Option<GStreamer>>,
    l10n_texts: Mutex<Arc<DebPackageLocaleTexts>>,
    tmp_dir: PathBuf,
    state: Mutex<DebPackageState>,
}

impl DebPackage {
    /// Create a package with its identity and temp-dir root.
    #[must_use]
    pub fn new(
        name: &str,
        version: &str,
        arch: &str,
        tmp_root: &Path,
        l10n_texts: Option<Arc<DebPackageLocaleTexts>>,
    ) -> Self {
        Self {
            name: name.to_string(),
            version: version.to_string(),
            arch: arch.to_string(),
            maintainer: Mutex::new(String::new()),
            deb_fname: Mutex::new(String::new()),
            gst: Mutex::new(None),
            l10n_texts: Mutex::new(l10n_texts.unwrap_or_default()),
            tmp_dir: tmp_root.join(format!("{name}-{version}_{arch}")),
            state: Mutex::new(DebPackageState::default()),
        }
    }

    /// Set the package file location (path or URL).
    pub fn set_filename(&self, fname: &str) {
        if let Ok(mut deb) = self.deb_fname.lock() {
            *deb = fname.to_string();
        }
        if let Ok(mut state) = self.state.lock() {
            state.local_deb_fname = None;
        }
    }

    /// Set the maintainer string.
    pub fn set_maintainer(&self, maint: &str) {
        if let Ok(mut m) = self.maintainer.lock() {
            *m = maint.to_string();
        }
    }

    /// Attach GStreamer capability metadata.
    pub fn set_gst(&self, gst: GStreamer) {
        if let Ok(mut g) = self.gst.lock() {
            *g = Some(gst);
        }
    }

    /// The shared localized-text object of this package.
    #[must_use]
    pub fn localized_texts(&self) -> Arc<DebPackageLocaleTexts> {
        self.l10n_texts
            .lock()
            .map(|t| Arc::clone(&t))
            .unwrap_or_default()
    }

    /// Share a localized-text object with this package.
    pub fn set_localized_texts(&self, texts: Arc<DebPackageLocaleTexts>) {
        if let Ok(mut t) = self.l10n_texts.lock() {
            *t = texts;
        }
    }

    /// The local package file, downloading it first when remote.
    fn local_filename(&self, state: &mut DebPackageState) -> Result<PathBuf> {
        if let Some(local) = &state.local_deb_fname {
            return Ok(local.clone());
        }

        let deb_fname = self
            .deb_fname
            .lock()
            .map(|f| f.clone())
            .unwrap_or_default();
        if deb_fname.is_empty() {
            bail!("package {} has no file location set", self.id());
        }

        let local = if is_remote(&deb_fname) {
            let dl = Downloader::acquire()?;
            let dest = self.tmp_dir.join(crate::utils::filename_from_uri(&deb_fname));
            dl.download_file(&deb_fname, &dest, 2)?;
            dest
        } else {
            PathBuf::from(&deb_fname)
        };
        state.local_deb_fname = Some(local.clone());
        Ok(local)
    }

    fn open_control_archive<'a>(
        &self,
        state: &'a mut DebPackageState,
    ) -> Result<&'a ArchiveDecompressor> {
        if state.control_archive.is_none() {
            let deb = self.local_filename(state)?;
            let member = extract_ar_member(&deb, "control.tar", &self.tmp_dir)?;
            let mut ad = ArchiveDecompressor::new();
            ad.open(&member);
            state.control_archive = Some(ad);
        }
        Ok(state
            .control_archive
            .as_ref()
            .unwrap_or_else(|| unreachable!("control archive was just opened")))
    }

    fn open_payload_archive<'a>(
        &self,
        state: &'a mut DebPackageState,
    ) -> Result<&'a ArchiveDecompressor> {
        if state.data_archive.is_none() {
            let deb = self.local_filename(state)?;
            let member = extract_ar_member(&deb, "data.tar", &self.tmp_dir)?;
            let mut ad = ArchiveDecompressor::new();
            ad.open(&member);
            state.data_archive = Some(ad);
        }
        Ok(state
            .data_archive
            .as_ref()
            .unwrap_or_else(|| unreachable!("payload archive was just opened")))
    }

    /// Extract the whole payload below `dest` (used by the language-pack
    /// machinery).
    pub fn extract_package(&self, dest: &Path) -> Result<()> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| anyhow::anyhow!("package state lock poisoned"))?;
        fs::create_dir_all(dest)?;
        let archive = self.open_payload_archive(&mut state)?;
        archive.extract_archive(dest)?;
        Ok(())
    }

    /// Read the `control` file of this package.
    pub fn read_control_information(&self) -> Result<TagFile> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| anyhow::anyhow!("package state lock poisoned"))?;
        let archive = self.open_control_archive(&mut state)?;
        let data = archive
            .read_data("./control")
            .context("could not read control file")?;
        Ok(TagFile::parse(&String::from_utf8_lossy(&data)))
    }
}

impl Package for DebPackage {
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
        self.localized_texts().summaries()
    }

    fn description(&self) -> BTreeMap<String, String> {
        self.localized_texts().descriptions()
    }

    fn gst(&self) -> Option<GStreamer> {
        self.gst.lock().ok().and_then(|g| g.clone())
    }

    fn filename(&self) -> String {
        self.deb_fname.lock().map(|f| f.clone()).unwrap_or_default()
    }

    fn contents(&self) -> Result<Vec<String>> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| anyhow::anyhow!("package state lock poisoned"))?;
        if let Some(contents) = &state.contents {
            return Ok(contents.clone());
        }

        if self.name.ends_with("icon-theme") {
            // md5sums lacks symbolic links, which icon themes rely on for
            // icon aliases; walk the payload instead
            let archive = self.open_payload_archive(&mut state)?;
            let contents = archive.read_contents()?;
            state.contents = Some(contents.clone());
            return Ok(contents);
        }

        let archive = self.open_control_archive(&mut state)?;
        let md5sums = match archive.read_data("./md5sums") {
            Ok(data) => data,
            Err(e) => {
                warn!(pkid = %self.id(), error = %e, "could not read md5sums file");
                return Ok(Vec::new());
            }
        };

        let text = String::from_utf8_lossy(&md5sums);
        let mut contents = Vec::new();
        for line in text.lines() {
            // md5sums lines are "<hash>  <path>"
            let Some(idx) = line.find("  ") else { continue };
            if idx == 0 {
                continue;
            }
            let fname = &line[idx + 2..];
            if !fname.is_empty() {
                contents.push(format!("/{fname}"));
            }
        }

        state.contents = Some(contents.clone());
        Ok(contents)
    }

    fn file_data(&self, path: &str) -> Result<Vec<u8>> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| anyhow::anyhow!("package state lock poisoned"))?;
        let archive = self.open_payload_archive(&mut state)?;
        Ok(archive.read_data(path)?)
    }

    fn finish(&self) {
        let Ok(mut state) = self.state.lock() else { return };
        if let Some(archive) = &mut state.control_archive {
            archive.close();
        }
        if let Some(archive) = &mut state.data_archive {
            archive.close();
        }
        state.control_archive = None;
        state.data_archive = None;

        if self.tmp_dir.exists() {
            state.local_deb_fname = None;
            if let Err(e) = fs::remove_dir_all(&self.tmp_dir) {
                debug!(dir = %self.tmp_dir.display(), error = %e, "unable to remove temporary directory");
            }
        }
    }

    fn has_desktop_file_translations(&self) -> bool {
        false
    }

    fn desktop_file_translations(
        &self,
        _entry: &DesktopEntry,
        _text: &str,
    ) -> BTreeMap<String, String> {
        BTreeMap::new()
    }
}

impl Drop for DebPackage {
    fn drop(&mut self) {
        self.finish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_ar(path: &Path, members: &[(&str, &[u8])]) {
        let mut f = File::create(path).expect("create ar");
        f.write_all(b"!<arch>\n").expect("magic");
        for (name, data) in members {
            let header = format!(
                "{:<16}{:<12}{:<6}{:<6}{:<8}{:<10}`\n",
                name,
                0,
                0,
                0,
                100_644,
                data.len()
            );
            f.write_all(header.as_bytes()).expect("header");
            f.write_all(data).expect("data");
            if data.len() % 2 == 1 {
                f.write_all(b"\n").expect("padding");
            }
        }
    }

    #[test]
    fn ar_member_extraction() {
        let dir = tempfile::tempdir().expect("tempdir");
        let deb = dir.path().join("test.deb");
        write_ar(
            &deb,
            &[
                ("debian-binary", b"2.0\n"),
                ("control.tar.gz", b"fake control data"),
                ("data.tar.xz", b"fake payload data"),
            ],
        );

        let out = extract_ar_member(&deb, "data.tar", dir.path()).expect("extract");
        assert_eq!(out.file_name().and_then(|n| n.to_str()), Some("data.tar.xz"));
        assert_eq!(fs::read(&out).expect("read"), b"fake payload data");

        let ctrl = extract_ar_member(&deb, "control.tar", dir.path()).expect("extract control");
        assert_eq!(fs::read(&ctrl).expect("read"), b"fake control data");

        assert!(extract_ar_member(&deb, "nonexistent", dir.path()).is_err());
    }

    #[test]
    fn identity_and_pkid() {
        let dir = tempfile::tempdir().expect("tempdir");
        let pkg = DebPackage::new("vim", "2:9.0-1", "amd64", dir.path(), None);
        assert_eq!(pkg.id(), "vim/2:9.0-1/amd64");
        assert!(pkg.is_valid());

        let invalid = DebPackage::new("", "1", "amd64", dir.path(), None);
        assert!(!invalid.is_valid());
    }

    #[test]
    fn locale_texts_are_shared() {
        let dir = tempfile::tempdir().expect("tempdir");
        let texts = Arc::new(DebPackageLocaleTexts::default());
        texts.set_summary("Editor", "C");
        texts.set_summary("Editor (de)", "de");

        let amd64 = DebPackage::new("vim", "1.0", "amd64", dir.path(), Some(Arc::clone(&texts)));
        let arm64 = DebPackage::new("vim", "1.0", "arm64", dir.path(), Some(texts));
        assert_eq!(amd64.summary().get("de"), arm64.summary().get("de"));

        arm64.localized_texts().set_summary("late", "fr");
        assert_eq!(amd64.summary().get("fr").map(String::as_str), Some("late"));
    }
}
