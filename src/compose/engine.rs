//! The compose run: turn one unit into components and hints.
//!
//! A run scans the unit for metainfo and desktop-entry files, parses and
//! pairs them, derives language completion, mints global component IDs,
//! lets the caller veto already-known components, and finally fetches
//! screenshots for everything that survived.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::PathBuf;

use tracing::{debug, warn};

use super::component::{Component, ComponentKind, MergeKind};
use super::desktop::{DesktopEntry, TranslateFn, merge_desktop_entry};
use super::{Unit, build_global_component_id, metainfo};
use crate::downloader::Downloader;
use crate::hints::{Severity, tag_severity};
use crate::utils::{is_top_level_domain, path_basename};

/// Feature switches controlling a compose run.
#[derive(Clone, Debug)]
#[allow(clippy::struct_excessive_bools)]
pub struct ComposeFlags {
    /// Emit validation hints for structural metainfo problems.
    pub validate: bool,
    /// Process desktop-entry files (and synthesize components from
    /// unpaired ones).
    pub process_desktop: bool,
    /// Derive language completion from locale files.
    pub process_locale: bool,
    /// Keep font components.
    pub process_fonts: bool,
    /// Download and store screenshots in the media pool.
    pub store_screenshots: bool,
    /// Allow video screenshots.
    pub allow_screencasts: bool,
    /// Allow network access.
    pub allow_net: bool,
    /// Propagate whitelisted custom entries.
    pub propagate_custom: bool,
}

impl Default for ComposeFlags {
    fn default() -> Self {
        Self {
            validate: true,
            process_desktop: true,
            process_locale: true,
            process_fonts: true,
            store_screenshots: false,
            allow_screencasts: true,
            allow_net: false,
            propagate_custom: false,
        }
    }
}

/// Settings for a compose run.
#[derive(Clone, Debug)]
pub struct ComposeSettings {
    /// Feature switches.
    pub flags: ComposeFlags,
    /// Media pool directory components write their media into.
    pub media_result_dir: PathBuf,
    /// Custom keys that may propagate when custom propagation is on.
    pub allowed_custom_keys: HashSet<String>,
    /// Maximum screenshot size in bytes; `None` disables the limit.
    pub max_screenshot_bytes: Option<u64>,
}

/// A single diagnostic recorded during composition.
#[derive(Clone, Debug)]
pub struct ComposeHint {
    /// Registered hint tag.
    pub tag: String,
    /// Template variables captured with the hint.
    pub vars: HashMap<String, String>,
}

/// The outcome of composing one unit.
#[derive(Debug, Default)]
pub struct ComposeResult {
    /// Identifier of the processed container (package name).
    pub bundle_id: String,
    components: Vec<Component>,
    ignored_cids: HashSet<String>,
    gcids: HashMap<String, String>,
    hints: BTreeMap<String, Vec<ComposeHint>>,
}

impl ComposeResult {
    /// Create an empty result for a bundle.
    #[must_use]
    pub fn new(bundle_id: &str) -> Self {
        Self {
            bundle_id: bundle_id.to_string(),
            ..Self::default()
        }
    }

    /// What: Attach a hint to a component ID.
    ///
    /// Inputs:
    /// - `cid`: Component ID; an empty string lands on `"general"`
    /// - `tag`: Registered hint tag
    /// - `vars`: Template variables
    ///
    /// Output:
    /// - `true` when the component is still valid afterwards, `false`
    ///   when the hint's error severity invalidated it
    pub fn add_hint<I, K, V>(&mut self, cid: &str, tag: &str, vars: I) -> bool
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let cid = if cid.is_empty() { "general" } else { cid };
        let vars_map: HashMap<String, String> =
            vars.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        self.hints.entry(cid.to_string()).or_default().push(ComposeHint {
            tag: tag.to_string(),
            vars: vars_map,
        });

        if tag_severity(tag) == Severity::Error {
            if cid != "general" {
                self.ignored_cids.insert(cid.to_string());
            }
            false
        } else {
            true
        }
    }

    /// Add a component and mint its gcid from its serialized form.
    pub fn add_component(&mut self, cpt: Component) {
        let digest = cpt
            .to_catalog_xml()
            .unwrap_or_else(|_| format!("{}::{}", cpt.id, cpt.kind.as_str()));
        self.add_component_with_string(cpt, &digest);
    }

    /// Add a component, minting its gcid from an explicit digest string.
    pub fn add_component_with_string(&mut self, cpt: Component, digest: &str) {
        if let Some(gcid) = build_global_component_id(&cpt.id, digest) {
            self.gcids.insert(cpt.id.clone(), gcid);
        }
        self.components.push(cpt);
    }

    /// The gcid assigned to a component ID.
    #[must_use]
    pub fn gcid_for_cid(&self, cid: &str) -> Option<&str> {
        self.gcids.get(cid).map(String::as_str)
    }

    /// All gcids of currently valid components.
    #[must_use]
    pub fn component_gcids(&self) -> Vec<String> {
        self.components
            .iter()
            .filter(|c| !self.ignored_cids.contains(&c.id))
            .filter_map(|c| self.gcids.get(&c.id).cloned())
            .collect()
    }

    /// Whether a component has been invalidated by an error hint.
    #[must_use]
    pub fn is_ignored(&self, cid: &str) -> bool {
        self.ignored_cids.contains(cid)
    }

    /// Move all valid components out of the result for mutation; give them
    /// back with [`ComposeResult::set_components`].
    pub fn take_components(&mut self) -> Vec<Component> {
        let ignored = std::mem::take(&mut self.ignored_cids);
        let (dropped, kept): (Vec<Component>, Vec<Component>) = std::mem::take(&mut self.components)
            .into_iter()
            .partition(|c| ignored.contains(&c.id));
        self.components = dropped;
        self.ignored_cids = ignored;
        kept
    }

    /// Re-attach components taken with [`ComposeResult::take_components`].
    pub fn set_components(&mut self, cpts: Vec<Component>) {
        self.components.extend(cpts);
    }

    /// Snapshot of all valid components.
    #[must_use]
    pub fn components(&self) -> Vec<&Component> {
        self.components
            .iter()
            .filter(|c| !self.ignored_cids.contains(&c.id))
            .collect()
    }

    /// Drop a component entirely, forgetting its gcid.
    pub fn remove_component(&mut self, cid: &str) {
        self.components.retain(|c| c.id != cid);
        self.gcids.remove(cid);
    }

    /// Drop a component but keep its gcid registered, so the package still
    /// references the (already stored) metadata.
    pub fn remove_component_keep_gcid(&mut self, cid: &str) {
        self.components.retain(|c| c.id != cid);
    }

    /// Number of currently valid components.
    #[must_use]
    pub fn components_count(&self) -> usize {
        self.components()
            .len()
    }

    /// Total number of recorded hints.
    #[must_use]
    pub fn hints_count(&self) -> usize {
        self.hints.values().map(Vec::len).sum()
    }

    /// Whether a specific hint tag was recorded for a component ID.
    #[must_use]
    pub fn has_hint(&self, cid: &str, tag: &str) -> bool {
        self.hints
            .get(cid)
            .is_some_and(|hints| hints.iter().any(|h| h.tag == tag))
    }

    /// Iterate over `(component id, hints)` pairs.
    pub fn hint_entries(&self) -> impl Iterator<Item = (&str, &[ComposeHint])> {
        self.hints.iter().map(|(cid, hints)| (cid.as_str(), hints.as_slice()))
    }
}

const METAINFO_DIR: &str = "/usr/share/metainfo/";
const LEGACY_METAINFO_DIR: &str = "/usr/share/appdata/";
const APPLICATIONS_DIR: &str = "/usr/share/applications/";

fn is_metainfo_path(path: &str) -> bool {
    (path.starts_with(METAINFO_DIR) || path.starts_with(LEGACY_METAINFO_DIR))
        && (path.ends_with(".metainfo.xml") || path.ends_with(".appdata.xml") || path.ends_with(".xml"))
}

fn is_desktop_path(path: &str) -> bool {
    path.starts_with(APPLICATIONS_DIR) && path.ends_with(".desktop")
}

/// Derive a component ID from an unpaired desktop file name: reverse-DNS
/// names lose their `.desktop` suffix, plain names keep it.
fn cid_from_desktop_id(desktop_id: &str) -> String {
    let stem = desktop_id.strip_suffix(".desktop").unwrap_or(desktop_id);
    let parts: Vec<&str> = stem.split('.').collect();
    if parts.len() >= 3 && is_top_level_domain(parts[0]) {
        stem.to_string()
    } else {
        desktop_id.to_string()
    }
}

/// What: Run the compose pipeline over one unit.
///
/// Inputs:
/// - `unit`: The container to process
/// - `settings`: Feature switches and paths
/// - `translate`: External desktop-entry translation lookup, when the
///   package provides one
/// - `check_metadata_early`: Caller veto point, invoked after gcids are
///   assigned but before expensive media work
///
/// Output:
/// - A [`ComposeResult`] with components, gcids and hints
///
/// Details:
/// - Metainfo parse failures and structural problems become hints, never
///   run-level errors.
/// - Screenshots are only fetched for components surviving the early
///   check, and only when downloads are permitted.
pub fn process_unit(
    unit: &dyn Unit,
    settings: &ComposeSettings,
    translate: Option<&TranslateFn<'_>>,
    check_metadata_early: Option<&mut dyn FnMut(&mut ComposeResult)>,
) -> anyhow::Result<ComposeResult> {
    let bundle_id = unit.bundle_id();
    let mut result = ComposeResult::new(&bundle_id);
    let contents = unit.contents()?;

    // collect interesting files
    let metainfo_paths: Vec<&String> = contents.iter().filter(|p| is_metainfo_path(p)).collect();
    let mut desktop_entries: BTreeMap<String, DesktopEntry> = BTreeMap::new();
    if settings.flags.process_desktop {
        for path in contents.iter().filter(|p| is_desktop_path(p)) {
            let desktop_id = path_basename(path).to_string();
            match unit.read_data(path) {
                Ok(data) => match DesktopEntry::parse(&data) {
                    Ok(entry) => {
                        desktop_entries.insert(desktop_id, entry);
                    }
                    Err(e) => {
                        result.add_hint(
                            "",
                            "desktop-file-error",
                            [("fname", path.as_str()), ("error", &e.to_string())],
                        );
                    }
                },
                Err(e) => {
                    result.add_hint(
                        "",
                        "pkg-extract-error",
                        [
                            ("fname", path.as_str()),
                            ("pkg_fname", bundle_id.as_str()),
                            ("error", &e.to_string()),
                        ],
                    );
                }
            }
        }
    }

    // parse metainfo files; the raw source data doubles as the gcid
    // digest, so identical upstream metadata maps to the same global ID
    // regardless of which package ships it
    let mut components: Vec<(Component, String)> = Vec::new();
    for path in metainfo_paths {
        let data = match unit.read_data(path) {
            Ok(d) => d,
            Err(e) => {
                result.add_hint(
                    "",
                    "pkg-extract-error",
                    [
                        ("fname", path.as_str()),
                        ("pkg_fname", bundle_id.as_str()),
                        ("error", &e.to_string()),
                    ],
                );
                continue;
            }
        };
        if data.is_empty() {
            result.add_hint(
                "",
                "pkg-empty-file",
                [("fname", path.as_str()), ("pkg_fname", bundle_id.as_str())],
            );
            continue;
        }

        let mut cpt = match metainfo::parse_metainfo(&data) {
            Ok(c) => c,
            Err(e) => {
                result.add_hint(
                    "",
                    "metainfo-parse-error",
                    [("fname", path.as_str()), ("error", &e.to_string())],
                );
                continue;
            }
        };
        if cpt.id.is_empty() {
            result.add_hint("", "metainfo-no-id", [("fname", path.as_str())]);
            continue;
        }
        if path.starts_with(LEGACY_METAINFO_DIR) {
            result.add_hint(&cpt.id.clone(), "legacy-metainfo-directory", [("fname", path.as_str())]);
        }
        cpt.source_file = Some(path.clone());
        if cpt.pkgnames.is_empty() {
            cpt.pkgnames.push(bundle_id.clone());
        }
        let digest = String::from_utf8_lossy(&data).into_owned();
        components.push((cpt, digest));
    }

    // pair desktop entries with their components
    let mut consumed_desktop_ids: HashSet<String> = HashSet::new();
    for (cpt, _) in &mut components {
        let candidates: Vec<String> = match cpt.launchables.get("desktop-id") {
            Some(ids) if !ids.is_empty() => ids.clone(),
            _ => vec![cpt.id.clone(), format!("{}.desktop", cpt.id)],
        };
        for candidate in candidates {
            if let Some(entry) = desktop_entries.get(&candidate) {
                if entry.get_bool("Hidden") {
                    result.add_hint(
                        &cpt.id.clone(),
                        "desktop-entry-hidden-set",
                        [("fname", candidate.as_str())],
                    );
                }
                merge_desktop_entry(entry, &candidate, cpt, translate);
                consumed_desktop_ids.insert(candidate);
                break;
            }
        }
    }

    // synthesize components for unpaired desktop entries
    if settings.flags.process_desktop {
        for (desktop_id, entry) in &desktop_entries {
            if consumed_desktop_ids.contains(desktop_id) || !entry.is_displayed_application() {
                continue;
            }
            let cid = cid_from_desktop_id(desktop_id);
            let mut cpt = Component::new(&cid, ComponentKind::DesktopApplication);
            cpt.pkgnames.push(bundle_id.clone());
            let source_path = format!("{APPLICATIONS_DIR}{desktop_id}");
            cpt.source_file = Some(source_path.clone());
            merge_desktop_entry(entry, desktop_id, &mut cpt, translate);
            result.add_hint(&cid, "no-metainfo", std::iter::empty::<(String, String)>());
            let digest = unit
                .read_data(&source_path)
                .map(|d| String::from_utf8_lossy(&d).into_owned())
                .unwrap_or_else(|_| desktop_id.clone());
            components.push((cpt, digest));
        }
    }

    // fonts are only carried when font processing is enabled
    if !settings.flags.process_fonts {
        components.retain(|(c, _)| c.kind != ComponentKind::Font);
    }

    // language completion from locale files
    if settings.flags.process_locale {
        let locale_paths: Vec<String> = contents
            .iter()
            .filter(|p| p.ends_with(".mo") || p.ends_with(".qm"))
            .cloned()
            .collect();
        if !locale_paths.is_empty() {
            for (cpt, _) in &mut components {
                let mut domains: Vec<String> = Vec::new();
                let stem = cpt.id.strip_suffix(".desktop").unwrap_or(&cpt.id);
                domains.push(stem.to_string());
                if let Some(short) = stem.rsplit('.').next() {
                    domains.push(short.to_lowercase());
                }
                if let Some(binaries) = cpt.provides.get("binaries") {
                    domains.extend(binaries.iter().cloned());
                }
                let langs = super::language_completion_from_paths(&locale_paths, &domains);
                for (locale, percentage) in langs {
                    cpt.languages.insert(locale, percentage);
                }
            }
        }
    }

    // custom key filtering
    for (cpt, _) in &mut components {
        if settings.flags.propagate_custom {
            cpt.custom
                .retain(|key, _| settings.allowed_custom_keys.contains(key));
        } else {
            cpt.custom.clear();
        }
    }

    // register components, minting gcids from the source data
    for (cpt, digest) in components {
        result.add_component_with_string(cpt, &digest);
    }

    // let the caller drop components whose metadata is already known
    if let Some(callback) = check_metadata_early {
        callback(&mut result);
    }

    // fetch screenshot media for the remaining components
    process_screenshots(&mut result, settings);

    Ok(result)
}

/// Final validation pass, run by the extractor after icon handling and
/// description injection.
pub fn finalize_result(result: &mut ComposeResult) {
    let cpts = result.take_components();
    let mut kept = Vec::with_capacity(cpts.len());
    for cpt in cpts {
        let cid = cpt.id.clone();
        if cpt.merge_kind == MergeKind::None {
            if cpt.kind == ComponentKind::Unknown {
                result.add_hint(&cid, "metainfo-unknown-type", [("kind", "unknown")]);
                continue;
            }
            if cpt.name().is_none_or(str::is_empty) {
                result.add_hint(&cid, "metainfo-no-name", std::iter::empty::<(String, String)>());
                continue;
            }
            if cpt.summary().is_none_or(str::is_empty) {
                result.add_hint(&cid, "metainfo-no-summary", std::iter::empty::<(String, String)>());
                continue;
            }
            if cpt.kind == ComponentKind::DesktopApplication && cpt.icons.is_empty() {
                result.add_hint(&cid, "gui-app-without-icon", [("cid", cid.as_str())]);
                continue;
            }
        }
        kept.push(cpt);
    }
    result.set_components(kept);
}

fn process_screenshots(result: &mut ComposeResult, settings: &ComposeSettings) {
    if !settings.flags.store_screenshots {
        return;
    }

    let mut cpts = result.take_components();
    for cpt in &mut cpts {
        let Some(gcid) = result.gcid_for_cid(&cpt.id).map(str::to_string) else {
            continue;
        };

        let mut kept: Vec<super::Screenshot> = Vec::new();
        let mut index = 0usize;
        for mut scr in std::mem::take(&mut cpt.screenshots) {
            if !settings.flags.allow_screencasts {
                scr.videos.clear();
            }

            let mut images = Vec::new();
            for img in std::mem::take(&mut scr.images) {
                if img.kind != "source" {
                    // thumbnails are regenerated by clients, drop them
                    continue;
                }
                index += 1;
                match store_screenshot_image(&img.url, &gcid, index, settings, result, &cpt.id) {
                    Some(rel_path) => {
                        images.push(super::ScrImage {
                            kind: "source".to_string(),
                            url: rel_path,
                            width: img.width,
                            height: img.height,
                        });
                    }
                    None => {
                        // keep the upstream URL when we could not store it
                        images.push(img);
                    }
                }
            }
            scr.images = images;

            if !scr.images.is_empty() || !scr.videos.is_empty() {
                kept.push(scr);
            }
        }
        cpt.screenshots = kept;
    }
    result.set_components(cpts);
}

/// Download one screenshot source image into the media pool. Returns the
/// pool-relative path on success.
fn store_screenshot_image(
    url: &str,
    gcid: &str,
    index: usize,
    settings: &ComposeSettings,
    result: &mut ComposeResult,
    cid: &str,
) -> Option<String> {
    if !settings.flags.allow_net || !crate::utils::is_remote(url) {
        return None;
    }

    let ext = match url.rsplit('.').next() {
        Some(e) if e.len() <= 4 && e.chars().all(char::is_alphanumeric) => e.to_lowercase(),
        _ => "png".to_string(),
    };
    let fname = format!("image-{index}.{ext}");
    let rel_path = format!("{gcid}/screenshots/{fname}");
    let dest_dir = settings.media_result_dir.join(gcid).join("screenshots");
    let dest = dest_dir.join(&fname);

    if dest.exists() {
        return Some(rel_path);
    }

    let dl = match Downloader::acquire() {
        Ok(dl) => dl,
        Err(e) => {
            warn!(error = %e, "unable to set up downloader for screenshots");
            return None;
        }
    };
    let data = match dl.download_bytes(url, 2) {
        Ok(d) => d,
        Err(e) => {
            result.add_hint(
                cid,
                "screenshot-download-error",
                [("url", url), ("error", &e.to_string())],
            );
            return None;
        }
    };

    if let Some(max) = settings.max_screenshot_bytes
        && data.len() as u64 > max
    {
        result.add_hint(
            cid,
            "screenshot-save-error",
            [
                ("url", url),
                ("error", &format!("file exceeds the size limit of {max} bytes")),
            ],
        );
        return None;
    }

    if let Err(e) = fs::create_dir_all(&dest_dir).and_then(|()| fs::write(&dest, &data)) {
        result.add_hint(
            cid,
            "screenshot-save-error",
            [("url", url), ("error", &e.to_string())],
        );
        return None;
    }

    debug!(url, dest = %dest.display(), "stored screenshot");
    Some(rel_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MapUnit {
        id: String,
        files: HashMap<String, Vec<u8>>,
    }

    impl Unit for MapUnit {
        fn bundle_id(&self) -> String {
            self.id.clone()
        }
        fn contents(&self) -> anyhow::Result<Vec<String>> {
            Ok(self.files.keys().cloned().collect())
        }
        fn read_data(&self, path: &str) -> anyhow::Result<Vec<u8>> {
            self.files
                .get(path)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("no such file: {path}"))
        }
    }

    fn settings() -> ComposeSettings {
        ComposeSettings {
            flags: ComposeFlags::default(),
            media_result_dir: std::env::temp_dir(),
            allowed_custom_keys: HashSet::new(),
            max_screenshot_bytes: None,
        }
    }

    const METAINFO: &str = r#"<component type="desktop-application">
  <id>org.example.App</id>
  <name>App</name>
  <summary>An app</summary>
  <icon type="stock">app-icon</icon>
  <launchable type="desktop-id">org.example.App.desktop</launchable>
</component>"#;

    const DESKTOP: &str = "[Desktop Entry]\nType=Application\nName=App\nComment=An app\nIcon=app-icon\nCategories=Utility;\n";

    #[test]
    fn metainfo_and_desktop_are_paired() {
        let mut files = HashMap::new();
        files.insert(
            "/usr/share/metainfo/org.example.App.metainfo.xml".to_string(),
            METAINFO.as_bytes().to_vec(),
        );
        files.insert(
            "/usr/share/applications/org.example.App.desktop".to_string(),
            DESKTOP.as_bytes().to_vec(),
        );
        let unit = MapUnit {
            id: "app".to_string(),
            files,
        };

        let result = process_unit(&unit, &settings(), None, None).expect("compose");
        assert_eq!(result.components_count(), 1);
        // paired: no no-metainfo hint
        assert!(!result.has_hint("org.example.App", "no-metainfo"));
        let gcid = result.gcid_for_cid("org.example.App").expect("gcid");
        assert!(gcid.starts_with("org/example/App/"));
    }

    #[test]
    fn unpaired_desktop_file_gets_no_metainfo_hint() {
        let mut files = HashMap::new();
        files.insert(
            "/usr/share/applications/legacytool.desktop".to_string(),
            DESKTOP.as_bytes().to_vec(),
        );
        let unit = MapUnit {
            id: "legacytool".to_string(),
            files,
        };

        let result = process_unit(&unit, &settings(), None, None).expect("compose");
        assert_eq!(result.components_count(), 1);
        assert!(result.has_hint("legacytool.desktop", "no-metainfo"));
        // package name got associated
        let cpts = result.components();
        assert_eq!(cpts[0].pkgnames, vec!["legacytool".to_string()]);
    }

    #[test]
    fn broken_metainfo_becomes_hint_not_error() {
        let mut files = HashMap::new();
        files.insert(
            "/usr/share/metainfo/broken.xml".to_string(),
            b"<component type=\"desktop-application\"><id>x</id>".to_vec(),
        );
        let unit = MapUnit {
            id: "broken".to_string(),
            files,
        };

        let result = process_unit(&unit, &settings(), None, None).expect("compose");
        assert_eq!(result.components_count(), 0);
        assert!(result.has_hint("general", "metainfo-parse-error"));
    }

    #[test]
    fn early_check_can_drop_components_keeping_gcids() {
        let mut files = HashMap::new();
        files.insert(
            "/usr/share/metainfo/org.example.App.metainfo.xml".to_string(),
            METAINFO.as_bytes().to_vec(),
        );
        let unit = MapUnit {
            id: "app".to_string(),
            files,
        };

        let mut callback = |res: &mut ComposeResult| {
            res.remove_component_keep_gcid("org.example.App");
        };
        let result =
            process_unit(&unit, &settings(), None, Some(&mut callback)).expect("compose");
        assert_eq!(result.components_count(), 0);
        assert!(result.gcid_for_cid("org.example.App").is_some());
    }

    #[test]
    fn error_hint_invalidates_component() {
        let mut result = ComposeResult::new("pkg");
        result.add_component(Component::new("org.example.X", ComponentKind::Generic));
        assert!(result.add_hint("org.example.X", "icon-scaled-up", [("icon_name", "x")]));
        assert!(!result.is_ignored("org.example.X"));
        assert!(!result.add_hint("org.example.X", "icon-not-found", [("icon_fname", "x")]));
        assert!(result.is_ignored("org.example.X"));
        assert_eq!(result.components_count(), 0);
    }

    #[test]
    fn finalize_flags_missing_name_and_summary() {
        let mut result = ComposeResult::new("pkg");
        let mut cpt = Component::new("org.example.NoName", ComponentKind::Generic);
        cpt.summaries.insert("C".to_string(), "has summary".to_string());
        result.add_component(cpt);
        finalize_result(&mut result);
        assert_eq!(result.components_count(), 0);
        assert!(result.has_hint("org.example.NoName", "metainfo-no-name"));
    }
}
