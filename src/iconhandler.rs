//! Icon resolution, scaling and media-pool storage.
//!
//! For every component icon name the handler searches XDG icon themes (and
//! the legacy icons/pixmaps roots), picks suitable source files per enabled
//! size, rescales them to PNG and writes them into the component's media
//! directory. Theme data and the global icon-file index are built once per
//! section from the contents store.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, Weak};

use anyhow::{Context, Result, bail};
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::backends::{Package, PackageKind, PackageRef};
use crate::compose::{Component, ComponentKind, Icon};
use crate::config::{Config, IconPolicy, IconState};
use crate::contentsstore::ContentsStore;
use crate::imaging::{IconFormat, RasterImage, render_svg_to_png};
use crate::result::GeneratorResult;
use crate::utils::{ImageSize, path_basename};

/// All image extensions recognized as possible icon sources, most
/// favorable first.
const POSSIBLE_ICON_EXTS: &[&str] = &[
    ".png", ".svgz", ".svg", ".jxl", ".jpg", ".jpeg", ".gif", ".ico", ".xpm",
];

/// The extensions actually allowed to be stored for software.
const ALLOWED_ICON_EXTS: &[&str] = &[".png", ".jxl", ".svgz", ".svg", ".xpm"];

/// Bundled hicolor theme definition, used when no package ships one.
const VENDORED_HICOLOR_INDEX: &[u8] = include_bytes!("../data/hicolor-theme-index.theme");

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ThemeDirType {
    Fixed,
    Scalable,
    Threshold,
}

#[derive(Clone, Debug)]
struct ThemeDir {
    path: String,
    dtype: ThemeDirType,
    size: u32,
    min_size: u32,
    max_size: u32,
    threshold: u32,
    scale: u32,
}

/// A parsed XDG icon theme (`index.theme`).
pub struct Theme {
    name: String,
    prefix: String,
    directories: Vec<ThemeDir>,
}

impl Theme {
    /// What: Parse a theme from its `index.theme` data.
    ///
    /// Inputs:
    /// - `name`: Theme name (directory below `icons/`)
    /// - `index_data`: Raw `index.theme` bytes
    /// - `prefix`: Filesystem prefix, `/usr` when empty
    ///
    /// Details:
    /// - `symbolic/` sections are ignored, directories without a `Size`
    ///   or `Context` key are skipped, and the directory list is sorted
    ///   ascending by size.
    pub fn new(name: &str, index_data: &[u8], prefix: &str) -> Result<Self> {
        let text = String::from_utf8_lossy(index_data);
        let prefix = if prefix.is_empty() { "/usr" } else { prefix };

        let mut directories = Vec::new();
        let mut section: Option<String> = None;
        let mut fields: HashMap<String, String> = HashMap::new();

        let mut flush =
            |section: &Option<String>, fields: &mut HashMap<String, String>, dirs: &mut Vec<ThemeDir>| {
                let Some(sec) = section else { return };
                if sec == "Icon Theme" || sec.starts_with("symbolic/") {
                    fields.clear();
                    return;
                }
                let Some(size) = fields.get("Size").and_then(|v| v.parse::<u32>().ok()) else {
                    fields.clear();
                    return;
                };
                if size == 0 || !fields.contains_key("Context") {
                    fields.clear();
                    return;
                }
                let dtype = match fields.get("Type").map(String::as_str) {
                    Some("Fixed") => ThemeDirType::Fixed,
                    Some("Scalable") => ThemeDirType::Scalable,
                    _ => ThemeDirType::Threshold,
                };
                let get_u32 = |key: &str, default: u32| {
                    fields.get(key).and_then(|v| v.parse().ok()).unwrap_or(default)
                };
                dirs.push(ThemeDir {
                    path: sec.clone(),
                    dtype,
                    size,
                    min_size: get_u32("MinSize", size),
                    max_size: get_u32("MaxSize", size),
                    threshold: get_u32("Threshold", 2),
                    scale: get_u32("Scale", 1),
                });
                fields.clear();
            };

        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if line.starts_with('[') && line.ends_with(']') {
                flush(&section, &mut fields, &mut directories);
                section = Some(line[1..line.len() - 1].to_string());
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                fields.insert(key.trim().to_string(), value.trim().to_string());
            }
        }
        flush(&section, &mut fields, &mut directories);

        if directories.is_empty() {
            bail!("theme index for '{name}' contains no usable directories");
        }
        directories.sort_by_key(|d| d.size);

        Ok(Self {
            name: name.to_string(),
            prefix: prefix.to_string(),
            directories,
        })
    }

    /// Parse a theme from the `index.theme` inside a package.
    pub fn from_package(name: &str, pkg: &dyn Package, prefix: &str) -> Result<Self> {
        let index_path = if prefix.is_empty() {
            format!("/usr/share/icons/{name}/index.theme")
        } else {
            format!("{prefix}/share/icons/{name}/index.theme")
        };
        let data = pkg
            .file_data(&index_path)
            .with_context(|| format!("unable to read theme index {index_path}"))?;
        Self::new(name, &data, prefix)
    }

    /// The theme name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    fn directory_matches_size(
        dir: &ThemeDir,
        size: ImageSize,
        assume_threshold_scalable: bool,
    ) -> bool {
        if dir.scale != size.scale {
            return false;
        }

        let size_int = size.to_int() / size.scale.max(1);
        match dir.dtype {
            ThemeDirType::Fixed => dir.size == size_int,
            ThemeDirType::Scalable => dir.min_size <= size_int && size_int <= dir.max_size,
            ThemeDirType::Threshold => {
                if assume_threshold_scalable {
                    // treat as downscalable from larger theme entries; can
                    // mis-scale, but recovers far more icons
                    dir.size >= size_int
                } else {
                    dir.size.saturating_sub(dir.threshold) <= size_int
                        && size_int <= dir.size + dir.threshold
                }
            }
        }
    }

    /// All candidate file names for an icon at a size, in match order.
    #[must_use]
    pub fn matching_icon_filenames(
        &self,
        icon_name: &str,
        size: ImageSize,
        relaxed_scaling_rules: bool,
    ) -> Vec<String> {
        const EXTENSIONS: &[&str] = &["png", "svgz", "svg", "xpm"];

        let mut result = Vec::new();
        for dir in &self.directories {
            if Self::directory_matches_size(dir, size, relaxed_scaling_rules) {
                for ext in EXTENSIONS {
                    result.push(format!(
                        "{}/share/icons/{}/{}/{}.{}",
                        self.prefix, self.name, dir.path, icon_name, ext
                    ));
                }
            }
        }
        result
    }
}

/// The source location of a found icon.
#[derive(Clone)]
struct IconFindResult {
    pkg: PackageRef,
    fname: String,
}

/// Resolves, scales and stores component icons.
pub struct IconHandler {
    media_export_path: PathBuf,
    themes: Vec<Theme>,
    icon_files: HashMap<String, Weak<dyn Package>>,
    icon_policy: IconPolicy,
    enabled_sizes: Vec<ImageSize>,
    default_size: ImageSize,
    default_state: IconState,
    allow_icon_upscaling: bool,
    allow_remote_icons: bool,
    extra_prefix: Option<String>,
    optipng: Option<PathBuf>,
    store_lock: Mutex<()>,
}

impl IconHandler {
    /// What: Build the icon handler for one section.
    ///
    /// Inputs:
    /// - `ccache`: Contents store with the icon-file index
    /// - `media_path`: Media pool root (`…/pool`)
    /// - `pkg_map`: Candidate packages of the section, `pkid → package`
    /// - `icon_theme`: Extra theme name from the suite configuration
    /// - `extra_prefix`: Alternate install prefix some backends use
    /// - `conf`: Configuration (icon policy, features)
    ///
    /// Details:
    /// - Theme indexes and the global icon-file map are built in parallel
    ///   from the contents store.
    /// - A bundled hicolor definition is used when no package provides the
    ///   hicolor theme.
    /// - The handler holds weak package references; the backend owns the
    ///   packages.
    pub fn new(
        ccache: &ContentsStore,
        media_path: &Path,
        pkg_map: &HashMap<String, PackageRef>,
        icon_theme: Option<&str>,
        extra_prefix: Option<&str>,
        conf: &Config,
    ) -> Result<Self> {
        debug!("creating new icon handler");

        let default_size = ImageSize::square(64);
        let default_state = conf.icon_policy.state_for(default_size);
        if matches!(default_state, IconState::Ignored | IconState::RemoteOnly) {
            bail!(
                "the default icon size 64x64 is set to ignore or remote-only; this is a bug in the generator or configuration"
            );
        }

        let enabled_sizes: Vec<ImageSize> = conf
            .icon_policy
            .iter()
            .filter(|(_, state)| *state != IconState::Ignored)
            .map(|(size, _)| size)
            .collect();

        // prioritized theme names: hicolor first (apps install their
        // upstream icon there), then the configured theme, then the themes
        // needed to resolve stock icons of the big desktops
        let mut theme_names = vec!["hicolor".to_string()];
        if let Some(theme) = icon_theme {
            theme_names.push(theme.to_string());
        }
        theme_names.extend(
            ["Adwaita", "AdwaitaLegacy", "breeze"]
                .iter()
                .map(|s| (*s).to_string()),
        );

        let extra_prefix = extra_prefix
            .map(|p| p.trim_end_matches('/').to_string())
            .filter(|p| !p.is_empty() && p != "/usr");
        let extra_icons_path = extra_prefix.as_ref().map(|p| format!("{p}/share/icons/"));
        let extra_pixmap_path = extra_prefix.as_ref().map(|p| format!("{p}/share/pixmaps/"));

        let pkg_keys: Vec<String> = pkg_map.keys().cloned().collect();
        let files_pkids = ccache.get_icon_files_map(&pkg_keys)?;

        // build the theme set and the global icon-file index in parallel
        let themes_mutex: Mutex<HashMap<String, Theme>> = Mutex::new(HashMap::new());
        let icon_files_mutex: Mutex<HashMap<String, Weak<dyn Package>>> =
            Mutex::new(HashMap::new());

        files_pkids.par_iter().for_each(|(fname, pkgid)| {
            let Some(pkg) = pkg_map.get(pkgid) else { return };

            let in_pixmaps = fname.starts_with("/usr/share/pixmaps/")
                || extra_pixmap_path
                    .as_ref()
                    .is_some_and(|p| fname.starts_with(p.as_str()));
            if in_pixmaps {
                if let Ok(mut files) = icon_files_mutex.lock() {
                    files.insert(fname.clone(), std::sync::Arc::downgrade(pkg));
                }
                return;
            }

            let in_icons = fname.starts_with("/usr/share/icons/")
                || extra_icons_path
                    .as_ref()
                    .is_some_and(|p| fname.starts_with(p.as_str()));
            if !in_icons {
                return;
            }

            for name in &theme_names {
                if fname == &format!("/usr/share/icons/{name}/index.theme") {
                    match Theme::from_package(name, pkg.as_ref(), "") {
                        Ok(theme) => {
                            if let Ok(mut themes) = themes_mutex.lock() {
                                themes.insert(name.clone(), theme);
                            }
                        }
                        Err(e) => warn!(theme = %name, error = %e, "unable to parse icon theme"),
                    }
                } else if fname.starts_with(&format!("/usr/share/icons/{name}")) {
                    if let Ok(mut files) = icon_files_mutex.lock() {
                        files.insert(fname.clone(), std::sync::Arc::downgrade(pkg));
                    }
                } else if let Some(extra_icons) = &extra_icons_path {
                    if fname == &format!("{extra_icons}{name}/index.theme") {
                        if let Some(prefix) = &extra_prefix {
                            match Theme::from_package(name, pkg.as_ref(), prefix) {
                                Ok(theme) => {
                                    if let Ok(mut themes) = themes_mutex.lock() {
                                        themes.insert(name.clone(), theme);
                                    }
                                }
                                Err(e) => {
                                    warn!(theme = %name, error = %e, "unable to parse icon theme");
                                }
                            }
                        }
                    } else if fname.starts_with(&format!("{extra_icons}{name}")) {
                        if let Ok(mut files) = icon_files_mutex.lock() {
                            files.insert(fname.clone(), std::sync::Arc::downgrade(pkg));
                        }
                    }
                }
            }
        });

        let mut tmp_themes = themes_mutex
            .into_inner()
            .map_err(|_| anyhow::anyhow!("theme build lock poisoned"))?;
        let icon_files = icon_files_mutex
            .into_inner()
            .map_err(|_| anyhow::anyhow!("icon index lock poisoned"))?;

        // partial repositories may lack the hicolor theme package; inject
        // the bundled definition so icon processing still works
        if !tmp_themes.contains_key("hicolor") {
            info!("no packaged hicolor icon theme found, using built-in one");
            match Theme::new("hicolor", VENDORED_HICOLOR_INDEX, "") {
                Ok(theme) => {
                    tmp_themes.insert("hicolor".to_string(), theme);
                }
                Err(e) => warn!(error = %e, "bundled hicolor theme index is unusable"),
            }
        }

        // keep the configured priority order
        let mut themes = Vec::new();
        for name in &theme_names {
            if let Some(theme) = tmp_themes.remove(name) {
                themes.push(theme);
            }
        }

        debug!(themes = themes.len(), icon_files = icon_files.len(), "created icon handler");
        Ok(Self {
            media_export_path: media_path.to_path_buf(),
            themes,
            icon_files,
            icon_policy: conf.icon_policy.clone(),
            enabled_sizes,
            default_size,
            default_state,
            allow_icon_upscaling: conf.feature.allow_icon_upscale,
            // remote icons only make sense when the media pool is published
            allow_remote_icons: conf.feature.store_screenshots && !conf.media_base_url.is_empty(),
            extra_prefix,
            optipng: conf.feature.optipng.then(|| conf.optipng_binary.clone()).flatten(),
            store_lock: Mutex::new(()),
        })
    }

    /// Whether an icon file name has an allowed storage format.
    #[must_use]
    pub fn icon_allowed(icon_fname: &str) -> bool {
        let lower = icon_fname.to_lowercase();
        ALLOWED_ICON_EXTS.iter().any(|ext| lower.ends_with(ext))
    }

    fn strip_icon_ext(icon_name: &str) -> &str {
        for ext in [".png", ".svgz", ".svg", ".xpm"] {
            if let Some(stripped) = icon_name.strip_suffix(ext) {
                return stripped;
            }
        }
        icon_name
    }

    /// Take the raw icon reference off a component and clear its icon list.
    fn icon_name_and_clear(cpt: &mut Component) -> String {
        let name = match cpt.raw_icon() {
            Some(Icon::Stock { name }) => name.clone(),
            Some(Icon::Local { path }) => path.clone(),
            _ => String::new(),
        };
        cpt.icons.clear();
        name
    }

    /// All candidate paths for an icon name at one size, themes first,
    /// compat directories last (64x64 only).
    fn possible_icon_filenames(
        &self,
        icon_name: &str,
        size: ImageSize,
        relaxed_scaling_rules: bool,
    ) -> Vec<String> {
        let mut candidates = Vec::new();
        for theme in &self.themes {
            candidates.extend(theme.matching_icon_filenames(icon_name, size, relaxed_scaling_rules));
        }

        if size.scale == 1 && size.width == 64 {
            // icon/pixmap root directories are legacy locations; they only
            // ever satisfy the mandatory 64x64 size to avoid blurry
            // upscales to HiDPI sizes
            for ext in POSSIBLE_ICON_EXTS {
                candidates.push(format!("/usr/share/icons/{icon_name}{ext}"));
            }
            for ext in POSSIBLE_ICON_EXTS {
                candidates.push(format!("/usr/share/pixmaps/{icon_name}{ext}"));
            }
            if let Some(prefix) = &self.extra_prefix {
                for ext in POSSIBLE_ICON_EXTS {
                    candidates.push(format!("{prefix}/share/icons/{icon_name}{ext}"));
                }
                for ext in POSSIBLE_ICON_EXTS {
                    candidates.push(format!("{prefix}/share/pixmaps/{icon_name}{ext}"));
                }
            }
        }
        candidates
    }

    /// Locate icon sources for all requested sizes, searching either one
    /// package or the global icon-file index.
    fn find_icons(
        &self,
        icon_name: &str,
        sizes: &[ImageSize],
        pkg: Option<&PackageRef>,
    ) -> HashMap<ImageSize, IconFindResult> {
        let mut size_map = HashMap::new();

        let pkg_contents: Option<HashSet<String>> = pkg.and_then(|p| match p.contents() {
            Ok(contents) => Some(contents.into_iter().collect()),
            Err(e) => {
                warn!(pkg = %p.id(), error = %e, "unable to read package contents");
                None
            }
        });

        for &size in sizes {
            for fname in self.possible_icon_filenames(icon_name, size, true) {
                if let Some(pkg) = pkg {
                    let Some(contents) = &pkg_contents else { break };
                    if contents.contains(&fname) {
                        size_map.insert(
                            size,
                            IconFindResult {
                                pkg: PackageRef::clone(pkg),
                                fname,
                            },
                        );
                        break;
                    }
                } else if let Some(weak) = self.icon_files.get(&fname) {
                    if let Some(pkg) = weak.upgrade() {
                        size_map.insert(size, IconFindResult { pkg, fname });
                        break;
                    }
                }
            }
        }

        size_map
    }

    /// Find an icon that can be scaled down (or, for the default size,
    /// cautiously up) to the wanted size.
    fn find_icon_scalable_to_size(
        &self,
        possible_icons: &HashMap<ImageSize, IconFindResult>,
        size: ImageSize,
    ) -> Option<IconFindResult> {
        // never scale anything to below the default size; clients can do
        // that themselves without us wasting pool space
        if size.scale == 1 && size.width < 64 {
            return None;
        }

        let mut sorted: Vec<(&ImageSize, &IconFindResult)> = possible_icons.iter().collect();
        sorted.sort_by_key(|(s, _)| s.to_int());

        for (asize, info) in &sorted {
            if asize.scale != size.scale {
                continue;
            }
            if asize.to_int() < size.to_int() {
                continue;
            }
            return Some((*info).clone());
        }

        if self.allow_icon_upscaling && size == self.default_size {
            for (asize, info) in &sorted {
                if asize.width < 48 || asize.scale != size.scale {
                    continue;
                }
                return Some((*info).clone());
            }
        }

        None
    }

    /// What: Store one icon file at one target size.
    ///
    /// Inputs:
    /// - `gres`/`cpt`: Result and component receiving references and hints
    /// - `cpt_export_path`: `<pool>/<gcid>` directory of the component
    /// - `source_pkg`: Package holding the icon file
    /// - `icon_path`: Source path inside the package
    /// - `size`: Target size
    /// - `target_state`: Whether cached and/or remote references are wanted
    ///
    /// Output:
    /// - `true` when references were added (including the already-stored
    ///   fast path), `false` when the icon was rejected
    #[allow(clippy::too_many_arguments)]
    fn store_icon(
        &self,
        gres: &mut GeneratorResult,
        cpt: &mut Component,
        cpt_export_path: &Path,
        source_pkg: &PackageRef,
        icon_path: &str,
        size: ImageSize,
        target_state: IconState,
    ) -> bool {
        let iformat = IconFormat::from_filename(icon_path);
        if iformat == IconFormat::Unknown {
            gres.add_hint(
                &cpt.id,
                "icon-format-unsupported",
                [("icon_fname", path_basename(icon_path))],
            );
            return false;
        }

        let size_dir = cpt_export_path.join("icons").join(size.to_string());
        let source_base = path_basename(icon_path);
        let mut icon_name = if gres.package().kind() == PackageKind::Fake {
            source_base.to_string()
        } else {
            format!("{}_{}", gres.package().name(), source_base)
        };
        // the stored file is always PNG output of the rasterizer
        if !icon_name.to_lowercase().ends_with(".png") {
            icon_name = format!("{}.png", Self::strip_icon_ext(&icon_name));
        }

        let icon_store_location = size_dir.join(&icon_name);
        if icon_store_location.exists() {
            // extracted by an earlier run or another component; just add
            // the references
            self.add_icon_refs(gres, cpt, size, &icon_name, target_state);
            return true;
        }

        // the file may live in another package than the component (icon
        // themes and -data packages), so read from the package we found
        let icon_data = match source_pkg.file_data(icon_path) {
            Ok(data) => data,
            Err(e) => {
                gres.add_hint(
                    &cpt.id,
                    "pkg-extract-error",
                    [
                        ("fname", path_basename(icon_path)),
                        ("pkg_fname", path_basename(&source_pkg.filename())),
                        ("error", &e.to_string()),
                    ],
                );
                return false;
            }
        };
        if icon_data.is_empty() {
            gres.add_hint(
                &cpt.id,
                "pkg-empty-file",
                [
                    ("fname", path_basename(icon_path)),
                    ("pkg_fname", path_basename(&source_pkg.filename())),
                ],
            );
            return false;
        }

        let scaled_width = size.width * size.scale;
        let scaled_height = size.height * size.scale;

        let _guard = self.store_lock.lock();

        if iformat.is_vector() {
            if let Err(e) = fs::create_dir_all(&size_dir) {
                gres.add_hint_msg(&cpt.id, "image-write-error", &e.to_string());
                return false;
            }
            let svg_data = if iformat == IconFormat::Svgz {
                match crate::zarchive::decompress_data(&icon_data) {
                    Ok(d) => d,
                    Err(e) => {
                        gres.add_hint(
                            &cpt.id,
                            "image-write-error",
                            [
                                ("fname", path_basename(icon_path)),
                                ("pkg_fname", path_basename(&source_pkg.filename())),
                                ("error", &e.to_string()),
                            ],
                        );
                        return false;
                    }
                }
            } else {
                icon_data
            };
            if let Err(e) = render_svg_to_png(
                &svg_data,
                scaled_width,
                scaled_height,
                &icon_store_location,
                self.optipng.as_deref(),
            ) {
                gres.add_hint(
                    &cpt.id,
                    "image-write-error",
                    [
                        ("fname", path_basename(icon_path)),
                        ("pkg_fname", path_basename(&source_pkg.filename())),
                        ("error", &e.to_string()),
                    ],
                );
                return false;
            }
        } else {
            let mut img = match RasterImage::load(&icon_data, iformat) {
                Ok(img) => img,
                Err(e) => {
                    gres.add_hint(
                        &cpt.id,
                        "image-write-error",
                        [
                            ("fname", path_basename(icon_path)),
                            ("pkg_fname", path_basename(&source_pkg.filename())),
                            ("error", &e.to_string()),
                        ],
                    );
                    return false;
                }
            };

            if iformat == IconFormat::Xpm {
                // XPM sources are only acceptable when large enough
                if self.allow_icon_upscaling {
                    if size != self.default_size || img.width() < 48 || img.height() < 48 {
                        return false;
                    }
                } else if img.width() < scaled_width || img.height() < scaled_height {
                    return false;
                }
            }

            // never upscale a tiny icon into a blurry application tile
            if size.scale == 1 && size.width == 64 && (img.width() < 48 || img.height() < 48) {
                gres.add_hint(
                    &cpt.id,
                    "icon-too-small",
                    [
                        ("icon_name", icon_name.as_str()),
                        ("icon_size", &format!("{}x{}", img.width(), img.height())),
                    ],
                );
                return false;
            }

            if scaled_width > img.width() {
                gres.add_hint(
                    &cpt.id,
                    "icon-scaled-up",
                    [
                        ("icon_name", icon_name.as_str()),
                        ("icon_size", &format!("{}x{}", img.width(), img.height())),
                        ("scale_size", &size.to_string()),
                    ],
                );
            }

            if let Err(e) = fs::create_dir_all(&size_dir) {
                gres.add_hint_msg(&cpt.id, "image-write-error", &e.to_string());
                return false;
            }
            img.scale(scaled_width, scaled_height);
            if let Err(e) = img.save_png(&icon_store_location, self.optipng.as_deref()) {
                gres.add_hint(
                    &cpt.id,
                    "image-write-error",
                    [
                        ("fname", path_basename(icon_path)),
                        ("pkg_fname", path_basename(&source_pkg.filename())),
                        ("error", &e.to_string()),
                    ],
                );
                return false;
            }
        }

        self.add_icon_refs(gres, cpt, size, &icon_name, target_state);
        true
    }

    fn add_icon_refs(
        &self,
        gres: &mut GeneratorResult,
        cpt: &mut Component,
        size: ImageSize,
        icon_name: &str,
        target_state: IconState,
    ) {
        if target_state != IconState::RemoteOnly {
            cpt.icons.push(Icon::Cached {
                name: icon_name.to_string(),
                width: size.width,
                height: size.height,
                scale: size.scale,
            });
        }
        if target_state != IconState::CachedOnly && self.allow_remote_icons {
            let Some(gcid) = gres.gcid_for_component(cpt) else {
                gres.add_hint_msg(
                    &cpt.id,
                    "internal-error",
                    "No global ID could be found for the component, could not add remote icon.",
                );
                return;
            };
            cpt.icons.push(Icon::Remote {
                url: format!("{gcid}/icons/{size}/{icon_name}"),
                width: size.width,
                height: size.height,
                scale: size.scale,
            });
        }
    }

    /// What: Resolve and store the icons of one component.
    ///
    /// Inputs:
    /// - `gres`: The result the component belongs to (hints, gcids)
    /// - `cpt`: The component, taken out of the result for mutation
    ///
    /// Output:
    /// - `true` when icon processing succeeded (or was not needed)
    ///
    /// Details:
    /// - Fonts keep icons that were already rendered from the font data.
    /// - Absolute icon paths are looked up in the component's own package
    ///   at the default size only.
    /// - Theme icons search the candidate package first, then the global
    ///   icon index; a found stock icon is additionally referenced by name.
    pub fn process(&self, gres: &mut GeneratorResult, cpt: &mut Component) -> bool {
        if cpt.kind == ComponentKind::Font
            && cpt
                .icons
                .iter()
                .any(|i| matches!(i, Icon::Cached { .. } | Icon::Remote { .. }))
        {
            return true;
        }

        let icon_name = Self::icon_name_and_clear(cpt);
        if icon_name.is_empty() {
            return true;
        }

        let Some(gcid) = gres.gcid_for_component(cpt) else {
            gres.add_hint_msg(
                &cpt.id,
                "internal-error",
                "No global ID could be found for the component.",
            );
            return false;
        };
        let cpt_media_path = self.media_export_path.join(&gcid);

        if icon_name.starts_with('/') {
            debug!(icon = %icon_name, pkid = %gres.pkid(), cid = %cpt.id, "looking for icon (path)");

            let found_in_pkg = gres
                .package()
                .contents()
                .map(|contents| contents.iter().any(|f| f == &icon_name))
                .unwrap_or(false);
            if found_in_pkg {
                let pkg = PackageRef::clone(gres.package());
                return self.store_icon(
                    gres,
                    cpt,
                    &cpt_media_path,
                    &pkg,
                    &icon_name,
                    self.default_size,
                    self.default_state,
                );
            }

            gres.add_hint(&cpt.id, "icon-not-found", [("icon_fname", icon_name.as_str())]);
            return false;
        }

        debug!(icon = %icon_name, pkid = %gres.pkid(), cid = %cpt.id, "looking for icon (XDG)");
        let icon_name = path_basename(&icon_name);
        // strip extensions some apps wrongly put into the icon field, so
        // the XDG matcher can append its own
        let icon_name = Self::strip_icon_ext(icon_name).to_string();

        let mut last_icon_name = String::new();
        let own_pkg = PackageRef::clone(gres.package());

        let mut find_and_store = |gres: &mut GeneratorResult,
                                  cpt: &mut Component,
                                  search_pkg: Option<&PackageRef>,
                                  last_icon_name: &mut String|
         -> bool {
            let icon_res = self.find_icons(&icon_name, &self.enabled_sizes, search_pkg);
            if icon_res.is_empty() {
                return false;
            }

            let mut icons_stored: HashMap<ImageSize, IconFindResult> = HashMap::new();

            for (size, state) in self.icon_policy.iter() {
                if state == IconState::Ignored {
                    continue;
                }

                let mut info = icon_res.get(&size).cloned();
                if info.is_none() {
                    info = self.find_icon_scalable_to_size(&icon_res, size);
                }
                let Some(info) = info else { continue };

                *last_icon_name = info.fname.clone();
                if Self::icon_allowed(&info.fname) {
                    if self.store_icon(gres, cpt, &cpt_media_path, &info.pkg, &info.fname, size, state)
                    {
                        icons_stored.insert(size, info);
                    }
                } else {
                    // maybe a differently sized source has an allowed format
                    let Some(alt) = self.find_icon_scalable_to_size(&icon_res, size) else {
                        continue;
                    };
                    if Self::icon_allowed(&alt.fname)
                        && self.store_icon(gres, cpt, &cpt_media_path, &alt.pkg, &alt.fname, size, state)
                    {
                        *last_icon_name = alt.fname.clone();
                        icons_stored.insert(size, alt);
                    }
                }

                if gres.is_ignored(&cpt.id) {
                    // storing may have rejected the component entirely
                    return false;
                }
            }

            if icons_stored.contains_key(&self.default_size) {
                return true;
            }
            // the mandatory 64x64 size is missing; downscale a larger
            // stored icon to fill it
            for size in &self.enabled_sizes {
                let Some(info) = icons_stored.get(size) else { continue };
                if size.to_int() < self.default_size.to_int() {
                    continue;
                }
                info!(
                    pkid = %gres.pkid(),
                    icon = %icon_name,
                    from = %size,
                    to = %self.default_size,
                    "downscaling icon"
                );
                let info = info.clone();
                *last_icon_name = info.fname.clone();
                if self.store_icon(
                    gres,
                    cpt,
                    &cpt_media_path,
                    &info.pkg,
                    &info.fname,
                    self.default_size,
                    self.default_state,
                ) {
                    return true;
                }
            }

            false
        };

        let mut success = find_and_store(gres, cpt, Some(&own_pkg), &mut last_icon_name);
        if !success && !gres.is_ignored(&cpt.id) {
            success = find_and_store(gres, cpt, None, &mut last_icon_name);
        }

        if success {
            // also reference the stock icon by name, now that a valid
            // cached icon exists
            cpt.icons.push(Icon::Stock {
                name: icon_name.clone(),
            });
            return true;
        }

        if !last_icon_name.is_empty() && !Self::icon_allowed(&last_icon_name) {
            gres.add_hint(
                &cpt.id,
                "icon-format-unsupported",
                [("icon_fname", path_basename(&last_icon_name))],
            );
            return false;
        }
        gres.add_hint(&cpt.id, "icon-not-found", [("icon_fname", icon_name.as_str())]);
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const THEME_INDEX: &str = "\
[Icon Theme]
Name=hicolor

[48x48/apps]
Size=48
Context=Applications
Type=Threshold

[64x64/apps]
Size=64
Context=Applications
Type=Threshold

[128x128/apps]
Size=128
Context=Applications
Type=Threshold

[scalable/apps]
Size=128
Context=Applications
MinSize=8
MaxSize=512
Type=Scalable

[symbolic/apps]
Size=16
Context=Applications
Type=Threshold
";

    #[test]
    fn theme_parsing_skips_symbolic_sections() {
        let theme = Theme::new("hicolor", THEME_INDEX.as_bytes(), "").expect("theme");
        assert_eq!(theme.name(), "hicolor");
        assert!(
            theme
                .directories
                .iter()
                .all(|d| !d.path.starts_with("symbolic/"))
        );
        // sorted ascending by size
        let sizes: Vec<u32> = theme.directories.iter().map(|d| d.size).collect();
        let mut sorted = sizes.clone();
        sorted.sort_unstable();
        assert_eq!(sizes, sorted);
    }

    #[test]
    fn matching_filenames_for_48px_stay_in_matching_dirs() {
        let theme = Theme::new("hicolor", THEME_INDEX.as_bytes(), "").expect("theme");
        let names = theme.matching_icon_filenames(
            "accessories-calculator",
            ImageSize::square(48),
            false,
        );
        assert!(!names.is_empty());
        for name in &names {
            assert!(
                name.starts_with("/usr/share/icons/hicolor/48x48/")
                    || name.starts_with("/usr/share/icons/hicolor/scalable/"),
                "unexpected candidate path: {name}"
            );
        }
    }

    #[test]
    fn relaxed_threshold_matching_allows_downscaling() {
        let theme = Theme::new("hicolor", THEME_INDEX.as_bytes(), "").expect("theme");
        let strict = theme.matching_icon_filenames("app", ImageSize::square(64), false);
        let relaxed = theme.matching_icon_filenames("app", ImageSize::square(64), true);
        // the relaxed rules additionally match the 128x128 threshold dir
        assert!(relaxed.len() > strict.len());
        assert!(relaxed.iter().any(|n| n.contains("/128x128/")));
    }

    #[test]
    fn vendored_hicolor_index_parses() {
        let theme = Theme::new("hicolor", VENDORED_HICOLOR_INDEX, "").expect("bundled theme");
        assert!(!theme.directories.is_empty());
    }

    #[test]
    fn allowed_icon_extensions() {
        assert!(IconHandler::icon_allowed("app.png"));
        assert!(IconHandler::icon_allowed("app.svgz"));
        assert!(IconHandler::icon_allowed("app.xpm"));
        assert!(!IconHandler::icon_allowed("app.gif"));
        assert!(!IconHandler::icon_allowed("app.ico"));
    }

    #[test]
    fn icon_ext_stripping() {
        assert_eq!(IconHandler::strip_icon_ext("app.png"), "app");
        assert_eq!(IconHandler::strip_icon_ext("app.svgz"), "app");
        assert_eq!(IconHandler::strip_icon_ext("app"), "app");
        assert_eq!(IconHandler::strip_icon_ext("app.weird"), "app.weird");
    }
}
