//! Generator configuration loaded from `asgen-config.json`.
//!
//! The configuration is parsed once at startup into an immutable [`Config`]
//! value that is passed by reference to every component. The only lazily
//! initialized piece is the per-process temporary directory.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use tracing::{debug, error, warn};

use crate::utils::{ImageSize, random_string};

/// Serialization format for stored and published metadata.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DataType {
    /// AppStream catalog XML.
    Xml,
    /// DEP-11 flavoured catalog YAML.
    Yaml,
}

/// The distribution backend used to enumerate packages.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackendKind {
    /// Inert backend for tests.
    Dummy,
    /// Debian-style archive.
    Debian,
    /// Ubuntu: Debian plus language packs.
    Ubuntu,
    /// Arch Linux `.files` tarballs.
    Archlinux,
    /// RPM-MD (`repodata/repomd.xml`).
    RpmMd,
    /// Alpine Linux APKINDEX.
    Alpinelinux,
    /// FreeBSD pkg; recognized in configuration but not built here.
    FreeBsd,
    /// Nix store catalog.
    Nix,
}

impl BackendKind {
    /// Human-readable backend name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Dummy => "Dummy",
            Self::Debian => "Debian",
            Self::Ubuntu => "Ubuntu",
            Self::Archlinux => "Arch Linux",
            Self::RpmMd => "RpmMd",
            Self::Alpinelinux => "Alpine Linux",
            Self::FreeBsd => "FreeBSD",
            Self::Nix => "Nix",
        }
    }

    /// The metadata format this backend publishes by default.
    #[must_use]
    pub const fn default_metadata_type(self) -> DataType {
        match self {
            Self::Dummy | Self::Debian | Self::Ubuntu => DataType::Yaml,
            _ => DataType::Xml,
        }
    }
}

/// How icons of a given size are stored for clients.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IconState {
    /// Size is not processed at all.
    Ignored,
    /// Stored in the cached icon pool only.
    CachedOnly,
    /// Referenced remotely only.
    RemoteOnly,
    /// Cached and additionally referenced via the media base URL.
    CachedRemote,
}

/// Icon sizes a configuration may enable.
pub const ALLOWED_ICON_SIZES: &[ImageSize] = &[
    ImageSize::square(48),
    ImageSize::with_scale(48, 2),
    ImageSize::square(64),
    ImageSize::with_scale(64, 2),
    ImageSize::square(128),
    ImageSize::with_scale(128, 2),
];

/// Per-size icon storage policy.
#[derive(Clone, Debug)]
pub struct IconPolicy {
    entries: Vec<(ImageSize, IconState)>,
}

impl Default for IconPolicy {
    fn default() -> Self {
        Self {
            entries: ALLOWED_ICON_SIZES
                .iter()
                .map(|&size| (size, IconState::CachedOnly))
                .collect(),
        }
    }
}

impl IconPolicy {
    /// Iterate over all configured `(size, state)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (ImageSize, IconState)> + '_ {
        self.entries.iter().copied()
    }

    /// The state configured for one size, `Ignored` when absent.
    #[must_use]
    pub fn state_for(&self, size: ImageSize) -> IconState {
        self.entries
            .iter()
            .find(|(s, _)| *s == size)
            .map_or(IconState::Ignored, |(_, st)| *st)
    }

    /// Override the policy for one size.
    pub fn set_policy(&mut self, size: ImageSize, state: IconState) {
        if let Some(entry) = self.entries.iter_mut().find(|(s, _)| *s == size) {
            entry.1 = state;
        } else {
            self.entries.push((size, state));
        }
    }
}

/// A suite definition from the configuration file.
#[derive(Clone, Debug, Default)]
pub struct Suite {
    /// Suite name (e.g. `stable`).
    pub name: String,
    /// Relative priority of this suite's data.
    pub data_priority: i32,
    /// Suite whose icon themes are also searched.
    pub base_suite: Option<String>,
    /// Preferred icon theme for this suite.
    pub icon_theme: Option<String>,
    /// Sections (components) of this suite.
    pub sections: Vec<String>,
    /// Architectures of this suite.
    pub architectures: Vec<String>,
    /// Immutable suites get their own media tree that is never expired.
    pub is_immutable: bool,
    /// Directory with repo-owner supplied metainfo, when present.
    pub extra_metainfo_dir: Option<PathBuf>,
}

/// Optional processing features, all user-togglable.
#[derive(Clone, Debug)]
#[allow(clippy::struct_excessive_bools)]
pub struct Features {
    /// Validate metainfo files during composition.
    pub validate: bool,
    /// Process desktop-entry files.
    pub process_desktop: bool,
    /// Forbid all network access.
    pub no_downloads: bool,
    /// Download and store screenshots in the media pool.
    pub store_screenshots: bool,
    /// Run `optipng` on generated PNG icons.
    pub optipng: bool,
    /// Embed timestamps in published metadata.
    pub metadata_timestamps: bool,
    /// Honor per-suite immutability.
    pub immutable_suites: bool,
    /// Process font components.
    pub process_fonts: bool,
    /// Allow upscaling icons to satisfy the mandatory size.
    pub allow_icon_upscale: bool,
    /// Synthesize codec components from GStreamer metadata.
    pub process_gstreamer: bool,
    /// Derive language completion from locale files.
    pub process_locale: bool,
    /// Allow video screenshots.
    pub screenshot_videos: bool,
    /// Propagate metainfo artifact entries into the output.
    pub propagate_metainfo_artifacts: bool,
}

impl Default for Features {
    fn default() -> Self {
        Self {
            validate: true,
            process_desktop: true,
            no_downloads: false,
            store_screenshots: true,
            optipng: true,
            metadata_timestamps: true,
            immutable_suites: true,
            process_fonts: true,
            allow_icon_upscale: true,
            process_gstreamer: true,
            process_locale: true,
            screenshot_videos: true,
            propagate_metainfo_artifacts: false,
        }
    }
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RawExportDirs {
    #[serde(rename = "Media")]
    media: Option<String>,
    #[serde(rename = "Data")]
    data: Option<String>,
    #[serde(rename = "Hints")]
    hints: Option<String>,
    #[serde(rename = "Html")]
    html: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RawSuite {
    #[serde(rename = "dataPriority")]
    data_priority: Option<i32>,
    #[serde(rename = "baseSuite")]
    base_suite: Option<String>,
    #[serde(rename = "useIconTheme")]
    use_icon_theme: Option<String>,
    sections: Vec<String>,
    architectures: Vec<String>,
    immutable: bool,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RawIconFlags {
    remote: bool,
    cached: bool,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RawConfig {
    #[serde(rename = "ProjectName")]
    project_name: Option<String>,
    #[serde(rename = "ArchiveRoot")]
    archive_root: Option<String>,
    #[serde(rename = "WorkspaceDir")]
    workspace_dir: Option<String>,
    #[serde(rename = "MediaBaseUrl")]
    media_base_url: Option<String>,
    #[serde(rename = "HtmlBaseUrl")]
    html_base_url: Option<String>,
    #[serde(rename = "ExportDirs")]
    export_dirs: RawExportDirs,
    #[serde(rename = "ExtraMetainfoDir")]
    extra_metainfo_dir: Option<String>,
    #[serde(rename = "CAInfo")]
    ca_info: Option<String>,
    #[serde(rename = "FormatVersion")]
    format_version: Option<String>,
    #[serde(rename = "Backend")]
    backend: Option<String>,
    #[serde(rename = "MetadataType")]
    metadata_type: Option<String>,
    #[serde(rename = "Suites")]
    suites: HashMap<String, RawSuite>,
    #[serde(rename = "Oldsuites")]
    oldsuites: Vec<String>,
    #[serde(rename = "Icons")]
    icons: HashMap<String, RawIconFlags>,
    #[serde(rename = "MaxScreenshotFileSize")]
    max_screenshot_file_size: Option<i64>,
    #[serde(rename = "AllowedCustomKeys")]
    allowed_custom_keys: Vec<String>,
    #[serde(rename = "Features")]
    features: HashMap<String, bool>,
}

/// The resolved generator configuration.
#[derive(Debug)]
pub struct Config {
    /// Project name shown in reports; required for a valid configuration.
    pub project_name: String,
    /// Root of the distribution archive (path or URL prefix).
    pub archive_root: String,
    /// Base URL used for remote icon references.
    pub media_base_url: String,
    /// Base URL of the HTML report site.
    pub html_base_url: String,
    /// AppStream catalog format version string.
    pub format_version: String,
    /// Selected backend.
    pub backend: BackendKind,
    /// Metadata serialization format for this run.
    pub metadata_type: DataType,
    /// All configured suites.
    pub suites: Vec<Suite>,
    /// Retired suite names, listed on the HTML index.
    pub oldsuites: Vec<String>,
    /// Icon size/state policy.
    pub icon_policy: IconPolicy,
    /// Maximum screenshot file size in MiB; 0 disables the limit.
    pub max_scr_file_size: i64,
    /// Custom keys allowed to propagate into the output.
    pub allowed_custom_keys: HashSet<String>,
    /// Feature toggles.
    pub feature: Features,
    /// Optional TLS CA bundle for downloads.
    pub ca_info: Option<PathBuf>,
    /// Resolved `optipng` binary, when found on `PATH`.
    pub optipng_binary: Option<PathBuf>,
    /// Resolved `ffprobe` binary, when found on `PATH`.
    pub ffprobe_binary: Option<PathBuf>,

    workspace_dir: PathBuf,
    media_export_dir: PathBuf,
    data_export_dir: PathBuf,
    hints_export_dir: PathBuf,
    html_export_dir: PathBuf,
    tmp_dir: OnceLock<PathBuf>,
}

impl Config {
    /// What: Load and validate the configuration from a JSON file.
    ///
    /// Inputs:
    /// - `fname`: Path to `asgen-config.json`
    /// - `enforced_workspace`: `--workspace` override, if any
    /// - `enforced_export_dir`: `--export-dir` override, if any
    ///
    /// Output:
    /// - A fully resolved [`Config`]
    ///
    /// Details:
    /// - `ArchiveRoot` is required; a missing `WorkspaceDir` defaults to the
    ///   directory of the configuration file.
    /// - Export directories default to `<export>/{media,data,hints,html}`
    ///   and may be overridden per kind.
    /// - Features requiring external tools self-disable when the tool is
    ///   missing from `PATH`.
    pub fn load(
        fname: &Path,
        enforced_workspace: Option<&Path>,
        enforced_export_dir: Option<&Path>,
    ) -> Result<Self> {
        let json_data = fs::read_to_string(fname)
            .with_context(|| format!("could not open file: {}", fname.display()))?;
        let raw: RawConfig = serde_json::from_str(&json_data)
            .with_context(|| format!("invalid JSON configuration file: {}", fname.display()))?;

        let mut workspace_dir = match (&raw.workspace_dir, enforced_workspace) {
            (_, Some(enforced)) => enforced.to_path_buf(),
            (Some(dir), None) => PathBuf::from(dir),
            (None, None) => fname
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map_or_else(|| std::env::current_dir().unwrap_or_default(), Path::to_path_buf),
        };
        if workspace_dir.is_relative() {
            workspace_dir = std::env::current_dir().unwrap_or_default().join(workspace_dir);
        }

        let project_name = raw.project_name.clone().unwrap_or_else(|| "Unknown".to_string());
        let Some(archive_root) = raw.archive_root.clone() else {
            bail!("ArchiveRoot is required in configuration");
        };

        let export_root = match enforced_export_dir {
            Some(dir) => {
                let dir = dir.to_path_buf();
                tracing::info!(dir = %dir.display(), "using data export directory root from the command line");
                dir
            }
            None => workspace_dir.join("export"),
        };

        let resolve_export = |value: Option<&String>, default_leaf: &str| -> PathBuf {
            let p = PathBuf::from(value.cloned().unwrap_or_else(|| default_leaf.to_string()));
            if p.is_absolute() { p } else { export_root.join(p) }
        };
        let media_export_dir = resolve_export(raw.export_dirs.media.as_ref(), "media");
        let data_export_dir = resolve_export(raw.export_dirs.data.as_ref(), "data");
        let hints_export_dir = resolve_export(raw.export_dirs.hints.as_ref(), "hints");
        let html_export_dir = resolve_export(raw.export_dirs.html.as_ref(), "html");

        let extra_metainfo_root = raw
            .extra_metainfo_dir
            .as_ref()
            .map_or_else(|| workspace_dir.join("extra-metainfo"), PathBuf::from);

        let mut format_version = "1.0".to_string();
        if let Some(ver) = &raw.format_version {
            if ver == "1.0" {
                format_version = ver.clone();
            } else {
                warn!(
                    version = %ver,
                    "configuration tried to set unknown AppStream format version, falling back to default"
                );
            }
        }

        let backend_id = raw.backend.as_deref().unwrap_or("debian").to_lowercase();
        let backend = match backend_id.as_str() {
            "dummy" => BackendKind::Dummy,
            "debian" => BackendKind::Debian,
            "ubuntu" => BackendKind::Ubuntu,
            "arch" | "archlinux" => BackendKind::Archlinux,
            "mageia" | "rpmmd" => BackendKind::RpmMd,
            "alpinelinux" => BackendKind::Alpinelinux,
            "freebsd" => BackendKind::FreeBsd,
            "nix" => BackendKind::Nix,
            other => bail!("unknown backend '{other}' selected in configuration"),
        };

        let mut metadata_type = backend.default_metadata_type();
        if let Some(mtype) = &raw.metadata_type {
            match mtype.to_lowercase().as_str() {
                "yaml" => metadata_type = DataType::Yaml,
                "xml" => metadata_type = DataType::Xml,
                other => error!(value = other, "invalid value for MetadataType setting"),
            }
        }

        let mut has_immutable_suites = false;
        let mut suites = Vec::with_capacity(raw.suites.len());
        for (suite_name, raw_suite) in &raw.suites {
            // The media pool itself lives in a directory called "pool"; a
            // suite of that name would be copied onto itself.
            if suite_name == "pool" {
                bail!("the name 'pool' is forbidden for a suite");
            }

            let suite_extra_mi_dir = extra_metainfo_root.join(suite_name);
            has_immutable_suites |= raw_suite.immutable;
            suites.push(Suite {
                name: suite_name.clone(),
                data_priority: raw_suite.data_priority.unwrap_or(0),
                base_suite: raw_suite.base_suite.clone(),
                icon_theme: raw_suite.use_icon_theme.clone(),
                sections: raw_suite.sections.clone(),
                architectures: raw_suite.architectures.clone(),
                is_immutable: raw_suite.immutable,
                extra_metainfo_dir: suite_extra_mi_dir.is_dir().then_some(suite_extra_mi_dir),
            });
        }
        suites.sort_by(|a, b| a.name.cmp(&b.name));

        let mut icon_policy = IconPolicy::default();
        for (size_str, flags) in &raw.icons {
            let Ok(size) = ImageSize::parse(size_str) else {
                error!(size = %size_str, "malformed icon size found in configuration, entry ignored");
                continue;
            };
            if !ALLOWED_ICON_SIZES.contains(&size) {
                error!(size = %size_str, "invalid icon size selected in configuration, entry ignored");
                continue;
            }

            let state = match (flags.cached, flags.remote) {
                (true, true) => IconState::CachedRemote,
                (true, false) => IconState::CachedOnly,
                (false, true) => IconState::RemoteOnly,
                (false, false) => IconState::Ignored,
            };

            if size == ImageSize::square(64) && !flags.cached {
                error!("the icon size 64x64 must always be present and cached, ignored user configuration");
                continue;
            }
            icon_policy.set_policy(size, state);
        }

        let mut feature = Features::default();
        for (key, value) in &raw.features {
            match key.as_str() {
                "validateMetainfo" => feature.validate = *value,
                "processDesktop" => feature.process_desktop = *value,
                "noDownloads" => feature.no_downloads = *value,
                "createScreenshotsStore" => feature.store_screenshots = *value,
                "optimizePNGSize" => feature.optipng = *value,
                "metadataTimestamps" => feature.metadata_timestamps = *value,
                "immutableSuites" => feature.immutable_suites = *value,
                "processFonts" => feature.process_fonts = *value,
                "allowIconUpscaling" => feature.allow_icon_upscale = *value,
                "processGStreamer" => feature.process_gstreamer = *value,
                "processLocale" => feature.process_locale = *value,
                "screenshotVideos" => feature.screenshot_videos = *value,
                "propagateMetaInfoArtifacts" => feature.propagate_metainfo_artifacts = *value,
                other => warn!(feature = other, "unknown feature toggle in configuration"),
            }
        }

        let optipng_binary = which::which("optipng").ok();
        let ffprobe_binary = which::which("ffprobe").ok();

        if feature.optipng {
            if let Some(bin) = &optipng_binary {
                debug!(binary = %bin.display(), "using optipng");
            } else {
                feature.optipng = false;
                error!("disabled feature `optimizePNGSize`: the `optipng` binary was not found");
            }
        }
        if feature.screenshot_videos {
            if let Some(bin) = &ffprobe_binary {
                debug!(binary = %bin.display(), "using ffprobe");
            } else {
                feature.screenshot_videos = false;
                error!("disabled feature `screenshotVideos`: the `ffprobe` binary was not found");
            }
        }
        if feature.no_downloads {
            // running without downloads is discouraged, leave a trail for debugging
            warn!("configuration does not permit downloading files, several features will not be available");
        }
        if !feature.immutable_suites && has_immutable_suites {
            error!(
                "suites are defined as immutable, but the `immutableSuites` feature is disabled; immutability will not work"
            );
        }
        if !feature.validate {
            warn!("MetaInfo validation has been disabled in configuration");
        }

        let ca_info = raw.ca_info.as_ref().map(PathBuf::from);
        crate::downloader::set_default_ca_info(ca_info.clone());

        Ok(Self {
            project_name,
            archive_root,
            media_base_url: raw.media_base_url.clone().unwrap_or_default(),
            html_base_url: raw.html_base_url.clone().unwrap_or_default(),
            format_version,
            backend,
            metadata_type,
            suites,
            oldsuites: raw.oldsuites.clone(),
            icon_policy,
            max_scr_file_size: raw.max_screenshot_file_size.unwrap_or(14),
            allowed_custom_keys: raw.allowed_custom_keys.iter().cloned().collect(),
            feature,
            ca_info,
            optipng_binary,
            ffprobe_binary,
            workspace_dir,
            media_export_dir,
            data_export_dir,
            hints_export_dir,
            html_export_dir,
            tmp_dir: OnceLock::new(),
        })
    }

    /// Whether the configuration is complete enough to run.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self.project_name.is_empty()
    }

    /// Workspace root directory.
    #[must_use]
    pub fn workspace_dir(&self) -> &Path {
        &self.workspace_dir
    }

    /// Directory holding the persistent databases.
    #[must_use]
    pub fn database_dir(&self) -> PathBuf {
        self.workspace_dir.join("db")
    }

    /// Directory holding caches and temporary data.
    #[must_use]
    pub fn cache_root_dir(&self) -> PathBuf {
        self.workspace_dir.join("cache")
    }

    /// Media export root (`…/media`); the pool lives below it.
    #[must_use]
    pub fn media_export_dir(&self) -> &Path {
        &self.media_export_dir
    }

    /// Catalog data export root.
    #[must_use]
    pub fn data_export_dir(&self) -> &Path {
        &self.data_export_dir
    }

    /// Hints export root.
    #[must_use]
    pub fn hints_export_dir(&self) -> &Path {
        &self.hints_export_dir
    }

    /// HTML report export root.
    #[must_use]
    pub fn html_export_dir(&self) -> &Path {
        &self.html_export_dir
    }

    /// Optional on-disk template directory overriding the embedded pages.
    #[must_use]
    pub fn template_dir(&self) -> Option<PathBuf> {
        let tdir = self.workspace_dir.join("templates");
        let project_tdir = tdir.join(self.project_name.to_lowercase());
        if project_tdir.is_dir() {
            return Some(project_tdir);
        }
        let default_tdir = tdir.join("default");
        if default_tdir.is_dir() {
            return Some(default_tdir);
        }
        tdir.is_dir().then_some(tdir)
    }

    /// Find a suite definition by name.
    #[must_use]
    pub fn suite(&self, name: &str) -> Option<&Suite> {
        self.suites.iter().find(|s| s.name == name)
    }

    /// What: The process-wide temporary directory.
    ///
    /// Output:
    /// - `<cache>/tmp/asgen-<rand8>`, created on first use
    ///
    /// Details:
    /// - The random suffix isolates concurrent generator runs sharing a
    ///   workspace cache.
    pub fn tmp_dir(&self) -> &Path {
        self.tmp_dir.get_or_init(|| {
            let dir = self
                .cache_root_dir()
                .join("tmp")
                .join(format!("asgen-{}", random_string(8)));
            if let Err(e) = fs::create_dir_all(&dir) {
                warn!(dir = %dir.display(), error = %e, "unable to create temporary directory");
            }
            dir
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("asgen-config.json");
        let mut f = fs::File::create(&path).expect("create config");
        f.write_all(body.as_bytes()).expect("write config");
        path
    }

    #[test]
    fn minimal_config_loads_with_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_config(
            dir.path(),
            r#"{
                "ProjectName": "TestProject",
                "ArchiveRoot": "/srv/archive",
                "Backend": "debian",
                "Suites": {
                    "chromodoris": {
                        "sections": ["main"],
                        "architectures": ["amd64"]
                    }
                }
            }"#,
        );

        let conf = Config::load(&path, None, None).expect("load config");
        assert!(conf.is_valid());
        assert_eq!(conf.backend, BackendKind::Debian);
        assert_eq!(conf.metadata_type, DataType::Yaml);
        assert_eq!(conf.suites.len(), 1);
        assert_eq!(conf.suites[0].name, "chromodoris");
        assert_eq!(conf.workspace_dir(), dir.path());
        assert_eq!(conf.database_dir(), dir.path().join("db"));
        assert!(conf.data_export_dir().ends_with("export/data"));
        assert_eq!(conf.max_scr_file_size, 14);
    }

    #[test]
    fn metadata_type_override_is_honored() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_config(
            dir.path(),
            r#"{
                "ProjectName": "P",
                "ArchiveRoot": "/srv/archive",
                "Backend": "debian",
                "MetadataType": "xml"
            }"#,
        );
        let conf = Config::load(&path, None, None).expect("load config");
        assert_eq!(conf.metadata_type, DataType::Xml);
    }

    #[test]
    fn archive_root_is_required() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_config(dir.path(), r#"{"ProjectName": "P"}"#);
        assert!(Config::load(&path, None, None).is_err());
    }

    #[test]
    fn suite_named_pool_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_config(
            dir.path(),
            r#"{
                "ProjectName": "P",
                "ArchiveRoot": "/srv/a",
                "Suites": {"pool": {}}
            }"#,
        );
        assert!(Config::load(&path, None, None).is_err());
    }

    #[test]
    fn icon_policy_entries_are_validated() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_config(
            dir.path(),
            r#"{
                "ProjectName": "P",
                "ArchiveRoot": "/srv/a",
                "Icons": {
                    "64x64": {"cached": true, "remote": true},
                    "128x128": {"cached": false, "remote": true},
                    "512x512": {"cached": true},
                    "banana": {"cached": true}
                }
            }"#,
        );
        let conf = Config::load(&path, None, None).expect("load config");
        assert_eq!(conf.icon_policy.state_for(ImageSize::square(64)), IconState::CachedRemote);
        assert_eq!(conf.icon_policy.state_for(ImageSize::square(128)), IconState::RemoteOnly);
        // 512x512 is not an allowed size, default policy stays
        assert_eq!(conf.icon_policy.state_for(ImageSize::square(48)), IconState::CachedOnly);
    }
}
