//! The software component model and its catalog serializations.
//!
//! Components carry per-locale strings keyed by locale name, with `C`
//! acting as the untranslated fallback. Serialization targets the two
//! catalog formats: AppStream XML fragments and DEP-11 flavoured YAML
//! documents. Both embed the associated package names, which the duplicate
//! detection in the extractor relies on.

use std::collections::BTreeMap;

use anyhow::Result;
use serde_norway::value::{Mapping, Value};

use crate::config::DataType;
use crate::utils::escape_xml;

/// The type of a software component.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ComponentKind {
    /// Type could not be determined.
    #[default]
    Unknown,
    /// Generic component without special semantics.
    Generic,
    /// Application with a graphical interface.
    DesktopApplication,
    /// Application run from a terminal.
    ConsoleApplication,
    /// Application accessed through a web browser.
    WebApplication,
    /// Extension of another described component.
    Addon,
    /// A font.
    Font,
    /// A multimedia codec collection.
    Codec,
    /// An input method.
    InputMethod,
    /// Device firmware.
    Firmware,
    /// A hardware driver.
    Driver,
    /// A localization pack.
    Localization,
    /// A background service.
    Service,
    /// A software repository definition.
    Repository,
    /// An operating system.
    OperatingSystem,
    /// An icon theme.
    IconTheme,
    /// A runtime platform.
    Runtime,
}

impl ComponentKind {
    /// Parse a component type string (both modern and legacy spellings).
    #[must_use]
    pub fn from_str(s: &str) -> Self {
        match s {
            "generic" => Self::Generic,
            "desktop-application" | "desktop" => Self::DesktopApplication,
            "console-application" | "console" => Self::ConsoleApplication,
            "web-application" => Self::WebApplication,
            "addon" => Self::Addon,
            "font" => Self::Font,
            "codec" => Self::Codec,
            "inputmethod" | "input-method" => Self::InputMethod,
            "firmware" => Self::Firmware,
            "driver" => Self::Driver,
            "localization" => Self::Localization,
            "service" => Self::Service,
            "repository" => Self::Repository,
            "operating-system" => Self::OperatingSystem,
            "icon-theme" => Self::IconTheme,
            "runtime" => Self::Runtime,
            _ => Self::Unknown,
        }
    }

    /// The canonical type string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Generic => "generic",
            Self::DesktopApplication => "desktop-application",
            Self::ConsoleApplication => "console-application",
            Self::WebApplication => "web-application",
            Self::Addon => "addon",
            Self::Font => "font",
            Self::Codec => "codec",
            Self::InputMethod => "inputmethod",
            Self::Firmware => "firmware",
            Self::Driver => "driver",
            Self::Localization => "localization",
            Self::Service => "service",
            Self::Repository => "repository",
            Self::OperatingSystem => "operating-system",
            Self::IconTheme => "icon-theme",
            Self::Runtime => "runtime",
        }
    }
}

/// Merge semantics of a component.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MergeKind {
    /// A regular, standalone component.
    #[default]
    None,
    /// Data is appended to a matching component.
    Append,
    /// Data replaces a matching component.
    Replace,
    /// The matching component is removed.
    RemoveComponent,
}

/// An icon reference attached to a component.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Icon {
    /// Stock icon resolved by name through the client's icon theme.
    Stock {
        /// XDG icon name.
        name: String,
    },
    /// Icon stored in the cached icon pool.
    Cached {
        /// File name below the size directory.
        name: String,
        /// Unscaled width.
        width: u32,
        /// Unscaled height.
        height: u32,
        /// Scale factor.
        scale: u32,
    },
    /// Icon available below the media base URL.
    Remote {
        /// URL path relative to the media base.
        url: String,
        /// Unscaled width.
        width: u32,
        /// Unscaled height.
        height: u32,
        /// Scale factor.
        scale: u32,
    },
    /// Icon referenced by an absolute path inside the package; only exists
    /// before icon processing ran.
    Local {
        /// Absolute path inside the package.
        path: String,
    },
}

/// A screenshot image (source or thumbnail).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScrImage {
    /// `source` or `thumbnail`.
    pub kind: String,
    /// Image URL (relative to the media base when stored in the pool).
    pub url: String,
    /// Pixel width, when known.
    pub width: Option<u32>,
    /// Pixel height, when known.
    pub height: Option<u32>,
}

/// A screenshot video.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScrVideo {
    /// Video URL.
    pub url: String,
    /// Container format, when declared.
    pub container: Option<String>,
    /// Codec, when declared.
    pub codec: Option<String>,
}

/// A single screenshot entry.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Screenshot {
    /// Whether this is the default screenshot.
    pub default: bool,
    /// Per-locale captions.
    pub captions: BTreeMap<String, String>,
    /// Images belonging to this screenshot.
    pub images: Vec<ScrImage>,
    /// Videos belonging to this screenshot.
    pub videos: Vec<ScrVideo>,
}

/// A released version of the component.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Release {
    /// Version string.
    pub version: String,
    /// Unix timestamp of the release, when known.
    pub timestamp: Option<i64>,
}

/// A single software component with its catalog data.
#[derive(Clone, Debug, Default)]
pub struct Component {
    /// Component type.
    pub kind: ComponentKind,
    /// Component ID.
    pub id: String,
    /// Merge semantics (almost always [`MergeKind::None`]).
    pub merge_kind: MergeKind,
    /// Packages installing this component.
    pub pkgnames: Vec<String>,
    /// Per-locale display names.
    pub names: BTreeMap<String, String>,
    /// Per-locale one-line summaries.
    pub summaries: BTreeMap<String, String>,
    /// Per-locale long descriptions, stored as XML markup.
    pub descriptions: BTreeMap<String, String>,
    /// Icon references.
    pub icons: Vec<Icon>,
    /// Category names.
    pub categories: Vec<String>,
    /// Per-locale keyword lists.
    pub keywords: BTreeMap<String, Vec<String>>,
    /// SPDX license of the described software.
    pub project_license: Option<String>,
    /// SPDX license of the metadata itself.
    pub metadata_license: Option<String>,
    /// Upstream developer name.
    pub developer_name: Option<String>,
    /// URLs by type (`homepage`, `bugtracker`, …).
    pub urls: BTreeMap<String, String>,
    /// Launchable entries by type (`desktop-id`, …).
    pub launchables: BTreeMap<String, Vec<String>>,
    /// IDs of components this one extends.
    pub extends: Vec<String>,
    /// Provided items by kind (`binaries`, `mediatypes`, …).
    pub provides: BTreeMap<String, Vec<String>>,
    /// Screenshots.
    pub screenshots: Vec<Screenshot>,
    /// Language completion, `locale → percentage`.
    pub languages: BTreeMap<String, i32>,
    /// Custom key/value entries.
    pub custom: BTreeMap<String, String>,
    /// Bundle references by type (`flatpak`, …).
    pub bundles: BTreeMap<String, String>,
    /// Releases, newest first.
    pub releases: Vec<Release>,
    /// Path of the source metainfo/desktop file inside the unit; never
    /// serialized, used for diagnostics and gcid digests.
    pub source_file: Option<String>,
}

impl Component {
    /// Create a component with an id and kind.
    #[must_use]
    pub fn new(id: &str, kind: ComponentKind) -> Self {
        Self {
            id: id.to_string(),
            kind,
            ..Self::default()
        }
    }

    /// The untranslated (`C`) name, falling back to any locale.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.names
            .get("C")
            .or_else(|| self.names.values().next())
            .map(String::as_str)
    }

    /// The untranslated (`C`) summary, falling back to any locale.
    #[must_use]
    pub fn summary(&self) -> Option<&str> {
        self.summaries
            .get("C")
            .or_else(|| self.summaries.values().next())
            .map(String::as_str)
    }

    /// The untranslated long description, when present.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.descriptions.get("C").map(String::as_str)
    }

    /// The raw icon reference as written in the source metadata: a stock
    /// icon wins over a local path. Processed (cached/remote) icons are
    /// never returned here.
    #[must_use]
    pub fn raw_icon(&self) -> Option<&Icon> {
        let mut local = None;
        for icon in &self.icons {
            match icon {
                Icon::Stock { .. } => return Some(icon),
                Icon::Local { .. } => local = Some(icon),
                _ => {}
            }
        }
        local
    }

    /// Whether any bundle reference is attached.
    #[must_use]
    pub fn has_bundle(&self) -> bool {
        !self.bundles.is_empty()
    }

    /// What: Serialize this component for the catalog.
    ///
    /// Inputs:
    /// - `dtype`: Output format (XML fragment or YAML document)
    ///
    /// Output:
    /// - The serialized metadata with trailing whitespace trimmed
    pub fn to_metadata(&self, dtype: DataType) -> Result<String> {
        match dtype {
            DataType::Xml => self.to_catalog_xml(),
            DataType::Yaml => self.to_catalog_yaml(),
        }
    }

    /// Serialize as an AppStream catalog XML fragment.
    pub fn to_catalog_xml(&self) -> Result<String> {
        let mut out = String::with_capacity(1024);
        out.push_str(&format!("<component type=\"{}\">\n", self.kind.as_str()));
        out.push_str(&format!("  <id>{}</id>\n", escape_xml(&self.id)));

        for pkgname in &self.pkgnames {
            out.push_str(&format!("  <pkgname>{}</pkgname>\n", escape_xml(pkgname)));
        }

        write_localized(&mut out, "name", &self.names);
        write_localized(&mut out, "summary", &self.summaries);

        if let Some(markup) = self.descriptions.get("C") {
            out.push_str("  <description>");
            out.push_str(markup);
            out.push_str("</description>\n");
        }
        for (locale, markup) in &self.descriptions {
            if locale == "C" {
                continue;
            }
            out.push_str(&format!("  <description xml:lang=\"{}\">", escape_xml(locale)));
            out.push_str(markup);
            out.push_str("</description>\n");
        }

        if let Some(license) = &self.project_license {
            out.push_str(&format!(
                "  <project_license>{}</project_license>\n",
                escape_xml(license)
            ));
        }
        if let Some(dev) = &self.developer_name {
            out.push_str(&format!(
                "  <developer_name>{}</developer_name>\n",
                escape_xml(dev)
            ));
        }

        for icon in &self.icons {
            match icon {
                Icon::Stock { name } => {
                    out.push_str(&format!(
                        "  <icon type=\"stock\">{}</icon>\n",
                        escape_xml(name)
                    ));
                }
                Icon::Cached {
                    name,
                    width,
                    height,
                    scale,
                } => {
                    if *scale == 1 {
                        out.push_str(&format!(
                            "  <icon type=\"cached\" width=\"{width}\" height=\"{height}\">{}</icon>\n",
                            escape_xml(name)
                        ));
                    } else {
                        out.push_str(&format!(
                            "  <icon type=\"cached\" width=\"{width}\" height=\"{height}\" scale=\"{scale}\">{}</icon>\n",
                            escape_xml(name)
                        ));
                    }
                }
                Icon::Remote {
                    url,
                    width,
                    height,
                    scale,
                } => {
                    if *scale == 1 {
                        out.push_str(&format!(
                            "  <icon type=\"remote\" width=\"{width}\" height=\"{height}\">{}</icon>\n",
                            escape_xml(url)
                        ));
                    } else {
                        out.push_str(&format!(
                            "  <icon type=\"remote\" width=\"{width}\" height=\"{height}\" scale=\"{scale}\">{}</icon>\n",
                            escape_xml(url)
                        ));
                    }
                }
                Icon::Local { path } => {
                    out.push_str(&format!(
                        "  <icon type=\"local\">{}</icon>\n",
                        escape_xml(path)
                    ));
                }
            }
        }

        if !self.categories.is_empty() {
            out.push_str("  <categories>\n");
            for cat in &self.categories {
                out.push_str(&format!("    <category>{}</category>\n", escape_xml(cat)));
            }
            out.push_str("  </categories>\n");
        }

        if !self.keywords.is_empty() {
            out.push_str("  <keywords>\n");
            for (locale, words) in &self.keywords {
                for word in words {
                    if locale == "C" {
                        out.push_str(&format!("    <keyword>{}</keyword>\n", escape_xml(word)));
                    } else {
                        out.push_str(&format!(
                            "    <keyword xml:lang=\"{}\">{}</keyword>\n",
                            escape_xml(locale),
                            escape_xml(word)
                        ));
                    }
                }
            }
            out.push_str("  </keywords>\n");
        }

        for (url_type, url) in &self.urls {
            out.push_str(&format!(
                "  <url type=\"{}\">{}</url>\n",
                escape_xml(url_type),
                escape_xml(url)
            ));
        }

        for (ltype, entries) in &self.launchables {
            for entry in entries {
                out.push_str(&format!(
                    "  <launchable type=\"{}\">{}</launchable>\n",
                    escape_xml(ltype),
                    escape_xml(entry)
                ));
            }
        }

        for ext in &self.extends {
            out.push_str(&format!("  <extends>{}</extends>\n", escape_xml(ext)));
        }

        if !self.provides.is_empty() {
            out.push_str("  <provides>\n");
            for (kind, items) in &self.provides {
                let tag = match kind.as_str() {
                    "binaries" => "binary",
                    "mediatypes" => "mediatype",
                    "libraries" => "library",
                    other => other,
                };
                for item in items {
                    out.push_str(&format!("    <{tag}>{}</{tag}>\n", escape_xml(item)));
                }
            }
            out.push_str("  </provides>\n");
        }

        for (btype, bid) in &self.bundles {
            out.push_str(&format!(
                "  <bundle type=\"{}\">{}</bundle>\n",
                escape_xml(btype),
                escape_xml(bid)
            ));
        }

        if !self.languages.is_empty() {
            out.push_str("  <languages>\n");
            for (locale, percentage) in &self.languages {
                out.push_str(&format!(
                    "    <lang percentage=\"{percentage}\">{}</lang>\n",
                    escape_xml(locale)
                ));
            }
            out.push_str("  </languages>\n");
        }

        if !self.screenshots.is_empty() {
            out.push_str("  <screenshots>\n");
            for scr in &self.screenshots {
                if scr.default {
                    out.push_str("    <screenshot type=\"default\">\n");
                } else {
                    out.push_str("    <screenshot>\n");
                }
                for (locale, caption) in &scr.captions {
                    if locale == "C" {
                        out.push_str(&format!(
                            "      <caption>{}</caption>\n",
                            escape_xml(caption)
                        ));
                    } else {
                        out.push_str(&format!(
                            "      <caption xml:lang=\"{}\">{}</caption>\n",
                            escape_xml(locale),
                            escape_xml(caption)
                        ));
                    }
                }
                for img in &scr.images {
                    let mut attrs = format!(" type=\"{}\"", escape_xml(&img.kind));
                    if let Some(w) = img.width {
                        attrs.push_str(&format!(" width=\"{w}\""));
                    }
                    if let Some(h) = img.height {
                        attrs.push_str(&format!(" height=\"{h}\""));
                    }
                    out.push_str(&format!(
                        "      <image{attrs}>{}</image>\n",
                        escape_xml(&img.url)
                    ));
                }
                for video in &scr.videos {
                    let mut attrs = String::new();
                    if let Some(container) = &video.container {
                        attrs.push_str(&format!(" container=\"{}\"", escape_xml(container)));
                    }
                    if let Some(codec) = &video.codec {
                        attrs.push_str(&format!(" codec=\"{}\"", escape_xml(codec)));
                    }
                    out.push_str(&format!(
                        "      <video{attrs}>{}</video>\n",
                        escape_xml(&video.url)
                    ));
                }
                out.push_str("    </screenshot>\n");
            }
            out.push_str("  </screenshots>\n");
        }

        if !self.releases.is_empty() {
            out.push_str("  <releases>\n");
            for rel in &self.releases {
                match rel.timestamp {
                    Some(ts) => out.push_str(&format!(
                        "    <release version=\"{}\" timestamp=\"{ts}\"/>\n",
                        escape_xml(&rel.version)
                    )),
                    None => out.push_str(&format!(
                        "    <release version=\"{}\"/>\n",
                        escape_xml(&rel.version)
                    )),
                }
            }
            out.push_str("  </releases>\n");
        }

        if !self.custom.is_empty() {
            out.push_str("  <custom>\n");
            for (key, value) in &self.custom {
                out.push_str(&format!(
                    "    <value key=\"{}\">{}</value>\n",
                    escape_xml(key),
                    escape_xml(value)
                ));
            }
            out.push_str("  </custom>\n");
        }

        out.push_str("</component>");
        Ok(out)
    }

    /// Serialize as a DEP-11 flavoured catalog YAML document.
    pub fn to_catalog_yaml(&self) -> Result<String> {
        let mut root = Mapping::new();
        root.insert(v("Type"), v(self.kind.as_str()));
        root.insert(v("ID"), v(&self.id));

        if let Some(pkgname) = self.pkgnames.first() {
            root.insert(v("Package"), v(pkgname));
        }

        if !self.names.is_empty() {
            root.insert(v("Name"), locale_map(&self.names));
        }
        if !self.summaries.is_empty() {
            root.insert(v("Summary"), locale_map(&self.summaries));
        }
        if !self.descriptions.is_empty() {
            root.insert(v("Description"), locale_map(&self.descriptions));
        }
        if let Some(license) = &self.project_license {
            root.insert(v("ProjectLicense"), v(license));
        }
        if let Some(dev) = &self.developer_name {
            root.insert(v("DeveloperName"), v(dev));
        }

        if !self.icons.is_empty() {
            let mut icons = Mapping::new();
            let mut cached = Vec::new();
            let mut remote = Vec::new();
            for icon in &self.icons {
                match icon {
                    Icon::Stock { name } => {
                        icons.insert(v("stock"), v(name));
                    }
                    Icon::Cached {
                        name,
                        width,
                        height,
                        scale,
                    } => {
                        let mut m = Mapping::new();
                        m.insert(v("name"), v(name));
                        m.insert(v("width"), Value::from(*width));
                        m.insert(v("height"), Value::from(*height));
                        if *scale != 1 {
                            m.insert(v("scale"), Value::from(*scale));
                        }
                        cached.push(Value::Mapping(m));
                    }
                    Icon::Remote {
                        url,
                        width,
                        height,
                        scale,
                    } => {
                        let mut m = Mapping::new();
                        m.insert(v("url"), v(url));
                        m.insert(v("width"), Value::from(*width));
                        m.insert(v("height"), Value::from(*height));
                        if *scale != 1 {
                            m.insert(v("scale"), Value::from(*scale));
                        }
                        remote.push(Value::Mapping(m));
                    }
                    Icon::Local { path } => {
                        icons.insert(v("local"), v(path));
                    }
                }
            }
            if !cached.is_empty() {
                icons.insert(v("cached"), Value::Sequence(cached));
            }
            if !remote.is_empty() {
                icons.insert(v("remote"), Value::Sequence(remote));
            }
            root.insert(v("Icon"), Value::Mapping(icons));
        }

        if !self.categories.is_empty() {
            root.insert(v("Categories"), str_seq(&self.categories));
        }
        if !self.keywords.is_empty() {
            let mut m = Mapping::new();
            for (locale, words) in &self.keywords {
                m.insert(v(locale), str_seq(words));
            }
            root.insert(v("Keywords"), Value::Mapping(m));
        }
        if !self.urls.is_empty() {
            let mut m = Mapping::new();
            for (url_type, url) in &self.urls {
                m.insert(v(url_type), v(url));
            }
            root.insert(v("Url"), Value::Mapping(m));
        }
        if !self.launchables.is_empty() {
            let mut m = Mapping::new();
            for (ltype, entries) in &self.launchables {
                m.insert(v(ltype), str_seq(entries));
            }
            root.insert(v("Launchable"), Value::Mapping(m));
        }
        if !self.extends.is_empty() {
            root.insert(v("Extends"), str_seq(&self.extends));
        }
        if !self.provides.is_empty() {
            let mut m = Mapping::new();
            for (kind, items) in &self.provides {
                m.insert(v(kind), str_seq(items));
            }
            root.insert(v("Provides"), Value::Mapping(m));
        }
        if !self.bundles.is_empty() {
            let mut seq = Vec::new();
            for (btype, bid) in &self.bundles {
                let mut m = Mapping::new();
                m.insert(v("type"), v(btype));
                m.insert(v("id"), v(bid));
                seq.push(Value::Mapping(m));
            }
            root.insert(v("Bundles"), Value::Sequence(seq));
        }
        if !self.languages.is_empty() {
            let mut seq = Vec::new();
            for (locale, percentage) in &self.languages {
                let mut m = Mapping::new();
                m.insert(v("locale"), v(locale));
                m.insert(v("percentage"), Value::from(*percentage));
                seq.push(Value::Mapping(m));
            }
            root.insert(v("Languages"), Value::Sequence(seq));
        }
        if !self.screenshots.is_empty() {
            let mut seq = Vec::new();
            for scr in &self.screenshots {
                let mut m = Mapping::new();
                if scr.default {
                    m.insert(v("default"), Value::Bool(true));
                }
                if !scr.captions.is_empty() {
                    m.insert(v("caption"), locale_map(&scr.captions));
                }
                let mut thumbs = Vec::new();
                for img in &scr.images {
                    let mut im = Mapping::new();
                    im.insert(v("url"), v(&img.url));
                    if let Some(w) = img.width {
                        im.insert(v("width"), Value::from(w));
                    }
                    if let Some(h) = img.height {
                        im.insert(v("height"), Value::from(h));
                    }
                    if img.kind == "source" {
                        m.insert(v("source-image"), Value::Mapping(im));
                    } else {
                        thumbs.push(Value::Mapping(im));
                    }
                }
                if !thumbs.is_empty() {
                    m.insert(v("thumbnails"), Value::Sequence(thumbs));
                }
                if !scr.videos.is_empty() {
                    let mut videos = Vec::new();
                    for video in &scr.videos {
                        let mut vm = Mapping::new();
                        vm.insert(v("url"), v(&video.url));
                        if let Some(container) = &video.container {
                            vm.insert(v("container"), v(container));
                        }
                        if let Some(codec) = &video.codec {
                            vm.insert(v("codec"), v(codec));
                        }
                        videos.push(Value::Mapping(vm));
                    }
                    m.insert(v("videos"), Value::Sequence(videos));
                }
                seq.push(Value::Mapping(m));
            }
            root.insert(v("Screenshots"), Value::Sequence(seq));
        }
        if !self.releases.is_empty() {
            let mut seq = Vec::new();
            for rel in &self.releases {
                let mut m = Mapping::new();
                m.insert(v("version"), v(&rel.version));
                if let Some(ts) = rel.timestamp {
                    m.insert(v("unix-timestamp"), Value::from(ts));
                }
                seq.push(Value::Mapping(m));
            }
            root.insert(v("Releases"), Value::Sequence(seq));
        }
        if !self.custom.is_empty() {
            let mut m = Mapping::new();
            for (key, value) in &self.custom {
                m.insert(v(key), v(value));
            }
            root.insert(v("Custom"), Value::Mapping(m));
        }

        let yaml = serde_norway::to_string(&Value::Mapping(root))?;
        Ok(yaml.trim_end().to_string())
    }
}

fn v(s: &str) -> Value {
    Value::String(s.to_string())
}

fn str_seq(items: &[String]) -> Value {
    Value::Sequence(items.iter().map(|s| v(s)).collect())
}

fn locale_map(map: &BTreeMap<String, String>) -> Value {
    let mut m = Mapping::new();
    for (locale, text) in map {
        m.insert(v(locale), v(text));
    }
    Value::Mapping(m)
}

fn write_localized(out: &mut String, tag: &str, map: &BTreeMap<String, String>) {
    if let Some(text) = map.get("C") {
        out.push_str(&format!("  <{tag}>{}</{tag}>\n", escape_xml(text)));
    }
    for (locale, text) in map {
        if locale == "C" {
            continue;
        }
        out.push_str(&format!(
            "  <{tag} xml:lang=\"{}\">{}</{tag}>\n",
            escape_xml(locale),
            escape_xml(text)
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_component() -> Component {
        let mut cpt = Component::new("org.example.App", ComponentKind::DesktopApplication);
        cpt.pkgnames.push("example-app".to_string());
        cpt.names.insert("C".to_string(), "Example".to_string());
        cpt.names.insert("de".to_string(), "Beispiel".to_string());
        cpt.summaries.insert("C".to_string(), "An example app".to_string());
        cpt.descriptions
            .insert("C".to_string(), "<p>Hello &amp; welcome</p>".to_string());
        cpt.icons.push(Icon::Cached {
            name: "example-app_app.png".to_string(),
            width: 64,
            height: 64,
            scale: 1,
        });
        cpt.categories.push("Utility".to_string());
        cpt
    }

    #[test]
    fn xml_serialization_includes_pkgname_marker() {
        let xml = sample_component().to_catalog_xml().expect("xml");
        assert!(xml.starts_with("<component type=\"desktop-application\">"));
        assert!(xml.contains("<pkgname>example-app</pkgname>"));
        assert!(xml.contains("<name xml:lang=\"de\">Beispiel</name>"));
        // description markup is embedded verbatim
        assert!(xml.contains("<p>Hello &amp; welcome</p>"));
        assert!(xml.ends_with("</component>"));
    }

    #[test]
    fn yaml_serialization_includes_package_marker() {
        let yaml = sample_component().to_catalog_yaml().expect("yaml");
        assert!(yaml.contains("Package: example-app\n") || yaml.ends_with("Package: example-app"));
        assert!(yaml.contains("ID: org.example.App"));
        assert!(yaml.contains("Type: desktop-application"));
    }

    #[test]
    fn raw_icon_prefers_stock_over_local() {
        let mut cpt = Component::new("a.b.c", ComponentKind::Generic);
        cpt.icons.push(Icon::Local {
            path: "/usr/share/pixmaps/a.png".to_string(),
        });
        cpt.icons.push(Icon::Stock {
            name: "a-icon".to_string(),
        });
        match cpt.raw_icon() {
            Some(Icon::Stock { name }) => assert_eq!(name, "a-icon"),
            other => panic!("unexpected raw icon: {other:?}"),
        }
    }

    #[test]
    fn component_kind_roundtrip() {
        for kind in [
            ComponentKind::DesktopApplication,
            ComponentKind::Font,
            ComponentKind::Codec,
            ComponentKind::WebApplication,
        ] {
            assert_eq!(ComponentKind::from_str(kind.as_str()), kind);
        }
        assert_eq!(
            ComponentKind::from_str("desktop"),
            ComponentKind::DesktopApplication
        );
    }
}
