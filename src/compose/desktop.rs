//! Desktop-entry file parsing and merging into components.
//!
//! Desktop entries act both as a data source for applications that ship a
//! metainfo file and as the sole source for legacy applications without
//! one (which get a `no-metainfo` hint attached elsewhere).

use std::collections::BTreeMap;

use anyhow::{Result, bail};

use super::component::{Component, ComponentKind, Icon};

/// Desktop-entry categories that carry no information for users and are
/// dropped during conversion.
const BORING_CATEGORIES: &[&str] = &["GTK", "Qt", "GNOME", "KDE", "MATE", "XFCE", "LXQt"];

/// A parsed `[Desktop Entry]` group.
#[derive(Clone, Debug, Default)]
pub struct DesktopEntry {
    fields: BTreeMap<String, String>,
}

impl DesktopEntry {
    /// What: Parse a desktop-entry file.
    ///
    /// Inputs:
    /// - `data`: Raw file bytes (UTF-8 expected, lossily decoded)
    ///
    /// Output:
    /// - The `[Desktop Entry]` group as a key/value map
    ///
    /// Details:
    /// - Other groups (actions, …) are ignored.
    /// - Lines without `=` outside of group headers are rejected.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let text = String::from_utf8_lossy(data);
        let mut fields = BTreeMap::new();
        let mut in_main_group = false;
        let mut saw_main_group = false;

        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if line.starts_with('[') && line.ends_with(']') {
                in_main_group = line == "[Desktop Entry]";
                saw_main_group |= in_main_group;
                continue;
            }
            if !in_main_group {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                bail!("malformed desktop-entry line: '{line}'");
            };
            fields.insert(key.trim().to_string(), value.trim().to_string());
        }

        if !saw_main_group {
            bail!("no [Desktop Entry] group found");
        }
        Ok(Self { fields })
    }

    /// Get a raw field value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    /// Get a boolean field, defaulting to `false`.
    #[must_use]
    pub fn get_bool(&self, key: &str) -> bool {
        matches!(self.get(key), Some("true") | Some("1"))
    }

    /// What: Collect a localized field as a `locale → text` map.
    ///
    /// Inputs:
    /// - `key`: Field name, e.g. `Name`
    ///
    /// Output:
    /// - Map with the plain value under `C` and `Key[locale]` variants
    ///   under their locale
    #[must_use]
    pub fn localized(&self, key: &str) -> BTreeMap<String, String> {
        let mut out = BTreeMap::new();
        let prefix = format!("{key}[");
        for (k, value) in &self.fields {
            if k == key {
                out.insert("C".to_string(), value.clone());
            } else if let Some(rest) = k.strip_prefix(&prefix)
                && let Some(locale) = rest.strip_suffix(']')
                && super::locale_valid(locale)
            {
                out.insert(locale.to_string(), value.clone());
            }
        }
        out
    }

    /// The gettext domain announced for external translation lookups
    /// (used by the Ubuntu language-pack machinery).
    #[must_use]
    pub fn gettext_domain(&self) -> Option<&str> {
        self.get("X-Ubuntu-Gettext-Domain")
            .or_else(|| self.get("X-GNOME-Gettext-Domain"))
    }

    /// Whether this entry describes a launchable application that may be
    /// shown to users.
    #[must_use]
    pub fn is_displayed_application(&self) -> bool {
        if let Some(etype) = self.get("Type")
            && etype != "Application"
        {
            return false;
        }
        !self.get_bool("NoDisplay") && !self.get_bool("Hidden")
    }
}

/// Translation lookup callback: maps a source text to `locale → text`.
pub type TranslateFn<'a> = dyn Fn(&DesktopEntry, &str) -> BTreeMap<String, String> + 'a;

/// What: Merge a desktop entry into a component.
///
/// Inputs:
/// - `entry`: Parsed desktop entry
/// - `desktop_id`: File name of the entry (`org.example.App.desktop`)
/// - `cpt`: Component receiving the data
/// - `translate`: Optional external translation lookup for `Name`/`Comment`
///
/// Details:
/// - Existing metainfo values always win over desktop-entry values.
/// - The `Icon=` field becomes a stock reference (or a local one for
///   absolute paths); icon processing resolves it later.
/// - A `desktop-id` launchable is recorded so clients can start the app.
pub fn merge_desktop_entry(
    entry: &DesktopEntry,
    desktop_id: &str,
    cpt: &mut Component,
    translate: Option<&TranslateFn<'_>>,
) {
    if cpt.kind == ComponentKind::Unknown {
        cpt.kind = ComponentKind::DesktopApplication;
    }

    let mut names = entry.localized("Name");
    let mut summaries = entry.localized("Comment");
    if let Some(tr) = translate {
        if let Some(text) = entry.get("Name") {
            for (locale, value) in tr(entry, text) {
                names.entry(locale).or_insert(value);
            }
        }
        if let Some(text) = entry.get("Comment") {
            for (locale, value) in tr(entry, text) {
                summaries.entry(locale).or_insert(value);
            }
        }
    }
    for (locale, value) in names {
        cpt.names.entry(locale).or_insert(value);
    }
    for (locale, value) in summaries {
        cpt.summaries.entry(locale).or_insert(value);
    }

    if cpt.raw_icon().is_none()
        && let Some(icon) = entry.get("Icon")
        && !icon.is_empty()
    {
        if icon.starts_with('/') {
            cpt.icons.push(Icon::Local {
                path: icon.to_string(),
            });
        } else {
            cpt.icons.push(Icon::Stock {
                name: icon.to_string(),
            });
        }
    }

    if let Some(categories) = entry.get("Categories") {
        for cat in categories.split(';') {
            let cat = cat.trim();
            if cat.is_empty() || BORING_CATEGORIES.contains(&cat) {
                continue;
            }
            if !cpt.categories.iter().any(|c| c == cat) {
                cpt.categories.push(cat.to_string());
            }
        }
    }

    for (locale, words) in entry.localized("Keywords") {
        let list: Vec<String> = words
            .split(';')
            .map(str::trim)
            .filter(|w| !w.is_empty())
            .map(str::to_string)
            .collect();
        if !list.is_empty() {
            cpt.keywords.entry(locale).or_insert(list);
        }
    }

    if let Some(mimetypes) = entry.get("MimeType") {
        let list: Vec<String> = mimetypes
            .split(';')
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .map(str::to_string)
            .collect();
        if !list.is_empty() {
            let slot = cpt.provides.entry("mediatypes".to_string()).or_default();
            for mt in list {
                if !slot.contains(&mt) {
                    slot.push(mt);
                }
            }
        }
    }

    let launchables = cpt.launchables.entry("desktop-id".to_string()).or_default();
    if !launchables.iter().any(|l| l == desktop_id) {
        launchables.push(desktop_id.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
[Desktop Entry]
Type=Application
Name=Calculator
Name[de]=Taschenrechner
Comment=Do some math
Icon=accessories-calculator
Categories=GTK;Utility;Calculator;
Keywords=math;arithmetic;
MimeType=x-scheme-handler/calc;
Exec=calculator %u

[Desktop Action New]
Name=New Window
";

    #[test]
    fn parses_main_group_only() {
        let entry = DesktopEntry::parse(SAMPLE.as_bytes()).expect("parse");
        assert_eq!(entry.get("Name"), Some("Calculator"));
        assert_eq!(entry.get("Type"), Some("Application"));
        // the action group's Name must not shadow the main one
        let names = entry.localized("Name");
        assert_eq!(names.get("C").map(String::as_str), Some("Calculator"));
        assert_eq!(names.get("de").map(String::as_str), Some("Taschenrechner"));
    }

    #[test]
    fn merge_fills_component_fields() {
        let entry = DesktopEntry::parse(SAMPLE.as_bytes()).expect("parse");
        let mut cpt = Component::new("org.example.Calculator", ComponentKind::Unknown);
        merge_desktop_entry(&entry, "org.example.Calculator.desktop", &mut cpt, None);

        assert_eq!(cpt.kind, ComponentKind::DesktopApplication);
        assert_eq!(cpt.name(), Some("Calculator"));
        assert_eq!(cpt.summary(), Some("Do some math"));
        // boring toolkit category is dropped
        assert_eq!(cpt.categories, vec!["Utility".to_string(), "Calculator".to_string()]);
        assert!(matches!(cpt.raw_icon(), Some(Icon::Stock { name }) if name == "accessories-calculator"));
        assert_eq!(
            cpt.launchables.get("desktop-id"),
            Some(&vec!["org.example.Calculator.desktop".to_string()])
        );
        assert_eq!(
            cpt.provides.get("mediatypes"),
            Some(&vec!["x-scheme-handler/calc".to_string()])
        );
    }

    #[test]
    fn metainfo_values_win_over_desktop_values() {
        let entry = DesktopEntry::parse(SAMPLE.as_bytes()).expect("parse");
        let mut cpt = Component::new("org.example.Calculator", ComponentKind::DesktopApplication);
        cpt.names.insert("C".to_string(), "Better Name".to_string());
        merge_desktop_entry(&entry, "org.example.Calculator.desktop", &mut cpt, None);
        assert_eq!(cpt.name(), Some("Better Name"));
    }

    #[test]
    fn hidden_entries_are_not_displayed() {
        let entry = DesktopEntry::parse(b"[Desktop Entry]\nType=Application\nName=X\nHidden=true\n")
            .expect("parse");
        assert!(!entry.is_displayed_application());

        let entry =
            DesktopEntry::parse(b"[Desktop Entry]\nType=Link\nName=X\n").expect("parse");
        assert!(!entry.is_displayed_application());
    }

    #[test]
    fn rejects_garbage() {
        assert!(DesktopEntry::parse(b"complete nonsense").is_err());
    }
}
