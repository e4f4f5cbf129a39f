//! The component processor ("compose") turning raw package data into
//! AppStream components.
//!
//! This subsystem is the collaborator the extractor drives: it receives a
//! unit (an abstraction over the file tree of one software container),
//! locates metainfo and desktop-entry files, merges them into components,
//! derives language completion from locale files, optionally fetches
//! screenshots, and mints global component IDs. Everything the rest of the
//! generator knows about it are the inputs and outputs defined here.

use std::collections::HashMap;

use sha2::{Digest, Sha256};

use crate::utils::is_top_level_domain;

pub mod component;
pub mod desktop;
pub mod engine;
pub mod metainfo;

pub use component::{Component, ComponentKind, Icon, MergeKind, ScrImage, ScrVideo, Screenshot};
pub use engine::{
    ComposeFlags, ComposeHint, ComposeResult, ComposeSettings, finalize_result, process_unit,
};

/// An abstraction over a container of files (typically a package).
///
/// The compose engine only ever reads through this interface, so any
/// backend package and the injected extra-metainfo directory can be
/// processed the same way.
pub trait Unit {
    /// Identifier of the container (the package name).
    fn bundle_id(&self) -> String;
    /// All file paths inside the container, absolute with a leading `/`.
    fn contents(&self) -> anyhow::Result<Vec<String>>;
    /// Read the bytes of one file.
    fn read_data(&self, path: &str) -> anyhow::Result<Vec<u8>>;
}

/// What: Mint a global component ID for a component ID and digest input.
///
/// Inputs:
/// - `cid`: The component ID (e.g. `org.example.App`)
/// - `digest_input`: Data that uniquely describes the component contents
///
/// Output:
/// - A four-segment gcid, or `None` for an empty cid
///
/// Details:
/// - Reverse-DNS ids are bucketed as `tld/domain/rest/<hash>`, everything
///   else as `<c>/<cc>/<cid>/<hash>` from the first characters of the id.
/// - The hash is content-addressed: identical components map to identical
///   media paths, which is what makes concurrent media writes safe.
#[must_use]
pub fn build_global_component_id(cid: &str, digest_input: &str) -> Option<String> {
    if cid.is_empty() {
        return None;
    }

    let mut hasher = Sha256::new();
    hasher.update(cid.as_bytes());
    hasher.update([0u8]);
    hasher.update(digest_input.as_bytes());
    let digest = hasher.finalize();
    let mut hash = String::with_capacity(32);
    for byte in digest.iter().take(16) {
        use std::fmt::Write;
        let _ = write!(hash, "{byte:02x}");
    }

    let dot_parts: Vec<&str> = cid.split('.').collect();
    if dot_parts.len() >= 3 && is_top_level_domain(dot_parts[0]) {
        let rest = dot_parts[2..].join(".");
        return Some(format!("{}/{}/{}/{}", dot_parts[0], dot_parts[1], rest, hash));
    }

    let mut chars = cid.chars();
    let first = chars.next()?.to_lowercase().to_string();
    let second = chars.next().map_or_else(|| first.clone(), |c| c.to_lowercase().to_string());
    Some(format!("{first}/{first}{second}/{cid}/{hash}"))
}

/// Locales that only exist for testing and never count as translations.
#[must_use]
pub fn locale_valid(locale: &str) -> bool {
    locale != "x-test" && locale != "xx"
}

/// What: Derive translation completion percentages from locale files.
///
/// Inputs:
/// - `locale_paths`: `.mo`/`.qm` file paths belonging to the unit (or the
///   wider section)
/// - `domains`: gettext domains / QM base names associated with a component
///
/// Output:
/// - `locale → percentage` relative to the best-translated locale
///
/// Details:
/// - The heuristic follows the common layout
///   `/usr/share/locale/<locale>/LC_MESSAGES/<domain>.mo` and counts one
///   unit per matching file; the locale with the most units is 100%.
#[must_use]
pub fn language_completion_from_paths(
    locale_paths: &[String],
    domains: &[String],
) -> HashMap<String, i32> {
    let mut counts: HashMap<String, u32> = HashMap::new();

    for path in locale_paths {
        let parts: Vec<&str> = path.split('/').filter(|p| !p.is_empty()).collect();
        // usr share locale <locale> LC_MESSAGES <domain>.mo
        if parts.len() < 6 || parts[2] != "locale" {
            continue;
        }
        let locale = parts[3];
        if !locale_valid(locale) {
            continue;
        }
        let fname = parts[parts.len() - 1];
        let Some(stem) = fname.strip_suffix(".mo").or_else(|| fname.strip_suffix(".qm")) else {
            continue;
        };
        if domains.iter().any(|d| d == stem) {
            *counts.entry(locale.to_string()).or_insert(0) += 1;
        }
    }

    let max = counts.values().copied().max().unwrap_or(0);
    if max == 0 {
        return HashMap::new();
    }

    counts
        .into_iter()
        .map(|(locale, n)| (locale, ((n * 100) / max) as i32))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gcid_uses_rdns_bucketing() {
        let gcid = build_global_component_id("org.example.App", "data").expect("gcid");
        let parts: Vec<&str> = gcid.split('/').collect();
        assert_eq!(parts.len(), 4);
        assert_eq!(parts[0], "org");
        assert_eq!(parts[1], "example");
        assert_eq!(parts[2], "App");
        assert_eq!(parts[3].len(), 32);
    }

    #[test]
    fn gcid_uses_prefix_bucketing_for_plain_ids() {
        let gcid = build_global_component_id("foobar.desktop", "data").expect("gcid");
        let parts: Vec<&str> = gcid.split('/').collect();
        assert_eq!(parts[0], "f");
        assert_eq!(parts[1], "fo");
        assert_eq!(parts[2], "foobar.desktop");
    }

    #[test]
    fn gcid_is_content_addressed() {
        let a = build_global_component_id("org.example.App", "one");
        let b = build_global_component_id("org.example.App", "one");
        let c = build_global_component_id("org.example.App", "two");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn language_completion_is_relative_to_best_locale() {
        let paths = vec![
            "/usr/share/locale/de/LC_MESSAGES/app.mo".to_string(),
            "/usr/share/locale/de/LC_MESSAGES/app-extra.mo".to_string(),
            "/usr/share/locale/fr/LC_MESSAGES/app.mo".to_string(),
            "/usr/share/locale/xx/LC_MESSAGES/app.mo".to_string(),
        ];
        let domains = vec!["app".to_string(), "app-extra".to_string()];
        let langs = language_completion_from_paths(&paths, &domains);
        assert_eq!(langs.get("de"), Some(&100));
        assert_eq!(langs.get("fr"), Some(&50));
        assert!(!langs.contains_key("xx"));
    }
}
