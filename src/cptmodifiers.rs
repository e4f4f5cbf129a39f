//! Repo-owner supplied metadata modifications.
//!
//! A suite's extra-metainfo directory may carry a `modifications.json`
//! with two sections: `Remove` lists component IDs to delete after
//! extraction, `InjectCustom` maps component IDs to custom entries merged
//! into the matching component. Lookups are thread-safe; the file is
//! loaded once per suite.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::sync::RwLock;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{debug, info};

use crate::config::Suite;

#[derive(Deserialize, Default)]
#[serde(default)]
struct RawModifications {
    #[serde(rename = "Remove")]
    remove: Vec<String>,
    #[serde(rename = "InjectCustom")]
    inject_custom: HashMap<String, HashMap<String, String>>,
}

#[derive(Default)]
struct ModData {
    removed_components: HashSet<String>,
    injected_custom: HashMap<String, HashMap<String, String>>,
}

/// Injected removals and custom-data patches for one suite.
#[derive(Default)]
pub struct InjectedModifications {
    data: RwLock<ModData>,
}

impl InjectedModifications {
    /// Create an empty modification set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// What: Load `modifications.json` for a suite.
    ///
    /// Inputs:
    /// - `suite`: Suite whose extra-metainfo directory is consulted
    ///
    /// Output:
    /// - `Ok(())`; a missing file simply clears all modifications
    pub fn load_for_suite(&self, suite: &Suite) -> Result<()> {
        let mut data = self
            .data
            .write()
            .map_err(|_| anyhow::anyhow!("modifications lock poisoned"))?;
        data.removed_components.clear();
        data.injected_custom.clear();

        let Some(extra_dir) = &suite.extra_metainfo_dir else {
            return Ok(());
        };
        let fname = extra_dir.join("modifications.json");
        if !fname.exists() {
            return Ok(());
        }

        info!(suite = %suite.name, "using repo-level modifications (via modifications.json)");

        let json_data = fs::read_to_string(&fname)
            .with_context(|| format!("failed to open modifications file: {}", fname.display()))?;
        let raw: RawModifications = serde_json::from_str(&json_data)
            .with_context(|| format!("failed to parse modifications file: {}", fname.display()))?;

        if !raw.inject_custom.is_empty() {
            debug!(fname = %fname.display(), "using injected custom entries");
        }
        if !raw.remove.is_empty() {
            debug!(fname = %fname.display(), "using component removal info");
        }

        data.removed_components = raw.remove.into_iter().collect();
        data.injected_custom = raw.inject_custom;
        Ok(())
    }

    /// Whether any components are marked for removal.
    #[must_use]
    pub fn has_removed_components(&self) -> bool {
        self.data
            .read()
            .map(|d| !d.removed_components.is_empty())
            .unwrap_or(false)
    }

    /// Test if a component was marked for deletion.
    #[must_use]
    pub fn is_component_removed(&self, cid: &str) -> bool {
        self.data
            .read()
            .map(|d| d.removed_components.contains(cid))
            .unwrap_or(false)
    }

    /// Custom entries to merge into a component, when any were injected.
    #[must_use]
    pub fn injected_custom_data(&self, cid: &str) -> Option<HashMap<String, String>> {
        self.data
            .read()
            .ok()
            .and_then(|d| d.injected_custom.get(cid).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn suite_with_mods(dir: &std::path::Path, body: &str) -> Suite {
        fs::write(dir.join("modifications.json"), body).expect("write modifications");
        Suite {
            name: "testing".to_string(),
            extra_metainfo_dir: Some(PathBuf::from(dir)),
            ..Suite::default()
        }
    }

    #[test]
    fn removals_and_injections_are_loaded() {
        let dir = tempfile::tempdir().expect("tempdir");
        let suite = suite_with_mods(
            dir.path(),
            r#"{
                "Remove": ["com.example.removed"],
                "InjectCustom": {
                    "org.example.newdata": {
                        "earth": "moon",
                        "mars": "phobos",
                        "saturn": "thrym"
                    }
                }
            }"#,
        );

        let mods = InjectedModifications::new();
        mods.load_for_suite(&suite).expect("load");

        assert!(mods.is_component_removed("com.example.removed"));
        assert!(!mods.is_component_removed("com.example.not_removed"));

        let injected = mods
            .injected_custom_data("org.example.newdata")
            .expect("injected data");
        assert_eq!(injected.len(), 3);
        assert_eq!(injected.get("earth").map(String::as_str), Some("moon"));
        assert_eq!(injected.get("mars").map(String::as_str), Some("phobos"));
        assert_eq!(injected.get("saturn").map(String::as_str), Some("thrym"));

        assert!(mods.injected_custom_data("org.example.other").is_none());
    }

    #[test]
    fn missing_file_clears_modifications() {
        let dir = tempfile::tempdir().expect("tempdir");
        let suite = suite_with_mods(dir.path(), r#"{"Remove": ["a.b.c"]}"#);

        let mods = InjectedModifications::new();
        mods.load_for_suite(&suite).expect("load");
        assert!(mods.has_removed_components());

        fs::remove_file(dir.path().join("modifications.json")).expect("remove");
        mods.load_for_suite(&suite).expect("reload");
        assert!(!mods.has_removed_components());
        assert!(!mods.is_component_removed("a.b.c"));
    }

    #[test]
    fn malformed_json_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let suite = suite_with_mods(dir.path(), "{nope");
        let mods = InjectedModifications::new();
        assert!(mods.load_for_suite(&suite).is_err());
    }
}
