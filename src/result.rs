//! Adapter around a compose result, bound to the package it came from.

use std::collections::HashMap;

use serde_json::{Map, Value, json};

use crate::backends::{Package, PackageRef};
use crate::compose::{Component, ComposeResult};

/// The result of extracting one package: components, global component IDs
/// and diagnostic hints, plus the originating package.
pub struct GeneratorResult {
    res: ComposeResult,
    pkg: PackageRef,
}

impl GeneratorResult {
    /// Wrap a compose result produced for `pkg`.
    #[must_use]
    pub fn new(res: ComposeResult, pkg: PackageRef) -> Self {
        Self { res, pkg }
    }

    /// Create an empty result for a package (used for failure reporting).
    #[must_use]
    pub fn empty_for(pkg: PackageRef) -> Self {
        let res = ComposeResult::new(&pkg.name());
        Self { res, pkg }
    }

    /// The stable package ID of the originating package.
    #[must_use]
    pub fn pkid(&self) -> String {
        self.pkg.id()
    }

    /// The originating package.
    #[must_use]
    pub fn package(&self) -> &PackageRef {
        &self.pkg
    }

    /// Direct access to the underlying compose result.
    #[must_use]
    pub fn compose_result(&self) -> &ComposeResult {
        &self.res
    }

    /// Mutable access to the underlying compose result.
    pub fn compose_result_mut(&mut self) -> &mut ComposeResult {
        &mut self.res
    }

    /// What: Attach a hint, returning whether the component survives.
    ///
    /// Inputs:
    /// - `cid`: Component ID; empty strings land on `"general"`
    /// - `tag`: Registered hint tag
    /// - `vars`: Template variables
    ///
    /// Output:
    /// - `false` when the tag's error severity invalidated the component
    pub fn add_hint<I, K, V>(&mut self, cid: &str, tag: &str, vars: I) -> bool
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.res.add_hint(cid, tag, vars)
    }

    /// Attach a hint with a plain message as its only variable.
    pub fn add_hint_msg(&mut self, cid: &str, tag: &str, msg: &str) -> bool {
        if msg.is_empty() {
            self.res
                .add_hint(cid, tag, std::iter::empty::<(String, String)>())
        } else {
            self.res.add_hint(cid, tag, [("msg", msg)])
        }
    }

    /// Whether a hint tag is recorded for a component ID.
    #[must_use]
    pub fn has_hint(&self, cid: &str, tag: &str) -> bool {
        self.res.has_hint(cid, tag)
    }

    /// Whether a component has been invalidated.
    #[must_use]
    pub fn is_ignored(&self, cid: &str) -> bool {
        self.res.is_ignored(cid)
    }

    /// The gcid minted for a component ID.
    #[must_use]
    pub fn gcid_for_component(&self, cpt: &Component) -> Option<String> {
        self.res.gcid_for_cid(&cpt.id).map(str::to_string)
    }

    /// All gcids of valid components.
    #[must_use]
    pub fn component_gcids(&self) -> Vec<String> {
        self.res.component_gcids()
    }

    /// Number of valid components.
    #[must_use]
    pub fn components_count(&self) -> usize {
        self.res.components_count()
    }

    /// Total number of hints.
    #[must_use]
    pub fn hints_count(&self) -> usize {
        self.res.hints_count()
    }

    /// Whether this unit produced neither components nor hints and can be
    /// ignored permanently.
    #[must_use]
    pub fn is_unit_ignored(&self) -> bool {
        self.components_count() == 0 && self.hints_count() == 0
    }

    /// Move all valid components out for mutation.
    pub fn take_components(&mut self) -> Vec<Component> {
        self.res.take_components()
    }

    /// Give components taken with [`GeneratorResult::take_components`] back.
    pub fn set_components(&mut self, cpts: Vec<Component>) {
        self.res.set_components(cpts);
    }

    /// Snapshot of all valid components.
    #[must_use]
    pub fn components(&self) -> Vec<&Component> {
        self.res.components()
    }

    /// Add a synthesized component, minting its gcid from an explicit
    /// digest string.
    pub fn add_component_with_string(&mut self, cpt: Component, digest: &str) {
        self.res.add_component_with_string(cpt, digest);
    }

    /// Remove a component entirely.
    pub fn remove_component(&mut self, cid: &str) {
        self.res.remove_component(cid);
    }

    /// What: Serialize all hints into the persistent JSON document.
    ///
    /// Output:
    /// - `{"package": pkid, "hints": {cid: [{"tag", "vars"}]}}`, or an
    ///   empty string when there are no hints
    #[must_use]
    pub fn hints_to_json(&self) -> String {
        if self.hints_count() == 0 {
            return String::new();
        }

        let mut hints_obj = Map::new();
        for (cid, hints) in self.res.hint_entries() {
            let entries: Vec<Value> = hints
                .iter()
                .map(|h| {
                    let vars: Map<String, Value> = h
                        .vars
                        .iter()
                        .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                        .collect();
                    json!({"tag": h.tag, "vars": vars})
                })
                .collect();
            hints_obj.insert(cid.to_string(), Value::Array(entries));
        }

        let doc = json!({
            "package": self.pkid(),
            "hints": hints_obj,
        });
        doc.to_string()
    }
}

/// Parse a stored hints JSON document back into its parts.
///
/// Returns the package ID and a `cid → [(tag, vars)]` map.
pub fn parse_hints_json(
    data: &str,
) -> anyhow::Result<(String, HashMap<String, Vec<(String, HashMap<String, String>)>>)> {
    let doc: Value = serde_json::from_str(data)?;
    let pkid = doc
        .get("package")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let mut result = HashMap::new();
    if let Some(hints) = doc.get("hints").and_then(Value::as_object) {
        for (cid, entries) in hints {
            let mut list = Vec::new();
            if let Some(arr) = entries.as_array() {
                for entry in arr {
                    let Some(tag) = entry.get("tag").and_then(Value::as_str) else {
                        continue;
                    };
                    let vars = entry
                        .get("vars")
                        .and_then(Value::as_object)
                        .map(|m| {
                            m.iter()
                                .filter_map(|(k, v)| {
                                    v.as_str().map(|s| (k.clone(), s.to_string()))
                                })
                                .collect()
                        })
                        .unwrap_or_default();
                    list.push((tag.to_string(), vars));
                }
            }
            result.insert(cid.clone(), list);
        }
    }

    Ok((pkid, result))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::{Package, PackageKind};
    use crate::compose::{Component, ComponentKind};
    use std::sync::Arc;

    struct TestPkg;

    impl Package for TestPkg {
        fn name(&self) -> String {
            "testpkg".to_string()
        }
        fn version(&self) -> String {
            "1.0".to_string()
        }
        fn arch(&self) -> String {
            "amd64".to_string()
        }
        fn kind(&self) -> PackageKind {
            PackageKind::Physical
        }
        fn contents(&self) -> anyhow::Result<Vec<String>> {
            Ok(Vec::new())
        }
        fn file_data(&self, path: &str) -> anyhow::Result<Vec<u8>> {
            anyhow::bail!("no such file: {path}")
        }
        fn finish(&self) {}
    }

    #[test]
    fn hints_json_roundtrip() {
        let mut gres = GeneratorResult::empty_for(Arc::new(TestPkg));
        gres.compose_result_mut()
            .add_component(Component::new("org.example.App", ComponentKind::Generic));
        gres.add_hint("org.example.App", "icon-scaled-up", [("icon_name", "app.png")]);
        gres.add_hint_msg("", "internal-error", "something odd");

        let json = gres.hints_to_json();
        let (pkid, hints) = parse_hints_json(&json).expect("parse");
        assert_eq!(pkid, "testpkg/1.0/amd64");

        let app_hints = hints.get("org.example.App").expect("app hints");
        assert_eq!(app_hints.len(), 1);
        assert_eq!(app_hints[0].0, "icon-scaled-up");
        assert_eq!(app_hints[0].1.get("icon_name").map(String::as_str), Some("app.png"));

        let general = hints.get("general").expect("general hints");
        assert_eq!(general[0].0, "internal-error");
    }

    #[test]
    fn empty_hints_serialize_to_empty_string() {
        let gres = GeneratorResult::empty_for(Arc::new(TestPkg));
        assert!(gres.hints_to_json().is_empty());
    }
}
