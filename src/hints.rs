//! The hint-tag registry.
//!
//! Hints are tagged diagnostics attached to components (or the pseudo
//! component `"general"`) while a package is processed. Every tag carries a
//! severity and an explanation template; the registry ships embedded in the
//! binary and is loaded once on first use.

use std::collections::HashMap;
use std::sync::OnceLock;

use serde::Deserialize;
use tracing::error;

/// Embedded hint definitions.
const HINTS_REGISTRY_JSON: &str = include_str!("../data/asgen-hints.json");

/// Severity of a hint tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// Nitpicks, hidden from the reports.
    Pedantic,
    /// Informational notes.
    Info,
    /// Problems that do not prevent metadata from being published.
    Warning,
    /// Problems that invalidate the component.
    Error,
}

impl Severity {
    /// Parse a severity name.
    #[must_use]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pedantic" => Some(Self::Pedantic),
            "info" => Some(Self::Info),
            "warning" => Some(Self::Warning),
            "error" => Some(Self::Error),
            _ => None,
        }
    }

    /// The lowercase severity name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pedantic => "pedantic",
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

/// One registered hint tag.
#[derive(Clone, Debug)]
pub struct HintDefinition {
    /// The tag name.
    pub tag: String,
    /// How severe an occurrence of this tag is.
    pub severity: Severity,
    /// Explanation template with `{var}` placeholders.
    pub explanation: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawText {
    Single(String),
    Lines(Vec<String>),
}

#[derive(Deserialize)]
struct RawHintDef {
    text: RawText,
    severity: String,
}

fn registry() -> &'static HashMap<String, HintDefinition> {
    static REGISTRY: OnceLock<HashMap<String, HintDefinition>> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        let raw: HashMap<String, RawHintDef> = match serde_json::from_str(HINTS_REGISTRY_JSON) {
            Ok(v) => v,
            Err(e) => {
                // the registry is embedded, so this only fires on a build defect
                error!(error = %e, "failed to parse embedded hints registry");
                HashMap::new()
            }
        };

        raw.into_iter()
            .filter_map(|(tag, def)| {
                let severity = Severity::from_str(&def.severity)?;
                let explanation = match def.text {
                    RawText::Single(s) => s,
                    RawText::Lines(lines) => lines.join("\n"),
                };
                Some((
                    tag.clone(),
                    HintDefinition {
                        tag,
                        severity,
                        explanation,
                    },
                ))
            })
            .collect()
    })
}

/// Look up the definition of a hint tag.
#[must_use]
pub fn hint_definition(tag: &str) -> Option<&'static HintDefinition> {
    registry().get(tag)
}

/// The severity of a tag; unknown tags count as errors so problems never
/// disappear silently.
#[must_use]
pub fn tag_severity(tag: &str) -> Severity {
    hint_definition(tag).map_or(Severity::Error, |def| def.severity)
}

/// Whether a tag exists in the registry.
#[must_use]
pub fn tag_is_known(tag: &str) -> bool {
    registry().contains_key(tag)
}

/// What: Render the explanation of a hint with its variables substituted.
///
/// Inputs:
/// - `tag`: Hint tag
/// - `vars`: Variable map collected when the hint was added
///
/// Output:
/// - Explanation text; unknown tags fall back to the
///   `internal-unknown-tag` explanation
pub fn format_explanation(tag: &str, vars: &HashMap<String, String>) -> String {
    let Some(def) = hint_definition(tag) else {
        return hint_definition("internal-unknown-tag")
            .map(|d| d.explanation.clone())
            .unwrap_or_else(|| format!("Unknown hint tag '{tag}'."));
    };

    let mut text = def.explanation.clone();
    for (key, value) in vars {
        text = text.replace(&format!("{{{key}}}"), value);
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_contains_core_tags() {
        for tag in [
            "internal-error",
            "icon-not-found",
            "metainfo-duplicate-id",
            "no-install-candidate",
            "description-from-package",
        ] {
            assert!(tag_is_known(tag), "tag {tag} missing from registry");
        }
    }

    #[test]
    fn severities_match_expectations() {
        assert_eq!(tag_severity("icon-not-found"), Severity::Error);
        assert_eq!(tag_severity("icon-scaled-up"), Severity::Warning);
        assert_eq!(tag_severity("description-from-package"), Severity::Info);
        // unknown tags must never drop below error
        assert_eq!(tag_severity("not-a-real-tag"), Severity::Error);
    }

    #[test]
    fn explanation_substitutes_variables() {
        let mut vars = HashMap::new();
        vars.insert("icon_fname".to_string(), "app.tiff".to_string());
        let text = format_explanation("icon-format-unsupported", &vars);
        assert!(text.contains("app.tiff"));
        assert!(!text.contains("{icon_fname}"));
    }
}
