//! RFC-822-style "tag file" parsing (Debian `Packages`, `control`,
//! `Translation-*` files).

use std::collections::HashMap;

/// One paragraph of a tag file: a map of field name to value.
#[derive(Clone, Debug, Default)]
pub struct TagSection {
    fields: HashMap<String, String>,
}

impl TagSection {
    /// Get a field value.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    /// Get a field value, or an empty string when missing.
    #[must_use]
    pub fn field_or_empty(&self, name: &str) -> &str {
        self.field(name).unwrap_or("")
    }

    /// Whether a field exists.
    #[must_use]
    pub fn has_field(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Whether the paragraph holds no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// A parsed tag file: a sequence of paragraphs separated by blank lines.
#[derive(Clone, Debug, Default)]
pub struct TagFile {
    sections: Vec<TagSection>,
}

impl TagFile {
    /// What: Parse tag-file data into its paragraphs.
    ///
    /// Inputs:
    /// - `data`: File contents
    ///
    /// Details:
    /// - Continuation lines start with a space and append to the previous
    ///   field with a newline; a lone ` .` continuation marks an empty
    ///   line inside the value.
    /// - Lines without a `:` separator outside of continuations are
    ///   skipped.
    #[must_use]
    pub fn parse(data: &str) -> Self {
        let mut sections = Vec::new();
        let mut current = TagSection::default();
        let mut last_field: Option<String> = None;

        for line in data.lines() {
            if line.is_empty() {
                if !current.is_empty() {
                    sections.push(std::mem::take(&mut current));
                }
                last_field = None;
                continue;
            }

            if let Some(rest) = line.strip_prefix(' ') {
                if let Some(field) = &last_field
                    && let Some(value) = current.fields.get_mut(field)
                {
                    if rest == "." {
                        value.push('\n');
                    } else {
                        value.push('\n');
                        value.push_str(rest);
                    }
                }
                continue;
            }

            let Some((name, value)) = line.split_once(':') else {
                continue;
            };
            if name.is_empty() {
                continue;
            }
            current
                .fields
                .insert(name.to_string(), value.trim().to_string());
            last_field = Some(name.to_string());
        }
        if !current.is_empty() {
            sections.push(current);
        }

        Self { sections }
    }

    /// Iterate over all paragraphs.
    pub fn sections(&self) -> impl Iterator<Item = &TagSection> {
        self.sections.iter()
    }

    /// The first paragraph, when present.
    #[must_use]
    pub fn first_section(&self) -> Option<&TagSection> {
        self.sections.first()
    }

    /// Number of paragraphs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sections.len()
    }

    /// Whether the file had no paragraphs.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
Package: vim
Version: 2:9.0.1000-1
Architecture: amd64
Maintainer: Debian Vim Maintainers <team+vim@tracker.debian.org>
Description: Vi IMproved - enhanced vi editor
 Vim is an almost compatible version of the UNIX editor Vi.
 .
 Many new features have been added.

Package: nano
Version: 7.2-1
Architecture: amd64
Description: small, friendly text editor
";

    #[test]
    fn parses_paragraphs_and_continuations() {
        let tagf = TagFile::parse(SAMPLE);
        assert_eq!(tagf.len(), 2);

        let vim = tagf.first_section().expect("first section");
        assert_eq!(vim.field("Package"), Some("vim"));
        assert_eq!(vim.field("Version"), Some("2:9.0.1000-1"));

        let desc = vim.field("Description").expect("description");
        let lines: Vec<&str> = desc.split('\n').collect();
        assert_eq!(lines[0], "Vi IMproved - enhanced vi editor");
        assert_eq!(lines[1], "Vim is an almost compatible version of the UNIX editor Vi.");
        // the lone dot marks an empty line
        assert_eq!(lines[2], "");
        assert_eq!(lines[3], "Many new features have been added.");

        let nano = tagf.sections().nth(1).expect("second section");
        assert_eq!(nano.field("Package"), Some("nano"));
        assert!(!nano.has_field("Maintainer"));
    }

    #[test]
    fn empty_input_has_no_sections() {
        assert!(TagFile::parse("").is_empty());
        assert!(TagFile::parse("\n\n\n").is_empty());
    }
}
