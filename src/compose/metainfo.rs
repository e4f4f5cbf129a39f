//! MetaInfo XML parsing.
//!
//! Reads upstream metainfo files into [`Component`] values. The parser is
//! tolerant: unknown elements are skipped, localized values with invalid
//! test locales are dropped, and the description markup is preserved as-is
//! per locale.

use std::collections::BTreeMap;

use anyhow::{Context, Result, bail};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use super::component::{Component, ComponentKind, Icon, Release, ScrImage, ScrVideo, Screenshot};
use crate::utils::escape_xml;

fn attr_value(e: &BytesStart<'_>, name: &str) -> Option<String> {
    for attr in e.attributes().flatten() {
        if attr.key.as_ref() == name.as_bytes() {
            return attr.unescape_value().ok().map(|v| v.into_owned());
        }
    }
    None
}

fn attr_lang(e: &BytesStart<'_>) -> Option<String> {
    attr_value(e, "xml:lang")
}

fn attr_u32(e: &BytesStart<'_>, name: &str) -> Option<u32> {
    attr_value(e, name).and_then(|v| v.parse().ok())
}

/// Read the text content of the current element, consuming events up to and
/// including its end tag. Nested markup is flattened to text.
fn read_text(reader: &mut Reader<&[u8]>, end: &[u8]) -> Result<String> {
    let mut out = String::new();
    loop {
        match reader.read_event()? {
            Event::Text(t) => out.push_str(&t.unescape()?),
            Event::CData(c) => out.push_str(&String::from_utf8_lossy(&c.into_inner())),
            Event::End(e) if e.name().as_ref() == end => break,
            Event::Eof => bail!("unexpected end of document while reading element text"),
            _ => {}
        }
    }
    Ok(out.trim().to_string())
}

/// Skip everything up to the end tag of the current element.
fn skip_element(reader: &mut Reader<&[u8]>, end: &[u8]) -> Result<()> {
    let mut depth = 0u32;
    loop {
        match reader.read_event()? {
            Event::Start(e) if e.name().as_ref() == end => depth += 1,
            Event::End(e) if e.name().as_ref() == end => {
                if depth == 0 {
                    return Ok(());
                }
                depth -= 1;
            }
            Event::Eof => bail!("unexpected end of document while skipping element"),
            _ => {}
        }
    }
}

/// Parse the `<description>` block, appending per-locale markup strings.
fn read_description(
    reader: &mut Reader<&[u8]>,
    descriptions: &mut BTreeMap<String, String>,
) -> Result<()> {
    let mut list_items: BTreeMap<String, Vec<String>> = BTreeMap::new();

    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.name().as_ref() {
                b"p" => {
                    let locale = attr_lang(&e).unwrap_or_else(|| "C".to_string());
                    let text = read_text(reader, b"p")?;
                    if super::locale_valid(&locale) {
                        descriptions
                            .entry(locale)
                            .or_default()
                            .push_str(&format!("<p>{}</p>", escape_xml(&text)));
                    }
                }
                b"ul" | b"ol" => {
                    let tag = if e.name().as_ref() == b"ul" { "ul" } else { "ol" };
                    list_items.clear();
                    loop {
                        match reader.read_event()? {
                            Event::Start(item) if item.name().as_ref() == b"li" => {
                                let locale = attr_lang(&item).unwrap_or_else(|| "C".to_string());
                                let text = read_text(reader, b"li")?;
                                if super::locale_valid(&locale) {
                                    list_items.entry(locale).or_default().push(text);
                                }
                            }
                            Event::End(end) if end.name().as_ref() == tag.as_bytes() => break,
                            Event::Eof => bail!("unexpected end of document in description list"),
                            _ => {}
                        }
                    }
                    for (locale, items) in &list_items {
                        let markup: String = items
                            .iter()
                            .map(|i| format!("<li>{}</li>", escape_xml(i)))
                            .collect();
                        descriptions
                            .entry(locale.clone())
                            .or_default()
                            .push_str(&format!("<{tag}>{markup}</{tag}>"));
                    }
                }
                other => {
                    let name = other.to_vec();
                    skip_element(reader, &name)?;
                }
            },
            Event::End(e) if e.name().as_ref() == b"description" => break,
            Event::Eof => bail!("unexpected end of document in description"),
            _ => {}
        }
    }
    Ok(())
}

fn read_screenshot(reader: &mut Reader<&[u8]>, start: &BytesStart<'_>) -> Result<Screenshot> {
    let mut scr = Screenshot {
        default: attr_value(start, "type").as_deref() == Some("default"),
        ..Screenshot::default()
    };

    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.name().as_ref() {
                b"caption" => {
                    let locale = attr_lang(&e).unwrap_or_else(|| "C".to_string());
                    let text = read_text(reader, b"caption")?;
                    if super::locale_valid(&locale) {
                        scr.captions.insert(locale, text);
                    }
                }
                b"image" => {
                    let kind = attr_value(&e, "type").unwrap_or_else(|| "source".to_string());
                    let width = attr_u32(&e, "width");
                    let height = attr_u32(&e, "height");
                    let url = read_text(reader, b"image")?;
                    scr.images.push(ScrImage {
                        kind,
                        url,
                        width,
                        height,
                    });
                }
                b"video" => {
                    let container = attr_value(&e, "container");
                    let codec = attr_value(&e, "codec");
                    let url = read_text(reader, b"video")?;
                    scr.videos.push(ScrVideo {
                        url,
                        container,
                        codec,
                    });
                }
                other => {
                    let name = other.to_vec();
                    skip_element(reader, &name)?;
                }
            },
            Event::End(e) if e.name().as_ref() == b"screenshot" => break,
            Event::Eof => bail!("unexpected end of document in screenshot"),
            _ => {}
        }
    }
    Ok(scr)
}

/// Map a `<provides>` child element to its catalog collection name.
fn provides_collection(tag: &[u8]) -> Option<&'static str> {
    match tag {
        b"binary" => Some("binaries"),
        b"library" => Some("libraries"),
        b"mediatype" => Some("mediatypes"),
        b"font" => Some("fonts"),
        b"modalias" => Some("modaliases"),
        b"firmware" => Some("firmware"),
        b"dbus" => Some("dbus"),
        b"python3" => Some("python3"),
        b"id" => Some("ids"),
        _ => None,
    }
}

/// What: Parse a metainfo XML document into a component.
///
/// Inputs:
/// - `data`: Raw file bytes
///
/// Output:
/// - The parsed [`Component`]; its `id` may be empty when the file does
///   not declare one (callers hint on that)
///
/// Details:
/// - Both `<component>` and the legacy `<application>` root are accepted.
/// - Unknown child elements are skipped without error.
pub fn parse_metainfo(data: &[u8]) -> Result<Component> {
    let text = String::from_utf8_lossy(data).into_owned();
    let mut reader = Reader::from_str(&text);
    reader.config_mut().trim_text(true);

    let mut cpt = Component::default();
    let mut root_seen = false;

    loop {
        match reader.read_event().context("XML parse failure")? {
            Event::Start(e) if !root_seen => {
                match e.name().as_ref() {
                    b"component" => {
                        if let Some(kind_str) = attr_value(&e, "type") {
                            cpt.kind = ComponentKind::from_str(&kind_str);
                            if cpt.kind == ComponentKind::Unknown {
                                bail!("unknown component type '{kind_str}'");
                            }
                        } else {
                            cpt.kind = ComponentKind::Generic;
                        }
                    }
                    b"application" => cpt.kind = ComponentKind::DesktopApplication,
                    other => {
                        bail!(
                            "unexpected root element '{}'",
                            String::from_utf8_lossy(other)
                        );
                    }
                }
                root_seen = true;
            }
            Event::Start(e) => {
                let name = e.name().as_ref().to_vec();
                match name.as_slice() {
                    b"id" => cpt.id = read_text(&mut reader, b"id")?,
                    b"pkgname" => {
                        let pkgname = read_text(&mut reader, b"pkgname")?;
                        if !pkgname.is_empty() {
                            cpt.pkgnames.push(pkgname);
                        }
                    }
                    b"name" => {
                        let locale = attr_lang(&e).unwrap_or_else(|| "C".to_string());
                        let value = read_text(&mut reader, b"name")?;
                        if super::locale_valid(&locale) {
                            cpt.names.insert(locale, value);
                        }
                    }
                    b"summary" => {
                        let locale = attr_lang(&e).unwrap_or_else(|| "C".to_string());
                        let value = read_text(&mut reader, b"summary")?;
                        if super::locale_valid(&locale) {
                            cpt.summaries.insert(locale, value);
                        }
                    }
                    b"description" => read_description(&mut reader, &mut cpt.descriptions)?,
                    b"project_license" => {
                        cpt.project_license = Some(read_text(&mut reader, b"project_license")?);
                    }
                    b"metadata_license" => {
                        cpt.metadata_license = Some(read_text(&mut reader, b"metadata_license")?);
                    }
                    b"developer_name" => {
                        cpt.developer_name = Some(read_text(&mut reader, b"developer_name")?);
                    }
                    b"developer" => {
                        // modern spelling: <developer id="…"><name>…</name></developer>
                        loop {
                            match reader.read_event()? {
                                Event::Start(inner) if inner.name().as_ref() == b"name" => {
                                    cpt.developer_name = Some(read_text(&mut reader, b"name")?);
                                }
                                Event::End(end) if end.name().as_ref() == b"developer" => break,
                                Event::Eof => bail!("unexpected end of document in developer"),
                                _ => {}
                            }
                        }
                    }
                    b"icon" => {
                        let itype = attr_value(&e, "type").unwrap_or_default();
                        let width = attr_u32(&e, "width").unwrap_or(64);
                        let height = attr_u32(&e, "height").unwrap_or(64);
                        let scale = attr_u32(&e, "scale").unwrap_or(1);
                        let value = read_text(&mut reader, b"icon")?;
                        match itype.as_str() {
                            "stock" => cpt.icons.push(Icon::Stock { name: value }),
                            "local" => cpt.icons.push(Icon::Local { path: value }),
                            // cached/remote appear when re-reading catalog data
                            "cached" => cpt.icons.push(Icon::Cached {
                                name: value,
                                width,
                                height,
                                scale,
                            }),
                            "remote" => cpt.icons.push(Icon::Remote {
                                url: value,
                                width,
                                height,
                                scale,
                            }),
                            _ => {
                                if value.starts_with('/') {
                                    cpt.icons.push(Icon::Local { path: value });
                                } else if !value.is_empty() {
                                    cpt.icons.push(Icon::Stock { name: value });
                                }
                            }
                        }
                    }
                    b"url" => {
                        let utype = attr_value(&e, "type").unwrap_or_else(|| "homepage".to_string());
                        let url = read_text(&mut reader, b"url")?;
                        if !url.is_empty() {
                            cpt.urls.entry(utype).or_insert(url);
                        }
                    }
                    b"launchable" => {
                        let ltype =
                            attr_value(&e, "type").unwrap_or_else(|| "desktop-id".to_string());
                        let value = read_text(&mut reader, b"launchable")?;
                        if !value.is_empty() {
                            cpt.launchables.entry(ltype).or_default().push(value);
                        }
                    }
                    b"extends" => {
                        let value = read_text(&mut reader, b"extends")?;
                        if !value.is_empty() {
                            cpt.extends.push(value);
                        }
                    }
                    b"categories" => loop {
                        match reader.read_event()? {
                            Event::Start(inner) if inner.name().as_ref() == b"category" => {
                                let cat = read_text(&mut reader, b"category")?;
                                if !cat.is_empty() && !cpt.categories.contains(&cat) {
                                    cpt.categories.push(cat);
                                }
                            }
                            Event::End(end) if end.name().as_ref() == b"categories" => break,
                            Event::Eof => bail!("unexpected end of document in categories"),
                            _ => {}
                        }
                    },
                    b"keywords" => loop {
                        match reader.read_event()? {
                            Event::Start(inner) if inner.name().as_ref() == b"keyword" => {
                                let locale =
                                    attr_lang(&inner).unwrap_or_else(|| "C".to_string());
                                let word = read_text(&mut reader, b"keyword")?;
                                if !word.is_empty() && super::locale_valid(&locale) {
                                    cpt.keywords.entry(locale).or_default().push(word);
                                }
                            }
                            Event::End(end) if end.name().as_ref() == b"keywords" => break,
                            Event::Eof => bail!("unexpected end of document in keywords"),
                            _ => {}
                        }
                    },
                    b"provides" => loop {
                        match reader.read_event()? {
                            Event::Start(inner) => {
                                let tag = inner.name().as_ref().to_vec();
                                let value = read_text(&mut reader, &tag)?;
                                if let Some(collection) = provides_collection(&tag) {
                                    if !value.is_empty() {
                                        cpt.provides
                                            .entry(collection.to_string())
                                            .or_default()
                                            .push(value);
                                    }
                                }
                            }
                            Event::End(end) if end.name().as_ref() == b"provides" => break,
                            Event::Eof => bail!("unexpected end of document in provides"),
                            _ => {}
                        }
                    },
                    b"screenshots" => loop {
                        match reader.read_event()? {
                            Event::Start(inner) if inner.name().as_ref() == b"screenshot" => {
                                let scr = read_screenshot(&mut reader, &inner)?;
                                cpt.screenshots.push(scr);
                            }
                            Event::End(end) if end.name().as_ref() == b"screenshots" => break,
                            Event::Eof => bail!("unexpected end of document in screenshots"),
                            _ => {}
                        }
                    },
                    b"releases" => loop {
                        match reader.read_event()? {
                            Event::Start(inner) if inner.name().as_ref() == b"release" => {
                                cpt.releases.push(release_from_attrs(&inner));
                                skip_element(&mut reader, b"release")?;
                            }
                            Event::Empty(inner) if inner.name().as_ref() == b"release" => {
                                cpt.releases.push(release_from_attrs(&inner));
                            }
                            Event::End(end) if end.name().as_ref() == b"releases" => break,
                            Event::Eof => bail!("unexpected end of document in releases"),
                            _ => {}
                        }
                    },
                    b"custom" => loop {
                        match reader.read_event()? {
                            Event::Start(inner) if inner.name().as_ref() == b"value" => {
                                let key = attr_value(&inner, "key").unwrap_or_default();
                                let value = read_text(&mut reader, b"value")?;
                                if !key.is_empty() {
                                    cpt.custom.insert(key, value);
                                }
                            }
                            Event::End(end) if end.name().as_ref() == b"custom" => break,
                            Event::Eof => bail!("unexpected end of document in custom"),
                            _ => {}
                        }
                    },
                    b"bundle" => {
                        let btype = attr_value(&e, "type").unwrap_or_else(|| "unknown".to_string());
                        let value = read_text(&mut reader, b"bundle")?;
                        if !value.is_empty() {
                            cpt.bundles.insert(btype, value);
                        }
                    }
                    _ => skip_element(&mut reader, &name)?,
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !root_seen {
        bail!("document has no component root element");
    }
    Ok(cpt)
}

fn release_from_attrs(e: &BytesStart<'_>) -> Release {
    let version = attr_value(e, "version").unwrap_or_default();
    let timestamp = attr_value(e, "timestamp")
        .and_then(|t| t.parse::<i64>().ok())
        .or_else(|| {
            attr_value(e, "date").and_then(|d| {
                chrono::NaiveDate::parse_from_str(&d, "%Y-%m-%d")
                    .ok()
                    .and_then(|nd| nd.and_hms_opt(0, 0, 0))
                    .map(|dt| dt.and_utc().timestamp())
            })
        });
    Release { version, timestamp }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<component type="desktop-application">
  <id>org.example.Calculator</id>
  <metadata_license>FSFAP</metadata_license>
  <project_license>GPL-3.0-or-later</project_license>
  <name>Calculator</name>
  <name xml:lang="de">Taschenrechner</name>
  <summary>Do some math</summary>
  <description>
    <p>A powerful calculator.</p>
    <p xml:lang="de">Ein mächtiger Taschenrechner.</p>
    <ul>
      <li>fast</li>
      <li>correct</li>
    </ul>
  </description>
  <icon type="stock">accessories-calculator</icon>
  <launchable type="desktop-id">org.example.Calculator.desktop</launchable>
  <url type="homepage">https://example.org/calc</url>
  <categories>
    <category>Utility</category>
  </categories>
  <provides>
    <binary>calculator</binary>
  </provides>
  <releases>
    <release version="2.0" date="2023-04-01"/>
    <release version="1.0" timestamp="1600000000"/>
  </releases>
  <custom>
    <value key="Purism::form_factor">workstation</value>
  </custom>
</component>
"#;

    #[test]
    fn parses_full_component() {
        let cpt = parse_metainfo(SAMPLE.as_bytes()).expect("parse");
        assert_eq!(cpt.id, "org.example.Calculator");
        assert_eq!(cpt.kind, ComponentKind::DesktopApplication);
        assert_eq!(cpt.name(), Some("Calculator"));
        assert_eq!(cpt.names.get("de").map(String::as_str), Some("Taschenrechner"));
        assert_eq!(cpt.project_license.as_deref(), Some("GPL-3.0-or-later"));
        assert!(matches!(cpt.raw_icon(), Some(Icon::Stock { name }) if name == "accessories-calculator"));
        assert_eq!(cpt.urls.get("homepage").map(String::as_str), Some("https://example.org/calc"));
        assert_eq!(cpt.categories, vec!["Utility".to_string()]);
        assert_eq!(cpt.provides.get("binaries"), Some(&vec!["calculator".to_string()]));
        assert_eq!(cpt.releases.len(), 2);
        assert_eq!(cpt.releases[1].timestamp, Some(1_600_000_000));
        assert_eq!(
            cpt.custom.get("Purism::form_factor").map(String::as_str),
            Some("workstation")
        );
    }

    #[test]
    fn description_markup_is_localized() {
        let cpt = parse_metainfo(SAMPLE.as_bytes()).expect("parse");
        let c_desc = cpt.description().expect("C description");
        assert!(c_desc.contains("<p>A powerful calculator.</p>"));
        assert!(c_desc.contains("<ul><li>fast</li><li>correct</li></ul>"));
        let de_desc = cpt.descriptions.get("de").expect("de description");
        assert!(de_desc.contains("Taschenrechner"));
        assert!(!de_desc.contains("powerful"));
    }

    #[test]
    fn rejects_unknown_type_and_bad_root() {
        assert!(parse_metainfo(b"<component type=\"starship\"><id>x</id></component>").is_err());
        assert!(parse_metainfo(b"<html><body/></html>").is_err());
        assert!(parse_metainfo(b"not xml at all").is_err());
    }

    #[test]
    fn component_without_id_parses_with_empty_id() {
        let cpt = parse_metainfo(b"<component><name>X</name></component>").expect("parse");
        assert!(cpt.id.is_empty());
        assert_eq!(cpt.kind, ComponentKind::Generic);
    }
}
