//! Per-package metadata extraction.
//!
//! The extractor wraps the compose pipeline for one package: it feeds the
//! package in as a unit, short-circuits components whose metadata is
//! already stored, runs icon processing, injects packaging descriptions
//! where metainfo lacks them, synthesizes codec components from GStreamer
//! data, applies repo-owner modifications and performs the final checks.

use std::collections::BTreeMap;

use anyhow::{Context, Result};

use crate::backends::{EXTRA_METAINFO_FAKE_PKGNAME, Package, PackageKind, PackageRef};
use crate::compose::desktop::DesktopEntry;
use crate::compose::{
    Component, ComponentKind, ComposeFlags, ComposeResult, ComposeSettings, MergeKind, Unit,
    finalize_result, process_unit,
};
use crate::config::{Config, DataType};
use crate::cptmodifiers::InjectedModifications;
use crate::datastore::DataStore;
use crate::iconhandler::IconHandler;
use crate::result::GeneratorResult;

/// A package presented as a compose unit.
struct PackageUnit {
    pkg: PackageRef,
}

impl Unit for PackageUnit {
    fn bundle_id(&self) -> String {
        self.pkg.name()
    }
    fn contents(&self) -> Result<Vec<String>> {
        self.pkg.contents()
    }
    fn read_data(&self, path: &str) -> Result<Vec<u8>> {
        self.pkg.file_data(path)
    }
}

/// Check whether stored metadata references the given package name.
fn metadata_references_package(existing: &str, dtype: DataType, pkgname: &str) -> bool {
    match dtype {
        DataType::Yaml => {
            let marker = format!("Package: {pkgname}");
            existing
                .split('\n')
                .any(|line| line.trim_end() == marker)
        }
        DataType::Xml => existing.contains(&format!("<pkgname>{pkgname}</pkgname>")),
    }
}

/// Pull the first package name out of stored metadata, for the
/// duplicate-id report.
fn pkgname_from_metadata(existing: &str, dtype: DataType) -> String {
    match dtype {
        DataType::Yaml => existing
            .split('\n')
            .find_map(|line| line.strip_prefix("Package: "))
            .map(str::trim)
            .map(str::to_string),
        DataType::Xml => existing.split("<pkgname>").nth(1).and_then(|rest| {
            rest.split("</pkgname>").next().map(str::to_string)
        }),
    }
    .unwrap_or_else(|| "(none)".to_string())
}

/// Drives the compose pipeline for individual packages.
pub struct DataExtractor<'a> {
    conf: &'a Config,
    dstore: &'a DataStore,
    iconh: &'a IconHandler,
    mod_inj: Option<&'a InjectedModifications>,
    dtype: DataType,
    settings: ComposeSettings,
}

impl<'a> DataExtractor<'a> {
    /// Create an extractor bound to this run's stores and configuration.
    #[must_use]
    pub fn new(
        conf: &'a Config,
        dstore: &'a DataStore,
        iconh: &'a IconHandler,
        mod_inj: Option<&'a InjectedModifications>,
    ) -> Self {
        let settings = ComposeSettings {
            flags: ComposeFlags {
                validate: conf.feature.validate,
                process_desktop: conf.feature.process_desktop,
                process_locale: conf.feature.process_locale,
                process_fonts: conf.feature.process_fonts,
                store_screenshots: conf.feature.store_screenshots,
                allow_screencasts: conf.feature.screenshot_videos,
                allow_net: !conf.feature.no_downloads,
                propagate_custom: !conf.allowed_custom_keys.is_empty(),
            },
            media_result_dir: dstore.media_export_pool_dir().to_path_buf(),
            allowed_custom_keys: conf.allowed_custom_keys.clone(),
            max_screenshot_bytes: (conf.max_scr_file_size > 0)
                .then(|| conf.max_scr_file_size.unsigned_abs() * 1024 * 1024),
        };

        Self {
            conf,
            dstore,
            iconh,
            mod_inj,
            dtype: conf.metadata_type,
            settings,
        }
    }

    /// Drop components whose metadata is already stored, keeping their
    /// gcid registration; flag components whose stored metadata belongs
    /// to a different package.
    fn check_metadata_intermediate(&self, res: &mut ComposeResult) {
        let bundle_id = res.bundle_id.clone();

        let snapshot: Vec<(String, ComponentKind)> = res
            .components()
            .iter()
            .map(|c| (c.id.clone(), c.kind))
            .collect();

        for (cid, ckind) in snapshot {
            let Some(gcid) = res.gcid_for_cid(&cid).map(str::to_string) else {
                continue;
            };
            let existing = match self.dstore.get_metadata(self.dtype, &gcid) {
                Ok(Some(data)) if !data.is_empty() => data,
                _ => continue,
            };

            if bundle_id == EXTRA_METAINFO_FAKE_PKGNAME {
                // injected data is reprocessed unconditionally; the fake
                // package never participates in same-package checks
                continue;
            }

            // packages get renamed; when the stored metadata references a
            // different package we must not silently link it to this one
            let same_pkg = metadata_references_package(&existing, self.dtype, &bundle_id);
            if !same_pkg && ckind != ComponentKind::WebApplication {
                let other_pkg = pkgname_from_metadata(&existing, self.dtype);
                res.add_hint(
                    &cid,
                    "metainfo-duplicate-id",
                    [("cid", cid.as_str()), ("pkgname", other_pkg.as_str())],
                );
            }

            // the expensive parts already ran for this gcid in an earlier
            // run; keep the reference and drop the component
            res.remove_component_keep_gcid(&cid);
        }
    }

    /// What: Extract metadata from one package.
    ///
    /// Inputs:
    /// - `pkg`: The package to process
    ///
    /// Output:
    /// - The complete [`GeneratorResult`]; per-component problems are
    ///   hints, only unit-level failures become errors
    pub fn process_package(&self, pkg: &PackageRef) -> Result<GeneratorResult> {
        let unit = PackageUnit {
            pkg: PackageRef::clone(pkg),
        };

        let translate_fn;
        let translate: Option<&crate::compose::desktop::TranslateFn<'_>> =
            if pkg.has_desktop_file_translations() {
                let pkg_for_l10n = PackageRef::clone(pkg);
                translate_fn = move |entry: &DesktopEntry, text: &str| -> BTreeMap<String, String> {
                    pkg_for_l10n.desktop_file_translations(entry, text)
                };
                Some(&translate_fn)
            } else {
                None
            };

        let mut early_check = |res: &mut ComposeResult| self.check_metadata_intermediate(res);

        let res = process_unit(&unit, &self.settings, translate, Some(&mut early_check))
            .with_context(|| format!("failed to run compose process for {}", pkg.id()))?;
        let mut gres = GeneratorResult::new(res, PackageRef::clone(pkg));

        // icon processing and description fallbacks
        let mut cpts = gres.take_components();
        for cpt in &mut cpts {
            self.iconh.process(&mut gres, cpt);
            if gres.is_ignored(&cpt.id) {
                continue;
            }

            if cpt.merge_kind != MergeKind::None {
                continue;
            }
            if !matches!(
                cpt.kind,
                ComponentKind::DesktopApplication
                    | ComponentKind::ConsoleApplication
                    | ComponentKind::WebApplication
            ) {
                continue;
            }
            if cpt.description().is_some_and(|d| !d.is_empty()) {
                continue;
            }

            // no long description in the metadata; use the packaging one
            let pkg_descriptions = pkg.description();
            if pkg_descriptions.is_empty() {
                gres.add_hint(&cpt.id, "description-missing", [("kind", cpt.kind.as_str())]);
                continue;
            }
            for (locale, desc) in pkg_descriptions {
                cpt.descriptions.insert(locale, desc);
            }
            // a no-metainfo hint already explains the same situation
            if !gres.has_hint(&cpt.id, "no-metainfo") {
                gres.add_hint(
                    &cpt.id,
                    "description-from-package",
                    std::iter::empty::<(String, String)>(),
                );
            }
        }
        gres.set_components(cpts);

        // synthesize a codec component from GStreamer capability metadata
        if self.conf.feature.process_gstreamer
            && let Some(gst) = pkg.gst()
            && gst.is_not_empty()
        {
            let mut cpt = Component::new(&pkg.name(), ComponentKind::Codec);
            cpt.names
                .insert("C".to_string(), "GStreamer Multimedia Codecs".to_string());
            cpt.pkgnames.push(pkg.name());

            let mut digest = String::new();
            for (locale, summary) in pkg.summary() {
                digest.push_str(&summary);
                cpt.summaries.insert(locale, summary);
            }
            gres.add_component_with_string(cpt, &digest);
        }

        finalize_result(gres.compose_result_mut());

        // repo-owner modifications and installability checks
        let mut cpts = gres.take_components();
        let mut removed_cids: Vec<String> = Vec::new();
        for cpt in &mut cpts {
            if let Some(mods) = self.mod_inj {
                if mods.is_component_removed(&cpt.id) {
                    removed_cids.push(cpt.id.clone());
                    continue;
                }
                if let Some(injected) = mods.injected_custom_data(&cpt.id) {
                    for (key, value) in injected {
                        cpt.custom.insert(key, value);
                    }
                }
            }

            if cpt.merge_kind != MergeKind::None {
                continue;
            }

            if cpt.pkgnames.is_empty() {
                let installable_anyway = matches!(
                    cpt.kind,
                    ComponentKind::WebApplication
                        | ComponentKind::OperatingSystem
                        | ComponentKind::Repository
                );
                if !installable_anyway && !cpt.has_bundle() {
                    gres.add_hint(
                        &cpt.id,
                        "no-install-candidate",
                        std::iter::empty::<(String, String)>(),
                    );
                }
            } else if pkg.kind() == PackageKind::Fake {
                // injected metainfo must never advertise the fake package
                cpt.pkgnames.retain(|name| name != EXTRA_METAINFO_FAKE_PKGNAME);
            }
        }
        cpts.retain(|c| !removed_cids.contains(&c.id));
        gres.set_components(cpts);
        for cid in removed_cids {
            gres.remove_component(&cid);
        }

        pkg.finish();
        Ok(gres)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_package_reference_checks() {
        let yaml = "Type: desktop-application\nID: org.example.App\nPackage: example-app\nName:\n  C: Example";
        assert!(metadata_references_package(yaml, DataType::Yaml, "example-app"));
        assert!(!metadata_references_package(yaml, DataType::Yaml, "other-app"));
        assert_eq!(pkgname_from_metadata(yaml, DataType::Yaml), "example-app");

        let xml = "<component type=\"desktop-application\">\n  <id>org.example.App</id>\n  <pkgname>example-app</pkgname>\n</component>";
        assert!(metadata_references_package(xml, DataType::Xml, "example-app"));
        assert!(!metadata_references_package(xml, DataType::Xml, "other-app"));
        assert_eq!(pkgname_from_metadata(xml, DataType::Xml), "example-app");

        assert_eq!(pkgname_from_metadata("Type: generic", DataType::Yaml), "(none)");
    }
}
