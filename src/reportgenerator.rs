//! HTML report and statistics generation.
//!
//! Reads hints and metadata from the data store, groups them per package
//! and maintainer, renders the static HTML report site and appends one
//! statistics record per `(suite, section)` to the data store. Templates
//! are embedded; a `templates/` directory in the workspace overrides them.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::PathBuf;
use std::sync::OnceLock;

use anyhow::{Context, Result};
use minijinja::{Environment, context};
use serde::Serialize;
use tracing::{debug, error, info};

use crate::backends::{Package, PackageRef};
use crate::compose::{ComponentKind, Icon};
use crate::config::{Config, DataType};
use crate::datastore::{DataStore, DataValue};
use crate::hints::{Severity, format_explanation, tag_is_known, tag_severity};
use crate::result::parse_hints_json;

const TPL_MAIN: &str = include_str!("../templates/default/main.html");
const TPL_SECTIONS_INDEX: &str = include_str!("../templates/default/sections_index.html");
const TPL_SECTION_PAGE: &str = include_str!("../templates/default/section_page.html");
const TPL_ISSUES_INDEX: &str = include_str!("../templates/default/issues_index.html");
const TPL_ISSUES_PAGE: &str = include_str!("../templates/default/issues_page.html");
const TPL_METAINFO_INDEX: &str = include_str!("../templates/default/metainfo_index.html");
const TPL_METAINFO_PAGE: &str = include_str!("../templates/default/metainfo_page.html");

#[derive(Clone, Debug, Default, Serialize)]
struct HintTag {
    tag: String,
    message: String,
}

#[derive(Clone, Debug, Default)]
struct HintEntry {
    archs: Vec<String>,
    errors: Vec<HintTag>,
    warnings: Vec<HintTag>,
    infos: Vec<HintTag>,
}

#[derive(Clone, Debug, Default)]
struct MetadataEntry {
    identifier: String,
    data: String,
    kind: ComponentKind,
    icon_name: Option<String>,
    archs: Vec<String>,
}

#[derive(Clone, Debug, Default)]
struct PkgSummary {
    pkgname: String,
    cpts: Vec<String>,
    info_count: u64,
    warning_count: u64,
    error_count: u64,
}

#[derive(Default)]
struct DataSummary {
    /// maintainer → package name → summary
    pkg_summaries: BTreeMap<String, BTreeMap<String, PkgSummary>>,
    /// package name → component id → hints
    hint_entries: BTreeMap<String, BTreeMap<String, HintEntry>>,
    /// package name → version → gcid → metadata
    mdata_entries: BTreeMap<String, BTreeMap<String, BTreeMap<String, MetadataEntry>>>,
    total_metadata: u64,
    total_infos: u64,
    total_warnings: u64,
    total_errors: u64,
}

/// Characters stripped from maintainer names to form page anchors.
fn maintainer_anchor_re() -> &'static regex::Regex {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| {
        regex::Regex::new(r#"[àáèéëêòöøîìùñ~/\\(" ']"#)
            .unwrap_or_else(|e| panic!("invalid maintainer anchor regex: {e}"))
    })
}

/// Extract component kind and cached icon name from stored metadata.
fn metadata_entry_details(data: &str, dtype: DataType) -> (ComponentKind, Option<String>) {
    match dtype {
        DataType::Xml => match crate::compose::metainfo::parse_metainfo(data.as_bytes()) {
            Ok(cpt) => {
                let icon = cpt.icons.iter().find_map(|icon| match icon {
                    Icon::Cached { name, .. } => Some(name.clone()),
                    _ => None,
                });
                (cpt.kind, icon)
            }
            Err(_) => (ComponentKind::Unknown, None),
        },
        DataType::Yaml => {
            let Ok(value) = serde_norway::from_str::<serde_norway::Value>(data) else {
                return (ComponentKind::Unknown, None);
            };
            let kind = value
                .get("Type")
                .and_then(|v| v.as_str())
                .map_or(ComponentKind::Unknown, ComponentKind::from_str);
            let icon = value
                .get("Icon")
                .and_then(|icons| icons.get("cached"))
                .and_then(|cached| cached.get(0))
                .and_then(|entry| entry.get("name"))
                .and_then(|name| name.as_str())
                .map(str::to_string);
            (kind, icon)
        }
    }
}

/// Renders the HTML report pages and statistics exports.
pub struct ReportGenerator<'a> {
    conf: &'a Config,
    dstore: &'a DataStore,
    html_export_dir: PathBuf,
    media_pool_url: String,
    version_info: String,
}

impl<'a> ReportGenerator<'a> {
    /// Create a report generator bound to the data store.
    #[must_use]
    pub fn new(conf: &'a Config, dstore: &'a DataStore) -> Self {
        Self {
            conf,
            dstore,
            html_export_dir: conf.html_export_dir().to_path_buf(),
            media_pool_url: format!("{}/pool", conf.media_base_url),
            version_info: format!("asgen {}", env!("CARGO_PKG_VERSION")),
        }
    }

    fn environment(&self) -> Environment<'static> {
        let mut env = Environment::new();
        if let Some(template_dir) = self.conf.template_dir() {
            env.set_loader(minijinja::path_loader(template_dir));
        } else {
            // embedded defaults; failures here are build defects
            let pairs = [
                ("main.html", TPL_MAIN),
                ("sections_index.html", TPL_SECTIONS_INDEX),
                ("section_page.html", TPL_SECTION_PAGE),
                ("issues_index.html", TPL_ISSUES_INDEX),
                ("issues_page.html", TPL_ISSUES_PAGE),
                ("metainfo_index.html", TPL_METAINFO_INDEX),
                ("metainfo_page.html", TPL_METAINFO_PAGE),
            ];
            for (name, source) in pairs {
                if let Err(e) = env.add_template(name, source) {
                    error!(template = name, error = %e, "unable to register template");
                }
            }
        }
        env
    }

    fn render_page(&self, page_id: &str, export_name: &str, ctx: minijinja::Value) {
        let env = self.environment();
        let fname = self.html_export_dir.join(format!("{export_name}.html"));
        if let Some(parent) = fname.parent()
            && let Err(e) = fs::create_dir_all(parent)
        {
            error!(dir = %parent.display(), error = %e, "unable to create report directory");
            return;
        }

        debug!(page = export_name, "rendering HTML page");
        let template = match env.get_template(&format!("{page_id}.html")) {
            Ok(t) => t,
            Err(e) => {
                error!(template = page_id, error = %e, "template not found");
                return;
            }
        };

        let base_ctx = context! {
            time => chrono::Local::now().format("%Y-%m-%d %H:%M [%Z]").to_string(),
            generator_version => self.version_info.clone(),
            project_name => self.conf.project_name.clone(),
            root_url => self.conf.html_base_url.clone(),
        };

        match template.render(context![..ctx, ..base_ctx]) {
            Ok(data) => {
                if let Err(e) = fs::write(&fname, data) {
                    error!(file = %fname.display(), error = %e, "unable to write report page");
                }
            }
            Err(e) => error!(template = page_id, error = %e, "failed to render template"),
        }
    }

    /// Aggregate hints and metadata of a section's packages.
    fn preprocess_information(
        &self,
        suite_name: &str,
        section: &str,
        pkgs: &[PackageRef],
    ) -> Result<DataSummary> {
        info!(suite = suite_name, section, "collecting data about hints and available metainfo");
        let dtype = self.conf.metadata_type;
        let mut dsum = DataSummary::default();

        for pkg in pkgs {
            let pkid = pkg.id();
            let gcids = self.dstore.get_gcids_for_package(&pkid)?;
            let hints_data = self.dstore.get_hints(&pkid)?.unwrap_or_default();
            if gcids.is_empty() && hints_data.is_empty() {
                continue;
            }

            let maintainer = pkg.maintainer();
            let pkgname = pkg.name();
            let version = pkg.version();
            let arch = pkg.arch();

            let mut pkgsummary = dsum
                .pkg_summaries
                .get(&maintainer)
                .and_then(|pkgs| pkgs.get(&pkgname))
                .cloned()
                .unwrap_or_else(|| PkgSummary {
                    pkgname: pkgname.clone(),
                    ..PkgSummary::default()
                });
            let mut new_info = false;

            for gcid in &gcids {
                let Some(cid) = crate::utils::cid_from_global_id(gcid) else {
                    continue;
                };

                let ver_entries = dsum
                    .mdata_entries
                    .entry(pkgname.clone())
                    .or_default()
                    .entry(version.clone())
                    .or_default();
                if let Some(existing) = ver_entries.get_mut(gcid) {
                    // same component from another architecture
                    if !existing.archs.contains(&arch) {
                        existing.archs.push(arch.clone());
                    }
                    continue;
                }

                let Some(data) = self.dstore.get_metadata(dtype, gcid)? else {
                    continue;
                };
                let (kind, icon_name) = metadata_entry_details(&data, dtype);

                dsum.total_metadata += 1;
                new_info = true;
                ver_entries.insert(
                    gcid.clone(),
                    MetadataEntry {
                        identifier: cid.clone(),
                        data,
                        kind,
                        icon_name,
                        archs: vec![arch.clone()],
                    },
                );
                pkgsummary.cpts.push(format!("{cid} - {version}"));
            }

            if !hints_data.is_empty() {
                match parse_hints_json(&hints_data) {
                    Ok((_, hints_by_cid)) => {
                        for (cid, hints) in hints_by_cid {
                            let entries = dsum.hint_entries.entry(pkgname.clone()).or_default();
                            if let Some(existing) = entries.get_mut(&cid) {
                                if !existing.archs.contains(&arch) {
                                    existing.archs.push(arch.clone());
                                }
                                continue;
                            }
                            new_info = true;

                            let mut hentry = HintEntry {
                                archs: vec![arch.clone()],
                                ..HintEntry::default()
                            };
                            for (tag, vars) in hints {
                                let tag = if tag_is_known(&tag) {
                                    tag
                                } else {
                                    error!(
                                        tag = %tag,
                                        cid = %cid,
                                        pkid = %pkid,
                                        "encountered hint with unknown tag"
                                    );
                                    "internal-unknown-tag".to_string()
                                };
                                let message = format_explanation(&tag, &vars);
                                let hint_tag = HintTag {
                                    tag: tag.clone(),
                                    message,
                                };
                                match tag_severity(&tag) {
                                    Severity::Info => {
                                        hentry.infos.push(hint_tag);
                                        pkgsummary.info_count += 1;
                                    }
                                    Severity::Warning => {
                                        hentry.warnings.push(hint_tag);
                                        pkgsummary.warning_count += 1;
                                    }
                                    // pedantic issues are not rendered
                                    Severity::Pedantic => {}
                                    Severity::Error => {
                                        hentry.errors.push(hint_tag);
                                        pkgsummary.error_count += 1;
                                    }
                                }
                            }
                            entries.insert(cid, hentry);
                        }
                    }
                    Err(e) => {
                        error!(pkid = %pkid, error = %e, "failed to parse hints JSON");
                    }
                }
            }

            if new_info {
                dsum.total_infos += pkgsummary.info_count;
                dsum.total_warnings += pkgsummary.warning_count;
                dsum.total_errors += pkgsummary.error_count;
            }
            dsum.pkg_summaries
                .entry(maintainer)
                .or_default()
                .insert(pkgname, pkgsummary);
        }

        Ok(dsum)
    }

    fn render_pages_for(&self, suite_name: &str, section: &str, dsum: &DataSummary) {
        info!(suite = suite_name, section, "rendering HTML pages");

        // per-package issue pages
        for (pkgname, pkg_hentries) in &dsum.hint_entries {
            let entries: Vec<minijinja::Value> = pkg_hentries
                .iter()
                .map(|(cid, hentry)| {
                    context! {
                        component_id => cid,
                        architectures => hentry.archs.clone(),
                        has_errors => !hentry.errors.is_empty(),
                        errors => hentry.errors.clone(),
                        has_warnings => !hentry.warnings.is_empty(),
                        warnings => hentry.warnings.clone(),
                        has_infos => !hentry.infos.is_empty(),
                        infos => hentry.infos.clone(),
                    }
                })
                .collect();

            self.render_page(
                "issues_page",
                &format!("{suite_name}/{section}/issues/{pkgname}"),
                context! {
                    suite => suite_name,
                    section => section,
                    package_name => pkgname,
                    entries => entries,
                },
            );
        }

        // per-package metadata pages
        for (pkgname, ver_entries) in &dsum.mdata_entries {
            let mut cpts: Vec<minijinja::Value> = Vec::new();
            for (version, gcid_entries) in ver_entries {
                for (gcid, mentry) in gcid_entries {
                    let cpt_media_url = format!("{}/{}", self.media_pool_url, gcid);
                    let icon_url = match mentry.kind {
                        ComponentKind::DesktopApplication
                        | ComponentKind::WebApplication
                        | ComponentKind::Font
                        | ComponentKind::OperatingSystem => {
                            let icon_path = self
                                .dstore
                                .media_export_pool_dir()
                                .join(gcid)
                                .join("icons/64x64")
                                .join(mentry.icon_name.clone().unwrap_or_default());
                            if mentry.icon_name.is_some() && icon_path.exists() {
                                format!(
                                    "{}/icons/64x64/{}",
                                    cpt_media_url,
                                    mentry.icon_name.clone().unwrap_or_default()
                                )
                            } else {
                                format!("{}/static/img/no-image.png", self.conf.html_base_url)
                            }
                        }
                        ComponentKind::Unknown => {
                            format!("{}/static/img/no-image.png", self.conf.html_base_url)
                        }
                        _ => format!("{}/static/img/cpt-nogui.png", self.conf.html_base_url),
                    };

                    cpts.push(context! {
                        component_id => format!("{} - {}", mentry.identifier, version),
                        architectures => mentry.archs.clone(),
                        metadata => mentry.data.clone(),
                        icon_url => icon_url,
                    });
                }
            }

            self.render_page(
                "metainfo_page",
                &format!("{suite_name}/{section}/metainfo/{pkgname}"),
                context! {
                    suite => suite_name,
                    section => section,
                    package_name => pkgname,
                    cpts => cpts,
                },
            );
        }

        // per-maintainer issue overview
        let mut issue_summaries: Vec<minijinja::Value> = Vec::new();
        for (maintainer, pkg_summaries) in &dsum.pkg_summaries {
            let packages: Vec<minijinja::Value> = pkg_summaries
                .values()
                .filter(|s| s.info_count + s.warning_count + s.error_count > 0)
                .map(|s| {
                    context! {
                        pkgname => s.pkgname.clone(),
                        has_info_count => s.info_count > 0,
                        has_warning_count => s.warning_count > 0,
                        has_error_count => s.error_count > 0,
                        info_count => s.info_count,
                        warning_count => s.warning_count,
                        error_count => s.error_count,
                    }
                })
                .collect();
            if packages.is_empty() {
                continue;
            }
            issue_summaries.push(context! {
                maintainer => maintainer,
                maintainer_anchor => maintainer_anchor_re().replace_all(maintainer, "_"),
                packages => packages,
            });
        }
        self.render_page(
            "issues_index",
            &format!("{suite_name}/{section}/issues/index"),
            context! {
                suite => suite_name,
                section => section,
                summaries => issue_summaries,
            },
        );

        // per-maintainer metadata overview
        let mut meta_summaries: Vec<minijinja::Value> = Vec::new();
        for (maintainer, pkg_summaries) in &dsum.pkg_summaries {
            let packages: Vec<minijinja::Value> = pkg_summaries
                .values()
                .filter(|s| !s.cpts.is_empty())
                .map(|s| {
                    context! {
                        pkgname => s.pkgname.clone(),
                        components => s.cpts.clone(),
                    }
                })
                .collect();
            meta_summaries.push(context! {
                maintainer => maintainer,
                maintainer_anchor => maintainer_anchor_re().replace_all(maintainer, "_"),
                packages => packages,
            });
        }
        self.render_page(
            "metainfo_index",
            &format!("{suite_name}/{section}/metainfo/index"),
            context! {
                suite => suite_name,
                section => section,
                summaries => meta_summaries,
            },
        );

        // section index with the summary bar
        let total =
            dsum.total_metadata + dsum.total_infos + dsum.total_warnings + dsum.total_errors;
        let perc_one = if total == 0 { 0.0 } else { 100.0 / total as f64 };
        self.render_page(
            "section_page",
            &format!("{suite_name}/{section}/index"),
            context! {
                suite => suite_name,
                section => section,
                valid_percentage => dsum.total_metadata as f64 * perc_one,
                info_percentage => dsum.total_infos as f64 * perc_one,
                warning_percentage => dsum.total_warnings as f64 * perc_one,
                error_percentage => dsum.total_errors as f64 * perc_one,
                metainfo_count => dsum.total_metadata,
                error_count => dsum.total_errors,
                warning_count => dsum.total_warnings,
                info_count => dsum.total_infos,
            },
        );
    }

    fn save_statistics(&self, suite_name: &str, section: &str, dsum: &DataSummary) -> Result<()> {
        let mut data: HashMap<String, DataValue> = HashMap::new();
        data.insert("suite".to_string(), DataValue::Text(suite_name.to_string()));
        data.insert("section".to_string(), DataValue::Text(section.to_string()));
        data.insert("totalInfos".to_string(), DataValue::Int(dsum.total_infos as i64));
        data.insert(
            "totalWarnings".to_string(),
            DataValue::Int(dsum.total_warnings as i64),
        );
        data.insert("totalErrors".to_string(), DataValue::Int(dsum.total_errors as i64));
        data.insert(
            "totalMetadata".to_string(),
            DataValue::Int(dsum.total_metadata as i64),
        );
        self.dstore.add_statistics(data)
    }

    /// What: Produce all report output for one section.
    ///
    /// Details:
    /// - Statistics are appended to the data store, existing pages of the
    ///   section are dropped and re-rendered from scratch.
    pub fn process_for(&self, suite_name: &str, section: &str, pkgs: &[PackageRef]) -> Result<()> {
        let dsum = self.preprocess_information(suite_name, section, pkgs)?;
        self.save_statistics(suite_name, section, &dsum)?;

        let pages_dest = self.html_export_dir.join(suite_name).join(section);
        if pages_dest.exists() {
            fs::remove_dir_all(&pages_dest)
                .with_context(|| format!("unable to drop old pages in {}", pages_dest.display()))?;
        }

        self.render_pages_for(suite_name, section, &dsum);
        Ok(())
    }

    /// Render the main and per-suite index pages and copy static assets.
    pub fn update_index_pages(&self) -> Result<()> {
        info!("updating HTML index pages and static data");

        let mut suites: Vec<String> = self.conf.suites.iter().map(|s| s.name.clone()).collect();
        suites.sort_by(|a, b| b.cmp(a));

        for suite in &self.conf.suites {
            self.render_page(
                "sections_index",
                &format!("{}/index", suite.name),
                context! {
                    suite => suite.name.clone(),
                    sections => suite.sections.clone(),
                },
            );
        }

        let mut oldsuites = self.conf.oldsuites.clone();
        oldsuites.sort();

        self.render_page(
            "main",
            "index",
            context! {
                suites => suites,
                oldsuites => oldsuites,
            },
        );

        // ship static data next to the pages when the template dir has any
        if let Some(template_dir) = self.conf.template_dir() {
            let static_src = template_dir.join("static");
            if static_src.exists() {
                let static_dest = self.html_export_dir.join("static");
                if static_dest.exists() {
                    fs::remove_dir_all(&static_dest)?;
                }
                crate::utils::copy_dir(&static_src, &static_dest, false)?;
            }
        }
        Ok(())
    }

    /// What: Export the statistics series as `statistics.json`.
    ///
    /// Output:
    /// - `{suite: {section: {errors|warnings|infos|metadata: [[ts, n]]}}}`
    pub fn export_statistics(&self) -> Result<()> {
        info!("exporting statistical data");

        let mut stats = self.dstore.get_statistics()?;
        stats.sort_by_key(|entry| entry.time);

        let mut suite_data: BTreeMap<String, BTreeMap<String, BTreeMap<String, Vec<(i64, i64)>>>> =
            BTreeMap::new();
        for entry in &stats {
            let suite = entry
                .data
                .get("suite")
                .and_then(DataValue::as_str)
                .unwrap_or_default()
                .to_string();
            let section = entry
                .data
                .get("section")
                .and_then(DataValue::as_str)
                .unwrap_or_default()
                .to_string();
            if suite.is_empty() || section.is_empty() {
                continue;
            }
            let ts = entry.time as i64;
            let get_count = |key: &str| {
                entry
                    .data
                    .get(key)
                    .and_then(DataValue::as_int)
                    .unwrap_or(0)
            };

            let section_map = suite_data.entry(suite).or_default().entry(section).or_default();
            section_map
                .entry("errors".to_string())
                .or_default()
                .push((ts, get_count("totalErrors")));
            section_map
                .entry("warnings".to_string())
                .or_default()
                .push((ts, get_count("totalWarnings")));
            section_map
                .entry("infos".to_string())
                .or_default()
                .push((ts, get_count("totalInfos")));
            section_map
                .entry("metadata".to_string())
                .or_default()
                .push((ts, get_count("totalMetadata")));
        }

        let json = serde_json::to_string(&suite_data)?;
        let fname = self.html_export_dir.join("statistics.json");
        if let Some(parent) = fname.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&fname, json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maintainer_anchors_strip_special_characters() {
        let anchor = maintainer_anchor_re().replace_all("Jörg O'Example (Team)", "_");
        assert!(!anchor.contains('\''));
        assert!(!anchor.contains(' '));
        assert!(!anchor.contains('('));
    }

    #[test]
    fn metadata_details_from_yaml() {
        let yaml = "Type: desktop-application\nID: org.example.App\nIcon:\n  cached:\n  - name: app_app.png\n    width: 64\n    height: 64\n";
        let (kind, icon) = metadata_entry_details(yaml, DataType::Yaml);
        assert_eq!(kind, ComponentKind::DesktopApplication);
        assert_eq!(icon.as_deref(), Some("app_app.png"));
    }

    #[test]
    fn metadata_details_from_xml() {
        let xml = "<component type=\"font\"><id>org.example.Font</id><icon type=\"cached\" width=\"64\" height=\"64\">f.png</icon></component>";
        let (kind, icon) = metadata_entry_details(xml, DataType::Xml);
        assert_eq!(kind, ComponentKind::Font);
        assert_eq!(icon.as_deref(), Some("f.png"));
    }
}
