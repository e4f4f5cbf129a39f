//! Persistent store behavior: package records, cruft cleanup and the
//! statistics pipeline through the report generator.

use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use asgen::backends::{Package, PackageRef};
use asgen::compose::{Component, ComponentKind, ComposeResult};
use asgen::config::{Config, DataType};
use asgen::contentsstore::ContentsStore;
use asgen::datastore::{DataStore, DataValue, StatisticsEntry};
use asgen::reportgenerator::ReportGenerator;
use asgen::result::GeneratorResult;

struct TestPkg {
    name: String,
    version: String,
    arch: String,
}

impl TestPkg {
    fn shared(name: &str, version: &str, arch: &str) -> PackageRef {
        Arc::new(Self {
            name: name.to_string(),
            version: version.to_string(),
            arch: arch.to_string(),
        })
    }
}

impl Package for TestPkg {
    fn name(&self) -> String {
        self.name.clone()
    }
    fn version(&self) -> String {
        self.version.clone()
    }
    fn arch(&self) -> String {
        self.arch.clone()
    }
    fn maintainer(&self) -> String {
        "Alice Maintainer <alice@example.org>".to_string()
    }
    fn contents(&self) -> anyhow::Result<Vec<String>> {
        Ok(Vec::new())
    }
    fn file_data(&self, path: &str) -> anyhow::Result<Vec<u8>> {
        anyhow::bail!("no such file: {path}")
    }
    fn finish(&self) {}
}

fn write_config(dir: &Path) -> Config {
    let path = dir.join("asgen-config.json");
    fs::write(
        &path,
        r#"{
            "ProjectName": "StoreTest",
            "ArchiveRoot": "/nonexistent",
            "Backend": "dummy",
            "Suites": {
                "testing": {
                    "sections": ["main"],
                    "architectures": ["amd64"]
                }
            }
        }"#,
    )
    .expect("write config");
    Config::load(&path, None, None).expect("load config")
}

fn result_with_component(pkg: &PackageRef, cid: &str) -> GeneratorResult {
    let mut res = ComposeResult::new(&pkg.name());
    let mut cpt = Component::new(cid, ComponentKind::DesktopApplication);
    cpt.names.insert("C".to_string(), "Test App".to_string());
    cpt.summaries.insert("C".to_string(), "Does testing".to_string());
    cpt.pkgnames.push(pkg.name());
    res.add_component(cpt);
    GeneratorResult::new(res, PackageRef::clone(pkg))
}

#[test]
fn generator_result_marks_outcomes_in_package_table() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = DataStore::open(&dir.path().join("db"), &dir.path().join("media")).expect("open");

    // components: a newline-joined gcid list is recorded
    let pkg = TestPkg::shared("app", "1.0", "amd64");
    let mut gres = result_with_component(&pkg, "org.example.App");
    store
        .add_generator_result(DataType::Yaml, &mut gres, false)
        .expect("add result");

    let gcids = store.get_gcids_for_package("app/1.0/amd64").expect("gcids");
    assert_eq!(gcids.len(), 1);
    // every recorded gcid has stored metadata
    for gcid in &gcids {
        let data = store
            .get_metadata(DataType::Yaml, gcid)
            .expect("metadata lookup")
            .expect("metadata present");
        assert!(data.contains("org.example.App"));
    }

    // hints but no components: the package is marked "seen"
    let pkg = TestPkg::shared("hints-only", "1.0", "amd64");
    let mut gres = GeneratorResult::empty_for(PackageRef::clone(&pkg));
    gres.add_hint_msg("", "internal-error", "something went wrong");
    store
        .add_generator_result(DataType::Yaml, &mut gres, false)
        .expect("add result");
    assert_eq!(
        store.get_package_value("hints-only/1.0/amd64").expect("value").as_deref(),
        Some("seen")
    );
    assert!(store.get_gcids_for_package("hints-only/1.0/amd64").expect("gcids").is_empty());
    assert!(store.has_hints("hints-only/1.0/amd64").expect("hints"));

    // neither components nor hints: permanently ignored
    let pkg = TestPkg::shared("boring", "2.0", "amd64");
    let mut gres = GeneratorResult::empty_for(PackageRef::clone(&pkg));
    store
        .add_generator_result(DataType::Yaml, &mut gres, false)
        .expect("add result");
    assert!(store.is_ignored("boring/2.0/amd64").expect("ignored"));
    assert!(store.get_gcids_for_package("boring/2.0/amd64").expect("gcids").is_empty());
}

#[test]
fn existing_metadata_is_not_regenerated() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = DataStore::open(&dir.path().join("db"), &dir.path().join("media")).expect("open");

    let pkg = TestPkg::shared("app", "1.0", "amd64");
    let mut gres = result_with_component(&pkg, "org.example.App");
    store
        .add_generator_result(DataType::Yaml, &mut gres, false)
        .expect("add result");
    let gcid = store.get_gcids_for_package("app/1.0/amd64").expect("gcids")[0].clone();

    // overwrite the stored body, then re-add without regeneration; the
    // marker must survive, proving the body was not serialized again
    store
        .set_metadata(DataType::Yaml, &gcid, "MARKER")
        .expect("overwrite");
    let pkg2 = TestPkg::shared("app", "1.1", "amd64");
    let mut gres2 = result_with_component(&pkg2, "org.example.App");
    store
        .add_generator_result(DataType::Yaml, &mut gres2, false)
        .expect("re-add");
    assert_eq!(
        store.get_metadata(DataType::Yaml, &gcid).expect("get").as_deref(),
        Some("MARKER")
    );

    // with forced regeneration the body is rewritten
    let pkg3 = TestPkg::shared("app", "1.2", "amd64");
    let mut gres3 = result_with_component(&pkg3, "org.example.App");
    store
        .add_generator_result(DataType::Yaml, &mut gres3, true)
        .expect("forced re-add");
    assert_ne!(
        store.get_metadata(DataType::Yaml, &gcid).expect("get").as_deref(),
        Some("MARKER")
    );
}

fn snapshot_tree(root: &Path) -> Vec<String> {
    let mut entries: Vec<String> = walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(Result::ok)
        .map(|e| e.path().display().to_string())
        .collect();
    entries.sort();
    entries
}

#[test]
fn cleanup_cruft_removes_orphans_and_is_idempotent() {
    let dir = tempfile::tempdir().expect("tempdir");
    let conf = write_config(dir.path());
    let media_root = dir.path().join("media");
    let store = DataStore::open(&dir.path().join("db"), &media_root).expect("open");

    // one live package and its media
    let pkg = TestPkg::shared("app", "1.0", "amd64");
    let mut gres = result_with_component(&pkg, "org.example.App");
    store
        .add_generator_result(DataType::Yaml, &mut gres, false)
        .expect("add result");
    let live_gcid = store.get_gcids_for_package("app/1.0/amd64").expect("gcids")[0].clone();
    let live_media = media_root.join("pool").join(&live_gcid).join("icons/64x64");
    fs::create_dir_all(&live_media).expect("mkdir");
    fs::write(live_media.join("app_icon.png"), b"icon").expect("write");

    // an orphaned component: metadata and media without any package entry
    let orphan_gcid = "org/example/Orphan/0123456789abcdef0123456789abcdef";
    store
        .set_metadata(DataType::Yaml, orphan_gcid, "orphan data")
        .expect("set orphan metadata");
    let orphan_media = media_root.join("pool").join(orphan_gcid).join("icons/64x64");
    fs::create_dir_all(&orphan_media).expect("mkdir");
    fs::write(orphan_media.join("orphan.png"), b"icon").expect("write");

    store.cleanup_cruft(&conf).expect("first cleanup");

    assert!(
        store.get_metadata(DataType::Yaml, orphan_gcid).expect("orphan lookup").is_none(),
        "orphaned metadata must be dropped"
    );
    assert!(store.get_metadata(DataType::Yaml, &live_gcid).expect("live lookup").is_some());
    assert!(!media_root.join("pool").join(orphan_gcid).exists());
    assert!(media_root.join("pool").join(&live_gcid).exists());

    // running the sweep again must not change anything
    let before = snapshot_tree(&media_root);
    store.cleanup_cruft(&conf).expect("second cleanup");
    assert_eq!(before, snapshot_tree(&media_root));
}

#[test]
fn removed_packages_vanish_from_the_id_set() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = ContentsStore::open(&dir.path().join("contents")).expect("open");

    for name in ["one", "two", "three"] {
        store
            .add_contents(
                &format!("{name}/1.0/amd64"),
                &[format!("/usr/bin/{name}")],
            )
            .expect("add");
    }

    let mut doomed = HashSet::new();
    doomed.insert("one/1.0/amd64".to_string());
    doomed.insert("two/1.0/amd64".to_string());
    store.remove_packages(&doomed).expect("remove");

    let remaining = store.get_package_id_set().expect("ids");
    assert!(remaining.is_disjoint(&doomed));
    assert!(remaining.contains("three/1.0/amd64"));
}

#[test]
fn statistics_roundtrip_into_exported_series() {
    let dir = tempfile::tempdir().expect("tempdir");
    let conf = write_config(dir.path());
    let store = DataStore::open(&dir.path().join("db"), &dir.path().join("media")).expect("open");

    let mut data = std::collections::HashMap::new();
    data.insert("suite".to_string(), DataValue::Text("testing".to_string()));
    data.insert("section".to_string(), DataValue::Text("main".to_string()));
    data.insert("totalInfos".to_string(), DataValue::Int(123));
    data.insert("totalWarnings".to_string(), DataValue::Int(24));
    data.insert("totalErrors".to_string(), DataValue::Int(8));
    data.insert("totalMetadata".to_string(), DataValue::Int(42));
    let entry = StatisticsEntry {
        time: 1_700_000_000,
        data,
    };
    store.add_statistics_entry(&entry).expect("add statistics");

    // the record reappears verbatim
    let stats = store.get_statistics().expect("get statistics");
    assert_eq!(stats.len(), 1);
    assert_eq!(stats[0].time, 1_700_000_000);
    assert_eq!(stats[0].data.get("totalErrors"), Some(&DataValue::Int(8)));
    assert_eq!(
        stats[0].data.get("suite"),
        Some(&DataValue::Text("testing".to_string()))
    );

    // and contributes its point to the exported series
    let rgen = ReportGenerator::new(&conf, &store);
    rgen.export_statistics().expect("export");

    let json: serde_json::Value = serde_json::from_str(
        &fs::read_to_string(conf.html_export_dir().join("statistics.json")).expect("read json"),
    )
    .expect("parse json");
    let errors_series = json
        .get("testing")
        .and_then(|s| s.get("main"))
        .and_then(|s| s.get("errors"))
        .and_then(|s| s.as_array())
        .expect("errors series");
    assert_eq!(
        errors_series[0],
        serde_json::json!([1_700_000_000i64, 8])
    );

    // a duplicate timestamp overwrites the old record
    let mut data = std::collections::HashMap::new();
    data.insert("suite".to_string(), DataValue::Text("testing".to_string()));
    data.insert("section".to_string(), DataValue::Text("main".to_string()));
    data.insert("totalErrors".to_string(), DataValue::Int(99));
    store
        .add_statistics_entry(&StatisticsEntry {
            time: 1_700_000_000,
            data,
        })
        .expect("overwrite statistics");
    let stats = store.get_statistics().expect("get statistics");
    assert_eq!(stats.len(), 1);
    assert_eq!(stats[0].data.get("totalErrors"), Some(&DataValue::Int(99)));
}

#[test]
fn repo_info_mtime_flow() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = DataStore::open(&dir.path().join("db"), &dir.path().join("media")).expect("open");

    let mut info = store.get_repo_info("testing", "main", "amd64").expect("empty info");
    assert!(info.data.is_empty());

    info.data.insert("mtime".to_string(), DataValue::Int(1_650_000_000));
    store
        .set_repo_info("testing", "main", "amd64", &info)
        .expect("set info");

    let read_back = store.get_repo_info("testing", "main", "amd64").expect("info");
    assert_eq!(
        read_back.data.get("mtime").and_then(DataValue::as_int),
        Some(1_650_000_000)
    );

    // different arch has independent state
    let other = store.get_repo_info("testing", "main", "arm64").expect("other info");
    assert!(other.data.is_empty());
}

#[test]
fn prefix_scans_match_package_names_only() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = DataStore::open(&dir.path().join("db"), &dir.path().join("media")).expect("open");

    for pkid in ["vim/1.0/amd64", "vim/2.0/amd64", "vim-tiny/1.0/amd64"] {
        store.set_package_ignore(pkid).expect("mark");
    }

    let mut matches = store.get_pkids_matching("vim").expect("scan");
    matches.sort();
    assert_eq!(matches, vec!["vim/1.0/amd64".to_string(), "vim/2.0/amd64".to_string()]);
}

#[test]
fn package_summary_and_description_subsets_hold() {
    // invariant: icon and locale subsets are within the full contents
    let dir = tempfile::tempdir().expect("tempdir");
    let store = ContentsStore::open(&dir.path().join("contents")).expect("open");

    let contents: Vec<String> = vec![
        "/usr/bin/tool".to_string(),
        "/usr/share/icons/hicolor/48x48/apps/tool.png".to_string(),
        "/usr/share/locale/de/LC_MESSAGES/tool.mo".to_string(),
        "/usr/share/man/man1/tool.1.gz".to_string(),
    ];
    store.add_contents("tool/1.0/amd64", &contents).expect("add");

    let full: HashSet<String> = store
        .get_contents("tool/1.0/amd64")
        .expect("contents")
        .into_iter()
        .collect();
    let icons: HashSet<String> = store
        .get_icons("tool/1.0/amd64")
        .expect("icons")
        .into_iter()
        .collect();
    let locale: HashSet<String> = store
        .get_locale_files("tool/1.0/amd64")
        .expect("locale")
        .into_iter()
        .collect();

    assert!(icons.is_subset(&full));
    assert!(locale.is_subset(&full));
    assert_eq!(full.len(), contents.len());
}
