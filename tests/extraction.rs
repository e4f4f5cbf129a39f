//! End-to-end extraction of a synthetic package: metainfo and desktop
//! data are composed into a component, the icon is resolved through the
//! theme fallback, rescaled into the media pool and everything lands in
//! the data store.

use std::collections::{BTreeMap, HashMap};
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

use asgen::backends::{Package, PackageRef};
use asgen::config::Config;
use asgen::contentsstore::ContentsStore;
use asgen::datastore::DataStore;
use asgen::extractor::DataExtractor;
use asgen::iconhandler::IconHandler;

const METAINFO: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<component type="desktop-application">
  <id>org.example.Calc</id>
  <metadata_license>FSFAP</metadata_license>
  <name>Calc</name>
  <summary>Calculate things</summary>
  <description>
    <p>A capable calculator application.</p>
  </description>
  <icon type="stock">calc</icon>
  <launchable type="desktop-id">org.example.Calc.desktop</launchable>
</component>
"#;

const DESKTOP: &str = "\
[Desktop Entry]
Type=Application
Name=Calc
Comment=Calculate things
Icon=calc
Categories=Utility;
Exec=calc
";

struct MemPkg {
    name: String,
    files: BTreeMap<String, Vec<u8>>,
}

impl Package for MemPkg {
    fn name(&self) -> String {
        self.name.clone()
    }
    fn version(&self) -> String {
        "1.0".to_string()
    }
    fn arch(&self) -> String {
        "amd64".to_string()
    }
    fn maintainer(&self) -> String {
        "Test Maintainer <tm@example.org>".to_string()
    }
    fn contents(&self) -> anyhow::Result<Vec<String>> {
        Ok(self.files.keys().cloned().collect())
    }
    fn file_data(&self, path: &str) -> anyhow::Result<Vec<u8>> {
        self.files
            .get(path)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no such file: {path}"))
    }
    fn finish(&self) {}
}

/// A solid 64x64 PNG for use as an icon source.
fn sample_png() -> Vec<u8> {
    let img = image::RgbaImage::from_pixel(64, 64, image::Rgba([40, 120, 220, 255]));
    let mut buf = Vec::new();
    image::DynamicImage::ImageRgba8(img)
        .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .expect("encode png");
    buf
}

fn load_config(dir: &Path) -> Config {
    let path = dir.join("asgen-config.json");
    std::fs::write(
        &path,
        r#"{
            "ProjectName": "ExtractTest",
            "ArchiveRoot": "/nonexistent",
            "Backend": "dummy",
            "Features": {"noDownloads": true}
        }"#,
    )
    .expect("write config");
    Config::load(&path, None, None).expect("load config")
}

fn sample_package() -> PackageRef {
    let mut files = BTreeMap::new();
    files.insert(
        "/usr/share/metainfo/org.example.Calc.metainfo.xml".to_string(),
        METAINFO.as_bytes().to_vec(),
    );
    files.insert(
        "/usr/share/applications/org.example.Calc.desktop".to_string(),
        DESKTOP.as_bytes().to_vec(),
    );
    files.insert(
        "/usr/share/icons/hicolor/64x64/apps/calc.png".to_string(),
        sample_png(),
    );
    Arc::new(MemPkg {
        name: "calc".to_string(),
        files,
    })
}

#[test]
fn package_extraction_stores_component_and_icon() {
    let dir = tempfile::tempdir().expect("tempdir");
    let conf = load_config(dir.path());
    let dstore = DataStore::open(&dir.path().join("db"), &dir.path().join("media")).expect("dstore");
    let cstore = ContentsStore::open(&dir.path().join("contents")).expect("cstore");

    let pkg = sample_package();
    let pkid = pkg.id();
    cstore
        .add_contents(&pkid, &pkg.contents().expect("contents"))
        .expect("seed contents");

    let mut pkg_map = HashMap::new();
    pkg_map.insert(pkid.clone(), PackageRef::clone(&pkg));
    let iconh = IconHandler::new(
        &cstore,
        dstore.media_export_pool_dir(),
        &pkg_map,
        None,
        None,
        &conf,
    )
    .expect("icon handler");

    let extractor = DataExtractor::new(&conf, &dstore, &iconh, None);
    let mut gres = extractor.process_package(&pkg).expect("extract");

    assert_eq!(gres.components_count(), 1, "hints: {}", gres.hints_to_json());
    let gcids = gres.component_gcids();
    assert_eq!(gcids.len(), 1);
    assert!(gcids[0].starts_with("org/example/Calc/"));

    // the 64x64 icon was stored in the pool under the package-name prefix
    let icon_path = dstore
        .media_export_pool_dir()
        .join(&gcids[0])
        .join("icons/64x64/calc_calc.png");
    assert!(icon_path.exists(), "missing icon at {}", icon_path.display());
    let stored = image::open(&icon_path).expect("reopen stored icon");
    assert_eq!(stored.width(), 64);
    assert_eq!(stored.height(), 64);

    // persist and check the store invariant: every gcid has metadata
    dstore
        .add_generator_result(conf.metadata_type, &mut gres, false)
        .expect("store result");
    for gcid in &gcids {
        let data = dstore
            .get_metadata(conf.metadata_type, gcid)
            .expect("metadata lookup")
            .expect("metadata stored");
        assert!(data.contains("org.example.Calc"));
        assert!(data.contains("calc_calc.png"));
    }
}

#[test]
fn duplicate_component_in_other_package_is_flagged() {
    let dir = tempfile::tempdir().expect("tempdir");
    let conf = load_config(dir.path());
    let dstore = DataStore::open(&dir.path().join("db"), &dir.path().join("media")).expect("dstore");
    let cstore = ContentsStore::open(&dir.path().join("contents")).expect("cstore");

    // first package owns the component
    let pkg = sample_package();
    cstore
        .add_contents(&pkg.id(), &pkg.contents().expect("contents"))
        .expect("seed contents");
    let mut pkg_map = HashMap::new();
    pkg_map.insert(pkg.id(), PackageRef::clone(&pkg));
    let iconh = IconHandler::new(
        &cstore,
        dstore.media_export_pool_dir(),
        &pkg_map,
        None,
        None,
        &conf,
    )
    .expect("icon handler");
    let extractor = DataExtractor::new(&conf, &dstore, &iconh, None);
    let mut gres = extractor.process_package(&pkg).expect("extract");
    dstore
        .add_generator_result(conf.metadata_type, &mut gres, false)
        .expect("store result");

    // a second package ships the exact same component
    let mut files = BTreeMap::new();
    files.insert(
        "/usr/share/metainfo/org.example.Calc.metainfo.xml".to_string(),
        METAINFO.as_bytes().to_vec(),
    );
    files.insert(
        "/usr/share/applications/org.example.Calc.desktop".to_string(),
        DESKTOP.as_bytes().to_vec(),
    );
    files.insert(
        "/usr/share/icons/hicolor/64x64/apps/calc.png".to_string(),
        sample_png(),
    );
    let imposter: PackageRef = Arc::new(MemPkg {
        name: "calc-ng".to_string(),
        files,
    });
    cstore
        .add_contents(&imposter.id(), &imposter.contents().expect("contents"))
        .expect("seed contents");

    let gres = extractor.process_package(&imposter).expect("extract imposter");
    assert!(gres.has_hint("org.example.Calc", "metainfo-duplicate-id"));
    assert_eq!(gres.components_count(), 0);
}

#[test]
fn empty_package_produces_no_components_and_no_hints() {
    let dir = tempfile::tempdir().expect("tempdir");
    let conf = load_config(dir.path());
    let dstore = DataStore::open(&dir.path().join("db"), &dir.path().join("media")).expect("dstore");
    let cstore = ContentsStore::open(&dir.path().join("contents")).expect("cstore");

    let pkg: PackageRef = Arc::new(MemPkg {
        name: "empty".to_string(),
        files: BTreeMap::new(),
    });
    cstore.add_contents(&pkg.id(), &[]).expect("seed contents");

    let pkg_map = HashMap::new();
    let iconh = IconHandler::new(
        &cstore,
        dstore.media_export_pool_dir(),
        &pkg_map,
        None,
        None,
        &conf,
    )
    .expect("icon handler");
    let extractor = DataExtractor::new(&conf, &dstore, &iconh, None);
    let mut gres = extractor.process_package(&pkg).expect("extract");

    assert!(gres.is_unit_ignored());
    dstore
        .add_generator_result(conf.metadata_type, &mut gres, false)
        .expect("store result");
    assert!(dstore.is_ignored("empty/1.0/amd64").expect("ignored"));
}
