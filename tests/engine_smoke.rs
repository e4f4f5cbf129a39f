//! End-to-end smoke run of the engine over an empty dummy archive: the
//! publication artifacts, report pages and statistics must appear even
//! when no packages exist.

use std::fs;
use std::sync::Arc;

use asgen::config::Config;
use asgen::engine::Engine;

fn load_config(dir: &std::path::Path) -> Arc<Config> {
    let path = dir.join("asgen-config.json");
    fs::write(
        &path,
        r#"{
            "ProjectName": "SmokeTest",
            "ArchiveRoot": "/nonexistent",
            "Backend": "dummy",
            "HtmlBaseUrl": "https://reports.example.org",
            "Suites": {
                "testing": {
                    "sections": ["main"],
                    "architectures": ["amd64"]
                }
            },
            "Oldsuites": ["ancient"]
        }"#,
    )
    .expect("write config");
    Arc::new(Config::load(&path, None, None).expect("load config"))
}

#[test]
fn run_produces_publication_artifacts() {
    let dir = tempfile::tempdir().expect("tempdir");
    let conf = load_config(dir.path());
    let engine = Engine::new(Arc::clone(&conf)).expect("engine");

    engine.run("testing", None).expect("run");

    // catalog files (dummy backend publishes DEP-11 YAML)
    let catalog_dir = conf.data_export_dir().join("testing/main");
    let gz = catalog_dir.join("Components-amd64.yml.gz");
    let xz = catalog_dir.join("Components-amd64.yml.xz");
    assert!(gz.exists(), "missing {}", gz.display());
    assert!(xz.exists(), "missing {}", xz.display());

    let body = asgen::zarchive::decompress_file(&gz).expect("read catalog");
    let text = String::from_utf8_lossy(&body);
    assert!(text.contains("File: DEP-11"));
    assert!(text.contains("Origin: testing-main"));

    // hints export
    assert!(
        conf.hints_export_dir()
            .join("testing/main/Hints-amd64.json.gz")
            .exists()
    );

    // report pages from the embedded templates
    let html = conf.html_export_dir();
    assert!(html.join("index.html").exists());
    assert!(html.join("testing/index.html").exists());
    assert!(html.join("testing/main/index.html").exists());
    let index_body = fs::read_to_string(html.join("index.html")).expect("read index");
    assert!(index_body.contains("SmokeTest"));
    assert!(index_body.contains("ancient"));

    // one statistics record was appended and exported
    let stats: serde_json::Value = serde_json::from_str(
        &fs::read_to_string(html.join("statistics.json")).expect("read statistics"),
    )
    .expect("parse statistics");
    let series = stats
        .get("testing")
        .and_then(|s| s.get("main"))
        .and_then(|s| s.get("metadata"))
        .and_then(|s| s.as_array())
        .expect("metadata series");
    assert_eq!(series.len(), 1);
}

#[test]
fn maintenance_verbs_run_on_an_empty_workspace() {
    let dir = tempfile::tempdir().expect("tempdir");
    let conf = load_config(dir.path());
    let engine = Engine::new(conf).expect("engine");

    engine.run_cleanup().expect("cleanup");
    engine.forget_package("does-not-exist").expect("forget by prefix");
    engine
        .forget_package("does/not/exist")
        .expect("forget by full id");
    engine.remove_hints_components("testing").expect("remove-found");

    // info requires a complete package id
    assert!(!engine.print_package_info("just-a-name").expect("info usage"));
    assert!(engine.print_package_info("name/1.0/amd64").expect("info"));
}

#[test]
fn unknown_suite_is_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let conf = load_config(dir.path());
    let engine = Engine::new(conf).expect("engine");

    assert!(engine.run("no-such-suite", None).is_err());
    assert!(engine.run("testing", Some("no-such-section")).is_err());
    assert!(engine.publish("no-such-suite", None).is_err());
}
