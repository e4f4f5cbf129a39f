//! Debian index reading against an on-disk fixture archive.

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use asgen::backends::Package;
use asgen::backends::debian::DebianPackageIndex;
use asgen::config::Config;
use asgen::datastore::DataStore;

const PACKAGES_INDEX: &str = "\
Package: gnome-calculator
Version: 1:45.0-1
Architecture: amd64
Maintainer: Debian GNOME Maintainers <pkg-gnome-maintainers@lists.alioth.debian.org>
Filename: pool/main/g/gnome-calculator/gnome-calculator_45.0-1_amd64.deb
Description: GNOME desktop calculator
 A calculator application for the GNOME desktop.
 .
 It supports financial and scientific modes.

Package: gnome-calculator
Version: 1:44.0-2
Architecture: amd64
Maintainer: Debian GNOME Maintainers <pkg-gnome-maintainers@lists.alioth.debian.org>
Filename: pool/main/g/gnome-calculator/gnome-calculator_44.0-2_amd64.deb
Description: GNOME desktop calculator (old)
 Old version.

Package: fonts-cantarell
Version: 0.303-2
Architecture: all
Maintainer: Debian Fonts Task Force <debian-fonts@lists.debian.org>
Filename: pool/main/f/fonts-cantarell/fonts-cantarell_0.303-2_all.deb
Description: sans serif font family
 The Cantarell font family.

Package: broken-no-version
Architecture: amd64
Filename: pool/main/b/broken/broken_amd64.deb
Description: invalid entry
 This one is missing its version.
";

fn build_fixture(root: &Path) {
    let index_dir = root.join("dists/chromodoris/main/binary-amd64");
    fs::create_dir_all(&index_dir).expect("mkdir index");

    let file = File::create(index_dir.join("Packages.xz")).expect("create index");
    let mut enc = xz2::write::XzEncoder::new(file, 6);
    enc.write_all(PACKAGES_INDEX.as_bytes()).expect("write index");
    enc.finish().expect("finish xz");
}

fn load_config(workspace: &Path, archive_root: &Path) -> Config {
    let path = workspace.join("asgen-config.json");
    fs::write(
        &path,
        format!(
            r#"{{
                "ProjectName": "DebianTest",
                "ArchiveRoot": "{}",
                "Backend": "debian",
                "Suites": {{
                    "chromodoris": {{
                        "sections": ["main"],
                        "architectures": ["amd64"]
                    }}
                }}
            }}"#,
            archive_root.display()
        ),
    )
    .expect("write config");
    Config::load(&path, None, None).expect("load config")
}

#[test]
fn packages_for_reads_and_caches_the_index() {
    let dir = tempfile::tempdir().expect("tempdir");
    let archive_root = dir.path().join("archive");
    build_fixture(&archive_root);
    let conf = load_config(dir.path(), &archive_root);

    let index =
        DebianPackageIndex::new(&archive_root.display().to_string(), &conf).expect("index");

    let pkgs = index
        .packages_for("chromodoris", "main", "amd64", false)
        .expect("packages");
    assert!(!pkgs.is_empty());

    let mut pkids: Vec<String> = pkgs.iter().map(|p| p.id()).collect();
    pkids.sort();
    // the invalid entry is dropped, the highest calculator version wins,
    // and arch:all records the concrete architecture
    assert_eq!(
        pkids,
        vec![
            "fonts-cantarell/0.303-2/amd64".to_string(),
            "gnome-calculator/1:45.0-1/amd64".to_string(),
        ]
    );

    let calc = pkgs
        .iter()
        .find(|p| p.name() == "gnome-calculator")
        .expect("calculator package");
    assert!(calc.maintainer().contains("Debian GNOME Maintainers"));
    let summary = calc.summary();
    assert_eq!(summary.get("C").map(String::as_str), Some("GNOME desktop calculator"));
    let description = calc.description();
    let c_desc = description.get("C").expect("C description");
    assert!(c_desc.starts_with("<p>"));
    assert!(c_desc.contains("financial and scientific"));

    // repeated calls serve the memoized list
    let pkgs_again = index
        .packages_for("chromodoris", "main", "amd64", false)
        .expect("packages again");
    let pkids_again: Vec<String> = pkgs_again.iter().map(|p| p.id()).collect();
    assert_eq!(pkgs.len(), pkgs_again.len());
    assert!(pkids_again.iter().all(|id| pkids.contains(id)));

    // releasing and re-reading yields identical content
    index.release();
    let pkgs_fresh = index
        .packages_for("chromodoris", "main", "amd64", false)
        .expect("packages after release");
    let mut pkids_fresh: Vec<String> = pkgs_fresh.iter().map(|p| p.id()).collect();
    pkids_fresh.sort();
    assert_eq!(pkids, pkids_fresh);
}

#[test]
fn has_changes_tracks_the_index_mtime() {
    let dir = tempfile::tempdir().expect("tempdir");
    let archive_root = dir.path().join("archive");
    build_fixture(&archive_root);
    let conf = load_config(dir.path(), &archive_root);
    let dstore =
        DataStore::open(&dir.path().join("db"), &dir.path().join("media")).expect("open store");

    let index =
        DebianPackageIndex::new(&archive_root.display().to_string(), &conf).expect("index");
    // nothing recorded yet: the index counts as changed
    assert!(
        index
            .has_changes(&dstore, "chromodoris", "main", "amd64")
            .expect("first check")
    );

    // a fresh reader (no per-run cache) sees the recorded mtime
    let index2 =
        DebianPackageIndex::new(&archive_root.display().to_string(), &conf).expect("index");
    assert!(
        !index2
            .has_changes(&dstore, "chromodoris", "main", "amd64")
            .expect("second check")
    );

    // bump the file mtime: change detected again
    let index_file = archive_root.join("dists/chromodoris/main/binary-amd64/Packages.xz");
    let new_time = std::time::SystemTime::now() + std::time::Duration::from_secs(10);
    let f = File::options().write(true).open(&index_file).expect("open index");
    f.set_times(fs::FileTimes::new().set_modified(new_time))
        .expect("set mtime");

    let index3 =
        DebianPackageIndex::new(&archive_root.display().to_string(), &conf).expect("index");
    assert!(
        index3
            .has_changes(&dstore, "chromodoris", "main", "amd64")
            .expect("third check")
    );
}

#[test]
fn missing_index_is_an_error_not_a_crash() {
    let dir = tempfile::tempdir().expect("tempdir");
    let archive_root = dir.path().join("archive");
    fs::create_dir_all(&archive_root).expect("mkdir");
    let conf = load_config(dir.path(), &archive_root);

    let index =
        DebianPackageIndex::new(&archive_root.display().to_string(), &conf).expect("index");
    assert!(
        index
            .packages_for("chromodoris", "main", "amd64", false)
            .is_err()
    );
}
