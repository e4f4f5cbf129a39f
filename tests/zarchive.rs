//! Archive reading and writing against real tarballs on disk.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use asgen::zarchive::{
    ArchiveCompressor, ArchiveDecompressor, ArchiveError, ArchiveType, EntryData, compress_and_save,
    decompress_file,
};

/// Build a small `.tar.xz` with regular files, a hard link and symlinks.
fn build_test_tarball(dest: &Path) {
    let file = File::create(dest).expect("create tarball");
    let enc = xz2::write::XzEncoder::new(file, 6);
    let mut builder = tar::Builder::new(enc);

    let add_file = |builder: &mut tar::Builder<xz2::write::XzEncoder<File>>,
                    name: &str,
                    data: &[u8]| {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, name, data).expect("append file");
    };

    add_file(&mut builder, "test.txt", b"Wow!\n");
    add_file(&mut builder, "b/a", b"hello\n");
    add_file(&mut builder, "c/d", b"world\n");

    // hard link e/f -> test.txt
    let mut header = tar::Header::new_gnu();
    header.set_size(0);
    header.set_mode(0o644);
    header.set_entry_type(tar::EntryType::Link);
    header.set_cksum();
    builder
        .append_link(&mut header, "e/f", "test.txt")
        .expect("append hardlink");

    // symlink chain: links/one -> two, links/two -> ../c/d
    let mut header = tar::Header::new_gnu();
    header.set_size(0);
    header.set_mode(0o777);
    header.set_entry_type(tar::EntryType::Symlink);
    header.set_cksum();
    builder
        .append_link(&mut header, "links/one", "two")
        .expect("append symlink");

    let mut header = tar::Header::new_gnu();
    header.set_size(0);
    header.set_mode(0o777);
    header.set_entry_type(tar::EntryType::Symlink);
    header.set_cksum();
    builder
        .append_link(&mut header, "links/two", "../c/d")
        .expect("append symlink");

    // symlink cycle: loop/x -> y, loop/y -> x
    for (name, target) in [("loop/x", "y"), ("loop/y", "x")] {
        let mut header = tar::Header::new_gnu();
        header.set_size(0);
        header.set_mode(0o777);
        header.set_entry_type(tar::EntryType::Symlink);
        header.set_cksum();
        builder.append_link(&mut header, name, target).expect("append symlink");
    }

    let enc = builder.into_inner().expect("finish tar");
    enc.finish().expect("finish xz");
}

fn open_test_archive(dir: &Path) -> (ArchiveDecompressor, PathBuf) {
    let tar_path = dir.join("test.tar.xz");
    build_test_tarball(&tar_path);
    let mut ad = ArchiveDecompressor::new();
    ad.open(&tar_path);
    (ad, tar_path)
}

#[test]
fn read_data_finds_members_and_follows_hardlinks() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (ad, _) = open_test_archive(dir.path());

    assert_eq!(ad.read_data("/b/a").expect("b/a"), b"hello\n");
    // leading slash is optional
    assert_eq!(ad.read_data("c/d").expect("c/d"), b"world\n");
    // hard links resolve to their target data
    assert_eq!(ad.read_data("e/f").expect("e/f"), b"Wow!\n");

    match ad.read_data("/does/not/exist") {
        Err(ArchiveError::NotFound(_)) => {}
        other => panic!("expected not-found error, got {other:?}"),
    }
}

#[test]
fn read_data_follows_symlink_chains_and_detects_cycles() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (ad, _) = open_test_archive(dir.path());

    // one -> two -> ../c/d
    assert_eq!(ad.read_data("/links/one").expect("chain"), b"world\n");

    match ad.read_data("/loop/x") {
        Err(ArchiveError::LinkLoop(_)) => {}
        other => panic!("expected a link-loop error, got {other:?}"),
    }
}

#[test]
fn read_contents_lists_all_members() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (ad, _) = open_test_archive(dir.path());

    let contents = ad.read_contents().expect("contents");
    assert!(contents.contains(&"/b/a".to_string()));
    assert!(contents.contains(&"/c/d".to_string()));
    assert!(contents.contains(&"/test.txt".to_string()));
    assert!(contents.contains(&"/e/f".to_string()));
}

#[test]
fn entry_iteration_reports_links_and_data() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (ad, _) = open_test_archive(dir.path());

    let mut reader = ad.read().expect("open reader");
    let mut regular = 0;
    let mut links = 0;
    for entry in reader.entries().expect("entries") {
        let entry = entry.expect("entry");
        match entry.data {
            EntryData::Regular(_) => regular += 1,
            EntryData::Link(_) => links += 1,
            EntryData::Other => {}
        }
    }
    assert_eq!(regular, 3);
    assert_eq!(links, 5);
}

#[test]
fn extract_archive_materializes_regular_files() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (ad, _) = open_test_archive(dir.path());

    let dest = dir.path().join("out");
    std::fs::create_dir_all(&dest).expect("mkdir");
    ad.extract_archive(&dest).expect("extract");

    assert_eq!(std::fs::read(dest.join("b/a")).expect("read"), b"hello\n");
    assert_eq!(std::fs::read(dest.join("test.txt")).expect("read"), b"Wow!\n");
    // links are skipped silently
    assert!(!dest.join("e/f").exists());
}

#[test]
fn extract_files_by_regex_uses_leaf_names() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (ad, _) = open_test_archive(dir.path());

    let dest = dir.path().join("picked");
    std::fs::create_dir_all(&dest).expect("mkdir");
    let re = regex::Regex::new(r"^(b/a|c/d)$").expect("regex");
    let written = ad.extract_files_by_regex(&re, &dest).expect("extract");

    assert_eq!(written.len(), 2);
    for path in &written {
        assert_eq!(path.parent(), Some(dest.as_path()));
    }
    assert_eq!(std::fs::read(dest.join("a")).expect("read"), b"hello\n");
    assert_eq!(std::fs::read(dest.join("d")).expect("read"), b"world\n");
}

#[test]
fn compress_and_save_roundtrip_with_staged_rename() {
    let dir = tempfile::tempdir().expect("tempdir");
    let target = dir.path().join("Components-amd64.yml.gz");

    compress_and_save(b"Origin: testing\n", &target, ArchiveType::Gzip).expect("save");
    assert!(target.exists());
    assert!(!dir.path().join("Components-amd64.yml.gz.new").exists());
    assert_eq!(decompress_file(&target).expect("read back"), b"Origin: testing\n");

    // overwriting works and replaces the content
    compress_and_save(b"Origin: updated\n", &target, ArchiveType::Gzip).expect("overwrite");
    assert_eq!(decompress_file(&target).expect("read back"), b"Origin: updated\n");

    let xz_target = dir.path().join("Components-amd64.yml.xz");
    compress_and_save(b"xz data", &xz_target, ArchiveType::Xz).expect("save xz");
    assert_eq!(decompress_file(&xz_target).expect("read back"), b"xz data");
}

#[test]
fn archive_compressor_builds_readable_tarballs() {
    let dir = tempfile::tempdir().expect("tempdir");

    let icon_a = dir.path().join("app-icon.png");
    let icon_b = dir.path().join("other-icon.png");
    let mut f = File::create(&icon_a).expect("create");
    f.write_all(b"png-data-a").expect("write");
    let mut f = File::create(&icon_b).expect("create");
    f.write_all(b"png-data-b").expect("write");

    let tarball = dir.path().join("icons-64x64.tar.gz");
    let mut compressor = ArchiveCompressor::new(ArchiveType::Gzip);
    compressor.open(&tarball).expect("open");
    compressor.add_file(&icon_a, None).expect("add");
    compressor.add_file(&icon_b, Some("renamed-icon.png")).expect("add renamed");
    compressor.close().expect("close");

    assert!(tarball.exists());
    let mut ad = ArchiveDecompressor::new();
    ad.open(&tarball);
    assert_eq!(ad.read_data("app-icon.png").expect("member"), b"png-data-a");
    assert_eq!(ad.read_data("renamed-icon.png").expect("member"), b"png-data-b");
}
