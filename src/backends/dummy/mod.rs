//! The inert dummy backend, plus the fake package used to feed injected
//! metainfo through the regular extraction pipeline.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Result, bail};

use super::{EXTRA_METAINFO_FAKE_PKGNAME, Package, PackageKind, PackageRef};

/// A synthetic package whose contents come from plain files on disk.
///
/// Used for repo-owner supplied extra metainfo: the files of a suite's
/// extra-metainfo directory are presented as `/usr/share/metainfo/…`
/// members of a package named [`EXTRA_METAINFO_FAKE_PKGNAME`].
pub struct FakePackage {
    version: String,
    arch: String,
    /// virtual path → file on disk
    file_map: BTreeMap<String, PathBuf>,
}

impl FakePackage {
    /// Create a fake package for a suite version label and architecture.
    #[must_use]
    pub fn new(version: &str, arch: &str, file_map: BTreeMap<String, PathBuf>) -> Self {
        Self {
            version: version.to_string(),
            arch: arch.to_string(),
            file_map,
        }
    }
}

impl Package for FakePackage {
    fn name(&self) -> String {
        EXTRA_METAINFO_FAKE_PKGNAME.to_string()
    }
    fn version(&self) -> String {
        self.version.clone()
    }
    fn arch(&self) -> String {
        self.arch.clone()
    }
    fn kind(&self) -> PackageKind {
        PackageKind::Fake
    }
    fn maintainer(&self) -> String {
        "Repository Owner".to_string()
    }

    fn contents(&self) -> Result<Vec<String>> {
        Ok(self.file_map.keys().cloned().collect())
    }

    fn file_data(&self, path: &str) -> Result<Vec<u8>> {
        let Some(real_path) = self.file_map.get(path) else {
            bail!("file '{path}' was not found in the package");
        };
        Ok(std::fs::read(real_path)?)
    }

    fn finish(&self) {}
}

/// A backend that knows no packages; useful for tests and for running the
/// publication steps alone.
#[derive(Default)]
pub struct DummyPackageIndex {
    pkg_cache: Mutex<HashMap<String, Vec<PackageRef>>>,
}

impl DummyPackageIndex {
    /// Create the index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enumerate packages: always empty.
    pub fn packages_for(&self, suite: &str, section: &str, arch: &str) -> Result<Vec<PackageRef>> {
        let id = format!("{suite}/{section}/{arch}");
        if let Ok(cache) = self.pkg_cache.lock()
            && let Some(pkgs) = cache.get(&id)
        {
            return Ok(pkgs.clone());
        }
        Ok(Vec::new())
    }

    /// Drop all caches.
    pub fn release(&self) {
        if let Ok(mut cache) = self.pkg_cache.lock() {
            cache.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fake_package_identity() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mi = dir.path().join("org.example.App.metainfo.xml");
        std::fs::write(&mi, b"<component/>").expect("write");

        let mut file_map = BTreeMap::new();
        file_map.insert(
            "/usr/share/metainfo/org.example.App.metainfo.xml".to_string(),
            mi,
        );
        let pkg = FakePackage::new("testing", "amd64", file_map);

        assert_eq!(pkg.name(), "+extra-metainfo");
        assert_eq!(pkg.kind(), PackageKind::Fake);
        assert!(pkg.is_valid());
        assert_eq!(
            pkg.contents().expect("contents"),
            vec!["/usr/share/metainfo/org.example.App.metainfo.xml".to_string()]
        );
        assert_eq!(pkg.file_data("/usr/share/metainfo/org.example.App.metainfo.xml").expect("data"), b"<component/>");
        assert!(pkg.file_data("/nope").is_err());
    }
}
