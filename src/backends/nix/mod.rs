//! The Nix backend.
//!
//! Nixpkgs has no per-suite binary indexes; instead the local `nix-env`
//! tool materializes a JSON catalog of available packages and their store
//! output paths. Store paths exposing applications are presented as
//! packages whose contents are virtual `/usr/share/…` paths mapped onto
//! the real store tree.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result, bail};
use rayon::prelude::*;
use serde::Deserialize;
use tracing::{debug, warn};

use super::{Package, PackageRef};
use crate::config::Config;

#[derive(Deserialize, Debug)]
struct NixEnvEntry {
    #[serde(default)]
    pname: String,
    #[serde(default)]
    version: String,
    #[serde(default)]
    system: String,
    #[serde(default, rename = "outputs")]
    outputs: HashMap<String, Option<String>>,
}

/// Parse the JSON catalog emitted by `nix-env -qa --json --out-path`.
fn parse_nix_env_catalog(data: &str) -> Result<Vec<NixEnvEntry>> {
    let raw: HashMap<String, NixEnvEntry> =
        serde_json::from_str(data).context("unable to parse nix-env JSON catalog")?;
    Ok(raw.into_values().collect())
}

/// Map a store-relative share path to its virtual `/usr` location.
fn virtual_path_for(store_rel: &str) -> Option<String> {
    store_rel
        .strip_prefix("share/")
        .map(|rest| format!("/usr/share/{rest}"))
}

/// A package materialized from a Nix store path.
pub struct NixPackage {
    name: String,
    version: String,
    arch: String,
    store_path: PathBuf,
    /// virtual path → absolute store file
    file_map: BTreeMap<String, PathBuf>,
}

impl NixPackage {
    /// What: Index one store path, building the virtual file map.
    ///
    /// Output:
    /// - `None` when the path exposes no application data
    fn index_store_path(
        pname: &str,
        version: &str,
        system: &str,
        store_path: &Path,
    ) -> Option<Self> {
        let share_root = store_path.join("share");
        if !share_root.is_dir() {
            return None;
        }

        let mut file_map = BTreeMap::new();
        let mut has_applications = false;
        for entry in walkdir::WalkDir::new(&share_root).follow_links(true).max_depth(8) {
            let Ok(entry) = entry else { continue };
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(rel) = entry.path().strip_prefix(store_path) else {
                continue;
            };
            let rel_str = rel.to_string_lossy().replace('\\', "/");
            let Some(virtual_path) = virtual_path_for(&rel_str) else {
                continue;
            };
            if virtual_path.starts_with("/usr/share/applications/")
                || virtual_path.starts_with("/usr/share/metainfo/")
            {
                has_applications = true;
            }
            file_map.insert(virtual_path, entry.path().to_path_buf());
        }

        if !has_applications {
            return None;
        }

        let arch = system.split('-').next().unwrap_or("unknown").to_string();
        Some(Self {
            name: pname.to_string(),
            version: version.to_string(),
            arch,
            store_path: store_path.to_path_buf(),
            file_map,
        })
    }
}

impl Package for NixPackage {
    fn name(&self) -> String {
        self.name.clone()
    }
    fn version(&self) -> String {
        self.version.clone()
    }
    fn arch(&self) -> String {
        self.arch.clone()
    }
    fn filename(&self) -> String {
        self.store_path.display().to_string()
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

/// Enumerates packages through the local `nix-env` tool.
pub struct NixPackageIndex {
    nix_env_exe: PathBuf,
    pkg_cache: Mutex<HashMap<String, Vec<PackageRef>>>,
}

impl NixPackageIndex {
    /// Create the index; requires `nix-env` on `PATH`.
    pub fn new(_dir: &str, _conf: &Config) -> Result<Self> {
        let Ok(nix_env_exe) = which::which("nix-env") else {
            bail!("the 'nix-env' executable was not found in PATH");
        };
        Ok(Self {
            nix_env_exe,
            pkg_cache: Mutex::new(HashMap::new()),
        })
    }

    /// Drop all caches.
    pub fn release(&self) {
        if let Ok(mut cache) = self.pkg_cache.lock() {
            cache.clear();
        }
    }

    fn load_packages(&self) -> Result<Vec<PackageRef>> {
        debug!(exe = %self.nix_env_exe.display(), "querying the nix package catalog");
        let mut cmd = Command::new(&self.nix_env_exe);
        cmd.args(["-qa", "--json", "--out-path"]);
        if let Ok(nix_path) = std::env::var("NIX_PATH") {
            cmd.env("NIX_PATH", nix_path);
        }

        let output = cmd.output().context("unable to run nix-env")?;
        if !output.status.success() {
            bail!("nix-env exited with {}", output.status);
        }
        let catalog = parse_nix_env_catalog(&String::from_utf8_lossy(&output.stdout))?;
        debug!(entries = catalog.len(), "received nix catalog entries");

        // indexing store paths does a lot of filesystem walking; spread it
        // over the worker pool
        let packages: Vec<PackageRef> = catalog
            .par_iter()
            .filter_map(|entry| {
                let out_path = entry.outputs.get("out").and_then(Clone::clone)?;
                let store_path = PathBuf::from(out_path);
                if !store_path.exists() {
                    return None;
                }
                NixPackage::index_store_path(
                    &entry.pname,
                    &entry.version,
                    &entry.system,
                    &store_path,
                )
                .map(|pkg| Arc::new(pkg) as PackageRef)
            })
            .collect();

        let valid: Vec<PackageRef> = packages
            .into_iter()
            .filter(|pkg| {
                if pkg.is_valid() {
                    true
                } else {
                    warn!(pkid = %pkg.id(), "found invalid package, skipping it");
                    false
                }
            })
            .collect();
        Ok(valid)
    }

    /// Enumerate all application packages; suite/section/arch are
    /// configuration labels for Nix and do not affect the query.
    pub fn packages_for(&self, suite: &str, section: &str, arch: &str) -> Result<Vec<PackageRef>> {
        let id = format!("{suite}/{section}/{arch}");
        if let Ok(cache) = self.pkg_cache.lock()
            && let Some(pkgs) = cache.get(&id)
        {
            return Ok(pkgs.clone());
        }

        let pkgs = self.load_packages()?;
        if let Ok(mut cache) = self.pkg_cache.lock() {
            cache.insert(id, pkgs.clone());
        }
        Ok(pkgs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nix_env_catalog_parsing() {
        let json = r#"{
            "nixpkgs.calculator": {
                "pname": "calculator",
                "version": "1.2",
                "system": "x86_64-linux",
                "outputs": {"out": "/nix/store/abc-calculator-1.2"}
            },
            "nixpkgs.broken": {}
        }"#;
        let entries = parse_nix_env_catalog(json).expect("parse");
        assert_eq!(entries.len(), 2);
        let calc = entries
            .iter()
            .find(|e| e.pname == "calculator")
            .expect("calculator entry");
        assert_eq!(calc.version, "1.2");
        assert_eq!(
            calc.outputs.get("out").and_then(|o| o.as_deref()),
            Some("/nix/store/abc-calculator-1.2")
        );
    }

    #[test]
    fn virtual_path_mapping() {
        assert_eq!(
            virtual_path_for("share/applications/foo.desktop").as_deref(),
            Some("/usr/share/applications/foo.desktop")
        );
        assert_eq!(virtual_path_for("bin/foo"), None);
    }

    #[test]
    fn store_path_indexing_requires_application_data() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = dir.path().join("abc-calc-1.0");
        std::fs::create_dir_all(store.join("share/applications")).expect("mkdir");
        std::fs::write(
            store.join("share/applications/calc.desktop"),
            "[Desktop Entry]\nType=Application\nName=Calc\n",
        )
        .expect("write");
        std::fs::create_dir_all(store.join("share/icons/hicolor/64x64/apps")).expect("mkdir");
        std::fs::write(store.join("share/icons/hicolor/64x64/apps/calc.png"), b"png").expect("write");

        let pkg = NixPackage::index_store_path("calc", "1.0", "x86_64-linux", &store)
            .expect("indexed package");
        assert_eq!(pkg.arch(), "x86_64");
        let contents = pkg.contents().expect("contents");
        assert!(contents.contains(&"/usr/share/applications/calc.desktop".to_string()));
        assert!(
            contents.contains(&"/usr/share/icons/hicolor/64x64/apps/calc.png".to_string())
        );
        let data = pkg
            .file_data("/usr/share/applications/calc.desktop")
            .expect("file data");
        assert!(data.starts_with(b"[Desktop Entry]"));

        // a library-only store path is not a package
        let lib_store = dir.path().join("def-lib-1.0");
        std::fs::create_dir_all(lib_store.join("share/doc")).expect("mkdir");
        std::fs::write(lib_store.join("share/doc/README"), b"docs").expect("write");
        assert!(NixPackage::index_store_path("lib", "1.0", "x86_64-linux", &lib_store).is_none());
    }
}
