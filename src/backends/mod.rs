//! Distribution backends: per-distro package enumeration.
//!
//! Every backend exposes the same capability: enumerate the packages of a
//! `(suite, section, architecture)` triple, stream file contents out of
//! individual packages on demand, and report whether the underlying index
//! changed since the last run. Backend selection is a closed set, so
//! dispatch happens over a tagged enum rather than trait objects.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{Result, bail};

use crate::compose::desktop::DesktopEntry;
use crate::config::{BackendKind, Config};
use crate::datastore::DataStore;

pub mod alpinelinux;
pub mod archlinux;
pub mod debian;
pub mod dummy;
pub mod nix;
pub mod rpmmd;
pub mod ubuntu;

/// Sentinel package name for injected, non-packaged metainfo.
pub const EXTRA_METAINFO_FAKE_PKGNAME: &str = "+extra-metainfo";

/// Whether a package is real or a synthetic carrier for injected data.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PackageKind {
    /// A regular package from the archive.
    #[default]
    Physical,
    /// A fake package wrapping repo-owner supplied metainfo.
    Fake,
}

/// GStreamer capability metadata attached to multimedia packages.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GStreamer {
    /// Decodable formats.
    pub decoders: Vec<String>,
    /// Encodable formats.
    pub encoders: Vec<String>,
    /// Provided pipeline elements.
    pub elements: Vec<String>,
    /// Supported URI sinks.
    pub uri_sinks: Vec<String>,
    /// Supported URI sources.
    pub uri_sources: Vec<String>,
}

impl GStreamer {
    /// Whether any capability field is populated.
    #[must_use]
    pub fn is_not_empty(&self) -> bool {
        !(self.decoders.is_empty()
            && self.encoders.is_empty()
            && self.elements.is_empty()
            && self.uri_sinks.is_empty()
            && self.uri_sources.is_empty())
    }
}

/// The abstract package interface every backend implements.
///
/// Identity fields are fixed at construction. File access is lazy: the
/// first `contents()`/`file_data()` call may open the underlying archive,
/// and `finish()` releases handles and temporary files again (idempotent).
pub trait Package: Send + Sync {
    /// Package name.
    fn name(&self) -> String;
    /// Package version.
    fn version(&self) -> String;
    /// Package architecture.
    fn arch(&self) -> String;
    /// Maintainer / packager string.
    fn maintainer(&self) -> String {
        String::new()
    }
    /// Whether this is a real or a fake package.
    fn kind(&self) -> PackageKind {
        PackageKind::Physical
    }
    /// Per-locale one-line summaries from the packaging.
    fn summary(&self) -> BTreeMap<String, String> {
        BTreeMap::new()
    }
    /// Per-locale long descriptions (XML markup) from the packaging.
    fn description(&self) -> BTreeMap<String, String> {
        BTreeMap::new()
    }
    /// GStreamer metadata, when the packaging carries any.
    fn gst(&self) -> Option<GStreamer> {
        None
    }
    /// Path or URL of the package file, for diagnostics.
    fn filename(&self) -> String {
        String::new()
    }
    /// All file paths inside the package; memoized by implementations.
    fn contents(&self) -> Result<Vec<String>>;
    /// Read the bytes of one file from the package.
    fn file_data(&self, path: &str) -> Result<Vec<u8>>;
    /// Release open handles and temporary data. Idempotent.
    fn finish(&self);
    /// Whether desktop-entry translations can be looked up externally.
    fn has_desktop_file_translations(&self) -> bool {
        false
    }
    /// Look up desktop-entry translations for a source text.
    fn desktop_file_translations(
        &self,
        _entry: &DesktopEntry,
        _text: &str,
    ) -> BTreeMap<String, String> {
        BTreeMap::new()
    }

    /// The stable package ID: `name/version/arch`.
    fn id(&self) -> String {
        format!("{}/{}/{}", self.name(), self.version(), self.arch())
    }

    /// Whether all identity fields are set.
    fn is_valid(&self) -> bool {
        !self.name().is_empty() && !self.version().is_empty() && !self.arch().is_empty()
    }
}

/// A shared reference to a package.
pub type PackageRef = Arc<dyn Package>;

/// The tagged union of all available package-index backends.
pub enum PackageIndex {
    /// Inert test backend.
    Dummy(dummy::DummyPackageIndex),
    /// Debian-style archive reader.
    Debian(debian::DebianPackageIndex),
    /// Ubuntu: Debian with language-pack processing.
    Ubuntu(ubuntu::UbuntuPackageIndex),
    /// Arch Linux reader.
    Archlinux(archlinux::ArchPackageIndex),
    /// RPM-MD reader.
    RpmMd(rpmmd::RpmPackageIndex),
    /// Alpine Linux reader.
    Alpinelinux(alpinelinux::AlpinePackageIndex),
    /// Nix reader.
    Nix(nix::NixPackageIndex),
}

impl PackageIndex {
    /// What: Instantiate the backend selected by the configuration.
    ///
    /// Inputs:
    /// - `conf`: Loaded configuration (archive root, backend kind)
    ///
    /// Output:
    /// - The ready-to-use index, or an error for backends this build
    ///   does not provide
    pub fn for_config(conf: &Config) -> Result<Self> {
        let root = conf.archive_root.clone();
        Ok(match conf.backend {
            BackendKind::Dummy => Self::Dummy(dummy::DummyPackageIndex::new()),
            BackendKind::Debian => Self::Debian(debian::DebianPackageIndex::new(&root, conf)?),
            BackendKind::Ubuntu => Self::Ubuntu(ubuntu::UbuntuPackageIndex::new(&root, conf)?),
            BackendKind::Archlinux => {
                Self::Archlinux(archlinux::ArchPackageIndex::new(&root, conf)?)
            }
            BackendKind::RpmMd => Self::RpmMd(rpmmd::RpmPackageIndex::new(&root, conf)?),
            BackendKind::Alpinelinux => {
                Self::Alpinelinux(alpinelinux::AlpinePackageIndex::new(&root, conf)?)
            }
            BackendKind::Nix => Self::Nix(nix::NixPackageIndex::new(&root, conf)?),
            BackendKind::FreeBsd => {
                bail!("the FreeBSD backend is not supported by this build")
            }
        })
    }

    /// Enumerate all packages of a `(suite, section, arch)` triple.
    /// Results are memoized per triple until [`PackageIndex::release`].
    pub fn packages_for(
        &self,
        suite: &str,
        section: &str,
        arch: &str,
        with_long_descs: bool,
    ) -> Result<Vec<PackageRef>> {
        match self {
            Self::Dummy(b) => b.packages_for(suite, section, arch),
            Self::Debian(b) => b.packages_for(suite, section, arch, with_long_descs),
            Self::Ubuntu(b) => b.packages_for(suite, section, arch, with_long_descs),
            Self::Archlinux(b) => b.packages_for(suite, section, arch),
            Self::RpmMd(b) => b.packages_for(suite, section, arch),
            Self::Alpinelinux(b) => b.packages_for(suite, section, arch),
            Self::Nix(b) => b.packages_for(suite, section, arch),
        }
    }

    /// Build a package from a single package file, for backends that
    /// support it.
    pub fn package_for_file(
        &self,
        fname: &str,
        suite: &str,
        section: &str,
    ) -> Result<Option<PackageRef>> {
        match self {
            Self::Debian(b) => b.package_for_file(fname).map(Some),
            Self::Ubuntu(b) => b.package_for_file(fname).map(Some),
            _ => {
                let _ = (fname, suite, section);
                Ok(None)
            }
        }
    }

    /// Whether the index of a triple changed since the last recorded run.
    pub fn has_changes(
        &self,
        dstore: &DataStore,
        suite: &str,
        section: &str,
        arch: &str,
    ) -> Result<bool> {
        match self {
            Self::Dummy(_) => Ok(true),
            Self::Debian(b) => b.has_changes(dstore, suite, section, arch),
            Self::Ubuntu(b) => b.has_changes(dstore, suite, section, arch),
            // index freshness is not tracked for these backends; a run
            // always reprocesses them
            Self::Archlinux(_) | Self::RpmMd(_) | Self::Alpinelinux(_) | Self::Nix(_) => Ok(true),
        }
    }

    /// Drop all memoized package lists and caches.
    pub fn release(&self) {
        match self {
            Self::Dummy(b) => b.release(),
            Self::Debian(b) => b.release(),
            Self::Ubuntu(b) => b.release(),
            Self::Archlinux(b) => b.release(),
            Self::RpmMd(b) => b.release(),
            Self::Alpinelinux(b) => b.release(),
            Self::Nix(b) => b.release(),
        }
    }
}
