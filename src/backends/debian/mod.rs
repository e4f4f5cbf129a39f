//! The Debian-style archive backend.

mod debpkg;
mod debpkgindex;
mod debutils;
mod tagfile;

pub use debpkg::{DebPackage, DebPackageLocaleTexts};
pub use debpkgindex::DebianPackageIndex;
pub use debutils::{compare_versions, download_if_necessary, version_ordering};
pub use tagfile::{TagFile, TagSection};
