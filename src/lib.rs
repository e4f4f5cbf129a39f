//! AppStream metadata generator for Linux distribution archives.
//!
//! Given a distribution archive (package indexes plus binary packages for
//! suites, sections and architectures), this crate extracts AppStream
//! components from the packages, normalizes icons and screenshots into a
//! media pool, publishes per-suite catalog files and renders HTML issue
//! reports, keeping a persistent database so reruns only process changes.
//!
//! ## Crate Layout
//! - [`backends`]: per-distro package enumeration (Debian, Ubuntu, Arch,
//!   RPM-MD, Alpine, Nix) behind one package interface.
//! - [`compose`]: the component processor turning package file trees into
//!   AppStream components plus diagnostic hints.
//! - [`contentsstore`], [`datastore`]: persistent stores for incremental
//!   reruns and the media pool.
//! - [`iconhandler`], [`extractor`]: icon resolution/scaling and the
//!   per-package extraction pipeline.
//! - [`engine`], [`reportgenerator`]: orchestration, publication and the
//!   static HTML report site.

pub mod backends;
pub mod compose;
pub mod config;
pub mod contentsstore;
pub mod cptmodifiers;
pub mod datastore;
pub mod downloader;
pub mod engine;
pub mod extractor;
pub mod hints;
pub mod iconhandler;
pub mod imaging;
pub mod reportgenerator;
pub mod result;
pub mod utils;
pub mod zarchive;
