//! Small utility helpers shared across the generator.
//!
//! The functions in this module are intentionally lightweight to keep hot
//! paths fast. They are used by the archive layer, the stores, the icon
//! handler and the publication steps.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{Context, Result, bail};
use rand::RngExt;
use rand::distr::Alphanumeric;

/// A raster image dimension with an optional HiDPI scaling factor.
///
/// Serialized as `WxH` for scale 1 and `WxH@S` otherwise, matching the
/// directory names used in the media pool (`icons/64x64/`, `icons/128x128@2/`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ImageSize {
    /// Width in pixels (unscaled).
    pub width: u32,
    /// Height in pixels (unscaled).
    pub height: u32,
    /// Integer scaling factor, `1` for regular displays.
    pub scale: u32,
}

impl ImageSize {
    /// Create a square size with scale 1.
    #[must_use]
    pub const fn square(size: u32) -> Self {
        Self {
            width: size,
            height: size,
            scale: 1,
        }
    }

    /// Create a size with an explicit scale factor.
    #[must_use]
    pub const fn with_scale(size: u32, scale: u32) -> Self {
        Self {
            width: size,
            height: size,
            scale,
        }
    }

    /// What: Parse an image size string like `64x64` or `128x128@2`.
    ///
    /// Inputs:
    /// - `s`: Size string, `WxH` with an optional `@scale` suffix
    ///
    /// Output:
    /// - `Ok(ImageSize)` on success, an error for malformed input
    ///
    /// Details:
    /// - A missing `@scale` part defaults the scale to 1.
    /// - A trailing `@` without a number is rejected.
    pub fn parse(s: &str) -> Result<Self> {
        let Some((w_str, rest)) = s.split_once('x') else {
            bail!("image size '{s}' is missing the 'x' separator");
        };
        let (h_str, scale) = match rest.split_once('@') {
            Some((h, sc)) => {
                if sc.is_empty() {
                    bail!("image size '{s}' must not end with '@'");
                }
                (h, sc.parse::<u32>().context("invalid scale factor")?)
            }
            None => (rest, 1),
        };
        Ok(Self {
            width: w_str.parse().with_context(|| format!("invalid width in '{s}'"))?,
            height: h_str.parse().with_context(|| format!("invalid height in '{s}'"))?,
            scale,
        })
    }

    /// The largest edge multiplied by the scale factor, used for theme
    /// directory matching.
    #[must_use]
    pub fn to_int(self) -> u32 {
        if self.width > self.height {
            self.width * self.scale
        } else {
            self.height * self.scale
        }
    }
}

impl fmt::Display for ImageSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.scale == 1 {
            write!(f, "{}x{}", self.width, self.height)
        } else {
            write!(f, "{}x{}@{}", self.width, self.height, self.scale)
        }
    }
}

impl ImageSize {
    /// Compare two sizes by their scaled largest edge. Sizes with equal
    /// edge length but different scales compare equal here, which is what
    /// the theme directory matching wants; use `==` for identity.
    #[must_use]
    pub fn cmp_edge(self, other: Self) -> std::cmp::Ordering {
        self.to_int().cmp(&other.to_int())
    }
}

/// Get the compiled regex matching remote URL schemes.
fn remote_url_re() -> &'static regex::Regex {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| {
        regex::Regex::new(r"^(https?|ftps?)://").unwrap_or_else(|e| panic!("invalid remote-URL regex: {e}"))
    })
}

/// Check whether a path string refers to a remote location rather than a
/// local file.
#[must_use]
pub fn is_remote(uri: &str) -> bool {
    remote_url_re().is_match(uri)
}

/// What: Produce a random alphanumeric string.
///
/// Inputs:
/// - `len`: Requested length; a zero length is bumped to 1
///
/// Output:
/// - ASCII string of `len` random characters
///
/// Details:
/// - Used for the per-process temporary directory suffix.
#[must_use]
pub fn random_string(len: u32) -> String {
    let len = len.max(1) as usize;
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Test whether a string is a known top-level domain part of a reverse-DNS
/// component ID. The list covers the TLDs that realistically appear in
/// component identifiers.
#[must_use]
pub fn is_top_level_domain(value: &str) -> bool {
    const KNOWN_TLDS: &[&str] = &[
        "org", "com", "net", "io", "edu", "gov", "info", "de", "uk", "fr", "it", "es", "nl", "se",
        "no", "fi", "dk", "pl", "cz", "at", "ch", "be", "ru", "jp", "cn", "br", "ca", "au", "in",
        "us", "eu", "dev", "app", "page", "xyz", "me", "co", "tv", "gay",
    ];
    !value.is_empty() && KNOWN_TLDS.contains(&value)
}

/// What: Recover the component ID from a global component ID.
///
/// Inputs:
/// - `gcid`: Global component ID, four `/`-separated segments
///
/// Output:
/// - `Some(cid)` when the gcid has the expected shape, `None` otherwise
///
/// Details:
/// - Reverse-DNS ids are bucketed as `tld/domain/rest/hash`, so the first
///   three parts joined by `.` reconstruct the id. Other ids are bucketed
///   as `c/cc/full-id/hash` and the third part is already the id.
#[must_use]
pub fn cid_from_global_id(gcid: &str) -> Option<String> {
    let parts: Vec<&str> = gcid.split('/').collect();
    if parts.len() != 4 {
        return None;
    }

    if is_top_level_domain(parts[0]) {
        Some(format!("{}.{}.{}", parts[0], parts[1], parts[2]))
    } else {
        Some(parts[2].to_string())
    }
}

/// Create a hard link, falling back with a descriptive error.
pub fn hardlink(src: &Path, dest: &Path) -> Result<()> {
    fs::hard_link(src, dest)
        .with_context(|| format!("unable to link '{}' -> '{}'", src.display(), dest.display()))
}

/// What: Recursively copy a directory tree.
///
/// Inputs:
/// - `src_dir`: Source directory (must exist)
/// - `dest_dir`: Destination root, created if missing
/// - `use_hardlinks`: Hardlink files instead of copying their bytes
///
/// Output:
/// - `Ok(())` when the whole tree was transferred
///
/// Details:
/// - Directory structure is created first, then files are linked or copied.
/// - Only regular files and directories are handled.
pub fn copy_dir(src_dir: &Path, dest_dir: &Path, use_hardlinks: bool) -> Result<()> {
    if !dest_dir.exists() {
        fs::create_dir_all(dest_dir)?;
    }
    if !dest_dir.is_dir() {
        bail!("{} is not a directory", dest_dir.display());
    }

    if !src_dir.is_dir() {
        if use_hardlinks {
            return hardlink(src_dir, dest_dir);
        }
        fs::copy(src_dir, dest_dir)?;
        return Ok(());
    }

    let mut files: Vec<PathBuf> = Vec::new();
    for entry in walkdir::WalkDir::new(src_dir) {
        let entry = entry?;
        let rel = entry
            .path()
            .strip_prefix(src_dir)
            .context("walked entry outside of source root")?;
        let dest = dest_dir.join(rel);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&dest)?;
        } else if entry.file_type().is_file() {
            files.push(entry.path().to_path_buf());
        }
    }

    for file in files {
        let rel = file.strip_prefix(src_dir).context("file outside of source root")?;
        let dest = dest_dir.join(rel);
        if use_hardlinks {
            if dest.exists() {
                fs::remove_file(&dest)?;
            }
            hardlink(&file, &dest)?;
        } else {
            fs::copy(&file, &dest)?;
        }
    }

    Ok(())
}

/// Extract the file name portion of a URI, stripping any query or fragment
/// suffix.
#[must_use]
pub fn filename_from_uri(uri: &str) -> String {
    let base = uri.rsplit('/').next().unwrap_or(uri);
    let base = base.split('?').next().unwrap_or(base);
    let base = base.split('#').next().unwrap_or(base);
    base.to_string()
}

/// Check whether a directory exists and contains no entries.
#[must_use]
pub fn dir_empty(path: &Path) -> bool {
    match fs::read_dir(path) {
        Ok(mut it) => it.next().is_none(),
        Err(_) => false,
    }
}

/// Return the trailing file-name component of a path string.
#[must_use]
pub fn path_basename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// What: Escape a string for embedding in XML text content.
///
/// Inputs:
/// - `s`: Raw text
///
/// Output:
/// - Text with `&`, `<`, `>`, `"` and `'` replaced by entities
#[must_use]
pub fn escape_xml(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_size_parses_plain_and_scaled_forms() {
        let plain = ImageSize::parse("64x64").expect("plain size");
        assert_eq!(plain, ImageSize::square(64));
        assert_eq!(plain.to_string(), "64x64");

        let scaled = ImageSize::parse("128x128@2").expect("scaled size");
        assert_eq!(scaled.width, 128);
        assert_eq!(scaled.scale, 2);
        assert_eq!(scaled.to_string(), "128x128@2");
        assert_eq!(scaled.to_int(), 256);

        assert!(ImageSize::parse("64x64@").is_err());
        assert!(ImageSize::parse("x64").is_err());
        assert!(ImageSize::parse("sixtyfour").is_err());
    }

    #[test]
    fn image_size_ordering_uses_scaled_edge() {
        use std::cmp::Ordering;
        assert_eq!(ImageSize::square(64).cmp_edge(ImageSize::square(128)), Ordering::Less);
        assert_eq!(
            ImageSize::with_scale(64, 2).cmp_edge(ImageSize::square(64)),
            Ordering::Greater
        );
        assert_eq!(
            ImageSize::with_scale(64, 2).cmp_edge(ImageSize::square(128)),
            Ordering::Equal
        );
    }

    #[test]
    fn remote_uri_detection() {
        assert!(is_remote("http://example.org/dists"));
        assert!(is_remote("https://example.org/dists"));
        assert!(is_remote("ftp://example.org/pub"));
        assert!(is_remote("ftps://example.org/pub"));
        assert!(!is_remote("/srv/mirror/debian"));
        assert!(!is_remote("file:///srv/mirror"));
    }

    #[test]
    fn cid_recovery_from_global_id() {
        assert_eq!(
            cid_from_global_id("org/example/app/1234abcd").as_deref(),
            Some("org.example.app")
        );
        assert_eq!(
            cid_from_global_id("f/fo/foobar.desktop/1234abcd").as_deref(),
            Some("foobar.desktop")
        );
        assert_eq!(cid_from_global_id("too/few/parts"), None);
    }

    #[test]
    fn filename_from_uri_strips_query_and_fragment() {
        assert_eq!(filename_from_uri("https://x.org/a/b/icon.png?x=1"), "icon.png");
        assert_eq!(filename_from_uri("https://x.org/a/b/icon.png#frag"), "icon.png");
        assert_eq!(filename_from_uri("plain.txt"), "plain.txt");
    }

    #[test]
    fn random_string_has_requested_length() {
        assert_eq!(random_string(8).len(), 8);
        assert_eq!(random_string(0).len(), 1);
    }
}
