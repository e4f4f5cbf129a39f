//! Debian archive helpers: version comparison and index retrieval.

use std::cmp::Ordering;
use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use tracing::debug;

use crate::downloader::Downloader;
use crate::utils::is_remote;

/// What: Fetch an index file that exists in one of several compressions.
///
/// Inputs:
/// - `prefix`: Archive root (path or URL)
/// - `dest_prefix`: Cache directory for downloaded files
/// - `suffix`: Relative path with a `{}` placeholder for the extension
///
/// Output:
/// - The local path of the first variant (`xz`, `bz2`, `gz`) that could
///   be obtained
///
/// Details:
/// - Remote files are downloaded once and reused; local files are used
///   in place.
pub fn download_if_necessary(prefix: &str, dest_prefix: &Path, suffix: &str) -> Result<PathBuf> {
    const EXTS: &[&str] = &["xz", "bz2", "gz"];

    for ext in EXTS {
        let formatted_suffix = suffix.replacen("{}", ext, 1);
        let fname = format!("{}/{}", prefix.trim_end_matches('/'), formatted_suffix);

        if is_remote(&fname) {
            let dest = dest_prefix.join(&formatted_suffix);
            let dl = Downloader::acquire()?;
            match dl.download_file(&fname, &dest, 2) {
                Ok(()) => return Ok(dest),
                Err(e) => {
                    debug!(url = %fname, error = %e, "unable to download");
                }
            }
        } else {
            let path = PathBuf::from(&fname);
            if path.exists() {
                return Ok(path);
            }
        }
    }

    bail!(
        "could not obtain any file matching {}/{}",
        prefix.trim_end_matches('/'),
        suffix
    )
}

/// Character weight for the non-digit comparison: `~` sorts before
/// everything, letters by their value, other characters after all letters.
fn order(c: u8) -> i32 {
    if c.is_ascii_digit() {
        0
    } else if c.is_ascii_alphabetic() {
        i32::from(c)
    } else if c == b'~' {
        -1
    } else if c != 0 {
        i32::from(c) + 256
    } else {
        0
    }
}

/// Compare one version fragment by splitting it into runs of digits and
/// non-digits, exactly like dpkg does.
fn cmp_fragment(a: &[u8], b: &[u8]) -> i32 {
    let mut lhs = 0usize;
    let mut rhs = 0usize;

    while lhs < a.len() && rhs < b.len() {
        let mut first_diff = 0i32;

        while lhs < a.len()
            && rhs < b.len()
            && (!a[lhs].is_ascii_digit() || !b[rhs].is_ascii_digit())
        {
            let vc = order(a[lhs]);
            let rc = order(b[rhs]);
            if vc != rc {
                return vc - rc;
            }
            lhs += 1;
            rhs += 1;
        }

        while lhs < a.len() && a[lhs] == b'0' {
            lhs += 1;
        }
        while rhs < b.len() && b[rhs] == b'0' {
            rhs += 1;
        }
        while lhs < a.len()
            && rhs < b.len()
            && a[lhs].is_ascii_digit()
            && b[rhs].is_ascii_digit()
        {
            if first_diff == 0 {
                first_diff = i32::from(a[lhs]) - i32::from(b[rhs]);
            }
            lhs += 1;
            rhs += 1;
        }

        if lhs < a.len() && a[lhs].is_ascii_digit() {
            return 1;
        }
        if rhs < b.len() && b[rhs].is_ascii_digit() {
            return -1;
        }
        if first_diff != 0 {
            return first_diff;
        }
    }

    if lhs == a.len() && rhs == b.len() {
        return 0;
    }
    if lhs == a.len() {
        if b[rhs] == b'~' {
            return 1;
        }
        return -1;
    }
    if a[lhs] == b'~' {
        return -1;
    }
    1
}

/// What: Compare two Debian version strings.
///
/// Inputs:
/// - `a`, `b`: Version strings (`[epoch:]upstream[-revision]`)
///
/// Output:
/// - Negative when `a < b`, zero when equal, positive when `a > b`
///
/// Details:
/// - The epoch dominates (a missing epoch equals `0`), then the upstream
///   version up to the last `-`, then the revision; each fragment follows
///   the dpkg digit-run / non-digit-run rules with `~` sorting lowest.
#[must_use]
pub fn compare_versions(a: &str, b: &str) -> i32 {
    let ab = a.as_bytes();
    let bb = b.as_bytes();

    // split off the epochs; a zero epoch is the same as none
    let a_colon = ab.iter().position(|&c| c == b':');
    let b_colon = bb.iter().position(|&c| c == b':');

    let (mut a_epoch, a_rest) = match a_colon {
        Some(idx) => (&ab[..idx], &ab[idx + 1..]),
        None => (&ab[..0], ab),
    };
    let (mut b_epoch, b_rest) = match b_colon {
        Some(idx) => (&bb[..idx], &bb[idx + 1..]),
        None => (&bb[..0], bb),
    };
    while a_epoch.first() == Some(&b'0') {
        a_epoch = &a_epoch[1..];
    }
    while b_epoch.first() == Some(&b'0') {
        b_epoch = &b_epoch[1..];
    }

    let res = cmp_fragment(a_epoch, b_epoch);
    if res != 0 {
        return res;
    }

    // split upstream version and revision at the last '-'
    let a_dash = a_rest.iter().rposition(|&c| c == b'-');
    let b_dash = b_rest.iter().rposition(|&c| c == b'-');

    let (a_upstream, a_rev) = match a_dash {
        Some(idx) => (&a_rest[..idx], &a_rest[idx + 1..]),
        None => (a_rest, &a_rest[..0]),
    };
    let (b_upstream, b_rev) = match b_dash {
        Some(idx) => (&b_rest[..idx], &b_rest[idx + 1..]),
        None => (b_rest, &b_rest[..0]),
    };

    let res = cmp_fragment(a_upstream, b_upstream);
    if res != 0 {
        return res;
    }

    cmp_fragment(a_rev, b_rev)
}

/// Ordering wrapper around [`compare_versions`].
#[must_use]
pub fn version_ordering(a: &str, b: &str) -> Ordering {
    compare_versions(a, b).cmp(&0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_lt(a: &str, b: &str) {
        assert!(compare_versions(a, b) < 0, "expected {a} < {b}");
        assert!(compare_versions(b, a) > 0, "expected {b} > {a}");
    }

    #[test]
    fn dpkg_reference_table() {
        assert_lt("1:7.4.052-1ubuntu3", "1:7.4.052-1ubuntu3.1");
        assert_lt("1.0~beta1", "1.0");
        assert!(compare_versions("2:1.0", "1:2.0") > 0);

        assert_lt("1.0", "1.1");
        assert_lt("1.0-1", "1.0-2");
        assert_lt("1.0", "1.0-1");
        assert_lt("2.7.2-linux-1", "2.7.3-linux-1");
        assert_lt("1.0~rc1", "1.0~rc2");
        assert_lt("0.9", "1.0");
        // letters sort before other non-alphanumerics
        assert_lt("1.0a", "1.0+");
        // leading zeros in numeric runs are insignificant
        assert_eq!(compare_versions("1.01", "1.1"), 0);
        // zero epoch equals no epoch
        assert_eq!(compare_versions("0:1.0", "1.0"), 0);
    }

    #[test]
    fn comparison_is_reflexive_and_antisymmetric() {
        for v in ["1.0", "1:2.3-4", "7.4.052-1ubuntu3.1", "1.0~beta1+git20200101"] {
            assert_eq!(compare_versions(v, v), 0);
        }
        let pairs = [("1.0", "2.0"), ("1.0~a", "1.0"), ("1.2-1", "1.2-10")];
        for (a, b) in pairs {
            let fwd = compare_versions(a, b);
            let rev = compare_versions(b, a);
            assert!(fwd < 0 && rev > 0, "signs must oppose for {a} / {b}");
        }
    }

    #[test]
    fn transitivity_on_sorted_chain() {
        let chain = ["1.0~~", "1.0~beta1", "1.0", "1.0-1", "1.0+b1", "1:0.1"];
        for window in chain.windows(2) {
            assert_lt(window[0], window[1]);
        }
        // spot-check the transitive closure
        assert_lt(chain[0], chain[5]);
        assert_lt(chain[1], chain[4]);
    }
}
