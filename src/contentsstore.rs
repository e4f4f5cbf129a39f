//! Persistent index of package contents.
//!
//! Backed by a memory-mapped copy-on-write key/value store with one writer
//! and many readers. Three tables are kept per package ID: the full file
//! list, the icon-file subset and the locale-file subset. All writes to the
//! tables of one package happen in a single transaction.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use redb::{Database, ReadableTable, TableDefinition};
use tracing::debug;

/// Table layout shared by all string-keyed tables.
type StrTable = TableDefinition<'static, &'static str, &'static [u8]>;

const CONTENTS_TABLE: StrTable = TableDefinition::new("contents");
const ICONS_TABLE: StrTable = TableDefinition::new("icondata");
const LOCALE_TABLE: StrTable = TableDefinition::new("localedata");

/// Store for per-package file lists.
pub struct ContentsStore {
    db: Database,
}

impl ContentsStore {
    /// What: Open (or create) the contents store in a directory.
    ///
    /// Inputs:
    /// - `dir`: Store directory, created when missing
    ///
    /// Output:
    /// - The opened store with all tables present
    pub fn open(dir: &Path) -> Result<Self> {
        debug!(dir = %dir.display(), "opening contents cache");
        fs::create_dir_all(dir)
            .with_context(|| format!("unable to create store directory {}", dir.display()))?;

        let db = Database::create(dir.join("contents.redb"))
            .with_context(|| format!("unable to open contents store in {}", dir.display()))?;

        // make sure every table exists, so read transactions never fail
        let txn = db.begin_write()?;
        {
            txn.open_table(CONTENTS_TABLE)?;
            txn.open_table(ICONS_TABLE)?;
            txn.open_table(LOCALE_TABLE)?;
        }
        txn.commit()?;

        Ok(Self { db })
    }

    /// What: Record the file list of a package.
    ///
    /// Inputs:
    /// - `pkid`: Package ID
    /// - `contents`: All file paths inside the package
    ///
    /// Details:
    /// - Icon files (`/usr/share/icons/…`, `/usr/share/pixmaps/…`) and
    ///   locale files (`*.mo`, `*.qm`) are additionally indexed in their
    ///   own tables; all writes share one transaction.
    pub fn add_contents(&self, pkid: &str, contents: &[String]) -> Result<()> {
        let mut icon_info: Vec<&str> = Vec::new();
        let mut locale_info: Vec<&str> = Vec::new();
        for f in contents {
            if f.starts_with("/usr/share/icons/") || f.starts_with("/usr/share/pixmaps/") {
                icon_info.push(f);
                continue;
            }
            if f.ends_with(".mo") || f.ends_with(".qm") {
                locale_info.push(f);
            }
        }

        let contents_str = contents.join("\n");

        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(CONTENTS_TABLE)?;
            table.insert(pkid, string_value(&contents_str).as_slice())?;

            if !icon_info.is_empty() {
                let mut table = txn.open_table(ICONS_TABLE)?;
                table.insert(pkid, string_value(&icon_info.join("\n")).as_slice())?;
            }
            if !locale_info.is_empty() {
                let mut table = txn.open_table(LOCALE_TABLE)?;
                table.insert(pkid, string_value(&locale_info.join("\n")).as_slice())?;
            }
        }
        txn.commit()?;
        Ok(())
    }

    fn get_list(&self, table: StrTable, pkid: &str) -> Result<Vec<String>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(table)?;
        let Some(value) = table.get(pkid)? else {
            return Ok(Vec::new());
        };
        Ok(split_value(value.value()))
    }

    /// The full file list of a package (empty when unknown).
    pub fn get_contents(&self, pkid: &str) -> Result<Vec<String>> {
        self.get_list(CONTENTS_TABLE, pkid)
    }

    /// The icon-file subset of a package.
    pub fn get_icons(&self, pkid: &str) -> Result<Vec<String>> {
        self.get_list(ICONS_TABLE, pkid)
    }

    /// The locale-file subset of a package.
    pub fn get_locale_files(&self, pkid: &str) -> Result<Vec<String>> {
        self.get_list(LOCALE_TABLE, pkid)
    }

    fn get_files_map(
        &self,
        table: StrTable,
        pkids: &[String],
        use_basename: bool,
    ) -> Result<HashMap<String, String>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(table)?;

        let mut map = HashMap::new();
        for pkid in pkids {
            let Some(value) = table.get(pkid.as_str())? else {
                continue;
            };
            for line in split_value(value.value()) {
                if use_basename {
                    let base = crate::utils::path_basename(&line).to_string();
                    map.insert(base, pkid.clone());
                } else {
                    map.insert(line, pkid.clone());
                }
            }
        }
        Ok(map)
    }

    /// Inverted index `file path → pkid` over the full contents of the
    /// given packages.
    pub fn get_contents_map(&self, pkids: &[String]) -> Result<HashMap<String, String>> {
        self.get_files_map(CONTENTS_TABLE, pkids, false)
    }

    /// Inverted index `icon path → pkid` over the given packages.
    pub fn get_icon_files_map(&self, pkids: &[String]) -> Result<HashMap<String, String>> {
        self.get_files_map(ICONS_TABLE, pkids, false)
    }

    /// Inverted index over locale files, keyed by file *basename*.
    ///
    /// Gettext domains are looked up by file name across packages, so the
    /// full path is intentionally not part of the key. A domain spread
    /// over several packages keeps only one entry.
    pub fn get_locale_map(&self, pkids: &[String]) -> Result<HashMap<String, String>> {
        self.get_files_map(LOCALE_TABLE, pkids, true)
    }

    /// Remove one package from all tables atomically.
    pub fn remove_package(&self, pkid: &str) -> Result<()> {
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(CONTENTS_TABLE)?;
            table.remove(pkid)?;
            let mut table = txn.open_table(ICONS_TABLE)?;
            table.remove(pkid)?;
            let mut table = txn.open_table(LOCALE_TABLE)?;
            table.remove(pkid)?;
        }
        txn.commit()?;
        Ok(())
    }

    /// Remove a set of packages from all tables in one transaction.
    pub fn remove_packages(&self, pkids: &HashSet<String>) -> Result<()> {
        let txn = self.db.begin_write()?;
        {
            let mut contents = txn.open_table(CONTENTS_TABLE)?;
            let mut icons = txn.open_table(ICONS_TABLE)?;
            let mut locale = txn.open_table(LOCALE_TABLE)?;
            for pkid in pkids {
                contents.remove(pkid.as_str())?;
                icons.remove(pkid.as_str())?;
                locale.remove(pkid.as_str())?;
                debug!(pkid = %pkid, "removed package from contents index");
            }
        }
        txn.commit()?;
        Ok(())
    }

    /// Whether contents are recorded for a package.
    pub fn package_exists(&self, pkid: &str) -> Result<bool> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(CONTENTS_TABLE)?;
        Ok(table.get(pkid)?.is_some())
    }

    /// All package IDs with recorded contents.
    pub fn get_package_id_set(&self) -> Result<HashSet<String>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(CONTENTS_TABLE)?;
        let mut set = HashSet::new();
        for item in table.iter()? {
            let (key, _) = item?;
            set.insert(key.value().to_string());
        }
        Ok(set)
    }

    /// Flush pending data to disk. Commits are durable, so this is a
    /// checkpoint for callers that want an explicit barrier.
    pub fn sync(&self) -> Result<()> {
        let txn = self.db.begin_write()?;
        txn.commit()?;
        Ok(())
    }
}

/// Values are stored with a single trailing NUL for compatibility with the
/// on-disk format of earlier generator generations.
fn string_value(s: &str) -> Vec<u8> {
    let mut v = Vec::with_capacity(s.len() + 1);
    v.extend_from_slice(s.as_bytes());
    v.push(0);
    v
}

fn split_value(raw: &[u8]) -> Vec<String> {
    let raw = raw.strip_suffix(&[0]).unwrap_or(raw);
    let text = String::from_utf8_lossy(raw);
    text.split('\n')
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_contents() -> Vec<String> {
        vec![
            "/usr/bin/foo".to_string(),
            "/usr/share/icons/hicolor/64x64/apps/foo.png".to_string(),
            "/usr/share/pixmaps/foo.xpm".to_string(),
            "/usr/share/locale/de/LC_MESSAGES/foo.mo".to_string(),
            "/usr/share/doc/foo/copyright".to_string(),
        ]
    }

    #[test]
    fn contents_roundtrip_and_subsets() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = ContentsStore::open(dir.path()).expect("open");

        let contents = sample_contents();
        store.add_contents("foo/1.0/amd64", &contents).expect("add");

        let mut read_back = store.get_contents("foo/1.0/amd64").expect("get");
        read_back.sort();
        let mut expected = contents.clone();
        expected.sort();
        assert_eq!(read_back, expected);

        let icons = store.get_icons("foo/1.0/amd64").expect("icons");
        assert_eq!(icons.len(), 2);
        for icon in &icons {
            assert!(contents.contains(icon), "icon subset not within contents");
        }

        let locale = store.get_locale_files("foo/1.0/amd64").expect("locale");
        assert_eq!(locale, vec!["/usr/share/locale/de/LC_MESSAGES/foo.mo".to_string()]);
    }

    #[test]
    fn locale_map_uses_basenames() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = ContentsStore::open(dir.path()).expect("open");
        store
            .add_contents("foo/1.0/amd64", &sample_contents())
            .expect("add");

        let map = store
            .get_locale_map(&["foo/1.0/amd64".to_string()])
            .expect("map");
        assert_eq!(map.get("foo.mo").map(String::as_str), Some("foo/1.0/amd64"));
        assert!(!map.contains_key("/usr/share/locale/de/LC_MESSAGES/foo.mo"));

        let icon_map = store
            .get_icon_files_map(&["foo/1.0/amd64".to_string()])
            .expect("icon map");
        assert!(icon_map.contains_key("/usr/share/pixmaps/foo.xpm"));
    }

    #[test]
    fn remove_packages_clears_all_tables() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = ContentsStore::open(dir.path()).expect("open");
        store
            .add_contents("foo/1.0/amd64", &sample_contents())
            .expect("add");
        store
            .add_contents("bar/2.0/amd64", &["/usr/bin/bar".to_string()])
            .expect("add");

        let mut to_remove = HashSet::new();
        to_remove.insert("foo/1.0/amd64".to_string());
        store.remove_packages(&to_remove).expect("remove");

        assert!(!store.package_exists("foo/1.0/amd64").expect("exists"));
        assert!(store.get_icons("foo/1.0/amd64").expect("icons").is_empty());
        assert!(store.get_locale_files("foo/1.0/amd64").expect("locale").is_empty());

        let ids = store.get_package_id_set().expect("ids");
        assert!(ids.contains("bar/2.0/amd64"));
        assert!(ids.is_disjoint(&to_remove));
    }
}
