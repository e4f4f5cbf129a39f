//! The main metadata store.
//!
//! Persists, per package: the component IDs it produced (or the `ignore` /
//! `seen` markers), serialized component metadata in both catalog formats,
//! hint documents, per-repository index state and timestamped statistics.
//! Also owns the media pool and sweeps orphaned metadata and media.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use redb::{Database, ReadableTable, TableDefinition};
use tracing::{debug, info, warn};

use crate::config::{Config, DataType};
use crate::result::GeneratorResult;

type StrTable = TableDefinition<'static, &'static str, &'static [u8]>;
type IntTable = TableDefinition<'static, u64, &'static [u8]>;

const PACKAGES_TABLE: StrTable = TableDefinition::new("packages");
const REPOSITORY_TABLE: StrTable = TableDefinition::new("repository");
const METADATA_XML_TABLE: StrTable = TableDefinition::new("metadata_xml");
const METADATA_YAML_TABLE: StrTable = TableDefinition::new("metadata_yaml");
const HINTS_TABLE: StrTable = TableDefinition::new("hints");
const STATISTICS_TABLE: IntTable = TableDefinition::new("statistics");

/// A value in a repository-info or statistics record.
#[derive(Clone, Debug, PartialEq)]
pub enum DataValue {
    /// 64-bit signed integer.
    Int(i64),
    /// 64-bit float.
    Float(f64),
    /// UTF-8 string (up to 64 KiB).
    Text(String),
}

impl DataValue {
    /// The integer value, when this is an [`DataValue::Int`].
    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// The string value, when this is a [`DataValue::Text`].
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(v) => Some(v),
            _ => None,
        }
    }
}

/// What: Serialize a string-keyed variant map into the binary record format.
///
/// Inputs:
/// - `data`: Key/value map
/// - `timestamp`: Included for statistics entries only
///
/// Output:
/// - Version byte `1`, optional 8-byte LE timestamp, 4-byte LE count,
///   then `(u16 key-len, key, u8 type-tag, value)` per entry with tags
///   `1`=int64, `2`=float64, `3`=length-prefixed string
fn serialize_variant_map(data: &HashMap<String, DataValue>, timestamp: Option<u64>) -> Vec<u8> {
    let mut buffer = Vec::with_capacity(128);
    buffer.push(1u8);

    if let Some(ts) = timestamp {
        buffer.extend_from_slice(&ts.to_le_bytes());
    }

    buffer.extend_from_slice(&(data.len() as u32).to_le_bytes());

    // sorted for deterministic records
    let mut keys: Vec<&String> = data.keys().collect();
    keys.sort();
    for key in keys {
        buffer.extend_from_slice(&(key.len() as u16).to_le_bytes());
        buffer.extend_from_slice(key.as_bytes());
        match &data[key] {
            DataValue::Int(v) => {
                buffer.push(1);
                buffer.extend_from_slice(&v.to_le_bytes());
            }
            DataValue::Float(v) => {
                buffer.push(2);
                buffer.extend_from_slice(&v.to_le_bytes());
            }
            DataValue::Text(v) => {
                buffer.push(3);
                buffer.extend_from_slice(&(v.len() as u16).to_le_bytes());
                buffer.extend_from_slice(v.as_bytes());
            }
        }
    }

    buffer
}

fn deserialize_variant_map(
    raw: &[u8],
    has_timestamp: bool,
) -> Result<(HashMap<String, DataValue>, u64)> {
    let min_size = if has_timestamp { 13 } else { 5 };
    if raw.len() < min_size {
        bail!("invalid record: buffer too small");
    }

    let mut pos = 0usize;
    let version = raw[pos];
    pos += 1;
    if version != 1 {
        bail!("unsupported record version: {version}");
    }

    let mut time = 0u64;
    if has_timestamp {
        time = u64::from_le_bytes(raw[pos..pos + 8].try_into()?);
        pos += 8;
    }

    let count = u32::from_le_bytes(raw[pos..pos + 4].try_into()?);
    pos += 4;

    let mut data = HashMap::with_capacity(count as usize);
    for _ in 0..count {
        if pos + 2 > raw.len() {
            bail!("invalid record: truncated key length");
        }
        let key_len = u16::from_le_bytes(raw[pos..pos + 2].try_into()?) as usize;
        pos += 2;
        if pos + key_len > raw.len() {
            bail!("invalid record: truncated key");
        }
        let key = String::from_utf8_lossy(&raw[pos..pos + key_len]).into_owned();
        pos += key_len;

        if pos >= raw.len() {
            bail!("invalid record: missing value type");
        }
        let value_type = raw[pos];
        pos += 1;

        let value = match value_type {
            1 => {
                if pos + 8 > raw.len() {
                    bail!("invalid record: truncated int64 value");
                }
                let v = i64::from_le_bytes(raw[pos..pos + 8].try_into()?);
                pos += 8;
                DataValue::Int(v)
            }
            2 => {
                if pos + 8 > raw.len() {
                    bail!("invalid record: truncated float value");
                }
                let v = f64::from_le_bytes(raw[pos..pos + 8].try_into()?);
                pos += 8;
                DataValue::Float(v)
            }
            3 => {
                if pos + 2 > raw.len() {
                    bail!("invalid record: truncated string length");
                }
                let str_len = u16::from_le_bytes(raw[pos..pos + 2].try_into()?) as usize;
                pos += 2;
                if pos + str_len > raw.len() {
                    bail!("invalid record: truncated string value");
                }
                let v = String::from_utf8_lossy(&raw[pos..pos + str_len]).into_owned();
                pos += str_len;
                DataValue::Text(v)
            }
            other => bail!("unknown value type: {other}"),
        };
        data.insert(key, value);
    }

    Ok((data, time))
}

/// Per-repository state, keyed by `suite-section-arch`.
#[derive(Clone, Debug, Default)]
pub struct RepoInfo {
    /// Arbitrary typed entries; `mtime` is the one the backends use.
    pub data: HashMap<String, DataValue>,
}

impl RepoInfo {
    /// Binary-serialize this record.
    #[must_use]
    pub fn serialize(&self) -> Vec<u8> {
        serialize_variant_map(&self.data, None)
    }

    /// Parse a binary record.
    pub fn deserialize(raw: &[u8]) -> Result<Self> {
        let (data, _) = deserialize_variant_map(raw, false)?;
        Ok(Self { data })
    }
}

/// One timestamped statistics record.
#[derive(Clone, Debug, Default)]
pub struct StatisticsEntry {
    /// Unix timestamp the record was taken at.
    pub time: u64,
    /// Statistics payload (`suite`, `section`, counters).
    pub data: HashMap<String, DataValue>,
}

impl StatisticsEntry {
    /// Binary-serialize this record, embedding the timestamp.
    #[must_use]
    pub fn serialize(&self) -> Vec<u8> {
        serialize_variant_map(&self.data, Some(self.time))
    }

    /// Parse a binary record.
    pub fn deserialize(raw: &[u8]) -> Result<Self> {
        let (data, time) = deserialize_variant_map(raw, true)?;
        Ok(Self { time, data })
    }
}

/// The main persistent data store.
pub struct DataStore {
    db: Database,
    media_dir: PathBuf,
}

impl DataStore {
    /// What: Open (or create) the data store.
    ///
    /// Inputs:
    /// - `dir`: Store directory
    /// - `media_base_dir`: Media export root; the pool is created below it
    pub fn open(dir: &Path, media_base_dir: &Path) -> Result<Self> {
        debug!(dir = %dir.display(), "opening data store");
        fs::create_dir_all(dir)
            .with_context(|| format!("unable to create store directory {}", dir.display()))?;

        let db = Database::create(dir.join("main.redb"))
            .with_context(|| format!("unable to open data store in {}", dir.display()))?;

        let txn = db.begin_write()?;
        {
            txn.open_table(PACKAGES_TABLE)?;
            txn.open_table(REPOSITORY_TABLE)?;
            txn.open_table(METADATA_XML_TABLE)?;
            txn.open_table(METADATA_YAML_TABLE)?;
            txn.open_table(HINTS_TABLE)?;
            txn.open_table(STATISTICS_TABLE)?;
        }
        txn.commit()?;

        let media_dir = media_base_dir.join("pool");
        fs::create_dir_all(&media_dir)?;

        Ok(Self { db, media_dir })
    }

    /// Open the store at its configured workspace location.
    pub fn open_with_config(conf: &Config) -> Result<Self> {
        Self::open(&conf.database_dir().join("main"), conf.media_export_dir())
    }

    /// The media pool directory.
    #[must_use]
    pub fn media_export_pool_dir(&self) -> &Path {
        &self.media_dir
    }

    fn put_str(&self, table: StrTable, key: &str, value: &str) -> Result<()> {
        let mut data = Vec::with_capacity(value.len() + 1);
        data.extend_from_slice(value.as_bytes());
        data.push(0);

        let txn = self.db.begin_write()?;
        {
            let mut t = txn.open_table(table)?;
            t.insert(key, data.as_slice())?;
        }
        txn.commit()?;
        Ok(())
    }

    fn get_str(&self, table: StrTable, key: &str) -> Result<Option<String>> {
        let txn = self.db.begin_read()?;
        let t = txn.open_table(table)?;
        let Some(guard) = t.get(key)? else {
            return Ok(None);
        };
        let raw = guard.value();
        let raw = raw.strip_suffix(&[0]).unwrap_or(raw);
        Ok(Some(String::from_utf8_lossy(raw).into_owned()))
    }

    fn put_bytes(&self, table: StrTable, key: &str, value: &[u8]) -> Result<()> {
        let txn = self.db.begin_write()?;
        {
            let mut t = txn.open_table(table)?;
            t.insert(key, value)?;
        }
        txn.commit()?;
        Ok(())
    }

    fn get_bytes(&self, table: StrTable, key: &str) -> Result<Option<Vec<u8>>> {
        let txn = self.db.begin_read()?;
        let t = txn.open_table(table)?;
        Ok(t.get(key)?.map(|guard| guard.value().to_vec()))
    }

    const fn metadata_table(dtype: DataType) -> StrTable {
        match dtype {
            DataType::Xml => METADATA_XML_TABLE,
            DataType::Yaml => METADATA_YAML_TABLE,
        }
    }

    /// Whether serialized metadata exists for a gcid in the given format.
    pub fn metadata_exists(&self, dtype: DataType, gcid: &str) -> Result<bool> {
        Ok(self.get_metadata(dtype, gcid)?.is_some_and(|m| !m.is_empty()))
    }

    /// Store serialized metadata for a gcid.
    pub fn set_metadata(&self, dtype: DataType, gcid: &str, data: &str) -> Result<()> {
        self.put_str(Self::metadata_table(dtype), gcid, data)
    }

    /// Fetch serialized metadata for a gcid.
    pub fn get_metadata(&self, dtype: DataType, gcid: &str) -> Result<Option<String>> {
        self.get_str(Self::metadata_table(dtype), gcid)
    }

    /// Whether a hints document is stored for a package.
    pub fn has_hints(&self, pkid: &str) -> Result<bool> {
        Ok(self.get_str(HINTS_TABLE, pkid)?.is_some_and(|h| !h.is_empty()))
    }

    /// Store the hints JSON document of a package.
    pub fn set_hints(&self, pkid: &str, hints_json: &str) -> Result<()> {
        self.put_str(HINTS_TABLE, pkid, hints_json)
    }

    /// Fetch the hints JSON document of a package.
    pub fn get_hints(&self, pkid: &str) -> Result<Option<String>> {
        self.get_str(HINTS_TABLE, pkid)
    }

    /// The raw `packages` entry of a package.
    pub fn get_package_value(&self, pkid: &str) -> Result<Option<String>> {
        self.get_str(PACKAGES_TABLE, pkid)
    }

    /// Permanently mark a package as uninteresting.
    pub fn set_package_ignore(&self, pkid: &str) -> Result<()> {
        self.put_str(PACKAGES_TABLE, pkid, "ignore")
    }

    /// Whether a package is marked as uninteresting.
    pub fn is_ignored(&self, pkid: &str) -> Result<bool> {
        Ok(self.get_package_value(pkid)?.as_deref() == Some("ignore"))
    }

    /// Whether the store knows anything about a package.
    pub fn package_exists(&self, pkid: &str) -> Result<bool> {
        Ok(self.get_package_value(pkid)?.is_some_and(|v| !v.is_empty()))
    }

    /// What: Record the outcome of one package extraction.
    ///
    /// Inputs:
    /// - `dtype`: Canonical metadata format of this run
    /// - `gres`: Extraction result (components, gcids, hints)
    /// - `always_regenerate`: Serialize even when metadata for a gcid
    ///   already exists
    ///
    /// Details:
    /// - Components whose gcid already has stored metadata only get their
    ///   gcid registered, the body is not serialized again.
    /// - A package with hints but no components is marked `seen`; a
    ///   package with neither is marked `ignore`.
    pub fn add_generator_result(
        &self,
        dtype: DataType,
        gres: &mut GeneratorResult,
        always_regenerate: bool,
    ) -> Result<()> {
        if gres.is_unit_ignored() {
            self.set_package_ignore(&gres.pkid())?;
            return Ok(());
        }

        let cpts: Vec<crate::compose::Component> =
            gres.components().into_iter().cloned().collect();
        for cpt in cpts {
            let Some(gcid) = gres.gcid_for_component(&cpt) else {
                continue;
            };
            if self.metadata_exists(dtype, &gcid)? && !always_regenerate {
                // this exact metadata was stored before, only the gcid
                // reference is kept
                continue;
            }

            let data = match cpt.to_metadata(dtype) {
                Ok(d) => d.trim_end().to_string(),
                Err(e) => {
                    gres.add_hint_msg(&cpt.id, "metadata-serialization-failed", &e.to_string());
                    continue;
                }
            };
            if !data.is_empty() {
                self.set_metadata(dtype, &gcid, &data)?;
            }
        }

        if gres.hints_count() > 0 {
            let hints_json = gres.hints_to_json();
            if !hints_json.is_empty() {
                self.set_hints(&gres.pkid(), &hints_json)?;
            }
        }

        let gcids = gres.component_gcids();
        if gcids.is_empty() {
            // no components, but hints were recorded: mark as seen so the
            // package is not reprocessed every run
            self.put_str(PACKAGES_TABLE, &gres.pkid(), "seen")
        } else {
            self.put_str(PACKAGES_TABLE, &gres.pkid(), &gcids.join("\n"))
        }
    }

    /// The gcids a package produced; empty for `ignore`/`seen` markers.
    pub fn get_gcids_for_package(&self, pkid: &str) -> Result<Vec<String>> {
        let Some(value) = self.get_package_value(pkid)? else {
            return Ok(Vec::new());
        };
        if value == "ignore" || value == "seen" {
            return Ok(Vec::new());
        }
        Ok(value
            .split('\n')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect())
    }

    /// All stored metadata fragments for a package, in the given format.
    pub fn get_metadata_for_package(&self, dtype: DataType, pkid: &str) -> Result<Vec<String>> {
        let gcids = self.get_gcids_for_package(pkid)?;
        let mut result = Vec::with_capacity(gcids.len());
        for gcid in gcids {
            if let Some(data) = self.get_metadata(dtype, &gcid)?
                && !data.is_empty()
            {
                result.push(data);
            }
        }
        Ok(result)
    }

    /// Remove the package entry and hints of a package.
    pub fn remove_package(&self, pkid: &str) -> Result<()> {
        let txn = self.db.begin_write()?;
        {
            let mut packages = txn.open_table(PACKAGES_TABLE)?;
            packages.remove(pkid)?;
            let mut hints = txn.open_table(HINTS_TABLE)?;
            hints.remove(pkid)?;
        }
        txn.commit()?;
        Ok(())
    }

    /// Remove a set of packages in one transaction.
    pub fn remove_packages(&self, pkids: &HashSet<String>) -> Result<()> {
        let txn = self.db.begin_write()?;
        {
            let mut packages = txn.open_table(PACKAGES_TABLE)?;
            let mut hints = txn.open_table(HINTS_TABLE)?;
            for pkid in pkids {
                packages.remove(pkid.as_str())?;
                hints.remove(pkid.as_str())?;
                info!(pkid = %pkid, "dropped package");
            }
        }
        txn.commit()?;
        Ok(())
    }

    /// All package IDs the store knows about.
    pub fn get_package_id_set(&self) -> Result<HashSet<String>> {
        let txn = self.db.begin_read()?;
        let t = txn.open_table(PACKAGES_TABLE)?;
        let mut set = HashSet::new();
        for item in t.iter()? {
            let (key, _) = item?;
            set.insert(key.value().to_string());
        }
        Ok(set)
    }

    /// Package IDs whose `name` component matches the given prefix.
    pub fn get_pkids_matching(&self, prefix: &str) -> Result<Vec<String>> {
        let search_prefix = format!("{prefix}/");
        let txn = self.db.begin_read()?;
        let t = txn.open_table(PACKAGES_TABLE)?;
        let mut pkids = Vec::new();
        for item in t.iter()? {
            let (key, _) = item?;
            let pkid = key.value();
            if pkid.starts_with(&search_prefix) {
                pkids.push(pkid.to_string());
            }
        }
        Ok(pkids)
    }

    /// The set of gcids referenced by any package entry.
    pub fn get_active_gcids(&self) -> Result<HashSet<String>> {
        let txn = self.db.begin_read()?;
        let t = txn.open_table(PACKAGES_TABLE)?;
        let mut gcids = HashSet::new();
        for item in t.iter()? {
            let (_, value) = item?;
            let raw = value.value();
            let raw = raw.strip_suffix(&[0]).unwrap_or(raw);
            let text = String::from_utf8_lossy(raw);
            if text == "ignore" || text == "seen" {
                continue;
            }
            for gcid in text.split('\n').filter(|s| !s.is_empty()) {
                gcids.insert(gcid.to_string());
            }
        }
        Ok(gcids)
    }

    fn drop_orphaned_metadata(&self, table: StrTable, active: &HashSet<String>) -> Result<()> {
        let txn = self.db.begin_write()?;
        {
            let mut t = txn.open_table(table)?;
            let mut doomed = Vec::new();
            for item in t.iter()? {
                let (key, _) = item?;
                let gcid = key.value();
                if !active.contains(gcid) {
                    doomed.push(gcid.to_string());
                }
            }
            for gcid in &doomed {
                t.remove(gcid.as_str())?;
                info!(gcid = %gcid, "marked as cruft");
            }
        }
        txn.commit()?;
        Ok(())
    }

    fn cleanup_empty_dirs(root: &Path) {
        let Some(pdir) = root.parent() else { return };
        if crate::utils::dir_empty(pdir) {
            let _ = fs::remove_dir(pdir);
        }
        let Some(ppdir) = pdir.parent() else { return };
        if crate::utils::dir_empty(ppdir) {
            let _ = fs::remove_dir(ppdir);
        }
    }

    /// What: Drop metadata and media not referenced by any package.
    ///
    /// Inputs:
    /// - `conf`: Configuration (suites, immutability feature)
    ///
    /// Details:
    /// - Both metadata tables are swept against the active gcid set.
    /// - Media pool directories whose four-segment relative path is not an
    ///   active gcid are deleted, including the per-suite copies of all
    ///   non-immutable suites.
    /// - The sweep is idempotent.
    pub fn cleanup_cruft(&self, conf: &Config) -> Result<()> {
        let active_gcids = self.get_active_gcids()?;

        self.drop_orphaned_metadata(METADATA_XML_TABLE, &active_gcids)?;
        self.drop_orphaned_metadata(METADATA_YAML_TABLE, &active_gcids)?;

        if !self.media_dir.exists() {
            info!(dir = %self.media_dir.display(), "media directory does not exist");
            return Ok(());
        }

        let mut dirs_to_check: Vec<PathBuf> = Vec::new();
        for entry in walkdir::WalkDir::new(&self.media_dir).min_depth(4).max_depth(4) {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    warn!(error = %e, "error while scanning media directory");
                    continue;
                }
            };
            if entry.file_type().is_dir() {
                dirs_to_check.push(entry.path().to_path_buf());
            }
        }

        for path in dirs_to_check {
            let Ok(rel) = path.strip_prefix(&self.media_dir) else {
                continue;
            };
            let gcid = rel.to_string_lossy().into_owned();
            if active_gcids.contains(&gcid) {
                continue;
            }

            if path.exists() {
                fs::remove_dir_all(&path)?;
            }
            Self::cleanup_empty_dirs(&path);

            if conf.feature.immutable_suites {
                for suite in &conf.suites {
                    if suite.is_immutable {
                        continue;
                    }
                    let suite_gcid_dir = self
                        .media_dir
                        .parent()
                        .map(|p| p.join(&suite.name).join(&gcid));
                    if let Some(dir) = suite_gcid_dir {
                        if dir.exists() {
                            fs::remove_dir_all(&dir)?;
                        }
                        Self::cleanup_empty_dirs(&dir);
                    }
                }
            }

            info!(gcid = %gcid, "expired media");
        }

        Ok(())
    }

    /// Fetch the repository info of a `(suite, section, arch)` triple.
    pub fn get_repo_info(&self, suite: &str, section: &str, arch: &str) -> Result<RepoInfo> {
        let repoid = format!("{suite}-{section}-{arch}");
        let Some(raw) = self.get_bytes(REPOSITORY_TABLE, &repoid)? else {
            return Ok(RepoInfo::default());
        };
        match RepoInfo::deserialize(&raw) {
            Ok(info) => Ok(info),
            Err(e) => {
                warn!(repoid = %repoid, error = %e, "failed to deserialize repository info");
                Ok(RepoInfo::default())
            }
        }
    }

    /// Store the repository info of a triple.
    pub fn set_repo_info(
        &self,
        suite: &str,
        section: &str,
        arch: &str,
        info: &RepoInfo,
    ) -> Result<()> {
        let repoid = format!("{suite}-{section}-{arch}");
        self.put_bytes(REPOSITORY_TABLE, &repoid, &info.serialize())
    }

    /// Remove the repository info of a triple.
    pub fn remove_repo_info(&self, suite: &str, section: &str, arch: &str) -> Result<()> {
        let repoid = format!("{suite}-{section}-{arch}");
        let txn = self.db.begin_write()?;
        {
            let mut t = txn.open_table(REPOSITORY_TABLE)?;
            t.remove(repoid.as_str())?;
        }
        txn.commit()?;
        Ok(())
    }

    /// Append a statistics record with the current time.
    pub fn add_statistics(&self, data: HashMap<String, DataValue>) -> Result<()> {
        let entry = StatisticsEntry {
            time: chrono::Utc::now().timestamp().max(0) as u64,
            data,
        };
        self.add_statistics_entry(&entry)
    }

    /// Append a statistics record with an explicit timestamp. A duplicate
    /// timestamp overwrites the previous record after a warning.
    pub fn add_statistics_entry(&self, entry: &StatisticsEntry) -> Result<()> {
        let txn = self.db.begin_write()?;
        {
            let mut t = txn.open_table(STATISTICS_TABLE)?;
            if t.get(entry.time)?.is_some() {
                warn!(time = entry.time, "statistics entry for timestamp already exists, overwriting");
            }
            t.insert(entry.time, entry.serialize().as_slice())?;
        }
        txn.commit()?;
        Ok(())
    }

    /// All stored statistics records, ordered by timestamp.
    pub fn get_statistics(&self) -> Result<Vec<StatisticsEntry>> {
        let txn = self.db.begin_read()?;
        let t = txn.open_table(STATISTICS_TABLE)?;
        let mut stats = Vec::new();
        for item in t.iter()? {
            let (_, value) = item?;
            let raw = value.value();
            if raw.first() == Some(&b'{') {
                // ancient generators stored JSON here; skip those records
                continue;
            }
            match StatisticsEntry::deserialize(raw) {
                Ok(entry) => stats.push(entry),
                Err(e) => {
                    warn!(error = %e, "failed to deserialize statistics entry");
                }
            }
        }
        Ok(stats)
    }

    /// Remove the statistics record at a timestamp.
    pub fn remove_statistics(&self, time: u64) -> Result<()> {
        let txn = self.db.begin_write()?;
        {
            let mut t = txn.open_table(STATISTICS_TABLE)?;
            t.remove(time)?;
        }
        txn.commit()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repo_info_roundtrip() {
        let mut info = RepoInfo::default();
        info.data.insert("mtime".to_string(), DataValue::Int(1_650_000_000));
        info.data
            .insert("origin".to_string(), DataValue::Text("main".to_string()));
        info.data.insert("ratio".to_string(), DataValue::Float(0.5));

        let raw = info.serialize();
        assert_eq!(raw[0], 1);
        let parsed = RepoInfo::deserialize(&raw).expect("deserialize");
        assert_eq!(parsed.data.get("mtime"), Some(&DataValue::Int(1_650_000_000)));
        assert_eq!(
            parsed.data.get("origin"),
            Some(&DataValue::Text("main".to_string()))
        );
        assert_eq!(parsed.data.get("ratio"), Some(&DataValue::Float(0.5)));
    }

    #[test]
    fn statistics_entry_roundtrip() {
        let mut entry = StatisticsEntry {
            time: 1_700_000_000,
            ..StatisticsEntry::default()
        };
        entry
            .data
            .insert("suite".to_string(), DataValue::Text("testing".to_string()));
        entry.data.insert("totalErrors".to_string(), DataValue::Int(8));

        let raw = entry.serialize();
        let parsed = StatisticsEntry::deserialize(&raw).expect("deserialize");
        assert_eq!(parsed.time, 1_700_000_000);
        assert_eq!(parsed.data.get("totalErrors"), Some(&DataValue::Int(8)));
    }

    #[test]
    fn truncated_records_are_rejected() {
        assert!(RepoInfo::deserialize(&[1, 0]).is_err());
        assert!(RepoInfo::deserialize(&[9, 0, 0, 0, 0]).is_err());

        let mut info = RepoInfo::default();
        info.data.insert("k".to_string(), DataValue::Int(5));
        let mut raw = info.serialize();
        raw.truncate(raw.len() - 3);
        assert!(RepoInfo::deserialize(&raw).is_err());
    }
}
