use crate::error::{LedgerError, Result};
use crate::types::{CacheEntry, CacheKey, IgnoreRecord, ViolationRecord};
use advisor_protocol::{Fingerprint, NodeId};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

const CACHE_TABLE: &str = "cache.json";
const IGNORE_TABLE: &str = "ignores.json";
const VIOLATION_TABLE: &str = "violations.json";

/// Single-writer ledger over three direct-keyed tables. All reads are
/// O(1) HashMap hits; persistence is one JSON document per table,
/// written atomically.
#[derive(Debug, Default)]
pub struct Ledger {
    cache: HashMap<CacheKey, CacheEntry>,
    ignores: HashMap<Fingerprint, IgnoreRecord>,
    violations: Vec<ViolationRecord>,
    dir: Option<PathBuf>,
}

impl Ledger {
    /// Ephemeral ledger with no backing storage.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Open (or create) a ledger directory. A table that is missing
    /// starts empty; a table that fails to deserialize is rebuilt empty
    /// with a warning; the cache is a performance layer, not truth.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;

        let cache: Vec<CacheEntry> = load_table(&dir.join(CACHE_TABLE));
        let ignores: Vec<IgnoreRecord> = load_table(&dir.join(IGNORE_TABLE));
        let violations: Vec<ViolationRecord> = load_table(&dir.join(VIOLATION_TABLE));

        Ok(Self {
            cache: cache
                .into_iter()
                .map(|entry| (entry.key.clone(), entry))
                .collect(),
            ignores: ignores
                .into_iter()
                .map(|record| (record.fingerprint.clone(), record))
                .collect(),
            violations,
            dir: Some(dir),
        })
    }

    /// Verdict lookup by compound key. A miss is the expected path when
    /// no prior verdict exists, not an error.
    #[must_use]
    pub fn lookup(&self, key: &CacheKey) -> Option<&CacheEntry> {
        self.cache.get(key)
    }

    /// Append a verdict. A key that already holds a verdict keeps it:
    /// entries are read-only until superseded by a new key.
    pub fn store(&mut self, key: CacheKey, verdict: String) -> &CacheEntry {
        self.cache.entry(key.clone()).or_insert_with(|| {
            log::debug!("ledger: storing verdict for {key}");
            CacheEntry {
                key,
                verdict,
                created_at_unix_ms: now_unix_ms(),
            }
        })
    }

    /// Record an ignore for a block fingerprint. The reason is required
    /// and must be non-empty.
    pub fn ignore(&mut self, fingerprint: Fingerprint, reason: &str) -> Result<IgnoreRecord> {
        if reason.trim().is_empty() {
            return Err(LedgerError::EmptyReason);
        }
        let record = IgnoreRecord {
            fingerprint: fingerprint.clone(),
            reason: reason.trim().to_string(),
            created_at_unix_ms: now_unix_ms(),
            active: true,
        };
        self.ignores.insert(fingerprint, record.clone());
        Ok(record)
    }

    /// Is the block with this *current* fingerprint ignored? Any
    /// structural change moves the fingerprint, so the stored record
    /// stops matching with no explicit deletion step.
    #[must_use]
    pub fn is_ignored(&self, current: &Fingerprint) -> bool {
        self.ignores
            .get(current)
            .is_some_and(|record| record.active)
    }

    /// Check a previously recorded fingerprint against the block's
    /// current one. A mismatch is an invalidation: logged, answered as
    /// "not ignored", never silently honored.
    #[must_use]
    pub fn check_ignore(&self, recorded: &Fingerprint, current: &Fingerprint) -> bool {
        if recorded != current {
            if self.ignores.contains_key(recorded) {
                log::warn!(
                    "ignore record for {recorded} no longer matches current fingerprint {current}; treating as not ignored"
                );
            }
            return false;
        }
        self.is_ignored(current)
    }

    /// Append a violation record. Stored only for actual violations, so
    /// ledger growth tracks findings, not saves.
    pub fn record_violation(&mut self, record: ViolationRecord) {
        self.violations.push(record);
    }

    #[must_use]
    pub fn violations_for(&self, node: &NodeId) -> Vec<&ViolationRecord> {
        self.violations
            .iter()
            .filter(|record| &record.node == node)
            .collect()
    }

    #[must_use]
    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    /// Age/size garbage collection. Never required for correctness:
    /// stale keys already miss on their own.
    pub fn prune(&mut self, max_age_ms: u64, max_entries: usize) {
        let now = now_unix_ms();
        self.cache
            .retain(|_, entry| now.saturating_sub(entry.created_at_unix_ms) <= max_age_ms);

        if self.cache.len() > max_entries {
            let mut by_age: Vec<(CacheKey, u64)> = self
                .cache
                .iter()
                .map(|(key, entry)| (key.clone(), entry.created_at_unix_ms))
                .collect();
            by_age.sort_by_key(|(_, created)| *created);
            let excess = self.cache.len() - max_entries;
            for (key, _) in by_age.into_iter().take(excess) {
                self.cache.remove(&key);
            }
        }

        self.ignores
            .retain(|_, record| now.saturating_sub(record.created_at_unix_ms) <= max_age_ms);
        if self.violations.len() > max_entries {
            let excess = self.violations.len() - max_entries;
            self.violations.drain(..excess);
        }
    }

    /// Persist all tables, atomically per table. A no-op for in-memory
    /// ledgers.
    pub fn save(&self) -> Result<()> {
        let Some(dir) = &self.dir else {
            return Ok(());
        };

        let mut cache: Vec<&CacheEntry> = self.cache.values().collect();
        cache.sort_by(|a, b| a.key.as_str().cmp(b.key.as_str()));
        save_table(&dir.join(CACHE_TABLE), &cache)?;

        let mut ignores: Vec<&IgnoreRecord> = self.ignores.values().collect();
        ignores.sort_by(|a, b| a.fingerprint.as_str().cmp(b.fingerprint.as_str()));
        save_table(&dir.join(IGNORE_TABLE), &ignores)?;

        save_table(&dir.join(VIOLATION_TABLE), &self.violations)?;
        Ok(())
    }
}

fn load_table<T: DeserializeOwned>(path: &Path) -> Vec<T> {
    let Ok(json) = std::fs::read_to_string(path) else {
        return Vec::new();
    };
    match serde_json::from_str(&json) {
        Ok(rows) => rows,
        Err(err) => {
            log::warn!(
                "Failed to load ledger table {}: {err}; rebuilding empty",
                path.display()
            );
            Vec::new()
        }
    }
}

fn save_table<T: Serialize>(path: &Path, rows: &T) -> Result<()> {
    let json = serde_json::to_string(rows)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

fn now_unix_ms() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .ok()
        .and_then(|duration| u64::try_from(duration.as_millis()).ok())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use advisor_protocol::RuleSetVersion;
    use tempfile::TempDir;

    fn fingerprint(seed: &str) -> Fingerprint {
        Fingerprint::from_digest(seed.as_bytes())
    }

    #[test]
    fn ruleset_version_change_misses_every_prior_key() {
        let mut ledger = Ledger::in_memory();
        let v1 = RuleSetVersion("v1".to_string());
        let v2 = RuleSetVersion("v2".to_string());

        let fingerprints: Vec<Fingerprint> =
            (0..10).map(|i| fingerprint(&format!("block-{i}"))).collect();
        for fp in &fingerprints {
            ledger.store(CacheKey::new(fp, &v1), "verdict".to_string());
        }

        for fp in &fingerprints {
            assert!(ledger.lookup(&CacheKey::new(fp, &v1)).is_some());
            assert!(
                ledger.lookup(&CacheKey::new(fp, &v2)).is_none(),
                "new rule-set version must miss for {fp}"
            );
        }
    }

    #[test]
    fn verdicts_are_append_only() {
        let mut ledger = Ledger::in_memory();
        let key = CacheKey::new(&fingerprint("block"), &RuleSetVersion::default());
        ledger.store(key.clone(), "first".to_string());
        ledger.store(key.clone(), "second".to_string());
        assert_eq!(ledger.lookup(&key).unwrap().verdict, "first");
    }

    #[test]
    fn ignore_tracks_fingerprint_not_identity() {
        let mut ledger = Ledger::in_memory();
        let original = fingerprint("shape-one");
        let changed = fingerprint("shape-two");

        ledger.ignore(original.clone(), "known legacy mess").unwrap();

        // Active while the block's fingerprint is unchanged.
        assert!(ledger.is_ignored(&original));
        assert!(ledger.check_ignore(&original, &original));

        // The moment the structure changes, the same record stops
        // matching; nothing was deleted.
        assert!(!ledger.is_ignored(&changed));
        assert!(!ledger.check_ignore(&original, &changed));
    }

    #[test]
    fn ignore_requires_a_reason() {
        let mut ledger = Ledger::in_memory();
        let err = ledger.ignore(fingerprint("block"), "   ").unwrap_err();
        assert!(matches!(err, LedgerError::EmptyReason));
    }

    #[test]
    fn tables_survive_a_round_trip() {
        let dir = TempDir::new().unwrap();
        let key = CacheKey::new(&fingerprint("block"), &RuleSetVersion::default());

        {
            let mut ledger = Ledger::open(dir.path()).unwrap();
            ledger.store(key.clone(), "stored verdict".to_string());
            ledger.ignore(fingerprint("other"), "reviewed").unwrap();
            ledger.record_violation(ViolationRecord {
                node: NodeId::file("app.py"),
                rule: "srp".to_string(),
                severity: 0.8,
                snippet: "class App: ...".to_string(),
                embedding: Some(vec![0.1, 0.2]),
                created_at_unix_ms: 1,
            });
            ledger.save().unwrap();
        }

        let reopened = Ledger::open(dir.path()).unwrap();
        assert_eq!(reopened.lookup(&key).unwrap().verdict, "stored verdict");
        assert!(reopened.is_ignored(&fingerprint("other")));
        assert_eq!(reopened.violations_for(&NodeId::file("app.py")).len(), 1);
    }

    #[test]
    fn corrupt_table_rebuilds_empty() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(CACHE_TABLE), "not json at all").unwrap();
        let ledger = Ledger::open(dir.path()).unwrap();
        assert_eq!(ledger.cache_len(), 0);
    }

    #[test]
    fn prune_caps_size_keeping_newest() {
        let mut ledger = Ledger::in_memory();
        let version = RuleSetVersion::default();
        for i in 0..20 {
            ledger.store(
                CacheKey::new(&fingerprint(&format!("b{i}")), &version),
                "v".to_string(),
            );
        }
        ledger.prune(u64::MAX, 5);
        assert_eq!(ledger.cache_len(), 5);
    }
}
