//! Credential pool with least-used rotation.
//!
//! A pool holds one or more credential sets (cookie collections exported
//! from a browser) and hands out the least-used set on each session
//! creation. Rotation spreads load across accounts; it is not a security
//! mechanism.
//!
//! The backing source is a JSON array of cookie records (`name`/`value`
//! pairs, extra fields ignored), the format produced by cookie-editor
//! style browser extensions. The default source path comes from the
//! `BINGCHAT_COOKIE` environment variable.

// ============================================================================
// Imports
// ============================================================================

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::Deserialize;
use tracing::debug;

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Environment variable naming the credential source file.
pub const CREDENTIAL_FILE_ENV: &str = "BINGCHAT_COOKIE";

// ============================================================================
// CookieRecord
// ============================================================================

/// One cookie record from the credential source.
///
/// Extra fields from browser exports (domain, path, expiry, ...) are
/// ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct CookieRecord {
    /// Cookie name.
    pub name: String,
    /// Cookie value.
    pub value: String,
}

// ============================================================================
// CredentialSet
// ============================================================================

/// One credential set: a cookie collection plus a use counter.
///
/// The counter only increases; [`CredentialPool::select`] always picks the
/// set with the minimum count.
#[derive(Debug)]
pub struct CredentialSet {
    /// Source file the records were loaded from.
    path: PathBuf,

    /// Parsed cookie records.
    records: Vec<CookieRecord>,

    /// Times this set has been selected.
    uses: AtomicU64,
}

impl CredentialSet {
    /// Creates a set from parsed records.
    fn new(path: PathBuf, records: Vec<CookieRecord>) -> Self {
        Self {
            path,
            records,
            uses: AtomicU64::new(0),
        }
    }

    /// Returns the source path of this set.
    #[inline]
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the number of times this set has been selected.
    #[inline]
    #[must_use]
    pub fn uses(&self) -> u64 {
        self.uses.load(Ordering::Relaxed)
    }

    /// Returns the cookie records of this set.
    #[inline]
    #[must_use]
    pub fn records(&self) -> &[CookieRecord] {
        &self.records
    }

    /// Renders the records as a `Cookie` header value.
    ///
    /// Format: `name=value; name2=value2`.
    #[must_use]
    pub fn cookie_header(&self) -> String {
        self.records
            .iter()
            .map(|r| format!("{}={}", r.name, r.value))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

// ============================================================================
// CredentialPool
// ============================================================================

/// Pool of credential sets with deterministic least-used selection.
///
/// # Example
///
/// ```ignore
/// let pool = CredentialPool::load()?;          // reads $BINGCHAT_COOKIE
/// let set = pool.select()?;                    // least-used set
/// let header = set.cookie_header();
/// ```
pub struct CredentialPool {
    /// Loaded sets, in load order.
    sets: Vec<CredentialSet>,

    /// Serializes the scan-then-increment of a selection.
    select_lock: Mutex<()>,
}

impl CredentialPool {
    /// Loads the pool from the file named by `BINGCHAT_COOKIE`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Credentials`] if the variable is unset or the
    /// file cannot be loaded.
    pub fn load() -> Result<Self> {
        let path = env::var(CREDENTIAL_FILE_ENV).map_err(|_| {
            Error::credentials(format!("{CREDENTIAL_FILE_ENV} environment variable is not set"))
        })?;

        Self::from_path(path)
    }

    /// Loads the pool from an explicit credential file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Credentials`] if the file is unreadable or is not
    /// a JSON array of cookie records.
    pub fn from_path(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        let raw = fs::read(&path).map_err(|e| {
            Error::credentials(format!("cannot read {}: {e}", path.display()))
        })?;

        let records: Vec<CookieRecord> = serde_json::from_slice(&raw).map_err(|e| {
            Error::credentials(format!(
                "{} is not a JSON array of cookie records: {e}",
                path.display()
            ))
        })?;

        debug!(path = %path.display(), cookies = records.len(), "Loaded credential set");

        Ok(Self {
            sets: vec![CredentialSet::new(path, records)],
            select_lock: Mutex::new(()),
        })
    }

    /// Builds a pool from already-parsed sets.
    ///
    /// Used when credentials come from multiple files.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Credentials`] if `sets` is empty.
    pub fn from_sets(sets: Vec<(PathBuf, Vec<CookieRecord>)>) -> Result<Self> {
        if sets.is_empty() {
            return Err(Error::credentials("credential pool is empty"));
        }

        Ok(Self {
            sets: sets
                .into_iter()
                .map(|(path, records)| CredentialSet::new(path, records))
                .collect(),
            select_lock: Mutex::new(()),
        })
    }

    /// Returns the number of sets in the pool.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.sets.len()
    }

    /// Returns `true` if the pool holds no sets.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    /// Selects the least-used credential set and increments its counter.
    ///
    /// Ties break on first occurrence, so repeated selection cycles
    /// through the pool deterministically.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Credentials`] if the pool is empty.
    pub fn select(&self) -> Result<&CredentialSet> {
        let _guard = self.select_lock.lock();

        // min_by_key alone would break ties on the last occurrence; the
        // index keeps selection on the first.
        let best = self
            .sets
            .iter()
            .enumerate()
            .min_by_key(|(index, s)| (s.uses.load(Ordering::Relaxed), *index))
            .map(|(_, s)| s)
            .ok_or_else(|| Error::credentials("credential pool is empty"))?;

        best.uses.fetch_add(1, Ordering::Relaxed);
        debug!(path = %best.path.display(), uses = best.uses(), "Selected credential set");

        Ok(best)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, value: &str) -> CookieRecord {
        CookieRecord {
            name: name.to_string(),
            value: value.to_string(),
        }
    }

    fn pool_of(n: usize) -> CredentialPool {
        let sets = (0..n)
            .map(|i| {
                (
                    PathBuf::from(format!("cookies-{i}.json")),
                    vec![record("_U", &format!("token-{i}"))],
                )
            })
            .collect();
        CredentialPool::from_sets(sets).expect("pool")
    }

    #[test]
    fn test_empty_pool_rejected() {
        assert!(CredentialPool::from_sets(Vec::new()).is_err());
    }

    #[test]
    fn test_select_picks_minimum() {
        let pool = pool_of(3);

        // First selection takes the first set (all tied at zero).
        let first = pool.select().expect("select");
        assert_eq!(first.path(), Path::new("cookies-0.json"));
        assert_eq!(first.uses(), 1);

        // Next selections move on to the still-unused sets.
        assert_eq!(pool.select().expect("select").path(), Path::new("cookies-1.json"));
        assert_eq!(pool.select().expect("select").path(), Path::new("cookies-2.json"));
    }

    #[test]
    fn test_select_cycles_through_pool() {
        let pool = pool_of(3);

        for _ in 0..9 {
            pool.select().expect("select");
        }

        for set in &pool.sets {
            assert_eq!(set.uses(), 3);
        }
    }

    #[test]
    fn test_cookie_header_format() {
        let set = CredentialSet::new(
            PathBuf::from("cookies.json"),
            vec![record("_U", "abc"), record("SRCHD", "AF=NOFORM")],
        );
        assert_eq!(set.cookie_header(), "_U=abc; SRCHD=AF=NOFORM");
    }

    #[test]
    fn test_records_parse_ignores_extra_fields() {
        let raw = r#"[
            {"name": "_U", "value": "abc", "domain": ".bing.com", "httpOnly": true},
            {"name": "SRCHD", "value": "AF=NOFORM", "path": "/"}
        ]"#;

        let records: Vec<CookieRecord> = serde_json::from_str(raw).expect("parse");
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].name, "_U");
        assert_eq!(records[1].value, "AF=NOFORM");
    }

    #[test]
    fn test_from_path_rejects_non_array() {
        let dir = std::env::temp_dir();
        let path = dir.join("sydney-chat-test-credentials.json");
        fs::write(&path, r#"{"name": "_U"}"#).expect("write");

        let result = CredentialPool::from_path(&path);
        assert!(matches!(result, Err(Error::Credentials { .. })));

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_from_path_missing_file() {
        let result = CredentialPool::from_path("/nonexistent/cookies.json");
        assert!(matches!(result, Err(Error::Credentials { .. })));
    }

    #[test]
    fn test_concurrent_selection_counts() {
        use std::sync::Arc;

        let pool = Arc::new(pool_of(4));
        let mut handles = Vec::new();

        for _ in 0..8 {
            let pool = Arc::clone(&pool);
            handles.push(std::thread::spawn(move || {
                for _ in 0..25 {
                    pool.select().expect("select");
                }
            }));
        }

        for handle in handles {
            handle.join().expect("join");
        }

        let total: u64 = pool.sets.iter().map(CredentialSet::uses).sum();
        assert_eq!(total, 200);

        // Least-used selection keeps the distribution perfectly even.
        for set in &pool.sets {
            assert_eq!(set.uses(), 50);
        }
    }
}
