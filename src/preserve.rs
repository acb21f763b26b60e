// Parse preservation store
//
// One ParseRecord per file path, kept in SQLite. Records the best parse
// seen so far together with the content hash it was produced from, so the
// orchestrator can skip unchanged files and fall back to preserved
// high-accuracy results when a fresh parse comes out weaker.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use dashmap::DashMap;
use parking_lot::Mutex;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::confidence::ConfidenceVector;
use crate::graph::Symbol;
use crate::strategies::StrategyTier;

pub type ConnectionPool = Pool<SqliteConnectionManager>;

/// Outcome of one strategy attempt during routing, kept per record so the
/// stats command and diagnostics can see which tiers ran and how they did.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StrategyAttempt {
    pub attempted: bool,
    pub succeeded: bool,
    pub symbol_count: usize,
    pub confidence: f32,
}

impl StrategyAttempt {
    pub fn succeeded(symbol_count: usize, confidence: f32) -> Self {
        Self {
            attempted: true,
            succeeded: true,
            symbol_count,
            confidence,
        }
    }

    pub fn failed() -> Self {
        Self {
            attempted: true,
            ..Default::default()
        }
    }
}

/// Preserved parse outcome for one file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParseRecord {
    pub file_path: String,
    /// blake3 of the file content this record was produced from.
    pub content_hash: String,
    pub tier: StrategyTier,
    pub confidence: ConfidenceVector,
    /// Overall score at the time of recording. Monotonic per file: a
    /// weaker later parse never overwrites this record.
    pub best_confidence: f32,
    pub symbols: Vec<Symbol>,
    /// Per-tier attempt outcomes from the routing pass that produced this
    /// record.
    pub per_strategy: BTreeMap<String, StrategyAttempt>,
    pub parse_duration_ms: u64,
    pub parsed_at: u64,
}

/// Whether a store update was applied or declined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    /// First record for this file, or content changed.
    Fresh,
    /// Same content, better confidence than before.
    Improved,
    /// Same content, weaker confidence; existing record kept.
    Kept,
    /// Conditional write declined: the stored record no longer refers to
    /// the content the result was parsed from.
    Stale,
}

pub struct ParseStore {
    pool: ConnectionPool,
    db_path: PathBuf,
    /// Per-path write locks. Readers go straight to the pool.
    path_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl ParseStore {
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref().to_path_buf();

        info!("Opening parse store at: {}", db_path.display());

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        let manager = SqliteConnectionManager::file(&db_path);
        let pool = Pool::builder()
            .max_size(10)
            .build(manager)
            .context("Failed to create connection pool")?;

        {
            let conn = pool.get().context("Failed to get connection")?;
            init_schema(&conn).context("Failed to initialize parse store schema")?;
        }

        Ok(Self {
            pool,
            db_path,
            path_locks: DashMap::new(),
        })
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn get_conn(&self) -> Result<r2d2::PooledConnection<SqliteConnectionManager>> {
        self.pool.get().context("Failed to get connection from pool")
    }

    /// Serialize all writers for one file path. Two concurrent parses of
    /// the same file must not interleave their read-compare-write cycles.
    pub fn lock_path(&self, file_path: &str) -> Arc<Mutex<()>> {
        self.path_locks
            .entry(file_path.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    pub fn get(&self, file_path: &str) -> Result<Option<ParseRecord>> {
        let conn = self.get_conn()?;
        let record = conn
            .query_row(
                "SELECT file_path, content_hash, tier, confidence, best_confidence,
                        symbols, per_strategy, parse_duration_ms, parsed_at
                 FROM parse_records WHERE file_path = ?1",
                [file_path],
                |row| Ok(row_to_record(row)?),
            )
            .optional()?;
        Ok(record)
    }

    /// True when no record exists for the path or the stored hash differs
    /// from `content_hash`. The re-indexer uses this to skip unchanged files.
    pub fn file_changed(&self, file_path: &str, content_hash: &str) -> Result<bool> {
        let conn = self.get_conn()?;
        let stored: Option<String> = conn
            .query_row(
                "SELECT content_hash FROM parse_records WHERE file_path = ?1",
                [file_path],
                |row| row.get(0),
            )
            .optional()?;
        Ok(stored.as_deref() != Some(content_hash))
    }

    /// Record a parse, preserving the monotonic-confidence contract: for
    /// unchanged content, only a strictly better overall score replaces the
    /// stored record. Changed content always starts fresh.
    pub fn put(&self, record: &ParseRecord) -> Result<PutOutcome> {
        let lock = self.lock_path(&record.file_path);
        let _guard = lock.lock();
        self.put_under_lock(record, false)
    }

    /// Like `put`, but only applied while the stored record still refers
    /// to the same content hash. Background passes write through this so a
    /// result computed from superseded content is discarded instead of
    /// clobbering a newer record (or resurrecting a deleted file).
    pub fn put_same_hash(&self, record: &ParseRecord) -> Result<PutOutcome> {
        let lock = self.lock_path(&record.file_path);
        let _guard = lock.lock();
        self.put_under_lock(record, true)
    }

    fn put_under_lock(&self, record: &ParseRecord, require_current_hash: bool) -> Result<PutOutcome> {
        let existing = self.get(&record.file_path)?;
        let outcome = match &existing {
            Some(prev) if prev.content_hash == record.content_hash => {
                if record.best_confidence > prev.best_confidence {
                    PutOutcome::Improved
                } else {
                    debug!(
                        file = %record.file_path,
                        stored = prev.best_confidence,
                        offered = record.best_confidence,
                        "Keeping preserved parse over weaker fresh result"
                    );
                    return Ok(PutOutcome::Kept);
                }
            }
            _ if require_current_hash => {
                debug!(
                    file = %record.file_path,
                    "Discarding write for superseded content"
                );
                return Ok(PutOutcome::Stale);
            }
            _ => PutOutcome::Fresh,
        };

        let conn = self.get_conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO parse_records (
                file_path, content_hash, tier, confidence, best_confidence,
                symbols, per_strategy, parse_duration_ms, parsed_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                record.file_path,
                record.content_hash,
                record.tier.as_str(),
                serde_json::to_string(&record.confidence)?,
                record.best_confidence,
                serde_json::to_string(&record.symbols)?,
                serde_json::to_string(&record.per_strategy)?,
                record.parse_duration_ms,
                record.parsed_at,
            ],
        )?;
        Ok(outcome)
    }

    /// Drop the record for a deleted file. Records are never removed while
    /// the file still exists, only replaced.
    pub fn remove(&self, file_path: &str) -> Result<bool> {
        let lock = self.lock_path(file_path);
        let _guard = lock.lock();

        let conn = self.get_conn()?;
        let affected = conn.execute(
            "DELETE FROM parse_records WHERE file_path = ?1",
            [file_path],
        )?;
        self.path_locks.remove(file_path);
        Ok(affected > 0)
    }

    /// Every preserved record. Startup hydrates the in-memory symbol table
    /// from this so sessions that skip unchanged files still see the whole
    /// project.
    pub fn all_records(&self) -> Result<Vec<ParseRecord>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT file_path, content_hash, tier, confidence, best_confidence,
                    symbols, per_strategy, parse_duration_ms, parsed_at
             FROM parse_records",
        )?;
        let records = stmt
            .query_map([], |row| row_to_record(row))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    pub fn record_count(&self) -> Result<usize> {
        let conn = self.get_conn()?;
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM parse_records", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Aggregate view for the stats command.
    pub fn stats(&self) -> Result<StoreStats> {
        let conn = self.get_conn()?;
        let files: i64 =
            conn.query_row("SELECT COUNT(*) FROM parse_records", [], |row| row.get(0))?;
        let mean_confidence: f64 = conn.query_row(
            "SELECT COALESCE(AVG(best_confidence), 0.0) FROM parse_records",
            [],
            |row| row.get(0),
        )?;

        let symbols: i64 = conn.query_row(
            "SELECT COALESCE(SUM(json_array_length(symbols)), 0) FROM parse_records",
            [],
            |row| row.get(0),
        )?;

        let last_indexed: Option<i64> = conn.query_row(
            "SELECT MAX(parsed_at) FROM parse_records",
            [],
            |row| row.get(0),
        )?;

        let mut stmt = conn.prepare(
            "SELECT tier, COUNT(*) FROM parse_records GROUP BY tier ORDER BY tier",
        )?;
        let by_tier = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as usize))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(StoreStats {
            files: files as usize,
            symbols: symbols as usize,
            mean_confidence: mean_confidence as f32,
            by_tier,
            last_indexed,
        })
    }
}

#[derive(Debug, Clone)]
pub struct StoreStats {
    pub files: usize,
    pub symbols: usize,
    pub mean_confidence: f32,
    pub by_tier: Vec<(String, usize)>,
    pub last_indexed: Option<i64>,
}

pub fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Hash file content the same way everywhere in the pipeline.
pub fn content_hash(content: &str) -> String {
    blake3::hash(content.as_bytes()).to_hex().to_string()
}

fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS parse_records (
            file_path TEXT PRIMARY KEY,
            content_hash TEXT NOT NULL,
            tier TEXT NOT NULL,
            confidence TEXT NOT NULL,
            best_confidence REAL NOT NULL,
            symbols TEXT NOT NULL,
            per_strategy TEXT NOT NULL DEFAULT '{}',
            parse_duration_ms INTEGER NOT NULL DEFAULT 0,
            parsed_at INTEGER NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_parse_records_hash
         ON parse_records(content_hash)",
        [],
    )?;
    Ok(())
}

fn row_to_record(row: &Row) -> rusqlite::Result<ParseRecord> {
    let tier_str: String = row.get(2)?;
    let confidence_json: String = row.get(3)?;
    let symbols_json: String = row.get(5)?;
    let per_strategy_json: String = row.get(6)?;

    let tier = match tier_str.as_str() {
        "external" => StrategyTier::External,
        "tree" => StrategyTier::Tree,
        _ => StrategyTier::Line,
    };
    let confidence: ConfidenceVector = serde_json::from_str(&confidence_json)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e)))?;
    let symbols: Vec<Symbol> = serde_json::from_str(&symbols_json)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e)))?;
    let per_strategy: BTreeMap<String, StrategyAttempt> = serde_json::from_str(&per_strategy_json)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(6, rusqlite::types::Type::Text, Box::new(e)))?;

    Ok(ParseRecord {
        file_path: row.get(0)?,
        content_hash: row.get(1)?,
        tier,
        confidence,
        best_confidence: row.get(4)?,
        symbols,
        per_strategy,
        parse_duration_ms: row.get::<_, i64>(7)? as u64,
        parsed_at: row.get::<_, i64>(8)? as u64,
    })
}
