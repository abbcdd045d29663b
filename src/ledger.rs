use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::OptionalExtension;
use thiserror::Error;

use crate::records::{Budget, UsageRecord, UsageSummary};

/// Durable usage ledger and budget table in a single SQLite file. Every
/// call opens its own connection inside `spawn_blocking`; WAL plus a busy
/// timeout keeps concurrent writers serialized without held locks.
#[derive(Clone, Debug)]
pub struct LedgerStore {
    path: PathBuf,
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger join error: {0}")]
    Join(#[from] tokio::task::JoinError),
    #[error("ledger sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("duplicate request id: {0}")]
    DuplicateRequestId(String),
}

/// Inputs for one atomic charge.
#[derive(Clone, Debug)]
pub struct UsageCharge {
    pub project_id: String,
    pub provider: String,
    pub model_id: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost_usd: f64,
    pub request_id: String,
    pub estimated: bool,
}

impl LedgerStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn init(&self) -> Result<(), LedgerError> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || -> Result<(), LedgerError> {
            let conn = open_connection(path)?;
            init_schema(&conn)?;
            Ok(())
        })
        .await?
    }

    /// Appends a usage row and increments the project's `spent_usd` in one
    /// transaction. The charge is never lost and never applied twice; a
    /// replayed request id is rejected before any state changes.
    pub async fn record_usage(&self, charge: UsageCharge) -> Result<UsageRecord, LedgerError> {
        let path = self.path.clone();
        let ts_ms = now_millis();

        tokio::task::spawn_blocking(move || -> Result<UsageRecord, LedgerError> {
            let mut conn = open_connection(path)?;
            init_schema(&conn)?;
            let tx = conn.transaction()?;

            let inserted = tx.execute(
                "INSERT OR IGNORE INTO usage
                     (project_id, provider, model, input_tokens, output_tokens,
                      cost_usd, request_id, estimated, created_at_ms)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                rusqlite::params![
                    charge.project_id,
                    charge.provider,
                    charge.model_id,
                    tokens_to_i64(charge.input_tokens),
                    tokens_to_i64(charge.output_tokens),
                    charge.cost_usd,
                    charge.request_id,
                    charge.estimated,
                    ts_ms,
                ],
            )?;
            if inserted == 0 {
                return Err(LedgerError::DuplicateRequestId(charge.request_id));
            }
            let id = tx.last_insert_rowid();

            tx.execute(
                "UPDATE budgets
                 SET spent_usd = spent_usd + ?2,
                     updated_at_ms = ?3
                 WHERE project_id = ?1",
                rusqlite::params![charge.project_id, charge.cost_usd, ts_ms],
            )?;

            tx.commit()?;
            Ok(UsageRecord {
                id,
                project_id: charge.project_id,
                provider: charge.provider,
                model_id: charge.model_id,
                input_tokens: charge.input_tokens,
                output_tokens: charge.output_tokens,
                cost_usd: charge.cost_usd,
                request_id: charge.request_id,
                estimated: charge.estimated,
                created_at_ms: i64_to_u64(ts_ms),
            })
        })
        .await?
    }

    /// Upsert on project id. An existing budget keeps its `spent_usd` and
    /// `created_at_ms`; the limit and period are replaced.
    pub async fn set_budget(
        &self,
        project_id: &str,
        limit_usd: f64,
        period_days: Option<u32>,
    ) -> Result<Budget, LedgerError> {
        let path = self.path.clone();
        let project_id = project_id.to_string();
        let ts_ms = now_millis();
        let period_end_ms = period_days.map(|days| ts_ms + i64::from(days) * 86_400_000);

        tokio::task::spawn_blocking(move || -> Result<Budget, LedgerError> {
            let mut conn = open_connection(path)?;
            init_schema(&conn)?;
            let tx = conn.transaction()?;

            tx.execute(
                "INSERT INTO budgets
                     (project_id, limit_usd, spent_usd, period_start_ms, period_end_ms,
                      created_at_ms, updated_at_ms)
                 VALUES (?1, ?2, 0, ?3, ?4, ?3, ?3)
                 ON CONFLICT(project_id) DO UPDATE SET
                     limit_usd = excluded.limit_usd,
                     period_start_ms = excluded.period_start_ms,
                     period_end_ms = excluded.period_end_ms,
                     updated_at_ms = excluded.updated_at_ms",
                rusqlite::params![project_id, limit_usd, ts_ms, period_end_ms],
            )?;

            let budget = read_budget(&tx, &project_id)?;
            tx.commit()?;
            budget.ok_or_else(|| {
                LedgerError::Sqlite(rusqlite::Error::QueryReturnedNoRows)
            })
        })
        .await?
    }

    pub async fn get_budget(&self, project_id: &str) -> Result<Option<Budget>, LedgerError> {
        let path = self.path.clone();
        let project_id = project_id.to_string();
        tokio::task::spawn_blocking(move || -> Result<Option<Budget>, LedgerError> {
            let conn = open_connection(path)?;
            init_schema(&conn)?;
            read_budget(&conn, &project_id)
        })
        .await?
    }

    /// Zeroes `spent_usd` and restarts the period. Idempotent. Returns
    /// false when no budget exists for the project.
    pub async fn reset_budget_spent(&self, project_id: &str) -> Result<bool, LedgerError> {
        let path = self.path.clone();
        let project_id = project_id.to_string();
        let ts_ms = now_millis();
        tokio::task::spawn_blocking(move || -> Result<bool, LedgerError> {
            let conn = open_connection(path)?;
            init_schema(&conn)?;
            let updated = conn.execute(
                "UPDATE budgets
                 SET spent_usd = 0,
                     period_start_ms = ?2,
                     updated_at_ms = ?2
                 WHERE project_id = ?1",
                rusqlite::params![project_id, ts_ms],
            )?;
            Ok(updated > 0)
        })
        .await?
    }

    pub async fn delete_budget(&self, project_id: &str) -> Result<bool, LedgerError> {
        let path = self.path.clone();
        let project_id = project_id.to_string();
        tokio::task::spawn_blocking(move || -> Result<bool, LedgerError> {
            let conn = open_connection(path)?;
            init_schema(&conn)?;
            let deleted = conn.execute(
                "DELETE FROM budgets WHERE project_id = ?1",
                rusqlite::params![project_id],
            )?;
            Ok(deleted > 0)
        })
        .await?
    }

    /// Totals over every record of the project plus the current budget
    /// view, read inside one transaction.
    pub async fn usage_summary(&self, project_id: &str) -> Result<UsageSummary, LedgerError> {
        let path = self.path.clone();
        let project_id = project_id.to_string();
        tokio::task::spawn_blocking(move || -> Result<UsageSummary, LedgerError> {
            let mut conn = open_connection(path)?;
            init_schema(&conn)?;
            let tx = conn.transaction()?;

            let (total_requests, total_input, total_output, total_cost): (i64, i64, i64, f64) = tx
                .query_row(
                    "SELECT COUNT(*),
                            COALESCE(SUM(input_tokens), 0),
                            COALESCE(SUM(output_tokens), 0),
                            COALESCE(SUM(cost_usd), 0.0)
                     FROM usage
                     WHERE project_id = ?1",
                    rusqlite::params![project_id],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
                )?;
            let budget = read_budget(&tx, &project_id)?;
            tx.commit()?;

            Ok(UsageSummary {
                project_id,
                total_requests: i64_to_u64(total_requests),
                total_input_tokens: i64_to_u64(total_input),
                total_output_tokens: i64_to_u64(total_output),
                total_cost_usd: total_cost,
                budget,
            })
        })
        .await?
    }

    pub async fn recent_usage(
        &self,
        project_id: &str,
        limit: usize,
    ) -> Result<Vec<UsageRecord>, LedgerError> {
        let path = self.path.clone();
        let project_id = project_id.to_string();
        let limit = i64::try_from(limit.max(1)).unwrap_or(i64::MAX);
        tokio::task::spawn_blocking(move || -> Result<Vec<UsageRecord>, LedgerError> {
            let conn = open_connection(path)?;
            init_schema(&conn)?;

            let mut stmt = conn.prepare(
                "SELECT id, project_id, provider, model, input_tokens, output_tokens,
                        cost_usd, request_id, estimated, created_at_ms
                 FROM usage
                 WHERE project_id = ?1
                 ORDER BY created_at_ms DESC, id DESC
                 LIMIT ?2",
            )?;
            let rows = stmt.query_map(rusqlite::params![project_id, limit], |row| {
                Ok(UsageRecord {
                    id: row.get(0)?,
                    project_id: row.get(1)?,
                    provider: row.get(2)?,
                    model_id: row.get(3)?,
                    input_tokens: i64_to_u64(row.get(4)?),
                    output_tokens: i64_to_u64(row.get(5)?),
                    cost_usd: row.get(6)?,
                    request_id: row.get(7)?,
                    estimated: row.get(8)?,
                    created_at_ms: i64_to_u64(row.get(9)?),
                })
            })?;

            let mut out = Vec::new();
            for row in rows {
                out.push(row?);
            }
            Ok(out)
        })
        .await?
    }
}

fn read_budget(
    conn: &rusqlite::Connection,
    project_id: &str,
) -> Result<Option<Budget>, LedgerError> {
    let budget = conn
        .query_row(
            "SELECT project_id, limit_usd, spent_usd, period_start_ms, period_end_ms,
                    created_at_ms, updated_at_ms
             FROM budgets
             WHERE project_id = ?1",
            rusqlite::params![project_id],
            |row| {
                Ok(Budget {
                    project_id: row.get(0)?,
                    limit_usd: row.get(1)?,
                    spent_usd: row.get(2)?,
                    period_start_ms: i64_to_u64(row.get(3)?),
                    period_end_ms: row.get::<_, Option<i64>>(4)?.map(i64_to_u64),
                    created_at_ms: i64_to_u64(row.get(5)?),
                    updated_at_ms: i64_to_u64(row.get(6)?),
                })
            },
        )
        .optional()?;
    Ok(budget)
}

fn init_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS usage (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            project_id TEXT NOT NULL,
            provider TEXT NOT NULL,
            model TEXT NOT NULL,
            input_tokens INTEGER NOT NULL,
            output_tokens INTEGER NOT NULL,
            cost_usd REAL NOT NULL,
            request_id TEXT NOT NULL UNIQUE,
            estimated INTEGER NOT NULL DEFAULT 0,
            created_at_ms INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_usage_project_id
            ON usage(project_id);
        CREATE INDEX IF NOT EXISTS idx_usage_created_at
            ON usage(created_at_ms);

        CREATE TABLE IF NOT EXISTS budgets (
            project_id TEXT PRIMARY KEY NOT NULL,
            limit_usd REAL NOT NULL,
            spent_usd REAL NOT NULL DEFAULT 0,
            period_start_ms INTEGER NOT NULL,
            period_end_ms INTEGER,
            created_at_ms INTEGER NOT NULL,
            updated_at_ms INTEGER NOT NULL
        );",
    )?;
    Ok(())
}

fn open_connection(path: PathBuf) -> Result<rusqlite::Connection, rusqlite::Error> {
    let conn = rusqlite::Connection::open(path)?;
    let _ = conn.busy_timeout(Duration::from_secs(5));
    let _ = conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL;");
    Ok(conn)
}

fn now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|duration| duration.as_millis() as i64)
        .unwrap_or(0)
}

fn tokens_to_i64(tokens: u64) -> i64 {
    if tokens > i64::MAX as u64 {
        i64::MAX
    } else {
        tokens as i64
    }
}

fn i64_to_u64(value: i64) -> u64 {
    if value <= 0 {
        0
    } else {
        value as u64
    }
}
