// 🧩 Entity Committers - shared per-run context and write helpers
// Each committer resolves foreign keys through the run's caches, performs
// an idempotent upsert (match path / create path), updates statistics and
// mirrors every write into the audit script

pub mod event;
pub mod meeting;
pub mod relay;
pub mod result;
pub mod swimmer;
pub mod team;

use crate::audit::{AuditScript, RunStats};
use crate::cache::KeyCache;
use crate::category::CategoryIndex;
use crate::diff::{ChangeSet, Row, SqlValue};
use crate::errors::ErrorLog;
use anyhow::Result;
use rusqlite::{params_from_iter, Connection};
use std::collections::HashMap;
use uuid::Uuid;

// ============================================================================
// PROGRESSIVE ORDINALS
// ============================================================================

/// Monotonic ordinal counter seeded from any explicitly supplied value, so
/// ordering stays stable and gap-tolerant when the source only numbers some
/// entries
#[derive(Debug, Default, Clone, Copy)]
pub struct OrdinalTracker {
    highest: u32,
}

impl OrdinalTracker {
    pub fn assign(&mut self, explicit: Option<u32>) -> u32 {
        match explicit {
            Some(order) => {
                self.highest = self.highest.max(order);
                order
            }
            None => {
                self.highest += 1;
                self.highest
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct Ordinals {
    /// Meeting-wide event ordinal
    pub events: OrdinalTracker,
    /// Per-event program ordinal
    pub programs: HashMap<i64, OrdinalTracker>,
}

// ============================================================================
// KEY CACHES
// ============================================================================

/// One [`KeyCache`] per entity type, created at run start and owned by the
/// run for its whole lifetime
#[derive(Debug, Default)]
pub struct Caches {
    pub meetings: KeyCache,
    pub cities: KeyCache,
    pub pools: KeyCache,
    pub sessions: KeyCache,
    pub teams: KeyCache,
    pub affiliations: KeyCache,
    pub swimmers: KeyCache,
    pub badges: KeyCache,
    pub event_types: KeyCache,
    pub events: KeyCache,
    pub programs: KeyCache,
}

// ============================================================================
// COMMIT CONTEXT
// ============================================================================

/// Mutable state threaded through every committer of one orchestrator run.
/// Nothing here is shared with, or visible to, any other run.
pub struct CommitContext<'a> {
    pub conn: &'a Connection,
    pub season_id: i64,
    /// Competition year used for age derivation
    pub competition_year: u32,
    /// Set by the meeting committer in phase 1
    pub meeting_id: Option<i64>,
    pub index: CategoryIndex,
    pub caches: Caches,
    pub ordinals: Ordinals,
    pub stats: RunStats,
    pub errors: ErrorLog,
    pub script: AuditScript,
}

impl<'a> CommitContext<'a> {
    pub fn new(
        conn: &'a Connection,
        run_id: Uuid,
        season_id: i64,
        competition_year: u32,
        index: CategoryIndex,
    ) -> Self {
        CommitContext {
            conn,
            season_id,
            competition_year,
            meeting_id: None,
            index,
            caches: Caches::default(),
            ordinals: Ordinals::default(),
            stats: RunStats::new(),
            errors: ErrorLog::new(),
            script: AuditScript::new(run_id),
        }
    }
}

// ============================================================================
// WRITE HELPERS
// ============================================================================

/// Insert one row, mirror it into the audit script and bump the entity's
/// created counter. Store failures are infrastructural and propagate.
pub fn insert(ctx: &mut CommitContext, table: &str, entity: &str, row: &Row) -> Result<i64> {
    ctx.conn
        .execute(&row.insert_sql(table), params_from_iter(row.values()))?;
    let id = ctx.conn.last_insert_rowid();
    ctx.script.record(row.insert_literal(table));
    ctx.stats.add_created(entity);
    Ok(id)
}

/// Apply a non-empty change set; an empty one is the suppressed no-op path.
/// Returns whether an UPDATE was actually issued.
pub fn update(
    ctx: &mut CommitContext,
    table: &str,
    entity: &str,
    id: i64,
    changes: &ChangeSet,
) -> Result<bool> {
    if changes.is_empty() {
        return Ok(false);
    }

    let mut params: Vec<SqlValue> = changes.values().cloned().collect();
    params.push(SqlValue::Int(id));
    ctx.conn
        .execute(&changes.update_sql(table), params_from_iter(params.iter()))?;
    ctx.script.record(changes.update_literal(table, id));
    ctx.stats.add_updated(entity);
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordinal_tracker_progressive() {
        let mut tracker = OrdinalTracker::default();

        // Implicit ordinals count up from 1
        assert_eq!(tracker.assign(None), 1);
        assert_eq!(tracker.assign(None), 2);

        // An explicit ordinal reseeds the high-water mark
        assert_eq!(tracker.assign(Some(7)), 7);
        assert_eq!(tracker.assign(None), 8);

        // A lower explicit ordinal never rewinds the counter
        assert_eq!(tracker.assign(Some(3)), 3);
        assert_eq!(tracker.assign(None), 9);
    }
}
