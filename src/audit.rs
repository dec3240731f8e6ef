// 📜 Audit Artifacts - replayable script + human-readable run log
// Every persisted change is mirrored into an ordered SQL script bracketed
// by transaction markers, so a run can be replayed verbatim on another
// deployment of the same schema. The log is written on every outcome.

use crate::errors::CommitError;
use crate::payload::PayloadFingerprint;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use uuid::Uuid;

// ============================================================================
// RUN STATISTICS
// ============================================================================

/// Per-entity-type created/updated counters for one run
#[derive(Debug, Default, Clone)]
pub struct RunStats {
    counters: BTreeMap<String, (u32, u32)>,
}

impl RunStats {
    pub fn new() -> Self {
        RunStats::default()
    }

    pub fn add_created(&mut self, entity: &str) {
        self.counters.entry(entity.to_string()).or_default().0 += 1;
    }

    pub fn add_updated(&mut self, entity: &str) {
        self.counters.entry(entity.to_string()).or_default().1 += 1;
    }

    pub fn created(&self, entity: &str) -> u32 {
        self.counters.get(entity).map(|c| c.0).unwrap_or(0)
    }

    pub fn updated(&self, entity: &str) -> u32 {
        self.counters.get(entity).map(|c| c.1).unwrap_or(0)
    }

    pub fn total_created(&self) -> u32 {
        self.counters.values().map(|c| c.0).sum()
    }

    pub fn total_updated(&self) -> u32 {
        self.counters.values().map(|c| c.1).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u32, u32)> {
        self.counters.iter().map(|(k, (c, u))| (k.as_str(), *c, *u))
    }
}

// ============================================================================
// AUDIT SCRIPT
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptOutcome {
    Pending,
    Committed,
    RolledBack,
}

/// Ordered buffer of generated write statements, exclusively owned by one
/// orchestrator run
#[derive(Debug)]
pub struct AuditScript {
    run_id: Uuid,
    started_at: DateTime<Utc>,
    statements: Vec<String>,
    outcome: ScriptOutcome,
}

impl AuditScript {
    pub fn new(run_id: Uuid) -> Self {
        AuditScript {
            run_id,
            started_at: Utc::now(),
            statements: Vec::new(),
            outcome: ScriptOutcome::Pending,
        }
    }

    /// Append one write statement, in commit order
    pub fn record(&mut self, statement: String) {
        self.statements.push(statement);
    }

    pub fn mark_committed(&mut self) {
        self.outcome = ScriptOutcome::Committed;
    }

    pub fn mark_rolled_back(&mut self) {
        self.outcome = ScriptOutcome::RolledBack;
    }

    pub fn outcome(&self) -> ScriptOutcome {
        self.outcome
    }

    pub fn statement_count(&self) -> usize {
        self.statements.len()
    }

    /// Render the full script with transaction-boundary markers. Only a
    /// COMMIT-terminated script is meant for replay; a rolled-back run still
    /// renders (with ROLLBACK) for inspection.
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("-- meet-commit audit script\n-- run: {}\n", self.run_id));
        out.push_str(&format!("-- started: {}\n", self.started_at.to_rfc3339()));
        if self.outcome == ScriptOutcome::RolledBack {
            out.push_str("-- run was ROLLED BACK; do not replay\n");
        }
        out.push_str("BEGIN TRANSACTION;\n");
        for statement in &self.statements {
            out.push_str(statement);
            out.push('\n');
        }
        match self.outcome {
            ScriptOutcome::Committed => out.push_str("COMMIT;\n"),
            ScriptOutcome::RolledBack => out.push_str("ROLLBACK;\n"),
            ScriptOutcome::Pending => out.push_str("-- run still open\n"),
        }
        out
    }

    pub fn write_to(&self, path: &Path) -> Result<()> {
        fs::write(path, self.render())
            .with_context(|| format!("Failed to write audit script {}", path.display()))
    }
}

// ============================================================================
// AUDIT LOG
// ============================================================================

/// Human-readable run report: per-entity counts, every collected error with
/// field-level detail, input fingerprints, final outcome
#[derive(Debug)]
pub struct AuditLog {
    pub run_id: Uuid,
    pub season_id: i64,
    pub outcome: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub fingerprints: Vec<PayloadFingerprint>,
    pub stats: RunStats,
    pub errors: Vec<CommitError>,
}

impl AuditLog {
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str("=== meet-commit run log ===\n");
        out.push_str(&format!("run:      {}\n", self.run_id));
        out.push_str(&format!("season:   {}\n", self.season_id));
        out.push_str(&format!("started:  {}\n", self.started_at.to_rfc3339()));
        out.push_str(&format!("finished: {}\n", self.finished_at.to_rfc3339()));
        out.push_str(&format!("outcome:  {}\n", self.outcome));

        out.push_str("\n--- input payloads ---\n");
        for fp in &self.fingerprints {
            out.push_str(&format!("{}  {}\n", fp.sha256, fp.file_name));
        }

        out.push_str("\n--- entity statistics (created/updated) ---\n");
        for (entity, created, updated) in self.stats.iter() {
            out.push_str(&format!("{:<24} {:>5} / {:<5}\n", entity, created, updated));
        }
        out.push_str(&format!(
            "{:<24} {:>5} / {:<5}\n",
            "TOTAL",
            self.stats.total_created(),
            self.stats.total_updated()
        ));

        out.push_str(&format!("\n--- errors ({}) ---\n", self.errors.len()));
        for error in &self.errors {
            for line in error.detail_lines() {
                out.push_str(&line);
                out.push('\n');
            }
        }

        out
    }

    pub fn write_to(&self, path: &Path) -> Result<()> {
        fs::write(path, self.render())
            .with_context(|| format!("Failed to write audit log {}", path.display()))
    }
}
