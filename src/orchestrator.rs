// 🎬 Commit Orchestrator - five-phase, all-or-nothing pipeline run
// Drives the committers phase by phase inside a single store transaction.
// Committers collect domain errors instead of aborting, so one run surfaces
// the maximal diagnostic set; the commit/rollback decision is taken exactly
// once, at finalization. Audit artifacts are written on every outcome.

use crate::audit::{AuditLog, RunStats};
use crate::committers::{event, meeting, relay, result, swimmer, team, CommitContext};
use crate::errors::CommitError;
use crate::payload::{Phase, PhaseSet};
use crate::progress::{dispatch, ProgressListener, ProgressUpdate};
use crate::store;
use anyhow::Context;
use chrono::{Datelike, Utc};
use rusqlite::Connection;
use std::fs;
use std::path::PathBuf;
use thiserror::Error;
use uuid::Uuid;

// ============================================================================
// RUN SURFACE
// ============================================================================

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub season_id: i64,
    pub season_description: String,
    /// Directory receiving the audit script and run log
    pub artifacts_dir: PathBuf,
}

/// Orchestrator lifecycle, exposed for observers and assertions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Committing(Phase),
    Finalizing,
    Committed,
    RolledBack,
}

/// Successful run: every phase committed in one transaction
#[derive(Debug)]
pub struct RunReport {
    pub run_id: Uuid,
    pub season_id: i64,
    pub stats: RunStats,
    pub statement_count: usize,
    pub script_path: PathBuf,
    pub log_path: PathBuf,
}

/// Rolled-back run: the store is untouched, the artifacts tell why
#[derive(Debug, Error)]
#[error("run {run_id} rolled back with {} commit error(s)", .errors.len())]
pub struct RunFailure {
    pub run_id: Uuid,
    pub errors: Vec<CommitError>,
    pub script_path: PathBuf,
    pub log_path: PathBuf,
}

#[derive(Debug, Error)]
pub enum RunError {
    /// Domain errors were collected; everything was rolled back
    #[error(transparent)]
    RolledBack(#[from] RunFailure),

    /// The store or filesystem failed; no outcome can be asserted
    #[error(transparent)]
    Infrastructure(#[from] anyhow::Error),
}

// ============================================================================
// ORCHESTRATOR
// ============================================================================

pub struct CommitOrchestrator<'a> {
    conn: &'a mut Connection,
    options: RunOptions,
    state: RunState,
}

impl<'a> CommitOrchestrator<'a> {
    pub fn new(conn: &'a mut Connection, options: RunOptions) -> Self {
        CommitOrchestrator {
            conn,
            options,
            state: RunState::Idle,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Run all five phases against the loaded payloads. Exactly one store
    /// transaction brackets the whole run: any collected domain error rolls
    /// everything back, including entities that committed cleanly.
    pub fn run(
        &mut self,
        phases: &PhaseSet,
        listener: &mut dyn ProgressListener,
    ) -> Result<RunReport, RunError> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let season_id = self.options.season_id;
        let competition_year = competition_year(phases);
        let total_steps = Phase::ALL.len();

        let tx = self
            .conn
            .transaction()
            .context("Failed to open commit transaction")?;

        // Season row and vocabulary seeds roll back with the run
        store::ensure_season(&tx, season_id, &self.options.season_description)
            .map_err(RunError::Infrastructure)?;
        let index =
            store::load_category_index(&tx, season_id).map_err(RunError::Infrastructure)?;

        let mut ctx = CommitContext::new(&tx, run_id, season_id, competition_year, index);

        // ---- Phase 1: meeting, calendar, sessions -------------------------
        self.state = RunState::Committing(Phase::VenueSessions);
        let venue = &phases.venue.data;
        let earliest_session = venue.sessions.iter().map(|s| s.scheduled_date).min();
        if let Some(meeting_id) = meeting::commit_meeting(&mut ctx, &venue.meeting, earliest_session)? {
            meeting::commit_calendar(
                &mut ctx,
                meeting_id,
                &venue.meeting.description,
                venue.meeting.header_date.or(earliest_session),
            )?;
        }
        for session in &venue.sessions {
            meeting::commit_session(&mut ctx, session)?;
        }
        dispatch(listener, ProgressUpdate { phase: Phase::VenueSessions, step: 1, total_steps });

        // ---- Phase 2: teams, affiliations ---------------------------------
        self.state = RunState::Committing(Phase::Teams);
        for attrs in &phases.teams.data.teams {
            if let Some(team_id) = team::commit_team(&mut ctx, attrs)? {
                team::commit_affiliation(&mut ctx, team_id, &attrs.name)?;
            }
        }
        dispatch(listener, ProgressUpdate { phase: Phase::Teams, step: 2, total_steps });

        // ---- Phase 3: swimmers, badges ------------------------------------
        self.state = RunState::Committing(Phase::SwimmersBadges);
        for attrs in &phases.swimmers.data.swimmers {
            swimmer::commit_swimmer(&mut ctx, attrs)?;
        }
        for attrs in &phases.swimmers.data.badges {
            swimmer::commit_badge(&mut ctx, attrs)?;
        }
        dispatch(listener, ProgressUpdate { phase: Phase::SwimmersBadges, step: 3, total_steps });

        // ---- Phase 4: events, programs ------------------------------------
        self.state = RunState::Committing(Phase::EventsPrograms);
        for attrs in &phases.events.data.events {
            event::commit_event(&mut ctx, attrs)?;
        }
        for attrs in &phases.events.data.programs {
            event::commit_program_attrs(&mut ctx, attrs)?;
        }
        dispatch(listener, ProgressUpdate { phase: Phase::EventsPrograms, step: 4, total_steps });

        // ---- Phase 5: results, splits -------------------------------------
        self.state = RunState::Committing(Phase::Results);
        for attrs in &phases.results.data.individual_results {
            result::commit_individual_result(&mut ctx, attrs)?;
        }
        for attrs in &phases.results.data.relay_results {
            relay::commit_relay_result(&mut ctx, attrs)?;
        }
        dispatch(listener, ProgressUpdate { phase: Phase::Results, step: 5, total_steps });

        // ---- Finalization -------------------------------------------------
        self.state = RunState::Finalizing;
        let CommitContext { stats, errors, mut script, .. } = ctx;
        let clean = errors.is_empty();

        if clean {
            script.mark_committed();
            tx.commit().context("Failed to commit run transaction")?;
            self.state = RunState::Committed;
        } else {
            script.mark_rolled_back();
            tx.rollback().context("Failed to roll back run transaction")?;
            self.state = RunState::RolledBack;
        }

        fs::create_dir_all(&self.options.artifacts_dir).with_context(|| {
            format!(
                "Failed to create artifacts directory {}",
                self.options.artifacts_dir.display()
            )
        })?;
        let script_path = self.options.artifacts_dir.join(format!("commit_{}.sql", run_id));
        let log_path = self.options.artifacts_dir.join(format!("run_{}.log", run_id));

        let statement_count = script.statement_count();
        script.write_to(&script_path).map_err(RunError::Infrastructure)?;

        let log = AuditLog {
            run_id,
            season_id,
            outcome: if clean { "COMMITTED" } else { "ROLLED BACK" }.to_string(),
            started_at,
            finished_at: Utc::now(),
            fingerprints: phases.fingerprints.clone(),
            stats: stats.clone(),
            errors: errors.errors().to_vec(),
        };
        log.write_to(&log_path).map_err(RunError::Infrastructure)?;

        if clean {
            Ok(RunReport {
                run_id,
                season_id,
                stats,
                statement_count,
                script_path,
                log_path,
            })
        } else {
            Err(RunError::RolledBack(RunFailure {
                run_id,
                errors: errors.into_errors(),
                script_path,
                log_path,
            }))
        }
    }
}

/// Age derivation anchor: the meeting header date wins, then the earliest
/// session, then the payload generation timestamp
fn competition_year(phases: &PhaseSet) -> u32 {
    phases
        .venue
        .data
        .meeting
        .header_date
        .or_else(|| phases.venue.data.sessions.iter().map(|s| s.scheduled_date).min())
        .map(|date| date.year() as u32)
        .or_else(|| phases.venue.generated_at.map(|ts| ts.year() as u32))
        .unwrap_or_else(|| Utc::now().year() as u32)
}
