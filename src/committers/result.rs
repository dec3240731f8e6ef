// 🏁 Result Committers - IndividualResult, Lap
// Phase 5. Result failures are recorded and skipped so the rest of the
// result set still gets analyzed; the orchestrator decides rollback later.

use super::{event, insert, swimmer, team, update, CommitContext};
use crate::category::Gender;
use crate::diff::{ChangeSet, Row};
use crate::errors::{CommitError, FieldError};
use crate::payload::{IndividualResultAttrs, LapAttrs};
use crate::store;
use crate::timing::Timing;
use anyhow::Result;
use rusqlite::params;

// ============================================================================
// SPLIT RECONSTRUCTION
// ============================================================================

/// Reconstruct the missing timing form of every split, ordered by distance
/// marker. A split carrying only the delta gets its absolute from the
/// previous split's absolute plus the delta; one carrying only the absolute
/// gets its delta by subtraction. Splits with both or neither forms are
/// left untouched. "Previous" means the next-smaller distance marker with a
/// known absolute, found by ordered lookup, not the most recently inserted
/// row.
pub fn reconstruct_splits(laps: &[LapAttrs]) -> Vec<LapAttrs> {
    let mut ordered: Vec<LapAttrs> = laps.to_vec();
    ordered.sort_by_key(|lap| lap.distance);

    for i in 0..ordered.len() {
        let prev_absolute: Option<Timing> =
            ordered[..i].iter().rev().find_map(|lap| lap.timing);

        let lap = &mut ordered[i];
        match (lap.timing, lap.delta) {
            (None, Some(delta)) => {
                lap.timing = Some(match prev_absolute {
                    Some(prev) => prev + delta,
                    None => delta,
                });
            }
            (Some(absolute), None) => {
                lap.delta = Some(match prev_absolute {
                    Some(prev) => absolute - prev,
                    None => absolute,
                });
            }
            // Both present or both missing: leave unchanged
            _ => {}
        }
    }

    ordered
}

// ============================================================================
// INDIVIDUAL RESULT
// ============================================================================

/// Commit one individual result and its splits. Returns the result id, or
/// `None` with the failure recorded when any dependency cannot be keyed.
pub fn commit_individual_result(
    ctx: &mut CommitContext,
    attrs: &IndividualResultAttrs,
) -> Result<Option<i64>> {
    let key = format!(
        "{}-{}|{}",
        attrs.session_order, attrs.event_code, attrs.swimmer_key
    );

    let Some(event_id) = event::resolve_event(ctx, attrs.session_order, &attrs.event_code)? else {
        ctx.errors.push(CommitError::unresolved(
            "IndividualResult",
            &key,
            format!("event `{}` was not committed", attrs.event_code),
        ));
        return Ok(None);
    };

    let Some(event_type) = event::find_event_type(ctx.conn, &attrs.event_code)? else {
        return Ok(None);
    };
    if event_type.is_relay {
        ctx.errors.push(CommitError::validation(
            "IndividualResult",
            &key,
            vec![FieldError::new("event_code", "relay event on an individual result")],
        ));
        return Ok(None);
    }

    let Some(profile) = swimmer::swimmer_profile(ctx, &attrs.swimmer_key)? else {
        ctx.errors.push(CommitError::unresolved(
            "IndividualResult",
            &key,
            format!("swimmer `{}` not found", attrs.swimmer_key),
        ));
        return Ok(None);
    };
    let Some(team_id) = team::resolve_team(ctx, &attrs.team_key)? else {
        ctx.errors.push(CommitError::unresolved(
            "IndividualResult",
            &key,
            format!("team `{}` not found", attrs.team_key),
        ));
        return Ok(None);
    };

    // Category: explicit recognized code, else derived from the swimmer's age
    let category_id = attrs
        .category_code
        .as_deref()
        .and_then(|code| ctx.index.find_by_code(code, false))
        .map(|band| band.id)
        .or_else(|| {
            profile
                .year_of_birth
                .map(|yob| ctx.competition_year.saturating_sub(yob))
                .and_then(|age| ctx.index.find_by_age(age))
                .map(|band| band.id)
        });
    let Some(category_id) = category_id else {
        ctx.errors.push(CommitError::unresolved(
            "IndividualResult",
            &key,
            "category could not be resolved from code or birth year".to_string(),
        ));
        return Ok(None);
    };

    let gender = attrs
        .gender_code
        .as_deref()
        .and_then(Gender::parse)
        .or(profile.gender);
    let Some(gender) = gender else {
        ctx.errors.push(CommitError::unresolved(
            "IndividualResult",
            &key,
            "gender could not be resolved from code or swimmer".to_string(),
        ));
        return Ok(None);
    };

    let Some(program_id) = event::commit_program(ctx, event_id, category_id, gender, None)? else {
        return Ok(None);
    };

    // Ranked, non-disqualified results must carry a timing
    let timing = attrs.timing.unwrap_or_default();
    if attrs.rank.is_some() && !attrs.disqualified && timing.is_zero() {
        ctx.errors.push(CommitError::validation(
            "IndividualResult",
            &key,
            vec![FieldError::new("timing", "missing for ranked result")],
        ));
        return Ok(None);
    }

    // Badge lookup is best-effort: a missing badge never blocks the result
    let badge_key = format!("{}|{}", attrs.swimmer_key, attrs.team_key);
    let badge_id = {
        let conn = ctx.conn;
        let season_id = ctx.season_id;
        let swimmer_id = profile.id;
        ctx.caches.badges.resolve_with(&badge_key, || {
            store::query_id(
                conn,
                "SELECT id FROM badges
                 WHERE swimmer_id = ?1 AND team_id = ?2 AND season_id = ?3",
                params![swimmer_id, team_id, season_id],
            )
        })?
    };

    let persisted = store::query_id(
        ctx.conn,
        "SELECT id FROM meeting_individual_results
         WHERE meeting_program_id = ?1 AND swimmer_id = ?2",
        params![program_id, profile.id],
    )?;

    let result_id = if let Some(id) = persisted {
        let (old_rank, old_min, old_sec, old_hun, old_points, old_dsq, old_team, old_badge) =
            ctx.conn.query_row(
                "SELECT rank, minutes, seconds, hundredths, standard_points, disqualified,
                        team_id, badge_id
                 FROM meeting_individual_results WHERE id = ?1",
                params![id],
                |row| {
                    Ok((
                        row.get::<_, Option<u32>>(0)?,
                        row.get::<_, u32>(1)?,
                        row.get::<_, u32>(2)?,
                        row.get::<_, u32>(3)?,
                        row.get::<_, Option<f64>>(4)?,
                        row.get::<_, i64>(5)? != 0,
                        row.get::<_, i64>(6)?,
                        row.get::<_, Option<i64>>(7)?,
                    ))
                },
            )?;

        let mut changes = ChangeSet::new();
        changes.compare("rank", old_rank, attrs.rank);
        changes.compare("minutes", old_min, timing.minutes);
        changes.compare("seconds", old_sec, timing.seconds);
        changes.compare("hundredths", old_hun, timing.hundredths);
        changes.compare("standard_points", old_points, attrs.standard_points);
        changes.compare("disqualified", old_dsq, attrs.disqualified);
        changes.compare("team_id", old_team, team_id);
        changes.compare("badge_id", old_badge, badge_id);
        update(ctx, "meeting_individual_results", "IndividualResult", id, &changes)?;
        id
    } else {
        let row = Row::new()
            .set("meeting_program_id", program_id)
            .set("swimmer_id", profile.id)
            .set("team_id", team_id)
            .set("badge_id", badge_id)
            .set("rank", attrs.rank)
            .set("minutes", timing.minutes)
            .set("seconds", timing.seconds)
            .set("hundredths", timing.hundredths)
            .set("standard_points", attrs.standard_points)
            .set("disqualified", attrs.disqualified);
        insert(ctx, "meeting_individual_results", "IndividualResult", &row)?
    };

    for lap in reconstruct_splits(&attrs.laps) {
        commit_lap(ctx, result_id, &lap)?;
    }

    Ok(Some(result_id))
}

// ============================================================================
// LAP
// ============================================================================

fn commit_lap(ctx: &mut CommitContext, result_id: i64, lap: &LapAttrs) -> Result<Option<i64>> {
    let persisted = store::query_id(
        ctx.conn,
        "SELECT id FROM laps WHERE meeting_individual_result_id = ?1 AND distance = ?2",
        params![result_id, lap.distance],
    )?;

    let absolute = lap.timing;
    let delta = lap.delta;

    if let Some(id) = persisted {
        let (om, os, oh, odm, ods, odh) = ctx.conn.query_row(
            "SELECT minutes, seconds, hundredths, delta_minutes, delta_seconds, delta_hundredths
             FROM laps WHERE id = ?1",
            params![id],
            |row| {
                Ok((
                    row.get::<_, Option<u32>>(0)?,
                    row.get::<_, Option<u32>>(1)?,
                    row.get::<_, Option<u32>>(2)?,
                    row.get::<_, Option<u32>>(3)?,
                    row.get::<_, Option<u32>>(4)?,
                    row.get::<_, Option<u32>>(5)?,
                ))
            },
        )?;

        let mut changes = ChangeSet::new();
        changes.compare("minutes", om, absolute.map(|t| t.minutes));
        changes.compare("seconds", os, absolute.map(|t| t.seconds));
        changes.compare("hundredths", oh, absolute.map(|t| t.hundredths));
        changes.compare("delta_minutes", odm, delta.map(|t| t.minutes));
        changes.compare("delta_seconds", ods, delta.map(|t| t.seconds));
        changes.compare("delta_hundredths", odh, delta.map(|t| t.hundredths));
        update(ctx, "laps", "Lap", id, &changes)?;
        return Ok(Some(id));
    }

    let row = Row::new()
        .set("meeting_individual_result_id", result_id)
        .set("distance", lap.distance)
        .set("minutes", absolute.map(|t| t.minutes))
        .set("seconds", absolute.map(|t| t.seconds))
        .set("hundredths", absolute.map(|t| t.hundredths))
        .set("delta_minutes", delta.map(|t| t.minutes))
        .set("delta_seconds", delta.map(|t| t.seconds))
        .set("delta_hundredths", delta.map(|t| t.hundredths));
    let id = insert(ctx, "laps", "Lap", &row)?;
    Ok(Some(id))
}
