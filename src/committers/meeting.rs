// 🏟 Venue Committers - Meeting, Calendar, City, SwimmingPool, MeetingSession
// Phase 1: everything later phases hang their foreign keys on

use super::{insert, update, CommitContext};
use crate::diff::{ChangeSet, Row};
use crate::errors::{CommitError, FieldError};
use crate::payload::{CityAttrs, MeetingAttrs, PoolAttrs, SessionAttrs};
use crate::store;
use anyhow::Result;
use chrono::NaiveDate;
use rusqlite::{params, OptionalExtension};

fn date_str(date: &NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

// ============================================================================
// MEETING
// ============================================================================

struct PersistedMeeting {
    description: String,
    header_date: Option<String>,
    edition: Option<u32>,
    scheduled: bool,
}

fn fetch_meeting(ctx: &CommitContext, id: i64) -> Result<Option<PersistedMeeting>> {
    let row = ctx
        .conn
        .query_row(
            "SELECT description, header_date, edition, scheduled FROM meetings WHERE id = ?1",
            params![id],
            |row| {
                Ok(PersistedMeeting {
                    description: row.get(0)?,
                    header_date: row.get(1)?,
                    edition: row.get(2)?,
                    scheduled: row.get::<_, i64>(3)? != 0,
                })
            },
        )
        .optional()?;
    Ok(row)
}

/// Commit the meeting header. `fallback_date` is the earliest session date,
/// used when the source omits the header date. The resolved id is kept on
/// the context for every later phase.
pub fn commit_meeting(
    ctx: &mut CommitContext,
    attrs: &MeetingAttrs,
    fallback_date: Option<NaiveDate>,
) -> Result<Option<i64>> {
    let header_date = attrs.header_date.or(fallback_date);
    let key = format!(
        "{}|{}",
        attrs.description,
        header_date.map(|d| date_str(&d)).unwrap_or_default()
    );

    // Match path: id supplied by the source or resolved by natural key
    let resolved = match attrs.meeting_id {
        Some(id) => Some(id),
        None => {
            let conn = ctx.conn;
            let season_id = ctx.season_id;
            let description = attrs.description.clone();
            ctx.caches.meetings.resolve_with(&key, || {
                store::query_id(
                    conn,
                    "SELECT id FROM meetings WHERE season_id = ?1 AND description = ?2",
                    params![season_id, description],
                )
            })?
        }
    };

    if let Some(id) = resolved {
        let Some(persisted) = fetch_meeting(ctx, id)? else {
            ctx.errors.push(CommitError::unresolved(
                "Meeting",
                &key,
                format!("id {} not found in store", id),
            ));
            return Ok(None);
        };

        let mut changes = ChangeSet::new();
        changes.compare("description", persisted.description, attrs.description.clone());
        changes.compare(
            "header_date",
            persisted.header_date,
            header_date.map(|d| date_str(&d)),
        );
        changes.compare("edition", persisted.edition, attrs.edition);
        changes.compare("scheduled", persisted.scheduled, attrs.scheduled);
        update(ctx, "meetings", "Meeting", id, &changes)?;

        ctx.caches.meetings.store(&key, id);
        ctx.meeting_id = Some(id);
        return Ok(Some(id));
    }

    // Create path
    if attrs.description.trim().is_empty() {
        ctx.errors.push(CommitError::validation(
            "Meeting",
            &key,
            vec![FieldError::new("description", "required field is empty")],
        ));
        return Ok(None);
    }

    let row = Row::new()
        .set("season_id", ctx.season_id)
        .set("description", attrs.description.clone())
        .set("header_date", header_date.map(|d| date_str(&d)))
        .set("edition", attrs.edition)
        .set("scheduled", attrs.scheduled);
    let id = insert(ctx, "meetings", "Meeting", &row)?;

    ctx.caches.meetings.store(&key, id);
    ctx.meeting_id = Some(id);
    Ok(Some(id))
}

// ============================================================================
// CALENDAR
// ============================================================================

/// One calendar entry per meeting, keyed by the meeting id
pub fn commit_calendar(
    ctx: &mut CommitContext,
    meeting_id: i64,
    description: &str,
    scheduled_date: Option<NaiveDate>,
) -> Result<Option<i64>> {
    let persisted = ctx
        .conn
        .query_row(
            "SELECT id, description, scheduled_date FROM calendars WHERE meeting_id = ?1",
            params![meeting_id],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                ))
            },
        )
        .optional()?;

    if let Some((id, old_description, old_date)) = persisted {
        let mut changes = ChangeSet::new();
        changes.compare("description", old_description, description.to_string());
        changes.compare("scheduled_date", old_date, scheduled_date.map(|d| date_str(&d)));
        update(ctx, "calendars", "Calendar", id, &changes)?;
        return Ok(Some(id));
    }

    let row = Row::new()
        .set("season_id", ctx.season_id)
        .set("meeting_id", meeting_id)
        .set("description", description)
        .set("scheduled_date", scheduled_date.map(|d| date_str(&d)));
    let id = insert(ctx, "calendars", "Calendar", &row)?;
    Ok(Some(id))
}

// ============================================================================
// CITY
// ============================================================================

pub fn commit_city(ctx: &mut CommitContext, attrs: &CityAttrs) -> Result<Option<i64>> {
    if attrs.name.trim().is_empty() {
        ctx.errors
            .push(CommitError::missing_key("City", "name is empty"));
        return Ok(None);
    }

    let conn = ctx.conn;
    let name = attrs.name.clone();
    let resolved = ctx.caches.cities.resolve_with(&attrs.name, || {
        store::query_id(conn, "SELECT id FROM cities WHERE name = ?1", params![name])
    })?;

    if let Some(id) = resolved {
        let (old_area, old_country) = ctx.conn.query_row(
            "SELECT area, country_code FROM cities WHERE id = ?1",
            params![id],
            |row| Ok((row.get::<_, Option<String>>(0)?, row.get::<_, Option<String>>(1)?)),
        )?;

        let mut changes = ChangeSet::new();
        changes.compare("area", old_area, attrs.area.clone());
        changes.compare("country_code", old_country, attrs.country_code.clone());
        update(ctx, "cities", "City", id, &changes)?;
        return Ok(Some(id));
    }

    let row = Row::new()
        .set("name", attrs.name.clone())
        .set("area", attrs.area.clone())
        .set("country_code", attrs.country_code.clone());
    let id = insert(ctx, "cities", "City", &row)?;
    ctx.caches.cities.store(&attrs.name, id);
    Ok(Some(id))
}

// ============================================================================
// SWIMMING POOL
// ============================================================================

pub fn commit_pool(ctx: &mut CommitContext, attrs: &PoolAttrs) -> Result<Option<i64>> {
    if attrs.name.trim().is_empty() {
        ctx.errors
            .push(CommitError::missing_key("SwimmingPool", "name is empty"));
        return Ok(None);
    }

    let city_id = match &attrs.city {
        Some(city) => commit_city(ctx, city)?,
        None => None,
    };

    let conn = ctx.conn;
    let name = attrs.name.clone();
    let resolved = ctx.caches.pools.resolve_with(&attrs.name, || {
        store::query_id(conn, "SELECT id FROM swimming_pools WHERE name = ?1", params![name])
    })?;

    if let Some(id) = resolved {
        let (old_length, old_lanes, old_city) = ctx.conn.query_row(
            "SELECT pool_length, lanes, city_id FROM swimming_pools WHERE id = ?1",
            params![id],
            |row| {
                Ok((
                    row.get::<_, u32>(0)?,
                    row.get::<_, Option<u32>>(1)?,
                    row.get::<_, Option<i64>>(2)?,
                ))
            },
        )?;

        let mut changes = ChangeSet::new();
        changes.compare("pool_length", old_length, attrs.pool_length);
        changes.compare("lanes", old_lanes, attrs.lanes);
        changes.compare("city_id", old_city, city_id);
        update(ctx, "swimming_pools", "SwimmingPool", id, &changes)?;
        return Ok(Some(id));
    }

    if attrs.pool_length != 25 && attrs.pool_length != 50 {
        ctx.errors.push(CommitError::validation(
            "SwimmingPool",
            &attrs.name,
            vec![FieldError::new(
                "pool_length",
                format!("expected 25 or 50, got {}", attrs.pool_length),
            )],
        ));
        return Ok(None);
    }

    let row = Row::new()
        .set("name", attrs.name.clone())
        .set("pool_length", attrs.pool_length)
        .set("lanes", attrs.lanes)
        .set("city_id", city_id);
    let id = insert(ctx, "swimming_pools", "SwimmingPool", &row)?;
    ctx.caches.pools.store(&attrs.name, id);
    Ok(Some(id))
}

// ============================================================================
// MEETING SESSION
// ============================================================================

pub fn commit_session(ctx: &mut CommitContext, attrs: &SessionAttrs) -> Result<Option<i64>> {
    let Some(meeting_id) = ctx.meeting_id else {
        ctx.errors.push(CommitError::missing_key(
            "MeetingSession",
            "no meeting resolved before sessions",
        ));
        return Ok(None);
    };

    let pool_id = match &attrs.pool {
        Some(pool) => commit_pool(ctx, pool)?,
        None => None,
    };

    let key = attrs.session_order.to_string();
    let conn = ctx.conn;
    let session_order = attrs.session_order;
    let resolved = ctx.caches.sessions.resolve_with(&key, || {
        store::query_id(
            conn,
            "SELECT id FROM meeting_sessions WHERE meeting_id = ?1 AND session_order = ?2",
            params![meeting_id, session_order],
        )
    })?;

    if let Some(id) = resolved {
        let (old_date, old_part, old_pool) = ctx.conn.query_row(
            "SELECT scheduled_date, day_part, swimming_pool_id FROM meeting_sessions WHERE id = ?1",
            params![id],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, Option<String>>(1)?,
                    row.get::<_, Option<i64>>(2)?,
                ))
            },
        )?;

        let mut changes = ChangeSet::new();
        changes.compare("scheduled_date", old_date, date_str(&attrs.scheduled_date));
        changes.compare("day_part", old_part, attrs.day_part.clone());
        changes.compare("swimming_pool_id", old_pool, pool_id);
        update(ctx, "meeting_sessions", "MeetingSession", id, &changes)?;
        return Ok(Some(id));
    }

    if attrs.session_order == 0 {
        ctx.errors.push(CommitError::validation(
            "MeetingSession",
            &key,
            vec![FieldError::new("session_order", "must be 1 or greater")],
        ));
        return Ok(None);
    }

    let row = Row::new()
        .set("meeting_id", meeting_id)
        .set("session_order", attrs.session_order)
        .set("scheduled_date", date_str(&attrs.scheduled_date))
        .set("day_part", attrs.day_part.clone())
        .set("swimming_pool_id", pool_id);
    let id = insert(ctx, "meeting_sessions", "MeetingSession", &row)?;
    ctx.caches.sessions.store(&key, id);
    Ok(Some(id))
}
