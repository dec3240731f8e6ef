// 📅 Event Committers - MeetingEvent, MeetingProgram
// Phase 4. Ordinals are auto-assigned progressively when the source only
// numbers some entries; programs are unique per (event, category, gender)
// and may also be created lazily by the result committers in phase 5.

use super::{insert, update, CommitContext};
use crate::category::Gender;
use crate::diff::{ChangeSet, Row};
use crate::errors::CommitError;
use crate::payload::{EventAttrs, ProgramAttrs};
use crate::store;
use anyhow::Result;
use rusqlite::{params, Connection, OptionalExtension};

// ============================================================================
// EVENT TYPES
// ============================================================================

/// Seeded event-type vocabulary row
#[derive(Debug, Clone)]
pub struct EventTypeInfo {
    pub id: i64,
    pub code: String,
    pub is_relay: bool,
    pub stroke: String,
    pub phases: u32,
    pub phase_length: u32,
}

pub fn find_event_type(conn: &Connection, code: &str) -> Result<Option<EventTypeInfo>> {
    let info = conn
        .query_row(
            "SELECT id, code, is_relay, stroke, phases, phase_length
             FROM event_types WHERE code = ?1",
            params![code],
            |row| {
                Ok(EventTypeInfo {
                    id: row.get(0)?,
                    code: row.get(1)?,
                    is_relay: row.get::<_, i64>(2)? != 0,
                    stroke: row.get(3)?,
                    phases: row.get(4)?,
                    phase_length: row.get(5)?,
                })
            },
        )
        .optional()?;
    Ok(info)
}

// ============================================================================
// MEETING EVENT
// ============================================================================

fn resolve_session(ctx: &mut CommitContext, session_order: u32) -> Result<Option<i64>> {
    let Some(meeting_id) = ctx.meeting_id else {
        return Ok(None);
    };
    let conn = ctx.conn;
    let key = session_order.to_string();
    ctx.caches.sessions.resolve_with(&key, || {
        store::query_id(
            conn,
            "SELECT id FROM meeting_sessions WHERE meeting_id = ?1 AND session_order = ?2",
            params![meeting_id, session_order],
        )
    })
}

/// Commit one meeting event into its session, assigning a progressive
/// ordinal when the source omits one
pub fn commit_event(ctx: &mut CommitContext, attrs: &EventAttrs) -> Result<Option<i64>> {
    let key = attrs.key();

    let Some(session_id) = resolve_session(ctx, attrs.session_order)? else {
        ctx.errors.push(CommitError::unresolved(
            "MeetingEvent",
            &key,
            format!("session {} was not committed in phase 1", attrs.session_order),
        ));
        return Ok(None);
    };

    let Some(event_type) = find_event_type(ctx.conn, &attrs.event_code)? else {
        ctx.errors.push(CommitError::unresolved(
            "MeetingEvent",
            &key,
            format!("unknown event-type code `{}`", attrs.event_code),
        ));
        return Ok(None);
    };

    let conn = ctx.conn;
    let event_type_id = event_type.id;
    let resolved = ctx.caches.events.resolve_with(&key, || {
        store::query_id(
            conn,
            "SELECT id FROM meeting_events
             WHERE meeting_session_id = ?1 AND event_type_id = ?2",
            params![session_id, event_type_id],
        )
    })?;

    if let Some(id) = resolved {
        let (persisted_order, old_heat): (u32, Option<String>) = ctx.conn.query_row(
            "SELECT event_order, heat_type FROM meeting_events WHERE id = ?1",
            params![id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        // Keep the ordinal counter consistent with what the store already has
        ctx.ordinals.events.assign(Some(persisted_order));

        let mut changes = ChangeSet::new();
        changes.compare("heat_type", old_heat, attrs.heat_type.clone());
        update(ctx, "meeting_events", "MeetingEvent", id, &changes)?;
        return Ok(Some(id));
    }

    let event_order = ctx.ordinals.events.assign(attrs.event_order);
    let row = Row::new()
        .set("meeting_session_id", session_id)
        .set("event_type_id", event_type.id)
        .set("event_order", event_order)
        .set("heat_type", attrs.heat_type.clone());
    let id = insert(ctx, "meeting_events", "MeetingEvent", &row)?;
    ctx.caches.events.store(&key, id);
    Ok(Some(id))
}

/// Resolve a committed event by (session order, event code) without
/// creating one. Used by the result committers.
pub fn resolve_event(
    ctx: &mut CommitContext,
    session_order: u32,
    event_code: &str,
) -> Result<Option<i64>> {
    let key = format!("{}-{}", session_order, event_code);
    if let Some(id) = ctx.caches.events.get(&key) {
        return Ok(Some(id));
    }

    let Some(session_id) = resolve_session(ctx, session_order)? else {
        return Ok(None);
    };
    let Some(event_type) = find_event_type(ctx.conn, event_code)? else {
        return Ok(None);
    };

    let conn = ctx.conn;
    let event_type_id = event_type.id;
    ctx.caches.events.resolve_with(&key, || {
        store::query_id(
            conn,
            "SELECT id FROM meeting_events
             WHERE meeting_session_id = ?1 AND event_type_id = ?2",
            params![session_id, event_type_id],
        )
    })
}

// ============================================================================
// MEETING PROGRAM
// ============================================================================

/// Commit one program under an event: unique per (event, category, gender),
/// created when the first entry for that combination appears
pub fn commit_program(
    ctx: &mut CommitContext,
    event_id: i64,
    category_id: i64,
    gender: Gender,
    explicit_order: Option<u32>,
) -> Result<Option<i64>> {
    let key = format!("{}|{}|{}", event_id, category_id, gender.code());

    let conn = ctx.conn;
    let gender_code = gender.code();
    let resolved = ctx.caches.programs.resolve_with(&key, || {
        store::query_id(
            conn,
            "SELECT id FROM meeting_programs
             WHERE meeting_event_id = ?1 AND category_type_id = ?2 AND gender = ?3",
            params![event_id, category_id, gender_code],
        )
    })?;

    let tracker = ctx.ordinals.programs.entry(event_id).or_default();
    if let Some(id) = resolved {
        let persisted_order: u32 = ctx.conn.query_row(
            "SELECT program_order FROM meeting_programs WHERE id = ?1",
            params![id],
            |row| row.get(0),
        )?;
        tracker.assign(Some(persisted_order));
        return Ok(Some(id));
    }

    let program_order = tracker.assign(explicit_order);
    let row = Row::new()
        .set("meeting_event_id", event_id)
        .set("category_type_id", category_id)
        .set("gender", gender.code())
        .set("program_order", program_order);
    let id = insert(ctx, "meeting_programs", "MeetingProgram", &row)?;
    ctx.caches.programs.store(&key, id);
    Ok(Some(id))
}

/// Explicit-program entry from the phase 4 payload
pub fn commit_program_attrs(ctx: &mut CommitContext, attrs: &ProgramAttrs) -> Result<Option<i64>> {
    let key = format!(
        "{}-{}|{}|{}",
        attrs.session_order, attrs.event_code, attrs.category_code, attrs.gender_code
    );

    let Some(event_id) = resolve_event(ctx, attrs.session_order, &attrs.event_code)? else {
        ctx.errors.push(CommitError::unresolved(
            "MeetingProgram",
            &key,
            format!("event `{}` was not committed", attrs.event_code),
        ));
        return Ok(None);
    };

    let Some(event_type) = find_event_type(ctx.conn, &attrs.event_code)? else {
        return Ok(None);
    };

    let Some(gender) = Gender::parse(&attrs.gender_code) else {
        ctx.errors.push(CommitError::unresolved(
            "MeetingProgram",
            &key,
            format!("unrecognized gender code `{}`", attrs.gender_code),
        ));
        return Ok(None);
    };

    let Some(band) = ctx.index.find_by_code(&attrs.category_code, event_type.is_relay) else {
        ctx.errors.push(CommitError::unresolved(
            "MeetingProgram",
            &key,
            format!("unrecognized category code `{}`", attrs.category_code),
        ));
        return Ok(None);
    };
    let category_id = band.id;

    commit_program(ctx, event_id, category_id, gender, attrs.program_order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::committers::meeting::{commit_meeting, commit_session};
    use crate::payload::{MeetingAttrs, SessionAttrs};
    use crate::store;
    use chrono::NaiveDate;
    use rusqlite::Connection;
    use uuid::Uuid;

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        store::setup_database(&conn).unwrap();
        store::ensure_season(&conn, 242, "test season").unwrap();
        conn
    }

    fn ctx_with_session(conn: &Connection) -> CommitContext<'_> {
        let index = store::load_category_index(conn, 242).unwrap();
        let mut ctx = CommitContext::new(conn, Uuid::new_v4(), 242, 2026, index);
        commit_meeting(
            &mut ctx,
            &MeetingAttrs {
                meeting_id: None,
                description: "Test Meeting".into(),
                header_date: NaiveDate::from_ymd_opt(2026, 3, 14),
                edition: None,
                scheduled: false,
            },
            None,
        )
        .unwrap();
        commit_session(
            &mut ctx,
            &SessionAttrs {
                session_order: 1,
                scheduled_date: NaiveDate::from_ymd_opt(2026, 3, 14).unwrap(),
                day_part: None,
                pool: None,
            },
        )
        .unwrap();
        ctx
    }

    fn event(code: &str, order: Option<u32>) -> EventAttrs {
        EventAttrs {
            event_order: order,
            session_order: 1,
            event_code: code.into(),
            heat_type: None,
        }
    }

    #[test]
    fn test_event_create_and_rematch() {
        let conn = test_conn();
        let mut ctx = ctx_with_session(&conn);

        let id = commit_event(&mut ctx, &event("100FS", Some(1))).unwrap().unwrap();
        let id2 = commit_event(&mut ctx, &event("100FS", Some(1))).unwrap().unwrap();

        assert_eq!(id, id2);
        assert_eq!(ctx.stats.created("MeetingEvent"), 1);
        assert_eq!(ctx.stats.updated("MeetingEvent"), 0);
    }

    #[test]
    fn test_event_progressive_ordinals() {
        let conn = test_conn();
        let mut ctx = ctx_with_session(&conn);

        // Explicit 3, then two unnumbered entries: 4 and 5
        commit_event(&mut ctx, &event("50FS", Some(3))).unwrap().unwrap();
        let e2 = commit_event(&mut ctx, &event("100FS", None)).unwrap().unwrap();
        let e3 = commit_event(&mut ctx, &event("200FS", None)).unwrap().unwrap();

        let order2: u32 = conn
            .query_row("SELECT event_order FROM meeting_events WHERE id = ?1", params![e2], |r| r.get(0))
            .unwrap();
        let order3: u32 = conn
            .query_row("SELECT event_order FROM meeting_events WHERE id = ?1", params![e3], |r| r.get(0))
            .unwrap();
        assert_eq!(order2, 4);
        assert_eq!(order3, 5);
    }

    #[test]
    fn test_event_unknown_code_is_unresolved() {
        let conn = test_conn();
        let mut ctx = ctx_with_session(&conn);

        assert!(commit_event(&mut ctx, &event("33XX", None)).unwrap().is_none());
        assert_eq!(ctx.errors.len(), 1);
    }

    #[test]
    fn test_program_unique_per_category_and_gender() {
        let conn = test_conn();
        let mut ctx = ctx_with_session(&conn);
        let event_id = commit_event(&mut ctx, &event("100FS", Some(1))).unwrap().unwrap();

        let m25 = ctx.index.find_by_code("M25", false).unwrap().id;
        let m30 = ctx.index.find_by_code("M30", false).unwrap().id;

        let p1 = commit_program(&mut ctx, event_id, m25, Gender::Female, None).unwrap().unwrap();
        let p1_again = commit_program(&mut ctx, event_id, m25, Gender::Female, None).unwrap().unwrap();
        let p2 = commit_program(&mut ctx, event_id, m25, Gender::Male, None).unwrap().unwrap();
        let p3 = commit_program(&mut ctx, event_id, m30, Gender::Female, None).unwrap().unwrap();

        assert_eq!(p1, p1_again);
        assert_ne!(p1, p2);
        assert_ne!(p1, p3);
        assert_eq!(ctx.stats.created("MeetingProgram"), 3);

        // Program ordinals progress within the event
        let order3: u32 = conn
            .query_row("SELECT program_order FROM meeting_programs WHERE id = ?1", params![p3], |r| r.get(0))
            .unwrap();
        assert_eq!(order3, 3);
    }

    #[test]
    fn test_program_attrs_relay_category() {
        let conn = test_conn();
        let mut ctx = ctx_with_session(&conn);
        commit_event(&mut ctx, &event("4X50FS", Some(1))).unwrap().unwrap();

        let attrs = ProgramAttrs {
            session_order: 1,
            event_code: "4X50FS".into(),
            category_code: "M100".into(),
            gender_code: "X".into(),
            program_order: None,
        };
        let id = commit_program_attrs(&mut ctx, &attrs).unwrap();
        assert!(id.is_some());
        assert!(ctx.errors.is_empty());
    }
}
