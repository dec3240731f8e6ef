// 🤝 Relay Committers - RelayResult, RelaySwimmer, RelayLap
// Phase 5. Relay entries with an unrecognized category or gender code get
// both derived from the aggregate athlete composition; incomplete athlete
// data preserves the unknown state and surfaces an error instead.

use super::{event, insert, swimmer, team, update, CommitContext};
use crate::category::{resolve_relay_category, resolve_relay_gender, Gender};
use crate::diff::{ChangeSet, Row};
use crate::errors::{CommitError, FieldError};
use crate::payload::{RelayResultAttrs, SwimmerKey};
use crate::store;
use anyhow::Result;
use rusqlite::params;
use std::collections::HashMap;

use super::result::reconstruct_splits;
use super::swimmer::SwimmerProfile;

/// Fixed per-leg stroke order for mixed-stroke (medley) relays
pub const MEDLEY_STROKES: [&str; 4] = ["BK", "BR", "FLY", "FS"];

/// Commit one relay result with its swimmers and splits
pub fn commit_relay_result(ctx: &mut CommitContext, attrs: &RelayResultAttrs) -> Result<Option<i64>> {
    let key = format!("{}-{}|{}", attrs.session_order, attrs.event_code, attrs.team_key);

    let Some(event_id) = event::resolve_event(ctx, attrs.session_order, &attrs.event_code)? else {
        ctx.errors.push(CommitError::unresolved(
            "RelayResult",
            &key,
            format!("event `{}` was not committed", attrs.event_code),
        ));
        return Ok(None);
    };
    let Some(event_type) = event::find_event_type(ctx.conn, &attrs.event_code)? else {
        return Ok(None);
    };
    if !event_type.is_relay {
        ctx.errors.push(CommitError::validation(
            "RelayResult",
            &key,
            vec![FieldError::new("event_code", "individual event on a relay result")],
        ));
        return Ok(None);
    }

    let Some(team_id) = team::resolve_team(ctx, &attrs.team_key)? else {
        ctx.errors.push(CommitError::unresolved(
            "RelayResult",
            &key,
            format!("team `{}` not found", attrs.team_key),
        ));
        return Ok(None);
    };

    // Athlete composition, in source order
    let mut profiles: Vec<Option<SwimmerProfile>> = Vec::with_capacity(attrs.swimmers.len());
    let mut birth_years: Vec<Option<u32>> = Vec::with_capacity(attrs.swimmers.len());
    for leg in &attrs.swimmers {
        let profile = swimmer::swimmer_profile(ctx, &leg.swimmer_key)?;
        // The composite key itself carries the birth year; the store row is
        // the fallback
        let keyed_yob = SwimmerKey::parse(&leg.swimmer_key).and_then(|k| k.year_of_birth);
        birth_years.push(keyed_yob.or(profile.as_ref().and_then(|p| p.year_of_birth)));
        profiles.push(profile);
    }

    // Category: explicit recognized code wins, else derived from the summed
    // ages of the first full team
    let category_id = attrs
        .category_code
        .as_deref()
        .and_then(|code| ctx.index.find_by_code(code, true))
        .map(|band| band.id)
        .or_else(|| {
            resolve_relay_category(&ctx.index, ctx.competition_year, &birth_years)
                .map(|band| band.id)
        });
    let Some(category_id) = category_id else {
        ctx.errors.push(CommitError::unresolved(
            "RelayResult",
            &key,
            "category unrecognized and not derivable from athlete birth years".to_string(),
        ));
        return Ok(None);
    };

    // Gender: explicit recognized code wins, else derived from the athletes
    let gender = attrs
        .gender_code
        .as_deref()
        .and_then(Gender::parse)
        .or_else(|| {
            let genders: Vec<Option<Gender>> =
                profiles.iter().map(|p| p.as_ref().and_then(|p| p.gender)).collect();
            resolve_relay_gender(&genders)
        });
    let Some(gender) = gender else {
        ctx.errors.push(CommitError::unresolved(
            "RelayResult",
            &key,
            "gender unrecognized and not derivable from athletes".to_string(),
        ));
        return Ok(None);
    };

    let Some(program_id) = event::commit_program(ctx, event_id, category_id, gender, None)? else {
        return Ok(None);
    };

    let timing = attrs.timing.unwrap_or_default();
    if attrs.rank.is_some() && !attrs.disqualified && timing.is_zero() {
        ctx.errors.push(CommitError::validation(
            "RelayResult",
            &key,
            vec![FieldError::new("timing", "missing for ranked result")],
        ));
        return Ok(None);
    }

    let persisted = store::query_id(
        ctx.conn,
        "SELECT id FROM meeting_relay_results WHERE meeting_program_id = ?1 AND team_id = ?2",
        params![program_id, team_id],
    )?;

    let result_id = if let Some(id) = persisted {
        let (old_rank, old_min, old_sec, old_hun, old_points, old_dsq) = ctx.conn.query_row(
            "SELECT rank, minutes, seconds, hundredths, standard_points, disqualified
             FROM meeting_relay_results WHERE id = ?1",
            params![id],
            |row| {
                Ok((
                    row.get::<_, Option<u32>>(0)?,
                    row.get::<_, u32>(1)?,
                    row.get::<_, u32>(2)?,
                    row.get::<_, u32>(3)?,
                    row.get::<_, Option<f64>>(4)?,
                    row.get::<_, i64>(5)? != 0,
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
        update(ctx, "meeting_relay_results", "RelayResult", id, &changes)?;
        id
    } else {
        let row = Row::new()
            .set("meeting_program_id", program_id)
            .set("team_id", team_id)
            .set("rank", attrs.rank)
            .set("minutes", timing.minutes)
            .set("seconds", timing.seconds)
            .set("hundredths", timing.hundredths)
            .set("standard_points", attrs.standard_points)
            .set("disqualified", attrs.disqualified);
        insert(ctx, "meeting_relay_results", "RelayResult", &row)?
    };

    // Relay swimmers: leg order defaults to source position, stroke comes
    // from the fixed medley order or the event's single stroke
    let mut legs_by_order: HashMap<u32, i64> = HashMap::new();
    for (position, leg) in attrs.swimmers.iter().enumerate() {
        let relay_order = leg.leg_order.unwrap_or(position as u32 + 1);

        let Some(profile) = &profiles[position] else {
            ctx.errors.push(CommitError::unresolved(
                "RelaySwimmer",
                &key,
                format!("swimmer `{}` not found for leg {}", leg.swimmer_key, relay_order),
            ));
            continue;
        };

        let stroke = if event_type.stroke == "IM" {
            MEDLEY_STROKES[((relay_order.max(1) - 1) as usize) % MEDLEY_STROKES.len()]
        } else {
            event_type.stroke.as_str()
        };

        let leg_id =
            commit_relay_swimmer(ctx, result_id, profile.id, relay_order, stroke, leg.timing)?;
        if let Some(leg_id) = leg_id {
            legs_by_order.insert(relay_order, leg_id);
        }
    }

    // Relay laps: reconstructed like individual splits, linked back to the
    // leg swimming that stretch of the race
    for lap in reconstruct_splits(&attrs.laps) {
        let leg_order = if event_type.phase_length > 0 {
            lap.distance.div_ceil(event_type.phase_length)
        } else {
            0
        };
        let relay_swimmer_id = legs_by_order.get(&leg_order).copied();
        commit_relay_lap(ctx, result_id, relay_swimmer_id, &lap)?;
    }

    Ok(Some(result_id))
}

// ============================================================================
// RELAY SWIMMER
// ============================================================================

fn commit_relay_swimmer(
    ctx: &mut CommitContext,
    result_id: i64,
    swimmer_id: i64,
    relay_order: u32,
    stroke: &str,
    timing: Option<crate::timing::Timing>,
) -> Result<Option<i64>> {
    let persisted = store::query_id(
        ctx.conn,
        "SELECT id FROM relay_swimmers
         WHERE meeting_relay_result_id = ?1 AND relay_order = ?2",
        params![result_id, relay_order],
    )?;

    if let Some(id) = persisted {
        let (old_swimmer, old_stroke, om, os, oh) = ctx.conn.query_row(
            "SELECT swimmer_id, stroke, minutes, seconds, hundredths
             FROM relay_swimmers WHERE id = ?1",
            params![id],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<u32>>(2)?,
                    row.get::<_, Option<u32>>(3)?,
                    row.get::<_, Option<u32>>(4)?,
                ))
            },
        )?;

        let mut changes = ChangeSet::new();
        changes.compare("swimmer_id", old_swimmer, swimmer_id);
        changes.compare("stroke", old_stroke, stroke.to_string());
        changes.compare("minutes", om, timing.map(|t| t.minutes));
        changes.compare("seconds", os, timing.map(|t| t.seconds));
        changes.compare("hundredths", oh, timing.map(|t| t.hundredths));
        update(ctx, "relay_swimmers", "RelaySwimmer", id, &changes)?;
        return Ok(Some(id));
    }

    let row = Row::new()
        .set("meeting_relay_result_id", result_id)
        .set("swimmer_id", swimmer_id)
        .set("relay_order", relay_order)
        .set("stroke", stroke)
        .set("minutes", timing.map(|t| t.minutes))
        .set("seconds", timing.map(|t| t.seconds))
        .set("hundredths", timing.map(|t| t.hundredths));
    let id = insert(ctx, "relay_swimmers", "RelaySwimmer", &row)?;
    Ok(Some(id))
}

// ============================================================================
// RELAY LAP
// ============================================================================

fn commit_relay_lap(
    ctx: &mut CommitContext,
    result_id: i64,
    relay_swimmer_id: Option<i64>,
    lap: &crate::payload::LapAttrs,
) -> Result<Option<i64>> {
    let persisted = store::query_id(
        ctx.conn,
        "SELECT id FROM relay_laps WHERE meeting_relay_result_id = ?1 AND distance = ?2",
        params![result_id, lap.distance],
    )?;

    let absolute = lap.timing;
    let delta = lap.delta;

    if let Some(id) = persisted {
        let (old_leg, om, os, oh, odm, ods, odh) = ctx.conn.query_row(
            "SELECT relay_swimmer_id, minutes, seconds, hundredths,
                    delta_minutes, delta_seconds, delta_hundredths
             FROM relay_laps WHERE id = ?1",
            params![id],
            |row| {
                Ok((
                    row.get::<_, Option<i64>>(0)?,
                    row.get::<_, Option<u32>>(1)?,
                    row.get::<_, Option<u32>>(2)?,
                    row.get::<_, Option<u32>>(3)?,
                    row.get::<_, Option<u32>>(4)?,
                    row.get::<_, Option<u32>>(5)?,
                    row.get::<_, Option<u32>>(6)?,
                ))
            },
        )?;

        let mut changes = ChangeSet::new();
        changes.compare("relay_swimmer_id", old_leg, relay_swimmer_id);
        changes.compare("minutes", om, absolute.map(|t| t.minutes));
        changes.compare("seconds", os, absolute.map(|t| t.seconds));
        changes.compare("hundredths", oh, absolute.map(|t| t.hundredths));
        changes.compare("delta_minutes", odm, delta.map(|t| t.minutes));
        changes.compare("delta_seconds", ods, delta.map(|t| t.seconds));
        changes.compare("delta_hundredths", odh, delta.map(|t| t.hundredths));
        update(ctx, "relay_laps", "RelayLap", id, &changes)?;
        return Ok(Some(id));
    }

    let row = Row::new()
        .set("meeting_relay_result_id", result_id)
        .set("relay_swimmer_id", relay_swimmer_id)
        .set("distance", lap.distance)
        .set("minutes", absolute.map(|t| t.minutes))
        .set("seconds", absolute.map(|t| t.seconds))
        .set("hundredths", absolute.map(|t| t.hundredths))
        .set("delta_minutes", delta.map(|t| t.minutes))
        .set("delta_seconds", delta.map(|t| t.seconds))
        .set("delta_hundredths", delta.map(|t| t.hundredths));
    let id = insert(ctx, "relay_laps", "RelayLap", &row)?;
    Ok(Some(id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::committers::meeting::{commit_meeting, commit_session};
    use crate::committers::swimmer::commit_swimmer;
    use crate::committers::team::commit_team;
    use crate::payload::{
        EventAttrs, MeetingAttrs, RelayLegAttrs, SessionAttrs, SwimmerAttrs, TeamAttrs,
    };
    use crate::store;
    use crate::timing::Timing;
    use chrono::NaiveDate;
    use rusqlite::Connection;
    use uuid::Uuid;

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        store::setup_database(&conn).unwrap();
        store::ensure_season(&conn, 242, "test season").unwrap();
        conn
    }

    /// Meeting, session, relay events, one team and four swimmers aged
    /// 22/23/24/25 in the 2026 competition year
    fn prepared_ctx(conn: &Connection) -> CommitContext<'_> {
        let index = store::load_category_index(conn, 242).unwrap();
        let mut ctx = CommitContext::new(conn, Uuid::new_v4(), 242, 2026, index);

        commit_meeting(
            &mut ctx,
            &MeetingAttrs {
                meeting_id: None,
                description: "Relay Test Meeting".into(),
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
        for code in ["4X50FS", "4X50IM"] {
            crate::committers::event::commit_event(
                &mut ctx,
                &EventAttrs {
                    event_order: None,
                    session_order: 1,
                    event_code: code.into(),
                    heat_type: None,
                },
            )
            .unwrap();
        }

        commit_team(
            &mut ctx,
            &TeamAttrs { team_id: None, name: "Team X".into(), editable_name: None, city_name: None },
        )
        .unwrap();

        let swimmers = [
            ("ROSSI", "ANNA", 2004, "F"),
            ("BIANCHI", "MARA", 2003, "F"),
            ("VERDI", "LUCA", 2002, "M"),
            ("NERI", "PAOLO", 2001, "M"),
        ];
        for (last, first, yob, gender) in swimmers {
            commit_swimmer(
                &mut ctx,
                &SwimmerAttrs {
                    swimmer_id: None,
                    last_name: last.into(),
                    first_name: first.into(),
                    year_of_birth: Some(yob),
                    gender_code: gender.into(),
                },
            )
            .unwrap()
            .unwrap();
        }
        ctx
    }

    fn legs() -> Vec<RelayLegAttrs> {
        vec![
            RelayLegAttrs { swimmer_key: "ROSSI|ANNA|2004".into(), leg_order: None, timing: None },
            RelayLegAttrs { swimmer_key: "BIANCHI|MARA|2003".into(), leg_order: None, timing: None },
            RelayLegAttrs { swimmer_key: "VERDI|LUCA|2002".into(), leg_order: None, timing: None },
            RelayLegAttrs { swimmer_key: "NERI|PAOLO|2001".into(), leg_order: None, timing: None },
        ]
    }

    fn relay(event_code: &str, category: Option<&str>, gender: Option<&str>) -> RelayResultAttrs {
        RelayResultAttrs {
            session_order: 1,
            event_code: event_code.into(),
            team_key: "Team X".into(),
            category_code: category.map(Into::into),
            gender_code: gender.map(Into::into),
            rank: Some(1),
            timing: Some(Timing::new(1, 48, 30)),
            standard_points: None,
            disqualified: false,
            swimmers: legs(),
            laps: vec![],
        }
    }

    #[test]
    fn test_auto_resolved_category_and_gender() {
        let conn = test_conn();
        let mut ctx = prepared_ctx(&conn);

        // Unrecognized sentinel codes force auto-resolution
        let attrs = relay("4X50FS", Some("??"), Some("?"));
        let id = commit_relay_result(&mut ctx, &attrs).unwrap().unwrap();
        assert!(ctx.errors.is_empty());

        // Summed ages 22+23+24+25 = 94 → same band as a direct age-94 lookup
        let direct = ctx.index.find_relay_by_age(94).unwrap();
        let (category, gender): (i64, String) = conn
            .query_row(
                "SELECT mp.category_type_id, mp.gender
                 FROM meeting_relay_results mrr
                 JOIN meeting_programs mp ON mp.id = mrr.meeting_program_id
                 WHERE mrr.id = ?1",
                params![id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!(category, direct.id);
        assert_eq!(direct.code, "M80");
        // Two female + two male athletes → mixed
        assert_eq!(gender, "X");
    }

    #[test]
    fn test_medley_leg_strokes() {
        let conn = test_conn();
        let mut ctx = prepared_ctx(&conn);

        let id = commit_relay_result(&mut ctx, &relay("4X50IM", Some("M80"), Some("X")))
            .unwrap()
            .unwrap();

        let mut stmt = conn
            .prepare(
                "SELECT stroke FROM relay_swimmers
                 WHERE meeting_relay_result_id = ?1 ORDER BY relay_order",
            )
            .unwrap();
        let strokes: Vec<String> = stmt
            .query_map(params![id], |row| row.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(strokes, vec!["BK", "BR", "FLY", "FS"]);
    }

    #[test]
    fn test_single_stroke_relay_strokes() {
        let conn = test_conn();
        let mut ctx = prepared_ctx(&conn);

        let id = commit_relay_result(&mut ctx, &relay("4X50FS", Some("M80"), Some("X")))
            .unwrap()
            .unwrap();

        let stroke: String = conn
            .query_row(
                "SELECT DISTINCT stroke FROM relay_swimmers WHERE meeting_relay_result_id = ?1",
                params![id],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(stroke, "FS");
    }

    #[test]
    fn test_unknown_athlete_blocks_auto_resolution() {
        let conn = test_conn();
        let mut ctx = prepared_ctx(&conn);

        let mut attrs = relay("4X50FS", Some("??"), Some("X"));
        // One leg names an athlete nobody committed, with no birth year in
        // the key either: the sum cannot be formed
        attrs.swimmers[3].swimmer_key = "GHOST|GAL|".into();

        assert!(commit_relay_result(&mut ctx, &attrs).unwrap().is_none());
        assert_eq!(ctx.errors.len(), 1);
    }

    #[test]
    fn test_relay_idempotent_recommit() {
        let conn = test_conn();
        let mut ctx = prepared_ctx(&conn);

        let attrs = relay("4X50FS", Some("M80"), Some("X"));
        let id = commit_relay_result(&mut ctx, &attrs).unwrap().unwrap();
        let created = ctx.stats.created("RelayResult");
        let legs_created = ctx.stats.created("RelaySwimmer");

        let id2 = commit_relay_result(&mut ctx, &attrs).unwrap().unwrap();
        assert_eq!(id, id2);
        assert_eq!(ctx.stats.created("RelayResult"), created);
        assert_eq!(ctx.stats.created("RelaySwimmer"), legs_created);
        assert_eq!(ctx.stats.updated("RelayResult"), 0);
        assert_eq!(ctx.stats.updated("RelaySwimmer"), 0);
    }

    #[test]
    fn test_relay_laps_linked_to_legs() {
        let conn = test_conn();
        let mut ctx = prepared_ctx(&conn);

        let mut attrs = relay("4X50FS", Some("M80"), Some("X"));
        attrs.laps = vec![
            crate::payload::LapAttrs {
                distance: 50,
                timing: None,
                delta: Some(Timing::new(0, 27, 10)),
            },
            crate::payload::LapAttrs {
                distance: 100,
                timing: None,
                delta: Some(Timing::new(0, 26, 80)),
            },
        ];
        let id = commit_relay_result(&mut ctx, &attrs).unwrap().unwrap();

        // Second lap absolute reconstructed from the first
        let (minutes, seconds, hundredths): (u32, u32, u32) = conn
            .query_row(
                "SELECT minutes, seconds, hundredths FROM relay_laps
                 WHERE meeting_relay_result_id = ?1 AND distance = 100",
                params![id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .unwrap();
        assert_eq!(Timing::new(minutes, seconds, hundredths), Timing::new(0, 53, 90));

        // Lap at 100m belongs to leg 2
        let leg_order: u32 = conn
            .query_row(
                "SELECT rs.relay_order FROM relay_laps rl
                 JOIN relay_swimmers rs ON rs.id = rl.relay_swimmer_id
                 WHERE rl.meeting_relay_result_id = ?1 AND rl.distance = 100",
                params![id],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(leg_order, 2);
    }
}
