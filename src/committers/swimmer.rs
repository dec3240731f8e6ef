// 🏊 Swimmer Committers - Swimmer, Badge
// Phase 3. Swimmers match by id, else by (name, year of birth); badges are
// unique per (swimmer, team, season) and pull their category and seasonal
// affiliation in through the shared caches.

use super::{insert, team, update, CommitContext};
use crate::category::Gender;
use crate::diff::{ChangeSet, Row};
use crate::errors::{CommitError, FieldError};
use crate::payload::{BadgeAttrs, SwimmerAttrs, SwimmerKey};
use crate::store;
use anyhow::Result;
use rusqlite::{params, OptionalExtension};

/// Entry-time preference applied when the source omits one: seed from the
/// swimmer's last race
pub const DEFAULT_ENTRY_TIME_TYPE: &str = "LR";

// ============================================================================
// SWIMMER
// ============================================================================

struct PersistedSwimmer {
    last_name: String,
    first_name: String,
    complete_name: String,
    year_of_birth: Option<u32>,
    gender: String,
}

fn fetch_swimmer(ctx: &CommitContext, id: i64) -> Result<Option<PersistedSwimmer>> {
    let row = ctx
        .conn
        .query_row(
            "SELECT last_name, first_name, complete_name, year_of_birth, gender
             FROM swimmers WHERE id = ?1",
            params![id],
            |row| {
                Ok(PersistedSwimmer {
                    last_name: row.get(0)?,
                    first_name: row.get(1)?,
                    complete_name: row.get(2)?,
                    year_of_birth: row.get(3)?,
                    gender: row.get(4)?,
                })
            },
        )
        .optional()?;
    Ok(row)
}

fn query_swimmer_by_key(conn: &rusqlite::Connection, key: &SwimmerKey) -> Result<Option<i64>> {
    match key.year_of_birth {
        Some(yob) => store::query_id(
            conn,
            "SELECT id FROM swimmers
             WHERE last_name = ?1 AND first_name = ?2 AND year_of_birth = ?3",
            params![key.last_name, key.first_name, yob],
        ),
        // Partial-key match when the source never learned the birth year
        None => store::query_id(
            conn,
            "SELECT id FROM swimmers WHERE last_name = ?1 AND first_name = ?2",
            params![key.last_name, key.first_name],
        ),
    }
}

/// Resolve a swimmer by composite key without creating one. An optional
/// leading gender token on the raw key is stripped before matching.
pub fn resolve_swimmer(ctx: &mut CommitContext, raw_key: &str) -> Result<Option<i64>> {
    let Some(key) = SwimmerKey::parse(raw_key) else {
        return Ok(None);
    };

    let canonical = key.canonical();
    let conn = ctx.conn;
    ctx.caches
        .swimmers
        .resolve_with(&canonical, || query_swimmer_by_key(conn, &key))
}

/// Commit one swimmer: match by id, else by (name, year of birth) pair,
/// create when absent.
pub fn commit_swimmer(ctx: &mut CommitContext, attrs: &SwimmerAttrs) -> Result<Option<i64>> {
    let key = attrs.key();

    if attrs.last_name.trim().is_empty() {
        ctx.errors
            .push(CommitError::missing_key("Swimmer", "last name is empty"));
        return Ok(None);
    }

    let gender = Gender::parse(&attrs.gender_code);
    let complete_name = format!("{} {}", attrs.last_name, attrs.first_name);

    let resolved = match attrs.swimmer_id {
        Some(id) => Some(id),
        None => {
            let conn = ctx.conn;
            let parsed = SwimmerKey {
                last_name: attrs.last_name.clone(),
                first_name: attrs.first_name.clone(),
                year_of_birth: attrs.year_of_birth,
                gender,
            };
            ctx.caches
                .swimmers
                .resolve_with(&key, || query_swimmer_by_key(conn, &parsed))?
        }
    };

    if let Some(id) = resolved {
        let Some(persisted) = fetch_swimmer(ctx, id)? else {
            ctx.errors.push(CommitError::unresolved(
                "Swimmer",
                &key,
                format!("id {} not found in store", id),
            ));
            return Ok(None);
        };

        let mut changes = ChangeSet::new();
        changes.compare("last_name", persisted.last_name, attrs.last_name.clone());
        changes.compare("first_name", persisted.first_name, attrs.first_name.clone());
        changes.compare("complete_name", persisted.complete_name, complete_name);
        changes.compare("year_of_birth", persisted.year_of_birth, attrs.year_of_birth);
        if let Some(g) = gender {
            changes.compare("gender", persisted.gender, g.code().to_string());
        }
        update(ctx, "swimmers", "Swimmer", id, &changes)?;

        ctx.caches.swimmers.store(&key, id);
        return Ok(Some(id));
    }

    // Create path: validate before inserting
    let mut fields = Vec::new();
    if let Some(yob) = attrs.year_of_birth {
        if yob < 1900 || yob > ctx.competition_year {
            fields.push(FieldError::new(
                "year_of_birth",
                format!("{} is out of plausible range", yob),
            ));
        }
    }
    if gender.is_none() {
        fields.push(FieldError::new(
            "gender",
            format!("unrecognized code `{}`", attrs.gender_code),
        ));
    }
    if !fields.is_empty() {
        ctx.errors.push(CommitError::validation("Swimmer", &key, fields));
        return Ok(None);
    }

    let row = Row::new()
        .set("last_name", attrs.last_name.clone())
        .set("first_name", attrs.first_name.clone())
        .set("complete_name", complete_name)
        .set("year_of_birth", attrs.year_of_birth)
        .set("gender", gender.map(|g| g.code()).unwrap_or("X"));
    let id = insert(ctx, "swimmers", "Swimmer", &row)?;
    ctx.caches.swimmers.store(&key, id);
    Ok(Some(id))
}

/// Identity plus the attributes the relay auto-resolver needs
#[derive(Debug, Clone)]
pub struct SwimmerProfile {
    pub id: i64,
    pub year_of_birth: Option<u32>,
    pub gender: Option<Gender>,
}

pub fn swimmer_profile(ctx: &mut CommitContext, raw_key: &str) -> Result<Option<SwimmerProfile>> {
    let Some(id) = resolve_swimmer(ctx, raw_key)? else {
        return Ok(None);
    };

    let (year_of_birth, gender_code) = ctx.conn.query_row(
        "SELECT year_of_birth, gender FROM swimmers WHERE id = ?1",
        params![id],
        |row| Ok((row.get::<_, Option<u32>>(0)?, row.get::<_, String>(1)?)),
    )?;

    Ok(Some(SwimmerProfile {
        id,
        year_of_birth,
        gender: Gender::parse(&gender_code),
    }))
}

// ============================================================================
// BADGE
// ============================================================================

/// Commit one badge: the swimmer's seasonal registration under a team.
/// Resolves swimmer, team, category and affiliation through the caches;
/// the affiliation is created on demand when none exists for the season.
pub fn commit_badge(ctx: &mut CommitContext, attrs: &BadgeAttrs) -> Result<Option<i64>> {
    let key = format!("{}|{}", attrs.swimmer_key, attrs.team_key);

    if attrs.swimmer_key.trim().is_empty() || attrs.team_key.trim().is_empty() {
        ctx.errors.push(CommitError::missing_key(
            "Badge",
            "swimmer key and team key are both required",
        ));
        return Ok(None);
    }

    // Swimmer and team identity failures poison the badge
    let Some(swimmer_id) = resolve_swimmer(ctx, &attrs.swimmer_key)? else {
        ctx.errors.push(CommitError::unresolved(
            "Badge",
            &key,
            format!("swimmer `{}` not found", attrs.swimmer_key),
        ));
        return Ok(None);
    };
    let Some(team_id) = team::resolve_team(ctx, &attrs.team_key)? else {
        ctx.errors.push(CommitError::unresolved(
            "Badge",
            &key,
            format!("team `{}` not found", attrs.team_key),
        ));
        return Ok(None);
    };

    // Category: explicit recognized code wins, else derived from the
    // swimmer's age under the season index
    let category_id = resolve_badge_category(ctx, attrs, swimmer_id)?;
    let Some(category_id) = category_id else {
        ctx.errors.push(CommitError::unresolved(
            "Badge",
            &key,
            "category could not be resolved from code or birth year".to_string(),
        ));
        return Ok(None);
    };

    let Some(affiliation_id) = team::commit_affiliation(ctx, team_id, &attrs.team_key)? else {
        ctx.errors.push(CommitError::unresolved(
            "Badge",
            &key,
            "team affiliation could not be resolved or created".to_string(),
        ));
        return Ok(None);
    };

    let entry_time_type = attrs
        .entry_time_type
        .clone()
        .unwrap_or_else(|| DEFAULT_ENTRY_TIME_TYPE.to_string());

    let resolved = match attrs.badge_id {
        Some(id) => Some(id),
        None => {
            let conn = ctx.conn;
            let season_id = ctx.season_id;
            ctx.caches.badges.resolve_with(&key, || {
                store::query_id(
                    conn,
                    "SELECT id FROM badges
                     WHERE swimmer_id = ?1 AND team_id = ?2 AND season_id = ?3",
                    params![swimmer_id, team_id, season_id],
                )
            })?
        }
    };

    if let Some(id) = resolved {
        let persisted = ctx
            .conn
            .query_row(
                "SELECT category_type_id, team_affiliation_id, number, entry_time_type
                 FROM badges WHERE id = ?1",
                params![id],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()?;

        let Some((old_category, old_affiliation, old_number, old_entry)) = persisted else {
            ctx.errors.push(CommitError::unresolved(
                "Badge",
                &key,
                format!("id {} not found in store", id),
            ));
            return Ok(None);
        };

        let mut changes = ChangeSet::new();
        changes.compare("category_type_id", old_category, category_id);
        changes.compare("team_affiliation_id", old_affiliation, affiliation_id);
        changes.compare("number", old_number, attrs.number.clone());
        changes.compare("entry_time_type", old_entry, entry_time_type);
        update(ctx, "badges", "Badge", id, &changes)?;

        ctx.caches.badges.store(&key, id);
        return Ok(Some(id));
    }

    let row = Row::new()
        .set("swimmer_id", swimmer_id)
        .set("team_id", team_id)
        .set("season_id", ctx.season_id)
        .set("category_type_id", category_id)
        .set("team_affiliation_id", affiliation_id)
        .set("number", attrs.number.clone())
        .set("entry_time_type", entry_time_type);
    let id = insert(ctx, "badges", "Badge", &row)?;
    ctx.caches.badges.store(&key, id);
    Ok(Some(id))
}

fn resolve_badge_category(
    ctx: &mut CommitContext,
    attrs: &BadgeAttrs,
    swimmer_id: i64,
) -> Result<Option<i64>> {
    if let Some(code) = &attrs.category_code {
        if let Some(band) = ctx.index.find_by_code(code, false) {
            return Ok(Some(band.id));
        }
    }

    let year_of_birth: Option<u32> = ctx.conn.query_row(
        "SELECT year_of_birth FROM swimmers WHERE id = ?1",
        params![swimmer_id],
        |row| row.get(0),
    )?;

    Ok(year_of_birth
        .map(|yob| ctx.competition_year.saturating_sub(yob))
        .and_then(|age| ctx.index.find_by_age(age))
        .map(|band| band.id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::committers::team::commit_team;
    use crate::payload::TeamAttrs;
    use crate::store;
    use rusqlite::Connection;
    use uuid::Uuid;

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        store::setup_database(&conn).unwrap();
        store::ensure_season(&conn, 242, "test season").unwrap();
        conn
    }

    fn test_ctx(conn: &Connection) -> CommitContext<'_> {
        let index = store::load_category_index(conn, 242).unwrap();
        CommitContext::new(conn, Uuid::new_v4(), 242, 2026, index)
    }

    fn john_doe() -> SwimmerAttrs {
        SwimmerAttrs {
            swimmer_id: None,
            last_name: "DOE".into(),
            first_name: "JOHN".into(),
            year_of_birth: Some(1970),
            gender_code: "M".into(),
        }
    }

    fn setup_john_and_team(ctx: &mut CommitContext) {
        commit_swimmer(ctx, &john_doe()).unwrap().unwrap();
        commit_team(
            ctx,
            &TeamAttrs { team_id: None, name: "Team X".into(), editable_name: None, city_name: None },
        )
        .unwrap()
        .unwrap();
    }

    #[test]
    fn test_swimmer_create_and_rematch_by_name_year() {
        let conn = test_conn();
        let mut ctx = test_ctx(&conn);
        let id = commit_swimmer(&mut ctx, &john_doe()).unwrap().unwrap();

        let mut ctx2 = test_ctx(&conn);
        let id2 = commit_swimmer(&mut ctx2, &john_doe()).unwrap().unwrap();
        assert_eq!(id, id2);
        assert_eq!(ctx2.stats.created("Swimmer"), 0);
        assert_eq!(ctx2.stats.updated("Swimmer"), 0);
    }

    #[test]
    fn test_swimmer_gender_prefix_resolves_same_record() {
        let conn = test_conn();
        let mut ctx = test_ctx(&conn);
        let id = commit_swimmer(&mut ctx, &john_doe()).unwrap().unwrap();

        // Adapter emitted key with a gender prefix token
        let resolved = resolve_swimmer(&mut ctx, "M|DOE|JOHN|1970").unwrap();
        assert_eq!(resolved, Some(id));
    }

    #[test]
    fn test_swimmer_validation_failure() {
        let conn = test_conn();
        let mut ctx = test_ctx(&conn);

        let mut attrs = john_doe();
        attrs.year_of_birth = Some(1850);
        attrs.gender_code = "?".into();

        assert!(commit_swimmer(&mut ctx, &attrs).unwrap().is_none());
        assert_eq!(ctx.errors.len(), 1);
        let lines = ctx.errors.errors()[0].detail_lines();
        assert_eq!(lines.len(), 3, "both field errors must be reported");
    }

    #[test]
    fn test_badge_scenario_create_then_idempotent() {
        let conn = test_conn();
        let mut ctx = test_ctx(&conn);
        setup_john_and_team(&mut ctx);

        let badge = BadgeAttrs {
            badge_id: None,
            swimmer_key: "DOE|JOHN|1970".into(),
            team_key: "Team X".into(),
            category_code: None,
            number: None,
            entry_time_type: None,
        };

        let id = commit_badge(&mut ctx, &badge).unwrap().unwrap();
        assert_eq!(ctx.stats.created("Badge"), 1);
        assert_eq!(ctx.stats.created("TeamAffiliation"), 1);

        // Entry-time type defaulted to "last race"
        let entry: String = conn
            .query_row("SELECT entry_time_type FROM badges WHERE id = ?1", params![id], |r| r.get(0))
            .unwrap();
        assert_eq!(entry, DEFAULT_ENTRY_TIME_TYPE);

        // Category derived from age 56 (2026 - 1970)
        let category: String = conn
            .query_row(
                "SELECT ct.code FROM badges b JOIN category_types ct ON ct.id = b.category_type_id
                 WHERE b.id = ?1",
                params![id],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(category, "M55");

        // Identical second commit: same id, zero additional creates
        let id2 = commit_badge(&mut ctx, &badge).unwrap().unwrap();
        assert_eq!(id, id2);
        assert_eq!(ctx.stats.created("Badge"), 1);
        assert_eq!(ctx.stats.updated("Badge"), 0);
    }

    #[test]
    fn test_badge_unknown_swimmer_is_unresolved() {
        let conn = test_conn();
        let mut ctx = test_ctx(&conn);
        setup_john_and_team(&mut ctx);

        let badge = BadgeAttrs {
            badge_id: None,
            swimmer_key: "GHOST|GAL|1980".into(),
            team_key: "Team X".into(),
            category_code: None,
            number: None,
            entry_time_type: None,
        };

        assert!(commit_badge(&mut ctx, &badge).unwrap().is_none());
        assert_eq!(ctx.errors.len(), 1);
        assert_eq!(ctx.errors.errors()[0].entity(), "Badge");
    }

    #[test]
    fn test_badge_explicit_category_code_wins() {
        let conn = test_conn();
        let mut ctx = test_ctx(&conn);
        setup_john_and_team(&mut ctx);

        let badge = BadgeAttrs {
            badge_id: None,
            swimmer_key: "DOE|JOHN|1970".into(),
            team_key: "Team X".into(),
            category_code: Some("M50".into()),
            number: Some("B-0042".into()),
            entry_time_type: None,
        };
        let id = commit_badge(&mut ctx, &badge).unwrap().unwrap();

        let category: String = conn
            .query_row(
                "SELECT ct.code FROM badges b JOIN category_types ct ON ct.id = b.category_type_id
                 WHERE b.id = ?1",
                params![id],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(category, "M50");
    }
}
