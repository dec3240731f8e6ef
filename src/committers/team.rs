// 👥 Team Committers - Team, TeamAffiliation
// Phase 2. Affiliations are also created on demand by the badge committer
// when a badge needs one and none exists yet for the season.

use super::{insert, update, CommitContext};
use crate::diff::{ChangeSet, Row};
use crate::errors::{CommitError, FieldError};
use crate::payload::TeamAttrs;
use crate::store;
use anyhow::Result;
use rusqlite::{params, OptionalExtension};

// ============================================================================
// TEAM
// ============================================================================

struct PersistedTeam {
    name: String,
    editable_name: String,
    city_name: Option<String>,
}

fn fetch_team(ctx: &CommitContext, id: i64) -> Result<Option<PersistedTeam>> {
    let row = ctx
        .conn
        .query_row(
            "SELECT name, editable_name, city_name FROM teams WHERE id = ?1",
            params![id],
            |row| {
                Ok(PersistedTeam {
                    name: row.get(0)?,
                    editable_name: row.get(1)?,
                    city_name: row.get(2)?,
                })
            },
        )
        .optional()?;
    Ok(row)
}

/// Commit one team: matched by supplied id or by name, created if absent.
/// Team identity failures poison everything keyed under the team, so the
/// error is recorded and the caller must skip dependents.
pub fn commit_team(ctx: &mut CommitContext, attrs: &TeamAttrs) -> Result<Option<i64>> {
    if attrs.name.trim().is_empty() {
        ctx.errors
            .push(CommitError::missing_key("Team", "name is empty"));
        return Ok(None);
    }

    let resolved = match attrs.team_id {
        Some(id) => Some(id),
        None => {
            let conn = ctx.conn;
            let name = attrs.name.clone();
            ctx.caches.teams.resolve_with(&attrs.name, || {
                store::query_id(conn, "SELECT id FROM teams WHERE name = ?1", params![name])
            })?
        }
    };

    if let Some(id) = resolved {
        let Some(persisted) = fetch_team(ctx, id)? else {
            ctx.errors.push(CommitError::unresolved(
                "Team",
                &attrs.name,
                format!("id {} not found in store", id),
            ));
            return Ok(None);
        };

        let mut changes = ChangeSet::new();
        changes.compare("name", persisted.name, attrs.name.clone());
        changes.compare(
            "editable_name",
            persisted.editable_name,
            attrs.editable_name.clone().unwrap_or_else(|| attrs.name.clone()),
        );
        changes.compare("city_name", persisted.city_name, attrs.city_name.clone());
        update(ctx, "teams", "Team", id, &changes)?;

        ctx.caches.teams.store(&attrs.name, id);
        return Ok(Some(id));
    }

    let row = Row::new()
        .set("name", attrs.name.clone())
        .set(
            "editable_name",
            attrs.editable_name.clone().unwrap_or_else(|| attrs.name.clone()),
        )
        .set("city_name", attrs.city_name.clone());
    let id = insert(ctx, "teams", "Team", &row)?;
    ctx.caches.teams.store(&attrs.name, id);
    Ok(Some(id))
}

/// Resolve a team by its natural key only (no creation). Used by later
/// phases that must never invent a team the team phase did not commit.
pub fn resolve_team(ctx: &mut CommitContext, team_key: &str) -> Result<Option<i64>> {
    if team_key.trim().is_empty() {
        return Ok(None);
    }
    let conn = ctx.conn;
    let name = team_key.to_string();
    ctx.caches.teams.resolve_with(team_key, || {
        store::query_id(conn, "SELECT id FROM teams WHERE name = ?1", params![name])
    })
}

// ============================================================================
// TEAM AFFILIATION
// ============================================================================

/// Commit the team's seasonal affiliation: unique per (team, season),
/// created on demand.
pub fn commit_affiliation(
    ctx: &mut CommitContext,
    team_id: i64,
    team_name: &str,
) -> Result<Option<i64>> {
    let key = format!("{}|{}", team_id, ctx.season_id);
    let conn = ctx.conn;
    let season_id = ctx.season_id;
    let resolved = ctx.caches.affiliations.resolve_with(&key, || {
        store::query_id(
            conn,
            "SELECT id FROM team_affiliations WHERE team_id = ?1 AND season_id = ?2",
            params![team_id, season_id],
        )
    })?;

    if let Some(id) = resolved {
        let old_name: String = ctx.conn.query_row(
            "SELECT name FROM team_affiliations WHERE id = ?1",
            params![id],
            |row| row.get(0),
        )?;
        let mut changes = ChangeSet::new();
        changes.compare("name", old_name, team_name.to_string());
        update(ctx, "team_affiliations", "TeamAffiliation", id, &changes)?;
        return Ok(Some(id));
    }

    if team_name.trim().is_empty() {
        ctx.errors.push(CommitError::validation(
            "TeamAffiliation",
            &key,
            vec![FieldError::new("name", "required field is empty")],
        ));
        return Ok(None);
    }

    let row = Row::new()
        .set("team_id", team_id)
        .set("season_id", ctx.season_id)
        .set("name", team_name.to_string());
    let id = insert(ctx, "team_affiliations", "TeamAffiliation", &row)?;
    ctx.caches.affiliations.store(&key, id);
    Ok(Some(id))
}

#[cfg(test)]
mod tests {
    use super::*;
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

    fn team_x() -> TeamAttrs {
        TeamAttrs {
            team_id: None,
            name: "Team X".into(),
            editable_name: None,
            city_name: Some("Springfield".into()),
        }
    }

    #[test]
    fn test_team_create_and_rematch() {
        let conn = test_conn();
        let mut ctx = test_ctx(&conn);

        let id = commit_team(&mut ctx, &team_x()).unwrap().unwrap();
        assert_eq!(ctx.stats.created("Team"), 1);

        let mut ctx2 = test_ctx(&conn);
        let id2 = commit_team(&mut ctx2, &team_x()).unwrap().unwrap();
        assert_eq!(id, id2);
        assert_eq!(ctx2.stats.created("Team"), 0);
        assert_eq!(ctx2.stats.updated("Team"), 0);
    }

    #[test]
    fn test_team_editable_name_defaults_to_name() {
        let conn = test_conn();
        let mut ctx = test_ctx(&conn);
        let id = commit_team(&mut ctx, &team_x()).unwrap().unwrap();

        let editable: String = conn
            .query_row("SELECT editable_name FROM teams WHERE id = ?1", params![id], |r| r.get(0))
            .unwrap();
        assert_eq!(editable, "Team X");
    }

    #[test]
    fn test_team_by_stale_id_is_unresolved() {
        let conn = test_conn();
        let mut ctx = test_ctx(&conn);

        let mut attrs = team_x();
        attrs.team_id = Some(999);
        assert!(commit_team(&mut ctx, &attrs).unwrap().is_none());
        assert_eq!(ctx.errors.len(), 1);
    }

    #[test]
    fn test_resolve_team_never_creates() {
        let conn = test_conn();
        let mut ctx = test_ctx(&conn);

        assert!(resolve_team(&mut ctx, "Ghost Team").unwrap().is_none());
        assert_eq!(store::count_rows(&conn, "teams").unwrap(), 0);
    }

    #[test]
    fn test_affiliation_unique_per_team_and_season() {
        let conn = test_conn();
        let mut ctx = test_ctx(&conn);
        let team_id = commit_team(&mut ctx, &team_x()).unwrap().unwrap();

        let a1 = commit_affiliation(&mut ctx, team_id, "Team X").unwrap().unwrap();
        let a2 = commit_affiliation(&mut ctx, team_id, "Team X").unwrap().unwrap();

        assert_eq!(a1, a2);
        assert_eq!(ctx.stats.created("TeamAffiliation"), 1);
        assert_eq!(store::count_rows(&conn, "team_affiliations").unwrap(), 1);
    }

    #[test]
    fn test_cache_monotonicity() {
        let conn = test_conn();
        let mut ctx = test_ctx(&conn);
        commit_team(&mut ctx, &team_x()).unwrap();

        let mut ctx2 = test_ctx(&conn);
        resolve_team(&mut ctx2, "Team X").unwrap();
        resolve_team(&mut ctx2, "Team X").unwrap();
        resolve_team(&mut ctx2, "Team X").unwrap();

        // Same natural key resolved three times: one backing-store query
        assert_eq!(ctx2.caches.teams.store_queries(), 1);
    }
}
