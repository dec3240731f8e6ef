// 🗄 Backing Store - typed-column relational store (SQLite)
// Schema setup, reference-data seeding and small lookup helpers.
// Committers own their per-entity SQL; everything here is shared plumbing.

use crate::category::{CategoryBand, CategoryIndex};
use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

// ============================================================================
// CONNECTION
// ============================================================================

/// Open (or create) the store with WAL mode for crash recovery
pub fn open_database(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)
        .with_context(|| format!("Failed to open database {}", path.display()))?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    Ok(conn)
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    // ==========================================================================
    // Reference vocabularies
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS seasons (
            id INTEGER PRIMARY KEY,
            description TEXT NOT NULL,
            begin_date TEXT,
            end_date TEXT,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS category_types (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            season_id INTEGER NOT NULL REFERENCES seasons(id),
            code TEXT NOT NULL,
            age_begin INTEGER NOT NULL,
            age_end INTEGER NOT NULL,
            is_relay INTEGER NOT NULL DEFAULT 0,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            UNIQUE(season_id, code, is_relay)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS event_types (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            code TEXT UNIQUE NOT NULL,
            length_in_meters INTEGER NOT NULL,
            stroke TEXT NOT NULL,
            is_relay INTEGER NOT NULL DEFAULT 0,
            phases INTEGER NOT NULL DEFAULT 1,
            phase_length INTEGER NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    // ==========================================================================
    // Venue & sessions
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS meetings (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            season_id INTEGER NOT NULL REFERENCES seasons(id),
            description TEXT NOT NULL,
            header_date TEXT,
            edition INTEGER,
            scheduled INTEGER NOT NULL DEFAULT 0,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            updated_at DATETIME
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS calendars (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            season_id INTEGER NOT NULL REFERENCES seasons(id),
            meeting_id INTEGER UNIQUE NOT NULL REFERENCES meetings(id),
            scheduled_date TEXT,
            description TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            updated_at DATETIME
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS cities (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT UNIQUE NOT NULL,
            area TEXT,
            country_code TEXT,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            updated_at DATETIME
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS swimming_pools (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT UNIQUE NOT NULL,
            pool_length INTEGER NOT NULL,
            lanes INTEGER,
            city_id INTEGER REFERENCES cities(id),
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            updated_at DATETIME
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS meeting_sessions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            meeting_id INTEGER NOT NULL REFERENCES meetings(id),
            session_order INTEGER NOT NULL,
            scheduled_date TEXT NOT NULL,
            day_part TEXT,
            swimming_pool_id INTEGER REFERENCES swimming_pools(id),
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            updated_at DATETIME,
            UNIQUE(meeting_id, session_order)
        )",
        [],
    )?;

    // ==========================================================================
    // Teams & swimmers
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS teams (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT UNIQUE NOT NULL,
            editable_name TEXT NOT NULL,
            city_name TEXT,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            updated_at DATETIME
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS team_affiliations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            team_id INTEGER NOT NULL REFERENCES teams(id),
            season_id INTEGER NOT NULL REFERENCES seasons(id),
            name TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            updated_at DATETIME,
            UNIQUE(team_id, season_id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS swimmers (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            last_name TEXT NOT NULL,
            first_name TEXT NOT NULL,
            complete_name TEXT NOT NULL,
            year_of_birth INTEGER,
            gender TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            updated_at DATETIME
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS badges (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            swimmer_id INTEGER NOT NULL REFERENCES swimmers(id),
            team_id INTEGER NOT NULL REFERENCES teams(id),
            season_id INTEGER NOT NULL REFERENCES seasons(id),
            category_type_id INTEGER NOT NULL REFERENCES category_types(id),
            team_affiliation_id INTEGER NOT NULL REFERENCES team_affiliations(id),
            number TEXT,
            entry_time_type TEXT NOT NULL DEFAULT 'LR',
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            updated_at DATETIME,
            UNIQUE(swimmer_id, team_id, season_id)
        )",
        [],
    )?;

    // ==========================================================================
    // Events, programs, results & splits
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS meeting_events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            meeting_session_id INTEGER NOT NULL REFERENCES meeting_sessions(id),
            event_type_id INTEGER NOT NULL REFERENCES event_types(id),
            event_order INTEGER NOT NULL,
            heat_type TEXT,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            updated_at DATETIME,
            UNIQUE(meeting_session_id, event_type_id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS meeting_programs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            meeting_event_id INTEGER NOT NULL REFERENCES meeting_events(id),
            category_type_id INTEGER NOT NULL REFERENCES category_types(id),
            gender TEXT NOT NULL,
            program_order INTEGER NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            updated_at DATETIME,
            UNIQUE(meeting_event_id, category_type_id, gender)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS meeting_individual_results (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            meeting_program_id INTEGER NOT NULL REFERENCES meeting_programs(id),
            swimmer_id INTEGER NOT NULL REFERENCES swimmers(id),
            team_id INTEGER NOT NULL REFERENCES teams(id),
            badge_id INTEGER REFERENCES badges(id),
            rank INTEGER,
            minutes INTEGER NOT NULL DEFAULT 0,
            seconds INTEGER NOT NULL DEFAULT 0,
            hundredths INTEGER NOT NULL DEFAULT 0,
            standard_points REAL,
            disqualified INTEGER NOT NULL DEFAULT 0,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            updated_at DATETIME,
            UNIQUE(meeting_program_id, swimmer_id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS laps (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            meeting_individual_result_id INTEGER NOT NULL REFERENCES meeting_individual_results(id),
            distance INTEGER NOT NULL,
            minutes INTEGER,
            seconds INTEGER,
            hundredths INTEGER,
            delta_minutes INTEGER,
            delta_seconds INTEGER,
            delta_hundredths INTEGER,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            updated_at DATETIME,
            UNIQUE(meeting_individual_result_id, distance)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS meeting_relay_results (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            meeting_program_id INTEGER NOT NULL REFERENCES meeting_programs(id),
            team_id INTEGER NOT NULL REFERENCES teams(id),
            rank INTEGER,
            minutes INTEGER NOT NULL DEFAULT 0,
            seconds INTEGER NOT NULL DEFAULT 0,
            hundredths INTEGER NOT NULL DEFAULT 0,
            standard_points REAL,
            disqualified INTEGER NOT NULL DEFAULT 0,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            updated_at DATETIME,
            UNIQUE(meeting_program_id, team_id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS relay_swimmers (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            meeting_relay_result_id INTEGER NOT NULL REFERENCES meeting_relay_results(id),
            swimmer_id INTEGER NOT NULL REFERENCES swimmers(id),
            relay_order INTEGER NOT NULL,
            stroke TEXT NOT NULL,
            minutes INTEGER,
            seconds INTEGER,
            hundredths INTEGER,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            updated_at DATETIME,
            UNIQUE(meeting_relay_result_id, relay_order)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS relay_laps (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            meeting_relay_result_id INTEGER NOT NULL REFERENCES meeting_relay_results(id),
            relay_swimmer_id INTEGER REFERENCES relay_swimmers(id),
            distance INTEGER NOT NULL,
            minutes INTEGER,
            seconds INTEGER,
            hundredths INTEGER,
            delta_minutes INTEGER,
            delta_seconds INTEGER,
            delta_hundredths INTEGER,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            updated_at DATETIME,
            UNIQUE(meeting_relay_result_id, distance)
        )",
        [],
    )?;

    // ==========================================================================
    // Indexes
    // ==========================================================================
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_swimmers_name
         ON swimmers(last_name, first_name, year_of_birth)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_badges_season ON badges(season_id, team_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_programs_event ON meeting_programs(meeting_event_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_laps_result ON laps(meeting_individual_result_id, distance)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_relay_laps_result
         ON relay_laps(meeting_relay_result_id, distance)",
        [],
    )?;

    Ok(())
}

// ============================================================================
// REFERENCE DATA SEEDING
// ============================================================================

/// Make sure the run's season row exists; seed its category vocabulary and
/// the event-type vocabulary when first seen.
pub fn ensure_season(conn: &Connection, season_id: i64, description: &str) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO seasons (id, description) VALUES (?1, ?2)",
        params![season_id, description],
    )?;
    seed_event_types(conn)?;
    seed_category_types(conn, season_id)?;
    Ok(())
}

/// Standard pool event vocabulary: the four strokes plus medley over the
/// usual distances, and the 4x50/4x100/4x200 relays.
pub fn seed_event_types(conn: &Connection) -> Result<()> {
    let individual: &[(&str, u32, &str)] = &[
        ("50FS", 50, "FS"),
        ("100FS", 100, "FS"),
        ("200FS", 200, "FS"),
        ("400FS", 400, "FS"),
        ("800FS", 800, "FS"),
        ("1500FS", 1500, "FS"),
        ("50BK", 50, "BK"),
        ("100BK", 100, "BK"),
        ("200BK", 200, "BK"),
        ("50BR", 50, "BR"),
        ("100BR", 100, "BR"),
        ("200BR", 200, "BR"),
        ("50FLY", 50, "FLY"),
        ("100FLY", 100, "FLY"),
        ("200FLY", 200, "FLY"),
        ("100IM", 100, "IM"),
        ("200IM", 200, "IM"),
        ("400IM", 400, "IM"),
    ];
    for (code, length, stroke) in individual {
        conn.execute(
            "INSERT OR IGNORE INTO event_types
                (code, length_in_meters, stroke, is_relay, phases, phase_length)
             VALUES (?1, ?2, ?3, 0, 1, ?2)",
            params![code, length, stroke],
        )?;
    }

    let relays: &[(&str, u32, &str)] = &[
        ("4X50FS", 50, "FS"),
        ("4X100FS", 100, "FS"),
        ("4X200FS", 200, "FS"),
        ("4X50IM", 50, "IM"),
        ("4X100IM", 100, "IM"),
    ];
    for (code, leg, stroke) in relays {
        conn.execute(
            "INSERT OR IGNORE INTO event_types
                (code, length_in_meters, stroke, is_relay, phases, phase_length)
             VALUES (?1, ?2, ?3, 1, 4, ?4)",
            params![code, leg * 4, stroke, leg],
        )?;
    }

    Ok(())
}

/// Masters category bands for one season: five-year individual bands
/// (U20, U25, M25..M95) and forty-year-wide relay bands over summed ages
/// (M80..M280 covering 80-319).
pub fn seed_category_types(conn: &Connection, season_id: i64) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO category_types (season_id, code, age_begin, age_end, is_relay)
         VALUES (?1, 'U20', 0, 19, 0)",
        params![season_id],
    )?;
    for begin in (20..100).step_by(5) {
        let code = if begin == 20 { "U25".to_string() } else { format!("M{}", begin) };
        conn.execute(
            "INSERT OR IGNORE INTO category_types (season_id, code, age_begin, age_end, is_relay)
             VALUES (?1, ?2, ?3, ?4, 0)",
            params![season_id, code, begin, begin + 4],
        )?;
    }

    let relay_bands: &[(&str, u32, u32)] = &[
        ("M80", 80, 99),
        ("M100", 100, 119),
        ("M120", 120, 159),
        ("M160", 160, 199),
        ("M200", 200, 239),
        ("M240", 240, 279),
        ("M280", 280, 319),
    ];
    for (code, begin, end) in relay_bands {
        conn.execute(
            "INSERT OR IGNORE INTO category_types (season_id, code, age_begin, age_end, is_relay)
             VALUES (?1, ?2, ?3, ?4, 1)",
            params![season_id, code, begin, end],
        )?;
    }

    Ok(())
}

/// Load the season's age → category index used for direct lookups and for
/// the relay auto-resolver
pub fn load_category_index(conn: &Connection, season_id: i64) -> Result<CategoryIndex> {
    let mut stmt = conn.prepare(
        "SELECT id, code, age_begin, age_end, is_relay
         FROM category_types
         WHERE season_id = ?1
         ORDER BY is_relay, age_begin",
    )?;

    let bands = stmt
        .query_map(params![season_id], |row| {
            Ok(CategoryBand {
                id: row.get(0)?,
                code: row.get(1)?,
                age_begin: row.get(2)?,
                age_end: row.get(3)?,
                is_relay: row.get::<_, i64>(4)? != 0,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(CategoryIndex::new(season_id, bands))
}

// ============================================================================
// LOOKUP HELPERS
// ============================================================================

/// Single-id query helper shared by the committers' find-by-natural-key
/// fallbacks
pub fn query_id<P: rusqlite::Params>(conn: &Connection, sql: &str, params: P) -> Result<Option<i64>> {
    let id = conn
        .query_row(sql, params, |row| row.get::<_, i64>(0))
        .optional()?;
    Ok(id)
}

/// Row count for one table (statistics and tests)
pub fn count_rows(conn: &Connection, table: &str) -> Result<i64> {
    let count: i64 =
        conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))?;
    Ok(count)
}
