// 📦 Phase Payloads - typed envelopes for the five commit phases
// Upstream adapters emit one JSON document per phase; everything here is
// the strongly-typed normalization of those documents, so the allowed
// field set per entity is known at compile time

use crate::category::Gender;
use crate::timing::Timing;
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;

// ============================================================================
// PHASES
// ============================================================================

/// The five dependency-ranked commit phases, in strict order. Phase N may
/// reference identifiers resolved in phase N-1, never vice versa.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    VenueSessions,
    Teams,
    SwimmersBadges,
    EventsPrograms,
    Results,
}

impl Phase {
    pub const ALL: [Phase; 5] = [
        Phase::VenueSessions,
        Phase::Teams,
        Phase::SwimmersBadges,
        Phase::EventsPrograms,
        Phase::Results,
    ];

    pub fn number(&self) -> u8 {
        match self {
            Phase::VenueSessions => 1,
            Phase::Teams => 2,
            Phase::SwimmersBadges => 3,
            Phase::EventsPrograms => 4,
            Phase::Results => 5,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Phase::VenueSessions => "venue/sessions",
            Phase::Teams => "teams/affiliations",
            Phase::SwimmersBadges => "swimmers/badges",
            Phase::EventsPrograms => "events/programs",
            Phase::Results => "results/splits",
        }
    }

    /// Canonical payload file name under the phases directory
    pub fn file_name(&self) -> &'static str {
        match self {
            Phase::VenueSessions => "phase1_meeting.json",
            Phase::Teams => "phase2_teams.json",
            Phase::SwimmersBadges => "phase3_swimmers.json",
            Phase::EventsPrograms => "phase4_events.json",
            Phase::Results => "phase5_results.json",
        }
    }
}

// ============================================================================
// ENVELOPE
// ============================================================================

/// Typed envelope wrapping each phase document: metadata plus the
/// entity-specific payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub phase: u8,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub generated_at: Option<DateTime<Utc>>,
    pub data: T,
}

/// SHA-256 fingerprint of one payload file, recorded in the audit log so a
/// replayed run can be matched to its exact inputs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayloadFingerprint {
    pub file_name: String,
    pub sha256: String,
}

// ============================================================================
// SWIMMER KEYS
// ============================================================================

/// Parsed composite swimmer key: `LAST|FIRST|YOB`, optionally carrying a
/// leading gender token (`M|DOE|JOHN|1970`) that some adapters emit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwimmerKey {
    pub last_name: String,
    pub first_name: String,
    pub year_of_birth: Option<u32>,
    pub gender: Option<Gender>,
}

impl SwimmerKey {
    pub fn parse(raw: &str) -> Option<SwimmerKey> {
        let mut parts: Vec<&str> = raw.split('|').map(str::trim).collect();

        // Strip the optional gender prefix token before matching
        let gender = if parts.len() == 4 {
            let g = Gender::parse(parts[0]);
            if g.is_some() {
                parts.remove(0);
            }
            g
        } else {
            None
        };

        if parts.len() != 3 || parts[0].is_empty() {
            return None;
        }

        Some(SwimmerKey {
            last_name: parts[0].to_string(),
            first_name: parts[1].to_string(),
            year_of_birth: parts[2].parse().ok(),
            gender,
        })
    }

    /// Canonical form without the gender prefix, used as the cache key
    pub fn canonical(&self) -> String {
        format!(
            "{}|{}|{}",
            self.last_name,
            self.first_name,
            self.year_of_birth.map(|y| y.to_string()).unwrap_or_default()
        )
    }
}

// ============================================================================
// PHASE 1 - VENUE & SESSIONS
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeetingAttrs {
    #[serde(default)]
    pub meeting_id: Option<i64>,
    pub description: String,
    #[serde(default)]
    pub header_date: Option<NaiveDate>,
    #[serde(default)]
    pub edition: Option<u32>,
    #[serde(default)]
    pub scheduled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CityAttrs {
    pub name: String,
    #[serde(default)]
    pub area: Option<String>,
    #[serde(default)]
    pub country_code: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolAttrs {
    pub name: String,
    /// Pool length in meters (25 or 50)
    pub pool_length: u32,
    #[serde(default)]
    pub lanes: Option<u32>,
    #[serde(default)]
    pub city: Option<CityAttrs>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionAttrs {
    /// 1..N within the meeting
    pub session_order: u32,
    pub scheduled_date: NaiveDate,
    #[serde(default)]
    pub day_part: Option<String>,
    #[serde(default)]
    pub pool: Option<PoolAttrs>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VenueSessionsData {
    pub meeting: MeetingAttrs,
    #[serde(default)]
    pub sessions: Vec<SessionAttrs>,
}

// ============================================================================
// PHASE 2 - TEAMS
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamAttrs {
    #[serde(default)]
    pub team_id: Option<i64>,
    pub name: String,
    #[serde(default)]
    pub editable_name: Option<String>,
    #[serde(default)]
    pub city_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamsData {
    #[serde(default)]
    pub teams: Vec<TeamAttrs>,
}

// ============================================================================
// PHASE 3 - SWIMMERS & BADGES
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwimmerAttrs {
    #[serde(default)]
    pub swimmer_id: Option<i64>,
    pub last_name: String,
    pub first_name: String,
    #[serde(default)]
    pub year_of_birth: Option<u32>,
    #[serde(default)]
    pub gender_code: String,
}

impl SwimmerAttrs {
    pub fn key(&self) -> String {
        format!(
            "{}|{}|{}",
            self.last_name,
            self.first_name,
            self.year_of_birth.map(|y| y.to_string()).unwrap_or_default()
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BadgeAttrs {
    #[serde(default)]
    pub badge_id: Option<i64>,
    /// `LAST|FIRST|YOB` composite key
    pub swimmer_key: String,
    /// Team name as committed in phase 2
    pub team_key: String,
    #[serde(default)]
    pub category_code: Option<String>,
    #[serde(default)]
    pub number: Option<String>,
    /// Entry-time preference; defaults to "last race" when absent
    #[serde(default)]
    pub entry_time_type: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwimmersData {
    #[serde(default)]
    pub swimmers: Vec<SwimmerAttrs>,
    #[serde(default)]
    pub badges: Vec<BadgeAttrs>,
}

// ============================================================================
// PHASE 4 - EVENTS & PROGRAMS
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventAttrs {
    /// Progressive ordinal within the meeting; auto-assigned when absent
    #[serde(default)]
    pub event_order: Option<u32>,
    pub session_order: u32,
    /// Event-type code, e.g. "100FS", "4X50MI"
    pub event_code: String,
    #[serde(default)]
    pub heat_type: Option<String>,
}

impl EventAttrs {
    pub fn key(&self) -> String {
        format!("{}-{}", self.session_order, self.event_code)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgramAttrs {
    pub session_order: u32,
    pub event_code: String,
    pub category_code: String,
    pub gender_code: String,
    #[serde(default)]
    pub program_order: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsData {
    #[serde(default)]
    pub events: Vec<EventAttrs>,
    #[serde(default)]
    pub programs: Vec<ProgramAttrs>,
}

// ============================================================================
// PHASE 5 - RESULTS & SPLITS
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LapAttrs {
    /// Distance marker in meters from the start
    pub distance: u32,
    /// Absolute time from the race start, when the source has it
    #[serde(default)]
    pub timing: Option<Timing>,
    /// Time since the previous split, when the source has it
    #[serde(default)]
    pub delta: Option<Timing>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndividualResultAttrs {
    pub session_order: u32,
    pub event_code: String,
    pub swimmer_key: String,
    pub team_key: String,
    #[serde(default)]
    pub category_code: Option<String>,
    #[serde(default)]
    pub gender_code: Option<String>,
    #[serde(default)]
    pub rank: Option<u32>,
    #[serde(default)]
    pub timing: Option<Timing>,
    #[serde(default)]
    pub standard_points: Option<f64>,
    #[serde(default)]
    pub disqualified: bool,
    #[serde(default)]
    pub laps: Vec<LapAttrs>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayLegAttrs {
    pub swimmer_key: String,
    #[serde(default)]
    pub leg_order: Option<u32>,
    #[serde(default)]
    pub timing: Option<Timing>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayResultAttrs {
    pub session_order: u32,
    pub event_code: String,
    pub team_key: String,
    /// May carry an unrecognized sentinel code; auto-resolved from the
    /// athlete composition when possible
    #[serde(default)]
    pub category_code: Option<String>,
    #[serde(default)]
    pub gender_code: Option<String>,
    #[serde(default)]
    pub rank: Option<u32>,
    #[serde(default)]
    pub timing: Option<Timing>,
    #[serde(default)]
    pub standard_points: Option<f64>,
    #[serde(default)]
    pub disqualified: bool,
    #[serde(default)]
    pub swimmers: Vec<RelayLegAttrs>,
    #[serde(default)]
    pub laps: Vec<LapAttrs>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultsData {
    #[serde(default)]
    pub individual_results: Vec<IndividualResultAttrs>,
    #[serde(default)]
    pub relay_results: Vec<RelayResultAttrs>,
}

// ============================================================================
// PHASE SET
// ============================================================================

/// All five parsed phase payloads plus their input fingerprints
#[derive(Debug, Clone)]
pub struct PhaseSet {
    pub venue: Envelope<VenueSessionsData>,
    pub teams: Envelope<TeamsData>,
    pub swimmers: Envelope<SwimmersData>,
    pub events: Envelope<EventsData>,
    pub results: Envelope<ResultsData>,
    pub fingerprints: Vec<PayloadFingerprint>,
}

impl PhaseSet {
    /// Load the five canonical phase files from `dir`
    pub fn load(dir: &Path) -> Result<PhaseSet> {
        let mut fingerprints = Vec::with_capacity(Phase::ALL.len());

        let venue = load_phase(dir, Phase::VenueSessions, &mut fingerprints)?;
        let teams = load_phase(dir, Phase::Teams, &mut fingerprints)?;
        let swimmers = load_phase(dir, Phase::SwimmersBadges, &mut fingerprints)?;
        let events = load_phase(dir, Phase::EventsPrograms, &mut fingerprints)?;
        let results = load_phase(dir, Phase::Results, &mut fingerprints)?;

        Ok(PhaseSet {
            venue,
            teams,
            swimmers,
            events,
            results,
            fingerprints,
        })
    }
}

fn load_phase<T>(
    dir: &Path,
    phase: Phase,
    fingerprints: &mut Vec<PayloadFingerprint>,
) -> Result<Envelope<T>>
where
    T: for<'de> Deserialize<'de>,
{
    let path = dir.join(phase.file_name());
    let raw = fs::read(&path)
        .with_context(|| format!("Failed to read phase payload {}", path.display()))?;

    let mut hasher = Sha256::new();
    hasher.update(&raw);
    fingerprints.push(PayloadFingerprint {
        file_name: phase.file_name().to_string(),
        sha256: format!("{:x}", hasher.finalize()),
    });

    let envelope: Envelope<T> = serde_json::from_slice(&raw)
        .with_context(|| format!("Failed to parse phase payload {}", path.display()))?;

    if envelope.phase != phase.number() {
        return Err(anyhow!(
            "Phase payload {} declares phase {} but was loaded as phase {}",
            path.display(),
            envelope.phase,
            phase.number()
        ));
    }

    Ok(envelope)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_swimmer_key_parse_plain() {
        let key = SwimmerKey::parse("DOE|JOHN|1970").unwrap();
        assert_eq!(key.last_name, "DOE");
        assert_eq!(key.first_name, "JOHN");
        assert_eq!(key.year_of_birth, Some(1970));
        assert_eq!(key.gender, None);
        assert_eq!(key.canonical(), "DOE|JOHN|1970");
    }

    #[test]
    fn test_swimmer_key_parse_gender_prefix() {
        let key = SwimmerKey::parse("M|DOE|JOHN|1970").unwrap();
        assert_eq!(key.gender, Some(Gender::Male));
        // Prefix token is ignored in the canonical key
        assert_eq!(key.canonical(), "DOE|JOHN|1970");
    }

    #[test]
    fn test_swimmer_key_parse_invalid() {
        assert!(SwimmerKey::parse("DOE|JOHN").is_none());
        assert!(SwimmerKey::parse("").is_none());
    }

    #[test]
    fn test_envelope_parse_and_phase_check() {
        let json = r#"{
            "phase": 2,
            "description": "teams",
            "data": { "teams": [ { "name": "Team X" } ] }
        }"#;

        let envelope: Envelope<TeamsData> = serde_json::from_str(json).unwrap();
        assert_eq!(envelope.phase, 2);
        assert_eq!(envelope.data.teams.len(), 1);
        assert_eq!(envelope.data.teams[0].name, "Team X");
        assert_eq!(envelope.data.teams[0].team_id, None);
    }

    #[test]
    fn test_lap_attrs_optional_forms() {
        let json = r#"{ "distance": 50, "delta": { "minutes": 0, "seconds": 28, "hundredths": 50 } }"#;
        let lap: LapAttrs = serde_json::from_str(json).unwrap();
        assert_eq!(lap.distance, 50);
        assert!(lap.timing.is_none());
        assert_eq!(lap.delta, Some(Timing::new(0, 28, 50)));
    }
}
