// 🏷 Category & Gender Auto-Resolution
// Season-scoped age-band index plus the relay fallback used when the
// source carries an unrecognized category or gender code

use serde::{Deserialize, Serialize};

/// Swimmers per relay team; only the first this-many athletes count
/// toward the summed relay age.
pub const RELAY_TEAM_SIZE: usize = 4;

// ============================================================================
// GENDER
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Gender {
    Female,
    Male,
    Mixed,
}

impl Gender {
    /// Single-letter store code
    pub fn code(&self) -> &'static str {
        match self {
            Gender::Female => "F",
            Gender::Male => "M",
            Gender::Mixed => "X",
        }
    }

    /// Parse a source gender marker; anything unrecognized stays unknown
    pub fn parse(code: &str) -> Option<Gender> {
        match code.trim().to_uppercase().as_str() {
            "F" | "W" => Some(Gender::Female),
            "M" => Some(Gender::Male),
            "X" => Some(Gender::Mixed),
            _ => None,
        }
    }
}

// ============================================================================
// CATEGORY BANDS
// ============================================================================

/// One age-range row of the season's category vocabulary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryBand {
    pub id: i64,
    pub code: String,
    pub age_begin: u32,
    pub age_end: u32,
    pub is_relay: bool,
}

impl CategoryBand {
    pub fn contains(&self, age: u32) -> bool {
        age >= self.age_begin && age <= self.age_end
    }
}

/// Season-scoped age → category index. Built once per run from the
/// `category_types` rows of the run's season.
#[derive(Debug, Clone)]
pub struct CategoryIndex {
    pub season_id: i64,
    bands: Vec<CategoryBand>,
}

impl CategoryIndex {
    pub fn new(season_id: i64, bands: Vec<CategoryBand>) -> Self {
        CategoryIndex { season_id, bands }
    }

    /// First individual band containing `age`
    pub fn find_by_age(&self, age: u32) -> Option<&CategoryBand> {
        self.bands.iter().find(|b| !b.is_relay && b.contains(age))
    }

    /// First relay band containing the summed team age
    pub fn find_relay_by_age(&self, summed_age: u32) -> Option<&CategoryBand> {
        self.bands.iter().find(|b| b.is_relay && b.contains(summed_age))
    }

    /// Exact-code lookup (used when the source carries a recognized code)
    pub fn find_by_code(&self, code: &str, relay: bool) -> Option<&CategoryBand> {
        self.bands
            .iter()
            .find(|b| b.is_relay == relay && b.code.eq_ignore_ascii_case(code))
    }

    pub fn is_empty(&self) -> bool {
        self.bands.is_empty()
    }
}

// ============================================================================
// RELAY AUTO-RESOLUTION
// ============================================================================

/// Derive a relay category from athlete birth years when the source code is
/// unrecognized. Ages are `competition_year - year_of_birth`, taken in
/// source order; the first [`RELAY_TEAM_SIZE`] are summed and looked up in
/// the season's relay bands.
///
/// Best-effort: with fewer than a full team of known birth years the
/// unknown state is preserved (`None`) so the caller can surface an error
/// instead of guessing.
pub fn resolve_relay_category<'a>(
    index: &'a CategoryIndex,
    competition_year: u32,
    birth_years: &[Option<u32>],
) -> Option<&'a CategoryBand> {
    let ages: Vec<u32> = birth_years
        .iter()
        .filter_map(|yob| yob.map(|y| competition_year.saturating_sub(y)))
        .collect();

    if ages.len() < RELAY_TEAM_SIZE {
        return None;
    }

    let summed: u32 = ages[..RELAY_TEAM_SIZE].iter().sum();
    index.find_relay_by_age(summed)
}

/// Derive a relay gender from the athletes' gender markers: all female →
/// female, all male → male, a mix → mixed. Any missing marker preserves
/// the unknown state.
pub fn resolve_relay_gender(genders: &[Option<Gender>]) -> Option<Gender> {
    if genders.is_empty() || genders.iter().any(|g| g.is_none()) {
        return None;
    }

    let mut all_female = true;
    let mut all_male = true;
    for gender in genders.iter().flatten() {
        match gender {
            Gender::Female => all_male = false,
            Gender::Male => all_female = false,
            Gender::Mixed => {
                all_male = false;
                all_female = false;
            }
        }
    }

    if all_female {
        Some(Gender::Female)
    } else if all_male {
        Some(Gender::Male)
    } else {
        Some(Gender::Mixed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_index() -> CategoryIndex {
        // Trimmed-down masters vocabulary: 5-year individual bands,
        // 40-year-wide relay bands over summed ages
        let mut bands = Vec::new();
        let mut id = 1;
        for begin in (20..100).step_by(5) {
            bands.push(CategoryBand {
                id,
                code: if begin == 20 { "U25".into() } else { format!("M{}", begin) },
                age_begin: begin,
                age_end: begin + 4,
                is_relay: false,
            });
            id += 1;
        }
        bands.push(CategoryBand { id, code: "M80".into(), age_begin: 80, age_end: 99, is_relay: true });
        bands.push(CategoryBand { id: id + 1, code: "M100".into(), age_begin: 100, age_end: 119, is_relay: true });
        bands.push(CategoryBand { id: id + 2, code: "M120".into(), age_begin: 120, age_end: 159, is_relay: true });
        CategoryIndex::new(1, bands)
    }

    #[test]
    fn test_individual_lookup() {
        let index = test_index();
        assert_eq!(index.find_by_age(22).unwrap().code, "U25");
        assert_eq!(index.find_by_age(94).unwrap().code, "M90");
        assert!(index.find_by_age(110).is_none());
    }

    #[test]
    fn test_relay_category_matches_direct_lookup() {
        let index = test_index();
        // Ages 22+23+24+25 = 94 in 2026 terms
        let birth_years = vec![Some(2004), Some(2003), Some(2002), Some(2001)];

        let resolved = resolve_relay_category(&index, 2026, &birth_years).unwrap();
        let direct = index.find_relay_by_age(94).unwrap();

        assert_eq!(resolved.id, direct.id);
        assert_eq!(resolved.code, "M80");
    }

    #[test]
    fn test_relay_category_uses_first_four() {
        let index = test_index();
        // Fifth athlete (a reserve) must not shift the sum
        let birth_years = vec![Some(2004), Some(2003), Some(2002), Some(2001), Some(1950)];

        let resolved = resolve_relay_category(&index, 2026, &birth_years).unwrap();
        assert_eq!(resolved.code, "M80");
    }

    #[test]
    fn test_relay_category_incomplete_data() {
        let index = test_index();
        let birth_years = vec![Some(2004), None, Some(2002), Some(2001)];

        assert!(resolve_relay_category(&index, 2026, &birth_years).is_none());
    }

    #[test]
    fn test_relay_gender_resolution() {
        let f = Some(Gender::Female);
        let m = Some(Gender::Male);

        assert_eq!(resolve_relay_gender(&[f, f, f, f]), Some(Gender::Female));
        assert_eq!(resolve_relay_gender(&[m, m, m, m]), Some(Gender::Male));
        assert_eq!(resolve_relay_gender(&[f, m, f, m]), Some(Gender::Mixed));
        assert_eq!(resolve_relay_gender(&[f, None, f, f]), None);
        assert_eq!(resolve_relay_gender(&[]), None);
    }

    #[test]
    fn test_gender_parse() {
        assert_eq!(Gender::parse("f"), Some(Gender::Female));
        assert_eq!(Gender::parse("M"), Some(Gender::Male));
        assert_eq!(Gender::parse("X"), Some(Gender::Mixed));
        assert_eq!(Gender::parse("?"), None);
        assert_eq!(Gender::parse(""), None);
    }
}
