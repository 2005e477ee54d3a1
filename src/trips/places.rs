//! Display name for a trip from the administrative boundaries its photos
//! fall inside.

use std::collections::HashMap;

use tracing::debug;

use super::{Photo, PlaceMembership};

pub const UNKNOWN_LOCATION: &str = "Unknown Location";

/// Share of geotagged photos a city-level boundary must cover.
const HIGH_COVERAGE: f64 = 0.55;
/// Share of geotagged photos any other boundary must cover.
const BASE_COVERAGE: f64 = 0.20;

const CITY_LEVELS: [i32; 3] = [8, 7, 6];
const STATE_LEVEL: i32 = 4;
const COUNTRY_LEVEL: i32 = 2;
const MAX_NAMES: usize = 3;

/// Preference added to a level's qualifying boundary count when no city or
/// state level wins outright.
fn level_bonus(level: i32) -> f64 {
    match level {
        8 => 3.0,
        7 => 2.5,
        6 => 2.0,
        5 => 1.0,
        4 => 0.5,
        _ => 0.0,
    }
}

#[derive(Debug, Clone)]
struct Boundary {
    osm_id: i64,
    name: String,
    count: usize,
}

/// Per-level boundary counts, levels and boundaries kept in first-seen order.
#[derive(Debug, Default)]
struct LevelTally {
    levels: Vec<(i32, Vec<Boundary>)>,
}

impl LevelTally {
    fn add(&mut self, membership: &PlaceMembership) {
        let idx = match self.levels.iter().position(|(l, _)| *l == membership.admin_level) {
            Some(idx) => idx,
            None => {
                self.levels.push((membership.admin_level, Vec::new()));
                self.levels.len() - 1
            }
        };
        let boundaries = &mut self.levels[idx].1;
        match boundaries.iter_mut().find(|b| b.osm_id == membership.osm_id) {
            Some(boundary) => boundary.count += 1,
            None => boundaries.push(Boundary {
                osm_id: membership.osm_id,
                name: membership.name.clone(),
                count: 1,
            }),
        }
    }

    fn is_empty(&self) -> bool {
        self.levels.iter().all(|(_, b)| b.is_empty())
    }

    fn level(&self, level: i32) -> Option<&[Boundary]> {
        self.levels
            .iter()
            .find(|(l, _)| *l == level)
            .map(|(_, b)| b.as_slice())
    }

    fn qualifying(&self, level: i32, threshold: f64) -> usize {
        self.level(level)
            .map(|b| b.iter().filter(|b| b.count as f64 >= threshold).count())
            .unwrap_or(0)
    }

    fn choose_level(&self, photo_count: usize) -> Option<i32> {
        let high = photo_count as f64 * HIGH_COVERAGE;
        let base = photo_count as f64 * BASE_COVERAGE;

        if let Some(level) = CITY_LEVELS
            .iter()
            .copied()
            .find(|&level| self.qualifying(level, high) > 0)
        {
            return Some(level);
        }

        if self.qualifying(STATE_LEVEL, base) > 0 {
            return Some(STATE_LEVEL);
        }

        let mut best: Option<i32> = None;
        let mut best_score = 0.0;
        for &(level, _) in &self.levels {
            if level == COUNTRY_LEVEL {
                continue;
            }
            let diversity = self.qualifying(level, base);
            let score = diversity as f64 + level_bonus(level);
            if (1..=5).contains(&diversity) && score > best_score {
                best_score = score;
                best = Some(level);
            }
        }
        if best.is_some() {
            return best;
        }

        if self.qualifying(COUNTRY_LEVEL, base) > 0 {
            return Some(COUNTRY_LEVEL);
        }

        self.levels
            .iter()
            .filter(|(_, b)| !b.is_empty())
            .map(|(level, _)| *level)
            .max()
    }
}

/// Resolve the display name of a trip.
///
/// A forced label on any photo wins outright (most frequent, first seen on
/// ties). Otherwise boundary memberships of the geotagged photos are tallied
/// per admin level, a level is chosen by coverage and up to three of its
/// boundaries are joined with `", "`.
pub fn resolve_location(
    photos: &[Photo],
    memberships: &HashMap<i64, Vec<PlaceMembership>>,
) -> String {
    if let Some(label) = most_common_forced_label(photos) {
        return label;
    }

    let geotagged: Vec<&Photo> = photos.iter().filter(|p| p.is_geotagged()).collect();
    if geotagged.is_empty() {
        return UNKNOWN_LOCATION.to_string();
    }

    let mut tally = LevelTally::default();
    for photo in &geotagged {
        let Some(places) = memberships.get(&photo.fileid) else {
            continue;
        };
        let mut places: Vec<&PlaceMembership> = places.iter().collect();
        places.sort_by_key(|m| m.admin_level);
        for membership in places.into_iter().filter(|m| m.admin_level >= 0) {
            tally.add(membership);
        }
    }

    if tally.is_empty() {
        return UNKNOWN_LOCATION.to_string();
    }

    let Some(level) = tally.choose_level(geotagged.len()) else {
        return UNKNOWN_LOCATION.to_string();
    };
    debug!("Resolving trip location at admin level {}", level);

    let mut boundaries: Vec<&Boundary> = tally.level(level).unwrap_or_default().iter().collect();
    boundaries.sort_by(|a, b| b.count.cmp(&a.count));

    let names: Vec<&str> = boundaries
        .into_iter()
        .take(MAX_NAMES)
        .map(|b| b.name.as_str())
        .collect();

    if names.is_empty() {
        UNKNOWN_LOCATION.to_string()
    } else {
        names.join(", ")
    }
}

fn most_common_forced_label(photos: &[Photo]) -> Option<String> {
    let mut counts: Vec<(&str, usize)> = Vec::new();
    for label in photos
        .iter()
        .filter_map(|p| p.forced_location.as_deref())
        .filter(|l| !l.is_empty())
    {
        match counts.iter_mut().find(|(l, _)| *l == label) {
            Some((_, count)) => *count += 1,
            None => counts.push((label, 1)),
        }
    }

    let mut best: Option<(&str, usize)> = None;
    for (label, count) in counts {
        if best.map_or(true, |(_, c)| count > c) {
            best = Some((label, count));
        }
    }
    best.map(|(label, _)| label.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn place(osm_id: i64, name: &str, admin_level: i32) -> PlaceMembership {
        PlaceMembership {
            osm_id,
            name: name.to_string(),
            admin_level,
        }
    }

    fn geotagged(count: i64) -> Vec<Photo> {
        (1..=count)
            .map(|id| Photo::new(id, id * 60).with_location(48.85, 2.35))
            .collect()
    }

    fn assign(
        memberships: &mut HashMap<i64, Vec<PlaceMembership>>,
        ids: std::ops::RangeInclusive<i64>,
        places: &[PlaceMembership],
    ) {
        for id in ids {
            memberships.entry(id).or_default().extend(places.iter().cloned());
        }
    }

    #[test]
    fn test_city_covering_every_photo() {
        let photos = geotagged(4);
        let mut memberships = HashMap::new();
        assign(
            &mut memberships,
            1..=4,
            &[place(1, "France", 2), place(2, "Île-de-France", 4), place(3, "Paris", 8)],
        );

        assert_eq!(resolve_location(&photos, &memberships), "Paris");
    }

    #[test]
    fn test_no_geotagged_photos() {
        let photos = vec![Photo::new(1, 10), Photo::new(2, 20).with_location(0.0, 0.0)];
        let mut memberships = HashMap::new();
        assign(&mut memberships, 1..=2, &[place(3, "Paris", 8)]);

        assert_eq!(resolve_location(&photos, &memberships), UNKNOWN_LOCATION);
    }

    #[test]
    fn test_no_boundaries() {
        assert_eq!(resolve_location(&geotagged(3), &HashMap::new()), UNKNOWN_LOCATION);
    }

    #[test]
    fn test_forced_label_majority_ignores_boundaries() {
        let mut photos = geotagged(5);
        photos[0].forced_location = Some("Lake Como".to_string());
        photos[1].forced_location = Some("Milan".to_string());
        photos[2].forced_location = Some("Lake Como".to_string());
        let mut memberships = HashMap::new();
        assign(&mut memberships, 1..=5, &[place(3, "Paris", 8)]);

        assert_eq!(resolve_location(&photos, &memberships), "Lake Como");
    }

    #[test]
    fn test_forced_label_tie_keeps_first_seen() {
        let mut photos = geotagged(2);
        photos[0].forced_location = Some("Bergen".to_string());
        photos[1].forced_location = Some("Oslo".to_string());

        assert_eq!(resolve_location(&photos, &HashMap::new()), "Bergen");
    }

    #[test]
    fn test_state_level_when_no_city_dominates() {
        // Ten photos across five cities of one region: no city reaches 55 %.
        let photos = geotagged(10);
        let mut memberships = HashMap::new();
        assign(&mut memberships, 1..=10, &[place(1, "Italy", 2), place(2, "Tuscany", 4)]);
        for (i, city) in ["Florence", "Siena", "Pisa", "Lucca", "Arezzo"].iter().enumerate() {
            let first = i as i64 * 2 + 1;
            assign(&mut memberships, first..=first + 1, &[place(100 + i as i64, city, 8)]);
        }

        assert_eq!(resolve_location(&photos, &memberships), "Tuscany");
    }

    #[test]
    fn test_diverse_level_lists_top_three() {
        // No city at 55 %, no state at all: level 8 wins on diversity + bonus.
        let photos = geotagged(10);
        let mut memberships = HashMap::new();
        assign(&mut memberships, 1..=10, &[place(1, "Japan", 2)]);
        assign(&mut memberships, 1..=4, &[place(10, "Kyoto", 8)]);
        assign(&mut memberships, 5..=7, &[place(11, "Osaka", 8)]);
        assign(&mut memberships, 8..=9, &[place(12, "Nara", 8)]);
        assign(&mut memberships, 10..=10, &[place(13, "Kobe", 8)]);

        assert_eq!(resolve_location(&photos, &memberships), "Kyoto, Osaka, Nara");
    }

    #[test]
    fn test_country_fallback() {
        let photos = geotagged(10);
        let mut memberships = HashMap::new();
        assign(&mut memberships, 1..=10, &[place(1, "Iceland", 2)]);
        assign(&mut memberships, 1..=1, &[place(2, "Vík", 8)]);

        assert_eq!(resolve_location(&photos, &memberships), "Iceland");
    }

    #[test]
    fn test_most_specific_level_as_last_resort() {
        // Every boundary is below the 20 % bar.
        let photos = geotagged(10);
        let mut memberships = HashMap::new();
        assign(&mut memberships, 1..=1, &[place(1, "Norway", 2)]);
        assign(&mut memberships, 2..=2, &[place(2, "Vestland", 4)]);
        assign(&mut memberships, 3..=3, &[place(3, "Bergen", 7)]);

        assert_eq!(resolve_location(&photos, &memberships), "Bergen");
    }

    #[test]
    fn test_negative_levels_ignored() {
        let photos = geotagged(2);
        let mut memberships = HashMap::new();
        assign(&mut memberships, 1..=2, &[place(1, "Timezone", -1)]);

        assert_eq!(resolve_location(&photos, &memberships), UNKNOWN_LOCATION);
    }
}
