//! Group-aware train/test splitting.
//!
//! The partition boundary lies between trips, never inside one — rolling
//! and differenced features leak across rows of the same trip, so a
//! row-level split would overstate every metric.

use std::collections::BTreeSet;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

#[derive(Debug, Clone)]
pub struct GroupSplit {
    pub train_rows: Vec<usize>,
    pub test_rows: Vec<usize>,
    pub train_trips: BTreeSet<String>,
    pub test_trips: BTreeSet<String>,
}

/// Shuffle the distinct trips with a seeded RNG and hold out
/// `ceil(test_fraction · n_trips)` of them. A corpus with fewer than two
/// trips cannot be split; everything lands in train and the test side
/// stays empty.
pub fn group_shuffle_split(trip_ids: &[String], test_fraction: f64, seed: u64) -> GroupSplit {
    // BTreeSet gives a deterministic group order before the shuffle.
    let groups: BTreeSet<&String> = trip_ids.iter().collect();
    let mut groups: Vec<&String> = groups.into_iter().collect();
    let mut rng = StdRng::seed_from_u64(seed);
    groups.shuffle(&mut rng);

    let mut test_trips: BTreeSet<String> = BTreeSet::new();
    if groups.len() >= 2 {
        let n_test = ((groups.len() as f64) * test_fraction).ceil() as usize;
        let n_test = n_test.clamp(1, groups.len() - 1);
        test_trips.extend(groups[..n_test].iter().map(|s| s.to_string()));
    }
    let train_trips: BTreeSet<String> = groups
        .iter()
        .filter(|g| !test_trips.contains(g.as_str()))
        .map(|s| s.to_string())
        .collect();

    let mut train_rows = Vec::new();
    let mut test_rows = Vec::new();
    for (row, trip) in trip_ids.iter().enumerate() {
        if test_trips.contains(trip) {
            test_rows.push(row);
        } else {
            train_rows.push(row);
        }
    }
    GroupSplit {
        train_rows,
        test_rows,
        train_trips,
        test_trips,
    }
}
