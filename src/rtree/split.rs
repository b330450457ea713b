//! # Quadratic Node Split
//!
//! When an insert lands on a full node, its entries plus the incoming one
//! are partitioned into two groups using the classical quadratic
//! heuristic: pick as seeds the pair whose joint MBR wastes the most
//! area, then greedily place the remaining entries, most-opinionated
//! first.
//!
//! The partition works on owned entries staged out of the page, so the
//! caller can rewrite the original block and fill a freshly allocated one
//! without aliasing block memory mid-split.
//!
//! No minimum-fill constraint is applied; groups may end up uneven.

use smallvec::SmallVec;

use crate::rtree::key::{Coordinate, Mbr};

/// One staged entry: the key plus the raw slot value bytes (payload or
/// packed child offset).
#[derive(Debug, Clone)]
pub struct SplitEntry<C: Coordinate> {
    pub key: Mbr<C>,
    pub value: SmallVec<[u8; 16]>,
}

impl<C: Coordinate> SplitEntry<C> {
    pub fn new(key: Mbr<C>, value: &[u8]) -> Self {
        Self {
            key,
            value: SmallVec::from_slice(value),
        }
    }
}

/// Result of a partition: two non-empty groups with their covering MBRs.
#[derive(Debug)]
pub struct SplitGroups<C: Coordinate> {
    pub group1: Vec<SplitEntry<C>>,
    pub mbr1: Mbr<C>,
    pub group2: Vec<SplitEntry<C>>,
    pub mbr2: Mbr<C>,
}

/// Splits `entries` into two groups.
///
/// Seeds maximise `area(union(a, b)) - area(a) - area(b)`, ties broken by
/// lower `(i, j)` lexicographic order. Each remaining entry is placed in
/// the group it enlarges less, processed in order of how strongly it
/// prefers one group over the other; cost ties go to the group with the
/// smaller current area, then to group 1.
pub fn quadratic_partition<C: Coordinate>(entries: Vec<SplitEntry<C>>) -> SplitGroups<C> {
    assert!(entries.len() >= 2, "cannot split fewer than two entries");

    let (seed1, seed2) = pick_seeds(&entries);

    let mut remaining = entries;
    // remove the higher index first so the lower one stays valid
    let e2 = remaining.remove(seed2);
    let e1 = remaining.remove(seed1);

    let mut mbr1 = e1.key.clone();
    let mut mbr2 = e2.key.clone();
    let mut group1 = vec![e1];
    let mut group2 = vec![e2];

    while !remaining.is_empty() {
        let mut pick = 0;
        let mut pick_diff: Option<C> = None;

        for (k, entry) in remaining.iter().enumerate() {
            let cost1 = mbr1.enlargement_cost(&entry.key);
            let cost2 = mbr2.enlargement_cost(&entry.key);
            let diff = if cost1 > cost2 {
                cost1 - cost2
            } else {
                cost2 - cost1
            };
            if pick_diff.map_or(true, |best| diff > best) {
                pick = k;
                pick_diff = Some(diff);
            }
        }

        let entry = remaining.remove(pick);
        let cost1 = mbr1.enlargement_cost(&entry.key);
        let cost2 = mbr2.enlargement_cost(&entry.key);

        let to_group1 = if cost1 < cost2 {
            true
        } else if cost2 < cost1 {
            false
        } else {
            // cost tie: smaller current area wins, then group 1
            !(mbr2.area() < mbr1.area())
        };

        if to_group1 {
            mbr1.enlarge(&entry.key);
            group1.push(entry);
        } else {
            mbr2.enlarge(&entry.key);
            group2.push(entry);
        }
    }

    SplitGroups {
        group1,
        mbr1,
        group2,
        mbr2,
    }
}

/// Picks the pair of entries whose joint MBR wastes the most area.
fn pick_seeds<C: Coordinate>(entries: &[SplitEntry<C>]) -> (usize, usize) {
    let mut best = (0, 1);
    let mut best_waste: Option<C> = None;

    for i in 0..entries.len() {
        for j in (i + 1)..entries.len() {
            let joint = entries[i].key.union(&entries[j].key);
            let waste = joint.area() - entries[i].key.area() - entries[j].key.area();
            if best_waste.map_or(true, |b| waste > b) {
                best = (i, j);
                best_waste = Some(waste);
            }
        }
    }

    best
}
