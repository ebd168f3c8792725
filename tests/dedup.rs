mod support;

use std::collections::HashSet;

use assert_matches::assert_matches;

use terrain_stitcher::dedup::{deduplicate, find_overlaps, group_overlaps};
use terrain_stitcher::domain::SelectionPolicy;
use terrain_stitcher::error::StitchError;
use terrain_stitcher::geometry::GeometryIndex;

use support::{candidate, square};

#[test]
fn half_overlap_merges_above_threshold_only() {
    let candidates = vec![
        candidate("A", square(0.0, 0.0, 1.0)),
        candidate("B", square(0.0, 0.5, 1.0)),
    ];

    let merged = deduplicate(candidates.clone(), 0.3, SelectionPolicy::MinIndex).unwrap();
    assert_eq!(merged.len(), 1);
    assert_eq!(merged[0].record_id, "A");

    let kept = deduplicate(candidates, 0.6, SelectionPolicy::MinIndex).unwrap();
    assert_eq!(kept.len(), 2);
}

#[test]
fn overlap_chains_collapse_transitively() {
    let footprints = [
        square(0.0, 0.0, 1.0),
        square(0.0, 0.6, 1.0),
        square(0.0, 1.2, 1.0),
    ];
    let index = GeometryIndex::build(&footprints);
    let ab = index.overlap_ratio(0, 1).unwrap();
    assert!((ab - 0.4).abs() < 1e-9, "ratio {ab}");
    assert!(index.overlap_ratio(0, 2).is_none());

    let candidates = footprints
        .iter()
        .enumerate()
        .map(|(i, footprint)| candidate(&format!("T{i}"), *footprint))
        .collect();
    let kept = deduplicate(candidates, 0.3, SelectionPolicy::MinIndex).unwrap();
    assert_eq!(kept.len(), 1);
    assert_eq!(kept[0].record_id, "T0");
}

#[test]
fn clusters_partition_every_index_exactly_once() {
    let footprints: Vec<_> = (0..40)
        .map(|i| square((i % 5) as f64 * 0.7, (i / 5) as f64 * 0.45, 1.0))
        .collect();
    let index = GeometryIndex::build(&footprints);
    let edges = find_overlaps(&index, 0.3);
    let clusters = group_overlaps(&edges, footprints.len());

    let mut seen = HashSet::new();
    for cluster in &clusters {
        assert!(!cluster.is_empty());
        for &member in cluster {
            assert!(seen.insert(member), "index {member} in two clusters");
        }
    }
    assert_eq!(seen.len(), footprints.len());
}

#[test]
fn overlap_ratio_is_symmetric() {
    let footprints = [
        square(10.0, 10.0, 1.0),
        square(10.3, 10.2, 0.6),
        square(45.0, -120.0, 0.2),
    ];
    let index = GeometryIndex::build(&footprints);
    for i in 0..footprints.len() {
        for j in 0..footprints.len() {
            if i != j {
                assert_eq!(index.overlap_ratio(i, j), index.overlap_ratio(j, i));
            }
        }
    }
    let contained = index.overlap_ratio(0, 1).unwrap();
    assert!(contained > 0.99 && contained <= 1.0);
}

#[test]
fn deduplicating_twice_changes_nothing() {
    let candidates: Vec<_> = (0..12)
        .map(|i| candidate(&format!("S{i}"), square(0.0, i as f64 * 0.4, 1.0)))
        .collect();
    let once = deduplicate(candidates, 0.3, SelectionPolicy::MaxArea).unwrap();
    let twice = deduplicate(once.clone(), 0.3, SelectionPolicy::MaxArea).unwrap();
    assert_eq!(once, twice);
}

#[test]
fn zero_threshold_merges_any_touching_overlap() {
    let candidates = vec![
        candidate("A", square(0.0, 0.0, 1.0)),
        candidate("B", square(0.0, 0.99, 1.0)),
        candidate("C", square(5.0, 5.0, 1.0)),
    ];
    let kept = deduplicate(candidates, 0.0, SelectionPolicy::MinIndex).unwrap();
    let ids: Vec<_> = kept.iter().map(|c| c.record_id.as_str()).collect();
    assert_eq!(ids, ["A", "C"]);
}

#[test]
fn unit_threshold_merges_only_full_containment() {
    let identical = vec![
        candidate("A", square(39.9, -83.0, 0.05)),
        candidate("B", square(39.9, -83.0, 0.05)),
    ];
    let kept = deduplicate(identical, 1.0, SelectionPolicy::MinIndex).unwrap();
    assert_eq!(kept.len(), 1);
    assert_eq!(kept[0].record_id, "A");

    let contained = vec![
        candidate("Outer", square(0.0, 0.0, 2.0)),
        candidate("Inner", square(0.5, 0.5, 0.5)),
    ];
    let kept = deduplicate(contained, 1.0, SelectionPolicy::MaxArea).unwrap();
    assert_eq!(kept.len(), 1);
    assert_eq!(kept[0].record_id, "Outer");

    let partial = vec![
        candidate("A", square(0.0, 0.0, 1.0)),
        candidate("B", square(0.0, 0.5, 1.0)),
    ];
    let kept = deduplicate(partial, 1.0, SelectionPolicy::MinIndex).unwrap();
    assert_eq!(kept.len(), 2);
}

#[test]
fn threshold_outside_unit_interval_is_rejected() {
    let candidates = vec![candidate("A", square(0.0, 0.0, 1.0))];
    assert_matches!(
        deduplicate(candidates, 1.5, SelectionPolicy::MinIndex),
        Err(StitchError::InvalidThreshold(_))
    );
}
