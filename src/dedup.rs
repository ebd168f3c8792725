//! Overlap clustering and representative selection for candidate tiles.

use std::cmp::Ordering;

use tracing::debug;

use crate::domain::{Candidate, Footprint, SelectionPolicy};
use crate::error::StitchError;
use crate::geometry::{GeometryIndex, RATIO_EPSILON};

pub const DEFAULT_OVERLAP_THRESHOLD: f64 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlapEdge {
    pub i: usize,
    pub j: usize,
    pub ratio: f64,
}

pub fn validate_threshold(threshold: f64) -> Result<f64, StitchError> {
    if !(0.0..=1.0).contains(&threshold) {
        return Err(StitchError::InvalidThreshold(threshold));
    }
    Ok(threshold)
}

/// Every pair `i < j` whose overlap ratio is positive and at least `threshold`,
/// strongest overlap first.
pub fn find_overlaps(index: &GeometryIndex, threshold: f64) -> Vec<OverlapEdge> {
    let mut edges = Vec::new();
    for i in 0..index.len() {
        for j in index.query_candidates(i) {
            if j <= i {
                continue;
            }
            let Some(ratio) = index.overlap_ratio(i, j) else {
                continue;
            };
            if ratio > 0.0 && ratio + RATIO_EPSILON >= threshold {
                edges.push(OverlapEdge { i, j, ratio });
            }
        }
    }
    edges.sort_by(|a, b| {
        b.ratio
            .partial_cmp(&a.ratio)
            .unwrap_or(Ordering::Equal)
            .then(a.i.cmp(&b.i))
            .then(a.j.cmp(&b.j))
    });
    edges
}

/// Connected components over `0..count`; isolated indices become singletons.
/// Clusters come out in discovery order (by smallest member), members ascending.
pub fn group_overlaps(edges: &[OverlapEdge], count: usize) -> Vec<Vec<usize>> {
    let mut adjacency = vec![Vec::new(); count];
    for edge in edges {
        adjacency[edge.i].push(edge.j);
        adjacency[edge.j].push(edge.i);
    }

    let mut visited = vec![false; count];
    let mut clusters = Vec::new();
    let mut stack = Vec::new();
    for start in 0..count {
        if visited[start] {
            continue;
        }
        visited[start] = true;
        stack.push(start);
        let mut cluster = Vec::new();
        while let Some(node) = stack.pop() {
            cluster.push(node);
            for &neighbor in &adjacency[node] {
                if !visited[neighbor] {
                    visited[neighbor] = true;
                    stack.push(neighbor);
                }
            }
        }
        cluster.sort_unstable();
        clusters.push(cluster);
    }
    clusters
}

pub fn select_representatives(
    clusters: &[Vec<usize>],
    index: &GeometryIndex,
    policy: SelectionPolicy,
) -> Vec<usize> {
    clusters
        .iter()
        .filter_map(|cluster| match policy {
            SelectionPolicy::MinIndex => cluster.iter().copied().min(),
            SelectionPolicy::MaxArea => cluster.iter().copied().reduce(|best, member| {
                let (area, best_area) = (index.area(member), index.area(best));
                if area > best_area || (area == best_area && member < best) {
                    member
                } else {
                    best
                }
            }),
        })
        .collect()
}

/// Collapse mutually overlapping candidates to one representative per cluster.
pub fn deduplicate(
    candidates: Vec<Candidate>,
    threshold: f64,
    policy: SelectionPolicy,
) -> Result<Vec<Candidate>, StitchError> {
    let threshold = validate_threshold(threshold)?;
    let footprints: Vec<Footprint> = candidates.iter().map(|c| c.footprint).collect();
    let index = GeometryIndex::build(&footprints);

    let edges = find_overlaps(&index, threshold);
    let clusters = group_overlaps(&edges, candidates.len());
    let selected = select_representatives(&clusters, &index, policy);
    debug!(
        candidates = candidates.len(),
        edges = edges.len(),
        clusters = clusters.len(),
        %policy,
        "deduplicated footprints"
    );

    let mut slots: Vec<Option<Candidate>> = candidates.into_iter().map(Some).collect();
    Ok(selected
        .into_iter()
        .filter_map(|idx| slots[idx].take())
        .collect())
}
