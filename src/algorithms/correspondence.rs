use crate::config::{MatchingConfig, MatchingStrategy};
use crate::pipeline::types::{AlignmentMark, CorrespondenceSet, MatchedPair, Point2, UnmatchedPoint};

/// Cost assigned to pairs beyond the distance threshold in optimal mode,
/// large enough that any admissible pair is always preferred
const INADMISSIBLE_COST: f64 = 1.0e6;

/// Pairs two point sets by their positions normalized into the unit square.
///
/// Each list is normalized against its own bounding extents, which makes the
/// comparison independent of scale and translation between the two images.
#[derive(Debug, Clone)]
pub struct CorrespondenceMatcher {
    max_distance: f64,
    strategy: MatchingStrategy,
}

impl Default for CorrespondenceMatcher {
    fn default() -> Self {
        Self::new(&MatchingConfig::default())
    }
}

impl CorrespondenceMatcher {
    pub fn new(config: &MatchingConfig) -> Self {
        Self {
            max_distance: config.max_distance,
            strategy: config.strategy,
        }
    }

    /// Match marks through their centers
    pub fn match_marks(&self, source: &[AlignmentMark], target: &[AlignmentMark]) -> CorrespondenceSet {
        let source: Vec<Point2> = source.iter().map(|m| m.center()).collect();
        let target: Vec<Point2> = target.iter().map(|m| m.center()).collect();
        self.match_points(&source, &target)
    }

    pub fn match_points(&self, source: &[Point2], target: &[Point2]) -> CorrespondenceSet {
        if source.is_empty() || target.is_empty() {
            return CorrespondenceSet {
                matched_pairs: Vec::new(),
                unmatched_source: indexed(source),
                unmatched_target: indexed(target),
            };
        }

        let norm_source = normalize_points(source);
        let norm_target = normalize_points(target);

        let assignment = match self.strategy {
            MatchingStrategy::Greedy => self.assign_greedy(&norm_source, &norm_target),
            MatchingStrategy::Optimal => self.assign_optimal(&norm_source, &norm_target),
        };

        let mut target_used = vec![false; target.len()];
        let mut set = CorrespondenceSet::default();

        for (source_index, assigned) in assignment.into_iter().enumerate() {
            match assigned {
                Some((target_index, distance)) => {
                    target_used[target_index] = true;
                    set.matched_pairs.push(MatchedPair {
                        source_index,
                        target_index,
                        source: source[source_index],
                        target: target[target_index],
                        distance,
                    });
                }
                None => set.unmatched_source.push(UnmatchedPoint {
                    index: source_index,
                    point: source[source_index],
                }),
            }
        }

        set.unmatched_target = target
            .iter()
            .enumerate()
            .filter(|(i, _)| !target_used[*i])
            .map(|(index, &point)| UnmatchedPoint { index, point })
            .collect();

        set
    }

    /// For each source in order take the nearest unused target
    fn assign_greedy(&self, source: &[Point2], target: &[Point2]) -> Vec<Option<(usize, f64)>> {
        let mut used = vec![false; target.len()];

        source
            .iter()
            .map(|s| {
                let nearest = target
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| !used[*i])
                    .map(|(i, t)| (i, s.distance(t)))
                    .fold(None, |best: Option<(usize, f64)>, (i, d)| match best {
                        Some((_, best_d)) if best_d <= d => best,
                        _ => Some((i, d)),
                    });

                match nearest {
                    Some((i, d)) if d <= self.max_distance => {
                        used[i] = true;
                        Some((i, d))
                    }
                    _ => None,
                }
            })
            .collect()
    }

    /// Minimum-cost assignment; pairs beyond the threshold are dropped afterwards
    fn assign_optimal(&self, source: &[Point2], target: &[Point2]) -> Vec<Option<(usize, f64)>> {
        let cost = |s: &Point2, t: &Point2| {
            let d = s.distance(t);
            if d <= self.max_distance {
                d
            } else {
                INADMISSIBLE_COST
            }
        };

        let mut assignment = vec![None; source.len()];
        if source.len() <= target.len() {
            let matrix: Vec<Vec<f64>> = source
                .iter()
                .map(|s| target.iter().map(|t| cost(s, t)).collect())
                .collect();
            for (row, col) in hungarian(&matrix).into_iter().enumerate() {
                assignment[row] = col;
            }
        } else {
            let matrix: Vec<Vec<f64>> = target
                .iter()
                .map(|t| source.iter().map(|s| cost(s, t)).collect())
                .collect();
            for (row, col) in hungarian(&matrix).into_iter().enumerate() {
                if let Some(col) = col {
                    assignment[col] = Some(row);
                }
            }
        }

        assignment
            .into_iter()
            .enumerate()
            .map(|(i, assigned)| {
                assigned.and_then(|j| {
                    let d = source[i].distance(&target[j]);
                    (d <= self.max_distance).then_some((j, d))
                })
            })
            .collect()
    }
}

fn indexed(points: &[Point2]) -> Vec<UnmatchedPoint> {
    points
        .iter()
        .enumerate()
        .map(|(index, &point)| UnmatchedPoint { index, point })
        .collect()
}

/// Map points into the unit square using the list's own extents.
///
/// A collapsed extent is treated as a range of 1, and a single point maps to
/// the center of the square.
pub fn normalize_points(points: &[Point2]) -> Vec<Point2> {
    if points.len() == 1 {
        return vec![Point2::new(0.5, 0.5)];
    }

    let (min_x, max_x, min_y, max_y) = points.iter().fold(
        (f64::INFINITY, f64::NEG_INFINITY, f64::INFINITY, f64::NEG_INFINITY),
        |(min_x, max_x, min_y, max_y), p| {
            (min_x.min(p.x), max_x.max(p.x), min_y.min(p.y), max_y.max(p.y))
        },
    );

    let range_x = if max_x - min_x > 0.0 { max_x - min_x } else { 1.0 };
    let range_y = if max_y - min_y > 0.0 { max_y - min_y } else { 1.0 };

    points
        .iter()
        .map(|p| Point2::new((p.x - min_x) / range_x, (p.y - min_y) / range_y))
        .collect()
}

/// Hungarian algorithm for a rows <= cols cost matrix.
///
/// Returns the assigned column for every row.
fn hungarian(cost: &[Vec<f64>]) -> Vec<Option<usize>> {
    let n = cost.len();
    if n == 0 {
        return Vec::new();
    }
    let m = cost[0].len();
    debug_assert!(n <= m);

    let mut u = vec![0.0; n + 1];
    let mut v = vec![0.0; m + 1];
    // p[j]: row (1-based) assigned to column j; way[j]: previous column on the augmenting path
    let mut p = vec![0usize; m + 1];
    let mut way = vec![0usize; m + 1];

    for i in 1..=n {
        p[0] = i;
        let mut j0 = 0;
        let mut minv = vec![f64::INFINITY; m + 1];
        let mut used = vec![false; m + 1];

        loop {
            used[j0] = true;
            let i0 = p[j0];
            let mut delta = f64::INFINITY;
            let mut j1 = 0;

            for j in 1..=m {
                if used[j] {
                    continue;
                }
                let cur = cost[i0 - 1][j - 1] - u[i0] - v[j];
                if cur < minv[j] {
                    minv[j] = cur;
                    way[j] = j0;
                }
                if minv[j] < delta {
                    delta = minv[j];
                    j1 = j;
                }
            }

            for j in 0..=m {
                if used[j] {
                    u[p[j]] += delta;
                    v[j] -= delta;
                } else {
                    minv[j] -= delta;
                }
            }

            j0 = j1;
            if p[j0] == 0 {
                break;
            }
        }

        loop {
            let j1 = way[j0];
            p[j0] = p[j1];
            j0 = j1;
            if j0 == 0 {
                break;
            }
        }
    }

    let mut assignment = vec![None; n];
    for j in 1..=m {
        if p[j] != 0 {
            assignment[p[j] - 1] = Some(j - 1);
        }
    }
    assignment
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pts(coords: &[(f64, f64)]) -> Vec<Point2> {
        coords.iter().map(|&(x, y)| Point2::new(x, y)).collect()
    }

    #[test]
    fn test_single_point_normalizes_to_center() {
        let normalized = normalize_points(&pts(&[(123.0, -40.0)]));
        assert_eq!(normalized, pts(&[(0.5, 0.5)]));
    }

    #[test]
    fn test_equal_points_collapse_without_nan() {
        let normalized = normalize_points(&pts(&[(7.0, 7.0), (7.0, 7.0)]));
        assert_eq!(normalized, pts(&[(0.0, 0.0), (0.0, 0.0)]));
    }

    #[test]
    fn test_collapsed_axis_uses_unit_range() {
        let normalized = normalize_points(&pts(&[(10.0, 50.0), (30.0, 50.0), (20.0, 50.0)]));
        assert_eq!(normalized, pts(&[(0.0, 0.0), (1.0, 0.0), (0.5, 0.0)]));
    }

    #[test]
    fn test_identical_sets_match_completely() {
        let points = pts(&[(10.0, 10.0), (500.0, 12.0), (14.0, 700.0), (505.0, 698.0), (250.0, 350.0)]);
        let set = CorrespondenceMatcher::default().match_points(&points, &points);

        assert_eq!(set.matched_pairs.len(), points.len());
        assert!(set.unmatched_source.is_empty());
        assert!(set.unmatched_target.is_empty());
        for pair in &set.matched_pairs {
            assert_eq!(pair.source_index, pair.target_index);
            assert_eq!(pair.distance, 0.0);
        }
    }

    #[test]
    fn test_scaled_and_shifted_sets_match() {
        let reference = pts(&[(0.0, 0.0), (100.0, 0.0), (0.0, 200.0), (100.0, 200.0)]);
        let captured: Vec<Point2> = reference
            .iter()
            .map(|p| Point2::new(p.x * 1.5 + 40.0, p.y * 1.5 - 12.0))
            .collect();
        let set = CorrespondenceMatcher::default().match_points(&captured, &reference);
        assert_eq!(set.matched_pairs.len(), 4);
        assert!(set.distances().iter().all(|d| d.abs() < 1e-12));
    }

    #[test]
    fn test_empty_inputs_yield_no_correspondence() {
        let points = pts(&[(1.0, 1.0), (2.0, 2.0)]);
        let matcher = CorrespondenceMatcher::default();

        let set = matcher.match_points(&[], &points);
        assert!(set.is_empty());
        assert!(set.unmatched_source.is_empty());
        assert_eq!(set.unmatched_target.len(), 2);

        let set = matcher.match_points(&points, &[]);
        assert_eq!(set.unmatched_source.len(), 2);
        assert!(set.unmatched_target.is_empty());
    }

    #[test]
    fn test_distant_source_left_unmatched() {
        // Normalized: source (0,0) (1,1) (1,0); target (0,0) (1,1) (0,1)
        let source = pts(&[(0.0, 0.0), (10.0, 10.0), (10.0, 0.0)]);
        let target = pts(&[(0.0, 0.0), (10.0, 10.0), (0.0, 10.0)]);
        let set = CorrespondenceMatcher::default().match_points(&source, &target);

        assert_eq!(set.matched_pairs.len(), 2);
        assert_eq!(set.unmatched_source.len(), 1);
        assert_eq!(set.unmatched_source[0].index, 2);
        assert_eq!(set.unmatched_target.len(), 1);
        assert_eq!(set.unmatched_target[0].index, 2);
    }

    #[test]
    fn test_greedy_claims_nearest_in_source_order() {
        // Normalized source: (0.5,0) (0,0) (1,1); target: (0.3,0) (0,0) (1,1)
        let source = pts(&[(5.0, 0.0), (0.0, 0.0), (10.0, 10.0)]);
        let target = pts(&[(3.0, 0.0), (0.0, 0.0), (10.0, 10.0)]);

        let greedy = CorrespondenceMatcher::default().match_points(&source, &target);
        // First source grabs t0 (0.2 away), leaving the second with t1 (distance 0)
        assert_eq!(greedy.matched_pairs[0].target_index, 0);
        assert_eq!(greedy.matched_pairs.len(), 3);

        let swapped = pts(&[(0.0, 0.0), (5.0, 0.0), (10.0, 10.0)]);
        let greedy = CorrespondenceMatcher::default().match_points(&swapped, &target);
        assert_eq!(greedy.matched_pairs[0].target_index, 1);
        assert_eq!(greedy.matched_pairs[1].target_index, 0);
    }

    fn optimal_matcher() -> CorrespondenceMatcher {
        CorrespondenceMatcher::new(&MatchingConfig {
            strategy: MatchingStrategy::Optimal,
            ..MatchingConfig::default()
        })
    }

    #[test]
    fn test_optimal_recovers_pair_greedy_loses() {
        // Greedy: s0 takes t1 (0.05), s1 is left with t0 at 0.55 -> unmatched
        let source = pts(&[(0.45, 0.0), (0.15, 0.0), (0.0, 1.0), (1.0, 1.0)]);
        let target = pts(&[(0.7, 0.0), (0.4, 0.0), (0.0, 1.0), (1.0, 1.0)]);
        let greedy_matcher = CorrespondenceMatcher::default();
        let greedy = greedy_matcher.match_points(&source, &target);
        assert_eq!(greedy.matched_pairs.len(), 3);
        assert_eq!(greedy.unmatched_source[0].index, 1);

        let optimal = optimal_matcher().match_points(&source, &target);

        assert_eq!(optimal.matched_pairs.len(), 4);
        assert!(optimal.unmatched_source.is_empty());
        assert_eq!(optimal.matched_pairs[0].target_index, 0);
    }

    #[test]
    fn test_optimal_handles_more_sources_than_targets() {
        let source = pts(&[(0.0, 0.0), (5.0, 5.0), (10.0, 10.0)]);
        let target = pts(&[(0.0, 0.0), (10.0, 10.0)]);
        let set = optimal_matcher().match_points(&source, &target);

        assert_eq!(set.matched_pairs.len(), 2);
        assert_eq!(set.unmatched_source.len(), 1);
        assert_eq!(set.unmatched_source[0].index, 1);
        assert!(set.unmatched_target.is_empty());
    }

    #[test]
    fn test_hungarian_small_matrix() {
        let cost = vec![vec![4.0, 1.0, 3.0], vec![2.0, 0.0, 5.0], vec![3.0, 2.0, 2.0]];
        let assignment = hungarian(&cost);
        assert_eq!(assignment, vec![Some(1), Some(0), Some(2)]);
    }
}
