use crate::algorithms::classifier::MatchStatistics;
use crate::algorithms::correspondence::CorrespondenceMatcher;
use crate::algorithms::marks::AlignmentMarkDetector;
use crate::algorithms::rotation::{RotationSearch, RotationSearchResult};
use crate::config::AlignmentConfig;
use crate::pipeline::engine::PreparedReference;
use crate::pipeline::traits::{AlignmentEvent, AlignmentStrategy, ProgressObserver, StrategyReport};
use crate::pipeline::types::{AlignmentMark, AlignmentMethod, CorrespondenceSet, Point2};
use crate::Result;
use image::GrayImage;

/// A captured mark paired with its reference counterpart
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarkPair {
    pub captured: AlignmentMark,
    pub reference: AlignmentMark,
}

/// Fiducial pairing for one captured image
#[derive(Debug, Clone)]
pub struct FiducialMatch {
    pub search: RotationSearchResult,
    /// Present only when the mark count fell short and positions had to be matched
    pub correspondence: Option<CorrespondenceSet>,
    pub pairs: Vec<MarkPair>,
}

impl FiducialMatch {
    /// Four corner correspondences per mark pair, captured side first
    pub fn corner_points(&self) -> (Vec<Point2>, Vec<Point2>) {
        corner_correspondences(&self.pairs)
    }
}

/// Registration through printed square fiducials.
///
/// Runs the rotation search on the captured image, then pairs the marks of
/// the best attempt with the reference marks: positionally when the counts
/// agree, otherwise by normalized position.
pub struct FiducialMarkAligner {
    search: RotationSearch,
    matcher: CorrespondenceMatcher,
}

impl FiducialMarkAligner {
    pub fn new(config: &AlignmentConfig) -> Self {
        let detector = AlignmentMarkDetector::with_config(config.marks.clone());
        Self {
            search: RotationSearch::new(detector, &config.rotation),
            matcher: CorrespondenceMatcher::new(&config.matching),
        }
    }

    pub fn pair_marks(
        &self,
        captured: &GrayImage,
        reference_marks: &[AlignmentMark],
        expected_mark_count: usize,
        observer: &dyn ProgressObserver,
    ) -> Result<FiducialMatch> {
        let search = self.search.search(captured, |angle, marks_found| {
            observer.on_event(&AlignmentEvent::RotationEvaluated { angle, marks_found });
        })?;

        let captured_marks = search.best().marks_found.clone();

        if captured_marks.is_empty() {
            return Ok(FiducialMatch {
                search,
                correspondence: None,
                pairs: Vec::new(),
            });
        }

        if captured_marks.len() == expected_mark_count && reference_marks.len() == expected_mark_count {
            let pairs = captured_marks
                .iter()
                .zip(reference_marks)
                .map(|(&captured, &reference)| MarkPair { captured, reference })
                .collect();
            return Ok(FiducialMatch {
                search,
                correspondence: None,
                pairs,
            });
        }

        let correspondence = self.matcher.match_marks(&captured_marks, reference_marks);
        observer.on_event(&AlignmentEvent::CorrespondenceResolved {
            matched: correspondence.matched_pairs.len(),
            unmatched_source: correspondence.unmatched_source.len(),
            unmatched_target: correspondence.unmatched_target.len(),
        });

        let pairs = correspondence
            .matched_pairs
            .iter()
            .map(|pair| MarkPair {
                captured: captured_marks[pair.source_index],
                reference: reference_marks[pair.target_index],
            })
            .collect();

        Ok(FiducialMatch {
            search,
            correspondence: Some(correspondence),
            pairs,
        })
    }
}

impl AlignmentStrategy for FiducialMarkAligner {
    fn method(&self) -> AlignmentMethod {
        AlignmentMethod::FiducialMarks
    }

    fn correspond(
        &self,
        reference: &PreparedReference,
        captured: &GrayImage,
        observer: &dyn ProgressObserver,
    ) -> Result<StrategyReport> {
        let expected = reference.marks().len();
        let matched = self.pair_marks(captured, reference.marks(), expected, observer)?;
        let (source_points, target_points) = matched.corner_points();

        let statistics = MatchStatistics::FiducialMarks {
            marks_detected: matched.search.best().mark_count(),
            expected_marks: expected,
            matched_marks: matched.pairs.len(),
        };

        let FiducialMatch {
            search,
            correspondence,
            ..
        } = matched;
        let accepted_rotation_angle = Some(search.best_angle());

        Ok(StrategyReport {
            statistics,
            working_image: search.rotated_image,
            source_points,
            target_points,
            accepted_rotation_angle,
            rotation_attempts: search.attempts,
            correspondence,
        })
    }
}

pub fn corner_correspondences(pairs: &[MarkPair]) -> (Vec<Point2>, Vec<Point2>) {
    let mut source = Vec::with_capacity(pairs.len() * 4);
    let mut target = Vec::with_capacity(pairs.len() * 4);
    for pair in pairs {
        source.extend_from_slice(&pair.captured.corners());
        target.extend_from_slice(&pair.reference.corners());
    }
    (source, target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::types::BoxBounds;

    #[test]
    fn test_each_pair_contributes_four_corners() {
        let pairs = vec![
            MarkPair {
                captured: AlignmentMark::new(BoxBounds::new(10, 20, 40, 40)),
                reference: AlignmentMark::new(BoxBounds::new(0, 0, 42, 42)),
            },
            MarkPair {
                captured: AlignmentMark::new(BoxBounds::new(300, 20, 40, 40)),
                reference: AlignmentMark::new(BoxBounds::new(290, 0, 42, 42)),
            },
        ];

        let (source, target) = corner_correspondences(&pairs);
        assert_eq!(source.len(), 8);
        assert_eq!(target.len(), 8);
        assert_eq!(source[0], Point2::new(10.0, 20.0));
        assert_eq!(source[3], Point2::new(50.0, 60.0));
        assert_eq!(target[5], Point2::new(332.0, 0.0));
    }

    #[test]
    fn test_no_pairs_no_points() {
        let (source, target) = corner_correspondences(&[]);
        assert!(source.is_empty() && target.is_empty());
    }
}
