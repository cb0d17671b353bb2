use crate::algorithms::homography::MIN_HOMOGRAPHY_POINTS;
use crate::pipeline::types::{AlignmentMethod, AlignmentStatus};
use serde::{Deserialize, Serialize};

/// Raw evidence gathered by a strategy before classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum MatchStatistics {
    FiducialMarks {
        /// Marks in the selected rotation attempt
        marks_detected: usize,
        expected_marks: usize,
        /// Mark pairs used for estimation
        matched_marks: usize,
    },
    AutomaticFeatureMatch {
        captured_keypoints: usize,
        reference_keypoints: usize,
        retained_matches: usize,
    },
}

impl MatchStatistics {
    pub fn method(&self) -> AlignmentMethod {
        match self {
            MatchStatistics::FiducialMarks { .. } => AlignmentMethod::FiducialMarks,
            MatchStatistics::AutomaticFeatureMatch { .. } => AlignmentMethod::AutomaticFeatureMatch,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub status: AlignmentStatus,
    pub fully_aligned: bool,
    pub failure_reason: Option<String>,
}

impl Classification {
    fn failed(reason: impl Into<String>) -> Self {
        Self {
            status: AlignmentStatus::Failed,
            fully_aligned: false,
            failure_reason: Some(reason.into()),
        }
    }
}

/// Turns match statistics into Success, PartialSuccess or Failed.
///
/// Classification is terminal; nothing at this layer retries.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlignmentOutcomeClassifier;

impl AlignmentOutcomeClassifier {
    /// Failure that is already certain before any homography is attempted
    pub fn precheck(&self, stats: &MatchStatistics) -> Option<Classification> {
        match *stats {
            MatchStatistics::FiducialMarks {
                marks_detected,
                matched_marks,
                ..
            } => {
                if marks_detected == 0 {
                    Some(Classification::failed(
                        "no alignment marks detected at any candidate rotation",
                    ))
                } else if matched_marks == 0 {
                    Some(Classification::failed(
                        "no detected mark matched a reference mark",
                    ))
                } else {
                    None
                }
            }
            MatchStatistics::AutomaticFeatureMatch {
                captured_keypoints,
                reference_keypoints,
                retained_matches,
            } => {
                if captured_keypoints == 0 || reference_keypoints == 0 {
                    Some(Classification::failed(format!(
                        "no keypoints found (captured: {}, reference: {})",
                        captured_keypoints, reference_keypoints
                    )))
                } else if retained_matches < MIN_HOMOGRAPHY_POINTS {
                    Some(Classification::failed(format!(
                        "only {} feature matches retained, at least {} required",
                        retained_matches, MIN_HOMOGRAPHY_POINTS
                    )))
                } else {
                    None
                }
            }
        }
    }

    pub fn classify(&self, stats: &MatchStatistics, homography_valid: bool) -> Classification {
        if let Some(failed) = self.precheck(stats) {
            return failed;
        }

        if !homography_valid {
            return Classification::failed("homography estimation was degenerate");
        }

        match *stats {
            MatchStatistics::FiducialMarks {
                marks_detected,
                expected_marks,
                ..
            } if marks_detected == expected_marks => Classification {
                status: AlignmentStatus::Success,
                fully_aligned: true,
                failure_reason: None,
            },
            MatchStatistics::FiducialMarks { .. } => Classification {
                status: AlignmentStatus::PartialSuccess,
                fully_aligned: false,
                failure_reason: None,
            },
            MatchStatistics::AutomaticFeatureMatch { .. } => Classification {
                status: AlignmentStatus::Success,
                fully_aligned: true,
                failure_reason: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fiducial(detected: usize, expected: usize, matched: usize) -> MatchStatistics {
        MatchStatistics::FiducialMarks {
            marks_detected: detected,
            expected_marks: expected,
            matched_marks: matched,
        }
    }

    #[test]
    fn test_full_fiducial_count_is_success() {
        let outcome = AlignmentOutcomeClassifier.classify(&fiducial(16, 16, 16), true);
        assert_eq!(outcome.status, AlignmentStatus::Success);
        assert!(outcome.fully_aligned);
        assert!(outcome.failure_reason.is_none());
    }

    #[test]
    fn test_short_fiducial_count_is_partial() {
        let outcome = AlignmentOutcomeClassifier.classify(&fiducial(10, 16, 9), true);
        assert_eq!(outcome.status, AlignmentStatus::PartialSuccess);
        assert!(!outcome.fully_aligned);
        assert_eq!(outcome.status.to_string(), "warning");
    }

    #[test]
    fn test_surplus_fiducials_are_partial() {
        let outcome = AlignmentOutcomeClassifier.classify(&fiducial(18, 16, 16), true);
        assert_eq!(outcome.status, AlignmentStatus::PartialSuccess);
    }

    #[test]
    fn test_no_marks_fails_before_homography() {
        let stats = fiducial(0, 16, 0);
        assert!(AlignmentOutcomeClassifier.precheck(&stats).is_some());
        let outcome = AlignmentOutcomeClassifier.classify(&stats, true);
        assert_eq!(outcome.status, AlignmentStatus::Failed);
    }

    #[test]
    fn test_marks_without_matches_fail() {
        let outcome = AlignmentOutcomeClassifier.classify(&fiducial(5, 16, 0), true);
        assert_eq!(outcome.status, AlignmentStatus::Failed);
    }

    #[test]
    fn test_degenerate_homography_fails() {
        let outcome = AlignmentOutcomeClassifier.classify(&fiducial(16, 16, 16), false);
        assert_eq!(outcome.status, AlignmentStatus::Failed);
        assert!(!outcome.fully_aligned);
        assert!(outcome.failure_reason.unwrap().contains("degenerate"));
    }

    #[test]
    fn test_feature_match_outcomes() {
        let good = MatchStatistics::AutomaticFeatureMatch {
            captured_keypoints: 480,
            reference_keypoints: 500,
            retained_matches: 96,
        };
        assert_eq!(good.method(), AlignmentMethod::AutomaticFeatureMatch);
        assert_eq!(
            AlignmentOutcomeClassifier.classify(&good, true).status,
            AlignmentStatus::Success
        );

        let blank = MatchStatistics::AutomaticFeatureMatch {
            captured_keypoints: 0,
            reference_keypoints: 500,
            retained_matches: 0,
        };
        assert_eq!(
            AlignmentOutcomeClassifier.classify(&blank, true).status,
            AlignmentStatus::Failed
        );

        let sparse = MatchStatistics::AutomaticFeatureMatch {
            captured_keypoints: 12,
            reference_keypoints: 500,
            retained_matches: 2,
        };
        assert!(AlignmentOutcomeClassifier.precheck(&sparse).is_some());
    }
}
