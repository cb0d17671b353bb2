use crate::algorithms::classifier::MatchStatistics;
use crate::config::FeatureMatchConfig;
use crate::pipeline::engine::PreparedReference;
use crate::pipeline::traits::{AlignmentStrategy, ProgressObserver, StrategyReport};
use crate::pipeline::types::{AlignmentMethod, Point2};
use crate::utils::grayimage_to_mat;
use crate::Result;
use image::GrayImage;
use opencv::core::{no_array, DMatch, KeyPoint, Mat, Vector};
use opencv::features2d::{BFMatcher, ORB_ScoreType, ORB};
use opencv::prelude::*;
use std::borrow::Cow;

/// ORB keypoints and binary descriptors, detached from OpenCV so they can be
/// shared across threads
#[derive(Debug, Clone, Default)]
pub struct FeatureSet {
    pub keypoints: Vec<Point2>,
    descriptor_rows: i32,
    descriptor_cols: i32,
    descriptors: Vec<u8>,
}

impl FeatureSet {
    pub fn len(&self) -> usize {
        self.keypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keypoints.is_empty() || self.descriptor_rows == 0
    }

    fn from_opencv(keypoints: &Vector<KeyPoint>, descriptors: &Mat) -> Result<Self> {
        let points = keypoints.iter().map(|kp| Point2::from(kp.pt())).collect();

        if descriptors.empty() {
            return Ok(Self {
                keypoints: points,
                ..Self::default()
            });
        }

        let rows = descriptors.rows();
        let cols = descriptors.cols();
        let data = if descriptors.is_continuous() {
            descriptors.data_bytes()?.to_vec()
        } else {
            let mut data = Vec::with_capacity((rows * cols) as usize);
            for r in 0..rows {
                for c in 0..cols {
                    data.push(*descriptors.at_2d::<u8>(r, c)?);
                }
            }
            data
        };

        Ok(Self {
            keypoints: points,
            descriptor_rows: rows,
            descriptor_cols: cols,
            descriptors: data,
        })
    }

    fn descriptor_mat(&self) -> Result<Mat> {
        let mut mat = Mat::zeros(self.descriptor_rows, self.descriptor_cols, opencv::core::CV_8UC1)?.to_mat()?;
        mat.data_bytes_mut()?.copy_from_slice(&self.descriptors);
        Ok(mat)
    }
}

/// A retained descriptor match, captured side first
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureCorrespondence {
    pub captured: Point2,
    pub reference: Point2,
    pub distance: f32,
}

#[derive(Debug, Clone)]
pub struct FeatureMatchResult {
    pub captured_keypoints: usize,
    pub reference_keypoints: usize,
    pub total_matches: usize,
    /// Best matches by Hamming distance, ascending
    pub retained: Vec<FeatureCorrespondence>,
}

/// Rotation-invariant registration through ORB keypoints.
///
/// OpenCV detector and matcher objects are created per call; only plain
/// configuration is stored, which keeps the aligner `Send + Sync`.
#[derive(Debug, Clone, Default)]
pub struct FeatureMatchAligner {
    config: FeatureMatchConfig,
}

impl FeatureMatchAligner {
    pub fn new(config: FeatureMatchConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FeatureMatchConfig {
        &self.config
    }

    pub fn extract(&self, image: &GrayImage) -> Result<FeatureSet> {
        let mat = grayimage_to_mat(image)?;
        let mut detector = ORB::create(
            self.config.max_features,
            self.config.scale_factor,
            self.config.n_levels,
            self.config.edge_threshold,
            0,
            2,
            ORB_ScoreType::HARRIS_SCORE,
            self.config.patch_size,
            self.config.fast_threshold,
        )?;

        let mut keypoints = Vector::<KeyPoint>::new();
        let mut descriptors = Mat::default();
        detector.detect_and_compute(&mat, &no_array(), &mut keypoints, &mut descriptors, false)?;

        FeatureSet::from_opencv(&keypoints, &descriptors)
    }

    /// Brute-force Hamming matching, keeping the best `match_keep_percent`
    pub fn match_features(&self, captured: &FeatureSet, reference: &FeatureSet) -> Result<FeatureMatchResult> {
        let mut result = FeatureMatchResult {
            captured_keypoints: captured.len(),
            reference_keypoints: reference.len(),
            total_matches: 0,
            retained: Vec::new(),
        };

        if captured.is_empty() || reference.is_empty() {
            return Ok(result);
        }

        let query = captured.descriptor_mat()?;
        let train = reference.descriptor_mat()?;

        let matcher = BFMatcher::create(opencv::core::NORM_HAMMING, false)?;
        let mut matches = Vector::<DMatch>::new();
        matcher.train_match(&query, &train, &mut matches, &no_array())?;

        let mut matches = matches.to_vec();
        matches.sort_by(|a, b| a.distance.total_cmp(&b.distance));

        result.total_matches = matches.len();
        let keep = retained_count(matches.len(), self.config.match_keep_percent);

        result.retained = matches
            .iter()
            .take(keep)
            .filter_map(|m| {
                let captured_point = captured.keypoints.get(m.query_idx as usize)?;
                let reference_point = reference.keypoints.get(m.train_idx as usize)?;
                Some(FeatureCorrespondence {
                    captured: *captured_point,
                    reference: *reference_point,
                    distance: m.distance,
                })
            })
            .collect();

        Ok(result)
    }
}

/// Number of matches kept: the fraction is truncated, never rounded up
pub fn retained_count(total: usize, keep_percent: f64) -> usize {
    ((total as f64 * keep_percent.clamp(0.0, 1.0)).floor() as usize).min(total)
}

impl AlignmentStrategy for FeatureMatchAligner {
    fn method(&self) -> AlignmentMethod {
        AlignmentMethod::AutomaticFeatureMatch
    }

    fn correspond(
        &self,
        reference: &PreparedReference,
        captured: &GrayImage,
        _observer: &dyn ProgressObserver,
    ) -> Result<StrategyReport> {
        let captured_features = self.extract(captured)?;
        let reference_features = match reference.features() {
            Some(features) => Cow::Borrowed(features),
            None => Cow::Owned(self.extract(reference.image())?),
        };

        let matched = self.match_features(&captured_features, &reference_features)?;
        tracing::debug!(
            captured_keypoints = matched.captured_keypoints,
            reference_keypoints = matched.reference_keypoints,
            total_matches = matched.total_matches,
            retained = matched.retained.len(),
            "ORB matching completed"
        );

        let statistics = MatchStatistics::AutomaticFeatureMatch {
            captured_keypoints: matched.captured_keypoints,
            reference_keypoints: matched.reference_keypoints,
            retained_matches: matched.retained.len(),
        };

        let (source_points, target_points) = matched
            .retained
            .iter()
            .map(|m| (m.captured, m.reference))
            .unzip();

        Ok(StrategyReport {
            statistics,
            working_image: captured.clone(),
            source_points,
            target_points,
            accepted_rotation_angle: None,
            rotation_attempts: Vec::new(),
            correspondence: None,
        })
    }
}
