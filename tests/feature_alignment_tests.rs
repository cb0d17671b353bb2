mod common;

use common::*;
use form_alignment::algorithms::{rotate_image, FeatureMatchAligner};
use form_alignment::*;
use tempfile::TempDir;

fn prepared_reference() -> PreparedReference {
    AlignmentEngine::default()
        .prepare_reference(ReferenceFormSpec::feature_match(reference_form()))
        .unwrap()
}

#[test]
fn test_reference_keypoints_respect_budget() {
    let reference = prepared_reference();
    let features = reference.features().unwrap();
    assert!(!features.is_empty());
    assert!(features.len() <= AlignmentConfig::default().features.max_features as usize);
}

#[test]
fn test_feature_match_aligns_rotated_capture() {
    let dir = TempDir::new().unwrap();
    let reference = prepared_reference();
    let captured = rotate_image(reference.image(), 2.0).unwrap();

    let result = AlignmentEngine::default()
        .align(&reference, &captured, dir.path())
        .unwrap();

    assert_eq!(result.method, AlignmentMethod::AutomaticFeatureMatch);
    assert_eq!(result.status, AlignmentStatus::Success);
    assert!(result.fully_aligned);
    // No rotation search in this mode
    assert!(result.accepted_rotation_angle.is_none());
    assert!(result.rotation_attempts.is_empty());
    assert!(result.matched_points >= 4);

    for path in [
        &result.matches_image_path,
        &result.aligned_image_path,
        &result.overlaid_image_path,
    ] {
        assert!(path.as_ref().unwrap().exists());
    }

    let aligned = image::open(result.aligned_image_path.as_ref().unwrap())
        .unwrap()
        .to_luma8();
    assert_eq!(aligned.dimensions(), reference.image().dimensions());
}

#[test]
fn test_blank_capture_has_no_keypoints() {
    let dir = TempDir::new().unwrap();
    let reference = prepared_reference();

    let result = AlignmentEngine::default()
        .align(&reference, &blank_page(), dir.path())
        .unwrap();

    assert_eq!(result.status, AlignmentStatus::Failed);
    assert!(result.aligned_image_path.is_none());
    assert!(result.failure_reason.unwrap().contains("keypoints"));
}

#[test]
fn test_retained_matches_are_best_fifth() {
    let aligner = FeatureMatchAligner::default();
    let form = reference_form();
    let reference = aligner.extract(&form).unwrap();
    let captured = aligner.extract(&rotate_image(&form, 1.0).unwrap()).unwrap();

    let matched = aligner.match_features(&captured, &reference).unwrap();
    assert_eq!(matched.total_matches, captured.len());
    assert_eq!(matched.retained.len(), matched.total_matches / 5);
    assert!(matched
        .retained
        .windows(2)
        .all(|pair| pair[0].distance <= pair[1].distance));
}
