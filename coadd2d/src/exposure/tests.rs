use std::path::PathBuf;

use super::*;
use crate::combine::{Combiner, ReduxMode};
use crate::error::Error;
use crate::testing::{synthetic_exposure, MemorySource, SceneConfig};

fn det1() -> DetectorId {
    DetectorId::new(1)
}

fn two_frame_source() -> (MemorySource, Vec<PathBuf>) {
    let cfg = SceneConfig::default();
    let source = MemorySource::with_scene(
        &cfg,
        &[det1()],
        &[
            ("Science/spec2d_a-J0706_LRISb.fits", 0.0),
            ("Science/spec2d_b-J0706_LRISb.fits", 2.0),
        ],
    );
    let files = vec![
        PathBuf::from("Science/spec2d_a-J0706_LRISb.fits"),
        PathBuf::from("Science/spec2d_b-J0706_LRISb.fits"),
    ];
    (source, files)
}

// ----------------------------------------------------------------------------
// Paths
// ----------------------------------------------------------------------------

#[test]
fn test_spec1d_path_replaces_file_name_only() {
    let path = spec1d_path(Path::new("spec2d_dir/spec2d_a-J0706_LRISb.fits"));
    assert_eq!(path, PathBuf::from("spec2d_dir/spec1d_a-J0706_LRISb.fits"));
}

#[test]
fn test_extension_names() {
    assert_eq!(extension_name(DetectorId::new(2), "SKY"), "DET02-SKY");
    assert_eq!(spec1d_table_name(123, DetectorId::new(1)), "SPAT0123-DET01");
}

// ----------------------------------------------------------------------------
// Loader
// ----------------------------------------------------------------------------

#[test]
fn test_load_keeps_file_order_and_traces() {
    let (source, files) = two_frame_source();
    let (stack, keys) = StackLoader::new(&source).load(&files, det1()).unwrap();

    assert_eq!(stack.len(), 2);
    assert_eq!(stack.det(), det1());
    assert_eq!(stack.shape(), Some((60, 200)));
    assert_eq!(stack.exposures()[1].path, files[1]);
    assert_eq!(stack.exposures()[0].traces.len(), 1);
    let pos = stack.exposures()[1].traces[0].mean_position().unwrap();
    assert!((pos - 32.0).abs() < 1e-12);

    assert_eq!(keys.master_key, "A_1_01");
    assert_eq!(keys.master_dir, "Masters");
}

#[test]
fn test_load_empty_list_is_insufficient() {
    let (source, _) = two_frame_source();
    let err = StackLoader::new(&source).load(&[], det1()).unwrap_err();
    assert!(matches!(err, Error::InsufficientData { .. }));
}

#[test]
fn test_missing_spec2d_is_missing_file() {
    let (source, mut files) = two_frame_source();
    files.push(PathBuf::from("Science/spec2d_c-J0706_LRISb.fits"));

    let err = StackLoader::new(&source).load(&files, det1()).unwrap_err();
    match err {
        Error::MissingFile { path, det } => {
            assert_eq!(path, files[2]);
            assert_eq!(det, Some(det1()));
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[test]
fn test_missing_spec1d_is_missing_file() {
    let (mut source, files) = two_frame_source();
    let spec1d = spec1d_path(&files[1]);
    source.remove_file(&spec1d);

    let err = StackLoader::new(&source).load(&files, det1()).unwrap_err();
    match err {
        Error::MissingFile { path, .. } => assert_eq!(path, spec1d),
        other => panic!("unexpected error: {}", other),
    }
}

#[test]
fn test_missing_detector_is_inconsistent() {
    let (source, files) = two_frame_source();
    let err = StackLoader::new(&source)
        .load(&files, DetectorId::new(2))
        .unwrap_err();
    assert!(matches!(err, Error::DataConsistency { .. }));
}

#[test]
fn test_shape_mismatch_between_exposures() {
    let (mut source, files) = two_frame_source();
    let small = SceneConfig {
        nspec: 150,
        ..SceneConfig::default()
    };
    let exposure = synthetic_exposure(&small, 0.0, &files[1]);
    source.add(&files[1], det1(), exposure, small.header());

    let err = StackLoader::new(&source).load(&files, det1()).unwrap_err();
    match err {
        Error::DataConsistency { path, reason, .. } => {
            assert_eq!(path, files[1]);
            assert!(reason.contains("differs"));
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[test]
fn test_product_shape_mismatch_within_exposure() {
    let (mut source, files) = two_frame_source();
    let exposure = source.exposure_mut(&files[0], det1()).unwrap();
    exposure.waveimg = Buffer2::new_filled(60, 199, 5000.0);

    let err = StackLoader::new(&source).load(&files, det1()).unwrap_err();
    match err {
        Error::DataConsistency { reason, .. } => assert!(reason.contains("waveimg")),
        other => panic!("unexpected error: {}", other),
    }
}

#[test]
fn test_invalid_ivar_is_masked_not_rejected() {
    let (mut source, files) = two_frame_source();
    let exposure = source.exposure_mut(&files[0], det1()).unwrap();
    exposure.ivar[5] = -1.0;
    exposure.ivar[6] = f64::NAN;
    exposure.sciimg[7] = f64::INFINITY;

    let (stack, _) = StackLoader::new(&source).load(&files, det1()).unwrap();
    let first = &stack.exposures()[0];
    for idx in 5..8 {
        assert!(first.mask.get(idx));
        assert_eq!(first.ivar[idx], 0.0);
        assert!(!first.is_good(idx));
    }
    assert!(first.is_good(8));
    assert_eq!(first.mask.count_ones(), 3);
}

#[test]
fn test_non_finite_models_are_masked() {
    let (mut source, files) = two_frame_source();
    let exposure = source.exposure_mut(&files[1], det1()).unwrap();
    exposure.skymodel[(5, 50)] = f64::NAN;
    exposure.objmodel[(6, 50)] = f64::NEG_INFINITY;

    let (stack, _) = StackLoader::new(&source).load(&files, det1()).unwrap();
    let second = &stack.exposures()[1];
    for x in [5, 6] {
        let idx = second.sciimg.index_of(x, 50);
        assert!(second.mask.get(idx));
        assert_eq!(second.ivar[idx], 0.0);
    }
    assert_eq!(second.mask.count_ones(), 2);

    let frame = Combiner::default().combine(&stack, ReduxMode::Standard).unwrap();
    assert!(frame.sciimg.pixels().iter().all(|v| v.is_finite()));
    assert!(frame.skymodel.pixels().iter().all(|v| v.is_finite()));
    assert!(frame.objmodel.pixels().iter().all(|v| v.is_finite()));
}

#[test]
fn test_mixed_skysub_modes_still_load() {
    let (mut source, files) = two_frame_source();
    source.exposure_mut(&files[1], det1()).unwrap().meta.skysub = Some("DIFF".to_string());

    let (stack, _) = StackLoader::new(&source).load(&files, det1()).unwrap();
    assert_eq!(stack.exposures().len(), 2);
    assert_eq!(
        loader::skysub_mismatches(stack.exposures()),
        vec![files[1].as_path()]
    );
}

#[test]
fn test_matching_skysub_modes() {
    let (mut source, files) = two_frame_source();
    source.exposure_mut(&files[0], det1()).unwrap().meta.skysub = Some("global".to_string());
    source.exposure_mut(&files[1], det1()).unwrap().meta.skysub = None;

    let (stack, _) = StackLoader::new(&source).load(&files, det1()).unwrap();
    assert!(loader::skysub_mismatches(stack.exposures()).is_empty());
}

// ----------------------------------------------------------------------------
// Metadata
// ----------------------------------------------------------------------------

#[test]
fn test_meta_from_header() {
    let meta = ExposureMeta::from_header(&SceneConfig::default().header());
    assert_eq!(meta.skysub.as_deref(), Some("GLOBAL"));
    assert_eq!(meta.master_key.as_deref(), Some("A_1_01"));
    assert_eq!(meta.mjd, Some(57783.269661));
    assert!((meta.ra_deg.unwrap() - 106.597_708_333).abs() < 1e-8);
    assert_eq!(meta.target.as_deref(), Some("J0706+3020"));
}

#[test]
fn test_trace_brightness_ignores_bad_samples() {
    let trace = Spec1dTrace {
        name: "SPAT0010-DET01".to_string(),
        trace_spat: vec![10.0, f64::NAN, 12.0],
        counts: vec![5.0, -3.0, 7.0],
        counts_ivar: vec![1.0, 1.0, 0.0],
    };
    assert_eq!(trace.brightness(), 5.0);
    assert_eq!(trace.mean_position(), Some(11.0));
}
