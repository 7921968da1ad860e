use super::*;

fn lines(text: &str) -> Vec<String> {
    text.lines().map(str::to_string).collect()
}

// ---------------------------------------------------------------------------
// Defaults and validation
// ---------------------------------------------------------------------------

#[test]
fn test_defaults_are_valid() {
    let config = CoaddConfig::default();
    config.validate().unwrap();
    assert_eq!(config.detnum, DetectorSelection::All);
    assert_eq!(config.velocity, VelocityFrame::Heliocentric);
    assert!((config.combine.samp_fact - 1.0).abs() < f64::EPSILON);
    assert!(config.combine.offsets.is_none());
}

#[test]
fn test_validate_rejects_non_positive_sampling() {
    let mut config = CoaddConfig::default();
    config.combine.samp_fact = 0.0;
    assert!(matches!(config.validate(), Err(Error::Configuration(_))));

    let mut config = CoaddConfig::default();
    config.extraction.trace_chunk = 0;
    assert!(config.validate().is_err());
}

// ---------------------------------------------------------------------------
// Merging configuration lines
// ---------------------------------------------------------------------------

#[test]
fn test_merge_sections_and_subsections() {
    let cfg = lines(
        "[rdx]\n  spectrograph = keck_lris_blue\n  detnum = 2\n\
         [coadd2d]\n  samp_fact = 2.5\n  wave_method = log10\n\
         [reduce]\n  [[findobj]]\n    sig_thresh = 4.0\n    max_objects = 3\n\
         [[skysub]]\n    sky_order = 2\n\
         [wavelengths]\n  refframe = barycentric\n",
    );
    let merged = CoaddConfig::default().merged_with(&cfg).unwrap();

    assert_eq!(merged.detnum, DetectorSelection::Single(2));
    assert!((merged.combine.samp_fact - 2.5).abs() < 1e-12);
    assert_eq!(merged.combine.wave_method, WaveGridMethod::Log10);
    assert!((merged.extraction.sig_thresh - 4.0).abs() < 1e-12);
    assert_eq!(merged.extraction.max_objects, 3);
    assert_eq!(merged.extraction.sky_order, 2);
    assert_eq!(merged.velocity, VelocityFrame::Barycentric);
}

#[test]
fn test_merge_keeps_untouched_defaults() {
    let base = CoaddConfig {
        extraction: ExtractionConfig {
            fwhm: 4.5,
            ..Default::default()
        },
        ..Default::default()
    };
    let merged = base.merged_with(&lines("[coadd2d]\nmax_shift = 5")).unwrap();
    assert!((merged.extraction.fwhm - 4.5).abs() < 1e-12);
    assert_eq!(merged.combine.max_shift, 5);
}

#[test]
fn test_merge_detnum_all_over_single() {
    let base = CoaddConfig {
        detnum: DetectorSelection::Single(3),
        ..Default::default()
    };
    let merged = base.merged_with(&lines("[rdx]\ndetnum = all")).unwrap();
    assert_eq!(merged.detnum, DetectorSelection::All);
}

#[test]
fn test_merge_offsets_list_and_none() {
    let merged = CoaddConfig::default()
        .merged_with(&lines("[coadd2d]\noffsets = 0.0, -5.5, 3"))
        .unwrap();
    assert_eq!(merged.combine.offsets, Some(vec![0.0, -5.5, 3.0]));

    let cleared = merged
        .merged_with(&lines("[coadd2d]\noffsets = None"))
        .unwrap();
    assert!(cleared.combine.offsets.is_none());
}

#[test]
fn test_unknown_keys_are_ignored() {
    let merged = CoaddConfig::default()
        .merged_with(&lines(
            "[coadd2d]\nno_such_key = 1\n[calibrations]\nbias = x\n# comment\n",
        ))
        .unwrap();
    assert_eq!(merged, CoaddConfig::default());
}

#[test]
fn test_bad_values_are_configuration_errors() {
    let err = CoaddConfig::default()
        .merged_with(&lines("[coadd2d]\nsamp_fact = fast"))
        .unwrap_err();
    assert!(matches!(err, Error::Configuration(_)));

    let err = CoaddConfig::default()
        .merged_with(&lines("[coadd2d]\nsamp_fact = -1"))
        .unwrap_err();
    assert!(err.to_string().contains("samp_fact"));

    let err = CoaddConfig::default()
        .merged_with(&lines("[rdx]\ndetnum = 0"))
        .unwrap_err();
    assert!(matches!(err, Error::Configuration(_)));
}

#[test]
fn test_missing_equals_is_an_error() {
    let err = CoaddConfig::default()
        .merged_with(&lines("[coadd2d]\nsamp_fact"))
        .unwrap_err();
    assert!(err.to_string().contains("line 2"));
}

#[test]
fn test_refframe_observed_alias() {
    let merged = CoaddConfig::default()
        .merged_with(&lines("[wavelengths]\nrefframe = 'observed'"))
        .unwrap();
    assert_eq!(merged.velocity, VelocityFrame::None);
    assert_eq!(VelocityFrame::Barycentric.to_string(), "barycentric");
}
