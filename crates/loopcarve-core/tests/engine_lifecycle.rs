use approx::assert_relative_eq;
use loopcarve_core::{
    DecoderEngine, ExportError, ExportMode, ExportOptions, LoopDecoder, OutputKind, OutputTarget,
    PlanarBuffer, PreviewSession, ReportFormat, SyntheticEngine, export_container,
    fixtures::demo_loop,
};

fn options(mode: ExportMode) -> ExportOptions {
    ExportOptions {
        mode,
        chunk_frames: 8_192,
        ..ExportOptions::default()
    }
}

#[test]
fn every_opened_loop_is_closed_after_export() {
    let temp = tempfile::tempdir().expect("tempdir should work");
    let container = demo_loop().to_container().expect("loop should serialize");
    let engine = SyntheticEngine::new();

    for (name, mode) in [
        ("slices", ExportMode::Slices),
        ("loop", ExportMode::Loop),
        ("ot", ExportMode::LoopWithOt),
    ] {
        let target = OutputTarget::new(temp.path().join(name));
        export_container(&engine, &container, &target, &options(mode))
            .expect("export should succeed");
    }

    let counts = engine.counts();
    assert_eq!(counts.opened, 3);
    assert_eq!(counts.closed, 3);
    assert_eq!(counts.previews_started, 2);
    assert_eq!(counts.previews_stopped, 2);
}

#[test]
fn slice_render_failure_skips_only_that_slice() {
    let temp = tempfile::tempdir().expect("tempdir should work");
    let mut loop_desc = demo_loop();
    loop_desc.faults.render_slice = vec![2];
    let container = loop_desc.to_container().expect("loop should serialize");
    let engine = SyntheticEngine::new();
    let target = OutputTarget::new(temp.path().join("amen"));

    let outcome = export_container(&engine, &container, &target, &options(ExportMode::Slices))
        .expect("recoverable failure should not abort");

    assert_eq!(outcome.skipped_slices, vec![2]);
    assert_eq!(outcome.written_of(OutputKind::SliceWav).len(), 3);
    assert!(!target.slice_wav(2).exists());
    assert!(target.slice_wav(3).is_file());
    assert_eq!(outcome.written_of(OutputKind::Report).len(), 1);

    // A failed render does not remove the slice from the timeline.
    assert_eq!(outcome.report.rows.len(), 4);
    assert_eq!(outcome.report.rows[2].frame_offset, 11_025 + 22_050);
    assert_relative_eq!(outcome.report.rows[3].running_total_seconds, 1.0, epsilon = 1e-9);
    assert_eq!(outcome.report.total.frames, 49_612);
}

#[test]
fn preview_failure_stops_preview_and_keeps_auxiliary_outputs() {
    let temp = tempfile::tempdir().expect("tempdir should work");
    let mut loop_desc = demo_loop();
    loop_desc.faults.preview_chunk = Some(2);
    let container = loop_desc.to_container().expect("loop should serialize");
    let engine = SyntheticEngine::new();
    let target = OutputTarget::new(temp.path().join("amen"));

    let outcome = export_container(&engine, &container, &target, &options(ExportMode::LoopWithOt))
        .expect("render failure should not abort");

    assert!(!target.loop_wav().exists());
    assert!(target.ot().is_file());
    assert_eq!(outcome.written_of(OutputKind::Report).len(), 1);
    assert_eq!(outcome.warnings.len(), 1);

    let counts = engine.counts();
    assert_eq!(counts.previews_started, 1);
    assert_eq!(counts.previews_stopped, 1);
    assert_eq!(counts.closed, 1);
}

#[test]
fn slice_info_failure_removes_slice_from_timeline() {
    let temp = tempfile::tempdir().expect("tempdir should work");
    let mut loop_desc = demo_loop();
    loop_desc.faults.slice_info = vec![1];
    let container = loop_desc.to_container().expect("loop should serialize");
    let engine = SyntheticEngine::new();
    let target = OutputTarget::new(temp.path().join("amen"));

    let outcome = export_container(&engine, &container, &target, &options(ExportMode::Slices))
        .expect("slice info failure should not abort");

    assert_eq!(outcome.skipped_slices, vec![1]);
    assert_eq!(outcome.report.rows.len(), 3);
    assert_eq!(outcome.report.total.frames, 11_025 + 11_025 + 5_512);
    assert_eq!(outcome.report.rows[1].frame_offset, 11_025);
}

#[test]
fn loop_info_failure_is_fatal_but_still_closes_the_loop() {
    let temp = tempfile::tempdir().expect("tempdir should work");
    let mut loop_desc = demo_loop();
    loop_desc.faults.loop_info = true;
    let container = loop_desc.to_container().expect("loop should serialize");
    let engine = SyntheticEngine::new();
    let target = OutputTarget::new(temp.path().join("nested/amen"));

    let result = export_container(&engine, &container, &target, &options(ExportMode::Slices));

    assert!(matches!(result, Err(ExportError::LoopInfo(_))));
    assert!(!temp.path().join("nested").exists());
    assert_eq!(engine.counts().opened, 1);
    assert_eq!(engine.counts().closed, 1);
    assert!(!target.report(ReportFormat::Csv).exists());
}

#[test]
fn unsupported_channel_count_is_rejected_before_rendering() {
    let temp = tempfile::tempdir().expect("tempdir should work");
    let mut loop_desc = demo_loop();
    loop_desc.channels = 6;
    let container = loop_desc.to_container().expect("loop should serialize");
    let engine = SyntheticEngine::new();
    let target = OutputTarget::new(temp.path().join("amen"));

    let result = export_container(&engine, &container, &target, &options(ExportMode::Loop));

    assert!(matches!(result, Err(ExportError::InvalidLoop(_))));
    assert_eq!(engine.counts().previews_started, 0);
    assert_eq!(engine.counts().closed, 1);
}

#[test]
fn garbage_container_is_an_open_error() {
    let temp = tempfile::tempdir().expect("tempdir should work");
    let engine = SyntheticEngine::new();
    let target = OutputTarget::new(temp.path().join("fresh/sub/amen"));

    let result = export_container(&engine, b"not a loop", &target, &options(ExportMode::Slices));

    assert!(matches!(result, Err(ExportError::Open(_))));
    assert_eq!(engine.counts().opened, 0);
    assert!(!temp.path().join("fresh").exists(), "no output directory on open failure");
}

#[test]
fn dropping_a_preview_session_stops_the_preview() {
    let container = demo_loop().to_container().expect("loop should serialize");
    let engine = SyntheticEngine::new();
    let mut decoder = engine.open(&container).expect("demo loop should open");

    {
        let mut session = PreviewSession::start(&mut decoder).expect("preview should start");
        let mut chunk = PlanarBuffer::new(2, 1_024).expect("stereo buffer");
        session.render_chunk(&mut chunk).expect("chunk should render");
    }

    assert_eq!(engine.counts().previews_stopped, 1);
    assert!(decoder.stop_preview().is_err(), "preview already stopped");
}
