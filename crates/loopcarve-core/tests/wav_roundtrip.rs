use loopcarve_core::{
    DecoderEngine, ExportMode, ExportOptions, LoopDecoder, OutputTarget, PcmBuffer, PlanarBuffer,
    SyntheticEngine, export_container,
    fixtures::{demo_loop, uniform_loop},
    wav::write_wav_file,
};

fn read_wav(path: &std::path::Path) -> (hound::WavSpec, Vec<i16>) {
    let mut reader = hound::WavReader::open(path).expect("hound should parse our wav");
    let format = reader.spec();
    let samples = reader
        .samples::<i16>()
        .collect::<Result<Vec<_>, _>>()
        .expect("samples should decode");
    (format, samples)
}

#[test]
fn independent_decoder_recovers_exact_pcm() {
    let temp = tempfile::tempdir().expect("tempdir should work");
    let path = temp.path().join("ramp.wav");
    let samples: Vec<i16> = (-64..64).map(|value| value * 511).collect();
    let pcm = PcmBuffer::from_interleaved(samples.clone(), 2).expect("even sample count");

    write_wav_file(&path, &pcm, 22_050).expect("wav should be written");

    let (format, decoded) = read_wav(&path);
    assert_eq!(format.channels, 2);
    assert_eq!(format.sample_rate, 22_050);
    assert_eq!(format.bits_per_sample, 16);
    assert_eq!(format.sample_format, hound::SampleFormat::Int);
    assert_eq!(decoded, samples);
}

#[test]
fn zero_length_mono_slice_is_a_bare_header() {
    let temp = tempfile::tempdir().expect("tempdir should work");
    let mut loop_desc = uniform_loop(2, 480);
    loop_desc.slices[1].frames = 0;
    let container = loop_desc.to_container().expect("loop should serialize");
    let target = OutputTarget::new(temp.path().join("blip"));
    let engine = SyntheticEngine::new();

    let outcome = export_container(&engine, &container, &target, &ExportOptions::default())
        .expect("export should succeed");

    assert!(outcome.is_clean());
    let empty = target.slice_wav(1);
    assert_eq!(
        std::fs::metadata(&empty).expect("empty slice wav exists").len(),
        44
    );
    let (format, samples) = read_wav(&empty);
    assert_eq!(format.channels, 1);
    assert!(samples.is_empty());
}

#[test]
fn whole_loop_equals_slices_back_to_back() {
    let temp = tempfile::tempdir().expect("tempdir should work");
    let container = demo_loop().to_container().expect("loop should serialize");
    let engine = SyntheticEngine::new();

    let slices_target = OutputTarget::new(temp.path().join("slices/amen"));
    export_container(&engine, &container, &slices_target, &ExportOptions::default())
        .expect("slice export should succeed");
    let loop_target = OutputTarget::new(temp.path().join("loop/amen"));
    let options = ExportOptions {
        mode: ExportMode::Loop,
        chunk_frames: 10_000,
        ..ExportOptions::default()
    };
    export_container(&engine, &container, &loop_target, &options)
        .expect("loop export should succeed");

    let mut concatenated = Vec::new();
    for index in 0..4 {
        let (_, samples) = read_wav(&slices_target.slice_wav(index));
        concatenated.extend(samples);
    }
    let (format, whole) = read_wav(&loop_target.loop_wav());

    assert_eq!(format.sample_rate, 44_100);
    assert_eq!(whole.len(), 49_612 * 2);
    assert_eq!(whole, concatenated);
}

#[test]
fn rendered_slice_survives_conversion_and_encoding() {
    let temp = tempfile::tempdir().expect("tempdir should work");
    let container = demo_loop().to_container().expect("loop should serialize");
    let engine = SyntheticEngine::new();
    let mut decoder = engine.open(&container).expect("demo loop should open");

    let mut planar = PlanarBuffer::new(2, 5_512).expect("stereo buffer");
    decoder.render_slice(3, &mut planar).expect("slice should render");
    let pcm = planar.to_pcm16();
    let path = temp.path().join("slice3.wav");
    write_wav_file(&path, &pcm, 44_100).expect("wav should be written");

    let (_, decoded) = read_wav(&path);
    assert_eq!(decoded.as_slice(), pcm.samples());
}

#[test]
fn unknown_slice_length_keeps_the_full_loop_and_drops_the_ot_map() {
    let temp = tempfile::tempdir().expect("tempdir should work");
    let engine = SyntheticEngine::new();

    let clean = demo_loop().to_container().expect("loop should serialize");
    let slices_target = OutputTarget::new(temp.path().join("slices/amen"));
    export_container(&engine, &clean, &slices_target, &ExportOptions::default())
        .expect("slice export should succeed");

    let mut loop_desc = demo_loop();
    loop_desc.faults.slice_info = vec![1];
    let faulty = loop_desc.to_container().expect("loop should serialize");
    let loop_target = OutputTarget::new(temp.path().join("loop/amen"));
    let options = ExportOptions {
        mode: ExportMode::LoopWithOt,
        ..ExportOptions::default()
    };
    let outcome = export_container(&engine, &faulty, &loop_target, &options)
        .expect("export should continue past the missing slice");

    assert_eq!(outcome.skipped_slices, vec![1]);
    assert_eq!(outcome.warnings.len(), 2, "{:?}", outcome.warnings);
    assert!(!loop_target.ot().exists());

    let (_, whole) = read_wav(&loop_target.loop_wav());
    assert!(whole.len() >= 49_612 * 2, "loop lost its tail: {}", whole.len());

    // Slice 2 still sits after the full length of slice 1.
    let (_, slice2) = read_wav(&slices_target.slice_wav(2));
    let start = (11_025 + 22_050) * 2;
    assert_eq!(&whole[start..start + slice2.len()], slice2.as_slice());
}
