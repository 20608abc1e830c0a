use loopcarve_core::{
    LoopInfo, LoopLayout, SliceInfo, TimingReport,
    time::{frames_to_seconds, pulses_to_frames, pulses_to_seconds},
};
use proptest::prelude::*;

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 256,
        .. ProptestConfig::default()
    })]

    #[test]
    fn frame_and_pulse_durations_agree_within_half_a_frame(
        pulses in 0u64..2_000_000,
        tempo_milli_bpm in 40_000u32..240_000,
        sample_rate in prop::sample::select(vec![22_050u32, 44_100, 48_000, 96_000]),
    ) {
        let tempo_bpm = f64::from(tempo_milli_bpm) / 1_000.0;
        let frames = pulses_to_frames(pulses, tempo_bpm, sample_rate);

        let from_pulses = pulses_to_seconds(pulses, tempo_bpm);
        let from_frames = frames_to_seconds(frames, sample_rate);
        let half_frame = 0.5 / f64::from(sample_rate);
        prop_assert!((from_pulses - from_frames).abs() <= half_frame + 1e-9);
    }

    #[test]
    fn running_totals_track_pulse_offsets_for_consistent_slices(
        slice_pulses in prop::collection::vec(1u64..60_000, 1..32),
        tempo_milli_bpm in 40_000u32..240_000,
        sample_rate in prop::sample::select(vec![44_100u32, 48_000]),
    ) {
        let tempo_bpm = f64::from(tempo_milli_bpm) / 1_000.0;
        let mut position = 0;
        let slices: Vec<SliceInfo> = slice_pulses
            .iter()
            .enumerate()
            .map(|(index, &pulses)| {
                let slice = SliceInfo {
                    index: index as u32,
                    ppq_position: position,
                    frames: pulses_to_frames(pulses, tempo_bpm, sample_rate),
                };
                position += pulses;
                slice
            })
            .collect();
        let info = LoopInfo {
            sample_rate,
            channels: 1,
            slice_count: slices.len() as u32,
            tempo_milli_bpm,
            ppq_length: position,
        };

        let report = TimingReport::from_layout(&LoopLayout::new(info, slices, Vec::new()));

        // Each slice rounds to the nearest frame, so error grows by at most
        // half a frame per preceding slice.
        let half_frame = 0.5 / f64::from(sample_rate);
        for (count, row) in report.rows.iter().enumerate() {
            let tolerance = count as f64 * half_frame + 1e-9;
            prop_assert!((row.running_total_seconds - row.ppq_offset_seconds).abs() <= tolerance);
        }
        let tolerance = report.rows.len() as f64 * half_frame + 1e-9;
        prop_assert!(
            (report.total.duration_seconds - report.total.ppq_length_seconds).abs() <= tolerance
        );
    }
}
