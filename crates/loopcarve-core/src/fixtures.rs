use crate::engine::synthetic::{SyntheticFaults, SyntheticLoop, SyntheticSlice};

/// Two-bar stereo loop at 120 BPM / 44.1 kHz with four slices of
/// 1/4, 1/2, 1/4 and 1/8 second.
#[must_use]
pub fn demo_loop() -> SyntheticLoop {
    SyntheticLoop {
        sample_rate: 44_100,
        channels: 2,
        tempo_milli_bpm: 120_000,
        ppq_length: 34_560,
        amplitude: 0.5,
        slices: vec![
            SyntheticSlice {
                ppq_position: 0,
                frames: 11_025,
                frequency_hz: 110.0,
            },
            SyntheticSlice {
                ppq_position: 7_680,
                frames: 22_050,
                frequency_hz: 220.0,
            },
            SyntheticSlice {
                ppq_position: 23_040,
                frames: 11_025,
                frequency_hz: 330.0,
            },
            SyntheticSlice {
                ppq_position: 30_720,
                frames: 5_512,
                frequency_hz: 440.0,
            },
        ],
        faults: SyntheticFaults::default(),
    }
}

/// Mono loop with `count` equal slices of `frames` frames each.
#[must_use]
pub fn uniform_loop(count: usize, frames: u64) -> SyntheticLoop {
    let pulses_per_slice = 3_840;
    SyntheticLoop {
        sample_rate: 48_000,
        channels: 1,
        tempo_milli_bpm: 125_000,
        ppq_length: pulses_per_slice * count as u64,
        amplitude: 0.8,
        slices: (0..count)
            .map(|index| SyntheticSlice {
                ppq_position: pulses_per_slice * index as u64,
                frames,
                frequency_hz: 100.0 + index as f32 * 10.0,
            })
            .collect(),
        faults: SyntheticFaults::default(),
    }
}
