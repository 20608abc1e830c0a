/// Pulses per quarter note used by loop containers.
pub const PPQ: u32 = 15_360;

/// Relative tolerance under which two durations describe the same span.
pub const DURATION_TOLERANCE: f64 = 1e-6;

#[must_use]
pub fn seconds_per_pulse(tempo_bpm: f64) -> f64 {
    if tempo_bpm <= 0.0 {
        return 0.0;
    }

    60.0 / (f64::from(PPQ) * tempo_bpm)
}

#[must_use]
pub fn pulses_to_seconds(pulses: u64, tempo_bpm: f64) -> f64 {
    pulses as f64 * seconds_per_pulse(tempo_bpm)
}

#[must_use]
pub fn frames_to_seconds(frames: u64, sample_rate: u32) -> f64 {
    if sample_rate == 0 {
        return 0.0;
    }

    frames as f64 / f64::from(sample_rate)
}

#[must_use]
pub fn pulses_to_frames(pulses: u64, tempo_bpm: f64, sample_rate: u32) -> u64 {
    let seconds = pulses_to_seconds(pulses, tempo_bpm);
    (seconds * f64::from(sample_rate)).round() as u64
}

#[must_use]
pub fn durations_agree(a: f64, b: f64) -> bool {
    let scale = a.abs().max(b.abs());
    if scale == 0.0 {
        return true;
    }

    (a - b).abs() <= scale * DURATION_TOLERANCE
}
