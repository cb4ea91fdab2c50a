/// A rendered line between two nodes. Endpoints are rebuilt from the current
/// node positions every frame; only the pairing is stored.
#[derive(Debug, Clone, Copy)]
pub struct Connection {
    pub from: usize,
    pub to: usize,
}

/// Pulsing line opacity: a slow sinusoid of time, phase-shifted per
/// connection so the links don't breathe in lockstep.
pub fn pulse_alpha(index: usize, t: f32) -> f32 {
    0.2 + (t * 2.0 + index as f32 * 0.5).sin() * 0.1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pulse_stays_in_visible_band() {
        for index in 0..40 {
            for step in 0..500 {
                let alpha = pulse_alpha(index, step as f32 * 0.05);
                assert!((0.099..=0.301).contains(&alpha), "alpha {alpha} out of band");
            }
        }
    }

    #[test]
    fn neighbouring_connections_are_phase_shifted() {
        let a = pulse_alpha(0, 1.0);
        let b = pulse_alpha(1, 1.0);
        assert!((a - b).abs() > 1e-3);
    }
}
