/// Number of intermediate frames emitted between two observed fractions.
pub const ANIMATION_STEPS: u32 = 100;

/// Converts discrete (finished, total) snapshots into a smoothly increasing
/// display fraction. Purely cosmetic: terminal-state decisions always come
/// from the authoritative snapshot fields, never from the animated value.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ProgressAnimator {
    displayed: f64,
}

impl ProgressAnimator {
    pub fn displayed(&self) -> f64 {
        self.displayed
    }

    /// Resets to zero at the start of a fresh cycle.
    pub fn reset(&mut self) {
        self.displayed = 0.0;
    }

    /// Produces the frame sequence from the current display value toward the
    /// newly observed fraction. The sequence never regresses and never
    /// exceeds 1.0; it stops early the moment a frame would reach 1.0.
    pub fn frames(&mut self, finished: u64, total: u64) -> Vec<f64> {
        let target = if total == 0 {
            0.0
        } else {
            finished as f64 / total as f64
        };
        let start = self.displayed;
        let step = target - start;
        if step <= 0.0 {
            return Vec::new();
        }

        let mut frames = Vec::new();
        for k in 1..=ANIMATION_STEPS {
            let value = start + step * f64::from(k) / f64::from(ANIMATION_STEPS);
            if value >= 1.0 {
                frames.push(1.0);
                break;
            }
            frames.push(value);
        }
        if let Some(last) = frames.last() {
            self.displayed = *last;
        }
        frames
    }
}
