// This file is part of HeroineGraph.
//
// HeroineGraph is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// HeroineGraph is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with HeroineGraph.  If not, see <http://www.gnu.org/licenses/>.

/// Watches the mean-squared node velocity and reports convergence once it
/// stays below the threshold for enough consecutive observations.
#[derive(Clone, Debug)]
pub struct ConvergenceDetector {
    threshold: f32,
    required_ticks: u32,
    streak: u32,
    fired: bool,
}

impl ConvergenceDetector {
    pub fn new(threshold: f32, required_ticks: u32) -> Self {
        Self {
            threshold,
            required_ticks: required_ticks.max(1),
            streak: 0,
            fired: false,
        }
    }

    /// Feed one sample; true exactly once, on the observation that
    /// completes the streak.
    pub fn observe(&mut self, mean_squared_velocity: f32) -> bool {
        if mean_squared_velocity < self.threshold {
            self.streak += 1;
        } else {
            self.streak = 0;
        }
        if !self.fired && self.streak >= self.required_ticks {
            self.fired = true;
            return true;
        }
        false
    }

    /// Re-arm after a reheat.
    pub fn reset(&mut self) {
        self.streak = 0;
        self.fired = false;
    }
}

impl Default for ConvergenceDetector {
    fn default() -> Self {
        Self::new(1e-3, 10)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_once_after_a_full_quiet_streak() {
        let mut detector = ConvergenceDetector::new(0.5, 3);
        assert!(!detector.observe(0.1));
        assert!(!detector.observe(0.1));
        assert!(detector.observe(0.1));
        assert!(!detector.observe(0.1));
    }

    #[test]
    fn a_noisy_sample_resets_the_streak() {
        let mut detector = ConvergenceDetector::new(0.5, 3);
        assert!(!detector.observe(0.1));
        assert!(!detector.observe(0.9));
        assert!(!detector.observe(0.1));
        assert!(!detector.observe(0.1));
        assert!(detector.observe(0.1));
    }

    #[test]
    fn reset_rearms_after_a_reheat() {
        let mut detector = ConvergenceDetector::new(0.5, 2);
        detector.observe(0.1);
        assert!(detector.observe(0.1));
        detector.reset();
        detector.observe(0.1);
        assert!(detector.observe(0.1));
    }
}
