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
use log::debug;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SimStatus {
    Stopped,
    Running,
    Paused,
}

/// Host-side force parameters. Uploaded into the simulation uniform block
/// each time they change.
#[derive(Clone, Debug)]
pub struct ForceConfig {
    pub repulsion: f32,
    pub attraction: f32,
    pub gravity: f32,
    pub center: (f32, f32),
    pub link_distance: f32,
    pub theta: f32,
    pub velocity_decay: f32,
    pub dt: f32,
    pub alpha_min: f32,
    pub alpha_decay_iterations: u32,
}

impl Default for ForceConfig {
    fn default() -> Self {
        Self {
            repulsion: 30.0,
            attraction: 0.2,
            gravity: 0.05,
            center: (0.0, 0.0),
            link_distance: 60.0,
            theta: 1.0,
            velocity_decay: 0.6,
            dt: 1.0,
            alpha_min: 0.001,
            alpha_decay_iterations: 300,
        }
    }
}

impl ForceConfig {
    /// Reject out-of-range parameters before anything is mutated.
    pub fn validate(&self) -> Result<(), String> {
        let finite = [
            self.repulsion,
            self.attraction,
            self.gravity,
            self.center.0,
            self.center.1,
            self.link_distance,
            self.theta,
            self.velocity_decay,
            self.dt,
            self.alpha_min,
        ];
        if finite.iter().any(|v| !v.is_finite()) {
            return Err("force parameters must be finite".to_owned());
        }
        if self.link_distance <= 0.0 {
            return Err(format!("link_distance must be > 0, got {}", self.link_distance));
        }
        if !(0.0..1.0).contains(&self.velocity_decay) {
            return Err(format!(
                "velocity_decay must be in [0, 1), got {}",
                self.velocity_decay
            ));
        }
        if self.dt <= 0.0 {
            return Err(format!("dt must be > 0, got {}", self.dt));
        }
        if !(0.0..1.0).contains(&self.alpha_min) || self.alpha_min == 0.0 {
            return Err(format!("alpha_min must be in (0, 1), got {}", self.alpha_min));
        }
        if self.theta <= 0.0 || self.theta > 8.0 {
            return Err(format!("theta must be in (0, 8], got {}", self.theta));
        }
        if self.alpha_decay_iterations == 0 {
            return Err("alpha_decay_iterations must be > 0".to_owned());
        }
        Ok(())
    }
}

/// Alpha schedule and run-state machine: Stopped → Running ⇄ Paused,
/// restart reheats from any state.
#[derive(Clone, Debug)]
pub struct SimulationController {
    status: SimStatus,
    alpha: f32,
    alpha_min: f32,
    alpha_target: f32,
    alpha_decay: f32,
}

impl SimulationController {
    pub fn new(alpha_min: f32, iterations: u32) -> Self {
        Self {
            status: SimStatus::Stopped,
            alpha: 0.0,
            alpha_min,
            alpha_target: 0.0,
            alpha_decay: Self::decay_for(alpha_min, iterations),
        }
    }

    fn decay_for(alpha_min: f32, iterations: u32) -> f32 {
        1.0 - alpha_min.powf(1.0 / iterations.max(1) as f32)
    }

    pub fn reconfigure(&mut self, alpha_min: f32, iterations: u32) {
        self.alpha_min = alpha_min;
        self.alpha_decay = Self::decay_for(alpha_min, iterations);
    }

    pub fn status(&self) -> SimStatus {
        self.status
    }

    pub fn alpha(&self) -> f32 {
        self.alpha
    }

    pub fn alpha_min(&self) -> f32 {
        self.alpha_min
    }

    pub fn alpha_target(&self) -> f32 {
        self.alpha_target
    }

    pub fn set_alpha(&mut self, alpha: f32) {
        self.alpha = alpha.clamp(0.0, 1.0);
    }

    /// Non-zero targets keep the simulation warm (drags); zero lets it cool
    /// back down.
    pub fn set_alpha_target(&mut self, target: f32) {
        self.alpha_target = target.clamp(0.0, 1.0);
    }

    pub fn start(&mut self) {
        if self.status == SimStatus::Stopped {
            self.alpha = 1.0;
        }
        self.status = SimStatus::Running;
    }

    pub fn stop(&mut self) {
        self.status = SimStatus::Stopped;
    }

    pub fn pause(&mut self) {
        if self.status == SimStatus::Running {
            self.status = SimStatus::Paused;
        }
    }

    pub fn resume(&mut self) {
        if self.status == SimStatus::Paused {
            self.status = SimStatus::Running;
        }
    }

    pub fn restart(&mut self, alpha: f32) {
        debug!("simulation restart at alpha {}", alpha);
        self.alpha = alpha.clamp(0.0, 1.0);
        self.status = SimStatus::Running;
    }

    /// True when the engine has cooled past alpha_min with no outstanding
    /// target; ticking is pointless until a reheat.
    pub fn is_settled(&self) -> bool {
        self.alpha < self.alpha_min && self.alpha_target == 0.0
    }

    /// Advance the alpha schedule. Returns true when a simulation tick
    /// should be dispatched this frame.
    pub fn begin_tick(&mut self) -> bool {
        if self.status != SimStatus::Running {
            return false;
        }
        if self.is_settled() {
            return false;
        }
        self.alpha += (self.alpha_target - self.alpha) * self.alpha_decay;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn alpha_is_strictly_decreasing_toward_zero_target() {
        let mut controller = SimulationController::new(0.001, 300);
        controller.restart(1.0);
        let mut last = controller.alpha();
        let mut ticks = 0;
        while controller.begin_tick() {
            assert!(controller.alpha() < last, "alpha rose at tick {}", ticks);
            last = controller.alpha();
            ticks += 1;
            assert!(ticks < 10_000, "never settled");
        }
        assert!(controller.is_settled());
        // The decay constant is tuned so cooling takes roughly the
        // configured number of iterations.
        assert!((200..=400).contains(&ticks), "settled after {} ticks", ticks);
    }

    #[test]
    fn a_drag_target_reheats_and_release_cools_back_down() {
        let mut controller = SimulationController::new(0.001, 300);
        controller.restart(1.0);
        while controller.begin_tick() {}
        assert!(controller.is_settled());

        // Synthetic drag: reheat to the drag target. Alpha must exceed 0.1
        // within three ticks.
        controller.set_alpha_target(0.3);
        controller.restart(0.3);
        let mut warm = false;
        for _ in 0..3 {
            assert!(controller.begin_tick());
            warm = warm || controller.alpha() > 0.1;
        }
        assert!(warm, "alpha {} too cold after reheat", controller.alpha());

        // Release: bounded cooldown back below alpha_min.
        controller.set_alpha_target(0.0);
        let mut ticks = 0;
        while controller.begin_tick() {
            ticks += 1;
            assert!(ticks < 5_000, "did not cool after release");
        }
        assert!(controller.is_settled());
    }

    #[test]
    fn state_machine_follows_the_contract() {
        let mut controller = SimulationController::new(0.001, 300);
        assert_eq!(controller.status(), SimStatus::Stopped);
        assert!(!controller.begin_tick());

        controller.start();
        assert_eq!(controller.status(), SimStatus::Running);
        assert_abs_diff_eq!(controller.alpha(), 1.0);

        controller.pause();
        assert_eq!(controller.status(), SimStatus::Paused);
        assert!(!controller.begin_tick());

        controller.resume();
        assert_eq!(controller.status(), SimStatus::Running);
        assert!(controller.begin_tick());

        controller.stop();
        // Pause from stopped is a no-op, not a transition.
        controller.pause();
        assert_eq!(controller.status(), SimStatus::Stopped);

        controller.restart(0.5);
        assert_eq!(controller.status(), SimStatus::Running);
        assert_abs_diff_eq!(controller.alpha(), 0.5);
    }

    #[test]
    fn alpha_climbs_toward_a_positive_target() {
        let mut controller = SimulationController::new(0.001, 300);
        controller.restart(0.0);
        controller.set_alpha_target(0.3);
        for _ in 0..2000 {
            controller.begin_tick();
        }
        assert_abs_diff_eq!(controller.alpha(), 0.3, epsilon = 1e-3);
    }

    #[test]
    fn force_config_validation_rejects_nonsense() {
        assert!(ForceConfig::default().validate().is_ok());
        let mut config = ForceConfig::default();
        config.link_distance = 0.0;
        assert!(config.validate().is_err());
        let mut config = ForceConfig::default();
        config.velocity_decay = 1.0;
        assert!(config.validate().is_err());
        let mut config = ForceConfig::default();
        config.repulsion = f32::NAN;
        assert!(config.validate().is_err());
        let mut config = ForceConfig::default();
        config.alpha_min = 0.0;
        assert!(config.validate().is_err());
    }
}
