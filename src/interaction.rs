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
use std::time::{Duration, Instant};

/// Pixels of travel before a press stops being a click and becomes a drag
/// or pan.
pub const CLICK_SLOP_PX: f32 = 4.0;
pub const DOUBLE_CLICK_WINDOW: Duration = Duration::from_millis(400);

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PressTarget {
    Node(u32),
    Edge(u32),
    Background,
}

/// Pointer-session state between down and up: what was pressed, where, and
/// whether the press graduated into a drag/pan.
#[derive(Debug, Default)]
pub struct InteractionState {
    pub hovered_node: Option<u32>,
    pub hovered_edge: Option<u32>,
    pub dragging_node: Option<u32>,
    pub press: Option<Press>,
    last_click: Option<(u32, Instant)>,
}

#[derive(Copy, Clone, Debug)]
pub struct Press {
    pub target: PressTarget,
    pub screen: (f32, f32),
    pub last_screen: (f32, f32),
    pub moved_past_slop: bool,
}

impl InteractionState {
    pub fn begin_press(&mut self, target: PressTarget, screen: (f32, f32)) {
        self.press = Some(Press {
            target,
            screen,
            last_screen: screen,
            moved_past_slop: false,
        });
        if let PressTarget::Node(slot) = target {
            self.dragging_node = Some(slot);
        }
    }

    /// Track pointer travel; returns the screen delta since the previous
    /// move for panning.
    pub fn note_move(&mut self, screen: (f32, f32)) -> (f32, f32) {
        let press = match &mut self.press {
            Some(press) => press,
            None => return (0.0, 0.0),
        };
        let delta = (screen.0 - press.last_screen.0, screen.1 - press.last_screen.1);
        press.last_screen = screen;
        let travel = (screen.0 - press.screen.0).hypot(screen.1 - press.screen.1);
        if travel > CLICK_SLOP_PX {
            press.moved_past_slop = true;
        }
        delta
    }

    /// End the press. Returns `Some(target)` when the gesture still counts
    /// as a click on it.
    pub fn end_press(&mut self) -> Option<PressTarget> {
        self.dragging_node = None;
        let press = self.press.take()?;
        if press.moved_past_slop {
            return None;
        }
        Some(press.target)
    }

    /// Register a completed node click; true when it lands within the
    /// double-click window on the same node.
    pub fn note_click(&mut self, slot: u32) -> bool {
        let now = Instant::now();
        let double = matches!(
            self.last_click,
            Some((last_slot, at)) if last_slot == slot && now.duration_since(at) < DOUBLE_CLICK_WINDOW
        );
        // A double click consumes the stored press so a triple doesn't
        // fire twice.
        self.last_click = if double { None } else { Some((slot, now)) };
        double
    }

    pub fn cancel(&mut self) {
        self.press = None;
        self.dragging_node = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a_short_press_is_a_click() {
        let mut state = InteractionState::default();
        state.begin_press(PressTarget::Node(3), (10.0, 10.0));
        state.note_move((11.0, 10.0));
        assert_eq!(state.end_press(), Some(PressTarget::Node(3)));
    }

    #[test]
    fn travel_past_the_slop_suppresses_the_click() {
        let mut state = InteractionState::default();
        state.begin_press(PressTarget::Background, (0.0, 0.0));
        state.note_move((10.0, 0.0));
        assert_eq!(state.end_press(), None);
    }

    #[test]
    fn pan_deltas_accumulate_per_move() {
        let mut state = InteractionState::default();
        state.begin_press(PressTarget::Background, (0.0, 0.0));
        assert_eq!(state.note_move((3.0, 4.0)), (3.0, 4.0));
        assert_eq!(state.note_move((5.0, 4.0)), (2.0, 0.0));
    }

    #[test]
    fn double_click_requires_the_same_node_in_the_window() {
        let mut state = InteractionState::default();
        assert!(!state.note_click(1));
        assert!(state.note_click(1));
        // Consumed: a third click starts a fresh cycle.
        assert!(!state.note_click(1));
        assert!(!state.note_click(2));
    }

    #[test]
    fn dragging_tracks_the_pressed_node() {
        let mut state = InteractionState::default();
        state.begin_press(PressTarget::Node(9), (0.0, 0.0));
        assert_eq!(state.dragging_node, Some(9));
        state.cancel();
        assert_eq!(state.dragging_node, None);
    }
}
