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
use bitflags::bitflags;
use smallvec::{smallvec, SmallVec};
use winit::{
    dpi::PhysicalPosition,
    event::{ElementState, ModifiersState, MouseButton, MouseScrollDelta, Touch, TouchPhase, WindowEvent},
};

bitflags! {
    pub struct Modifiers: u32 {
        const SHIFT = 1 << 0;
        const CTRL  = 1 << 1;
        const ALT   = 1 << 2;
        const META  = 1 << 3;
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PointerButton {
    Primary,
    Secondary,
    Middle,
}

impl PointerButton {
    fn mask(self) -> u8 {
        match self {
            Self::Primary => 1,
            Self::Secondary => 2,
            Self::Middle => 4,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PointerPhase {
    Down,
    Move,
    Up,
    Cancel,
    Wheel,
}

/// A normalized pointer event in logical (dpr-independent) screen
/// coordinates. Mouse and touch both arrive in this shape; the mouse is
/// pointer id 0, touches use their platform ids offset by one.
#[derive(Copy, Clone, Debug)]
pub struct PointerEvent {
    pub phase: PointerPhase,
    pub pointer_id: u64,
    pub screen_x: f32,
    pub screen_y: f32,
    pub button: Option<PointerButton>,
    pub buttons_down: u8,
    pub modifiers: Modifiers,
    pub wheel_dx: f32,
    pub wheel_dy: f32,
}

const MOUSE_POINTER_ID: u64 = 0;
// One wheel "line" in logical pixels; matches typical browser behavior.
const LINE_HEIGHT: f32 = 40.0;

type Events = SmallVec<[PointerEvent; 4]>;

/// Fans winit window events into [PointerEvent]s, tracking cursor,
/// button and modifier state between events.
pub struct PointerManager {
    scale_factor: f64,
    cursor: (f32, f32),
    modifiers: Modifiers,
    buttons: u8,
}

impl PointerManager {
    pub fn new(scale_factor: f64) -> Self {
        Self {
            scale_factor: scale_factor.max(0.1),
            cursor: (0.0, 0.0),
            modifiers: Modifiers::empty(),
            buttons: 0,
        }
    }

    pub fn set_scale_factor(&mut self, scale_factor: f64) {
        self.scale_factor = scale_factor.max(0.1);
    }

    pub fn cursor(&self) -> (f32, f32) {
        self.cursor
    }

    pub fn any_button_down(&self) -> bool {
        self.buttons != 0
    }

    pub fn handle_window_event(&mut self, event: &WindowEvent) -> Events {
        match event {
            WindowEvent::CursorMoved { position, .. } => self.on_cursor_moved(*position),
            WindowEvent::MouseInput { state, button, .. } => self.on_mouse_input(*state, *button),
            WindowEvent::MouseWheel { delta, .. } => self.on_mouse_wheel(*delta),
            WindowEvent::ModifiersChanged(state) => {
                self.on_modifiers(*state);
                smallvec![]
            }
            WindowEvent::CursorLeft { .. } => self.on_cursor_left(),
            WindowEvent::Touch(touch) => self.on_touch(touch),
            _ => smallvec![],
        }
    }

    pub fn on_cursor_moved(&mut self, position: PhysicalPosition<f64>) -> Events {
        self.cursor = self.to_logical(position);
        smallvec![self.pointer_event(PointerPhase::Move, MOUSE_POINTER_ID, None)]
    }

    pub fn on_mouse_input(&mut self, state: ElementState, button: MouseButton) -> Events {
        let button = match button {
            MouseButton::Left => PointerButton::Primary,
            MouseButton::Right => PointerButton::Secondary,
            MouseButton::Middle => PointerButton::Middle,
            MouseButton::Other(_) => return smallvec![],
        };
        let phase = match state {
            ElementState::Pressed => {
                self.buttons |= button.mask();
                PointerPhase::Down
            }
            ElementState::Released => {
                self.buttons &= !button.mask();
                PointerPhase::Up
            }
        };
        smallvec![self.pointer_event(phase, MOUSE_POINTER_ID, Some(button))]
    }

    pub fn on_mouse_wheel(&mut self, delta: MouseScrollDelta) -> Events {
        let (dx, dy) = match delta {
            MouseScrollDelta::LineDelta(x, y) => (x * LINE_HEIGHT, y * LINE_HEIGHT),
            MouseScrollDelta::PixelDelta(p) => {
                let logical = self.to_logical(p);
                (logical.0, logical.1)
            }
        };
        let mut event = self.pointer_event(PointerPhase::Wheel, MOUSE_POINTER_ID, None);
        event.wheel_dx = dx;
        event.wheel_dy = dy;
        smallvec![event]
    }

    pub fn on_modifiers(&mut self, state: ModifiersState) {
        let mut modifiers = Modifiers::empty();
        modifiers.set(Modifiers::SHIFT, state.shift());
        modifiers.set(Modifiers::CTRL, state.ctrl());
        modifiers.set(Modifiers::ALT, state.alt());
        modifiers.set(Modifiers::META, state.logo());
        self.modifiers = modifiers;
    }

    /// The cursor left the surface. Mid-drag this is a no-op (the pointer is
    /// captured); otherwise hover state is dropped via a Cancel.
    pub fn on_cursor_left(&mut self) -> Events {
        if self.buttons != 0 {
            return smallvec![];
        }
        smallvec![self.pointer_event(PointerPhase::Cancel, MOUSE_POINTER_ID, None)]
    }

    pub fn on_touch(&mut self, touch: &Touch) -> Events {
        self.cursor = self.to_logical(touch.location);
        let phase = match touch.phase {
            TouchPhase::Started => PointerPhase::Down,
            TouchPhase::Moved => PointerPhase::Move,
            TouchPhase::Ended => PointerPhase::Up,
            TouchPhase::Cancelled => PointerPhase::Cancel,
        };
        let button = match phase {
            PointerPhase::Down | PointerPhase::Up => Some(PointerButton::Primary),
            _ => None,
        };
        smallvec![self.pointer_event(phase, touch.id + 1, button)]
    }

    fn pointer_event(
        &self,
        phase: PointerPhase,
        pointer_id: u64,
        button: Option<PointerButton>,
    ) -> PointerEvent {
        PointerEvent {
            phase,
            pointer_id,
            screen_x: self.cursor.0,
            screen_y: self.cursor.1,
            button,
            buttons_down: self.buttons,
            modifiers: self.modifiers,
            wheel_dx: 0.0,
            wheel_dy: 0.0,
        }
    }

    fn to_logical(&self, position: PhysicalPosition<f64>) -> (f32, f32) {
        (
            (position.x / self.scale_factor) as f32,
            (position.y / self.scale_factor) as f32,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_moves_are_scaled_to_logical_pixels() {
        let mut manager = PointerManager::new(2.0);
        let events = manager.on_cursor_moved(PhysicalPosition::new(200.0, 100.0));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].phase, PointerPhase::Move);
        assert_eq!((events[0].screen_x, events[0].screen_y), (100.0, 50.0));
    }

    #[test]
    fn button_state_is_tracked_across_events() {
        let mut manager = PointerManager::new(1.0);
        let down = manager.on_mouse_input(ElementState::Pressed, MouseButton::Left);
        assert_eq!(down[0].phase, PointerPhase::Down);
        assert_eq!(down[0].button, Some(PointerButton::Primary));
        assert_eq!(down[0].buttons_down, 1);
        assert!(manager.any_button_down());

        let moved = manager.on_cursor_moved(PhysicalPosition::new(5.0, 5.0));
        assert_eq!(moved[0].buttons_down, 1);

        let up = manager.on_mouse_input(ElementState::Released, MouseButton::Left);
        assert_eq!(up[0].phase, PointerPhase::Up);
        assert_eq!(up[0].buttons_down, 0);
        assert!(!manager.any_button_down());
    }

    #[test]
    fn wheel_lines_become_pixels() {
        let mut manager = PointerManager::new(1.0);
        let events = manager.on_mouse_wheel(MouseScrollDelta::LineDelta(0.0, -3.0));
        assert_eq!(events[0].phase, PointerPhase::Wheel);
        assert_eq!(events[0].wheel_dy, -3.0 * LINE_HEIGHT);
    }

    #[test]
    fn modifiers_ride_along_on_events() {
        let mut manager = PointerManager::new(1.0);
        manager.on_modifiers(ModifiersState::SHIFT | ModifiersState::CTRL);
        let events = manager.on_cursor_moved(PhysicalPosition::new(0.0, 0.0));
        assert!(events[0].modifiers.contains(Modifiers::SHIFT));
        assert!(events[0].modifiers.contains(Modifiers::CTRL));
        assert!(!events[0].modifiers.contains(Modifiers::ALT));
    }

    #[test]
    fn cursor_left_cancels_only_when_idle() {
        let mut manager = PointerManager::new(1.0);
        manager.on_mouse_input(ElementState::Pressed, MouseButton::Left);
        assert!(manager.on_cursor_left().is_empty());
        manager.on_mouse_input(ElementState::Released, MouseButton::Left);
        let events = manager.on_cursor_left();
        assert_eq!(events[0].phase, PointerPhase::Cancel);
    }
}
