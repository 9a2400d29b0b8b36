//! Polled input state, collected from window/device events and consumed
//! exactly once per frame by the frame loop. Last writer wins within a frame.

use winit::{
    event::{DeviceEvent, ElementState, KeyEvent, MouseButton, WindowEvent},
    keyboard::{KeyCode, PhysicalKey},
};

#[derive(Default, Clone, Copy)]
pub struct KeyState {
    pub w: bool,
    pub a: bool,
    pub s: bool,
    pub d: bool,
    pub q: bool,
    pub e: bool,
    pub ctrl: bool,
}

impl KeyState {
    fn set(&mut self, code: KeyCode, down: bool) {
        match code {
            KeyCode::KeyW => self.w = down,
            KeyCode::KeyA => self.a = down,
            KeyCode::KeyS => self.s = down,
            KeyCode::KeyD => self.d = down,
            KeyCode::KeyQ => self.q = down,
            KeyCode::KeyE => self.e = down,
            KeyCode::ControlLeft | KeyCode::ControlRight => self.ctrl = down,
            _ => {}
        }
    }
}

#[derive(Default)]
pub struct InputState {
    pub keys: KeyState,
    /// Keys that went down since the last frame, in event order.
    tapped: Vec<KeyCode>,
    mouse_dx: f32,
    mouse_dy: f32,
    pub mouse_look: bool,
    save_requested: bool,
}

impl InputState {
    pub fn on_window_event(&mut self, event: &WindowEvent) {
        match event {
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(code),
                        state,
                        repeat,
                        ..
                    },
                ..
            } => {
                let down = *state == ElementState::Pressed;
                self.keys.set(*code, down);
                if down && !*repeat {
                    if self.keys.ctrl && *code == KeyCode::KeyS {
                        self.save_requested = true;
                    } else {
                        self.tapped.push(*code);
                    }
                }
            }
            WindowEvent::MouseInput { state, button, .. } => {
                if *button == MouseButton::Right {
                    self.mouse_look = *state == ElementState::Pressed;
                }
            }
            WindowEvent::Focused(false) => {
                self.keys = KeyState::default();
                self.mouse_look = false;
            }
            _ => {}
        }
    }

    pub fn on_device_event(&mut self, event: &DeviceEvent) {
        if let DeviceEvent::MouseMotion { delta } = event {
            self.mouse_dx += delta.0 as f32;
            self.mouse_dy += delta.1 as f32;
        }
    }

    pub fn take_mouse_delta(&mut self) -> (f32, f32) {
        let delta = (self.mouse_dx, self.mouse_dy);
        self.mouse_dx = 0.0;
        self.mouse_dy = 0.0;
        delta
    }

    /// Keys pressed since the previous call, drained.
    pub fn take_tapped(&mut self) -> Vec<KeyCode> {
        std::mem::take(&mut self.tapped)
    }

    /// True once per Ctrl+S chord press.
    pub fn take_save_request(&mut self) -> bool {
        std::mem::take(&mut self.save_requested)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_chord_is_edge_triggered_and_cleared_on_take() {
        let mut input = InputState::default();
        input.keys.ctrl = true;
        input.save_requested = true;
        assert!(input.take_save_request());
        assert!(!input.take_save_request());
    }

    #[test]
    fn tapped_keys_drain_once() {
        let mut input = InputState::default();
        input.tapped.push(KeyCode::KeyG);
        assert_eq!(input.take_tapped(), vec![KeyCode::KeyG]);
        assert!(input.take_tapped().is_empty());
    }
}
