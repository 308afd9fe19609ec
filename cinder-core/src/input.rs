//! Frame-coherent input state built from winit events.

use winit::event::{ElementState, MouseButton, WindowEvent};
use winit::keyboard::{KeyCode, PhysicalKey};
use crate::collections::hashset::HashSet;

/// Key state for a single frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyState {
    /// KeyCode was just pressed this frame
    JustPressed,
    /// KeyCode is being held down
    Held,
    /// KeyCode was just released this frame
    JustReleased,
    /// KeyCode is not pressed
    Released,
}

/// Modifier state of this frame.
#[derive(Debug, Default, Clone, Copy)]
pub struct ModifiersState {
    pub shift: bool,
    pub ctrl: bool,
    pub alt: bool,
    pub super_key: bool,
}

/// Collects input events from the OS; users query per-frame key state.
///
/// `tick` must run once per frame, after event processing, to derive the
/// just-pressed/just-released edges from the previous frame's state.
pub struct InputManager {
    keys_pressed: HashSet<KeyCode>,
    keys_just_pressed: HashSet<KeyCode>,
    keys_just_released: HashSet<KeyCode>,
    prev_keys_pressed: HashSet<KeyCode>,

    mouse_pressed: HashSet<MouseButton>,
    mouse_just_pressed: HashSet<MouseButton>,
    mouse_just_released: HashSet<MouseButton>,
    prev_mouse_pressed: HashSet<MouseButton>,

    modifiers: ModifiersState,
}

impl Default for InputManager {
    fn default() -> Self {
        Self::new()
    }
}

impl InputManager {
    pub fn new() -> Self {
        Self {
            keys_pressed: HashSet::default(),
            keys_just_pressed: HashSet::default(),
            keys_just_released: HashSet::default(),
            prev_keys_pressed: HashSet::default(),

            mouse_pressed: HashSet::default(),
            mouse_just_pressed: HashSet::default(),
            mouse_just_released: HashSet::default(),
            prev_mouse_pressed: HashSet::default(),

            modifiers: ModifiersState::default(),
        }
    }

    /// Receive and process window events.
    pub fn on_window_event(&mut self, event: &WindowEvent) {
        match event {
            WindowEvent::KeyboardInput { event, .. } => {
                if let PhysicalKey::Code(keycode) = event.physical_key {
                    match event.state {
                        ElementState::Pressed => {
                            if !event.repeat {
                                self.keys_pressed.insert(keycode);
                            }
                        }
                        ElementState::Released => {
                            self.keys_pressed.remove(&keycode);
                        }
                    }
                }
            }
            WindowEvent::MouseInput { button, state, .. } => match state {
                ElementState::Pressed => {
                    self.mouse_pressed.insert(*button);
                }
                ElementState::Released => {
                    self.mouse_pressed.remove(button);
                }
            },
            WindowEvent::ModifiersChanged(modifiers) => {
                self.modifiers = ModifiersState {
                    shift: modifiers.state().shift_key(),
                    ctrl: modifiers.state().control_key(),
                    alt: modifiers.state().alt_key(),
                    super_key: modifiers.state().super_key(),
                };
            }
            WindowEvent::Focused(false) => {
                // clear all input when window loses focus
                self.clear();
            }
            _ => {}
        }
    }

    /// Derive frame edges. Call once per frame after event processing.
    #[profiling::function]
    pub fn tick(&mut self) {
        self.keys_just_pressed.clear();
        self.keys_just_released.clear();
        self.mouse_just_pressed.clear();
        self.mouse_just_released.clear();

        for key in self.keys_pressed.difference(&self.prev_keys_pressed) {
            self.keys_just_pressed.insert(*key);
        }
        for key in self.prev_keys_pressed.difference(&self.keys_pressed) {
            self.keys_just_released.insert(*key);
        }
        for button in self.mouse_pressed.difference(&self.prev_mouse_pressed) {
            self.mouse_just_pressed.insert(*button);
        }
        for button in self.prev_mouse_pressed.difference(&self.mouse_pressed) {
            self.mouse_just_released.insert(*button);
        }

        self.prev_keys_pressed = self.keys_pressed.clone();
        self.prev_mouse_pressed = self.mouse_pressed.clone();
    }

    pub fn key_state(&self, key: KeyCode) -> KeyState {
        if self.keys_just_pressed.contains(&key) {
            KeyState::JustPressed
        } else if self.keys_pressed.contains(&key) {
            KeyState::Held
        } else if self.keys_just_released.contains(&key) {
            KeyState::JustReleased
        } else {
            KeyState::Released
        }
    }

    #[inline]
    pub fn is_key_pressed(&self, key: KeyCode) -> bool {
        self.keys_pressed.contains(&key)
    }

    #[inline]
    pub fn is_key_just_pressed(&self, key: KeyCode) -> bool {
        self.keys_just_pressed.contains(&key)
    }

    #[inline]
    pub fn is_key_just_released(&self, key: KeyCode) -> bool {
        self.keys_just_released.contains(&key)
    }

    #[inline]
    pub fn is_mouse_pressed(&self, button: MouseButton) -> bool {
        self.mouse_pressed.contains(&button)
    }

    #[inline]
    pub fn is_mouse_just_pressed(&self, button: MouseButton) -> bool {
        self.mouse_just_pressed.contains(&button)
    }

    #[inline]
    pub fn modifiers(&self) -> ModifiersState {
        self.modifiers
    }

    /// Signed axis from a negative/positive key pair, e.g. S/W for the
    /// forward axis.
    pub fn key_axis(&self, negative: KeyCode, positive: KeyCode) -> f32 {
        let mut axis = 0.0;
        if self.is_key_pressed(positive) {
            axis += 1.0;
        }
        if self.is_key_pressed(negative) {
            axis -= 1.0;
        }
        axis
    }

    pub fn clear(&mut self) {
        self.keys_pressed.clear();
        self.keys_just_pressed.clear();
        self.keys_just_released.clear();
        self.prev_keys_pressed.clear();
        self.mouse_pressed.clear();
        self.mouse_just_pressed.clear();
        self.mouse_just_released.clear();
        self.prev_mouse_pressed.clear();
    }
}
