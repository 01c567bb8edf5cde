use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::actions::{ActionStates, InputAction, SourceSample};
use crate::math::Vec2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum KeyCode {
    W,
    A,
    S,
    D,
    F,
    G,
    R,
    Q,
    I,
    J,
    K,
    L,
    U,
    O,
    P,
    Y,
    Digit0,
    Digit1,
    ArrowUp,
    ArrowDown,
    ArrowLeft,
    ArrowRight,
    Period,
    Comma,
    Slash,
    Semicolon,
    Backspace,
    Numpad0,
    Numpad4,
    Numpad5,
    Numpad6,
    Numpad7,
    Numpad8,
    Numpad9,
    NumpadDecimal,
    NumpadEnter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct KeySchemeId(pub u8);

/// One of the fixed key-chords a shared keyboard is partitioned into. Schemes use
/// pairwise-disjoint key sets. The primary key doubles as join/confirm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyScheme {
    pub id: KeySchemeId,
    pub name: &'static str,
    pub up: KeyCode,
    pub down: KeyCode,
    pub left: KeyCode,
    pub right: KeyCode,
    pub primary: KeyCode,
    pub guard: KeyCode,
    pub dash: KeyCode,
    pub cancel: KeyCode,
    pub leave: KeyCode,
}

pub const BUILTIN_KEY_SCHEMES: [KeyScheme; 4] = [
    KeyScheme {
        id: KeySchemeId(0),
        name: "wasd",
        up: KeyCode::W,
        down: KeyCode::S,
        left: KeyCode::A,
        right: KeyCode::D,
        primary: KeyCode::F,
        guard: KeyCode::G,
        dash: KeyCode::R,
        cancel: KeyCode::Q,
        leave: KeyCode::Digit1,
    },
    KeyScheme {
        id: KeySchemeId(1),
        name: "arrows",
        up: KeyCode::ArrowUp,
        down: KeyCode::ArrowDown,
        left: KeyCode::ArrowLeft,
        right: KeyCode::ArrowRight,
        primary: KeyCode::Period,
        guard: KeyCode::Comma,
        dash: KeyCode::Slash,
        cancel: KeyCode::Semicolon,
        leave: KeyCode::Backspace,
    },
    KeyScheme {
        id: KeySchemeId(2),
        name: "ijkl",
        up: KeyCode::I,
        down: KeyCode::K,
        left: KeyCode::J,
        right: KeyCode::L,
        primary: KeyCode::U,
        guard: KeyCode::O,
        dash: KeyCode::P,
        cancel: KeyCode::Y,
        leave: KeyCode::Digit0,
    },
    KeyScheme {
        id: KeySchemeId(3),
        name: "numpad",
        up: KeyCode::Numpad8,
        down: KeyCode::Numpad5,
        left: KeyCode::Numpad4,
        right: KeyCode::Numpad6,
        primary: KeyCode::Numpad0,
        guard: KeyCode::NumpadDecimal,
        dash: KeyCode::NumpadEnter,
        cancel: KeyCode::Numpad7,
        leave: KeyCode::Numpad9,
    },
];

impl KeyScheme {
    pub fn builtin(id: KeySchemeId) -> Option<&'static KeyScheme> {
        BUILTIN_KEY_SCHEMES.iter().find(|scheme| scheme.id == id)
    }

    pub fn keys(&self) -> [KeyCode; 9] {
        [
            self.up,
            self.down,
            self.left,
            self.right,
            self.primary,
            self.guard,
            self.dash,
            self.cancel,
            self.leave,
        ]
    }

    /// Keyboard aim follows movement, so `aim` stays zero.
    pub fn sample(&self, keyboard: &KeyboardState) -> SourceSample {
        let axis = |negative: KeyCode, positive: KeyCode| -> f32 {
            let mut value = 0.0;
            if keyboard.is_down(negative) {
                value -= 1.0;
            }
            if keyboard.is_down(positive) {
                value += 1.0;
            }
            value
        };
        let movement = Vec2::new(axis(self.left, self.right), axis(self.down, self.up));

        let mut held = ActionStates::default();
        held.set(InputAction::Primary, keyboard.is_down(self.primary));
        held.set(InputAction::Confirm, keyboard.is_down(self.primary));
        held.set(InputAction::Guard, keyboard.is_down(self.guard));
        held.set(InputAction::Dash, keyboard.is_down(self.dash));
        held.set(InputAction::Cancel, keyboard.is_down(self.cancel));
        held.set(InputAction::Leave, keyboard.is_down(self.leave));

        SourceSample {
            movement,
            aim: Vec2::ZERO,
            held,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyboardState {
    down: BTreeSet<KeyCode>,
}

impl KeyboardState {
    pub fn press(&mut self, key: KeyCode) {
        self.down.insert(key);
    }

    pub fn release(&mut self, key: KeyCode) {
        self.down.remove(&key);
    }

    pub fn is_down(&self, key: KeyCode) -> bool {
        self.down.contains(&key)
    }

    pub fn with_pressed(mut self, key: KeyCode) -> Self {
        self.press(key);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum GamepadButton {
    South,
    East,
    West,
    North,
    RightShoulder,
    Select,
    DPadUp,
    DPadDown,
    DPadLeft,
    DPadRight,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GamepadState {
    pub left_stick: Vec2,
    pub right_stick: Vec2,
    buttons: BTreeSet<GamepadButton>,
}

impl GamepadState {
    pub fn press(&mut self, button: GamepadButton) {
        self.buttons.insert(button);
    }

    pub fn release(&mut self, button: GamepadButton) {
        self.buttons.remove(&button);
    }

    pub fn is_down(&self, button: GamepadButton) -> bool {
        self.buttons.contains(&button)
    }

    pub fn with_pressed(mut self, button: GamepadButton) -> Self {
        self.press(button);
        self
    }

    /// Fixed mapping: South primary/confirm, East dash/cancel, West guard, North and
    /// right shoulder dash, Select leave, d-pad navigates and moves.
    pub fn sample(&self) -> SourceSample {
        let mut dpad = Vec2::ZERO;
        if self.is_down(GamepadButton::DPadLeft) {
            dpad.x -= 1.0;
        }
        if self.is_down(GamepadButton::DPadRight) {
            dpad.x += 1.0;
        }
        if self.is_down(GamepadButton::DPadDown) {
            dpad.y -= 1.0;
        }
        if self.is_down(GamepadButton::DPadUp) {
            dpad.y += 1.0;
        }
        let movement = if dpad == Vec2::ZERO {
            self.left_stick
        } else {
            dpad
        };

        let mut held = ActionStates::default();
        held.set(InputAction::Primary, self.is_down(GamepadButton::South));
        held.set(InputAction::Confirm, self.is_down(GamepadButton::South));
        held.set(InputAction::Guard, self.is_down(GamepadButton::West));
        held.set(
            InputAction::Dash,
            self.is_down(GamepadButton::East)
                || self.is_down(GamepadButton::North)
                || self.is_down(GamepadButton::RightShoulder),
        );
        held.set(InputAction::Cancel, self.is_down(GamepadButton::East));
        held.set(InputAction::Leave, self.is_down(GamepadButton::Select));
        held.set(
            InputAction::NavigatePrev,
            self.is_down(GamepadButton::DPadLeft),
        );
        held.set(
            InputAction::NavigateNext,
            self.is_down(GamepadButton::DPadRight),
        );

        SourceSample {
            movement,
            aim: self.right_stick,
            held,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_schemes_use_disjoint_keys() {
        let mut seen = BTreeSet::new();
        for scheme in &BUILTIN_KEY_SCHEMES {
            for key in scheme.keys() {
                assert!(seen.insert(key), "{key:?} shared between schemes");
            }
        }
    }

    #[test]
    fn scheme_sample_ignores_other_schemes_keys() {
        let keyboard = KeyboardState::default()
            .with_pressed(KeyCode::W)
            .with_pressed(KeyCode::F)
            .with_pressed(KeyCode::ArrowLeft);
        let wasd = KeyScheme::builtin(KeySchemeId(0)).expect("wasd").sample(&keyboard);
        let arrows = KeyScheme::builtin(KeySchemeId(1))
            .expect("arrows")
            .sample(&keyboard);

        assert_eq!(wasd.movement, Vec2::new(0.0, 1.0));
        assert!(wasd.held.is_down(InputAction::Confirm));
        assert_eq!(arrows.movement, Vec2::new(-1.0, 0.0));
        assert!(!arrows.held.is_down(InputAction::Confirm));
    }

    #[test]
    fn gamepad_dpad_overrides_stick_movement() {
        let mut pad = GamepadState::default().with_pressed(GamepadButton::DPadRight);
        pad.left_stick = Vec2::new(-0.4, 0.0);
        let sample = pad.sample();
        assert_eq!(sample.movement, Vec2::new(1.0, 0.0));
        assert!(sample.held.is_down(InputAction::NavigateNext));
    }
}
