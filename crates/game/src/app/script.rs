use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use coop_core::{
    GamepadButton, GamepadState, InputSourceRegistry, KeyCode, KeySchemeId, KeyboardState, Vec2,
};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};

use super::arena::ArenaLayout;

#[derive(Debug, Error)]
pub(crate) enum ScriptError {
    #[error("failed to read device script {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("device script is malformed at {json_path}: {source}")]
    Decode {
        json_path: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum StickSide {
    Left,
    Right,
}

/// One scripted change to the simulated devices.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub(crate) enum DeviceEvent {
    ConnectGamepad {
        device: u32,
    },
    DisconnectGamepad {
        device: u32,
    },
    ConnectKeyboard {
        keyboard: u32,
        schemes: Vec<u8>,
    },
    DisconnectKeyboard {
        keyboard: u32,
    },
    KeyDown {
        keyboard: u32,
        key: KeyCode,
    },
    KeyUp {
        keyboard: u32,
        key: KeyCode,
    },
    ButtonDown {
        device: u32,
        button: GamepadButton,
    },
    ButtonUp {
        device: u32,
        button: GamepadButton,
    },
    Stick {
        device: u32,
        side: StickSide,
        x: f32,
        y: f32,
    },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub(crate) struct ScriptEntry {
    pub(crate) tick: u64,
    #[serde(flatten)]
    pub(crate) event: DeviceEvent,
}

#[derive(Debug, Clone, Deserialize)]
struct ScriptFile {
    #[serde(default)]
    max_ticks: Option<u64>,
    #[serde(default)]
    arena: Option<ArenaLayout>,
    #[serde(default)]
    events: Vec<ScriptEntry>,
}

/// Device events keyed by the tick they apply on, consumed in order.
#[derive(Debug, Clone)]
pub(crate) struct DeviceScript {
    entries: Vec<ScriptEntry>,
    cursor: usize,
    max_ticks: Option<u64>,
    arena: Option<ArenaLayout>,
}

impl DeviceScript {
    pub(crate) fn new(mut entries: Vec<ScriptEntry>) -> Self {
        entries.sort_by_key(|entry| entry.tick);
        Self {
            entries,
            cursor: 0,
            max_ticks: None,
            arena: None,
        }
    }

    pub(crate) fn from_json_str(raw: &str) -> Result<Self, ScriptError> {
        let mut deserializer = serde_json::Deserializer::from_str(raw);
        let file: ScriptFile =
            serde_path_to_error::deserialize(&mut deserializer).map_err(|error| {
                let json_path = error.path().to_string();
                ScriptError::Decode {
                    json_path,
                    source: error.into_inner(),
                }
            })?;
        let mut script = Self::new(file.events);
        script.max_ticks = file.max_ticks;
        script.arena = file.arena;
        Ok(script)
    }

    pub(crate) fn from_path(path: &Path) -> Result<Self, ScriptError> {
        let raw = fs::read_to_string(path).map_err(|source| ScriptError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    /// Two local players on one gamepad and one WASD keyboard partition: join, pick,
    /// ready, then walk into the arena.
    pub(crate) fn demo() -> Self {
        let pad = |tick, button, down| ScriptEntry {
            tick,
            event: if down {
                DeviceEvent::ButtonDown { device: 0, button }
            } else {
                DeviceEvent::ButtonUp { device: 0, button }
            },
        };
        let key = |tick, key, down| ScriptEntry {
            tick,
            event: if down {
                DeviceEvent::KeyDown { keyboard: 0, key }
            } else {
                DeviceEvent::KeyUp { keyboard: 0, key }
            },
        };
        let stick = |tick, x, y| ScriptEntry {
            tick,
            event: DeviceEvent::Stick {
                device: 0,
                side: StickSide::Left,
                x,
                y,
            },
        };

        let mut entries = vec![
            ScriptEntry {
                tick: 0,
                event: DeviceEvent::ConnectGamepad { device: 0 },
            },
            ScriptEntry {
                tick: 0,
                event: DeviceEvent::ConnectKeyboard {
                    keyboard: 0,
                    schemes: vec![0],
                },
            },
        ];
        entries.extend([
            pad(2, GamepadButton::South, true),
            pad(3, GamepadButton::South, false),
            key(4, KeyCode::F, true),
            key(5, KeyCode::F, false),
            pad(6, GamepadButton::DPadRight, true),
            pad(7, GamepadButton::DPadRight, false),
            pad(8, GamepadButton::South, true),
            pad(9, GamepadButton::South, false),
            key(10, KeyCode::F, true),
            key(11, KeyCode::F, false),
            stick(240, 1.0, 0.0),
            key(240, KeyCode::D, true),
            pad(300, GamepadButton::West, true),
            pad(301, GamepadButton::West, false),
            key(330, KeyCode::R, true),
            key(331, KeyCode::R, false),
            key(340, KeyCode::F, true),
            key(341, KeyCode::F, false),
            stick(420, 0.0, 0.0),
            key(420, KeyCode::D, false),
        ]);
        let mut script = Self::new(entries);
        script.max_ticks = Some(900);
        script
    }

    pub(crate) fn max_ticks(&self) -> Option<u64> {
        self.max_ticks
    }

    pub(crate) fn take_arena(&mut self) -> Option<ArenaLayout> {
        self.arena.take()
    }

    pub(crate) fn last_tick(&self) -> Option<u64> {
        self.entries.last().map(|entry| entry.tick)
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.cursor >= self.entries.len()
    }

    /// Events due on or before `tick` that have not been handed out yet.
    pub(crate) fn take_due(&mut self, tick: u64) -> Vec<DeviceEvent> {
        let start = self.cursor;
        while self
            .entries
            .get(self.cursor)
            .is_some_and(|entry| entry.tick <= tick)
        {
            self.cursor += 1;
        }
        self.entries[start..self.cursor]
            .iter()
            .map(|entry| entry.event.clone())
            .collect()
    }
}

/// Level state of every simulated device, pushed into the registry once per tick.
#[derive(Debug, Default)]
pub(crate) struct DeviceBank {
    gamepads: BTreeMap<u32, GamepadState>,
    keyboards: BTreeMap<u32, KeyboardState>,
}

impl DeviceBank {
    pub(crate) fn apply(&mut self, event: &DeviceEvent, registry: &mut InputSourceRegistry) {
        match event {
            DeviceEvent::ConnectGamepad { device } => {
                self.gamepads.entry(*device).or_default();
                registry.connect_gamepad(*device);
            }
            DeviceEvent::DisconnectGamepad { device } => {
                self.gamepads.remove(device);
                registry.disconnect_gamepad(*device);
            }
            DeviceEvent::ConnectKeyboard { keyboard, schemes } => {
                self.keyboards.entry(*keyboard).or_default();
                let schemes = schemes.iter().copied().map(KeySchemeId).collect::<Vec<_>>();
                let sources = registry.connect_keyboard(*keyboard, &schemes);
                info!(keyboard, partitions = sources.len(), "keyboard_partitioned");
            }
            DeviceEvent::DisconnectKeyboard { keyboard } => {
                self.keyboards.remove(keyboard);
                registry.disconnect_keyboard(*keyboard);
            }
            DeviceEvent::KeyDown { keyboard, key } => match self.keyboards.get_mut(keyboard) {
                Some(state) => state.press(*key),
                None => debug!(keyboard, "script_key_for_missing_keyboard"),
            },
            DeviceEvent::KeyUp { keyboard, key } => {
                if let Some(state) = self.keyboards.get_mut(keyboard) {
                    state.release(*key);
                }
            }
            DeviceEvent::ButtonDown { device, button } => match self.gamepads.get_mut(device) {
                Some(state) => state.press(*button),
                None => debug!(device, "script_button_for_missing_gamepad"),
            },
            DeviceEvent::ButtonUp { device, button } => {
                if let Some(state) = self.gamepads.get_mut(device) {
                    state.release(*button);
                }
            }
            DeviceEvent::Stick { device, side, x, y } => {
                if let Some(state) = self.gamepads.get_mut(device) {
                    let value = Vec2::new(*x, *y);
                    match side {
                        StickSide::Left => state.left_stick = value,
                        StickSide::Right => state.right_stick = value,
                    }
                }
            }
        }
    }

    pub(crate) fn record_into(&self, registry: &mut InputSourceRegistry) {
        for (device, state) in &self.gamepads {
            registry.record_gamepad(*device, state);
        }
        for (keyboard, state) in &self.keyboards {
            registry.record_keyboard(*keyboard, state);
        }
    }
}
