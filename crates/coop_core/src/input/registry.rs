use std::collections::{BTreeMap, BTreeSet};

use thiserror::Error;
use tracing::{debug, info};

use super::actions::{ActionStates, InputAction, SourceFrame, SourceSample};
use super::devices::{GamepadState, KeyScheme, KeySchemeId, KeyboardState};
use crate::ids::{SlotId, SourceId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Gamepad { device_index: u32 },
    KeyboardPartition { keyboard: u32, scheme: KeySchemeId },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceCapabilities {
    pub has_stick: bool,
    pub has_dpad: bool,
    pub key_scheme: Option<KeySchemeId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceDescriptor {
    pub id: SourceId,
    pub kind: SourceKind,
    pub capabilities: SourceCapabilities,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BindError {
    #[error("{0} is not connected")]
    UnknownSource(SourceId),
    #[error("{source_id} is already bound to {owner}")]
    AlreadyBound { source_id: SourceId, owner: SlotId },
    #[error("{slot} already holds {holder}")]
    SlotOccupied { slot: SlotId, holder: SourceId },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnbindOutcome {
    Released(SlotId),
    NotBound,
}

/// A binding dropped because its source disconnected. The owner of the slot lifecycle
/// treats it as an implicit leave.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReleasedBinding {
    pub source: SourceId,
    pub slot: SlotId,
}

#[derive(Debug, Clone)]
struct SourceRecord {
    descriptor: SourceDescriptor,
    owner: Option<SlotId>,
    current: SourceSample,
    previous_held: ActionStates,
}

/// Connected input sources and their exclusive slot bindings. Every mutation of the
/// binding tables goes through `bind`, `unbind` and the disconnect calls.
#[derive(Debug)]
pub struct InputSourceRegistry {
    navigate_threshold: f32,
    next_source_id: u32,
    sources: BTreeMap<SourceId, SourceRecord>,
    source_by_slot: BTreeMap<SlotId, SourceId>,
    released: Vec<ReleasedBinding>,
}

impl Default for InputSourceRegistry {
    fn default() -> Self {
        Self::new(0.5)
    }
}

impl InputSourceRegistry {
    pub fn new(navigate_threshold: f32) -> Self {
        Self {
            navigate_threshold,
            next_source_id: 0,
            sources: BTreeMap::new(),
            source_by_slot: BTreeMap::new(),
            released: Vec::new(),
        }
    }

    fn alloc_source_id(&mut self) -> SourceId {
        let id = SourceId(self.next_source_id);
        self.next_source_id = self.next_source_id.saturating_add(1);
        id
    }

    fn find_source(&self, kind: SourceKind) -> Option<SourceId> {
        self.sources
            .values()
            .find(|record| record.descriptor.kind == kind)
            .map(|record| record.descriptor.id)
    }

    fn insert_source(&mut self, kind: SourceKind, capabilities: SourceCapabilities) -> SourceId {
        if let Some(existing) = self.find_source(kind) {
            return existing;
        }
        let id = self.alloc_source_id();
        self.sources.insert(
            id,
            SourceRecord {
                descriptor: SourceDescriptor {
                    id,
                    kind,
                    capabilities,
                },
                owner: None,
                current: SourceSample::default(),
                previous_held: ActionStates::default(),
            },
        );
        info!(source = %id, kind = ?kind, "source_connected");
        id
    }

    pub fn connect_gamepad(&mut self, device_index: u32) -> SourceId {
        self.insert_source(
            SourceKind::Gamepad { device_index },
            SourceCapabilities {
                has_stick: true,
                has_dpad: true,
                key_scheme: None,
            },
        )
    }

    /// One virtual source per scheme, all sharing the physical `keyboard`.
    pub fn connect_keyboard(&mut self, keyboard: u32, schemes: &[KeySchemeId]) -> Vec<SourceId> {
        let mut ids = Vec::with_capacity(schemes.len());
        for scheme in schemes {
            if KeyScheme::builtin(*scheme).is_none() {
                debug!(keyboard, scheme = scheme.0, "unknown_key_scheme_skipped");
                continue;
            }
            let id = self.insert_source(
                SourceKind::KeyboardPartition {
                    keyboard,
                    scheme: *scheme,
                },
                SourceCapabilities {
                    has_stick: false,
                    has_dpad: false,
                    key_scheme: Some(*scheme),
                },
            );
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        ids
    }

    /// Removes the source. A bound source releases its slot and queues an implicit leave.
    pub fn disconnect(&mut self, source: SourceId) -> Option<SlotId> {
        let record = self.sources.remove(&source)?;
        info!(source = %source, "source_disconnected");
        let slot = record.owner?;
        self.source_by_slot.remove(&slot);
        self.released.push(ReleasedBinding { source, slot });
        info!(source = %source, slot = %slot, "binding_released_on_disconnect");
        Some(slot)
    }

    pub fn disconnect_gamepad(&mut self, device_index: u32) -> Option<SlotId> {
        let source = self.find_source(SourceKind::Gamepad { device_index })?;
        self.disconnect(source)
    }

    /// Drops every partition of the physical keyboard.
    pub fn disconnect_keyboard(&mut self, keyboard: u32) -> Vec<SlotId> {
        let partitions = self
            .sources
            .values()
            .filter(|record| {
                matches!(
                    record.descriptor.kind,
                    SourceKind::KeyboardPartition { keyboard: k, .. } if k == keyboard
                )
            })
            .map(|record| record.descriptor.id)
            .collect::<Vec<_>>();
        partitions
            .into_iter()
            .filter_map(|source| self.disconnect(source))
            .collect()
    }

    pub fn take_released(&mut self) -> Vec<ReleasedBinding> {
        std::mem::take(&mut self.released)
    }

    pub fn available_sources(&self) -> BTreeSet<SourceId> {
        self.sources.keys().copied().collect()
    }

    pub fn free_sources(&self) -> BTreeSet<SourceId> {
        self.sources
            .values()
            .filter(|record| record.owner.is_none())
            .map(|record| record.descriptor.id)
            .collect()
    }

    pub fn descriptor(&self, source: SourceId) -> Option<&SourceDescriptor> {
        self.sources.get(&source).map(|record| &record.descriptor)
    }

    pub fn is_connected(&self, source: SourceId) -> bool {
        self.sources.contains_key(&source)
    }

    pub fn bind(&mut self, source: SourceId, slot: SlotId) -> Result<(), BindError> {
        let Some(record) = self.sources.get(&source) else {
            return Err(BindError::UnknownSource(source));
        };
        if let Some(owner) = record.owner {
            debug!(source = %source, owner = %owner, "bind_rejected_already_bound");
            return Err(BindError::AlreadyBound {
                source_id: source,
                owner,
            });
        }
        if let Some(holder) = self.source_by_slot.get(&slot).copied() {
            debug!(slot = %slot, holder = %holder, "bind_rejected_slot_occupied");
            return Err(BindError::SlotOccupied { slot, holder });
        }
        if let Some(record) = self.sources.get_mut(&source) {
            record.owner = Some(slot);
        }
        self.source_by_slot.insert(slot, source);
        Ok(())
    }

    pub fn unbind(&mut self, source: SourceId) -> UnbindOutcome {
        let Some(record) = self.sources.get_mut(&source) else {
            return UnbindOutcome::NotBound;
        };
        let Some(slot) = record.owner.take() else {
            return UnbindOutcome::NotBound;
        };
        self.source_by_slot.remove(&slot);
        UnbindOutcome::Released(slot)
    }

    pub fn owner_of(&self, source: SourceId) -> Option<SlotId> {
        self.sources.get(&source).and_then(|record| record.owner)
    }

    pub fn source_for_slot(&self, slot: SlotId) -> Option<SourceId> {
        self.source_by_slot.get(&slot).copied()
    }

    /// Stores the level state of a source for the current frame. Stick or key movement
    /// past the navigate threshold also counts as a held navigate action.
    pub fn record_sample(&mut self, source: SourceId, mut sample: SourceSample) {
        let threshold = self.navigate_threshold;
        let Some(record) = self.sources.get_mut(&source) else {
            return;
        };
        if sample.movement.x <= -threshold {
            sample.held.press(InputAction::NavigatePrev);
        }
        if sample.movement.x >= threshold {
            sample.held.press(InputAction::NavigateNext);
        }
        record.current = sample;
    }

    pub fn record_gamepad(&mut self, device_index: u32, state: &GamepadState) {
        if let Some(source) = self.find_source(SourceKind::Gamepad { device_index }) {
            self.record_sample(source, state.sample());
        }
    }

    /// Splits one physical keyboard state into its partitions' samples.
    pub fn record_keyboard(&mut self, keyboard: u32, state: &KeyboardState) {
        let partitions = self
            .sources
            .values()
            .filter_map(|record| match record.descriptor.kind {
                SourceKind::KeyboardPartition { keyboard: k, scheme } if k == keyboard => {
                    Some((record.descriptor.id, scheme))
                }
                _ => None,
            })
            .collect::<Vec<_>>();
        for (source, scheme_id) in partitions {
            if let Some(scheme) = KeyScheme::builtin(scheme_id) {
                self.record_sample(source, scheme.sample(state));
            }
        }
    }

    pub fn frame(&self, source: SourceId) -> Option<SourceFrame> {
        let record = self.sources.get(&source)?;
        Some(SourceFrame {
            movement: record.current.movement,
            aim: record.current.aim,
            held: record.current.held,
            pressed: record.current.held.rising_edges(&record.previous_held),
        })
    }

    /// Rolls level state into history so each press is an edge for exactly one tick.
    pub fn finish_frame(&mut self) {
        for record in self.sources.values_mut() {
            record.previous_held = record.current.held;
        }
    }

    #[cfg(test)]
    fn binding_tables_agree(&self) -> bool {
        let from_records = self
            .sources
            .values()
            .filter_map(|record| record.owner.map(|slot| (slot, record.descriptor.id)))
            .collect::<BTreeMap<_, _>>();
        let owners = self
            .sources
            .values()
            .filter_map(|record| record.owner)
            .collect::<Vec<_>>();
        from_records.len() == owners.len() && from_records == self.source_by_slot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::{KeyCode, BUILTIN_KEY_SCHEMES};
    use proptest::prelude::*;

    #[test]
    fn bind_is_exclusive_in_both_directions() {
        let mut registry = InputSourceRegistry::default();
        let pad_a = registry.connect_gamepad(0);
        let pad_b = registry.connect_gamepad(1);

        registry.bind(pad_a, SlotId(0)).expect("bind");
        assert_eq!(
            registry.bind(pad_a, SlotId(1)),
            Err(BindError::AlreadyBound {
                source_id: pad_a,
                owner: SlotId(0)
            })
        );
        assert_eq!(
            registry.bind(pad_b, SlotId(0)),
            Err(BindError::SlotOccupied {
                slot: SlotId(0),
                holder: pad_a
            })
        );
        assert_eq!(registry.owner_of(pad_a), Some(SlotId(0)));
        assert_eq!(registry.owner_of(pad_b), None);
    }

    #[test]
    fn unbind_is_idempotent() {
        let mut registry = InputSourceRegistry::default();
        let pad = registry.connect_gamepad(0);
        registry.bind(pad, SlotId(2)).expect("bind");
        assert_eq!(registry.unbind(pad), UnbindOutcome::Released(SlotId(2)));
        assert_eq!(registry.unbind(pad), UnbindOutcome::NotBound);
        assert_eq!(registry.unbind(pad), UnbindOutcome::NotBound);
        assert_eq!(registry.source_for_slot(SlotId(2)), None);
    }

    #[test]
    fn bind_unknown_source_is_rejected() {
        let mut registry = InputSourceRegistry::default();
        assert_eq!(
            registry.bind(SourceId(9), SlotId(0)),
            Err(BindError::UnknownSource(SourceId(9)))
        );
    }

    #[test]
    fn disconnect_releases_binding_and_queues_leave() {
        let mut registry = InputSourceRegistry::default();
        let pad = registry.connect_gamepad(3);
        registry.bind(pad, SlotId(1)).expect("bind");

        assert_eq!(registry.disconnect_gamepad(3), Some(SlotId(1)));
        assert_eq!(registry.source_for_slot(SlotId(1)), None);
        assert_eq!(
            registry.take_released(),
            vec![ReleasedBinding {
                source: pad,
                slot: SlotId(1)
            }]
        );
        assert!(registry.take_released().is_empty());
        assert!(!registry.is_connected(pad));
    }

    #[test]
    fn keyboard_partitions_are_independent_sources() {
        let mut registry = InputSourceRegistry::default();
        let schemes = [BUILTIN_KEY_SCHEMES[0].id, BUILTIN_KEY_SCHEMES[1].id];
        let ids = registry.connect_keyboard(0, &schemes);
        assert_eq!(ids.len(), 2);
        registry.bind(ids[0], SlotId(0)).expect("bind wasd");
        registry.bind(ids[1], SlotId(1)).expect("bind arrows");

        let keyboard = KeyboardState::default().with_pressed(KeyCode::Period);
        registry.record_keyboard(0, &keyboard);
        let wasd = registry.frame(ids[0]).expect("wasd frame");
        let arrows = registry.frame(ids[1]).expect("arrows frame");
        assert!(!wasd.pressed(InputAction::Confirm));
        assert!(arrows.pressed(InputAction::Confirm));

        assert_eq!(registry.disconnect_keyboard(0), vec![SlotId(0), SlotId(1)]);
        assert!(registry.available_sources().is_empty());
    }

    #[test]
    fn reconnecting_same_device_returns_existing_source() {
        let mut registry = InputSourceRegistry::default();
        let first = registry.connect_gamepad(0);
        let again = registry.connect_gamepad(0);
        assert_eq!(first, again);
        assert_eq!(registry.available_sources().len(), 1);
    }

    #[test]
    fn held_button_is_an_edge_for_one_frame_only() {
        let mut registry = InputSourceRegistry::default();
        let pad = registry.connect_gamepad(0);
        let held = GamepadState::default().with_pressed(crate::input::GamepadButton::South);

        registry.record_gamepad(0, &held);
        assert!(registry.frame(pad).expect("frame").pressed(InputAction::Primary));
        registry.finish_frame();

        registry.record_gamepad(0, &held);
        let frame = registry.frame(pad).expect("frame");
        assert!(frame.held.is_down(InputAction::Primary));
        assert!(!frame.pressed(InputAction::Primary));
    }

    #[test]
    fn stick_past_threshold_latches_one_navigate_edge() {
        let mut registry = InputSourceRegistry::new(0.5);
        let pad = registry.connect_gamepad(0);
        let mut state = GamepadState::default();
        state.left_stick = crate::math::Vec2::new(0.9, 0.0);

        let mut edges = 0;
        for _ in 0..5 {
            registry.record_gamepad(0, &state);
            if registry.frame(pad).expect("frame").pressed(InputAction::NavigateNext) {
                edges += 1;
            }
            registry.finish_frame();
        }
        assert_eq!(edges, 1);
    }

    #[derive(Debug, Clone)]
    enum RegistryOp {
        Bind { source: u32, slot: u8 },
        Unbind { source: u32 },
        Disconnect { device: u32 },
        Connect { device: u32 },
    }

    fn registry_op() -> impl Strategy<Value = RegistryOp> {
        prop_oneof![
            (0u32..6, 0u8..4).prop_map(|(source, slot)| RegistryOp::Bind { source, slot }),
            (0u32..6).prop_map(|source| RegistryOp::Unbind { source }),
            (0u32..4).prop_map(|device| RegistryOp::Disconnect { device }),
            (0u32..4).prop_map(|device| RegistryOp::Connect { device }),
        ]
    }

    proptest! {
        #[test]
        fn at_most_one_source_per_slot(ops in proptest::collection::vec(registry_op(), 0..64)) {
            let mut registry = InputSourceRegistry::default();
            for device in 0..4 {
                registry.connect_gamepad(device);
            }
            for op in ops {
                match op {
                    RegistryOp::Bind { source, slot } => {
                        let _ = registry.bind(SourceId(source), SlotId(slot));
                    }
                    RegistryOp::Unbind { source } => {
                        let _ = registry.unbind(SourceId(source));
                    }
                    RegistryOp::Disconnect { device } => {
                        let _ = registry.disconnect_gamepad(device);
                    }
                    RegistryOp::Connect { device } => {
                        registry.connect_gamepad(device);
                    }
                }
                prop_assert!(registry.binding_tables_agree());
                for slot in 0..4u8 {
                    let holders = registry
                        .available_sources()
                        .into_iter()
                        .filter(|source| registry.owner_of(*source) == Some(SlotId(slot)))
                        .count();
                    prop_assert!(holders <= 1);
                }
            }
        }
    }
}
