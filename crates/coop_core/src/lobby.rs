use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::clock::{Countdown, CountdownTick};
use crate::config::CoreConfig;
use crate::ids::{SlotId, SourceId};
use crate::input::{BindError, InputAction, InputSourceRegistry, ReleasedBinding, SourceFrame};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Archetype {
    Ranged,
    Melee,
}

impl Archetype {
    pub const ALL: [Archetype; 2] = [Archetype::Ranged, Archetype::Melee];

    fn position(self) -> usize {
        Self::ALL
            .iter()
            .position(|archetype| *archetype == self)
            .unwrap_or(0)
    }

    /// Moves `steps` entries through `ALL`, wrapping at both ends.
    pub fn stepped(self, steps: i32) -> Archetype {
        let count = Self::ALL.len() as i64;
        let index = (self.position() as i64 + steps as i64).rem_euclid(count);
        Self::ALL[index as usize]
    }

    pub fn as_token(self) -> &'static str {
        match self {
            Archetype::Ranged => "ranged",
            Archetype::Melee => "melee",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotPhase {
    Unjoined,
    Selecting,
    Ready,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayerSlot {
    pub id: SlotId,
    pub phase: SlotPhase,
    pub source: Option<SourceId>,
    pub archetype: Archetype,
    pub joined_at_seconds: Option<f32>,
}

impl PlayerSlot {
    fn unjoined(id: SlotId) -> Self {
        Self {
            id,
            phase: SlotPhase::Unjoined,
            source: None,
            archetype: Archetype::ALL[0],
            joined_at_seconds: None,
        }
    }

    pub fn is_joined(&self) -> bool {
        self.phase != SlotPhase::Unjoined
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigateDirection {
    Prev,
    Next,
}

impl NavigateDirection {
    fn step(self) -> i32 {
        match self {
            NavigateDirection::Prev => -1,
            NavigateDirection::Next => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionGesture {
    Join,
    Navigate(NavigateDirection),
    Confirm,
    Cancel,
    Leave,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinRejection {
    SessionFull,
    Binding(BindError),
    AlreadyStarted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GestureOutcome {
    Joined(SlotId),
    Navigated { slot: SlotId, archetype: Archetype },
    Readied(SlotId),
    Unreadied(SlotId),
    Left(SlotId),
    JoinRejected(JoinRejection),
    Ignored,
}

/// Roster entry handed to the play session when the lobby commits to start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotAssignment {
    pub slot: SlotId,
    pub source: SourceId,
    pub archetype: Archetype,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LobbyTick {
    Idle,
    CountingDown { remaining_seconds: f32 },
    CountdownCancelled,
    Start(Vec<SlotAssignment>),
}

/// Drives the `Unjoined -> Selecting -> Ready` slot lifecycle and the all-ready countdown.
#[derive(Debug)]
pub struct JoinCoordinator {
    slots: Vec<PlayerSlot>,
    countdown: Countdown,
    elapsed_seconds: f32,
    started: bool,
}

impl JoinCoordinator {
    pub fn new(slot_count: u8, countdown_seconds: f32) -> Self {
        Self {
            slots: (0..slot_count).map(|id| PlayerSlot::unjoined(SlotId(id))).collect(),
            countdown: Countdown::new(countdown_seconds),
            elapsed_seconds: 0.0,
            started: false,
        }
    }

    pub fn from_config(config: &CoreConfig) -> Self {
        Self::new(
            config.session.slot_count,
            config.session.join_countdown_seconds,
        )
    }

    pub fn slots(&self) -> &[PlayerSlot] {
        &self.slots
    }

    pub fn slot(&self, id: SlotId) -> Option<&PlayerSlot> {
        self.slots.get(id.index())
    }

    pub fn phase_of(&self, id: SlotId) -> Option<SlotPhase> {
        self.slot(id).map(|slot| slot.phase)
    }

    pub fn joined_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_joined()).count()
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn countdown_remaining(&self) -> Option<f32> {
        self.countdown
            .is_running()
            .then(|| self.countdown.remaining_seconds())
    }

    /// At least one joined slot and every joined slot Ready.
    pub fn all_ready(&self) -> bool {
        let mut joined = 0;
        for slot in &self.slots {
            match slot.phase {
                SlotPhase::Unjoined => {}
                SlotPhase::Selecting => return false,
                SlotPhase::Ready => joined += 1,
            }
        }
        joined > 0
    }

    /// Full restart back to an empty lobby; bindings are released through `registry`.
    pub fn reset(&mut self, registry: &mut InputSourceRegistry) {
        for slot in &mut self.slots {
            if let Some(source) = slot.source {
                registry.unbind(source);
            }
            *slot = PlayerSlot::unjoined(slot.id);
        }
        self.countdown.reset();
        self.started = false;
    }

    pub fn gestures_for_frame(frame: &SourceFrame, bound: bool) -> Vec<SessionGesture> {
        if !bound {
            if frame.pressed(InputAction::Confirm) {
                return vec![SessionGesture::Join];
            }
            return Vec::new();
        }
        if frame.pressed(InputAction::Leave) {
            return vec![SessionGesture::Leave];
        }
        let mut gestures = Vec::new();
        if frame.pressed(InputAction::Cancel) {
            gestures.push(SessionGesture::Cancel);
        }
        if frame.pressed(InputAction::Confirm) {
            gestures.push(SessionGesture::Confirm);
        }
        if frame.pressed(InputAction::NavigatePrev) {
            gestures.push(SessionGesture::Navigate(NavigateDirection::Prev));
        }
        if frame.pressed(InputAction::NavigateNext) {
            gestures.push(SessionGesture::Navigate(NavigateDirection::Next));
        }
        gestures
    }

    /// Applies released bindings as implicit leaves, then every source's gestures in
    /// source order.
    pub fn process_input(&mut self, registry: &mut InputSourceRegistry) -> Vec<GestureOutcome> {
        let mut outcomes = Vec::new();
        for released in registry.take_released() {
            if let Some(outcome) = self.handle_release(released) {
                outcomes.push(outcome);
            }
        }
        for source in registry.available_sources() {
            let Some(frame) = registry.frame(source) else {
                continue;
            };
            let bound = registry.owner_of(source).is_some();
            for gesture in Self::gestures_for_frame(&frame, bound) {
                let outcome = self.handle_gesture(registry, source, gesture);
                if outcome != GestureOutcome::Ignored {
                    outcomes.push(outcome);
                }
            }
        }
        outcomes
    }

    pub fn handle_gesture(
        &mut self,
        registry: &mut InputSourceRegistry,
        source: SourceId,
        gesture: SessionGesture,
    ) -> GestureOutcome {
        if self.started {
            return match gesture {
                SessionGesture::Join => GestureOutcome::JoinRejected(JoinRejection::AlreadyStarted),
                _ => GestureOutcome::Ignored,
            };
        }
        if gesture == SessionGesture::Join {
            return self.join(registry, source);
        }

        let Some(slot_id) = registry.owner_of(source) else {
            return GestureOutcome::Ignored;
        };
        let Some(slot) = self.slots.get_mut(slot_id.index()) else {
            return GestureOutcome::Ignored;
        };

        match (gesture, slot.phase) {
            (SessionGesture::Navigate(direction), SlotPhase::Selecting) => {
                slot.archetype = slot.archetype.stepped(direction.step());
                debug!(
                    slot = %slot_id,
                    archetype = slot.archetype.as_token(),
                    "archetype_selected"
                );
                GestureOutcome::Navigated {
                    slot: slot_id,
                    archetype: slot.archetype,
                }
            }
            (SessionGesture::Confirm, SlotPhase::Selecting) => {
                slot.phase = SlotPhase::Ready;
                info!(slot = %slot_id, archetype = slot.archetype.as_token(), "slot_ready");
                GestureOutcome::Readied(slot_id)
            }
            (SessionGesture::Cancel, SlotPhase::Ready) => {
                slot.phase = SlotPhase::Selecting;
                info!(slot = %slot_id, "slot_unready");
                self.cancel_countdown_if_running();
                GestureOutcome::Unreadied(slot_id)
            }
            (SessionGesture::Leave, SlotPhase::Selecting | SlotPhase::Ready) => {
                registry.unbind(source);
                *slot = PlayerSlot::unjoined(slot_id);
                info!(slot = %slot_id, source = %source, "slot_left");
                self.cancel_countdown_if_running();
                GestureOutcome::Left(slot_id)
            }
            _ => GestureOutcome::Ignored,
        }
    }

    /// Implicit leave for a slot whose source disconnected.
    pub fn handle_release(&mut self, released: ReleasedBinding) -> Option<GestureOutcome> {
        let slot = self.slots.get_mut(released.slot.index())?;
        if slot.source != Some(released.source) || !slot.is_joined() {
            return None;
        }
        *slot = PlayerSlot::unjoined(released.slot);
        info!(slot = %released.slot, source = %released.source, "slot_left_on_disconnect");
        self.cancel_countdown_if_running();
        Some(GestureOutcome::Left(released.slot))
    }

    fn join(&mut self, registry: &mut InputSourceRegistry, source: SourceId) -> GestureOutcome {
        let Some(slot_id) = self
            .slots
            .iter()
            .find(|slot| slot.phase == SlotPhase::Unjoined)
            .map(|slot| slot.id)
        else {
            debug!(source = %source, "join_rejected_session_full");
            return GestureOutcome::JoinRejected(JoinRejection::SessionFull);
        };
        if let Err(error) = registry.bind(source, slot_id) {
            debug!(source = %source, slot = %slot_id, error = %error, "join_rejected_binding");
            return GestureOutcome::JoinRejected(JoinRejection::Binding(error));
        }
        let joined_at = self.elapsed_seconds;
        let slot = &mut self.slots[slot_id.index()];
        slot.phase = SlotPhase::Selecting;
        slot.source = Some(source);
        slot.archetype = Archetype::ALL[0];
        slot.joined_at_seconds = Some(joined_at);
        info!(slot = %slot_id, source = %source, "slot_joined");
        self.cancel_countdown_if_running();
        GestureOutcome::Joined(slot_id)
    }

    fn cancel_countdown_if_running(&mut self) {
        if self.countdown.is_running() {
            self.countdown.reset();
            info!("start_countdown_cancelled");
        }
    }

    fn roster(&self) -> Vec<SlotAssignment> {
        self.slots
            .iter()
            .filter(|slot| slot.phase == SlotPhase::Ready)
            .filter_map(|slot| {
                slot.source.map(|source| SlotAssignment {
                    slot: slot.id,
                    source,
                    archetype: slot.archetype,
                })
            })
            .collect()
    }

    /// Ready slots must still hold the source the registry says they own.
    fn bindings_still_valid(&self, registry: &InputSourceRegistry) -> bool {
        self.slots
            .iter()
            .filter(|slot| slot.is_joined())
            .all(|slot| match slot.source {
                Some(source) => registry.owner_of(source) == Some(slot.id),
                None => false,
            })
    }

    pub fn tick(&mut self, dt_seconds: f32, registry: &InputSourceRegistry) -> LobbyTick {
        self.elapsed_seconds += dt_seconds.max(0.0);
        if self.started {
            return LobbyTick::Idle;
        }
        if !self.all_ready() {
            if self.countdown.is_running() {
                self.countdown.reset();
                info!("start_countdown_cancelled");
                return LobbyTick::CountdownCancelled;
            }
            return LobbyTick::Idle;
        }
        if !self.countdown.is_running() {
            self.countdown.start();
            info!(
                joined = self.joined_count(),
                seconds = self.countdown.duration_seconds(),
                "start_countdown_begun"
            );
        }
        match self.countdown.tick(dt_seconds) {
            CountdownTick::Inactive => LobbyTick::Idle,
            CountdownTick::Pending => LobbyTick::CountingDown {
                remaining_seconds: self.countdown.remaining_seconds(),
            },
            CountdownTick::Fired => {
                if self.all_ready() && self.bindings_still_valid(registry) {
                    self.started = true;
                    let roster = self.roster();
                    info!(players = roster.len(), "session_start_committed");
                    LobbyTick::Start(roster)
                } else {
                    self.countdown.reset();
                    info!("session_start_recheck_failed");
                    LobbyTick::Idle
                }
            }
        }
    }
}
