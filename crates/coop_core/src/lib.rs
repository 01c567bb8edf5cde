//! Session and combat core for local co-op play: input-source binding, the lobby
//! join/select flow, per-player ability state, checkpoints and death/respawn outcome.
//!
//! Everything is advanced by one synchronous tick per simulation frame.

pub mod ability;
pub mod checkpoint;
pub mod clock;
pub mod config;
pub mod events;
pub mod ids;
pub mod input;
pub mod lobby;
pub mod math;
pub mod outcome;
pub mod persistence;
pub mod session;

pub use ability::{
    resolve_aim, AbilityState, DiscardReason, GuardEntity, GuardRoster, HitOutcome, IncomingHit,
    LifeState, PlayerEntity,
};
pub use checkpoint::{Activation, Checkpoint, CheckpointError, CheckpointRegistry, SpawnSource};
pub use clock::{AbilityClock, AbilityKind, Cooldown, Countdown, CountdownState, CountdownTick};
pub use config::{ConfigError, CoreConfig, GuardSelfDamage, OutcomePolicy};
pub use events::{
    CollisionCategory, CollisionFact, CoreEvent, CoreEventKind, EffectRequest, GuardEndCause,
    OpenField, PhysicsQuery,
};
pub use ids::{CheckpointId, EntityId, ExternalId, SlotId, SourceId};
pub use input::{
    BindError, GamepadButton, GamepadState, InputAction, InputSourceRegistry, KeyCode,
    KeySchemeId, KeyboardState, UnbindOutcome,
};
pub use lobby::{
    Archetype, GestureOutcome, JoinCoordinator, LobbyTick, PlayerSlot, SessionGesture,
    SlotAssignment, SlotPhase,
};
pub use math::Vec2;
pub use outcome::{DeathVerdict, SessionOutcome};
pub use persistence::{
    CheckpointStore, JsonFileCheckpointStore, MemoryCheckpointStore, PersistenceError,
};
pub use session::{PlayerHud, PlaySession, SessionStartError, SystemId, SYSTEM_ORDER};
