use thiserror::Error;
use tracing::{info, warn};

use crate::ids::{CheckpointId, SlotId};
use crate::math::Vec2;

#[derive(Debug, Clone, PartialEq)]
pub struct Checkpoint {
    pub id: CheckpointId,
    pub anchors: Vec<Vec2>,
    pub is_starting: bool,
}

impl Checkpoint {
    pub fn new(id: CheckpointId, anchors: Vec<Vec2>) -> Self {
        Self {
            id,
            anchors,
            is_starting: false,
        }
    }

    pub fn starting(id: CheckpointId, anchors: Vec<Vec2>) -> Self {
        Self {
            id,
            anchors,
            is_starting: true,
        }
    }

    /// Players are spread over anchors by slot index, wrapping when there are more
    /// players than anchors.
    pub fn anchor_for(&self, slot: SlotId) -> Option<Vec2> {
        if self.anchors.is_empty() {
            return None;
        }
        Some(self.anchors[slot.index() % self.anchors.len()])
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CheckpointError {
    #[error("{0} is already registered")]
    DuplicateId(CheckpointId),
    #[error("{0} has no spawn anchors")]
    NoSpawnAnchors(CheckpointId),
    #[error("{0} is not registered")]
    UnknownCheckpoint(CheckpointId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    Activated { previous: Option<CheckpointId> },
    AlreadyActive,
}

/// Where a spawn position came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpawnSource {
    Active(CheckpointId),
    Starting(CheckpointId),
    Origin,
}

/// Ordered checkpoints with at most one active. Sole writer of the active id.
#[derive(Debug, Default)]
pub struct CheckpointRegistry {
    checkpoints: Vec<Checkpoint>,
    active: Option<CheckpointId>,
}

impl CheckpointRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, checkpoint: Checkpoint) -> Result<(), CheckpointError> {
        if self.get(checkpoint.id).is_some() {
            return Err(CheckpointError::DuplicateId(checkpoint.id));
        }
        if checkpoint.anchors.is_empty() {
            return Err(CheckpointError::NoSpawnAnchors(checkpoint.id));
        }
        info!(
            checkpoint = %checkpoint.id,
            anchors = checkpoint.anchors.len(),
            starting = checkpoint.is_starting,
            "checkpoint_registered"
        );
        self.checkpoints.push(checkpoint);
        Ok(())
    }

    pub fn get(&self, id: CheckpointId) -> Option<&Checkpoint> {
        self.checkpoints.iter().find(|checkpoint| checkpoint.id == id)
    }

    pub fn len(&self) -> usize {
        self.checkpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checkpoints.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Checkpoint> {
        self.checkpoints.iter()
    }

    pub fn activate(&mut self, id: CheckpointId) -> Result<Activation, CheckpointError> {
        if self.get(id).is_none() {
            return Err(CheckpointError::UnknownCheckpoint(id));
        }
        if self.active == Some(id) {
            return Ok(Activation::AlreadyActive);
        }
        let previous = self.active.replace(id);
        info!(
            checkpoint = %id,
            previous = ?previous.map(|previous| previous.0),
            "checkpoint_activated"
        );
        Ok(Activation::Activated { previous })
    }

    pub fn active(&self) -> Option<&Checkpoint> {
        self.active.and_then(|id| self.get(id))
    }

    pub fn active_id(&self) -> Option<CheckpointId> {
        self.active
    }

    pub fn is_active(&self, id: CheckpointId) -> bool {
        self.active == Some(id)
    }

    /// First registered checkpoint flagged as starting.
    pub fn starting(&self) -> Option<&Checkpoint> {
        self.checkpoints.iter().find(|checkpoint| checkpoint.is_starting)
    }

    pub fn spawn_position(&self, slot: SlotId) -> Vec2 {
        self.resolve_spawn(slot).0
    }

    /// Active checkpoint, then the starting checkpoint, then the world origin.
    pub fn resolve_spawn(&self, slot: SlotId) -> (Vec2, SpawnSource) {
        if let Some(active) = self.active() {
            if let Some(anchor) = active.anchor_for(slot) {
                return (anchor, SpawnSource::Active(active.id));
            }
        }
        if let Some(starting) = self.starting() {
            if let Some(anchor) = starting.anchor_for(slot) {
                return (anchor, SpawnSource::Starting(starting.id));
            }
        }
        warn!(
            slot = %slot,
            registered = self.checkpoints.len(),
            "spawn_fallback_origin"
        );
        (Vec2::ZERO, SpawnSource::Origin)
    }
}
