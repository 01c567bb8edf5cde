use std::collections::BTreeMap;

use tracing::info;

use crate::clock::{Countdown, CountdownState, CountdownTick};
use crate::config::OutcomePolicy;
use crate::ids::SlotId;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DeathVerdict {
    RespawnScheduled { delay_seconds: f32 },
    GameOver,
    /// Death recorded after the session had already ended; nothing is scheduled.
    AfterGameOver,
}

/// Death counters, the terminal game-over flag and the pending respawn timers.
#[derive(Debug)]
pub struct SessionOutcome {
    policy: OutcomePolicy,
    respawn_delay_seconds: f32,
    shared_deaths: u32,
    deaths_by_slot: BTreeMap<SlotId, u32>,
    game_over: bool,
    respawns: BTreeMap<SlotId, Countdown>,
}

impl SessionOutcome {
    pub fn new(policy: OutcomePolicy, respawn_delay_seconds: f32) -> Self {
        Self {
            policy,
            respawn_delay_seconds,
            shared_deaths: 0,
            deaths_by_slot: BTreeMap::new(),
            game_over: false,
            respawns: BTreeMap::new(),
        }
    }

    pub fn policy(&self) -> OutcomePolicy {
        self.policy
    }

    pub fn shared_deaths(&self) -> u32 {
        self.shared_deaths
    }

    pub fn deaths_of(&self, slot: SlotId) -> u32 {
        self.deaths_by_slot.get(&slot).copied().unwrap_or(0)
    }

    pub fn is_game_over(&self) -> bool {
        self.game_over
    }

    /// Seconds left on `slot`'s respawn timer while it is still running.
    pub fn respawn_remaining(&self, slot: SlotId) -> Option<f32> {
        self.respawns
            .get(&slot)
            .filter(|countdown| countdown.is_running())
            .map(Countdown::remaining_seconds)
    }

    pub fn respawn_state(&self, slot: SlotId) -> Option<CountdownState> {
        self.respawns.get(&slot).map(Countdown::state)
    }

    pub fn pending_respawns(&self) -> usize {
        self.respawns
            .values()
            .filter(|countdown| countdown.is_running())
            .count()
    }

    fn limit_reached(&self, slot: SlotId) -> bool {
        match self.policy {
            OutcomePolicy::Unlimited => false,
            OutcomePolicy::SharedPool { limit } => self.shared_deaths >= limit,
            OutcomePolicy::PerPlayerCap { limit } => self.deaths_of(slot) >= limit,
        }
    }

    pub fn record_death(&mut self, slot: SlotId) -> DeathVerdict {
        let personal = self.deaths_by_slot.entry(slot).or_insert(0);
        *personal = personal.saturating_add(1);
        let personal = *personal;
        self.shared_deaths = self.shared_deaths.saturating_add(1);
        info!(
            slot = %slot,
            deaths = personal,
            shared_deaths = self.shared_deaths,
            "player_death_recorded"
        );

        if self.game_over {
            return DeathVerdict::AfterGameOver;
        }
        if self.limit_reached(slot) {
            self.enter_game_over();
            return DeathVerdict::GameOver;
        }

        self.respawns
            .insert(slot, Countdown::started(self.respawn_delay_seconds));
        DeathVerdict::RespawnScheduled {
            delay_seconds: self.respawn_delay_seconds,
        }
    }

    fn enter_game_over(&mut self) {
        self.game_over = true;
        let mut cancelled = 0;
        for countdown in self.respawns.values_mut() {
            if countdown.is_running() {
                countdown.cancel();
                cancelled += 1;
            }
        }
        info!(
            shared_deaths = self.shared_deaths,
            cancelled_respawns = cancelled,
            "session_game_over"
        );
    }

    /// Advances respawn timers and returns the slots whose timer completed this tick.
    pub fn tick(&mut self, dt_seconds: f32) -> Vec<SlotId> {
        let mut completed = Vec::new();
        for (slot, countdown) in &mut self.respawns {
            if countdown.tick(dt_seconds) == CountdownTick::Fired {
                completed.push(*slot);
            }
        }
        if self.game_over {
            // Timers are cancelled on game-over; nothing may complete afterwards.
            completed.clear();
        }
        for slot in &completed {
            self.respawns.remove(slot);
        }
        completed
    }
}
