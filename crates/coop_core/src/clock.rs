#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AbilityKind {
    Primary,
    Guard,
    Dash,
}

impl AbilityKind {
    pub const ALL: [AbilityKind; 3] = [AbilityKind::Primary, AbilityKind::Guard, AbilityKind::Dash];

    const fn index(self) -> usize {
        match self {
            AbilityKind::Primary => 0,
            AbilityKind::Guard => 1,
            AbilityKind::Dash => 2,
        }
    }

    pub fn as_token(self) -> &'static str {
        match self {
            AbilityKind::Primary => "primary",
            AbilityKind::Guard => "guard",
            AbilityKind::Dash => "dash",
        }
    }
}

/// Time-remaining value that counts down to zero and stays there until restarted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cooldown {
    interval_seconds: f32,
    remaining_seconds: f32,
}

impl Cooldown {
    pub fn new(interval_seconds: f32) -> Self {
        Self {
            interval_seconds: sanitize_seconds(interval_seconds),
            remaining_seconds: 0.0,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.remaining_seconds <= 0.0
    }

    pub fn start(&mut self) {
        self.remaining_seconds = self.interval_seconds;
    }

    pub fn clear(&mut self) {
        self.remaining_seconds = 0.0;
    }

    pub fn tick(&mut self, dt_seconds: f32) {
        self.remaining_seconds = (self.remaining_seconds - sanitize_seconds(dt_seconds)).max(0.0);
    }

    pub fn remaining_seconds(&self) -> f32 {
        self.remaining_seconds
    }

    pub fn interval_seconds(&self) -> f32 {
        self.interval_seconds
    }

    /// 0.0 when ready, 1.0 right after `start`.
    pub fn fraction_remaining(&self) -> f32 {
        if self.interval_seconds <= 0.0 {
            return 0.0;
        }
        (self.remaining_seconds / self.interval_seconds).clamp(0.0, 1.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountdownState {
    Idle,
    Running,
    Fired,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountdownTick {
    Inactive,
    Pending,
    Fired,
}

/// Multi-frame timer polled once per tick. Fires exactly once per `start`; a cancelled
/// countdown never fires, even if it was about to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Countdown {
    duration_seconds: f32,
    remaining_seconds: f32,
    state: CountdownState,
}

impl Countdown {
    pub fn new(duration_seconds: f32) -> Self {
        let duration_seconds = sanitize_seconds(duration_seconds);
        Self {
            duration_seconds,
            remaining_seconds: duration_seconds,
            state: CountdownState::Idle,
        }
    }

    pub fn started(duration_seconds: f32) -> Self {
        let mut countdown = Self::new(duration_seconds);
        countdown.start();
        countdown
    }

    pub fn start(&mut self) {
        self.remaining_seconds = self.duration_seconds;
        self.state = CountdownState::Running;
    }

    pub fn cancel(&mut self) {
        if self.state == CountdownState::Running {
            self.state = CountdownState::Cancelled;
        }
    }

    /// Back to not-running with the full duration restored.
    pub fn reset(&mut self) {
        self.remaining_seconds = self.duration_seconds;
        self.state = CountdownState::Idle;
    }

    pub fn tick(&mut self, dt_seconds: f32) -> CountdownTick {
        if self.state != CountdownState::Running {
            return CountdownTick::Inactive;
        }
        self.remaining_seconds = (self.remaining_seconds - sanitize_seconds(dt_seconds)).max(0.0);
        if self.remaining_seconds > 0.0 {
            return CountdownTick::Pending;
        }
        self.state = CountdownState::Fired;
        CountdownTick::Fired
    }

    pub fn state(&self) -> CountdownState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == CountdownState::Running
    }

    pub fn remaining_seconds(&self) -> f32 {
        self.remaining_seconds
    }

    pub fn duration_seconds(&self) -> f32 {
        self.duration_seconds
    }
}

/// Per-entity set of ability cooldowns.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AbilityClock {
    cooldowns: [Cooldown; 3],
}

impl AbilityClock {
    pub fn new(primary_seconds: f32, guard_seconds: f32, dash_seconds: f32) -> Self {
        Self {
            cooldowns: [
                Cooldown::new(primary_seconds),
                Cooldown::new(guard_seconds),
                Cooldown::new(dash_seconds),
            ],
        }
    }

    pub fn is_ready(&self, kind: AbilityKind) -> bool {
        self.cooldowns[kind.index()].is_ready()
    }

    pub fn start(&mut self, kind: AbilityKind) {
        self.cooldowns[kind.index()].start();
    }

    pub fn clear_all(&mut self) {
        for cooldown in &mut self.cooldowns {
            cooldown.clear();
        }
    }

    pub fn tick(&mut self, dt_seconds: f32) {
        for cooldown in &mut self.cooldowns {
            cooldown.tick(dt_seconds);
        }
    }

    pub fn cooldown(&self, kind: AbilityKind) -> &Cooldown {
        &self.cooldowns[kind.index()]
    }

    pub fn remaining_seconds(&self, kind: AbilityKind) -> f32 {
        self.cooldowns[kind.index()].remaining_seconds()
    }
}

fn sanitize_seconds(seconds: f32) -> f32 {
    if seconds.is_finite() {
        seconds.max(0.0)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cooldown_starts_ready_and_recovers_after_interval() {
        let mut cooldown = Cooldown::new(0.5);
        assert!(cooldown.is_ready());
        cooldown.start();
        assert!(!cooldown.is_ready());
        assert_eq!(cooldown.fraction_remaining(), 1.0);
        cooldown.tick(0.25);
        assert!(!cooldown.is_ready());
        cooldown.tick(0.25);
        assert!(cooldown.is_ready());
        assert_eq!(cooldown.remaining_seconds(), 0.0);
    }

    #[test]
    fn cooldown_ignores_negative_and_nan_dt() {
        let mut cooldown = Cooldown::new(1.0);
        cooldown.start();
        cooldown.tick(-5.0);
        cooldown.tick(f32::NAN);
        assert_eq!(cooldown.remaining_seconds(), 1.0);
    }

    #[test]
    fn countdown_fires_once() {
        let mut countdown = Countdown::started(0.5);
        assert_eq!(countdown.tick(0.25), CountdownTick::Pending);
        assert_eq!(countdown.tick(0.25), CountdownTick::Fired);
        assert_eq!(countdown.tick(0.25), CountdownTick::Inactive);
        assert_eq!(countdown.state(), CountdownState::Fired);
    }

    #[test]
    fn cancelled_countdown_never_fires() {
        let mut countdown = Countdown::started(0.5);
        assert_eq!(countdown.tick(0.25), CountdownTick::Pending);
        countdown.cancel();
        assert_eq!(countdown.tick(1.0), CountdownTick::Inactive);
        assert_eq!(countdown.state(), CountdownState::Cancelled);
    }

    #[test]
    fn reset_restores_full_duration_and_stops() {
        let mut countdown = Countdown::started(3.0);
        countdown.tick(2.0);
        countdown.reset();
        assert!(!countdown.is_running());
        assert_eq!(countdown.remaining_seconds(), 3.0);
        countdown.start();
        assert_eq!(countdown.tick(2.5), CountdownTick::Pending);
    }

    #[test]
    fn ability_clock_tracks_each_ability_independently() {
        let mut clock = AbilityClock::new(0.3, 5.0, 1.0);
        clock.start(AbilityKind::Dash);
        assert!(clock.is_ready(AbilityKind::Primary));
        assert!(clock.is_ready(AbilityKind::Guard));
        assert!(!clock.is_ready(AbilityKind::Dash));
        clock.tick(1.0);
        assert!(clock.is_ready(AbilityKind::Dash));
    }
}
