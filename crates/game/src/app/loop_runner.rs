use std::process::ExitCode;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use super::bootstrap::AppWiring;
use super::scene::{RunStats, SceneMachine};
use super::script::DeviceScript;

/// Ticks run after the last scripted event when the script sets no explicit limit.
const SCRIPT_TAIL_TICKS: u64 = 600;

#[derive(Debug, Clone)]
pub(crate) struct LoopConfig {
    pub(crate) target_tps: u32,
    pub(crate) max_frame_delta: Duration,
    pub(crate) max_ticks_per_frame: u32,
    /// Simulated wall time per frame when not running in real time.
    pub(crate) frame_interval: Duration,
    pub(crate) max_ticks: u64,
    pub(crate) realtime: bool,
    pub(crate) metrics_log_interval_ticks: u64,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            target_tps: 60,
            max_frame_delta: Duration::from_millis(250),
            max_ticks_per_frame: 5,
            frame_interval: Duration::from_micros(16_667),
            max_ticks: 36_000,
            realtime: false,
            metrics_log_interval_ticks: 300,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RunSummary {
    pub(crate) ticks: u64,
    pub(crate) frames: u64,
    pub(crate) dropped_backlog: Duration,
    pub(crate) stats: RunStats,
}

pub(crate) fn run(app: AppWiring) -> ExitCode {
    let AppWiring {
        config,
        mut machine,
        mut script,
    } = app;
    let summary = run_headless(&config, &mut machine, &mut script);
    info!(
        ticks = summary.ticks,
        frames = summary.frames,
        dropped_backlog_ms = summary.dropped_backlog.as_millis() as u64,
        sessions_started = summary.stats.sessions_started,
        sessions_refused = summary.stats.sessions_refused,
        games_over = summary.stats.games_over,
        "run_finished"
    );
    ExitCode::SUCCESS
}

/// Drives the scene machine with a fixed timestep until the tick limit is reached.
/// Scripted device events for a tick are applied before that tick's update.
pub(crate) fn run_headless(
    config: &LoopConfig,
    machine: &mut SceneMachine,
    script: &mut DeviceScript,
) -> RunSummary {
    let fixed_dt = Duration::from_secs_f64(1.0 / f64::from(config.target_tps.max(1)));
    let fixed_dt_seconds = fixed_dt.as_secs_f32();
    let frame_interval = normalize_non_zero_duration(config.frame_interval, fixed_dt);
    let max_ticks = script
        .max_ticks()
        .or_else(|| script.last_tick().map(|last| last + SCRIPT_TAIL_TICKS))
        .map_or(config.max_ticks, |limit| limit.min(config.max_ticks));

    machine.load_active();
    info!(
        tps = config.target_tps,
        max_ticks,
        realtime = config.realtime,
        "headless_loop_started"
    );

    let mut accumulator = Duration::ZERO;
    let mut tick: u64 = 0;
    let mut frames: u64 = 0;
    let mut dropped_total = Duration::ZERO;
    let mut last_frame = Instant::now();

    while tick < max_ticks {
        let frame_dt = if config.realtime {
            let now = Instant::now();
            let elapsed = now.duration_since(last_frame);
            last_frame = now;
            elapsed
        } else {
            frame_interval
        };
        accumulator += clamp_frame_delta(frame_dt, config.max_frame_delta);
        let plan = plan_sim_steps(accumulator, fixed_dt, config.max_ticks_per_frame);
        accumulator = plan.remaining_accumulator;
        if !plan.dropped_backlog.is_zero() {
            dropped_total += plan.dropped_backlog;
            warn!(
                dropped_ms = plan.dropped_backlog.as_millis() as u64,
                "sim_backlog_dropped"
            );
        }

        for _ in 0..plan.ticks_to_run {
            if tick >= max_ticks {
                break;
            }
            step_tick(machine, script, tick, fixed_dt_seconds);
            tick += 1;
            let interval = config.metrics_log_interval_ticks;
            if interval > 0 && tick % interval == 0 {
                info!(
                    tick,
                    scene = ?machine.active_scene(),
                    title = %machine.debug_title_active().unwrap_or_default(),
                    "loop_metrics"
                );
            }
        }
        frames += 1;

        if config.realtime {
            let sleep = compute_cap_sleep(last_frame.elapsed(), Some(fixed_dt));
            if !sleep.is_zero() {
                thread::sleep(sleep);
            }
        }
    }

    machine.shutdown_all();
    RunSummary {
        ticks: tick,
        frames,
        dropped_backlog: dropped_total,
        stats: machine.world().stats,
    }
}

fn step_tick(machine: &mut SceneMachine, script: &mut DeviceScript, tick: u64, dt_seconds: f32) {
    let world = machine.world_mut();
    for event in script.take_due(tick) {
        world.devices.apply(&event, &mut world.registry);
    }
    world.devices.record_into(&mut world.registry);

    let command = machine.update_active(dt_seconds);
    if machine.apply(command) {
        info!(tick, scene = ?machine.active_scene(), "scene_switched");
    }
    machine.world_mut().registry.finish_frame();
}

#[derive(Debug, Clone, Copy)]
struct StepPlan {
    ticks_to_run: u32,
    remaining_accumulator: Duration,
    dropped_backlog: Duration,
}

fn plan_sim_steps(
    mut accumulator: Duration,
    fixed_dt: Duration,
    max_ticks_per_frame: u32,
) -> StepPlan {
    let mut ticks_to_run = 0u32;

    while accumulator >= fixed_dt && ticks_to_run < max_ticks_per_frame {
        accumulator = accumulator.saturating_sub(fixed_dt);
        ticks_to_run = ticks_to_run.saturating_add(1);
    }

    if accumulator >= fixed_dt {
        let dropped_backlog = accumulator;
        accumulator = Duration::ZERO;
        StepPlan {
            ticks_to_run,
            remaining_accumulator: accumulator,
            dropped_backlog,
        }
    } else {
        StepPlan {
            ticks_to_run,
            remaining_accumulator: accumulator,
            dropped_backlog: Duration::ZERO,
        }
    }
}

fn clamp_frame_delta(frame_dt: Duration, max_frame_delta: Duration) -> Duration {
    frame_dt.min(max_frame_delta)
}

fn normalize_non_zero_duration(value: Duration, fallback: Duration) -> Duration {
    if value.is_zero() {
        fallback
    } else {
        value
    }
}

fn compute_cap_sleep(elapsed: Duration, target: Option<Duration>) -> Duration {
    match target {
        Some(frame_target) if elapsed < frame_target => frame_target - elapsed,
        _ => Duration::ZERO,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::arena::{Arena, ArenaLayout};
    use crate::app::scene::{LobbyScene, PlayScene, SceneKey, SceneWorld};
    use coop_core::CoreConfig;

    #[test]
    fn clamp_frame_delta_caps_large_frame() {
        let max_frame_delta = Duration::from_millis(250);
        let raw_frame_dt = Duration::from_millis(600);

        assert_eq!(
            clamp_frame_delta(raw_frame_dt, max_frame_delta),
            max_frame_delta
        );
    }

    #[test]
    fn plan_sim_steps_runs_expected_ticks_without_drop() {
        let fixed_dt = Duration::from_millis(16);
        let result = plan_sim_steps(Duration::from_millis(48), fixed_dt, 5);

        assert_eq!(result.ticks_to_run, 3);
        assert_eq!(result.remaining_accumulator, Duration::ZERO);
        assert_eq!(result.dropped_backlog, Duration::ZERO);
    }

    #[test]
    fn plan_sim_steps_drops_backlog_when_tick_cap_hit() {
        let fixed_dt = Duration::from_millis(16);
        let result = plan_sim_steps(Duration::from_millis(120), fixed_dt, 3);

        assert_eq!(result.ticks_to_run, 3);
        assert_eq!(result.remaining_accumulator, Duration::ZERO);
        assert_eq!(result.dropped_backlog, Duration::from_millis(72));
    }

    #[test]
    fn plan_sim_steps_keeps_partial_tick_in_accumulator() {
        let fixed_dt = Duration::from_millis(16);
        let result = plan_sim_steps(Duration::from_millis(20), fixed_dt, 5);

        assert_eq!(result.ticks_to_run, 1);
        assert_eq!(result.remaining_accumulator, Duration::from_millis(4));
    }

    #[test]
    fn cap_sleep_only_when_frame_finished_early() {
        let target = Some(Duration::from_millis(16));
        assert_eq!(
            compute_cap_sleep(Duration::from_millis(10), target),
            Duration::from_millis(6)
        );
        assert_eq!(
            compute_cap_sleep(Duration::from_millis(20), target),
            Duration::ZERO
        );
        assert_eq!(compute_cap_sleep(Duration::ZERO, None), Duration::ZERO);
    }

    fn demo_machine() -> SceneMachine {
        let world = SceneWorld::new(
            CoreConfig::default(),
            Arena::new(ArenaLayout::default()),
            None,
        );
        SceneMachine::new(
            Box::new(LobbyScene::new()),
            Box::new(PlayScene::new()),
            SceneKey::Lobby,
            world,
        )
    }

    #[test]
    fn demo_script_reaches_play_scene_headless() {
        let config = LoopConfig {
            max_ticks: 400,
            ..LoopConfig::default()
        };
        let mut machine = demo_machine();
        let mut script = DeviceScript::demo();

        let summary = run_headless(&config, &mut machine, &mut script);

        assert_eq!(summary.ticks, 400);
        assert_eq!(summary.stats.sessions_started, 1);
        assert_eq!(summary.stats.sessions_refused, 0);
        assert_eq!(machine.active_scene(), SceneKey::Play);
    }

    #[test]
    fn oversized_frame_interval_drops_backlog_but_keeps_ticking() {
        let config = LoopConfig {
            frame_interval: Duration::from_millis(200),
            max_ticks_per_frame: 2,
            max_ticks: 10,
            ..LoopConfig::default()
        };
        let mut machine = demo_machine();
        let mut script = DeviceScript::new(Vec::new());

        let summary = run_headless(&config, &mut machine, &mut script);

        assert_eq!(summary.ticks, 10);
        assert_eq!(summary.frames, 5);
        assert!(!summary.dropped_backlog.is_zero());
        assert_eq!(machine.active_scene(), SceneKey::Lobby);
    }
}
