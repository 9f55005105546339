use std::env;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::sim::{EventSubscriber, Simulation, TickReport};

use super::metrics::MetricsAccumulator;
use super::MetricsHandle;

pub const SLOW_FRAME_ENV_VAR: &str = "CRAWL_SLOW_FRAME_MS";

#[derive(Debug, Clone)]
pub struct LoopConfig {
    pub target_tps: u32,
    pub max_frame_delta: Duration,
    pub max_ticks_per_frame: u32,
    pub metrics_log_interval: Duration,
    pub simulated_slow_frame_ms: u64,
    /// Pace ticks against the wall clock. Off means every frame advances
    /// exactly one fixed step as fast as the host allows.
    pub realtime: bool,
    pub max_ticks: Option<u64>,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            target_tps: 20,
            max_frame_delta: Duration::from_millis(250),
            max_ticks_per_frame: 5,
            metrics_log_interval: Duration::from_secs(1),
            simulated_slow_frame_ms: 0,
            realtime: false,
            max_ticks: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopControl {
    Continue,
    Stop,
}

/// Host callbacks around each fixed tick.
pub trait TickHooks {
    /// Runs before the tick; the place to enqueue commands due this tick.
    fn before_tick(&mut self, _simulation: &mut Simulation) {}

    fn after_tick(&mut self, _simulation: &Simulation, _report: &TickReport) -> LoopControl {
        LoopControl::Continue
    }
}

impl TickHooks for () {}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StopReason {
    #[default]
    TickLimit,
    Requested,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub ticks_run: u64,
    pub frames: u64,
    pub dropped_backlog: Duration,
    pub stop_reason: StopReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepPlan {
    pub ticks_to_run: u32,
    pub remaining_accumulator: Duration,
    pub dropped_backlog: Duration,
}

/// Drives `simulation` at a fixed step until the tick limit is reached or a
/// hook asks to stop.
pub fn run_simulation(
    config: &LoopConfig,
    simulation: &mut Simulation,
    subscribers: &mut [&mut dyn EventSubscriber],
    hooks: &mut dyn TickHooks,
    metrics_handle: &MetricsHandle,
) -> RunSummary {
    let target_tps = config.target_tps.max(1);
    let max_frame_delta =
        normalize_non_zero_duration(config.max_frame_delta, Duration::from_millis(250));
    let max_ticks_per_frame = config.max_ticks_per_frame.max(1);
    let metrics_log_interval =
        normalize_non_zero_duration(config.metrics_log_interval, Duration::from_secs(1));
    let fixed_dt = Duration::from_secs_f64(1.0 / target_tps as f64);
    let fixed_dt_seconds = fixed_dt.as_secs_f32();
    let slow_frame_delay = if config.realtime {
        resolve_slow_frame_delay(config.simulated_slow_frame_ms)
    } else {
        Duration::ZERO
    };

    info!(
        target_tps,
        realtime = config.realtime,
        max_frame_delta_ms = max_frame_delta.as_millis() as u64,
        max_ticks_per_frame,
        max_ticks = ?config.max_ticks,
        metrics_log_interval_ms = metrics_log_interval.as_millis() as u64,
        slow_frame_delay_ms = slow_frame_delay.as_millis() as u64,
        "loop_config"
    );

    let tick_limit_reached =
        |ticks_run: u64| config.max_ticks.is_some_and(|max_ticks| ticks_run >= max_ticks);
    let mut summary = RunSummary::default();
    let mut accumulator = Duration::ZERO;
    let mut last_frame_instant = Instant::now();
    let mut metrics_accumulator = MetricsAccumulator::new(metrics_log_interval);

    loop {
        if tick_limit_reached(summary.ticks_run) {
            summary.stop_reason = StopReason::TickLimit;
            break;
        }

        if slow_frame_delay > Duration::ZERO {
            thread::sleep(slow_frame_delay);
        }

        let now = Instant::now();
        let raw_frame_dt = now.saturating_duration_since(last_frame_instant);
        last_frame_instant = now;

        let frame_dt = if config.realtime {
            clamp_frame_delta(raw_frame_dt, max_frame_delta)
        } else {
            fixed_dt
        };
        accumulator = accumulator.saturating_add(frame_dt);

        let step_plan = plan_sim_steps(accumulator, fixed_dt, max_ticks_per_frame);
        let mut stop_requested = false;
        for _ in 0..step_plan.ticks_to_run {
            if tick_limit_reached(summary.ticks_run) {
                break;
            }
            hooks.before_tick(simulation);
            let tick_start = Instant::now();
            let report = simulation.tick(fixed_dt_seconds, subscribers);
            metrics_accumulator.record_tick(tick_start.elapsed(), report.events.len());
            summary.ticks_run = summary.ticks_run.saturating_add(1);

            if hooks.after_tick(simulation, &report) == LoopControl::Stop {
                stop_requested = true;
                break;
            }
        }
        accumulator = step_plan.remaining_accumulator;
        summary.frames = summary.frames.saturating_add(1);

        if step_plan.dropped_backlog > Duration::ZERO {
            summary.dropped_backlog = summary
                .dropped_backlog
                .saturating_add(step_plan.dropped_backlog);
            warn!(
                dropped_backlog_ms = step_plan.dropped_backlog.as_millis() as u64,
                max_ticks_per_frame, "sim_clamp_triggered"
            );
        }

        if let Some(snapshot) = metrics_accumulator.maybe_snapshot(now, simulation.store().len())
        {
            metrics_handle.publish(snapshot);
            info!(
                tps = snapshot.tps,
                tick_time_ms = snapshot.tick_time_ms,
                entity_count = snapshot.entity_count,
                events_per_tick = snapshot.events_per_tick,
                tick = simulation.tick_count(),
                "loop_metrics"
            );
        }

        if stop_requested {
            info!(tick = simulation.tick_count(), "shutdown_requested");
            summary.stop_reason = StopReason::Requested;
            break;
        }

        if config.realtime {
            let frame_elapsed = Instant::now().saturating_duration_since(now);
            let idle = fixed_dt.saturating_sub(accumulator).saturating_sub(frame_elapsed);
            if idle > Duration::ZERO {
                thread::sleep(idle);
            }
        }
    }

    info!(
        ticks_run = summary.ticks_run,
        frames = summary.frames,
        dropped_backlog_ms = summary.dropped_backlog.as_millis() as u64,
        stop_reason = ?summary.stop_reason,
        "shutdown"
    );
    summary
}

pub fn plan_sim_steps(
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
        StepPlan {
            ticks_to_run,
            remaining_accumulator: Duration::ZERO,
            dropped_backlog: accumulator,
        }
    } else {
        StepPlan {
            ticks_to_run,
            remaining_accumulator: accumulator,
            dropped_backlog: Duration::ZERO,
        }
    }
}

pub fn clamp_frame_delta(frame_dt: Duration, max_frame_delta: Duration) -> Duration {
    frame_dt.min(max_frame_delta)
}

fn normalize_non_zero_duration(value: Duration, fallback: Duration) -> Duration {
    if value.is_zero() {
        fallback
    } else {
        value
    }
}

fn resolve_slow_frame_delay(config_slow_frame_ms: u64) -> Duration {
    match env::var(SLOW_FRAME_ENV_VAR) {
        Ok(value) => match value.parse::<u64>() {
            Ok(ms) => Duration::from_millis(ms),
            Err(_) => {
                warn!(
                    env_var = SLOW_FRAME_ENV_VAR,
                    value = value.as_str(),
                    "invalid slow-frame env var value; falling back to config"
                );
                Duration::from_millis(config_slow_frame_ms)
            }
        },
        Err(env::VarError::NotPresent) => Duration::from_millis(config_slow_frame_ms),
        Err(err) => {
            warn!(
                env_var = SLOW_FRAME_ENV_VAR,
                error = %err,
                "unable to read slow-frame env var; falling back to config"
            );
            Duration::from_millis(config_slow_frame_ms)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::DefDatabase;
    use crate::sim::{EventSink, SimConfig, SimEvent, Tilemap};

    fn empty_simulation() -> Simulation {
        let map = Tilemap::from_rows(&["....", "...."]).expect("map");
        Simulation::new(
            SimConfig::default(),
            Box::new(map),
            DefDatabase::from_defs(Vec::new(), Vec::new()),
            7,
        )
    }

    #[derive(Default)]
    struct CountingHooks {
        before: u64,
        seen_ticks: Vec<u64>,
        stop_after: Option<u64>,
    }

    impl TickHooks for CountingHooks {
        fn before_tick(&mut self, _simulation: &mut Simulation) {
            self.before += 1;
        }

        fn after_tick(&mut self, _simulation: &Simulation, report: &TickReport) -> LoopControl {
            self.seen_ticks.push(report.tick);
            match self.stop_after {
                Some(limit) if report.tick >= limit => LoopControl::Stop,
                _ => LoopControl::Continue,
            }
        }
    }

    #[derive(Default)]
    struct Recorder {
        flushes: usize,
    }

    impl EventSubscriber for Recorder {
        fn on_event(&mut self, _event: &SimEvent, _follow_ups: &mut dyn EventSink) {
            self.flushes += 1;
        }
    }

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
        let fixed_dt = Duration::from_millis(50);
        let result = plan_sim_steps(Duration::from_millis(170), fixed_dt, 5);

        assert_eq!(result.ticks_to_run, 3);
        assert_eq!(result.remaining_accumulator, Duration::from_millis(20));
        assert_eq!(result.dropped_backlog, Duration::ZERO);
    }

    #[test]
    fn plan_sim_steps_drops_backlog_when_tick_cap_hit() {
        let fixed_dt = Duration::from_millis(50);
        let result = plan_sim_steps(Duration::from_millis(250), fixed_dt, 3);

        assert_eq!(result.ticks_to_run, 3);
        assert_eq!(result.remaining_accumulator, Duration::ZERO);
        assert_eq!(result.dropped_backlog, Duration::from_millis(100));
    }

    #[test]
    fn zero_durations_fall_back() {
        let fallback = Duration::from_secs(1);
        assert_eq!(normalize_non_zero_duration(Duration::ZERO, fallback), fallback);
        assert_eq!(
            normalize_non_zero_duration(Duration::from_millis(5), fallback),
            Duration::from_millis(5)
        );
    }

    #[test]
    fn headless_run_stops_at_tick_limit() {
        let mut simulation = empty_simulation();
        let mut hooks = CountingHooks::default();
        let config = LoopConfig {
            max_ticks: Some(12),
            ..LoopConfig::default()
        };

        let summary = run_simulation(
            &config,
            &mut simulation,
            &mut [],
            &mut hooks,
            &MetricsHandle::default(),
        );

        assert_eq!(summary.ticks_run, 12);
        assert_eq!(summary.frames, 12);
        assert_eq!(summary.stop_reason, StopReason::TickLimit);
        assert_eq!(summary.dropped_backlog, Duration::ZERO);
        assert_eq!(simulation.tick_count(), 12);
        assert_eq!(hooks.before, 12);
        assert_eq!(hooks.seen_ticks, (1..=12).collect::<Vec<_>>());
    }

    #[test]
    fn hook_can_stop_the_run_early() {
        let mut simulation = empty_simulation();
        let mut hooks = CountingHooks {
            stop_after: Some(4),
            ..CountingHooks::default()
        };
        let mut recorder = Recorder::default();
        let config = LoopConfig {
            max_ticks: Some(100),
            ..LoopConfig::default()
        };

        let summary = run_simulation(
            &config,
            &mut simulation,
            &mut [&mut recorder],
            &mut hooks,
            &MetricsHandle::default(),
        );

        assert_eq!(summary.ticks_run, 4);
        assert_eq!(summary.stop_reason, StopReason::Requested);
        assert_eq!(simulation.tick_count(), 4);
        assert_eq!(recorder.flushes, 0);
    }

    #[test]
    fn zero_tick_limit_runs_nothing() {
        let mut simulation = empty_simulation();
        let config = LoopConfig {
            max_ticks: Some(0),
            ..LoopConfig::default()
        };

        let summary = run_simulation(
            &config,
            &mut simulation,
            &mut [],
            &mut (),
            &MetricsHandle::default(),
        );

        assert_eq!(summary.ticks_run, 0);
        assert_eq!(summary.frames, 0);
        assert_eq!(simulation.tick_count(), 0);
    }
}
