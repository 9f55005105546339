mod loop_runner;
mod metrics;

pub use loop_runner::{
    clamp_frame_delta, plan_sim_steps, run_simulation, LoopConfig, LoopControl, RunSummary,
    StepPlan, StopReason, TickHooks, SLOW_FRAME_ENV_VAR,
};
pub use metrics::{MetricsHandle, SimMetricsSnapshot};
