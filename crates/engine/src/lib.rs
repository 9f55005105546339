pub mod app;
pub mod content;
mod paths;
pub mod sim;

pub use app::{
    clamp_frame_delta, plan_sim_steps, run_simulation, LoopConfig, LoopControl, MetricsHandle,
    RunSummary, SimMetricsSnapshot, StepPlan, StopReason, TickHooks,
};
pub use content::{
    compile_def_database, ContentCompileError, ContentDiscoveryError, ContentErrorCode,
    ContentRequest, CreatureDef, CreatureDefId, DefDatabase, SourceLocation, SpellDef, SpellDefId,
};
pub use paths::{resolve_app_paths, AppPaths, StartupError, ROOT_ENV_VAR, SCENARIO_EXTENSION};
