pub(crate) mod bootstrap;
mod combat_log;
mod ledger;
pub(crate) mod loop_runner;
mod scenario;
