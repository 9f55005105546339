mod compiler;
mod database;
mod discovery;
mod types;

pub use compiler::{compile_def_database, ContentCompileError, ContentErrorCode, SourceLocation};
pub use database::{
    CreatureAi, CreatureDef, CreatureDefId, DefDatabase, SpellDef, SpellDefId, SpellKind,
    SpellTargeting,
};
pub use types::{ContentDiscoveryError, ContentRequest};
