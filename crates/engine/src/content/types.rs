use std::path::PathBuf;

use thiserror::Error;

/// Which content sources to compile, in load order after `base`.
#[derive(Debug, Clone, Default)]
pub struct ContentRequest {
    pub enabled_mods: Vec<String>,
}

impl ContentRequest {
    /// Parses a comma separated mod list; blank entries are kept so discovery
    /// can reject them.
    pub fn from_mod_list(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Self::default();
        }
        Self {
            enabled_mods: trimmed.split(',').map(|id| id.trim().to_string()).collect(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ContentDiscoveryError {
    #[error("enabled mod id cannot be empty")]
    EmptyEnabledMod,
    #[error("duplicate enabled mod id in request: {mod_id}")]
    DuplicateEnabledMod { mod_id: String },
    #[error("enabled mod does not exist on disk: {mod_id} at {expected_dir}")]
    EnabledModMissing {
        mod_id: String,
        expected_dir: PathBuf,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mod_list_parsing_trims_entries() {
        let request = ContentRequest::from_mod_list(" hardmode , extra ");
        assert_eq!(request.enabled_mods, vec!["hardmode", "extra"]);
        assert!(ContentRequest::from_mod_list("  ").enabled_mods.is_empty());
    }
}
