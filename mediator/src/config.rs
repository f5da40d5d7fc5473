//! Mediation configuration.

use keystone_core::{MediationError, MediationResult};
use serde::Deserialize;

/// Process-wide mediation settings, shared by every context built from it.
///
/// ```toml
/// enabled = true
/// max_nesting_depth = 64
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MediationConfig {
    /// Global switch. Class and instance switches can only narrow it,
    /// except that an instance override always wins.
    pub enabled: bool,
    /// Nested `mediate` calls allowed on one thread before the chain is
    /// treated as runaway recursion.
    pub max_nesting_depth: usize,
}

impl Default for MediationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_nesting_depth: 64,
        }
    }
}

impl MediationConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Set the runaway limit. A limit below 1 is raised to 1.
    pub fn with_max_nesting_depth(mut self, depth: usize) -> Self {
        self.max_nesting_depth = depth.max(1);
        self
    }

    /// Parse from TOML. Missing keys keep their defaults.
    pub fn from_toml_str(source: &str) -> MediationResult<Self> {
        let config: Self =
            toml::from_str(source).map_err(|e| MediationError::configuration(e.to_string()))?;
        if config.max_nesting_depth == 0 {
            return Err(MediationError::configuration(
                "max_nesting_depth must be at least 1",
            ));
        }
        Ok(config)
    }
}
