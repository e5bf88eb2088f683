//! Analysis configuration.
//!
//! Optional `desolve.toml` next to the automaton files:
//!
//! ```toml
//! [crush]
//! policy = "max"            # one of: unit, max, sum, average
//!
//! [nash]
//! probability_grid = [0.0, 0.5, 1.0]
//! ```
//!
//! A missing file or missing fields fall back to defaults; an unknown policy
//! string is a validation error.

use crate::analysis::crush::CombiningCosts;
use crate::core::error::DesolveError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

pub const CONFIG_FILE: &str = "desolve.toml";

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub crush: CrushConfig,
    pub nash: NashConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrushConfig {
    pub policy: CombiningCosts,
}

impl Default for CrushConfig {
    fn default() -> Self {
        CrushConfig {
            policy: CombiningCosts::Max,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NashConfig {
    /// Usage probabilities the equilibrium search draws from. Values are
    /// deduplicated, clamped to [0, 1], and sorted by the solver.
    pub probability_grid: Vec<f64>,
}

impl Default for NashConfig {
    fn default() -> Self {
        NashConfig {
            probability_grid: vec![0.0, 0.5, 1.0],
        }
    }
}

impl AnalysisConfig {
    /// Loads `desolve.toml` from `dir`. No config file means defaults, not
    /// an error.
    pub fn load(dir: &Path) -> Result<Self, DesolveError> {
        let path = dir.join(CONFIG_FILE);
        if !path.exists() {
            return Ok(AnalysisConfig::default());
        }
        let content = fs::read_to_string(&path)?;
        toml::from_str(&content).map_err(|e| DesolveError::ValidationError(e.to_string()))
    }
}
