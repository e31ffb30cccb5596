//! Tunable constants of the progress computation.

use serde::{Deserialize, Serialize};
use crate::error::{ProgressError, Result};

/// Configuration for the reading-progress engine.
///
/// The blend weights and ceilings are design choices rather than measured
/// values, so they are kept together here and can be loaded from a file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressConfig {
    /// Share of the position-based percentage in the overall figure
    pub cfi_weight: f64,
    /// Share of the completion-based percentage in the overall figure
    pub completion_weight: f64,
    /// Largest step index the estimator distinguishes; larger steps clamp
    pub step_ceiling: u32,
    /// Largest character offset the estimator distinguishes
    pub offset_ceiling: u32,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            cfi_weight: 0.3,
            completion_weight: 0.7,
            step_ceiling: 200,
            offset_ceiling: 10_000,
        }
    }
}

impl ProgressConfig {
    /// Check that weights form a blend and ceilings are usable.
    pub fn validate(&self) -> Result<()> {
        let weights = [("cfi_weight", self.cfi_weight), ("completion_weight", self.completion_weight)];
        for (name, weight) in weights {
            if !weight.is_finite() || weight < 0.0 {
                return Err(ProgressError::InvalidConfig(format!(
                    "{} must be a non-negative number, got {}",
                    name, weight
                )));
            }
        }

        let sum = self.cfi_weight + self.completion_weight;
        if (sum - 1.0).abs() > 1e-6 {
            return Err(ProgressError::InvalidConfig(format!(
                "weights must sum to 1, got {}",
                sum
            )));
        }

        if self.step_ceiling == 0 || self.offset_ceiling == 0 {
            return Err(ProgressError::InvalidConfig(
                "ceilings must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}
