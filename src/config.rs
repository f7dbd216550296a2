#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Run-level settings for a [`PartitionGibbs`](crate::PartitionGibbs) sampler.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default, rename_all = "snake_case"))]
#[derive(Clone, Debug, PartialEq)]
pub struct GibbsConfig {
    /// CRP concentration, `alpha > 0`. Fixed for the run.
    pub concentration: f64,
    /// Emit a history record every this many steps. Defaults to 10 so that
    /// long runs do not write a record per move.
    pub history_interval: usize,
}

impl Default for GibbsConfig {
    fn default() -> Self {
        Self {
            concentration: 1.0,
            history_interval: 10,
        }
    }
}

impl GibbsConfig {
    #[must_use]
    pub const fn with_concentration(mut self, alpha: f64) -> Self {
        self.concentration = alpha;
        self
    }

    #[must_use]
    pub const fn with_history_interval(mut self, interval: usize) -> Self {
        self.history_interval = interval;
        self
    }

    /// Check the settings without building a sampler.
    ///
    /// # Errors
    /// Returns [`Error::InvalidConcentration`] for a non-positive or
    /// non-finite `concentration` and [`Error::InvalidHistoryInterval`] for a
    /// zero `history_interval`.
    pub fn validate(&self) -> Result<()> {
        if !(self.concentration.is_finite() && self.concentration > 0.0) {
            return Err(Error::InvalidConcentration {
                alpha: self.concentration,
            });
        }
        if self.history_interval == 0 {
            return Err(Error::InvalidHistoryInterval);
        }
        Ok(())
    }
}
