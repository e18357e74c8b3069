//! Per-invocation resource limits

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Resource ceiling applied to a single sandbox invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionLimits {
    /// Wall-clock budget
    pub wall_clock: Duration,
    /// Linear memory ceiling in bytes
    pub max_memory_bytes: usize,
    /// Standard output capacity in bytes
    pub max_output_bytes: usize,
}

impl ExecutionLimits {
    /// Create default limits
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With wall-clock budget
    #[inline]
    #[must_use]
    pub fn with_wall_clock(mut self, budget: Duration) -> Self {
        self.wall_clock = budget;
        self
    }

    /// With memory ceiling
    #[inline]
    #[must_use]
    pub fn with_max_memory(mut self, bytes: usize) -> Self {
        self.max_memory_bytes = bytes;
        self
    }

    /// With stdout capacity
    #[inline]
    #[must_use]
    pub fn with_max_output(mut self, bytes: usize) -> Self {
        self.max_output_bytes = bytes;
        self
    }

    /// Apply a challenge's `time_limit` (seconds); zero or absent keeps the budget
    #[must_use]
    pub fn with_time_limit_secs(self, secs: Option<u32>) -> Self {
        match secs {
            Some(secs) if secs > 0 => self.with_wall_clock(Duration::from_secs(u64::from(secs))),
            _ => self,
        }
    }

    /// Total wall-clock allowance for an invocation of `stages` stages
    #[must_use]
    pub fn invocation_budget(&self, stages: usize) -> Duration {
        self.wall_clock
            .saturating_mul(u32::try_from(stages.max(1)).unwrap_or(u32::MAX))
    }
}

impl Default for ExecutionLimits {
    fn default() -> Self {
        Self {
            wall_clock: Duration::from_secs(5),
            max_memory_bytes: 256 * 1024 * 1024,
            max_output_bytes: 1024 * 1024,
        }
    }
}
