//! Threshold and cooldown evaluation
//!
//! Each channel is `Idle` until its threshold is crossed; firing records the
//! time and returns straight to `Idle`. Runtime state lives in memory only, so
//! cooldowns restart with the process.

use crate::types::{AlertChannelConfig, Millis, MetricEvaluationResult};
use log::debug;
use std::collections::HashMap;

/// Smallest cooldown ever applied, whatever the configuration says
pub const MIN_COOLDOWN_MILLIS: u64 = 1_000;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelRuntimeState {
    pub last_fired_at: Option<Millis>,
}

#[derive(Debug, Clone)]
pub struct ThresholdEvaluator {
    states: HashMap<String, ChannelRuntimeState>,
    cooldown_floor_millis: u64,
}

impl Default for ThresholdEvaluator {
    fn default() -> Self {
        Self::new(MIN_COOLDOWN_MILLIS)
    }
}

impl ThresholdEvaluator {
    /// Create an evaluator; floors below 1000 ms are raised to 1000 ms
    pub fn new(cooldown_floor_millis: u64) -> Self {
        Self {
            states: HashMap::new(),
            cooldown_floor_millis: cooldown_floor_millis.max(MIN_COOLDOWN_MILLIS),
        }
    }

    pub fn cooldown_floor_millis(&self) -> u64 {
        self.cooldown_floor_millis
    }

    /// Evaluate one channel at `now` against an observed value
    pub fn evaluate(
        &mut self,
        config: &AlertChannelConfig,
        observed: f64,
        now: Millis,
    ) -> MetricEvaluationResult {
        let Some(threshold) = config.active_threshold() else {
            return MetricEvaluationResult::idle(&config.id, observed);
        };

        if !observed.is_finite() || !config.direction.crossed(observed, threshold) {
            return MetricEvaluationResult::idle(&config.id, observed);
        }

        let cooldown = config.cooldown_millis.max(self.cooldown_floor_millis);
        let cooldown = Millis::try_from(cooldown).unwrap_or(Millis::MAX);
        let state = self.states.entry(config.id.clone()).or_default();
        let eligible = match state.last_fired_at {
            None => true,
            Some(last) => now.saturating_sub(last) >= cooldown,
        };

        if eligible {
            state.last_fired_at = Some(now);
        } else {
            debug!(
                "{} crossed {threshold} with {observed} but is cooling down",
                config.id
            );
        }

        MetricEvaluationResult {
            channel_id: config.id.clone(),
            fired: eligible,
            observed_value: observed,
            threshold_crossed: Some(threshold),
            suppressed: !eligible,
        }
    }

    pub fn last_fired_at(&self, channel_id: &str) -> Option<Millis> {
        self.states.get(channel_id).and_then(|s| s.last_fired_at)
    }

    /// Forget every channel's firing history
    pub fn reset(&mut self) {
        self.states.clear();
    }
}
