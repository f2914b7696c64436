//! Execution-mode decision logic.
//!
//! Given the trust score and agent confidence at workflow start, picks
//! one of the four autonomy modes: from manifest-supplied rules when
//! present, otherwise from a hard-coded threshold ladder. The decision
//! function is pure; nothing is mutated.

use tracing::{debug, warn};

use switchyard_core::{ExecutionMode, ExecutionModeConfig};

use crate::expr;

/// Selects the autonomy mode for a workflow execution.
#[derive(Debug, Clone)]
pub struct ExecutionModeManager {
    /// Mode returned when configured rules exist but none match.
    default_mode: ExecutionMode,
}

impl ExecutionModeManager {
    /// Creates a manager defaulting to `Reactive`.
    #[must_use]
    pub fn new() -> Self {
        Self { default_mode: ExecutionMode::Reactive }
    }

    /// Creates a manager with a custom default mode.
    #[must_use]
    pub fn with_default_mode(default_mode: ExecutionMode) -> Self {
        Self { default_mode }
    }

    /// Decides the execution mode for the given trust/confidence pair.
    ///
    /// Configured rules are evaluated in fixed priority order
    /// (Strategic, Predictive, Reactive, Passive); a rule passes when
    /// both its `threshold` and `condition` expressions evaluate true
    /// (a missing expression passes). With no rules configured the
    /// hard-coded ladder applies. A malformed expression disqualifies
    /// its rule and is logged, never interpreted loosely.
    #[must_use]
    pub fn determine_execution_mode(
        &self,
        trust_score: f64,
        confidence: f64,
        mode_configs: &[ExecutionModeConfig],
        current_mode: Option<ExecutionMode>,
    ) -> ExecutionMode {
        if mode_configs.is_empty() {
            let mode = Self::default_ladder(trust_score, confidence);
            debug!(
                trust_score = trust_score,
                confidence = confidence,
                mode = %mode,
                "Execution mode from default ladder"
            );
            return mode;
        }

        for mode in ExecutionMode::priority_order() {
            let Some(config) = mode_configs.iter().find(|c| c.mode == mode) else {
                continue;
            };

            if Self::rule_passes(config, trust_score, confidence) {
                debug!(
                    trust_score = trust_score,
                    confidence = confidence,
                    mode = %mode,
                    trigger = %config.trigger,
                    "Execution mode from configured rule"
                );
                return mode;
            }
        }

        debug!(
            trust_score = trust_score,
            confidence = confidence,
            current_mode = ?current_mode,
            default_mode = %self.default_mode,
            "No configured mode matched, using default"
        );
        self.default_mode
    }

    /// The hard-coded threshold ladder used when no rules are supplied.
    fn default_ladder(trust_score: f64, confidence: f64) -> ExecutionMode {
        if trust_score >= 0.8 && confidence >= 0.9 {
            ExecutionMode::Strategic
        } else if trust_score >= 0.7 && confidence >= 0.8 {
            ExecutionMode::Predictive
        } else if trust_score >= 0.6 {
            ExecutionMode::Reactive
        } else {
            ExecutionMode::Passive
        }
    }

    /// Evaluates one rule; both expressions must pass.
    fn rule_passes(config: &ExecutionModeConfig, trust_score: f64, confidence: f64) -> bool {
        for source in [&config.threshold, &config.condition].into_iter().flatten() {
            match expr::evaluate(source, trust_score, confidence) {
                Ok(true) => {}
                Ok(false) => return false,
                Err(e) => {
                    warn!(
                        mode = %config.mode,
                        expression = %source,
                        error = %e,
                        "Malformed mode expression, rule skipped"
                    );
                    return false;
                }
            }
        }
        true
    }
}

impl Default for ExecutionModeManager {
    fn default() -> Self {
        Self::new()
    }
}
