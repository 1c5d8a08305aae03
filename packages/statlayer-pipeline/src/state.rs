//! Per-layer lifecycle within one run.
//!
//! ```text
//! PENDING --cache hit--> READY
//! PENDING --> FETCHING --ok--> READY
//!                      --err-> FAILED
//! ```

use crate::error::{FailureKind, PipelineError, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadySource {
    CacheHit,
    Fetched,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LayerState {
    Pending,
    Fetching,
    Ready { source: ReadySource },
    Failed { kind: FailureKind, message: String },
}

impl LayerState {
    pub fn state_name(&self) -> &'static str {
        match self {
            LayerState::Pending => "pending",
            LayerState::Fetching => "fetching",
            LayerState::Ready { .. } => "ready",
            LayerState::Failed { .. } => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, LayerState::Ready { .. } | LayerState::Failed { .. })
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, LayerState::Ready { .. })
    }
}

/// Guards the legal transitions for one layer.
#[derive(Debug)]
pub struct LayerStateMachine {
    layer: String,
    state: LayerState,
}

impl LayerStateMachine {
    pub fn new(layer: impl Into<String>) -> Self {
        Self {
            layer: layer.into(),
            state: LayerState::Pending,
        }
    }

    pub fn state(&self) -> &LayerState {
        &self.state
    }

    pub fn into_state(self) -> LayerState {
        self.state
    }

    fn invalid(&self, to: &str) -> PipelineError {
        PipelineError::InvalidStateTransition {
            layer: self.layer.clone(),
            from: self.state.state_name().to_string(),
            to: to.to_string(),
        }
    }

    /// Transition: PENDING → READY (cache hit)
    pub fn cache_hit(&mut self) -> Result<()> {
        match self.state {
            LayerState::Pending => {
                self.state = LayerState::Ready {
                    source: ReadySource::CacheHit,
                };
                Ok(())
            }
            _ => Err(self.invalid("ready")),
        }
    }

    /// Transition: PENDING → FETCHING
    pub fn start_fetch(&mut self) -> Result<()> {
        match self.state {
            LayerState::Pending => {
                self.state = LayerState::Fetching;
                Ok(())
            }
            _ => Err(self.invalid("fetching")),
        }
    }

    /// Transition: FETCHING → READY
    pub fn succeed(&mut self) -> Result<()> {
        match self.state {
            LayerState::Fetching => {
                self.state = LayerState::Ready {
                    source: ReadySource::Fetched,
                };
                Ok(())
            }
            _ => Err(self.invalid("ready")),
        }
    }

    /// Transition: FETCHING → FAILED
    pub fn fail(&mut self, kind: FailureKind, message: impl Into<String>) -> Result<()> {
        match self.state {
            LayerState::Fetching => {
                self.state = LayerState::Failed {
                    kind,
                    message: message.into(),
                };
                Ok(())
            }
            _ => Err(self.invalid("failed")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_path() {
        let mut sm = LayerStateMachine::new("team_hitting");
        sm.start_fetch().unwrap();
        sm.succeed().unwrap();
        assert_eq!(
            sm.state(),
            &LayerState::Ready {
                source: ReadySource::Fetched
            }
        );
        assert!(sm.state().is_terminal());
    }

    #[test]
    fn test_cache_hit_skips_fetching() {
        let mut sm = LayerStateMachine::new("team_hitting");
        sm.cache_hit().unwrap();
        assert!(sm.state().is_ready());

        let err = sm.start_fetch().unwrap_err();
        assert!(matches!(err, PipelineError::InvalidStateTransition { .. }));
    }

    #[test]
    fn test_failure_is_terminal() {
        let mut sm = LayerStateMachine::new("betting_odds");
        sm.start_fetch().unwrap();
        sm.fail(FailureKind::TransientFetch, "connection reset").unwrap();

        assert_eq!(sm.state().state_name(), "failed");
        assert!(sm.succeed().is_err());
        assert!(sm.fail(FailureKind::TransientFetch, "again").is_err());
    }

    #[test]
    fn test_cannot_fail_before_fetching() {
        let mut sm = LayerStateMachine::new("betting_odds");
        let err = sm.fail(FailureKind::TransientFetch, "x").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid state transition for betting_odds: pending -> failed"
        );
    }
}
