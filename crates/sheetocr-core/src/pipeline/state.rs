//! Per-entity lifecycle.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A working stage an entity can fail in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Fetching,
    Rasterizing,
    Extracting,
    Delivering,
}

/// Where an entity is in `Pending → Fetching → Rasterizing → Extracting →
/// Delivering → Done`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "state", content = "stage")]
pub enum EntityState {
    Pending,
    Fetching,
    Rasterizing,
    Extracting,
    Delivering,
    Done,
    Failed(Stage),
}

impl EntityState {
    /// The working stage for this state, if it is one.
    pub fn stage(self) -> Option<Stage> {
        match self {
            EntityState::Fetching => Some(Stage::Fetching),
            EntityState::Rasterizing => Some(Stage::Rasterizing),
            EntityState::Extracting => Some(Stage::Extracting),
            EntityState::Delivering => Some(Stage::Delivering),
            EntityState::Pending | EntityState::Done | EntityState::Failed(_) => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, EntityState::Done | EntityState::Failed(_))
    }

    pub fn is_failed(self) -> bool {
        matches!(self, EntityState::Failed(_))
    }

    /// Whether `self → next` is a legal step.
    pub fn can_transition(self, next: EntityState) -> bool {
        use EntityState::*;
        match (self, next) {
            (Pending, Fetching)
            | (Fetching, Rasterizing)
            | (Rasterizing, Extracting)
            | (Extracting, Delivering)
            | (Delivering, Done) => true,
            // A row without a single valid job has nothing to extract.
            (Pending, Failed(Stage::Extracting)) => true,
            (current, Failed(stage)) => current.stage() == Some(stage),
            _ => false,
        }
    }

    /// Step to `next`. An illegal step fails the entity at its current stage.
    pub fn advance(self, next: EntityState) -> EntityState {
        if self.can_transition(next) {
            return next;
        }
        tracing::error!("Illegal entity transition {} -> {}", self, next);
        match self.stage() {
            Some(stage) => EntityState::Failed(stage),
            // Pending or terminal: nothing was in progress.
            None => self,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Fetching => "fetching",
            Stage::Rasterizing => "rasterizing",
            Stage::Extracting => "extracting",
            Stage::Delivering => "delivering",
        };
        f.write_str(name)
    }
}

impl fmt::Display for EntityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityState::Pending => f.write_str("pending"),
            EntityState::Fetching => f.write_str("fetching"),
            EntityState::Rasterizing => f.write_str("rasterizing"),
            EntityState::Extracting => f.write_str("extracting"),
            EntityState::Delivering => f.write_str("delivering"),
            EntityState::Done => f.write_str("done"),
            EntityState::Failed(stage) => write!(f, "failed ({})", stage),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path() {
        let mut state = EntityState::Pending;
        for next in [
            EntityState::Fetching,
            EntityState::Rasterizing,
            EntityState::Extracting,
            EntityState::Delivering,
            EntityState::Done,
        ] {
            assert!(state.can_transition(next), "{state} -> {next}");
            state = state.advance(next);
        }
        assert_eq!(state, EntityState::Done);
        assert!(state.is_terminal());
    }

    #[test]
    fn test_fail_only_at_current_stage() {
        assert!(EntityState::Fetching.can_transition(EntityState::Failed(Stage::Fetching)));
        assert!(!EntityState::Fetching.can_transition(EntityState::Failed(Stage::Delivering)));
        assert!(!EntityState::Pending.can_transition(EntityState::Failed(Stage::Fetching)));
        assert!(EntityState::Pending.can_transition(EntityState::Failed(Stage::Extracting)));
    }

    #[test]
    fn test_illegal_transition_fails_current_stage() {
        let state = EntityState::Rasterizing.advance(EntityState::Done);
        assert_eq!(state, EntityState::Failed(Stage::Rasterizing));

        // Terminal states stay put.
        assert_eq!(EntityState::Done.advance(EntityState::Fetching), EntityState::Done);
    }

    #[test]
    fn test_serialized_form() {
        let json = serde_json::to_string(&EntityState::Failed(Stage::Fetching)).unwrap();
        assert_eq!(json, r#"{"state":"failed","stage":"fetching"}"#);
        assert_eq!(serde_json::to_string(&EntityState::Done).unwrap(), r#"{"state":"done"}"#);
    }
}
