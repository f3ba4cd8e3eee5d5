//! Task lifecycle phases and the allowed transitions between them.
//!
//! ```text
//!  idle ──▶ fileSelected ──▶ uploading ──▶ uploaded ──▶ converting ──▶ polling ──▶ completed
//!   ▲           ▲   │            │                          │             │
//!   │           │   └─(reselect) │                          │             └──────▶ failed
//!   │           └────────────────┴──── upload failed / convert rejected ─┘
//!   └──────────────── start new conversion (reset) ◀── any phase
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a conversion task is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Idle,
    FileSelected,
    Uploading,
    Uploaded,
    Converting,
    Polling,
    Completed,
    Failed,
}

impl Phase {
    /// `completed` or `failed`.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// A network call of the start sequence is in flight.
    pub fn is_starting(self) -> bool {
        matches!(self, Self::Uploading | Self::Uploaded | Self::Converting)
    }

    /// Whether the state machine permits `self → next`.
    pub fn can_transition_to(self, next: Phase) -> bool {
        use Phase::*;
        match (self, next) {
            (Idle, FileSelected) | (FileSelected, FileSelected) => true,
            (FileSelected, Uploading) => true,
            (Uploading, Uploaded) | (Uploading, FileSelected) => true,
            (Uploaded, Converting) => true,
            (Converting, Polling) | (Converting, FileSelected) => true,
            (Polling, Completed) | (Polling, Failed) => true,
            (_, Idle) => true,
            _ => false,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::FileSelected => "file selected",
            Self::Uploading => "uploading",
            Self::Uploaded => "uploaded",
            Self::Converting => "converting",
            Self::Polling => "polling",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_is_allowed() {
        let path = [
            Phase::Idle,
            Phase::FileSelected,
            Phase::Uploading,
            Phase::Uploaded,
            Phase::Converting,
            Phase::Polling,
            Phase::Completed,
            Phase::Idle,
        ];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn starting_phases_can_be_reset_or_reverted() {
        for p in [Phase::Uploading, Phase::Uploaded, Phase::Converting] {
            assert!(p.is_starting());
            assert!(p.can_transition_to(Phase::Idle));
        }
        assert!(Phase::Uploading.can_transition_to(Phase::FileSelected));
        assert!(Phase::Converting.can_transition_to(Phase::FileSelected));
        assert!(!Phase::Polling.is_starting());
    }

    #[test]
    fn terminal_phases_only_reset() {
        assert!(!Phase::Completed.can_transition_to(Phase::Polling));
        assert!(!Phase::Failed.can_transition_to(Phase::FileSelected));
        assert!(Phase::Failed.can_transition_to(Phase::Idle));
    }

    #[test]
    fn serialises_snake_case() {
        assert_eq!(
            serde_json::to_value(Phase::FileSelected).unwrap(),
            serde_json::json!("file_selected")
        );
    }
}
