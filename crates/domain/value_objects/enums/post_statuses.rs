use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// Lifecycle of a scheduled post. Moves forward only:
/// `Scheduled -> Processing -> {Published | Failed}`.
#[derive(Default, Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum PostStatus {
    #[default]
    Scheduled,
    Processing,
    Published,
    Failed,
}

impl Display for PostStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = match self {
            PostStatus::Scheduled => "SCHEDULED",
            PostStatus::Processing => "PROCESSING",
            PostStatus::Published => "PUBLISHED",
            PostStatus::Failed => "FAILED",
        };
        write!(f, "{}", status)
    }
}

impl PostStatus {
    pub fn from_str(value: &str) -> Option<Self> {
        match value.to_ascii_uppercase().as_str() {
            "SCHEDULED" => Some(PostStatus::Scheduled),
            "PROCESSING" => Some(PostStatus::Processing),
            "PUBLISHED" => Some(PostStatus::Published),
            "FAILED" => Some(PostStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PostStatus::Published | PostStatus::Failed)
    }

    pub fn can_transition_to(&self, next: PostStatus) -> bool {
        matches!(
            (self, next),
            (PostStatus::Scheduled, PostStatus::Processing)
                | (PostStatus::Processing, PostStatus::Published)
                | (PostStatus::Processing, PostStatus::Failed)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transitions_only_move_forward() {
        use PostStatus::*;

        assert!(Scheduled.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Published));
        assert!(Processing.can_transition_to(Failed));

        assert!(!Scheduled.can_transition_to(Published));
        assert!(!Scheduled.can_transition_to(Failed));
        assert!(!Processing.can_transition_to(Scheduled));
        assert!(!Published.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Scheduled));
        assert!(!Failed.can_transition_to(Processing));
    }

    #[test]
    fn terminal_states() {
        assert!(PostStatus::Published.is_terminal());
        assert!(PostStatus::Failed.is_terminal());
        assert!(!PostStatus::Processing.is_terminal());
    }

    #[test]
    fn parses_stored_values() {
        assert_eq!(PostStatus::from_str("scheduled"), Some(PostStatus::Scheduled));
        assert_eq!(PostStatus::from_str("PUBLISHED"), Some(PostStatus::Published));
        assert_eq!(PostStatus::from_str("queued"), None);
    }
}
