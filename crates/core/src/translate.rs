//! Status translation between platform lifecycle vocabularies and the
//! internal thread status lattice.

use serde::{Deserialize, Serialize};

use crate::domain::thread::{Platform, ThreadStatus};

/// Platform lifecycle events that can drive an internal status change.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleEvent {
    IssueClosed,
    PullRequestClosed,
    PullRequestMerged,
}

impl LifecycleEvent {
    pub fn platform(&self) -> Platform {
        match self {
            Self::IssueClosed | Self::PullRequestClosed | Self::PullRequestMerged => {
                Platform::Github
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StatusTransition {
    pub old_status: ThreadStatus,
    pub new_status: ThreadStatus,
}

/// Fixed translation table. External close/merge events only ever drive
/// Open/InProgress threads to Resolved; Closed and Duplicate are user-only
/// transitions, so an already-settled thread yields no transition at all
/// (which is what makes event redelivery a no-op).
pub fn translate(event: LifecycleEvent, current: ThreadStatus) -> Option<StatusTransition> {
    match (event, current) {
        (
            LifecycleEvent::IssueClosed
            | LifecycleEvent::PullRequestClosed
            | LifecycleEvent::PullRequestMerged,
            ThreadStatus::Open | ThreadStatus::InProgress,
        ) => Some(StatusTransition { old_status: current, new_status: ThreadStatus::Resolved }),
        _ => None,
    }
}

/// Display word for a thread status in a platform's own vocabulary.
pub fn platform_state_word(platform: Platform, status: ThreadStatus) -> &'static str {
    match platform {
        Platform::Github => match status {
            ThreadStatus::Open | ThreadStatus::InProgress => "open",
            ThreadStatus::Resolved | ThreadStatus::Closed | ThreadStatus::Duplicate => "closed",
        },
        Platform::Slack | Platform::Discord => status.label(),
    }
}

pub fn priority_label(priority: Option<i64>) -> &'static str {
    match priority {
        None | Some(0) => "No priority",
        Some(1) => "Urgent",
        Some(2) => "High",
        Some(3) => "Medium",
        Some(4) => "Low",
        Some(_) => "Unknown",
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::thread::{Platform, ThreadStatus};

    use super::{platform_state_word, priority_label, translate, LifecycleEvent};

    #[test]
    fn issue_closed_resolves_open_and_in_progress_threads() {
        for current in [ThreadStatus::Open, ThreadStatus::InProgress] {
            let transition =
                translate(LifecycleEvent::IssueClosed, current).expect("transition expected");
            assert_eq!(transition.old_status, current);
            assert_eq!(transition.new_status, ThreadStatus::Resolved);
        }
    }

    #[test]
    fn settled_threads_produce_no_transition() {
        for current in [ThreadStatus::Resolved, ThreadStatus::Closed, ThreadStatus::Duplicate] {
            assert_eq!(translate(LifecycleEvent::IssueClosed, current), None);
            assert_eq!(translate(LifecycleEvent::PullRequestMerged, current), None);
        }
    }

    #[test]
    fn github_state_word_collapses_the_lattice_to_two_states() {
        assert_eq!(platform_state_word(Platform::Github, ThreadStatus::InProgress), "open");
        assert_eq!(platform_state_word(Platform::Github, ThreadStatus::Resolved), "closed");
        assert_eq!(platform_state_word(Platform::Slack, ThreadStatus::Resolved), "Resolved");
    }

    #[test]
    fn priority_labels_cover_the_known_range() {
        assert_eq!(priority_label(None), "No priority");
        assert_eq!(priority_label(Some(1)), "Urgent");
        assert_eq!(priority_label(Some(4)), "Low");
        assert_eq!(priority_label(Some(99)), "Unknown");
    }
}
