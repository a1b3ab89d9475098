//! Short human-readable lines describing audit updates, posted into the
//! linked platform thread.

use tether_core::domain::update::{Update, UpdateDetail};

pub fn describe_update(update: &Update) -> String {
    let actor = update.user_id.as_deref();

    match &update.detail {
        UpdateDetail::StatusChanged { new_label, source, .. } => {
            let line = match actor {
                Some(actor) => format!("{actor} changed status to {new_label}"),
                None => format!("Status changed to {new_label}"),
            };
            match source {
                Some(platform) if actor.is_none() => format!("{line} (via {platform})"),
                _ => line,
            }
        }
        UpdateDetail::PriorityChanged { new_label, .. } => match actor {
            Some(actor) => format!("{actor} changed priority to {new_label}"),
            None => format!("Priority changed to {new_label}"),
        },
        UpdateDetail::AssignedChanged { new_user_id, new_user_name, .. } => {
            let assignee = new_user_name
                .as_deref()
                .or(new_user_id.as_deref())
                .unwrap_or("nobody");
            match actor {
                Some(actor) => format!("{actor} assigned this thread to {assignee}"),
                None => format!("Thread assigned to {assignee}"),
            }
        }
        UpdateDetail::MarkedDuplicate { canonical_thread_id } => match actor {
            Some(actor) => {
                format!("{actor} marked this thread as a duplicate of {}", canonical_thread_id.0)
            }
            None => format!("Marked as a duplicate of {}", canonical_thread_id.0),
        },
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use tether_core::domain::thread::{Platform, ThreadId, ThreadStatus};
    use tether_core::domain::update::{
        ReplicationMarkers, Update, UpdateDetail, UpdateId,
    };

    use super::describe_update;

    fn update(user_id: Option<&str>, detail: UpdateDetail) -> Update {
        Update {
            id: UpdateId("U-fmt".to_string()),
            thread_id: ThreadId("T-fmt".to_string()),
            user_id: user_id.map(str::to_string),
            detail,
            replicated: ReplicationMarkers::none(),
            created_at: Utc::now(),
        }
    }

    fn status_changed(source: Option<Platform>) -> UpdateDetail {
        UpdateDetail::StatusChanged {
            old_status: ThreadStatus::Open,
            new_status: ThreadStatus::Resolved,
            old_label: "Open".to_string(),
            new_label: "Resolved".to_string(),
            source,
        }
    }

    #[test]
    fn user_status_changes_name_the_actor() {
        let line = describe_update(&update(Some("maya"), status_changed(None)));
        assert_eq!(line, "maya changed status to Resolved");
    }

    #[test]
    fn platform_status_changes_name_the_source() {
        let line = describe_update(&update(None, status_changed(Some(Platform::Github))));
        assert_eq!(line, "Status changed to Resolved (via github)");
    }

    #[test]
    fn assignment_prefers_the_display_name() {
        let line = describe_update(&update(
            Some("maya"),
            UpdateDetail::AssignedChanged {
                old_user_id: None,
                new_user_id: Some("u-sam".to_string()),
                new_user_name: Some("Sam".to_string()),
            },
        ));
        assert_eq!(line, "maya assigned this thread to Sam");
    }

    #[test]
    fn duplicate_marks_point_at_the_canonical_thread() {
        let line = describe_update(&update(
            None,
            UpdateDetail::MarkedDuplicate { canonical_thread_id: ThreadId("T-1".to_string()) },
        ));
        assert_eq!(line, "Marked as a duplicate of T-1");
    }
}
