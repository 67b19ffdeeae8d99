//! Dependency rules over native task records.
//!
//! A task is blocked iff one of its `blockedBy` ids resolves to a task that is
//! not completed. Ids that resolve to nothing never block. Cycles are not
//! detected: members of a cycle stay mutually blocked until one is completed
//! externally.

use std::cmp::Ordering;

use crate::core::types::NativeTask;

/// Outcome of asking whether a task may be marked completed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionGate {
    Allowed,
    Blocked { blockers: Vec<NativeTask> },
}

/// True if any resolvable dependency of `task` is not completed.
pub fn is_blocked(task: &NativeTask, all: &[NativeTask]) -> bool {
    !open_blockers(task, all).is_empty()
}

/// Dependencies of `task` that exist and are not completed, in `blockedBy` order.
pub fn open_blockers<'a>(task: &NativeTask, all: &'a [NativeTask]) -> Vec<&'a NativeTask> {
    task.blocked_by
        .iter()
        .filter_map(|id| all.iter().find(|candidate| &candidate.id == id))
        .filter(|dep| !dep.status.is_completed())
        .collect()
}

/// Pending tasks in display order.
pub fn pending_tasks(all: &[NativeTask]) -> Vec<&NativeTask> {
    let mut pending: Vec<&NativeTask> = all.iter().filter(|t| t.status.is_pending()).collect();
    pending.sort_by(|a, b| compare_ids(&a.id, &b.id));
    pending
}

pub fn first_pending(all: &[NativeTask]) -> Option<&NativeTask> {
    pending_tasks(all).into_iter().next()
}

/// Gate a completion request for `task_id`.
///
/// Unknown task ids are allowed: the tracker has nothing to say about them.
pub fn completion_gate(task_id: &str, all: &[NativeTask]) -> CompletionGate {
    let Some(task) = all.iter().find(|t| t.id == task_id) else {
        return CompletionGate::Allowed;
    };
    let blockers: Vec<NativeTask> = open_blockers(task, all).into_iter().cloned().collect();
    if blockers.is_empty() {
        CompletionGate::Allowed
    } else {
        CompletionGate::Blocked { blockers }
    }
}

/// Numeric ids sort numerically and before non-numeric ones.
pub fn compare_ids(a: &str, b: &str) -> Ordering {
    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::TaskStatus;

    fn task(id: &str, status: TaskStatus, blocked_by: &[&str]) -> NativeTask {
        NativeTask {
            id: id.to_string(),
            subject: format!("task {id}"),
            status,
            blocked_by: blocked_by.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn blocked_until_dependency_completes() {
        let mut all = vec![
            task("X", TaskStatus::Pending, &[]),
            task("Y", TaskStatus::Pending, &["X"]),
        ];
        assert!(is_blocked(&all[1], &all));
        assert!(matches!(completion_gate("Y", &all), CompletionGate::Blocked { .. }));

        all[0].status = TaskStatus::Completed;
        assert!(!is_blocked(&all[1], &all));
        assert_eq!(completion_gate("Y", &all), CompletionGate::Allowed);
    }

    #[test]
    fn unresolvable_dependencies_do_not_block() {
        let all = vec![task("1", TaskStatus::Pending, &["404"])];
        assert!(!is_blocked(&all[0], &all));
    }

    #[test]
    fn cycles_keep_members_blocked() {
        let all = vec![
            task("1", TaskStatus::Pending, &["2"]),
            task("2", TaskStatus::Pending, &["1"]),
        ];
        assert!(is_blocked(&all[0], &all));
        assert!(is_blocked(&all[1], &all));
    }

    #[test]
    fn pending_excludes_completed_and_deleted_and_sorts_numerically() {
        let all = vec![
            task("10", TaskStatus::Pending, &[]),
            task("2", TaskStatus::InProgress, &[]),
            task("3", TaskStatus::Completed, &[]),
            task("4", TaskStatus::Deleted, &[]),
        ];
        let ids: Vec<&str> = pending_tasks(&all).iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["2", "10"]);
        assert_eq!(first_pending(&all).map(|t| t.id.as_str()), Some("2"));
    }

    #[test]
    fn unknown_task_completion_is_allowed() {
        assert_eq!(completion_gate("missing", &[]), CompletionGate::Allowed);
    }
}
