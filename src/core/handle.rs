//! # Completion handles for background tasks.
//!
//! A [`TaskHandle`] is a clonable "wait until finished" handle. Unlike a tokio
//! `JoinHandle` it can be awaited by any number of holders, which is what a
//! [`JoinSet`](crate::JoinSet) and the task's own launcher both need.
//!
//! Completion is signaled by a `DropGuard` owned by the running future, so a task
//! that panics or is dropped by a shutting-down runtime still counts as finished.

use std::sync::Arc;

use tokio_util::sync::{CancellationToken, DropGuard};

/// Clonable completion handle of a tracked background task.
#[derive(Clone, Debug)]
pub struct TaskHandle {
    name: Arc<str>,
    done: CancellationToken,
}

impl TaskHandle {
    /// Creates a handle plus the guard that marks it finished when dropped.
    pub(crate) fn pair(name: impl Into<Arc<str>>) -> (Self, DropGuard) {
        let done = CancellationToken::new();
        let guard = done.clone().drop_guard();
        (
            Self {
                name: name.into(),
                done,
            },
            guard,
        )
    }

    /// Creates a handle that is already finished.
    pub fn completed(name: impl Into<Arc<str>>) -> Self {
        let (handle, guard) = Self::pair(name);
        drop(guard);
        handle
    }

    /// Task name (diagnostics only).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// True once the task has finished (successfully, by panic, or by being dropped).
    pub fn is_finished(&self) -> bool {
        self.done.is_cancelled()
    }

    /// Waits until the task has finished.
    pub async fn finished(&self) {
        self.done.cancelled().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completed_handle_is_finished() {
        let h = TaskHandle::completed("noop");
        assert!(h.is_finished());
        assert_eq!(h.name(), "noop");
    }

    #[tokio::test]
    async fn guard_drop_releases_every_clone() {
        let (h, guard) = TaskHandle::pair("job");
        let other = h.clone();
        assert!(!h.is_finished());

        let waiter = tokio::spawn(async move { other.finished().await });
        drop(guard);
        waiter.await.expect("waiter");
        assert!(h.is_finished());
    }
}
