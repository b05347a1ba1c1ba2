//! Session registry shared by the orchestrator and its readers.
//!
//! One coarse lock guards every map operation. The lock is never held across
//! an `.await` or while progress callbacks run.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use heal_core_types::SessionId;

use crate::errors::OrchestratorError;
use crate::model::{HealingSession, HealingStatus, ProgressUpdate};

pub const CANCELLED_MESSAGE: &str = "Cancelled by user";

pub type ProgressCallback = Arc<dyn Fn(&ProgressUpdate) + Send + Sync>;

struct SessionEntry {
    session: HealingSession,
    cancel: CancellationToken,
    callbacks: Vec<ProgressCallback>,
    /// Set once the workflow has stopped touching the session.
    settled: bool,
    settled_notify: Arc<Notify>,
}

#[derive(Default)]
pub struct SessionRegistry {
    inner: Mutex<HashMap<SessionId, SessionEntry>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, session: HealingSession, cancel: CancellationToken) {
        let id = session.session_id.clone();
        self.inner.lock().insert(
            id,
            SessionEntry {
                session,
                cancel,
                callbacks: Vec::new(),
                settled: false,
                settled_notify: Arc::new(Notify::new()),
            },
        );
    }

    pub fn get(&self, id: &SessionId) -> Option<HealingSession> {
        self.inner.lock().get(id).map(|entry| entry.session.clone())
    }

    pub fn list(&self) -> Vec<HealingSession> {
        self.inner
            .lock()
            .values()
            .map(|entry| entry.session.clone())
            .collect()
    }

    /// Sessions that have not reached a terminal state.
    pub fn active_count(&self) -> usize {
        self.inner
            .lock()
            .values()
            .filter(|entry| !entry.session.is_terminal())
            .count()
    }

    /// Apply `mutate` unless the session is unknown or already terminal.
    pub fn update<F>(&self, id: &SessionId, mutate: F) -> bool
    where
        F: FnOnce(&mut HealingSession),
    {
        let mut guard = self.inner.lock();
        match guard.get_mut(id) {
            Some(entry) if !entry.session.is_terminal() => {
                mutate(&mut entry.session);
                true
            }
            _ => false,
        }
    }

    /// Move a running session into `status`, applying `mutate` first.
    /// Returns the final snapshot, or `None` when the session had already
    /// finished.
    pub fn finish<F>(
        &self,
        id: &SessionId,
        status: HealingStatus,
        mutate: F,
    ) -> Option<HealingSession>
    where
        F: FnOnce(&mut HealingSession),
    {
        let mut guard = self.inner.lock();
        let entry = guard.get_mut(id)?;
        if entry.session.is_terminal() {
            return None;
        }
        mutate(&mut entry.session);
        entry.session.status = status;
        entry.session.completed_at = Some(Utc::now());
        Some(entry.session.clone())
    }

    /// Fail the session with the cancellation message and fire its token.
    pub fn cancel(&self, id: &SessionId) -> Result<HealingSession, OrchestratorError> {
        let mut guard = self.inner.lock();
        let entry = guard
            .get_mut(id)
            .ok_or_else(|| OrchestratorError::UnknownSession(id.clone()))?;
        if entry.session.is_terminal() {
            return Err(OrchestratorError::AlreadyFinished(id.clone()));
        }
        entry.session.status = HealingStatus::Failed;
        entry.session.error_message = Some(CANCELLED_MESSAGE.to_string());
        entry.session.completed_at = Some(Utc::now());
        entry.cancel.cancel();
        Ok(entry.session.clone())
    }

    pub fn add_callback(
        &self,
        id: &SessionId,
        callback: ProgressCallback,
    ) -> Result<(), OrchestratorError> {
        let mut guard = self.inner.lock();
        let entry = guard
            .get_mut(id)
            .ok_or_else(|| OrchestratorError::UnknownSession(id.clone()))?;
        entry.callbacks.push(callback);
        Ok(())
    }

    /// Deliver `update` to every callback of the session. Panicking callbacks
    /// are logged and skipped.
    pub fn notify(&self, update: &ProgressUpdate) {
        let callbacks = match self.inner.lock().get(&update.session_id) {
            Some(entry) => entry.callbacks.clone(),
            None => return,
        };
        for callback in callbacks {
            if catch_unwind(AssertUnwindSafe(|| callback(update))).is_err() {
                warn!(
                    target: "heal-orchestrator",
                    session_id = %update.session_id,
                    phase = %update.phase,
                    "progress callback panicked"
                );
            }
        }
    }

    /// Mark the workflow as done with the session and wake waiters.
    pub fn settle(&self, id: &SessionId) {
        let notify = {
            let mut guard = self.inner.lock();
            match guard.get_mut(id) {
                Some(entry) => {
                    entry.settled = true;
                    entry.settled_notify.clone()
                }
                None => return,
            }
        };
        notify.notify_waiters();
    }

    /// Wait until the workflow has settled and return the final snapshot.
    pub async fn wait_settled(&self, id: &SessionId) -> Result<HealingSession, OrchestratorError> {
        loop {
            let notify = {
                let guard = self.inner.lock();
                let entry = guard
                    .get(id)
                    .ok_or_else(|| OrchestratorError::UnknownSession(id.clone()))?;
                if entry.settled {
                    return Ok(entry.session.clone());
                }
                entry.settled_notify.clone()
            };
            // Registered before the re-check so a settle in between is not lost.
            let notified = notify.notified();
            let settled = self
                .inner
                .lock()
                .get(id)
                .map_or(true, |entry| entry.settled);
            if !settled {
                notified.await;
            }
        }
    }

    /// Remove a finished session and hand it to the caller for archival.
    pub fn take_finished(&self, id: &SessionId) -> Result<HealingSession, OrchestratorError> {
        let mut guard = self.inner.lock();
        let entry = guard
            .get(id)
            .ok_or_else(|| OrchestratorError::UnknownSession(id.clone()))?;
        if !entry.session.is_terminal() || !entry.settled {
            return Err(OrchestratorError::StillRunning(id.clone()));
        }
        guard
            .remove(id)
            .map(|entry| entry.session)
            .ok_or_else(|| OrchestratorError::UnknownSession(id.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use heal_core_types::{FailureContext, FailureType};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn session() -> HealingSession {
        HealingSession::new(FailureContext::new(
            "tests/a.rs",
            "case",
            "id=a",
            FailureType::ElementNotFound,
        ))
    }

    fn registered() -> (SessionRegistry, SessionId, CancellationToken) {
        let registry = SessionRegistry::new();
        let session = session();
        let id = session.session_id.clone();
        let token = CancellationToken::new();
        registry.insert(session, token.clone());
        (registry, id, token)
    }

    #[test]
    fn terminal_sessions_ignore_updates() {
        let (registry, id, _) = registered();
        assert!(registry.update(&id, |s| s.progress = 0.3));
        let done = registry
            .finish(&id, HealingStatus::Success, |s| {
                s.successful_locator = Some("id=b".into())
            })
            .unwrap();
        assert!(done.completed_at.is_some());
        assert!(!registry.update(&id, |s| s.progress = 0.9));
        assert!(registry.finish(&id, HealingStatus::Failed, |_| {}).is_none());
        let snapshot = registry.get(&id).unwrap();
        assert_eq!(snapshot.status, HealingStatus::Success);
        assert_eq!(snapshot.progress, 0.3);
    }

    #[test]
    fn cancel_fails_session_and_fires_token() {
        let (registry, id, token) = registered();
        let cancelled = registry.cancel(&id).unwrap();
        assert_eq!(cancelled.status, HealingStatus::Failed);
        assert_eq!(cancelled.error_message.as_deref(), Some(CANCELLED_MESSAGE));
        assert!(token.is_cancelled());
        assert_eq!(
            registry.cancel(&id),
            Err(OrchestratorError::AlreadyFinished(id.clone()))
        );
        assert!(matches!(
            registry.cancel(&SessionId::new()),
            Err(OrchestratorError::UnknownSession(_))
        ));
        assert_eq!(registry.active_count(), 0);
    }

    #[test]
    fn panicking_callbacks_do_not_stop_delivery() {
        let (registry, id, _) = registered();
        let seen = Arc::new(AtomicUsize::new(0));
        registry
            .add_callback(&id, Arc::new(|_: &ProgressUpdate| panic!("boom")))
            .unwrap();
        let counter = seen.clone();
        registry
            .add_callback(
                &id,
                Arc::new(move |_: &ProgressUpdate| {
                    counter.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .unwrap();
        registry.notify(&ProgressUpdate {
            session_id: id.clone(),
            status: HealingStatus::InProgress,
            phase: "analysis".into(),
            progress: 0.0,
            message: String::new(),
        });
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn take_finished_requires_a_settled_terminal_session() {
        let (registry, id, _) = registered();
        assert_eq!(
            registry.take_finished(&id),
            Err(OrchestratorError::StillRunning(id.clone()))
        );
        registry.finish(&id, HealingStatus::Failed, |_| {});
        registry.settle(&id);
        assert_eq!(registry.take_finished(&id).unwrap().status, HealingStatus::Failed);
        assert!(registry.get(&id).is_none());
    }

    #[tokio::test]
    async fn waiters_wake_when_settled() {
        let (registry, id, _) = registered();
        let registry = Arc::new(registry);
        let waiter = {
            let registry = registry.clone();
            let id = id.clone();
            tokio::spawn(async move { registry.wait_settled(&id).await })
        };
        tokio::task::yield_now().await;
        registry.finish(&id, HealingStatus::Timeout, |_| {});
        registry.settle(&id);
        let session = waiter.await.unwrap().unwrap();
        assert_eq!(session.status, HealingStatus::Timeout);
    }
}
