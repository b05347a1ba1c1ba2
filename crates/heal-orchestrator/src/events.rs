use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::runtime::Handle;
use tokio::sync::{broadcast, mpsc};
use tracing::warn;

use heal_core_types::{HealError, SessionId};

use crate::model::{HealingPhase, HealingStatus, LocatorAttempt};
use crate::ports::EventsPort;

/// Phase-boundary notifications for audit and alerting sinks.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum HealEvent {
    SessionStarted {
        session_id: SessionId,
        original_locator: String,
        at: DateTime<Utc>,
    },
    PhaseStarted {
        session_id: SessionId,
        phase: HealingPhase,
    },
    PhaseCompleted {
        session_id: SessionId,
        phase: HealingPhase,
        seconds: f64,
    },
    AttemptRecorded {
        session_id: SessionId,
        attempt: LocatorAttempt,
    },
    SessionFinished {
        session_id: SessionId,
        status: HealingStatus,
        successful_locator: Option<String>,
        error_message: Option<String>,
        seconds: f64,
    },
}

impl HealEvent {
    pub fn session_id(&self) -> &SessionId {
        match self {
            HealEvent::SessionStarted { session_id, .. }
            | HealEvent::PhaseStarted { session_id, .. }
            | HealEvent::PhaseCompleted { session_id, .. }
            | HealEvent::AttemptRecorded { session_id, .. }
            | HealEvent::SessionFinished { session_id, .. } => session_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            HealEvent::SessionStarted { .. } => "session_started",
            HealEvent::PhaseStarted { .. } => "phase_started",
            HealEvent::PhaseCompleted { .. } => "phase_completed",
            HealEvent::AttemptRecorded { .. } => "attempt_recorded",
            HealEvent::SessionFinished { .. } => "session_finished",
        }
    }
}

/// Broadcast-backed sink for tests and in-process subscribers.
pub struct InMemoryEventSink {
    sender: broadcast::Sender<HealEvent>,
}

impl InMemoryEventSink {
    pub fn new(capacity: usize) -> Arc<Self> {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Arc::new(Self { sender })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<HealEvent> {
        self.sender.subscribe()
    }
}

#[async_trait]
impl EventsPort for InMemoryEventSink {
    async fn emit(&self, event: &HealEvent) -> Result<(), HealError> {
        self.sender
            .send(event.clone())
            .map(|_| ())
            .map_err(|err| HealError::new(err.to_string()))
    }
}

/// Events queued per orchestrator before new ones are dropped.
pub const EVENT_QUEUE_CAPACITY: usize = 256;

/// Hands events to the port from a background task so sessions never wait
/// on a slow sink. Delivery order is preserved; when the queue is full the
/// event is dropped and logged.
pub(crate) struct EventDispatcher {
    port: Arc<dyn EventsPort>,
    capacity: usize,
    sender: Mutex<Option<mpsc::Sender<HealEvent>>>,
}

impl EventDispatcher {
    pub(crate) fn new(port: Arc<dyn EventsPort>, capacity: usize) -> Self {
        Self {
            port,
            capacity: capacity.max(1),
            sender: Mutex::new(None),
        }
    }

    pub(crate) fn dispatch(&self, event: HealEvent) {
        let mut sender = self.sender.lock();
        // The drain task dies with the runtime that spawned it.
        if sender.as_ref().map_or(true, |tx| tx.is_closed()) {
            *sender = self.spawn_drain();
        }
        let Some(tx) = sender.as_ref() else {
            warn!(target: "heal-orchestrator", event = event.kind(), "no runtime for event delivery, event dropped");
            return;
        };
        if let Err(err) = tx.try_send(event) {
            let (reason, event) = match err {
                mpsc::error::TrySendError::Full(event) => ("queue full", event),
                mpsc::error::TrySendError::Closed(event) => ("queue closed", event),
            };
            warn!(
                target: "heal-orchestrator",
                event = event.kind(),
                session_id = %event.session_id(),
                reason,
                "event dropped"
            );
        }
    }

    fn spawn_drain(&self) -> Option<mpsc::Sender<HealEvent>> {
        let handle = Handle::try_current().ok()?;
        let (tx, mut rx) = mpsc::channel::<HealEvent>(self.capacity);
        let port = self.port.clone();
        handle.spawn(async move {
            while let Some(event) = rx.recv().await {
                if let Err(err) = port.emit(&event).await {
                    warn!(
                        target: "heal-orchestrator",
                        event = event.kind(),
                        error = %err,
                        "event emission failed"
                    );
                }
            }
        });
        Some(tx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_events() {
        let sink = InMemoryEventSink::new(8);
        let mut rx = sink.subscribe();
        let id = SessionId::new();
        sink.emit(&HealEvent::PhaseStarted {
            session_id: id.clone(),
            phase: HealingPhase::Generation,
        })
        .await
        .unwrap();
        let event = rx.recv().await.unwrap();
        assert_eq!(event.session_id(), &id);
        assert_eq!(event.kind(), "phase_started");
    }

    #[tokio::test]
    async fn emitting_without_subscribers_is_an_error() {
        let sink = InMemoryEventSink::new(1);
        let result = sink
            .emit(&HealEvent::PhaseStarted {
                session_id: SessionId::new(),
                phase: HealingPhase::Analysis,
            })
            .await;
        assert!(result.is_err());
    }

    fn phase_started(session_id: &SessionId, phase: HealingPhase) -> HealEvent {
        HealEvent::PhaseStarted {
            session_id: session_id.clone(),
            phase,
        }
    }

    #[tokio::test]
    async fn dispatched_events_arrive_in_order() {
        let sink = InMemoryEventSink::new(8);
        let mut rx = sink.subscribe();
        let dispatcher = EventDispatcher::new(sink, 8);
        let id = SessionId::new();
        let phases = [
            HealingPhase::Analysis,
            HealingPhase::Generation,
            HealingPhase::Validation,
        ];
        for phase in phases {
            dispatcher.dispatch(phase_started(&id, phase));
        }
        for expected in phases {
            match rx.recv().await.unwrap() {
                HealEvent::PhaseStarted { phase, .. } => assert_eq!(phase, expected),
                other => panic!("unexpected event {other:?}"),
            }
        }
    }

    #[derive(Default)]
    struct StalledPort {
        entered: tokio::sync::Notify,
    }

    #[async_trait]
    impl EventsPort for StalledPort {
        async fn emit(&self, _event: &HealEvent) -> Result<(), HealError> {
            self.entered.notify_one();
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn stalled_port_does_not_block_dispatch() {
        let port = Arc::new(StalledPort::default());
        let dispatcher = EventDispatcher::new(port.clone(), 2);
        let id = SessionId::new();
        for _ in 0..16 {
            dispatcher.dispatch(phase_started(&id, HealingPhase::Generation));
        }
        port.entered.notified().await;
        dispatcher.dispatch(phase_started(&id, HealingPhase::Validation));
    }

    #[test]
    fn dispatch_without_runtime_drops_the_event() {
        let dispatcher = EventDispatcher::new(InMemoryEventSink::new(4), 4);
        dispatcher.dispatch(phase_started(&SessionId::new(), HealingPhase::Analysis));
        assert!(dispatcher.sender.lock().is_none());
    }

    #[test]
    fn events_serialize_with_tag() {
        let json = serde_json::to_value(HealEvent::PhaseCompleted {
            session_id: SessionId("s-1".into()),
            phase: HealingPhase::Validation,
            seconds: 0.5,
        })
        .unwrap();
        assert_eq!(json["event"], "phase_completed");
        assert_eq!(json["phase"], "validation");
        assert_eq!(json["session_id"], "s-1");
    }
}
